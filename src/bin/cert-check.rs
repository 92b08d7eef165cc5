// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Gateway Certificate Check Tool
//!
//! Loads a certificate store configuration and exercises it from the command
//! line: validating a peer certificate, looking up verification certificates
//! and printing the certIds the gateway expects.
//!
//! # Usage
//!
//! ```text
//! cert-check [OPTIONS] --config <PATH> <COMMAND>
//!
//! Commands:
//!   verify-peer  Validate a peer certificate against the trust anchors
//!   lookup       Find a verification certificate by certId
//!   sign-id      Print the certId of the signing certificate
//!   encrypt-id   Print the certId of the encryption certificate
//!   anchors      Show the configured trust anchors
//!   warm-up      Load every configured category and report failures
//!
//! Options:
//!   -c, --config <PATH>   Path to configuration file
//!   -v, --verbose         Enable verbose output
//!   -q, --quiet           Suppress non-error output
//!   -h, --help            Print help
//!   -V, --version         Print version
//! ```
//!
//! # Examples
//!
//! ```bash
//! # Validate the certificate attached to a gateway response
//! cert-check -c /etc/gateway/certs.toml verify-peer response_cert.pem
//!
//! # Find the verification certificate for a certId
//! cert-check -c /etc/gateway/certs.toml lookup 69629715588
//! ```

use clap::{Parser, Subcommand};
use gateway_certs::{CertificateStore, Lookup, TrustConfig, ValidationStage};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Gateway Certificate Check Tool
#[derive(Parser)]
#[command(name = "cert-check")]
#[command(author = "U.S. Federal Government")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and validate payment gateway certificates", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a peer certificate against the trust anchors
    VerifyPeer {
        /// PEM file holding the peer certificate
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Find a verification certificate by certId
    Lookup {
        /// Decimal certificate serial number
        #[arg(value_name = "CERT_ID")]
        cert_id: String,
    },

    /// Print the certId of the signing certificate
    SignId,

    /// Print the certId of the encryption certificate
    EncryptId,

    /// Show the configured trust anchors
    Anchors,

    /// Load every configured category and report failures
    WarmUp,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level)),
        )
        .with_target(false)
        .init();

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run_command(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let config = match &cli.config {
        Some(path) => TrustConfig::from_file(path)?,
        None => return Err("no configuration file given (use --config)".into()),
    };
    let store = CertificateStore::new(config);

    match &cli.command {
        Commands::VerifyPeer { file } => cmd_verify_peer(&store, file),
        Commands::Lookup { cert_id } => cmd_lookup(&store, cert_id),
        Commands::SignId => {
            println!("{}", store.default_signing_key()?.cert_id());
            Ok(())
        }
        Commands::EncryptId => {
            println!("{}", store.encryption_cert_id()?);
            Ok(())
        }
        Commands::Anchors => cmd_anchors(&store),
        Commands::WarmUp => {
            let degraded = store.warm_up();
            if degraded.is_empty() {
                println!("All configured certificates loaded");
                Ok(())
            } else {
                Err(format!("unavailable: {}", degraded.join(", ")).into())
            }
        }
    }
}

fn cmd_verify_peer(store: &CertificateStore, file: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let text = std::fs::read_to_string(file)?;
    match store.get_or_validate_peer(&text) {
        Ok(cert) => {
            println!("Trusted");
            println!("  certId:   {}", cert.cert_id());
            println!("  subject:  {}", cert.subject_dn());
            println!("  identity: {}", cert.identity());
            Ok(())
        }
        Err(e) => {
            if let Some(rejection) = e.rejection() {
                println!("Rejected at stage: {}", ValidationStage::failed_at(rejection));
            }
            Err(e.into())
        }
    }
}

fn cmd_lookup(store: &CertificateStore, cert_id: &str) -> Result<(), Box<dyn std::error::Error>> {
    match store.verification_cert(cert_id)? {
        Lookup::Found(cert) => {
            println!("certId:  {}", cert.cert_id());
            println!("subject: {}", cert.subject_dn());
            Ok(())
        }
        Lookup::NotFound => Err(format!("no verification certificate with certId {cert_id}").into()),
    }
}

fn cmd_anchors(store: &CertificateStore) -> Result<(), Box<dyn std::error::Error>> {
    let anchors = store.trust_anchors();
    for (role, cert) in [("root", &anchors.root), ("intermediate", &anchors.intermediate)] {
        match cert {
            Some(cert) => println!("{role}: {} (certId {})", cert.subject_dn(), cert.cert_id()),
            None => println!("{role}: unavailable"),
        }
    }
    if anchors.is_complete() {
        Ok(())
    } else {
        Err("trust anchors incomplete".into())
    }
}
