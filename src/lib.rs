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

//! # gateway-certs
//!
//! Certificate trust management for a payment gateway integration.
//!
//! The gateway signs every message with a merchant keystore, encrypts
//! sensitive fields with the operator's encryption certificate, and returns
//! responses signed by a certificate the merchant must validate against a
//! fixed root and intermediate before trusting the signature.
//!
//! This crate provides:
//!
//! - **Loading** of X.509 certificates (DER or PEM) and encrypted PKCS#8
//!   keystores ([`loader`])
//! - **A process-wide cache** for every certificate category with single,
//!   lazy initialization under concurrency ([`store`])
//! - **Peer validation** against the configured anchors: path building,
//!   signature verification, validity, and an owner identity check
//!   ([`validation`], [`policy`])
//! - **Identity extraction** from the operator's `@`-delimited CN convention
//!   ([`identity`])
//!
//! ## Quick Start
//!
//! ```no_run
//! use gateway_certs::{CertificateStore, TrustConfig};
//!
//! # fn example(peer_pem: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let config = TrustConfig::builder()
//!     .sign_cert("/etc/gateway/certs/acp_sign.pem", "000000")
//!     .encrypt_cert("/etc/gateway/certs/acp_enc.cer")
//!     .root_cert("/etc/gateway/certs/acp_root.cer")
//!     .middle_cert("/etc/gateway/certs/acp_middle.cer")
//!     .build();
//!
//! let store = CertificateStore::new(config);
//!
//! // certId sent alongside every signed request
//! let cert_id = store.default_signing_key()?.cert_id().to_string();
//!
//! // Validate the certificate attached to a response
//! let public_key = store.verify_and_get_public_key(peer_pem)?;
//! # let _ = (cert_id, public_key);
//! # Ok(())
//! # }
//! ```
//!
//! ## Cargo Features
//!
//! - `cli` (default): builds the `cert-check` command-line tool

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod error;
pub mod identity;
pub mod loader;
pub mod policy;
pub mod source;
pub mod store;
pub mod validation;

// Re-export main types at crate root for convenience
pub use config::{SignCertConfig, TrustConfig, TrustConfigBuilder};
pub use error::{AnchorRole, ParseError, PathFault, Rejection, Result, TrustError};
pub use loader::{Cert, KeyedCertificate};
pub use policy::IdentityPolicy;
pub use source::{CertSource, FsSource};
pub use store::{CertificateStore, Lookup, StoreStats};
pub use validation::{ChainValidator, TrustAnchorSet, ValidationStage, Verdict};

// Re-export x509_cert::Certificate for convenience
pub use x509_cert::Certificate;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
