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

//! Configuration for the certificate store.
//!
//! Every certificate category is optional. A category that is not configured
//! is logged when first needed and any operation that depends on it fails
//! with [`TrustError::ConfigurationMissing`].
//!
//! # Example Configuration
//!
//! ```toml
//! encrypt_cert_path = "/etc/gateway/certs/acp_prod_enc.cer"
//! middle_cert_path = "/etc/gateway/certs/acp_prod_middle.cer"
//! root_cert_path = "/etc/gateway/certs/acp_prod_root.cer"
//! validate_cert_dir = "/etc/gateway/certs/verify"
//! validate_cn_name = true
//!
//! [sign_cert]
//! path = "/etc/gateway/certs/acp_prod_sign.pem"
//! password = "000000"
//! ```

use crate::error::{Result, TrustError};
use crate::policy::IdentityPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Certificate store configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrustConfig {
    /// Signing keystore used when no explicit source is given.
    #[serde(default)]
    pub sign_cert: Option<SignCertConfig>,

    /// Certificate whose public key encrypts sensitive payload fields.
    #[serde(default)]
    pub encrypt_cert_path: Option<PathBuf>,

    /// Intermediate CA certificate.
    #[serde(default)]
    pub middle_cert_path: Option<PathBuf>,

    /// Root CA certificate, the sole trust anchor.
    #[serde(default)]
    pub root_cert_path: Option<PathBuf>,

    /// Directory of `*.cer` verification certificates, indexed by certId.
    #[serde(default)]
    pub validate_cert_dir: Option<PathBuf>,

    /// Enforce the strict identity policy on peer certificates.
    ///
    /// When `false`, the lenient policy also accepts the sentinel identity.
    #[serde(default = "default_validate_cn_name")]
    pub validate_cn_name: bool,
}

impl std::fmt::Debug for TrustConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrustConfig")
            .field("sign_cert", &self.sign_cert.as_ref().map(|s| &s.path))
            .field("encrypt_cert_path", &self.encrypt_cert_path)
            .field("middle_cert_path", &self.middle_cert_path)
            .field("root_cert_path", &self.root_cert_path)
            .field("validate_cert_dir", &self.validate_cert_dir)
            .field("validate_cn_name", &self.validate_cn_name)
            .finish()
    }
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            sign_cert: None,
            encrypt_cert_path: None,
            middle_cert_path: None,
            root_cert_path: None,
            validate_cert_dir: None,
            validate_cn_name: default_validate_cn_name(),
        }
    }
}

fn default_validate_cn_name() -> bool {
    true
}

/// Location and passphrase of a signing keystore.
#[derive(Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignCertConfig {
    /// Keystore path.
    pub path: PathBuf,

    /// Keystore passphrase.
    #[serde(default)]
    pub password: String,
}

impl TrustConfig {
    /// Create a new configuration builder.
    pub fn builder() -> TrustConfigBuilder {
        TrustConfigBuilder::new()
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or contains unknown fields.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str).map_err(|e| TrustError::config(format!("Invalid TOML: {e}")))
    }

    /// Read and parse a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| TrustError::io(path, e))?;
        Self::from_toml(&text)
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| TrustError::config(format!("TOML serialize: {e}")))
    }

    /// Identity policy selected by `validate_cn_name`.
    pub fn identity_policy(&self) -> IdentityPolicy {
        IdentityPolicy::from_validate_cn_name(self.validate_cn_name)
    }
}

/// Builder for [`TrustConfig`].
#[derive(Default)]
pub struct TrustConfigBuilder {
    config: TrustConfig,
}

impl TrustConfigBuilder {
    /// Create a new configuration builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default signing keystore and its passphrase.
    pub fn sign_cert(mut self, path: impl Into<PathBuf>, password: impl Into<String>) -> Self {
        self.config.sign_cert = Some(SignCertConfig {
            path: path.into(),
            password: password.into(),
        });
        self
    }

    /// Set the encryption certificate path.
    pub fn encrypt_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.encrypt_cert_path = Some(path.into());
        self
    }

    /// Set the intermediate CA certificate path.
    pub fn middle_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.middle_cert_path = Some(path.into());
        self
    }

    /// Set the root CA certificate path.
    pub fn root_cert(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.root_cert_path = Some(path.into());
        self
    }

    /// Set the verification certificate directory.
    pub fn validate_cert_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.validate_cert_dir = Some(dir.into());
        self
    }

    /// Select strict (`true`) or lenient (`false`) identity checking.
    pub fn validate_cn_name(mut self, validate: bool) -> Self {
        self.config.validate_cn_name = validate;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> TrustConfig {
        self.config
    }
}
