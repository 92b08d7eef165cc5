//! Error types for the certificate trust manager.
//!
//! Loading failures ([`ParseError`]), trust decisions ([`Rejection`]) and
//! environment problems (missing configuration, unreadable files) are kept
//! apart so callers never mistake "no such certificate" for "certificate is
//! untrusted". A verification-certificate lookup miss is not an error at all;
//! see [`crate::store::Lookup`].

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`TrustError`].
pub type Result<T> = std::result::Result<T, TrustError>;

/// Errors surfaced by the certificate store and its collaborators.
#[derive(Debug, Error)]
pub enum TrustError {
    /// Certificate or keystore material could not be decoded.
    #[error("Certificate parsing error: {0}")]
    Parse(#[from] ParseError),

    /// A certificate failed trust chain or identity policy checks.
    #[error("Certificate rejected: {0}")]
    Rejected(#[from] Rejection),

    /// An optional category was requested but never configured.
    #[error("Configuration missing: {0}")]
    ConfigurationMissing(&'static str),

    /// Configuration file could not be parsed.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The filesystem collaborator failed to supply bytes.
    #[error("I/O error reading {}: {source}", path.display())]
    Io {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

impl TrustError {
    /// Create an I/O error for the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error with the given message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Returns the rejection reason if this error is a trust decision.
    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(r) => Some(r),
            _ => None,
        }
    }

    /// Returns true if the failure concerns a single peer certificate and the
    /// caller may keep serving other requests.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Parse(_))
    }
}

/// Distinct ways that certificate or keystore bytes fail to load.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Bytes are not a valid certificate or keystore encoding.
    #[error("malformed encoding: {0}")]
    MalformedEncoding(String),

    /// The keystore passphrase does not unlock the private key.
    #[error("keystore passphrase does not match")]
    PassphraseMismatch,

    /// The keystore holds certificates but no private key entry.
    #[error("keystore contains no private key entry")]
    MissingKeyEntry,
}

impl ParseError {
    /// Create a malformed encoding error with the given message.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedEncoding(msg.into())
    }
}

impl From<der::Error> for ParseError {
    fn from(err: der::Error) -> Self {
        Self::MalformedEncoding(err.to_string())
    }
}

impl From<base64::DecodeError> for ParseError {
    fn from(err: base64::DecodeError) -> Self {
        Self::MalformedEncoding(format!("base64: {err}"))
    }
}

/// Reason a peer certificate was not trusted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Rejection {
    /// A trust anchor required for path building is not loaded.
    #[error("trusted {0} certificate is not available")]
    MissingAnchor(AnchorRole),

    /// No valid path from the leaf to the trusted root could be built.
    #[error("certificate path building failed: {0}")]
    ChainBuildFailure(PathFault),

    /// The current time lies outside the leaf's validity window.
    #[error("certificate not valid now (valid from {not_before} to {not_after}, unix seconds)")]
    Expired {
        /// Start of the validity window.
        not_before: u64,
        /// End of the validity window.
        not_after: u64,
    },

    /// The subject identity token is not accepted by the identity policy.
    #[error("certificate owner '{identity}' is not an accepted identity")]
    IdentityMismatch {
        /// Identity token extracted from the subject DN.
        identity: String,
    },
}

/// Role of a certificate in the fixed root/intermediate/leaf topology.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnchorRole {
    /// Self-signed root, the only trust anchor.
    Root,
    /// Intermediate CA issued by the root.
    Intermediate,
}

impl fmt::Display for AnchorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Root => f.write_str("root"),
            Self::Intermediate => f.write_str("intermediate"),
        }
    }
}

/// Underlying path-building fault carried by [`Rejection::ChainBuildFailure`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PathFault {
    /// No candidate or anchor issued the certificate.
    #[error("no issuer found for '{0}'")]
    IssuerNotFound(String),

    /// Signature does not verify under the issuer's key.
    #[error("signature on '{0}' does not verify")]
    SignatureInvalid(String),

    /// Signature algorithm is not supported.
    #[error("unsupported signature algorithm {0}")]
    UnsupportedAlgorithm(String),

    /// Issuer public key could not be decoded.
    #[error("malformed issuer public key: {0}")]
    MalformedKey(String),

    /// An issuing certificate is not marked as a CA.
    #[error("issuer '{0}' is not a CA certificate")]
    NotCa(String),

    /// An issuing certificate lacks the keyCertSign key usage.
    #[error("issuer '{0}' is not permitted to sign certificates")]
    MissingKeyCertSign(String),

    /// A CA's path length constraint is exceeded.
    #[error("path length constraint of '{0}' exceeded")]
    PathLenExceeded(String),

    /// A CA certificate in the path is outside its validity window.
    #[error("CA certificate '{0}' is not valid now")]
    CaNotValid(String),

    /// The path would exceed the root/intermediate/leaf topology.
    #[error("path exceeds the root/intermediate/leaf topology")]
    TooLong,
}
