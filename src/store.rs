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

//! The certificate store.
//!
//! [`CertificateStore`] is the single source of truth for every certificate
//! category the gateway integration uses:
//!
//! - signing keystores, keyed by source path,
//! - the encryption certificate (resettable for key rotation),
//! - the trusted root and intermediate,
//! - the verification certificate index, keyed by certId,
//! - the cache of peer certificates that already passed validation.
//!
//! Each category is loaded lazily and at most once. Concurrent first callers
//! block on a single load and all observe the same value. A failed load is not
//! memoized, so the next access tries again.
//!
//! # Example
//!
//! ```no_run
//! use gateway_certs::{CertificateStore, TrustConfig};
//!
//! # fn example(sign_pub_key_cert: &str) -> Result<(), Box<dyn std::error::Error>> {
//! let config = TrustConfig::from_file("/etc/gateway/certs.toml")?;
//! let store = CertificateStore::new(config);
//!
//! let signing = store.default_signing_key()?;
//! println!("signing with certId {}", signing.cert_id());
//!
//! // Validate the certificate a peer sent with its response
//! let peer = store.get_or_validate_peer(sign_pub_key_cert)?;
//! println!("peer certificate {} trusted", peer.cert_id());
//! # Ok(())
//! # }
//! ```

use crate::config::TrustConfig;
use crate::error::{AnchorRole, Rejection, Result, TrustError};
use crate::loader::{self, Cert, KeyedCertificate};
use crate::source::{CertSource, FsSource};
use crate::validation::{ChainValidator, TrustAnchorSet};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use spki::SubjectPublicKeyInfoOwned;
use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, error, info, warn};

/// Result of a lookup that may legitimately find nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// The item exists.
    Found(T),
    /// No item matches; this is a valid answer, not a failure.
    NotFound,
}

impl<T> Lookup<T> {
    /// Convert into an `Option`.
    pub fn found(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound => None,
        }
    }

    /// Returns true if nothing was found.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }
}

/// Snapshot of store activity counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Reads requested from the [`CertSource`].
    pub file_reads: u64,
    /// Full peer validations run (cache misses).
    pub peer_validations: u64,
    /// Peer lookups answered from the cache.
    pub peer_cache_hits: u64,
    /// Peer certificates currently cached.
    pub cached_peers: usize,
    /// Signing keystores currently cached.
    pub signing_keys: usize,
}

#[derive(Debug, Default)]
struct Counters {
    file_reads: AtomicU64,
    peer_validations: AtomicU64,
    peer_cache_hits: AtomicU64,
}

/// A lazily initialized value that can be cleared and reloaded.
///
/// Readers clone the current cell under a shared lock and initialize it
/// outside the lock; `reset` swaps in a fresh cell under the exclusive lock.
struct ResettableCell<T> {
    cell: RwLock<Arc<OnceCell<Arc<T>>>>,
}

impl<T> ResettableCell<T> {
    fn new() -> Self {
        Self {
            cell: RwLock::new(Arc::new(OnceCell::new())),
        }
    }

    fn get_or_try_init<E>(&self, init: impl FnOnce() -> std::result::Result<T, E>) -> std::result::Result<Arc<T>, E> {
        let cell = Arc::clone(&*self.cell.read());
        cell.get_or_try_init(|| init().map(Arc::new)).cloned()
    }

    fn get(&self) -> Option<Arc<T>> {
        self.cell.read().get().cloned()
    }

    fn reset(&self) {
        *self.cell.write() = Arc::new(OnceCell::new());
    }
}

type KeyedCell<T> = Arc<OnceCell<Arc<T>>>;

/// Remove the entry for `key` if it still holds `cell` and `cell` was never set.
///
/// Entries replaced by a later caller are left alone.
fn discard_unset<K, Q, T>(map: &DashMap<K, KeyedCell<T>>, key: &Q, cell: &KeyedCell<T>)
where
    K: Eq + Hash + Borrow<Q>,
    Q: Eq + Hash + ?Sized,
{
    map.remove_if(key, |_, current| Arc::ptr_eq(current, cell) && current.get().is_none());
}

enum ScanError {
    Empty,
    Failed(TrustError),
}

/// Process-wide cache of certificate material, constructed explicitly and
/// shared by reference or `Arc`.
pub struct CertificateStore {
    config: TrustConfig,
    source: Arc<dyn CertSource>,
    validator: ChainValidator,
    signing: DashMap<PathBuf, KeyedCell<KeyedCertificate>>,
    encryption: ResettableCell<Cert>,
    root: ResettableCell<Cert>,
    intermediate: ResettableCell<Cert>,
    verification: ResettableCell<HashMap<String, Arc<Cert>>>,
    peers: DashMap<String, KeyedCell<Cert>>,
    counters: Counters,
}

impl CertificateStore {
    /// Create a store reading from the local filesystem.
    pub fn new(config: TrustConfig) -> Self {
        Self::with_source(config, Arc::new(FsSource))
    }

    /// Create a store reading through `source`.
    pub fn with_source(config: TrustConfig, source: Arc<dyn CertSource>) -> Self {
        let validator = ChainValidator::new(config.identity_policy());
        Self {
            config,
            source,
            validator,
            signing: DashMap::new(),
            encryption: ResettableCell::new(),
            root: ResettableCell::new(),
            intermediate: ResettableCell::new(),
            verification: ResettableCell::new(),
            peers: DashMap::new(),
            counters: Counters::default(),
        }
    }

    /// The configuration this store was built from.
    pub fn config(&self) -> &TrustConfig {
        &self.config
    }

    /// The validator applied to peer certificates.
    pub fn validator(&self) -> &ChainValidator {
        &self.validator
    }

    // ---- signing keys ----

    /// Signing keystore at `path`, loaded on first use.
    ///
    /// Entries are cached per path; the passphrase is only used for the
    /// first successful load.
    pub fn signing_key(&self, path: impl AsRef<Path>, passphrase: &str) -> Result<Arc<KeyedCertificate>> {
        let path = path.as_ref();
        let cell = self
            .signing
            .entry(path.to_path_buf())
            .or_default()
            .value()
            .clone();

        let result = cell
            .get_or_try_init(|| -> Result<Arc<KeyedCertificate>> {
                info!(path = %path.display(), "Loading signing keystore");
                let bytes = self.read(path)?;
                let keyed = loader::parse_key_store(&bytes, passphrase).map_err(|e| {
                    error!(path = %path.display(), error = %e, "Failed to load signing keystore");
                    e
                })?;
                info!(cert_id = keyed.cert_id(), "Signing certificate loaded");
                Ok(Arc::new(keyed))
            })
            .cloned();

        if result.is_err() {
            discard_unset(&self.signing, path, &cell);
        }
        result
    }

    /// Signing keystore named in the configuration.
    pub fn default_signing_key(&self) -> Result<Arc<KeyedCertificate>> {
        let sign = self
            .config
            .sign_cert
            .as_ref()
            .ok_or(TrustError::ConfigurationMissing("signing keystore (sign_cert)"))?;
        self.signing_key(&sign.path, &sign.password)
    }

    /// certId of the signing certificate at `path`.
    pub fn signing_cert_id(&self, path: impl AsRef<Path>, passphrase: &str) -> Result<String> {
        Ok(self.signing_key(path, passphrase)?.cert_id().to_string())
    }

    // ---- encryption certificate ----

    /// Encryption certificate, loaded on first use.
    pub fn encryption_key(&self) -> Result<Arc<Cert>> {
        let path = self.config.encrypt_cert_path.as_deref().ok_or_else(|| {
            debug!("Encryption certificate path not configured");
            TrustError::ConfigurationMissing("encryption certificate (encrypt_cert_path)")
        })?;
        self.encryption
            .get_or_try_init(|| self.load_certificate(path, "encryption"))
    }

    /// certId of the encryption certificate.
    pub fn encryption_cert_id(&self) -> Result<String> {
        Ok(self.encryption_key()?.cert_id().to_string())
    }

    /// Drop the cached encryption certificate; the next access reloads it.
    pub fn invalidate_encryption_key(&self) {
        info!("Invalidating encryption certificate");
        self.encryption.reset();
    }

    /// Drop the cached encryption certificate and load it again now.
    pub fn reload_encryption_key(&self) -> Result<Arc<Cert>> {
        self.invalidate_encryption_key();
        self.encryption_key()
    }

    // ---- trust anchors ----

    /// Trusted root and intermediate.
    ///
    /// Each is loaded independently. An unconfigured or unreadable anchor is
    /// logged and reported as absent; validation then fails with
    /// `MissingAnchor`.
    pub fn trust_anchors(&self) -> TrustAnchorSet {
        TrustAnchorSet {
            root: self.anchor(AnchorRole::Root),
            intermediate: self.anchor(AnchorRole::Intermediate),
        }
    }

    /// Drop the cached anchors; the next access reloads them.
    pub fn reset_trust_anchors(&self) {
        info!("Resetting trust anchors");
        self.root.reset();
        self.intermediate.reset();
    }

    fn anchor(&self, role: AnchorRole) -> Option<Arc<Cert>> {
        let (cell, path) = match role {
            AnchorRole::Root => (&self.root, self.config.root_cert_path.as_deref()),
            AnchorRole::Intermediate => (&self.intermediate, self.config.middle_cert_path.as_deref()),
        };

        if let Some(cert) = cell.get() {
            return Some(cert);
        }
        let Some(path) = path else {
            warn!(role = %role, "Trusted certificate path not configured");
            return None;
        };

        match cell.get_or_try_init(|| self.load_certificate(path, role)) {
            Ok(cert) => Some(cert),
            Err(e) => {
                error!(role = %role, error = %e, "Trusted certificate unavailable");
                None
            }
        }
    }

    // ---- verification certificates ----

    /// Verification certificate with the given certId.
    ///
    /// The verification directory is scanned once, on first use. An empty
    /// scan is not memoized, so certificates added later are picked up.
    pub fn verification_cert(&self, cert_id: &str) -> Result<Lookup<Arc<Cert>>> {
        let dir = self.config.validate_cert_dir.as_deref().ok_or_else(|| {
            debug!("Verification certificate directory not configured");
            TrustError::ConfigurationMissing("verification certificate directory (validate_cert_dir)")
        })?;

        let scanned = self.verification.get_or_try_init(|| match self.scan_verification_dir(dir) {
            Ok(index) if index.is_empty() => Err(ScanError::Empty),
            Ok(index) => Ok(index),
            Err(e) => Err(ScanError::Failed(e)),
        });

        match scanned {
            Ok(index) => match index.get(cert_id) {
                Some(cert) => Ok(Lookup::Found(Arc::clone(cert))),
                None => {
                    info!(cert_id, "No verification certificate matches certId");
                    Ok(Lookup::NotFound)
                }
            },
            Err(ScanError::Empty) => {
                info!(dir = %dir.display(), "No verification certificates found");
                Ok(Lookup::NotFound)
            }
            Err(ScanError::Failed(e)) => Err(e),
        }
    }

    /// Drop the verification index; the next lookup rescans the directory.
    pub fn reset_verification_certs(&self) {
        self.verification.reset();
    }

    fn scan_verification_dir(&self, dir: &Path) -> Result<HashMap<String, Arc<Cert>>> {
        info!(dir = %dir.display(), "Scanning verification certificates");
        let files = self
            .source
            .list_certificates(dir)
            .map_err(|e| TrustError::io(dir, e))?;

        let mut index = HashMap::with_capacity(files.len());
        for file in files {
            let cert = self.load_certificate(&file, "verification")?;
            index.insert(cert.cert_id().to_string(), Arc::new(cert));
        }
        Ok(index)
    }

    // ---- peer certificates ----

    /// Return the trusted peer certificate for `raw`, validating it on a
    /// cache miss.
    ///
    /// `raw` is PEM text, with or without markers. Only certificates that
    /// pass validation are cached; a rejection is re-evaluated on every call.
    pub fn get_or_validate_peer(&self, raw: &str) -> Result<Arc<Cert>> {
        self.get_or_validate_peer_at(raw, SystemTime::now())
    }

    /// [`get_or_validate_peer`](Self::get_or_validate_peer) evaluated at `now`.
    ///
    /// A cached certificate is not validated again, but it is still refused
    /// with [`Rejection::Expired`] once `now` leaves its validity window.
    pub fn get_or_validate_peer_at(&self, raw: &str, now: SystemTime) -> Result<Arc<Cert>> {
        let key = loader::canonical_peer_encoding(raw);

        let hit = self.peers.get(&key).and_then(|cell| cell.value().get().cloned());
        if let Some(cert) = hit {
            self.counters.peer_cache_hits.fetch_add(1, Ordering::Relaxed);
            if !cert.is_valid_at(now) {
                warn!(
                    cert_id = cert.cert_id(),
                    "Cached peer certificate is outside its validity window"
                );
                return Err(Rejection::Expired {
                    not_before: loader::unix_seconds(cert.not_before()),
                    not_after: loader::unix_seconds(cert.not_after()),
                }
                .into());
            }
            return Ok(cert);
        }

        let cell = self.peers.entry(key.clone()).or_default().value().clone();
        let result = cell.get_or_try_init(|| self.validate_peer(&key, now)).cloned();

        if result.is_err() {
            discard_unset(&self.peers, key.as_str(), &cell);
        }
        result
    }

    /// Validate `raw` and return its public key.
    pub fn verify_and_get_public_key(&self, raw: &str) -> Result<SubjectPublicKeyInfoOwned> {
        Ok(self.get_or_validate_peer(raw)?.public_key().clone())
    }

    /// Forget every cached peer certificate.
    pub fn reset_peer_cache(&self) {
        self.peers.clear();
    }

    fn validate_peer(&self, canonical: &str, now: SystemTime) -> Result<Arc<Cert>> {
        self.counters.peer_validations.fetch_add(1, Ordering::Relaxed);
        info!("Validating peer certificate");

        let (_, cert) = loader::decode_peer_certificate(canonical).map_err(|e| {
            error!(error = %e, "Failed to decode peer certificate");
            e
        })?;

        let anchors = self.trust_anchors();
        let verdict = self.validator.validate_at(&cert, &anchors, now)?;
        info!(
            cert_id = cert.cert_id(),
            identity = %verdict.identity,
            "Peer certificate trusted"
        );
        Ok(Arc::new(cert))
    }

    // ---- maintenance ----

    /// Load every configured category now, reporting those that failed.
    ///
    /// Failures are logged and returned, never fatal; the affected categories
    /// are retried on their next access.
    pub fn warm_up(&self) -> Vec<&'static str> {
        let mut degraded = Vec::new();

        if self.config.validate_cert_dir.is_some() {
            if let Err(e) = self.verification_cert("") {
                warn!(error = %e, "Verification certificates unavailable");
                degraded.push("verification");
            }
        }
        if self.config.encrypt_cert_path.is_some() {
            if let Err(e) = self.encryption_key() {
                warn!(error = %e, "Encryption certificate unavailable");
                degraded.push("encryption");
            }
        }
        let anchors = self.trust_anchors();
        if anchors.root.is_none() {
            degraded.push("root");
        }
        if anchors.intermediate.is_none() {
            degraded.push("intermediate");
        }
        if self.config.sign_cert.is_some() {
            if let Err(e) = self.default_signing_key() {
                warn!(error = %e, "Signing keystore unavailable");
                degraded.push("signing");
            }
        }

        degraded
    }

    /// Current activity counters.
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            file_reads: self.counters.file_reads.load(Ordering::Relaxed),
            peer_validations: self.counters.peer_validations.load(Ordering::Relaxed),
            peer_cache_hits: self.counters.peer_cache_hits.load(Ordering::Relaxed),
            cached_peers: self.peers.iter().filter(|e| e.value().get().is_some()).count(),
            signing_keys: self.signing.iter().filter(|e| e.value().get().is_some()).count(),
        }
    }

    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        self.counters.file_reads.fetch_add(1, Ordering::Relaxed);
        self.source.read(path).map_err(|e| TrustError::io(path, e))
    }

    fn load_certificate(&self, path: &Path, category: impl std::fmt::Display) -> Result<Cert> {
        info!(category = %category, path = %path.display(), "Loading certificate");
        let bytes = self.read(path)?;
        let cert = loader::parse_certificate(&bytes).map_err(|e| {
            error!(category = %category, path = %path.display(), error = %e, "Failed to parse certificate");
            e
        })?;
        info!(category = %category, cert_id = cert.cert_id(), "Certificate loaded");
        Ok(cert)
    }
}

impl std::fmt::Debug for CertificateStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CertificateStore")
            .field("config", &self.config)
            .field("validator", &self.validator)
            .field("stats", &self.stats())
            .finish()
    }
}
