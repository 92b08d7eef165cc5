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

//! Trust chain validation for peer certificates.
//!
//! Peer certificates are issued under a fixed two-tier authority: a
//! self-signed root and a single intermediate. The validator only knows this
//! topology ([`ChainTopology`]); it does not build arbitrary-depth paths.
//!
//! A validation attempt moves through the stages of [`ValidationStage`]:
//!
//! 1. both anchors must be present,
//! 2. the leaf must be inside its validity window,
//! 3. a path leaf → intermediate → root must build, with signatures and CA
//!    constraints checked (revocation is not checked),
//! 4. the subject identity must satisfy the [`IdentityPolicy`].
//!
//! The first failing stage determines the [`Rejection`].
//!
//! # Example
//!
//! ```no_run
//! use gateway_certs::validation::{ChainValidator, TrustAnchorSet};
//! use gateway_certs::policy::IdentityPolicy;
//! # use gateway_certs::loader::Cert;
//!
//! # fn example(leaf: &Cert, anchors: &TrustAnchorSet) {
//! let validator = ChainValidator::new(IdentityPolicy::Strict);
//! match validator.validate(leaf, anchors) {
//!     Ok(verdict) => println!("trusted: {}", verdict.identity),
//!     Err(rejection) => println!("rejected: {rejection}"),
//! }
//! # }
//! ```

use crate::error::{AnchorRole, PathFault, Rejection};
use crate::loader::{unix_seconds, Cert};
use crate::policy::IdentityPolicy;
use const_oid::db::rfc5280::{ID_CE_BASIC_CONSTRAINTS, ID_CE_KEY_USAGE};
use const_oid::db::rfc5912::{
    ECDSA_WITH_SHA_256, ECDSA_WITH_SHA_384, SHA_256_WITH_RSA_ENCRYPTION,
    SHA_384_WITH_RSA_ENCRYPTION, SHA_512_WITH_RSA_ENCRYPTION,
};
use const_oid::{AssociatedOid, ObjectIdentifier};
use der::{Decode, Encode};
use p256::ecdsa::signature::Verifier;
use rsa::pkcs8::DecodePublicKey;
use rsa::RsaPublicKey;
use sha2::{Digest, Sha256, Sha384, Sha512};
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;
use tracing::{debug, warn};
use x509_cert::ext::pkix::{BasicConstraints, KeyUsage, KeyUsages};

/// Certificates below the anchor in the longest path the topology allows.
const MAX_PATH_CERTS: usize = 2;

/// Stages of a single validation attempt, in the order they are passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ValidationStage {
    /// Nothing checked yet.
    Start,
    /// Root and intermediate are present.
    AnchorsChecked,
    /// The leaf is inside its validity window.
    ValidityChecked,
    /// A path to the root was built.
    ChainBuilt,
    /// The subject identity satisfied the policy.
    IdentityChecked,
    /// The leaf is trusted.
    Accepted,
}

impl ValidationStage {
    /// The stage a rejected attempt failed to reach.
    pub fn failed_at(rejection: &Rejection) -> Self {
        match rejection {
            Rejection::MissingAnchor(_) => Self::AnchorsChecked,
            Rejection::Expired { .. } => Self::ValidityChecked,
            Rejection::ChainBuildFailure(_) => Self::ChainBuilt,
            Rejection::IdentityMismatch { .. } => Self::IdentityChecked,
        }
    }
}

impl fmt::Display for ValidationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::AnchorsChecked => "anchors-checked",
            Self::ValidityChecked => "validity-checked",
            Self::ChainBuilt => "chain-built",
            Self::IdentityChecked => "identity-checked",
            Self::Accepted => "accepted",
        };
        f.write_str(name)
    }
}

/// The trusted root and intermediate, each absent until configured.
#[derive(Debug, Clone, Default)]
pub struct TrustAnchorSet {
    /// Self-signed root certificate, the sole trust anchor.
    pub root: Option<Arc<Cert>>,
    /// Intermediate CA certificate.
    pub intermediate: Option<Arc<Cert>>,
}

impl TrustAnchorSet {
    /// Create an anchor set with both certificates present.
    pub fn new(root: Arc<Cert>, intermediate: Arc<Cert>) -> Self {
        Self {
            root: Some(root),
            intermediate: Some(intermediate),
        }
    }

    /// Returns true if both anchors are loaded.
    pub fn is_complete(&self) -> bool {
        self.root.is_some() && self.intermediate.is_some()
    }

    /// Arrange the anchors and a leaf into the fixed topology.
    ///
    /// Fails with [`Rejection::MissingAnchor`] naming the first absent role.
    pub fn topology<'a>(&'a self, leaf: &'a Cert) -> Result<ChainTopology<'a>, Rejection> {
        let root = self
            .root
            .as_deref()
            .ok_or(Rejection::MissingAnchor(AnchorRole::Root))?;
        let intermediate = self
            .intermediate
            .as_deref()
            .ok_or(Rejection::MissingAnchor(AnchorRole::Intermediate))?;
        Ok(ChainTopology {
            root,
            intermediate,
            leaf,
        })
    }
}

/// The three certificate roles the gateway protocol defines.
#[derive(Debug, Clone, Copy)]
pub struct ChainTopology<'a> {
    /// Trust anchor.
    pub root: &'a Cert,
    /// Candidate issuer of the leaf.
    pub intermediate: &'a Cert,
    /// Certificate under validation, also the path target.
    pub leaf: &'a Cert,
}

/// Outcome of a successful validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Identity token the policy accepted.
    pub identity: String,
    /// Number of certificates in the built path, anchor included.
    pub path_len: usize,
}

/// Validates peer certificates against the configured anchors and policy.
#[derive(Debug, Clone, Copy)]
pub struct ChainValidator {
    policy: IdentityPolicy,
}

impl ChainValidator {
    /// Create a validator applying `policy` at the identity stage.
    pub fn new(policy: IdentityPolicy) -> Self {
        Self { policy }
    }

    /// The identity policy in force.
    pub fn policy(&self) -> IdentityPolicy {
        self.policy
    }

    /// Validate `leaf` at the current time.
    pub fn validate(&self, leaf: &Cert, anchors: &TrustAnchorSet) -> Result<Verdict, Rejection> {
        self.validate_at(leaf, anchors, SystemTime::now())
    }

    /// Validate `leaf` as of `now`.
    pub fn validate_at(
        &self,
        leaf: &Cert,
        anchors: &TrustAnchorSet,
        now: SystemTime,
    ) -> Result<Verdict, Rejection> {
        let result = self.run_stages(leaf, anchors, now);
        if let Err(rejection) = &result {
            warn!(
                cert_id = leaf.cert_id(),
                stage = %ValidationStage::failed_at(rejection),
                reason = %rejection,
                "Certificate validation failed"
            );
        }
        result
    }

    fn run_stages(
        &self,
        leaf: &Cert,
        anchors: &TrustAnchorSet,
        now: SystemTime,
    ) -> Result<Verdict, Rejection> {
        debug!(cert_id = leaf.cert_id(), stage = %ValidationStage::Start, "Validating certificate");

        let topology = anchors.topology(leaf)?;
        debug!(stage = %ValidationStage::AnchorsChecked, "Trust anchors present");

        if !leaf.is_valid_at(now) {
            return Err(Rejection::Expired {
                not_before: unix_seconds(leaf.not_before()),
                not_after: unix_seconds(leaf.not_after()),
            });
        }
        debug!(stage = %ValidationStage::ValidityChecked, "Leaf inside validity window");

        let path = build_path(&topology, now).map_err(Rejection::ChainBuildFailure)?;
        debug!(
            stage = %ValidationStage::ChainBuilt,
            path_len = path.len() + 1,
            "Certificate path built"
        );

        let identity = leaf.identity();
        if !self.policy.accepts(&identity) {
            return Err(Rejection::IdentityMismatch { identity });
        }
        debug!(stage = %ValidationStage::IdentityChecked, identity = %identity, "Identity accepted");

        Ok(Verdict {
            identity,
            path_len: path.len() + 1,
        })
    }
}

/// Build a path from the leaf to the root.
///
/// The root is the sole trust anchor and the intermediate the only candidate
/// issuer. The path always starts at the presented leaf.
/// Returns the non-anchor part of the path, leaf first.
fn build_path<'a>(topology: &ChainTopology<'a>, now: SystemTime) -> Result<Vec<&'a Cert>, PathFault> {
    let candidates = [topology.intermediate];
    let root = topology.root;

    let mut path = vec![topology.leaf];
    let mut current = topology.leaf;
    loop {
        let issuer_name = &current.certificate().tbs_certificate.issuer;

        if issuer_name == &root.certificate().tbs_certificate.subject {
            verify_signature(current, root)?;
            return Ok(path);
        }

        if path.len() >= MAX_PATH_CERTS {
            return Err(PathFault::TooLong);
        }

        let issuer = candidates
            .iter()
            .copied()
            .filter(|c| !path.iter().any(|p| p == c))
            .find(|c| &c.certificate().tbs_certificate.subject == issuer_name)
            .ok_or_else(|| PathFault::IssuerNotFound(current.subject_dn()))?;

        check_issuing_ca(issuer, path.len() - 1, now)?;
        verify_signature(current, issuer)?;
        path.push(issuer);
        current = issuer;
    }
}

/// Check that a non-anchor certificate may issue the one below it.
///
/// `cas_below` counts the intermediate CAs between `ca` and the target.
fn check_issuing_ca(ca: &Cert, cas_below: usize, now: SystemTime) -> Result<(), PathFault> {
    let constraints = find_extension(ca, ID_CE_BASIC_CONSTRAINTS)
        .and_then(|bytes| BasicConstraints::from_der(bytes).ok())
        .ok_or_else(|| PathFault::NotCa(ca.subject_dn()))?;
    if !constraints.ca {
        return Err(PathFault::NotCa(ca.subject_dn()));
    }
    if let Some(limit) = constraints.path_len_constraint {
        if cas_below > usize::from(limit) {
            return Err(PathFault::PathLenExceeded(ca.subject_dn()));
        }
    }

    if let Some(bytes) = find_extension(ca, ID_CE_KEY_USAGE) {
        let usage = KeyUsage::from_der(bytes)
            .map_err(|_| PathFault::MissingKeyCertSign(ca.subject_dn()))?;
        if !usage.0.contains(KeyUsages::KeyCertSign) {
            return Err(PathFault::MissingKeyCertSign(ca.subject_dn()));
        }
    }

    if !ca.is_valid_at(now) {
        return Err(PathFault::CaNotValid(ca.subject_dn()));
    }
    Ok(())
}

fn find_extension(cert: &Cert, oid: ObjectIdentifier) -> Option<&[u8]> {
    cert.certificate()
        .tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == oid)
        .map(|ext| ext.extn_value.as_bytes())
}

/// Verify the signature on `cert` with the public key of `issuer`.
fn verify_signature(cert: &Cert, issuer: &Cert) -> Result<(), PathFault> {
    let tbs = cert
        .certificate()
        .tbs_certificate
        .to_der()
        .map_err(|e| PathFault::SignatureInvalid(format!("{}: {e}", cert.subject_dn())))?;
    let signature = cert.certificate().signature.raw_bytes();
    let alg = cert.certificate().signature_algorithm.oid;

    let verified = if alg == SHA_256_WITH_RSA_ENCRYPTION {
        verify_rsa::<Sha256>(issuer, &tbs, signature)?
    } else if alg == SHA_384_WITH_RSA_ENCRYPTION {
        verify_rsa::<Sha384>(issuer, &tbs, signature)?
    } else if alg == SHA_512_WITH_RSA_ENCRYPTION {
        verify_rsa::<Sha512>(issuer, &tbs, signature)?
    } else if alg == ECDSA_WITH_SHA_256 {
        let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(ec_point(issuer)?)
            .map_err(|e| PathFault::MalformedKey(e.to_string()))?;
        p256::ecdsa::Signature::from_der(signature)
            .map(|sig| key.verify(&tbs, &sig).is_ok())
            .unwrap_or(false)
    } else if alg == ECDSA_WITH_SHA_384 {
        let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(ec_point(issuer)?)
            .map_err(|e| PathFault::MalformedKey(e.to_string()))?;
        p384::ecdsa::Signature::from_der(signature)
            .map(|sig| key.verify(&tbs, &sig).is_ok())
            .unwrap_or(false)
    } else {
        return Err(PathFault::UnsupportedAlgorithm(alg.to_string()));
    };

    if verified {
        Ok(())
    } else {
        Err(PathFault::SignatureInvalid(cert.subject_dn()))
    }
}

fn verify_rsa<D>(issuer: &Cert, msg: &[u8], signature: &[u8]) -> Result<bool, PathFault>
where
    D: Digest + AssociatedOid,
{
    let spki = issuer
        .public_key()
        .to_der()
        .map_err(|e| PathFault::MalformedKey(e.to_string()))?;
    let key = RsaPublicKey::from_public_key_der(&spki)
        .map_err(|e| PathFault::MalformedKey(e.to_string()))?;
    let key = rsa::pkcs1v15::VerifyingKey::<D>::new(key);
    Ok(rsa::pkcs1v15::Signature::try_from(signature)
        .map(|sig| key.verify(msg, &sig).is_ok())
        .unwrap_or(false))
}

fn ec_point(issuer: &Cert) -> Result<&[u8], PathFault> {
    issuer
        .public_key()
        .subject_public_key
        .as_bytes()
        .ok_or_else(|| PathFault::MalformedKey("public key has unused bits".to_string()))
}
