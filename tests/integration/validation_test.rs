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

//! Integration tests for peer certificate validation

use crate::integration::{full_config, MemorySource, Pki, MIDDLE_PATH, OPERATOR_CN, ROOT_PATH};
use gateway_certs::loader::{self, Cert};
use gateway_certs::{
    AnchorRole, CertificateStore, ChainValidator, IdentityPolicy, PathFault, Rejection,
    TrustAnchorSet, TrustConfig, TrustError, ValidationStage,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn store_for(pki: &Pki, config: TrustConfig) -> CertificateStore {
    let source = Arc::new(MemorySource::new());
    source.install(pki);
    CertificateStore::with_source(config, source)
}

fn rejection(result: gateway_certs::Result<Arc<Cert>>) -> Rejection {
    match result {
        Err(TrustError::Rejected(rejection)) => rejection,
        other => panic!("expected a rejection, got {other:?}"),
    }
}

fn anchors(pki: &Pki) -> TrustAnchorSet {
    TrustAnchorSet::new(
        Arc::new(Cert::from_der(pki.root.der()).unwrap()),
        Arc::new(Cert::from_der(pki.intermediate.der()).unwrap()),
    )
}

#[test]
fn test_root_intermediate_leaf_scenario() {
    let pki = Pki::new();
    let store = store_for(&pki, full_config());

    let accepted = store.get_or_validate_peer(&pki.leaf(OPERATOR_CN).pem());
    assert!(accepted.is_ok());

    let expired = store.get_or_validate_peer(&pki.expired_leaf(OPERATOR_CN).pem());
    assert!(matches!(rejection(expired), Rejection::Expired { .. }));

    let other = pki.leaf("041@Z12345678@SomeOtherCompany@00000001");
    assert!(matches!(
        rejection(store.get_or_validate_peer(&other.pem())),
        Rejection::IdentityMismatch { .. }
    ));

    let no_anchors = CertificateStore::with_source(
        TrustConfig::default(),
        Arc::new(MemorySource::new()),
    );
    assert!(matches!(
        rejection(no_anchors.get_or_validate_peer(&pki.leaf(OPERATOR_CN).pem())),
        Rejection::MissingAnchor(_)
    ));
}

#[test]
fn test_operator_certificate_is_accepted() {
    let pki = Pki::new();
    let store = store_for(&pki, full_config());
    let leaf = pki.leaf(OPERATOR_CN);

    let cert = store.get_or_validate_peer(&leaf.pem()).unwrap();

    assert_eq!(cert.der(), leaf.der().as_slice());
    assert_eq!(cert.identity(), "中国银联股份有限公司");
    assert!(cert.subject_dn().ends_with(&format!("CN={OPERATOR_CN}")));
}

#[test]
fn test_verify_and_get_public_key() {
    let pki = Pki::new();
    let store = store_for(&pki, full_config());
    let leaf = pki.leaf(OPERATOR_CN);

    let spki = store.verify_and_get_public_key(&leaf.pem()).unwrap();
    assert_eq!(spki.algorithm.oid.to_string(), "1.2.840.10045.2.1");
    assert_eq!(
        spki.subject_public_key.raw_bytes(),
        leaf.key.public_key_raw()
    );
}

#[test]
fn test_bare_base64_is_accepted() {
    let pki = Pki::new();
    let store = store_for(&pki, full_config());
    let leaf = pki.leaf(OPERATOR_CN);

    let bare = loader::canonical_peer_encoding(&leaf.pem());
    assert!(!bare.contains("BEGIN"));
    assert!(store.get_or_validate_peer(&bare).is_ok());
}

#[test]
fn test_expired_certificate_is_rejected() {
    let pki = Pki::new();
    let store = store_for(&pki, full_config());
    let leaf = pki.expired_leaf(OPERATOR_CN);

    let rejection = rejection(store.get_or_validate_peer(&leaf.pem()));
    assert!(matches!(rejection, Rejection::Expired { .. }));
    assert_eq!(ValidationStage::failed_at(&rejection), ValidationStage::ValidityChecked);
}

#[test]
fn test_expiry_is_reported_before_identity() {
    let pki = Pki::new();
    let store = store_for(&pki, full_config());
    let leaf = pki.expired_leaf("041@Z1@SomeOtherCompany@1");

    let rejection = rejection(store.get_or_validate_peer(&leaf.pem()));
    assert!(matches!(rejection, Rejection::Expired { .. }));
}

#[test]
fn test_expiry_is_reported_regardless_of_chain() {
    let pki = Pki::new();
    let stranger = Pki::named("Stranger Root");
    let store = store_for(&pki, full_config());
    let leaf = stranger.expired_leaf(OPERATOR_CN);

    let rejection = rejection(store.get_or_validate_peer(&leaf.pem()));
    assert!(matches!(rejection, Rejection::Expired { .. }));
}

#[test]
fn test_not_yet_valid_is_expired() {
    let pki = Pki::new();
    let leaf = Cert::from_der(pki.leaf(OPERATOR_CN).der()).unwrap();
    let validator = ChainValidator::new(IdentityPolicy::Strict);

    let before_issue = SystemTime::UNIX_EPOCH + Duration::from_secs(946_684_800); // 2000-01-01
    let err = validator
        .validate_at(&leaf, &anchors(&pki), before_issue)
        .unwrap_err();
    match err {
        Rejection::Expired { not_before, .. } => assert!(not_before > 946_684_800),
        other => panic!("unexpected rejection: {other:?}"),
    }
}

#[test]
fn test_identity_mismatch() {
    let pki = Pki::new();
    let store = store_for(&pki, full_config());
    let leaf = pki.leaf("041@Z1@SomeOtherCompany@00000001");

    let rejection = rejection(store.get_or_validate_peer(&leaf.pem()));
    assert_eq!(
        rejection,
        Rejection::IdentityMismatch {
            identity: "SomeOtherCompany".to_string()
        }
    );
}

#[test]
fn test_cn_without_segments_is_rejected() {
    let pki = Pki::new();
    let store = store_for(&pki, full_config());
    let leaf = pki.leaf("gateway.example.com");

    let rejection = rejection(store.get_or_validate_peer(&leaf.pem()));
    assert_eq!(
        rejection,
        Rejection::IdentityMismatch {
            identity: String::new()
        }
    );
}

#[test]
fn test_sentinel_identity_depends_on_policy() {
    let pki = Pki::new();
    let leaf = pki.leaf("041@Z1@00040000:SIGN@1");

    let strict = store_for(&pki, full_config());
    assert!(matches!(
        rejection(strict.get_or_validate_peer(&leaf.pem())),
        Rejection::IdentityMismatch { .. }
    ));

    let mut config = full_config();
    config.validate_cn_name = false;
    let lenient = store_for(&pki, config);
    assert!(lenient.get_or_validate_peer(&leaf.pem()).is_ok());
}

#[test]
fn test_lenient_policy_still_accepts_operator() {
    let pki = Pki::new();
    let mut config = full_config();
    config.validate_cn_name = false;
    let store = store_for(&pki, config);

    assert!(store.get_or_validate_peer(&pki.leaf(OPERATOR_CN).pem()).is_ok());
    assert!(store
        .get_or_validate_peer(&pki.leaf("041@Z1@SomeOtherCompany@1").pem())
        .is_err());
}

#[test]
fn test_missing_intermediate() {
    let pki = Pki::new();
    let config = TrustConfig::builder().root_cert(ROOT_PATH).build();
    let store = store_for(&pki, config);

    let rejection = rejection(store.get_or_validate_peer(&pki.leaf(OPERATOR_CN).pem()));
    assert_eq!(rejection, Rejection::MissingAnchor(AnchorRole::Intermediate));
}

#[test]
fn test_missing_root_reported_first() {
    let pki = Pki::new();
    let store = store_for(&pki, TrustConfig::default());

    let rejection = rejection(store.get_or_validate_peer(&pki.leaf(OPERATOR_CN).pem()));
    assert_eq!(rejection, Rejection::MissingAnchor(AnchorRole::Root));
}

#[test]
fn test_unreadable_anchor_is_missing() {
    let pki = Pki::new();
    let source = Arc::new(MemorySource::new());
    source.install(&pki);
    source.remove(MIDDLE_PATH);
    let store = CertificateStore::with_source(full_config(), source);

    let rejection = rejection(store.get_or_validate_peer(&pki.leaf(OPERATOR_CN).pem()));
    assert_eq!(rejection, Rejection::MissingAnchor(AnchorRole::Intermediate));
}

#[test]
fn test_foreign_issuer_fails_chain() {
    let pki = Pki::new();
    let stranger = Pki::named("Stranger Root");
    let store = store_for(&pki, full_config());

    let rejection = rejection(store.get_or_validate_peer(&stranger.leaf(OPERATOR_CN).pem()));
    assert!(matches!(
        rejection,
        Rejection::ChainBuildFailure(PathFault::IssuerNotFound(_))
    ));
    assert_eq!(ValidationStage::failed_at(&rejection), ValidationStage::ChainBuilt);
}

#[test]
fn test_same_names_different_keys_fail_signature() {
    // Both PKIs use identical subject names, so only the signature differs
    let pki = Pki::new();
    let impostor = Pki::new();
    let validator = ChainValidator::new(IdentityPolicy::Strict);
    let leaf = Cert::from_der(impostor.leaf(OPERATOR_CN).der()).unwrap();

    let err = validator.validate(&leaf, &anchors(&pki)).unwrap_err();
    assert!(matches!(
        err,
        Rejection::ChainBuildFailure(PathFault::SignatureInvalid(_))
    ));
}

#[test]
fn test_intermediate_without_ca_flag() {
    let pki = Pki::with_non_ca_intermediate();
    let validator = ChainValidator::new(IdentityPolicy::Strict);
    let leaf = Cert::from_der(pki.leaf(OPERATOR_CN).der()).unwrap();

    let err = validator.validate(&leaf, &anchors(&pki)).unwrap_err();
    assert!(matches!(err, Rejection::ChainBuildFailure(PathFault::NotCa(_))));
}

#[test]
fn test_verdict() {
    let pki = Pki::new();
    let validator = ChainValidator::new(IdentityPolicy::Strict);
    let leaf = Cert::from_der(pki.leaf(OPERATOR_CN).der()).unwrap();

    let verdict = validator.validate(&leaf, &anchors(&pki)).unwrap();
    assert_eq!(verdict.identity, "中国银联股份有限公司");
    assert_eq!(verdict.path_len, 3);
}

#[test]
fn test_garbage_is_a_parse_error() {
    let pki = Pki::new();
    let store = store_for(&pki, full_config());

    let err = store.get_or_validate_peer("not a certificate!").unwrap_err();
    assert!(matches!(err, TrustError::Parse(_)));
    assert!(err.is_recoverable());
    assert_eq!(store.stats().cached_peers, 0);
}

#[test]
fn test_self_signed_copy_of_intermediate_subject_is_rejected() {
    let pki = Pki::with_intermediate_name("041@Z1@中国银联股份有限公司@ROOT OCA");
    let validator = ChainValidator::new(IdentityPolicy::Strict);
    let forged = pki.intermediate_lookalike();
    let cert = Cert::from_der(forged.der()).unwrap();
    assert_eq!(cert.identity(), "中国银联股份有限公司");
    assert_eq!(cert.subject_dn(), Cert::from_der(pki.intermediate.der()).unwrap().subject_dn());

    let err = validator.validate(&cert, &anchors(&pki)).unwrap_err();
    assert!(matches!(
        err,
        Rejection::ChainBuildFailure(PathFault::SignatureInvalid(_))
    ));

    let store = store_for(&pki, full_config());
    assert!(matches!(
        rejection(store.get_or_validate_peer(&forged.pem())),
        Rejection::ChainBuildFailure(_)
    ));
    assert_eq!(store.stats().cached_peers, 0);
}

#[test]
fn test_leaf_issued_by_root_directly() {
    let pki = Pki::new();
    let validator = ChainValidator::new(IdentityPolicy::Strict);
    let leaf = pki.leaf_from_root(OPERATOR_CN);
    let cert = Cert::from_der(leaf.der()).unwrap();

    let verdict = validator.validate(&cert, &anchors(&pki)).unwrap();
    assert_eq!(verdict.path_len, 2);

    let store = store_for(&pki, full_config());
    assert!(store.get_or_validate_peer(&leaf.pem()).is_ok());
}
