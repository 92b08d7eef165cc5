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

//! Integration tests for signing keystores

use crate::integration::{
    encrypted_keystore, full_config, plain_keystore, MemorySource, Pki, OPERATOR_CN, SIGN_PASSWORD,
    SIGN_PATH,
};
use gateway_certs::loader::parse_key_store;
use gateway_certs::{CertificateStore, ParseError, TrustConfig, TrustError};
use pkcs8::PrivateKeyInfo;
use std::sync::Arc;

fn setup(pki: &Pki) -> (Arc<MemorySource>, CertificateStore) {
    let source = Arc::new(MemorySource::new());
    source.install(pki);
    let store = CertificateStore::with_source(full_config(), source.clone());
    (source, store)
}

#[test]
fn test_default_signing_key() {
    let pki = Pki::new();
    let (_source, store) = setup(&pki);

    let keyed = store.default_signing_key().unwrap();
    assert_eq!(keyed.cert_id(), "258");
    assert!(keyed.has_private_key());
    assert_eq!(keyed.chain().len(), 1);
    assert_eq!(keyed.chain()[0].der(), pki.intermediate.der().as_slice());

    let key_der = keyed.private_key_der().unwrap();
    assert!(PrivateKeyInfo::try_from(key_der).is_ok());
}

#[test]
fn test_signing_cert_id() {
    let pki = Pki::new();
    let (_source, store) = setup(&pki);
    assert_eq!(store.signing_cert_id(SIGN_PATH, SIGN_PASSWORD).unwrap(), "258");
}

#[test]
fn test_signing_key_is_cached_per_path() {
    let pki = Pki::new();
    let (source, store) = setup(&pki);
    let other = pki.leaf_with_serial(OPERATOR_CN, &[0x30, 0x39]);
    source.insert("/certs/other_sign.pem", encrypted_keystore(&other, "111111", &[]));

    let first = store.signing_key(SIGN_PATH, SIGN_PASSWORD).unwrap();
    let again = store.default_signing_key().unwrap();
    assert!(Arc::ptr_eq(&first, &again));
    assert_eq!(source.reads(), 1);

    let second = store.signing_key("/certs/other_sign.pem", "111111").unwrap();
    assert_eq!(second.cert_id(), "12345");
    assert_eq!(store.stats().signing_keys, 2);
    assert_eq!(source.reads(), 2);
}

#[test]
fn test_wrong_passphrase() {
    let pki = Pki::new();
    let (_source, store) = setup(&pki);

    let err = store.signing_key(SIGN_PATH, "123456").unwrap_err();
    assert!(matches!(
        err,
        TrustError::Parse(ParseError::PassphraseMismatch)
    ));
    assert_eq!(store.stats().signing_keys, 0);
}

#[test]
fn test_failed_signing_load_is_not_memoized() {
    let pki = Pki::new();
    let (source, store) = setup(&pki);

    assert!(store.signing_key(SIGN_PATH, "123456").is_err());
    let keyed = store.signing_key(SIGN_PATH, SIGN_PASSWORD).unwrap();
    assert_eq!(keyed.cert_id(), "258");
    assert_eq!(source.reads(), 2);
}

#[test]
fn test_keystore_without_key() {
    let pki = Pki::new();
    let leaf = pki.leaf(OPERATOR_CN);

    let err = parse_key_store(leaf.pem().as_bytes(), SIGN_PASSWORD).unwrap_err();
    assert_eq!(err, ParseError::MissingKeyEntry);
}

#[test]
fn test_plain_keystore_requires_empty_passphrase() {
    let pki = Pki::new();
    let leaf = pki.leaf_with_serial(OPERATOR_CN, &[0x07]);
    let bundle = plain_keystore(&leaf);

    let keyed = parse_key_store(bundle.as_bytes(), "").unwrap();
    assert_eq!(keyed.cert_id(), "7");
    assert!(keyed.chain().is_empty());

    assert_eq!(
        parse_key_store(bundle.as_bytes(), SIGN_PASSWORD).unwrap_err(),
        ParseError::PassphraseMismatch
    );
}

#[test]
fn test_binary_keystore_is_malformed() {
    let pki = Pki::new();
    let leaf = pki.leaf(OPERATOR_CN);

    let err = parse_key_store(&leaf.der(), SIGN_PASSWORD).unwrap_err();
    assert!(matches!(err, ParseError::MalformedEncoding(_)));
}

#[test]
fn test_signing_key_not_configured() {
    let store = CertificateStore::with_source(TrustConfig::default(), Arc::new(MemorySource::new()));
    assert!(matches!(
        store.default_signing_key(),
        Err(TrustError::ConfigurationMissing(_))
    ));
}

#[test]
fn test_debug_hides_private_key() {
    let pki = Pki::new();
    let (_source, store) = setup(&pki);
    let keyed = store.default_signing_key().unwrap();
    let debug = format!("{keyed:?}");
    assert!(debug.contains("private_key: true"));
    assert!(!debug.contains("ENCRYPTED"));
}
