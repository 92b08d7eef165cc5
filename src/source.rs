// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Byte sources for certificate and keystore material.
//!
//! The store never opens files itself. It asks a [`CertSource`] for raw bytes
//! and for the list of verification certificates in a directory, so tests can
//! substitute an in-memory source and count reads.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// File extension of verification certificates in the verification directory.
pub const VERIFICATION_CERT_EXTENSION: &str = "cer";

/// Supplies raw certificate and keystore bytes.
pub trait CertSource: Send + Sync {
    /// Read the complete contents of `path`.
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// List verification certificate files (`*.cer`) directly inside `dir`.
    fn list_certificates(&self, dir: &Path) -> io::Result<Vec<PathBuf>>;
}

/// [`CertSource`] backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsSource;

impl CertSource for FsSource {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn list_certificates(&self, dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && has_certificate_extension(&path) {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }
}

/// Returns true if `path` ends in `.cer`, ignoring case.
pub fn has_certificate_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(VERIFICATION_CERT_EXTENSION))
}
