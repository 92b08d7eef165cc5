// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Subject identity extraction.
//!
//! The gateway operator encodes the certificate owner inside the subject
//! Common Name as `@`-delimited segments, for example
//! `CN=041@Z12345678@中国银联股份有限公司@00000001`. The owner is the third
//! segment. This is a fixed vendor convention, not a general DN parser.

use der::asn1::ObjectIdentifier;
use der::{Tag, Tagged};
use x509_cert::name::Name;

const CN_MARKER: &str = "CN=";
const SEGMENT_DELIMITER: char = '@';
const IDENTITY_SEGMENT: usize = 2;

/// Extract the organizational identity token from a DN string.
///
/// Takes the text from the first `CN=` onwards, splits it on `@` and returns
/// segment index 2. A DN without `CN=` or with fewer than three segments
/// yields an empty string.
pub fn extract_identity(dn: &str) -> String {
    let Some(start) = dn.find(CN_MARKER) else {
        return String::new();
    };

    dn[start..]
        .split(SEGMENT_DELIMITER)
        .nth(IDENTITY_SEGMENT)
        .map(str::to_owned)
        .unwrap_or_default()
}

/// Format a Distinguished Name in encoding order, `C=CN,O=...,CN=...`.
///
/// Attribute values are escaped per RFC 4514. Values that are not strings are
/// rendered as `#` followed by the hex of their content octets.
pub fn format_dn(name: &Name) -> String {
    const CN: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
    const SN: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");
    const C: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
    const L: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
    const ST: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
    const STREET: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.9");
    const O: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
    const OU: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.11");
    const E: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.9.1");

    let mut rdns = Vec::new();
    for rdn in name.0.iter() {
        let mut atvs = Vec::new();
        for atv in rdn.0.iter() {
            let oid = atv.oid;
            let key = if oid == CN {
                "CN".to_string()
            } else if oid == SN {
                "SERIALNUMBER".to_string()
            } else if oid == C {
                "C".to_string()
            } else if oid == L {
                "L".to_string()
            } else if oid == ST {
                "ST".to_string()
            } else if oid == STREET {
                "STREET".to_string()
            } else if oid == O {
                "O".to_string()
            } else if oid == OU {
                "OU".to_string()
            } else if oid == E {
                "E".to_string()
            } else {
                oid.to_string()
            };

            let value = match attribute_text(atv.value.tag(), atv.value.value()) {
                Some(text) => escape_value(&text),
                None => format!("#{}", hex(atv.value.value())),
            };
            atvs.push(format!("{key}={value}"));
        }
        rdns.push(atvs.join("+"));
    }

    rdns.join(",")
}

fn attribute_text(tag: Tag, bytes: &[u8]) -> Option<String> {
    match tag {
        Tag::Utf8String
        | Tag::PrintableString
        | Tag::Ia5String
        | Tag::TeletexString
        | Tag::VisibleString => std::str::from_utf8(bytes).ok().map(str::to_owned),
        Tag::BmpString => {
            if bytes.len() % 2 != 0 {
                return None;
            }
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
                .collect();
            String::from_utf16(&units).ok()
        }
        _ => None,
    }
}

fn escape_value(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let last = value.chars().count().saturating_sub(1);
    for (i, c) in value.chars().enumerate() {
        match c {
            ',' | '+' | '"' | '\\' | '<' | '>' | ';' | '=' => {
                out.push('\\');
                out.push(c);
            }
            '#' if i == 0 => out.push_str("\\#"),
            ' ' if i == 0 || i == last => out.push_str("\\ "),
            _ => out.push(c),
        }
    }
    out
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}
