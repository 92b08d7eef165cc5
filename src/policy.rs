// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 U.S. Federal Government (in countries where recognized)

//! Identity policy.
//!
//! Decides whether an identity token extracted from a peer certificate names
//! the gateway operator. The mode is fixed at startup from configuration.

/// Organization name the operator's certificates carry as identity token.
pub const OPERATOR_ORGANIZATION: &str = "中国银联股份有限公司";

/// Alternate identity accepted only in lenient mode.
pub const SENTINEL_IDENTITY: &str = "00040000:SIGN";

/// Identity match rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentityPolicy {
    /// Only [`OPERATOR_ORGANIZATION`] is accepted.
    #[default]
    Strict,
    /// [`OPERATOR_ORGANIZATION`] or [`SENTINEL_IDENTITY`] is accepted.
    LenientWithSentinel,
}

impl IdentityPolicy {
    /// Map the `validate_cn_name` configuration flag onto a policy.
    ///
    /// `true` selects [`IdentityPolicy::Strict`].
    pub fn from_validate_cn_name(validate: bool) -> Self {
        if validate {
            Self::Strict
        } else {
            Self::LenientWithSentinel
        }
    }

    /// Returns true if `identity` is acceptable under this policy.
    pub fn accepts(self, identity: &str) -> bool {
        accepts(identity, self)
    }
}

/// Returns true if `identity` is acceptable under `policy`.
pub fn accepts(identity: &str, policy: IdentityPolicy) -> bool {
    match policy {
        IdentityPolicy::Strict => identity == OPERATOR_ORGANIZATION,
        IdentityPolicy::LenientWithSentinel => {
            identity == OPERATOR_ORGANIZATION || identity == SENTINEL_IDENTITY
        }
    }
}
