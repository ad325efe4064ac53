//! Carrier-privilege access rules.
//!
//! A rule matches an application by signing-certificate digest and,
//! optionally, by package name. Rules arrive from three sources (SIM,
//! carrier config, test override) as hex-encoded strings of the form
//! `DIGEST` or `DIGEST:package.name`.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

/// Failure decoding one encoded access rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RuleParseError {
    /// The encoded rule was empty.
    #[error("empty access rule")]
    Empty,

    /// The certificate digest was not valid hex.
    #[error("invalid certificate digest hex: {digest}")]
    BadDigest {
        /// The offending digest text.
        digest: String,
    },
}

/// One (certificate digest, package-name pattern) matcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessRule {
    /// Signing-certificate digest this rule matches.
    pub certificate_hash: Vec<u8>,
    /// Package-name restriction; `None` matches any package.
    pub package_name: Option<String>,
}

impl AccessRule {
    #[must_use]
    pub fn new(certificate_hash: Vec<u8>, package_name: Option<String>) -> Self {
        Self {
            certificate_hash,
            package_name,
        }
    }

    /// Decodes a `DIGEST` or `DIGEST:package.name` rule string.
    pub fn decode(encoded: &str) -> Result<Self, RuleParseError> {
        let encoded = encoded.trim();
        if encoded.is_empty() {
            return Err(RuleParseError::Empty);
        }
        let (digest, package) = match encoded.split_once(':') {
            Some((digest, package)) => (digest, Some(package.to_string())),
            None => (encoded, None),
        };
        let certificate_hash = hex::decode(digest).map_err(|_| RuleParseError::BadDigest {
            digest: digest.to_string(),
        })?;
        if certificate_hash.is_empty() {
            return Err(RuleParseError::Empty);
        }
        Ok(Self::new(certificate_hash, package))
    }

    /// Decodes a rule list, skipping malformed entries.
    ///
    /// Malformed rule data fails closed: a bad entry can never grant
    /// access and never blocks evaluation of the remaining rules.
    #[must_use]
    pub fn decode_list(encoded: &[String]) -> Vec<Self> {
        encoded
            .iter()
            .filter_map(|entry| match Self::decode(entry) {
                Ok(rule) => Some(rule),
                Err(err) => {
                    warn!(%err, "skipping malformed access rule");
                    None
                }
            })
            .collect()
    }

    /// Tests a certificate digest (uppercase hex) and package name
    /// against this rule.
    #[must_use]
    pub fn matches(&self, cert_hash_hex: &str, package: &str) -> bool {
        if let Some(required) = &self.package_name {
            if required != package {
                return false;
            }
        }
        hex::encode_upper(&self.certificate_hash) == cert_hash_hex.to_uppercase()
    }
}

/// Uppercase hex SHA-256 digest of a DER-encoded signing certificate.
#[must_use]
pub fn cert_hash_hex(certificate_der: &[u8]) -> String {
    hex::encode_upper(Sha256::digest(certificate_der))
}
