//! Change fingerprint of a serialized dictionary payload.

use std::fmt;

/// Opaque marker used to skip redundant reloads.
///
/// Either a BLAKE3 digest of the raw payload bytes or a transport validator
/// (`ETag`). Equal fingerprints imply equal dictionaries.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Digest of the raw payload bytes.
    #[must_use]
    pub fn of_payload(payload: &[u8]) -> Self {
        Self(blake3::hash(payload).to_hex().to_string())
    }

    /// Wraps a validator returned by the remote endpoint.
    ///
    /// Returns `None` for a blank validator.
    #[must_use]
    pub fn from_validator(validator: &str) -> Option<Self> {
        let trimmed = validator.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
