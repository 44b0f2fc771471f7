use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::UnresolvedDigest;

const DIGEST_HEX_LEN: usize = 64;
const SHA256_ALGORITHM: &str = "sha256";

/// Hex-encoded SHA-256 digest of an artifact, stored lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sha256Digest(String);

impl Sha256Digest {
    /// Digest of the raw bytes.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Self(hex::encode(hasher.finalize()))
    }

    /// Parse a host-provided `algorithm:hex` digest.
    ///
    /// Only `sha256` is accepted. A value that is itself prefixed again
    /// (`sha256:sha256:...`) is rejected rather than stripped twice.
    pub fn parse_prefixed(raw: &str) -> Result<Self, UnresolvedDigest> {
        let (algorithm, value) = raw
            .split_once(':')
            .ok_or_else(|| UnresolvedDigest::Malformed {
                raw: raw.to_string(),
            })?;
        if algorithm.is_empty() || value.is_empty() {
            return Err(UnresolvedDigest::Malformed {
                raw: raw.to_string(),
            });
        }
        if algorithm != SHA256_ALGORITHM {
            return Err(UnresolvedDigest::UnsupportedAlgorithm {
                algorithm: algorithm.to_string(),
            });
        }
        if value.contains(':') {
            return Err(UnresolvedDigest::Malformed {
                raw: raw.to_string(),
            });
        }
        Self::try_from(value).map_err(|_| UnresolvedDigest::Malformed {
            raw: raw.to_string(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for Sha256Digest {
    type Error = InvalidDigest;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.len() != DIGEST_HEX_LEN {
            return Err(InvalidDigest(format!(
                "expected {DIGEST_HEX_LEN} hex characters, got {}",
                value.len()
            )));
        }
        if let Some(bad) = value.chars().find(|c| !c.is_ascii_hexdigit()) {
            return Err(InvalidDigest(format!("non-hex character '{bad}'")));
        }
        Ok(Self(value.to_ascii_lowercase()))
    }
}

impl TryFrom<String> for Sha256Digest {
    type Error = InvalidDigest;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl From<Sha256Digest> for String {
    fn from(value: Sha256Digest) -> Self {
        value.0
    }
}

impl fmt::Display for Sha256Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A digest string that is not 64 hexadecimal characters.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid SHA-256 digest: {0}")]
pub struct InvalidDigest(String);
