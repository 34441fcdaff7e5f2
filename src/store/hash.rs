// src/store/hash.rs

use std::fmt;
use std::str::FromStr;

use blake3::Hasher;
use serde::{Deserialize, Serialize};
use thiserror::Error;

const HEX_LEN: usize = 2 * blake3::OUT_LEN;

/// Content address of a stored model: lowercase hex blake3 digest of its
/// canonical serialization.
///
/// Deserialized values are checked, so a damaged catalog cannot address
/// paths outside the store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModelHash(String);

#[derive(Debug, Error)]
#[error("invalid model hash '{0}': expected {HEX_LEN} lowercase hex digits")]
pub struct InvalidModelHash(String);

impl ModelHash {
    /// Hash a canonical serialization.
    pub fn of(bytes: &[u8]) -> Self {
        let mut hasher = Hasher::new();
        hasher.update(bytes);
        ModelHash(hasher.finalize().to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Split into the directory prefix and the remainder used as file stem.
    pub fn shard(&self) -> (&str, &str) {
        self.0.split_at(2)
    }
}

impl TryFrom<String> for ModelHash {
    type Error = InvalidModelHash;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let well_formed = value.len() == HEX_LEN
            && value.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if well_formed {
            Ok(ModelHash(value))
        } else {
            Err(InvalidModelHash(value))
        }
    }
}

impl FromStr for ModelHash {
    type Err = InvalidModelHash;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelHash::try_from(s.to_string())
    }
}

impl From<ModelHash> for String {
    fn from(hash: ModelHash) -> Self {
        hash.0
    }
}

impl fmt::Display for ModelHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
