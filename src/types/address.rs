//! Caller identities.
//!
//! Every caller of the ledger (hosts, depositors, exchanges) is identified by
//! a 20-byte [`Address`]. Inside the ledger the address is opaque; the
//! order-matching bridge derives it from a secp256k1 verifying key the same
//! way EVM chains do (last 20 bytes of the Keccak-256 hash of the
//! uncompressed public key).

use std::fmt;
use std::str::FromStr;

use k256::ecdsa::VerifyingKey;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha3::{Digest, Keccak256};

use crate::error::PartyError;

/// Length of an address in bytes
pub const ADDRESS_LEN: usize = 20;

/// An opaque, unforgeable caller identity.
///
/// ## Example
///
/// ```
/// use block_parties::types::Address;
///
/// let a: Address = "0x5206e78b21ce315ce284fb24cf05e0585a93b1d9".parse().unwrap();
/// assert_eq!(a.to_string(), "0x5206e78b21ce315ce284fb24cf05e0585a93b1d9");
/// assert!(!a.is_zero());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; ADDRESS_LEN]);

impl Address {
    /// The all-zero address. Used as "any taker" in orders.
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    /// Build an address from raw bytes
    pub const fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Self(bytes)
    }

    /// Convenience constructor for tests and demos: every byte set to `b`.
    pub const fn repeat(b: u8) -> Self {
        Self([b; ADDRESS_LEN])
    }

    /// Derive the address of a secp256k1 verifying key
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let point = key.to_encoded_point(false);
        // Skip the 0x04 SEC1 tag
        let digest = Keccak256::digest(&point.as_bytes()[1..]);

        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[32 - ADDRESS_LEN..]);
        Self(bytes)
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_LEN] {
        &self.0
    }

    /// True for the zero address
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = PartyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let stripped = s.strip_prefix("0x").unwrap_or(s);
        let raw = hex::decode(stripped)
            .map_err(|e| PartyError::Config(format!("invalid address {s:?}: {e}")))?;

        let bytes: [u8; ADDRESS_LEN] = raw.try_into().map_err(|raw: Vec<u8>| {
            PartyError::Config(format!(
                "invalid address {s:?}: expected {ADDRESS_LEN} bytes, got {}",
                raw.len()
            ))
        })?;
        Ok(Self(bytes))
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
