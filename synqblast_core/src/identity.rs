//! Player identity.
//!
//! An [`Address`] is the account a player deploys and triggers reactors
//! with. Comparisons are case-insensitive, so addresses are normalised to
//! lowercase `0x`-prefixed hex on construction.

use ed25519_dalek::{SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use synqblast_env::SynqContext;
use thiserror::Error;

const ADDRESS_BYTES: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid address {0:?}: expected 0x followed by 40 hex digits")]
pub struct AddressError(pub String);

/// A normalised account address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    pub fn parse(raw: &str) -> Result<Self, AddressError> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| AddressError(raw.to_string()))?;

        if digits.len() != ADDRESS_BYTES * 2 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(AddressError(raw.to_string()));
        }
        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    /// Derives an address from the first 20 bytes of a verifying key.
    pub fn from_verifying_key(key: &VerifyingKey) -> Self {
        let hex: String = key.as_bytes()[..ADDRESS_BYTES]
            .iter()
            .map(|b| format!("{:02x}", b))
            .collect();
        Self(format!("0x{}", hex))
    }

    pub fn from_signing_key(key: &SigningKey) -> Self {
        Self::from_verifying_key(&key.verifying_key())
    }

    /// The address of the `index`-th player key the context derives. Seeded
    /// contexts give the same players on every run.
    pub fn derive<Ctx: SynqContext>(context: &Ctx, index: u64) -> Self {
        Self::from_signing_key(&context.derive_signing_key(index))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = AddressError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}
