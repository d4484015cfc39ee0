use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::ops::Deref;
use std::str::FromStr;
use thiserror::Error;

/// Length of an account or contract address in bytes
pub const ADDRESS_LEN: usize = 20;

// Address identifies an account or a contract instance on the chain.
// It is 20 bytes long and printed as 0x-prefixed lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address([u8; ADDRESS_LEN]);

/// Errors produced when parsing an address from text
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("invalid address length: expected 40 hex characters, got {0}")]
    Length(usize),

    #[error("invalid hex in address: {0}")]
    Hex(String),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        if digits.len() != ADDRESS_LEN * 2 {
            return Err(AddressParseError::Length(digits.len()));
        }

        let mut bytes = [0u8; ADDRESS_LEN];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| AddressParseError::Hex(e.to_string()))?;
        Ok(Address(bytes))
    }
}

impl Deref for Address {
    type Target = [u8; ADDRESS_LEN];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_string())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            struct AddressVisitor;

            impl<'de> Visitor<'de> for AddressVisitor {
                type Value = Address;

                fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str("a 0x-prefixed 20 byte hex address")
                }

                fn visit_str<E: de::Error>(self, v: &str) -> Result<Address, E> {
                    v.parse().map_err(E::custom)
                }
            }

            deserializer.deserialize_str(AddressVisitor)
        } else {
            <[u8; ADDRESS_LEN]>::deserialize(deserializer).map(Address)
        }
    }
}

impl Address {
    /// The zero address, used as the counterparty of mints and burns
    pub const ZERO: Address = Address([0u8; ADDRESS_LEN]);

    pub fn new(bytes: [u8; ADDRESS_LEN]) -> Self {
        Address(bytes)
    }

    /// Get a reference to the internal bytes
    pub fn bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_LEN]
    }

    /// Derive an address from a list of seeds.
    ///
    /// The seeds are hashed with SHA-256 behind a domain separator and the
    /// first 20 bytes of the digest become the address.
    pub fn derive(seeds: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();

        // Domain separator
        hasher.update(b"SUPERTOKEN_Address");

        for seed in seeds {
            hasher.update((seed.len() as u32).to_le_bytes());
            hasher.update(seed);
        }

        let digest: [u8; 32] = hasher.finalize().into();
        let mut bytes = [0u8; ADDRESS_LEN];
        bytes.copy_from_slice(&digest[..ADDRESS_LEN]);
        Address(bytes)
    }

    /// Address of a contract created by `sender` with the given account nonce
    pub fn create(sender: &Address, nonce: u64) -> Self {
        Self::derive(&[b"create", sender.bytes(), &nonce.to_le_bytes()])
    }

    /// Address of a contract created by `deployer` with a caller-chosen salt.
    ///
    /// Unlike [`Address::create`] the result does not depend on any nonce, so
    /// deploying twice with the same salt targets the same address.
    pub fn create2(deployer: &Address, salt: &[u8; 32]) -> Self {
        Self::derive(&[b"create2", deployer.bytes(), salt])
    }

    /// Well-known address for a named account, handy for test fixtures and
    /// the default deployer of a local chain
    pub fn from_label(label: &str) -> Self {
        Self::derive(&[b"label", label.as_bytes()])
    }
}

/// Salt used by pure super token deployers: SHA-256 over the packed
/// encoding of (name . sender . symbol)
pub fn packed_salt(name: &str, sender: &Address, symbol: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(sender.bytes());
    hasher.update(symbol.as_bytes());
    hasher.finalize().into()
}
