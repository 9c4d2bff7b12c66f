//! Core wire types: 20-byte account addresses and the hex codec used by
//! every textual encoding in the node.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

use crate::crypto::keccak256;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HexError {
    #[error("hex string length must be even")]
    OddLength,
    #[error("invalid hex character {0:?}")]
    InvalidChar(char),
}

/// Lowercase hex, no prefix. Callers add `0x` where a format requires it.
pub fn to_hex(data: &[u8]) -> String {
    hex::encode(data)
}

/// Decode hex, tolerating an optional `0x`/`0X` prefix and both cases.
pub fn from_hex(s: &str) -> Result<Vec<u8>, HexError> {
    let s = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if s.len() % 2 != 0 {
        return Err(HexError::OddLength);
    }
    hex::decode(s).map_err(|e| match e {
        hex::FromHexError::InvalidHexCharacter { c, .. } => HexError::InvalidChar(c),
        _ => HexError::OddLength,
    })
}

/// A 20-byte account identifier, the last 20 bytes of the keccak digest of
/// an uncompressed secp256k1 public key.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Address(pub [u8; 20]);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid address length: {0} bytes")]
    InvalidLength(usize),
    #[error("public key must be 64 bytes (or 65 with a 0x04 prefix)")]
    InvalidPublicKey,
    #[error(transparent)]
    Hex(#[from] HexError),
}

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    pub fn from_bytes(b: [u8; 20]) -> Self {
        Address(b)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, AddressError> {
        if bytes.len() != 20 {
            return Err(AddressError::InvalidLength(bytes.len()));
        }
        let mut arr = [0u8; 20];
        arr.copy_from_slice(bytes);
        Ok(Address(arr))
    }

    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        let bytes = from_hex(s)?;
        Self::from_slice(&bytes)
    }

    /// Derive from an uncompressed public key: 64 bytes of x||y, or the
    /// 65-byte SEC1 form with its 0x04 prefix stripped.
    pub fn from_pubkey(pubkey: &[u8]) -> Result<Self, AddressError> {
        let key = match pubkey.len() {
            64 => pubkey,
            65 if pubkey[0] == 0x04 => &pubkey[1..],
            _ => return Err(AddressError::InvalidPublicKey),
        };
        let digest = keccak256(key);
        Self::from_slice(&digest[12..])
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Lowercase `0x`-prefixed rendering.
    pub fn to_hex(&self) -> String {
        format!("0x{}", to_hex(&self.0))
    }

    /// EIP-55 mixed-case rendering: each alphabetic nibble is uppercased
    /// iff the matching nibble of keccak256(lowercase_hex) is >= 8.
    pub fn to_checksum_hex(&self) -> String {
        let lower = to_hex(&self.0);
        let digest_hex = to_hex(&keccak256(lower.as_bytes()));

        let mut out = String::with_capacity(42);
        out.push_str("0x");
        for (c, h) in lower.chars().zip(digest_hex.chars()) {
            if c.is_ascii_digit() {
                out.push(c);
            } else {
                let nibble = h.to_digit(16).unwrap_or(0);
                if nibble >= 8 {
                    out.push(c.to_ascii_uppercase());
                } else {
                    out.push(c);
                }
            }
        }
        out
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Address").field(&self.to_hex()).finish()
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Address::from_hex(s)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Address, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Address::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_roundtrip() {
        let data = vec![0x00, 0x01, 0xab, 0xff];
        let encoded = to_hex(&data);
        assert_eq!(encoded, "0001abff");
        assert_eq!(from_hex(&encoded).unwrap(), data);
        assert_eq!(from_hex("0x0001abff").unwrap(), data);
        assert_eq!(from_hex("0X0001ABFF").unwrap(), data);
    }

    #[test]
    fn hex_rejects_odd_and_garbage() {
        assert_eq!(from_hex("abc"), Err(HexError::OddLength));
        assert!(matches!(from_hex("zz"), Err(HexError::InvalidChar(_))));
    }

    #[test]
    fn address_roundtrip_and_zero() {
        let addr = Address::from_bytes([0xaa; 20]);
        assert_eq!(addr.to_hex(), format!("0x{}", "aa".repeat(20)));
        assert_eq!(Address::from_hex(&addr.to_hex()).unwrap(), addr);
        assert!(!addr.is_zero());
        assert!(Address::ZERO.is_zero());
    }

    #[test]
    fn address_rejects_bad_lengths() {
        assert!(Address::from_hex("0x1234").is_err());
        assert!(Address::from_pubkey(&[0u8; 63]).is_err());
    }

    #[test]
    fn checksum_matches_eip55_vector() {
        // Well-known EIP-55 test vector.
        let addr = Address::from_hex("0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed").unwrap();
        assert_eq!(
            addr.to_checksum_hex(),
            "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
        );
    }

    #[test]
    fn pubkey_prefix_is_stripped() {
        let key64 = [0x11u8; 64];
        let mut key65 = [0x11u8; 65];
        key65[0] = 0x04;
        assert_eq!(
            Address::from_pubkey(&key64).unwrap(),
            Address::from_pubkey(&key65).unwrap()
        );
    }
}
