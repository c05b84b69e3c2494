//! Basic blockchain types
//!
//! All fixed-width byte identifiers share one shape, generated by
//! `fixed_bytes!`: hex display with a `0x` prefix, hex-string serde
//! representation and bincode encoding as raw bytes.

use crate::{CoreError, CoreResult};
use std::fmt;

/// Block number type (64-bit unsigned integer)
pub type BlockNumber = u64;

/// Timestamp in seconds since Unix epoch
pub type Timestamp = u64;

/// Gas amount type
pub type Gas = u64;

/// Wei amount type (smallest unit of the account-model currency)
pub type Wei = u128;

/// Nonce type for transactions
pub type Nonce = u64;

macro_rules! fixed_bytes {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, bincode::Encode, bincode::Decode)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Width in bytes
            pub const LEN: usize = $len;

            /// Create from a byte array
            pub const fn new(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Create from a slice of exactly `LEN` bytes
            pub fn from_slice(slice: &[u8]) -> CoreResult<Self> {
                let bytes: [u8; $len] = slice.try_into().map_err(|_| CoreError::InvalidLength {
                    what: stringify!($name),
                    expected: $len,
                    actual: slice.len(),
                })?;
                Ok(Self(bytes))
            }

            /// Get the underlying byte array
            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            /// Convert to hex string (no prefix)
            pub fn to_hex(&self) -> String {
                hex::encode(self.0)
            }

            /// Create from hex string, with or without `0x` prefix
            pub fn from_hex(hex: &str) -> Result<Self, hex::FromHexError> {
                let hex = hex.strip_prefix("0x").unwrap_or(hex);
                let bytes = hex::decode(hex)?;
                let bytes: [u8; $len] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(bytes))
            }

            /// All-zero value
            pub const fn zero() -> Self {
                Self([0u8; $len])
            }

            pub fn is_zero(&self) -> bool {
                self.0.iter().all(|b| *b == 0)
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::zero()
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}(0x{})", stringify!($name), self.to_hex())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "0x{}", self.to_hex())
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = <String as serde::Deserialize>::deserialize(deserializer)?;
                Self::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_bytes!(
    /// 32-byte hash type
    Hash,
    32
);

fixed_bytes!(
    /// 20-byte account-model address
    Address,
    20
);

fixed_bytes!(
    /// 32-byte identifier used by the cross-chain ledger for chains,
    /// assets, transactions and blocks
    Id,
    32
);

fixed_bytes!(
    /// 20-byte owner of an output in the external ledger
    ShortId,
    20
);

fixed_bytes!(
    /// 20-byte identifier of a validator node
    NodeId,
    20
);

impl From<Hash> for Id {
    fn from(hash: Hash) -> Self {
        Id(hash.0)
    }
}

impl From<Id> for Hash {
    fn from(id: Id) -> Self {
        Hash(id.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_creation() {
        let hash = Hash::zero();
        assert_eq!(
            hash.to_hex(),
            "0000000000000000000000000000000000000000000000000000000000000000"
        );
        assert!(hash.is_zero());

        let hash2 = Hash::new([1u8; 32]);
        assert_eq!(
            hash2.to_hex(),
            "0101010101010101010101010101010101010101010101010101010101010101"
        );
    }

    #[test]
    fn test_address_from_hex() {
        let hex = "1234567890abcdef1234567890abcdef12345678";
        let addr = Address::from_hex(hex).unwrap();
        assert_eq!(addr.to_hex(), hex);

        let prefixed = Address::from_hex(&format!("0x{}", hex)).unwrap();
        assert_eq!(addr, prefixed);
        assert_eq!(addr.to_string(), format!("0x{}", hex));
    }

    #[test]
    fn test_from_slice_length_checked() {
        assert!(Hash::from_slice(&[0u8; 31]).is_err());
        assert!(Address::from_slice(&[0u8; 20]).is_ok());
        match Id::from_slice(&[1u8; 3]) {
            Err(CoreError::InvalidLength { expected, actual, .. }) => {
                assert_eq!(expected, 32);
                assert_eq!(actual, 3);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_serde_uses_hex_strings() {
        let id = Id::new([0xab; 32]);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"0x{}\"", "ab".repeat(32)));
        let back: Id = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn test_ordering_is_bytewise() {
        let a = ShortId::new([0u8; 20]);
        let mut b_bytes = [0u8; 20];
        b_bytes[19] = 1;
        let b = ShortId::new(b_bytes);
        assert!(a < b);
    }
}
