//! Chain addresses and their three textual forms.
//!
//! - base58: `0x17 || bytes || checksum`, check-encoded, always 34 chars
//! - hex: the 20 bytes big-endian, 40 chars
//! - contract hex: the same bytes reversed, as the VM stores script hashes

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::crypto::{hash160, PublicKey};

/// Address byte length
pub const ADDRESS_SIZE: usize = 20;
/// Version byte prefixed before base58 check-encoding
pub const ADDRESS_VERSION: u8 = 0x17;
/// Length of the base58 form
pub const BASE58_LEN: usize = 34;
/// Length of the hex forms
pub const HEX_LEN: usize = ADDRESS_SIZE * 2;

/// A 20-byte chain address (script hash).
///
/// Serialized as its base58 form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; ADDRESS_SIZE]);

impl Address {
    /// The zero address
    pub const ZERO: Self = Self([0u8; ADDRESS_SIZE]);

    /// Create an address from raw bytes
    #[must_use]
    pub const fn from_bytes(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Address of a built-in native contract (`00..00 id`)
    #[must_use]
    pub const fn native(id: u8) -> Self {
        let mut bytes = [0u8; ADDRESS_SIZE];
        bytes[ADDRESS_SIZE - 1] = id;
        Self(bytes)
    }

    /// Derive the address of a single-signature account
    #[must_use]
    pub fn from_public_key(pubkey: &PublicKey) -> Self {
        Self::from_vm_code(&pubkey.verification_script())
    }

    /// Derive a contract address from its script bytes
    #[must_use]
    pub fn from_vm_code(code: &[u8]) -> Self {
        Self(hash160(code))
    }

    /// Derive a contract address from its hex-encoded script
    ///
    /// # Errors
    /// Returns error if the script is not valid hex
    pub fn from_vm_code_hex(code_hex: &str) -> Result<Self, AddressError> {
        let code = hex::decode(code_hex).map_err(|_| AddressError::InvalidHex)?;
        Ok(Self::from_vm_code(&code))
    }

    /// Get the underlying bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }

    /// Big-endian hex, no prefix
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse big-endian hex (40 chars)
    ///
    /// # Errors
    /// Returns error if hex is invalid or wrong length
    pub fn from_hex(s: &str) -> Result<Self, AddressError> {
        if s.len() != HEX_LEN {
            return Err(AddressError::InvalidLength(s.len()));
        }
        let bytes = hex::decode(s).map_err(|_| AddressError::InvalidHex)?;
        let mut arr = [0u8; ADDRESS_SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }

    /// Byte-reversed hex, as used for contract hashes on the wire
    #[must_use]
    pub fn to_contract_hex(&self) -> String {
        let mut bytes = self.0;
        bytes.reverse();
        hex::encode(bytes)
    }

    /// Parse byte-reversed hex
    ///
    /// # Errors
    /// Returns error if hex is invalid or wrong length
    pub fn from_contract_hex(s: &str) -> Result<Self, AddressError> {
        let mut addr = Self::from_hex(s)?;
        addr.0.reverse();
        Ok(addr)
    }

    /// Check-encoded base58 form
    #[must_use]
    pub fn to_base58(&self) -> String {
        let mut payload = Vec::with_capacity(ADDRESS_SIZE + 1);
        payload.push(ADDRESS_VERSION);
        payload.extend_from_slice(&self.0);
        bs58::encode(payload).with_check().into_string()
    }

    /// Parse the check-encoded base58 form
    ///
    /// # Errors
    /// Returns error on wrong length, bad checksum or wrong version byte
    pub fn from_base58(s: &str) -> Result<Self, AddressError> {
        if s.len() != BASE58_LEN {
            return Err(AddressError::InvalidLength(s.len()));
        }
        let decoded = bs58::decode(s)
            .with_check(None)
            .into_vec()
            .map_err(|e| AddressError::InvalidBase58(e.to_string()))?;
        if decoded.len() != ADDRESS_SIZE + 1 {
            return Err(AddressError::InvalidLength(decoded.len()));
        }
        if decoded[0] != ADDRESS_VERSION {
            return Err(AddressError::InvalidVersion(decoded[0]));
        }
        let mut arr = [0u8; ADDRESS_SIZE];
        arr.copy_from_slice(&decoded[1..]);
        Ok(Self(arr))
    }

    /// Check if this is the zero address
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; ADDRESS_SIZE]
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self.to_base58())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base58())
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base58(s)
    }
}

impl Serialize for Address {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_base58())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_base58(&s).map_err(serde::de::Error::custom)
    }
}

/// Address parsing errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AddressError {
    /// Invalid hex encoding
    #[error("invalid hex encoding")]
    InvalidHex,
    /// Invalid base58 or checksum
    #[error("invalid base58: {0}")]
    InvalidBase58(String),
    /// Wrong textual or decoded length
    #[error("invalid address length: {0}")]
    InvalidLength(usize),
    /// Unexpected base58 version byte
    #[error("invalid address version byte: {0:#04x}")]
    InvalidVersion(u8),
    /// Number does not fit in 64 bits
    #[error("number overflows 64 bits: {0} bytes")]
    NumberOverflow(usize),
}

/// base58 -> big-endian hex
pub fn base58_to_hex(base58: &str) -> Result<String, AddressError> {
    Address::from_base58(base58).map(|a| a.to_hex())
}

/// Big-endian hex -> base58
pub fn hex_to_base58(hex: &str) -> Result<String, AddressError> {
    Address::from_hex(hex).map(|a| a.to_base58())
}

/// base58 -> contract (byte-reversed) hex
pub fn base58_to_contract_hex(base58: &str) -> Result<String, AddressError> {
    Address::from_base58(base58).map(|a| a.to_contract_hex())
}

/// Contract (byte-reversed) hex -> base58
pub fn contract_hex_to_base58(hex: &str) -> Result<String, AddressError> {
    Address::from_contract_hex(hex).map(|a| a.to_base58())
}

/// Reverse the byte order of a 40-char hex string. Applying it twice is the
/// identity.
pub fn hex_to_contract_hex(hex: &str) -> Result<String, AddressError> {
    Address::from_hex(hex).map(|a| a.to_contract_hex())
}

/// Base64 of the byte-reversed contract hash, the form some wallets display
pub fn contract_hash_to_b64(contract_hex: &str) -> Result<String, AddressError> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    Address::from_contract_hex(contract_hex).map(|a| STANDARD.encode(a.as_bytes()))
}

/// Read a little-endian hex string as an unsigned integer.
///
/// An empty string decodes to `0`.
pub fn contract_hex_to_number(hex: &str) -> Result<u64, AddressError> {
    let bytes = hex::decode(hex).map_err(|_| AddressError::InvalidHex)?;
    le_bytes_to_number(&bytes)
}

/// Little-endian bytes as an unsigned integer; trailing zero bytes are
/// ignored when checking for overflow.
pub fn le_bytes_to_number(bytes: &[u8]) -> Result<u64, AddressError> {
    let significant = bytes
        .iter()
        .rposition(|b| *b != 0)
        .map_or(0, |last| last + 1);
    if significant > 8 {
        return Err(AddressError::NumberOverflow(significant));
    }
    let mut buf = [0u8; 8];
    buf[..significant].copy_from_slice(&bytes[..significant]);
    Ok(u64::from_le_bytes(buf))
}
