//! ECDSA over secp256r1 (P-256), the chain's default signature scheme.
//!
//! Public keys travel in 33-byte SEC1 compressed form. Signatures are the
//! 64-byte `r || s` encoding; the chain prefixes them with a one-byte scheme
//! tag when they are placed in an invocation script.

use p256::ecdsa::{
    signature::{Signer, Verifier},
    Signature as EcdsaSignature, SigningKey, VerifyingKey,
};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

use super::{CryptoError, CryptoResult};
use crate::types::Address;

/// Compressed public key size in bytes
pub const PUBKEY_SIZE: usize = 33;
/// Signature size in bytes (`r || s`)
pub const SIGNATURE_SIZE: usize = 64;
/// Private scalar size in bytes
pub const SECRET_KEY_SIZE: usize = 32;
/// Scheme tag for SHA256withECDSA
pub const SCHEME_SHA256_ECDSA: u8 = 0x01;

/// A P-256 ECDSA signature
#[derive(Clone, PartialEq, Eq)]
pub struct Signature([u8; SIGNATURE_SIZE]);

impl Signature {
    /// Create from raw bytes
    ///
    /// # Errors
    /// Returns error if bytes are not the correct length
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let arr: [u8; SIGNATURE_SIZE] =
            bytes.try_into().map_err(|_| CryptoError::InvalidSignature)?;
        Ok(Self(arr))
    }

    /// Get underlying bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; SIGNATURE_SIZE] {
        &self.0
    }

    /// Scheme tag followed by `r || s`, as pushed in invocation scripts
    #[must_use]
    pub fn to_tagged_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(SIGNATURE_SIZE + 1);
        out.push(SCHEME_SHA256_ECDSA);
        out.extend_from_slice(&self.0);
        out
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sig({}..)", &self.to_hex()[..16])
    }
}

/// A P-256 public key, kept in compressed form
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PublicKey([u8; PUBKEY_SIZE]);

impl PublicKey {
    /// Create from SEC1 bytes (compressed or uncompressed)
    ///
    /// # Errors
    /// Returns error if the bytes are not a point on the curve
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        let vk = VerifyingKey::from_sec1_bytes(bytes)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Ok(Self::from_verifying_key(&vk))
    }

    fn from_verifying_key(vk: &VerifyingKey) -> Self {
        let point = vk.to_encoded_point(true);
        let mut out = [0u8; PUBKEY_SIZE];
        out.copy_from_slice(point.as_bytes());
        Self(out)
    }

    fn verifying_key(&self) -> CryptoResult<VerifyingKey> {
        VerifyingKey::from_sec1_bytes(&self.0)
            .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))
    }

    /// Compressed bytes
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; PUBKEY_SIZE] {
        &self.0
    }

    /// Convert to hex string
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string
    ///
    /// # Errors
    /// Returns error if hex is invalid or not a valid public key
    pub fn from_hex(s: &str) -> CryptoResult<Self> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
        Self::from_bytes(&bytes)
    }

    /// Single-signature verification script: push key, `CHECKSIG`
    #[must_use]
    pub fn verification_script(&self) -> Vec<u8> {
        let mut script = Vec::with_capacity(PUBKEY_SIZE + 2);
        script.push(PUBKEY_SIZE as u8);
        script.extend_from_slice(&self.0);
        script.push(crate::vm::OpCode::CheckSig as u8);
        script
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PubKey({})", self.to_hex())
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// A P-256 private scalar.
///
/// SECURITY: This type intentionally does not implement Debug or Display
/// to prevent accidental key leakage. The inner key zeroizes on drop.
#[derive(Clone)]
pub struct SecretKey(SigningKey);

impl SecretKey {
    /// Create from a 32-byte big-endian scalar
    ///
    /// # Errors
    /// Returns error if the scalar is zero or not below the curve order
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != SECRET_KEY_SIZE {
            return Err(CryptoError::InvalidPrivateKey(format!(
                "expected {} bytes, got {}",
                SECRET_KEY_SIZE,
                bytes.len()
            )));
        }
        SigningKey::from_slice(bytes)
            .map(Self)
            .map_err(|e| CryptoError::InvalidPrivateKey(e.to_string()))
    }

    /// Raw scalar bytes, cleared when the returned buffer drops
    #[must_use]
    pub fn to_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.0.to_bytes().to_vec())
    }

    /// Matching public key
    #[must_use]
    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_verifying_key(self.0.verifying_key())
    }

    /// Sign a message (SHA-256 is applied by the scheme)
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        let sig: EcdsaSignature = self.0.sign(message);
        let sig = sig.normalize_s().unwrap_or(sig);
        let mut out = [0u8; SIGNATURE_SIZE];
        out.copy_from_slice(&sig.to_bytes());
        Signature(out)
    }
}

/// A keypair plus its derived chain address
#[derive(Clone)]
pub struct Keypair {
    secret: SecretKey,
    public: PublicKey,
    address: Address,
}

impl Keypair {
    /// Generate a new random keypair
    #[must_use]
    pub fn generate() -> Self {
        Self::from_secret(SecretKey(SigningKey::random(&mut rand::rngs::OsRng)))
    }

    /// Build from an existing secret key
    #[must_use]
    pub fn from_secret(secret: SecretKey) -> Self {
        let public = secret.public_key();
        let address = Address::from_public_key(&public);
        Self {
            secret,
            public,
            address,
        }
    }

    /// Get the public key
    #[must_use]
    pub const fn public_key(&self) -> &PublicKey {
        &self.public
    }

    /// Get the secret key (for persistence)
    #[must_use]
    pub const fn secret_key(&self) -> &SecretKey {
        &self.secret
    }

    /// Address derived from the public key
    #[must_use]
    pub const fn address(&self) -> Address {
        self.address
    }

    /// Sign a message
    #[must_use]
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.secret.sign(message)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address)
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Verify a signature against a public key and message
///
/// # Errors
/// Returns error if signature is invalid
pub fn verify(public_key: &PublicKey, message: &[u8], signature: &Signature) -> CryptoResult<()> {
    let vk = public_key.verifying_key()?;
    let sig =
        EcdsaSignature::from_slice(signature.as_bytes()).map_err(|_| CryptoError::InvalidSignature)?;
    vk.verify(message, &sig)
        .map_err(|_| CryptoError::InvalidSignature)
}
