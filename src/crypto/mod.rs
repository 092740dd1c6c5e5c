//! Cryptographic primitives for the gateway.
//!
//! - ECDSA over P-256 with SHA-256 for transaction signatures
//! - SHA-256 / RIPEMD-160 for hashes and addresses
//! - scrypt + AES-256-GCM for secrets at rest
//! - bip39 for standard mnemonic seed phrases

mod hash;
mod keystore;
mod mnemonic;
mod signature;

pub use hash::{hash160, sha256, sha256d};
pub use keystore::{decrypt_with_gcm, encrypt_with_gcm, random_salt, ScryptParams, SALT_SIZE};
pub use mnemonic::{
    generate_mnemonic, keypair_from_mnemonic, keypair_from_phrase, parse_mnemonic,
    MNEMONIC_WORD_COUNT,
};
pub use signature::{
    verify, Keypair, PublicKey, SecretKey, Signature, PUBKEY_SIZE, SCHEME_SHA256_ECDSA,
    SECRET_KEY_SIZE, SIGNATURE_SIZE,
};

#[cfg(test)]
pub(crate) use keystore::tests::FAST as FAST_SCRYPT;

use thiserror::Error;

/// Cryptographic errors
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Invalid signature
    #[error("invalid signature")]
    InvalidSignature,
    /// Invalid public key format
    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),
    /// Invalid private key
    #[error("invalid private key: {0}")]
    InvalidPrivateKey(String),
    /// Invalid mnemonic phrase
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),
    /// Key derivation parameters rejected
    #[error("key derivation failed: {0}")]
    Kdf(String),
    /// Authenticated decryption failed (wrong password or tampered data)
    #[error("cipher authentication failed")]
    Cipher,
    /// Base64 or hex decoding error
    #[error("encoding error: {0}")]
    Encoding(String),
}

/// Result type for crypto operations
pub type CryptoResult<T> = Result<T, CryptoError>;
