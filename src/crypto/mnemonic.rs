//! BIP39 mnemonic seed phrase support for account recovery.
//!
//! Provides standard 12-word seed phrases that deterministically derive
//! P-256 keypairs via: mnemonic -> BIP39 seed -> SHA-256 KDF -> scalar.
//!
//! The same mnemonic always produces the same account.

use bip39::{Language, Mnemonic};
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use super::{CryptoError, CryptoResult, Keypair, SecretKey};

/// Number of words in the mnemonic (12 words = 128 bits of entropy)
pub const MNEMONIC_WORD_COUNT: usize = 12;

/// Domain separator for P-256 key derivation from a BIP39 seed
const P256_KDF_DOMAIN: &[u8] = b"ontgate-p256-keygen-v1";

/// Generate a new random mnemonic phrase.
///
/// Returns a 12-word BIP39 mnemonic using the English word list.
pub fn generate_mnemonic() -> CryptoResult<Mnemonic> {
    let mut entropy = [0u8; MNEMONIC_WORD_COUNT * 4 / 3]; // 12 words => 16 bytes
    rand::rngs::OsRng.fill_bytes(&mut entropy);
    let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
        .map_err(|e| CryptoError::InvalidMnemonic(e.to_string()));
    entropy.zeroize();
    mnemonic
}

/// Parse a mnemonic phrase from a string.
///
/// # Errors
/// Returns error if the phrase is invalid (wrong words, checksum, etc.)
pub fn parse_mnemonic(phrase: &str) -> CryptoResult<Mnemonic> {
    Mnemonic::parse_in(Language::English, phrase)
        .map_err(|e| CryptoError::InvalidMnemonic(e.to_string()))
}

/// Deterministically derive a P-256 keypair from a mnemonic.
///
/// Derivation path: BIP39 mnemonic -> 64-byte seed (with passphrase)
/// -> SHA-256(domain || seed || counter) -> scalar. The counter only moves
/// past zero in the astronomically rare case the digest is not a valid
/// scalar.
pub fn keypair_from_mnemonic(mnemonic: &Mnemonic, passphrase: &str) -> CryptoResult<Keypair> {
    let mut seed = mnemonic.to_seed(passphrase);
    let mut result = Err(CryptoError::InvalidMnemonic("no valid scalar".into()));
    for counter in 0u32..16 {
        let mut hasher = Sha256::new();
        hasher.update(P256_KDF_DOMAIN);
        hasher.update(seed);
        hasher.update(counter.to_be_bytes());
        let mut scalar: [u8; 32] = hasher.finalize().into();
        let secret = SecretKey::from_bytes(&scalar);
        scalar.zeroize();
        if let Ok(secret) = secret {
            result = Ok(Keypair::from_secret(secret));
            break;
        }
    }
    seed.zeroize();
    result
}

/// Derive a keypair from a mnemonic phrase string.
///
/// # Errors
/// Returns error if the phrase is invalid
pub fn keypair_from_phrase(phrase: &str, passphrase: &str) -> CryptoResult<Keypair> {
    let mnemonic = parse_mnemonic(phrase)?;
    keypair_from_mnemonic(&mnemonic, passphrase)
}
