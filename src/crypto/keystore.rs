//! Password-based encryption of secrets at rest.
//!
//! `scrypt(password, salt)` yields a 64-byte derived key. AES-256-GCM then
//! seals the secret with nonce `dk[0..12]`, key `dk[32..64]` and the owning
//! base58 address as associated data, so a ciphertext cannot be replayed
//! under a different address.

use aes_gcm::{
    aead::{Aead, Payload},
    Aes256Gcm, KeyInit, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use super::{CryptoError, CryptoResult};

/// Salt length in bytes
pub const SALT_SIZE: usize = 16;

const NONCE_SIZE: usize = 12;
const MIN_DK_LEN: usize = 64;

/// Scrypt cost parameters, stored next to every ciphertext
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScryptParams {
    /// CPU/memory cost (power of two)
    pub n: u32,
    /// Block size
    pub r: u32,
    /// Parallelization
    pub p: u32,
    /// Derived key length
    #[serde(rename = "dkLen", alias = "dk_len")]
    pub dk_len: usize,
}

impl ScryptParams {
    /// Parameters used when none are configured
    pub const DEFAULT: Self = Self {
        n: 4096,
        r: 8,
        p: 8,
        dk_len: 64,
    };

    fn to_scrypt(self) -> CryptoResult<scrypt::Params> {
        if !self.n.is_power_of_two() || self.n < 2 {
            return Err(CryptoError::Kdf(format!("n must be a power of two, got {}", self.n)));
        }
        if self.dk_len < MIN_DK_LEN {
            return Err(CryptoError::Kdf(format!(
                "dkLen must be at least {MIN_DK_LEN}, got {}",
                self.dk_len
            )));
        }
        let log_n = self.n.trailing_zeros() as u8;
        scrypt::Params::new(log_n, self.r, self.p, self.dk_len)
            .map_err(|e| CryptoError::Kdf(e.to_string()))
    }
}

impl Default for ScryptParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Fresh random salt, base64 encoded as stored in records
#[must_use]
pub fn random_salt() -> String {
    let mut salt = [0u8; SALT_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    BASE64.encode(salt)
}

fn derive_key(password: &str, salt_b64: &str, params: ScryptParams) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let salt = BASE64
        .decode(salt_b64)
        .map_err(|e| CryptoError::Encoding(format!("salt: {e}")))?;
    let mut dk = Zeroizing::new(vec![0u8; params.dk_len]);
    scrypt::scrypt(password.as_bytes(), &salt, &params.to_scrypt()?, &mut dk)
        .map_err(|e| CryptoError::Kdf(e.to_string()))?;
    Ok(dk)
}

fn cipher_for(dk: &[u8]) -> CryptoResult<Aes256Gcm> {
    Aes256Gcm::new_from_slice(&dk[32..64]).map_err(|e| CryptoError::Kdf(e.to_string()))
}

/// Encrypt `plaintext` under `password`, bound to `address`.
///
/// Returns the base64 ciphertext (with the GCM tag appended).
pub fn encrypt_with_gcm(
    plaintext: &[u8],
    address: &str,
    salt_b64: &str,
    password: &str,
    params: ScryptParams,
) -> CryptoResult<String> {
    let dk = derive_key(password, salt_b64, params)?;
    let cipher = cipher_for(&dk)?;
    let sealed = cipher
        .encrypt(
            Nonce::from_slice(&dk[..NONCE_SIZE]),
            Payload {
                msg: plaintext,
                aad: address.as_bytes(),
            },
        )
        .map_err(|_| CryptoError::Cipher)?;
    Ok(BASE64.encode(sealed))
}

/// Decrypt a base64 ciphertext produced by [`encrypt_with_gcm`].
///
/// A wrong password, salt or address all surface as [`CryptoError::Cipher`].
pub fn decrypt_with_gcm(
    ciphertext_b64: &str,
    address: &str,
    salt_b64: &str,
    password: &str,
    params: ScryptParams,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let sealed = BASE64
        .decode(ciphertext_b64)
        .map_err(|e| CryptoError::Encoding(format!("ciphertext: {e}")))?;
    let dk = derive_key(password, salt_b64, params)?;
    let cipher = cipher_for(&dk)?;
    cipher
        .decrypt(
            Nonce::from_slice(&dk[..NONCE_SIZE]),
            Payload {
                msg: &sealed,
                aad: address.as_bytes(),
            },
        )
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::Cipher)
}
