//! Accounts and decentralized identities.
//!
//! Private keys never touch the store in the clear: each one is sealed with
//! scrypt + AES-256-GCM under the owner's password and bound to its base58
//! address. A wrong password is an expected outcome and surfaces as `None`,
//! not as an error.

mod account;
mod identity;

pub use account::{Account, AccountImport, AccountRole, AccountStore, KeyParameters, SearchKind};
pub use identity::{ControlKey, OntId, OntIdStore, ONTID_CONTRACT, ONTID_PREFIX};

use thiserror::Error;

use crate::crypto::{CryptoError, ScryptParams};
use crate::store::StoreError;
use crate::types::{Address, AddressError};

/// Key algorithm label stored in records
pub const ALGORITHM: &str = "ECDSA";
/// Curve label stored in records
pub const CURVE: &str = "P-256";

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    /// Key generation or encryption failed
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    /// Address could not be parsed
    #[error("invalid address: {0}")]
    Address(#[from] AddressError),
    /// Imported key does not belong to the claimed address
    #[error("address mismatch: claimed {claimed}, key belongs to {derived}")]
    AddressMismatch {
        /// Address in the imported record
        claimed: Address,
        /// Address derived from the decrypted key
        derived: Address,
    },
    /// Imported key could not be decrypted with the given password
    #[error("imported key could not be decrypted")]
    Undecryptable,
    /// Key algorithm other than ECDSA P-256
    #[error("unsupported key algorithm: {0}")]
    UnsupportedAlgorithm(String),
    /// Persistence failure
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Seal a secret for `address` under `password`, returning base64
/// ciphertext.
pub(crate) fn seal(
    secret: &[u8],
    address: &Address,
    salt: &str,
    password: &str,
    scrypt: ScryptParams,
) -> Result<String, WalletError> {
    Ok(crate::crypto::encrypt_with_gcm(
        secret,
        &address.to_base58(),
        salt,
        password,
        scrypt,
    )?)
}
