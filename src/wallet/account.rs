//! Password-protected signing accounts and their store.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{seal, WalletError, ALGORITHM, CURVE};
use crate::crypto::{
    decrypt_with_gcm, generate_mnemonic, keypair_from_mnemonic, random_salt, Keypair,
    ScryptParams, SecretKey,
};
use crate::error::{ServiceError, ServiceResult};
use crate::store::{Collection, Database};
use crate::types::{now_millis, Address, Timestamp};

/// Collection holding account records
pub const ACCOUNT_COLLECTION: &str = "account";
/// Uniqueness marker held by the admin account's address
const ADMIN_MARKER: &str = "admin";

/// Curve parameters of a stored key
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyParameters {
    /// Curve label
    pub curve: String,
}

impl Default for KeyParameters {
    fn default() -> Self {
        Self {
            curve: CURVE.to_string(),
        }
    }
}

/// Role tag of an account
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountRole {
    /// The single service administrator
    Admin,
    /// Everyone else
    User,
}

/// An encrypted signing account
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Display name
    pub label: String,
    /// Address derived from the public key
    pub address: Address,
    /// Sealed private key, base64
    pub key: String,
    /// Key algorithm label
    pub algorithm: String,
    /// Curve parameters
    pub parameters: KeyParameters,
    /// Base64 salt shared by the sealed key and mnemonic
    pub salt: String,
    /// Key-derivation cost
    pub scrypt: ScryptParams,
    /// Sealed mnemonic; absent for imported accounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mnemonic_enc: Option<String>,
    /// Creation time, milliseconds since the epoch
    pub created_at: Timestamp,
    /// Role tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<AccountRole>,
}

/// Externally produced account record to import
#[derive(Clone, Debug, Deserialize)]
pub struct AccountImport {
    /// Display name
    #[serde(default)]
    pub label: String,
    /// Claimed base58 address
    pub address: String,
    /// Sealed private key, base64
    pub key: String,
    /// Base64 salt
    pub salt: String,
    /// Key algorithm label
    #[serde(default)]
    pub algorithm: Option<String>,
    /// Curve parameters
    #[serde(default)]
    pub parameters: Option<KeyParameters>,
    /// Key-derivation cost; defaults when absent
    #[serde(default)]
    pub scrypt: Option<ScryptParams>,
}

impl Account {
    /// Generate a fresh account: new mnemonic, key derived from it, both
    /// sealed under `password` with the same salt and cost.
    pub fn create(label: &str, password: &str, scrypt: Option<ScryptParams>) -> Result<Self, WalletError> {
        let scrypt = scrypt.unwrap_or_default();
        let mnemonic = generate_mnemonic()?;
        let keypair = keypair_from_mnemonic(&mnemonic, "")?;
        let address = keypair.address();
        let salt = random_salt();

        let key = seal(&keypair.secret_key().to_bytes(), &address, &salt, password, scrypt)?;
        let phrase_hex = hex::encode(mnemonic.to_string());
        let mnemonic_enc = seal(phrase_hex.as_bytes(), &address, &salt, password, scrypt)?;

        debug!(%address, "created account");
        Ok(Self {
            label: label.to_string(),
            address,
            key,
            algorithm: ALGORITHM.to_string(),
            parameters: KeyParameters::default(),
            salt,
            scrypt,
            mnemonic_enc: Some(mnemonic_enc),
            created_at: now_millis(),
            role: None,
        })
    }

    /// Rebuild an account from sealed key material.
    ///
    /// The key must decrypt under `password` and belong to the claimed
    /// address; a mismatch is rejected rather than corrected.
    pub fn import(info: AccountImport, password: &str) -> Result<Self, WalletError> {
        let algorithm = info.algorithm.unwrap_or_else(|| ALGORITHM.to_string());
        if algorithm != ALGORITHM {
            return Err(WalletError::UnsupportedAlgorithm(algorithm));
        }
        let claimed = Address::from_base58(&info.address)?;
        let account = Self {
            label: info.label,
            address: claimed,
            key: info.key,
            algorithm,
            parameters: info.parameters.unwrap_or_default(),
            salt: info.salt,
            scrypt: info.scrypt.unwrap_or_default(),
            mnemonic_enc: None,
            created_at: now_millis(),
            role: None,
        };
        let secret = account
            .open_key(password)
            .map_err(|_| WalletError::Undecryptable)?;
        let derived = Keypair::from_secret(secret).address();
        if derived != claimed {
            return Err(WalletError::AddressMismatch { claimed, derived });
        }
        Ok(account)
    }

    /// Same account tagged with `role`
    #[must_use]
    pub fn with_role(mut self, role: AccountRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Whether this is the admin account
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Some(AccountRole::Admin)
    }

    fn open_key(&self, password: &str) -> Result<SecretKey, WalletError> {
        let plain = decrypt_with_gcm(&self.key, &self.address.to_base58(), &self.salt, password, self.scrypt)?;
        Ok(SecretKey::from_bytes(&plain)?)
    }

    /// Private key, or `None` when the password is wrong
    #[must_use]
    pub fn decrypt_private_key(&self, password: &str) -> Option<SecretKey> {
        match self.open_key(password) {
            Ok(secret) => Some(secret),
            Err(_) => {
                warn!(address = %self.address, "account decrypt failed");
                None
            }
        }
    }

    /// Usable signing pair, or `None` when the password is wrong or the
    /// key does not match the stored address
    #[must_use]
    pub fn decrypted_pair(&self, password: &str) -> Option<Keypair> {
        let pair = Keypair::from_secret(self.decrypt_private_key(password)?);
        if pair.address() != self.address {
            warn!(address = %self.address, "decrypted key belongs to another address");
            return None;
        }
        Some(pair)
    }

    /// Mnemonic phrase, or `None` when none was stored or the password is
    /// wrong
    #[must_use]
    pub fn decrypt_mnemonic(&self, password: &str) -> Option<String> {
        let sealed = self.mnemonic_enc.as_ref()?;
        let plain = decrypt_with_gcm(sealed, &self.address.to_base58(), &self.salt, password, self.scrypt)
            .map_err(|_| warn!(address = %self.address, "mnemonic decrypt failed"))
            .ok()?;
        let phrase = hex::decode(&*plain).ok()?;
        String::from_utf8(phrase).ok()
    }
}

/// How `search` matches its text
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchKind {
    /// Plain substring
    #[default]
    Substring,
    /// Regular expression
    Regex,
}

/// Account persistence
#[derive(Clone)]
pub struct AccountStore {
    db: Database,
    accounts: Collection<Account>,
}

impl AccountStore {
    /// Store over `db`
    pub fn new(db: &Database) -> ServiceResult<Self> {
        Ok(Self {
            db: db.clone(),
            accounts: db.collection(ACCOUNT_COLLECTION)?,
        })
    }

    /// Persist a new account.
    ///
    /// An admin account first claims the admin marker; a second admin gets
    /// [`ServiceError::Duplicated`] even when both saves race.
    pub fn save(&self, account: &Account) -> ServiceResult<()> {
        let key = account.address.to_base58();
        if account.is_admin() && !self.db.claim_unique(ADMIN_MARKER, &key)? {
            warn!(address = %key, "admin account already exists");
            return Err(ServiceError::Duplicated);
        }
        if let Err(err) = self.accounts.insert(&key, account) {
            if account.is_admin() {
                self.db.release_unique(ADMIN_MARKER, &key)?;
            }
            return Err(err.into());
        }
        info!(address = %key, label = %account.label, "account saved");
        Ok(())
    }

    /// Account with base58 `address`
    pub fn find_by_address(&self, address: &str) -> ServiceResult<Option<Account>> {
        Ok(self.accounts.find_one(address)?)
    }

    /// The admin account, if one was saved
    pub fn find_admin(&self) -> ServiceResult<Option<Account>> {
        match self.db.unique_holder(ADMIN_MARKER)? {
            Some(address) => self.find_by_address(&address),
            None => Ok(None),
        }
    }

    /// Every account
    pub fn all(&self) -> ServiceResult<Vec<Account>> {
        Ok(self.accounts.all()?)
    }

    /// Accounts whose address or label matches `text`, optionally
    /// restricted to `role`
    pub fn search(
        &self,
        text: &str,
        role: Option<AccountRole>,
        kind: SearchKind,
    ) -> ServiceResult<Vec<Account>> {
        let matcher: Box<dyn Fn(&str) -> bool> = match kind {
            SearchKind::Substring => {
                let needle = text.to_string();
                Box::new(move |s| s.contains(&needle))
            }
            SearchKind::Regex => {
                let re = Regex::new(text).map_err(|e| ServiceError::bad_request(e.to_string()))?;
                Box::new(move |s| re.is_match(s))
            }
        };
        Ok(self.accounts.find_many(|a| {
            role.map_or(true, |r| a.role == Some(r))
                && (matcher(&a.address.to_base58()) || matcher(&a.label))
        })?)
    }

    /// Remove every account and the admin marker
    pub fn clear(&self) -> ServiceResult<()> {
        if let Some(admin) = self.db.unique_holder(ADMIN_MARKER)? {
            self.db.release_unique(ADMIN_MARKER, &admin)?;
        }
        Ok(self.accounts.drop_all()?)
    }
}
