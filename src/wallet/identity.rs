//! Decentralized identities (OntIDs).
//!
//! An identity is only recorded after its registration transaction reached
//! the success state on chain. Each control key is sealed independently
//! under the identity password and addressed by a 1-based key number.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::{seal, KeyParameters, ALGORITHM};
use crate::chain::ChainHandle;
use crate::crypto::{decrypt_with_gcm, random_salt, Keypair, ScryptParams, SecretKey};
use crate::error::{ServiceError, ServiceResult};
use crate::store::{Collection, Database, StoreError};
use crate::transaction::Transaction;
use crate::types::{now_millis, Address, Timestamp};
use crate::vm::{native_invoke_code, NativeValue};

/// Native identity registry contract
pub const ONTID_CONTRACT: Address = Address::native(3);
/// Prefix of identity strings
pub const ONTID_PREFIX: &str = "did:ont:";
/// Collection holding identity records
pub const ONTID_COLLECTION: &str = "ontid";

const METHOD_REGISTER: &str = "regIDWithPublicKey";
const METHOD_ADD_KEY: &str = "addKey";

/// One sealed control key of an identity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlKey {
    /// `<ontid>#keys-<n>`
    pub id: String,
    /// Address of the key
    pub address: Address,
    /// Sealed private key, base64
    pub key: String,
    /// Base64 salt
    pub salt: String,
    /// Key algorithm label
    pub algorithm: String,
    /// Curve parameters
    pub parameters: KeyParameters,
}

/// A registered identity
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OntId {
    /// Identity string
    pub ontid: String,
    /// Display name
    pub label: String,
    /// Control keys, key number `n` at index `n - 1`
    pub controls: Vec<ControlKey>,
    /// Key-derivation cost shared by all control keys
    pub scrypt: ScryptParams,
    /// Role tags
    #[serde(default)]
    pub roles: Vec<String>,
    /// Creation time, milliseconds since the epoch
    pub created_at: Timestamp,
}

fn seal_control(
    ontid: &str,
    key_no: usize,
    control: &Keypair,
    password: &str,
    scrypt: ScryptParams,
) -> Result<ControlKey, super::WalletError> {
    let salt = random_salt();
    let key = seal(&control.secret_key().to_bytes(), &control.address(), &salt, password, scrypt)?;
    Ok(ControlKey {
        id: format!("{ontid}#keys-{key_no}"),
        address: control.address(),
        key,
        salt,
        algorithm: ALGORITHM.to_string(),
        parameters: KeyParameters::default(),
    })
}

/// Registration call for `ontid` controlled by `control`
pub fn register_tx(
    ontid: &str,
    control: &Keypair,
    gas_price: u64,
    gas_limit: u64,
    payer: Address,
) -> ServiceResult<Transaction> {
    let code = native_invoke_code(
        &ONTID_CONTRACT,
        METHOD_REGISTER,
        &[NativeValue::Struct(vec![
            NativeValue::str(ontid),
            NativeValue::bytes(control.public_key().as_bytes()),
        ])],
    )?;
    Ok(Transaction::invoke(code, gas_price, gas_limit, payer))
}

impl OntId {
    /// Generate a control key, register the identity on chain and return
    /// the record once the registration succeeded.
    ///
    /// `funder` pays the fee; both the funder and the new control key sign.
    /// Nothing is persisted here.
    pub async fn create(
        chain: &ChainHandle,
        funder: &Keypair,
        label: &str,
        password: &str,
        scrypt: Option<ScryptParams>,
    ) -> ServiceResult<Self> {
        let scrypt = scrypt.unwrap_or_default();
        let control = Keypair::generate();
        let ontid = format!("{ONTID_PREFIX}{}", control.address());

        let cfg = chain.config();
        let mut tx = register_tx(&ontid, &control, cfg.gas_price, cfg.gas_limit, funder.address())?;
        tx.sign(funder);
        tx.sign(&control);
        chain.commit(&tx).await?;
        info!(%ontid, tx = %tx.hash_hex(), "identity registered");

        Ok(Self {
            controls: vec![seal_control(&ontid, 1, &control, password, scrypt)?],
            ontid,
            label: label.to_string(),
            scrypt,
            roles: Vec::new(),
            created_at: now_millis(),
        })
    }

    /// Register a fresh control key on chain, authorized by key `key_no`,
    /// and append it. Returns the new key number.
    pub async fn add_control_key(
        &mut self,
        chain: &ChainHandle,
        funder: &Keypair,
        password: &str,
        key_no: u32,
    ) -> ServiceResult<u32> {
        let controller = self
            .decrypted_controller(password, key_no)
            .ok_or(ServiceError::Unauthorized)?;
        let fresh = Keypair::generate();

        let code = native_invoke_code(
            &ONTID_CONTRACT,
            METHOD_ADD_KEY,
            &[NativeValue::Struct(vec![
                NativeValue::str(&self.ontid),
                NativeValue::bytes(fresh.public_key().as_bytes()),
                NativeValue::bytes(controller.public_key().as_bytes()),
            ])],
        )?;
        let cfg = chain.config();
        let mut tx = Transaction::invoke(code, cfg.gas_price, cfg.gas_limit, funder.address());
        tx.sign(funder);
        tx.sign(&controller);
        chain.commit(&tx).await?;

        let next = self.controls.len() + 1;
        self.controls
            .push(seal_control(&self.ontid, next, &fresh, password, self.scrypt)?);
        info!(ontid = %self.ontid, key_no = next, "control key added");
        Ok(next as u32)
    }

    /// Signing pair of control key `key_no` (1-based); `None` for an
    /// unknown key number or a wrong password
    #[must_use]
    pub fn decrypted_controller(&self, password: &str, key_no: u32) -> Option<Keypair> {
        let index = usize::try_from(key_no).ok()?.checked_sub(1)?;
        let control = self.controls.get(index)?;
        let plain = decrypt_with_gcm(
            &control.key,
            &control.address.to_base58(),
            &control.salt,
            password,
            self.scrypt,
        )
        .map_err(|_| warn!(ontid = %self.ontid, key_no, "controller decrypt failed"))
        .ok()?;
        let pair = Keypair::from_secret(SecretKey::from_bytes(&plain).ok()?);
        (pair.address() == control.address).then_some(pair)
    }

    /// Add a role tag; `false` if it was already present
    pub fn add_role(&mut self, role: &str) -> bool {
        if self.roles.iter().any(|r| r == role) {
            return false;
        }
        self.roles.push(role.to_string());
        true
    }
}

/// Identity persistence
#[derive(Clone)]
pub struct OntIdStore {
    ontids: Collection<OntId>,
}

impl OntIdStore {
    /// Store over `db`
    pub fn new(db: &Database) -> ServiceResult<Self> {
        Ok(Self {
            ontids: db.collection(ONTID_COLLECTION)?,
        })
    }

    /// Persist a registered identity
    pub fn save(&self, ontid: &OntId) -> ServiceResult<()> {
        self.ontids.insert(&ontid.ontid, ontid)?;
        Ok(())
    }

    /// Overwrite an identity, e.g. after adding a control key
    pub fn replace(&self, ontid: &OntId) -> ServiceResult<()> {
        self.ontids.replace(&ontid.ontid, ontid)?;
        Ok(())
    }

    /// Identity by its string
    pub fn find_by_id(&self, ontid: &str) -> ServiceResult<Option<OntId>> {
        Ok(self.ontids.find_one(ontid)?)
    }

    /// Append `role` to the stored identity
    pub fn add_role(&self, ontid: &str, role: &str) -> ServiceResult<OntId> {
        self.ontids
            .update(ontid, |record| {
                record.add_role(role);
                Ok(())
            })
            .map_err(|err| match err {
                StoreError::NotFound(_) => ServiceError::NotFound,
                other => other.into(),
            })
    }

    /// Remove every identity
    pub fn clear(&self) -> ServiceResult<()> {
        Ok(self.ontids.drop_all()?)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chain::testing::ScriptedChain;
    use crate::config::OntologyConfig;
    use crate::crypto::FAST_SCRYPT;

    fn chain() -> (Arc<ScriptedChain>, ChainHandle) {
        let fake = Arc::new(ScriptedChain::default());
        let handle = ChainHandle::with_client(OntologyConfig::default(), fake.clone());
        (fake, handle)
    }

    #[tokio::test]
    async fn test_create_registers_then_returns() {
        let (fake, handle) = chain();
        fake.push_success(0, vec![]);
        let funder = Keypair::generate();
        let id = OntId::create(&handle, &funder, "me", "pw", Some(FAST_SCRYPT))
            .await
            .unwrap();

        assert!(id.ontid.starts_with(ONTID_PREFIX));
        assert_eq!(id.controls.len(), 1);
        assert_eq!(id.controls[0].id, format!("{}#keys-1", id.ontid));

        let sent = &fake.submitted()[0];
        assert!(!sent.pre_exec);
        assert_eq!(sent.payer(), funder.address());
        assert!(sent.contains(METHOD_REGISTER.as_bytes()));
        assert!(sent.contains(id.ontid.as_bytes()));

        let controller = id.decrypted_controller("pw", 1).unwrap();
        assert_eq!(controller.address(), id.controls[0].address);
        assert_eq!(
            id.ontid,
            format!("{ONTID_PREFIX}{}", controller.address())
        );
    }

    #[tokio::test]
    async fn test_create_fails_when_registration_fails() {
        let (fake, handle) = chain();
        fake.push_vm_failure();
        let funder = Keypair::generate();
        assert_eq!(
            OntId::create(&handle, &funder, "me", "pw", Some(FAST_SCRYPT)).await,
            Err(ServiceError::TransactionFailed)
        );

        fake.push_node_error(41001);
        assert!(matches!(
            OntId::create(&handle, &funder, "me", "pw", Some(FAST_SCRYPT)).await,
            Err(ServiceError::TransactionError(_))
        ));
    }

    #[tokio::test]
    async fn test_controller_key_numbers() {
        let (fake, handle) = chain();
        fake.push_success(0, vec![]);
        let funder = Keypair::generate();
        let mut id = OntId::create(&handle, &funder, "me", "pw", Some(FAST_SCRYPT))
            .await
            .unwrap();

        assert!(id.decrypted_controller("pw", 0).is_none());
        assert!(id.decrypted_controller("pw", 2).is_none());
        assert!(id.decrypted_controller("bad", 1).is_none());

        fake.push_success(0, vec![]);
        let n = id.add_control_key(&handle, &funder, "pw", 1).await.unwrap();
        assert_eq!(n, 2);
        let second = id.decrypted_controller("pw", 2).unwrap();
        assert_ne!(second.address(), id.decrypted_controller("pw", 1).unwrap().address());
        assert!(fake.submitted()[1].contains(METHOD_ADD_KEY.as_bytes()));

        assert_eq!(
            id.add_control_key(&handle, &funder, "bad", 1).await,
            Err(ServiceError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn test_store_round_trip_and_roles() {
        let (fake, handle) = chain();
        fake.push_success(0, vec![]);
        let funder = Keypair::generate();
        let id = OntId::create(&handle, &funder, "me", "pw", Some(FAST_SCRYPT))
            .await
            .unwrap();

        let store = OntIdStore::new(&Database::temporary().unwrap()).unwrap();
        store.save(&id).unwrap();
        assert_eq!(store.save(&id), Err(ServiceError::Duplicated));

        let found = store.find_by_id(&id.ontid).unwrap().unwrap();
        assert!(found.decrypted_controller("pw", 1).is_some());

        store.add_role(&id.ontid, "op").unwrap();
        let updated = store.add_role(&id.ontid, "op").unwrap();
        assert_eq!(updated.roles, vec!["op".to_string()]);
        assert_eq!(store.add_role("did:ont:missing", "op"), Err(ServiceError::NotFound));
    }
}
