//! Contract lifecycle and invocation.
//!
//! Every state-changing call goes through the same two phases: a dry run
//! that must succeed and reports the gas it used, then the real submission.
//! When the dry run used more gas than the configured limit, the limit is
//! raised to the observed value and the transaction re-signed, once.
//!
//! Records follow the chain, never lead it: nothing is persisted before the
//! matching transaction committed. If the store write fails after that, the
//! divergence is logged with the transaction hash and left for an operator;
//! [`ContractEngine::reconcile`] reports it without repairing anything.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use super::notify::decode_notifications;
use super::{Contract, ContractStore};
use crate::auth::{make_assign_funcs_to_role_tx, make_assign_ontids_to_role_tx, IdentityAuth};
use crate::chain::{ChainHandle, NotifyState, TxOutcome};
use crate::crypto::Keypair;
use crate::error::{ServiceError, ServiceResult};
use crate::store::StoreError;
use crate::transaction::Transaction;
use crate::types::Address;
use crate::vm::{build_invoke_code, Parameter};

/// Outcome of an invocation or query
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    /// Hash of the committed transaction; absent for queries
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Gas used
    pub gas: u64,
    /// Notification output of the contract, status stripped
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Vec<NotifyState>>,
    /// Return value reported by a dry run
    #[serde(skip_serializing_if = "Option::is_none")]
    pub returned: Option<NotifyState>,
}

/// New script and metadata for a migration. Absent metadata keeps the
/// stored value.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct MigrateRequest {
    /// Hex-encoded replacement script
    pub script: String,
    /// New version, must differ from the stored one
    pub version: String,
    /// Storage flag
    #[serde(default)]
    pub storage: Option<bool>,
    /// Author
    #[serde(default)]
    pub author: Option<String>,
    /// Contact email
    #[serde(default)]
    pub email: Option<String>,
    /// Description
    #[serde(default)]
    pub description: Option<String>,
}

/// Whether a recorded contract is still deployed
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Contract name
    pub name: String,
    /// Recorded address
    pub contract_address: Address,
    /// Whether the node knows a contract at that address
    pub on_chain: bool,
}

fn with_identity(mut params: Vec<Parameter>, identity: Option<&IdentityAuth>) -> Vec<Parameter> {
    if let Some(id) = identity {
        params.push(Parameter::string(&id.ontid));
        params.push(Parameter::Integer(i64::from(id.key_no)));
    }
    params
}

fn pick(update: Option<String>, current: &str) -> String {
    update
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| current.to_string())
}

fn ensure_admin(record: &Contract, admin: &IdentityAuth) -> ServiceResult<()> {
    match &record.admin_ontid {
        None => Err(ServiceError::ContractNotInitialized),
        Some(current) if current.ontid != admin.ontid => {
            warn!(contract = %record.name, ontid = %admin.ontid, "caller is not the contract admin");
            Err(ServiceError::Unauthorized)
        }
        Some(_) => Ok(()),
    }
}

/// Deploys, invokes and administers contracts
#[derive(Clone)]
pub struct ContractEngine {
    chain: Arc<ChainHandle>,
    store: ContractStore,
}

impl ContractEngine {
    /// Engine over a chain handle and a contract store
    #[must_use]
    pub const fn new(chain: Arc<ChainHandle>, store: ContractStore) -> Self {
        Self { chain, store }
    }

    /// Contract records
    #[must_use]
    pub const fn store(&self) -> &ContractStore {
        &self.store
    }

    /// Dry-run `tx`, then commit it. The gas limit is raised at most once.
    async fn dry_run_then_commit(
        &self,
        tx: &mut Transaction,
        signer: &Keypair,
        dry_run_fault: ServiceError,
    ) -> ServiceResult<TxOutcome> {
        let dry = self.chain.pre_execute(tx).await?;
        if !dry.succeeded() {
            error!(tx = %tx.hash_hex(), state = dry.state, "dry run failed");
            return Err(dry_run_fault);
        }
        if dry.gas > tx.gas_limit {
            info!(limit = tx.gas_limit, used = dry.gas, "raising gas limit");
            tx.set_gas_limit(dry.gas);
            tx.sign(signer);
        }
        self.chain.commit(tx).await
    }

    fn invoke_tx(
        &self,
        contract: &Contract,
        func: &str,
        params: &[Parameter],
        signer: &Keypair,
    ) -> ServiceResult<Transaction> {
        let code = build_invoke_code(&contract.contract_address, func, params)?;
        let cfg = self.chain.config();
        let mut tx = Transaction::invoke(code, cfg.gas_price, cfg.gas_limit, signer.address());
        tx.sign(signer);
        Ok(tx)
    }

    /// Persist a change whose chain side already committed
    fn persist_after_commit<F>(&self, name: &str, tx_hash: &str, mutate: F) -> ServiceResult<Contract>
    where
        F: FnMut(&mut Contract) -> Result<(), StoreError>,
    {
        self.store.update(name, mutate).map_err(|err| {
            error!(contract = name, tx = tx_hash, error = %err, "committed on chain but record not updated");
            err
        })
    }

    /// Deploy `contract` and record it once the deployment committed
    pub async fn deploy_and_save(&self, contract: Contract, signer: &Keypair) -> ServiceResult<Contract> {
        if self.store.exists(&contract.name)? {
            return Err(ServiceError::Duplicated);
        }
        let cfg = self.chain.config();
        let mut tx = Transaction::deploy(
            contract.deploy_code()?,
            cfg.gas_price,
            cfg.gas_limit,
            signer.address(),
        );
        tx.sign(signer);
        self.dry_run_then_commit(&mut tx, signer, ServiceError::TransactionFailed)
            .await?;
        info!(name = %contract.name, address = %contract.contract_address, tx = %tx.hash_hex(), "contract deployed");

        if let Err(err) = self.store.insert(&contract) {
            error!(name = %contract.name, tx = %tx.hash_hex(), error = %err, "deployed on chain but record not saved");
            return Err(match err {
                ServiceError::Duplicated => ServiceError::Duplicated,
                _ => ServiceError::DbInsertFailed,
            });
        }
        Ok(contract)
    }

    /// Call `func` and commit it.
    ///
    /// With an identity, its string and key number are appended as the two
    /// trailing parameters.
    pub async fn invoke(
        &self,
        contract: &Contract,
        func: &str,
        params: Vec<Parameter>,
        signer: &Keypair,
        identity: Option<&IdentityAuth>,
    ) -> ServiceResult<Invocation> {
        let params = with_identity(params, identity);
        let mut tx = self.invoke_tx(contract, func, &params, signer)?;
        let fault = ServiceError::TransactionError(format!("dry run of {func} failed"));
        let outcome = self
            .dry_run_then_commit(&mut tx, signer, fault)
            .await
            .map_err(|err| {
                error!(contract = %contract.name, func, error = %err, "invoke failed");
                err
            })?;
        let result = decode_notifications(&contract.contract_address, &outcome.notify)?;
        Ok(Invocation {
            tx_hash: Some(tx.hash_hex()),
            gas: outcome.gas,
            result,
            returned: outcome.result,
        })
    }

    /// Dry-run `func` without committing, decoded like [`Self::invoke`]
    pub async fn query(
        &self,
        contract: &Contract,
        func: &str,
        params: Vec<Parameter>,
        signer: &Keypair,
        identity: Option<&IdentityAuth>,
    ) -> ServiceResult<Invocation> {
        let params = with_identity(params, identity);
        let tx = self.invoke_tx(contract, func, &params, signer)?;
        let outcome = self.chain.pre_execute(&tx).await?;
        if !outcome.succeeded() {
            error!(contract = %contract.name, func, state = outcome.state, "query failed");
            return Err(ServiceError::TransactionError(format!("query of {func} failed")));
        }
        let result = decode_notifications(&contract.contract_address, &outcome.notify)?;
        Ok(Invocation {
            tx_hash: None,
            gas: outcome.gas,
            result,
            returned: outcome.result,
        })
    }

    /// Replace the script of `name` through its `Migrate` entry point
    pub async fn migrate(
        &self,
        name: &str,
        request: MigrateRequest,
        signer: &Keypair,
        identity: Option<&IdentityAuth>,
    ) -> ServiceResult<Contract> {
        let record = self.store.get(name)?;
        if record.version == request.version {
            return Err(ServiceError::bad_request("version unchanged"));
        }
        let mut next = record.clone();
        next.set_script(&request.script)?;
        next.version = request.version;
        next.storage = request.storage.unwrap_or(record.storage);
        next.author = pick(request.author, &record.author);
        next.email = pick(request.email, &record.email);
        next.description = pick(request.description, &record.description);

        let params = vec![
            Parameter::ByteArray(next.script.clone()),
            Parameter::Boolean(next.storage),
            Parameter::string(&next.name),
            Parameter::string(&next.version),
            Parameter::string(&next.author),
            Parameter::string(&next.email),
            Parameter::string(&next.description),
        ];
        let invocation = self.invoke(&record, "Migrate", params, signer, identity).await?;
        let tx_hash = invocation.tx_hash.unwrap_or_default();
        info!(name, from = %record.contract_address, to = %next.contract_address, tx = %tx_hash, "contract migrated");

        let updated = self.persist_after_commit(name, &tx_hash, |stored| {
            stored.script.clone_from(&next.script);
            stored.contract_address = next.contract_address;
            stored.version.clone_from(&next.version);
            stored.storage = next.storage;
            stored.author.clone_from(&next.author);
            stored.email.clone_from(&next.email);
            stored.description.clone_from(&next.description);
            Ok(())
        })?;
        self.store
            .move_address(&record.contract_address, &updated)
            .map_err(|err| {
                error!(name, tx = %tx_hash, error = %err, "address index not updated");
                err
            })?;
        Ok(updated)
    }

    /// Call `Destroy` on `name` and delete its record
    pub async fn destroy(
        &self,
        name: &str,
        signer: &Keypair,
        identity: Option<&IdentityAuth>,
    ) -> ServiceResult<()> {
        let record = self.store.get(name)?;
        let invocation = self.invoke(&record, "Destroy", Vec::new(), signer, identity).await?;
        let tx_hash = invocation.tx_hash.unwrap_or_default();
        info!(name, tx = %tx_hash, "contract destroyed");
        self.store.delete(&record).map_err(|err| {
            error!(name, tx = %tx_hash, error = %err, "destroyed on chain but record not deleted");
            err
        })
    }

    /// Make `admin` the root of the permission graph of `name`, signed by
    /// the admin's control key
    pub async fn init_admin(
        &self,
        name: &str,
        admin: &IdentityAuth,
        controller: &Keypair,
    ) -> ServiceResult<Contract> {
        let record = self.store.get(name)?;
        if record.admin_ontid.is_some() {
            return Err(ServiceError::ContractHasInitialized);
        }
        if admin.key_no == 0 {
            return Err(ServiceError::bad_request("key number must be positive"));
        }
        let invocation = self
            .invoke(&record, "InitAdmin", vec![Parameter::string(&admin.ontid)], controller, None)
            .await?;
        let tx_hash = invocation.tx_hash.unwrap_or_default();
        if invocation.result.is_none() {
            error!(name, tx = %tx_hash, "InitAdmin produced no status");
            return Err(ServiceError::TransactionFailed);
        }
        info!(name, admin = %admin.ontid, "contract admin initialized");
        self.persist_after_commit(name, &tx_hash, |stored| {
            stored.admin_ontid = Some(admin.clone());
            Ok(())
        })
    }

    /// Create `role` in the recorded graph. Roles exist on chain implicitly
    /// once something is assigned to them, so nothing is submitted.
    pub fn add_role_and_update(&self, name: &str, role: &str, admin: &IdentityAuth) -> ServiceResult<Contract> {
        let mut draft = self.store.get(name)?;
        ensure_admin(&draft, admin)?;
        draft.add_role(role)?;
        self.store.update(name, |stored| {
            stored
                .add_role(role)
                .map_err(|_| StoreError::Duplicate(role.to_string()))
        })
    }

    /// Grant `role` to `ontids` on chain, then record it
    pub async fn add_ontid_to_role_and_update(
        &self,
        name: &str,
        role: &str,
        ontids: &[String],
        admin: &IdentityAuth,
        controller: &Keypair,
    ) -> ServiceResult<Contract> {
        if ontids.is_empty() {
            return Err(ServiceError::bad_request("no identities given"));
        }
        let record = self.store.get(name)?;
        ensure_admin(&record, admin)?;
        let mut draft = record.clone();
        for ontid in ontids {
            draft.add_ontid_to_role(role, ontid)?;
        }

        let cfg = self.chain.config();
        let mut tx = make_assign_ontids_to_role_tx(
            &record.contract_address,
            admin,
            role,
            ontids,
            controller.address(),
            cfg.gas_price,
            cfg.gas_limit,
        )?;
        tx.sign(controller);
        self.chain.commit(&tx).await.map_err(|err| {
            error!(name, role, error = %err, "assignOntIDsToRole failed");
            err
        })?;
        info!(name, role, count = ontids.len(), "identities assigned to role");

        self.persist_after_commit(name, &tx.hash_hex(), |stored| {
            stored.merge_members(role, ontids);
            Ok(())
        })
    }

    /// Allow `role` to call `methods` on chain, then record it
    pub async fn assign_method_to_role_and_update(
        &self,
        name: &str,
        role: &str,
        methods: &[String],
        admin: &IdentityAuth,
        controller: &Keypair,
    ) -> ServiceResult<Contract> {
        if methods.is_empty() {
            return Err(ServiceError::bad_request("no methods given"));
        }
        let record = self.store.get(name)?;
        ensure_admin(&record, admin)?;
        let mut draft = record.clone();
        for method in methods {
            draft.assign_method_to_role(method, role)?;
        }

        let cfg = self.chain.config();
        let mut tx = make_assign_funcs_to_role_tx(
            &record.contract_address,
            admin,
            role,
            methods,
            controller.address(),
            cfg.gas_price,
            cfg.gas_limit,
        )?;
        tx.sign(controller);
        self.chain.commit(&tx).await.map_err(|err| {
            error!(name, role, error = %err, "assignFuncsToRole failed");
            err
        })?;
        info!(name, role, count = methods.len(), "methods assigned to role");

        self.persist_after_commit(name, &tx.hash_hex(), |stored| {
            stored.merge_methods(role, methods);
            Ok(())
        })
    }

    /// Ask the node whether the recorded contract is deployed. Never
    /// changes the record.
    pub async fn reconcile(&self, name: &str) -> ServiceResult<ReconcileReport> {
        let record = self.store.get(name)?;
        let response = self
            .chain
            .client()
            .await?
            .get_contract(&record.contract_address)
            .await?;
        if !response.is_ok() {
            error!(name, code = response.error, "contract lookup failed");
            return Err(ServiceError::TransactionError(response.desc));
        }
        let on_chain = response.result.is_some_and(|info| !info.is_null());
        if !on_chain {
            warn!(name, address = %record.contract_address, "recorded contract not found on chain");
        }
        Ok(ReconcileReport {
            name: record.name,
            contract_address: record.contract_address,
            on_chain,
        })
    }
}
