//! Process-wide service context.
//!
//! Built once at startup and shared with every request handler. It owns the
//! chain handle and the document store; nothing else in the crate keeps
//! global state.

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::chain::ChainHandle;
use crate::config::ServiceConfig;
use crate::contracts::{ContractEngine, ContractStore};
use crate::crypto::Keypair;
use crate::error::{ServiceError, ServiceResult};
use crate::store::Database;
use crate::wallet::{Account, AccountStore, OntId, OntIdStore};

/// Shared state of a running service
#[derive(Clone)]
pub struct AppContext {
    /// Loaded configuration
    pub config: Arc<ServiceConfig>,
    /// Chain client handle
    pub chain: Arc<ChainHandle>,
    /// Document store
    pub db: Database,
    /// Accounts
    pub accounts: AccountStore,
    /// Identities
    pub ontids: OntIdStore,
    /// Contracts
    pub contracts: ContractEngine,
}

impl AppContext {
    /// Context over an opened store and a chain handle
    pub fn new(config: ServiceConfig, db: Database, chain: Arc<ChainHandle>) -> ServiceResult<Self> {
        let contracts = ContractEngine::new(Arc::clone(&chain), ContractStore::new(&db)?);
        Ok(Self {
            accounts: AccountStore::new(&db)?,
            ontids: OntIdStore::new(&db)?,
            contracts,
            config: Arc::new(config),
            chain,
            db,
        })
    }

    /// Open the configured store; the chain client connects on first use
    pub fn open(config: ServiceConfig) -> ServiceResult<Self> {
        let db = Database::open(&config.database.path)?;
        info!(path = %config.database.path.display(), "store opened");
        let chain = Arc::new(ChainHandle::new(config.ontology.clone()));
        Self::new(config, db, chain)
    }

    /// Stored account `address` unlocked with `password`.
    /// Unknown accounts and wrong passwords are both `Unauthorized`.
    pub fn unlock_account(&self, address: &str, password: &str) -> ServiceResult<(Account, Keypair)> {
        let Some(account) = self.accounts.find_by_address(address)? else {
            warn!(address, "account not found");
            return Err(ServiceError::Unauthorized);
        };
        let pair = account
            .decrypted_pair(password)
            .ok_or(ServiceError::Unauthorized)?;
        Ok((account, pair))
    }

    /// Stored identity `ontid` with control key `key_no` unlocked
    pub fn unlock_ontid(&self, ontid: &str, password: &str, key_no: u32) -> ServiceResult<(OntId, Keypair)> {
        let Some(identity) = self.ontids.find_by_id(ontid)? else {
            warn!(ontid, "identity not found");
            return Err(ServiceError::Unauthorized);
        };
        let controller = identity
            .decrypted_controller(password, key_no)
            .ok_or(ServiceError::Unauthorized)?;
        Ok((identity, controller))
    }

    /// Close the chain client and flush the store
    pub async fn shutdown(&self) {
        self.chain.close().await;
        if let Err(err) = self.db.flush() {
            error!(error = %err, "store flush failed");
        }
        info!("service context closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::testing::ScriptedChain;
    use crate::crypto::FAST_SCRYPT;

    fn context() -> AppContext {
        let config = ServiceConfig::default();
        let chain = Arc::new(ChainHandle::with_client(
            config.ontology.clone(),
            Arc::new(ScriptedChain::default()),
        ));
        AppContext::new(config, Database::temporary().unwrap(), chain).unwrap()
    }

    #[test]
    fn test_unlock_account() {
        let ctx = context();
        let account = Account::create("me", "pw", Some(FAST_SCRYPT)).unwrap();
        ctx.accounts.save(&account).unwrap();
        let address = account.address.to_base58();

        let (_, pair) = ctx.unlock_account(&address, "pw").unwrap();
        assert_eq!(pair.address(), account.address);
        assert_eq!(
            ctx.unlock_account(&address, "wrong").map(|_| ()),
            Err(ServiceError::Unauthorized)
        );
        assert_eq!(
            ctx.unlock_account("AXmissing", "pw").map(|_| ()),
            Err(ServiceError::Unauthorized)
        );
    }

    #[test]
    fn test_unlock_missing_ontid() {
        let ctx = context();
        assert_eq!(
            ctx.unlock_ontid("did:ont:nobody", "pw", 1).map(|_| ()),
            Err(ServiceError::Unauthorized)
        );
    }

    #[tokio::test]
    async fn test_shutdown_is_repeatable() {
        let ctx = context();
        ctx.shutdown().await;
        ctx.shutdown().await;
    }
}
