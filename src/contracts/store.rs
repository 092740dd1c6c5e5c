//! Contract persistence.
//!
//! Records are keyed by name. A second collection maps the base58 contract
//! address back to the name; it is rewritten whenever a migration changes
//! the address.

use tracing::error;

use super::Contract;
use crate::error::{ServiceError, ServiceResult};
use crate::store::{Collection, Database, StoreError};
use crate::types::Address;

/// Collection holding contract records
pub const CONTRACT_COLLECTION: &str = "contract";
/// Address index collection
pub const ADDRESS_INDEX: &str = "contract_by_address";

fn not_found_as_service(err: StoreError) -> ServiceError {
    match err {
        StoreError::NotFound(_) => ServiceError::NotFound,
        other => other.into(),
    }
}

/// Contract records and their address index
#[derive(Clone)]
pub struct ContractStore {
    contracts: Collection<Contract>,
    by_address: Collection<String>,
}

impl ContractStore {
    /// Store over `db`
    pub fn new(db: &Database) -> ServiceResult<Self> {
        Ok(Self {
            contracts: db.collection(CONTRACT_COLLECTION)?,
            by_address: db.collection(ADDRESS_INDEX)?,
        })
    }

    /// Record by name
    pub fn find(&self, name: &str) -> ServiceResult<Option<Contract>> {
        Ok(self.contracts.find_one(name)?)
    }

    /// Record by name, `NotFound` when absent
    pub fn get(&self, name: &str) -> ServiceResult<Contract> {
        self.find(name)?.ok_or(ServiceError::NotFound)
    }

    /// Whether a record named `name` exists
    pub fn exists(&self, name: &str) -> ServiceResult<bool> {
        Ok(self.contracts.contains(name)?)
    }

    /// Record by contract address
    pub fn find_by_address(&self, address: &Address) -> ServiceResult<Option<Contract>> {
        match self.by_address.find_one(&address.to_base58())? {
            Some(name) => self.find(&name),
            None => Ok(None),
        }
    }

    /// Every record
    pub fn all(&self) -> ServiceResult<Vec<Contract>> {
        Ok(self.contracts.all()?)
    }

    /// Insert a new record and index it
    pub fn insert(&self, contract: &Contract) -> ServiceResult<()> {
        self.contracts.insert(&contract.name, contract)?;
        self.by_address
            .replace(&contract.contract_address.to_base58(), &contract.name)?;
        Ok(())
    }

    /// Apply `mutate` to the stored record atomically
    pub fn update<F>(&self, name: &str, mutate: F) -> ServiceResult<Contract>
    where
        F: FnMut(&mut Contract) -> Result<(), StoreError>,
    {
        self.contracts.update(name, mutate).map_err(not_found_as_service)
    }

    /// Point the address index at `contract` after its address changed
    /// from `previous`
    pub fn move_address(&self, previous: &Address, contract: &Contract) -> ServiceResult<()> {
        if *previous != contract.contract_address {
            self.by_address.delete(&previous.to_base58())?;
        }
        self.by_address
            .replace(&contract.contract_address.to_base58(), &contract.name)?;
        Ok(())
    }

    /// Delete a record and its index entry; `NotFound` if nothing was
    /// stored under the name
    pub fn delete(&self, contract: &Contract) -> ServiceResult<()> {
        if let Err(err) = self.by_address.delete(&contract.contract_address.to_base58()) {
            error!(name = %contract.name, error = %err, "address index delete failed");
        }
        if self.contracts.delete(&contract.name)? {
            Ok(())
        } else {
            Err(ServiceError::NotFound)
        }
    }

    /// Remove every record
    pub fn clear(&self) -> ServiceResult<()> {
        self.contracts.drop_all()?;
        self.by_address.drop_all()?;
        Ok(())
    }
}
