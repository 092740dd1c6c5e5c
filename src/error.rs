//! Service error taxonomy.
//!
//! Every fallible service operation returns [`ServiceError`]. Each variant
//! carries a stable numeric code that the HTTP layer reports in the `error`
//! field of every response; `0` is reserved for success.

use thiserror::Error;

use crate::chain::ChainError;
use crate::store::StoreError;
use crate::types::AddressError;
use crate::vm::VmError;
use crate::wallet::WalletError;

/// Success sentinel reported by the HTTP layer
pub const SUCCESS: u32 = 0;

/// Numeric codes, grouped by origin
pub mod codes {
    /// Transaction included but the VM reported a non-success state
    pub const TRANSACTION_FAILED: u32 = 1;
    /// Chain unreachable or submission rejected
    pub const TRANSACTION_ERROR: u32 = 2;

    /// Record already exists
    pub const DUPLICATED: u32 = 10003;
    /// Malformed request
    pub const BAD_REQUEST: u32 = 10400;
    /// Missing or undecryptable credentials
    pub const UNAUTHORIZED: u32 = 10401;
    /// Record not found
    pub const NOT_FOUND: u32 = 10404;
    /// Unexpected failure or malformed chain response
    pub const INTERNAL_ERROR: u32 = 10500;
    /// Dependency not available
    pub const SERVICE_UNAVAILABLE: u32 = 10503;

    /// Contract rejected the call with a message
    pub const CONTRACT_FAILED: u32 = 20001;
    /// Caller lacks the role required by the method
    pub const CONTRACT_UNAUTHORIZED: u32 = 20401;
    /// Offered price below the current minimum
    pub const CONTRACT_NOT_ENOUGH_PRICE: u32 = 20402;
    /// Contract admin not initialized yet
    pub const CONTRACT_NOT_INITIALIZED: u32 = 20403;
    /// Contract admin already initialized
    pub const CONTRACT_HAS_INITIALIZED: u32 = 20404;

    /// Insert was not acknowledged
    pub const DB_INSERT_FAILED: u32 = 30001;
    /// Store unavailable or write failed
    pub const DB_ERROR: u32 = 30500;
}

/// Errors surfaced by service operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ServiceError {
    /// On-chain execution failed
    #[error("transaction failed on chain")]
    TransactionFailed,
    /// Transport-level failure talking to the chain
    #[error("transaction error: {0}")]
    TransactionError(String),
    /// Duplicate record
    #[error("duplicated")]
    Duplicated,
    /// Invalid input
    #[error("bad request: {0}")]
    BadRequest(String),
    /// Credentials missing or wrong
    #[error("unauthorized")]
    Unauthorized,
    /// Record not found
    #[error("not found")]
    NotFound,
    /// Unexpected internal failure
    #[error("internal error: {0}")]
    Internal(String),
    /// Dependency not available
    #[error("service unavailable")]
    ServiceUnavailable,
    /// Contract-level failure with its message
    #[error("contract failed: {0}")]
    ContractFailed(String),
    /// Contract-level authorization failure
    #[error("contract unauthorized")]
    ContractUnauthorized,
    /// Price too low
    #[error("not enough price")]
    ContractNotEnoughPrice,
    /// Admin not initialized
    #[error("contract admin not initialized")]
    ContractNotInitialized,
    /// Admin already initialized
    #[error("contract admin already initialized")]
    ContractHasInitialized,
    /// Contract-specific status code
    #[error("contract returned code {0}")]
    Contract(u32),
    /// Insert not acknowledged
    #[error("database insert failed")]
    DbInsertFailed,
    /// Store failure
    #[error("database error: {0}")]
    DbError(String),
}

impl ServiceError {
    /// Numeric code reported to clients
    #[must_use]
    pub fn code(&self) -> u32 {
        match self {
            Self::TransactionFailed => codes::TRANSACTION_FAILED,
            Self::TransactionError(_) => codes::TRANSACTION_ERROR,
            Self::Duplicated => codes::DUPLICATED,
            Self::BadRequest(_) => codes::BAD_REQUEST,
            Self::Unauthorized => codes::UNAUTHORIZED,
            Self::NotFound => codes::NOT_FOUND,
            Self::Internal(_) => codes::INTERNAL_ERROR,
            Self::ServiceUnavailable => codes::SERVICE_UNAVAILABLE,
            Self::ContractFailed(_) => codes::CONTRACT_FAILED,
            Self::ContractUnauthorized => codes::CONTRACT_UNAUTHORIZED,
            Self::ContractNotEnoughPrice => codes::CONTRACT_NOT_ENOUGH_PRICE,
            Self::ContractNotInitialized => codes::CONTRACT_NOT_INITIALIZED,
            Self::ContractHasInitialized => codes::CONTRACT_HAS_INITIALIZED,
            Self::Contract(code) => *code,
            Self::DbInsertFailed => codes::DB_INSERT_FAILED,
            Self::DbError(_) => codes::DB_ERROR,
        }
    }

    /// Map a non-zero status code emitted by a contract notification.
    ///
    /// Codes the service knows by name get their variant, anything else is
    /// carried through untouched as [`ServiceError::Contract`].
    #[must_use]
    pub fn from_contract_code(code: u32) -> Self {
        match code {
            codes::CONTRACT_UNAUTHORIZED => Self::ContractUnauthorized,
            codes::CONTRACT_NOT_ENOUGH_PRICE => Self::ContractNotEnoughPrice,
            codes::CONTRACT_NOT_INITIALIZED => Self::ContractNotInitialized,
            codes::CONTRACT_HAS_INITIALIZED => Self::ContractHasInitialized,
            other => Self::Contract(other),
        }
    }

    /// Shorthand for [`ServiceError::BadRequest`]
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    /// Shorthand for [`ServiceError::Internal`]
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }
}

impl From<ChainError> for ServiceError {
    fn from(err: ChainError) -> Self {
        match err {
            // an undecodable reply may belong to a committed transaction
            ChainError::Decode(_) => Self::Internal(err.to_string()),
            ChainError::Transport(_) | ChainError::Unavailable(_) => {
                Self::TransactionError(err.to_string())
            }
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Duplicate(_) => Self::Duplicated,
            other => Self::DbError(other.to_string()),
        }
    }
}

impl From<AddressError> for ServiceError {
    fn from(err: AddressError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<VmError> for ServiceError {
    fn from(err: VmError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

impl From<WalletError> for ServiceError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Crypto(e) => Self::Internal(e.to_string()),
            WalletError::Store(e) => e.into(),
            other => Self::BadRequest(other.to_string()),
        }
    }
}

/// Result alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(ServiceError::TransactionFailed.code(), 1);
        assert_eq!(ServiceError::TransactionError(String::new()).code(), 2);
        assert_eq!(ServiceError::Duplicated.code(), 10003);
        assert_eq!(ServiceError::ContractUnauthorized.code(), 20401);
        assert_eq!(ServiceError::DbInsertFailed.code(), 30001);
    }

    #[test]
    fn test_contract_codes_pass_through() {
        assert_eq!(
            ServiceError::from_contract_code(20402),
            ServiceError::ContractNotEnoughPrice
        );
        assert_eq!(ServiceError::from_contract_code(777), ServiceError::Contract(777));
        assert_eq!(ServiceError::from_contract_code(777).code(), 777);
    }

    #[test]
    fn test_input_errors_are_bad_requests() {
        let err: ServiceError = AddressError::InvalidLength(3).into();
        assert_eq!(err.code(), codes::BAD_REQUEST);
        let err: ServiceError = VmError::NestedArray.into();
        assert_eq!(err.code(), codes::BAD_REQUEST);
    }

    #[test]
    fn test_chain_errors_by_kind() {
        let err: ServiceError = ChainError::Transport("refused".into()).into();
        assert_eq!(err.code(), codes::TRANSACTION_ERROR);
        let err: ServiceError = ChainError::Unavailable("bad uri".into()).into();
        assert_eq!(err.code(), codes::TRANSACTION_ERROR);
        let err: ServiceError = ChainError::Decode("missing field `State`".into()).into();
        assert!(matches!(err, ServiceError::Internal(_)));
        assert_eq!(err.code(), codes::INTERNAL_ERROR);
    }

    #[test]
    fn test_store_duplicate_maps_to_duplicated() {
        let err: ServiceError = StoreError::Duplicate("k".into()).into();
        assert_eq!(err, ServiceError::Duplicated);
    }
}
