//! Chain node access.
//!
//! [`ChainClient`] is the boundary to the node: submit a raw transaction
//! (optionally as a dry run, optionally waiting for the block notification),
//! query balances, events and deployed contracts. [`ChainHandle`] owns the
//! process-wide client, builds it lazily from [`OntologyConfig`] and closes
//! it at shutdown.

mod rest;
mod submit;
#[cfg(test)]
pub mod testing;

pub use rest::RestClient;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::config::OntologyConfig;
use crate::types::{contract_hex_to_number, Address};

/// Transport-level failures talking to the node
#[derive(Debug, Clone, Error)]
pub enum ChainError {
    /// Request could not be sent or timed out
    #[error("chain transport error: {0}")]
    Transport(String),
    /// Node answered with something that is not the expected schema
    #[error("malformed chain response: {0}")]
    Decode(String),
    /// Client could not be constructed
    #[error("chain client unavailable: {0}")]
    Unavailable(String),
}

/// Envelope of every node answer: non-zero `error` means the call did not
/// succeed and no state change may be assumed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainResponse<T> {
    /// Node error code, `0` on success
    pub error: i64,
    /// Node description of the error code
    pub desc: String,
    /// Payload; absent when the node returned nothing
    pub result: Option<T>,
}

impl<T> ChainResponse<T> {
    /// Successful response carrying `result`
    pub fn ok(result: T) -> Self {
        Self {
            error: 0,
            desc: "SUCCESS".into(),
            result: Some(result),
        }
    }

    /// Failed response
    pub fn failed(error: i64, desc: impl Into<String>) -> Self {
        Self {
            error,
            desc: desc.into(),
            result: None,
        }
    }

    /// Whether the node reported success
    pub fn is_ok(&self) -> bool {
        self.error == 0
    }
}

/// Result of `sendrawtransaction`: a bare hash when not waiting, an
/// execution outcome for dry runs and confirmed commits.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmitResult {
    /// Execution outcome
    Outcome(TxOutcome),
    /// Transaction hash only
    Hash(String),
}

impl SubmitResult {
    /// The outcome, if the node returned one
    #[must_use]
    pub fn outcome(&self) -> Option<&TxOutcome> {
        match self {
            Self::Outcome(o) => Some(o),
            Self::Hash(_) => None,
        }
    }
}

/// VM state value for a successful execution
pub const STATE_SUCCESS: i64 = 1;

/// Execution outcome of a transaction
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutcome {
    /// `1` on success
    #[serde(rename = "State")]
    pub state: i64,
    /// Gas used (dry run) or consumed (commit)
    #[serde(rename = "Gas", alias = "GasConsumed", default)]
    pub gas: u64,
    /// Hash of the committed transaction
    #[serde(rename = "TxHash", default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Notifications emitted during execution
    #[serde(rename = "Notify", default, deserialize_with = "null_as_default")]
    pub notify: Vec<NotifyEvent>,
    /// Return value of a dry run
    #[serde(rename = "Result", default, skip_serializing_if = "Option::is_none")]
    pub result: Option<NotifyState>,
}

impl TxOutcome {
    /// Whether the VM finished in the success state
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == STATE_SUCCESS
    }
}

/// A notification emitted by one contract
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyEvent {
    /// Emitting contract, byte-reversed hex
    #[serde(rename = "ContractAddress")]
    pub contract_address: String,
    /// Notification payload
    #[serde(rename = "States", default, deserialize_with = "null_as_default")]
    pub states: Vec<NotifyState>,
}

impl NotifyEvent {
    /// Whether this notification was emitted by `contract`
    #[must_use]
    pub fn is_from(&self, contract: &Address) -> bool {
        Address::from_contract_hex(&self.contract_address).is_ok_and(|a| a == *contract)
    }
}

/// One value in a notification payload
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NotifyState {
    /// Boolean
    Bool(bool),
    /// Plain number
    Int(i64),
    /// Byte string, normally hex encoded
    Hex(String),
    /// Nested list
    List(Vec<NotifyState>),
}

impl NotifyState {
    /// Hex payload as bytes
    #[must_use]
    pub fn as_bytes(&self) -> Option<Vec<u8>> {
        match self {
            Self::Hex(h) => hex::decode(h).ok(),
            _ => None,
        }
    }

    /// Text value: hex decoded to UTF-8, or the raw string when it is not hex
    #[must_use]
    pub fn as_utf8(&self) -> Option<String> {
        match self {
            Self::Hex(h) => match hex::decode(h) {
                Ok(bytes) => String::from_utf8(bytes).ok(),
                Err(_) => Some(h.clone()),
            },
            _ => None,
        }
    }

    /// Unsigned value: a plain number or little-endian hex
    #[must_use]
    pub fn as_number(&self) -> Option<u64> {
        match self {
            Self::Int(n) => u64::try_from(*n).ok(),
            Self::Hex(h) => contract_hex_to_number(h).ok(),
            Self::Bool(b) => Some(u64::from(*b)),
            Self::List(_) => None,
        }
    }

    /// Boolean value; VM booleans may arrive as `01` / `00` / empty
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::Int(n) => Some(*n != 0),
            Self::Hex(h) => contract_hex_to_number(h).ok().map(|n| n != 0),
            Self::List(_) => None,
        }
    }

    /// Nested list
    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

/// Native asset balances of an address, as decimal strings
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// ONT balance
    pub ont: String,
    /// ONG balance
    pub ong: String,
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Boundary to the chain node
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Submit a hex-encoded signed transaction.
    ///
    /// `pre_exec` runs it without committing; `wait_notify` blocks until the
    /// transaction is in a block and returns its outcome.
    async fn send_raw_transaction(
        &self,
        tx_hex: &str,
        pre_exec: bool,
        wait_notify: bool,
    ) -> Result<ChainResponse<SubmitResult>, ChainError>;

    /// Native asset balances of `address`
    async fn get_balance(&self, address: &Address) -> Result<ChainResponse<Balance>, ChainError>;

    /// Outcome and notifications of a committed transaction
    async fn get_smart_code_event(
        &self,
        tx_hash: &str,
    ) -> Result<ChainResponse<TxOutcome>, ChainError>;

    /// Deployed contract metadata, `None` result when nothing is deployed
    async fn get_contract(
        &self,
        contract: &Address,
    ) -> Result<ChainResponse<serde_json::Value>, ChainError>;

    /// Release the transport
    async fn close(&self) {}
}

/// Process-wide handle to the chain client.
///
/// The client is created on first use and can be closed explicitly; a later
/// use after `close` builds a fresh one.
pub struct ChainHandle {
    config: OntologyConfig,
    client: RwLock<Option<Arc<dyn ChainClient>>>,
}

impl ChainHandle {
    /// Handle that builds a [`RestClient`] from `config` on first use
    #[must_use]
    pub fn new(config: OntologyConfig) -> Self {
        Self {
            config,
            client: RwLock::new(None),
        }
    }

    /// Handle around an existing client
    #[must_use]
    pub fn with_client(config: OntologyConfig, client: Arc<dyn ChainClient>) -> Self {
        Self {
            config,
            client: RwLock::new(Some(client)),
        }
    }

    /// Transaction defaults
    #[must_use]
    pub const fn config(&self) -> &OntologyConfig {
        &self.config
    }

    /// The client, created on first call
    pub async fn client(&self) -> Result<Arc<dyn ChainClient>, ChainError> {
        if let Some(client) = self.client.read().await.as_ref() {
            return Ok(Arc::clone(client));
        }
        let mut slot = self.client.write().await;
        if let Some(client) = slot.as_ref() {
            return Ok(Arc::clone(client));
        }
        info!(uri = %self.config.uri, "connecting chain client");
        let client: Arc<dyn ChainClient> = Arc::new(RestClient::new(&self.config)?);
        *slot = Some(Arc::clone(&client));
        Ok(client)
    }

    /// Close and drop the client if one was created
    pub async fn close(&self) {
        let client = self.client.write().await.take();
        if let Some(client) = client {
            debug!("closing chain client");
            client.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submit_result_hash() {
        let r: SubmitResult = serde_json::from_str("\"abcd\"").unwrap();
        assert_eq!(r, SubmitResult::Hash("abcd".into()));
        assert!(r.outcome().is_none());
    }

    #[test]
    fn test_submit_result_pre_exec() {
        let r: SubmitResult =
            serde_json::from_str(r#"{"State":1,"Gas":20000,"Result":"0d","Notify":[]}"#).unwrap();
        let o = r.outcome().unwrap();
        assert!(o.succeeded());
        assert_eq!(o.gas, 20_000);
        assert_eq!(o.result, Some(NotifyState::Hex("0d".into())));
    }

    #[test]
    fn test_outcome_commit_shape() {
        let o: TxOutcome = serde_json::from_str(
            r#"{"TxHash":"ff","State":1,"GasConsumed":10000000,
                "Notify":[{"ContractAddress":"0100000000000000000000000000000000000000",
                           "States":["7472616e73666572", true, 13, ["00"]]}]}"#,
        )
        .unwrap();
        assert_eq!(o.gas, 10_000_000);
        assert_eq!(o.tx_hash.as_deref(), Some("ff"));
        let n = &o.notify[0];
        assert!(n.is_from(&Address::native(1)));
        assert!(!n.is_from(&Address::native(2)));
        assert_eq!(n.states[0].as_utf8().as_deref(), Some("transfer"));
        assert_eq!(n.states[1].as_bool(), Some(true));
        assert_eq!(n.states[2].as_number(), Some(13));
        assert_eq!(n.states[3].as_list().map(<[NotifyState]>::len), Some(1));
    }

    #[test]
    fn test_null_notify_is_empty() {
        let o: TxOutcome = serde_json::from_str(r#"{"State":0,"Gas":0,"Notify":null}"#).unwrap();
        assert!(o.notify.is_empty());
        assert!(!o.succeeded());
    }

    #[test]
    fn test_state_helpers() {
        assert_eq!(NotifyState::Hex(String::new()).as_number(), Some(0));
        assert_eq!(NotifyState::Hex("b24f".into()).as_number(), Some(20402));
        assert_eq!(NotifyState::Hex("verifyToken".into()).as_utf8().as_deref(), Some("verifyToken"));
        assert_eq!(NotifyState::Hex("00".into()).as_bool(), Some(false));
        assert_eq!(NotifyState::Int(-1).as_number(), None);
    }

    #[tokio::test]
    async fn test_handle_close_drops_client() {
        let fake = Arc::new(testing::ScriptedChain::default());
        let handle = ChainHandle::with_client(OntologyConfig::default(), fake);
        assert!(handle.client().await.is_ok());
        handle.close().await;
        assert!(handle.client.read().await.is_none());
    }
}
