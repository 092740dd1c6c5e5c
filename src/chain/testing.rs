//! Scripted in-process chain for tests.
//!
//! Replies to `send_raw_transaction` are queued up front and consumed in
//! order; every submission is recorded so tests can assert what was sent
//! and in which mode.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{
    Balance, ChainClient, ChainError, ChainResponse, NotifyEvent, NotifyState, SubmitResult,
    TxOutcome,
};
use crate::types::Address;

/// One recorded submission
#[derive(Clone, Debug)]
pub struct Submission {
    /// Hex of the submitted transaction
    pub tx_hex: String,
    /// Dry run
    pub pre_exec: bool,
    /// Waited for the block notification
    pub wait_notify: bool,
}

impl Submission {
    fn bytes(&self) -> Vec<u8> {
        hex::decode(&self.tx_hex).unwrap_or_default()
    }

    /// Gas limit field of the submitted transaction
    pub fn gas_limit(&self) -> u64 {
        let bytes = self.bytes();
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes[14..22]);
        u64::from_le_bytes(buf)
    }

    /// Payer field of the submitted transaction
    pub fn payer(&self) -> Address {
        let bytes = self.bytes();
        let mut buf = [0u8; 20];
        buf.copy_from_slice(&bytes[22..42]);
        Address::from_bytes(buf)
    }

    /// Whether the hex contains `needle` (e.g. a pushed method name)
    pub fn contains(&self, needle: &[u8]) -> bool {
        self.tx_hex.contains(&hex::encode(needle))
    }
}

type Reply = Result<ChainResponse<SubmitResult>, ChainError>;

/// Chain fake with queued replies
#[derive(Default)]
pub struct ScriptedChain {
    replies: Mutex<VecDeque<Reply>>,
    submitted: Mutex<Vec<Submission>>,
    balances: Mutex<HashMap<Address, Balance>>,
    contracts: Mutex<HashMap<Address, serde_json::Value>>,
}

impl ScriptedChain {
    /// Queue a raw reply
    pub fn push_reply(&self, reply: Reply) -> &Self {
        self.replies.lock().unwrap().push_back(reply);
        self
    }

    /// Queue a successful execution with `gas` and `notify`
    pub fn push_success(&self, gas: u64, notify: Vec<NotifyEvent>) -> &Self {
        self.push_outcome(TxOutcome {
            state: super::STATE_SUCCESS,
            gas,
            tx_hash: Some("00".repeat(32)),
            notify,
            result: None,
        })
    }

    /// Queue an execution that ended in the fault state
    pub fn push_vm_failure(&self) -> &Self {
        self.push_outcome(TxOutcome {
            state: 0,
            ..TxOutcome::default()
        })
    }

    /// Queue an outcome
    pub fn push_outcome(&self, outcome: TxOutcome) -> &Self {
        self.push_reply(Ok(ChainResponse::ok(SubmitResult::Outcome(outcome))))
    }

    /// Queue a node-level error code
    pub fn push_node_error(&self, code: i64) -> &Self {
        self.push_reply(Ok(ChainResponse::failed(code, "scripted failure")))
    }

    /// Queue a transport failure
    pub fn push_transport_failure(&self) -> &Self {
        self.push_reply(Err(ChainError::Transport("connection refused".into())))
    }

    /// Set the balance returned for `address`
    pub fn set_balance(&self, address: Address, ont: u64, ong: u64) {
        self.balances.lock().unwrap().insert(
            address,
            Balance {
                ont: ont.to_string(),
                ong: ong.to_string(),
            },
        );
    }

    /// Mark a contract as deployed
    pub fn set_contract(&self, address: Address, info: serde_json::Value) {
        self.contracts.lock().unwrap().insert(address, info);
    }

    /// Everything submitted so far
    pub fn submitted(&self) -> Vec<Submission> {
        self.submitted.lock().unwrap().clone()
    }

    /// Replies not consumed yet
    pub fn pending_replies(&self) -> usize {
        self.replies.lock().unwrap().len()
    }
}

/// Notification from `contract` with the given states
pub fn notify(contract: &Address, states: Vec<NotifyState>) -> NotifyEvent {
    NotifyEvent {
        contract_address: contract.to_contract_hex(),
        states,
    }
}

/// Hex state holding `bytes`
pub fn hex_state(bytes: impl AsRef<[u8]>) -> NotifyState {
    NotifyState::Hex(hex::encode(bytes))
}

/// Little-endian hex state holding `n`, as contracts emit numbers
pub fn num_state(n: u64) -> NotifyState {
    let bytes = n.to_le_bytes();
    let len = bytes.iter().rposition(|b| *b != 0).map_or(0, |i| i + 1);
    NotifyState::Hex(hex::encode(&bytes[..len]))
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn send_raw_transaction(
        &self,
        tx_hex: &str,
        pre_exec: bool,
        wait_notify: bool,
    ) -> Result<ChainResponse<SubmitResult>, ChainError> {
        self.submitted.lock().unwrap().push(Submission {
            tx_hex: tx_hex.to_string(),
            pre_exec,
            wait_notify,
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ChainError::Transport("no scripted reply".into())))
    }

    async fn get_balance(&self, address: &Address) -> Result<ChainResponse<Balance>, ChainError> {
        let balance = self
            .balances
            .lock()
            .unwrap()
            .get(address)
            .cloned()
            .unwrap_or_else(|| Balance {
                ont: "0".into(),
                ong: "0".into(),
            });
        Ok(ChainResponse::ok(balance))
    }

    async fn get_smart_code_event(
        &self,
        _tx_hash: &str,
    ) -> Result<ChainResponse<TxOutcome>, ChainError> {
        Ok(ChainResponse {
            error: 0,
            desc: "SUCCESS".into(),
            result: None,
        })
    }

    async fn get_contract(
        &self,
        contract: &Address,
    ) -> Result<ChainResponse<serde_json::Value>, ChainError> {
        let found = self.contracts.lock().unwrap().get(contract).cloned();
        Ok(ChainResponse {
            error: 0,
            desc: "SUCCESS".into(),
            result: found,
        })
    }
}
