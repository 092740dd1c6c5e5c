//! [`ChainClient`] over the node's REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::{Balance, ChainClient, ChainError, ChainResponse, SubmitResult, TxOutcome};
use crate::config::OntologyConfig;
use crate::types::Address;

const API_PREFIX: &str = "api/v1";

#[derive(Serialize)]
struct SendRawTransaction<'a> {
    #[serde(rename = "Action")]
    action: &'static str,
    #[serde(rename = "Version")]
    version: &'static str,
    #[serde(rename = "Data")]
    data: &'a str,
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(rename = "Error")]
    error: i64,
    #[serde(rename = "Desc", default)]
    desc: String,
    #[serde(rename = "Result", default)]
    result: serde_json::Value,
}

impl RawResponse {
    fn into_typed<T: DeserializeOwned>(self) -> Result<ChainResponse<T>, ChainError> {
        let Self { error, desc, result } = self;
        let result = match result {
            serde_json::Value::Null => None,
            serde_json::Value::String(s) if s.is_empty() => None,
            value if error == 0 => Some(
                serde_json::from_value(value).map_err(|e| ChainError::Decode(e.to_string()))?,
            ),
            _ => None,
        };
        Ok(ChainResponse {
            error,
            desc,
            result,
        })
    }
}

/// REST client for one node
pub struct RestClient {
    base: Url,
    http: Client,
}

impl RestClient {
    /// Build a client for `config.uri`
    pub fn new(config: &OntologyConfig) -> Result<Self, ChainError> {
        let mut base = Url::parse(&config.uri).map_err(|e| ChainError::Unavailable(e.to_string()))?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ChainError::Unavailable(e.to_string()))?;
        Ok(Self { base, http })
    }

    fn url(&self, path: &str) -> Result<Url, ChainError> {
        self.base
            .join(&format!("{API_PREFIX}/{path}"))
            .map_err(|e| ChainError::Transport(e.to_string()))
    }

    async fn read<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<ChainResponse<T>, ChainError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        if !status.is_success() {
            warn!(%status, "node returned http error");
            return Err(ChainError::Transport(format!("http {status}")));
        }
        let raw: RawResponse =
            serde_json::from_str(&body).map_err(|e| ChainError::Decode(e.to_string()))?;
        if raw.error != 0 {
            debug!(error = raw.error, desc = %raw.desc, "node reported error");
        }
        raw.into_typed()
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<ChainResponse<T>, ChainError> {
        let response = self
            .http
            .get(self.url(path)?)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Self::read(response).await
    }
}

#[async_trait]
impl ChainClient for RestClient {
    async fn send_raw_transaction(
        &self,
        tx_hex: &str,
        pre_exec: bool,
        wait_notify: bool,
    ) -> Result<ChainResponse<SubmitResult>, ChainError> {
        let mut url = self.url("transaction")?;
        if pre_exec {
            url.set_query(Some("preExec=1"));
        } else if wait_notify {
            url.set_query(Some("waitNotify=1"));
        }
        let body = SendRawTransaction {
            action: "sendrawtransaction",
            version: "1.0.0",
            data: tx_hex,
        };
        let response = self
            .http
            .post(url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;
        Self::read(response).await
    }

    async fn get_balance(&self, address: &Address) -> Result<ChainResponse<Balance>, ChainError> {
        self.get(&format!("balance/{}", address.to_base58())).await
    }

    async fn get_smart_code_event(
        &self,
        tx_hash: &str,
    ) -> Result<ChainResponse<TxOutcome>, ChainError> {
        self.get(&format!("smartcode/event/txhash/{tx_hash}")).await
    }

    async fn get_contract(
        &self,
        contract: &Address,
    ) -> Result<ChainResponse<serde_json::Value>, ChainError> {
        self.get(&format!("contract/{}", contract.to_contract_hex()))
            .await
    }
}
