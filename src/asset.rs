//! Native asset transfers and balances.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::chain::ChainHandle;
use crate::crypto::Keypair;
use crate::error::{ServiceError, ServiceResult};
use crate::transaction::Transaction;
use crate::types::Address;
use crate::vm::{native_invoke_code, NativeValue};

/// The two native assets
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AssetKind {
    /// Governance token
    Ont,
    /// Gas token
    Ong,
}

impl AssetKind {
    /// Native contract holding the asset
    #[must_use]
    pub const fn contract(self) -> Address {
        match self {
            Self::Ont => Address::native(1),
            Self::Ong => Address::native(2),
        }
    }
}

impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ont => "ONT",
            Self::Ong => "ONG",
        })
    }
}

impl FromStr for AssetKind {
    type Err = ServiceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ONT" => Ok(Self::Ont),
            "ONG" => Ok(Self::Ong),
            _ => Err(ServiceError::bad_request(format!("unknown asset {s}"))),
        }
    }
}

/// Balances as reported by the node
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct AssetBalance {
    /// ONT balance
    pub ont: String,
    /// ONG balance
    pub ong: String,
}

/// Unsigned transfer of `amount` units of `asset` from `from` to `to`
pub fn transfer_tx(
    asset: AssetKind,
    amount: u64,
    from: Address,
    to: Address,
    gas_price: u64,
    gas_limit: u64,
) -> ServiceResult<Transaction> {
    let amount = i64::try_from(amount).map_err(|_| ServiceError::bad_request("amount too large"))?;
    let state = NativeValue::Struct(vec![
        NativeValue::Address(from),
        NativeValue::Address(to),
        NativeValue::Int(amount),
    ]);
    let code = native_invoke_code(&asset.contract(), "transfer", &[NativeValue::Array(vec![state])])?;
    Ok(Transaction::invoke(code, gas_price, gas_limit, from))
}

/// Transfer and wait for confirmation. Transfers are committed directly,
/// without a dry run.
pub async fn transfer(
    chain: &ChainHandle,
    asset: AssetKind,
    amount: u64,
    from: &Keypair,
    to: &Address,
) -> ServiceResult<String> {
    if amount == 0 {
        return Err(ServiceError::bad_request("amount must be positive"));
    }
    let cfg = chain.config();
    let mut tx = transfer_tx(asset, amount, from.address(), *to, cfg.gas_price, cfg.gas_limit)?;
    tx.sign(from);
    match chain.commit(&tx).await {
        Ok(_) => {
            info!(%asset, amount, from = %from.address(), %to, tx = %tx.hash_hex(), "transfer");
            Ok(tx.hash_hex())
        }
        Err(err) => {
            error!(%asset, amount, from = %from.address(), %to, error = %err, "transfer failed");
            Err(err)
        }
    }
}

/// Current balances of `address`
pub async fn balance(chain: &ChainHandle, address: &Address) -> ServiceResult<AssetBalance> {
    let response = chain.client().await?.get_balance(address).await?;
    if !response.is_ok() {
        error!(%address, code = response.error, "get balance failed");
        return Err(ServiceError::TransactionError(response.desc));
    }
    let result = response
        .result
        .ok_or_else(|| ServiceError::internal("balance response without result"))?;
    Ok(AssetBalance {
        ont: result.ont,
        ong: result.ong,
    })
}

fn parse_amount(value: &str) -> ServiceResult<u64> {
    value
        .parse()
        .map_err(|_| ServiceError::internal(format!("unparseable balance {value}")))
}

/// Top `address` up to at least `min_ont` / `min_ong`, paid by `funder`
pub async fn ensure_assets(
    chain: &ChainHandle,
    address: &Address,
    min_ont: u64,
    min_ong: u64,
    funder: &Keypair,
) -> ServiceResult<()> {
    let current = balance(chain, address).await?;
    let missing_ont = min_ont.saturating_sub(parse_amount(&current.ont)?);
    let missing_ong = min_ong.saturating_sub(parse_amount(&current.ong)?);
    if missing_ont > 0 {
        transfer(chain, AssetKind::Ont, missing_ont, funder, address).await?;
    }
    if missing_ong > 0 {
        transfer(chain, AssetKind::Ong, missing_ong, funder, address).await?;
    }
    Ok(())
}
