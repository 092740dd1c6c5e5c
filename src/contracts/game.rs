//! Typed calls for the grid game contract.
//!
//! Players capture points of a square grid by paying more than the current
//! price of each point. The contract reports every point as
//! `[owner, color, price]`, where the owner is empty until the first
//! capture.

use serde::{Deserialize, Serialize};
use tracing::info;

use super::{Contract, ContractEngine, Invocation};
use crate::chain::NotifyState;
use crate::crypto::Keypair;
use crate::error::{ServiceError, ServiceResult};
use crate::types::{Address, ADDRESS_SIZE};
use crate::vm::Parameter;

/// One grid point
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    /// Base58 owner, empty when never captured
    pub owner: String,
    /// RGB color
    pub color: u64,
    /// Current price
    pub price: u64,
}

/// The whole grid, row by row
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridPoints {
    /// Side length of the grid
    pub max_line: u64,
    /// `max_line * max_line` points
    pub points: Vec<Point>,
}

/// Build and tuning info reported by the contract
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractInfo {
    /// Build date
    pub build_date: String,
    /// Commit the contract was built from
    pub git_commit: String,
    /// Base58 admin account, empty before initialization
    pub admin_address: String,
    /// Side length of the grid
    pub max_line: u64,
    /// Minimum price increase per capture
    pub min_price_step: u64,
}

fn field<'a>(states: &'a [NotifyState], index: usize, what: &str) -> ServiceResult<&'a NotifyState> {
    states
        .get(index)
        .ok_or_else(|| ServiceError::internal(format!("missing {what}")))
}

fn number(state: &NotifyState, what: &str) -> ServiceResult<u64> {
    state
        .as_number()
        .ok_or_else(|| ServiceError::internal(format!("undecodable {what}")))
}

fn text(state: &NotifyState, what: &str) -> ServiceResult<String> {
    state
        .as_utf8()
        .ok_or_else(|| ServiceError::internal(format!("undecodable {what}")))
}

fn account(state: &NotifyState) -> ServiceResult<Option<Address>> {
    let bytes = state
        .as_bytes()
        .ok_or_else(|| ServiceError::internal("undecodable account"))?;
    if bytes.is_empty() {
        return Ok(None);
    }
    let bytes: [u8; ADDRESS_SIZE] = bytes
        .try_into()
        .map_err(|_| ServiceError::internal("account of wrong length"))?;
    Ok(Some(Address::from_bytes(bytes)))
}

fn decode_point(state: &NotifyState) -> ServiceResult<Point> {
    let fields = state
        .as_list()
        .ok_or_else(|| ServiceError::internal("point is not a list"))?;
    Ok(Point {
        owner: account(field(fields, 0, "owner")?)?
            .map(|a| a.to_base58())
            .unwrap_or_default(),
        color: number(field(fields, 1, "color")?, "color")?,
        price: number(field(fields, 2, "price")?, "price")?,
    })
}

fn decode_points(state: &NotifyState) -> ServiceResult<Vec<Point>> {
    state
        .as_list()
        .ok_or_else(|| ServiceError::internal("points are not a list"))?
        .iter()
        .map(decode_point)
        .collect()
}

fn integers(values: &[u64]) -> ServiceResult<Parameter> {
    values
        .iter()
        .map(|v| {
            i64::try_from(*v)
                .map(Parameter::Integer)
                .map_err(|_| ServiceError::bad_request(format!("value {v} too large")))
        })
        .collect::<ServiceResult<Vec<_>>>()
        .map(Parameter::Array)
}

/// A deployed game contract
pub struct GameContract<'a> {
    engine: &'a ContractEngine,
    contract: Contract,
}

impl<'a> GameContract<'a> {
    /// Game calls against the record named `name`
    pub fn load(engine: &'a ContractEngine, name: &str) -> ServiceResult<Self> {
        Ok(Self {
            engine,
            contract: engine.store().get(name)?,
        })
    }

    /// The underlying record
    #[must_use]
    pub const fn contract(&self) -> &Contract {
        &self.contract
    }

    async fn output(&self, func: &str, params: Vec<Parameter>, signer: &Keypair) -> ServiceResult<Vec<NotifyState>> {
        self.engine
            .query(&self.contract, func, params, signer, None)
            .await?
            .result
            .ok_or_else(|| ServiceError::internal(format!("{func} produced no output")))
    }

    /// Make `signer` the game admin
    pub async fn init_admin_account(&self, signer: &Keypair) -> ServiceResult<Invocation> {
        let params = vec![Parameter::address(&signer.address())];
        let out = self
            .engine
            .invoke(&self.contract, "InitAdminAccount", params, signer, None)
            .await?;
        info!(name = %self.contract.name, admin = %signer.address(), "game admin initialized");
        Ok(out)
    }

    /// Current game admin, `None` before initialization
    pub async fn get_admin_account(&self, signer: &Keypair) -> ServiceResult<Option<Address>> {
        let out = self.output("GetAdminAccount", Vec::new(), signer).await?;
        account(field(&out, 0, "admin")?)
    }

    /// Capture the points `(xs[i], ys[i])` for `signer`. Each price must
    /// beat the current price of its point by the contract's minimum step.
    pub async fn capture_points(
        &self,
        xs: &[u64],
        ys: &[u64],
        colors: &[u64],
        prices: &[u64],
        signer: &Keypair,
    ) -> ServiceResult<Invocation> {
        let n = xs.len();
        if n == 0 || ys.len() != n || colors.len() != n || prices.len() != n {
            return Err(ServiceError::bad_request(
                "coordinate lists must be non-empty and of equal length",
            ));
        }
        let params = vec![
            Parameter::address(&signer.address()),
            integers(xs)?,
            integers(ys)?,
            integers(colors)?,
            integers(prices)?,
        ];
        self.engine
            .invoke(&self.contract, "CapturePoints", params, signer, None)
            .await
    }

    /// Points at `(xs[i], ys[i])`
    pub async fn get_points(&self, xs: &[u64], ys: &[u64], signer: &Keypair) -> ServiceResult<Vec<Point>> {
        if xs.len() != ys.len() {
            return Err(ServiceError::bad_request("coordinate lists differ in length"));
        }
        let out = self
            .output("GetPoints", vec![integers(xs)?, integers(ys)?], signer)
            .await?;
        decode_points(field(&out, 0, "points")?)
    }

    /// The whole grid
    pub async fn get_all_points(&self, signer: &Keypair) -> ServiceResult<GridPoints> {
        let out = self.output("GetAllPoints", Vec::new(), signer).await?;
        Ok(GridPoints {
            max_line: number(field(&out, 0, "maxLine")?, "maxLine")?,
            points: decode_points(field(&out, 1, "points")?)?,
        })
    }

    /// Query build and tuning info and cache it on the record
    pub async fn refresh_contract_info(&mut self, signer: &Keypair) -> ServiceResult<ContractInfo> {
        let out = self.output("GetContractInfo", Vec::new(), signer).await?;
        let info = ContractInfo {
            build_date: text(field(&out, 0, "buildDate")?, "buildDate")?,
            git_commit: text(field(&out, 1, "gitCommit")?, "gitCommit")?,
            admin_address: account(field(&out, 2, "adminAddress")?)?
                .map(|a| a.to_base58())
                .unwrap_or_default(),
            max_line: number(field(&out, 3, "maxLine")?, "maxLine")?,
            min_price_step: number(field(&out, 4, "minPriceStep")?, "minPriceStep")?,
        };
        let cached = serde_json::to_value(&info).map_err(|e| ServiceError::internal(e.to_string()))?;
        self.contract = self.engine.store().update(&self.contract.name, |record| {
            record.contract_info = Some(cached.clone());
            Ok(())
        })?;
        Ok(info)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::chain::testing::{hex_state, notify, num_state, ScriptedChain};
    use crate::chain::ChainHandle;
    use crate::config::OntologyConfig;
    use crate::contracts::{ContractMeta, ContractStore};
    use crate::store::Database;

    fn setup() -> (Arc<ScriptedChain>, ContractEngine, Contract) {
        let fake = Arc::new(ScriptedChain::default());
        let chain = Arc::new(ChainHandle::with_client(OntologyConfig::default(), fake.clone()));
        let engine = ContractEngine::new(chain, ContractStore::new(&Database::temporary().unwrap()).unwrap());
        let contract = Contract::new(
            ContractMeta {
                name: "game".into(),
                script: "00c56b".into(),
                version: "1".into(),
                ..ContractMeta::default()
            },
            None,
        )
        .unwrap();
        engine.store().insert(&contract).unwrap();
        (fake, engine, contract)
    }

    fn point(owner: &Address, color: u64, price: u64) -> NotifyState {
        NotifyState::List(vec![hex_state(owner.as_bytes()), num_state(color), num_state(price)])
    }

    #[tokio::test]
    async fn test_capture_rejects_uneven_lists() {
        let (fake, engine, _) = setup();
        let game = GameContract::load(&engine, "game").unwrap();
        let signer = Keypair::generate();
        assert!(matches!(
            game.capture_points(&[1, 2], &[1], &[0, 0], &[1, 1], &signer).await,
            Err(ServiceError::BadRequest(_))
        ));
        assert!(matches!(
            game.capture_points(&[], &[], &[], &[], &signer).await,
            Err(ServiceError::BadRequest(_))
        ));
        assert!(fake.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_capture_price_too_low() {
        let (fake, engine, c) = setup();
        let game = GameContract::load(&engine, "game").unwrap();
        fake.push_success(0, vec![])
            .push_success(0, vec![notify(&c.contract_address, vec![num_state(20402)])]);
        assert_eq!(
            game.capture_points(&[2], &[3], &[0xff_ffff], &[129], &Keypair::generate())
                .await,
            Err(ServiceError::ContractNotEnoughPrice)
        );
        assert!(fake.submitted()[1].contains(b"CapturePoints"));
    }

    #[tokio::test]
    async fn test_get_points_decodes_owner_and_empty_owner() {
        let (fake, engine, c) = setup();
        let game = GameContract::load(&engine, "game").unwrap();
        let owner = Keypair::generate().address();
        let empty = NotifyState::List(vec![NotifyState::Hex(String::new()), num_state(0xff_ffff), num_state(0)]);
        fake.push_success(
            0,
            vec![notify(
                &c.contract_address,
                vec![num_state(0), NotifyState::List(vec![point(&owner, 0x00_1122, 130), empty])],
            )],
        );
        let points = game
            .get_points(&[1, 2], &[1, 3], &Keypair::generate())
            .await
            .unwrap();
        assert_eq!(
            points,
            vec![
                Point {
                    owner: owner.to_base58(),
                    color: 0x00_1122,
                    price: 130
                },
                Point {
                    owner: String::new(),
                    color: 0xff_ffff,
                    price: 0
                },
            ]
        );
        assert!(fake.submitted()[0].pre_exec);
    }

    #[tokio::test]
    async fn test_all_points_and_admin() {
        let (fake, engine, c) = setup();
        let game = GameContract::load(&engine, "game").unwrap();
        let admin = Keypair::generate();
        fake.push_success(
            0,
            vec![notify(
                &c.contract_address,
                vec![num_state(0), num_state(1), NotifyState::List(vec![point(&admin.address(), 1, 2)])],
            )],
        );
        let grid = game.get_all_points(&admin).await.unwrap();
        assert_eq!(grid.max_line, 1);
        assert_eq!(grid.points.len(), 1);

        fake.push_success(0, vec![notify(&c.contract_address, vec![num_state(0), hex_state(admin.address().as_bytes())])]);
        assert_eq!(game.get_admin_account(&admin).await.unwrap(), Some(admin.address()));

        fake.push_success(0, vec![]);
        assert!(matches!(
            game.get_admin_account(&admin).await,
            Err(ServiceError::Internal(_))
        ));
    }

    #[tokio::test]
    async fn test_refresh_contract_info_caches() {
        let (fake, engine, c) = setup();
        let mut game = GameContract::load(&engine, "game").unwrap();
        let admin = Keypair::generate();
        fake.push_success(
            0,
            vec![notify(
                &c.contract_address,
                vec![
                    num_state(0),
                    hex_state("2019-01-01"),
                    hex_state("abc123"),
                    hex_state(admin.address().as_bytes()),
                    num_state(10),
                    num_state(38),
                ],
            )],
        );
        let info = game.refresh_contract_info(&admin).await.unwrap();
        assert_eq!(info.max_line, 10);
        assert_eq!(info.min_price_step, 38);
        assert_eq!(info.admin_address, admin.address().to_base58());
        let stored = engine.store().get("game").unwrap();
        assert_eq!(stored.contract_info.unwrap()["gitCommit"], "abc123");
        assert!(game.contract().contract_info.is_some());
    }
}
