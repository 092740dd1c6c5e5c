//! HTTP API.
//!
//! Every route answers with HTTP 200 and a JSON envelope
//! `{"error": <code>, "result": ...}` where `error` is the numeric code of
//! [`ServiceError`] and `0` on success. Signing routes carry their
//! credentials in the body, either an account as
//! `{"account": {"address", "password"}}` or an identity as
//! `{"ontid": {"ontid", "password", "keyNo"}}`. Missing or wrong
//! credentials are `Unauthorized`.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Query, Request, State},
    http::request::Parts,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{debug, error, info, warn};

use crate::asset::{self, AssetBalance, AssetKind};
use crate::auth::IdentityAuth;
use crate::context::AppContext;
use crate::contracts::{Contract, ContractMeta, Invocation, MigrateRequest, ReconcileReport};
use crate::crypto::Keypair;
use crate::error::{ServiceError, ServiceResult, SUCCESS};
use crate::types::{contract_hash_to_b64, Address, Timestamp};
use crate::vm::Parameter;
use crate::wallet::{Account, AccountImport, AccountRole, OntId, SearchKind};

/// Response envelope
#[derive(Debug, Serialize)]
pub struct Reply<T> {
    /// Numeric result code
    pub error: u32,
    /// Payload, present on success when the route returns one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
}

type ApiResult<T> = Result<Json<Reply<T>>, ApiError>;

fn ok<T>(result: T) -> ApiResult<T> {
    Ok(Json(Reply {
        error: SUCCESS,
        result: Some(result),
    }))
}

fn done() -> ApiResult<()> {
    Ok(Json(Reply {
        error: SUCCESS,
        result: None,
    }))
}

/// A failed request, rendered as an envelope without result
#[derive(Debug, PartialEq, Eq)]
pub struct ApiError(pub ServiceError);

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.0.code();
        match &self.0 {
            ServiceError::Internal(_) | ServiceError::DbError(_) | ServiceError::DbInsertFailed => {
                error!(code, error = %self.0, "request failed");
            }
            other => debug!(code, error = %other, "request rejected"),
        }
        Json(Reply::<()> {
            error: code,
            result: None,
        })
        .into_response()
    }
}

/// JSON body whose rejection is a `BadRequest` envelope
pub struct Body<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for Body<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => {
                warn!(reason = %rejection.body_text(), "malformed request body");
                Err(ServiceError::bad_request(rejection.body_text()).into())
            }
        }
    }
}

/// Query string whose rejection is a `BadRequest` envelope
pub struct Params<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for Params<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Self(value)),
            Err(rejection) => Err(ServiceError::bad_request(rejection.body_text()).into()),
        }
    }
}

/// Router over `ctx` with every route mounted
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/account/create", post(create_account))
        .route("/account/import", post(import_account))
        .route("/account/decryptMnemonic", post(decrypt_mnemonic))
        .route("/account/login", post(login))
        .route("/account/search", get(search_accounts))
        .route("/ontid/create", post(create_ontid))
        .route("/admin/deployContract", post(admin_deploy))
        .route("/admin/migrateContract", post(admin_migrate))
        .route("/admin/destroyContract", post(admin_destroy))
        .route("/contract/deploy", post(deploy_contract))
        .route("/contract/migrate", post(migrate_contract))
        .route("/contract/destroy", post(destroy_contract))
        .route("/contract/invoke", post(invoke_contract))
        .route("/contract/initAdmin", post(init_admin))
        .route("/contract/addRole", post(add_role))
        .route("/contract/addOntIDToRole", post(add_ontid_to_role))
        .route("/contract/assignMethodToRole", post(assign_method_to_role))
        .route("/contract/list", get(list_contracts))
        .route("/contract/reconcile", get(reconcile_contract))
        .route("/asset/transfer", post(transfer))
        .route("/asset/balance", get(balance))
        .route("/utils/contracthash2addr", post(contract_hash_to_addr))
        .fallback(unknown_route)
        .with_state(ctx)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

async fn unknown_route() -> ApiError {
    ServiceError::NotFound.into()
}

// Credentials

#[derive(Clone, Deserialize)]
struct AccountCredentials {
    address: String,
    password: String,
}

#[derive(Clone, Deserialize)]
struct OntIdCredentials {
    #[serde(alias = "ontID")]
    ontid: String,
    password: String,
    #[serde(rename = "keyNo")]
    key_no: u32,
}

/// Run key-derivation work off the async workers
async fn blocking<T, F>(work: F) -> ServiceResult<T>
where
    F: FnOnce() -> ServiceResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| ServiceError::internal(e.to_string()))?
}

async fn unlock_account(
    ctx: &AppContext,
    creds: Option<AccountCredentials>,
) -> ServiceResult<(Account, Keypair)> {
    let creds = creds.ok_or(ServiceError::Unauthorized)?;
    let ctx = ctx.clone();
    blocking(move || ctx.unlock_account(&creds.address, &creds.password)).await
}

async fn unlock_admin(ctx: &AppContext, creds: Option<AccountCredentials>) -> ServiceResult<Keypair> {
    let (account, pair) = unlock_account(ctx, creds).await?;
    if !account.is_admin() {
        warn!(address = %account.address, "admin route called by a non-admin account");
        return Err(ServiceError::Unauthorized);
    }
    Ok(pair)
}

async fn unlock_ontid(
    ctx: &AppContext,
    creds: Option<OntIdCredentials>,
) -> ServiceResult<(IdentityAuth, Keypair)> {
    let creds = creds.ok_or(ServiceError::Unauthorized)?;
    let auth = IdentityAuth::new(&creds.ontid, creds.key_no);
    let ctx = ctx.clone();
    let (_, controller) =
        blocking(move || ctx.unlock_ontid(&creds.ontid, &creds.password, creds.key_no)).await?;
    Ok((auth, controller))
}

/// An identity signs with its control key and travels with the call; a
/// plain account just signs.
async fn unlock_signer(
    ctx: &AppContext,
    account: Option<AccountCredentials>,
    ontid: Option<OntIdCredentials>,
) -> ServiceResult<(Keypair, Option<IdentityAuth>)> {
    if ontid.is_some() {
        let (auth, controller) = unlock_ontid(ctx, ontid).await?;
        Ok((controller, Some(auth)))
    } else {
        let (_, pair) = unlock_account(ctx, account).await?;
        Ok((pair, None))
    }
}

/// One string or a list of strings
#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value],
        OneOrMany::Many(values) => values,
    })
}

// Accounts

#[derive(Deserialize)]
struct CreateAccountRequest {
    #[serde(default)]
    label: String,
    password: String,
}

#[derive(Debug, Serialize)]
struct AddressReply {
    address: Address,
}

async fn create_account(
    State(ctx): State<AppContext>,
    Body(req): Body<CreateAccountRequest>,
) -> ApiResult<AddressReply> {
    if req.password.is_empty() {
        return Err(ServiceError::bad_request("password is required").into());
    }
    let scrypt = ctx.config.scrypt;
    let account = blocking(move || {
        Account::create(&req.label, &req.password, Some(scrypt)).map_err(ServiceError::from)
    })
    .await?;
    ctx.accounts.save(&account)?;
    ok(AddressReply {
        address: account.address,
    })
}

#[derive(Deserialize)]
struct ImportAccountRequest {
    #[serde(flatten)]
    account: AccountImport,
    password: String,
}

async fn import_account(
    State(ctx): State<AppContext>,
    Body(req): Body<ImportAccountRequest>,
) -> ApiResult<AddressReply> {
    let account = blocking(move || {
        Account::import(req.account, &req.password).map_err(ServiceError::from)
    })
    .await?;
    ctx.accounts.save(&account)?;
    ok(AddressReply {
        address: account.address,
    })
}

#[derive(Deserialize)]
struct DecryptMnemonicRequest {
    address: String,
    password: String,
}

async fn decrypt_mnemonic(
    State(ctx): State<AppContext>,
    Body(req): Body<DecryptMnemonicRequest>,
) -> ApiResult<String> {
    let account = ctx
        .accounts
        .find_by_address(&req.address)?
        .ok_or(ServiceError::NotFound)?;
    let phrase = blocking(move || {
        account
            .decrypt_mnemonic(&req.password)
            .ok_or(ServiceError::NotFound)
    })
    .await?;
    ok(phrase)
}

#[derive(Deserialize)]
struct SignedRequest {
    #[serde(default)]
    account: Option<AccountCredentials>,
}

async fn login(State(ctx): State<AppContext>, Body(req): Body<SignedRequest>) -> ApiResult<()> {
    unlock_account(&ctx, req.account).await?;
    done()
}

#[derive(Deserialize)]
struct SearchQuery {
    #[serde(default)]
    text: String,
    #[serde(default)]
    role: Option<AccountRole>,
    #[serde(default)]
    kind: SearchKind,
}

/// Public view of a stored account
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AccountSummary {
    label: String,
    address: Address,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<AccountRole>,
    created_at: Timestamp,
}

impl From<Account> for AccountSummary {
    fn from(account: Account) -> Self {
        Self {
            label: account.label,
            address: account.address,
            role: account.role,
            created_at: account.created_at,
        }
    }
}

async fn search_accounts(
    State(ctx): State<AppContext>,
    Params(query): Params<SearchQuery>,
) -> ApiResult<Vec<AccountSummary>> {
    let found = ctx.accounts.search(&query.text, query.role, query.kind)?;
    ok(found.into_iter().map(AccountSummary::from).collect())
}

// Identities

#[derive(Deserialize)]
struct CreateOntIdRequest {
    #[serde(default)]
    account: Option<AccountCredentials>,
    #[serde(default)]
    label: String,
    password: String,
    #[serde(default)]
    role: Option<String>,
}

#[derive(Debug, Serialize)]
struct OntIdReply {
    ontid: String,
}

async fn create_ontid(
    State(ctx): State<AppContext>,
    Body(req): Body<CreateOntIdRequest>,
) -> ApiResult<OntIdReply> {
    if req.password.is_empty() {
        return Err(ServiceError::bad_request("password is required").into());
    }
    let (_, funder) = unlock_account(&ctx, req.account).await?;
    let mut identity = OntId::create(
        &ctx.chain,
        &funder,
        &req.label,
        &req.password,
        Some(ctx.config.scrypt),
    )
    .await?;
    if let Some(role) = req.role.filter(|r| !r.is_empty()) {
        identity.add_role(&role);
    }
    ctx.ontids.save(&identity)?;
    info!(ontid = %identity.ontid, "identity created");
    ok(OntIdReply {
        ontid: identity.ontid,
    })
}

// Admin

#[derive(Deserialize)]
struct AdminDeployRequest {
    #[serde(default)]
    account: Option<AccountCredentials>,
    #[serde(flatten)]
    meta: ContractMeta,
    #[serde(default)]
    abi: Option<Value>,
}

async fn admin_deploy(
    State(ctx): State<AppContext>,
    Body(req): Body<AdminDeployRequest>,
) -> ApiResult<Contract> {
    let signer = unlock_admin(&ctx, req.account).await?;
    let contract = Contract::new(req.meta, req.abi)?;
    ok(ctx.contracts.deploy_and_save(contract, &signer).await?)
}

#[derive(Deserialize)]
struct AdminMigrateRequest {
    #[serde(default)]
    account: Option<AccountCredentials>,
    name: String,
    #[serde(flatten)]
    update: MigrateRequest,
}

async fn admin_migrate(
    State(ctx): State<AppContext>,
    Body(req): Body<AdminMigrateRequest>,
) -> ApiResult<Contract> {
    let signer = unlock_admin(&ctx, req.account).await?;
    ok(ctx.contracts.migrate(&req.name, req.update, &signer, None).await?)
}

#[derive(Deserialize)]
struct AdminNamedRequest {
    #[serde(default)]
    account: Option<AccountCredentials>,
    name: String,
}

async fn admin_destroy(
    State(ctx): State<AppContext>,
    Body(req): Body<AdminNamedRequest>,
) -> ApiResult<()> {
    let signer = unlock_admin(&ctx, req.account).await?;
    ctx.contracts.destroy(&req.name, &signer, None).await?;
    done()
}

// Contracts

#[derive(Deserialize)]
struct DeployRequest {
    #[serde(default)]
    ontid: Option<OntIdCredentials>,
    #[serde(flatten)]
    meta: ContractMeta,
    #[serde(default)]
    abi: Option<Value>,
}

async fn deploy_contract(
    State(ctx): State<AppContext>,
    Body(req): Body<DeployRequest>,
) -> ApiResult<Contract> {
    let (_, controller) = unlock_ontid(&ctx, req.ontid).await?;
    let abi = req
        .abi
        .ok_or_else(|| ServiceError::bad_request("abi is required"))?;
    let contract = Contract::new(req.meta, Some(abi))?;
    ok(ctx.contracts.deploy_and_save(contract, &controller).await?)
}

#[derive(Deserialize)]
struct MigrateContractRequest {
    #[serde(default)]
    account: Option<AccountCredentials>,
    #[serde(default)]
    ontid: Option<OntIdCredentials>,
    name: String,
    #[serde(flatten)]
    update: MigrateRequest,
}

async fn migrate_contract(
    State(ctx): State<AppContext>,
    Body(req): Body<MigrateContractRequest>,
) -> ApiResult<Contract> {
    let (signer, identity) = unlock_signer(&ctx, req.account, req.ontid).await?;
    let migrated = ctx
        .contracts
        .migrate(&req.name, req.update, &signer, identity.as_ref())
        .await?;
    ok(migrated)
}

#[derive(Deserialize)]
struct NamedRequest {
    #[serde(default)]
    account: Option<AccountCredentials>,
    #[serde(default)]
    ontid: Option<OntIdCredentials>,
    name: String,
}

async fn destroy_contract(
    State(ctx): State<AppContext>,
    Body(req): Body<NamedRequest>,
) -> ApiResult<()> {
    let (signer, identity) = unlock_signer(&ctx, req.account, req.ontid).await?;
    ctx.contracts
        .destroy(&req.name, &signer, identity.as_ref())
        .await?;
    done()
}

#[derive(Deserialize)]
struct InvokeRequest {
    #[serde(default)]
    account: Option<AccountCredentials>,
    #[serde(default)]
    ontid: Option<OntIdCredentials>,
    name: String,
    #[serde(alias = "method")]
    func: String,
    #[serde(default)]
    params: Vec<Parameter>,
    #[serde(default, rename = "preExec")]
    pre_exec: bool,
}

/// With an identity, it is appended to the parameters.
async fn invoke_contract(
    State(ctx): State<AppContext>,
    Body(req): Body<InvokeRequest>,
) -> ApiResult<Invocation> {
    let (signer, identity) = unlock_signer(&ctx, req.account, req.ontid).await?;
    let contract = ctx.contracts.store().get(&req.name)?;
    let invocation = if req.pre_exec {
        ctx.contracts
            .query(&contract, &req.func, req.params, &signer, identity.as_ref())
            .await?
    } else {
        ctx.contracts
            .invoke(&contract, &req.func, req.params, &signer, identity.as_ref())
            .await?
    };
    ok(invocation)
}

async fn init_admin(
    State(ctx): State<AppContext>,
    Body(req): Body<NamedRequest>,
) -> ApiResult<Contract> {
    let (auth, controller) = unlock_ontid(&ctx, req.ontid).await?;
    ok(ctx.contracts.init_admin(&req.name, &auth, &controller).await?)
}

#[derive(Deserialize)]
struct RoleRequest {
    #[serde(default)]
    ontid: Option<OntIdCredentials>,
    name: String,
    #[serde(alias = "roleName")]
    role: String,
}

async fn add_role(
    State(ctx): State<AppContext>,
    Body(req): Body<RoleRequest>,
) -> ApiResult<Contract> {
    let (auth, _) = unlock_ontid(&ctx, req.ontid).await?;
    ok(ctx.contracts.add_role_and_update(&req.name, &req.role, &auth)?)
}

#[derive(Deserialize)]
struct RoleMembersRequest {
    #[serde(default)]
    ontid: Option<OntIdCredentials>,
    name: String,
    #[serde(alias = "roleName")]
    role: String,
    #[serde(alias = "ontIDs", alias = "ontIDToAdd", deserialize_with = "one_or_many")]
    ontids: Vec<String>,
}

async fn add_ontid_to_role(
    State(ctx): State<AppContext>,
    Body(req): Body<RoleMembersRequest>,
) -> ApiResult<Contract> {
    let (auth, controller) = unlock_ontid(&ctx, req.ontid).await?;
    let updated = ctx
        .contracts
        .add_ontid_to_role_and_update(&req.name, &req.role, &req.ontids, &auth, &controller)
        .await?;
    ok(updated)
}

#[derive(Deserialize)]
struct RoleMethodsRequest {
    #[serde(default)]
    ontid: Option<OntIdCredentials>,
    name: String,
    #[serde(alias = "roleName")]
    role: String,
    #[serde(alias = "funcNames", deserialize_with = "one_or_many")]
    methods: Vec<String>,
}

async fn assign_method_to_role(
    State(ctx): State<AppContext>,
    Body(req): Body<RoleMethodsRequest>,
) -> ApiResult<Contract> {
    let (auth, controller) = unlock_ontid(&ctx, req.ontid).await?;
    let updated = ctx
        .contracts
        .assign_method_to_role_and_update(&req.name, &req.role, &req.methods, &auth, &controller)
        .await?;
    ok(updated)
}

async fn list_contracts(State(ctx): State<AppContext>) -> ApiResult<Vec<Contract>> {
    ok(ctx.contracts.store().all()?)
}

#[derive(Deserialize)]
struct NameQuery {
    name: String,
}

async fn reconcile_contract(
    State(ctx): State<AppContext>,
    Params(query): Params<NameQuery>,
) -> ApiResult<ReconcileReport> {
    ok(ctx.contracts.reconcile(&query.name).await?)
}

// Assets

#[derive(Deserialize)]
struct TransferRequest {
    #[serde(default)]
    account: Option<AccountCredentials>,
    to: String,
    asset: String,
    amount: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransferReply {
    tx_hash: String,
}

async fn transfer(
    State(ctx): State<AppContext>,
    Body(req): Body<TransferRequest>,
) -> ApiResult<TransferReply> {
    let kind: AssetKind = req.asset.parse()?;
    let to = Address::from_base58(&req.to).map_err(ServiceError::from)?;
    let (_, from) = unlock_account(&ctx, req.account).await?;
    let tx_hash = asset::transfer(&ctx.chain, kind, req.amount, &from, &to).await?;
    ok(TransferReply { tx_hash })
}

#[derive(Deserialize)]
struct BalanceQuery {
    #[serde(default)]
    address: Option<String>,
}

async fn balance(
    State(ctx): State<AppContext>,
    Params(query): Params<BalanceQuery>,
) -> ApiResult<AssetBalance> {
    let address = query
        .address
        .ok_or_else(|| ServiceError::bad_request("address is required"))?;
    let address = Address::from_base58(&address).map_err(ServiceError::from)?;
    ok(asset::balance(&ctx.chain, &address).await?)
}

// Utils

#[derive(Deserialize)]
struct HashRequest {
    value: String,
}

async fn contract_hash_to_addr(Body(req): Body<HashRequest>) -> ApiResult<String> {
    ok(contract_hash_to_b64(&req.value).map_err(ServiceError::from)?)
}
