//! # ontgate
//!
//! Account, identity and smart contract gateway for Ontology-style (`NeoVM`)
//! chains.
//!
//! ## Architecture
//!
//! - **Wallet**: password-sealed accounts and decentralized identities
//!   (OntIDs), persisted in an embedded document store
//! - **Contracts**: deploy, invoke, migrate and destroy application
//!   contracts with a dry run before every commit
//! - **Authorization**: the on-chain role model (admin identity, roles to
//!   methods, roles to identities) mirrored in each contract record
//! - **Assets**: transfers and balances of the two native assets
//!
//! Everything is reachable through the HTTP API in [`api`]; a running
//! service shares one [`context::AppContext`].
//!
//! ## Consistency Model
//!
//! - Records follow the chain: nothing is stored before the matching
//!   transaction committed
//! - Concurrent edits of one record go through compare-and-swap updates
//! - A store failure after a commit is logged with the transaction hash

#![forbid(unsafe_code)]
#![deny(clippy::all, rust_2018_idioms)]
#![warn(clippy::pedantic, clippy::nursery, missing_docs)]
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::future_not_send,
    clippy::too_many_lines,
    clippy::too_many_arguments,
    // Gas, amounts and key numbers are bounded well below the cast limits
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss,
    clippy::cast_lossless,
    clippy::missing_const_for_fn,
    clippy::unused_self,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    // Field naming matches domain terminology
    clippy::struct_field_names,
    clippy::match_same_arms
)]

pub mod api;
pub mod asset;
pub mod auth;
pub mod chain;
pub mod config;
pub mod context;
pub mod contracts;
pub mod crypto;
pub mod error;
pub mod store;
pub mod transaction;
pub mod types;
pub mod vm;
pub mod wallet;

pub use chain::{ChainClient, ChainHandle, RestClient};
pub use config::ServiceConfig;
pub use context::AppContext;
pub use contracts::{Contract, ContractEngine};
pub use crypto::{Keypair, PublicKey, SecretKey, Signature};
pub use error::{ServiceError, ServiceResult};
pub use types::Address;
pub use wallet::{Account, AccountStore, OntId, OntIdStore};

/// Service version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
