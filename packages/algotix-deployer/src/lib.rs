//! # AlgoTix Deployer
//!
//! Deploys the ticket application to an Algorand node, mints the credential
//! asset, binds the two on-chain, records the identifiers, and answers
//! "does account X hold a ticket?" from ledger state.
//!
//! ## Quick Start
//! ```bash
//! ALGOTIX_DEPLOYER_SECRET_KEY=... cargo run --bin algotix -- deploy
//! cargo run --bin algotix -- check <ADDRESS>
//! ```
//!
//! ## Pieces
//! - [`DeploymentPipeline`] - create application → mint asset → link → persist
//! - [`OwnershipVerifier`] - off-chain balance check
//! - [`RetryPolicy`] - exponential backoff on rate limits
//! - [`TicketService`] - `deploy` / `check` / `status` over shared state

pub mod app;
pub mod config;
mod error;
pub mod ledger;
pub mod metrics;
pub mod pipeline;
pub mod record;
pub mod retry;
pub mod service;
pub mod signer;
pub mod store;
pub mod verifier;

pub use config::Config;
pub use error::{Error, Result};
pub use ledger::LedgerClient;
pub use pipeline::DeploymentPipeline;
pub use record::{DeploymentRecord, Endpoint, Stage};
pub use retry::{with_retry, RetryPolicy};
pub use service::{DeployOptions, TicketService};
pub use signer::DeployerSigner;
pub use store::RecordStore;
pub use verifier::OwnershipVerifier;
