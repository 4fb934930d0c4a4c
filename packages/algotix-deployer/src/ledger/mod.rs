//! Ledger client interface and the data it exchanges.
//!
//! [`LedgerClient`] is the seam between the deployer and the remote node:
//! [`algod::AlgodClient`] talks to a real node, tests substitute an
//! in-memory ledger. Signing lives outside the client (see
//! [`crate::signer`]); the client only ever sees opaque signed bytes.
//! Every method is a single RPC, so each can be retried on its own.

pub mod abi;
pub mod address;
pub mod algod;
pub mod wire;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Rounds a freshly built transaction stays valid for.
pub const VALIDITY_WINDOW: u64 = 1_000;

/// Remote ledger node façade.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fresh fee/round parameters. Fetch immediately before each submission.
    async fn fee_parameters(&self) -> Result<TransactionParameters>;

    /// Submit a signed transaction, returning its id.
    async fn submit(&self, transaction: &SignedTransaction) -> Result<String>;

    /// Block until `tx_id` is confirmed or `max_rounds` rounds pass.
    async fn wait_for_confirmation(&self, tx_id: &str, max_rounds: u64)
        -> Result<ConfirmedTransaction>;

    /// `None` when the account never opted into the asset.
    async fn account_asset_holding(
        &self,
        address: &str,
        asset_id: u64,
    ) -> Result<Option<AccountAssetHolding>>;

    /// Native balance in micro-units.
    async fn account_balance(&self, address: &str) -> Result<u64>;

    /// Evaluate an unsigned transaction against current state without
    /// committing it. Returns the transaction's logs.
    async fn simulate(&self, transaction: &Transaction) -> Result<Vec<Vec<u8>>>;

    /// Node status (latest round).
    async fn status(&self) -> Result<NodeStatus>;
}

/// Suggested parameters. They embed a validity window, so never reuse them
/// across submissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionParameters {
    pub fee: u64,
    pub min_fee: u64,
    pub first_valid: u64,
    pub last_valid: u64,
    pub genesis_id: String,
    pub genesis_hash: String,
}

/// A confirmed transaction and what it created.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfirmedTransaction {
    pub id: String,
    pub confirmed_round: u64,
    pub created_asset_id: Option<u64>,
    pub created_application_id: Option<u64>,
    /// Raw log entries, the last of which carries an ABI return value.
    pub logs: Vec<Vec<u8>>,
}

/// An account's balance of one asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAssetHolding {
    pub asset_id: u64,
    pub amount: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeStatus {
    pub last_round: u64,
}

/// Global/local state allocation of an application.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StateSchema {
    pub num_uints: u64,
    pub num_byte_slices: u64,
}

/// Asset creation parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetParams {
    pub total: u64,
    pub decimals: u32,
    pub default_frozen: bool,
    pub unit_name: String,
    pub asset_name: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manager: Option<String>,
}

/// What a transaction does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransactionKind {
    ApplicationCreate {
        #[serde(serialize_with = "b64::bytes")]
        approval_program: Vec<u8>,
        #[serde(serialize_with = "b64::bytes")]
        clear_program: Vec<u8>,
        global_schema: StateSchema,
        local_schema: StateSchema,
    },
    AssetCreate(AssetParams),
    ApplicationCall {
        app_id: u64,
        #[serde(serialize_with = "b64::byte_seq")]
        app_args: Vec<Vec<u8>>,
        foreign_assets: Vec<u64>,
        accounts: Vec<String>,
    },
    /// A zero-amount transfer to oneself is an opt-in.
    AssetTransfer {
        asset_id: u64,
        receiver: String,
        amount: u64,
    },
}

impl TransactionKind {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            TransactionKind::ApplicationCreate { .. } => "application_create",
            TransactionKind::AssetCreate(_) => "asset_create",
            TransactionKind::ApplicationCall { .. } => "application_call",
            TransactionKind::AssetTransfer { .. } => "asset_transfer",
        }
    }
}

/// An unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transaction {
    pub sender: String,
    pub params: TransactionParameters,
    #[serde(flatten)]
    pub kind: TransactionKind,
}

impl Transaction {
    pub fn new(sender: impl Into<String>, params: TransactionParameters, kind: TransactionKind) -> Self {
        Self {
            sender: sender.into(),
            params,
            kind,
        }
    }
}

/// Wire-ready signed transaction. Opaque to everything but the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    blob: Vec<u8>,
}

impl SignedTransaction {
    pub fn new(blob: Vec<u8>) -> Self {
        Self { blob }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.blob
    }
}

mod b64 {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::Serializer;

    pub fn bytes<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn byte_seq<S: Serializer>(items: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(items.iter().map(|item| STANDARD.encode(item)))
    }
}
