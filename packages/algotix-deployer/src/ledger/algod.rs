//! REST client for an algod node.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, info};

use super::wire::{self, EncodedTransaction};
use super::{
    AccountAssetHolding, ConfirmedTransaction, LedgerClient, NodeStatus, SignedTransaction,
    Transaction, TransactionParameters, VALIDITY_WINDOW,
};
use crate::error::{Error, Result};
use crate::metrics::METRICS;
use crate::record::Endpoint;

const TOKEN_HEADER: &str = "X-Algo-API-Token";
const NODE_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const NODE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

// --- algod REST API types ---

#[derive(Deserialize)]
struct ParamsResponse {
    fee: u64,
    #[serde(rename = "min-fee")]
    min_fee: u64,
    #[serde(rename = "last-round")]
    last_round: u64,
    #[serde(rename = "genesis-id")]
    genesis_id: String,
    #[serde(rename = "genesis-hash")]
    genesis_hash: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    #[serde(rename = "txId")]
    tx_id: String,
}

#[derive(Deserialize, Default)]
#[serde(default)]
struct PendingResponse {
    #[serde(rename = "confirmed-round")]
    confirmed_round: u64,
    #[serde(rename = "pool-error")]
    pool_error: String,
    #[serde(rename = "asset-index")]
    asset_index: Option<u64>,
    #[serde(rename = "application-index")]
    application_index: Option<u64>,
    logs: Vec<String>,
}

#[derive(Deserialize)]
struct SimulateResponse {
    #[serde(rename = "txn-groups")]
    txn_groups: Vec<SimulateGroup>,
}

#[derive(Deserialize)]
struct SimulateGroup {
    #[serde(rename = "failure-message", default)]
    failure_message: String,
    #[serde(rename = "txn-results", default)]
    txn_results: Vec<SimulateTxnResult>,
}

#[derive(Deserialize)]
struct SimulateTxnResult {
    #[serde(rename = "txn-result")]
    txn_result: PendingResponse,
}

#[derive(Deserialize)]
struct StatusResponse {
    #[serde(rename = "last-round")]
    last_round: u64,
}

#[derive(Deserialize)]
struct AccountResponse {
    amount: u64,
}

#[derive(Deserialize)]
struct AssetHoldingResponse {
    #[serde(rename = "asset-holding")]
    asset_holding: HoldingBody,
}

#[derive(Deserialize)]
struct HoldingBody {
    amount: u64,
    #[serde(rename = "asset-id")]
    asset_id: u64,
}

/// algod REST client.
pub struct AlgodClient {
    http: reqwest::Client,
    base_url: String,
    token: String,
}

impl AlgodClient {
    pub fn new(endpoint: &Endpoint) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(NODE_REQUEST_TIMEOUT)
            .connect_timeout(NODE_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| Error::InvalidConfiguration(format!("HTTP client build failed: {e}")))?;
        let base_url = endpoint.url();
        info!(node = %base_url, "algod client initialized");
        Ok(Self {
            http,
            base_url,
            token: endpoint.token.clone(),
        })
    }

    pub fn from_config(config: &crate::Config) -> Result<Self> {
        Self::new(&config.endpoint())
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.get_json_opt(path).await?.ok_or_else(|| {
            let err = Error::Network(format!("GET {path}: HTTP 404"));
            METRICS.record_error(&err);
            err
        })
    }

    /// GET returning `None` on 404.
    async fn get_json_opt<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>> {
        METRICS.rpc_calls.fetch_add(1, Ordering::Relaxed);
        let context = format!("GET {path}");
        let result: Result<Option<T>> = async {
            let resp = self
                .http
                .get(format!("{}{path}", self.base_url))
                .header(TOKEN_HEADER, &self.token)
                .send()
                .await
                .map_err(|e| Error::from_transport(e, &context))?;
            let status = resp.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::from_status(status.as_u16(), &body, &context));
            }
            resp.json::<T>()
                .await
                .map(Some)
                .map_err(|e| Error::Network(format!("{context}: malformed response: {e}")))
        }
        .await;
        if let Err(err) = &result {
            METRICS.record_error(err);
        }
        result
    }

    async fn pending(&self, tx_id: &str) -> Result<PendingResponse> {
        self.get_json(&format!("/v2/transactions/pending/{tx_id}"))
            .await
    }

    async fn wait_for_block_after(&self, round: u64) -> Result<()> {
        let _: StatusResponse = self
            .get_json(&format!("/v2/status/wait-for-block-after/{round}"))
            .await?;
        Ok(())
    }
}

fn decode_logs(tx_id: &str, logs: &[String]) -> Result<Vec<Vec<u8>>> {
    logs.iter()
        .map(|l| B64.decode(l))
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::Network(format!("undecodable log in {tx_id}: {e}")))
}

#[async_trait]
impl LedgerClient for AlgodClient {
    async fn fee_parameters(&self) -> Result<TransactionParameters> {
        let p: ParamsResponse = self.get_json("/v2/transactions/params").await?;
        Ok(TransactionParameters {
            fee: p.fee,
            min_fee: p.min_fee,
            first_valid: p.last_round,
            last_valid: p.last_round.saturating_add(VALIDITY_WINDOW),
            genesis_id: p.genesis_id,
            genesis_hash: p.genesis_hash,
        })
    }

    async fn submit(&self, transaction: &SignedTransaction) -> Result<String> {
        METRICS.rpc_calls.fetch_add(1, Ordering::Relaxed);
        let context = "POST /v2/transactions";
        let result: Result<String> = async {
            let resp = self
                .http
                .post(format!("{}/v2/transactions", self.base_url))
                .header(TOKEN_HEADER, &self.token)
                .header(reqwest::header::CONTENT_TYPE, "application/x-binary")
                .body(transaction.as_bytes().to_vec())
                .send()
                .await
                .map_err(|e| Error::from_transport(e, context))?;
            let status = resp.status();
            if status == reqwest::StatusCode::BAD_REQUEST {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::Rejected {
                    tx_id: "unassigned".into(),
                    reason: body.trim().to_string(),
                });
            }
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::from_status(status.as_u16(), &body, context));
            }
            resp.json::<SubmitResponse>()
                .await
                .map(|r| r.tx_id)
                .map_err(|e| Error::Network(format!("{context}: malformed response: {e}")))
        }
        .await;
        match &result {
            Ok(tx_id) => {
                METRICS.tx_submitted.fetch_add(1, Ordering::Relaxed);
                debug!(tx_id = %tx_id, "Transaction submitted");
            }
            Err(err) => METRICS.record_error(err),
        }
        result
    }

    async fn wait_for_confirmation(
        &self,
        tx_id: &str,
        max_rounds: u64,
    ) -> Result<ConfirmedTransaction> {
        let start = self.status().await?.last_round;
        let deadline = start.saturating_add(max_rounds);
        let mut round = start;
        while round < deadline {
            let pending = self.pending(tx_id).await?;
            if pending.confirmed_round > 0 {
                METRICS.tx_confirmed.fetch_add(1, Ordering::Relaxed);
                let logs = decode_logs(tx_id, &pending.logs)?;
                debug!(tx_id, round = pending.confirmed_round, "Transaction confirmed");
                return Ok(ConfirmedTransaction {
                    id: tx_id.to_string(),
                    confirmed_round: pending.confirmed_round,
                    created_asset_id: pending.asset_index,
                    created_application_id: pending.application_index,
                    logs,
                });
            }
            if !pending.pool_error.is_empty() {
                return Err(Error::Rejected {
                    tx_id: tx_id.to_string(),
                    reason: pending.pool_error,
                });
            }
            self.wait_for_block_after(round).await?;
            round += 1;
        }
        Err(Error::ConfirmationTimeout {
            tx_id: tx_id.to_string(),
            rounds: max_rounds,
        })
    }

    async fn account_asset_holding(
        &self,
        address: &str,
        asset_id: u64,
    ) -> Result<Option<AccountAssetHolding>> {
        let holding: Option<AssetHoldingResponse> = self
            .get_json_opt(&format!("/v2/accounts/{address}/assets/{asset_id}"))
            .await?;
        Ok(holding.map(|h| AccountAssetHolding {
            asset_id: h.asset_holding.asset_id,
            amount: h.asset_holding.amount,
        }))
    }

    async fn account_balance(&self, address: &str) -> Result<u64> {
        let account: AccountResponse = self.get_json(&format!("/v2/accounts/{address}")).await?;
        Ok(account.amount)
    }

    async fn simulate(&self, transaction: &Transaction) -> Result<Vec<Vec<u8>>> {
        let encoded = EncodedTransaction::new(transaction)?;
        let body = wire::simulate_request(&encoded)?;
        let tx_id = encoded.id();

        METRICS.rpc_calls.fetch_add(1, Ordering::Relaxed);
        let context = "POST /v2/transactions/simulate";
        let result: Result<SimulateResponse> = async {
            let resp = self
                .http
                .post(format!("{}/v2/transactions/simulate?format=json", self.base_url))
                .header(TOKEN_HEADER, &self.token)
                .header(reqwest::header::CONTENT_TYPE, "application/msgpack")
                .body(body)
                .send()
                .await
                .map_err(|e| Error::from_transport(e, context))?;
            let status = resp.status();
            if !status.is_success() {
                let body = resp.text().await.unwrap_or_default();
                return Err(Error::from_status(status.as_u16(), &body, context));
            }
            resp.json::<SimulateResponse>()
                .await
                .map_err(|e| Error::Network(format!("{context}: malformed response: {e}")))
        }
        .await;
        let response = match result {
            Ok(response) => response,
            Err(err) => {
                METRICS.record_error(&err);
                return Err(err);
            }
        };

        let group = response
            .txn_groups
            .into_iter()
            .next()
            .ok_or_else(|| Error::Network(format!("{context}: empty simulation result")))?;
        if !group.failure_message.is_empty() {
            return Err(Error::ApplicationCall(group.failure_message));
        }
        let logs = group
            .txn_results
            .first()
            .map(|r| decode_logs(&tx_id, &r.txn_result.logs))
            .transpose()?
            .unwrap_or_default();
        debug!(tx_id = %tx_id, logs = logs.len(), "Transaction simulated");
        Ok(logs)
    }

    async fn status(&self) -> Result<NodeStatus> {
        let s: StatusResponse = self.get_json("/v2/status").await?;
        Ok(NodeStatus {
            last_round: s.last_round,
        })
    }
}
