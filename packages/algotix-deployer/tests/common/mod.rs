//! Shared fixtures: an in-memory ledger with call counters and scripted failures.

#![allow(dead_code)]

use algotix_deployer::app::{
    ProgramArtifact, CHECK_TICKET, CHECK_TICKET_FOR, GET_CREDENTIAL_ASSET, SET_CREDENTIAL_ASSET,
};
use algotix_deployer::ledger::abi::{AbiValue, RETURN_PREFIX};
use algotix_deployer::ledger::address::encode_address;
use algotix_deployer::ledger::{
    AccountAssetHolding, ConfirmedTransaction, LedgerClient, NodeStatus, SignedTransaction,
    Transaction, TransactionKind, TransactionParameters,
};
use algotix_deployer::pipeline::{DeploymentPipeline, PipelineSettings};
use algotix_deployer::{Config, DeployerSigner, Endpoint, Error, RecordStore, Result, RetryPolicy};
use async_trait::async_trait;
use ed25519_dalek::SigningKey;
use rmpv::Value;
use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const APP_ID: u64 = 42;
pub const ASSET_ID: u64 = 99;

#[derive(Default)]
pub struct CallCounts {
    pub fee_parameters: AtomicU32,
    pub submit: AtomicU32,
    pub app_creates: AtomicU32,
    pub asset_creates: AtomicU32,
    pub opt_ins: AtomicU32,
    /// Application calls, submitted or simulated.
    pub app_calls: AtomicU32,
    pub simulations: AtomicU32,
    pub balance: AtomicU32,
    pub holding: AtomicU32,
    pub waits: AtomicU32,
}

impl CallCounts {
    pub fn get(counter: &AtomicU32) -> u32 {
        counter.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct MockState {
    balance: u64,
    holdings: HashMap<(String, u64), u64>,
    next_tx: u64,
    pending: HashMap<String, ConfirmedTransaction>,
    /// Transaction types in submission order; "link" for bindings.
    events: Vec<String>,
    asset_totals: Vec<u64>,
    linked_asset: u64,
    submit_failures: VecDeque<Error>,
    wait_failures: VecDeque<Error>,
    call_failures: VecDeque<Error>,
    holding_failures: VecDeque<Error>,
    node_down: bool,
}

/// In-memory ledger. Application creation yields [`APP_ID`], asset creation
/// [`ASSET_ID`]; every submission confirms on the next wait. Submissions are
/// decoded from their msgpack wire form.
pub struct MockLedger {
    pub calls: CallCounts,
    state: Mutex<MockState>,
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            calls: CallCounts::default(),
            state: Mutex::new(MockState {
                balance: 10_000_000,
                ..Default::default()
            }),
        }
    }

    pub fn set_balance(&self, balance: u64) {
        self.state.lock().unwrap().balance = balance;
    }

    pub fn set_holding(&self, address: &str, asset_id: u64, amount: u64) {
        self.state
            .lock()
            .unwrap()
            .holdings
            .insert((address.to_string(), asset_id), amount);
    }

    pub fn remove_holding(&self, address: &str, asset_id: u64) {
        self.state
            .lock()
            .unwrap()
            .holdings
            .remove(&(address.to_string(), asset_id));
    }

    pub fn fail_submits(&self, errors: impl IntoIterator<Item = Error>) {
        self.state.lock().unwrap().submit_failures.extend(errors);
    }

    pub fn fail_waits(&self, errors: impl IntoIterator<Item = Error>) {
        self.state.lock().unwrap().wait_failures.extend(errors);
    }

    pub fn fail_calls(&self, errors: impl IntoIterator<Item = Error>) {
        self.state.lock().unwrap().call_failures.extend(errors);
    }

    pub fn fail_holdings(&self, errors: impl IntoIterator<Item = Error>) {
        self.state.lock().unwrap().holding_failures.extend(errors);
    }

    pub fn set_node_down(&self, down: bool) {
        self.state.lock().unwrap().node_down = down;
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn asset_totals(&self) -> Vec<u64> {
        self.state.lock().unwrap().asset_totals.clone()
    }

    pub fn linked_asset(&self) -> u64 {
        self.state.lock().unwrap().linked_asset
    }

    fn held(state: &MockState, address: &str, asset_id: u64) -> bool {
        state
            .holdings
            .get(&(address.to_string(), asset_id))
            .is_some_and(|amount| *amount > 0)
    }
}

fn field<'a>(map: &'a Value, key: &str) -> Option<&'a Value> {
    map.as_map()?
        .iter()
        .find(|(k, _)| k.as_str() == Some(key))
        .map(|(_, v)| v)
}

fn uint_field(map: &Value, key: &str) -> u64 {
    field(map, key).and_then(Value::as_u64).unwrap_or_default()
}

fn rejected(reason: impl Into<String>) -> Error {
    Error::Rejected {
        tx_id: "unassigned".into(),
        reason: reason.into(),
    }
}

fn return_log(value: AbiValue) -> Vec<u8> {
    let mut log = RETURN_PREFIX.to_vec();
    log.extend_from_slice(&value.encode().unwrap());
    log
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn fee_parameters(&self) -> Result<TransactionParameters> {
        let n = self.calls.fee_parameters.fetch_add(1, Ordering::SeqCst) as u64;
        Ok(TransactionParameters {
            fee: 0,
            min_fee: 1_000,
            first_valid: 1_000 + n,
            last_valid: 2_000 + n,
            genesis_id: "mocknet-v1".into(),
            genesis_hash: "bW9jaw==".into(),
        })
    }

    async fn submit(&self, transaction: &SignedTransaction) -> Result<String> {
        self.calls.submit.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.submit_failures.pop_front() {
            return Err(err);
        }

        let signed = rmpv::decode::read_value(&mut transaction.as_bytes())
            .map_err(|e| rejected(format!("undecodable transaction: {e}")))?;
        if field(&signed, "sig").and_then(Value::as_slice).map(<[u8]>::len) != Some(64) {
            return Err(rejected("missing signature"));
        }
        let txn = field(&signed, "txn").ok_or_else(|| rejected("missing txn"))?;
        let kind = match (field(txn, "type").and_then(Value::as_str), field(txn, "apid")) {
            (Some("appl"), None) => "application_create",
            (Some("appl"), Some(_)) => "application_call",
            (Some("acfg"), _) => "asset_create",
            (Some("axfer"), _) => "asset_transfer",
            (other, _) => return Err(rejected(format!("unsupported type {other:?}"))),
        };
        if kind == "application_call" {
            self.calls.app_calls.fetch_add(1, Ordering::SeqCst);
            if let Some(err) = state.call_failures.pop_front() {
                return Err(err);
            }
            let app_id = uint_field(txn, "apid");
            if app_id != APP_ID {
                return Err(rejected(format!("application {app_id} does not exist")));
            }
        }

        state.next_tx += 1;
        let tx_id = format!("TX{}", state.next_tx);
        let mut confirmed = ConfirmedTransaction {
            id: tx_id.clone(),
            confirmed_round: 5_000 + state.next_tx,
            ..Default::default()
        };

        let mut event = kind.to_string();
        match kind {
            "application_create" => {
                self.calls.app_creates.fetch_add(1, Ordering::SeqCst);
                confirmed.created_application_id = Some(APP_ID);
            }
            "asset_create" => {
                self.calls.asset_creates.fetch_add(1, Ordering::SeqCst);
                let total = field(txn, "apar").map_or(0, |p| uint_field(p, "t"));
                state.asset_totals.push(total);
                confirmed.created_asset_id = Some(ASSET_ID);
            }
            "asset_transfer" => {
                self.calls.opt_ins.fetch_add(1, Ordering::SeqCst);
                let receiver: [u8; 32] = field(txn, "arcv")
                    .and_then(Value::as_slice)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| rejected("missing receiver"))?;
                let asset_id = uint_field(txn, "xaid");
                state
                    .holdings
                    .entry((encode_address(&receiver), asset_id))
                    .or_insert(0);
            }
            _ => {
                let args: Vec<&[u8]> = field(txn, "apaa")
                    .and_then(Value::as_array)
                    .map(|a| a.iter().filter_map(Value::as_slice).collect())
                    .unwrap_or_default();
                match args.as_slice() {
                    [selector, asset] if *selector == SET_CREDENTIAL_ASSET.selector() => {
                        let asset: [u8; 8] = (*asset)
                            .try_into()
                            .map_err(|_| rejected("malformed asset argument"))?;
                        state.linked_asset = u64::from_be_bytes(asset);
                        event = "link".into();
                    }
                    _ => return Err(rejected("logic eval error: unknown method")),
                }
            }
        }
        state.events.push(event);
        state.pending.insert(tx_id.clone(), confirmed);
        Ok(tx_id)
    }

    async fn wait_for_confirmation(
        &self,
        tx_id: &str,
        max_rounds: u64,
    ) -> Result<ConfirmedTransaction> {
        self.calls.waits.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.wait_failures.pop_front() {
            return Err(err);
        }
        state
            .pending
            .remove(tx_id)
            .ok_or_else(|| Error::ConfirmationTimeout {
                tx_id: tx_id.to_string(),
                rounds: max_rounds,
            })
    }

    async fn account_asset_holding(
        &self,
        address: &str,
        asset_id: u64,
    ) -> Result<Option<AccountAssetHolding>> {
        self.calls.holding.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.holding_failures.pop_front() {
            return Err(err);
        }
        Ok(state
            .holdings
            .get(&(address.to_string(), asset_id))
            .map(|amount| AccountAssetHolding {
                asset_id,
                amount: *amount,
            }))
    }

    async fn account_balance(&self, _address: &str) -> Result<u64> {
        self.calls.balance.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.lock().unwrap().balance)
    }

    async fn simulate(&self, transaction: &Transaction) -> Result<Vec<Vec<u8>>> {
        self.calls.app_calls.fetch_add(1, Ordering::SeqCst);
        self.calls.simulations.fetch_add(1, Ordering::SeqCst);
        let mut state = self.state.lock().unwrap();
        if let Some(err) = state.call_failures.pop_front() {
            return Err(err);
        }
        let TransactionKind::ApplicationCall {
            app_id, app_args, ..
        } = &transaction.kind
        else {
            return Err(Error::ApplicationCall("only application calls simulate".into()));
        };
        if *app_id != APP_ID {
            return Err(Error::ApplicationCall(format!("application {app_id} does not exist")));
        }

        let selector = app_args.first().map(Vec::as_slice).unwrap_or_default();
        let value = if selector == GET_CREDENTIAL_ASSET.selector() {
            AbiValue::Uint64(state.linked_asset)
        } else if selector == CHECK_TICKET.selector() {
            let asset: [u8; 8] = app_args[1].as_slice().try_into().unwrap();
            let held = Self::held(&state, &transaction.sender, u64::from_be_bytes(asset));
            AbiValue::Bool(held)
        } else if selector == CHECK_TICKET_FOR.selector() {
            let owner: [u8; 32] = app_args[1].as_slice().try_into().unwrap();
            AbiValue::Bool(Self::held(&state, &encode_address(&owner), state.linked_asset))
        } else {
            return Err(Error::ApplicationCall("logic eval error: unknown method".into()));
        };
        Ok(vec![return_log(value)])
    }

    async fn status(&self) -> Result<NodeStatus> {
        let state = self.state.lock().unwrap();
        if state.node_down {
            return Err(Error::Network("GET /v2/status: connection refused".into()));
        }
        Ok(NodeStatus {
            last_round: 5_000 + state.next_tx,
        })
    }
}

pub fn signer() -> Arc<DeployerSigner> {
    Arc::new(DeployerSigner::from_signing_key(SigningKey::from_bytes(&[1u8; 32])))
}

/// Account that is not the deployer.
pub fn holder_address() -> String {
    let key = SigningKey::from_bytes(&[2u8; 32]);
    algotix_deployer::ledger::address::encode_address(&key.verifying_key().to_bytes())
}

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(5, Duration::ZERO)
}

pub fn artifact() -> ProgramArtifact {
    ProgramArtifact::new(vec![0x08, 0x81, 0x01], vec![0x08, 0x81, 0x01])
}

pub fn endpoint() -> Endpoint {
    Config::default().endpoint()
}

pub fn store_in(dir: &Path) -> Arc<RecordStore> {
    Arc::new(RecordStore::new(dir.join("deployment.env")))
}

pub fn settings() -> PipelineSettings {
    PipelineSettings::from_config(&Config::default())
}

pub fn pipeline(ledger: &Arc<MockLedger>, store: &Arc<RecordStore>) -> DeploymentPipeline {
    pipeline_with(ledger, store, settings())
}

pub fn pipeline_with(
    ledger: &Arc<MockLedger>,
    store: &Arc<RecordStore>,
    settings: PipelineSettings,
) -> DeploymentPipeline {
    let ledger: Arc<dyn LedgerClient> = ledger.clone();
    DeploymentPipeline::new(
        ledger,
        signer(),
        store.clone(),
        fast_retry(),
        settings,
        endpoint(),
    )
}
