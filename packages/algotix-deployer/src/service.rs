//! Service surface: deploy, check, status and opt-in over shared state.

use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::{ProgramArtifact, TicketApp};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::ledger::algod::AlgodClient;
use crate::ledger::{address, LedgerClient, TransactionKind};
use crate::metrics::{MetricsSnapshot, METRICS};
use crate::pipeline::{self, DeploymentPipeline, PipelineSettings};
use crate::record::DeploymentRecord;
use crate::retry::RetryPolicy;
use crate::signer::DeployerSigner;
use crate::store::RecordStore;
use crate::verifier::OwnershipVerifier;

/// Identifiers to resume a deployment from.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeployOptions {
    pub existing_app_id: Option<u64>,
    pub existing_asset_id: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceStatus {
    pub connected: bool,
    pub last_round: Option<u64>,
    pub app_id: u64,
    pub asset_id: u64,
    pub metrics: MetricsSnapshot,
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckResult {
    pub address: String,
    pub asset_id: u64,
    pub has_ticket: bool,
}

/// Shared service state.
///
/// Configuration is fixed at construction. The current deployment record
/// changes only on a successful [`deploy`](Self::deploy) or an explicit
/// [`load_record`](Self::load_record).
pub struct TicketService {
    config: Config,
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<DeployerSigner>,
    store: Arc<RecordStore>,
    retry: RetryPolicy,
    verifier: OwnershipVerifier,
    current: RwLock<Option<DeploymentRecord>>,
    last_partial: Mutex<Option<DeploymentRecord>>,
}

impl TicketService {
    /// Wire the algod adapter and signer from configuration and load any
    /// persisted record.
    pub async fn from_config(config: Config, cancel: CancellationToken) -> Result<Self> {
        let signer = Arc::new(DeployerSigner::from_config(&config)?);
        let ledger: Arc<dyn LedgerClient> =
            Arc::new(AlgodClient::from_config(&config)?);
        let retry = RetryPolicy::from_config(&config).with_cancellation(cancel);
        let service = Self::new(config, ledger, signer, retry);
        service.load_record().await?;
        Ok(service)
    }

    pub fn new(
        config: Config,
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<DeployerSigner>,
        retry: RetryPolicy,
    ) -> Self {
        let store = Arc::new(RecordStore::new(&config.record_path));
        let verifier = OwnershipVerifier::new(ledger.clone(), retry.clone());
        Self {
            config,
            ledger,
            signer,
            store,
            retry,
            verifier,
            current: RwLock::new(None),
            last_partial: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn verifier(&self) -> &OwnershipVerifier {
        &self.verifier
    }

    /// Adopt the persisted record, if any, as the current deployment.
    pub async fn load_record(&self) -> Result<Option<DeploymentRecord>> {
        let record = self.store.load()?;
        if let Some(r) = &record {
            *self.current.write().await = Some(r.clone());
        }
        Ok(record)
    }

    pub async fn current_record(&self) -> Option<DeploymentRecord> {
        self.current.read().await.clone()
    }

    /// Record left behind by the last failed deployment.
    pub async fn last_partial(&self) -> Option<DeploymentRecord> {
        self.last_partial.lock().await.clone()
    }

    /// Run the deployment pipeline, resuming from `options` when given.
    pub async fn deploy(&self, options: DeployOptions) -> Result<DeploymentRecord> {
        let pipeline = DeploymentPipeline::new(
            self.ledger.clone(),
            self.signer.clone(),
            self.store.clone(),
            self.retry.clone(),
            PipelineSettings::from_config(&self.config),
            self.config.endpoint(),
        );
        let mut pipeline = match (options.existing_app_id, options.existing_asset_id) {
            (None, None) => pipeline.with_artifact(ProgramArtifact::from_config(&self.config)?),
            (Some(app_id), None) => pipeline.resume_application(app_id)?,
            (Some(app_id), Some(asset_id)) => {
                let mut record =
                    DeploymentRecord::new(self.signer.address(), self.config.endpoint());
                record.set_application(app_id)?;
                record.set_asset(asset_id)?;
                pipeline.resume(&record)?
            }
            (None, Some(_)) => {
                return Err(Error::InvalidConfiguration(
                    "an existing asset id requires its application id".into(),
                ))
            }
        };

        match pipeline.run().await {
            Ok(record) => {
                *self.current.write().await = Some(record.clone());
                *self.last_partial.lock().await = None;
                Ok(record)
            }
            Err(err) => {
                warn!(
                    stage = %pipeline.stage(),
                    app_id = pipeline.record().application_id(),
                    asset_id = pipeline.record().asset_id(),
                    error = %err,
                    "Deployment aborted"
                );
                *self.last_partial.lock().await = Some(pipeline.record().clone());
                Err(err)
            }
        }
    }

    /// Does `address` hold the current credential asset?
    pub async fn check(&self, address: &str) -> Result<CheckResult> {
        address::validate_address(address)?;
        let asset_id = self.current_asset_id().await;
        let has_ticket = self.verifier.has_ticket(address, asset_id).await?;
        Ok(CheckResult {
            address: address.to_string(),
            asset_id,
            has_ticket,
        })
    }

    /// Same question answered by the deployed application itself.
    pub async fn check_on_chain(&self, address: &str) -> Result<bool> {
        address::validate_address(address)?;
        let app_id = self
            .current_record()
            .await
            .map_or(0, |r| r.application_id());
        TicketApp::new(self.ledger.clone(), app_id, self.signer.address())
            .with_retry(self.retry.clone())
            .check_ticket_for(address)
            .await
    }

    /// Node reachability and the current identifiers. Never fails.
    pub async fn status(&self) -> ServiceStatus {
        let (app_id, asset_id) = self
            .current_record()
            .await
            .map_or((0, 0), |r| (r.application_id(), r.asset_id()));
        let last_round = match self.ledger.status().await {
            Ok(status) => Some(status.last_round),
            Err(err) => {
                warn!(error = %err, "Ledger node unreachable");
                None
            }
        };
        ServiceStatus {
            connected: last_round.is_some(),
            last_round,
            app_id,
            asset_id,
            metrics: METRICS.snapshot(),
        }
    }

    /// Opt the deployer account into `asset_id` (default: current asset).
    /// Returns the confirmed transaction id.
    pub async fn opt_in(&self, asset_id: Option<u64>) -> Result<String> {
        let asset_id = match asset_id {
            Some(id) => id,
            None => self.current_asset_id().await,
        };
        if asset_id == 0 {
            return Err(Error::InvalidConfiguration(
                "no credential asset to opt into".into(),
            ));
        }
        let receiver = self.signer.address().to_string();
        let confirmed = pipeline::execute(
            self.ledger.as_ref(),
            &self.signer,
            &self.retry,
            TransactionKind::AssetTransfer {
                asset_id,
                receiver,
                amount: 0,
            },
            self.config.confirmation_rounds,
        )
        .await?;
        info!(asset_id, tx_id = %confirmed.id, "Opted in");
        Ok(confirmed.id)
    }

    async fn current_asset_id(&self) -> u64 {
        self.current_record().await.map_or(0, |r| r.asset_id())
    }
}
