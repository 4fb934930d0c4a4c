//! Deployment pipeline: create application → mint asset → link → persist.
//!
//! Steps run strictly in order because each consumes the identifier the
//! previous one produced. Every ledger RPC goes through the retry policy on
//! its own; confirmation waits do not. A failed step leaves the partial
//! record in memory (see [`DeploymentPipeline::record`]) and nothing on
//! disk. Calling [`DeploymentPipeline::run`] again picks up from the stage
//! reached, except that the asset is never minted twice by one pipeline.

use std::sync::Arc;
use tracing::{info, warn};

use crate::app::{ProgramArtifact, TicketApp};
use crate::config::TicketConfig;
use crate::error::{Error, Result};
use crate::ledger::{AssetParams, ConfirmedTransaction, LedgerClient, Transaction, TransactionKind};
use crate::record::{DeploymentRecord, Endpoint, Stage};
use crate::retry::RetryPolicy;
use crate::signer::DeployerSigner;
use crate::store::RecordStore;

/// Largest decimals value the ledger accepts for an asset.
const MAX_DECIMALS: u32 = 19;

/// Per-run knobs taken from [`crate::Config`].
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    pub ticket: TicketConfig,
    pub confirmation_rounds: u64,
    pub min_deployer_balance: u64,
}

impl PipelineSettings {
    pub fn from_config(config: &crate::Config) -> Self {
        Self {
            ticket: config.ticket.clone(),
            confirmation_rounds: config.confirmation_rounds,
            min_deployer_balance: config.min_deployer_balance,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.ticket.total == 0 {
            return Err(Error::InvalidConfiguration(
                "ticket supply must be greater than zero".into(),
            ));
        }
        if self.ticket.decimals > MAX_DECIMALS {
            return Err(Error::InvalidConfiguration(format!(
                "ticket decimals must be at most {MAX_DECIMALS}"
            )));
        }
        Ok(())
    }
}

pub struct DeploymentPipeline {
    ledger: Arc<dyn LedgerClient>,
    signer: Arc<DeployerSigner>,
    store: Arc<RecordStore>,
    retry: RetryPolicy,
    settings: PipelineSettings,
    artifact: Option<ProgramArtifact>,
    record: DeploymentRecord,
    stage: Stage,
    asset_minted: bool,
}

impl DeploymentPipeline {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        signer: Arc<DeployerSigner>,
        store: Arc<RecordStore>,
        retry: RetryPolicy,
        settings: PipelineSettings,
        endpoint: Endpoint,
    ) -> Self {
        let record = DeploymentRecord::new(signer.address(), endpoint);
        Self {
            ledger,
            signer,
            store,
            retry,
            settings,
            artifact: None,
            record,
            stage: Stage::Empty,
            asset_minted: false,
        }
    }

    /// Program to deploy. Only needed when no application is resumed.
    pub fn with_artifact(mut self, artifact: ProgramArtifact) -> Self {
        self.artifact = Some(artifact);
        self
    }

    /// Adopt an existing application instead of creating one.
    pub fn resume_application(mut self, app_id: u64) -> Result<Self> {
        self.record.set_application(app_id)?;
        self.stage = Stage::AppCreated;
        info!(app_id, "Resuming with existing application");
        Ok(self)
    }

    /// Continue from a previously produced record. A record carrying an
    /// asset id only needs the link step.
    pub fn resume(mut self, record: &DeploymentRecord) -> Result<Self> {
        if record.application_id() != 0 {
            self.record.set_application(record.application_id())?;
        }
        if record.asset_id() != 0 {
            self.record.set_asset(record.asset_id())?;
            self.asset_minted = true;
        }
        self.stage = self.record.stage();
        info!(
            stage = %self.stage,
            app_id = self.record.application_id(),
            asset_id = self.record.asset_id(),
            "Resuming deployment"
        );
        Ok(self)
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Identifiers produced so far, persisted or not.
    pub fn record(&self) -> &DeploymentRecord {
        &self.record
    }

    /// Drive the pipeline to `LINKED` and persist the record.
    pub async fn run(&mut self) -> Result<DeploymentRecord> {
        self.settings.validate()?;

        loop {
            match self.stage {
                Stage::Empty => {
                    let app_id = self.create_application().await?;
                    self.record.set_application(app_id)?;
                    self.advance(Stage::AppCreated);
                }
                Stage::AppCreated => {
                    let asset_id = self.create_asset().await?;
                    self.record.set_asset(asset_id)?;
                    self.advance(Stage::AssetCreated);
                }
                Stage::AssetCreated => {
                    self.link().await?;
                    self.advance(Stage::Linked);
                }
                Stage::Linked => break,
            }
        }

        self.store.save(&self.record)?;
        info!(
            app_id = self.record.application_id(),
            asset_id = self.record.asset_id(),
            path = %self.store.path().display(),
            "Deployment complete"
        );
        Ok(self.record.clone())
    }

    fn advance(&mut self, stage: Stage) {
        self.stage = stage;
        info!(
            stage = %stage,
            app_id = self.record.application_id(),
            asset_id = self.record.asset_id(),
            "Deployment advanced"
        );
    }

    async fn create_application(&self) -> Result<u64> {
        let artifact = self.artifact.as_ref().ok_or_else(|| {
            Error::InvalidConfiguration("no program artifact to deploy".into())
        })?;

        let sender = self.signer.address();
        let balance = self
            .retry
            .run("account_balance", || self.ledger.account_balance(sender))
            .await?;
        if balance < self.settings.min_deployer_balance {
            return Err(Error::InvalidConfiguration(format!(
                "deployer {sender} holds {balance}, needs at least {}",
                self.settings.min_deployer_balance
            )));
        }

        let confirmed = execute(
            self.ledger.as_ref(),
            &self.signer,
            &self.retry,
            artifact.create_kind(),
            self.settings.confirmation_rounds,
        )
        .await?;
        confirmed.created_application_id.ok_or_else(|| {
            Error::Network(format!(
                "transaction {} confirmed without an application id",
                confirmed.id
            ))
        })
    }

    async fn create_asset(&mut self) -> Result<u64> {
        if self.asset_minted {
            return Err(Error::InvalidConfiguration(format!(
                "asset creation already attempted for application {}; resume from the recorded asset",
                self.record.application_id()
            )));
        }
        let ticket = &self.settings.ticket;
        let kind = TransactionKind::AssetCreate(AssetParams {
            total: ticket.total,
            decimals: ticket.decimals,
            default_frozen: false,
            unit_name: ticket.unit.clone(),
            asset_name: ticket.name.clone(),
            url: ticket.url.clone(),
            manager: Some(self.signer.address().to_string()),
        });

        self.asset_minted = true;
        let confirmed = execute(
            self.ledger.as_ref(),
            &self.signer,
            &self.retry,
            kind,
            self.settings.confirmation_rounds,
        )
        .await?;
        confirmed.created_asset_id.ok_or_else(|| {
            Error::Network(format!(
                "transaction {} confirmed without an asset id",
                confirmed.id
            ))
        })
    }

    async fn link(&self) -> Result<()> {
        let asset_id = self.record.asset_id();
        let app = TicketApp::signed_by(
            self.ledger.clone(),
            self.record.application_id(),
            self.signer.clone(),
            self.settings.confirmation_rounds,
        )
        .with_retry(self.retry.clone());
        let result = app.set_credential_asset(asset_id).await;
        if let Err(err) = &result {
            warn!(
                app_id = app.app_id(),
                asset_id,
                error = %err,
                "Linking failed; resume with the recorded asset"
            );
        }
        result
    }
}

/// Build, sign, submit and confirm one transaction from the signer's account.
///
/// Parameters are fetched fresh. Each RPC is retried on its own; the
/// confirmation wait is not.
pub(crate) async fn execute(
    ledger: &dyn LedgerClient,
    signer: &DeployerSigner,
    retry: &RetryPolicy,
    kind: TransactionKind,
    confirmation_rounds: u64,
) -> Result<ConfirmedTransaction> {
    let label = kind.label();
    let params = retry
        .run("fee_parameters", || ledger.fee_parameters())
        .await?;
    let txn = Transaction::new(signer.address(), params, kind);
    let signed = retry.run("sign", || signer.sign(&txn)).await?;
    let tx_id = retry.run("submit", || ledger.submit(&signed)).await?;
    info!(kind = label, tx_id = %tx_id, "Transaction submitted, awaiting confirmation");

    let confirmed = ledger.wait_for_confirmation(&tx_id, confirmation_rounds).await?;
    info!(
        kind = label,
        tx_id = %confirmed.id,
        round = confirmed.confirmed_round,
        "Transaction confirmed"
    );
    Ok(confirmed)
}
