//! Typed calls into the deployed ticket application.
//!
//! The program itself is an opaque compiled artifact. This module only knows
//! its method surface and its state schema. Writes are signed, submitted and
//! confirmed; read-only methods are answered by simulation and cost nothing.

use std::path::Path;
use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ledger::abi::{AbiMethod, AbiType, AbiValue};
use crate::ledger::{LedgerClient, StateSchema, Transaction, TransactionKind};
use crate::pipeline;
use crate::retry::RetryPolicy;
use crate::signer::DeployerSigner;

/// Admin-only: bind the credential asset to the application.
pub const SET_CREDENTIAL_ASSET: AbiMethod = AbiMethod {
    name: "set_credential_asset",
    args: &[AbiType::Uint64],
    returns: None,
};

pub const GET_CREDENTIAL_ASSET: AbiMethod = AbiMethod {
    name: "get_credential_asset",
    args: &[],
    returns: Some(AbiType::Uint64),
};

/// Does the caller hold the given asset?
pub const CHECK_TICKET: AbiMethod = AbiMethod {
    name: "check_ticket",
    args: &[AbiType::Uint64],
    returns: Some(AbiType::Bool),
};

/// Does `owner` hold the bound credential asset?
pub const CHECK_TICKET_FOR: AbiMethod = AbiMethod {
    name: "check_ticket_for",
    args: &[AbiType::Address],
    returns: Some(AbiType::Bool),
};

/// One global uint: the bound asset id.
pub const GLOBAL_SCHEMA: StateSchema = StateSchema {
    num_uints: 1,
    num_byte_slices: 0,
};

/// Compiled approval and clear programs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramArtifact {
    pub approval: Vec<u8>,
    pub clear: Vec<u8>,
}

impl ProgramArtifact {
    pub fn new(approval: Vec<u8>, clear: Vec<u8>) -> Self {
        Self { approval, clear }
    }

    /// Read both programs from disk.
    pub fn load(approval: impl AsRef<Path>, clear: impl AsRef<Path>) -> Result<Self> {
        let read = |path: &Path| {
            std::fs::read(path).map_err(|e| {
                Error::InvalidConfiguration(format!("cannot read program {}: {e}", path.display()))
            })
        };
        let artifact = Self::new(read(approval.as_ref())?, read(clear.as_ref())?);
        if artifact.approval.is_empty() || artifact.clear.is_empty() {
            return Err(Error::InvalidConfiguration("empty program artifact".into()));
        }
        Ok(artifact)
    }

    pub fn from_config(config: &crate::Config) -> Result<Self> {
        Self::load(&config.approval_program, &config.clear_program)
    }

    /// Application-creation payload for this artifact.
    pub fn create_kind(&self) -> TransactionKind {
        TransactionKind::ApplicationCreate {
            approval_program: self.approval.clone(),
            clear_program: self.clear.clone(),
            global_schema: GLOBAL_SCHEMA,
            local_schema: StateSchema::default(),
        }
    }
}

/// Handle on one deployed application, calling as `sender`.
#[derive(Clone)]
pub struct TicketApp {
    ledger: Arc<dyn LedgerClient>,
    app_id: u64,
    sender: String,
    retry: RetryPolicy,
    admin: Option<Admin>,
}

#[derive(Clone)]
struct Admin {
    signer: Arc<DeployerSigner>,
    confirmation_rounds: u64,
}

impl TicketApp {
    /// Read-only handle. Reads need no key, so `sender` can be any account.
    pub fn new(ledger: Arc<dyn LedgerClient>, app_id: u64, sender: impl Into<String>) -> Self {
        Self {
            ledger,
            app_id,
            sender: sender.into(),
            retry: RetryPolicy::default(),
            admin: None,
        }
    }

    /// Handle that can also write, calling as the signer's account.
    pub fn signed_by(
        ledger: Arc<dyn LedgerClient>,
        app_id: u64,
        signer: Arc<DeployerSigner>,
        confirmation_rounds: u64,
    ) -> Self {
        let mut app = Self::new(ledger, app_id, signer.address());
        app.admin = Some(Admin {
            signer,
            confirmation_rounds,
        });
        app
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn app_id(&self) -> u64 {
        self.app_id
    }

    /// Bind the credential asset.
    pub async fn set_credential_asset(&self, asset_id: u64) -> Result<()> {
        require_asset(asset_id)?;
        self.call_application(&SET_CREDENTIAL_ASSET, &[AbiValue::Uint64(asset_id)])
            .await?;
        Ok(())
    }

    /// Signed call: one submission, then its confirmation. A throttled
    /// confirmation wait fails the call rather than sending it again.
    pub async fn call_application(
        &self,
        method: &AbiMethod,
        args: &[AbiValue],
    ) -> Result<Option<AbiValue>> {
        let admin = self.admin.as_ref().ok_or_else(|| {
            Error::InvalidConfiguration(format!("no signing key for caller {}", self.sender))
        })?;
        let kind = self.call_kind(method, args)?;

        let confirmed = pipeline::execute(
            self.ledger.as_ref(),
            &admin.signer,
            &self.retry,
            kind,
            admin.confirmation_rounds,
        )
        .await
        .map_err(|err| match err {
            Error::Rejected { reason, .. } => Error::ApplicationCall(reason),
            other => other,
        })?;
        debug!(app_id = self.app_id, method = method.name, tx_id = %confirmed.id, "Application call confirmed");
        method.decode_return(&confirmed.logs)
    }

    pub async fn get_credential_asset(&self) -> Result<u64> {
        match self.simulate_call(&GET_CREDENTIAL_ASSET, &[]).await? {
            Some(AbiValue::Uint64(id)) => Ok(id),
            other => Err(unexpected(&GET_CREDENTIAL_ASSET, other)),
        }
    }

    /// On-chain self-check: does `sender` hold `asset_id`?
    pub async fn check_ticket(&self, asset_id: u64) -> Result<bool> {
        require_asset(asset_id)?;
        self.read_bool(&CHECK_TICKET, &[AbiValue::Uint64(asset_id)])
            .await
    }

    /// On-chain third-party check against the bound asset.
    pub async fn check_ticket_for(&self, owner: &str) -> Result<bool> {
        self.read_bool(&CHECK_TICKET_FOR, &[AbiValue::Address(owner.to_string())])
            .await
    }

    async fn read_bool(&self, method: &AbiMethod, args: &[AbiValue]) -> Result<bool> {
        match self.simulate_call(method, args).await? {
            Some(AbiValue::Bool(held)) => Ok(held),
            other => Err(unexpected(method, other)),
        }
    }

    /// Evaluate a read-only method by simulation. Each RPC is retried on its
    /// own; nothing is submitted and no key is needed.
    pub async fn simulate_call(
        &self,
        method: &AbiMethod,
        args: &[AbiValue],
    ) -> Result<Option<AbiValue>> {
        let kind = self.call_kind(method, args)?;
        let params = self
            .retry
            .run("fee_parameters", || self.ledger.fee_parameters())
            .await?;
        let txn = Transaction::new(self.sender.clone(), params, kind);
        let logs = self
            .retry
            .run(method.name, || self.ledger.simulate(&txn))
            .await?;
        method.decode_return(&logs)
    }

    fn call_kind(&self, method: &AbiMethod, args: &[AbiValue]) -> Result<TransactionKind> {
        if self.app_id == 0 {
            return Err(Error::InvalidConfiguration(
                "no application deployed".into(),
            ));
        }
        let app_args = method.encode_args(args)?;
        let (foreign_assets, accounts) = references(args);
        Ok(TransactionKind::ApplicationCall {
            app_id: self.app_id,
            app_args,
            foreign_assets,
            accounts,
        })
    }
}

/// Arguments the program reads by reference must be listed on the call.
fn references(args: &[AbiValue]) -> (Vec<u64>, Vec<String>) {
    let mut assets = Vec::new();
    let mut accounts = Vec::new();
    for arg in args {
        match arg {
            AbiValue::Uint64(id) => assets.push(*id),
            AbiValue::Address(addr) => accounts.push(addr.clone()),
            AbiValue::Bool(_) => {}
        }
    }
    (assets, accounts)
}

fn require_asset(asset_id: u64) -> Result<()> {
    if asset_id == 0 {
        return Err(Error::InvalidConfiguration(
            "no credential asset deployed (asset id 0)".into(),
        ));
    }
    Ok(())
}

fn unexpected(method: &AbiMethod, value: Option<AbiValue>) -> Error {
    Error::ApplicationCall(format!(
        "{} returned {value:?}",
        method.signature()
    ))
}
