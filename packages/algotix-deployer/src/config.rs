//! Deployer configuration.
//!
//! Loaded once at start-up (optional `algotix.toml` overlaid by `ALGOTIX_*`
//! environment variables) and injected into the service, pipeline and
//! verifier. Nested keys use `__`, e.g. `ALGOTIX_TICKET__TOTAL=100`.

use crate::record::Endpoint;
use serde::Deserialize;

/// Process-wide configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "defaults::algod_server")]
    pub algod_server: String,

    #[serde(default = "defaults::algod_port")]
    pub algod_port: String,

    #[serde(default = "defaults::algod_token")]
    pub algod_token: String,

    /// Deployer account. Derived from `deployer_secret_key` when omitted.
    #[serde(default)]
    pub deployer_address: Option<String>,

    /// Base64 ed25519 seed for local signing.
    #[serde(default)]
    pub deployer_secret_key: Option<String>,

    /// Remote signing service, used when no local key is configured.
    #[serde(default)]
    pub signer_url: Option<String>,

    #[serde(default = "defaults::approval_program")]
    pub approval_program: String,

    #[serde(default = "defaults::clear_program")]
    pub clear_program: String,

    #[serde(default = "defaults::record_path")]
    pub record_path: String,

    #[serde(default = "defaults::retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// One backoff time unit; the n-th retry sleeps `2^n` units.
    #[serde(default = "defaults::retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "defaults::confirmation_rounds")]
    pub confirmation_rounds: u64,

    /// Minimum deployer balance (micro-units) required to create the application.
    #[serde(default = "defaults::min_deployer_balance")]
    pub min_deployer_balance: u64,

    #[serde(default)]
    pub ticket: TicketConfig,
}

/// Credential asset parameters. Only `total` and `decimals` matter to the
/// ledger; the rest is display metadata.
#[derive(Debug, Clone, Deserialize)]
pub struct TicketConfig {
    #[serde(default = "defaults::ticket_name")]
    pub name: String,

    #[serde(default = "defaults::ticket_unit")]
    pub unit: String,

    #[serde(default = "defaults::ticket_url")]
    pub url: String,

    /// 1 for a single non-fungible ticket, N for a batch.
    #[serde(default = "defaults::ticket_total")]
    pub total: u64,

    #[serde(default)]
    pub decimals: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            algod_server: defaults::algod_server(),
            algod_port: defaults::algod_port(),
            algod_token: defaults::algod_token(),
            deployer_address: None,
            deployer_secret_key: None,
            signer_url: None,
            approval_program: defaults::approval_program(),
            clear_program: defaults::clear_program(),
            record_path: defaults::record_path(),
            retry_max_attempts: defaults::retry_max_attempts(),
            retry_base_delay_ms: defaults::retry_base_delay_ms(),
            confirmation_rounds: defaults::confirmation_rounds(),
            min_deployer_balance: defaults::min_deployer_balance(),
            ticket: TicketConfig::default(),
        }
    }
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            name: defaults::ticket_name(),
            unit: defaults::ticket_unit(),
            url: defaults::ticket_url(),
            total: defaults::ticket_total(),
            decimals: 0,
        }
    }
}

impl Config {
    /// Load from an optional file and the `ALGOTIX_` environment.
    ///
    /// An explicit `path` must exist; the implicit `algotix.toml` may not.
    pub fn load(path: Option<&str>) -> Result<Self, crate::Error> {
        let config: Config = config::Config::builder()
            .add_source(config::File::with_name(path.unwrap_or("algotix")).required(path.is_some()))
            .add_source(
                config::Environment::with_prefix("ALGOTIX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| crate::Error::InvalidConfiguration(format!("failed to load config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values no deployment could succeed with.
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.algod_server.trim().is_empty() {
            return Err(crate::Error::InvalidConfiguration(
                "algod_server must not be empty".into(),
            ));
        }
        if self.retry_max_attempts == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "retry_max_attempts must be at least 1".into(),
            ));
        }
        if self.confirmation_rounds == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "confirmation_rounds must be at least 1".into(),
            ));
        }
        if self.ticket.total == 0 {
            return Err(crate::Error::InvalidConfiguration(
                "ticket.total must be greater than zero".into(),
            ));
        }
        Ok(())
    }

    /// Node endpoint as persisted in the deployment record.
    pub fn endpoint(&self) -> Endpoint {
        Endpoint {
            server: self.algod_server.clone(),
            port: self.algod_port.clone(),
            token: self.algod_token.clone(),
        }
    }

    /// Base URL of the node's REST API.
    pub fn node_url(&self) -> String {
        self.endpoint().url()
    }
}

mod defaults {
    pub fn algod_server() -> String {
        "http://localhost".into()
    }

    pub fn algod_port() -> String {
        "4001".into()
    }

    /// Local sandbox token.
    pub fn algod_token() -> String {
        "a".repeat(64)
    }

    pub fn approval_program() -> String {
        "./contracts/build/approval.teal.tok".into()
    }

    pub fn clear_program() -> String {
        "./contracts/build/clear.teal.tok".into()
    }

    pub fn record_path() -> String {
        "./deployment.env".into()
    }

    pub fn retry_max_attempts() -> u32 {
        5
    }

    pub fn retry_base_delay_ms() -> u64 {
        1_000
    }

    pub fn confirmation_rounds() -> u64 {
        4
    }

    /// 1 ALGO.
    pub fn min_deployer_balance() -> u64 {
        1_000_000
    }

    pub fn ticket_name() -> String {
        "Hackathon Entry Ticket".into()
    }

    pub fn ticket_unit() -> String {
        "TICKET".into()
    }

    pub fn ticket_url() -> String {
        "https://hackathon-pw.vercel.app/metadata/ticket.json".into()
    }

    pub fn ticket_total() -> u64 {
        1
    }
}
