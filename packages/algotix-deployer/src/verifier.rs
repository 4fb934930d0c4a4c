//! Off-chain ticket ownership check.

use std::sync::Arc;
use tracing::debug;

use crate::error::{Error, Result};
use crate::ledger::LedgerClient;
use crate::retry::RetryPolicy;

/// Answers "does this account hold the credential asset?" from current
/// ledger state. Stateless; clone freely and call concurrently.
#[derive(Clone)]
pub struct OwnershipVerifier {
    ledger: Arc<dyn LedgerClient>,
    retry: RetryPolicy,
}

impl OwnershipVerifier {
    pub fn new(ledger: Arc<dyn LedgerClient>, retry: RetryPolicy) -> Self {
        Self { ledger, retry }
    }

    /// `true` iff `address` has a holding of `asset_id` with a positive amount.
    /// An account that never opted in holds nothing.
    pub async fn has_ticket(&self, address: &str, asset_id: u64) -> Result<bool> {
        if asset_id == 0 {
            return Err(Error::InvalidConfiguration(
                "no credential asset deployed (asset id 0)".into(),
            ));
        }
        let holding = self
            .retry
            .run("account_asset_holding", || {
                self.ledger.account_asset_holding(address, asset_id)
            })
            .await?;
        let held = holding.is_some_and(|h| h.amount > 0);
        debug!(address, asset_id, held, "Ownership checked");
        Ok(held)
    }
}
