//! Ledger traffic counters (lock-free atomics).

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

pub struct Metrics {
    // --- RPC ---
    pub rpc_calls: AtomicU64,
    pub rpc_errors: AtomicU64,
    pub rate_limited: AtomicU64,
    pub retries: AtomicU64,

    // --- Transactions ---
    pub tx_submitted: AtomicU64,
    pub tx_confirmed: AtomicU64,
}

/// Point-in-time copy of [`Metrics`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct MetricsSnapshot {
    pub rpc_calls: u64,
    pub rpc_errors: u64,
    pub rate_limited: u64,
    pub retries: u64,
    pub tx_submitted: u64,
    pub tx_confirmed: u64,
}

impl Metrics {
    const fn new() -> Self {
        Self {
            rpc_calls: AtomicU64::new(0),
            rpc_errors: AtomicU64::new(0),
            rate_limited: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            tx_submitted: AtomicU64::new(0),
            tx_confirmed: AtomicU64::new(0),
        }
    }

    /// Count a failed RPC, distinguishing throttling.
    pub fn record_error(&self, err: &crate::Error) {
        self.rpc_errors.fetch_add(1, Ordering::Relaxed);
        if err.is_rate_limited() {
            self.rate_limited.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            rpc_calls: self.rpc_calls.load(Ordering::Relaxed),
            rpc_errors: self.rpc_errors.load(Ordering::Relaxed),
            rate_limited: self.rate_limited.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            tx_submitted: self.tx_submitted.load(Ordering::Relaxed),
            tx_confirmed: self.tx_confirmed.load(Ordering::Relaxed),
        }
    }
}
