mod common;

use algotix_deployer::app::TicketApp;
use algotix_deployer::{Error, LedgerClient, OwnershipVerifier, RetryPolicy};
use common::*;
use std::sync::Arc;
use std::time::Duration;

fn verifier(ledger: &Arc<MockLedger>) -> OwnershipVerifier {
    let ledger: Arc<dyn LedgerClient> = ledger.clone();
    OwnershipVerifier::new(ledger, fast_retry())
}

#[tokio::test]
async fn test_no_holding_is_false() {
    let ledger = Arc::new(MockLedger::new());
    assert!(!verifier(&ledger).has_ticket(&holder_address(), ASSET_ID).await.unwrap());
}

#[tokio::test]
async fn test_single_unit_is_true() {
    let ledger = Arc::new(MockLedger::new());
    ledger.set_holding(&holder_address(), ASSET_ID, 1);
    assert!(verifier(&ledger).has_ticket(&holder_address(), ASSET_ID).await.unwrap());
}

#[tokio::test]
async fn test_many_units_is_true() {
    let ledger = Arc::new(MockLedger::new());
    ledger.set_holding(&holder_address(), ASSET_ID, 100);
    assert!(verifier(&ledger).has_ticket(&holder_address(), ASSET_ID).await.unwrap());
}

#[tokio::test]
async fn test_opted_in_with_zero_balance_is_false() {
    let ledger = Arc::new(MockLedger::new());
    ledger.set_holding(&holder_address(), ASSET_ID, 0);
    assert!(!verifier(&ledger).has_ticket(&holder_address(), ASSET_ID).await.unwrap());
}

#[tokio::test]
async fn test_zero_asset_id_is_configuration_error() {
    let ledger = Arc::new(MockLedger::new());
    let err = verifier(&ledger)
        .has_ticket(&holder_address(), 0)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration(_)));
    assert_eq!(CallCounts::get(&ledger.calls.holding), 0);
}

#[tokio::test]
async fn test_repeated_checks_agree() {
    let ledger = Arc::new(MockLedger::new());
    ledger.set_holding(&holder_address(), ASSET_ID, 1);
    let verifier = verifier(&ledger);

    let first = verifier.has_ticket(&holder_address(), ASSET_ID).await.unwrap();
    let second = verifier.has_ticket(&holder_address(), ASSET_ID).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(CallCounts::get(&ledger.calls.holding), 2);
}

#[tokio::test(start_paused = true)]
async fn test_throttled_read_is_retried() {
    let ledger = Arc::new(MockLedger::new());
    ledger.set_holding(&holder_address(), ASSET_ID, 1);
    ledger.fail_holdings([Error::RateLimited("HTTP 429".into())]);
    let dyn_ledger: Arc<dyn LedgerClient> = ledger.clone();
    let verifier = OwnershipVerifier::new(dyn_ledger, RetryPolicy::new(3, Duration::from_secs(1)));

    assert!(verifier.has_ticket(&holder_address(), ASSET_ID).await.unwrap());
    assert_eq!(CallCounts::get(&ledger.calls.holding), 2);
}

#[tokio::test]
async fn test_network_failure_on_read_propagates() {
    let ledger = Arc::new(MockLedger::new());
    ledger.fail_holdings([Error::Network("connection refused".into())]);
    let err = verifier(&ledger)
        .has_ticket(&holder_address(), ASSET_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Network(_)));
}

#[tokio::test]
async fn test_concurrent_checks() {
    let ledger = Arc::new(MockLedger::new());
    ledger.set_holding(&holder_address(), ASSET_ID, 1);
    let verifier = verifier(&ledger);

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let verifier = verifier.clone();
            tokio::spawn(async move { verifier.has_ticket(&holder_address(), ASSET_ID).await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().unwrap());
    }
}

#[tokio::test]
async fn test_on_chain_check_agrees_with_ledger_query() {
    let ledger = Arc::new(MockLedger::new());
    let dyn_ledger: Arc<dyn LedgerClient> = ledger.clone();
    let holder = holder_address();
    let admin = TicketApp::signed_by(dyn_ledger.clone(), APP_ID, signer(), 4);
    admin.set_credential_asset(ASSET_ID).await.unwrap();
    assert_eq!(admin.get_credential_asset().await.unwrap(), ASSET_ID);

    let verifier = verifier(&ledger);
    for amount in [None, Some(0), Some(1), Some(100)] {
        match amount {
            Some(a) => ledger.set_holding(&holder, ASSET_ID, a),
            None => ledger.remove_holding(&holder, ASSET_ID),
        }
        let off_chain = verifier.has_ticket(&holder, ASSET_ID).await.unwrap();
        let on_chain = admin.check_ticket_for(&holder).await.unwrap();
        assert_eq!(on_chain, off_chain, "holding {amount:?}");

        // Self-check from the holder's own account.
        let own = TicketApp::new(dyn_ledger.clone(), APP_ID, holder.clone());
        assert_eq!(own.check_ticket(ASSET_ID).await.unwrap(), off_chain);
    }
}

#[tokio::test]
async fn test_self_check_ignores_other_accounts() {
    let ledger = Arc::new(MockLedger::new());
    let dyn_ledger: Arc<dyn LedgerClient> = ledger.clone();
    ledger.set_holding(&holder_address(), ASSET_ID, 1);

    let deployer = TicketApp::signed_by(dyn_ledger, APP_ID, signer(), 4);
    deployer.set_credential_asset(ASSET_ID).await.unwrap();
    assert!(!deployer.check_ticket(ASSET_ID).await.unwrap());
    assert!(deployer.check_ticket_for(&holder_address()).await.unwrap());
}

#[tokio::test]
async fn test_on_chain_reads_are_never_submitted() {
    let ledger = Arc::new(MockLedger::new());
    let dyn_ledger: Arc<dyn LedgerClient> = ledger.clone();
    let reader = TicketApp::new(dyn_ledger, APP_ID, holder_address());

    assert_eq!(reader.get_credential_asset().await.unwrap(), 0);
    assert!(!reader.check_ticket(ASSET_ID).await.unwrap());
    assert!(!reader.check_ticket_for(&holder_address()).await.unwrap());
    assert_eq!(CallCounts::get(&ledger.calls.simulations), 3);
    assert_eq!(CallCounts::get(&ledger.calls.submit), 0);
    assert_eq!(CallCounts::get(&ledger.calls.waits), 0);
}

#[tokio::test]
async fn test_write_needs_signing_key() {
    let ledger = Arc::new(MockLedger::new());
    let dyn_ledger: Arc<dyn LedgerClient> = ledger.clone();
    let reader = TicketApp::new(dyn_ledger, APP_ID, signer().address());

    let err = reader.set_credential_asset(ASSET_ID).await.unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration(_)));
    assert_eq!(CallCounts::get(&ledger.calls.submit), 0);
}

#[tokio::test]
async fn test_on_chain_check_requires_asset() {
    let ledger = Arc::new(MockLedger::new());
    let dyn_ledger: Arc<dyn LedgerClient> = ledger.clone();
    let app = TicketApp::new(dyn_ledger, APP_ID, signer().address());

    let err = app.check_ticket(0).await.unwrap_err();
    assert!(matches!(err, Error::InvalidConfiguration(_)));
    assert_eq!(CallCounts::get(&ledger.calls.app_calls), 0);
}
