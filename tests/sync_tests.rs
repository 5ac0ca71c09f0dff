// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Sync orchestration tests: whole-pass retry and account discovery.

use bankfeed::config::FirstSyncWindow;
use bankfeed::db::{LedgerStore, MemoryDb};
use bankfeed::error::AppError;
use bankfeed::models::UserRequisition;
use bankfeed::services::{MemoryCredentialStore, RetryPolicy, SyncReconciler, SyncService};
use std::sync::Arc;
use std::time::Duration;

mod common;
use common::{booked, linked_account, test_client, valid_credential, MockAggregator};

const USER: &str = "user-1";

fn policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        delay: Duration::from_millis(5),
    }
}

async fn service(max_attempts: u32) -> (MockAggregator, MemoryDb, SyncService) {
    let mock = MockAggregator::start().await;
    let credentials = Arc::new(MemoryCredentialStore::with_credential(valid_credential(&mock)));
    let client = test_client(&mock, credentials);

    let db = MemoryDb::new();
    let store: Arc<dyn LedgerStore> = Arc::new(db.clone());
    let reconciler =
        SyncReconciler::new(store.clone(), client.clone(), FirstSyncWindow::CurrentMonth);
    let service = SyncService::new(store, client, reconciler, policy(max_attempts));
    (mock, db, service)
}

#[tokio::test]
async fn test_sync_reconciles_every_account() {
    let (mock, db, service) = service(3).await;
    db.set_account(USER, &linked_account("acc-1", "ING_INGBITMM"))
        .await
        .unwrap();
    db.set_account(USER, &linked_account("acc-2", "REVOLUT_REVOGB21"))
        .await
        .unwrap();
    mock.set_transactions("acc-1", vec![booked("a1", "2024-05-01", "-1.00")]);
    mock.set_transactions(
        "acc-2",
        vec![
            booked("b1", "2024-05-01", "-1.00"),
            booked("b2", "2024-05-02", "5.00"),
        ],
    );

    let mut report = service.sync_user(USER).await.unwrap();
    report.accounts.sort_by(|a, b| a.account_id.cmp(&b.account_id));

    assert_eq!(report.attempts, 1);
    assert_eq!(report.total_new, 3);
    assert_eq!(report.accounts[0].account_id, "acc-1");
    assert_eq!(report.accounts[0].new_transactions, 1);
    assert_eq!(report.accounts[1].new_transactions, 2);
}

#[tokio::test]
async fn test_sync_succeeds_on_third_attempt() {
    let (mock, db, service) = service(3).await;
    db.set_account(USER, &linked_account("acc-1", "SANDBOXFINANCE_SFIN0000"))
        .await
        .unwrap();
    mock.set_transactions("acc-1", vec![booked("t1", "2024-05-01", "-1.00")]);
    mock.fail_next_transaction_fetches(2);

    let report = service.sync_user(USER).await.unwrap();

    assert_eq!(report.attempts, 3);
    assert_eq!(report.total_new, 1);
    assert_eq!(
        mock.calls_to("accounts/acc-1/transactions/").len(),
        3
    );
}

#[tokio::test]
async fn test_sync_gives_up_after_max_attempts() {
    let (mock, db, service) = service(3).await;
    db.set_account(USER, &linked_account("acc-1", "SANDBOXFINANCE_SFIN0000"))
        .await
        .unwrap();
    mock.fail_next_transaction_fetches(10);

    let err = service.sync_user(USER).await.unwrap_err();

    match err {
        AppError::Aggregator(e) => assert_eq!(e.status_code, 500),
        other => panic!("expected aggregator error, got {other:?}"),
    }
    assert_eq!(mock.calls_to("accounts/acc-1/transactions/").len(), 3);
    let account = db.get_account(USER, "acc-1").await.unwrap().unwrap();
    assert_eq!(account.last_sync, None);
}

#[tokio::test]
async fn test_sync_without_accounts_is_empty_success() {
    let (_mock, _db, service) = service(3).await;

    let report = service.sync_user(USER).await.unwrap();
    assert_eq!(report.attempts, 1);
    assert!(report.accounts.is_empty());
    assert_eq!(report.total_new, 0);
}

#[tokio::test]
async fn test_link_accounts_adds_only_unsaved() {
    let (mock, db, service) = service(3).await;
    mock.add_requisition("req-1", &["acc-1", "acc-2"]);
    mock.add_requisition("req-2", &["acc-2", "acc-3"]);
    for id in ["acc-1", "acc-2", "acc-3"] {
        mock.add_account(id, "ING_INGBITMM");
    }
    for id in ["req-1", "req-2"] {
        db.add_requisition(
            USER,
            &UserRequisition {
                id: id.to_string(),
                link: format!("https://ob.example/start/{}", id),
            },
        )
        .await
        .unwrap();
    }
    db.set_account(USER, &linked_account("acc-1", "ING_INGBITMM"))
        .await
        .unwrap();

    let linked = service.link_accounts(USER).await.unwrap();

    assert_eq!(linked, 2);
    let mut ids: Vec<String> = db
        .list_accounts(USER)
        .await
        .unwrap()
        .into_iter()
        .map(|a| a.id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["acc-1", "acc-2", "acc-3"]);
    // acc-1 was already linked and is not fetched again
    assert!(mock.calls_to("accounts/acc-1/").is_empty());
    assert_eq!(mock.calls_to("accounts/acc-2/").len(), 1);

    let added = db.get_account(USER, "acc-3").await.unwrap().unwrap();
    assert_eq!(added.iban, "IBAN-acc-3");
    assert_eq!(added.owner_name, "Jane Doe");
    assert_eq!(added.last_sync, None);

    // Nothing left to link
    assert_eq!(service.link_accounts(USER).await.unwrap(), 0);
}

#[tokio::test]
async fn test_link_accounts_retries_then_fails() {
    let (mock, db, service) = service(2).await;
    db.add_requisition(
        USER,
        &UserRequisition {
            id: "req-missing".to_string(),
            link: "https://ob.example/start/req-missing".to_string(),
        },
    )
    .await
    .unwrap();

    assert!(service.link_accounts(USER).await.is_err());
    assert_eq!(mock.calls_to("requisitions/req-missing/").len(), 2);
}
