mod common;

use chrono::{Duration, NaiveDate, Utc};
use serde_json::Map;
use uuid::Uuid;

use bank_api::{Amount, ApiError, TransactionData, mock};
use engine::{EngineError, HistoryPolicy, SyncCmd, SyncSelector};

use common::harness;

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

fn days_ago(days: i64) -> NaiveDate {
    today() - Duration::days(days)
}

fn cmd(history: HistoryPolicy) -> SyncCmd {
    SyncCmd {
        selector: SyncSelector::All,
        max_age: Duration::zero(),
        history,
        transactions: true,
    }
}

fn undated(id: &str) -> TransactionData {
    TransactionData {
        internal_transaction_id: Some(id.to_string()),
        transaction_id: None,
        booking_date: None,
        value_date: None,
        transaction_amount: Amount {
            amount: "1.00".to_string(),
            currency: "EUR".to_string(),
        },
        extra: Map::new(),
    }
}

#[tokio::test]
async fn full_history_fetches_in_thirty_day_windows() {
    let h = harness().await;
    let id = h.add_account("Checking");
    h.linked_requisition(&[id], 90).await;
    h.api.add_booked(
        id,
        vec![
            mock::booked(Some("t-80"), days_ago(80), "-10.00"),
            mock::booked(Some("t-60"), days_ago(60), "-20.00"),
            mock::booked(None, days_ago(45), "-5.00"),
            mock::booked(Some("t-10"), days_ago(10), "1500.00"),
            mock::booked(Some("t-0"), today(), "-2.50"),
        ],
    );

    let report = h
        .engine
        .sync(&h.integration, &cmd(HistoryPolicy::FullHistory))
        .await
        .unwrap();

    let requests: Vec<_> = h
        .api
        .transaction_requests()
        .into_iter()
        .map(|(_, from, to)| (from, to))
        .collect();
    assert_eq!(
        requests,
        vec![
            (days_ago(90), days_ago(60)),
            (days_ago(60), days_ago(30)),
            (days_ago(30), today()),
        ]
    );
    assert_eq!(report.transactions, 4);
    assert_eq!(h.count("transactions").await, 4);

    let account = h.engine.account(&h.integration, id).await.unwrap();
    let stored = h.engine.transactions(&account, None).await.unwrap();
    let ids: Vec<_> = stored.iter().map(|tx| tx.nordigen_id.as_str()).collect();
    assert_eq!(ids, vec!["t-0", "t-10", "t-60", "t-80"]);
}

#[tokio::test]
async fn repeated_syncs_do_not_duplicate_transactions() {
    let h = harness().await;
    let id = h.add_account("Checking");
    h.linked_requisition(&[id], 90).await;
    h.api.add_booked(
        id,
        vec![
            mock::booked(Some("a"), days_ago(3), "-1.00"),
            mock::booked(Some("b"), days_ago(2), "-2.00"),
        ],
    );

    for _ in 0..3 {
        h.engine
            .sync(&h.integration, &cmd(HistoryPolicy::FullHistory))
            .await
            .unwrap();
    }
    assert_eq!(h.count("transactions").await, 2);

    h.api
        .add_booked(id, vec![mock::booked(Some("c"), today(), "-3.00")]);
    let report = h
        .engine
        .sync(&h.integration, &cmd(HistoryPolicy::FixedWindow(30)))
        .await
        .unwrap();
    assert_eq!(report.transactions, 1);
    assert_eq!(h.count("transactions").await, 3);
}

#[tokio::test]
async fn watermark_starts_at_latest_stored_booking() {
    let h = harness().await;
    let id = h.add_account("Checking");
    h.linked_requisition(&[id], 90).await;
    h.api.add_booked(
        id,
        vec![
            mock::booked(Some("old"), days_ago(40), "-1.00"),
            mock::booked(Some("recent"), days_ago(5), "-2.00"),
        ],
    );
    h.engine
        .sync(&h.integration, &cmd(HistoryPolicy::FullHistory))
        .await
        .unwrap();

    h.api.clear_transaction_requests();
    h.engine
        .sync(&h.integration, &cmd(HistoryPolicy::FullHistory))
        .await
        .unwrap();

    let requests = h.api.transaction_requests();
    assert_eq!(requests, vec![(id, days_ago(5), today())]);
}

#[tokio::test]
async fn fixed_window_without_history_uses_its_own_bound() {
    let h = harness().await;
    let id = h.add_account("Checking");
    h.linked_requisition(&[id], 90).await;

    h.engine
        .sync(&h.integration, &cmd(HistoryPolicy::FixedWindow(7)))
        .await
        .unwrap();

    assert_eq!(
        h.api.transaction_requests(),
        vec![(id, days_ago(7), today())]
    );
}

#[tokio::test]
async fn balances_are_upserted_per_type() {
    let h = harness().await;
    let id = h.add_account("Checking");
    h.linked_requisition(&[id], 90).await;

    h.api
        .set_balances(id, vec![mock::balance("closingBooked", "100.00", "EUR")]);
    h.engine
        .sync(&h.integration, &cmd(HistoryPolicy::FixedWindow(30)))
        .await
        .unwrap();
    let account = h.engine.account(&h.integration, id).await.unwrap();
    let first = h.engine.balances(&account).await.unwrap();

    h.api
        .set_balances(id, vec![mock::balance("closingBooked", "75.25", "EUR")]);
    h.engine
        .sync(&h.integration, &cmd(HistoryPolicy::FixedWindow(30)))
        .await
        .unwrap();
    let second = h.engine.balances(&account).await.unwrap();

    assert_eq!(h.count("balances").await, 1);
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].amount, "75.25");
    assert!(second[0].synced_at > first[0].synced_at);

    let account = h.engine.account(&h.integration, id).await.unwrap();
    assert_eq!(account.synced_at, Some(second[0].synced_at));
}

#[tokio::test]
async fn recently_synced_accounts_are_skipped() {
    let h = harness().await;
    let id = h.add_account("Checking");
    h.linked_requisition(&[id], 90).await;
    let sync = SyncCmd::all(Duration::hours(1), HistoryPolicy::FixedWindow(30));

    let first = h.engine.sync(&h.integration, &sync).await.unwrap();
    h.api.clear_transaction_requests();
    let second = h.engine.sync(&h.integration, &sync).await.unwrap();

    assert_eq!(first.accounts_synced, 1);
    assert_eq!(second.accounts_synced, 0);
    assert_eq!(second.accounts_skipped, 1);
    assert!(h.api.transaction_requests().is_empty());
}

#[tokio::test]
async fn failing_account_aborts_the_run() {
    let h = harness().await;
    let good = h.add_account("Checking");
    let bad = h.add_account("Savings");
    h.linked_requisition(&[good, bad], 90).await;
    h.api
        .fail_account(bad, ApiError::RateLimited { retry_after: Some(60) });

    let err = h
        .engine
        .sync(&h.integration, &cmd(HistoryPolicy::FixedWindow(30)))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        EngineError::Remote(ApiError::RateLimited {
            retry_after: Some(60)
        })
    );
    let bad = h.engine.account(&h.integration, bad).await.unwrap();
    assert_eq!(bad.synced_at, None);
}

#[tokio::test]
async fn unknown_requisition_id_fails_before_any_remote_call() {
    let h = harness().await;
    let sync = SyncCmd {
        selector: SyncSelector::Requisitions(vec![Uuid::new_v4()]),
        ..cmd(HistoryPolicy::FullHistory)
    };

    let err = h.engine.sync(&h.integration, &sync).await.unwrap_err();

    assert!(matches!(err, EngineError::KeyNotFound(_)));
    assert_eq!(h.api.generated(), 0);
}

#[tokio::test]
async fn explicit_selection_syncs_only_that_requisition() {
    let h = harness().await;
    let first = h.add_account("Checking");
    let second = h.add_account("Savings");
    let picked = h.linked_requisition(&[first], 90).await;
    h.linked_requisition(&[second], 90).await;

    let sync = SyncCmd {
        selector: SyncSelector::Requisitions(vec![picked.nordigen_id, picked.nordigen_id]),
        ..cmd(HistoryPolicy::FixedWindow(30))
    };
    let report = h.engine.sync(&h.integration, &sync).await.unwrap();

    assert_eq!(report.requisitions, 1);
    assert_eq!(report.accounts_synced, 1);
    let untouched = h.engine.account(&h.integration, second).await.unwrap();
    assert_eq!(untouched.synced_at, None);
}

#[tokio::test]
async fn balances_only_sync_skips_transactions() {
    let h = harness().await;
    let id = h.add_account("Checking");
    h.linked_requisition(&[id], 90).await;
    h.api
        .set_balances(id, vec![mock::balance("interimAvailable", "9.99", "EUR")]);
    h.api
        .add_booked(id, vec![mock::booked(Some("x"), today(), "-1.00")]);

    let sync = SyncCmd {
        transactions: false,
        ..cmd(HistoryPolicy::FullHistory)
    };
    let report = h.engine.sync(&h.integration, &sync).await.unwrap();

    assert_eq!(report.balances, 1);
    assert_eq!(report.transactions, 0);
    assert!(h.api.transaction_requests().is_empty());
    let account = h.engine.account(&h.integration, id).await.unwrap();
    assert!(account.synced_at.is_some());
}

#[tokio::test]
async fn pending_entries_are_not_stored_and_undated_sort_last() {
    let h = harness().await;
    let id = h.add_account("Checking");
    h.linked_requisition(&[id], 90).await;
    h.api.add_pending(
        id,
        vec![mock::booked(Some("pending"), today(), "-9.00")],
    );
    h.api.add_booked(
        id,
        vec![
            undated("no-date"),
            mock::booked(Some("dated"), days_ago(1), "-1.00"),
        ],
    );

    h.engine
        .sync(&h.integration, &cmd(HistoryPolicy::FixedWindow(30)))
        .await
        .unwrap();

    let account = h.engine.account(&h.integration, id).await.unwrap();
    let stored = h.engine.transactions(&account, None).await.unwrap();
    let ids: Vec<_> = stored.iter().map(|tx| tx.nordigen_id.as_str()).collect();
    assert_eq!(ids, vec!["dated", "no-date"]);

    let latest = h.engine.transactions(&account, Some(1)).await.unwrap();
    assert_eq!(latest.len(), 1);
}

#[tokio::test]
async fn single_account_sync_ignores_max_age() {
    let h = harness().await;
    let id = h.add_account("Checking");
    h.linked_requisition(&[id], 90).await;
    let account = h.engine.account(&h.integration, id).await.unwrap();

    for _ in 0..2 {
        h.engine
            .sync_account(&h.integration, &account, HistoryPolicy::FixedWindow(30), true)
            .await
            .unwrap();
    }

    assert_eq!(h.api.transaction_requests().len(), 2);
}

#[tokio::test]
async fn out_of_range_history_is_an_error() {
    let h = harness().await;
    let id = h.add_account("Checking");
    h.linked_requisition(&[id], 90).await;
    let account = h.engine.account(&h.integration, id).await.unwrap();

    let err = h
        .engine
        .sync_account(&h.integration, &account, HistoryPolicy::FixedWindow(u32::MAX), true)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidData(_)));

    h.execute(
        "UPDATE requisitions SET max_historical_days = 100000000",
        Vec::new(),
    )
    .await;
    let err = h
        .engine
        .sync(&h.integration, &cmd(HistoryPolicy::FullHistory))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidData(_)));

    assert!(h.api.transaction_requests().is_empty());
    let account = h.engine.account(&h.integration, id).await.unwrap();
    assert_eq!(account.synced_at, None);
}
