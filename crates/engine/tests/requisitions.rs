mod common;

use bank_api::{ApiError, mock};

use engine::EngineError;

use common::{INSTITUTION, harness};

#[tokio::test]
async fn create_requisition_opens_a_session() {
    let h = harness().await;

    let requisition = h
        .engine
        .create_requisition(&h.integration, INSTITUTION, 90)
        .await
        .unwrap();

    assert!(!requisition.completed);
    assert_eq!(requisition.max_historical_days, 90);
    assert_eq!(
        requisition.link,
        format!("https://mock.bank/link/{}", requisition.nordigen_id)
    );

    let sessions = h.api.sessions();
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].redirect_uri, "https://bankfeed.test/nordigen/redirect");
    assert_eq!(sessions[0].reference_id, requisition.reference_id);
    assert_eq!(sessions[0].max_historical_days, 90);

    let institution = h.engine.institution(INSTITUTION).await.unwrap();
    assert_eq!(institution.name, "Sandbox Finance");
    assert_eq!(requisition.institution_id, institution.id);
}

#[tokio::test]
async fn institution_is_fetched_once() {
    let h = harness().await;

    for _ in 0..2 {
        h.engine
            .create_requisition(&h.integration, INSTITUTION, 30)
            .await
            .unwrap();
    }

    assert_eq!(h.api.institution_lookups(), 1);
    assert_eq!(h.count("institutions").await, 1);
    assert_eq!(h.count("requisitions").await, 2);

    let first = &h.engine.requisitions(&h.integration).await.unwrap();
    assert_ne!(first[0].reference_id, first[1].reference_id);
}

#[tokio::test]
async fn unknown_institution_is_a_remote_error() {
    let h = harness().await;

    let err = h
        .engine
        .create_requisition(&h.integration, "NOPE_BANK", 30)
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::Remote(ApiError::NotFound(_))));
    assert_eq!(h.count("requisitions").await, 0);
}

#[tokio::test]
async fn history_outside_the_agreement_range_is_rejected() {
    let h = harness().await;

    for days in [0, 731, 100_000_000] {
        let err = h
            .engine
            .create_requisition(&h.integration, INSTITUTION, days)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidData(_)), "{days}: {err:?}");
    }

    assert!(h.api.sessions().is_empty());
    assert_eq!(h.count("requisitions").await, 0);
}

#[tokio::test]
async fn unknown_reference_is_not_found() {
    let h = harness().await;

    let err = h
        .engine
        .requisition_by_reference(&h.integration, "missing")
        .await
        .unwrap_err();

    assert!(matches!(err, EngineError::KeyNotFound(_)));
}

#[tokio::test]
async fn accept_twice_links_the_same_accounts() {
    let h = harness().await;
    let checking = h.add_account("Checking");
    let savings = h.add_account("Savings");

    let requisition = h.linked_requisition(&[checking, savings], 90).await;
    assert!(requisition.completed);
    assert!(requisition.is_linked());

    let found = h
        .engine
        .requisition_by_reference(&h.integration, &requisition.reference_id)
        .await
        .unwrap();
    let again = h
        .engine
        .accept_requisition(&h.integration, &found)
        .await
        .unwrap();

    assert!(again.completed);
    assert_eq!(h.count("accounts").await, 2);
    assert_eq!(h.count("requisition_accounts").await, 2);

    let linked = h.engine.requisition_accounts(requisition.id).await.unwrap();
    let mut ids: Vec<_> = linked.iter().map(|a| a.nordigen_id).collect();
    ids.sort();
    let mut expected = vec![checking, savings];
    expected.sort();
    assert_eq!(ids, expected);
}

#[tokio::test]
async fn accept_updates_changed_fields_and_keeps_alias() {
    let h = harness().await;
    let id = h.add_account("Checking");
    let requisition = h.linked_requisition(&[id], 90).await;

    h.engine
        .set_account_alias(&h.integration, id, Some(" Daily "))
        .await
        .unwrap();
    h.api.add_account(
        mock::account_metadata(id, INSTITUTION, "XX00SFIN0000000001"),
        mock::account_details("Everyday checking", "EUR"),
    );

    h.engine
        .accept_requisition(&h.integration, &requisition)
        .await
        .unwrap();

    let account = h.engine.account(&h.integration, id).await.unwrap();
    assert_eq!(account.name.as_deref(), Some("Everyday checking"));
    assert_eq!(account.iban.as_deref(), Some("XX00SFIN0000000001"));
    assert_eq!(account.alias.as_deref(), Some("Daily"));
    assert_eq!(account.display_name(), "Daily");
    assert_eq!(h.count("accounts").await, 1);
}

#[tokio::test]
async fn relinking_reuses_the_account() {
    let h = harness().await;
    let id = h.add_account("Checking");

    let first = h.linked_requisition(&[id], 90).await;
    let second = h.linked_requisition(&[id], 30).await;

    assert_ne!(first.id, second.id);
    assert_eq!(h.count("accounts").await, 1);
    assert_eq!(h.count("requisition_accounts").await, 2);
    assert_eq!(h.engine.accounts(&h.integration).await.unwrap().len(), 1);
}

#[tokio::test]
async fn account_failure_leaves_requisition_incomplete() {
    let h = harness().await;
    let id = h.add_account("Checking");
    let requisition = h
        .engine
        .create_requisition(&h.integration, INSTITUTION, 90)
        .await
        .unwrap();
    h.api.link_requisition(requisition.nordigen_id, vec![id]);
    h.api.fail_account(
        id,
        ApiError::Server {
            status: 503,
            message: "maintenance".to_string(),
        },
    );

    let err = h
        .engine
        .accept_requisition(&h.integration, &requisition)
        .await
        .unwrap_err();

    assert!(err.is_transient());
    let stored = h
        .engine
        .requisition(&h.integration, requisition.nordigen_id)
        .await
        .unwrap();
    assert!(!stored.completed);
}

#[tokio::test]
async fn institutions_are_listed_by_country() {
    let h = harness().await;
    h.api
        .add_institution(mock::institution("OTHERBANK_OTHR0000", "Other Bank", "DE"));

    let listed = h.engine.institutions(&h.integration, " xx ").await.unwrap();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id, INSTITUTION);
    assert_eq!(listed[0].transaction_total_days.as_deref(), Some("540"));

    let err = h
        .engine
        .institutions(&h.integration, "DEU")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidData(_)));
    assert_eq!(h.count("institutions").await, 0);
}

#[tokio::test]
async fn alias_can_be_cleared_and_requires_a_known_account() {
    let h = harness().await;
    let id = h.add_account("Savings");
    h.linked_requisition(&[id], 90).await;

    let account = h
        .engine
        .set_account_alias(&h.integration, id, Some("Rainy day"))
        .await
        .unwrap();
    assert_eq!(account.display_name(), "Rainy day");

    let account = h
        .engine
        .set_account_alias(&h.integration, id, Some("   "))
        .await
        .unwrap();
    assert_eq!(account.alias, None);
    assert_eq!(account.display_name(), "Savings");

    let err = h
        .engine
        .set_account_alias(&h.integration, uuid::Uuid::new_v4(), Some("ghost"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::KeyNotFound(_)));

    let accounts = h.engine.accounts(&h.integration).await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].nordigen_id, id);
}
