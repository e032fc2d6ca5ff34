mod common;

use chrono::{Duration, Utc};

use bank_api::ApiError;
use engine::{Credentials, EngineError, TokenType};

use common::{Harness, credentials, harness};

async fn expire(h: &Harness, kind: TokenType, ago: Duration) {
    h.execute(
        "UPDATE tokens SET expires = ? WHERE token_type = ?",
        vec![(Utc::now() - ago).into(), kind.as_str().into()],
    )
    .await;
}

async fn rows_of(h: &Harness, kind: TokenType) -> i64 {
    h.scalar(
        "SELECT COUNT(*) AS n FROM tokens WHERE token_type = ?",
        vec![kind.as_str().into()],
    )
    .await
}

#[tokio::test]
async fn first_client_generates_and_caches_a_pair() {
    let h = harness().await;

    let client = h.engine.client(&h.integration).await.unwrap();
    assert_eq!(h.api.generated(), 1);
    assert_eq!(rows_of(&h, TokenType::Access).await, 1);
    assert_eq!(rows_of(&h, TokenType::Refresh).await, 1);

    let cached = h
        .engine
        .token(&h.integration, TokenType::Access)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(cached.value, client.token());
    assert!(cached.expires > Utc::now() + Duration::hours(23));

    let again = h.engine.client(&h.integration).await.unwrap();
    assert_eq!(again.token(), client.token());
    assert_eq!(h.api.generated(), 1);
    assert_eq!(h.api.exchanged(), 0);
}

#[tokio::test]
async fn expired_access_token_is_exchanged() {
    let h = harness().await;
    let first = h.engine.client(&h.integration).await.unwrap();

    expire(&h, TokenType::Access, Duration::hours(1)).await;
    let second = h.engine.client(&h.integration).await.unwrap();

    assert_ne!(first.token(), second.token());
    assert_eq!(h.api.generated(), 1);
    assert_eq!(h.api.exchanged(), 1);
    assert_eq!(rows_of(&h, TokenType::Access).await, 1);
    assert_eq!(rows_of(&h, TokenType::Refresh).await, 1);

    second.institutions("XX").await.unwrap();
}

#[tokio::test]
async fn both_tokens_expired_regenerates_the_pair() {
    let h = harness().await;
    h.engine.client(&h.integration).await.unwrap();

    expire(&h, TokenType::Access, Duration::days(2)).await;
    expire(&h, TokenType::Refresh, Duration::days(2)).await;
    h.engine.client(&h.integration).await.unwrap();

    assert_eq!(h.api.generated(), 2);
    assert_eq!(h.api.exchanged(), 0);
    assert_eq!(h.count("tokens").await, 2);
}

#[tokio::test]
async fn recently_expired_token_is_still_used() {
    let h = harness().await;
    let first = h.engine.client(&h.integration).await.unwrap();

    expire(&h, TokenType::Access, Duration::seconds(3)).await;
    let second = h.engine.client(&h.integration).await.unwrap();

    assert_eq!(first.token(), second.token());
    assert_eq!(h.api.exchanged(), 0);
}

#[tokio::test]
async fn rejected_credentials_propagate() {
    let h = harness().await;
    let wrong = Credentials::new(credentials().secret_id, "wrong-key");
    let integration = h.engine.integration(&wrong).await.unwrap();

    let err = h.engine.client(&integration).await.unwrap_err();
    assert!(matches!(err, EngineError::Remote(ApiError::Unauthorized(_))));
    assert_eq!(h.count("tokens").await, 0);
}

#[tokio::test]
async fn integration_is_created_once_per_secret_id() {
    let h = harness().await;
    let again = h.engine.integration(&credentials()).await.unwrap();

    assert_eq!(again.id, h.integration.id);
    assert_eq!(h.count("integrations").await, 1);
}
