// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

//! Token refresh against a mock authorization server

use chrono::{Duration, Utc};
use mockito::{Matcher, Server};
use std::sync::Arc;

use wahoo_coach::database::Database;
use wahoo_coach::models::StoredTokens;
use wahoo_coach::oauth2_client::{AccessTokenProvider, OAuth2Config, TokenError, TokenManager};
use wahoo_coach::providers::wahoo::WahooProvider;

async fn manager(server: &Server) -> (TokenManager, Database) {
    let db = Database::new("sqlite::memory:").await.unwrap();
    let config = OAuth2Config::wahoo("client-1", "secret-1", "http://localhost:8080/callback", &server.url());
    (TokenManager::new(config, db.clone()), db)
}

fn tokens(expires_in_secs: i64) -> StoredTokens {
    StoredTokens {
        access_token: "old-access".to_string(),
        access_token_expires_at: Utc::now() + Duration::seconds(expires_in_secs),
        refresh_token: "refresh-1".to_string(),
    }
}

#[tokio::test]
async fn test_valid_token_is_served_from_cache() {
    let mut server = Server::new_async().await;
    let refresh = server.mock("POST", "/oauth/token").expect(0).create_async().await;
    let (manager, db) = manager(&server).await;
    db.store_tokens(&tokens(3600)).await.unwrap();

    assert_eq!(manager.access_token().await.unwrap(), "old-access");
    refresh.assert_async().await;
}

#[tokio::test]
async fn test_expired_token_is_refreshed_and_stored() {
    let mut server = Server::new_async().await;
    let created_at = Utc::now().timestamp();
    let refresh = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()),
            Matcher::UrlEncoded("refresh_token".into(), "refresh-1".into()),
            Matcher::UrlEncoded("client_id".into(), "client-1".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(format!(
            r#"{{"access_token": "new-access", "refresh_token": "refresh-2", "expires_in": 7200, "created_at": {created_at}}}"#
        ))
        .create_async()
        .await;
    let (manager, db) = manager(&server).await;
    db.store_tokens(&tokens(-10)).await.unwrap();

    assert_eq!(manager.access_token().await.unwrap(), "new-access");
    refresh.assert_async().await;

    let stored = db.get_tokens().await.unwrap().unwrap();
    assert_eq!(stored.refresh_token, "refresh-2");
    assert_eq!(stored.access_token_expires_at.timestamp(), created_at + 7200);
}

#[tokio::test]
async fn test_token_about_to_expire_is_refreshed() {
    let mut server = Server::new_async().await;
    let refresh = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "new-access", "expires_in": 7200}"#)
        .create_async()
        .await;
    let (manager, db) = manager(&server).await;
    db.store_tokens(&tokens(30)).await.unwrap();

    assert_eq!(manager.access_token().await.unwrap(), "new-access");
    refresh.assert_async().await;

    // Not rotated by the server
    assert_eq!(db.get_tokens().await.unwrap().unwrap().refresh_token, "refresh-1");
}

#[tokio::test]
async fn test_rejected_refresh() {
    let mut server = Server::new_async().await;
    let _refresh = server
        .mock("POST", "/oauth/token")
        .with_status(400)
        .with_body(r#"{"error":"invalid_grant"}"#)
        .create_async()
        .await;
    let (manager, db) = manager(&server).await;
    db.store_tokens(&tokens(-10)).await.unwrap();

    match manager.access_token().await {
        Err(TokenError::Refresh { status, body }) => {
            assert_eq!(status, 400);
            assert!(body.contains("invalid_grant"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn test_exchange_code_stores_first_pair() {
    let mut server = Server::new_async().await;
    let _exchange = server
        .mock("POST", "/oauth/token")
        .match_body(Matcher::AllOf(vec![
            Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
            Matcher::UrlEncoded("code".into(), "code-xyz".into()),
        ]))
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "first", "refresh_token": "r-first", "expires_in": 7200}"#)
        .create_async()
        .await;
    let (manager, db) = manager(&server).await;

    let pair = manager.exchange_code("code-xyz").await.unwrap();

    assert_eq!(pair.access_token, "first");
    let stored = db.get_tokens().await.unwrap().unwrap();
    assert_eq!(stored.access_token, "first");
    assert_eq!(stored.refresh_token, "r-first");
}

#[tokio::test]
async fn test_provider_uses_refreshed_token() {
    let mut server = Server::new_async().await;
    let _refresh = server
        .mock("POST", "/oauth/token")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"access_token": "fresh", "expires_in": 7200}"#)
        .create_async()
        .await;
    let delete = server
        .mock("DELETE", "/v1/plans/3")
        .match_header("authorization", "Bearer fresh")
        .with_status(204)
        .create_async()
        .await;
    let (manager, db) = manager(&server).await;
    db.store_tokens(&tokens(-10)).await.unwrap();

    let provider = WahooProvider::new(server.url(), Arc::new(manager));
    provider.delete_plan(3).await.unwrap();

    delete.assert_async().await;
}
