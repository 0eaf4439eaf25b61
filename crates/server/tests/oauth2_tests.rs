//! OAuth2 endpoint tests.
//!
//! Authorization code issuance and redemption through the HTTP surface.

mod common;

use axum::http::{StatusCode, header};
use common::*;
use sea_orm::{ActiveModelTrait, ActiveValue::Set, EntityTrait, PaginatorTrait, TransactionTrait};
use sentinel_idp::entity::authorization_code;
use sentinel_idp::error::OAuthError;
use sentinel_idp::keys::KeyManager;
use sentinel_idp::oauth2::{OAuth2State, code_store};
use sentinel_idp::oauth2::minter::{AccessTokenClaims, IdTokenClaims};
use std::sync::Arc;
use time::OffsetDateTime;

async fn stored_codes(app: &TestApp) -> u64 {
    authorization_code::Entity::find()
        .count(app.db.as_ref())
        .await
        .expect("count codes")
}

// =============================================================================
// Authorization Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_authorization_code_flow_end_to_end() {
    let app = TestApp::spawn().await;

    let response = app.authorize_as(SESSION).await;
    response.assert_status(StatusCode::FOUND);
    let location = location(&response);
    assert!(location.starts_with("https://app.test/cb?code="));
    assert_eq!(query_param(&location, "state").as_deref(), Some("xyz"));
    let code = query_param(&location, "code").expect("code");
    assert_eq!(code.len(), 43);

    let response = app.redeem(&code, CLIENT_ID, VERIFIER).await;
    response.assert_status_ok();
    assert_eq!(
        response.headers().get(header::CACHE_CONTROL).unwrap(),
        "no-store"
    );
    let body: serde_json::Value = response.json();
    assert!(body["access_token"].is_string());
    assert!(body["id_token"].is_string());
    assert!(body["refresh_token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
    assert_eq!(body["expires_in"], 900);

    // Replay of the same code
    let response = app.redeem(&code, CLIENT_ID, VERIFIER).await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn test_authorize_missing_parameters() {
    let app = TestApp::spawn().await;

    let response = app
        .server
        .get("/authorize")
        .add_query_param("client_id", CLIENT_ID)
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_authorize_unknown_client() {
    let app = TestApp::spawn().await;

    let response = app
        .server
        .get("/authorize")
        .add_query_param("client_id", "nonexistent-client")
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("code_challenge", CHALLENGE)
        .add_query_param("code_challenge_method", "S256")
        .add_header(header::COOKIE, cookie(SESSION))
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_client");
}

#[tokio::test]
async fn test_authorize_redirect_uri_must_match_exactly() {
    let app = TestApp::spawn().await;

    for redirect_uri in [
        "https://app.test/cb/",
        "https://app.test/cb?x=1",
        "https://APP.test/cb",
        "https://evil.test/cb",
    ] {
        let response = app
            .server
            .get("/authorize")
            .add_query_param("client_id", CLIENT_ID)
            .add_query_param("redirect_uri", redirect_uri)
            .add_query_param("code_challenge", CHALLENGE)
            .add_query_param("code_challenge_method", "S256")
            .add_header(header::COOKIE, cookie(SESSION))
            .await;

        // Never redirected to the unverified URI
        response.assert_status_bad_request();
        assert!(response.headers().get(header::LOCATION).is_none());
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"], "invalid_client");
    }

    assert_eq!(stored_codes(&app).await, 0);
}

#[tokio::test]
async fn test_authorize_rejects_non_s256_methods() {
    let app = TestApp::spawn().await;

    for (challenge, method) in [(CHALLENGE, "plain"), (CHALLENGE, ""), ("", "S256")] {
        let response = app
            .server
            .get("/authorize")
            .add_query_param("client_id", CLIENT_ID)
            .add_query_param("redirect_uri", REDIRECT_URI)
            .add_query_param("code_challenge", challenge)
            .add_query_param("code_challenge_method", method)
            .add_header(header::COOKIE, cookie(SESSION))
            .await;

        response.assert_status_bad_request();
        let body: serde_json::Value = response.json();
        assert_eq!(body["error"], "invalid_request");
    }
}

#[tokio::test]
async fn test_authorize_without_session_redirects_to_login() {
    let app = TestApp::spawn().await;

    let response = app
        .server
        .get("/authorize")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("code_challenge", CHALLENGE)
        .add_query_param("code_challenge_method", "S256")
        .add_query_param("state", "xyz")
        .await;

    response.assert_status(StatusCode::FOUND);
    assert_eq!(location(&response), "/login");
    assert!(response.headers().get(header::SET_COOKIE).is_none());
    assert_eq!(stored_codes(&app).await, 0);
}

#[tokio::test]
async fn test_authorize_with_expired_session_clears_cookie() {
    let app = TestApp::spawn().await;

    for session in [EXPIRED_SESSION, "no-such-session"] {
        let response = app.authorize_as(session).await;

        response.assert_status(StatusCode::FOUND);
        assert_eq!(location(&response), "/login");
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .expect("set-cookie");
        assert!(set_cookie.starts_with("sentinel_session=;"));
        assert!(set_cookie.contains("Max-Age=0"));
    }
}

#[tokio::test]
async fn test_authorize_echoes_empty_state() {
    let app = TestApp::spawn().await;

    let response = app
        .server
        .get("/authorize")
        .add_query_param("client_id", CLIENT_ID)
        .add_query_param("redirect_uri", REDIRECT_URI)
        .add_query_param("code_challenge", CHALLENGE)
        .add_query_param("code_challenge_method", "S256")
        .add_header(header::COOKIE, cookie(SESSION))
        .await;

    response.assert_status(StatusCode::FOUND);
    let location = location(&response);
    assert!(query_param(&location, "code").is_some());
    assert_eq!(query_param(&location, "state").as_deref(), Some(""));
}

// =============================================================================
// Token Endpoint Tests
// =============================================================================

#[tokio::test]
async fn test_token_unsupported_grant_type() {
    let app = TestApp::spawn().await;

    let response = app
        .server
        .post("/token")
        .form(&[("grant_type", "password"), ("client_id", CLIENT_ID)])
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "unsupported_grant_type");

    let response = app
        .server
        .post("/token")
        .form(&[("client_id", CLIENT_ID)])
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_request");
}

#[tokio::test]
async fn test_token_missing_code_verifier() {
    let app = TestApp::spawn().await;
    let code = app.code_for(SESSION).await;

    let response = app
        .server
        .post("/token")
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("client_id", CLIENT_ID),
        ])
        .await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_request");
    // Rejected before reaching the store
    assert_eq!(stored_codes(&app).await, 1);
}

#[tokio::test]
async fn test_token_unknown_code() {
    let app = TestApp::spawn().await;

    let response = app.redeem("not-a-real-code", CLIENT_ID, VERIFIER).await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn test_token_expired_code() {
    let app = TestApp::spawn().await;
    let issued = OffsetDateTime::now_utc() - time::Duration::minutes(5);
    authorization_code::ActiveModel {
        code: Set("stale-code".to_string()),
        client_id: Set(CLIENT_ID.to_string()),
        user_id: Set(USER_ID.to_string()),
        code_challenge: Set(CHALLENGE.to_string()),
        expires_at: Set(issued + time::Duration::seconds(60)),
        created_at: Set(issued),
    }
    .insert(app.db.as_ref())
    .await
    .expect("insert code");

    let response = app.redeem("stale-code", CLIENT_ID, VERIFIER).await;

    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_grant");
}

#[tokio::test]
async fn test_token_client_mismatch_keeps_code_redeemable() {
    let app = TestApp::spawn().await;
    let code = app.code_for(SESSION).await;

    let response = app.redeem(&code, OTHER_CLIENT_ID, VERIFIER).await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_grant");

    // The failed attempt rolled back, so the rightful client can still redeem
    assert_eq!(stored_codes(&app).await, 1);
    app.redeem(&code, CLIENT_ID, VERIFIER)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_token_pkce_failure() {
    let app = TestApp::spawn().await;
    let code = app.code_for(SESSION).await;

    let response = app
        .redeem(&code, CLIENT_ID, "wrong-verifier-wrong-verifier-wrong-verifier")
        .await;
    response.assert_status_bad_request();
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "invalid_grant");
    assert_eq!(body["error_description"], "pkce verification failed");

    app.redeem(&code, CLIENT_ID, VERIFIER)
        .await
        .assert_status_ok();
}

#[tokio::test]
async fn test_token_concurrent_redemption_succeeds_once() {
    let app = TestApp::spawn().await;
    let code = app.code_for(SESSION).await;

    // The in-memory pool has one connection, so the loser runs after the
    // winner committed and finds the code gone.
    let (first, second) = tokio::join!(
        app.redeem(&code, CLIENT_ID, VERIFIER),
        app.redeem(&code, CLIENT_ID, VERIFIER),
    );

    let mut statuses = [first.status_code(), second.status_code()];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::OK, StatusCode::BAD_REQUEST]);
    assert_eq!(stored_codes(&app).await, 0);
}

#[tokio::test]
async fn test_code_store_consume_is_single_use() {
    let app = TestApp::spawn().await;
    let issued = code_store::issue(app.db.as_ref(), CLIENT_ID, USER_ID, CHALLENGE)
        .await
        .unwrap();

    let grant = code_store::consume(app.db.as_ref(), &issued.code)
        .await
        .unwrap();
    assert_eq!(grant.user_id, USER_ID);
    assert_eq!(grant.code_challenge, CHALLENGE);

    assert!(matches!(
        code_store::consume(app.db.as_ref(), &issued.code).await,
        Err(OAuthError::InvalidOrExpiredCode)
    ));
}

#[tokio::test]
async fn test_code_store_expired_row_is_found_but_not_deleted() {
    let app = TestApp::spawn().await;
    let issued = OffsetDateTime::now_utc() - time::Duration::minutes(5);
    authorization_code::ActiveModel {
        code: Set("stale-code".to_string()),
        client_id: Set(CLIENT_ID.to_string()),
        user_id: Set(USER_ID.to_string()),
        code_challenge: Set(CHALLENGE.to_string()),
        expires_at: Set(issued + time::Duration::seconds(60)),
        created_at: Set(issued),
    }
    .insert(app.db.as_ref())
    .await
    .expect("insert code");

    // The lookup succeeds; the conditional delete matches nothing
    assert!(matches!(
        code_store::consume(app.db.as_ref(), "stale-code").await,
        Err(OAuthError::InvalidOrExpiredCode)
    ));
    assert_eq!(stored_codes(&app).await, 1);
}

#[tokio::test]
async fn test_tokens_verify_against_jwks() {
    let app = TestApp::spawn().await;
    let before = OffsetDateTime::now_utc().unix_timestamp();
    let body = app.login().await;

    let access_token = body["access_token"].as_str().unwrap();
    let header = jsonwebtoken::decode_header(access_token).unwrap();
    assert_eq!(header.kid.as_deref(), Some("key-a"));

    let claims: AccessTokenClaims = verify_with_jwks(&app.server, access_token).await;
    assert_eq!(claims.iss, ISSUER);
    assert_eq!(claims.sub, USER_ID);
    assert_eq!(claims.aud, CLIENT_ID);
    assert_eq!(claims.exp - claims.iat, 900);
    assert_eq!(claims.scope, "read:data read:profile write:data");
    assert!(!claims.jti.is_empty());

    let id_token = body["id_token"].as_str().unwrap();
    let claims: IdTokenClaims = verify_with_jwks(&app.server, id_token).await;
    assert_eq!(claims.sub, USER_ID);
    assert_eq!(claims.preferred_username, USERNAME);
    assert_eq!(claims.exp - claims.iat, 900);
    // auth_time is when the code was issued, not when it expires
    assert!(claims.auth_time >= before);
    assert!(claims.auth_time <= claims.iat);
}

#[tokio::test]
async fn test_user_without_role_gets_empty_scope() {
    let app = TestApp::spawn().await;
    let code = app.code_for(ROLELESS_SESSION).await;

    let response = app.redeem(&code, CLIENT_ID, VERIFIER).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    let claims: AccessTokenClaims =
        verify_with_jwks(&app.server, body["access_token"].as_str().unwrap()).await;
    assert_eq!(claims.sub, ROLELESS_USER_ID);
    assert_eq!(claims.scope, "");
}

#[tokio::test]
async fn test_token_without_signing_key_is_server_error() {
    let db = create_test_db().await;
    seed(&db).await;
    let app = TestApp::with_parts(Arc::new(db), Arc::new(KeyManager::default()));
    let code = app.code_for(SESSION).await;

    let response = app.redeem(&code, CLIENT_ID, VERIFIER).await;

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "server_error");
    assert!(body.get("error_description").is_none());
    // Nothing was consumed
    assert_eq!(stored_codes(&app).await, 1);
}

#[tokio::test]
async fn test_token_exchange_deadline() {
    let db = create_test_db().await;
    seed(&db).await;
    let db = Arc::new(db);
    let keys = Arc::new(KeyManager::load_from(db.as_ref()).await.unwrap());
    let state = OAuth2State::new(db.clone(), keys, &test_config())
        .with_exchange_timeout(std::time::Duration::from_millis(100));
    let app = TestApp::with_state(state);
    let code = app.code_for(SESSION).await;

    // Hold the only connection so the exchange cannot start its transaction
    let blocker = db.begin().await.unwrap();
    let response = app.redeem(&code, CLIENT_ID, VERIFIER).await;
    blocker.rollback().await.unwrap();

    response.assert_status(StatusCode::INTERNAL_SERVER_ERROR);
    let body: serde_json::Value = response.json();
    assert_eq!(body["error"], "server_error");

    app.redeem(&code, CLIENT_ID, VERIFIER)
        .await
        .assert_status_ok();
}

// =============================================================================
// Discovery
// =============================================================================

#[tokio::test]
async fn test_openid_configuration() {
    let app = TestApp::spawn().await;

    let response = app.server.get("/.well-known/openid-configuration").await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();

    assert_eq!(body["issuer"], ISSUER);
    assert_eq!(body["authorization_endpoint"], "https://id.test/authorize");
    assert_eq!(body["token_endpoint"], "https://id.test/token");
    assert_eq!(body["jwks_uri"], "https://id.test/jwks.json");
    assert_eq!(body["code_challenge_methods_supported"], serde_json::json!(["S256"]));
    assert_eq!(
        body["id_token_signing_alg_values_supported"],
        serde_json::json!(["RS256"])
    );
    assert_eq!(
        body["scopes_supported"],
        serde_json::json!(["read:profile", "read:data"])
    );
}

#[tokio::test]
async fn test_health() {
    let app = TestApp::spawn().await;
    let response = app.server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

// =============================================================================
// Housekeeping
// =============================================================================

#[tokio::test]
async fn test_cleanup_purges_only_expired_codes() {
    use sentinel_idp::oauth2::cleanup::purge_expired_codes;

    let app = TestApp::spawn().await;
    let live = app.code_for(SESSION).await;
    let issued = OffsetDateTime::now_utc() - time::Duration::minutes(5);
    authorization_code::ActiveModel {
        code: Set("stale-code".to_string()),
        client_id: Set(CLIENT_ID.to_string()),
        user_id: Set(USER_ID.to_string()),
        code_challenge: Set(CHALLENGE.to_string()),
        expires_at: Set(issued + time::Duration::seconds(60)),
        created_at: Set(issued),
    }
    .insert(app.db.as_ref())
    .await
    .expect("insert code");

    let removed = purge_expired_codes(app.db.as_ref()).await.unwrap();
    assert_eq!(removed, 1);
    assert_eq!(stored_codes(&app).await, 1);

    app.redeem(&live, CLIENT_ID, VERIFIER)
        .await
        .assert_status_ok();
}
