//! Shared fixtures for the integration tests: an in-memory SQLite schema, a
//! seeded client/user/role graph and a ready-to-use [`TestServer`].
#![allow(dead_code)]

use axum::http::{HeaderValue, StatusCode, header};
use axum_test::{TestResponse, TestServer};
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ConnectionTrait, Database, DatabaseConnection, DbBackend,
    Statement,
};
use sentinel_idp::config::AppConfig;
use sentinel_idp::entity::{oauth_client, role, role_scope, scope, session, signing_key, user};
use sentinel_idp::keys::KeyManager;
use sentinel_idp::oauth2::OAuth2State;
use std::sync::Arc;
use time::{Duration, OffsetDateTime};

pub const KEY_A: &str = include_str!("../fixtures/key_a.pem");
pub const KEY_A_PUB: &str = include_str!("../fixtures/key_a.pub.pem");
pub const KEY_B: &str = include_str!("../fixtures/key_b.pem");
pub const KEY_B_PUB: &str = include_str!("../fixtures/key_b.pub.pem");

pub const ISSUER: &str = "https://id.test";
pub const CLIENT_ID: &str = "abc";
pub const OTHER_CLIENT_ID: &str = "other";
pub const REDIRECT_URI: &str = "https://app.test/cb";

// RFC 7636 appendix B
pub const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
pub const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

pub const USER_ID: &str = "user-1";
pub const USERNAME: &str = "alice";
pub const ROLELESS_USER_ID: &str = "user-2";
pub const SESSION: &str = "session-alice";
pub const ROLELESS_SESSION: &str = "session-bob";
pub const EXPIRED_SESSION: &str = "session-expired";
pub const SESSION_COOKIE: &str = "sentinel_session";

const SCHEMA: &[&str] = &[
    r#"CREATE TABLE signing_keys (
        kid TEXT PRIMARY KEY,
        private_key_pem TEXT NOT NULL,
        public_key_pem TEXT NOT NULL,
        active INTEGER NOT NULL DEFAULT 0
    );"#,
    r#"CREATE TABLE oauth_clients (
        client_id TEXT PRIMARY KEY,
        redirect_uri TEXT NOT NULL
    );"#,
    r#"CREATE TABLE roles (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );"#,
    r#"CREATE TABLE scopes (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL UNIQUE
    );"#,
    r#"CREATE TABLE role_scopes (
        role_id INTEGER NOT NULL,
        scope_id INTEGER NOT NULL,
        PRIMARY KEY (role_id, scope_id)
    );"#,
    r#"CREATE TABLE users (
        id TEXT PRIMARY KEY,
        username TEXT NOT NULL UNIQUE,
        role_id INTEGER NULL
    );"#,
    r#"CREATE TABLE sessions (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        expires_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE authorization_codes (
        code TEXT PRIMARY KEY,
        client_id TEXT NOT NULL,
        user_id TEXT NOT NULL,
        code_challenge TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        created_at TEXT NOT NULL
    );"#,
    r#"CREATE TABLE refresh_tokens (
        id TEXT PRIMARY KEY,
        user_id TEXT NOT NULL,
        client_id TEXT NOT NULL,
        token_hash TEXT NOT NULL UNIQUE,
        expires_at TEXT NOT NULL,
        revoked INTEGER NOT NULL DEFAULT 0,
        parent_id TEXT NULL,
        created_at TEXT NOT NULL
    );"#,
];

/// Create an in-memory database with the full schema and no rows.
pub async fn create_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.expect("connect");
    for ddl in SCHEMA {
        db.execute(Statement::from_string(DbBackend::Sqlite, *ddl))
            .await
            .expect("create table");
    }
    db
}

pub fn signing_key_row(
    kid: &str,
    private: &str,
    public: &str,
    active: bool,
) -> signing_key::Model {
    signing_key::Model {
        kid: kid.to_string(),
        private_key_pem: private.to_string(),
        public_key_pem: public.to_string(),
        active,
    }
}

pub async fn insert_signing_key(db: &DatabaseConnection, row: signing_key::Model) {
    signing_key::ActiveModel {
        kid: Set(row.kid),
        private_key_pem: Set(row.private_key_pem),
        public_key_pem: Set(row.public_key_pem),
        active: Set(row.active),
    }
    .insert(db)
    .await
    .expect("insert signing key");
}

pub async fn insert_session(db: &DatabaseConnection, id: &str, user_id: &str, ttl: Duration) {
    session::ActiveModel {
        id: Set(id.to_string()),
        user_id: Set(user_id.to_string()),
        expires_at: Set(OffsetDateTime::now_utc() + ttl),
    }
    .insert(db)
    .await
    .expect("insert session");
}

/// Seed clients, a role with three scopes, two users and their sessions.
pub async fn seed(db: &DatabaseConnection) {
    insert_signing_key(db, signing_key_row("key-a", KEY_A, KEY_A_PUB, true)).await;

    for (client_id, redirect_uri) in [
        (CLIENT_ID, REDIRECT_URI),
        (OTHER_CLIENT_ID, "https://other.test/cb"),
    ] {
        oauth_client::ActiveModel {
            client_id: Set(client_id.to_string()),
            redirect_uri: Set(redirect_uri.to_string()),
        }
        .insert(db)
        .await
        .expect("insert client");
    }

    role::ActiveModel {
        id: Set(1),
        name: Set("editor".to_string()),
    }
    .insert(db)
    .await
    .expect("insert role");

    // Inserted out of order to prove the scope claim is sorted
    for (id, name) in [
        (1, "write:data"),
        (2, "read:profile"),
        (3, "read:data"),
        (4, "admin:users"),
    ] {
        scope::ActiveModel {
            id: Set(id),
            name: Set(name.to_string()),
        }
        .insert(db)
        .await
        .expect("insert scope");
    }
    for scope_id in [1, 2, 3] {
        role_scope::ActiveModel {
            role_id: Set(1),
            scope_id: Set(scope_id),
        }
        .insert(db)
        .await
        .expect("insert role scope");
    }

    for (id, username, role_id) in [
        (USER_ID, USERNAME, Some(1)),
        (ROLELESS_USER_ID, "bob", None),
    ] {
        user::ActiveModel {
            id: Set(id.to_string()),
            username: Set(username.to_string()),
            role_id: Set(role_id),
        }
        .insert(db)
        .await
        .expect("insert user");
    }

    insert_session(db, SESSION, USER_ID, Duration::hours(1)).await;
    insert_session(db, ROLELESS_SESSION, ROLELESS_USER_ID, Duration::hours(1)).await;
    insert_session(db, EXPIRED_SESSION, USER_ID, Duration::hours(-1)).await;
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "sqlite::memory:".into(),
        issuer_url: ISSUER.into(),
        bind_address: "127.0.0.1:0".into(),
        login_url: "/login".into(),
        session_cookie: SESSION_COOKIE.into(),
        key_reload_interval_secs: 300,
        code_cleanup_interval_secs: 600,
        db_timeout_ms: 5000,
        scopes_supported: vec!["read:profile".into(), "read:data".into()],
    }
}

pub struct TestApp {
    pub server: TestServer,
    pub db: Arc<DatabaseConnection>,
    pub keys: Arc<KeyManager>,
    pub state: OAuth2State,
}

impl TestApp {
    /// Seeded database, keys loaded from it.
    pub async fn spawn() -> Self {
        let db = create_test_db().await;
        seed(&db).await;
        let keys = KeyManager::load_from(&db).await.expect("load keys");
        Self::with_parts(Arc::new(db), Arc::new(keys))
    }

    pub fn with_parts(db: Arc<DatabaseConnection>, keys: Arc<KeyManager>) -> Self {
        let state = OAuth2State::new(db.clone(), keys.clone(), &test_config());
        Self::with_state(state)
    }

    pub fn with_state(state: OAuth2State) -> Self {
        let server =
            TestServer::new(sentinel_idp::api::app(state.clone())).expect("create test server");
        Self {
            server,
            db: state.db.clone(),
            keys: state.keys.clone(),
            state,
        }
    }

    /// `GET /authorize` for the default client with `session` as the cookie.
    pub async fn authorize_as(&self, session: &str) -> TestResponse {
        self.server
            .get("/authorize")
            .add_query_param("client_id", CLIENT_ID)
            .add_query_param("redirect_uri", REDIRECT_URI)
            .add_query_param("code_challenge", CHALLENGE)
            .add_query_param("code_challenge_method", "S256")
            .add_query_param("state", "xyz")
            .add_header(header::COOKIE, cookie(session))
            .await
    }

    /// Run the authorization step for `session` and return the issued code.
    pub async fn code_for(&self, session: &str) -> String {
        let response = self.authorize_as(session).await;
        response.assert_status(StatusCode::FOUND);
        query_param(&location(&response), "code").expect("code in redirect")
    }

    pub async fn redeem(&self, code: &str, client_id: &str, verifier: &str) -> TestResponse {
        self.server
            .post("/token")
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", client_id),
                ("code_verifier", verifier),
            ])
            .await
    }

    pub async fn refresh(&self, refresh_token: &str, client_id: &str) -> TestResponse {
        self.server
            .post("/token")
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id),
            ])
            .await
    }

    /// Full authorization code flow for the default user; returns the token body.
    pub async fn login(&self) -> serde_json::Value {
        let code = self.code_for(SESSION).await;
        let response = self.redeem(&code, CLIENT_ID, VERIFIER).await;
        response.assert_status_ok();
        response.json()
    }
}

pub fn cookie(session: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("{SESSION_COOKIE}={session}")).expect("cookie header")
}

pub fn location(response: &TestResponse) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .expect("location header")
        .to_string()
}

pub fn query_param(location: &str, name: &str) -> Option<String> {
    url::Url::parse(location)
        .ok()?
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Verify `token` against the key published under its `kid` at `/jwks.json`.
pub async fn verify_with_jwks<T: serde::de::DeserializeOwned>(
    server: &TestServer,
    token: &str,
) -> T {
    let jwks: sentinel_idp::keys::Jwks = server.get("/jwks.json").await.json();
    let kid = jsonwebtoken::decode_header(token)
        .expect("token header")
        .kid
        .expect("kid header");
    let jwk = jwks.find(&kid).expect("kid published in JWKS");

    let key = jsonwebtoken::DecodingKey::from_rsa_components(&jwk.n, &jwk.e).expect("rsa jwk");
    let mut validation = jsonwebtoken::Validation::new(jsonwebtoken::Algorithm::RS256);
    validation.set_audience(&[CLIENT_ID]);
    validation.set_issuer(&[ISSUER]);

    jsonwebtoken::decode::<T>(token, &key, &validation)
        .expect("valid signature")
        .claims
}
