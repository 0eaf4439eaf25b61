//! OAuth2 state management.

use crate::config::AppConfig;
use crate::keys::KeyManager;
use crate::oauth2::authorize::AuthorizationGrantIssuer;
use crate::oauth2::exchange::TokenExchangeEngine;
use crate::oauth2::minter::TokenMinter;
use crate::oauth2::session::{DbSessionProvider, SessionProvider};
use sea_orm::DatabaseConnection;
use std::sync::Arc;
use std::time::Duration;

/// Everything the OAuth2 handlers need, shared through axum state.
#[derive(Clone)]
pub struct OAuth2State {
    pub db: Arc<DatabaseConnection>,
    pub keys: Arc<KeyManager>,
    pub grants: AuthorizationGrantIssuer,
    pub exchange: TokenExchangeEngine,
    pub sessions: Arc<dyn SessionProvider>,
    /// Base URL for the OAuth2 server (used for issuer in tokens), without trailing slash
    pub issuer_url: String,
    pub login_url: String,
    pub session_cookie: String,
    pub scopes_supported: Vec<String>,
}

impl OAuth2State {
    pub fn new(db: Arc<DatabaseConnection>, keys: Arc<KeyManager>, config: &AppConfig) -> Self {
        let issuer_url = config.issuer_url.trim_end_matches('/').to_string();
        let minter = TokenMinter::new(keys.clone(), issuer_url.clone());

        Self {
            grants: AuthorizationGrantIssuer::new(db.clone()),
            exchange: TokenExchangeEngine::new(db.clone(), minter, config.db_timeout()),
            sessions: Arc::new(DbSessionProvider::new(db.clone())),
            db,
            keys,
            issuer_url,
            login_url: config.login_url.clone(),
            session_cookie: config.session_cookie.clone(),
            scopes_supported: config.scopes_supported.clone(),
        }
    }

    /// Replace the session provider, e.g. with one backed by an external login service.
    pub fn with_session_provider(mut self, sessions: Arc<dyn SessionProvider>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Replace the token exchange deadline.
    pub fn with_exchange_timeout(mut self, timeout: Duration) -> Self {
        let minter = TokenMinter::new(self.keys.clone(), self.issuer_url.clone());
        self.exchange = TokenExchangeEngine::new(self.db.clone(), minter, timeout);
        self
    }
}
