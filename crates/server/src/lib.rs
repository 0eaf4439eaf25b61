//! An OAuth2 / OpenID Connect identity provider.
//!
//! Issues PKCE-bound authorization codes, exchanges them for RS256-signed
//! access and ID tokens, rotates refresh tokens with reuse detection and
//! publishes the verification keys as a JWKS document.

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::config::AppConfig;
use crate::keys::KeyManager;

pub mod api;
pub mod config;
pub mod entity;
pub mod error;
pub mod keys;
pub mod oauth2;

#[derive(Clone, Debug)]
pub struct AppResources {
    pub db: Arc<DatabaseConnection>,
    pub keys: Arc<KeyManager>,
    pub config: Arc<AppConfig>,
}
