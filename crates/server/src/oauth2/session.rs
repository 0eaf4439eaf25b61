//! End-user session lookup for the authorization endpoint.

use crate::entity::session;
use async_trait::async_trait;
use axum::http::{HeaderMap, header::COOKIE};
use sea_orm::{DatabaseConnection, DbErr, EntityTrait};
use std::sync::Arc;

/// The end-user behind a valid session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub session_id: String,
}

/// Resolves a session token into an authenticated user.
///
/// `Ok(None)` means the token is unknown or expired and the user has to log
/// in again.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn authenticate(&self, session_token: &str) -> Result<Option<AuthenticatedUser>, DbErr>;
}

/// Session provider backed by the `sessions` table.
#[derive(Clone)]
pub struct DbSessionProvider {
    db: Arc<DatabaseConnection>,
}

impl DbSessionProvider {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl SessionProvider for DbSessionProvider {
    async fn authenticate(&self, session_token: &str) -> Result<Option<AuthenticatedUser>, DbErr> {
        let Some(row) = session::Entity::find_by_id(session_token)
            .one(self.db.as_ref())
            .await?
        else {
            return Ok(None);
        };

        if row.is_expired() {
            tracing::debug!(session_id = %row.id, "session expired");
            return Ok(None);
        }

        Ok(Some(AuthenticatedUser {
            user_id: row.user_id,
            session_id: row.id,
        }))
    }
}

/// Extract the value of cookie `name` from the request headers.
pub fn session_token_from_headers(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, value)| *key == name && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value that clears cookie `name`.
pub fn clear_cookie(name: &str) -> String {
    format!("{name}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}
