//! RS256 access and ID token minting.
//!
//! Both token kinds carry the `kid` of the active signing key in their header
//! so relying parties can select the right key from the JWKS document.

use crate::entity::{role_scope, scope, user};
use crate::error::OAuthError;
use crate::keys::KeyManager;
use crate::oauth2::ACCESS_TOKEN_LIFETIME;
use jsonwebtoken::{Algorithm, Header};
use sea_orm::{ColumnTrait, ConnectionTrait, DbErr, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use time::OffsetDateTime;

/// Claims of an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    /// Space-separated scope names, sorted. Empty when the user has no role.
    pub scope: String,
}

/// Claims of an OpenID Connect ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub iat: i64,
    pub exp: i64,
    pub auth_time: i64,
    pub preferred_username: String,
}

#[derive(Clone)]
pub struct TokenMinter {
    keys: Arc<KeyManager>,
    issuer: String,
}

impl TokenMinter {
    pub fn new(keys: Arc<KeyManager>, issuer: impl Into<String>) -> Self {
        Self {
            keys,
            issuer: issuer.into(),
        }
    }

    /// Mint an access token for `user_id` with the scopes granted by the user's role.
    pub async fn mint_access_token<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: &str,
        client_id: &str,
    ) -> Result<String, OAuthError> {
        let scopes = resolve_scopes(db, user_id).await?;
        let now = OffsetDateTime::now_utc();

        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: user_id.to_string(),
            aud: client_id.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + ACCESS_TOKEN_LIFETIME).unix_timestamp(),
            jti: uuid::Uuid::new_v4().to_string(),
            scope: scopes.join(" "),
        };

        self.sign(&claims)
    }

    /// Mint an ID token. `auth_time` is when the user's authentication produced
    /// the grant being redeemed.
    pub async fn mint_id_token<C: ConnectionTrait>(
        &self,
        db: &C,
        user_id: &str,
        client_id: &str,
        auth_time: OffsetDateTime,
    ) -> Result<String, OAuthError> {
        let user = user::Entity::find_by_id(user_id)
            .one(db)
            .await?
            .ok_or_else(|| OAuthError::UserLookupFailed(user_id.to_string()))?;
        let now = OffsetDateTime::now_utc();

        let claims = IdTokenClaims {
            iss: self.issuer.clone(),
            sub: user.id,
            aud: client_id.to_string(),
            iat: now.unix_timestamp(),
            exp: (now + ACCESS_TOKEN_LIFETIME).unix_timestamp(),
            auth_time: auth_time.unix_timestamp(),
            preferred_username: user.username,
        };

        self.sign(&claims)
    }

    fn sign<T: Serialize>(&self, claims: &T) -> Result<String, OAuthError> {
        let key = self.keys.active_signing_key()?;

        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(key.kid().to_string());

        Ok(jsonwebtoken::encode(&header, claims, key.encoding_key())?)
    }
}

/// Scope names granted to `user_id` through its role, sorted by name.
///
/// A missing user, a user without a role and a role without scopes all yield
/// an empty list.
pub async fn resolve_scopes<C: ConnectionTrait>(
    db: &C,
    user_id: &str,
) -> Result<Vec<String>, DbErr> {
    let Some(role_id) = user::Entity::find_by_id(user_id)
        .one(db)
        .await?
        .and_then(|user| user.role_id)
    else {
        return Ok(Vec::new());
    };

    let scope_ids: Vec<i32> = role_scope::Entity::find()
        .filter(role_scope::Column::RoleId.eq(role_id))
        .all(db)
        .await?
        .into_iter()
        .map(|row| row.scope_id)
        .collect();

    if scope_ids.is_empty() {
        return Ok(Vec::new());
    }

    let mut names: Vec<String> = scope::Entity::find()
        .filter(scope::Column::Id.is_in(scope_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|row| row.name)
        .collect();
    names.sort();

    Ok(names)
}
