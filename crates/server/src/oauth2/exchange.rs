//! Token exchange: authorization code redemption and refresh token rotation.
//!
//! Every exchange is staged in one database transaction under a deadline. Any
//! early return drops the transaction, which rolls it back, so a failed
//! redemption leaves the code in place and a failed rotation leaves the
//! presented token live. A replayed refresh token is the exception: its
//! family is revoked in a separate transaction that the deadline does not
//! cover.

use crate::entity::refresh_token;
use crate::error::OAuthError;
use crate::oauth2::endpoints::TokenRequest;
use crate::oauth2::minter::TokenMinter;
use crate::oauth2::{ACCESS_TOKEN_LIFETIME, code_store, pkce, refresh};
use sea_orm::{DatabaseConnection, DatabaseTransaction, TransactionTrait};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use utoipa::ToSchema;

/// A validated token request.
#[derive(Clone, PartialEq, Eq)]
pub enum TokenGrant {
    AuthorizationCode {
        code: String,
        client_id: String,
        code_verifier: String,
    },
    RefreshToken {
        refresh_token: String,
        client_id: String,
    },
}

// Secrets stay out of logs.
impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenGrant::AuthorizationCode { client_id, .. } => f
                .debug_struct("AuthorizationCode")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
            TokenGrant::RefreshToken { client_id, .. } => f
                .debug_struct("RefreshToken")
                .field("client_id", client_id)
                .finish_non_exhaustive(),
        }
    }
}

impl TokenGrant {
    pub fn client_id(&self) -> &str {
        match self {
            TokenGrant::AuthorizationCode { client_id, .. }
            | TokenGrant::RefreshToken { client_id, .. } => client_id,
        }
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, OAuthError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest(format!("{name} is required")))
}

impl TryFrom<TokenRequest> for TokenGrant {
    type Error = OAuthError;

    fn try_from(request: TokenRequest) -> Result<Self, Self::Error> {
        match request.grant_type.as_str() {
            "authorization_code" => Ok(TokenGrant::AuthorizationCode {
                code: required(request.code, "code")?,
                client_id: required(request.client_id, "client_id")?,
                code_verifier: required(request.code_verifier, "code_verifier")?,
            }),
            "refresh_token" => Ok(TokenGrant::RefreshToken {
                refresh_token: required(request.refresh_token, "refresh_token")?,
                client_id: required(request.client_id, "client_id")?,
            }),
            "" => Err(OAuthError::InvalidRequest(
                "grant_type is required".to_string(),
            )),
            other => Err(OAuthError::UnsupportedGrantType(other.to_string())),
        }
    }
}

/// Successful token endpoint response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    pub access_token: String,
    /// Only present for the `authorization_code` grant
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl TokenResponse {
    fn bearer(access_token: String, id_token: Option<String>, refresh_token: String) -> Self {
        Self {
            access_token,
            id_token,
            refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: ACCESS_TOKEN_LIFETIME.whole_seconds(),
        }
    }
}

/// What a refresh token presentation turned out to be.
enum Rotation {
    /// The token was live; its successor is staged in `txn`.
    Rotated {
        txn: DatabaseTransaction,
        tokens: TokenResponse,
        parent_id: String,
        token_id: String,
    },
    /// The token was no longer live. Nothing was written.
    Reused { token: refresh_token::Model },
}

#[derive(Clone)]
pub struct TokenExchangeEngine {
    db: Arc<DatabaseConnection>,
    minter: TokenMinter,
    timeout: Duration,
}

impl TokenExchangeEngine {
    pub fn new(db: Arc<DatabaseConnection>, minter: TokenMinter, timeout: Duration) -> Self {
        Self {
            db,
            minter,
            timeout,
        }
    }

    /// Run `grant` to completion.
    ///
    /// The deadline bounds validation and minting only. Commits, and the
    /// family revocation that follows a detected reuse, run after it, so a
    /// [`OAuthError::Timeout`] always means nothing was written.
    #[tracing::instrument(skip_all, fields(client_id = %grant.client_id()))]
    pub async fn exchange(&self, grant: TokenGrant) -> Result<TokenResponse, OAuthError> {
        match grant {
            TokenGrant::AuthorizationCode {
                code,
                client_id,
                code_verifier,
            } => {
                let (txn, tokens, user_id) = self
                    .within_deadline(self.redeem_code(&code, &client_id, &code_verifier))
                    .await?;
                txn.commit().await?;
                tracing::info!(%user_id, "authorization code redeemed");
                Ok(tokens)
            }
            TokenGrant::RefreshToken {
                refresh_token,
                client_id,
            } => match self
                .within_deadline(self.rotate_refresh_token(&refresh_token, &client_id))
                .await?
            {
                Rotation::Rotated {
                    txn,
                    tokens,
                    parent_id,
                    token_id,
                } => {
                    txn.commit().await?;
                    tracing::info!(parent = %parent_id, %token_id, "refresh token rotated");
                    Ok(tokens)
                }
                Rotation::Reused { token } => {
                    self.revoke_family(&token).await?;
                    Err(OAuthError::RefreshRejected)
                }
            },
        }
    }

    async fn within_deadline<T>(
        &self,
        work: impl Future<Output = Result<T, OAuthError>>,
    ) -> Result<T, OAuthError> {
        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| OAuthError::Timeout)?
    }

    /// Stage a code redemption. The returned transaction holds the deleted
    /// code and the new refresh token and still has to be committed.
    async fn redeem_code(
        &self,
        code: &str,
        client_id: &str,
        code_verifier: &str,
    ) -> Result<(DatabaseTransaction, TokenResponse, String), OAuthError> {
        let txn = self.db.begin().await?;

        let grant = code_store::consume(&txn, code).await?;
        if grant.client_id != client_id {
            return Err(OAuthError::ClientMismatch);
        }
        if !pkce::verify(code_verifier, &grant.code_challenge) {
            return Err(OAuthError::PkceFailed);
        }

        let access_token = self
            .minter
            .mint_access_token(&txn, &grant.user_id, client_id)
            .await?;
        let id_token = self
            .minter
            .mint_id_token(&txn, &grant.user_id, client_id, grant.created_at)
            .await?;
        let refresh_token = refresh::issue(&txn, &grant.user_id, client_id, None).await?;

        let tokens = TokenResponse::bearer(access_token, Some(id_token), refresh_token.raw);
        Ok((txn, tokens, grant.user_id))
    }

    async fn rotate_refresh_token(&self, raw: &str, client_id: &str) -> Result<Rotation, OAuthError> {
        let txn = self.db.begin().await?;

        let Some(current) = refresh::find_presented(&txn, raw, client_id).await? else {
            tracing::warn!("unknown refresh token presented");
            return Err(OAuthError::RefreshRejected);
        };

        // Not live any more, possibly because a concurrent rotation won
        if !refresh::mark_rotated(&txn, &current.id).await? {
            // Nothing was written. Dropping rolls back without another await,
            // so the deadline cannot fire between detection and revocation.
            drop(txn);
            return Ok(Rotation::Reused { token: current });
        }

        let next = refresh::issue(
            &txn,
            &current.user_id,
            client_id,
            Some(current.id.clone()),
        )
        .await?;
        let access_token = self
            .minter
            .mint_access_token(&txn, &current.user_id, client_id)
            .await?;

        Ok(Rotation::Rotated {
            txn,
            tokens: TokenResponse::bearer(access_token, None, next.raw),
            parent_id: current.id,
            token_id: next.id,
        })
    }

    /// Revoke the family of a replayed token in a transaction of its own.
    async fn revoke_family(&self, token: &refresh_token::Model) -> Result<(), OAuthError> {
        let txn = self.db.begin().await?;
        let revoked = refresh::revoke_family(&txn, &token.id).await?;
        txn.commit().await?;

        tracing::warn!(
            token_id = %token.id,
            user_id = %token.user_id,
            revoked,
            "refresh token reuse detected, family revoked"
        );
        Ok(())
    }
}
