//! Authorization request validation and code issuance.

use crate::entity::oauth_client;
use crate::error::OAuthError;
use crate::oauth2::session::AuthenticatedUser;
use crate::oauth2::{code_store, pkce};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::Deserialize;
use std::sync::Arc;
use url::Url;
use utoipa::IntoParams;

/// Query parameters of `GET /authorize`.
#[derive(Debug, Default, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeRequest {
    /// Client identifier issued during registration
    #[serde(default)]
    pub client_id: String,
    /// Must equal the client's registered redirect URI exactly
    #[serde(default)]
    pub redirect_uri: String,
    /// base64url(SHA-256(code_verifier))
    #[serde(default)]
    pub code_challenge: String,
    /// Must be "S256"
    #[serde(default)]
    pub code_challenge_method: String,
    /// Opaque value echoed back to the client
    #[serde(default)]
    pub state: String,
}

/// An authorization request that passed client and PKCE validation.
#[derive(Debug, Clone)]
pub struct ValidatedAuthorization {
    pub client_id: String,
    pub redirect_uri: Url,
    pub code_challenge: String,
    pub state: String,
}

#[derive(Clone)]
pub struct AuthorizationGrantIssuer {
    db: Arc<DatabaseConnection>,
}

impl AuthorizationGrantIssuer {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Validate parameters, client registration and PKCE, in that order.
    ///
    /// Errors are returned to the caller and never redirected, since the
    /// redirect target itself may be the problem.
    pub async fn validate(
        &self,
        request: &AuthorizeRequest,
    ) -> Result<ValidatedAuthorization, OAuthError> {
        if request.client_id.is_empty() || request.redirect_uri.is_empty() {
            return Err(OAuthError::InvalidRequest(
                "client_id and redirect_uri are required".to_string(),
            ));
        }

        let client = oauth_client::Entity::find_by_id(request.client_id.as_str())
            .one(self.db.as_ref())
            .await?
            .ok_or_else(|| OAuthError::InvalidClient("unknown client".to_string()))?;

        if !client.is_redirect_uri_allowed(&request.redirect_uri) {
            tracing::warn!(
                client_id = %client.client_id,
                redirect_uri = %request.redirect_uri,
                "redirect_uri does not match registration"
            );
            return Err(OAuthError::InvalidClient(
                "redirect_uri mismatch".to_string(),
            ));
        }

        let redirect_uri = Url::parse(&client.redirect_uri).map_err(|e| {
            OAuthError::InvalidClient(format!("registered redirect_uri is not a URL: {e}"))
        })?;

        pkce::validate_challenge(&request.code_challenge, &request.code_challenge_method)?;

        Ok(ValidatedAuthorization {
            client_id: client.client_id,
            redirect_uri,
            code_challenge: request.code_challenge.clone(),
            state: request.state.clone(),
        })
    }

    /// Persist a code for `user` and build the redirect back to the client.
    pub async fn issue(
        &self,
        authorization: &ValidatedAuthorization,
        user: &AuthenticatedUser,
    ) -> Result<Url, OAuthError> {
        let code = code_store::issue(
            self.db.as_ref(),
            &authorization.client_id,
            &user.user_id,
            &authorization.code_challenge,
        )
        .await?;

        tracing::info!(
            client_id = %authorization.client_id,
            user_id = %user.user_id,
            "authorization code issued"
        );

        Ok(redirect_with_code(
            &authorization.redirect_uri,
            &code.code,
            &authorization.state,
        ))
    }
}

/// Append `code` and `state` to the client's redirect URI, keeping any
/// query it already carries.
pub fn redirect_with_code(redirect_uri: &Url, code: &str, state: &str) -> Url {
    let mut url = redirect_uri.clone();
    url.query_pairs_mut()
        .append_pair("code", code)
        .append_pair("state", state);
    url
}
