//! OAuth2 HTTP endpoints.
//!
//! - Authorization endpoint
//! - Token endpoint
//! - JWKS (see [`crate::keys::jwks`])
//! - Discovery document

use crate::error::{ErrorResponse, OAuthError};
use crate::keys::jwks::{__path_jwks, jwks};
use crate::oauth2::authorize::AuthorizeRequest;
use crate::oauth2::exchange::{TokenGrant, TokenResponse};
use crate::oauth2::pkce::S256;
use crate::oauth2::session::{clear_cookie, session_token_from_headers};
use crate::oauth2::{OAUTH2_TAG, state::OAuth2State};
use axum::{
    Form, Json,
    extract::{Query, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates the OAuth2 router.
pub fn router(state: OAuth2State) -> OpenApiRouter {
    OpenApiRouter::new()
        .routes(routes!(authorize))
        .routes(routes!(token))
        .routes(routes!(jwks))
        .route("/.well-known/jwks.json", get(jwks))
        .routes(routes!(openid_configuration))
        .with_state(state)
}

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenRequest {
    /// `authorization_code` or `refresh_token`
    #[serde(default)]
    pub grant_type: String,
    pub code: Option<String>,
    pub client_id: Option<String>,
    pub code_verifier: Option<String>,
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub grant_types_supported: Vec<String>,
    pub subject_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub code_challenge_methods_supported: Vec<String>,
}

// =============================================================================
// Endpoints
// =============================================================================

/// OAuth2 Authorization endpoint.
///
/// Requires an authenticated session. Without one the user agent is sent to
/// the login page; with one, a single-use code bound to the PKCE challenge is
/// issued and the user agent is redirected back to the client.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    get,
    path = "/authorize",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Authorize",
    summary = "Issue a PKCE-bound authorization code",
    description = "Starts the Authorization Code flow with PKCE.\n\n\
                   The `redirect_uri` must equal the client's registered URI exactly and \
                   `code_challenge_method` must be `S256`. Validation errors are returned \
                   as JSON and never redirected.\n\n\
                   Requests without a valid session cookie are redirected to the login page.",
    params(AuthorizeRequest),
    responses(
        (status = 302, description = "Redirect back to the client with `code` and `state`, or to the login page"),
        (status = 400, description = "Missing parameters, unknown client, redirect_uri mismatch or unsupported PKCE method", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
    )
)]
pub async fn authorize(
    State(state): State<OAuth2State>,
    headers: HeaderMap,
    Query(params): Query<AuthorizeRequest>,
) -> Response {
    let authorization = match state.grants.validate(&params).await {
        Ok(authorization) => authorization,
        Err(e) => return e.into_response(),
    };

    let Some(session_token) = session_token_from_headers(&headers, &state.session_cookie) else {
        return login_redirect(&state, false);
    };

    let user = match state.sessions.authenticate(&session_token).await {
        Ok(Some(user)) => user,
        Ok(None) => return login_redirect(&state, true),
        Err(e) => return OAuthError::from(e).into_response(),
    };

    match state.grants.issue(&authorization, &user).await {
        Ok(location) => found(location.as_str()),
        Err(e) => e.into_response(),
    }
}

/// OAuth2 Token endpoint.
#[tracing::instrument(skip_all)]
#[utoipa::path(
    post,
    path = "/token",
    tag = OAUTH2_TAG,
    operation_id = "OAuth2 Token",
    summary = "Exchange authorization code or refresh token for tokens",
    description = "**Supported grant types:**\n\
                   - `authorization_code`: requires `code`, `client_id` and `code_verifier`. \
                   Returns an access token, an ID token and a refresh token.\n\
                   - `refresh_token`: requires `refresh_token` and `client_id`. The presented token \
                   is rotated; presenting an already rotated token revokes its whole family.\n\n\
                   Clients are public and authenticate with PKCE only.",
    request_body(
        content = TokenRequest,
        content_type = "application/x-www-form-urlencoded",
        description = "Token request parameters"
    ),
    responses(
        (status = 200, description = "Tokens issued successfully", body = TokenResponse),
        (status = 400, description = "Invalid request, invalid code, client mismatch or PKCE failure", body = ErrorResponse),
        (status = 401, description = "Refresh token rejected", body = ErrorResponse),
        (status = 500, description = "Internal error", body = ErrorResponse),
    )
)]
pub async fn token(State(state): State<OAuth2State>, Form(params): Form<TokenRequest>) -> Response {
    let grant = match TokenGrant::try_from(params) {
        Ok(grant) => grant,
        Err(e) => return e.into_response(),
    };

    match state.exchange.exchange(grant).await {
        Ok(tokens) => (
            StatusCode::OK,
            [(CACHE_CONTROL, HeaderValue::from_static("no-store"))],
            Json(tokens),
        )
            .into_response(),
        Err(e) => e.into_response(),
    }
}

/// OpenID Connect Discovery document.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/.well-known/openid-configuration",
    tag = OAUTH2_TAG,
    operation_id = "OpenID Connect Discovery",
    summary = "OpenID Connect Discovery document",
    description = "Returns the provider metadata: endpoint URLs, supported grant and response \
                   types, signing algorithm and PKCE methods.",
    responses(
        (status = 200, description = "OpenID Connect configuration document", body = OpenIdConfiguration),
    )
)]
pub async fn openid_configuration(State(state): State<OAuth2State>) -> Json<OpenIdConfiguration> {
    let issuer = state.issuer_url.trim_end_matches('/');
    Json(OpenIdConfiguration {
        issuer: issuer.to_string(),
        authorization_endpoint: format!("{issuer}/authorize"),
        token_endpoint: format!("{issuer}/token"),
        jwks_uri: format!("{issuer}/jwks.json"),
        response_types_supported: vec!["code".to_string()],
        grant_types_supported: vec![
            "authorization_code".to_string(),
            "refresh_token".to_string(),
        ],
        subject_types_supported: vec!["public".to_string()],
        id_token_signing_alg_values_supported: vec!["RS256".to_string()],
        scopes_supported: state.scopes_supported.clone(),
        token_endpoint_auth_methods_supported: vec!["none".to_string()],
        code_challenge_methods_supported: vec![S256.to_string()],
    })
}

// =============================================================================
// Helper Functions
// =============================================================================

fn found(location: &str) -> Response {
    match HeaderValue::try_from(location) {
        Ok(value) => (StatusCode::FOUND, [(LOCATION, value)]).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "redirect location is not a valid header value");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse::server_error())).into_response()
        }
    }
}

/// Send the user agent to the login page, clearing a stale session cookie.
fn login_redirect(state: &OAuth2State, clear_session: bool) -> Response {
    let mut response = found(&state.login_url);
    if !clear_session {
        return response;
    }
    if let Ok(cookie) = HeaderValue::try_from(clear_cookie(&state.session_cookie)) {
        response.headers_mut().insert(SET_COOKIE, cookie);
    }
    response
}
