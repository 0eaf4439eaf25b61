//! JSON Web Key Set publication.

use crate::error::ErrorResponse;
use crate::oauth2::{OAUTH2_TAG, OAuth2State};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rsa::RsaPublicKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use utoipa::ToSchema;

/// A single RSA verification key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Jwk {
    pub kty: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub key_use: String,
    /// Modulus, base64url without padding
    pub n: String,
    /// Public exponent, base64url without padding
    pub e: String,
}

impl Jwk {
    pub fn from_rsa(kid: &str, key: &RsaPublicKey) -> Self {
        Jwk {
            kty: "RSA".to_string(),
            kid: kid.to_string(),
            alg: "RS256".to_string(),
            key_use: "sig".to_string(),
            n: URL_SAFE_NO_PAD.encode(key.n().to_bytes_be()),
            e: URL_SAFE_NO_PAD.encode(key.e().to_bytes_be()),
        }
    }
}

/// The published key set. Key order is unspecified.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    pub fn from_public_keys(keys: &HashMap<String, RsaPublicKey>) -> Self {
        Jwks {
            keys: keys
                .iter()
                .map(|(kid, key)| Jwk::from_rsa(kid, key))
                .collect(),
        }
    }

    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.kid == kid)
    }
}

/// JSON Web Key Set endpoint.
#[tracing::instrument(skip(state))]
#[utoipa::path(
    get,
    path = "/jwks.json",
    tag = OAUTH2_TAG,
    operation_id = "JSON Web Key Set",
    summary = "Public keys for verifying issued tokens",
    description = "Returns every currently known RSA verification key, not only the active one, \
                   so tokens signed before a key rotation stay verifiable until their key is \
                   removed from storage. Match the token header `kid` against the `kid` of each key.",
    responses(
        (status = 200, description = "The key set", body = Jwks),
        (status = 500, description = "Signing keys have not been loaded yet", body = ErrorResponse),
    )
)]
pub async fn jwks(State(state): State<OAuth2State>) -> Response {
    match state.keys.public_keys() {
        Ok(keys) => (StatusCode::OK, Json(Jwks::from_public_keys(&keys))).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "JWKS requested before keys were loaded");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(ErrorResponse::server_error()),
            )
                .into_response()
        }
    }
}
