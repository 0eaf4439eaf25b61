//! OAuth2 / OpenID Connect authorization server.
//!
//! Implements the authorization code flow with mandatory PKCE (S256) and
//! rotating refresh tokens. Tokens are RS256 JWTs signed by the active key of
//! the [`KeyManager`](crate::keys::KeyManager).
//!
//! ## Endpoints
//!
//! - `GET /authorize` - Authorization endpoint
//! - `POST /token` - Token endpoint (`authorization_code`, `refresh_token`)
//! - `GET /jwks.json` - Public signing keys
//! - `GET /.well-known/openid-configuration` - OpenID Connect Discovery

pub mod authorize;
pub mod cleanup;
pub mod code_store;
pub mod endpoints;
pub mod exchange;
pub mod minter;
pub mod pkce;
pub mod refresh;
pub mod secret;
pub mod session;
mod state;

pub use authorize::AuthorizationGrantIssuer;
pub use endpoints::router;
pub use exchange::{TokenExchangeEngine, TokenGrant};
pub use minter::TokenMinter;
pub use session::{AuthenticatedUser, DbSessionProvider, SessionProvider};
pub use state::OAuth2State;

/// OpenAPI tag for OAuth2 endpoints
pub const OAUTH2_TAG: &str = "OAuth2";

/// Lifetime of access and ID tokens.
pub const ACCESS_TOKEN_LIFETIME: time::Duration = time::Duration::minutes(15);

/// Lifetime of an authorization code.
pub const CODE_LIFETIME: time::Duration = time::Duration::seconds(60);

/// Lifetime of a refresh token.
pub const REFRESH_TOKEN_LIFETIME: time::Duration = time::Duration::days(30);
