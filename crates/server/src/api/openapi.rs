//! OpenAPI/Utoipa configuration.

use crate::api::health::MISC_TAG;
use crate::oauth2::OAUTH2_TAG;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{AuthorizationCode, Flow, OAuth2, Scopes, SecurityScheme},
};

/// Security addon for OpenAPI documentation.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    #[tracing::instrument(skip(self, openapi))]
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        // Authorization Code flow with PKCE, public clients only
        let oauth2 = OAuth2::new([Flow::AuthorizationCode(AuthorizationCode::new(
            "/authorize",
            "/token",
            Scopes::from_iter([
                ("read:profile", "Read the user profile"),
                ("read:data", "Read application data"),
                ("write:data", "Modify application data"),
                ("admin:users", "Administer users"),
            ]),
        ))]);
        components.add_security_scheme("OAuth2", SecurityScheme::OAuth2(oauth2));
    }
}

/// OpenAPI documentation configuration.
#[derive(OpenApi)]
#[openapi(
    modifiers(&SecurityAddon),
    info(
        title = "Sentinel Identity Provider API",
        version = "1.0.0",
        description = "OAuth2 authorization server with PKCE, rotating refresh tokens and RS256 JWTs."
    ),
    tags(
        (name = MISC_TAG, description = "Miscellaneous endpoints"),
        (name = OAUTH2_TAG, description = "OAuth2 and OpenID Connect endpoints")
    )
)]
pub struct ApiDoc;
