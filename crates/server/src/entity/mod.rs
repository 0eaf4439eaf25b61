//! SeaORM entities for the identity provider schema.

pub mod authorization_code;
pub mod oauth_client;
pub mod refresh_token;
pub mod role;
pub mod role_scope;
pub mod scope;
pub mod session;
pub mod signing_key;
pub mod user;
