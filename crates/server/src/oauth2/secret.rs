//! Opaque secrets: authorization codes and refresh tokens.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};

/// Random bytes behind an authorization code.
pub const CODE_BYTES: usize = 32;

/// Random bytes behind a refresh token.
pub const REFRESH_TOKEN_BYTES: usize = 64;

/// Generate `len` random bytes, base64url encoded without padding.
pub fn generate_token(len: usize) -> Result<String, getrandom::Error> {
    let mut bytes = vec![0u8; len];
    getrandom::fill(&mut bytes)?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Digest under which a refresh token is stored. The raw value is never persisted.
pub fn hash_refresh_token(raw: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(raw.as_bytes()))
}
