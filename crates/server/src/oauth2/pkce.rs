//! Proof Key for Code Exchange (RFC 7636), S256 only.

use crate::error::OAuthError;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

/// The only supported `code_challenge_method`.
pub const S256: &str = "S256";

/// Check the challenge parameters of an authorization request.
pub fn validate_challenge(challenge: &str, method: &str) -> Result<(), OAuthError> {
    if method != S256 {
        return Err(OAuthError::InvalidRequest(
            "code_challenge_method must be S256".to_string(),
        ));
    }
    if challenge.is_empty() {
        return Err(OAuthError::InvalidRequest(
            "missing code_challenge".to_string(),
        ));
    }
    Ok(())
}

/// `BASE64URL(SHA256(verifier))` without padding.
pub fn challenge_for(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// Compare the derived challenge against the stored one in constant time.
pub fn verify(verifier: &str, challenge: &str) -> bool {
    challenge_for(verifier)
        .as_bytes()
        .ct_eq(challenge.as_bytes())
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7636 appendix B
    const VERIFIER: &str = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
    const CHALLENGE: &str = "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM";

    #[test]
    fn derives_rfc_example_challenge() {
        assert_eq!(challenge_for(VERIFIER), CHALLENGE);
    }

    #[test]
    fn verify_accepts_matching_pair() {
        assert!(verify(VERIFIER, CHALLENGE));
    }

    #[test]
    fn verify_rejects_wrong_verifier() {
        assert!(!verify("not-the-verifier", CHALLENGE));
        assert!(!verify(VERIFIER, ""));
    }

    #[test]
    fn only_s256_is_accepted() {
        assert!(validate_challenge(CHALLENGE, "S256").is_ok());
        assert!(matches!(
            validate_challenge(CHALLENGE, "plain"),
            Err(OAuthError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate_challenge(CHALLENGE, ""),
            Err(OAuthError::InvalidRequest(_))
        ));
    }

    #[test]
    fn empty_challenge_is_rejected() {
        assert!(matches!(
            validate_challenge("", "S256"),
            Err(OAuthError::InvalidRequest(_))
        ));
    }
}
