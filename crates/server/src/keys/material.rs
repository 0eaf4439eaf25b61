//! RSA key material parsing.

use crate::error::KeyError;
use jsonwebtoken::EncodingKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::fmt;

/// A parsed, verified RSA keypair identified by its `kid`.
///
/// Never mutated once built; a reload replaces the whole key set instead.
#[derive(Clone)]
pub struct SigningKey {
    kid: String,
    encoding_key: EncodingKey,
    public_key: RsaPublicKey,
}

impl SigningKey {
    /// Parse both halves of a stored keypair and check that they belong together.
    pub fn from_pem(kid: &str, private_pem: &str, public_pem: &str) -> Result<Self, KeyError> {
        let private_key = parse_private_key(private_pem).map_err(|reason| {
            KeyError::InvalidPrivateKey {
                kid: kid.to_string(),
                reason,
            }
        })?;
        let public_key =
            parse_public_key(public_pem).map_err(|reason| KeyError::InvalidPublicKey {
                kid: kid.to_string(),
                reason,
            })?;

        if private_key.n() != public_key.n() {
            return Err(KeyError::Mismatch(kid.to_string()));
        }

        let der = {
            use rsa::pkcs1::EncodeRsaPrivateKey;
            private_key
                .to_pkcs1_der()
                .map_err(|e| KeyError::InvalidPrivateKey {
                    kid: kid.to_string(),
                    reason: e.to_string(),
                })?
        };

        Ok(Self {
            kid: kid.to_string(),
            encoding_key: EncodingKey::from_rsa_der(der.as_bytes()),
            public_key,
        })
    }

    pub fn kid(&self) -> &str {
        &self.kid
    }

    pub fn encoding_key(&self) -> &EncodingKey {
        &self.encoding_key
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }
}

impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("kid", &self.kid)
            .finish_non_exhaustive()
    }
}

/// PKCS#1 (`RSA PRIVATE KEY`) first, then PKCS#8 (`PRIVATE KEY`).
fn parse_private_key(pem: &str) -> Result<RsaPrivateKey, String> {
    let pkcs1 = {
        use rsa::pkcs1::DecodeRsaPrivateKey;
        RsaPrivateKey::from_pkcs1_pem(pem)
    };
    match pkcs1 {
        Ok(key) => Ok(key),
        Err(_) => {
            use rsa::pkcs8::DecodePrivateKey;
            RsaPrivateKey::from_pkcs8_pem(pem).map_err(|e| e.to_string())
        }
    }
}

/// SPKI (`PUBLIC KEY`) first, then PKCS#1 (`RSA PUBLIC KEY`).
fn parse_public_key(pem: &str) -> Result<RsaPublicKey, String> {
    let spki = {
        use rsa::pkcs8::DecodePublicKey;
        RsaPublicKey::from_public_key_pem(pem)
    };
    match spki {
        Ok(key) => Ok(key),
        Err(_) => {
            use rsa::pkcs1::DecodeRsaPublicKey;
            RsaPublicKey::from_pkcs1_pem(pem).map_err(|e| e.to_string())
        }
    }
}
