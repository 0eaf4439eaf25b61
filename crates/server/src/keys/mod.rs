//! Signing key management.
//!
//! - `manager` - the [`KeyManager`] holding an immutable, atomically swapped key set
//! - `material` - PEM parsing and keypair consistency checks
//! - `jwks` - JSON Web Key Set publication (`GET /jwks.json`)
//! - `reload` - background task re-reading keys from storage

pub mod jwks;
pub mod manager;
pub mod material;
pub mod reload;

pub use jwks::{Jwk, Jwks};
pub use manager::{KeyManager, KeySet, KeyStore};
pub use material::SigningKey;
pub use reload::spawn_reload_task;
