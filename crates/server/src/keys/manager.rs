//! The signing key manager.
//!
//! Keys are parsed into a fresh [`KeySet`] outside of any lock; only the final
//! pointer swap happens under the write lock, so readers never observe a
//! half-built set and never wait on PEM parsing.

use crate::entity::signing_key;
use crate::error::KeyError;
use crate::keys::material::SigningKey;
use async_trait::async_trait;
use rsa::RsaPublicKey;
use sea_orm::{DatabaseConnection, EntityTrait};
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

/// Persistent source of signing keypairs.
#[async_trait]
pub trait KeyStore: Send + Sync {
    async fn signing_keys(&self) -> Result<Vec<signing_key::Model>, KeyError>;
}

#[async_trait]
impl KeyStore for DatabaseConnection {
    async fn signing_keys(&self) -> Result<Vec<signing_key::Model>, KeyError> {
        Ok(signing_key::Entity::find().all(self).await?)
    }
}

#[async_trait]
impl KeyStore for Vec<signing_key::Model> {
    async fn signing_keys(&self) -> Result<Vec<signing_key::Model>, KeyError> {
        Ok(self.clone())
    }
}

/// An immutable snapshot of every known key and the id of the active one.
#[derive(Debug)]
pub struct KeySet {
    keys: HashMap<String, Arc<SigningKey>>,
    active: Arc<SigningKey>,
}

impl KeySet {
    /// Build a key set from stored rows. Any bad row fails the whole set.
    pub fn from_rows(rows: &[signing_key::Model]) -> Result<Self, KeyError> {
        let mut keys = HashMap::with_capacity(rows.len());
        let mut active: Option<Arc<SigningKey>> = None;

        for row in rows {
            let key = Arc::new(SigningKey::from_pem(
                &row.kid,
                &row.private_key_pem,
                &row.public_key_pem,
            )?);

            if row.active {
                if let Some(previous) = active.replace(Arc::clone(&key)) {
                    return Err(KeyError::MultipleActiveKeys(
                        previous.kid().to_string(),
                        row.kid.clone(),
                    ));
                }
            }

            tracing::info!(kid = %row.kid, active = row.active, "loaded signing key");
            keys.insert(row.kid.clone(), key);
        }

        let active = active.ok_or(KeyError::NoActiveKey)?;
        Ok(Self { keys, active })
    }

    pub fn active(&self) -> Arc<SigningKey> {
        Arc::clone(&self.active)
    }

    pub fn active_kid(&self) -> &str {
        self.active.kid()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn public_keys(&self) -> HashMap<String, RsaPublicKey> {
        self.keys
            .iter()
            .map(|(kid, key)| (kid.clone(), key.public_key().clone()))
            .collect()
    }
}

/// Thread-safe owner of the current [`KeySet`].
///
/// Constructed explicitly and shared through an `Arc`; a default manager is
/// empty until the first successful load.
#[derive(Debug, Default)]
pub struct KeyManager {
    current: RwLock<Option<Arc<KeySet>>>,
}

impl KeyManager {
    /// Read every keypair from `store` into a new manager.
    pub async fn load_from<S: KeyStore + ?Sized>(store: &S) -> Result<Self, KeyError> {
        let set = Self::build(store).await?;
        Ok(Self {
            current: RwLock::new(Some(Arc::new(set))),
        })
    }

    /// Re-read `store` and swap the key set in on success.
    ///
    /// On failure the previous key set stays in place and the error is returned.
    #[tracing::instrument(skip_all)]
    pub async fn reload_from<S: KeyStore + ?Sized>(&self, store: &S) -> Result<(), KeyError> {
        let set = Arc::new(Self::build(store).await?);
        let active_kid = set.active_kid().to_string();
        let count = set.len();

        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(set);

        tracing::info!(active_kid = %active_kid, keys = count, "signing keys reloaded");
        Ok(())
    }

    async fn build<S: KeyStore + ?Sized>(store: &S) -> Result<KeySet, KeyError> {
        let rows = store.signing_keys().await?;
        KeySet::from_rows(&rows)
    }

    fn snapshot(&self) -> Option<Arc<KeySet>> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The key new tokens are signed with.
    pub fn active_signing_key(&self) -> Result<Arc<SigningKey>, KeyError> {
        self.snapshot()
            .map(|set| set.active())
            .ok_or(KeyError::NoActiveKey)
    }

    /// Every known public key by `kid`, the active one included.
    pub fn public_keys(&self) -> Result<HashMap<String, RsaPublicKey>, KeyError> {
        self.snapshot()
            .map(|set| set.public_keys())
            .ok_or(KeyError::NotLoaded)
    }

    pub fn active_kid(&self) -> Option<String> {
        self.snapshot().map(|set| set.active_kid().to_string())
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot().is_some()
    }
}
