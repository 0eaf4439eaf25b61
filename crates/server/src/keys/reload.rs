//! Periodic signing key reload.

use crate::keys::manager::{KeyManager, KeyStore};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Re-read signing keys from `store` every `every`.
///
/// A failed reload is logged and the previous key set keeps serving. The
/// first tick fires after one full interval; callers load keys at startup.
pub fn spawn_reload_task<S>(keys: Arc<KeyManager>, store: Arc<S>, every: Duration) -> JoinHandle<()>
where
    S: KeyStore + ?Sized + 'static,
{
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + every, every);
        loop {
            interval.tick().await;
            if let Err(e) = keys.reload_from(store.as_ref()).await {
                tracing::error!(error = %e, "signing key reload failed, keeping previous key set");
            }
        }
    })
}
