//! Periodic removal of expired authorization codes.

use crate::entity::authorization_code;
use sea_orm::{ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter};
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

/// Delete every code whose `expires_at` has passed. Returns the number removed.
pub async fn purge_expired_codes(db: &DatabaseConnection) -> Result<u64, DbErr> {
    let result = authorization_code::Entity::delete_many()
        .filter(authorization_code::Column::ExpiresAt.lt(OffsetDateTime::now_utc()))
        .exec(db)
        .await?;
    Ok(result.rows_affected)
}

/// Run [`purge_expired_codes`] every `every`. Refresh tokens are left alone;
/// their rows anchor family revocation.
pub fn spawn_code_cleanup_task(db: Arc<DatabaseConnection>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match purge_expired_codes(db.as_ref()).await {
                Ok(0) => {}
                Ok(removed) => tracing::info!(removed, "purged expired authorization codes"),
                Err(e) => tracing::error!(error = %e, "authorization code cleanup failed"),
            }
        }
    })
}
