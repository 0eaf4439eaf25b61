use sea_orm::Database;
use sentinel_idp::AppResources;
use sentinel_idp::api::start_webserver;
use sentinel_idp::config::load_config;
use sentinel_idp::keys::{KeyManager, spawn_reload_task};
use sentinel_idp::oauth2::cleanup::spawn_code_cleanup_task;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn initialize_tracing() {
    let default_directives = "sentinel_idp=info,sea_orm=warn,tower_http=info";
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directives));

    let registry = tracing_subscriber::registry().with(env_filter);
    let layer = fmt::layer().with_target(true).with_level(true);

    registry.with(layer).init();
}

#[tokio::main]
async fn main() -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;

    // A missing .env is fine; real deployments set the environment directly.
    let _ = dotenvy::dotenv();

    initialize_tracing();

    let config = Arc::new(load_config()?);

    let db = Arc::new(Database::connect(config.database_url.as_str()).await?);

    // Start without keys rather than not at all; the reload task keeps trying.
    let keys = match KeyManager::load_from(db.as_ref()).await {
        Ok(keys) => keys,
        Err(e) => {
            tracing::error!(error = %e, "initial signing key load failed, starting without keys");
            KeyManager::default()
        }
    };
    let keys = Arc::new(keys);
    if let Some(kid) = keys.active_kid() {
        tracing::info!(active_kid = %kid, "signing keys ready");
    }

    spawn_reload_task(keys.clone(), db.clone(), config.key_reload_interval());
    spawn_code_cleanup_task(db.clone(), config.code_cleanup_interval());

    start_webserver(AppResources { db, keys, config }).await?;
    Ok(())
}
