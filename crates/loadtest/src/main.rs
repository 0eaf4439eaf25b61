use goose::prelude::*;

async fn health_check(user: &mut GooseUser) -> TransactionResult {
    let _goose_metrics = user.get("/healthz").await?;
    Ok(())
}

/// Relying parties fetch the key set on every cache miss, so it has to stay cheap.
async fn get_jwks(user: &mut GooseUser) -> TransactionResult {
    let mut goose = user.get("/jwks.json").await?;

    if let Ok(response) = goose.response {
        let body = response.text().await.unwrap_or_default();
        let has_keys = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|jwks| jwks.get("keys").and_then(|k| k.as_array()).map(|k| !k.is_empty()))
            .unwrap_or(false);
        if !has_keys {
            return user.set_failure("jwks without keys", &mut goose.request, None, Some(&body));
        }
    }
    Ok(())
}

async fn get_discovery(user: &mut GooseUser) -> TransactionResult {
    let _goose_metrics = user.get("/.well-known/openid-configuration").await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), GooseError> {
    GooseAttack::initialize()?
        .register_scenario(
            scenario!("HealthCheck").register_transaction(transaction!(health_check)),
        )
        .register_scenario(
            scenario!("KeyDiscovery")
                .register_transaction(transaction!(get_discovery))
                .register_transaction(transaction!(get_jwks).set_weight(5)?),
        )
        .execute()
        .await?;

    Ok(())
}
