//! Liveness probe.

pub const MISC_TAG: &str = "Miscellaneous";

/// Answers `ok` as long as the process serves HTTP. The database and the
/// signing keys are not consulted; `/jwks.json` reports key availability.
#[utoipa::path(
    get,
    path = "/healthz",
    tag = MISC_TAG,
    operation_id = "Liveness",
    responses(
        (status = 200, description = "Process is up", body = str, content_type = "text/plain", example = "ok")
    )
)]
pub async fn health() -> &'static str {
    "ok"
}
