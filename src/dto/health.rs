use serde::Serialize;
use utoipa::ToSchema;

/// Health response returned by the `/healthcheck` route.
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// Health status ("ok" or "degraded").
    pub status: String,
    /// Whether the backend currently runs without a storage backend.
    pub degraded: bool,
}

impl HealthResponse {
    /// Build the response for the current degraded flag.
    pub fn report(degraded: bool) -> Self {
        Self {
            status: if degraded { "degraded" } else { "ok" }.to_string(),
            degraded,
        }
    }
}
