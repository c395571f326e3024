//! Effective configuration endpoint

use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

use agent_runner::OrchestratorConfig;

use crate::state::AppState;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ConfigResponse {
    version: String,
    port: u16,
    orchestrator: OrchestratorConfig,
}

/// GET /api/config
async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        version: env!("CARGO_PKG_VERSION").to_string(),
        port: state.port(),
        orchestrator: state.config().clone(),
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/config", get(get_config))
}
