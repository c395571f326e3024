//! Agent API endpoints

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use agent_runner::{Agent, AgentId};

use crate::error::{api_error, orchestrator_error, ApiResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    #[serde(default)]
    pub name: String,
}

/// GET /api/agents - List agents in registration order
async fn list_agents(State(state): State<AppState>) -> Json<Vec<Agent>> {
    Json(state.pool().list().await)
}

/// POST /api/agents - Register an agent
async fn create_agent(
    State(state): State<AppState>,
    Json(req): Json<CreateAgentRequest>,
) -> ApiResult<(StatusCode, Json<Agent>)> {
    let name = req.name.trim();
    if name.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Name is required"));
    }

    let agent = state.pool().register(name).await;
    Ok((StatusCode::CREATED, Json(agent)))
}

/// GET /api/agents/{id}
async fn get_agent(
    State(state): State<AppState>,
    Path(id): Path<AgentId>,
) -> ApiResult<Json<Agent>> {
    state
        .pool()
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Agent not found"))
}

/// POST /api/agents/{id}/stop - Stop the agent's process and free it
async fn stop_agent(
    State(state): State<AppState>,
    Path(id): Path<AgentId>,
) -> ApiResult<Json<Agent>> {
    state
        .pool()
        .stop(id)
        .await
        .map(Json)
        .map_err(orchestrator_error)
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/agents", get(list_agents).post(create_agent))
        .route("/api/agents/{id}", get(get_agent))
        .route("/api/agents/{id}/stop", post(stop_agent))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_agent_request_tolerates_missing_name() {
        let req: CreateAgentRequest = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(req.name.is_empty());
    }
}
