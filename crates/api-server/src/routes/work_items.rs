//! Work item API endpoints

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use agent_runner::{Agent, AgentId, Assignment};
use boss_core::work_item::{
    NewWorkItem, WorkItem, WorkItemId, WorkItemPriority, WorkItemRepository, WorkItemStatus,
};

use crate::error::{api_error, orchestrator_error, store_error, ApiResult};
use crate::state::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateWorkItemRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<WorkItemPriority>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWorkItemRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<WorkItemPriority>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignRequest {
    #[serde(default)]
    pub agent_id: Option<AgentId>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkItemResponse {
    pub id: WorkItemId,
    pub title: String,
    pub description: Option<String>,
    pub status: WorkItemStatus,
    pub priority: WorkItemPriority,
    pub created_at: String,
    pub updated_at: String,
}

impl From<WorkItem> for WorkItemResponse {
    fn from(item: WorkItem) -> Self {
        Self {
            id: item.id,
            title: item.title,
            description: item.description,
            status: item.status,
            priority: item.priority,
            created_at: item.created_at.to_rfc3339(),
            updated_at: item.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentResponse {
    pub work_item: WorkItemResponse,
    pub agent: Agent,
}

impl From<Assignment> for AssignmentResponse {
    fn from(assignment: Assignment) -> Self {
        Self {
            work_item: assignment.work_item.into(),
            agent: assignment.agent,
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/work-items - Newest first
async fn list_work_items(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<WorkItemResponse>>> {
    let items = state.work_items().list().await.map_err(store_error)?;
    Ok(Json(items.into_iter().map(Into::into).collect()))
}

/// POST /api/work-items
async fn create_work_item(
    State(state): State<AppState>,
    Json(req): Json<CreateWorkItemRequest>,
) -> ApiResult<(StatusCode, Json<WorkItemResponse>)> {
    let title = req.title.trim();
    if title.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "Title is required"));
    }

    let mut new_item = NewWorkItem::new(title);
    if let Some(description) = req.description {
        new_item = new_item.with_description(description);
    }
    if let Some(priority) = req.priority {
        new_item = new_item.with_priority(priority);
    }

    let item = state
        .work_items()
        .create(new_item)
        .await
        .map_err(store_error)?;
    Ok((StatusCode::CREATED, Json(item.into())))
}

/// GET /api/work-items/{id}
async fn get_work_item(
    State(state): State<AppState>,
    Path(id): Path<WorkItemId>,
) -> ApiResult<Json<WorkItemResponse>> {
    state
        .work_items()
        .get(id)
        .await
        .map_err(store_error)?
        .map(|item| Json(item.into()))
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, "Work item not found"))
}

/// PUT /api/work-items/{id} - Edit title, description or priority
///
/// Status only moves through assign/complete/fail.
async fn update_work_item(
    State(state): State<AppState>,
    Path(id): Path<WorkItemId>,
    Json(req): Json<UpdateWorkItemRequest>,
) -> ApiResult<Json<WorkItemResponse>> {
    let title = match req.title {
        Some(title) if title.trim().is_empty() => {
            return Err(api_error(StatusCode::BAD_REQUEST, "Title cannot be empty"));
        }
        Some(title) => Some(title.trim().to_string()),
        None => None,
    };

    let item = state
        .coordinator()
        .edit(id, move |item| {
            if let Some(title) = title {
                item.title = title;
            }
            if let Some(description) = req.description {
                item.description = Some(description);
            }
            if let Some(priority) = req.priority {
                item.priority = priority;
            }
        })
        .await
        .map_err(orchestrator_error)?;
    Ok(Json(item.into()))
}

/// POST /api/work-items/{id}/assign - Start an agent on a pending work item
async fn assign_work_item(
    State(state): State<AppState>,
    Path(id): Path<WorkItemId>,
    body: Bytes,
) -> ApiResult<Json<AssignmentResponse>> {
    // An empty body means "first available agent"
    let req: AssignRequest = if body.iter().all(u8::is_ascii_whitespace) {
        AssignRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| api_error(StatusCode::BAD_REQUEST, format!("Invalid body: {}", e)))?
    };
    let coordinator = state.coordinator();

    let assignment = match req.agent_id {
        Some(agent_id) => coordinator.assign(id, agent_id).await,
        None => coordinator.assign_next(id).await,
    }
    .map_err(orchestrator_error)?;

    Ok(Json(assignment.into()))
}

/// POST /api/work-items/{id}/complete
async fn complete_work_item(
    State(state): State<AppState>,
    Path(id): Path<WorkItemId>,
) -> ApiResult<Json<WorkItemResponse>> {
    let item = state
        .coordinator()
        .complete(id)
        .await
        .map_err(orchestrator_error)?;
    Ok(Json(item.into()))
}

/// POST /api/work-items/{id}/fail
async fn fail_work_item(
    State(state): State<AppState>,
    Path(id): Path<WorkItemId>,
) -> ApiResult<Json<WorkItemResponse>> {
    let item = state
        .coordinator()
        .fail(id)
        .await
        .map_err(orchestrator_error)?;
    Ok(Json(item.into()))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/work-items",
            get(list_work_items).post(create_work_item),
        )
        .route(
            "/api/work-items/{id}",
            get(get_work_item).put(update_work_item),
        )
        .route("/api/work-items/{id}/assign", post(assign_work_item))
        .route("/api/work-items/{id}/complete", post(complete_work_item))
        .route("/api/work-items/{id}/fail", post(fail_work_item))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_request_agent_is_optional() {
        let req: AssignRequest = serde_json::from_str("{}").unwrap();
        assert!(req.agent_id.is_none());

        let req: AssignRequest = serde_json::from_str(r#"{"agentId": 4}"#).unwrap();
        assert_eq!(req.agent_id, Some(4));
    }

    #[test]
    fn test_work_item_response_is_camel_case() {
        let item = NewWorkItem::new("Ship it")
            .with_priority(WorkItemPriority::High)
            .into_work_item(7);
        let json = serde_json::to_value(WorkItemResponse::from(item)).unwrap();

        assert_eq!(json["id"], 7);
        assert_eq!(json["status"], "pending");
        assert_eq!(json["priority"], "high");
        assert!(json.get("createdAt").is_some());
        assert!(json.get("created_at").is_none());
    }

    #[test]
    fn test_update_request_fields_are_optional() {
        let req: UpdateWorkItemRequest =
            serde_json::from_str(r#"{"priority": "low"}"#).unwrap();
        assert!(req.title.is_none());
        assert_eq!(req.priority, Some(WorkItemPriority::Low));
    }
}
