use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State, rejection::QueryRejection},
    http::HeaderMap,
};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

use crate::admission::Identity;
use crate::error::ApiError;
use crate::metrics::{COMPLETION_ERRORS, COMPLETION_LATENCY, REQUEST_TOTAL};
use crate::models::{ToolQuery, ToolResponse};
use crate::state::AppState;
use crate::tools::{self, ToolInputError, ToolSummary};

pub async fn list_tools_handler() -> Json<Vec<ToolSummary>> {
    Json(tools::catalog().iter().map(|t| t.summary()).collect())
}

// Admission runs before the body is even parsed, so a rejected or malformed
// request has still been charged
pub async fn run_tool_handler(
    State(state): State<Arc<AppState>>,
    Path(tool_id): Path<String>,
    query: Result<Query<ToolQuery>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ToolResponse>, ApiError> {
    REQUEST_TOTAL.inc();

    let tool = tools::find(&tool_id).ok_or(ApiError::UnknownTool(tool_id))?;
    let Query(query) = query.map_err(|rejection| ApiError::BadQuery(rejection.body_text()))?;

    let identity = Identity::from_request(
        &headers,
        query.api_key.as_deref(),
        state.admission.tokens(),
    );
    let decision = state.admission.check(&identity).await;
    if !decision.allowed {
        return Err(ApiError::RateLimited);
    }

    let body: serde_json::Value =
        serde_json::from_slice(&body).map_err(|_| ToolInputError::NotAnObject)?;
    let request = tool.build_request(&body)?;

    debug!(tool = tool.id, remaining = decision.remaining, "Calling completion service");
    let start_time = Instant::now();

    let result = state.completion.complete(request).await;
    COMPLETION_LATENCY.observe(start_time.elapsed().as_secs_f64());

    let result = result.inspect_err(|_| COMPLETION_ERRORS.inc())?;

    Ok(Json(ToolResponse {
        result,
        remaining: decision.remaining,
    }))
}
