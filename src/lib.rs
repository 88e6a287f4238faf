//! HTTP gateway for a catalog of small LLM-backed tools, gated by a daily
//! per-client and global quota.

pub mod admission;
pub mod completion;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod models;
pub mod quota;
pub mod state;
pub mod tools;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;

use crate::state::AppState;

// Builds the router with all routes
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/metrics", get(handlers::metrics_handler))
        .route("/api/tools", get(handlers::list_tools_handler))
        .route("/api/tools/{id}", post(handlers::run_tool_handler))
        .with_state(state)
}
