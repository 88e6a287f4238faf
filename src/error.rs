use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use crate::completion::CompletionError;
use crate::models::ErrorBody;
use crate::tools::ToolInputError;

/// Errors a tool endpoint can answer with.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("unknown tool `{0}`")]
    UnknownTool(String),

    #[error("{0}")]
    BadQuery(String),

    #[error("daily usage limit reached, try again tomorrow")]
    RateLimited,

    #[error(transparent)]
    InvalidInput(#[from] ToolInputError),

    #[error("the tool failed to produce a result")]
    Completion(#[from] CompletionError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UnknownTool(_) => StatusCode::NOT_FOUND,
            ApiError::BadQuery(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ApiError::Completion(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // upstream detail stays in the log, the client gets the generic message
        if let ApiError::Completion(cause) = &self {
            error!(error = %cause, "Completion call failed");
        }

        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}
