use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{search::SearchError, store::StoreError, webhook::WebhookError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("This username is already taken")]
    UsernameTaken,

    #[error("Invalid signature")]
    InvalidSignature(#[from] WebhookError),

    #[error("Missing webhook secret")]
    MissingSecret,

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Search error: {0}")]
    Search(#[from] SearchError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::UsernameTaken => StatusCode::BAD_REQUEST,
            AppError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            AppError::MissingSecret => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Store(_) | AppError::Search(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        // backend details stay in the logs
        let message = match self {
            AppError::Store(_) | AppError::Search(_) => {
                error!("{self}");
                "Internal error".to_string()
            }
            _ => self.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
