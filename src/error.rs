// src/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Mongo(#[from] mongodb::error::Error),

    #[error("bson encode error: {0}")]
    BsonEncode(#[from] mongodb::bson::ser::Error),

    #[error("bson decode error: {0}")]
    BsonDecode(#[from] mongodb::bson::de::Error),

    #[error("search error: {0}")]
    Search(#[from] meilisearch_sdk::errors::Error),

    #[error("http client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("{0} not found")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("cannot {event} a certificate that is {from}")]
    InvalidTransition { from: String, event: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error("upstream service error: {0}")]
    Upstream(String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Error::NotFound(what.into())
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        Error::InvalidInput(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Error::Conflict(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Unauthorized(_) | Error::Jwt(_) => StatusCode::UNAUTHORIZED,
            Error::Forbidden(_) => StatusCode::FORBIDDEN,
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Conflict(_) | Error::InvalidTransition { .. } => StatusCode::CONFLICT,
            Error::Upstream(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn category(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::Unauthorized(_) | Error::Jwt(_) => "authentication",
            Error::Forbidden(_) => "authorization",
            Error::InvalidInput(_) => "validation",
            Error::Conflict(_) => "conflict",
            Error::InvalidTransition { .. } => "invalid_transition",
            Error::Upstream(_) => "upstream",
            _ => "internal",
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            tracing::error!(error = %self, "request failed");
            "internal server error".to_string()
        } else {
            // token details stay in the logs
            if let Error::Jwt(e) = &self {
                tracing::debug!(error = %e, "rejected session token");
                "invalid session token".to_string()
            } else {
                self.to_string()
            }
        };

        let body = json!({
            "error": {
                "category": self.category(),
                "message": message,
            }
        });

        (status, Json(body)).into_response()
    }
}
