use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use raven_rush_types::api::ErrorResponse;
use thiserror::Error;

use crate::store::StorageError;

/// Failures surfaced by the quest services.
#[derive(Debug, Error)]
pub enum QuestError {
    /// Missing or malformed address, action, referral code, or body.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Check-in attempted before the cooldown elapsed.
    #[error("check-in cooldown active ({remaining_ms}ms remaining)")]
    CooldownActive { remaining_ms: u64 },

    /// Referral lookup for an unregistered address.
    #[error("referral not found")]
    NotFound,

    /// Backing store unreadable or unwritable.
    #[error("storage failure: {0}")]
    Storage(#[from] StorageError),
}

/// Response extension set on cooldown rejections so the request middleware
/// does not count them as rate-limit rejections.
#[derive(Clone, Copy, Debug)]
pub(crate) struct CooldownRejection;

impl QuestError {
    pub fn status(&self) -> StatusCode {
        match self {
            QuestError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            QuestError::CooldownActive { .. } => StatusCode::TOO_MANY_REQUESTS,
            QuestError::NotFound => StatusCode::NOT_FOUND,
            QuestError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for QuestError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            QuestError::InvalidInput(message) => ErrorResponse {
                error: message.clone(),
                retry_after_ms: None,
            },
            QuestError::CooldownActive { remaining_ms } => ErrorResponse {
                error: "Check-in cooldown active".to_string(),
                retry_after_ms: Some(*remaining_ms),
            },
            QuestError::NotFound => ErrorResponse {
                error: "referral not found".to_string(),
                retry_after_ms: None,
            },
            QuestError::Storage(err) => {
                tracing::error!(%err, "record store failure");
                ErrorResponse {
                    error: "storage unavailable".to_string(),
                    retry_after_ms: None,
                }
            }
        };

        let mut response = (status, Json(body)).into_response();
        if let QuestError::CooldownActive { remaining_ms } = self {
            response.extensions_mut().insert(CooldownRejection);
            let seconds = remaining_ms.div_ceil(1000).max(1);
            if let Ok(value) = HeaderValue::from_str(&seconds.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}
