use crate::feed::FeedError;
use crate::pages::PageError;
use crate::store::StoreError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// 接口错误，前端据此显示自动消失的错误横幅
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    pub dismiss_after_ms: u64,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>, dismiss_after_ms: u64) -> Self {
        Self {
            status,
            message: message.into(),
            dismiss_after_ms,
        }
    }

    pub fn from_page(err: PageError, dismiss_after_ms: u64) -> Self {
        match err {
            PageError::Upstream(e) => Self::new(StatusCode::BAD_GATEWAY, e.to_string(), dismiss_after_ms),
        }
    }

    pub fn from_feed(err: FeedError, dismiss_after_ms: u64) -> Self {
        let status = match &err {
            FeedError::Busy => StatusCode::CONFLICT,
            FeedError::Exhausted | FeedError::Discarded => StatusCode::GONE,
            FeedError::Upstream(_) => StatusCode::BAD_GATEWAY,
        };
        Self::new(status, err.to_string(), dismiss_after_ms)
    }

    pub fn from_store(err: StoreError, dismiss_after_ms: u64) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, err.to_string(), dismiss_after_ms)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({
                "error": self.message,
                "dismiss_after_ms": self.dismiss_after_ms,
            })),
        )
            .into_response()
    }
}
