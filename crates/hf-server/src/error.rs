//! Error-to-HTTP response conversion.
//!
//! Route handlers return `Result<T, AppError>`; `?` on an
//! [`hf_core::Error`] converts automatically.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::middleware::request_id::RequestId;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: hf_core::Error,
    request_id: Option<String>,
}

impl AppError {
    pub fn new(inner: hf_core::Error) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn with_request_id(mut self, id: String) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn inner(&self) -> &hf_core::Error {
        &self.inner
    }
}

impl From<hf_core::Error> for AppError {
    fn from(e: hf_core::Error) -> Self {
        Self::new(e)
    }
}

/// Attach the request id to a handler's error.
pub trait WithRequestId<T> {
    fn tag(self, request_id: &RequestId) -> Result<T, AppError>;
}

impl<T> WithRequestId<T> for hf_core::Result<T> {
    fn tag(self, request_id: &RequestId) -> Result<T, AppError> {
        self.map_err(|e| AppError::new(e).with_request_id(request_id.0.clone()))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = %self.inner,
                request_id = self.request_id.as_deref().unwrap_or("-"),
                "Server error in API handler"
            );
        } else {
            tracing::debug!(status = %status, error = %self.inner, "Request rejected");
        }

        let body = json!({
            "error": self.inner.to_string(),
            "code": self.inner.code(),
            "request_id": self.request_id,
        });

        (status, axum::Json(body)).into_response()
    }
}
