use crate::store::StoreError;
use crate::upstream::DispatchError;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde_json::json;
use shared::http::{make_error_response, make_json_response};
use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T, E = GatewayError> = std::result::Result<T, E>;

/// Errors that can occur while handling a gateway request
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("{0}")]
    Validation(String),

    #[error("Request body exceeds {0} bytes")]
    PayloadTooLarge(usize),

    #[error("Failed to read request body: {0}")]
    RequestBodyError(String),

    #[error("A matching workout record already exists")]
    Conflict,

    #[error("Not found")]
    NotFound,

    #[error(transparent)]
    Upstream(#[from] DispatchError),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Upstream client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for GatewayError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => GatewayError::Conflict,
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(e: serde_json::Error) -> Self {
        GatewayError::InternalError(format!("Response serialization error: {e}"))
    }
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::Validation(_) | GatewayError::RequestBodyError(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            GatewayError::Conflict => StatusCode::CONFLICT,
            GatewayError::NotFound => StatusCode::NOT_FOUND,
            GatewayError::Upstream(e) => e.status(),
            GatewayError::HttpClient(_) => StatusCode::BAD_GATEWAY,
            GatewayError::InternalError(_) | GatewayError::Io(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Renders the error as a `{success: false, error}` JSON envelope.
    pub fn into_response(self) -> Response<Bytes> {
        let status = self.status();
        let body = match &self {
            GatewayError::Upstream(DispatchError::Unreachable { tried, .. }) => json!({
                "success": false,
                "error": "Could not reach the upstream API",
                "status": status.as_u16(),
                "tried": tried,
            }),
            GatewayError::Upstream(e) => json!({
                "success": false,
                "error": "Upstream not found/failed",
                "status": status.as_u16(),
                "tried": e.tried(),
            }),
            GatewayError::InternalError(_) | GatewayError::Io(_) => json!({
                "success": false,
                "error": "Internal server error",
            }),
            GatewayError::HttpClient(_) => json!({
                "success": false,
                "error": "Could not reach the upstream API",
            }),
            other => json!({
                "success": false,
                "error": other.to_string(),
            }),
        };

        make_json_response(status, &body).unwrap_or_else(|_| make_error_response(status))
    }
}
