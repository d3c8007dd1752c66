use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::Value;

/// Envelope for every successful JSON body.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: ApiErrorBody,
}

pub fn ok<T: Serialize>(data: T) -> Response {
    with_status(StatusCode::OK, Some(data), None)
}

pub fn success<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    with_status(StatusCode::OK, Some(data), Some(message.into()))
}

/// 202 for requests whose outcome arrives later, e.g. a submitted wizard.
pub fn accepted<T: Serialize>(data: T, message: impl Into<String>) -> Response {
    with_status(StatusCode::ACCEPTED, Some(data), Some(message.into()))
}

pub fn empty_success(message: impl Into<String>) -> Response {
    with_status::<()>(StatusCode::OK, None, Some(message.into()))
}

fn with_status<T: Serialize>(status: StatusCode, data: Option<T>, message: Option<String>) -> Response {
    let body = ApiResponse {
        success: true,
        data,
        message,
    };
    (status, Json(body)).into_response()
}

pub fn error(
    code: &str,
    message: impl Into<String>,
    details: Option<Value>,
    status: StatusCode,
) -> Response {
    let body = ApiErrorResponse {
        success: false,
        error: ApiErrorBody {
            code: code.to_string(),
            message: message.into(),
            details,
        },
    };

    (status, Json(body)).into_response()
}
