use crate::error::ServiceError;
use axum::{
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

pub const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

/// Seconds a client should wait before retrying a busy zone
const RETRY_AFTER_SECS: &str = "1";

/// RFC 7807 error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub problem_type: String,
    pub title: String,
    pub status: u16,
    pub detail: String,
    pub instance: String,
}

impl ProblemDetails {
    pub fn from_error(err: &ServiceError, instance: &str) -> Self {
        Self {
            problem_type: format!("urn:zonekeeper:problem:{}", err.kind()),
            title: err.title().to_string(),
            status: err.status_code(),
            detail: err.to_string(),
            instance: instance.to_string(),
        }
    }

    /// Problem for a path no route handles
    pub fn unmapped(path: &str) -> Self {
        Self::from_error(
            &ServiceError::NotFound(format!(
                "URI {} cannot be mapped to a valid resource.",
                path
            )),
            path,
        )
    }
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = serde_json::to_string(&self).unwrap_or_default();

        let mut response = (status, body).into_response();
        let headers = response.headers_mut();
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(PROBLEM_CONTENT_TYPE),
        );
        if status == StatusCode::SERVICE_UNAVAILABLE {
            headers.insert(header::RETRY_AFTER, HeaderValue::from_static(RETRY_AFTER_SECS));
        }
        response
    }
}
