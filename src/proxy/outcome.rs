//! Fixed set of results a pool-set reports for each request.

use std::fmt;

use axum::body::Body;
use axum::http::{header, Response, StatusCode};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Outcome {
    Success,
    InternalError,
    ClientError,
    ServerError,
    ShortCircuited,
}

impl Outcome {
    /// Every non-success result, as reported to the resilience and metrics layers.
    pub const RESULTS: [&'static str; 4] = ["internalError", "clientError", "serverError", "shortCircuited"];

    /// The result tag; empty for success.
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "",
            Outcome::InternalError => "internalError",
            Outcome::ClientError => "clientError",
            Outcome::ServerError => "serverError",
            Outcome::ShortCircuited => "shortCircuited",
        }
    }

    /// Classify an upstream status code.
    pub fn from_status(status: StatusCode) -> Self {
        if status.is_server_error() {
            Outcome::ServerError
        } else if status.is_client_error() {
            Outcome::ClientError
        } else {
            Outcome::Success
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Success => f.write_str("success"),
            other => f.write_str(other.as_str()),
        }
    }
}

/// Plain-text response generated by the proxy itself.
pub fn error_response(status: StatusCode, message: &str) -> Response<Body> {
    let mut response = Response::new(Body::from(message.to_string()));
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(header::CONTENT_TYPE, header::HeaderValue::from_static("text/plain; charset=utf-8"));
    response
}
