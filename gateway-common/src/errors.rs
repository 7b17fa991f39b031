//! The single error taxonomy the orchestrator converts to HTTP (spec.md §7).
//! Library code (`bridge-core`) never panics and never calls this directly;
//! it returns its own narrower error types, which the orchestrator maps
//! into one of these tags the moment it decides on a response status.

use bytes::Bytes;
use http_body_util::{combinators::BoxBody, BodyExt, Full};
use hyper::{Response, StatusCode};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("{0}")]
    InvalidRequest(String),

    #[error("{0}")]
    InvalidSchema(String),

    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("backend rejected the request: status={status}, body={body}")]
    BackendRejected { status: u16, body: String },

    #[error("stream watchdog fired: {0}")]
    StreamTimeout(String),

    #[error("backend violated the stream protocol: {0}")]
    StreamProtocol(String),

    #[error("client disconnected")]
    ClientCancelled,
}

impl ProxyError {
    /// The stable, machine-readable tag from spec.md §7.
    pub fn tag(&self) -> &'static str {
        match self {
            ProxyError::InvalidRequest(_) => "InvalidRequest",
            ProxyError::InvalidSchema(_) => "InvalidSchema",
            ProxyError::BackendUnavailable(_) => "BackendUnavailable",
            ProxyError::BackendRejected { .. } => "BackendRejected",
            ProxyError::StreamTimeout(_) => "StreamTimeout",
            ProxyError::StreamProtocol(_) => "StreamProtocol",
            ProxyError::ClientCancelled => "ClientCancelled",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            ProxyError::InvalidRequest(_) | ProxyError::InvalidSchema(_) => StatusCode::BAD_REQUEST,
            ProxyError::BackendUnavailable(_) | ProxyError::BackendRejected { .. } => {
                StatusCode::BAD_GATEWAY
            }
            ProxyError::StreamTimeout(_) | ProxyError::StreamProtocol(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            // 499 (nginx's "client closed request") rather than a 4xx that
            // implies the request itself was bad; nothing is ever sent to
            // the client under this status since the stream's 200 status
            // line is already committed by the time this fires.
            ProxyError::ClientCancelled => StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST),
        }
    }

    /// The numeric status this tag maps to, for callers (like the stream
    /// pipeline's trace bookkeeping) that need the code without going
    /// through `into_response`'s body construction.
    pub fn status_code(&self) -> u16 {
        self.status().as_u16()
    }

    /// Renders `{type:"error", error:{type, message}}` at the HTTP status
    /// this tag maps to. Only valid to call while the response status line
    /// is still uncommitted — after `message_start` has been written, a
    /// `ProxyError` is recorded on the trace sink instead (spec.md §7).
    pub fn into_response(self) -> Response<BoxBody<Bytes, hyper::Error>> {
        let status = self.status();
        let body = json!({
            "type": "error",
            "error": {
                "type": self.tag(),
                "message": self.to_string(),
            }
        });
        let full_body = Full::new(Bytes::from(body.to_string()))
            .map_err(|never| match never {})
            .boxed();
        Response::builder()
            .status(status)
            .header("content-type", "application/json")
            .body(full_body)
            .unwrap_or_else(|_| {
                Response::new(
                    Full::new(Bytes::from("internal error"))
                        .map_err(|never| match never {})
                        .boxed(),
                )
            })
    }
}

impl From<bridge_core::TranslateError> for ProxyError {
    fn from(err: bridge_core::TranslateError) -> Self {
        match err.tag() {
            "InvalidSchema" => ProxyError::InvalidSchema(err.to_string()),
            _ => ProxyError::InvalidRequest(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ProxyError {
    fn from(err: serde_json::Error) -> Self {
        ProxyError::InvalidRequest(err.to_string())
    }
}

impl From<reqwest::Error> for ProxyError {
    fn from(err: reqwest::Error) -> Self {
        ProxyError::BackendUnavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt as _;
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn invalid_request_maps_to_400_with_stable_tag() {
        let err = ProxyError::InvalidRequest("max_tokens is required".to_string());
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["type"], "error");
        assert_eq!(value["error"]["type"], "InvalidRequest");
        assert_eq!(value["error"]["message"], "max_tokens is required");
    }

    #[tokio::test]
    async fn backend_rejected_maps_to_502() {
        let err = ProxyError::BackendRejected {
            status: 500,
            body: "boom".to_string(),
        };
        let response = err.into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
