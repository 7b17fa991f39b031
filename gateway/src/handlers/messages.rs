//! `POST /v1/messages` entry point: parses the request, selects the
//! configured backend, and dispatches to translate or passthrough mode
//! (spec.md §4.5.1).

use crate::handlers::{passthrough, translate};
use crate::server::{AppState, ProxyBody};
use bridge_core::MessagesRequest;
use gateway_common::config::BackendKind;
use gateway_common::ProxyError;
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::{Request, Response};
use std::sync::Arc;
use uuid::Uuid;

pub async fn handle(
    request: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<ProxyBody>, hyper::Error> {
    let request_id = Uuid::new_v4().to_string();
    let headers = request.headers().clone();
    let body_bytes = match request.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => return Ok(ProxyError::InvalidRequest(err.to_string()).into_response()),
    };

    let Some(backend) = state.config.default_backend().cloned() else {
        return Ok(ProxyError::BackendUnavailable("no backend configured".to_string()).into_response());
    };

    match backend.kind {
        BackendKind::OpenAiCompatible => {
            let messages_request: MessagesRequest = match MessagesRequest::try_from(&body_bytes[..]) {
                Ok(req) => req,
                Err(err) => return Ok(ProxyError::from(err).into_response()),
            };
            Ok(translate::handle(messages_request, &backend, request_id, &state).await)
        }
        BackendKind::AnthropicCompatible => {
            Ok(passthrough::handle(body_bytes, headers, &backend, request_id, &state).await)
        }
    }
}
