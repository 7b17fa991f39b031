//! Passthrough mode (spec.md §4.5.3): the configured backend already speaks
//! the Anthropic Messages API, so the request/response are forwarded
//! verbatim. Grounded on the teacher's `chat_completions::chat` header
//! forwarding and byte-stream relay, minus any OpenAI-specific parsing.

use crate::server::{AppState, ProxyBody};
use bridge_core::MESSAGES_PATH;
use bytes::Bytes;
use gateway_common::config::Backend;
use gateway_common::{ProxyError, TraceRecord};
use http_body_util::combinators::BoxBody;
use http_body_util::{BodyExt, Full, StreamBody};
use hyper::body::Frame;
use hyper::header::{HeaderMap, AUTHORIZATION, CONTENT_LENGTH};
use hyper::Response;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;
use tracing::warn;

fn full(bytes: Vec<u8>) -> ProxyBody {
    Full::new(Bytes::from(bytes))
        .map_err(|never| match never {})
        .boxed()
}

pub async fn handle(
    body: Bytes,
    mut headers: HeaderMap,
    backend_config: &Backend,
    request_id: String,
    state: &Arc<AppState>,
) -> Response<ProxyBody> {
    let start = Instant::now();
    let url = format!("{}{}", backend_config.base_url, MESSAGES_PATH);

    headers.remove(CONTENT_LENGTH);
    headers.remove(AUTHORIZATION);
    if let Some(token) = backend_config.auth.resolve_token() {
        let header_name = backend_config.auth.header_name();
        let header_value = if header_name.eq_ignore_ascii_case("authorization") {
            format!("Bearer {token}")
        } else {
            token
        };
        if let (Ok(name), Ok(value)) = (
            hyper::header::HeaderName::from_bytes(header_name.as_bytes()),
            header_value.parse(),
        ) {
            headers.insert(name, value);
        }
    }

    let backend_response = match state
        .http_client
        .post(url)
        .headers(headers)
        .body(body)
        .send()
        .await
    {
        Ok(response) => response,
        Err(err) => return ProxyError::from(err).into_response(),
    };

    let status = backend_response.status();
    let response_headers = backend_response.headers().clone();

    let (tx, rx) = mpsc::channel::<Bytes>(16);
    tokio::spawn(async move {
        let mut byte_stream = backend_response.bytes_stream();
        let mut total_bytes: u64 = 0;
        while let Some(item) = byte_stream.next().await {
            let chunk = match item {
                Ok(chunk) => chunk,
                Err(err) => {
                    warn!("error relaying passthrough body: {err}");
                    break;
                }
            };
            total_bytes += chunk.len() as u64;
            if tx.send(chunk).await.is_err() {
                break;
            }
        }
    });

    state.trace.record(TraceRecord {
        request_id,
        mode: "passthrough",
        fingerprint: None,
        cache_hit: None,
        backend_elapsed_ms: Some(start.elapsed().as_millis() as u64),
        first_byte_ms: None,
        total_bytes: 0,
        stop_reason: None,
        recoverable_errors: Vec::new(),
        http_status: status.as_u16(),
    });

    let stream = ReceiverStream::new(rx).map(|chunk| Ok::<_, hyper::Error>(Frame::data(chunk)));
    let body = BoxBody::new(StreamBody::new(stream));

    let mut builder = Response::builder().status(status);
    if let Some(response_headers_mut) = builder.headers_mut() {
        for (name, value) in response_headers.iter() {
            response_headers_mut.insert(name, value.clone());
        }
    }

    builder.body(body).unwrap_or_else(|_| {
        let message = "failed to build passthrough response".to_string();
        Response::new(full(message.into_bytes()))
    })
}
