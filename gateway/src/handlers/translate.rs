//! Translate-mode request handling (spec.md §4.5.1, §4.5.2): fingerprint
//! the request for cache attribution, translate it to OpenAI shape, call
//! the backend, and either translate the complete response or drive the
//! streaming pipeline through [`bridge_core::stream`].

use crate::backend;
use crate::server::{AppState, ProxyBody};
use crate::sse_writer::SseWriter;
use bridge_core::apis::anthropic::MessagesUsage;
use bridge_core::fingerprint::fingerprint;
use bridge_core::request_translate::translate_request;
use bridge_core::response_translate::{translate_response, CacheOutcome};
use bridge_core::stream::event::{BackendEvent, TranslatorInput, Watchdog};
use bridge_core::stream::openai_adapter::OpenAiStreamAdapter;
use bridge_core::stream::translator::StreamTranslator;
use bridge_core::MessagesRequest;
use bytes::Bytes;
use gateway_common::config::Backend;
use gateway_common::{ProxyError, TraceRecord};
use http_body_util::{BodyExt, Full};
use hyper::Response;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::warn;

/// A rough token estimate for cache bookkeeping: one token per four
/// characters of the canonicalized (system, tools) content. Accurate
/// tokenization belongs to the backend; this proxy only needs a stable
/// number to echo back as `cache_read_input_tokens` on a hit.
fn estimate_tokens(req: &MessagesRequest) -> u32 {
    let system_len = req
        .system
        .as_ref()
        .map(|s| s.flatten_to_string().len())
        .unwrap_or(0);
    let tools_len = req
        .tools
        .as_ref()
        .map(|tools| tools.iter().map(|t| t.input_schema.to_string().len()).sum())
        .unwrap_or(0);
    ((system_len + tools_len) / 4) as u32
}

fn error_response(err: ProxyError) -> Response<ProxyBody> {
    err.into_response()
}

pub async fn handle(
    request: MessagesRequest,
    backend_config: &Backend,
    request_id: String,
    state: &Arc<AppState>,
) -> Response<ProxyBody> {
    let start = Instant::now();
    let fp = fingerprint(request.system.as_ref(), request.tools.as_deref());
    let cache_access = state.cache.record_access(&fp, estimate_tokens(&request));
    let cache_outcome = if cache_access.hit {
        CacheOutcome::Hit {
            cached_tokens: cache_access.tokens,
        }
    } else {
        CacheOutcome::Miss {
            estimated_tokens: cache_access.tokens,
        }
    };

    let is_streaming = request.is_streaming();
    let caps = backend_config.capabilities.clone();
    let model = request.model.clone();

    let translated = match translate_request(request, &caps) {
        Ok(translated) => translated,
        Err(err) => return error_response(ProxyError::from(err)),
    };

    let body_json = match serde_json::to_value(&translated.openai_request) {
        Ok(value) => value,
        Err(err) => return error_response(ProxyError::from(err)),
    };

    let response = match backend::send(&state.http_client, backend_config, body_json).await {
        Ok(response) => response,
        Err(err) => return error_response(err),
    };

    if is_streaming {
        handle_streaming(response, cache_outcome, caps, model, request_id, start, state).await
    } else {
        handle_non_streaming(response, cache_outcome, &fp, request_id, start, state).await
    }
}

async fn handle_non_streaming(
    response: reqwest::Response,
    cache_outcome: CacheOutcome,
    fingerprint_value: &bridge_core::fingerprint::Fingerprint,
    request_id: String,
    start: Instant,
    state: &Arc<AppState>,
) -> Response<ProxyBody> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return error_response(ProxyError::BackendRejected {
            status: status.as_u16(),
            body,
        });
    }

    let openai_response = match response.json().await {
        Ok(value) => value,
        Err(err) => return error_response(ProxyError::from(err)),
    };

    let messages_response = translate_response(openai_response, cache_outcome, fingerprint_value);
    let stop_reason = format!("{:?}", messages_response.stop_reason);
    let body = match serde_json::to_vec(&messages_response) {
        Ok(bytes) => bytes,
        Err(err) => return error_response(ProxyError::from(err)),
    };

    state.trace.record(TraceRecord {
        request_id,
        mode: "translate",
        fingerprint: Some(fingerprint_value.clone()),
        cache_hit: Some(matches!(cache_outcome, CacheOutcome::Hit { .. })),
        backend_elapsed_ms: Some(start.elapsed().as_millis() as u64),
        first_byte_ms: None,
        total_bytes: body.len() as u64,
        stop_reason: Some(stop_reason),
        recoverable_errors: Vec::new(),
        http_status: 200,
    });

    Response::builder()
        .status(200)
        .header("content-type", "application/json")
        .body(
            Full::new(Bytes::from(body))
                .map_err(|never| match never {})
                .boxed(),
        )
        .unwrap_or_else(|_| ProxyError::InvalidRequest("failed to build response".to_string()).into_response())
}

async fn handle_streaming(
    response: reqwest::Response,
    cache_outcome: CacheOutcome,
    caps: bridge_core::Capabilities,
    model: String,
    request_id: String,
    start: Instant,
    state: &Arc<AppState>,
) -> Response<ProxyBody> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return error_response(ProxyError::BackendRejected {
            status: status.as_u16(),
            body,
        });
    }

    let (writer, http_response) = SseWriter::new_response();
    let state = Arc::clone(state);

    tokio::spawn(async move {
        run_stream_pipeline(response, writer, cache_outcome, caps, model, request_id, start, state).await;
    });

    http_response
}

async fn run_stream_pipeline(
    response: reqwest::Response,
    writer: SseWriter,
    cache_outcome: CacheOutcome,
    caps: bridge_core::Capabilities,
    model: String,
    request_id: String,
    start: Instant,
    state: Arc<AppState>,
) {
    let message_id = format!("msg_{}", uuid::Uuid::new_v4());
    let (cache_creation_input_tokens, cache_read_input_tokens) = match cache_outcome {
        CacheOutcome::Miss { estimated_tokens } => (Some(estimated_tokens), None),
        CacheOutcome::Hit { cached_tokens } => (None, Some(cached_tokens)),
    };
    let initial_usage = MessagesUsage {
        input_tokens: 0,
        output_tokens: 0,
        cache_creation_input_tokens,
        cache_read_input_tokens,
    };

    let (mut translator, start_event) = StreamTranslator::start(message_id, model, initial_usage);
    let mut total_bytes: u64 = start_event.to_sse_frame().len() as u64;
    let mut first_byte_ms: Option<u64> = None;
    let mut last_status = 200;
    let mut client_cancelled = false;

    if !writer.send_frame(start_event.to_sse_frame()).await {
        client_cancelled = true;
        last_status = ProxyError::ClientCancelled.status_code();
        state.trace.record(TraceRecord {
            request_id,
            mode: "translate",
            fingerprint: None,
            cache_hit: None,
            backend_elapsed_ms: Some(start.elapsed().as_millis() as u64),
            first_byte_ms,
            total_bytes,
            stop_reason: None,
            recoverable_errors: vec![ProxyError::ClientCancelled.tag().to_string()],
            http_status: last_status,
        });
        return;
    }

    let mut adapter = OpenAiStreamAdapter::new();
    let mut rx = backend::stream_body_chunks(response);
    let mut first_chunk_received = false;

    let inactivity_timeout = Duration::from_millis(caps.inactivity_timeout_ms);
    let terminal_timeout = Duration::from_millis(caps.terminal_timeout_ms);
    let keepalive_interval = Duration::from_millis(caps.keepalive_interval_ms);

    let terminal_deadline = tokio::time::sleep(terminal_timeout);
    tokio::pin!(terminal_deadline);
    let inactivity_sleep = tokio::time::sleep(inactivity_timeout);
    tokio::pin!(inactivity_sleep);
    let mut keepalive_ticker = tokio::time::interval(keepalive_interval);
    keepalive_ticker.tick().await;

    'stream_loop: loop {
        if translator.is_stopped() {
            break;
        }

        tokio::select! {
            maybe_chunk = rx.recv() => {
                let events = match maybe_chunk {
                    Some(Ok(chunk)) => {
                        if !first_chunk_received {
                            first_chunk_received = true;
                            first_byte_ms = Some(start.elapsed().as_millis() as u64);
                        }
                        inactivity_sleep.as_mut().reset(tokio::time::Instant::now() + inactivity_timeout);
                        adapter.feed(&chunk)
                    }
                    Some(Err(err)) => {
                        warn!("backend stream read failed: {err}");
                        vec![BackendEvent::Error {
                            kind: "backend_io".to_string(),
                            message: err.to_string(),
                        }]
                    }
                    None => vec![BackendEvent::EndOfStream],
                };

                for backend_event in events {
                    let out = translator.handle(TranslatorInput::Backend(backend_event));
                    for event in out {
                        let frame = event.to_sse_frame();
                        total_bytes += frame.len() as u64;
                        if !writer.send_frame(frame).await {
                            client_cancelled = true;
                            last_status = ProxyError::ClientCancelled.status_code();
                            break 'stream_loop;
                        }
                    }
                }
            }
            _ = keepalive_ticker.tick(), if !first_chunk_received => {
                if !writer.send_keepalive().await {
                    client_cancelled = true;
                    last_status = ProxyError::ClientCancelled.status_code();
                    break 'stream_loop;
                }
            }
            _ = &mut inactivity_sleep => {
                let out = translator.handle(TranslatorInput::Watchdog(Watchdog::Inactivity));
                for event in out {
                    let frame = event.to_sse_frame();
                    total_bytes += frame.len() as u64;
                    if !writer.send_frame(frame).await {
                        client_cancelled = true;
                        last_status = ProxyError::ClientCancelled.status_code();
                        break 'stream_loop;
                    }
                }
            }
            _ = &mut terminal_deadline => {
                let out = translator.handle(TranslatorInput::Watchdog(Watchdog::Terminal));
                for event in out {
                    let frame = event.to_sse_frame();
                    total_bytes += frame.len() as u64;
                    if !writer.send_frame(frame).await {
                        client_cancelled = true;
                        last_status = ProxyError::ClientCancelled.status_code();
                        break 'stream_loop;
                    }
                }
                break 'stream_loop;
            }
        }
    }

    writer.close();

    let mut recoverable_errors: Vec<String> = translator
        .diagnostics()
        .iter()
        .map(|d| format!("{}: {}", d.kind, d.message))
        .collect();
    if client_cancelled {
        recoverable_errors.push(ProxyError::ClientCancelled.tag().to_string());
    }

    state.trace.record(TraceRecord {
        request_id,
        mode: "translate",
        fingerprint: None,
        cache_hit: None,
        backend_elapsed_ms: Some(start.elapsed().as_millis() as u64),
        first_byte_ms,
        total_bytes,
        stop_reason: None,
        recoverable_errors,
        http_status: last_status,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_core::MessagesRequest;
    use gateway_common::clock::SystemClock;
    use gateway_common::config::{BackendAuth, BackendKind};
    use gateway_common::{NullSink, PromptCache};
    use http_body_util::BodyExt as _;

    fn test_state() -> Arc<AppState> {
        Arc::new(AppState {
            config: gateway_common::ProxyConfig {
                bind_address: None,
                backends: Vec::new(),
                trace: Default::default(),
                cache: Default::default(),
            },
            cache: Arc::new(PromptCache::new(300_000, 1000, Arc::new(SystemClock))),
            trace: Arc::new(NullSink),
            http_client: reqwest::Client::new(),
        })
    }

    fn sample_request(stream: bool) -> MessagesRequest {
        MessagesRequest {
            model: "gpt-4o".to_string(),
            messages: vec![bridge_core::apis::anthropic::MessagesMessage {
                role: bridge_core::apis::anthropic::MessagesRole::User,
                content: bridge_core::apis::anthropic::MessagesMessageContent::Single("hi".to_string()),
            }],
            max_tokens: 100,
            system: None,
            metadata: None,
            temperature: None,
            top_p: None,
            top_k: None,
            stream: Some(stream),
            stop_sequences: None,
            tools: None,
            tool_choice: None,
        }
    }

    #[tokio::test]
    async fn non_streaming_request_is_translated_through_a_mock_backend() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id":"cmpl-1","model":"gpt-4o","choices":[{"index":0,"message":{"role":"assistant","content":"hello back","tool_calls":null,"name":null,"tool_call_id":null},"finish_reason":"stop"}],"usage":{"prompt_tokens":1,"completion_tokens":2,"total_tokens":3}}"#,
            )
            .create_async()
            .await;

        let backend = Backend {
            id: "mock".to_string(),
            base_url: server.url(),
            kind: BackendKind::OpenAiCompatible,
            auth: BackendAuth::default(),
            capabilities: bridge_core::Capabilities::default(),
        };

        let state = test_state();
        let response = handle(sample_request(false), &backend, "req-1".to_string(), &state).await;

        mock.assert_async().await;
        assert_eq!(response.status(), 200);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(value["content"][0]["text"], "hello back");
        assert_eq!(value["stop_reason"], "end_turn");
    }

    #[tokio::test]
    async fn missing_max_tokens_is_rejected_with_the_literal_spec_body() {
        let backend = Backend {
            id: "mock".to_string(),
            base_url: "http://unused.invalid".to_string(),
            kind: BackendKind::OpenAiCompatible,
            auth: BackendAuth::default(),
            capabilities: bridge_core::Capabilities::default(),
        };

        let mut request = sample_request(false);
        request.max_tokens = 0;

        let state = test_state();
        let response = handle(request, &backend, "req-0".to_string(), &state).await;

        assert_eq!(response.status(), 400);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "type": "error",
                "error": {
                    "type": "InvalidRequest",
                    "message": "max_tokens is required",
                }
            })
        );
    }

    #[tokio::test]
    async fn backend_rejection_maps_to_bad_gateway() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(500)
            .with_body("boom")
            .create_async()
            .await;

        let backend = Backend {
            id: "mock".to_string(),
            base_url: server.url(),
            kind: BackendKind::OpenAiCompatible,
            auth: BackendAuth::default(),
            capabilities: bridge_core::Capabilities::default(),
        };

        let state = test_state();
        let response = handle(sample_request(false), &backend, "req-2".to_string(), &state).await;

        mock.assert_async().await;
        assert_eq!(response.status(), 502);
    }

    #[tokio::test]
    async fn streaming_request_translates_sse_frames_from_mock_backend() {
        let mut server = mockito::Server::new_async().await;
        let sse_body = "data: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"},\"finish_reason\":null}],\"usage\":null}\n\ndata: {\"id\":\"c1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":1,\"total_tokens\":2}}\n\ndata: [DONE]\n\n";
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body(sse_body)
            .create_async()
            .await;

        let backend = Backend {
            id: "mock".to_string(),
            base_url: server.url(),
            kind: BackendKind::OpenAiCompatible,
            auth: BackendAuth::default(),
            capabilities: bridge_core::Capabilities::default(),
        };

        let state = test_state();
        let response = handle(sample_request(true), &backend, "req-3".to_string(), &state).await;
        assert_eq!(response.status(), 200);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        mock.assert_async().await;

        assert!(text.contains("event: message_start"));
        assert!(text.contains("event: message_stop"));
        assert!(text.contains("hi"));

        let message_start_line = text
            .lines()
            .find(|line| line.starts_with("data:") && line.contains("message_start"))
            .expect("message_start data line");
        let payload: serde_json::Value =
            serde_json::from_str(message_start_line.trim_start_matches("data:").trim()).unwrap();
        assert!(
            payload["message"]["usage"]["cache_creation_input_tokens"].is_number(),
            "a cache miss must echo the estimated token figure as cache_creation_input_tokens"
        );
        assert!(payload["message"]["usage"]["cache_read_input_tokens"].is_null());
    }

    #[derive(Default)]
    struct CapturingSink {
        records: std::sync::Mutex<Vec<gateway_common::TraceRecord>>,
        notify: tokio::sync::Notify,
    }

    impl gateway_common::TraceSink for CapturingSink {
        fn record(&self, record: gateway_common::TraceRecord) {
            self.records.lock().expect("capturing sink lock poisoned").push(record);
            self.notify.notify_one();
        }
    }

    #[tokio::test]
    async fn client_disconnect_before_first_frame_is_recorded_as_client_cancelled() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_header("content-type", "text/event-stream")
            .with_body("data: [DONE]\n\n")
            .create_async()
            .await;

        let backend = Backend {
            id: "mock".to_string(),
            base_url: server.url(),
            kind: BackendKind::OpenAiCompatible,
            auth: BackendAuth::default(),
            capabilities: bridge_core::Capabilities::default(),
        };

        let sink = Arc::new(CapturingSink::default());
        let state = Arc::new(AppState {
            config: gateway_common::ProxyConfig {
                bind_address: None,
                backends: Vec::new(),
                trace: Default::default(),
                cache: Default::default(),
            },
            cache: Arc::new(PromptCache::new(300_000, 1000, Arc::new(SystemClock))),
            trace: Arc::clone(&sink) as Arc<dyn gateway_common::TraceSink>,
            http_client: reqwest::Client::new(),
        });

        let response = handle(sample_request(true), &backend, "req-4".to_string(), &state).await;
        // Drop the body (and its mpsc receiver) without ever reading it,
        // simulating a client that disconnects before the first frame.
        drop(response);

        tokio::time::timeout(std::time::Duration::from_secs(5), sink.notify.notified())
            .await
            .expect("trace record was never written");

        let records = sink.records.lock().unwrap();
        let record = records.first().expect("one trace record");
        assert_eq!(record.http_status, 499);
        assert!(record.recoverable_errors.contains(&"ClientCancelled".to_string()));
        mock.assert_async().await;
    }
}
