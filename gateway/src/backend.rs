//! Backend HTTP calls: builds the outbound request (auth header, base URL),
//! and wraps a streaming `reqwest::Response` as a byte-chunk source the
//! stream pipeline feeds into [`bridge_core::stream::openai_adapter::OpenAiStreamAdapter`].
//! Grounded on the teacher's `handlers::chat_completions::chat` backend
//! call and its `bytes_stream()` forwarding loop.

use bridge_core::CHAT_COMPLETIONS_PATH;
use futures_util::StreamExt;
use gateway_common::config::Backend;
use gateway_common::ProxyError;
use reqwest::Client;
use tokio::sync::mpsc;

/// Issues the backend call. `body` is the already-serialized OpenAI
/// request. Returns the raw `reqwest::Response` so the caller can branch
/// on streaming vs non-streaming without buffering twice.
pub async fn send(
    client: &Client,
    backend: &Backend,
    body: serde_json::Value,
) -> Result<reqwest::Response, ProxyError> {
    let url = format!("{}{}", backend.base_url, CHAT_COMPLETIONS_PATH);
    let mut request = client.post(url).json(&body);

    if let Some(token) = backend.auth.resolve_token() {
        let header_value = if backend.auth.header_name().eq_ignore_ascii_case("authorization") {
            format!("Bearer {token}")
        } else {
            token
        };
        request = request.header(backend.auth.header_name(), header_value);
    }

    let response = request.send().await?;
    Ok(response)
}

/// Spawns a task that forwards `response`'s byte stream onto a bounded
/// channel, the same shape as the teacher's `tx.send(item)` forwarding
/// loop. The channel applies backpressure against the backend connection:
/// a slow client (a full channel) stalls this task's next `recv`, which in
/// turn stalls reading more bytes off the TCP connection to the backend.
pub fn stream_body_chunks(response: reqwest::Response) -> mpsc::Receiver<Result<bytes::Bytes, reqwest::Error>> {
    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(async move {
        let mut byte_stream = response.bytes_stream();
        while let Some(item) = byte_stream.next().await {
            let is_err = item.is_err();
            if tx.send(item).await.is_err() {
                break;
            }
            if is_err {
                break;
            }
        }
    });
    rx
}
