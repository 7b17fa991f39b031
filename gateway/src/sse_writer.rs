//! Generic SSE response writer: builds the channel-backed streaming body
//! the teacher's `chat_completions::chat` handler uses (bounded
//! `mpsc::channel` + `ReceiverStream` + `StreamBody`), and adds the
//! keep-alive and drain-before-close behavior C5 owns (spec.md §4.5.2,
//! §4.5.3).

use bytes::Bytes;
use http_body_util::combinators::BoxBody;
use http_body_util::StreamBody;
use hyper::body::Frame;
use hyper::Response;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::StreamExt;

const CHANNEL_CAPACITY: usize = 32;

pub struct SseWriter {
    tx: mpsc::Sender<Bytes>,
}

impl SseWriter {
    /// Builds the `200 text/event-stream` response and the handle used to
    /// push frames into it. The response can be returned to the client
    /// immediately; frames pushed afterward are written as they arrive,
    /// subject to the channel's bounded capacity (the orchestrator's
    /// backpressure mechanism — a full channel makes `send` await, which
    /// is exactly "await readiness before the next write").
    pub fn new_response() -> (Self, Response<BoxBody<Bytes, hyper::Error>>) {
        let (tx, rx) = mpsc::channel::<Bytes>(CHANNEL_CAPACITY);
        let stream = ReceiverStream::new(rx).map(|chunk| Ok::<_, hyper::Error>(Frame::data(chunk)));
        let body = BoxBody::new(StreamBody::new(stream));
        let response = Response::builder()
            .status(200)
            .header("content-type", "text/event-stream")
            .header("cache-control", "no-cache")
            .body(body)
            .expect("building an SSE response from static headers cannot fail");
        (Self { tx }, response)
    }

    /// Pushes one already-rendered SSE frame (e.g. from
    /// `MessagesStreamEvent::to_sse_frame`). Returns `false` once the
    /// client has disconnected (the receiver was dropped), signaling the
    /// caller to cancel the backend call and stop producing events.
    pub async fn send_frame(&self, frame: String) -> bool {
        self.tx.send(Bytes::from(frame)).await.is_ok()
    }

    /// `:keepalive\n\n` — only ever sent while waiting for the backend's
    /// first event; never between an opened block and its close.
    pub async fn send_keepalive(&self) -> bool {
        self.send_frame(":keepalive\n\n".to_string()).await
    }

    /// Ends the stream. Because `ReceiverStream` yields every frame
    /// already buffered in the channel before reporting end-of-stream,
    /// dropping the sender after the last `send_frame` has been awaited
    /// never truncates output — the bounded channel already enforced
    /// drain-before-advance on every write.
    pub fn close(self) {
        drop(self.tx);
    }
}
