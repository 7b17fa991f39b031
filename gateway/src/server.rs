//! Connection-accept loop (spec.md §4.5.1), grounded on the teacher's
//! `main.rs` bootstrap: bind, accept, spawn one task per connection, serve
//! with `hyper::server::conn::http1`.

use crate::handlers;
use bytes::Bytes;
use gateway_common::{PromptCache, ProxyConfig, TraceSink};
use http_body_util::combinators::BoxBody;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, warn};

pub type ProxyBody = BoxBody<Bytes, hyper::Error>;

pub struct AppState {
    pub config: ProxyConfig,
    pub cache: Arc<PromptCache>,
    pub trace: Arc<dyn TraceSink>,
    pub http_client: reqwest::Client,
}

pub async fn run(
    bind_address: &str,
    state: Arc<AppState>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(bind_address).await?;
    tracing::info!("listening on http://{bind_address}");

    loop {
        let (stream, peer_addr) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let state = Arc::clone(&state);

        let service = service_fn(move |req| {
            let state = Arc::clone(&state);
            async move { handlers::route(req, state).await }
        });

        tokio::task::spawn(async move {
            debug!("accepted connection from {peer_addr:?}");
            if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                warn!("error serving connection: {err:?}");
            }
        });
    }
}
