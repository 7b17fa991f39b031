//! Binary entry point: parses CLI args, loads the proxy configuration,
//! wires the prompt cache and trace sink, and runs the server (spec.md
//! §4.5, §6). Grounded on the teacher's `main.rs` bootstrap sequence
//! (env-var fallbacks, YAML config load, `TcpListener::bind`), with the
//! OpenTelemetry tracer and model/agent routing state removed.

mod backend;
mod handlers;
mod server;
mod sse_writer;

use clap::Parser;
use gateway_common::clock::SystemClock;
use gateway_common::config::TraceSinkKind;
use gateway_common::{FileSink, NullSink, PromptCache, ProxyConfig, StderrSink, TraceSink};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8089";

#[derive(Parser, Debug)]
#[command(name = "gateway", about = "Anthropic Messages <-> OpenAI Chat Completions proxy")]
struct Args {
    /// Path to the YAML proxy configuration file.
    #[arg(long, env = "PROXY_CONFIG_PATH", default_value = "./proxy_config.yaml")]
    config: String,

    /// Overrides the bind address from the config file.
    #[arg(long, env = "BIND_ADDRESS")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    tracing::info!("loading proxy configuration from {}", args.config);
    let config_contents = std::fs::read_to_string(&args.config)
        .map_err(|err| format!("failed to read {}: {err}", args.config))?;
    let config = ProxyConfig::from_yaml_str(&config_contents)
        .map_err(|err| format!("failed to parse {}: {err}", args.config))?;

    let bind_address = args
        .bind
        .or_else(|| config.bind_address.clone())
        .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

    let trace_sink: Arc<dyn TraceSink> = match config.trace.sink {
        TraceSinkKind::Null => Arc::new(NullSink),
        TraceSinkKind::Stderr => Arc::new(StderrSink),
        TraceSinkKind::File => {
            let path = config
                .trace
                .file_path
                .clone()
                .ok_or("trace.sink is \"file\" but trace.file_path is not set")?;
            Arc::new(FileSink::open(&path)?)
        }
    };

    let clock = Arc::new(SystemClock);
    let cache = Arc::new(PromptCache::new(config.cache.ttl_ms, config.cache.soft_cap, clock));

    let state = Arc::new(server::AppState {
        config,
        cache,
        trace: trace_sink,
        http_client: reqwest::Client::new(),
    });

    tracing::info!("bind address resolved to {bind_address}");
    server::run(&bind_address, state).await
}
