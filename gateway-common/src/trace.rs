//! The `TraceSink` collaborator (spec.md §6, §4.5.5): fire-and-forget
//! observability. No metrics/OTLP exporters are built; only the sinks the
//! request-boundary hook needs are wired up.

use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize)]
pub struct TraceRecord {
    pub request_id: String,
    pub mode: &'static str,
    pub fingerprint: Option<String>,
    pub cache_hit: Option<bool>,
    pub backend_elapsed_ms: Option<u64>,
    pub first_byte_ms: Option<u64>,
    pub total_bytes: u64,
    pub stop_reason: Option<String>,
    pub recoverable_errors: Vec<String>,
    pub http_status: u16,
}

pub trait TraceSink: Send + Sync {
    fn record(&self, record: TraceRecord);
}

#[derive(Debug, Default)]
pub struct NullSink;

impl TraceSink for NullSink {
    fn record(&self, _record: TraceRecord) {}
}

#[derive(Debug, Default)]
pub struct StderrSink;

impl TraceSink for StderrSink {
    fn record(&self, record: TraceRecord) {
        match serde_json::to_string(&record) {
            Ok(line) => info!(target: "trace_sink", "{line}"),
            Err(err) => warn!("failed to serialize trace record: {err}"),
        }
    }
}

pub struct FileSink {
    file: Mutex<std::fs::File>,
}

impl FileSink {
    pub fn open(path: &str) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl TraceSink for FileSink {
    fn record(&self, record: TraceRecord) {
        let Ok(mut line) = serde_json::to_string(&record) else {
            return;
        };
        line.push('\n');
        if let Ok(mut file) = self.file.lock() {
            let _ = file.write_all(line.as_bytes());
        }
    }
}
