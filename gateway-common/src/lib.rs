//! Collaborators shared between the gateway binary and (in principle) any
//! other front-end built on `bridge-core`: configuration loading, the
//! prompt cache's process-wide state, the clock/trace-sink abstractions,
//! and the HTTP-facing error taxonomy.

pub mod cache;
pub mod clock;
pub mod config;
pub mod errors;
pub mod trace;

pub use cache::PromptCache;
pub use clock::{Clock, SystemClock, TestClock};
pub use config::{Backend, BackendKind, ProxyConfig};
pub use errors::ProxyError;
pub use trace::{FileSink, NullSink, StderrSink, TraceRecord, TraceSink};
