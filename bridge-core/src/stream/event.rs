//! The abstract upstream event vocabulary C4 (and its watchdogs) operate
//! over (spec.md §4.4.1). Backends that emit OpenAI SSE are adapted into
//! this vocabulary by [`crate::stream::openai_adapter`]; that projection
//! is trivial and considered part of C4.

use crate::apis::openai::{FinishReason, Usage};

#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    TextStart,
    TextDelta { text: String },
    TextEnd,
    ToolInputStart { id: String, name: String },
    ToolInputDelta { id: String, delta: String },
    ToolInputEnd { id: String },
    /// An atomic tool call, emitted instead of (or in addition to) the
    /// streaming `tool-input-*` triple.
    ToolCall { id: String, name: String, input: serde_json::Value },
    Finish {
        stop_reason: Option<FinishReason>,
        usage: Usage,
    },
    Error { kind: String, message: String },
    EndOfStream,
}

/// The two watchdog timers race backend events on the same serialized
/// channel (spec.md §4.4.3); the translator treats a timer firing as just
/// another input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Watchdog {
    Inactivity,
    Terminal,
}

/// Everything the translator consumes: one real backend event, or one
/// watchdog firing.
#[derive(Debug, Clone, PartialEq)]
pub enum TranslatorInput {
    Backend(BackendEvent),
    Watchdog(Watchdog),
}

impl From<BackendEvent> for TranslatorInput {
    fn from(event: BackendEvent) -> Self {
        TranslatorInput::Backend(event)
    }
}

impl From<Watchdog> for TranslatorInput {
    fn from(watchdog: Watchdog) -> Self {
        TranslatorInput::Watchdog(watchdog)
    }
}
