//! bridge-core: lossless translation between the Anthropic Messages API and
//! the OpenAI Chat Completions API, plus the streaming event translator and
//! the prompt fingerprinting used for cache attribution.
//!
//! This crate is the "core" of the proxy: it never performs I/O and never
//! panics outside tests. The orchestrator (the `gateway` crate) owns every
//! network and timer concern; this crate only transforms values.

pub mod apis;
pub mod capability;
pub mod error;
pub mod fingerprint;
pub mod request_translate;
pub mod response_translate;
pub mod schema;
pub mod stream;

pub use apis::anthropic::{
    MessagesRequest, MessagesResponse, MessagesStreamEvent, MESSAGES_PATH,
};
pub use apis::openai::{ChatCompletionsRequest, ChatCompletionsResponse, CHAT_COMPLETIONS_PATH};
pub use capability::Capabilities;
pub use error::TranslateError;
pub use stream::event::BackendEvent;
pub use stream::translator::StreamTranslator;
