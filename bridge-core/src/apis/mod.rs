pub mod anthropic;
pub mod openai;
pub mod sse;

pub use anthropic::{MessagesRequest, MessagesResponse, MessagesStreamEvent, MESSAGES_PATH};
pub use openai::{ChatCompletionsRequest, ChatCompletionsResponse, CHAT_COMPLETIONS_PATH};
