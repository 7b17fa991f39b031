//! Wire types for the Anthropic Messages API surface this proxy exposes.
//!
//! Field shapes follow the recognized subset in the data model: request
//! content blocks (`text`, `image`, `tool_use`, `tool_result`), the SSE
//! event grammar, and the usage/cache-attribution fields the client
//! expects back.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::collections::HashMap;

pub const MESSAGES_PATH: &str = "/v1/messages";

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessagesRequest {
    pub model: String,
    pub messages: Vec<MessagesMessage>,
    /// Omitted entirely on the wire is treated the same as `0`: both are
    /// rejected by `request_translate::translate_request`'s
    /// `MissingMaxTokens` check, which is the one path meant to produce
    /// that error (spec.md §8 Scenario 5).
    #[serde(default)]
    pub max_tokens: u32,
    pub system: Option<MessagesSystemPrompt>,
    pub metadata: Option<HashMap<String, Value>>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub top_k: Option<u32>,
    pub stream: Option<bool>,
    pub stop_sequences: Option<Vec<String>>,
    pub tools: Option<Vec<MessagesTool>>,
    pub tool_choice: Option<MessagesToolChoice>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessagesRole {
    User,
    Assistant,
}

/// Cache control marker on a content block (`type: "ephemeral"`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum MessagesCacheControl {
    Ephemeral,
}

/// A `tool_result` block's content can be a plain string or a sequence of
/// content blocks (only text blocks are expected in practice).
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum ToolResultContent {
    Text(String),
    Blocks(Vec<MessagesContentBlock>),
}

impl ToolResultContent {
    /// Renders tool-result content to a single string the way the OpenAI
    /// `tool` message's `content` field expects: text blocks concatenated,
    /// anything else JSON-stringified.
    pub fn render_to_string(&self) -> String {
        match self {
            ToolResultContent::Text(text) => text.clone(),
            ToolResultContent::Blocks(blocks) => blocks
                .iter()
                .map(|b| match b {
                    MessagesContentBlock::Text { text, .. } => text.clone(),
                    other => serde_json::to_string(other).unwrap_or_default(),
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum MessagesContentBlock {
    Text {
        text: String,
        cache_control: Option<MessagesCacheControl>,
    },
    Image {
        source: MessagesImageSource,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
        cache_control: Option<MessagesCacheControl>,
    },
    ToolResult {
        tool_use_id: String,
        is_error: Option<bool>,
        content: ToolResultContent,
        cache_control: Option<MessagesCacheControl>,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum MessagesImageSource {
    Base64 { media_type: String, data: String },
    Url { url: String },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum MessagesMessageContent {
    Single(String),
    Blocks(Vec<MessagesContentBlock>),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(untagged)]
pub enum MessagesSystemPrompt {
    Single(String),
    Blocks(Vec<MessagesContentBlock>),
}

impl MessagesSystemPrompt {
    /// Concatenates system text blocks in order, the way a leading OpenAI
    /// `system` message's content is built.
    pub fn flatten_to_string(&self) -> String {
        match self {
            MessagesSystemPrompt::Single(s) => s.clone(),
            MessagesSystemPrompt::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| match b {
                    MessagesContentBlock::Text { text, .. } => Some(text.as_str()),
                    _ => None,
                })
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessagesMessage {
    pub role: MessagesRole,
    pub content: MessagesMessageContent,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessagesTool {
    pub name: String,
    pub description: Option<String>,
    pub input_schema: Value,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessagesToolChoiceType {
    Auto,
    Any,
    Tool,
    None,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessagesToolChoice {
    #[serde(rename = "type")]
    pub kind: MessagesToolChoiceType,
    pub name: Option<String>,
    pub disable_parallel_tool_use: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessagesStopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
    ToolUse,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MessagesUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cache_creation_input_tokens: Option<u32>,
    pub cache_read_input_tokens: Option<u32>,
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessagesResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub obj_type: String,
    pub role: MessagesRole,
    pub content: Vec<MessagesContentBlock>,
    pub model: String,
    pub stop_reason: MessagesStopReason,
    pub stop_sequence: Option<String>,
    pub usage: MessagesUsage,
}

impl MessagesRequest {
    pub fn is_streaming(&self) -> bool {
        self.stream.unwrap_or(false)
    }
}

impl TryFrom<&[u8]> for MessagesRequest {
    type Error = serde_json::Error;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        serde_json::from_slice(bytes)
    }
}

// ============================================================================
// SSE EVENT GRAMMAR (spec.md §3 "Anthropic SSE event grammar")
// ============================================================================

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "snake_case")]
#[serde(tag = "type")]
pub enum MessagesStreamEvent {
    MessageStart {
        message: MessagesStreamMessage,
    },
    ContentBlockStart {
        index: u32,
        content_block: MessagesContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: MessagesContentDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: MessagesMessageDelta,
        usage: MessagesUsage,
    },
    MessageStop,
}

impl MessagesStreamEvent {
    /// The SSE `event:` line name, e.g. `"content_block_start"`.
    pub fn event_name(&self) -> &'static str {
        match self {
            MessagesStreamEvent::MessageStart { .. } => "message_start",
            MessagesStreamEvent::ContentBlockStart { .. } => "content_block_start",
            MessagesStreamEvent::ContentBlockDelta { .. } => "content_block_delta",
            MessagesStreamEvent::ContentBlockStop { .. } => "content_block_stop",
            MessagesStreamEvent::MessageDelta { .. } => "message_delta",
            MessagesStreamEvent::MessageStop => "message_stop",
        }
    }

    /// Renders as a full `event: ...\ndata: ...\n\n` wire frame.
    pub fn to_sse_frame(&self) -> String {
        let data = serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string());
        format!("event: {}\ndata: {}\n\n", self.event_name(), data)
    }
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessagesStreamMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub obj_type: String,
    pub role: MessagesRole,
    pub content: Vec<Value>,
    pub model: String,
    pub stop_reason: Option<MessagesStopReason>,
    pub stop_sequence: Option<String>,
    pub usage: MessagesUsage,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum MessagesContentDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(rename = "input_json_delta")]
    InputJsonDelta { partial_json: String },
}

#[skip_serializing_none]
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MessagesMessageDelta {
    pub stop_reason: MessagesStopReason,
    pub stop_sequence: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn system_prompt_flattens_text_blocks_in_order() {
        let sys = MessagesSystemPrompt::Blocks(vec![
            MessagesContentBlock::Text {
                text: "first".into(),
                cache_control: None,
            },
            MessagesContentBlock::Text {
                text: "second".into(),
                cache_control: Some(MessagesCacheControl::Ephemeral),
            },
        ]);
        assert_eq!(sys.flatten_to_string(), "first\nsecond");
    }

    #[test]
    fn tool_result_content_renders_blocks_as_text() {
        let content = ToolResultContent::Blocks(vec![MessagesContentBlock::Text {
            text: "42".into(),
            cache_control: None,
        }]);
        assert_eq!(content.render_to_string(), "42");
    }

    #[test]
    fn content_block_delta_sse_frame_matches_grammar() {
        let event = MessagesStreamEvent::ContentBlockDelta {
            index: 0,
            delta: MessagesContentDelta::TextDelta {
                text: "hi".to_string(),
            },
        };
        let frame = event.to_sse_frame();
        assert!(frame.starts_with("event: content_block_delta\n"));
        assert!(frame.ends_with("\n\n"));
    }

    #[test]
    fn request_body_omitting_max_tokens_parses_as_zero() {
        let body = br#"{"model":"claude-3","messages":[]}"#;
        let req = MessagesRequest::try_from(&body[..]).unwrap();
        assert_eq!(req.max_tokens, 0);
    }
}
