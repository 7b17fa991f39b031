//! C2 (response direction): a complete (non-streaming) OpenAI response
//! translated back into an Anthropic response, including prompt-cache
//! usage attribution (spec.md §4.2.2, §4.3).

use crate::apis::anthropic::{
    MessagesCacheControl, MessagesContentBlock, MessagesResponse, MessagesRole,
    MessagesStopReason, MessagesUsage,
};
use crate::apis::openai::{ChatCompletionsResponse, FinishReason};
use crate::fingerprint::Fingerprint;
use serde_json::Value;

/// Whether the request's prompt fingerprint was seen before, and if so
/// how many of its tokens the backend reports as served from cache.
pub enum CacheOutcome {
    /// `estimated_tokens` is the same figure `PromptCache::record_access`
    /// attributed to this (now newly cached) fingerprint, so a later hit
    /// echoes back exactly what this miss reported as created.
    Miss { estimated_tokens: u32 },
    Hit { cached_tokens: u32 },
}

pub fn translate_response(
    response: ChatCompletionsResponse,
    cache: CacheOutcome,
    _fingerprint: &Fingerprint,
) -> MessagesResponse {
    let choice = response.choices.into_iter().next();
    let (message, finish_reason) = match choice {
        Some(choice) => (choice.message, choice.finish_reason),
        None => (
            crate::apis::openai::Message {
                role: crate::apis::openai::Role::Assistant,
                content: crate::apis::openai::MessageContent::Text(String::new()),
                name: None,
                tool_calls: None,
                tool_call_id: None,
            },
            None,
        ),
    };

    let mut content = Vec::new();
    let text = message.content.as_text();
    if !text.is_empty() {
        content.push(MessagesContentBlock::Text {
            text,
            cache_control: None,
        });
    }
    if let Some(tool_calls) = message.tool_calls {
        for call in tool_calls {
            let input: Value =
                serde_json::from_str(&call.function.arguments).unwrap_or_else(|_| Value::Object(Default::default()));
            content.push(MessagesContentBlock::ToolUse {
                id: call.id,
                name: call.function.name,
                input,
                cache_control: None,
            });
        }
    }

    let stop_reason = translate_finish_reason(finish_reason);

    let (cache_creation, cache_read) = match cache {
        CacheOutcome::Miss { estimated_tokens } => (Some(estimated_tokens), None),
        CacheOutcome::Hit { cached_tokens } => (None, Some(cached_tokens)),
    };

    MessagesResponse {
        id: response.id,
        obj_type: "message".to_string(),
        role: MessagesRole::Assistant,
        content,
        model: response.model,
        stop_reason,
        stop_sequence: None,
        usage: MessagesUsage {
            input_tokens: response.usage.prompt_tokens,
            output_tokens: response.usage.completion_tokens,
            cache_creation_input_tokens: cache_creation,
            cache_read_input_tokens: cache_read,
        },
    }
}

/// The literal mapping from spec.md §4.2.2 rule 1, matching
/// `stream::translator::stop_reason_from_finish` exactly so both response
/// paths agree on the same input shape.
fn translate_finish_reason(reason: Option<FinishReason>) -> MessagesStopReason {
    match reason {
        Some(FinishReason::ToolCalls) => MessagesStopReason::ToolUse,
        Some(FinishReason::Length) => MessagesStopReason::MaxTokens,
        Some(FinishReason::ContentFilter) => MessagesStopReason::EndTurn,
        Some(FinishReason::Stop) | None => MessagesStopReason::EndTurn,
    }
}

/// Marks a `tool_result`-eligible cache-control hint on the leading text
/// block, used when the orchestrator echoes Anthropic-style prompt caching
/// acknowledgement back to clients that opted into ephemeral caching.
pub fn mark_cache_control(content: &mut [MessagesContentBlock]) {
    if let Some(MessagesContentBlock::Text { cache_control, .. }) = content.first_mut() {
        *cache_control = Some(MessagesCacheControl::Ephemeral);
    }
}
