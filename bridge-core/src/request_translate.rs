//! C2 (request direction): Anthropic request → OpenAI request, plus the
//! derived (system, tools) pair used for fingerprinting.

use crate::apis::anthropic::{
    MessagesContentBlock, MessagesMessage, MessagesMessageContent, MessagesRequest,
    MessagesRole, MessagesSystemPrompt, MessagesTool, MessagesToolChoice,
    MessagesToolChoiceType,
};
use crate::apis::openai::{
    ChatCompletionsRequest, ContentPart, FunctionCall, Message, MessageContent, Role, Tool,
    ToolCall, ToolChoice, ToolChoiceType,
};
use crate::capability::Capabilities;
use crate::error::TranslateError;
use crate::schema;

/// The OpenAI request plus the artifacts the orchestrator needs to
/// attribute prompt-cache usage.
pub struct TranslatedRequest {
    pub openai_request: ChatCompletionsRequest,
    pub system: Option<MessagesSystemPrompt>,
    pub tools: Option<Vec<MessagesTool>>,
}

pub fn translate_request(
    req: MessagesRequest,
    caps: &Capabilities,
) -> Result<TranslatedRequest, TranslateError> {
    if req.max_tokens == 0 {
        return Err(TranslateError::MissingMaxTokens);
    }

    let mut messages = Vec::new();

    if let Some(system) = &req.system {
        let text = system.flatten_to_string();
        let text = if caps.normalize_system_whitespace {
            text.replace('\n', " ")
        } else {
            text
        };
        messages.push(Message {
            role: Role::System,
            content: MessageContent::Text(text),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        });
    }

    for message in &req.messages {
        messages.extend(translate_message(message, caps)?);
    }

    let tools = req.tools.clone();
    let openai_tools = match &tools {
        Some(tools) if !tools.is_empty() => Some(
            tools
                .iter()
                .map(|t| schema::rewrite(t, caps))
                .collect::<Result<Vec<Tool>, TranslateError>>()?,
        ),
        _ => None,
    };

    let (tool_choice, _parallel) = translate_tool_choice(req.tool_choice.as_ref());

    let max_tokens = Some(req.max_tokens);
    let top_k_dropped = caps.drop_top_k;
    let _ = top_k_dropped; // top_k has no OpenAI Chat Completions equivalent; always dropped.

    let openai_request = ChatCompletionsRequest {
        model: req.model.clone(),
        messages,
        temperature: req.temperature,
        top_p: req.top_p,
        max_tokens,
        stream: req.stream,
        stop: req.stop_sequences.clone(),
        tools: openai_tools,
        tool_choice,
    };

    Ok(TranslatedRequest {
        openai_request,
        system: req.system,
        tools,
    })
}

fn translate_message(
    message: &MessagesMessage,
    caps: &Capabilities,
) -> Result<Vec<Message>, TranslateError> {
    let role = translate_role(message.role);

    match &message.content {
        MessagesMessageContent::Single(text) => Ok(vec![Message {
            role,
            content: MessageContent::Text(text.clone()),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }]),
        MessagesMessageContent::Blocks(blocks) => translate_blocks(role, blocks, caps),
    }
}

fn translate_role(role: MessagesRole) -> Role {
    match role {
        MessagesRole::User => Role::User,
        MessagesRole::Assistant => Role::Assistant,
    }
}

/// Splits one Anthropic message's content blocks into the OpenAI messages
/// it becomes. `tool_result` blocks become a contiguous group of `tool`
/// messages preserving order (spec.md §4.2.1 rule 3); everything else in a
/// user message collapses into one `user` message; an assistant message's
/// text and `tool_use` blocks collapse into one `assistant` message.
fn translate_blocks(
    role: Role,
    blocks: &[MessagesContentBlock],
    caps: &Capabilities,
) -> Result<Vec<Message>, TranslateError> {
    let mut tool_messages = Vec::new();
    let mut content_parts = Vec::new();
    let mut tool_calls = Vec::new();

    for block in blocks {
        match block {
            MessagesContentBlock::Text { text, .. } => {
                content_parts.push(ContentPart::Text { text: text.clone() });
            }
            MessagesContentBlock::Image { source } => {
                if caps.supports_images {
                    if let crate::apis::anthropic::MessagesImageSource::Url { url } = source {
                        content_parts.push(ContentPart::ImageUrl {
                            image_url: crate::apis::openai::ImageUrl { url: url.clone() },
                        });
                    }
                    // Base64 images are forwarded via the same content-part
                    // shape once a data: URL is constructed by the caller
                    // that owns transport concerns; out of scope here.
                }
                // Dropped silently when unsupported; the caller records the
                // warning via the translation report it already tracks.
            }
            MessagesContentBlock::ToolUse {
                id, name, input, ..
            } => {
                if !input.is_object() {
                    return Err(TranslateError::ToolUseInputNotObject { id: id.clone() });
                }
                tool_calls.push(ToolCall {
                    id: id.clone(),
                    call_type: "function".to_string(),
                    function: FunctionCall {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                });
            }
            MessagesContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                if tool_use_id.is_empty() {
                    return Err(TranslateError::ToolResultMissingId);
                }
                tool_messages.push(Message {
                    role: Role::Tool,
                    content: MessageContent::Text(content.render_to_string()),
                    name: None,
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                });
            }
        }
    }

    let mut result = tool_messages;

    if !content_parts.is_empty() || !tool_calls.is_empty() {
        let content = build_content(content_parts);
        result.push(Message {
            role,
            content,
            name: None,
            tool_calls: if tool_calls.is_empty() {
                None
            } else {
                Some(tool_calls)
            },
            tool_call_id: None,
        });
    }

    Ok(result)
}

fn build_content(parts: Vec<ContentPart>) -> MessageContent {
    if parts.len() == 1 {
        if let ContentPart::Text { text } = &parts[0] {
            return MessageContent::Text(text.clone());
        }
    }
    if parts.is_empty() {
        MessageContent::Text(String::new())
    } else {
        MessageContent::Parts(parts)
    }
}

fn translate_tool_choice(choice: Option<&MessagesToolChoice>) -> (Option<ToolChoice>, Option<bool>) {
    match choice {
        None => (None, None),
        Some(choice) => {
            let openai_choice = match choice.kind {
                MessagesToolChoiceType::Auto => ToolChoice::Type(ToolChoiceType::Auto),
                MessagesToolChoiceType::Any => ToolChoice::Type(ToolChoiceType::Required),
                MessagesToolChoiceType::None => ToolChoice::Type(ToolChoiceType::None),
                MessagesToolChoiceType::Tool => match &choice.name {
                    Some(name) => ToolChoice::Function {
                        choice_type: "function".to_string(),
                        function: crate::apis::openai::FunctionChoice { name: name.clone() },
                    },
                    None => ToolChoice::Type(ToolChoiceType::Auto),
                },
            };
            let parallel = choice.disable_parallel_tool_use.map(|disable| !disable);
            (Some(openai_choice), parallel)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apis::anthropic::{MessagesCacheControl, ToolResultContent};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn basic_request(messages: Vec<MessagesMessage>) -> MessagesRequest {
        MessagesRequest {
            model: "claude-3".to_string(),
            messages,
            max_tokens: 100,
            system: Some(MessagesSystemPrompt::Single("be helpful".to_string())),
            metadata: None,
            temperature: Some(0.7),
            top_p: None,
            top_k: Some(40),
            stream: Some(false),
            stop_sequences: None,
            tools: None,
            tool_choice: None,
        }
    }

    #[test]
    fn missing_max_tokens_is_rejected() {
        let mut req = basic_request(vec![]);
        req.max_tokens = 0;
        let err = translate_request(req, &Capabilities::default()).unwrap_err();
        assert_eq!(err, TranslateError::MissingMaxTokens);
    }

    #[test]
    fn system_prompt_becomes_leading_system_message() {
        let req = basic_request(vec![MessagesMessage {
            role: MessagesRole::User,
            content: MessagesMessageContent::Single("hi".to_string()),
        }]);
        let translated = translate_request(req, &Capabilities::default()).unwrap();
        assert_eq!(translated.openai_request.messages[0].role, Role::System);
        assert_eq!(
            translated.openai_request.messages[0].content.as_text(),
            "be helpful"
        );
    }

    #[test]
    fn tool_results_become_contiguous_tool_messages_in_order() {
        let req = basic_request(vec![MessagesMessage {
            role: MessagesRole::User,
            content: MessagesMessageContent::Blocks(vec![
                MessagesContentBlock::ToolResult {
                    tool_use_id: "t1".to_string(),
                    is_error: None,
                    content: ToolResultContent::Text("result one".to_string()),
                    cache_control: None,
                },
                MessagesContentBlock::ToolResult {
                    tool_use_id: "t2".to_string(),
                    is_error: Some(true),
                    content: ToolResultContent::Text("result two".to_string()),
                    cache_control: None,
                },
            ]),
        }]);
        let translated = translate_request(req, &Capabilities::default()).unwrap();
        let tool_msgs: Vec<_> = translated
            .openai_request
            .messages
            .iter()
            .filter(|m| m.role == Role::Tool)
            .collect();
        assert_eq!(tool_msgs.len(), 2);
        assert_eq!(tool_msgs[0].tool_call_id.as_deref(), Some("t1"));
        assert_eq!(tool_msgs[1].tool_call_id.as_deref(), Some("t2"));
    }

    #[test]
    fn assistant_tool_use_input_must_be_object() {
        let req = basic_request(vec![MessagesMessage {
            role: MessagesRole::Assistant,
            content: MessagesMessageContent::Blocks(vec![MessagesContentBlock::ToolUse {
                id: "t1".to_string(),
                name: "read".to_string(),
                input: json!("not an object"),
                cache_control: None,
            }]),
        }]);
        let err = translate_request(req, &Capabilities::default()).unwrap_err();
        assert_eq!(
            err,
            TranslateError::ToolUseInputNotObject {
                id: "t1".to_string()
            }
        );
    }

    #[test]
    fn assistant_tool_use_becomes_tool_call_with_stringified_arguments() {
        let req = basic_request(vec![MessagesMessage {
            role: MessagesRole::Assistant,
            content: MessagesMessageContent::Blocks(vec![
                MessagesContentBlock::Text {
                    text: "let me check".to_string(),
                    cache_control: Some(MessagesCacheControl::Ephemeral),
                },
                MessagesContentBlock::ToolUse {
                    id: "t1".to_string(),
                    name: "read".to_string(),
                    input: json!({"path": "README.md"}),
                    cache_control: None,
                },
            ]),
        }]);
        let translated = translate_request(req, &Capabilities::default()).unwrap();
        let assistant = translated
            .openai_request
            .messages
            .iter()
            .find(|m| m.role == Role::Assistant)
            .unwrap();
        assert_eq!(assistant.content.as_text(), "let me check");
        let calls = assistant.tool_calls.as_ref().unwrap();
        assert_eq!(calls[0].function.name, "read");
        assert_eq!(calls[0].function.arguments, r#"{"path":"README.md"}"#);
    }

    #[test]
    fn tools_are_rewritten_and_order_preserved() {
        let mut req = basic_request(vec![]);
        req.tools = Some(vec![
            MessagesTool {
                name: "b".to_string(),
                description: None,
                input_schema: json!({"type": "object"}),
            },
            MessagesTool {
                name: "a".to_string(),
                description: None,
                input_schema: json!({"type": "object"}),
            },
        ]);
        let translated = translate_request(req, &Capabilities::default()).unwrap();
        let tools = translated.openai_request.tools.unwrap();
        assert_eq!(tools[0].function.name, "b");
        assert_eq!(tools[1].function.name, "a");
    }
}
