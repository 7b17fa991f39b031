//! C4: converts the abstract backend event sequence into a well-formed,
//! fully-terminated Anthropic SSE stream (spec.md §4.4). This is the
//! hardest part of the system: every accepted upstream request must
//! produce `message_stop` exactly once, on every path, including watchdog
//! expiry and mid-stream backend errors.

use crate::apis::anthropic::{
    MessagesContentBlock, MessagesContentDelta, MessagesMessageDelta, MessagesRole,
    MessagesStopReason, MessagesStreamEvent, MessagesStreamMessage, MessagesUsage,
};
use crate::apis::openai::{FinishReason, Usage as BackendUsage};
use crate::stream::event::{BackendEvent, TranslatorInput, Watchdog};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Started,
    Finishing,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum BlockState {
    NoBlock,
    TextOpen,
    ToolOpen { id: String, partial: String },
}

/// A recoverable error observed mid-stream: never surfaced as an HTTP
/// failure (the response has already been committed), only recorded for
/// the trace sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoverableError {
    pub kind: String,
    pub message: String,
}

pub struct StreamTranslator {
    state: State,
    block: BlockState,
    next_index: u32,
    tool_ids_streamed: HashSet<String>,
    tool_names_seen: std::collections::HashMap<String, String>,
    stashed_stop_reason: Option<FinishReason>,
    stashed_usage: Option<BackendUsage>,
    finish_seen: bool,
    message_id: String,
    model: String,
    cache_creation_input_tokens: Option<u32>,
    cache_read_input_tokens: Option<u32>,
    diagnostics: Vec<RecoverableError>,
}

impl StreamTranslator {
    /// Connects the translator and performs the entry action: emits
    /// `message_start` unconditionally, before any backend event has been
    /// observed (spec.md §4.4.2). `initial_usage` carries the
    /// cache-attribution fields computed by C3 before the backend call was
    /// made; they are echoed into every `usage` block this stream emits.
    pub fn start(
        message_id: String,
        model: String,
        initial_usage: MessagesUsage,
    ) -> (Self, MessagesStreamEvent) {
        let translator = StreamTranslator {
            state: State::Started,
            block: BlockState::NoBlock,
            next_index: 0,
            tool_ids_streamed: HashSet::new(),
            tool_names_seen: std::collections::HashMap::new(),
            stashed_stop_reason: None,
            stashed_usage: None,
            finish_seen: false,
            message_id: message_id.clone(),
            model: model.clone(),
            cache_creation_input_tokens: initial_usage.cache_creation_input_tokens,
            cache_read_input_tokens: initial_usage.cache_read_input_tokens,
            diagnostics: Vec::new(),
        };
        let start_event = MessagesStreamEvent::MessageStart {
            message: MessagesStreamMessage {
                id: message_id,
                obj_type: "message".to_string(),
                role: MessagesRole::Assistant,
                content: Vec::new(),
                model,
                stop_reason: None,
                stop_sequence: None,
                usage: initial_usage,
            },
        };
        (translator, start_event)
    }

    pub fn is_stopped(&self) -> bool {
        self.state == State::Stopped
    }

    pub fn diagnostics(&self) -> &[RecoverableError] {
        &self.diagnostics
    }

    /// Feeds one input (a backend event or a watchdog firing) and returns
    /// the Anthropic SSE events it produces, in emission order. Once
    /// `Stopped`, every further call returns nothing.
    pub fn handle(&mut self, input: TranslatorInput) -> Vec<MessagesStreamEvent> {
        if self.state == State::Stopped {
            return Vec::new();
        }
        match input {
            TranslatorInput::Backend(event) => self.handle_backend_event(event),
            TranslatorInput::Watchdog(watchdog) => self.handle_watchdog(watchdog),
        }
    }

    fn handle_backend_event(&mut self, event: BackendEvent) -> Vec<MessagesStreamEvent> {
        match event {
            BackendEvent::TextStart => self.open_text_block(),
            BackendEvent::TextDelta { text } => self.text_delta(text),
            BackendEvent::TextEnd => self.text_end(),
            BackendEvent::ToolInputStart { id, name } => self.tool_input_start(id, name),
            BackendEvent::ToolInputDelta { id, delta } => self.tool_input_delta(id, delta),
            BackendEvent::ToolInputEnd { id } => self.tool_input_end(id),
            BackendEvent::ToolCall { id, name, input } => self.tool_call(id, name, input),
            BackendEvent::Finish { stop_reason, usage } => self.finish(stop_reason, usage),
            BackendEvent::Error { kind, message } => self.error(kind, message),
            BackendEvent::EndOfStream => self.end_of_stream(),
        }
    }

    fn close_open_block(&mut self, out: &mut Vec<MessagesStreamEvent>) {
        match &self.block {
            BlockState::NoBlock => {}
            BlockState::TextOpen | BlockState::ToolOpen { .. } => {
                out.push(MessagesStreamEvent::ContentBlockStop {
                    index: self.next_index,
                });
                self.next_index += 1;
                self.block = BlockState::NoBlock;
            }
        }
    }

    fn open_text_block(&mut self) -> Vec<MessagesStreamEvent> {
        let mut out = Vec::new();
        self.close_open_block(&mut out);
        out.push(MessagesStreamEvent::ContentBlockStart {
            index: self.next_index,
            content_block: MessagesContentBlock::Text {
                text: String::new(),
                cache_control: None,
            },
        });
        self.block = BlockState::TextOpen;
        out
    }

    fn text_delta(&mut self, text: String) -> Vec<MessagesStreamEvent> {
        let mut out = if self.block == BlockState::NoBlock {
            self.open_text_block()
        } else {
            Vec::new()
        };
        out.push(MessagesStreamEvent::ContentBlockDelta {
            index: self.next_index,
            delta: MessagesContentDelta::TextDelta { text },
        });
        out
    }

    fn text_end(&mut self) -> Vec<MessagesStreamEvent> {
        let mut out = Vec::new();
        if self.block == BlockState::TextOpen {
            self.close_open_block(&mut out);
        }
        out
    }

    fn tool_input_start(&mut self, id: String, name: String) -> Vec<MessagesStreamEvent> {
        let mut out = Vec::new();
        self.close_open_block(&mut out);
        self.tool_names_seen.insert(id.clone(), name.clone());
        out.push(MessagesStreamEvent::ContentBlockStart {
            index: self.next_index,
            content_block: MessagesContentBlock::ToolUse {
                id: id.clone(),
                name,
                input: serde_json::json!({}),
                cache_control: None,
            },
        });
        self.tool_ids_streamed.insert(id.clone());
        self.block = BlockState::ToolOpen {
            id,
            partial: String::new(),
        };
        out
    }

    fn tool_input_delta(&mut self, id: String, delta: String) -> Vec<MessagesStreamEvent> {
        let mut out = Vec::new();
        let open_id = match &self.block {
            BlockState::ToolOpen { id: open_id, .. } => Some(open_id.clone()),
            _ => None,
        };
        if open_id.as_deref() != Some(id.as_str()) {
            // Out-of-order delta: best-effort recovery by synthesizing the
            // missing tool-input-start if we have seen this id's name before.
            match self.tool_names_seen.get(&id).cloned() {
                Some(name) => {
                    out.extend(self.tool_input_start(id.clone(), name));
                }
                None => {
                    self.diagnostics.push(RecoverableError {
                        kind: "tool_input_delta_unmatched".to_string(),
                        message: format!("delta for unknown tool id {id}"),
                    });
                    return out;
                }
            }
        }
        if let BlockState::ToolOpen { partial, .. } = &mut self.block {
            partial.push_str(&delta);
        }
        out.push(MessagesStreamEvent::ContentBlockDelta {
            index: self.next_index,
            delta: MessagesContentDelta::InputJsonDelta { partial_json: delta },
        });
        out
    }

    fn tool_input_end(&mut self, id: String) -> Vec<MessagesStreamEvent> {
        let mut out = Vec::new();
        if matches!(&self.block, BlockState::ToolOpen { id: open_id, .. } if open_id == &id) {
            self.close_open_block(&mut out);
        }
        out
    }

    fn tool_call(
        &mut self,
        id: String,
        name: String,
        input: serde_json::Value,
    ) -> Vec<MessagesStreamEvent> {
        if self.tool_ids_streamed.contains(&id) {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.close_open_block(&mut out);
        let index = self.next_index;
        out.push(MessagesStreamEvent::ContentBlockStart {
            index,
            content_block: MessagesContentBlock::ToolUse {
                id: id.clone(),
                name,
                input: serde_json::json!({}),
                cache_control: None,
            },
        });
        out.push(MessagesStreamEvent::ContentBlockDelta {
            index,
            delta: MessagesContentDelta::InputJsonDelta {
                partial_json: input.to_string(),
            },
        });
        out.push(MessagesStreamEvent::ContentBlockStop { index });
        self.next_index += 1;
        self.tool_ids_streamed.insert(id);
        out
    }

    fn finish(
        &mut self,
        stop_reason: Option<FinishReason>,
        usage: BackendUsage,
    ) -> Vec<MessagesStreamEvent> {
        let mut out = Vec::new();
        self.close_open_block(&mut out);
        self.stashed_stop_reason = stop_reason;
        self.stashed_usage = Some(usage);
        self.finish_seen = true;
        self.state = State::Finishing;
        out
    }

    fn error(&mut self, kind: String, message: String) -> Vec<MessagesStreamEvent> {
        self.diagnostics.push(RecoverableError {
            kind: kind.clone(),
            message: message.clone(),
        });
        // Once message_start has been written (always true, here — see
        // module docs) a backend error is never an HTTP-level failure: the
        // stream is graceful-closed as if the backend had ended cleanly.
        self.end_of_stream()
    }

    fn end_of_stream(&mut self) -> Vec<MessagesStreamEvent> {
        if self.state == State::Stopped {
            return Vec::new();
        }
        let mut out = Vec::new();
        self.close_open_block(&mut out);

        let stop_reason = self
            .stashed_stop_reason
            .map(stop_reason_from_finish)
            .unwrap_or(MessagesStopReason::EndTurn);
        let usage = self.stashed_usage.take();
        out.push(MessagesStreamEvent::MessageDelta {
            delta: MessagesMessageDelta {
                stop_reason,
                stop_sequence: None,
            },
            usage: MessagesUsage {
                input_tokens: usage.as_ref().map(|u| u.prompt_tokens).unwrap_or(0),
                output_tokens: usage.as_ref().map(|u| u.completion_tokens).unwrap_or(0),
                cache_creation_input_tokens: self.cache_creation_input_tokens,
                cache_read_input_tokens: self.cache_read_input_tokens,
            },
        });
        out.push(MessagesStreamEvent::MessageStop);
        self.state = State::Stopped;
        out
    }

    fn handle_watchdog(&mut self, _watchdog: Watchdog) -> Vec<MessagesStreamEvent> {
        if self.state == State::Stopped {
            return Vec::new();
        }
        self.diagnostics.push(RecoverableError {
            kind: "watchdog_expired".to_string(),
            message: "stream watchdog fired before a graceful end-of-stream".to_string(),
        });
        self.end_of_stream()
    }
}

fn stop_reason_from_finish(reason: FinishReason) -> MessagesStopReason {
    match reason {
        FinishReason::Stop => MessagesStopReason::EndTurn,
        FinishReason::Length => MessagesStopReason::MaxTokens,
        FinishReason::ToolCalls => MessagesStopReason::ToolUse,
        FinishReason::ContentFilter => MessagesStopReason::EndTurn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn event_names(events: &[MessagesStreamEvent]) -> Vec<&'static str> {
        events.iter().map(|e| e.event_name()).collect()
    }

    #[test]
    fn start_emits_message_start_unconditionally() {
        let (translator, event) =
            StreamTranslator::start("msg_1".to_string(), "gpt-4o".to_string(), MessagesUsage::default());
        assert_eq!(event.event_name(), "message_start");
        assert!(!translator.is_stopped());
    }

    #[test]
    fn end_of_stream_with_no_events_still_stops_cleanly() {
        let (mut translator, _start) =
            StreamTranslator::start("msg_1".to_string(), "gpt-4o".to_string(), MessagesUsage::default());
        let events = translator.handle(BackendEvent::EndOfStream.into());
        assert_eq!(event_names(&events), vec!["message_delta", "message_stop"]);
        assert!(translator.is_stopped());
    }

    #[test]
    fn text_delta_synthesizes_text_start_and_indices_increment() {
        let (mut translator, _start) =
            StreamTranslator::start("msg_1".to_string(), "gpt-4o".to_string(), MessagesUsage::default());
        let mut all = Vec::new();
        all.extend(translator.handle(BackendEvent::TextDelta { text: "hi".into() }.into()));
        all.extend(translator.handle(BackendEvent::TextEnd.into()));
        all.extend(translator.handle(
            BackendEvent::ToolInputStart {
                id: "t1".into(),
                name: "read".into(),
            }
            .into(),
        ));
        all.extend(translator.handle(
            BackendEvent::ToolInputDelta {
                id: "t1".into(),
                delta: "{\"path\":".into(),
            }
            .into(),
        ));
        all.extend(translator.handle(BackendEvent::ToolInputEnd { id: "t1".into() }.into()));
        all.extend(translator.handle(
            BackendEvent::Finish {
                stop_reason: Some(FinishReason::ToolCalls),
                usage: BackendUsage {
                    prompt_tokens: 10,
                    completion_tokens: 4,
                    total_tokens: 14,
                },
            }
            .into(),
        ));
        all.extend(translator.handle(BackendEvent::EndOfStream.into()));

        assert_eq!(
            event_names(&all),
            vec![
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "content_block_start",
                "content_block_delta",
                "content_block_stop",
                "message_delta",
                "message_stop",
            ]
        );
        match &all[0] {
            MessagesStreamEvent::ContentBlockStart { index, .. } => assert_eq!(*index, 0),
            _ => unreachable!(),
        }
        match &all[3] {
            MessagesStreamEvent::ContentBlockStart { index, .. } => assert_eq!(*index, 1),
            _ => unreachable!(),
        }
    }

    #[test]
    fn duplicate_tool_call_after_streaming_is_dropped() {
        let (mut translator, _start) =
            StreamTranslator::start("msg_1".to_string(), "gpt-4o".to_string(), MessagesUsage::default());
        translator.handle(
            BackendEvent::ToolInputStart {
                id: "t1".into(),
                name: "read".into(),
            }
            .into(),
        );
        translator.handle(BackendEvent::ToolInputEnd { id: "t1".into() }.into());
        let events = translator.handle(
            BackendEvent::ToolCall {
                id: "t1".into(),
                name: "read".into(),
                input: serde_json::json!({"path": "a"}),
            }
            .into(),
        );
        assert!(events.is_empty());
    }

    #[test]
    fn watchdog_firing_before_stop_still_emits_message_stop() {
        let (mut translator, _start) =
            StreamTranslator::start("msg_1".to_string(), "gpt-4o".to_string(), MessagesUsage::default());
        translator.handle(BackendEvent::TextDelta { text: "partial".into() }.into());
        let events = translator.handle(Watchdog::Inactivity.into());
        assert_eq!(
            event_names(&events),
            vec!["content_block_stop", "message_delta", "message_stop"]
        );
        assert!(translator.is_stopped());
        assert_eq!(translator.diagnostics().len(), 1);
    }

    #[test]
    fn nothing_emitted_after_stopped() {
        let (mut translator, _start) =
            StreamTranslator::start("msg_1".to_string(), "gpt-4o".to_string(), MessagesUsage::default());
        translator.handle(BackendEvent::EndOfStream.into());
        let events = translator.handle(BackendEvent::TextDelta { text: "late".into() }.into());
        assert!(events.is_empty());
    }

    #[test]
    fn mid_stream_error_graceful_closes_instead_of_propagating() {
        let (mut translator, _start) =
            StreamTranslator::start("msg_1".to_string(), "gpt-4o".to_string(), MessagesUsage::default());
        translator.handle(BackendEvent::TextDelta { text: "hi".into() }.into());
        let events = translator.handle(
            BackendEvent::Error {
                kind: "upstream_reset".into(),
                message: "connection reset".into(),
            }
            .into(),
        );
        assert_eq!(
            event_names(&events),
            vec!["content_block_stop", "message_delta", "message_stop"]
        );
        assert!(translator.is_stopped());
    }
}
