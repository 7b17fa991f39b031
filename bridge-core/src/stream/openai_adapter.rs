//! Projects an OpenAI SSE byte stream onto the [`BackendEvent`] vocabulary
//! C4 consumes (spec.md §4.4.1: "that adaptation is a trivial projection
//! and is considered part of C4").

use crate::apis::openai::ChatCompletionsStreamResponse;
use crate::apis::sse::SseLineBuffer;
use crate::stream::event::BackendEvent;
use std::collections::HashMap;
use std::str::FromStr;

pub struct OpenAiStreamAdapter {
    buffer: SseLineBuffer,
    tool_ids_by_index: HashMap<u32, String>,
    open_tool_index: Option<u32>,
    text_open: bool,
    done: bool,
}

impl Default for OpenAiStreamAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiStreamAdapter {
    pub fn new() -> Self {
        Self {
            buffer: SseLineBuffer::new(),
            tool_ids_by_index: HashMap::new(),
            open_tool_index: None,
            text_open: false,
            done: false,
        }
    }

    /// Feeds one chunk of raw bytes read from the backend connection and
    /// returns the `BackendEvent`s it produced, in order. Returns an empty
    /// vec once `[DONE]` (or the final chunk) has already been observed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<BackendEvent> {
        if self.done {
            return Vec::new();
        }
        let mut out = Vec::new();
        for line in self.buffer.push(chunk) {
            if line.is_empty() {
                continue;
            }
            let Ok(event) = crate::apis::sse::SseEvent::from_str(&line) else {
                continue;
            };
            if event.is_done() {
                self.done = true;
                out.push(BackendEvent::EndOfStream);
                break;
            }
            if event.should_skip() {
                continue;
            }
            let Some(data) = &event.data else { continue };
            let Ok(chunk) = serde_json::from_str::<ChatCompletionsStreamResponse>(data) else {
                continue;
            };
            self.apply_chunk(chunk, &mut out);
        }
        out
    }

    fn apply_chunk(&mut self, chunk: ChatCompletionsStreamResponse, out: &mut Vec<BackendEvent>) {
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content {
                if !text.is_empty() {
                    if !self.text_open {
                        self.text_open = true;
                        out.push(BackendEvent::TextStart);
                    }
                    out.push(BackendEvent::TextDelta { text });
                }
            }

            if let Some(tool_calls) = choice.delta.tool_calls {
                for call in tool_calls {
                    self.apply_tool_call_delta(call, out);
                }
            }

            if let Some(reason) = choice.finish_reason {
                self.close_open_blocks(out);
                out.push(BackendEvent::Finish {
                    stop_reason: Some(reason),
                    usage: chunk.usage.clone().unwrap_or_default(),
                });
            }
        }
    }

    fn apply_tool_call_delta(
        &mut self,
        call: crate::apis::openai::ToolCallDelta,
        out: &mut Vec<BackendEvent>,
    ) {
        if let Some(id) = call.id {
            if let Some(prev_index) = self.open_tool_index {
                if prev_index != call.index {
                    if let Some(prev_id) = self.tool_ids_by_index.get(&prev_index).cloned() {
                        out.push(BackendEvent::ToolInputEnd { id: prev_id });
                    }
                }
            }
            let name = call
                .function
                .as_ref()
                .and_then(|f| f.name.clone())
                .unwrap_or_default();
            self.tool_ids_by_index.insert(call.index, id.clone());
            self.open_tool_index = Some(call.index);
            out.push(BackendEvent::ToolInputStart { id: id.clone(), name });
            if let Some(args) = call.function.as_ref().and_then(|f| f.arguments.clone()) {
                if !args.is_empty() {
                    out.push(BackendEvent::ToolInputDelta { id, delta: args });
                }
            }
            return;
        }

        if let Some(id) = self.tool_ids_by_index.get(&call.index).cloned() {
            if let Some(args) = call.function.and_then(|f| f.arguments) {
                out.push(BackendEvent::ToolInputDelta { id, delta: args });
            }
        }
    }

    fn close_open_blocks(&mut self, out: &mut Vec<BackendEvent>) {
        if self.text_open {
            out.push(BackendEvent::TextEnd);
            self.text_open = false;
        }
        if let Some(index) = self.open_tool_index.take() {
            if let Some(id) = self.tool_ids_by_index.get(&index).cloned() {
                out.push(BackendEvent::ToolInputEnd { id });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn plain_text_chunks_become_text_start_delta_end() {
        let mut adapter = OpenAiStreamAdapter::new();
        let mut events = adapter.feed(
            b"data: {\"id\":\"1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{\"content\":\"hi\"},\"finish_reason\":null}],\"usage\":null}\n\n",
        );
        events.extend(adapter.feed(
            b"data: {\"id\":\"1\",\"model\":\"gpt-4o\",\"choices\":[{\"index\":0,\"delta\":{},\"finish_reason\":\"stop\"}],\"usage\":{\"prompt_tokens\":1,\"completion_tokens\":1,\"total_tokens\":2}}\n\n",
        ));
        events.extend(adapter.feed(b"data: [DONE]\n\n"));

        assert_eq!(
            events,
            vec![
                BackendEvent::TextStart,
                BackendEvent::TextDelta { text: "hi".into() },
                BackendEvent::TextEnd,
                BackendEvent::Finish {
                    stop_reason: Some(crate::apis::openai::FinishReason::Stop),
                    usage: crate::apis::openai::Usage {
                        prompt_tokens: 1,
                        completion_tokens: 1,
                        total_tokens: 2,
                    },
                },
                BackendEvent::EndOfStream,
            ]
        );
    }

    #[test]
    fn tool_call_delta_split_across_chunks_reassembles_by_index() {
        let mut adapter = OpenAiStreamAdapter::new();
        let mut events = adapter.feed(
            br#"data: {"id":"1","model":"m","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"read","arguments":""}}]},"finish_reason":null}],"usage":null}

"#,
        );
        events.extend(adapter.feed(
            br#"data: {"id":"1","model":"m","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"path\""}}]},"finish_reason":null}],"usage":null}

"#,
        ));
        events.extend(adapter.feed(
            br#"data: {"id":"1","model":"m","choices":[{"index":0,"delta":{"tool_calls":[{"index":0,"function":{"arguments":":\"a\"}"}}]},"finish_reason":"tool_calls"}],"usage":null}

"#,
        ));

        assert_eq!(
            events,
            vec![
                BackendEvent::ToolInputStart {
                    id: "call_1".into(),
                    name: "read".into(),
                },
                BackendEvent::ToolInputDelta {
                    id: "call_1".into(),
                    delta: "{\"path\"".into(),
                },
                BackendEvent::ToolInputDelta {
                    id: "call_1".into(),
                    delta: ":\"a\"}".into(),
                },
                BackendEvent::ToolInputEnd { id: "call_1".into() },
                BackendEvent::Finish {
                    stop_reason: Some(crate::apis::openai::FinishReason::ToolCalls),
                    usage: crate::apis::openai::Usage::default(),
                },
            ]
        );
    }

    #[test]
    fn done_after_done_marker_yields_no_further_events() {
        let mut adapter = OpenAiStreamAdapter::new();
        adapter.feed(b"data: [DONE]\n\n");
        let events = adapter.feed(b"data: {\"id\":\"1\",\"model\":\"m\",\"choices\":[],\"usage\":null}\n\n");
        assert!(events.is_empty());
    }
}
