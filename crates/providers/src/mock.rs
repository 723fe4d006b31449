//! Scripted mock provider for tests.
//!
//! Each scripted turn is either a response (text + tool calls) or an error.
//! `chat_stream` synthesizes the same turn as a token/tool-call event
//! stream, so loop tests exercise the exact code path production uses.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use ha_domain::error::{Error, Result};
use ha_domain::stream::{BoxStream, StreamEvent, Usage};
use ha_domain::ToolCall;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};

/// One scripted model turn.
#[derive(Debug, Clone)]
pub enum MockTurn {
    Respond {
        text: String,
        tool_calls: Vec<ToolCall>,
    },
    Fail(String),
}

pub struct MockProvider {
    id: String,
    script: Mutex<VecDeque<MockTurn>>,
    /// Every request received, for assertions.
    pub requests: Mutex<Vec<ChatRequest>>,
}

impl MockProvider {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            script: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Queue a plain text reply (a final answer).
    pub fn push_text(self: &Arc<Self>, text: impl Into<String>) -> Arc<Self> {
        self.script.lock().push_back(MockTurn::Respond {
            text: text.into(),
            tool_calls: vec![],
        });
        self.clone()
    }

    /// Queue a reply that requests one tool call.
    pub fn push_tool_call(
        self: &Arc<Self>,
        call_id: &str,
        tool: &str,
        args: serde_json::Value,
    ) -> Arc<Self> {
        self.push_tool_calls(vec![ToolCall {
            call_id: call_id.into(),
            tool_name: tool.into(),
            arguments: args,
        }])
    }

    /// Queue a reply that requests several tool calls in one step.
    pub fn push_tool_calls(self: &Arc<Self>, tool_calls: Vec<ToolCall>) -> Arc<Self> {
        self.script.lock().push_back(MockTurn::Respond {
            text: String::new(),
            tool_calls,
        });
        self.clone()
    }

    /// Queue a provider error (e.g. "503 Service Unavailable").
    pub fn push_error(self: &Arc<Self>, message: impl Into<String>) -> Arc<Self> {
        self.script.lock().push_back(MockTurn::Fail(message.into()));
        self.clone()
    }

    pub fn remaining_turns(&self) -> usize {
        self.script.lock().len()
    }

    fn next_turn(&self, req: &ChatRequest) -> Result<MockTurn> {
        self.requests.lock().push(req.clone());
        self.script.lock().pop_front().ok_or_else(|| {
            Error::Provider {
                provider: self.id.clone(),
                message: "mock script exhausted".into(),
            }
        })
    }

    fn usage_for(text: &str) -> Usage {
        Usage {
            prompt_tokens: 10,
            completion_tokens: (text.len() / 4).max(1) as u32,
            total_tokens: 10 + (text.len() / 4).max(1) as u32,
        }
    }
}

#[async_trait::async_trait]
impl LlmProvider for Arc<MockProvider> {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        match self.next_turn(req)? {
            MockTurn::Respond { text, tool_calls } => Ok(ChatResponse {
                usage: Some(MockProvider::usage_for(&text)),
                finish_reason: Some(if tool_calls.is_empty() {
                    "stop".into()
                } else {
                    "tool_calls".into()
                }),
                content: text,
                tool_calls,
                model: "mock-1".into(),
            }),
            MockTurn::Fail(message) => Err(Error::Provider {
                provider: self.id.clone(),
                message,
            }),
        }
    }

    async fn chat_stream(
        &self,
        req: &ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let turn = self.next_turn(req)?;
        let stream = async_stream::stream! {
            match turn {
                MockTurn::Respond { text, tool_calls } => {
                    // Emit the text in word-sized token chunks.
                    if !text.is_empty() {
                        let words: Vec<String> = text
                            .split_inclusive(' ')
                            .map(|w| w.to_string())
                            .collect();
                        for word in words {
                            yield Ok(StreamEvent::Token { text: word });
                        }
                    }
                    for tc in &tool_calls {
                        yield Ok(StreamEvent::ToolCallStarted {
                            call_id: tc.call_id.clone(),
                            tool_name: tc.tool_name.clone(),
                        });
                        yield Ok(StreamEvent::ToolCallFinished {
                            call_id: tc.call_id.clone(),
                            tool_name: tc.tool_name.clone(),
                            arguments: tc.arguments.clone(),
                        });
                    }
                    yield Ok(StreamEvent::Done {
                        usage: Some(MockProvider::usage_for(&text)),
                        finish_reason: Some(if tool_calls.is_empty() {
                            "stop".into()
                        } else {
                            "tool_calls".into()
                        }),
                    });
                }
                MockTurn::Fail(message) => {
                    yield Ok(StreamEvent::Error { message });
                }
            }
        };
        Ok(Box::pin(stream))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}
