//! Model capability used by the companion agents.
//!
//! A companion agent makes exactly one round trip through a [`ModelClient`]:
//! a system prompt, a task and the store-query tool declaration go out, a
//! single completion comes back. Replies are normalized with
//! [`strip_code_fences`] before [`parse_payload`] turns them into JSON.

pub mod client;
pub mod persist;
pub mod tools;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::error::{Error, Result};
use tools::{ToolCall, ToolDefinition};

pub use client::OllamaClient;

/// One single-shot chat request.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub system: String,
    pub task: String,
    pub tools: Vec<ToolDefinition>,
}

impl ChatRequest {
    pub fn new(system: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            task: task.into(),
            tools: Vec::new(),
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }
}

/// The model's answer: completion text plus any tool calls it requested.
#[derive(Debug, Clone, Default)]
pub struct ChatReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
}

impl ChatReply {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }
}

#[async_trait]
pub trait ModelClient: Send + Sync {
    /// Model identifier, for logs and reports.
    fn name(&self) -> &str;

    async fn complete(&self, request: ChatRequest) -> Result<ChatReply>;
}

/// A reply that is not valid JSON once fences are stripped.
#[derive(Error, Debug)]
#[error("{reason} (reply starts with {preview:?})")]
pub struct MalformedOutput {
    pub reason: String,
    pub preview: String,
}

impl From<MalformedOutput> for Error {
    fn from(e: MalformedOutput) -> Self {
        Error::MalformedModelOutput(e.to_string())
    }
}

/// Remove a leading ```` ```json ````, then a leading bare ```` ``` ````,
/// then a trailing ```` ``` ````, and trim.
///
/// Each check runs on what the previous one left, so a reply opening with
/// ```` ```json``` ```` loses both markers.
pub fn strip_code_fences(reply: &str) -> &str {
    let mut text = reply.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    }
    if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

pub fn parse_payload(reply: &str) -> std::result::Result<Value, MalformedOutput> {
    let text = strip_code_fences(reply);
    if text.is_empty() {
        return Err(MalformedOutput {
            reason: "empty reply".to_string(),
            preview: String::new(),
        });
    }
    serde_json::from_str(text).map_err(|e| MalformedOutput {
        reason: e.to_string(),
        preview: text.chars().take(40).collect(),
    })
}

/// Model fake replaying canned replies and recording every request.
#[cfg(test)]
pub mod scripted {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct ScriptedModel {
        replies: Mutex<VecDeque<Result<ChatReply>>>,
        pub requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedModel {
        pub fn new(replies: Vec<&str>) -> Self {
            Self {
                replies: Mutex::new(replies.into_iter().map(|r| Ok(ChatReply::text(r))).collect()),
                requests: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            let model = Self::default();
            model.replies.lock().unwrap().push_back(Err(Error::UpstreamUnavailable {
                service: "model",
                status: None,
                message: "scripted failure".to_string(),
            }));
            model
        }

        pub fn push(&self, reply: ChatReply) {
            self.replies.lock().unwrap().push_back(Ok(reply));
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ModelClient for ScriptedModel {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, request: ChatRequest) -> Result<ChatReply> {
            self.requests.lock().unwrap().push(request);
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(ChatReply::text("{}")))
        }
    }
}
