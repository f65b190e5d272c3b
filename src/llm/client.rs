//! Ollama-style `/api/chat` client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::tools::ToolCall;
use super::{ChatReply, ChatRequest, ModelClient};
use crate::config::ModelConfig;
use crate::error::{Error, Result};

const SERVICE: &str = "model";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OllamaChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCall>>,
}

pub struct OllamaClient {
    config: ModelConfig,
    http_client: reqwest::Client,
}

impl OllamaClient {
    pub fn new(config: ModelConfig) -> Result<Self> {
        info!("Using model {} at {}", config.name, config.url);

        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| Error::InvalidInput(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn build_request(&self, request: ChatRequest) -> Result<OllamaChatRequest> {
        let tools = request
            .tools
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(OllamaChatRequest {
            model: self.config.name.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system,
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.task,
                },
            ],
            tools,
            stream: false,
            options: OllamaOptions {
                temperature: self.config.temperature,
                num_predict: self.config.max_tokens,
            },
        })
    }
}

#[async_trait]
impl ModelClient for OllamaClient {
    fn name(&self) -> &str {
        &self.config.name
    }

    async fn complete(&self, request: ChatRequest) -> Result<ChatReply> {
        let url = format!("{}/api/chat", self.config.url.trim_end_matches('/'));
        let body = self.build_request(request)?;
        debug!("Sending chat request with {} tools", body.tools.len());

        let response = self
            .http_client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                let message = if e.is_timeout() {
                    format!("Request timed out after {}s", self.config.timeout_seconds)
                } else if e.is_connect() {
                    format!("Cannot connect to model endpoint at {}", self.config.url)
                } else {
                    format!("Failed to send request: {}", e)
                };
                Error::UpstreamUnavailable {
                    service: SERVICE,
                    status: None,
                    message,
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamUnavailable {
                service: SERVICE,
                status: Some(status.as_u16()),
                message: body,
            });
        }

        let chat_response: OllamaChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Serialization(format!("Failed to parse model response: {}", e)))?;

        Ok(ChatReply {
            content: chat_response.message.content,
            tool_calls: chat_response.message.tool_calls.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::tools::tool_definitions;

    fn config() -> ModelConfig {
        ModelConfig {
            max_tokens: Some(2048),
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_request_shape() {
        let client = OllamaClient::new(config()).unwrap();
        let request = ChatRequest::new("You are a budget analyst.", "Analyze user u1")
            .with_tools(tool_definitions());
        let body = serde_json::to_value(client.build_request(request).unwrap()).unwrap();

        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "Analyze user u1");
        assert_eq!(body["options"]["num_predict"], 2048);
        assert_eq!(body["tools"][0]["type"], "function");
    }

    #[test]
    fn test_request_without_tools_omits_field() {
        let client = OllamaClient::new(ModelConfig::default()).unwrap();
        let body =
            serde_json::to_value(client.build_request(ChatRequest::new("s", "t")).unwrap()).unwrap();
        assert!(body.get("tools").is_none());
        assert!(body["options"].get("num_predict").is_none());
    }

    #[test]
    fn test_parse_response_with_tool_calls() {
        let raw = r#"{
            "message": {
                "role": "assistant",
                "content": "",
                "tool_calls": [{"function": {"name": "query_store", "arguments": {"table": "budgets"}}}]
            },
            "done": true
        }"#;
        let parsed: OllamaChatResponse = serde_json::from_str(raw).unwrap();
        let calls = parsed.message.tool_calls.unwrap();
        assert_eq!(calls[0].function.name, "query_store");
    }
}
