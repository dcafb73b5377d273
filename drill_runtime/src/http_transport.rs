// OpenAI-compatible chat completions over HTTP.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use drill_engine::domain::{PromptMessage, PromptRole};

use crate::ai::AiError;
use crate::chat_provider::ChatTransport;
use crate::config::AiConfig;

#[derive(Debug, Serialize)]
struct ContentPart<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: PromptRole,
    content: Vec<ContentPart<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    max_completion_tokens: u32,
}

fn wire_messages(messages: &[PromptMessage]) -> Vec<WireMessage<'_>> {
    messages
        .iter()
        .map(|m| WireMessage {
            role: m.role,
            content: vec![ContentPart {
                kind: "text",
                text: &m.content,
            }],
        })
        .collect()
}

pub struct HttpChatTransport {
    http_client: reqwest::Client,
    config: AiConfig,
}

impl HttpChatTransport {
    pub fn new(config: AiConfig) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn complete(&self, messages: &[PromptMessage]) -> Result<String, AiError> {
        let start = std::time::Instant::now();
        let request = ChatRequest {
            model: &self.config.model,
            messages: wire_messages(messages),
            max_completion_tokens: self.config.max_completion_tokens,
        };

        let mut builder = self.http_client.post(&self.config.endpoint).json(&request);
        if let Some(key) = &self.config.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(|e| {
            warn!(error = %e, "chat request failed");
            AiError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "chat API error");
            return Err(AiError::Transport(format!("{} {}", status, body)));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| AiError::InvalidOutput(e.to_string()))?;
        let content = reply_text(&json)
            .ok_or_else(|| AiError::InvalidOutput("response missing content".into()))?;

        debug!(
            model = %self.config.model,
            duration_ms = start.elapsed().as_millis(),
            "chat completion"
        );
        Ok(content)
    }
}

/// Text of the first choice (plain string or first text part), else a
/// top-level `output_text`.
fn reply_text(json: &Value) -> Option<String> {
    let message_content = json
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"));
    let from_choice = match message_content {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Array(parts)) => parts
            .iter()
            .find_map(|p| p.get("text").and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    };
    from_choice
        .filter(|s| !s.is_empty())
        .or_else(|| json.get("output_text").and_then(Value::as_str).map(str::to_string))
}
