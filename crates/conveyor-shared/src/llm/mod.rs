//! LLM provider abstraction driving the chat graph's generate/reflect/judge calls.
//!
//! Shaped after the provider/chat trait split in `querymt`'s `chat` module:
//! a small set of message types plus a trait any HTTP-backed or test-double
//! provider implements, so the chat graph and its tests never depend on a
//! concrete vendor SDK.

use async_stream::try_stream;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CompletionUsage {
    pub tokens_input: u32,
    pub tokens_output: u32,
    pub cost_usd: f64,
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub content: String,
    pub usage: CompletionUsage,
}

/// A single decrypted API key scoped to the duration of one call (§4.4, §9).
#[derive(Clone)]
pub struct ApiKey(pub String);

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Pricing used to compute `cost_usd` from token counts, sourced from
/// provider-config tuning parameters (§4.5.4).
#[derive(Debug, Clone, Copy)]
pub struct ModelPricing {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

impl ModelPricing {
    pub fn cost(&self, tokens_input: u32, tokens_output: u32) -> f64 {
        (tokens_input as f64 / 1000.0) * self.input_per_1k
            + (tokens_output as f64 / 1000.0) * self.output_per_1k
    }
}

/// Returned by a streaming completion when the upstream provider signals a rate limit.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("rate limited (HTTP 429)")]
    RateLimited,
    #[error("request timed out")]
    Timeout,
    #[error("upstream error: {0}")]
    Upstream(String),
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// Single-shot, non-streaming completion.
    async fn complete(
        &self,
        key: &ApiKey,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<CompletionResponse, LlmError>;

    /// Streaming completion; yields individual token strings.
    async fn stream(
        &self,
        key: &ApiKey,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError>;
}

/// HTTP-backed provider speaking an OpenAI-compatible chat completions API.
/// Exact wire protocol details are intentionally unspecified beyond what the
/// rotation layer needs (§1 Non-goals).
pub struct HttpLlmProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpLlmProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn complete(
        &self,
        key: &ApiKey,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<CompletionResponse, LlmError> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
        });
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&key.0)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Upstream(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(LlmError::Upstream(format!("status {}", resp.status())));
        }

        #[derive(Deserialize)]
        struct Choice {
            message: ChatMessage,
        }
        #[derive(Deserialize)]
        struct Usage {
            prompt_tokens: u32,
            completion_tokens: u32,
        }
        #[derive(Deserialize)]
        struct Completion {
            choices: Vec<Choice>,
            usage: Usage,
        }

        let parsed: Completion = resp
            .json()
            .await
            .map_err(|e| LlmError::Upstream(e.to_string()))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .unwrap_or_default();

        Ok(CompletionResponse {
            content,
            usage: CompletionUsage {
                tokens_input: parsed.usage.prompt_tokens,
                tokens_output: parsed.usage.completion_tokens,
                cost_usd: 0.0,
            },
        })
    }

    async fn stream(
        &self,
        key: &ApiKey,
        model: &str,
        messages: &[ChatMessage],
    ) -> Result<BoxStream<'static, Result<String, LlmError>>, LlmError> {
        let body = serde_json::json!({
            "model": model,
            "messages": messages,
            "stream": true,
        });
        let resp = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&key.0)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Upstream(e.to_string()))?;

        if resp.status().as_u16() == 429 {
            return Err(LlmError::RateLimited);
        }
        if !resp.status().is_success() {
            return Err(LlmError::Upstream(format!("status {}", resp.status())));
        }

        let stream = try_stream! {
            let mut bytes = resp.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk.map_err(|e| LlmError::Upstream(e.to_string()))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(event_end) = buffer.find("\n\n") {
                    let event_data = buffer[..event_end].to_string();
                    buffer = buffer[event_end + 2..].to_string();

                    for line in event_data.lines() {
                        let Some(data) = line.strip_prefix("data: ") else { continue };
                        if data.trim() == "[DONE]" {
                            return;
                        }
                        let Ok(event) = serde_json::from_str::<StreamChunk>(data) else { continue };
                        if let Some(choice) = event.choices.first() {
                            if let Some(content) = &choice.delta.content {
                                if !content.is_empty() {
                                    yield content.clone();
                                }
                            }
                        }
                    }
                }
            }
        };

        Ok(stream.boxed())
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pricing_computes_cost_from_tokens() {
        let pricing = ModelPricing {
            input_per_1k: 0.001,
            output_per_1k: 0.002,
        };
        let cost = pricing.cost(2000, 1000);
        assert!((cost - 0.004).abs() < 1e-9);
    }

    #[test]
    fn api_key_debug_redacts_value() {
        let key = ApiKey("sk-super-secret".into());
        assert_eq!(format!("{key:?}"), "ApiKey(<redacted>)");
    }
}
