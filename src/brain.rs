use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;
use thiserror::Error;

/// Failure talking to the local model server. Cold starts are expected, so a
/// timeout is kept apart from a server that is not running at all.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("model server unreachable at {0}")]
    Unreachable(String),
    #[error("model did not answer within {0}s")]
    Timeout(u64),
    #[error("model server error: {0}")]
    Api(String),
    #[error("unexpected model response: {0}")]
    Parse(String),
}

impl ModelError {
    /// Message for the user, worded per failure class.
    pub fn user_message(&self) -> String {
        match self {
            ModelError::Unreachable(_) => {
                "Ollama is not running. Start it with: ollama serve".to_string()
            }
            ModelError::Timeout(secs) => format!(
                "Timeout ({}s). The model may still be loading for the first time. Try again.",
                secs
            ),
            ModelError::Api(detail) => format!("Ollama error: {}", detail),
            ModelError::Parse(detail) => format!("Ollama error: unexpected response: {}", detail),
        }
    }
}

/// Sampling knobs forwarded to the model server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerateOptions {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub context_size: u32,
}

impl GenerateOptions {
    /// Short, fairly creative replies for conversation.
    pub const CHAT: Self = Self {
        max_tokens: 100,
        temperature: 0.7,
        top_p: 0.9,
        context_size: 2048,
    };

    /// Room for one JSON object, low temperature so it stays on schema.
    pub const PLANNER: Self = Self {
        max_tokens: 200,
        temperature: 0.2,
        top_p: 0.9,
        context_size: 4096,
    };

    /// Screen answers run longer than chat replies.
    pub const VISION: Self = Self {
        max_tokens: 512,
        temperature: 0.2,
        top_p: 0.9,
        context_size: 4096,
    };
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self::CHAT
    }
}

/// Text completion against a generative model.
#[async_trait]
pub trait Completion: Send + Sync {
    async fn complete(&self, prompt: &str, options: &GenerateOptions)
    -> Result<String, ModelError>;
}

/// Client for Ollama's `/api/generate` endpoint.
pub struct OllamaBrain {
    client: Client,
    base_url: String,
    model: String,
    timeout_secs: u64,
}

impl OllamaBrain {
    pub fn new(base_url: &str, model: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Non-streaming generate call. `images` are base64 encoded and only
    /// meaningful for vision models.
    pub async fn generate(
        &self,
        prompt: &str,
        images: &[String],
        options: &GenerateOptions,
    ) -> Result<String, ModelError> {
        let url = format!("{}/api/generate", self.base_url);

        let mut body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "num_predict": options.max_tokens,
                "temperature": options.temperature,
                "top_p": options.top_p,
                "num_ctx": options.context_size,
            },
        });
        if !images.is_empty() {
            body["images"] = json!(images);
        }

        tracing::debug!("[Brain] POST {} ({} chars)", url, prompt.len());

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.classify_error(e))?;

        let status = response.status();
        let json_resp: serde_json::Value = response
            .json()
            .await
            .map_err(|e| self.classify_error(e))?;

        if !status.is_success() {
            let err_msg = json_resp["error"].as_str().unwrap_or("Unknown API error");
            tracing::warn!("[Brain] API error ({}): {}", status, err_msg);
            return Err(ModelError::Api(format!("{}: {}", status, err_msg)));
        }

        let content = json_resp["response"]
            .as_str()
            .ok_or_else(|| ModelError::Parse(format!("no `response` field in {}", json_resp)))?;

        tracing::debug!("[Brain] Model says: {}", content);
        Ok(content.trim().to_string())
    }

    fn classify_error(&self, e: reqwest::Error) -> ModelError {
        if e.is_timeout() {
            ModelError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            ModelError::Unreachable(self.base_url.clone())
        } else if e.is_decode() {
            ModelError::Parse(e.to_string())
        } else {
            ModelError::Api(e.to_string())
        }
    }
}

#[async_trait]
impl Completion for OllamaBrain {
    async fn complete(
        &self,
        prompt: &str,
        options: &GenerateOptions,
    ) -> Result<String, ModelError> {
        self.generate(prompt, &[], options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_messages_are_distinct() {
        let unreachable = ModelError::Unreachable("http://127.0.0.1:11434".into()).user_message();
        let timeout = ModelError::Timeout(30).user_message();
        let other = ModelError::Api("500".into()).user_message();
        assert!(unreachable.contains("ollama serve"));
        assert!(timeout.contains("30s") && timeout.contains("loading"));
        assert!(other.starts_with("Ollama error"));
    }

    #[test]
    fn test_api_error_is_not_prefixed_twice() {
        let message = ModelError::Api("HTTP 500: model not found".into()).user_message();
        assert_eq!(message, "Ollama error: HTTP 500: model not found");
        assert!(!message.contains("model server error"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_unreachable() {
        // Bind then drop to get a port nobody listens on
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let brain = OllamaBrain::new(&format!("http://127.0.0.1:{}", port), "m", 5).unwrap();
        let err = brain
            .complete("hi", &GenerateOptions::CHAT)
            .await
            .unwrap_err();
        assert!(matches!(err, ModelError::Unreachable(_)), "{:?}", err);
    }
}
