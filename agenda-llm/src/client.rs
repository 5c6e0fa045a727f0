use crate::error::{LlmError, Result};
use crate::ollama::{OLLAMA_DEFAULT_BASE_URL, OllamaClient};
use crate::openai::{OPENAI_DEFAULT_BASE_URL, OpenAiClient};
use crate::types::{ChatMessage, ChatResponse, ToolDefinition};
use async_trait::async_trait;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAI,
    Ollama,
}

impl Provider {
    pub fn as_str(self) -> &'static str {
        match self {
            Provider::OpenAI => "openai",
            Provider::Ollama => "ollama",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::OpenAI => OPENAI_DEFAULT_BASE_URL,
            Provider::Ollama => OLLAMA_DEFAULT_BASE_URL,
        }
    }
}

impl FromStr for Provider {
    type Err = LlmError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" | "openai-compatible" => Ok(Provider::OpenAI),
            "ollama" => Ok(Provider::Ollama),
            other => Err(LlmError::InvalidInput(format!(
                "unsupported llm provider {other:?}; expected one of: openai, ollama"
            ))),
        }
    }
}

/// Anything that can answer a chat completion with tool calling.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model(&self) -> &str;

    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse>;
}

#[derive(Debug, Clone)]
pub struct LlmClientConfig {
    pub provider: Provider,
    pub model: String,
    /// Falls back to the provider's public endpoint when `None`.
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub timeout: Duration,
    pub temperature: Option<f32>,
    /// Ask reasoning-capable Ollama models to emit their thinking separately.
    pub think: bool,
}

#[derive(Clone)]
pub struct LlmClient {
    provider: Provider,
    model: String,
    timeout: Duration,
    inner: Backend,
}

#[derive(Clone)]
enum Backend {
    OpenAI(OpenAiClient),
    Ollama(OllamaClient),
}

impl LlmClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(cfg: LlmClientConfig) -> Result<Self> {
        if cfg.model.trim().is_empty() {
            return Err(LlmError::InvalidInput("model must be non-empty".to_string()));
        }
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| LlmError::InvalidInput(format!("build http client: {e}")))?;
        let base_url = cfg
            .base_url
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| cfg.provider.default_base_url().to_string());

        let inner = match cfg.provider {
            Provider::OpenAI => Backend::OpenAI(OpenAiClient::new(
                http,
                &base_url,
                cfg.api_key.as_deref().filter(|k| !k.trim().is_empty()),
                &cfg.model,
                cfg.temperature,
            )),
            Provider::Ollama => Backend::Ollama(OllamaClient::new(
                http,
                &base_url,
                &cfg.model,
                cfg.temperature,
                cfg.think,
            )),
        };

        tracing::debug!(
            provider = cfg.provider.as_str(),
            model = %cfg.model,
            base_url = %base_url,
            timeout_secs = cfg.timeout.as_secs(),
            "llm client configured"
        );

        Ok(Self {
            provider: cfg.provider,
            model: cfg.model,
            timeout: cfg.timeout,
            inner,
        })
    }

    pub fn provider(&self) -> Provider {
        self.provider
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    fn model(&self) -> &str {
        &self.model
    }

    #[tracing::instrument(level = "info", skip_all, fields(provider = self.provider.as_str()))]
    async fn chat(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
    ) -> Result<ChatResponse> {
        let result = match &self.inner {
            Backend::OpenAI(c) => c.chat(messages, tools).await,
            Backend::Ollama(c) => c.chat(messages, tools).await,
        };
        result.map_err(|e| match e {
            LlmError::Timeout(_) => LlmError::Timeout(self.timeout.as_secs()),
            other => other,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn config(provider: Provider, base_url: String, timeout: Duration) -> LlmClientConfig {
        LlmClientConfig {
            provider,
            model: "test-model".to_string(),
            base_url: Some(base_url),
            api_key: None,
            timeout,
            temperature: Some(0.0),
            think: false,
        }
    }

    #[test]
    fn provider_parses_case_insensitively() {
        assert_eq!("Ollama".parse::<Provider>().expect("parse"), Provider::Ollama);
        assert_eq!("openai".parse::<Provider>().expect("parse"), Provider::OpenAI);
        let err = "anthropic".parse::<Provider>().expect_err("unsupported");
        assert!(err.to_string().contains("unsupported llm provider"));
    }

    #[test]
    fn empty_model_is_rejected() {
        let mut cfg = config(
            Provider::OpenAI,
            "http://localhost".to_string(),
            Duration::from_secs(1),
        );
        cfg.model = "  ".to_string();
        assert!(LlmClient::new(cfg).is_err());
    }

    #[tokio::test]
    async fn slow_server_surfaces_timeout_with_configured_seconds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_secs(3))
                    .set_body_json(json!({"message": {"content": "late"}})),
            )
            .mount(&server)
            .await;

        let client = LlmClient::new(config(
            Provider::Ollama,
            server.uri(),
            Duration::from_secs(1),
        ))
        .expect("client builds");
        let err = client
            .chat(&[ChatMessage::user("hi")], &[])
            .await
            .expect_err("request must time out");
        assert!(matches!(err, LlmError::Timeout(1)), "got {err:?}");
    }
}
