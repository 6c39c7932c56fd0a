//! reqwest-backed provider speaking the three supported wire formats.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::RETRY_AFTER;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

use articleforge_shared::{ArticleForgeError, ProviderConfig, ProviderKind, Result};

use crate::{GenerateOptions, Prompt, ProviderClient, ProviderError};

/// User-Agent string for provider requests.
const USER_AGENT: &str = concat!("ArticleForge/", env!("CARGO_PKG_VERSION"));

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// One configured provider endpoint.
pub struct HttpProvider {
    kind: ProviderKind,
    model: String,
    api_key: String,
    base_url: String,
    max_tokens: u32,
    temperature: f32,
    client: Client,
}

impl HttpProvider {
    /// Build a provider from its config entry and resolved API key.
    pub fn new(config: &ProviderConfig, api_key: String, timeout: Duration) -> Result<Self> {
        let base_url = config
            .base_url
            .clone()
            .unwrap_or_else(|| config.kind.default_base_url().to_string());
        Url::parse(&base_url).map_err(|e| {
            ArticleForgeError::config(format!("invalid base_url '{base_url}': {e}"))
        })?;

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| {
                ArticleForgeError::Provider(format!("failed to build HTTP client: {e}"))
            })?;

        Ok(Self {
            kind: config.kind,
            model: config.model.clone(),
            api_key: api_key.trim().to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            client,
        })
    }

    fn endpoint(&self) -> String {
        match self.kind {
            ProviderKind::OpenRouter | ProviderKind::OpenAi => {
                format!("{}/chat/completions", self.base_url)
            }
            ProviderKind::Anthropic => format!("{}/messages", self.base_url),
            ProviderKind::Gemini => {
                format!("{}/models/{}:generateContent", self.base_url, self.model)
            }
        }
    }

    fn request_body(&self, prompt: &Prompt, options: &GenerateOptions) -> Value {
        let max_tokens = options.max_tokens.unwrap_or(self.max_tokens);
        let temperature = options.temperature.unwrap_or(self.temperature);

        match self.kind {
            ProviderKind::OpenRouter | ProviderKind::OpenAi => json!({
                "model": self.model,
                "messages": [
                    { "role": "system", "content": prompt.system },
                    { "role": "user", "content": prompt.user },
                ],
                "max_tokens": max_tokens,
                "temperature": temperature,
            }),
            ProviderKind::Anthropic => json!({
                "model": self.model,
                "system": prompt.system,
                "messages": [{ "role": "user", "content": prompt.user }],
                "max_tokens": max_tokens,
                "temperature": temperature,
            }),
            ProviderKind::Gemini => json!({
                "systemInstruction": { "parts": [{ "text": prompt.system }] },
                "contents": [{ "role": "user", "parts": [{ "text": prompt.user }] }],
                "generationConfig": {
                    "maxOutputTokens": max_tokens,
                    "temperature": temperature,
                },
            }),
        }
    }

    fn extract_text(&self, body: &Value) -> Option<String> {
        let text = match self.kind {
            ProviderKind::OpenRouter | ProviderKind::OpenAi => body["choices"]
                .as_array()?
                .first()?["message"]["content"]
                .as_str()?
                .to_string(),
            ProviderKind::Anthropic => body["content"]
                .as_array()?
                .iter()
                .filter(|block| block["type"] == "text")
                .filter_map(|block| block["text"].as_str())
                .collect::<Vec<_>>()
                .join(""),
            ProviderKind::Gemini => body["candidates"]
                .as_array()?
                .first()?["content"]["parts"]
                .as_array()?
                .iter()
                .filter_map(|part| part["text"].as_str())
                .collect::<Vec<_>>()
                .join(""),
        };
        Some(text)
    }
}

#[async_trait]
impl ProviderClient for HttpProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerateOptions,
    ) -> std::result::Result<String, ProviderError> {
        let url = self.endpoint();
        let request = self
            .client
            .post(&url)
            .header("content-type", "application/json")
            .json(&self.request_body(prompt, options));

        let request = match self.kind {
            ProviderKind::OpenRouter | ProviderKind::OpenAi => {
                request.bearer_auth(&self.api_key)
            }
            ProviderKind::Anthropic => request
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            ProviderKind::Gemini => request.header("x-goog-api-key", &self.api_key),
        };

        let start = std::time::Instant::now();
        let resp = request.send().await?;
        let status = resp.status();

        if !status.is_success() {
            let retry_after = resp
                .headers()
                .get(RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            let text = resp.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                &text,
                retry_after,
            ));
        }

        let body: Value = resp.json().await?;
        let text = self
            .extract_text(&body)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ProviderError::InvalidResponse("no text in response".into()))?;

        debug!(
            provider = %self.kind,
            model = %self.model,
            latency_ms = start.elapsed().as_millis() as u64,
            chars = text.len(),
            "provider call complete"
        );
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider(kind: ProviderKind, base_url: &str) -> HttpProvider {
        let config = ProviderConfig {
            kind,
            model: "test-model".into(),
            api_key_env: "UNUSED".into(),
            base_url: Some(base_url.into()),
            max_tokens: 256,
            temperature: 0.5,
        };
        HttpProvider::new(&config, "sk-test".into(), Duration::from_secs(5)).expect("provider")
    }

    #[tokio::test]
    async fn openai_compatible_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "role": "assistant", "content": "Hello there." } }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let p = provider(ProviderKind::OpenRouter, &server.uri());
        let text = p
            .generate(&Prompt::new("sys", "user"), &GenerateOptions::default())
            .await
            .expect("generate");
        assert_eq!(text, "Hello there.");
    }

    #[tokio::test]
    async fn anthropic_shape_joins_text_blocks() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/messages"))
            .and(header("x-api-key", "sk-test"))
            .and(header("anthropic-version", ANTHROPIC_VERSION))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "content": [
                    { "type": "text", "text": "Part one. " },
                    { "type": "text", "text": "Part two." }
                ]
            })))
            .mount(&server)
            .await;

        let p = provider(ProviderKind::Anthropic, &server.uri());
        let text = p
            .generate(&Prompt::new("sys", "user"), &GenerateOptions::default())
            .await
            .expect("generate");
        assert_eq!(text, "Part one. Part two.");
    }

    #[tokio::test]
    async fn gemini_shape() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/models/test-model:generateContent"))
            .and(header("x-goog-api-key", "sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{ "content": { "parts": [{ "text": "Gemini says hi." }] } }]
            })))
            .mount(&server)
            .await;

        let p = provider(ProviderKind::Gemini, &server.uri());
        let text = p
            .generate(&Prompt::new("sys", "user"), &GenerateOptions::default())
            .await
            .expect("generate");
        assert_eq!(text, "Gemini says hi.");
    }

    #[tokio::test]
    async fn error_statuses_are_classified() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "3"))
            .mount(&server)
            .await;

        let p = provider(ProviderKind::OpenAi, &server.uri());
        let err = p
            .generate(&Prompt::new("s", "u"), &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            ProviderError::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(3)
        ));
    }

    #[tokio::test]
    async fn auth_failure_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid key"))
            .mount(&server)
            .await;

        let p = provider(ProviderKind::OpenRouter, &server.uri());
        let err = p
            .generate(&Prompt::new("s", "u"), &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Auth(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn empty_completion_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{ "message": { "content": "   " } }]
            })))
            .mount(&server)
            .await;

        let p = provider(ProviderKind::OpenRouter, &server.uri());
        let err = p
            .generate(&Prompt::new("s", "u"), &GenerateOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn rejects_bad_base_url() {
        let config = ProviderConfig {
            kind: ProviderKind::OpenAi,
            model: "m".into(),
            api_key_env: "K".into(),
            base_url: Some("not a url".into()),
            max_tokens: 1,
            temperature: 0.0,
        };
        assert!(HttpProvider::new(&config, "k".into(), Duration::from_secs(1)).is_err());
    }
}
