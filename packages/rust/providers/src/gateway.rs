//! Ordered fallback and exponential-backoff retry across providers.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use articleforge_shared::{AppConfig, ArticleForgeError, PipelineConfig, ProviderKind};

use crate::{GenerateOptions, HttpProvider, Prompt, ProviderClient};

/// One failed call recorded by the gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub provider: ProviderKind,
    pub model: String,
    /// 1-based attempt number on this provider.
    pub attempt: u32,
    pub error: String,
    pub retryable: bool,
    /// Backoff slept before the next attempt on the same provider.
    pub delay: Option<Duration>,
}

/// A successful gateway call.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
    pub text: String,
    pub provider: ProviderKind,
    pub model: String,
    /// Failed attempts that preceded the success, in call order.
    pub failures: Vec<AttemptFailure>,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("no providers configured")]
    NoProviders,

    /// Every provider failed; carries every attempt in call order.
    #[error("all providers failed: {}", summarize(.failures))]
    Exhausted { failures: Vec<AttemptFailure> },
}

impl GatewayError {
    /// Last failure of each provider, in call order.
    pub fn last_failures(&self) -> Vec<&AttemptFailure> {
        match self {
            Self::NoProviders => Vec::new(),
            Self::Exhausted { failures } => last_per_provider(failures),
        }
    }
}

fn last_per_provider(failures: &[AttemptFailure]) -> Vec<&AttemptFailure> {
    let mut last: Vec<&AttemptFailure> = Vec::new();
    for f in failures {
        match last
            .iter_mut()
            .find(|l| l.provider == f.provider && l.model == f.model)
        {
            Some(slot) => *slot = f,
            None => last.push(f),
        }
    }
    last
}

fn summarize(failures: &[AttemptFailure]) -> String {
    last_per_provider(failures)
        .iter()
        .map(|f| format!("{} ({}): {}", f.provider, f.model, f.error))
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<GatewayError> for ArticleForgeError {
    fn from(e: GatewayError) -> Self {
        ArticleForgeError::Provider(e.to_string())
    }
}

/// Routes prompts across providers with per-provider retries.
pub struct ProviderGateway {
    providers: Vec<Arc<dyn ProviderClient>>,
    retries_per_provider: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl ProviderGateway {
    pub fn new(providers: Vec<Arc<dyn ProviderClient>>) -> Self {
        let defaults = PipelineConfig::default();
        Self {
            providers,
            retries_per_provider: defaults.retries_per_provider,
            base_delay: defaults.base_delay,
            max_delay: defaults.max_delay,
        }
    }

    pub fn with_retries(mut self, retries_per_provider: u32) -> Self {
        self.retries_per_provider = retries_per_provider.max(1);
        self
    }

    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Build HTTP providers for every configured entry whose API key is set.
    pub fn from_config(config: &AppConfig) -> Result<Self, ArticleForgeError> {
        let pipeline = PipelineConfig::from(config);
        let mut providers: Vec<Arc<dyn ProviderClient>> = Vec::new();

        for entry in &config.providers {
            match entry.api_key() {
                Some(key) => {
                    let provider = HttpProvider::new(entry, key, pipeline.request_timeout)?;
                    providers.push(Arc::new(provider));
                }
                None => warn!(
                    provider = %entry.kind,
                    env = %entry.api_key_env,
                    "API key not set, skipping provider"
                ),
            }
        }

        if providers.is_empty() {
            return Err(ArticleForgeError::config(
                "no provider has an API key set",
            ));
        }

        Ok(Self::new(providers)
            .with_retries(pipeline.retries_per_provider)
            .with_backoff(pipeline.base_delay, pipeline.max_delay))
    }

    /// Stable identifier of the routing order, e.g. `openrouter:model>anthropic:model`.
    pub fn route_key(&self) -> String {
        self.providers
            .iter()
            .map(|p| format!("{}:{}", p.kind(), p.model()))
            .collect::<Vec<_>>()
            .join(">")
    }

    /// Backoff before retry `attempt + 1`: `base * 2^(attempt-1)`, capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }

    /// Generate with the configured order and retry budget.
    pub async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerateOptions,
    ) -> Result<GatewayResponse, GatewayError> {
        let selected: Vec<&Arc<dyn ProviderClient>> = self.providers.iter().collect();
        self.call_in_order(selected, prompt, options, self.retries_per_provider)
            .await
    }

    /// Generate trying the registered providers matching `order`, in that
    /// order, each up to `retries_per_provider` times. A provider matched by
    /// more than one entry is tried once, at its first position.
    pub async fn generate_ordered(
        &self,
        prompt: &Prompt,
        options: &GenerateOptions,
        order: &[ProviderKind],
        retries_per_provider: u32,
    ) -> Result<GatewayResponse, GatewayError> {
        let mut selected: Vec<&Arc<dyn ProviderClient>> = Vec::new();
        for kind in order {
            for provider in self.providers.iter().filter(|p| p.kind() == *kind) {
                if !selected.iter().any(|s| Arc::ptr_eq(s, provider)) {
                    selected.push(provider);
                }
            }
        }
        self.call_in_order(selected, prompt, options, retries_per_provider)
            .await
    }

    #[instrument(skip_all, fields(providers = selected.len(), retries = retries_per_provider))]
    async fn call_in_order(
        &self,
        selected: Vec<&Arc<dyn ProviderClient>>,
        prompt: &Prompt,
        options: &GenerateOptions,
        retries_per_provider: u32,
    ) -> Result<GatewayResponse, GatewayError> {
        let retries = retries_per_provider.max(1);
        if selected.is_empty() {
            return Err(GatewayError::NoProviders);
        }

        let mut failures = Vec::new();

        for provider in selected {
            for attempt in 1..=retries {
                match provider.generate(prompt, options).await {
                    Ok(text) => {
                        if !failures.is_empty() {
                            info!(
                                provider = %provider.kind(),
                                failed_attempts = failures.len(),
                                "provider succeeded after failures"
                            );
                        }
                        return Ok(GatewayResponse {
                            text,
                            provider: provider.kind(),
                            model: provider.model().to_string(),
                            failures,
                        });
                    }
                    Err(e) => {
                        let retryable = e.is_retryable();
                        let delay = (retryable && attempt < retries).then(|| {
                            let backoff = self.backoff(attempt);
                            match &e {
                                crate::ProviderError::RateLimited {
                                    retry_after: Some(after),
                                } => backoff.max(*after).min(self.max_delay),
                                _ => backoff,
                            }
                        });

                        warn!(
                            provider = %provider.kind(),
                            model = provider.model(),
                            attempt,
                            retryable,
                            error = %e,
                            "provider call failed"
                        );

                        failures.push(AttemptFailure {
                            provider: provider.kind(),
                            model: provider.model().to_string(),
                            attempt,
                            error: e.to_string(),
                            retryable,
                            delay,
                        });

                        match delay {
                            Some(d) => tokio::time::sleep(d).await,
                            None => break,
                        }
                    }
                }
            }
        }

        Err(GatewayError::Exhausted { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ProviderError;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scripted provider: pops one outcome per call, then repeats the fallback.
    struct MockProvider {
        kind: ProviderKind,
        model: &'static str,
        script: Mutex<VecDeque<Result<String, ProviderError>>>,
        fallback: Result<String, ProviderError>,
        calls: AtomicU32,
    }

    impl MockProvider {
        fn new(kind: ProviderKind, fallback: Result<String, ProviderError>) -> Self {
            Self {
                kind,
                model: "mock",
                script: Mutex::new(VecDeque::new()),
                fallback,
                calls: AtomicU32::new(0),
            }
        }

        fn named(mut self, model: &'static str) -> Self {
            self.model = model;
            self
        }

        fn then(self, outcome: Result<String, ProviderError>) -> Self {
            self.script.lock().unwrap().push_back(outcome);
            self
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ProviderClient for MockProvider {
        fn kind(&self) -> ProviderKind {
            self.kind
        }

        fn model(&self) -> &str {
            self.model
        }

        async fn generate(
            &self,
            _prompt: &Prompt,
            _options: &GenerateOptions,
        ) -> Result<String, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.script.lock().unwrap().pop_front();
            next.unwrap_or_else(|| self.fallback.clone())
        }
    }

    fn gateway(providers: Vec<Arc<MockProvider>>) -> ProviderGateway {
        let clients: Vec<Arc<dyn ProviderClient>> = providers
            .into_iter()
            .map(|p| p as Arc<dyn ProviderClient>)
            .collect();
        ProviderGateway::new(clients)
            .with_backoff(Duration::from_millis(2), Duration::from_millis(50))
    }

    fn server_error() -> Result<String, ProviderError> {
        Err(ProviderError::from_status(503, "overloaded", None))
    }

    #[tokio::test]
    async fn falls_back_after_retries_exhausted() {
        let a = Arc::new(MockProvider::new(ProviderKind::OpenRouter, server_error()));
        let b = Arc::new(MockProvider::new(ProviderKind::Anthropic, Ok("from b".into())));
        let c = Arc::new(MockProvider::new(ProviderKind::Gemini, Ok("from c".into())));
        let gw = gateway(vec![a.clone(), b.clone(), c.clone()]).with_retries(2);

        let resp = gw
            .generate(&Prompt::new("s", "u"), &GenerateOptions::default())
            .await
            .expect("b answers");

        assert_eq!(resp.text, "from b");
        assert_eq!(resp.provider, ProviderKind::Anthropic);
        assert_eq!(a.calls(), 2);
        assert_eq!(b.calls(), 1);
        assert_eq!(c.calls(), 0);

        assert_eq!(resp.failures.len(), 2);
        assert!(resp.failures.iter().all(|f| f.provider == ProviderKind::OpenRouter));
        assert_eq!(resp.failures[0].delay, Some(Duration::from_millis(2)));
        assert_eq!(resp.failures[1].delay, None);
    }

    #[tokio::test]
    async fn backoff_doubles_per_attempt() {
        let a = Arc::new(
            MockProvider::new(ProviderKind::OpenRouter, Ok("ok".into()))
                .then(server_error())
                .then(Err(ProviderError::Timeout))
                .then(Err(ProviderError::Network("reset".into()))),
        );
        let gw = gateway(vec![a.clone()]).with_retries(4);

        let resp = gw
            .generate(&Prompt::default(), &GenerateOptions::default())
            .await
            .expect("fourth attempt succeeds");

        let delays: Vec<_> = resp.failures.iter().map(|f| f.delay).collect();
        assert_eq!(
            delays,
            [
                Some(Duration::from_millis(2)),
                Some(Duration::from_millis(4)),
                Some(Duration::from_millis(8)),
            ]
        );
        assert_eq!(a.calls(), 4);
    }

    #[tokio::test]
    async fn non_retryable_skips_to_next_provider() {
        let a = Arc::new(MockProvider::new(
            ProviderKind::OpenRouter,
            Err(ProviderError::Auth("bad key".into())),
        ));
        let b = Arc::new(MockProvider::new(ProviderKind::OpenAi, Ok("b".into())));
        let gw = gateway(vec![a.clone(), b.clone()]).with_retries(3);

        let resp = gw
            .generate(&Prompt::default(), &GenerateOptions::default())
            .await
            .unwrap();
        assert_eq!(resp.text, "b");
        assert_eq!(a.calls(), 1);
        assert!(!resp.failures[0].retryable);
    }

    #[tokio::test]
    async fn exhaustion_lists_every_provider() {
        let a = Arc::new(MockProvider::new(ProviderKind::OpenRouter, server_error()));
        let b = Arc::new(MockProvider::new(
            ProviderKind::Anthropic,
            Err(ProviderError::InvalidResponse("empty".into())),
        ));
        let gw = gateway(vec![a, b]).with_retries(2);

        let err = gw
            .generate(&Prompt::default(), &GenerateOptions::default())
            .await
            .unwrap_err();

        let last = err.last_failures();
        assert_eq!(last.len(), 2);
        assert_eq!(last[0].provider, ProviderKind::OpenRouter);
        assert_eq!(last[0].attempt, 2);
        assert_eq!(last[1].provider, ProviderKind::Anthropic);

        let message = ArticleForgeError::from(err).to_string();
        assert!(message.contains("openrouter"));
        assert!(message.contains("anthropic"));
    }

    #[tokio::test]
    async fn explicit_order_is_respected() {
        let a = Arc::new(MockProvider::new(ProviderKind::OpenRouter, Ok("a".into())));
        let b = Arc::new(MockProvider::new(ProviderKind::Gemini, Ok("g".into())));
        let gw = gateway(vec![a.clone(), b.clone()]);

        let resp = gw
            .generate_ordered(
                &Prompt::default(),
                &GenerateOptions::default(),
                &[ProviderKind::Gemini, ProviderKind::OpenRouter],
                1,
            )
            .await
            .unwrap();
        assert_eq!(resp.text, "g");
        assert_eq!(a.calls(), 0);

        let none = gw
            .generate_ordered(
                &Prompt::default(),
                &GenerateOptions::default(),
                &[ProviderKind::OpenAi],
                1,
            )
            .await;
        assert!(matches!(none, Err(GatewayError::NoProviders)));
    }

    #[tokio::test]
    async fn providers_sharing_a_kind_are_each_tried_once_per_attempt() {
        let auth = || Err(ProviderError::Auth("bad key".into()));
        let m1 = Arc::new(MockProvider::new(ProviderKind::OpenRouter, auth()).named("m1"));
        let m2 = Arc::new(MockProvider::new(ProviderKind::OpenRouter, auth()).named("m2"));
        let gw = gateway(vec![m1.clone(), m2.clone()]).with_retries(1);

        let err = gw
            .generate(&Prompt::default(), &GenerateOptions::default())
            .await
            .unwrap_err();
        assert_eq!(m1.calls(), 1);
        assert_eq!(m2.calls(), 1);
        let GatewayError::Exhausted { failures } = &err else {
            panic!("expected exhaustion, got {err:?}");
        };
        let models: Vec<_> = failures.iter().map(|f| f.model.as_str()).collect();
        assert_eq!(models, ["m1", "m2"]);

        let _ = gw
            .generate_ordered(
                &Prompt::default(),
                &GenerateOptions::default(),
                &[ProviderKind::OpenRouter, ProviderKind::OpenRouter],
                1,
            )
            .await;
        assert_eq!(m1.calls(), 2);
        assert_eq!(m2.calls(), 2);
    }

    #[test]
    fn backoff_is_capped() {
        let gw = ProviderGateway::new(Vec::new())
            .with_backoff(Duration::from_secs(1), Duration::from_secs(5));
        assert_eq!(gw.backoff(1), Duration::from_secs(1));
        assert_eq!(gw.backoff(3), Duration::from_secs(4));
        assert_eq!(gw.backoff(4), Duration::from_secs(5));
        assert_eq!(gw.backoff(40), Duration::from_secs(5));
    }

    #[test]
    fn from_config_skips_providers_without_keys() {
        let mut config = AppConfig::default();
        for (i, p) in config.providers.iter_mut().enumerate() {
            p.api_key_env = format!("AF_GATEWAY_TEST_MISSING_{i}_4321");
        }
        assert!(ProviderGateway::from_config(&config).is_err());
    }
}
