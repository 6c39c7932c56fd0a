//! Text-generation providers and the fallback/retry gateway.
//!
//! Every backend implements [`ProviderClient`]. [`ProviderGateway`] is the
//! only place that decides which provider to call next and when to retry.

mod error;
mod gateway;
mod http;

use async_trait::async_trait;

use articleforge_shared::ProviderKind;

pub use error::ProviderError;
pub use gateway::{AttemptFailure, GatewayError, GatewayResponse, ProviderGateway};
pub use http::HttpProvider;

/// A system + user prompt pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Prompt {
    pub system: String,
    pub user: String,
}

impl Prompt {
    pub fn new(system: impl Into<String>, user: impl Into<String>) -> Self {
        Self {
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Per-call overrides. `None` falls back to the provider's configured value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct GenerateOptions {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f32>,
}

/// A single text-generation backend.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn model(&self) -> &str;

    /// Generate a completion. Errors carry their retry classification.
    async fn generate(
        &self,
        prompt: &Prompt,
        options: &GenerateOptions,
    ) -> Result<String, ProviderError>;
}
