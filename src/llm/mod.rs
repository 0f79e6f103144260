pub mod media;
pub mod ollama;
pub mod openrouter;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use crate::config::Config;

pub use ollama::OllamaProvider;
pub use openrouter::OpenRouterProvider;

/// One system + user exchange, optionally carrying a single image as a
/// `data:` URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub system_prompt: String,
    pub user_content: String,
    pub image_data_url: Option<String>,
}

impl ChatRequest {
    pub fn text(system_prompt: &str, user_content: impl Into<String>) -> Self {
        Self {
            system_prompt: system_prompt.to_string(),
            user_content: user_content.into(),
            image_data_url: None,
        }
    }

    pub fn with_image(mut self, data_url: impl Into<String>) -> Self {
        self.image_data_url = Some(data_url.into());
        self
    }
}

/// A hosted or self-hosted text-generation endpoint.
#[async_trait]
pub trait ChatProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the raw completion text; empty text is a valid answer here and
    /// is judged by the caller.
    async fn complete(&self, model: &str, request: &ChatRequest) -> Result<String>;
}

/// Provider handles built once at startup. A missing entry means the provider
/// is not configured.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    pub local: Option<Arc<dyn ChatProvider>>,
    pub remote: Option<Arc<dyn ChatProvider>>,
}

impl ProviderRegistry {
    pub fn from_config(config: &Config) -> Self {
        let local = config.ollama_base_url.as_ref().map(|base_url| {
            info!("Local provider enabled: Ollama at {}", base_url);
            Arc::new(OllamaProvider::new(
                base_url,
                config.ollama_temperature,
                config.provider_timeout_seconds,
            )) as Arc<dyn ChatProvider>
        });
        if !config.local_provider_enabled() {
            info!("Local provider disabled (OLLAMA_BASE_URL not set)");
        }

        let remote = config.openrouter_api_key.as_ref().map(|api_key| {
            info!("Remote provider enabled: OpenRouter at {}", config.openrouter_base_url);
            Arc::new(OpenRouterProvider::new(
                &config.openrouter_base_url,
                api_key,
                config.openrouter_temperature,
                config.openrouter_top_p,
                config.provider_timeout_seconds,
            )) as Arc<dyn ChatProvider>
        });
        if !config.remote_provider_enabled() {
            info!("Remote provider disabled (OPENROUTER_API_KEY not set)");
        }

        Self { local, remote }
    }
}
