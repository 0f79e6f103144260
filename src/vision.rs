//! Photo description used to seed prompt synthesis.

use std::sync::Arc;

use tracing::info;

use crate::cascade::{Cascade, FixedTextTier, ProviderTier, ToChatRequest};
use crate::config::{Config, VISION_SYSTEM_PROMPT, VISION_USER_PROMPT};
use crate::llm::{ChatProvider, ChatRequest, ProviderRegistry};
use crate::utils::text::collapse_whitespace;

pub const DEFAULT_DESCRIPTION: &str = "a person, portrait, high quality, same face, same character";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisionRequest {
    pub image_data_url: String,
}

impl VisionRequest {
    pub fn new(image_data_url: impl Into<String>) -> Self {
        Self {
            image_data_url: image_data_url.into(),
        }
    }
}

impl ToChatRequest for VisionRequest {
    fn to_chat_request(&self) -> ChatRequest {
        ChatRequest::text(VISION_SYSTEM_PROMPT, VISION_USER_PROMPT).with_image(&self.image_data_url)
    }
}

/// Describes a photo through the local vision model, then the remote one,
/// and finally a fixed generic description.
pub struct VisionDescriber {
    cascade: Cascade<VisionRequest>,
}

impl VisionDescriber {
    pub fn new(registry: &ProviderRegistry, config: &Config) -> Self {
        Self::with_providers(
            registry
                .local
                .clone()
                .map(|provider| (provider, config.ollama_vision_model.clone())),
            registry
                .remote
                .clone()
                .map(|provider| (provider, config.openrouter_vision_model.clone())),
        )
    }

    pub fn with_providers(
        local: Option<(Arc<dyn ChatProvider>, String)>,
        remote: Option<(Arc<dyn ChatProvider>, String)>,
    ) -> Self {
        let mut cascade: Cascade<VisionRequest> = Cascade::new("vision", collapse_whitespace);
        if let Some((provider, model)) = local {
            cascade.push(Box::new(ProviderTier::new("local", provider, &model)));
        }
        if let Some((provider, model)) = remote {
            cascade.push(Box::new(ProviderTier::new("remote", provider, &model)));
        }
        cascade.push(Box::new(FixedTextTier::new("default", DEFAULT_DESCRIPTION)));
        info!("Vision describer tiers: {}", cascade.tier_names().join(" -> "));
        Self { cascade }
    }

    pub async fn describe(&self, request: &VisionRequest) -> String {
        match self.cascade.resolve(request).await {
            Some(resolved) => resolved.text,
            None => DEFAULT_DESCRIPTION.to_string(),
        }
    }
}
