//! Ordered fallback across text sources: each tier either yields text or
//! declines, and the first tier whose sanitized answer is non-empty wins.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::llm::{ChatProvider, ChatRequest};

/// Requests that can be phrased as a single chat exchange.
pub trait ToChatRequest {
    fn to_chat_request(&self) -> ChatRequest;
}

#[async_trait]
pub trait Tier<R: Sync>: Send + Sync {
    fn name(&self) -> &str;

    /// `None` means the tier declined or failed; the cascade moves on.
    async fn attempt(&self, request: &R) -> Option<String>;
}

/// A tier backed by a chat provider and a fixed model identifier.
pub struct ProviderTier {
    label: String,
    provider: Arc<dyn ChatProvider>,
    model: String,
}

impl ProviderTier {
    pub fn new(label: &str, provider: Arc<dyn ChatProvider>, model: &str) -> Self {
        Self {
            label: format!("{}:{}", label, provider.name()),
            provider,
            model: model.to_string(),
        }
    }
}

#[async_trait]
impl<R> Tier<R> for ProviderTier
where
    R: ToChatRequest + Sync,
{
    fn name(&self) -> &str {
        &self.label
    }

    async fn attempt(&self, request: &R) -> Option<String> {
        let chat_request = request.to_chat_request();
        match self.provider.complete(&self.model, &chat_request).await {
            Ok(text) => Some(text),
            Err(err) => {
                warn!(
                    "{} failed with model {}, falling back: {:#}",
                    self.label, self.model, err
                );
                None
            }
        }
    }
}

/// A tier that always answers with the same text.
pub struct FixedTextTier {
    name: String,
    text: String,
}

impl FixedTextTier {
    pub fn new(name: &str, text: &str) -> Self {
        Self {
            name: name.to_string(),
            text: text.to_string(),
        }
    }
}

#[async_trait]
impl<R: Sync> Tier<R> for FixedTextTier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn attempt(&self, _request: &R) -> Option<String> {
        Some(self.text.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolved {
    pub tier: String,
    pub text: String,
}

pub struct Cascade<R: Sync> {
    operation: &'static str,
    tiers: Vec<Box<dyn Tier<R>>>,
    sanitize: fn(&str) -> String,
}

impl<R: Sync> Cascade<R> {
    pub fn new(operation: &'static str, sanitize: fn(&str) -> String) -> Self {
        Self {
            operation,
            tiers: Vec::new(),
            sanitize,
        }
    }

    pub fn push(&mut self, tier: Box<dyn Tier<R>>) {
        self.tiers.push(tier);
    }

    pub fn tier_names(&self) -> Vec<&str> {
        self.tiers.iter().map(|tier| tier.name()).collect()
    }

    /// Tries each tier strictly in order.
    pub async fn resolve(&self, request: &R) -> Option<Resolved> {
        for tier in &self.tiers {
            let Some(raw) = tier.attempt(request).await else {
                continue;
            };
            let text = (self.sanitize)(&raw);
            if text.is_empty() {
                warn!(
                    "{} returned an empty {} response, falling back",
                    tier.name(),
                    self.operation
                );
                continue;
            }
            debug!("{} resolved by {}", self.operation, tier.name());
            return Some(Resolved {
                tier: tier.name().to_string(),
                text,
            });
        }
        None
    }
}
