//! Diffusion prompt synthesis for one variation of the reference subject.

pub mod instruction;
pub mod sanitize;
pub mod template;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::cascade::{Cascade, ProviderTier};
use crate::config::Config;
use crate::llm::{ChatProvider, ProviderRegistry};

pub use instruction::{
    build_instruction_text, is_generic_description, DEFAULT_SUBJECT_DESCRIPTION,
    PLACEHOLDER_DESCRIPTION,
};
pub use sanitize::sanitize_prompt;
pub use template::{build_fallback_prompt, TemplateTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariationType {
    Angle,
    Outfit,
    Background,
}

impl VariationType {
    pub fn as_str(self) -> &'static str {
        match self {
            VariationType::Angle => "angle",
            VariationType::Outfit => "outfit",
            VariationType::Background => "background",
        }
    }
}

impl fmt::Display for VariationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VariationType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "angle" => Ok(VariationType::Angle),
            "outfit" => Ok(VariationType::Outfit),
            "background" => Ok(VariationType::Background),
            other => Err(anyhow!("Unknown variation type: {other}")),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariationRequest {
    #[serde(default, alias = "personDescription")]
    pub subject_description: Option<String>,
    #[serde(default)]
    pub angle: Option<String>,
    #[serde(default)]
    pub outfit: Option<String>,
    #[serde(default)]
    pub background: Option<String>,
    #[serde(default)]
    pub variation_type: Option<VariationType>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl VariationRequest {
    pub fn angle(&self) -> Option<&str> {
        non_blank(&self.angle)
    }

    pub fn outfit(&self) -> Option<&str> {
        non_blank(&self.outfit)
    }

    pub fn background(&self) -> Option<&str> {
        non_blank(&self.background)
    }

    /// The caller's description, unless it is blank or one of the stock
    /// fallback descriptions.
    pub fn subject_description(&self) -> Option<&str> {
        non_blank(&self.subject_description).filter(|value| !is_generic_description(value))
    }
}

/// Sanitized, non-empty prompt text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct GeneratedPrompt(String);

impl GeneratedPrompt {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for GeneratedPrompt {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for GeneratedPrompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Turns a [`VariationRequest`] into a diffusion prompt through the local
/// model, then the remote model, then the deterministic template.
pub struct PromptSynthesizer {
    cascade: Cascade<VariationRequest>,
}

impl PromptSynthesizer {
    pub fn new(registry: &ProviderRegistry, config: &Config) -> Self {
        Self::with_providers(
            registry
                .local
                .clone()
                .map(|provider| (provider, config.ollama_model.clone())),
            registry
                .remote
                .clone()
                .map(|provider| (provider, config.openrouter_model.clone())),
        )
    }

    pub fn with_providers(
        local: Option<(Arc<dyn ChatProvider>, String)>,
        remote: Option<(Arc<dyn ChatProvider>, String)>,
    ) -> Self {
        let mut cascade: Cascade<VariationRequest> = Cascade::new("prompt", sanitize_prompt);
        if let Some((provider, model)) = local {
            cascade.push(Box::new(ProviderTier::new("local", provider, &model)));
        }
        if let Some((provider, model)) = remote {
            cascade.push(Box::new(ProviderTier::new("remote", provider, &model)));
        }
        cascade.push(Box::new(TemplateTier));
        info!("Prompt synthesizer tiers: {}", cascade.tier_names().join(" -> "));
        Self { cascade }
    }

    pub async fn synthesize(&self, request: &VariationRequest) -> GeneratedPrompt {
        self.synthesize_with_source(request).await.0
    }

    /// Same as [`synthesize`](Self::synthesize) but also names the tier that
    /// produced the text.
    pub async fn synthesize_with_source(&self, request: &VariationRequest) -> (GeneratedPrompt, String) {
        match self.cascade.resolve(request).await {
            Some(resolved) => (GeneratedPrompt(resolved.text), resolved.tier),
            // The template tier always answers, so this only guards an empty cascade.
            None => (
                GeneratedPrompt(sanitize_prompt(&build_fallback_prompt(request))),
                TemplateTier::NAME.to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::testing::MockProvider;
    use crate::prompt::template::{
        ATHLETIC_OUTFIT_FRAGMENT, DEFAULT_BACKGROUND_FRAGMENT, DEFAULT_OUTFIT_FRAGMENT,
        HANDS_AND_LIGHTING_FRAGMENT, IDENTITY_FRAGMENT,
    };
    use crate::vision::{self, VisionDescriber, VisionRequest};

    fn tier(provider: &Arc<MockProvider>, model: &str) -> Option<(Arc<dyn ChatProvider>, String)> {
        Some((provider.clone() as Arc<dyn ChatProvider>, model.to_string()))
    }

    fn offline() -> PromptSynthesizer {
        PromptSynthesizer::with_providers(None, None)
    }

    fn request(angle: Option<&str>, outfit: Option<&str>, background: Option<&str>) -> VariationRequest {
        VariationRequest {
            angle: angle.map(str::to_string),
            outfit: outfit.map(str::to_string),
            background: background.map(str::to_string),
            ..Default::default()
        }
    }

    fn assert_well_formed(text: &str) {
        assert!(!text.is_empty());
        assert_eq!(text, text.trim());
        assert!(!text.contains("  "));
        assert!(!text.to_lowercase().starts_with("prompt:"));
    }

    #[tokio::test]
    async fn empty_request_uses_generic_fragments() {
        let prompt = offline().synthesize(&VariationRequest::default()).await;
        assert_well_formed(prompt.as_str());
        assert!(prompt.as_str().starts_with(IDENTITY_FRAGMENT));
        assert!(prompt.as_str().contains(DEFAULT_OUTFIT_FRAGMENT));
        assert!(prompt.as_str().contains(DEFAULT_BACKGROUND_FRAGMENT));
    }

    #[tokio::test]
    async fn left_45_example_composes_in_order() {
        let prompt = offline()
            .synthesize(&request(Some("facing left at 45 degrees"), None, None))
            .await;
        let expected = [
            IDENTITY_FRAGMENT,
            "facing left at 45 degrees, body oriented accordingly, head aligned naturally",
            DEFAULT_OUTFIT_FRAGMENT,
            DEFAULT_BACKGROUND_FRAGMENT,
            HANDS_AND_LIGHTING_FRAGMENT,
        ]
        .join(", ");
        assert_eq!(prompt.as_str(), expected);
        assert!(prompt.as_str().ends_with(HANDS_AND_LIGHTING_FRAGMENT));
    }

    #[tokio::test]
    async fn athletic_fragment_survives_other_fields() {
        let synthesizer = offline();
        for outfit in ["Sporty look", "ATHLETIC or sportswear", "something athletic, but formal"] {
            let mut req = request(Some("back view"), Some(outfit), Some("studio"));
            req.subject_description = Some("tall man with a beard".to_string());
            let prompt = synthesizer.synthesize(&req).await;
            assert!(prompt.as_str().contains(ATHLETIC_OUTFIT_FRAGMENT), "{outfit}");
            assert_well_formed(prompt.as_str());
        }
    }

    #[tokio::test]
    async fn offline_output_is_reproducible() {
        let req = VariationRequest {
            subject_description: Some("red   hair,\n green eyes".to_string()),
            angle: Some("profile".to_string()),
            outfit: Some("a yellow raincoat".to_string()),
            background: Some("rainy street".to_string()),
            variation_type: Some(VariationType::Outfit),
        };
        let first = offline().synthesize(&req).await;
        let second = offline().synthesize(&req).await;
        assert_eq!(first, second);
        assert_eq!(first.as_str(), sanitize_prompt(&build_fallback_prompt(&req)));
        assert!(first.as_str().ends_with("red hair, green eyes"));
    }

    #[tokio::test]
    async fn local_success_skips_remote_and_template() {
        let local = MockProvider::replying("local", "Prompt: standing tall,   studio light");
        let remote = MockProvider::replying("remote", "unused");
        let synthesizer = PromptSynthesizer::with_providers(
            tier(&local, "llama3:instruct"),
            tier(&remote, "mixtral"),
        );

        let (prompt, source) = synthesizer
            .synthesize_with_source(&request(Some("facing right"), None, None))
            .await;
        assert_eq!(prompt.as_str(), "standing tall, studio light");
        assert_eq!(source, "local:local");
        assert_eq!(local.calls(), 1);
        assert_eq!(remote.calls(), 0);

        let (model, sent) = &local.requests()[0];
        assert_eq!(model, "llama3:instruct");
        assert!(sent.user_content.contains("REQUIRED ANGLE OR POSE:\nfacing right"));
        assert!(sent.image_data_url.is_none());
    }

    #[tokio::test]
    async fn local_failure_uses_remote_output() {
        let local = MockProvider::failing("local");
        let remote = MockProvider::replying("remote", "\n  wearing a  navy suit \n");
        let synthesizer = PromptSynthesizer::with_providers(tier(&local, "l"), tier(&remote, "r"));

        let (prompt, source) = synthesizer
            .synthesize_with_source(&request(None, Some("formal"), None))
            .await;
        assert_eq!(prompt.as_str(), "wearing a navy suit");
        assert_eq!(source, "remote:remote");
        assert_eq!(local.calls(), 1);
        assert_eq!(remote.calls(), 1);
    }

    #[tokio::test]
    async fn label_only_answers_fall_back_to_template() {
        let local = MockProvider::replying("local", "Prompt:");
        let synthesizer = PromptSynthesizer::with_providers(tier(&local, "l"), None);

        let (prompt, source) = synthesizer.synthesize_with_source(&VariationRequest::default()).await;
        assert_eq!(source, TemplateTier::NAME);
        assert!(prompt.as_str().starts_with(IDENTITY_FRAGMENT));
    }

    #[tokio::test]
    async fn vision_fallback_description_does_not_reach_the_prompt() {
        let description = VisionDescriber::with_providers(None, None)
            .describe(&VisionRequest::new("data:image/png;base64,iVBORw0KGgo="))
            .await;
        assert_eq!(description, vision::DEFAULT_DESCRIPTION);

        let mut described = request(Some("facing left at 45 degrees"), None, None);
        described.subject_description = Some(description);
        let bare = request(Some("facing left at 45 degrees"), None, None);

        let synthesizer = offline();
        let prompt = synthesizer.synthesize(&described).await;
        assert_eq!(prompt, synthesizer.synthesize(&bare).await);
        assert!(!prompt.as_str().contains("same character"));

        let local = MockProvider::replying("local", "standing");
        let synthesizer = PromptSynthesizer::with_providers(tier(&local, "l"), None);
        synthesizer.synthesize(&described).await;
        let (_, sent) = &local.requests()[0];
        assert!(sent
            .user_content
            .starts_with(&format!("ORIGINAL PERSON DESCRIPTION:\n{DEFAULT_SUBJECT_DESCRIPTION}\n")));
    }

    #[test]
    fn synthesizer_and_describer_are_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PromptSynthesizer>();
        assert_send_sync::<VisionDescriber>();
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_synthesizer() {
        let local = MockProvider::replying("local", "Prompt: standing by a window");
        let synthesizer = Arc::new(PromptSynthesizer::with_providers(tier(&local, "l"), None));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let synthesizer = synthesizer.clone();
                tokio::spawn(async move {
                    synthesizer
                        .synthesize_with_source(&request(Some("facing right"), None, None))
                        .await
                })
            })
            .collect();

        for handle in handles {
            let (prompt, source) = handle.await.unwrap();
            assert_eq!(prompt.as_str(), "standing by a window");
            assert_eq!(source, "local:local");
        }
        assert_eq!(local.calls(), 4);
    }

    #[test]
    fn placeholder_and_blank_descriptions_are_ignored() {
        let mut req = VariationRequest::default();
        req.subject_description = Some(PLACEHOLDER_DESCRIPTION.to_string());
        assert_eq!(req.subject_description(), None);
        req.subject_description = Some("   ".to_string());
        assert_eq!(req.subject_description(), None);
        req.subject_description = Some(" freckles ".to_string());
        assert_eq!(req.subject_description(), Some("freckles"));
    }

    #[test]
    fn request_accepts_original_json_field_names() {
        let req: VariationRequest = serde_json::from_str(
            r#"{"personDescription":"short hair","angle":"left","variationType":"angle"}"#,
        )
        .unwrap();
        assert_eq!(req.subject_description(), Some("short hair"));
        assert_eq!(req.variation_type, Some(VariationType::Angle));
        assert_eq!("Background".parse::<VariationType>().unwrap(), VariationType::Background);
        assert!("pose".parse::<VariationType>().is_err());
    }
}
