//! Deterministic prompt assembly used when no language model answers.

use async_trait::async_trait;

use crate::cascade::Tier;
use crate::prompt::VariationRequest;

pub const IDENTITY_FRAGMENT: &str = "same person, same face, same distinctive features, photorealistic portrait, long wavy dark brown hair, warm fair skin, confident expression";

pub const ATHLETIC_OUTFIT_FRAGMENT: &str = "wearing athletic outfit, fitted sports bra, high-waisted performance leggings, lightweight zip jacket tied at waist, breathable technical fabric";
pub const FORMAL_OUTFIT_FRAGMENT: &str = "wearing elegant formal dress, satin fabric, tailored silhouette, tasteful jewelry, dressy heels";
pub const CASUAL_OUTFIT_FRAGMENT: &str =
    "wearing casual streetwear: fitted crew neck tee, light cardigan, relaxed jeans";
pub const DEFAULT_OUTFIT_FRAGMENT: &str =
    "wearing stylish modern outfit that complements complexion, avoiding pink button-up shirts";

pub const OUTDOOR_BACKGROUND_FRAGMENT: &str = "outdoor cinematic backdrop, soft afternoon sunlight, shallow depth of field, hints of greenery and city textures";
pub const STUDIO_BACKGROUND_FRAGMENT: &str = "professional photography studio background, neutral seamless backdrop, controlled softbox lighting";
pub const DEFAULT_BACKGROUND_FRAGMENT: &str =
    "background refreshed to complement outfit, soft bokeh, no bedroom furniture";

pub const HANDS_AND_LIGHTING_FRAGMENT: &str = "hands relaxed at sides or resting on hips, fingers naturally posed, no distortions, cinematic lighting, 85mm lens portrait composition, ultra high resolution";

/// Keywords (matched as case-insensitive substrings) and the fragment they
/// select. Order matters: the first matching row wins.
type FragmentTable = &'static [(&'static [&'static str], &'static str)];

pub const OUTFIT_FRAGMENTS: FragmentTable = &[
    (&["sporty", "athletic"], ATHLETIC_OUTFIT_FRAGMENT),
    (&["formal", "elegant"], FORMAL_OUTFIT_FRAGMENT),
    (&["casual"], CASUAL_OUTFIT_FRAGMENT),
];

pub const BACKGROUND_FRAGMENTS: FragmentTable = &[
    (&["outdoor"], OUTDOOR_BACKGROUND_FRAGMENT),
    (&["studio"], STUDIO_BACKGROUND_FRAGMENT),
];

fn match_fragment(table: FragmentTable, value: &str) -> Option<&'static str> {
    let lowered = value.to_lowercase();
    table
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|keyword| lowered.contains(keyword)))
        .map(|(_, fragment)| *fragment)
}

fn outfit_fragment(outfit: Option<&str>) -> String {
    match outfit {
        Some(outfit) => match_fragment(OUTFIT_FRAGMENTS, outfit)
            .map(str::to_string)
            .unwrap_or_else(|| format!("wearing {outfit}")),
        None => DEFAULT_OUTFIT_FRAGMENT.to_string(),
    }
}

fn background_fragment(background: Option<&str>) -> String {
    match background {
        Some(background) => match_fragment(BACKGROUND_FRAGMENTS, background)
            .map(str::to_string)
            .unwrap_or_else(|| format!("background {background}")),
        None => DEFAULT_BACKGROUND_FRAGMENT.to_string(),
    }
}

/// Pure function of the request; unsanitized.
pub fn build_fallback_prompt(request: &VariationRequest) -> String {
    let mut fragments: Vec<String> = vec![IDENTITY_FRAGMENT.to_string()];

    if let Some(angle) = request.angle() {
        fragments.push(format!(
            "{angle}, body oriented accordingly, head aligned naturally"
        ));
    }

    fragments.push(outfit_fragment(request.outfit()));
    fragments.push(background_fragment(request.background()));
    fragments.push(HANDS_AND_LIGHTING_FRAGMENT.to_string());

    if let Some(description) = request.subject_description() {
        fragments.push(description.to_string());
    }

    fragments.join(", ")
}

/// Last tier of the prompt cascade. Never declines.
pub struct TemplateTier;

impl TemplateTier {
    pub const NAME: &'static str = "template";
}

#[async_trait]
impl Tier<VariationRequest> for TemplateTier {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn attempt(&self, request: &VariationRequest) -> Option<String> {
        Some(build_fallback_prompt(request))
    }
}
