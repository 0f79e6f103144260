//! The fixed catalogue of reference variations and the job that walks it.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::info;

use crate::generation::VariationGenerator;
use crate::prompt::{VariationRequest, VariationType};

/// Angle used as the base pose for outfit and background entries.
pub const FRONT_VIEW_ANGLE: &str = "facing forward, front view";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatalogueEntry {
    pub key: &'static str,
    pub label: &'static str,
    pub phrase: &'static str,
}

const fn entry(key: &'static str, label: &'static str, phrase: &'static str) -> CatalogueEntry {
    CatalogueEntry { key, label, phrase }
}

pub const ANGLES: &[CatalogueEntry] = &[
    entry("left45", "Left 45°", "facing left at 45 degrees"),
    entry("right45", "Right 45°", "facing right at 45 degrees"),
    entry("left90", "Left 90°", "facing left at 90 degrees, profile view"),
    entry("right90", "Right 90°", "facing right at 90 degrees, profile view"),
    entry("back180", "Back 180°", "facing away, back of head visible"),
];

pub const OUTFITS: &[CatalogueEntry] = &[
    entry("casual", "Casual Outfit", "casual everyday clothing"),
    entry("formal", "Formal Outfit", "formal business or elegant attire"),
    entry("sporty", "Sporty Outfit", "athletic or sportswear"),
];

pub const BACKGROUNDS: &[CatalogueEntry] = &[
    entry("studio", "Studio", "professional studio background, neutral lighting"),
    entry("outdoor", "Outdoor", "outdoor natural environment, daylight"),
    entry("indoor", "Indoor", "indoor room setting, warm lighting"),
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedVariation {
    pub category: VariationType,
    pub key: &'static str,
    pub label: &'static str,
    pub request: VariationRequest,
}

/// Expands the catalogue into one request per entry: angles first, then
/// outfits, then backgrounds.
pub fn reference_plan(subject_description: Option<&str>) -> Vec<PlannedVariation> {
    let description = subject_description.map(str::to_string);
    let mut plan = Vec::with_capacity(ANGLES.len() + OUTFITS.len() + BACKGROUNDS.len());

    for angle in ANGLES {
        plan.push(PlannedVariation {
            category: VariationType::Angle,
            key: angle.key,
            label: angle.label,
            request: VariationRequest {
                subject_description: description.clone(),
                angle: Some(angle.phrase.to_string()),
                variation_type: Some(VariationType::Angle),
                ..Default::default()
            },
        });
    }

    for outfit in OUTFITS {
        plan.push(PlannedVariation {
            category: VariationType::Outfit,
            key: outfit.key,
            label: outfit.label,
            request: VariationRequest {
                subject_description: description.clone(),
                angle: Some(FRONT_VIEW_ANGLE.to_string()),
                outfit: Some(outfit.phrase.to_string()),
                variation_type: Some(VariationType::Outfit),
                ..Default::default()
            },
        });
    }

    for background in BACKGROUNDS {
        plan.push(PlannedVariation {
            category: VariationType::Background,
            key: background.key,
            label: background.label,
            request: VariationRequest {
                subject_description: description.clone(),
                angle: Some(FRONT_VIEW_ANGLE.to_string()),
                background: Some(background.phrase.to_string()),
                variation_type: Some(VariationType::Background),
                ..Default::default()
            },
        });
    }

    plan
}

/// Images generated for one catalogue entry, as data URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReferenceImages {
    pub key: String,
    pub label: String,
    pub images: Vec<String>,
}

/// Generated images per category, in catalogue order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReferenceSet {
    pub angles: Vec<ReferenceImages>,
    pub outfits: Vec<ReferenceImages>,
    pub backgrounds: Vec<ReferenceImages>,
}

impl ReferenceSet {
    fn bucket(&self, category: VariationType) -> &[ReferenceImages] {
        match category {
            VariationType::Angle => &self.angles,
            VariationType::Outfit => &self.outfits,
            VariationType::Background => &self.backgrounds,
        }
    }

    pub fn push(&mut self, category: VariationType, key: &str, label: &str, images: Vec<String>) {
        let bucket = match category {
            VariationType::Angle => &mut self.angles,
            VariationType::Outfit => &mut self.outfits,
            VariationType::Background => &mut self.backgrounds,
        };
        bucket.push(ReferenceImages {
            key: key.to_string(),
            label: label.to_string(),
            images,
        });
    }

    pub fn image_count(&self) -> usize {
        [&self.angles, &self.outfits, &self.backgrounds]
            .iter()
            .flat_map(|bucket| bucket.iter())
            .map(|entry| entry.images.len())
            .sum()
    }

    /// Iterates `(category, key, images)`: angles, outfits, then backgrounds,
    /// each in the order the entries were generated.
    pub fn entries(&self) -> impl Iterator<Item = (VariationType, &str, &[String])> {
        [
            VariationType::Angle,
            VariationType::Outfit,
            VariationType::Background,
        ]
        .into_iter()
        .flat_map(move |category| {
            self.bucket(category)
                .iter()
                .map(move |entry| (category, entry.key.as_str(), entry.images.as_slice()))
        })
    }
}

/// Walks the full plan in order and stops at the first entry that produced
/// no images.
pub async fn build_reference_set(
    generator: &VariationGenerator,
    base_image: &str,
    subject_description: Option<&str>,
) -> Result<ReferenceSet> {
    let plan = reference_plan(subject_description);
    let total = plan.len();
    let mut set = ReferenceSet::default();

    for (index, planned) in plan.into_iter().enumerate() {
        info!("Generating {} ({}/{})", planned.label, index + 1, total);
        let images = generator
            .generate(base_image, &planned.request)
            .await
            .with_context(|| format!("Failed to generate {}", planned.label))?;
        set.push(planned.category, planned.key, planned.label, images);
    }

    info!("Reference set complete: {} image(s)", set.image_count());
    Ok(set)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::generation::testing::MockBackend;
    use crate::prompt::PromptSynthesizer;

    fn generator(backend: Arc<MockBackend>) -> VariationGenerator {
        VariationGenerator::new(
            Arc::new(PromptSynthesizer::with_providers(None, None)),
            backend,
            2,
        )
    }

    #[test]
    fn plan_covers_the_catalogue_in_order() {
        let plan = reference_plan(Some("curly red hair"));
        assert_eq!(plan.len(), 11);

        let keys: Vec<&str> = plan.iter().map(|p| p.key).collect();
        assert_eq!(
            keys,
            vec![
                "left45", "right45", "left90", "right90", "back180", "casual", "formal", "sporty",
                "studio", "outdoor", "indoor"
            ]
        );

        let sporty = &plan[7];
        assert_eq!(sporty.category, VariationType::Outfit);
        assert_eq!(sporty.request.angle.as_deref(), Some(FRONT_VIEW_ANGLE));
        assert_eq!(sporty.request.outfit.as_deref(), Some("athletic or sportswear"));
        assert_eq!(sporty.request.background, None);
        assert_eq!(sporty.request.subject_description(), Some("curly red hair"));

        let back = &plan[4];
        assert_eq!(back.request.variation_type, Some(VariationType::Angle));
        assert_eq!(back.request.outfit, None);
    }

    #[tokio::test]
    async fn full_job_fills_every_bucket() {
        let backend = MockBackend::new(&[]);
        let set = build_reference_set(&generator(backend.clone()), "QkFTRQ==", None)
            .await
            .unwrap();

        assert_eq!(set.angles.len(), 5);
        assert_eq!(set.outfits.len(), 3);
        assert_eq!(set.backgrounds.len(), 3);
        assert_eq!(set.image_count(), 22);
        assert_eq!(backend.calls(), 22);

        let keys: Vec<&str> = set.entries().map(|(_, key, _)| key).collect();
        assert_eq!(
            keys,
            vec![
                "left45", "right45", "left90", "right90", "back180", "casual", "formal", "sporty",
                "studio", "outdoor", "indoor"
            ]
        );
        assert_eq!(set.angles[4].label, "Back 180°");
        assert_eq!(set.outfits[2].key, "sporty");
        assert_eq!(set.outfits[2].images.len(), 2);
    }

    #[tokio::test]
    async fn job_stops_at_first_fully_failed_entry() {
        // Calls 2 and 3 are both images of the second angle entry.
        let backend = MockBackend::new(&[2, 3]);
        let err = build_reference_set(&generator(backend.clone()), "QkFTRQ==", None)
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "Failed to generate Right 45°");
        assert_eq!(backend.calls(), 4);
    }
}
