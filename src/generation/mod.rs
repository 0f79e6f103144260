pub mod stable_diffusion;

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{error, info};

use crate::llm::media::{ensure_png_data_url, strip_data_url_prefix};
use crate::prompt::{PromptSynthesizer, VariationRequest, VariationType};

pub use stable_diffusion::{Automatic1111Backend, ImageBackend, Img2ImgJob, SamplerSettings};

pub const QUALITY_SUFFIX: &str = "high quality portrait photography, professional lighting, detailed, 8k resolution, consistent character appearance, photorealistic";

pub const NEGATIVE_PROMPT: &str = "blurry, low quality, distorted, deformed, extra limbs, bad anatomy, watermark, text, signature";

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Base image is required")]
    MissingBaseImage,
    #[error("Failed to generate images. Make sure the Stable Diffusion backend is running and accessible.")]
    AllImagesFailed,
}

/// Img2img denoising strength for a variation axis.
pub fn denoising_strength(variation_type: Option<VariationType>) -> f32 {
    match variation_type {
        Some(VariationType::Angle) => 0.78,
        Some(VariationType::Outfit) | Some(VariationType::Background) => 0.85,
        None => 0.75,
    }
}

pub fn compose_final_prompt(synthesized: &str) -> String {
    format!("{synthesized}, {QUALITY_SUFFIX}")
}

/// Produces images for one variation request against a base image.
pub struct VariationGenerator {
    synthesizer: Arc<PromptSynthesizer>,
    backend: Arc<dyn ImageBackend>,
    images_per_variation: usize,
}

impl VariationGenerator {
    pub fn new(
        synthesizer: Arc<PromptSynthesizer>,
        backend: Arc<dyn ImageBackend>,
        images_per_variation: usize,
    ) -> Self {
        Self {
            synthesizer,
            backend,
            images_per_variation: images_per_variation.max(1),
        }
    }

    /// Returns every image that succeeded as a data URL. Individual call
    /// failures are logged and dropped; only a fully failed batch is an error.
    pub async fn generate(
        &self,
        base_image: &str,
        request: &VariationRequest,
    ) -> Result<Vec<String>, GenerationError> {
        let init_image = strip_data_url_prefix(base_image.trim());
        if init_image.trim().is_empty() {
            return Err(GenerationError::MissingBaseImage);
        }

        let (prompt, source) = self.synthesizer.synthesize_with_source(request).await;
        let job = Img2ImgJob {
            prompt: compose_final_prompt(prompt.as_str()),
            negative_prompt: NEGATIVE_PROMPT.to_string(),
            init_image: init_image.to_string(),
            denoising_strength: denoising_strength(request.variation_type),
        };
        info!(
            "Generating {} image(s) via {}: prompt_source={}, variation_type={}, denoising_strength={}",
            self.images_per_variation,
            self.backend.name(),
            source,
            request
                .variation_type
                .map(|kind| kind.as_str())
                .unwrap_or("default"),
            job.denoising_strength
        );

        let calls = (0..self.images_per_variation).map(|_| self.backend.img2img(&job));
        let results = join_all(calls).await;

        let images: Vec<String> = results
            .into_iter()
            .enumerate()
            .filter_map(|(index, result)| match result {
                Ok(image) => Some(ensure_png_data_url(&image)),
                Err(err) => {
                    error!("Error generating image {}: {:#}", index + 1, err);
                    None
                }
            })
            .collect();

        if images.is_empty() {
            return Err(GenerationError::AllImagesFailed);
        }
        Ok(images)
    }
}
