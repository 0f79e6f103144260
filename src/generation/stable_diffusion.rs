use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::Config;
use crate::utils::http::get_http_client;
use crate::utils::text::truncate_for_log;
use crate::utils::timing::log_llm_timing;

/// Everything one img2img call needs besides sampler settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Img2ImgJob {
    pub prompt: String,
    pub negative_prompt: String,
    /// Bare base64, no data URL prefix.
    pub init_image: String,
    pub denoising_strength: f32,
}

#[async_trait]
pub trait ImageBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Returns one generated image as base64 or a data URL.
    async fn img2img(&self, job: &Img2ImgJob) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct SamplerSettings {
    pub steps: u32,
    pub cfg_scale: f32,
    pub sampler_name: String,
    pub width: u32,
    pub height: u32,
}

impl SamplerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            steps: config.sd_steps,
            cfg_scale: config.sd_cfg_scale,
            sampler_name: config.sd_sampler.clone(),
            width: config.sd_width,
            height: config.sd_height,
        }
    }
}

#[derive(Debug, Serialize)]
struct Img2ImgPayload<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    init_images: [&'a str; 1],
    steps: u32,
    cfg_scale: f32,
    denoising_strength: f32,
    sampler_name: &'a str,
    width: u32,
    height: u32,
}

#[derive(Debug, Deserialize)]
struct Img2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Automatic1111 WebUI (`/sdapi/v1/img2img`).
pub struct Automatic1111Backend {
    base_url: String,
    settings: SamplerSettings,
    timeout: Duration,
}

impl Automatic1111Backend {
    pub fn new(base_url: &str, settings: SamplerSettings, timeout_seconds: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            settings,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.stable_diffusion_api_url,
            SamplerSettings::from_config(config),
            config.sd_timeout_seconds,
        )
    }

    fn build_payload<'a>(&'a self, job: &'a Img2ImgJob) -> Img2ImgPayload<'a> {
        Img2ImgPayload {
            prompt: &job.prompt,
            negative_prompt: &job.negative_prompt,
            init_images: [&job.init_image],
            steps: self.settings.steps,
            cfg_scale: self.settings.cfg_scale,
            denoising_strength: job.denoising_strength,
            sampler_name: &self.settings.sampler_name,
            width: self.settings.width,
            height: self.settings.height,
        }
    }

    async fn call_img2img_api(&self, job: &Img2ImgJob) -> Result<String> {
        let payload = self.build_payload(job);
        debug!(
            "img2img request: prompt_chars={}, denoising_strength={}, steps={}",
            job.prompt.chars().count(),
            job.denoising_strength,
            self.settings.steps
        );

        let response = get_http_client()
            .post(format!("{}/sdapi/v1/img2img", self.base_url))
            .timeout(self.timeout)
            .json(&payload)
            .send()
            .await
            .with_context(|| format!("Stable Diffusion API unreachable at {}", self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            warn!(
                "Stable Diffusion API error: status={}, body={}",
                status,
                truncate_for_log(body.trim(), 800)
            );
            return Err(anyhow!("Stable Diffusion API error: {}", status));
        }

        let parsed: Img2ImgResponse = response
            .json()
            .await
            .context("Unexpected Stable Diffusion response format")?;
        parsed
            .images
            .into_iter()
            .find(|image| !image.trim().is_empty())
            .ok_or_else(|| anyhow!("Stable Diffusion response contained no images"))
    }
}

#[async_trait]
impl ImageBackend for Automatic1111Backend {
    fn name(&self) -> &str {
        "automatic1111"
    }

    async fn img2img(&self, job: &Img2ImgJob) -> Result<String> {
        let metadata = json!({ "denoising_strength": job.denoising_strength });
        log_llm_timing("automatic1111", "img2img", "img2img", Some(metadata), || async {
            self.call_img2img_api(job).await
        })
        .await
    }
}
