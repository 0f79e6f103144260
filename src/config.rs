use std::env;
use std::path::PathBuf;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::warn;
use url::Url;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub log_dir: PathBuf,
    pub ollama_base_url: Option<String>,
    pub ollama_model: String,
    pub ollama_vision_model: String,
    pub ollama_temperature: f32,
    pub openrouter_api_key: Option<String>,
    pub openrouter_base_url: String,
    pub openrouter_model: String,
    pub openrouter_vision_model: String,
    pub openrouter_temperature: f32,
    pub openrouter_top_p: f32,
    pub provider_timeout_seconds: u64,
    pub stable_diffusion_api_url: String,
    pub sd_timeout_seconds: u64,
    pub sd_steps: u32,
    pub sd_cfg_scale: f32,
    pub sd_sampler: String,
    pub sd_width: u32,
    pub sd_height: u32,
    pub images_per_variation: usize,
    pub output_dir: PathBuf,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn env_optional(lookup: &dyn Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_f32(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: f32) -> f32 {
    lookup(name)
        .and_then(|value| value.trim().parse::<f32>().ok())
        .unwrap_or(default)
}

fn env_u32(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: u32) -> u32 {
    lookup(name)
        .and_then(|value| value.trim().parse::<u32>().ok())
        .unwrap_or(default)
}

fn env_u64(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: u64) -> u64 {
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(lookup: &dyn Fn(&str) -> Option<String>, name: &str, default: usize) -> usize {
    lookup(name)
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

/// Returns the URL without a trailing slash, or `None` when it does not parse
/// as an absolute http(s) URL.
pub fn normalize_base_url(value: &str) -> Option<String> {
    let parsed = Url::parse(value.trim()).ok()?;
    if parsed.scheme() != "http" && parsed.scheme() != "https" {
        return None;
    }
    Some(parsed.as_str().trim_end_matches('/').to_string())
}

fn normalize_log_level(value: String) -> String {
    let lowered = value.trim().to_lowercase();
    match lowered.as_str() {
        "trace" | "debug" | "info" | "warn" | "warning" | "error" | "off" => lowered,
        _ => {
            warn!("Unknown LOG_LEVEL value '{}'; defaulting to info.", value);
            "info".to_string()
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;

        let ollama_base_url = env_optional(lookup, "OLLAMA_BASE_URL").and_then(|raw| {
            let normalized = normalize_base_url(&raw);
            if normalized.is_none() {
                warn!(
                    "OLLAMA_BASE_URL '{}' is not a valid http(s) URL; local provider disabled.",
                    raw
                );
            }
            normalized
        });

        let openrouter_base_url = env_string(
            lookup,
            "OPENROUTER_BASE_URL",
            "https://openrouter.ai/api/v1",
        );
        let openrouter_base_url = normalize_base_url(&openrouter_base_url).ok_or_else(|| {
            anyhow::anyhow!("OPENROUTER_BASE_URL is not a valid URL: {openrouter_base_url}")
        })?;

        let stable_diffusion_api_url =
            env_string(lookup, "STABLE_DIFFUSION_API_URL", "http://localhost:7860");
        let stable_diffusion_api_url =
            normalize_base_url(&stable_diffusion_api_url).ok_or_else(|| {
                anyhow::anyhow!(
                    "STABLE_DIFFUSION_API_URL is not a valid URL: {stable_diffusion_api_url}"
                )
            })?;

        Ok(Config {
            log_level: normalize_log_level(env_string(lookup, "LOG_LEVEL", "info")),
            log_dir: PathBuf::from(env_string(lookup, "LOG_DIR", "logs")),
            ollama_base_url,
            ollama_model: env_string(lookup, "OLLAMA_MODEL", "llama3:instruct"),
            ollama_vision_model: env_string(lookup, "OLLAMA_VISION_MODEL", "llama3.2-vision:11b"),
            ollama_temperature: env_f32(lookup, "OLLAMA_TEMPERATURE", 0.7),
            openrouter_api_key: env_optional(lookup, "OPENROUTER_API_KEY"),
            openrouter_base_url,
            openrouter_model: env_string(
                lookup,
                "OPENROUTER_MODEL",
                "mistral/mixtral-8x7b-instruct",
            ),
            openrouter_vision_model: env_string(
                lookup,
                "OPENROUTER_VISION_MODEL",
                "meta-llama/llama-3.2-11b-vision-instruct",
            ),
            openrouter_temperature: env_f32(lookup, "OPENROUTER_TEMPERATURE", 0.7),
            openrouter_top_p: env_f32(lookup, "OPENROUTER_TOP_P", 0.95),
            provider_timeout_seconds: env_u64(lookup, "PROVIDER_TIMEOUT_SECONDS", 60).max(1),
            stable_diffusion_api_url,
            sd_timeout_seconds: env_u64(lookup, "SD_TIMEOUT_SECONDS", 300).max(1),
            sd_steps: env_u32(lookup, "SD_STEPS", 30),
            sd_cfg_scale: env_f32(lookup, "SD_CFG_SCALE", 7.5),
            sd_sampler: env_string(lookup, "SD_SAMPLER", "Euler"),
            sd_width: env_u32(lookup, "SD_WIDTH", 1024),
            sd_height: env_u32(lookup, "SD_HEIGHT", 1024),
            images_per_variation: env_usize(lookup, "IMAGES_PER_VARIATION", 2).max(1),
            output_dir: PathBuf::from(env_string(lookup, "OUTPUT_DIR", "output")),
        })
    }

    pub fn local_provider_enabled(&self) -> bool {
        self.ollama_base_url.is_some()
    }

    pub fn remote_provider_enabled(&self) -> bool {
        self.openrouter_api_key.is_some()
    }
}

pub const PROMPT_SYSTEM_PROMPT: &str = r#"You are an expert AI prompt engineer for Stable Diffusion XL image-to-image tasks.
Create highly detailed prompts that strictly maintain the original person's face and identity.
The prompt must include: camera angle, pose, body orientation, outfit pieces with colors/fabrics, background elements, lighting, mood, and framing.
Explicitly forbid changing ethnicity, facial structure, or unique features.
Explicitly describe hand position and fingers to avoid deformations.
Explicitly forbid repeating the same pink shirt unless the user requested it.
Use confident, explicit language like "wearing", "standing", "background".
Return only the final prompt string with no additional commentary, labels, or formatting."#;

pub const VISION_SYSTEM_PROMPT: &str = r#"You are a computer vision analyst who writes detailed prompts for image generation models.
You must describe the person in the photo with meticulous detail including:
- facial features, expression, ethnicity, age range, skin tone, makeup
- hair color, style, length, texture
- clothing items, fabrics, colors, patterns, accessories
- body pose, orientation, visible limbs, hand placement, finger positioning
- lighting, environment, background elements, mood
- any objects, props, or furniture in the scene
- details to avoid changing (e.g., distinguishing marks, key accessories)
Make the description suitable for use in a Stable Diffusion prompt. Keep it as one paragraph."#;

pub const VISION_USER_PROMPT: &str =
    "Analyze this image carefully and describe the person as detailed as possible for image generation.";

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        Config::from_lookup(|name| map.get(name).cloned()).expect("config should load")
    }

    #[test]
    fn providers_are_disabled_without_configuration() {
        let config = config_from(&[]);
        assert!(!config.local_provider_enabled());
        assert!(!config.remote_provider_enabled());
        assert_eq!(config.ollama_model, "llama3:instruct");
        assert_eq!(config.openrouter_vision_model, "meta-llama/llama-3.2-11b-vision-instruct");
        assert_eq!(config.images_per_variation, 2);
    }

    #[test]
    fn blank_api_key_counts_as_absent() {
        let config = config_from(&[("OPENROUTER_API_KEY", "   ")]);
        assert!(!config.remote_provider_enabled());
    }

    #[test]
    fn invalid_ollama_url_disables_local_provider() {
        let config = config_from(&[("OLLAMA_BASE_URL", "not a url")]);
        assert!(!config.local_provider_enabled());

        let config = config_from(&[("OLLAMA_BASE_URL", "http://localhost:11434/")]);
        assert_eq!(config.ollama_base_url.as_deref(), Some("http://localhost:11434"));
    }

    #[test]
    fn unparsable_numbers_fall_back_to_defaults() {
        let config = config_from(&[("SD_STEPS", "many"), ("IMAGES_PER_VARIATION", "0")]);
        assert_eq!(config.sd_steps, 30);
        assert_eq!(config.images_per_variation, 1);
    }
}
