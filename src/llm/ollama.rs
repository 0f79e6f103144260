use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::llm::media::strip_data_url_prefix;
use crate::llm::{ChatProvider, ChatRequest};
use crate::utils::http::get_http_client;
use crate::utils::text::truncate_for_log;
use crate::utils::timing::log_llm_timing;

#[derive(Debug, Serialize)]
struct OllamaChatRequest<'a> {
    model: &'a str,
    messages: Vec<OllamaMessage<'a>>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaMessage<'a> {
    role: &'static str,
    content: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    images: Vec<&'a str>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct OllamaChatResponse {
    message: Option<OllamaResponseMessage>,
    #[serde(default)]
    response: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
}

/// Self-hosted Ollama server reached through its chat endpoint.
pub struct OllamaProvider {
    base_url: String,
    temperature: f32,
    timeout: Duration,
}

impl OllamaProvider {
    pub fn new(base_url: &str, temperature: f32, timeout_seconds: u64) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    fn build_body<'a>(&self, model: &'a str, request: &'a ChatRequest) -> OllamaChatRequest<'a> {
        let images = request
            .image_data_url
            .as_deref()
            .map(|url| vec![strip_data_url_prefix(url)])
            .unwrap_or_default();

        OllamaChatRequest {
            model,
            messages: vec![
                OllamaMessage {
                    role: "system",
                    content: &request.system_prompt,
                    images: Vec::new(),
                },
                OllamaMessage {
                    role: "user",
                    content: &request.user_content,
                    images,
                },
            ],
            stream: false,
            options: OllamaOptions {
                temperature: self.temperature,
            },
        }
    }

    async fn call_chat_api(&self, model: &str, request: &ChatRequest) -> Result<String> {
        let body = self.build_body(model, request);
        debug!(
            "Ollama request: model={}, images={}",
            model,
            body.messages.iter().map(|m| m.images.len()).sum::<usize>()
        );

        let response = get_http_client()
            .post(format!("{}/api/chat", self.base_url))
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .context("Ollama request failed")?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND || status == StatusCode::BAD_GATEWAY {
            return Err(anyhow!(
                "Ollama server not reachable at {} (HTTP {}); is the model pulled?",
                self.base_url,
                status
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Ollama request failed with status {}: {}",
                status,
                truncate_for_log(body.trim(), 800)
            ));
        }

        let parsed: OllamaChatResponse = response
            .json()
            .await
            .context("Unexpected Ollama response format")?;
        Ok(extract_ollama_text(parsed))
    }
}

fn extract_ollama_text(response: OllamaChatResponse) -> String {
    response
        .message
        .map(|message| message.content)
        .filter(|content| !content.trim().is_empty())
        .or(response.response)
        .unwrap_or_default()
}

#[async_trait]
impl ChatProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn complete(&self, model: &str, request: &ChatRequest) -> Result<String> {
        let metadata = json!({ "has_image": request.image_data_url.is_some() });
        log_llm_timing("ollama", model, "chat", Some(metadata), || async {
            self.call_chat_api(model, request).await
        })
        .await
    }
}
