use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::llm::{ChatProvider, ChatRequest};
use crate::utils::http::get_http_client;
use crate::utils::text::truncate_for_log;
use crate::utils::timing::log_llm_timing;

static THINK_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<think>.*?</think>").expect("valid think-block regex"));

/// Hosted OpenRouter chat-completions endpoint.
pub struct OpenRouterProvider {
    base_url: String,
    api_key: String,
    temperature: f32,
    top_p: f32,
    timeout: Duration,
}

fn summarize_payload(payload: &Value) -> String {
    let model = payload
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let message_count = payload
        .get("messages")
        .and_then(|v| v.as_array())
        .map(|messages| messages.len())
        .unwrap_or(0);
    let has_image = payload
        .pointer("/messages/1/content")
        .map(|content| content.is_array())
        .unwrap_or(false);

    format!(
        "model={}, messages={}, has_image={}",
        model, message_count, has_image
    )
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

/// Drops `<think>...</think>` reasoning blocks some models prepend to the answer.
fn strip_reasoning(content: &str) -> String {
    THINK_BLOCK.replace_all(content, "").trim().to_string()
}

fn build_message_content(user_content: &str, image_data_url: Option<&str>) -> Value {
    let Some(data_url) = image_data_url else {
        return Value::String(user_content.to_string());
    };

    json!([
        { "type": "text", "text": user_content },
        { "type": "image_url", "image_url": { "url": data_url } }
    ])
}

fn extract_openrouter_content(response: &Value) -> String {
    let content = response
        .pointer("/choices/0/message/content")
        .and_then(|v| v.as_str())
        .unwrap_or("");
    strip_reasoning(content)
}

impl OpenRouterProvider {
    pub fn new(
        base_url: &str,
        api_key: &str,
        temperature: f32,
        top_p: f32,
        timeout_seconds: u64,
    ) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            temperature,
            top_p,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    fn build_payload(&self, model: &str, request: &ChatRequest) -> Value {
        let message_content =
            build_message_content(&request.user_content, request.image_data_url.as_deref());
        json!({
            "model": model,
            "messages": [
                { "role": "system", "content": request.system_prompt },
                { "role": "user", "content": message_content }
            ],
            "temperature": self.temperature,
            "top_p": self.top_p,
        })
    }

    async fn call_openrouter_api(&self, payload: &Value) -> Result<Value> {
        debug!("OpenRouter request: {}", summarize_payload(payload));

        let response = get_http_client()
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .header("X-Title", "Character Reference Studio")
            .timeout(self.timeout)
            .json(payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            warn!(
                "OpenRouter API error: status={}, body={}",
                status, body_summary
            );
            let detail = message.unwrap_or(body_summary);
            return Err(anyhow!(
                "OpenRouter request failed with status {}: {}",
                status,
                detail
            ));
        }

        let value = response.json::<Value>().await?;
        debug!(
            "OpenRouter response received for model={}",
            payload
                .get("model")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown")
        );
        Ok(value)
    }
}

#[async_trait]
impl ChatProvider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    async fn complete(&self, model: &str, request: &ChatRequest) -> Result<String> {
        if model.trim().is_empty() {
            return Err(anyhow!("Model identifier is required"));
        }

        let payload = self.build_payload(model, request);
        let metadata = json!({ "has_image": request.image_data_url.is_some() });
        log_llm_timing("openrouter", model, "chat", Some(metadata), || async {
            let response = self.call_openrouter_api(&payload).await?;
            let content = extract_openrouter_content(&response);
            if content.is_empty() {
                warn!(
                    "OpenRouter response had empty content: {}",
                    truncate_for_log(&response.to_string(), 2000)
                );
            }
            Ok(content)
        })
        .await
    }
}
