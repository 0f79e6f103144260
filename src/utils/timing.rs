use std::time::Instant;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tracing::info;

use crate::utils::logging::TIMING_TARGET;

/// Wraps one outbound model or backend call with a request/response pair of
/// records on the timing target.
pub async fn log_llm_timing<T, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, anyhow::Error>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: TIMING_TARGET,
        "event=llm_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let result = call().await;
    let status = if result.is_ok() { "success" } else { "error" };

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: TIMING_TARGET,
        "event=llm_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}
