use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use tracing::info;

use crate::llm::media::{detect_mime_type, encode_data_url, is_image_mime};
use crate::vision::{VisionDescriber, VisionRequest};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAnalysis {
    pub image_url: String,
    pub description: String,
}

pub fn image_to_data_url(bytes: &[u8]) -> Result<String> {
    if bytes.is_empty() {
        return Err(anyhow!("No image provided"));
    }
    let mime_type = detect_mime_type(bytes)
        .ok_or_else(|| anyhow!("Unrecognized file type; expected an image"))?;
    if !is_image_mime(&mime_type) {
        return Err(anyhow!("Unsupported file type {mime_type}; expected an image"));
    }
    Ok(encode_data_url(&mime_type, bytes))
}

pub async fn read_image_file(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read image {}", path.display()))
}

/// Converts the upload and describes it for later prompt synthesis.
pub async fn analyze_upload(bytes: &[u8], describer: &VisionDescriber) -> Result<UploadAnalysis> {
    let image_url = image_to_data_url(bytes)?;
    let description = describer.describe(&VisionRequest::new(image_url.clone())).await;
    info!(
        "Analyzed upload: bytes={}, description_chars={}",
        bytes.len(),
        description.chars().count()
    );
    Ok(UploadAnalysis {
        image_url,
        description,
    })
}
