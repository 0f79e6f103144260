use base64::{engine::general_purpose, Engine as _};

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn is_image_mime(mime_type: &str) -> bool {
    mime_type.starts_with("image/")
}

pub fn encode_data_url(mime_type: &str, data: &[u8]) -> String {
    format!(
        "data:{};base64,{}",
        mime_type,
        general_purpose::STANDARD.encode(data)
    )
}

/// Returns the payload after the first comma of a data URL; anything without
/// a comma is assumed to already be bare base64.
pub fn strip_data_url_prefix(value: &str) -> &str {
    match value.split_once(',') {
        Some((_, payload)) => payload,
        None => value,
    }
}

/// Wraps bare base64 PNG output as a data URL, leaving existing data URLs
/// untouched.
pub fn ensure_png_data_url(value: &str) -> String {
    if value.starts_with("data:") {
        value.to_string()
    } else {
        format!("data:image/png;base64,{value}")
    }
}
