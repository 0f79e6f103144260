use crate::cascade::ToChatRequest;
use crate::config::PROMPT_SYSTEM_PROMPT;
use crate::llm::ChatRequest;
use crate::prompt::VariationRequest;
use crate::vision::DEFAULT_DESCRIPTION as VISION_FALLBACK_DESCRIPTION;

/// What the upload step reports when no real description is available.
pub const PLACEHOLDER_DESCRIPTION: &str = "a person, portrait, high quality";

/// True for the stock descriptions produced when no real description of the
/// subject exists.
pub fn is_generic_description(value: &str) -> bool {
    let value = value.trim();
    [PLACEHOLDER_DESCRIPTION, VISION_FALLBACK_DESCRIPTION]
        .iter()
        .any(|generic| value.eq_ignore_ascii_case(generic))
}

/// Stands in for a blank or placeholder description in model instructions.
pub const DEFAULT_SUBJECT_DESCRIPTION: &str = "A young woman with long wavy brunette hair, warm fair skin, soft glam makeup, and confident expression.";

const DEFAULT_ANGLE: &str = "front facing";
const UNCHANGED: &str = "same as original image";

const MANDATORY_CONSTRAINTS: &str = "\
- Same person, same face, same hair color and length, same ethnicity
- Hands and fingers must be anatomically correct, relaxed, no distortions
- Avoid pink button-up shirt unless requested
- If outfit or background is specified, make it visually obvious and coherent
- Describe lighting, mood, and composition
- Provide extra descriptive adjectives for fabrics, colors, and environment";

pub fn build_instruction_text(request: &VariationRequest) -> String {
    let description = request
        .subject_description()
        .unwrap_or(DEFAULT_SUBJECT_DESCRIPTION);

    format!(
        "ORIGINAL PERSON DESCRIPTION:\n{description}\n\n\
         REQUIRED ANGLE OR POSE:\n{angle}\n\n\
         REQUESTED OUTFIT STYLE:\n{outfit}\n\n\
         REQUESTED BACKGROUND:\n{background}\n\n\
         MANDATORY CONSTRAINTS:\n{MANDATORY_CONSTRAINTS}\n\n\
         Return a single descriptive sentence suitable for Stable Diffusion.",
        angle = request.angle().unwrap_or(DEFAULT_ANGLE),
        outfit = request.outfit().unwrap_or(UNCHANGED),
        background = request.background().unwrap_or(UNCHANGED),
    )
}

impl ToChatRequest for VariationRequest {
    fn to_chat_request(&self) -> ChatRequest {
        ChatRequest::text(PROMPT_SYSTEM_PROMPT, build_instruction_text(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_every_section() {
        let text = build_instruction_text(&VariationRequest::default());
        assert!(text.starts_with(&format!(
            "ORIGINAL PERSON DESCRIPTION:\n{DEFAULT_SUBJECT_DESCRIPTION}\n\n"
        )));
        assert!(text.contains("REQUIRED ANGLE OR POSE:\nfront facing\n"));
        assert!(text.contains("REQUESTED OUTFIT STYLE:\nsame as original image\n"));
        assert!(text.contains("REQUESTED BACKGROUND:\nsame as original image\n"));
        assert!(text.contains("- Avoid pink button-up shirt unless requested"));
        assert!(text.ends_with("suitable for Stable Diffusion."));
    }

    #[test]
    fn placeholder_description_is_replaced() {
        let request = VariationRequest {
            subject_description: Some(PLACEHOLDER_DESCRIPTION.to_string()),
            ..Default::default()
        };
        assert!(build_instruction_text(&request).contains(DEFAULT_SUBJECT_DESCRIPTION));
    }

    #[test]
    fn stock_descriptions_are_generic() {
        assert!(is_generic_description(PLACEHOLDER_DESCRIPTION));
        assert!(is_generic_description(&format!(
            "  {}  ",
            VISION_FALLBACK_DESCRIPTION.to_uppercase()
        )));
        assert!(!is_generic_description("a person with a red scarf"));
    }

    #[test]
    fn every_supplied_field_is_included() {
        let request = VariationRequest {
            subject_description: Some("  bald man, round glasses ".to_string()),
            angle: Some("facing right at 90 degrees, profile view".to_string()),
            outfit: Some("denim jacket".to_string()),
            background: Some("neon alley".to_string()),
            variation_type: None,
        };
        let text = build_instruction_text(&request);
        assert!(text.contains("ORIGINAL PERSON DESCRIPTION:\nbald man, round glasses\n"));
        assert!(text.contains("facing right at 90 degrees, profile view"));
        assert!(text.contains("REQUESTED OUTFIT STYLE:\ndenim jacket\n"));
        assert!(text.contains("REQUESTED BACKGROUND:\nneon alley\n"));

        let chat = request.to_chat_request();
        assert_eq!(chat.system_prompt, PROMPT_SYSTEM_PROMPT);
        assert_eq!(chat.user_content, text);
    }
}
