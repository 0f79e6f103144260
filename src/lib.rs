pub mod cascade;
pub mod config;
pub mod generation;
pub mod llm;
pub mod prompt;
pub mod reference;
pub mod upload;
pub mod utils;
pub mod vision;

pub use generation::{GenerationError, VariationGenerator};
pub use prompt::{GeneratedPrompt, PromptSynthesizer, VariationRequest, VariationType};
pub use reference::{build_reference_set, reference_plan, ReferenceSet};
pub use vision::{VisionDescriber, VisionRequest};
