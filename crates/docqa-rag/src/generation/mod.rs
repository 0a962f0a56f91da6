//! Prompt assembly for answer generation

pub mod prompt;

pub use prompt::{PromptBuilder, NO_DOCUMENTS_ANSWER};
