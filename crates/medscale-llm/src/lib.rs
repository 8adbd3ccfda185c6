//! LLM adapters for clinical scale extraction.
//!
//! This crate builds prompts and parses completions: free-text scale
//! write-ups become [`medscale_core::models::ScaleDraft`]s, and clinical
//! conversations become input values for the evaluator. The completion
//! model itself sits behind [`CompletionBackend`].

pub mod extraction;
pub mod prompts;
pub mod values;

pub use extraction::*;
pub use prompts::*;
pub use values::*;
