//! Runtime abstraction over the model backend

use crate::config::GenerationSettings;
use crate::error::Result;
use serde::{Deserialize, Serialize};

pub mod candle_engine;
pub mod tokenizer;

pub use candle_engine::CandleEngine;
pub use tokenizer::{HfTokenizer, TextTokenizer};

/// Abstract runtime engine for text generation backends
pub trait RuntimeEngine {
    /// Generate a continuation of `prompt`. The returned text holds only the
    /// newly generated tokens, decoded without special tokens.
    fn generate(&mut self, prompt: &str, params: &GenerationSettings) -> Result<GenerationResult>;

    /// Get model information
    fn model_info(&self) -> ModelInfo;
}

/// Model information structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub architecture: String,
    pub device: String,
    pub dtype: String,
    /// Adapter directory merged into the weights, if any
    pub adapter: Option<String>,
}

/// Generation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationResult {
    pub text: String,
    pub prompt_tokens: usize,
    pub tokens_generated: usize,
    pub finish_reason: FinishReason,
    pub generation_time_ms: u64,
}

impl GenerationResult {
    pub fn tokens_per_second(&self) -> f64 {
        if self.generation_time_ms == 0 {
            return 0.0;
        }
        self.tokens_generated as f64 * 1000.0 / self.generation_time_ms as f64
    }
}

/// Reason why generation finished
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FinishReason {
    MaxTokens,
    EndOfSequence,
}
