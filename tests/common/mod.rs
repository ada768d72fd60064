//! Common test utilities: deterministic tokenizers and a scripted engine

#![allow(dead_code)]

use std::collections::VecDeque;
use xiaoruan_core::{
    config::GenerationSettings,
    error::{Error, Result},
    runtime::{FinishReason, GenerationResult, HfTokenizer, ModelInfo, RuntimeEngine, TextTokenizer},
};

pub const PREFIX_IDS: [u32; 2] = [1, 2];
pub const EOS_ID: u32 = 3;
const CHAR_OFFSET: u32 = 16;

/// One token per character; special tokens prepend two prefix ids.
pub struct CharTokenizer;

impl TextTokenizer for CharTokenizer {
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>> {
        let mut ids = if add_special_tokens { PREFIX_IDS.to_vec() } else { Vec::new() };
        ids.extend(text.chars().map(|c| c as u32 + CHAR_OFFSET));
        Ok(ids)
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        Ok(ids
            .iter()
            .filter(|&&id| id >= CHAR_OFFSET)
            .filter_map(|&id| char::from_u32(id - CHAR_OFFSET))
            .collect())
    }

    fn eos_token_id(&self) -> u32 {
        EOS_ID
    }
}

pub const WORD_LEVEL_TOKENIZER: &str = r#"{
    "version": "1.0",
    "truncation": null,
    "padding": null,
    "added_tokens": [
        {"id": 0, "content": "[UNK]", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true},
        {"id": 1, "content": "</s>", "single_word": false, "lstrip": false, "rstrip": false, "normalized": false, "special": true}
    ],
    "normalizer": null,
    "pre_tokenizer": {"type": "Whitespace"},
    "post_processor": null,
    "decoder": null,
    "model": {
        "type": "WordLevel",
        "vocab": {
            "[UNK]": 0, "</s>": 1,
            "what": 2, "is": 3, "the": 4, "capital": 5, "of": 6, "france": 7,
            "paris": 8, "answer": 9, "briefly": 10, "question": 11
        },
        "unk_token": "[UNK]"
    }
}"#;

pub fn word_level_tokenizer() -> HfTokenizer {
    HfTokenizer::from_bytes(WORD_LEVEL_TOKENIZER, "</s>").expect("valid tokenizer json")
}

/// Engine that replays canned outputs and records every prompt it sees
#[derive(Default)]
pub struct ScriptedEngine {
    pub responses: VecDeque<String>,
    pub prompts: Vec<String>,
    /// Prefix each output with the prompt, like a model that echoes its input
    pub echo_prompt: bool,
}

impl ScriptedEngine {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            responses: responses.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
            echo_prompt: false,
        }
    }

    pub fn echoing(mut self) -> Self {
        self.echo_prompt = true;
        self
    }
}

impl RuntimeEngine for ScriptedEngine {
    fn generate(&mut self, prompt: &str, _params: &GenerationSettings) -> Result<GenerationResult> {
        self.prompts.push(prompt.to_string());
        let answer = self
            .responses
            .pop_front()
            .ok_or_else(|| Error::Model("script exhausted".to_string()))?;
        let text = if self.echo_prompt {
            format!("{prompt}\n{answer}")
        } else {
            answer
        };
        Ok(GenerationResult {
            tokens_generated: text.chars().count(),
            text,
            prompt_tokens: prompt.chars().count(),
            finish_reason: FinishReason::EndOfSequence,
            generation_time_ms: 1,
        })
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: "scripted".to_string(),
            architecture: "test".to_string(),
            device: "Cpu".to_string(),
            dtype: "F32".to_string(),
            adapter: None,
        }
    }
}
