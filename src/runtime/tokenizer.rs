//! Tokenizer seam shared by the dataset formatter and the chat engine.

use crate::error::{Error, Result};
use std::path::Path;
use tokenizers::Tokenizer;

/// Minimal tokenizer surface the rest of the crate relies on
pub trait TextTokenizer {
    /// Encode `text`; `add_special_tokens` controls the post-processor
    /// (prefix tokens such as gMASK/sop for ChatGLM).
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>>;

    /// Decode ids back into text, skipping special tokens
    fn decode(&self, ids: &[u32]) -> Result<String>;

    /// Id appended after every training target
    fn eos_token_id(&self) -> u32;
}

/// `tokenizers`-backed implementation loaded from `tokenizer.json`
pub struct HfTokenizer {
    inner: Tokenizer,
    eos_token_id: u32,
}

impl HfTokenizer {
    pub fn from_file(path: impl AsRef<Path>, eos_token: &str) -> Result<Self> {
        let path = path.as_ref();
        let inner = Tokenizer::from_file(path)
            .map_err(|e| Error::Tokenizer(format!("failed to load {}: {e}", path.display())))?;
        Self::new(inner, eos_token)
    }

    pub fn from_bytes(bytes: impl AsRef<[u8]>, eos_token: &str) -> Result<Self> {
        let inner = Tokenizer::from_bytes(bytes)?;
        Self::new(inner, eos_token)
    }

    pub fn new(inner: Tokenizer, eos_token: &str) -> Result<Self> {
        let eos_token_id = inner
            .token_to_id(eos_token)
            .ok_or_else(|| Error::Tokenizer(format!("eos token '{eos_token}' is not in the vocabulary")))?;
        Ok(Self {
            inner,
            eos_token_id,
        })
    }

    pub fn inner(&self) -> &Tokenizer {
        &self.inner
    }
}

impl TextTokenizer for HfTokenizer {
    fn encode(&self, text: &str, add_special_tokens: bool) -> Result<Vec<u32>> {
        let encoding = self.inner.encode(text, add_special_tokens)?;
        Ok(encoding.get_ids().to_vec())
    }

    fn decode(&self, ids: &[u32]) -> Result<String> {
        Ok(self.inner.decode(ids, true)?)
    }

    fn eos_token_id(&self) -> u32 {
        self.eos_token_id
    }
}
