//! Instruction dataset preparation and LoRA adapter chat for ChatGLM models.
//!
//! - [`dataset`]: raw records -> prompt/target pairs -> tokenized columnar dataset
//! - [`chat`]: windowed multi-turn chat driver
//! - [`runtime`]: model handle, tokenizer and generation seam
//! - [`lora`]: adapter checkpoint loading and weight merging

pub mod chat;
pub mod cli;
pub mod config;
pub mod dataset;
pub mod error;
pub mod lora;
pub mod runtime;

// Re-export commonly used types
pub use chat::ChatSession;
pub use config::Settings;
pub use dataset::{format_data, tokenize, FormattedRecord, RawRecord, TokenizedRecord};
pub use error::{Error, Result};
pub use runtime::{CandleEngine, RuntimeEngine, TextTokenizer};
