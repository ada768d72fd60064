pub mod chat;
pub mod config;
pub mod dataset;

pub use chat::ChatCommand;
pub use config::LoggingConfig;
pub use dataset::{BuildDatasetCommand, FormatCommand};

use clap::Subcommand;

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Format raw instruction records into prompt/target JSONL
    Format(FormatCommand),
    /// Tokenize formatted records into a training dataset
    BuildDataset(BuildDatasetCommand),
    /// Chat with the base model plus a LoRA adapter
    Chat(ChatCommand),
}
