//! Command-line interface module.
//!
//! This module provides the CLI functionality for:
//! - Formatting raw instruction data
//! - Building the tokenized training dataset
//! - Interactive adapter chat

pub mod commands;
pub mod handlers;
pub mod options;

pub use handlers::{handle_build_dataset, handle_chat, handle_format, init_logging};
pub use options::Cli;
