//! XiaoRuan binary.
//!
//! Prepares instruction-tuning data for ChatGLM and chats with a LoRA
//! adapter merged into the base model.

use anyhow::Context;
use clap::Parser;
use tracing::info;
use xiaoruan_core::{
    cli::{commands::Commands, handle_build_dataset, handle_chat, handle_format, init_logging, Cli},
    config::Settings,
};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = Settings::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let logging = cli
        .logging
        .clone()
        .with_fallback(settings.logging.level.as_deref(), settings.logging.filter.as_deref());
    let _guard = init_logging(&logging)?;

    info!("XiaoRuan {} starting up", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Commands::Format(cmd) => handle_format(cmd, &settings)?,
        Commands::BuildDataset(cmd) => handle_build_dataset(cmd, settings)?,
        Commands::Chat(cmd) => handle_chat(cmd, settings)?,
    }

    Ok(())
}
