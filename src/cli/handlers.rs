use anyhow::{bail, Context, Result};
use std::io;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    chat::{run_repl, ChatSession},
    cli::commands::{BuildDatasetCommand, ChatCommand, FormatCommand, LoggingConfig},
    config::Settings,
    dataset,
    runtime::{candle_engine::ModelFiles, CandleEngine, HfTokenizer, RuntimeEngine},
};

/// Install the global subscriber. Logs go to stderr so the chat transcript on
/// stdout stays clean. The returned guard must live as long as logging is
/// needed when a log file is configured.
pub fn init_logging(logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::builder()
        .with_default_directive(
            logging
                .get_effective_level()
                .parse::<LevelFilter>()
                .unwrap_or(LevelFilter::INFO)
                .into(),
        )
        .parse_lossy(logging.log_filter.as_deref().unwrap_or(""));

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_target(true)
        .compact();

    let (file_layer, guard) = match &logging.log_file {
        Some(path) => {
            let dir = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(std::path::Path::new("."));
            let name = path
                .file_name()
                .context("log file path has no file name")?;
            let appender = tracing_appender::rolling::never(dir, name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;
    Ok(guard)
}

pub fn handle_format(cmd: FormatCommand, settings: &Settings) -> Result<()> {
    let count = dataset::to_jsonl(&cmd.input, &cmd.output, &settings.dataset.meta_instruction)
        .with_context(|| format!("Failed to format {}", cmd.input.display()))?;
    println!("Formatted {} records into {}", count, cmd.output.display());
    Ok(())
}

pub fn handle_build_dataset(cmd: BuildDatasetCommand, mut settings: Settings) -> Result<()> {
    if let Some(dir) = cmd.model_dir {
        settings.model.local_dir = Some(dir);
    }
    let max_seq_length = cmd.max_seq_length.unwrap_or(settings.dataset.max_seq_length);
    if max_seq_length == 0 {
        bail!("--max-seq-length must be at least 1");
    }

    let tokenizer_path = ModelFiles::resolve_tokenizer(&settings.model)?;
    let tokenizer = HfTokenizer::from_file(&tokenizer_path, &settings.model.eos_token)?;

    let info = dataset::to_dataset(&cmd.input, &tokenizer, max_seq_length, &cmd.output)
        .with_context(|| format!("Failed to build dataset from {}", cmd.input.display()))?;
    println!(
        "Saved {} examples (max_seq_length {}) to {}",
        info.num_rows,
        info.max_seq_length,
        cmd.output.display()
    );
    Ok(())
}

/// Fold chat flags into the loaded settings
pub fn apply_chat_overrides(settings: &mut Settings, cmd: &ChatCommand) -> crate::error::Result<()> {
    if let Some(device) = &cmd.device {
        settings.model.device = device.clone();
    }
    if let Some(dir) = &cmd.model_dir {
        settings.model.local_dir = Some(dir.clone());
    }
    if let Some(temperature) = cmd.temperature {
        settings.generation.temperature = temperature;
    }
    if let Some(top_p) = cmd.top_p {
        settings.generation.top_p = top_p;
    }
    if let Some(penalty) = cmd.repetition_penalty {
        settings.generation.repetition_penalty = penalty;
    }
    if let Some(max_new_tokens) = cmd.max_new_tokens {
        settings.generation.max_new_tokens = max_new_tokens;
    }
    settings.validate()
}

pub fn handle_chat(cmd: ChatCommand, mut settings: Settings) -> Result<()> {
    let Some(weight_path) = cmd.weight_path.clone() else {
        bail!("--weight-path is required to load the fine-tuned adapter");
    };
    apply_chat_overrides(&mut settings, &cmd)?;

    let mut engine = CandleEngine::load(&settings.model).context("Failed to load base model")?;
    engine
        .load_adapter(&weight_path, &settings.adapter)
        .with_context(|| format!("Failed to load adapter from {}", weight_path.display()))?;
    let info = engine.model_info();
    tracing::info!(
        "Model {} ready on {} ({}) with adapter {}",
        info.name,
        info.device,
        info.dtype,
        info.adapter.as_deref().unwrap_or("-")
    );

    let mut session = ChatSession::new(engine, settings.generation.clone()).with_window(settings.chat.history_window);
    let stdin = io::stdin();
    let stdout = io::stdout();
    run_repl(&mut session, &settings.chat.speaker, stdin.lock(), stdout.lock())?;
    Ok(())
}
