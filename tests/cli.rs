use clap::Parser;
use std::path::PathBuf;
use xiaoruan_core::{
    cli::{
        commands::{ChatCommand, Commands, LoggingConfig},
        handlers::apply_chat_overrides,
        Cli,
    },
    config::Settings,
};

#[test]
fn test_logging_config() {
    // Test default values
    let default_config = LoggingConfig::default();
    assert_eq!(default_config.verbose, 0);
    assert_eq!(default_config.get_effective_level(), "info");
    assert!(default_config.log_level.is_none());
    assert!(default_config.log_filter.is_none());

    // Test -v flag (debug level)
    let debug_config = LoggingConfig {
        verbose: 1,
        ..LoggingConfig::default()
    };
    assert_eq!(debug_config.get_effective_level(), "debug");

    // Test -vv flag (trace level)
    let trace_config = LoggingConfig {
        verbose: 2,
        ..LoggingConfig::default()
    };
    assert_eq!(trace_config.get_effective_level(), "trace");

    // Test explicit log level
    let explicit_config = LoggingConfig {
        log_level: Some("warn".to_string()),
        ..LoggingConfig::default()
    };
    assert_eq!(explicit_config.get_effective_level(), "warn");

    // Test that -v/-vv overrides explicit level
    let override_config = LoggingConfig {
        verbose: 2,
        log_level: Some("warn".to_string()),
        ..LoggingConfig::default()
    };
    assert_eq!(override_config.get_effective_level(), "trace");
}

#[test]
fn test_logging_fallback_from_settings() {
    let config = LoggingConfig::default().with_fallback(Some("error"), Some("xiaoruan_core=debug"));
    assert_eq!(config.get_effective_level(), "error");
    assert_eq!(config.log_filter.as_deref(), Some("xiaoruan_core=debug"));

    let cli_wins = LoggingConfig {
        log_level: Some("warn".to_string()),
        ..LoggingConfig::default()
    }
    .with_fallback(Some("error"), None);
    assert_eq!(cli_wins.get_effective_level(), "warn");
}

#[test]
fn test_parse_chat_command() {
    let cli = Cli::parse_from([
        "xiaoruan",
        "chat",
        "--weight-path",
        "output/checkpoint-1000",
        "--temperature",
        "0.5",
        "-v",
    ]);
    assert_eq!(cli.logging.verbose, 1);
    match cli.command {
        Commands::Chat(cmd) => {
            assert_eq!(cmd.weight_path, Some(PathBuf::from("output/checkpoint-1000")));
            assert_eq!(cmd.temperature, Some(0.5));
            assert!(cmd.top_p.is_none());
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn test_parse_build_dataset_defaults() {
    let cli = Cli::parse_from(["xiaoruan", "build-dataset", "--max-seq-length", "256"]);
    match cli.command {
        Commands::BuildDataset(cmd) => {
            assert_eq!(cmd.input, PathBuf::from("../raw_data/data.jsonl"));
            assert_eq!(cmd.output, PathBuf::from("../data"));
            assert_eq!(cmd.max_seq_length, Some(256));
        }
        other => panic!("unexpected command {other:?}"),
    }
}

#[test]
fn test_chat_overrides() {
    let mut settings = Settings::defaults().unwrap();
    let cmd = ChatCommand {
        weight_path: None,
        device: Some("cpu".to_string()),
        temperature: Some(0.2),
        top_p: Some(0.9),
        repetition_penalty: Some(1.0),
        max_new_tokens: Some(16),
        model_dir: None,
    };
    apply_chat_overrides(&mut settings, &cmd).unwrap();
    assert_eq!(settings.model.device, "cpu");
    assert_eq!(settings.generation.temperature, 0.2);
    assert_eq!(settings.generation.top_p, 0.9);
    assert_eq!(settings.generation.repetition_penalty, 1.0);
    assert_eq!(settings.generation.max_new_tokens, 16);
}

#[test]
fn test_chat_overrides_are_validated() {
    let mut settings = Settings::defaults().unwrap();
    let cmd = ChatCommand {
        weight_path: None,
        device: Some("abacus".to_string()),
        temperature: None,
        top_p: None,
        repetition_penalty: None,
        max_new_tokens: None,
        model_dir: None,
    };
    assert!(apply_chat_overrides(&mut settings, &cmd).is_err());
}
