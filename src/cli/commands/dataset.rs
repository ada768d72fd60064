use clap::Args;
use std::path::PathBuf;

/// Convert a JSON array of raw records into JSONL prompt/target pairs
#[derive(Debug, Args)]
pub struct FormatCommand {
    /// JSON array of {instruction, input, output} records
    #[arg(long, default_value = "../raw_data/data.json")]
    pub input: PathBuf,

    /// Destination JSONL file
    #[arg(long, default_value = "../raw_data/data.jsonl")]
    pub output: PathBuf,
}

/// Tokenize JSONL prompt/target pairs into a columnar training dataset
#[derive(Debug, Args)]
pub struct BuildDatasetCommand {
    /// JSONL file written by `format`
    #[arg(long, default_value = "../raw_data/data.jsonl")]
    pub input: PathBuf,

    /// Output dataset directory
    #[arg(long, default_value = "../data")]
    pub output: PathBuf,

    /// Maximum tokens per example (defaults to dataset.max_seq_length)
    #[arg(long)]
    pub max_seq_length: Option<usize>,

    /// Offline model directory providing tokenizer.json
    #[arg(long)]
    pub model_dir: Option<PathBuf>,
}
