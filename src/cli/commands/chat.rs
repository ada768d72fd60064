use clap::Args;
use std::path::PathBuf;

/// Interactive chat with an adapter merged into the base model
#[derive(Debug, Args)]
pub struct ChatCommand {
    /// Adapter checkpoint directory (adapter_model.safetensors or adapter_model.bin)
    #[arg(long = "weight-path", alias = "weight_path")]
    pub weight_path: Option<PathBuf>,

    /// Compute device (cpu, cuda, cuda:N, metal)
    #[arg(long)]
    pub device: Option<String>,

    /// Sampling temperature
    #[arg(long)]
    pub temperature: Option<f64>,

    /// Nucleus sampling cutoff
    #[arg(long)]
    pub top_p: Option<f64>,

    /// Repetition penalty (1.0 disables it)
    #[arg(long)]
    pub repetition_penalty: Option<f32>,

    /// Maximum number of generated tokens per answer
    #[arg(long)]
    pub max_new_tokens: Option<usize>,

    /// Offline model directory with tokenizer.json and safetensors shards
    #[arg(long)]
    pub model_dir: Option<PathBuf>,
}
