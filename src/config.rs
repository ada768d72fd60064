//! Configuration management for xiaoruan.
//!
//! Settings are loaded from multiple sources, later sources overriding
//! earlier ones:
//! 1. Default configuration (embedded in binary)
//! 2. System-wide configuration file (`/etc/xiaoruan/config.toml`)
//! 3. User-specified configuration file
//! 4. Environment variables (`XIAORUAN__GENERATION__TEMPERATURE=0.8`)
//! 5. Command-line arguments (applied by the CLI handlers)

use crate::error::{Error, Result};
use candle_core::{DType, Device};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");
const SYSTEM_CONFIG: &str = "/etc/xiaoruan/config.toml";
const ENV_PREFIX: &str = "XIAORUAN";

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub generation: GenerationSettings,
    pub model: ModelSettings,
    pub dataset: DatasetSettings,
    pub chat: ChatSettings,
    pub adapter: AdapterDefaults,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Decoding parameters applied to every chat turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationSettings {
    /// Sampling randomness; zero or below selects greedy decoding
    pub temperature: f64,
    /// Nucleus sampling cutoff
    pub top_p: f64,
    /// Penalty applied to logits of recently seen tokens (1.0 disables it)
    pub repetition_penalty: f32,
    /// How many trailing tokens the repetition penalty looks at
    #[serde(default = "default_repeat_last_n")]
    pub repeat_last_n: usize,
    /// Generation length cap
    pub max_new_tokens: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.95,
            top_p: 0.7,
            repetition_penalty: 1.1,
            repeat_last_n: default_repeat_last_n(),
            max_new_tokens: 512,
            seed: default_seed(),
        }
    }
}

/// Where the base model comes from and where it runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    /// Hugging Face repository holding the safetensors weights
    pub repo: String,
    #[serde(default = "default_revision")]
    pub revision: String,
    /// Repository holding the tokenizer
    pub tokenizer_repo: String,
    /// Tokenizer file name inside `tokenizer_repo`
    #[serde(default = "default_tokenizer_file")]
    pub tokenizer_file: String,
    /// Offline directory with `tokenizer.json` and safetensors shards.
    /// Takes precedence over the hub repositories when set.
    #[serde(default)]
    pub local_dir: Option<PathBuf>,
    /// Compute placement: `cpu`, `cuda`, `cuda:N` or `metal`
    pub device: String,
    /// Weight precision: `f32`, `f16` or `bf16`
    pub dtype: String,
    pub eos_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSettings {
    /// Fixed system instruction prepended to every prompt
    pub meta_instruction: String,
    pub max_seq_length: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSettings {
    /// Number of trailing history entries used to build a prompt
    pub history_window: usize,
    /// Label printed in front of every answer
    pub speaker: String,
}

/// LoRA hyperparameters used when a checkpoint lacks `adapter_config.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterDefaults {
    pub r: usize,
    pub lora_alpha: f64,
    pub lora_dropout: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingSettings {
    pub level: Option<String>,
    pub filter: Option<String>,
}

fn default_repeat_last_n() -> usize {
    64
}

fn default_seed() -> u64 {
    299_792_458
}

fn default_revision() -> String {
    "main".to_string()
}

fn default_tokenizer_file() -> String {
    "chatglm-tokenizer.json".to_string()
}

impl Settings {
    /// Load settings from all sources
    pub fn load(config_file: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .add_source(config::File::with_name(SYSTEM_CONFIG).required(false));

        if let Some(path) = config_file {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__"),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Embedded defaults only, ignoring files and environment
    pub fn defaults() -> Result<Self> {
        let settings: Settings = config::Config::builder()
            .add_source(config::File::from_str(DEFAULT_CONFIG, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.dataset.max_seq_length == 0 {
            return Err(Error::config("dataset.max_seq_length must be at least 1"));
        }
        if self.chat.history_window == 0 {
            return Err(Error::config("chat.history_window must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.generation.top_p) {
            return Err(Error::config(format!(
                "generation.top_p must be within [0, 1], got {}",
                self.generation.top_p
            )));
        }
        if self.generation.repetition_penalty <= 0.0 {
            return Err(Error::config("generation.repetition_penalty must be positive"));
        }
        if self.adapter.r == 0 {
            return Err(Error::config("adapter.r must be at least 1"));
        }
        self.model.device()?;
        self.model.dtype()?;
        Ok(())
    }
}

impl ModelSettings {
    /// Resolve the configured device string into a candle device
    pub fn device(&self) -> Result<DeviceSpec> {
        parse_device(&self.device)
    }

    pub fn dtype(&self) -> Result<DType> {
        match self.dtype.to_ascii_lowercase().as_str() {
            "f32" => Ok(DType::F32),
            "f16" => Ok(DType::F16),
            "bf16" => Ok(DType::BF16),
            other => Err(Error::config(format!("unsupported dtype '{other}'"))),
        }
    }
}

/// Parsed compute placement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceSpec {
    Cpu,
    Cuda(usize),
    Metal(usize),
}

impl DeviceSpec {
    /// Open the device. CUDA falls back to CPU when the runtime has no GPU.
    pub fn open(self) -> Result<Device> {
        match self {
            DeviceSpec::Cpu => Ok(Device::Cpu),
            DeviceSpec::Cuda(ordinal) => {
                if candle_core::utils::cuda_is_available() {
                    Ok(Device::new_cuda(ordinal)?)
                } else {
                    tracing::warn!("CUDA requested but not available, running on CPU");
                    Ok(Device::Cpu)
                }
            }
            DeviceSpec::Metal(ordinal) => {
                if candle_core::utils::metal_is_available() {
                    Ok(Device::new_metal(ordinal)?)
                } else {
                    tracing::warn!("Metal requested but not available, running on CPU");
                    Ok(Device::Cpu)
                }
            }
        }
    }
}

pub fn parse_device(spec: &str) -> Result<DeviceSpec> {
    let spec = spec.trim().to_ascii_lowercase();
    let (kind, ordinal) = match spec.split_once(':') {
        Some((kind, ordinal)) => {
            let ordinal = ordinal
                .parse::<usize>()
                .map_err(|_| Error::config(format!("invalid device ordinal in '{spec}'")))?;
            (kind.to_string(), ordinal)
        }
        None => (spec.clone(), 0),
    };
    match kind.as_str() {
        "cpu" => Ok(DeviceSpec::Cpu),
        "cuda" | "gpu" => Ok(DeviceSpec::Cuda(ordinal)),
        "metal" | "mps" => Ok(DeviceSpec::Metal(ordinal)),
        _ => Err(Error::config(format!("unknown device '{spec}'"))),
    }
}
