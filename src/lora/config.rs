//! Adapter hyperparameters as written by PEFT in `adapter_config.json`

use crate::config::AdapterDefaults;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";

/// LoRA configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoRAConfig {
    /// Low-rank dimension
    pub r: usize,

    /// Scaling numerator; effective scale is `lora_alpha / r`
    pub lora_alpha: f64,

    /// Only meaningful during training, kept for round-tripping
    #[serde(default)]
    pub lora_dropout: f64,

    /// Module names the adapter was trained on (informational)
    #[serde(default)]
    pub target_modules: Option<Vec<String>>,

    #[serde(default = "default_inference_mode")]
    pub inference_mode: bool,
}

fn default_inference_mode() -> bool {
    true
}

impl Default for LoRAConfig {
    fn default() -> Self {
        Self {
            r: 8,
            lora_alpha: 32.0,
            lora_dropout: 0.1,
            target_modules: None,
            inference_mode: true,
        }
    }
}

impl From<&AdapterDefaults> for LoRAConfig {
    fn from(defaults: &AdapterDefaults) -> Self {
        Self {
            r: defaults.r,
            lora_alpha: defaults.lora_alpha,
            lora_dropout: defaults.lora_dropout,
            target_modules: None,
            inference_mode: true,
        }
    }
}

impl LoRAConfig {
    /// Read `adapter_config.json` from `dir`, or fall back to `defaults`
    pub fn load_or(dir: &Path, defaults: &AdapterDefaults) -> Result<Self> {
        let path = dir.join(ADAPTER_CONFIG_FILE);
        if !path.exists() {
            tracing::debug!(
                "No {} in {}, using configured adapter defaults",
                ADAPTER_CONFIG_FILE,
                dir.display()
            );
            return Ok(Self::from(defaults));
        }
        let config: LoRAConfig = serde_json::from_slice(&std::fs::read(&path)?)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.r == 0 {
            return Err(Error::adapter("adapter rank r must be at least 1"));
        }
        Ok(())
    }

    pub fn scaling(&self) -> f64 {
        self.lora_alpha / self.r as f64
    }
}
