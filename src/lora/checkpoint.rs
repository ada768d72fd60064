//! Adapter checkpoint directory loading
//!
//! A checkpoint directory holds `adapter_model.safetensors` or the PyTorch
//! pickle `adapter_model.bin`, plus an optional `adapter_config.json`.

use crate::config::AdapterDefaults;
use crate::error::{Error, Result};
use crate::lora::config::LoRAConfig;
use crate::lora::merge::{base_key_for, LoRAFactor};
use candle_core::{Device, Tensor};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const SAFETENSORS_FILE: &str = "adapter_model.safetensors";
pub const PICKLE_FILE: &str = "adapter_model.bin";

/// Low-rank factors for one adapted module
#[derive(Debug, Clone)]
pub struct LoRAPair {
    /// `[r, in_features]`
    pub lora_a: Tensor,
    /// `[out_features, r]`
    pub lora_b: Tensor,
}

/// A loaded adapter: configuration plus factors keyed by base weight name
#[derive(Debug)]
pub struct AdapterCheckpoint {
    pub path: PathBuf,
    pub config: LoRAConfig,
    pub modules: BTreeMap<String, LoRAPair>,
}

impl AdapterCheckpoint {
    /// Load an adapter directory onto `device`
    pub fn load(dir: impl AsRef<Path>, defaults: &AdapterDefaults, device: &Device) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::adapter(format!(
                "adapter checkpoint directory {} does not exist",
                dir.display()
            )));
        }

        let config = LoRAConfig::load_or(dir, defaults)?;
        let tensors = read_weights(dir, device)?;
        let modules = pair_factors(tensors)?;
        if modules.is_empty() {
            return Err(Error::adapter(format!(
                "no lora_A/lora_B tensors found in {}",
                dir.display()
            )));
        }

        tracing::info!(
            "Loaded adapter from {} ({} modules, r={}, alpha={})",
            dir.display(),
            modules.len(),
            config.r,
            config.lora_alpha
        );

        Ok(Self {
            path: dir.to_path_buf(),
            config,
            modules,
        })
    }

    pub fn from_parts(path: PathBuf, config: LoRAConfig, modules: BTreeMap<String, LoRAPair>) -> Self {
        Self { path, config, modules }
    }
}

fn read_weights(dir: &Path, device: &Device) -> Result<Vec<(String, Tensor)>> {
    let safetensors = dir.join(SAFETENSORS_FILE);
    if safetensors.exists() {
        tracing::debug!("Reading adapter weights from {}", safetensors.display());
        let tensors = candle_core::safetensors::load(&safetensors, device)?;
        return Ok(tensors.into_iter().collect());
    }

    let pickle = dir.join(PICKLE_FILE);
    if pickle.exists() {
        tracing::debug!("Reading adapter weights from {}", pickle.display());
        let tensors = candle_core::pickle::read_all(&pickle)?;
        return tensors
            .into_iter()
            .map(|(name, tensor)| Ok((name, tensor.to_device(device)?)))
            .collect();
    }

    Err(Error::adapter(format!(
        "neither {SAFETENSORS_FILE} nor {PICKLE_FILE} found in {}",
        dir.display()
    )))
}

/// Group raw adapter tensors into A/B pairs keyed by base weight name
pub(crate) fn pair_factors(tensors: Vec<(String, Tensor)>) -> Result<BTreeMap<String, LoRAPair>> {
    let mut a_factors = BTreeMap::new();
    let mut b_factors = BTreeMap::new();

    for (name, tensor) in tensors {
        match base_key_for(&name) {
            Some((base, LoRAFactor::A)) => {
                a_factors.insert(base, tensor);
            }
            Some((base, LoRAFactor::B)) => {
                b_factors.insert(base, tensor);
            }
            None => tracing::trace!("Ignoring non-LoRA adapter tensor {}", name),
        }
    }

    let mut modules = BTreeMap::new();
    for (base, lora_a) in a_factors {
        let lora_b = b_factors
            .remove(&base)
            .ok_or_else(|| Error::adapter(format!("lora_A for {base} has no matching lora_B")))?;
        modules.insert(base, LoRAPair { lora_a, lora_b });
    }
    if let Some(base) = b_factors.keys().next() {
        return Err(Error::adapter(format!("lora_B for {base} has no matching lora_A")));
    }
    Ok(modules)
}
