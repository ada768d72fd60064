//! Folding LoRA factors into base model weights

use crate::error::{Error, Result};
use crate::lora::checkpoint::{AdapterCheckpoint, LoRAPair};
use candle_core::{DType, Tensor};
use std::collections::HashMap;

const PEFT_PREFIX: &str = "base_model.model.";

/// Which low-rank factor a tensor holds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoRAFactor {
    A,
    B,
}

/// Map a PEFT tensor name to the base weight it adapts.
///
/// `base_model.model.<module>.lora_A.weight` and the named-adapter form
/// `<module>.lora_A.default.weight` both map to `<module>.weight`.
pub fn base_key_for(adapter_key: &str) -> Option<(String, LoRAFactor)> {
    let key = adapter_key.strip_prefix(PEFT_PREFIX).unwrap_or(adapter_key);
    let key = key.strip_suffix(".weight")?;

    for (marker, factor) in [(".lora_A", LoRAFactor::A), (".lora_B", LoRAFactor::B)] {
        if let Some(idx) = key.find(marker) {
            let rest = &key[idx + marker.len()..];
            // Allow an optional adapter name segment, nothing else.
            if rest.is_empty() || (rest.starts_with('.') && !rest[1..].contains('.')) {
                return Some((format!("{}.weight", &key[..idx]), factor));
            }
        }
    }
    None
}

/// Outcome of a merge pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    pub merged: Vec<String>,
    /// Adapter modules with no matching base weight
    pub skipped: Vec<String>,
}

/// Handles merging of LoRA factors into base weights
pub struct LoRAMerger;

impl LoRAMerger {
    /// `W + (B @ A) * scaling`, computed in f32 and cast back to the base dtype
    pub fn merge_into_base(base_weight: &Tensor, pair: &LoRAPair, scaling: f64) -> Result<Tensor> {
        let dtype = base_weight.dtype();
        let device = base_weight.device();
        let lora_a = pair.lora_a.to_device(device)?.to_dtype(DType::F32)?;
        let lora_b = pair.lora_b.to_device(device)?.to_dtype(DType::F32)?;
        let delta = lora_b.matmul(&lora_a)?.affine(scaling, 0.0)?;
        let base = base_weight.to_dtype(DType::F32)?;
        if delta.dims() != base.dims() {
            return Err(Error::dimension_mismatch(
                "lora delta".to_string(),
                format!("{:?}", base.dims()),
                format!("{:?}", delta.dims()),
            ));
        }
        Ok((base + delta)?.to_dtype(dtype)?)
    }
}

/// Merge every module of `adapter` into `weights` in place.
///
/// Loading is non-strict: adapter modules without a base weight are skipped
/// with a warning, shape mismatches abort. An adapter that matches no base
/// weight at all is an error.
pub fn merge_adapter(weights: &mut HashMap<String, Tensor>, adapter: &AdapterCheckpoint) -> Result<MergeReport> {
    let scaling = adapter.config.scaling();
    let mut report = MergeReport::default();

    for (name, pair) in &adapter.modules {
        let Some(base) = weights.get(name) else {
            tracing::warn!("Adapter module {} has no base weight, skipping", name);
            report.skipped.push(name.clone());
            continue;
        };
        let merged = LoRAMerger::merge_into_base(base, pair, scaling).map_err(|e| match e {
            Error::DimensionMismatch { expected, actual, .. } => Error::DimensionMismatch {
                name: name.clone(),
                expected,
                actual,
            },
            other => other,
        })?;
        weights.insert(name.clone(), merged);
        report.merged.push(name.clone());
    }

    if report.merged.is_empty() && !adapter.modules.is_empty() {
        return Err(Error::adapter(format!(
            "adapter {} matched none of its {} modules against the base model (first: {})",
            adapter.path.display(),
            adapter.modules.len(),
            report.skipped.first().map(String::as_str).unwrap_or("-")
        )));
    }
    tracing::info!(
        "Merged {} adapter modules (scaling {:.3}), skipped {}",
        report.merged.len(),
        scaling,
        report.skipped.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lora::LoRAConfig;
    use candle_core::Device;
    use std::collections::BTreeMap;
    use std::path::PathBuf;

    #[test]
    fn test_base_key_mapping() {
        assert_eq!(
            base_key_for("base_model.model.transformer.encoder.layers.3.self_attention.query_key_value.lora_A.weight"),
            Some((
                "transformer.encoder.layers.3.self_attention.query_key_value.weight".to_string(),
                LoRAFactor::A
            ))
        );
        assert_eq!(
            base_key_for("base_model.model.transformer.layers.0.attention.dense.lora_B.default.weight"),
            Some(("transformer.layers.0.attention.dense.weight".to_string(), LoRAFactor::B))
        );
        assert_eq!(base_key_for("base_model.model.transformer.layers.0.attention.dense.weight"), None);
        assert_eq!(base_key_for("transformer.word_embeddings.lora_embedding_A"), None);
    }

    #[test]
    fn test_merge_into_base_applies_scaled_delta() {
        let device = Device::Cpu;
        let base = Tensor::zeros((2, 3), DType::F32, &device).unwrap();
        let pair = LoRAPair {
            lora_a: Tensor::ones((1, 3), DType::F32, &device).unwrap(),
            lora_b: Tensor::ones((2, 1), DType::F32, &device).unwrap(),
        };
        let merged = LoRAMerger::merge_into_base(&base, &pair, 0.5).unwrap();
        let values = merged.to_vec2::<f32>().unwrap();
        assert_eq!(values, vec![vec![0.5; 3]; 2]);
    }

    #[test]
    fn test_merge_into_base_rejects_shape_mismatch() {
        let device = Device::Cpu;
        let base = Tensor::zeros((2, 3), DType::F32, &device).unwrap();
        let pair = LoRAPair {
            lora_a: Tensor::ones((1, 4), DType::F32, &device).unwrap(),
            lora_b: Tensor::ones((2, 1), DType::F32, &device).unwrap(),
        };
        assert!(LoRAMerger::merge_into_base(&base, &pair, 1.0).is_err());
    }

    #[test]
    fn test_merge_adapter_skips_unknown_modules() {
        let device = Device::Cpu;
        let mut weights = HashMap::new();
        weights.insert("layer.q.weight".to_string(), Tensor::zeros((2, 2), DType::F32, &device).unwrap());

        let pair = LoRAPair {
            lora_a: Tensor::ones((1, 2), DType::F32, &device).unwrap(),
            lora_b: Tensor::ones((2, 1), DType::F32, &device).unwrap(),
        };
        let mut modules = BTreeMap::new();
        modules.insert("layer.q.weight".to_string(), pair.clone());
        modules.insert("layer.missing.weight".to_string(), pair);
        let config = LoRAConfig {
            r: 1,
            lora_alpha: 2.0,
            ..LoRAConfig::default()
        };
        let adapter = AdapterCheckpoint::from_parts(PathBuf::from("adapter"), config, modules);

        let report = merge_adapter(&mut weights, &adapter).unwrap();
        assert_eq!(report.merged, vec!["layer.q.weight".to_string()]);
        assert_eq!(report.skipped, vec!["layer.missing.weight".to_string()]);
        let values = weights["layer.q.weight"].to_vec2::<f32>().unwrap();
        assert_eq!(values, vec![vec![2.0; 2]; 2]);
    }
}
