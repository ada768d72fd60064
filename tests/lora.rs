use candle_core::{DType, Device, Tensor};
use std::collections::HashMap;
use tempfile::TempDir;
use xiaoruan_core::{
    config::Settings,
    error::Error,
    lora::{merge_adapter, AdapterCheckpoint},
};

const MODULE: &str = "transformer.encoder.layers.0.self_attention.query_key_value";

fn write_adapter(dir: &std::path::Path, with_config: bool) {
    write_adapter_for(dir, MODULE, with_config);
}

fn write_adapter_for(dir: &std::path::Path, module: &str, with_config: bool) {
    let device = Device::Cpu;
    let mut tensors = HashMap::new();
    tensors.insert(
        format!("base_model.model.{module}.lora_A.weight"),
        Tensor::ones((2, 3), DType::F32, &device).unwrap(),
    );
    tensors.insert(
        format!("base_model.model.{module}.lora_B.weight"),
        Tensor::ones((4, 2), DType::F32, &device).unwrap(),
    );
    candle_core::safetensors::save(&tensors, dir.join("adapter_model.safetensors")).unwrap();

    if with_config {
        std::fs::write(
            dir.join("adapter_config.json"),
            r#"{"peft_type": "LORA", "r": 2, "lora_alpha": 1, "lora_dropout": 0.0, "target_modules": ["query_key_value"]}"#,
        )
        .unwrap();
    }
}

fn base_weights() -> HashMap<String, Tensor> {
    let mut weights = HashMap::new();
    weights.insert(
        format!("{MODULE}.weight"),
        Tensor::zeros((4, 3), DType::F32, &Device::Cpu).unwrap(),
    );
    weights
}

#[test]
fn test_load_and_merge_with_adapter_config() {
    let dir = TempDir::new().unwrap();
    write_adapter(dir.path(), true);
    let defaults = Settings::defaults().unwrap().adapter;

    let adapter = AdapterCheckpoint::load(dir.path(), &defaults, &Device::Cpu).unwrap();
    assert_eq!(adapter.config.r, 2);
    assert_eq!(adapter.modules.len(), 1);

    let mut weights = base_weights();
    let report = merge_adapter(&mut weights, &adapter).unwrap();
    assert_eq!(report.merged.len(), 1);

    // B @ A is all 2.0 (rank 2), scaled by alpha / r = 0.5
    let merged = weights[&format!("{MODULE}.weight")].to_vec2::<f32>().unwrap();
    assert_eq!(merged, vec![vec![1.0; 3]; 4]);
}

#[test]
fn test_missing_adapter_config_uses_defaults() {
    let dir = TempDir::new().unwrap();
    write_adapter(dir.path(), false);
    let defaults = Settings::defaults().unwrap().adapter;

    let adapter = AdapterCheckpoint::load(dir.path(), &defaults, &Device::Cpu).unwrap();
    assert_eq!(adapter.config.r, 8);
    assert_eq!(adapter.config.scaling(), 4.0);

    let mut weights = base_weights();
    merge_adapter(&mut weights, &adapter).unwrap();
    let merged = weights[&format!("{MODULE}.weight")].to_vec2::<f32>().unwrap();
    assert_eq!(merged, vec![vec![8.0; 3]; 4]);
}

#[test]
fn test_adapter_matching_no_base_weight_is_rejected() {
    // chatglm-6b (v1) module naming against a chatglm3 base
    let dir = TempDir::new().unwrap();
    write_adapter_for(dir.path(), "transformer.layers.0.attention.query_key_value", true);
    let defaults = Settings::defaults().unwrap().adapter;

    let adapter = AdapterCheckpoint::load(dir.path(), &defaults, &Device::Cpu).unwrap();
    assert_eq!(adapter.modules.len(), 1);

    let mut weights = base_weights();
    let err = merge_adapter(&mut weights, &adapter).unwrap_err();
    assert!(matches!(err, Error::Adapter(_)), "unexpected error {err:?}");

    let untouched = weights[&format!("{MODULE}.weight")].to_vec2::<f32>().unwrap();
    assert_eq!(untouched, vec![vec![0.0; 3]; 4]);
}

#[test]
fn test_directory_without_weights_is_rejected() {
    let dir = TempDir::new().unwrap();
    let defaults = Settings::defaults().unwrap().adapter;
    assert!(AdapterCheckpoint::load(dir.path(), &defaults, &Device::Cpu).is_err());
}
