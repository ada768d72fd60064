//! LoRA (Low-Rank Adaptation) checkpoint loading for inference
//!
//! Adapters are produced by an external PEFT training run. At chat start the
//! checkpoint is read once and folded into the frozen base weights:
//! `W' = W + (B @ A) * (alpha / r)`. Nothing here trains or mutates weights
//! after that point.

pub mod checkpoint;
pub mod config;
pub mod merge;

pub use checkpoint::{AdapterCheckpoint, LoRAPair};
pub use config::LoRAConfig;
pub use merge::{base_key_for, merge_adapter, LoRAMerger, MergeReport};
