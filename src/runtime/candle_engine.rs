//! Candle-based ChatGLM engine with a merged LoRA adapter
//!
//! The engine is the explicit model handle: it owns the device, the base
//! weights (with any adapter folded in) and the tokenizer. It is built once
//! at process start and only read afterwards.

use crate::config::{AdapterDefaults, GenerationSettings, ModelSettings};
use crate::error::{Error, Result};
use crate::lora::{merge_adapter, AdapterCheckpoint, MergeReport};
use crate::runtime::tokenizer::{HfTokenizer, TextTokenizer};
use crate::runtime::{FinishReason, GenerationResult, ModelInfo, RuntimeEngine};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::{LogitsProcessor, Sampling};
use candle_transformers::models::chatglm::{Config as GlmConfig, Model as GlmModel};
use hf_hub::{api::sync::Api, Repo, RepoType};
use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Instant;

/// Tokenizer file name in an offline model directory
const TOKENIZER_FILE: &str = "tokenizer.json";
const SAFETENSORS_INDEX: &str = "model.safetensors.index.json";

/// Files needed to instantiate the base model
#[derive(Debug, Clone)]
pub struct ModelFiles {
    pub tokenizer: PathBuf,
    pub weights: Vec<PathBuf>,
}

#[derive(Deserialize)]
struct SafetensorsIndex {
    weight_map: HashMap<String, String>,
}

/// Shard file names referenced by a `model.safetensors.index.json`
fn shard_names(index_path: &Path) -> Result<Vec<String>> {
    let index: SafetensorsIndex = serde_json::from_slice(&std::fs::read(index_path)?)?;
    let shards: BTreeSet<String> = index.weight_map.into_values().collect();
    Ok(shards.into_iter().collect())
}

/// Tokenizer file to request from the hub tokenizer repository
pub fn hub_tokenizer_file(settings: &ModelSettings) -> &str {
    &settings.tokenizer_file
}

impl ModelFiles {
    /// Resolve model files from `local_dir` or, failing that, the hub
    pub fn resolve(settings: &ModelSettings) -> Result<Self> {
        match &settings.local_dir {
            Some(dir) => Self::from_dir(dir),
            None => Self::from_hub(settings),
        }
    }

    /// Only the tokenizer, for jobs that never touch the weights
    pub fn resolve_tokenizer(settings: &ModelSettings) -> Result<PathBuf> {
        match &settings.local_dir {
            Some(dir) => {
                let path = dir.join(TOKENIZER_FILE);
                if !path.exists() {
                    return Err(Error::Model(format!("{} not found in {}", TOKENIZER_FILE, dir.display())));
                }
                Ok(path)
            }
            None => {
                let file = hub_tokenizer_file(settings);
                tracing::info!("Fetching {} from {}", file, settings.tokenizer_repo);
                Ok(Api::new()?.model(settings.tokenizer_repo.clone()).get(file)?)
            }
        }
    }

    pub fn from_dir(dir: &Path) -> Result<Self> {
        let tokenizer = dir.join(TOKENIZER_FILE);
        if !tokenizer.exists() {
            return Err(Error::Model(format!("{} not found in {}", TOKENIZER_FILE, dir.display())));
        }

        let index = dir.join(SAFETENSORS_INDEX);
        let weights = if index.exists() {
            shard_names(&index)?.into_iter().map(|name| dir.join(name)).collect()
        } else {
            let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.extension().is_some_and(|ext| ext == "safetensors"))
                .collect();
            files.sort();
            files
        };
        if weights.is_empty() {
            return Err(Error::Model(format!("no safetensors weights found in {}", dir.display())));
        }
        Ok(Self { tokenizer, weights })
    }

    pub fn from_hub(settings: &ModelSettings) -> Result<Self> {
        let api = Api::new()?;
        let file = hub_tokenizer_file(settings);
        tracing::info!("Fetching {} from {}", file, settings.tokenizer_repo);
        let tokenizer = api.model(settings.tokenizer_repo.clone()).get(file)?;

        tracing::info!("Fetching weights from {}@{}", settings.repo, settings.revision);
        let repo = api.repo(Repo::with_revision(
            settings.repo.clone(),
            RepoType::Model,
            settings.revision.clone(),
        ));
        let index = repo.get(SAFETENSORS_INDEX)?;
        let weights = shard_names(&index)?
            .iter()
            .map(|name| repo.get(name))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Self { tokenizer, weights })
    }
}

/// Pick the candle sampling strategy for a set of decoding parameters
pub fn sampling_for(params: &GenerationSettings) -> Sampling {
    if params.temperature <= 0.0 {
        Sampling::ArgMax
    } else if params.top_p >= 1.0 {
        Sampling::All {
            temperature: params.temperature,
        }
    } else {
        Sampling::TopP {
            p: params.top_p,
            temperature: params.temperature,
        }
    }
}

/// ChatGLM inference engine
pub struct CandleEngine {
    device: Device,
    dtype: DType,
    config: GlmConfig,
    weights: HashMap<String, Tensor>,
    tokenizer: HfTokenizer,
    model_name: String,
    adapter: Option<PathBuf>,
}

impl CandleEngine {
    /// Load the base model and tokenizer described by `settings`
    pub fn load(settings: &ModelSettings) -> Result<Self> {
        let device = settings.device()?.open()?;
        let dtype = settings.dtype()?;
        let files = ModelFiles::resolve(settings)?;
        let tokenizer = HfTokenizer::from_file(&files.tokenizer, &settings.eos_token)?;

        let start = Instant::now();
        let mut weights = HashMap::new();
        for file in &files.weights {
            tracing::debug!("Loading weights shard {}", file.display());
            for (name, tensor) in candle_core::safetensors::load(file, &device)? {
                weights.insert(name, tensor.to_dtype(dtype)?);
            }
        }
        tracing::info!(
            "Loaded {} tensors from {} shards in {:.1}s",
            weights.len(),
            files.weights.len(),
            start.elapsed().as_secs_f64()
        );

        Ok(Self {
            device,
            dtype,
            config: GlmConfig::glm3_6b(),
            weights,
            tokenizer,
            model_name: settings.repo.clone(),
            adapter: None,
        })
    }

    /// Fold an adapter checkpoint into the base weights
    pub fn load_adapter(&mut self, dir: &Path, defaults: &AdapterDefaults) -> Result<MergeReport> {
        let adapter = AdapterCheckpoint::load(dir, defaults, &self.device)?;
        let report = merge_adapter(&mut self.weights, &adapter)?;
        self.adapter = Some(dir.to_path_buf());
        Ok(report)
    }

    pub fn tokenizer(&self) -> &HfTokenizer {
        &self.tokenizer
    }

    // The ChatGLM model keeps its kv-cache internally, so every request gets
    // a fresh instance over the shared (reference counted) weights.
    fn build_model(&self) -> Result<GlmModel> {
        let vb = VarBuilder::from_tensors(self.weights.clone(), self.dtype, &self.device);
        Ok(GlmModel::new(&self.config, vb)?)
    }
}

impl RuntimeEngine for CandleEngine {
    fn generate(&mut self, prompt: &str, params: &GenerationSettings) -> Result<GenerationResult> {
        let start = Instant::now();
        let mut model = self.build_model()?;

        let mut tokens = self.tokenizer.encode(prompt, true)?;
        if tokens.is_empty() {
            return Err(Error::Model("prompt encoded to zero tokens".to_string()));
        }
        let prompt_tokens = tokens.len();
        let eos = self.tokenizer.eos_token_id();
        let mut logits_processor = LogitsProcessor::from_sampling(params.seed, sampling_for(params));
        let mut finish_reason = FinishReason::MaxTokens;

        for index in 0..params.max_new_tokens {
            let context_size = if index > 0 { 1 } else { tokens.len() };
            let ctxt = &tokens[tokens.len().saturating_sub(context_size)..];
            let input = Tensor::new(ctxt, &self.device)?.unsqueeze(0)?;
            let logits = model.forward(&input)?;
            let logits = logits.squeeze(0)?.to_dtype(DType::F32)?;
            let logits = if params.repetition_penalty == 1.0 {
                logits
            } else {
                let start_at = tokens.len().saturating_sub(params.repeat_last_n);
                candle_transformers::utils::apply_repeat_penalty(
                    &logits,
                    params.repetition_penalty,
                    &tokens[start_at..],
                )?
            };

            let next_token = logits_processor.sample(&logits)?;
            if next_token == eos {
                finish_reason = FinishReason::EndOfSequence;
                break;
            }
            tokens.push(next_token);
        }

        let generated = &tokens[prompt_tokens..];
        let text = self.tokenizer.decode(generated)?;
        let result = GenerationResult {
            text,
            prompt_tokens,
            tokens_generated: generated.len(),
            finish_reason,
            generation_time_ms: start.elapsed().as_millis() as u64,
        };
        tracing::debug!(
            "Generated {} tokens ({:.1} tok/s, {:?})",
            result.tokens_generated,
            result.tokens_per_second(),
            result.finish_reason
        );
        Ok(result)
    }

    fn model_info(&self) -> ModelInfo {
        ModelInfo {
            name: self.model_name.clone(),
            architecture: "ChatGLM".to_string(),
            device: format!("{:?}", self.device),
            dtype: format!("{:?}", self.dtype),
            adapter: self.adapter.as_ref().map(|p| p.display().to_string()),
        }
    }
}
