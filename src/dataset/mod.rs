//! Instruction dataset preparation
//!
//! Raw records (`instruction`, optional `input`, `output`) become
//! prompt/target pairs, which are then tokenized into `input_ids` plus the
//! prompt length `seq_len` used downstream to mask loss on the prompt.

pub mod storage;
pub mod tokenize;

pub use storage::{DatasetInfo, TokenizedDataset};
pub use tokenize::{to_dataset, tokenize, tokenize_jsonl, TokenizedRecord};

use crate::error::{Error, Result};
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

/// Progress bar over a known number of records
pub(crate) fn record_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>7}/{len:7} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// Spinner for streams whose length is not known up front
pub(crate) fn record_spinner() -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} {msg}") {
        pb.set_style(style);
    }
    pb
}

/// One training example in source form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    pub instruction: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    pub output: String,
}

impl RawRecord {
    /// Extract a record from an arbitrary JSON object, reporting which
    /// required key is absent.
    pub fn from_value(value: &Value) -> Result<Self> {
        let instruction = required_str(value, "instruction")?;
        let output = required_str(value, "output")?;
        let input = match value.get("input") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(Error::Dataset(format!("field `input` must be a string, got {other}")));
            }
        };
        Ok(Self {
            instruction,
            input,
            output,
        })
    }
}

fn required_str(value: &Value, key: &str) -> Result<String> {
    match value.get(key) {
        None | Some(Value::Null) => Err(Error::MissingField(key.to_string())),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(other) => Err(Error::Dataset(format!("field `{key}` must be a string, got {other}"))),
    }
}

/// Prompt/target pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormattedRecord {
    pub context: String,
    pub target: String,
}

impl FormattedRecord {
    pub fn from_raw(record: &RawRecord, meta_instruction: &str) -> Self {
        let mut context = String::with_capacity(
            meta_instruction.len() + record.instruction.len() + record.input.as_ref().map_or(0, |s| s.len()) + 2,
        );
        context.push_str(meta_instruction);
        context.push_str(&record.instruction);
        context.push('\n');
        if let Some(input) = record.input.as_deref().filter(|s| !s.is_empty()) {
            context.push_str(input);
            context.push('\n');
        }
        Self {
            context,
            target: record.output.clone(),
        }
    }
}

/// Turn a raw JSON record into a prompt/target pair
pub fn format_data(datum: &Value, meta_instruction: &str) -> Result<FormattedRecord> {
    let record = RawRecord::from_value(datum)?;
    Ok(FormattedRecord::from_raw(&record, meta_instruction))
}

/// Convert a JSON array of raw records into JSONL of formatted records.
/// Returns the number of records written.
pub fn to_jsonl(data_path: &Path, save_path: &Path, meta_instruction: &str) -> Result<usize> {
    let data: Vec<Value> = serde_json::from_reader(BufReader::new(File::open(data_path)?))?;
    tracing::info!("Formatting {} records from {}", data.len(), data_path.display());

    if let Some(parent) = save_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(save_path)?);
    let pb = record_bar(data.len() as u64);
    pb.set_message("formatting");
    for (index, datum) in data.iter().enumerate() {
        let formatted = format_data(datum, meta_instruction).map_err(|e| match e {
            Error::MissingField(field) => {
                tracing::error!("Record {} is missing `{}`", index, field);
                Error::MissingField(field)
            }
            other => other,
        })?;
        serde_json::to_writer(&mut writer, &formatted)?;
        writer.write_all(b"\n")?;
        pb.inc(1);
    }
    writer.flush()?;
    pb.finish_with_message("formatted");

    tracing::info!("Wrote {} formatted records to {}", data.len(), save_path.display());
    Ok(data.len())
}
