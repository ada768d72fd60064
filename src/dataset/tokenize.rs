//! Truncation-aware tokenization of prompt/target pairs

use super::{record_spinner, FormattedRecord};
use crate::dataset::storage::{DatasetInfo, TokenizedDataset};
use crate::error::{Error, Result};
use crate::runtime::tokenizer::TextTokenizer;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// Training example ready for the trainer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenizedRecord {
    /// Prompt ids, target ids and a trailing eos, cut to `max_seq_length`
    pub input_ids: Vec<u32>,
    /// Number of prompt tokens
    pub seq_len: u32,
}

/// Tokenize one prompt/target pair.
///
/// Prompt and target are each capped at `max_seq_length` before being joined
/// with the eos id; the joined sequence is then cut from the end. The cut may
/// drop the eos id or part of the target.
pub fn tokenize<T: TextTokenizer + ?Sized>(
    record: &FormattedRecord,
    tokenizer: &T,
    max_seq_length: usize,
) -> Result<TokenizedRecord> {
    if max_seq_length == 0 {
        return Err(Error::Dataset("max_seq_length must be at least 1".to_string()));
    }

    let mut prompt_ids = tokenizer.encode(&record.context, true)?;
    prompt_ids.truncate(max_seq_length);
    let mut target_ids = tokenizer.encode(&record.target, false)?;
    target_ids.truncate(max_seq_length);

    let seq_len = prompt_ids.len();
    let mut input_ids = prompt_ids;
    input_ids.extend_from_slice(&target_ids);
    input_ids.push(tokenizer.eos_token_id());
    input_ids.truncate(max_seq_length);

    Ok(TokenizedRecord {
        input_ids,
        seq_len: seq_len as u32,
    })
}

/// Tokenize every formatted record of a JSONL file
pub fn tokenize_jsonl<T: TextTokenizer + ?Sized>(
    raw_path: &Path,
    tokenizer: &T,
    max_seq_length: usize,
) -> Result<TokenizedDataset> {
    let reader = BufReader::new(File::open(raw_path)?);
    let mut dataset = TokenizedDataset::default();
    let pb = record_spinner();
    pb.set_message("records tokenized");

    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let record: FormattedRecord = serde_json::from_str(&line).map_err(|e| {
            Error::Dataset(format!("{}:{}: {e}", raw_path.display(), line_no + 1))
        })?;
        dataset.push(tokenize(&record, tokenizer, max_seq_length)?);
        pb.inc(1);
    }
    pb.finish_with_message("records tokenized");

    let truncated = dataset
        .input_ids
        .iter()
        .filter(|ids| ids.last() != Some(&tokenizer.eos_token_id()))
        .count();
    if truncated > 0 {
        tracing::warn!(
            "{} of {} records lost their eos token to truncation at {} tokens",
            truncated,
            dataset.len(),
            max_seq_length
        );
    }
    Ok(dataset)
}

/// Tokenize a JSONL file and persist the columnar dataset to `save_path`
pub fn to_dataset<T: TextTokenizer + ?Sized>(
    raw_path: &Path,
    tokenizer: &T,
    max_seq_length: usize,
    save_path: &Path,
) -> Result<DatasetInfo> {
    let dataset = tokenize_jsonl(raw_path, tokenizer, max_seq_length)?;
    dataset.save_to_disk(save_path, max_seq_length)
}
