//! Columnar on-disk dataset (Arrow IPC) with `input_ids` and `seq_len`

use super::tokenize::TokenizedRecord;
use crate::error::{Error, Result};
use arrow::array::{Array, ArrayRef, AsArray, ListBuilder, UInt32Array, UInt32Builder};
use arrow::datatypes::UInt32Type;
use arrow::ipc::reader::FileReader;
use arrow::ipc::writer::FileWriter;
use arrow::record_batch::RecordBatch;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

pub const DATA_FILE: &str = "data.arrow";
pub const INFO_FILE: &str = "dataset_info.json";

const INPUT_IDS: &str = "input_ids";
const SEQ_LEN: &str = "seq_len";

/// Metadata written next to the data file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetInfo {
    pub features: Vec<String>,
    pub num_rows: usize,
    pub max_seq_length: usize,
    pub created_at: String,
}

/// Tokenized records held column-wise
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenizedDataset {
    pub input_ids: Vec<Vec<u32>>,
    pub seq_len: Vec<u32>,
}

impl TokenizedDataset {
    pub fn push(&mut self, record: TokenizedRecord) {
        self.input_ids.push(record.input_ids);
        self.seq_len.push(record.seq_len);
    }

    pub fn len(&self) -> usize {
        self.seq_len.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seq_len.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = TokenizedRecord> + '_ {
        self.input_ids
            .iter()
            .zip(&self.seq_len)
            .map(|(ids, &seq_len)| TokenizedRecord {
                input_ids: ids.clone(),
                seq_len,
            })
    }

    pub fn to_record_batch(&self) -> Result<RecordBatch> {
        let mut ids = ListBuilder::new(UInt32Builder::new());
        for row in &self.input_ids {
            ids.values().append_slice(row);
            ids.append(true);
        }
        let ids: ArrayRef = Arc::new(ids.finish());
        let seq_len: ArrayRef = Arc::new(UInt32Array::from(self.seq_len.clone()));
        Ok(RecordBatch::try_from_iter(vec![(INPUT_IDS, ids), (SEQ_LEN, seq_len)])?)
    }

    /// Append the rows of `batch`
    pub fn extend_from_batch(&mut self, batch: &RecordBatch) -> Result<()> {
        let ids = batch
            .column_by_name(INPUT_IDS)
            .ok_or_else(|| Error::Dataset(format!("missing column `{INPUT_IDS}`")))?
            .as_list_opt::<i32>()
            .ok_or_else(|| Error::Dataset(format!("column `{INPUT_IDS}` is not a list")))?;
        let seq_len = batch
            .column_by_name(SEQ_LEN)
            .ok_or_else(|| Error::Dataset(format!("missing column `{SEQ_LEN}`")))?
            .as_primitive_opt::<UInt32Type>()
            .ok_or_else(|| Error::Dataset(format!("column `{SEQ_LEN}` is not u32")))?;

        for row in 0..ids.len() {
            let values = ids.value(row);
            let values = values
                .as_primitive_opt::<UInt32Type>()
                .ok_or_else(|| Error::Dataset(format!("column `{INPUT_IDS}` items are not u32")))?;
            self.input_ids.push(values.values().to_vec());
        }
        self.seq_len.extend_from_slice(seq_len.values());
        Ok(())
    }

    /// Write `data.arrow` and `dataset_info.json` under `dir`
    pub fn save_to_disk(&self, dir: &Path, max_seq_length: usize) -> Result<DatasetInfo> {
        std::fs::create_dir_all(dir)?;
        let batch = self.to_record_batch()?;

        let file = File::create(dir.join(DATA_FILE))?;
        let mut writer = FileWriter::try_new(file, &batch.schema())?;
        writer.write(&batch)?;
        writer.finish()?;

        let info = DatasetInfo {
            features: vec![INPUT_IDS.to_string(), SEQ_LEN.to_string()],
            num_rows: self.len(),
            max_seq_length,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        std::fs::write(dir.join(INFO_FILE), serde_json::to_vec_pretty(&info)?)?;

        tracing::info!("Saved {} rows to {}", info.num_rows, dir.display());
        Ok(info)
    }

    pub fn load_from_disk(dir: &Path) -> Result<(Self, DatasetInfo)> {
        let info: DatasetInfo = serde_json::from_slice(&std::fs::read(dir.join(INFO_FILE))?)?;
        let reader = FileReader::try_new(File::open(dir.join(DATA_FILE))?, None)?;

        let mut dataset = Self::default();
        for batch in reader {
            dataset.extend_from_batch(&batch?)?;
        }
        if dataset.len() != info.num_rows {
            return Err(Error::Dataset(format!(
                "{} declares {} rows but {} holds {}",
                INFO_FILE,
                info.num_rows,
                DATA_FILE,
                dataset.len()
            )));
        }
        Ok((dataset, info))
    }
}
