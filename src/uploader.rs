//! Batched upsert of merged records into `legacy_records`.

use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};
use serde_json::Value;

use crate::models::PersonRecord;
use crate::store::TableStore;

pub const LEGACY_TABLE: &str = "legacy_records";
pub const CONFLICT_KEY: &str = "original_name";
pub const UPLOAD_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadSummary {
    pub total: usize,
    pub uploaded: usize,
    /// Start offsets of batches that failed.
    pub failed_batches: Vec<usize>,
}

/// Dry-run upload: reports what would be sent without touching the store.
pub fn preview(records: &[PersonRecord]) -> UploadSummary {
    println!("  {} records prepared (dry-run, nothing uploaded)", records.len());
    if let Some(first) = records.first() {
        let keys: Vec<&str> = first.raw_data.keys().map(String::as_str).collect();
        println!("  Sample '{}' raw_data keys: {:?}", first.original_name, keys);
    }
    UploadSummary {
        total: records.len(),
        ..UploadSummary::default()
    }
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    if let Ok(style) =
        ProgressStyle::default_bar().template("  [{bar:40}] {pos}/{len} records {msg}")
    {
        pb.set_style(style);
    }
    pb
}

/// Upserts `records` in batches keyed by the normalized name. A failing
/// batch is logged with its offset and skipped; there is no retry.
pub async fn upload_batches(
    store: &dyn TableStore,
    records: &[PersonRecord],
    batch_size: usize,
) -> UploadSummary {
    let batch_size = batch_size.max(1);
    let mut summary = UploadSummary {
        total: records.len(),
        ..UploadSummary::default()
    };
    let pb = progress_bar(records.len());

    for (batch_idx, batch) in records.chunks(batch_size).enumerate() {
        let offset = batch_idx * batch_size;
        let rows: Result<Vec<Value>, _> = batch.iter().map(serde_json::to_value).collect();
        let result = match rows {
            Ok(rows) => store.upsert(LEGACY_TABLE, &rows, CONFLICT_KEY).await,
            Err(e) => Err(e.into()),
        };
        match result {
            Ok(_) => {
                summary.uploaded += batch.len();
                pb.inc(batch.len() as u64);
                info!("Progress: {} / {}", offset + batch.len(), records.len());
            }
            Err(e) => {
                error!("Batch at offset {} failed: {:#}", offset, e);
                pb.println(format!("  Error in batch {}: {:#}", offset, e));
                summary.failed_batches.push(offset);
            }
        }
    }
    pb.finish_with_message("done");
    summary
}
