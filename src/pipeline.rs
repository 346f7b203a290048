//! The legacy rights migration: primary workbook -> raw workbook sheets ->
//! registry matching -> batched upload into `legacy_records`.

use anyhow::{Context, Result};
use calamine::Reader;
use log::{info, warn};
use std::path::Path;

use crate::matcher::{fetch_registry, match_records};
use crate::merger::RecordMerger;
use crate::models::{MatchStats, PersonRecord};
use crate::sheet_reader::{open_workbook, read_table, smart_read_sheet, Workbook};
use crate::store::TableStore;
use crate::uploader::{preview, upload_batches, UploadSummary, UPLOAD_BATCH_SIZE};

#[derive(Debug, Clone, Default)]
pub struct MigrationReport {
    pub primary_rows: usize,
    pub sheets_merged: usize,
    pub sheets_skipped: usize,
    pub records: usize,
    pub matches: MatchStats,
    pub upload: UploadSummary,
}

/// Runs one migration. `store = None` is a dry run: the registry is treated
/// as empty and nothing is written.
pub struct MigrationManager<'a> {
    store: Option<&'a dyn TableStore>,
    merger: RecordMerger,
    batch_size: usize,
}

impl<'a> MigrationManager<'a> {
    pub fn new(store: Option<&'a dyn TableStore>) -> Self {
        MigrationManager {
            store,
            merger: RecordMerger::new(),
            batch_size: UPLOAD_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.store.is_none()
    }

    pub fn merger(&self) -> &RecordMerger {
        &self.merger
    }

    /// Step 1: the structured workbook. Failing to read it aborts the run.
    pub fn process_main_file(&mut self, path: &Path) -> Result<usize> {
        println!("\n[1/4] Main file: {}", path.display());
        let table = read_table(path, None, 0)
            .with_context(|| format!("Failed to read primary workbook {}", path.display()))?;
        Ok(self.merger.ingest_primary(&table))
    }

    /// Step 2: every sheet of the raw workbook. Unreadable sheets and sheets
    /// without a name column are skipped.
    pub fn process_raw_file(&mut self, path: &Path) -> Result<(usize, usize)> {
        println!("\n[2/4] Raw workbook: {}", path.display());
        let mut workbook = open_workbook(path)?;
        let sheets = workbook.sheet_names();
        Ok(self.process_sheets(&mut workbook, &sheets))
    }

    /// Merges the named sheets of an open workbook; returns
    /// `(merged, skipped)`.
    pub fn process_sheets(&mut self, workbook: &mut Workbook, sheets: &[String]) -> (usize, usize) {
        let mut merged = 0;
        let mut skipped = 0;

        for sheet in sheets {
            println!("  - Sheet: {}", sheet);
            let detected = match smart_read_sheet(workbook, sheet) {
                Some(detected) => detected,
                None => {
                    skipped += 1;
                    continue;
                }
            };
            let Some(name_column) = detected.name_column else {
                warn!("Sheet '{}': no name column found, skipped", sheet);
                println!("    Pass (no name column)");
                skipped += 1;
                continue;
            };
            let count = self.merger.ingest_sheet(&detected.table, &name_column);
            info!("Sheet '{}': merged {} rows via column '{}'", sheet, count, name_column);
            println!("    -> {} rows merged", count);
            merged += 1;
        }
        (merged, skipped)
    }

    /// Step 3: classify every record against the live registry.
    pub async fn match_with_registry(&mut self) -> Result<MatchStats> {
        println!("\n[3/4] Registry matching...");
        let members = match self.store {
            Some(store) => fetch_registry(store).await?,
            None => {
                println!("  (dry-run: registry skipped, treated as empty)");
                Vec::new()
            }
        };
        let stats = match_records(self.merger.records_mut(), &members);
        println!(
            "  Matched: {}, ambiguous: {}, refunded: {}",
            stats.matched, stats.ambiguous, stats.unmatched
        );
        Ok(stats)
    }

    /// Step 4: upload (or preview in dry-run).
    pub async fn upload(&self) -> UploadSummary {
        println!("\n[4/4] Upload...");
        let records: Vec<PersonRecord> = self.merger.records().values().cloned().collect();
        match self.store {
            None => preview(&records),
            Some(store) => {
                let summary = upload_batches(store, &records, self.batch_size).await;
                if !summary.failed_batches.is_empty() {
                    warn!(
                        "{} batch(es) failed at offsets {:?}",
                        summary.failed_batches.len(),
                        summary.failed_batches
                    );
                }
                summary
            }
        }
    }

    /// All four steps in order. Records are only written after matching.
    pub async fn run(mut self, main_file: &Path, raw_file: &Path) -> Result<MigrationReport> {
        let primary_rows = self.process_main_file(main_file)?;
        let (sheets_merged, sheets_skipped) = self.process_raw_file(raw_file)?;
        let matches = self.match_with_registry().await?;
        let upload = self.upload().await;
        Ok(MigrationReport {
            primary_rows,
            sheets_merged,
            sheets_skipped,
            records: self.merger.len(),
            matches,
            upload,
        })
    }
}
