//! Folds the primary workbook and every raw-workbook sheet into one
//! `PersonRecord` per normalized name.

use calamine::Data;
use log::{info, warn};
use std::collections::BTreeMap;

use crate::field_groups::{
    extract_addresses, extract_certificates, extract_contacts, extract_status_flags,
};
use crate::models::PersonRecord;
use crate::normalize::normalize_name;
use crate::sheet_reader::{cell_text, SheetRow, SheetTable};

/// `raw_data` key for the primary workbook's row snapshot.
pub const MAIN_SOURCE_KEY: &str = "MainSource";
/// Provenance tag stored on records built from the primary workbook.
pub const MAIN_SOURCE_TAG: &str = "권리증_최종정리_완전판";

pub const PRIMARY_NAME_COLUMN: &str = "성명";
pub const RIGHTS_COUNT_COLUMN: &str = "권리증수";

/// `raw_data` key for a raw-workbook sheet. A sheet named like the primary
/// snapshot key gets a `sheet:` prefix so the two never share a list.
pub fn raw_sheet_key(sheet: &str) -> String {
    if sheet == MAIN_SOURCE_KEY {
        format!("sheet:{}", sheet)
    } else {
        sheet.to_string()
    }
}

/// Parses the rights count cell; absent or unreadable values count as 0.
fn rights_count(cell: Option<&Data>) -> u32 {
    let value = match cell {
        Some(Data::Int(i)) => *i as f64,
        Some(Data::Float(f)) => *f,
        Some(other) => match cell_text(other).map(|t| t.trim().parse::<f64>()) {
            Some(Ok(v)) => v,
            Some(Err(_)) => {
                warn!("Unreadable rights count {:?}, using 0", other);
                0.0
            }
            None => 0.0,
        },
        None => 0.0,
    };
    if value.is_finite() && value > 0.0 {
        value.trunc().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// Folds the primary workbook and every raw sheet into one record per
/// normalized name.
#[derive(Debug, Default)]
pub struct RecordMerger {
    records: BTreeMap<String, PersonRecord>,
}

impl RecordMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingests one primary row. The first row for a name sets the core
    /// fields; a repeated name only adds its snapshot under `MainSource`.
    pub fn ingest_primary_row(&mut self, row: &SheetRow<'_>) -> bool {
        let Some(name) = normalize_name(row.text(PRIMARY_NAME_COLUMN).as_deref()) else {
            return false;
        };
        let snapshot = row.snapshot();

        if let Some(existing) = self.records.get_mut(&name) {
            warn!(
                "Duplicate primary row for '{}', keeping the first row's fields",
                name
            );
            existing.add_raw(MAIN_SOURCE_KEY, snapshot);
            return true;
        }

        let mut record = PersonRecord::legacy(name.clone());
        record.rights_count = rights_count(row.cell(RIGHTS_COUNT_COLUMN));
        record.contacts = extract_contacts(row);
        record.addresses = extract_addresses(row);
        record.certificates = extract_certificates(row);
        record.status_flags = extract_status_flags(row);
        record.source_file = Some(MAIN_SOURCE_TAG.to_string());
        record.add_raw(MAIN_SOURCE_KEY, snapshot);
        self.records.insert(name, record);
        true
    }

    /// Ingests every row of the primary table; returns how many rows had a name.
    pub fn ingest_primary(&mut self, table: &SheetTable) -> usize {
        let count = table
            .iter()
            .filter(|row| self.ingest_primary_row(row))
            .count();
        info!("Primary source: {} rows, {} people", count, self.records.len());
        count
    }

    /// Files one raw-sheet row under the sheet's `raw_data` key, creating a
    /// legacy record for people the primary source does not know.
    pub fn ingest_sheet_row(&mut self, sheet: &str, name_column: &str, row: &SheetRow<'_>) -> bool {
        let Some(name) = normalize_name(row.text(name_column).as_deref()) else {
            return false;
        };
        self.records
            .entry(name.clone())
            .or_insert_with(|| PersonRecord::legacy(name))
            .add_raw(&raw_sheet_key(sheet), row.snapshot());
        true
    }

    /// Folds a whole raw sheet in; returns the number of merged rows.
    pub fn ingest_sheet(&mut self, table: &SheetTable, name_column: &str) -> usize {
        if table.name == MAIN_SOURCE_KEY {
            warn!(
                "Sheet '{}' collides with the primary snapshot key, filed as '{}'",
                table.name,
                raw_sheet_key(&table.name)
            );
        }
        table
            .iter()
            .filter(|row| self.ingest_sheet_row(&table.name, name_column, row))
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&PersonRecord> {
        self.records.get(name)
    }

    pub fn records(&self) -> &BTreeMap<String, PersonRecord> {
        &self.records
    }

    pub fn records_mut(&mut self) -> &mut BTreeMap<String, PersonRecord> {
        &mut self.records
    }
}
