//! Spreadsheet access: opening workbooks, locating header rows, and turning
//! cells into the string snapshots stored in `raw_data`.

use anyhow::{Context, Result};
use calamine::{open_workbook_auto, Data, Reader, Sheets};
use chrono::{NaiveDate, NaiveDateTime};
use log::{debug, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use crate::models::RowSnapshot;

/// Labels that identify the person-name column of a sheet.
pub const NAME_KEYWORDS: [&str; 4] = ["성명", "이름", "회원성명", "성 명"];

/// How many leading rows are scanned when looking for the header row.
pub const HEADER_SCAN_ROWS: usize = 10;

pub type Workbook = Sheets<BufReader<File>>;

/// Opens an `.xls`, `.xlsx`, `.xlsb` or `.ods` workbook by extension.
pub fn open_workbook(path: &Path) -> Result<Workbook> {
    open_workbook_auto(path)
        .with_context(|| format!("Failed to open workbook: {}", path.display()))
}

/// All cell rows of one sheet, without interpreting any of them as a header.
/// Rows and columns are indexed from A1: calamine's used range is padded
/// back out with empty rows and cells.
pub fn read_sheet_rows(workbook: &mut Workbook, sheet: &str) -> Result<Vec<Vec<Data>>> {
    let range = workbook
        .worksheet_range(sheet)
        .with_context(|| format!("Failed to read sheet: {}", sheet))?;
    let (row_offset, col_offset) = range
        .start()
        .map_or((0, 0), |(row, col)| (row as usize, col as usize));
    let mut rows = vec![Vec::new(); row_offset];
    rows.extend(range.rows().map(|cells| {
        let mut padded = vec![Data::Empty; col_offset];
        padded.extend_from_slice(cells);
        padded
    }));
    Ok(rows)
}

/// Renders a cell the way it is stored in a row snapshot. Empty, error and
/// non-finite cells yield `None`; dates become `YYYY-MM-DD`; whole floats
/// drop their fractional part.
pub fn cell_text(cell: &Data) -> Option<String> {
    match cell {
        Data::Empty | Data::Error(_) => None,
        Data::String(s) if s.is_empty() => None,
        Data::String(s) => Some(s.clone()),
        Data::Int(i) => Some(i.to_string()),
        Data::Float(f) if !f.is_finite() => None,
        Data::Float(f) => {
            if f.fract() == 0.0 && f.abs() < 1e15 {
                Some((*f as i64).to_string())
            } else {
                Some(f.to_string())
            }
        }
        Data::Bool(b) => Some(b.to_string()),
        Data::DateTime(dt) => dt.as_datetime().map(|d| d.format("%Y-%m-%d").to_string()),
        Data::DateTimeIso(s) => Some(iso_date(s)),
        Data::DurationIso(s) => Some(s.clone()),
    }
}

fn iso_date(raw: &str) -> String {
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return dt.format("%Y-%m-%d").to_string();
    }
    match raw.get(..10).and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok()) {
        Some(date) => date.format("%Y-%m-%d").to_string(),
        None => raw.to_string(),
    }
}

fn contains_name_keyword(text: &str) -> bool {
    NAME_KEYWORDS.iter().any(|k| text.contains(k))
}

/// Index of the first of the leading rows holding a name keyword.
pub fn detect_header_row(rows: &[Vec<Data>]) -> Option<usize> {
    rows.iter().take(HEADER_SCAN_ROWS).position(|row| {
        row.iter()
            .filter_map(cell_text)
            .any(|text| contains_name_keyword(&text))
    })
}

/// Builds unique column labels from a header row. Blank header cells become
/// `Unnamed: {index}` and repeated labels get `.1`, `.2`, ... suffixes.
fn column_labels(header: &[Data], width: usize) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    (0..width)
        .map(|idx| {
            let base = header
                .get(idx)
                .and_then(cell_text)
                .unwrap_or_else(|| format!("Unnamed: {}", idx));
            let count = seen.entry(base.clone()).or_insert(0);
            let label = if *count == 0 {
                base.clone()
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            label
        })
        .collect()
}

/// A sheet re-read with a known header row.
#[derive(Debug, Clone)]
pub struct SheetTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Data>>,
}

impl SheetTable {
    /// Splits `rows` at `header_row`: that row labels the columns and every
    /// later row is data.
    pub fn from_rows(name: &str, mut rows: Vec<Vec<Data>>, header_row: usize) -> Self {
        let width = rows.iter().map(Vec::len).max().unwrap_or(0);
        if header_row >= rows.len() {
            return SheetTable {
                name: name.to_string(),
                columns: column_labels(&[], width),
                rows: Vec::new(),
            };
        }
        let data = rows.split_off(header_row + 1);
        let header = rows.pop().unwrap_or_default();
        SheetTable {
            name: name.to_string(),
            columns: column_labels(&header, width),
            rows: data,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = SheetRow<'_>> {
        self.rows.iter().map(move |cells| SheetRow {
            columns: &self.columns,
            cells,
        })
    }

    /// The name column: the first label holding a name keyword, else the
    /// first column with text values (only when the sheet has data).
    pub fn name_column(&self) -> Option<String> {
        if let Some(label) = self.columns.iter().find(|c| contains_name_keyword(c)) {
            return Some(label.clone());
        }
        if self.is_empty() {
            return None;
        }
        (0..self.columns.len())
            .find(|&idx| {
                self.rows
                    .iter()
                    .any(|row| matches!(row.get(idx), Some(Data::String(s)) if !s.is_empty()))
            })
            .map(|idx| self.columns[idx].clone())
    }
}

/// One data row viewed through its sheet's column labels.
#[derive(Debug, Clone, Copy)]
pub struct SheetRow<'a> {
    columns: &'a [String],
    cells: &'a [Data],
}

impl<'a> SheetRow<'a> {
    pub fn cell(&self, column: &str) -> Option<&'a Data> {
        let idx = self.columns.iter().position(|c| c == column)?;
        self.cells.get(idx)
    }

    /// Cell rendered as text; `None` when the column is missing or the cell
    /// is empty.
    pub fn text(&self, column: &str) -> Option<String> {
        self.cell(column).and_then(cell_text)
    }

    /// Every present cell of the row, keyed by column label.
    pub fn snapshot(&self) -> RowSnapshot {
        let mut snapshot = RowSnapshot::new();
        for (label, cell) in self.columns.iter().zip(self.cells.iter()) {
            if let Some(text) = cell_text(cell) {
                snapshot.insert(label.clone(), Value::String(text));
            }
        }
        snapshot
    }
}

/// A raw sheet after header auto-detection.
#[derive(Debug, Clone)]
pub struct DetectedSheet {
    pub table: SheetTable,
    pub name_column: Option<String>,
}

/// Reads `sheet`, locating its header row among the first
/// [`HEADER_SCAN_ROWS`] rows (row 0 when no row holds a name keyword) and
/// resolving the name column. Read failures are logged and yield `None`.
pub fn smart_read_sheet(workbook: &mut Workbook, sheet: &str) -> Option<DetectedSheet> {
    let rows = match read_sheet_rows(workbook, sheet) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("Failed to read sheet '{}': {:#}", sheet, e);
            return None;
        }
    };
    let header_row = detect_header_row(&rows).unwrap_or(0);
    debug!("Sheet '{}': header row {}", sheet, header_row);
    let table = SheetTable::from_rows(sheet, rows, header_row);
    let name_column = table.name_column();
    Some(DetectedSheet { table, name_column })
}

/// Reads a sheet with a fixed header row. `sheet = None` picks the first sheet.
pub fn read_table(path: &Path, sheet: Option<&str>, header_row: usize) -> Result<SheetTable> {
    let mut workbook = open_workbook(path)?;
    let sheet_name = match sheet {
        Some(name) => name.to_string(),
        None => workbook
            .sheet_names()
            .first()
            .cloned()
            .with_context(|| format!("Workbook has no sheets: {}", path.display()))?,
    };
    let rows = read_sheet_rows(&mut workbook, &sheet_name)?;
    Ok(SheetTable::from_rows(&sheet_name, rows, header_row))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_xlsxwriter::Workbook as XlsxWorkbook;

    fn s(text: &str) -> Data {
        Data::String(text.to_string())
    }

    #[test]
    fn test_cell_text_conversions() {
        assert_eq!(cell_text(&Data::Empty), None);
        assert_eq!(cell_text(&s("")), None);
        assert_eq!(cell_text(&s("확인필요")).as_deref(), Some("확인필요"));
        assert_eq!(cell_text(&Data::Float(2.0)).as_deref(), Some("2"));
        assert_eq!(cell_text(&Data::Float(2.5)).as_deref(), Some("2.5"));
        assert_eq!(cell_text(&Data::Float(f64::NAN)), None);
        assert_eq!(cell_text(&Data::Int(7)).as_deref(), Some("7"));
        assert_eq!(
            cell_text(&Data::DateTimeIso("2021-03-04T10:20:30".into())).as_deref(),
            Some("2021-03-04")
        );
    }

    #[test]
    fn test_detect_header_row_skips_title_rows() {
        let rows = vec![
            vec![s("2022년 권리증 명단"), Data::Empty],
            vec![Data::Empty, Data::Empty],
            vec![s("번호"), s("성 명")],
            vec![Data::Float(1.0), s("홍길동")],
        ];
        assert_eq!(detect_header_row(&rows), Some(2));
    }

    #[test]
    fn test_detect_header_row_only_scans_leading_rows() {
        let mut rows: Vec<Vec<Data>> = (0..HEADER_SCAN_ROWS).map(|_| vec![s("x")]).collect();
        rows.push(vec![s("성명")]);
        assert_eq!(detect_header_row(&rows), None);
    }

    #[test]
    fn test_column_labels_unnamed_and_duplicates() {
        let header = vec![s("비고"), Data::Empty, s("비고"), s("비고")];
        assert_eq!(
            column_labels(&header, 5),
            vec!["비고", "Unnamed: 1", "비고.1", "비고.2", "Unnamed: 4"]
        );
    }

    #[test]
    fn test_name_column_keyword_then_text_fallback() {
        let keyed = SheetTable::from_rows(
            "a",
            vec![vec![s("번호"), s("회원성명")], vec![Data::Int(1), s("김철수")]],
            0,
        );
        assert_eq!(keyed.name_column().as_deref(), Some("회원성명"));

        let fallback = SheetTable::from_rows(
            "b",
            vec![
                vec![s("no"), s("who")],
                vec![Data::Int(1), s("김철수")],
            ],
            0,
        );
        assert_eq!(fallback.name_column().as_deref(), Some("who"));

        let empty = SheetTable::from_rows("c", vec![vec![s("no"), s("who")]], 0);
        assert_eq!(empty.name_column(), None);
    }

    #[test]
    fn test_snapshot_omits_empty_cells() {
        let table = SheetTable::from_rows(
            "t",
            vec![
                vec![s("성명"), s("비고"), s("금액")],
                vec![s("홍길동"), Data::Empty, Data::Float(1500.0)],
            ],
            0,
        );
        let row = table.iter().next().unwrap();
        let snapshot = row.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["성명"], Value::String("홍길동".into()));
        assert_eq!(snapshot["금액"], Value::String("1500".into()));
        assert!(!snapshot.contains_key("비고"));
    }

    #[test]
    fn test_missing_sheet_is_skipped() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("raw.xlsx");
        let mut xlsx = XlsxWorkbook::new();
        let sheet = xlsx.add_worksheet();
        sheet.write_string(0, 0, "성명").unwrap();
        sheet.write_string(1, 0, "홍길동").unwrap();
        xlsx.save(&path).unwrap();

        let mut workbook = open_workbook(&path).unwrap();
        assert!(smart_read_sheet(&mut workbook, "nope").is_none());
        let detected = smart_read_sheet(&mut workbook, "Sheet1").unwrap();
        assert_eq!(detected.name_column.as_deref(), Some("성명"));
    }

    #[test]
    fn test_fixed_header_row_counts_from_the_top_of_the_sheet() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("roster.xlsx");
        let mut xlsx = XlsxWorkbook::new();
        let sheet = xlsx.add_worksheet();
        sheet.write_string(1, 1, "조합원").unwrap();
        sheet.write_string(2, 1, "홍길동").unwrap();
        xlsx.save(&path).unwrap();

        let table = read_table(&path, None, 1).unwrap();
        assert_eq!(table.columns, vec!["Unnamed: 0", "조합원"]);
        assert_eq!(table.rows.len(), 1);
        let row = table.iter().next().unwrap();
        assert_eq!(row.text("조합원").as_deref(), Some("홍길동"));
    }
}
