//! xlsx output for the refunded rights holder export.

use anyhow::{Context, Result};
use log::info;
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::path::Path;

use crate::models::RefundedExportRow;

pub const REFUNDED_SHEET_NAME: &str = "환불자명단";

/// Column labels of the refunded rights holder sheet.
pub const REFUNDED_HEADERS: [&str; 7] = [
    "성명",
    "권리증수",
    "생년월일",
    "연락처",
    "주소",
    "필증상세",
    "비고",
];

/// Writes the refunded rights holders to a single-sheet workbook, creating
/// the parent directory if needed.
pub fn write_refunded_rights(file_path: &Path, rows: &[RefundedExportRow]) -> Result<()> {
    info!("Initializing Excel workbook for file: {:?}", file_path);
    if let Some(parent) = file_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    write_refunded_sheet(sheet, rows)?;

    info!("Saving Excel workbook...");
    workbook
        .save(file_path)
        .with_context(|| format!("Failed to save workbook {}", file_path.display()))?;
    info!("Excel file saved successfully to {:?}", file_path);
    Ok(())
}

fn write_refunded_sheet(sheet: &mut Worksheet, rows: &[RefundedExportRow]) -> Result<()> {
    sheet.set_name(REFUNDED_SHEET_NAME)?;

    let header_format = Format::new().set_bold();
    let wrap_format = Format::new().set_text_wrap();

    sheet.set_column_width(0, 12)?; // 성명
    sheet.set_column_width(3, 30)?; // 연락처
    sheet.set_column_width(4, 40)?; // 주소
    sheet.set_column_width(5, 30)?; // 필증상세
    sheet.set_column_width(6, 30)?; // 비고

    for (col_num, header) in REFUNDED_HEADERS.iter().enumerate() {
        sheet.write_string_with_format(0, col_num as u16, *header, &header_format)?;
    }

    for (row_num, row_data) in rows.iter().enumerate() {
        let current_row = (row_num + 1) as u32; // +1 for header row
        sheet.write_string(current_row, 0, row_data.name.as_deref().unwrap_or(""))?;
        match row_data.rights_count {
            Some(count) => sheet.write_number(current_row, 1, count as f64)?,
            None => sheet.write_string(current_row, 1, "")?,
        };
        sheet.write_string(current_row, 2, row_data.birth_date.as_deref().unwrap_or(""))?;
        sheet.write_string(current_row, 3, &row_data.contacts)?;
        sheet.write_string(current_row, 4, &row_data.addresses)?;
        sheet.write_string_with_format(current_row, 5, &row_data.certificate_details, &wrap_format)?;
        sheet.write_string(current_row, 6, row_data.memo.as_deref().unwrap_or(""))?;
    }
    info!("'{}' sheet written with {} rows.", REFUNDED_SHEET_NAME, rows.len());
    Ok(())
}
