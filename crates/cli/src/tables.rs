//! Table files on disk: CSV/TSV text and Excel/ODS workbooks.
//!
//! Everything is read as text. Workbook cells are rendered the way a user
//! would see them in a CSV export, so the engine never has to know where a
//! table came from.

use std::io::Read;
use std::path::Path;

use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate, NaiveTime};
use ledgercheck_recon::Table;
use rust_xlsxwriter::{Format, Workbook as XlsxWorkbook};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Text,
    Workbook,
}

impl TableFormat {
    pub fn from_path(path: &Path) -> Self {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Self::Workbook,
            _ => Self::Text,
        }
    }
}

pub fn read_table(path: &Path) -> Result<Table, String> {
    match TableFormat::from_path(path) {
        TableFormat::Text => {
            let text = read_file_as_utf8(path)?;
            Table::from_csv_str(&text).map_err(|e| e.to_string())
        }
        TableFormat::Workbook => read_workbook(path),
    }
}

/// Read a file as UTF-8, falling back to Windows-1252 for legacy exports.
pub fn read_file_as_utf8(path: &Path) -> Result<String, String> {
    let mut file = std::fs::File::open(path).map_err(|e| e.to_string())?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes).map_err(|e| e.to_string())?;

    match String::from_utf8(bytes) {
        Ok(s) => Ok(s),
        Err(e) => {
            let bytes = e.into_bytes();
            let (decoded, _, _) = encoding_rs::WINDOWS_1252.decode(&bytes);
            Ok(decoded.into_owned())
        }
    }
}

/// First sheet, first row as headers.
fn read_workbook(path: &Path) -> Result<Table, String> {
    let mut workbook = open_workbook_auto(path).map_err(|e| e.to_string())?;
    let first = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| "workbook has no sheets".to_string())?;
    let range = workbook
        .worksheet_range(&first)
        .map_err(|e| format!("sheet '{first}': {e}"))?;

    let mut rows = range.rows();
    let headers: Vec<String> = match rows.next() {
        Some(row) => row.iter().map(cell_to_string).map(|h| h.trim().to_string()).collect(),
        None => return Ok(Table::new(Vec::new())),
    };

    let mut table = Table::new(headers);
    for row in rows {
        let cells: Vec<String> = row.iter().map(cell_to_string).collect();
        if cells.iter().all(|c| c.trim().is_empty()) {
            continue;
        }
        table.push_row(cells);
    }
    Ok(table)
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Float(n) => {
            // Integers without decimals
            if n.fract() == 0.0 && n.abs() < 1e15 {
                format!("{}", *n as i64)
            } else {
                format!("{}", n)
            }
        }
        Data::Int(n) => n.to_string(),
        Data::Bool(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
        Data::Error(e) => format!("#{:?}", e),
        Data::DateTime(dt) => excel_serial_to_string(dt.as_f64()),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
    }
}

/// `YYYY-MM-DD`, plus `HH:MM:SS` when the serial carries a time of day.
///
/// Assumes the 1900 date system. Serials outside chrono's range are kept as numbers.
fn excel_serial_to_string(serial: f64) -> String {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30) else {
        return serial.to_string();
    };
    let days = serial.floor();
    let Some(date) = Duration::try_days(days as i64).and_then(|d| epoch.checked_add_signed(d)) else {
        return serial.to_string();
    };

    let seconds = ((serial - days) * 86_400.0).round() as u32;
    match NaiveTime::from_num_seconds_from_midnight_opt(seconds, 0) {
        Some(time) if seconds > 0 => format!("{} {}", date.format("%Y-%m-%d"), time.format("%H:%M:%S")),
        _ => date.format("%Y-%m-%d").to_string(),
    }
}

pub fn write_table(path: &Path, table: &Table) -> Result<(), String> {
    match TableFormat::from_path(path) {
        TableFormat::Text => {
            let text = table.to_csv_string().map_err(|e| e.to_string())?;
            std::fs::write(path, text).map_err(|e| e.to_string())
        }
        TableFormat::Workbook => write_xlsx(path, table),
    }
}

fn write_xlsx(path: &Path, table: &Table) -> Result<(), String> {
    let is_xlsx = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("xlsx"))
        .unwrap_or(false);
    if !is_xlsx {
        return Err(format!("cannot write {}: only .xlsx and .csv output are supported", path.display()));
    }

    let mut workbook = XlsxWorkbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name("Evidence").map_err(|e| e.to_string())?;

    let header_format = Format::new().set_bold();
    for (col, header) in table.headers().iter().enumerate() {
        let col16 = u16::try_from(col).map_err(|_| "too many columns for xlsx".to_string())?;
        worksheet
            .write_string_with_format(0, col16, header, &header_format)
            .map_err(|e| e.to_string())?;
    }

    for (row_idx, row) in table.rows().iter().enumerate() {
        let row32 = u32::try_from(row_idx + 1).map_err(|_| "too many rows for xlsx".to_string())?;
        for (col, value) in row.iter().enumerate() {
            if value.is_empty() {
                continue;
            }
            let col16 = u16::try_from(col).map_err(|_| "too many columns for xlsx".to_string())?;
            worksheet
                .write_string(row32, col16, value)
                .map_err(|e| e.to_string())?;
        }
    }

    workbook.save(path).map_err(|e| e.to_string())
}
