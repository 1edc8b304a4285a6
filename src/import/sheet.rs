use std::io::Cursor;

use calamine::{Data, Reader, open_workbook_auto_from_rs};
use camino::Utf8Path;
use serde::Serialize;

use super::{Error, MAX_SPREADSHEET_BYTES, PREVIEW_ROWS, Result};
use crate::import::columns::{ColumnRoles, infer_columns};

/// A fully decoded mapping workbook. Decoding is eager; files are capped at
/// 15 MiB, so holding every sheet's cells as strings is cheap.
#[derive(Debug)]
pub struct SpreadsheetFile {
    sheets: Vec<Sheet>,
}

#[derive(Debug)]
pub struct Sheet {
    pub name: String,
    /// First row of the sheet, trimmed.
    pub headers: Vec<String>,
    /// Data rows, each aligned to `headers`. Ragged rows are padded with
    /// empty strings.
    pub rows: Vec<Vec<String>>,
}

/// What a user sees before committing an import: the headers, a best guess
/// at the two column roles, and no more than [`PREVIEW_ROWS`] rows.
#[derive(Serialize, Debug)]
pub struct SheetPreview {
    pub name: String,
    pub headers: Vec<String>,
    pub suggested_columns: ColumnRoles,
    pub total_rows: usize,
    pub rows: Vec<Vec<String>>,
}

impl SpreadsheetFile {
    /// Decodes an uploaded workbook. The filename decides the format check;
    /// the buffer is rejected before parsing if it is oversized or carries
    /// an extension other than `.xlsx`/`.xls`.
    pub fn parse(filename: &str, bytes: &[u8]) -> Result<Self> {
        let extension = Utf8Path::new(filename)
            .extension()
            .map(str::to_ascii_lowercase);

        if !matches!(extension.as_deref(), Some("xlsx" | "xls")) {
            return Err(Error::UnsupportedExtension {
                filename: filename.to_string(),
            });
        }

        if bytes.len() > MAX_SPREADSHEET_BYTES {
            return Err(Error::TooLarge { size: bytes.len() });
        }

        let mut workbook =
            open_workbook_auto_from_rs(Cursor::new(bytes)).map_err(|err| Error::Unreadable {
                message: err.to_string(),
            })?;

        let mut sheets = Vec::new();
        for name in workbook.sheet_names() {
            let range = workbook
                .worksheet_range(&name)
                .map_err(|err| Error::Unreadable {
                    message: err.to_string(),
                })?;

            let mut rows = range.rows().map(decode_row);
            let headers = rows.next().unwrap_or_default();
            let mut rows: Vec<_> = rows.collect();
            for row in &mut rows {
                row.resize(headers.len(), String::new());
            }

            sheets.push(Sheet {
                name,
                headers,
                rows,
            });
        }

        Ok(Self { sheets })
    }

    pub fn sheet_names(&self) -> Vec<&str> {
        self.sheets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn sheet(&self, name: &str) -> Result<&Sheet> {
        self.sheets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| Error::SheetNotFound {
                name: name.to_string(),
            })
    }

    /// The first sheet, which the preview defaults to when the caller has
    /// not picked one yet.
    pub fn first_sheet(&self) -> Result<&Sheet> {
        self.sheets.first().ok_or_else(|| Error::Unreadable {
            message: "workbook has no sheets".to_string(),
        })
    }
}

impl Sheet {
    pub fn column_index(&self, name: &str) -> Result<usize> {
        self.headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| Error::ColumnNotFound {
                name: name.to_string(),
            })
    }

    pub fn preview(&self) -> SheetPreview {
        SheetPreview {
            name: self.name.clone(),
            headers: self.headers.clone(),
            suggested_columns: infer_columns(&self.headers),
            total_rows: self.rows.len(),
            rows: self.rows.iter().take(PREVIEW_ROWS).cloned().collect(),
        }
    }
}

fn decode_row(row: &[Data]) -> Vec<String> {
    row.iter().map(cell_to_string).collect()
}

// Excel stores bare numbers as floats; a barcode column of 1001, 1002, ...
// must not import as "1001.0"
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.trim().to_string(),
        Data::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Int(i) => i.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) => String::new(),
    }
}
