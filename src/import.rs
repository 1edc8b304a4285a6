//! The accession bulk-import workflow: decode an uploaded spreadsheet,
//! propose its barcode/genotype columns, and turn the selected columns into
//! mapping rows ready for an atomic insert.

use serde::Serialize;
use valuable::Valuable;

pub mod batch;
pub mod columns;
pub mod sheet;

/// Uploaded mapping files are rejected above this size before any row is
/// read.
pub const MAX_SPREADSHEET_BYTES: usize = 15 * 1024 * 1024;

/// Preview surfaces show at most this many data rows; the import itself
/// always consumes the full sheet.
pub const PREVIEW_ROWS: usize = 20;

#[derive(thiserror::Error, Debug, Serialize, Valuable, Clone)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Error {
    #[error("{filename} is not an .xlsx or .xls file")]
    UnsupportedExtension { filename: String },
    #[error("spreadsheet is {size} bytes; the limit is {MAX_SPREADSHEET_BYTES}")]
    TooLarge { size: usize },
    #[error("unable to read spreadsheet: {message}")]
    Unreadable { message: String },
    #[error("sheet {name} not found in workbook")]
    SheetNotFound { name: String },
    #[error("column {name} not found in sheet")]
    ColumnNotFound { name: String },
}

pub type Result<T> = std::result::Result<T, Error>;
