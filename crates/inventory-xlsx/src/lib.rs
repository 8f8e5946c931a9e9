//! Minimal XLSX support for the inventory workbook.
//!
//! - [`read_workbook`] imports the cell values of every worksheet.
//! - [`write_workbook_to_writer`] / [`write_workbook_to_vec`] export a
//!   [`inventory_model::Workbook`] as a SpreadsheetML package.
//! - [`save_workbook`] replaces a workbook file atomically.
//! - [`XlsxDocument`] edits an existing package in place: only the changed
//!   cells are patched into their worksheet parts.
//!
//! Formulas are imported as their cached values. A new package written from a
//! [`inventory_model::Workbook`] carries values only; an edited
//! [`XlsxDocument`] keeps the styles, validations, formulas and drawings of
//! every cell it does not touch.

mod atomic;
mod document;
mod patch;
mod reader;
mod writer;
mod xml;

pub use atomic::{atomic_write, save_workbook, AtomicWriteError, SaveError};
pub use document::XlsxDocument;
pub use patch::{apply_cell_patches, CellPatch, WorkbookCellPatches, WorksheetCellPatches};
pub use reader::{read_workbook, read_workbook_from_bytes, read_workbook_from_reader, ReadError};
pub use writer::{write_workbook_to_vec, write_workbook_to_writer, WriteError};
