//! `inventory-model` defines the in-memory workbook shared by the `.xlsx`
//! reader/writer and the inventory record store.
//!
//! The model only carries what the inventory needs from a spreadsheet:
//! named sheets holding sparse, typed cell values. Styles, formulas and
//! drawings are not represented.

mod address;
mod sheet_name;
mod value;
mod workbook;
mod worksheet;

pub use address::{col_to_name, A1ParseError, CellRef, EXCEL_MAX_COLS, EXCEL_MAX_ROWS};
pub use sheet_name::{
    sheet_name_eq_case_insensitive, validate_sheet_name, SheetNameError, EXCEL_MAX_SHEET_NAME_LEN,
};
pub use value::CellValue;
pub use workbook::Workbook;
pub use worksheet::Worksheet;
