//! Record store for the asset inventory workbook.
//!
//! The workbook holds one sheet per [`EntityType`]. This crate allocates
//! sequences and codes, places and locates rows, switches entry forms between
//! creating and updating records, and retires assets into the decommission
//! sheet.
//!
//! A single editor is assumed: every operation loads the whole workbook and
//! writes it back atomically, with no locking between processes.

mod attributes;
mod code;
mod config;
mod decommission;
mod error;
mod locator;
mod record;
mod repository;
mod schema;
mod sequence;
mod session;
mod tabular;

pub use attributes::Attributes;
pub use code::{format_code, normalize_code, parse_code};
pub use config::{ConfigError, ScanLimits, StoreConfig};
pub use decommission::{DecommissionCoordinator, DecommissionPrefill, DecommissionRecord};
pub use error::{Result, StoreError};
pub use locator::{find_row, RowHandle};
pub use record::{age_in_years, Record};
pub use repository::RecordRepository;
pub use schema::{
    Column, ColumnRole, EntityType, SheetSchema, UnknownEntityType, DECOMMISSIONED_STATUS,
    FIRST_DATA_ROW, HEADER_ROW,
};
pub use sequence::{allocate, next_code, next_sequence, placement_row, Allocation};
pub use session::{EditSession, SessionMode, ORIGIN_CODE_FIELD};
pub use tabular::{Table, TabularStore};
