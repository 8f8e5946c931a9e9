use std::path::PathBuf;

use inventory_xlsx::{ReadError, SaveError};
use thiserror::Error;

use crate::schema::EntityType;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The workbook could not be opened or parsed (missing, locked or corrupt).
    #[error("workbook {path} is unavailable: {source}")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: ReadError,
    },
    #[error("no {entity} record with code {code:?}")]
    RecordNotFound { entity: EntityType, code: String },
    #[error("invalid inventory code {0:?}: expected one of EQC-, IMP-, PER-, RED- followed by a number")]
    InvalidCodeFormat(String),
    #[error("{entity} sheet does not match its layout: {detail}")]
    SchemaMismatch { entity: EntityType, detail: String },
    #[error("{entity} sheet is full: all {bound} data rows are in use")]
    TableFull { entity: EntityType, bound: u32 },
    #[error("{0} is already decommissioned")]
    AlreadyDecommissioned(String),
    /// Writing failed; the previous workbook file is left intact.
    #[error("failed to save workbook {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: SaveError,
    },
}

impl StoreError {
    pub(crate) fn schema(entity: EntityType, detail: impl Into<String>) -> Self {
        StoreError::SchemaMismatch {
            entity,
            detail: detail.into(),
        }
    }

    pub(crate) fn not_found(entity: EntityType, code: impl Into<String>) -> Self {
        StoreError::RecordNotFound {
            entity,
            code: code.into(),
        }
    }
}
