//! Retiring assets.
//!
//! Decommissioning appends a row to the decommission sheet and marks the
//! origin row with [`DECOMMISSIONED_STATUS`], both in a single save.

use inventory_model::Workbook;
use serde::Serialize;

use crate::attributes::Attributes;
use crate::code::parse_code;
use crate::error::{Result, StoreError};
use crate::locator::find_row;
use crate::record::Record;
use crate::repository::RecordRepository;
use crate::schema::{EntityType, DECOMMISSIONED_STATUS};
use crate::tabular::{check_headers, Table};

/// Fields copied from the origin record into the decommission row.
const IDENTIFYING_FIELDS: [&str; 4] = ["type", "brand", "model", "serial"];

/// Identifying data of an asset about to be decommissioned.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DecommissionPrefill {
    pub origin_entity: EntityType,
    /// Code as stored in the origin row.
    pub origin_code: String,
    /// `type`, `brand`, `model` and `serial`, in that order.
    pub fields: Vec<(String, String)>,
    pub current_status: String,
}

impl DecommissionPrefill {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn is_decommissioned(&self) -> bool {
        is_terminal(&self.current_status)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DecommissionRecord {
    pub origin_entity: EntityType,
    pub origin_code: String,
    /// The row appended to the decommission sheet.
    pub record: Record,
}

pub struct DecommissionCoordinator<'r> {
    repository: &'r RecordRepository,
}

impl<'r> DecommissionCoordinator<'r> {
    pub fn new(repository: &'r RecordRepository) -> Self {
        Self { repository }
    }

    /// Look up the asset `origin_code` without writing anything.
    pub fn lookup(&self, origin_code: &str) -> Result<DecommissionPrefill> {
        let workbook = self.repository.store().load()?;
        self.prefill_from(&workbook, origin_code)
    }

    fn prefill_from(&self, workbook: &Workbook, origin_code: &str) -> Result<DecommissionPrefill> {
        let (entity, _) = parse_code(origin_code)?;
        let schema = entity.schema();
        let table = self.repository.table(workbook, entity);
        let (Some(sheet), Some(handle)) = (table.sheet(), find_row(&table, origin_code)) else {
            return Err(StoreError::not_found(entity, origin_code.trim()));
        };
        let text = |col: Option<u32>| {
            col.map(|col| sheet.value_at(handle.row, col).display_text().trim().to_string())
                .unwrap_or_default()
        };

        let fields = IDENTIFYING_FIELDS
            .iter()
            .map(|&key| {
                let mut value = text(schema.column_index(key));
                if key == "type" && value.is_empty() {
                    value = schema.default_type.unwrap_or_default().to_string();
                }
                (key.to_string(), value)
            })
            .collect();

        Ok(DecommissionPrefill {
            origin_entity: entity,
            origin_code: text(Some(schema.key_column())),
            fields,
            current_status: text(schema.status_column()),
        })
    }

    /// Retire the asset `origin_code`.
    ///
    /// `attributes` must belong to the decommission sheet. Identifying fields
    /// the caller leaves blank are copied from the origin record.
    pub fn decommission(&self, origin_code: &str, attributes: &Attributes) -> Result<DecommissionRecord> {
        if attributes.entity() != EntityType::DecommissionEvent {
            return Err(StoreError::schema(
                attributes.entity(),
                "decommission details must use the decommission event layout",
            ));
        }

        let outcome = self.repository.store().update(|workbook| {
            let prefill = self.prefill_from(workbook, origin_code)?;
            if prefill.is_decommissioned() {
                return Err(StoreError::AlreadyDecommissioned(prefill.origin_code));
            }

            let origin_entity = prefill.origin_entity;
            let origin_schema = origin_entity.schema();
            let strict = self.repository.config().strict_headers;
            if let Some(sheet) = workbook.sheet(origin_schema.sheet_name) {
                check_headers(sheet, origin_schema, strict)?;
            }

            let mut merged = attributes.clone();
            for (key, value) in &prefill.fields {
                if let Some(column) = EntityType::DecommissionEvent.schema().column(key) {
                    merged.set_default(column.key, value);
                }
            }
            let record = self
                .repository
                .insert_into(workbook, &merged, Some(&prefill.origin_code))?;

            let status_col = origin_schema.status_column().ok_or_else(|| {
                StoreError::schema(origin_entity, "layout has no status column")
            })?;
            let bound = self.repository.bound(origin_entity);
            let sheet = workbook
                .sheet_mut(origin_schema.sheet_name)
                .ok_or_else(|| StoreError::not_found(origin_entity, &prefill.origin_code))?;
            let handle = find_row(&Table::over(sheet, origin_schema, bound), &prefill.origin_code)
                .ok_or_else(|| StoreError::not_found(origin_entity, &prefill.origin_code))?;
            sheet.set_value_at(handle.row, status_col, DECOMMISSIONED_STATUS);

            Ok(DecommissionRecord {
                origin_entity,
                origin_code: prefill.origin_code,
                record,
            })
        })?;

        log::info!(
            "decommissioned {} {} (decommission record {})",
            outcome.origin_entity,
            outcome.origin_code,
            outcome.record.code
        );
        Ok(outcome)
    }
}

fn is_terminal(status: &str) -> bool {
    status.trim().eq_ignore_ascii_case(DECOMMISSIONED_STATUS)
}
