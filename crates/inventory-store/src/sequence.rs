//! Sequence allocation and row placement.
//!
//! The next sequence is one past the largest positive integer found in the
//! identifier column across the whole bounded range. Blank and non-numeric
//! cells are skipped, never treated as the end of the table.

use serde::Serialize;

use crate::code::format_code;
use crate::error::{Result, StoreError};
use crate::schema::EntityType;
use crate::tabular::Table;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Allocation {
    pub entity: EntityType,
    pub sequence: u32,
    /// Formatted code for assets, the decimal sequence otherwise.
    pub code: String,
    /// Set when the table could not be read and the allocation is a guess.
    pub degraded: bool,
}

impl Allocation {
    pub(crate) fn new(entity: EntityType, sequence: u32) -> Self {
        let code = match entity.schema().prefix {
            Some(prefix) => format_code(prefix, sequence),
            None => sequence.to_string(),
        };
        Self {
            entity,
            sequence,
            code,
            degraded: false,
        }
    }

    /// Allocation used when the table is unreadable: sequence 1, flagged degraded.
    ///
    /// Only for display; writing with it could duplicate an existing code.
    pub fn fallback(entity: EntityType, err: &StoreError) -> Self {
        log::warn!(
            "could not read {entity} table ({err}); showing sequence 1, which may collide with existing records"
        );
        Self {
            degraded: true,
            ..Self::new(entity, 1)
        }
    }
}

pub fn next_sequence(table: &Table<'_>) -> u32 {
    let schema = table.schema();
    let max = table
        .data_rows()
        .filter_map(|row| table.value(row, schema.sequence_column()).as_positive_integer())
        .max()
        .unwrap_or(0);
    log::debug!("{}: highest sequence {max}", schema.sheet_name);
    max.saturating_add(1)
}

/// Code of the next record, e.g. `EQC-0008`.
pub fn next_code(table: &Table<'_>, prefix: &str) -> String {
    format_code(prefix, next_sequence(table))
}

pub fn allocate(table: &Table<'_>) -> Allocation {
    Allocation::new(table.schema().entity, next_sequence(table))
}

/// Row that receives the next inserted record.
///
/// New rows go directly below the last row whose identifier or code cell is
/// non-blank; gaps above it are never reused. Fails with
/// [`StoreError::TableFull`] when that row lies past the bound.
pub fn placement_row(table: &Table<'_>) -> Result<u32> {
    let schema = table.schema();
    let key_columns = [Some(schema.sequence_column()), schema.code_column()];
    let last_used = table
        .data_rows()
        .rev()
        .find(|&row| {
            key_columns
                .iter()
                .flatten()
                .any(|&col| !table.value(row, col).is_blank())
        });
    let row = match last_used {
        Some(row) => row + 1,
        None => crate::schema::FIRST_DATA_ROW,
    };
    if row > table.bound() {
        return Err(StoreError::TableFull {
            entity: schema.entity,
            bound: table.bound(),
        });
    }
    log::debug!("{}: placing new record in row {}", schema.sheet_name, row + 1);
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;
    use inventory_model::{CellValue, Workbook, Worksheet};
    use pretty_assertions::assert_eq;

    fn sheet_with(entity: EntityType, ids: &[(u32, CellValue)]) -> Worksheet {
        let mut sheet = Worksheet::new(entity.schema().sheet_name);
        for (row, value) in ids {
            sheet.set_value_at(*row, 0, value.clone());
        }
        sheet
    }

    #[test]
    fn empty_table_starts_at_one() {
        let workbook = Workbook::new();
        let table = Table::of(&workbook, EntityType::Printer, 200);
        assert_eq!(next_sequence(&table), 1);
        assert_eq!(next_code(&table, "IMP"), "IMP-0001");
        assert_eq!(placement_row(&table).unwrap(), 1);
    }

    #[test]
    fn gaps_and_junk_do_not_stop_the_scan() {
        let entity = EntityType::ComputerEquipment;
        let sheet = sheet_with(
            entity,
            &[
                (1, CellValue::Number(1.0)),
                (2, CellValue::from("n/a")),
                (5, CellValue::from(" 4 ")),
                (9, CellValue::Number(2.5)),
            ],
        );
        let table = Table::over(&sheet, entity.schema(), 500);
        assert_eq!(next_sequence(&table), 5);
        assert_eq!(allocate(&table).code, "EQC-0005");
        assert_eq!(placement_row(&table).unwrap(), 10);
    }

    #[test]
    fn values_past_the_bound_are_ignored() {
        let entity = EntityType::NetworkEquipment;
        let sheet = sheet_with(entity, &[(1, CellValue::Number(3.0)), (11, CellValue::Number(99.0))]);
        let table = Table::over(&sheet, entity.schema(), 10);
        assert_eq!(next_sequence(&table), 4);
        assert_eq!(placement_row(&table).unwrap(), 2);
    }

    #[test]
    fn stray_large_number_shifts_allocation() {
        let entity = EntityType::Peripheral;
        let sheet = sheet_with(entity, &[(1, CellValue::Number(1.0)), (2, CellValue::Number(900.0))]);
        let table = Table::over(&sheet, entity.schema(), 200);
        assert_eq!(next_sequence(&table), 901);
    }

    #[test]
    fn code_only_rows_count_for_placement() {
        let entity = EntityType::Printer;
        let mut sheet = Worksheet::new(entity.schema().sheet_name);
        sheet.set_value_at(3, 1, "IMP-0003");
        let table = Table::over(&sheet, entity.schema(), 200);
        assert_eq!(next_sequence(&table), 1);
        assert_eq!(placement_row(&table).unwrap(), 4);
    }

    #[test]
    fn full_table_is_rejected() {
        let entity = EntityType::MaintenanceEvent;
        let sheet = sheet_with(entity, &[(3, CellValue::Number(3.0))]);
        let table = Table::over(&sheet, entity.schema(), 3);
        assert!(matches!(
            placement_row(&table),
            Err(StoreError::TableFull { entity: EntityType::MaintenanceEvent, bound: 3 })
        ));
    }

    #[test]
    fn unprefixed_allocation_uses_decimal_code() {
        let workbook = Workbook::new();
        let allocation = allocate(&Table::of(&workbook, EntityType::MaintenanceEvent, 500));
        assert_eq!(allocation.code, "1");
        assert!(!allocation.degraded);
    }
}
