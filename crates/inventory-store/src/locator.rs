use serde::Serialize;

use crate::code::normalize_code;
use crate::schema::EntityType;
use crate::tabular::Table;

/// Position of a located record.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct RowHandle {
    pub entity: EntityType,
    /// 0-indexed worksheet row.
    pub row: u32,
}

/// Find the first row whose key cell matches `code`.
///
/// The key is the code column for assets and the sequence column for event
/// tables. Comparison trims both sides and ignores case. `None` is an ordinary
/// outcome, not an error.
pub fn find_row(table: &Table<'_>, code: &str) -> Option<RowHandle> {
    let wanted = normalize_code(code);
    if wanted.is_empty() {
        return None;
    }
    let schema = table.schema();
    let key_column = schema.key_column();
    table
        .data_rows()
        .find(|&row| {
            let cell = table.value(row, key_column);
            !cell.is_blank() && normalize_code(&cell.display_text()) == wanted
        })
        .map(|row| RowHandle {
            entity: schema.entity,
            row,
        })
}
