use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{CellRef, CellValue};

static EMPTY: CellValue = CellValue::Empty;

/// A named grid of cell values.
///
/// Storage is sparse: only non-empty cells are kept, keyed in row-major order.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Worksheet {
    pub name: String,
    #[serde(default, with = "cell_entries")]
    cells: BTreeMap<CellRef, CellValue>,
}

/// JSON object keys must be strings, so cells are serialized as a list of
/// `{row, col, value}` entries instead of a map.
mod cell_entries {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use crate::{CellRef, CellValue};

    #[derive(Serialize)]
    struct EntryRef<'a> {
        row: u32,
        col: u32,
        value: &'a CellValue,
    }

    #[derive(Deserialize)]
    struct Entry {
        row: u32,
        col: u32,
        value: CellValue,
    }

    pub(super) fn serialize<S>(
        cells: &BTreeMap<CellRef, CellValue>,
        serializer: S,
    ) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_seq(cells.iter().map(|(cell, value)| EntryRef {
            row: cell.row,
            col: cell.col,
            value,
        }))
    }

    pub(super) fn deserialize<'de, D>(
        deserializer: D,
    ) -> Result<BTreeMap<CellRef, CellValue>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let entries = Vec::<Entry>::deserialize(deserializer)?;
        Ok(entries
            .into_iter()
            .filter(|entry| !entry.value.is_empty())
            .map(|entry| (CellRef::new(entry.row, entry.col), entry.value))
            .collect())
    }
}

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cells: BTreeMap::new(),
        }
    }

    /// Value at `cell`; unset cells read as [`CellValue::Empty`].
    pub fn value(&self, cell: CellRef) -> &CellValue {
        self.cells.get(&cell).unwrap_or(&EMPTY)
    }

    /// Convenience accessor by 0-indexed row/column.
    pub fn value_at(&self, row: u32, col: u32) -> &CellValue {
        self.value(CellRef::new(row, col))
    }

    /// Set the value of a cell. Writing [`CellValue::Empty`] removes the cell.
    pub fn set_value(&mut self, cell: CellRef, value: impl Into<CellValue>) {
        let value = value.into();
        if value.is_empty() {
            self.cells.remove(&cell);
        } else {
            self.cells.insert(cell, value);
        }
    }

    pub fn set_value_at(&mut self, row: u32, col: u32, value: impl Into<CellValue>) {
        self.set_value(CellRef::new(row, col), value);
    }

    /// Iterate non-empty cells in row-major order.
    pub fn iter_cells(&self) -> impl Iterator<Item = (CellRef, &CellValue)> {
        self.cells.iter().map(|(cell, value)| (*cell, value))
    }

    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Highest 0-indexed row holding any value, if the sheet is not empty.
    pub fn max_row(&self) -> Option<u32> {
        self.cells.keys().next_back().map(|cell| cell.row)
    }

    /// Values of `row` for columns `0..width`, empty cells included.
    pub fn row_values(&self, row: u32, width: u32) -> Vec<&CellValue> {
        (0..width).map(|col| self.value_at(row, col)).collect()
    }
}
