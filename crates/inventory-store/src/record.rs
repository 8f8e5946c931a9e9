use std::collections::BTreeMap;

use chrono::{Days, NaiveDate, NaiveDateTime};
use inventory_model::{CellValue, Worksheet};
use serde::Serialize;

use crate::code::parse_code;
use crate::schema::{ColumnRole, EntityType, SheetSchema};

/// One data row as seen by callers.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Record {
    pub entity: EntityType,
    /// 1-based worksheet row, for display.
    pub row_number: u32,
    pub sequence: Option<u32>,
    /// Lookup key: the asset code, or the decimal sequence for event tables.
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_code: Option<String>,
    /// Every editable column; blank cells are empty strings.
    pub attributes: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub derived: BTreeMap<String, String>,
}

impl Record {
    pub(crate) fn from_row(sheet: &Worksheet, schema: &SheetSchema, row: u32) -> Self {
        let values = sheet.row_values(row, schema.width());
        let text = |col: u32| values[col as usize].display_text().trim().to_string();

        let key = text(schema.key_column());
        let sequence = values[schema.sequence_column() as usize]
            .as_positive_integer()
            .or_else(|| parse_code(&key).ok().map(|(_, sequence)| sequence));

        let mut attributes = BTreeMap::new();
        let mut derived = BTreeMap::new();
        let mut origin_code = None;
        for (idx, column) in schema.columns.iter().enumerate() {
            let value = text(idx as u32);
            match column.role {
                ColumnRole::Attribute | ColumnRole::Status => {
                    attributes.insert(column.key.to_string(), value);
                }
                ColumnRole::Derived => {
                    derived.insert(column.key.to_string(), value);
                }
                ColumnRole::OriginCode => origin_code = Some(value),
                ColumnRole::Sequence | ColumnRole::Code => {}
            }
        }

        Self {
            entity: schema.entity,
            row_number: row + 1,
            sequence,
            code: key,
            origin_code,
            attributes,
            derived,
        }
    }

    /// Value of an editable or derived column.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.attributes
            .get(key)
            .or_else(|| self.derived.get(key))
            .map(String::as_str)
    }

    pub fn status(&self) -> Option<&str> {
        let schema = self.entity.schema();
        let column = schema.columns.get(schema.status_column()? as usize)?;
        self.get(column.key)
    }
}

/// Recompute derived columns of `row`.
///
/// Computer equipment carries its age in years, derived from the acquisition
/// date relative to `today`. The date may be `YYYY-MM-DD` text, an ISO
/// date-time, or an Excel serial number as stored by date-formatted cells. A
/// blank date leaves the age as it is; an unparseable one clears it.
pub(crate) fn refresh_derived(sheet: &mut Worksheet, schema: &SheetSchema, row: u32, today: NaiveDate) {
    let (Some(age_col), Some(date_col)) = (
        schema.column_index("age_years"),
        schema.column_index("acquisition_date"),
    ) else {
        return;
    };
    let date = sheet.value_at(row, date_col);
    if date.is_blank() {
        return;
    }
    let age = match parse_date(date) {
        Some(acquired) => CellValue::Number(age_in_years(acquired, today)),
        None => {
            log::debug!(
                "{} row {}: unparseable acquisition date {:?}",
                schema.sheet_name,
                row + 1,
                date.display_text()
            );
            CellValue::Empty
        }
    };
    sheet.set_value_at(row, age_col, age);
}

fn parse_date(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::String(s) => {
            let s = s.trim();
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f").map(|dt| dt.date()))
                .ok()
        }
        CellValue::Number(serial) => excel_serial_date(*serial),
        _ => None,
    }
}

/// Date part of a serial in the 1900 date system.
///
/// Serial 60 is the nonexistent 1900-02-29 that the 1900 system keeps for
/// Lotus compatibility; serials before it are off by one day.
fn excel_serial_date(serial: f64) -> Option<NaiveDate> {
    if !serial.is_finite() || serial < 1.0 || serial >= 2_958_466.0 {
        return None;
    }
    let days = serial.floor() as u64;
    let epoch = match days {
        60 => return None,
        d if d < 60 => NaiveDate::from_ymd_opt(1899, 12, 31)?,
        _ => NaiveDate::from_ymd_opt(1899, 12, 30)?,
    };
    epoch.checked_add_days(Days::new(days))
}

/// Days elapsed divided by 365.25, rounded to one decimal.
pub fn age_in_years(acquired: NaiveDate, today: NaiveDate) -> f64 {
    let days = (today - acquired).num_days() as f64;
    (days / 365.25 * 10.0).round() / 10.0
}
