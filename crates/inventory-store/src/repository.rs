use std::path::PathBuf;

use chrono::NaiveDate;
use inventory_model::{CellValue, Workbook};

use crate::attributes::Attributes;
use crate::config::StoreConfig;
use crate::error::{Result, StoreError};
use crate::locator::{find_row, RowHandle};
use crate::record::{refresh_derived, Record};
use crate::schema::EntityType;
use crate::sequence::{allocate, placement_row, Allocation};
use crate::tabular::{check_headers, ensure_table, Table, TabularStore};

/// Insert, update and read records of every entity type.
///
/// Each mutating call is a full load-modify-save cycle of the workbook.
#[derive(Clone, Debug)]
pub struct RecordRepository {
    store: TabularStore,
    config: StoreConfig,
    reference_date: Option<NaiveDate>,
}

impl RecordRepository {
    pub fn new(store: TabularStore, config: StoreConfig) -> Self {
        Self {
            store,
            config,
            reference_date: None,
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(TabularStore::new(path), StoreConfig::default())
    }

    /// Compute asset ages relative to `date` instead of the local clock.
    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = Some(date);
        self
    }

    pub fn store(&self) -> &TabularStore {
        &self.store
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn bound(&self, entity: EntityType) -> u32 {
        self.config.bound(entity)
    }

    fn today(&self) -> NaiveDate {
        self.reference_date
            .unwrap_or_else(|| chrono::Local::now().date_naive())
    }

    pub(crate) fn table<'a>(&self, workbook: &'a Workbook, entity: EntityType) -> Table<'a> {
        Table::of(workbook, entity, self.bound(entity))
    }

    /// Sequence and code the next insert of `entity` would receive.
    pub fn next_allocation(&self, entity: EntityType) -> Result<Allocation> {
        let workbook = self.store.load()?;
        Ok(allocate(&self.table(&workbook, entity)))
    }

    /// Like [`Self::next_allocation`], but falls back to a degraded allocation
    /// when the workbook is unreadable. For previews only.
    pub fn preview_allocation(&self, entity: EntityType) -> Allocation {
        self.next_allocation(entity)
            .unwrap_or_else(|err| Allocation::fallback(entity, &err))
    }

    /// Append a new record with a freshly allocated sequence and code.
    ///
    /// Decommission events are recorded through
    /// [`DecommissionCoordinator`](crate::DecommissionCoordinator) so the
    /// origin asset is always marked.
    pub fn insert(&self, attributes: &Attributes) -> Result<Record> {
        let entity = attributes.entity();
        if entity == EntityType::DecommissionEvent {
            return Err(StoreError::schema(
                entity,
                "decommission events are recorded by decommissioning an asset code",
            ));
        }
        let record = self
            .store
            .update(|workbook| self.insert_into(workbook, attributes, None))?;
        log::info!("inserted {} {}", entity, record.code);
        Ok(record)
    }

    /// Write a new row into `workbook` without saving.
    pub(crate) fn insert_into(
        &self,
        workbook: &mut Workbook,
        attributes: &Attributes,
        origin_code: Option<&str>,
    ) -> Result<Record> {
        let entity = attributes.entity();
        let schema = entity.schema();
        let bound = self.bound(entity);
        let sheet = ensure_table(workbook, schema)?;
        check_headers(sheet, schema, self.config.strict_headers)?;

        let (allocation, row) = {
            let table = Table::over(sheet, schema, bound);
            (allocate(&table), placement_row(&table)?)
        };

        sheet.set_value_at(row, schema.sequence_column(), allocation.sequence);
        if let Some(col) = schema.code_column() {
            sheet.set_value_at(row, col, allocation.code.as_str());
        }
        if let (Some(col), Some(origin)) = (schema.origin_column(), origin_code) {
            sheet.set_value_at(row, col, origin);
        }
        for (key, value) in attributes.iter() {
            if let Some(col) = schema.column_index(key) {
                sheet.set_value_at(row, col, cell_value(value));
            }
        }
        refresh_derived(sheet, schema, row, self.today());

        Ok(Record::from_row(sheet, schema, row))
    }

    /// Overwrite the supplied attributes of the record identified by `code`.
    ///
    /// Columns not present in `attributes` keep their value; identity columns
    /// are never written.
    pub fn update(&self, code: &str, attributes: &Attributes) -> Result<Record> {
        let entity = attributes.entity();
        let schema = entity.schema();
        let bound = self.bound(entity);
        let record = self.store.update(|workbook| {
            let sheet = workbook
                .sheet_mut(schema.sheet_name)
                .ok_or_else(|| StoreError::not_found(entity, code.trim()))?;
            let RowHandle { row, .. } = find_row(&Table::over(sheet, schema, bound), code)
                .ok_or_else(|| StoreError::not_found(entity, code.trim()))?;
            check_headers(sheet, schema, self.config.strict_headers)?;

            for (key, value) in attributes.iter() {
                if let Some(col) = schema.column_index(key) {
                    sheet.set_value_at(row, col, cell_value(value));
                }
            }
            refresh_derived(sheet, schema, row, self.today());
            Ok(Record::from_row(sheet, schema, row))
        })?;
        log::info!(
            "updated {} {} ({} field(s))",
            entity,
            record.code,
            attributes.len()
        );
        Ok(record)
    }

    pub fn read(&self, entity: EntityType, code: &str) -> Result<Record> {
        let workbook = self.store.load()?;
        self.read_from(&workbook, entity, code)
    }

    pub(crate) fn read_from(&self, workbook: &Workbook, entity: EntityType, code: &str) -> Result<Record> {
        let table = self.table(workbook, entity);
        match (table.sheet(), find_row(&table, code)) {
            (Some(sheet), Some(handle)) => Ok(Record::from_row(sheet, entity.schema(), handle.row)),
            _ => Err(StoreError::not_found(entity, code.trim())),
        }
    }

    /// All records within the scan bound, in row order.
    pub fn list(&self, entity: EntityType) -> Result<Vec<Record>> {
        let workbook = self.store.load()?;
        let table = self.table(&workbook, entity);
        let Some(sheet) = table.sheet() else {
            return Ok(Vec::new());
        };
        let schema = table.schema();
        Ok(table
            .data_rows()
            .filter(|&row| {
                !table.value(row, schema.sequence_column()).is_blank()
                    || !table.value(row, schema.key_column()).is_blank()
            })
            .map(|row| Record::from_row(sheet, schema, row))
            .collect())
    }
}

fn cell_value(value: &str) -> CellValue {
    if value.is_empty() {
        CellValue::Empty
    } else {
        CellValue::from(value)
    }
}
