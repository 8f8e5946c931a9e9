use std::path::{Path, PathBuf};

use inventory_model::{CellValue, Workbook, Worksheet};
use inventory_xlsx::{read_workbook, save_workbook, XlsxDocument};

use crate::error::{Result, StoreError};
use crate::schema::{EntityType, SheetSchema, FIRST_DATA_ROW, HEADER_ROW};

/// Whole-file accessor for the shared workbook.
///
/// Every operation loads the complete workbook, mutates it in memory and writes
/// it back atomically. Writes patch only the cells that changed into the
/// existing package, so formatting and formulas the store does not model are
/// kept. No handle to the file is kept between operations.
#[derive(Clone, Debug)]
pub struct TabularStore {
    path: PathBuf,
}

impl TabularStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    pub fn load(&self) -> Result<Workbook> {
        read_workbook(&self.path).map_err(|source| StoreError::StoreUnavailable {
            path: self.path.clone(),
            source,
        })
    }

    /// Replace the file with a new package holding only `workbook`'s values.
    pub fn save(&self, workbook: &Workbook) -> Result<()> {
        save_workbook(&self.path, workbook).map_err(|source| StoreError::Persist {
            path: self.path.clone(),
            source,
        })
    }

    fn open(&self) -> Result<XlsxDocument> {
        XlsxDocument::open(&self.path).map_err(|source| StoreError::StoreUnavailable {
            path: self.path.clone(),
            source,
        })
    }

    fn save_document(&self, document: &XlsxDocument) -> Result<()> {
        document.save(&self.path).map_err(|source| StoreError::Persist {
            path: self.path.clone(),
            source,
        })
    }

    /// Load, apply `f` and patch the changed cells back. When `f` fails, or
    /// changes nothing, the file is not written.
    pub fn update<T>(&self, f: impl FnOnce(&mut Workbook) -> Result<T>) -> Result<T> {
        let mut document = self.open()?;
        let out = f(&mut document.workbook)?;
        if document.is_modified() {
            self.save_document(&document)?;
        }
        Ok(out)
    }

    /// Create the workbook with one headed sheet per entity type, or add the
    /// sheets an existing workbook lacks.
    ///
    /// Returns the names of the sheets that were created.
    pub fn initialize(&self) -> Result<Vec<&'static str>> {
        let mut document = if self.exists() {
            Some(self.open()?)
        } else {
            None
        };
        let mut fresh = Workbook::new();
        let workbook = match document.as_mut() {
            Some(document) => &mut document.workbook,
            None => &mut fresh,
        };

        let mut created = Vec::new();
        for entity in EntityType::ALL {
            let schema = entity.schema();
            if workbook.sheet(schema.sheet_name).is_none() {
                ensure_table(workbook, schema)?;
                created.push(schema.sheet_name);
            }
        }

        if !created.is_empty() {
            match &document {
                Some(document) => self.save_document(document)?,
                None => self.save(&fresh)?,
            }
            log::info!(
                "initialized {} with sheets: {}",
                self.path.display(),
                created.join(", ")
            );
        }
        Ok(created)
    }
}

/// Read-only view of one entity sheet limited to its scan bound.
///
/// A workbook without the sheet behaves like an empty table.
#[derive(Clone, Copy, Debug)]
pub struct Table<'a> {
    sheet: Option<&'a Worksheet>,
    schema: &'static SheetSchema,
    bound: u32,
}

impl<'a> Table<'a> {
    pub fn of(workbook: &'a Workbook, entity: EntityType, bound: u32) -> Self {
        let schema = entity.schema();
        Self {
            sheet: workbook.sheet(schema.sheet_name),
            schema,
            bound,
        }
    }

    pub fn over(sheet: &'a Worksheet, schema: &'static SheetSchema, bound: u32) -> Self {
        Self {
            sheet: Some(sheet),
            schema,
            bound,
        }
    }

    pub fn schema(&self) -> &'static SheetSchema {
        self.schema
    }

    pub fn bound(&self) -> u32 {
        self.bound
    }

    pub fn sheet(&self) -> Option<&'a Worksheet> {
        self.sheet
    }

    /// Data rows within the bound (0-indexed worksheet rows).
    pub fn data_rows(&self) -> std::ops::RangeInclusive<u32> {
        FIRST_DATA_ROW..=self.bound
    }

    pub fn value(&self, row: u32, col: u32) -> &'a CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        match self.sheet {
            Some(sheet) => sheet.value_at(row, col),
            None => &EMPTY,
        }
    }
}

/// Return the entity sheet, creating it with its header row when missing.
pub(crate) fn ensure_table<'a>(
    workbook: &'a mut Workbook,
    schema: &'static SheetSchema,
) -> Result<&'a mut Worksheet> {
    let (sheet, created) = workbook
        .ensure_sheet(schema.sheet_name)
        .map_err(|err| StoreError::schema(schema.entity, err.to_string()))?;
    if created {
        log::warn!("sheet {:?} was missing; created it with headers", schema.sheet_name);
        write_headers(sheet, schema);
    }
    Ok(sheet)
}

fn write_headers(sheet: &mut Worksheet, schema: &SheetSchema) {
    for (idx, column) in schema.columns.iter().enumerate() {
        sheet.set_value_at(HEADER_ROW, idx as u32, column.header);
    }
}

/// Compare the header row against the schema.
///
/// Blank header cells are accepted. Any other difference is a
/// [`StoreError::SchemaMismatch`] when `strict`, otherwise a warning.
pub(crate) fn check_headers(sheet: &Worksheet, schema: &SheetSchema, strict: bool) -> Result<()> {
    for (idx, column) in schema.columns.iter().enumerate() {
        let found = sheet.value_at(HEADER_ROW, idx as u32);
        if found.is_blank() {
            continue;
        }
        let found = found.display_text();
        if normalize_header(&found) == normalize_header(column.header) {
            continue;
        }
        let detail = format!(
            "column {} header is {:?}, expected {:?}",
            inventory_model::col_to_name(idx as u32),
            found.trim(),
            column.header
        );
        if strict {
            return Err(StoreError::schema(schema.entity, detail));
        }
        log::warn!("{}: {detail}", schema.sheet_name);
    }
    Ok(())
}

fn normalize_header(header: &str) -> String {
    header.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initialize_creates_every_sheet_once() {
        let dir = tempfile::tempdir().unwrap();
        let store = TabularStore::new(dir.path().join("inventario.xlsx"));

        let created = store.initialize().unwrap();
        assert_eq!(created.len(), EntityType::ALL.len());
        assert!(store.initialize().unwrap().is_empty());

        let workbook = store.load().unwrap();
        let sheet = workbook.sheet("Equipos de Cómputo").unwrap();
        assert_eq!(sheet.value_at(0, 1), &CellValue::from("Código Inventario"));
        assert_eq!(sheet.value_at(0, 61), &CellValue::from("Antigüedad (años)"));
    }

    #[test]
    fn initialize_keeps_foreign_sheets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inventario.xlsx");
        let mut workbook = Workbook::new();
        workbook.add_sheet("Listas").unwrap().set_value_at(0, 0, "Áreas");
        inventory_xlsx::save_workbook(&path, &workbook).unwrap();

        let store = TabularStore::new(&path);
        store.initialize().unwrap();
        let loaded = store.load().unwrap();
        assert_eq!(loaded.sheet("Listas").unwrap().value_at(0, 0), &CellValue::from("Áreas"));
        assert_eq!(loaded.sheets.len(), 7);
    }

    #[test]
    fn missing_file_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = TabularStore::new(dir.path().join("absent.xlsx"));
        assert!(matches!(store.load(), Err(StoreError::StoreUnavailable { .. })));
    }

    #[test]
    fn header_drift_is_reported() {
        let schema = EntityType::Printer.schema();
        let mut sheet = Worksheet::new(schema.sheet_name);
        write_headers(&mut sheet, schema);
        assert!(check_headers(&sheet, schema, true).is_ok());

        sheet.set_value_at(0, 11, "  ESTADO ");
        assert!(check_headers(&sheet, schema, true).is_ok());

        sheet.set_value_at(0, 11, "Observaciones");
        assert!(matches!(
            check_headers(&sheet, schema, true),
            Err(StoreError::SchemaMismatch { entity: EntityType::Printer, .. })
        ));
        assert!(check_headers(&sheet, schema, false).is_ok());

        sheet.set_value_at(0, 11, "");
        assert!(check_headers(&sheet, schema, true).is_ok());
    }
}
