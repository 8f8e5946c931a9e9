use std::io::Write;
use std::path::Path;

use inventory_model::Workbook;

use crate::atomic::{atomic_write, SaveError};
use crate::patch::{apply_cell_patches, WorkbookCellPatches};
use crate::reader::{read_workbook_from_bytes, ReadError};
use crate::writer::WriteError;

/// An XLSX package opened for editing.
///
/// `workbook` holds the cell values. Saving diffs it against the values read
/// at open time and patches only the changed cells into the original package,
/// so everything the model does not represent is kept.
#[derive(Debug, Clone)]
pub struct XlsxDocument {
    pub workbook: Workbook,
    baseline: Workbook,
    package: Vec<u8>,
}

impl XlsxDocument {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ReadError> {
        Self::from_bytes(std::fs::read(path)?)
    }

    pub fn from_bytes(package: Vec<u8>) -> Result<Self, ReadError> {
        let workbook = read_workbook_from_bytes(&package)?;
        Ok(Self {
            baseline: workbook.clone(),
            workbook,
            package,
        })
    }

    /// The package bytes as read.
    pub fn original_package(&self) -> &[u8] {
        &self.package
    }

    pub fn patches(&self) -> WorkbookCellPatches {
        WorkbookCellPatches::diff(&self.baseline, &self.workbook)
    }

    pub fn is_modified(&self) -> bool {
        !self.patches().is_empty()
    }

    pub fn save_to_vec(&self) -> Result<Vec<u8>, WriteError> {
        apply_cell_patches(&self.package, &self.patches())
    }

    /// Patch the package and atomically replace the file at `path`.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SaveError> {
        let path = path.as_ref();
        let patches = self.patches();
        atomic_write(path, |file| {
            let bytes = apply_cell_patches(&self.package, &patches)?;
            file.write_all(&bytes)?;
            Ok::<_, WriteError>(())
        })?;
        log::debug!(
            "patched {} sheet(s), added {}, in {}",
            self.workbook
                .sheets
                .iter()
                .filter(|sheet| patches.sheet(&sheet.name).is_some())
                .count(),
            patches.new_sheets().len(),
            path.display()
        );
        Ok(())
    }
}
