use serde::{Deserialize, Serialize};

use crate::sheet_name::{sheet_name_eq_case_insensitive, validate_sheet_name, SheetNameError};
use crate::Worksheet;

/// An ordered collection of worksheets.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Workbook {
    #[serde(default)]
    pub sheets: Vec<Worksheet>,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a sheet by name (case-insensitive, as Excel does).
    pub fn sheet(&self, name: &str) -> Option<&Worksheet> {
        self.sheets
            .iter()
            .find(|sheet| sheet_name_eq_case_insensitive(&sheet.name, name))
    }

    pub fn sheet_mut(&mut self, name: &str) -> Option<&mut Worksheet> {
        self.sheets
            .iter_mut()
            .find(|sheet| sheet_name_eq_case_insensitive(&sheet.name, name))
    }

    /// Append a new empty sheet.
    pub fn add_sheet(&mut self, name: &str) -> Result<&mut Worksheet, SheetNameError> {
        validate_sheet_name(name)?;
        if self.sheet(name).is_some() {
            return Err(SheetNameError::DuplicateName(name.to_string()));
        }
        self.sheets.push(Worksheet::new(name));
        let idx = self.sheets.len() - 1;
        Ok(&mut self.sheets[idx])
    }

    /// Return the named sheet, appending it first if it does not exist.
    ///
    /// The boolean is `true` when the sheet was created by this call.
    pub fn ensure_sheet(&mut self, name: &str) -> Result<(&mut Worksheet, bool), SheetNameError> {
        match self.sheet_position(name) {
            Some(idx) => Ok((&mut self.sheets[idx], false)),
            None => Ok((self.add_sheet(name)?, true)),
        }
    }

    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|sheet| sheet.name.as_str())
    }

    fn sheet_position(&self, name: &str) -> Option<usize> {
        self.sheets
            .iter()
            .position(|sheet| sheet_name_eq_case_insensitive(&sheet.name, name))
    }
}
