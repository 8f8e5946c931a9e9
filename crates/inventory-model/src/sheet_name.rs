use thiserror::Error;

/// Excel limits worksheet names to 31 UTF-16 code units.
pub const EXCEL_MAX_SHEET_NAME_LEN: usize = 31;

const FORBIDDEN_CHARS: &[char] = &[':', '\\', '/', '?', '*', '[', ']'];

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SheetNameError {
    #[error("sheet name cannot be empty")]
    Empty,
    #[error("sheet name exceeds {EXCEL_MAX_SHEET_NAME_LEN} characters")]
    TooLong,
    #[error("sheet name contains forbidden character {0:?}")]
    InvalidCharacter(char),
    #[error("sheet name cannot begin or end with an apostrophe")]
    LeadingOrTrailingApostrophe,
    #[error("sheet name already exists: {0}")]
    DuplicateName(String),
}

/// Validate a worksheet name against Excel's naming rules.
pub fn validate_sheet_name(name: &str) -> Result<(), SheetNameError> {
    if name.trim().is_empty() {
        return Err(SheetNameError::Empty);
    }
    if name.encode_utf16().count() > EXCEL_MAX_SHEET_NAME_LEN {
        return Err(SheetNameError::TooLong);
    }
    if let Some(ch) = name.chars().find(|c| FORBIDDEN_CHARS.contains(c)) {
        return Err(SheetNameError::InvalidCharacter(ch));
    }
    if name.starts_with('\'') || name.ends_with('\'') {
        return Err(SheetNameError::LeadingOrTrailingApostrophe);
    }
    Ok(())
}

/// Excel compares sheet names case-insensitively.
pub fn sheet_name_eq_case_insensitive(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}
