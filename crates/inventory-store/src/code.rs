//! Inventory codes: `<PREFIX>-<sequence>` with the sequence zero-padded to 4 digits.

use crate::error::{Result, StoreError};
use crate::schema::EntityType;

const CODE_DIGITS: usize = 4;

/// Format the code for `sequence` (e.g. `EQC-0007`). Sequences above 9999 keep
/// all their digits.
pub fn format_code(prefix: &str, sequence: u32) -> String {
    format!("{prefix}-{sequence:0width$}", width = CODE_DIGITS)
}

/// Normalized form used for code comparisons.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Split an asset code into its entity type and sequence.
///
/// Matching is case-insensitive and ignores surrounding whitespace. Codes
/// without a known prefix or without a numeric suffix are rejected with
/// [`StoreError::InvalidCodeFormat`].
pub fn parse_code(code: &str) -> Result<(EntityType, u32)> {
    let invalid = || StoreError::InvalidCodeFormat(code.trim().to_string());
    let normalized = normalize_code(code);
    let (prefix, digits) = normalized.split_once('-').ok_or_else(invalid)?;
    let entity = EntityType::from_prefix(prefix).ok_or_else(invalid)?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let sequence = digits.parse::<u32>().map_err(|_| invalid())?;
    if sequence == 0 {
        return Err(invalid());
    }
    Ok((entity, sequence))
}
