//! Checks applied at the edit boundary.

use super::cell::CellRef;
use super::error::{PackageError, Result};

/// Longest sheet name Excel accepts, in UTF-16 code units.
pub const MAX_SHEET_NAME_LEN: usize = 31;

const FORBIDDEN: &[char] = &['[', ']', '\\', '/', '*', '?', ':'];

/// Whether `name` may be used as a worksheet name on its own.
pub fn is_valid_sheet_name(name: &str) -> bool {
    let len = name.encode_utf16().count();
    (1..=MAX_SHEET_NAME_LEN).contains(&len)
        && !name.contains(FORBIDDEN)
        && !name.starts_with('\'')
        && !name.ends_with('\'')
        && !name.eq_ignore_ascii_case("History")
}

/// Validate a new sheet name against the names already in the workbook.
/// The comparison is case-insensitive.
pub fn validate_sheet_name<'a, I>(name: &str, existing: I) -> Result<()>
where
    I: IntoIterator<Item = &'a str>,
{
    if !is_valid_sheet_name(name) {
        return Err(PackageError::validation(format!("invalid sheet name \"{name}\"")));
    }
    let folded = name.to_lowercase();
    if existing.into_iter().any(|n| n.to_lowercase() == folded) {
        return Err(PackageError::validation(format!("a sheet named \"{name}\" already exists")));
    }
    Ok(())
}

/// Whether `reference` is an A1-style reference inside the sheet grid.
pub fn is_valid_cell_ref(reference: &str) -> bool {
    CellRef::parse(reference).is_some()
}

/// Parse a reference or fail with a validation error.
pub fn parse_cell_ref(reference: &str) -> Result<CellRef> {
    CellRef::parse(reference)
        .ok_or_else(|| PackageError::validation(format!("invalid cell reference \"{reference}\"")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::xlsx::error::PackageErrorKind;

    #[test]
    fn test_sheet_names() {
        assert!(is_valid_sheet_name("Sheet1"));
        assert!(is_valid_sheet_name("Q1 'draft"));
        assert!(is_valid_sheet_name("数据"));
        assert!(is_valid_sheet_name(&"x".repeat(31)));
        assert!(!is_valid_sheet_name(&"x".repeat(32)));
        assert!(!is_valid_sheet_name(""));
        assert!(!is_valid_sheet_name("a/b"));
        assert!(!is_valid_sheet_name("a:b"));
        assert!(!is_valid_sheet_name("[x]"));
        assert!(!is_valid_sheet_name("'quoted"));
        assert!(!is_valid_sheet_name("quoted'"));
        assert!(!is_valid_sheet_name("history"));
    }

    #[test]
    fn test_duplicate_names_are_case_insensitive() {
        let existing = ["Data", "Summary"];
        assert!(validate_sheet_name("Other", existing).is_ok());
        let err = validate_sheet_name("DATA", existing).unwrap_err();
        assert_eq!(err.kind(), PackageErrorKind::Validation);
    }

    #[test]
    fn test_cell_refs() {
        assert!(is_valid_cell_ref("A1"));
        assert!(is_valid_cell_ref("XFD1048576"));
        assert!(!is_valid_cell_ref("XFE1"));
        assert!(!is_valid_cell_ref("A0"));
        assert!(parse_cell_ref("B").is_err());
    }
}
