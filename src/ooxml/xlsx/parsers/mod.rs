//! Streaming parsers for the SpreadsheetML parts the editor models.

pub mod doc_props;
pub mod shared_strings;
pub mod styles;
pub mod workbook;
pub mod worksheet;

pub use doc_props::{parse_app_properties, parse_core_properties};
pub use shared_strings::{parse_shared_strings, parse_shared_strings_chunked};
pub use styles::parse_styles;
pub use workbook::parse_workbook;
pub use worksheet::{parse_worksheet, parse_worksheet_chunked};

use memchr::memchr;

/// Whether the document element carries a namespace prefix.
pub(crate) fn root_is_prefixed(input: &[u8]) -> bool {
    let mut rest = input;
    while let Some(lt) = memchr(b'<', rest) {
        rest = &rest[lt + 1..];
        match rest.first() {
            Some(b'?') | Some(b'!') => continue,
            Some(_) => {
                let end = rest
                    .iter()
                    .position(|b| b.is_ascii_whitespace() || *b == b'>' || *b == b'/')
                    .unwrap_or(rest.len());
                return rest[..end].contains(&b':');
            },
            None => return false,
        }
    }
    false
}
