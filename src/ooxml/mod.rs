//! Office Open XML (OOXML) format implementation.
//!
//! The module is organized into two layers:
//!
//! 1. **OPC Layer** (`opc`): part names, relationships, the content-type
//!    catalog and the part graph shared by every OOXML format
//! 2. **SpreadsheetML** (`xlsx`): workbook models, parsers, writers and
//!    the package editor
//!
//! # Example: Renaming a sheet
//!
//! ```rust,no_run
//! use longan::ooxml::xlsx::PackageEditor;
//!
//! let mut editor = PackageEditor::open("book.xlsx")?;
//! editor.rename_sheet("Sheet1", "Totals")?;
//! editor.save()?;
//! # Ok::<(), longan::ooxml::xlsx::PackageError>(())
//! ```
pub mod opc;
pub mod xlsx;

// Re-export commonly used types from OPC layer
pub use opc::{ContentTypes, PartGraph};
