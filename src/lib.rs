//! Longan - read, edit and repack SpreadsheetML (.xlsx) packages
//!
//! This library opens an `.xlsx` archive, edits the parts it models and
//! writes a new archive in which every untouched part is copied byte for
//! byte, so charts, pivot tables, macros and extensions it knows nothing
//! about survive the edit.
//!
//! # Features
//!
//! - **Lazy editing**: parts are parsed only when an edit or a lookup needs them
//! - **Minimal rewrites**: edited parts are spliced into their source bytes,
//!   unchanged parts are copied still compressed
//! - **Atomic save**: the output is written to a temporary file and renamed
//! - **Columnar reads**: whole sheets into per-column typed maps, with
//!   column and row projection applied while parsing
//! - **Streaming output**: large worksheets are written row by row
//!
//! # Example - Editing a workbook
//!
//! ```no_run
//! use longan::ooxml::xlsx::{PackageEditor, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut editor = PackageEditor::open("report.xlsx")?;
//! editor.set_cell("Data", "A1", "Revenue")?;
//! editor.set_cell("Data", "B1", 1250.5)?;
//! editor.set_cell("Data", "C1", Value::formula("B1*1.2"))?;
//! editor.add_image("Data", "E2:H12", &std::fs::read("chart.png")?, "image/png")?;
//! let report = editor.commit("report-edited.xlsx")?;
//! println!("strategy: {:?}", report.strategy);
//! # Ok(())
//! # }
//! ```
//!
//! # Example - Scanning a large workbook
//!
//! ```no_run
//! use longan::ooxml::xlsx::{ColumnarWorkbook, WorkbookOptions};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = WorkbookOptions::new().with_projected_columns([1]);
//! let book = ColumnarWorkbook::open("large.xlsx", &options)?;
//! for name in book.sheet_names() {
//!     if let Some(sheet) = book.sheet(name) {
//!         println!("{name}: {} cells", sheet.cell_count());
//!     }
//! }
//! # Ok(())
//! # }
//! ```

/// Format-independent building blocks
///
/// The SAX reader, DOM, writer and splice helpers every part parser and
/// serializer is built on.
pub mod common;

/// OOXML (Office Open XML) packages
///
/// The OPC part graph and the SpreadsheetML editor.
pub mod ooxml;

pub use longan_zip::{Diagnostics, LogSink, MemorySink, SharedDiagnostics};
pub use ooxml::xlsx::{PackageEditor, PackageError, Result, WorkbookOptions};
