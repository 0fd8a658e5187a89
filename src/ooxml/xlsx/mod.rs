//! SpreadsheetML (.xlsx) packages.
//!
//! The entry point is [`PackageEditor`], which opens an existing package
//! (or creates a new one), applies cell, format, sheet, image and
//! property edits, and writes the result back while copying every part it
//! did not touch byte for byte. [`columnar::ColumnarWorkbook`] is the
//! read-only counterpart for scanning large workbooks column by column.
//!
//! # Layout
//!
//! - [`cell`]: references, ranges and cell values
//! - [`model`]: in-memory models of the parts the editor changes
//! - [`parsers`] / [`writer`]: SAX parsers and serializers for those parts
//! - [`dirty`]: change tracking and commit strategy selection
//! - [`editor`]: the package editor and its commit pipeline
//! - [`columnar`]: per-column typed storage for read workloads
//!
//! # Example
//!
//! ```rust,no_run
//! use longan::ooxml::xlsx::{PackageEditor, Value};
//!
//! let mut editor = PackageEditor::create()?;
//! editor.add_sheet("Sheet1")?;
//! editor.set_cell("Sheet1", "A1", "Hello")?;
//! editor.set_cell("Sheet1", "B1", 42.0)?;
//! editor.set_cell("Sheet1", "C1", Value::formula("B1*2"))?;
//! editor.commit("out.xlsx")?;
//! # Ok::<(), longan::ooxml::xlsx::PackageError>(())
//! ```

pub mod cell;
#[cfg(feature = "columnar")]
pub mod columnar;
pub mod dirty;
pub mod editor;
pub mod error;
pub mod model;
pub mod number_format;
pub mod options;
pub mod parsers;
pub mod validate;
pub mod writer;

pub use cell::{CellRange, CellRef, CellValue, Value};
#[cfg(feature = "columnar")]
pub use columnar::{ColumnarStorage, ColumnarValue, ColumnarWorkbook, WorkbookStats};
pub use dirty::{CommitStrategy, DirtyLevel, DirtyManager};
pub use editor::{CommitReport, PackageEditor};
pub use error::{PackageError, PackageErrorKind, Result};
pub use model::{
    AppProperties, CellBorder, CellBorderLineStyle, CellBorderSide, CellFill, CellFillPatternType, CellFont,
    CellFormat, CoreProperties, DefinedName, DocProps, SheetState,
};
pub use options::{Mode, Projection, WorkbookOptions};
