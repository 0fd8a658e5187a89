//! In-memory models of the workbook parts that the editor changes.

pub mod doc_props;
pub mod format;
pub mod shared_strings;
pub mod styles;
pub mod workbook;
pub mod worksheet;

pub use doc_props::{AppProperties, CoreProperties, DocProps};
pub use format::{
    CellBorder, CellBorderLineStyle, CellBorderSide, CellFill, CellFillPatternType, CellFont, CellFormat,
};
pub use shared_strings::{SharedStringTable, StringsCheckpoint};
pub use styles::{StyleTable, XfRecord};
pub use workbook::{DefinedName, SheetState, Workbook, WorksheetInfo};
pub use worksheet::{Cell, ColumnDef, FormulaEntry, Row, RowProps, Worksheet};
