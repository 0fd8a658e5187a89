//! Read-optimised loading of whole workbooks.
//!
//! [`ColumnarWorkbook`] parses every worksheet once into a
//! [`ColumnarStorage`], keeping only the columns and leading rows the
//! options' projection asks for. The stores are immutable afterwards and
//! handed out as [`Arc`]s, so several readers can scan them concurrently.
//!
//! ```rust,no_run
//! use longan::ooxml::xlsx::WorkbookOptions;
//! use longan::ooxml::xlsx::columnar::ColumnarWorkbook;
//!
//! let options = WorkbookOptions::new().with_projected_columns([0, 3]).with_max_rows(500);
//! let book = ColumnarWorkbook::open("big.xlsx", &options)?;
//! if let Some(sheet) = book.sheet("Data") {
//!     let total: f64 = sheet.numbers(3).map(|c| c.values().sum()).unwrap_or(0.0);
//!     println!("{total}");
//! }
//! # Ok::<(), longan::ooxml::xlsx::PackageError>(())
//! ```

mod parser;
mod storage;

pub use parser::{parse_columnar, parse_columnar_chunked};
pub use storage::{Column, ColumnarStorage, ColumnarValue, FormulaCell};

use crate::ooxml::opc::constants::relationship_type;
use crate::ooxml::opc::{OpcError, PartGraph};
use crate::ooxml::xlsx::editor::source::Source;
use crate::ooxml::xlsx::editor::{target_of, workbook_part};
use crate::ooxml::xlsx::error::{PackageError, Result};
use crate::ooxml::xlsx::model::SharedStringTable;
use crate::ooxml::xlsx::options::WorkbookOptions;
use crate::ooxml::xlsx::parsers::{parse_shared_strings_chunked, parse_styles, parse_workbook};
use longan_zip::{SharedDiagnostics, diag::default_sink};
use std::path::Path;
use std::sync::Arc;

/// Totals over the loaded sheets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorkbookStats {
    pub sheet_count: usize,
    pub cell_count: usize,
    /// Approximate bytes held by the column maps.
    pub memory_estimate: usize,
}

/// A workbook loaded into per-sheet column stores.
#[derive(Debug)]
pub struct ColumnarWorkbook {
    sheets: Vec<(String, Arc<ColumnarStorage>)>,
    strings: Arc<SharedStringTable>,
}

impl ColumnarWorkbook {
    pub fn open(path: impl AsRef<Path>, options: &WorkbookOptions) -> Result<Self> {
        Self::open_with(path, options, default_sink())
    }

    /// Load every worksheet of the package at `path`. A worksheet that
    /// fails to parse is reported to `diagnostics` and left out.
    pub fn open_with(path: impl AsRef<Path>, options: &WorkbookOptions, diagnostics: SharedDiagnostics) -> Result<Self> {
        let source = Source::open(path.as_ref(), diagnostics.clone())?;
        let parsed = PartGraph::from_reader(source.reader())?;
        for warning in &parsed.warnings {
            diagnostics.warn(warning);
        }
        let graph = parsed.value;

        let workbook_path = workbook_part(&graph).ok_or_else(|| OpcError::PartNotFound("xl/workbook.xml".to_string()))?;
        let workbook = {
            let rels = graph.rels(&workbook_path);
            let resolve = |id: &str| {
                rels.and_then(|r| r.get(id))
                    .and_then(|r| r.target_part(&workbook_path))
            };
            let parsed = parse_workbook(&source.extract(&workbook_path)?, &resolve)
                .map_err(|e| PackageError::xml(workbook_path.as_str(), e))?;
            source.warn_all(&workbook_path, parsed.warnings);
            parsed.value
        };

        let mut strings = match target_of(&graph, &workbook_path, relationship_type::SHARED_STRINGS) {
            Some(part) => source.parse_streamed(&part, |feed| parse_shared_strings_chunked(feed))?,
            None => SharedStringTable::new(),
        };
        let date_flags = match target_of(&graph, &workbook_path, relationship_type::STYLES) {
            Some(part) => {
                let parsed = parse_styles(&source.extract(&part)?).map_err(|e| PackageError::xml(part.as_str(), e))?;
                source.warn_all(&part, parsed.warnings);
                parsed.value.date_style_flags()
            },
            None => Vec::new(),
        };

        let projection = options.projection().shared();
        let mut sheets = Vec::with_capacity(workbook.sheets.len());
        for info in &workbook.sheets {
            if !source.contains(&info.worksheet_path) {
                diagnostics.warn(&format!("sheet \"{}\": part {} is missing", info.name, info.worksheet_path));
                continue;
            }
            let checkpoint = strings.checkpoint();
            let loaded = source.parse_streamed(&info.worksheet_path, |feed| {
                parse_columnar_chunked(projection.clone(), &mut strings, &date_flags, feed)
            });
            match loaded {
                Ok(storage) => sheets.push((info.name.clone(), Arc::new(storage))),
                Err(e) => {
                    // strings interned before the failure belong to no sheet
                    strings.rollback(checkpoint);
                    diagnostics.warn(&format!("sheet \"{}\" skipped: {e}", info.name));
                },
            }
        }
        source.close();

        let book = Self {
            sheets,
            strings: Arc::new(strings),
        };
        let stats = book.stats();
        log::debug!(
            "loaded {} sheets, {} cells, ~{} bytes from {}",
            stats.sheet_count,
            stats.cell_count,
            stats.memory_estimate,
            path.as_ref().display()
        );
        Ok(book)
    }

    /// Names of the loaded sheets in workbook order.
    pub fn sheet_names(&self) -> impl Iterator<Item = &str> {
        self.sheets.iter().map(|(name, _)| name.as_str())
    }

    pub fn sheet(&self, name: &str) -> Option<Arc<ColumnarStorage>> {
        self.sheets
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, storage)| Arc::clone(storage))
    }

    pub fn sheet_at(&self, index: usize) -> Option<Arc<ColumnarStorage>> {
        self.sheets.get(index).map(|(_, storage)| Arc::clone(storage))
    }

    /// The shared string table, including strings interned from inline
    /// cells during the load.
    pub fn shared_strings(&self) -> Arc<SharedStringTable> {
        Arc::clone(&self.strings)
    }

    /// Text of a [`ColumnarValue::SstIndex`].
    pub fn string(&self, index: u32) -> Option<&str> {
        self.strings.get(index)
    }

    pub fn stats(&self) -> WorkbookStats {
        WorkbookStats {
            sheet_count: self.sheets.len(),
            cell_count: self.sheets.iter().map(|(_, s)| s.cell_count()).sum(),
            memory_estimate: self.sheets.iter().map(|(_, s)| s.memory_estimate()).sum(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::xlsx::PackageEditor;
    use crate::ooxml::xlsx::error::PackageErrorKind;
    use longan_zip::MemorySink;
    use proptest::prelude::*;
    use std::fs::File;
    use std::io::{Read, Write};
    use std::path::PathBuf;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    /// A `Grid` sheet of `rows` x `cols` numbers (`row * 100 + col`) and a
    /// `Notes` sheet with a few strings.
    fn grid(dir: &Path, rows: u32, cols: u32) -> PathBuf {
        let path = dir.join("grid.xlsx");
        let mut editor = PackageEditor::create().unwrap();
        editor.add_sheet("Grid").unwrap();
        editor.add_sheet("Notes").unwrap();
        for row in 0..rows {
            for col in 0..cols {
                editor
                    .set_cell_at("Grid", row, col, f64::from(row * 100 + col))
                    .unwrap();
            }
        }
        editor.set_cell("Notes", "A1", "first").unwrap();
        editor.set_cell("Notes", "B2", "second").unwrap();
        editor.set_cell("Notes", "C3", true).unwrap();
        editor.commit(&path).unwrap();
        path
    }

    /// Copy of `src` with `member` replaced by `data`.
    fn replace_member(src: &Path, dst: &Path, member: &str, data: &[u8]) {
        let mut archive = zip::ZipArchive::new(File::open(src).unwrap()).unwrap();
        let mut writer = zip::ZipWriter::new(File::create(dst).unwrap());
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i).unwrap();
            let name = entry.name().to_string();
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes).unwrap();
            writer.start_file(name.as_str(), SimpleFileOptions::default()).unwrap();
            writer
                .write_all(if name == member { data } else { &bytes })
                .unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn test_load_all() {
        let dir = TempDir::new().unwrap();
        let book = ColumnarWorkbook::open(grid(dir.path(), 20, 4), &WorkbookOptions::default()).unwrap();
        assert_eq!(book.sheet_names().collect::<Vec<_>>(), ["Grid", "Notes"]);

        let grid = book.sheet("Grid").unwrap();
        assert_eq!(grid.cell_count(), 80);
        assert_eq!(grid.get_value(7, 3), Some(ColumnarValue::Number(703.0)));
        assert_eq!(grid.used_range(), Some((0, 0, 19, 3)));

        let notes = book.sheet_at(1).unwrap();
        let Some(ColumnarValue::SstIndex(i)) = notes.get_value(1, 1) else {
            panic!("B2 is not a string");
        };
        assert_eq!(book.string(i), Some("second"));
        assert_eq!(notes.get_value(2, 2), Some(ColumnarValue::Bool(true)));

        let stats = book.stats();
        assert_eq!(stats.sheet_count, 2);
        assert_eq!(stats.cell_count, 83);
        assert!(stats.memory_estimate > 0);
        assert!(book.sheet("Missing").is_none());
    }

    #[test]
    fn test_projection_limits_columns_and_rows() {
        let dir = TempDir::new().unwrap();
        let options = WorkbookOptions::new()
            .with_projected_columns([2, 5])
            .with_max_rows(100);
        let book = ColumnarWorkbook::open(grid(dir.path(), 1000, 10), &options).unwrap();
        let grid = book.sheet("Grid").unwrap();
        assert_eq!(grid.columns(), vec![2, 5]);
        assert!(grid.last_row().unwrap() <= 99);
        assert_eq!(grid.cell_count(), 200);
        assert_eq!(grid.get_value(99, 5), Some(ColumnarValue::Number(9905.0)));
        assert!(!grid.has_value(0, 0));
    }

    #[test]
    fn test_shared_handles() {
        let dir = TempDir::new().unwrap();
        let book = ColumnarWorkbook::open(grid(dir.path(), 50, 3), &WorkbookOptions::default()).unwrap();
        let grid = book.sheet("Grid").unwrap();
        let handles: Vec<_> = (0..3)
            .map(|col| {
                let sheet = Arc::clone(&grid);
                std::thread::spawn(move || sheet.numbers(col).map(|c| c.values().sum::<f64>()).unwrap_or(0.0))
            })
            .collect();
        let sums: Vec<f64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        let rows: f64 = (0..50).map(|r| f64::from(r * 100)).sum();
        assert_eq!(sums, vec![rows, rows + 50.0, rows + 100.0]);
    }

    #[test]
    fn test_broken_sheet_is_skipped() {
        let dir = TempDir::new().unwrap();
        let good = grid(dir.path(), 5, 2);
        let broken = dir.path().join("broken.xlsx");
        replace_member(&good, &broken, "xl/worksheets/sheet2.xml", b"<worksheet><sheetData><row>");

        let sink = MemorySink::new();
        let book = ColumnarWorkbook::open_with(&broken, &WorkbookOptions::default(), sink.shared()).unwrap();
        assert_eq!(book.sheet_names().collect::<Vec<_>>(), ["Grid"]);
        assert!(sink.warnings().iter().any(|w| w.contains("Notes")));
    }

    #[test]
    fn test_broken_sheet_leaves_no_strings() {
        let dir = TempDir::new().unwrap();
        let good = grid(dir.path(), 5, 2);
        let broken = dir.path().join("broken.xlsx");
        replace_member(
            &good,
            &broken,
            "xl/worksheets/sheet2.xml",
            br#"<worksheet><sheetData><row r="1"><c r="A1" t="inlineStr"><is><t>orphan</t></is></c></row><row r="2">"#,
        );

        let expected = ColumnarWorkbook::open(&good, &WorkbookOptions::default()).unwrap();
        let book = ColumnarWorkbook::open_with(&broken, &WorkbookOptions::default(), MemorySink::new().shared()).unwrap();
        let strings = book.shared_strings();
        assert_eq!(strings.len(), expected.shared_strings().len());
        assert_eq!(strings.position("orphan"), None);
        assert!(strings.iter().all(|s| s != "orphan"));
    }

    #[test]
    fn test_workbook_found_without_package_relationship() {
        let dir = TempDir::new().unwrap();
        let good = grid(dir.path(), 3, 2);
        let unrelated = dir.path().join("unrelated.xlsx");
        replace_member(
            &good,
            &unrelated,
            "_rels/.rels",
            br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"></Relationships>"#,
        );

        let book = ColumnarWorkbook::open(&unrelated, &WorkbookOptions::default()).unwrap();
        assert_eq!(book.sheet_names().collect::<Vec<_>>(), ["Grid", "Notes"]);
        assert_eq!(book.sheet("Grid").unwrap().get_value(2, 1), Some(ColumnarValue::Number(201.0)));
    }

    #[test]
    fn test_open_missing_file() {
        let err = ColumnarWorkbook::open("/no/such/book.xlsx", &WorkbookOptions::default()).unwrap_err();
        assert_eq!(err.kind(), PackageErrorKind::FileNotFound);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(8))]

        #[test]
        fn prop_projection_keeps_only_requested_columns(columns in prop::collection::btree_set(0u32..6, 1..4)) {
            let dir = TempDir::new().unwrap();
            let path = grid(dir.path(), 10, 6);
            let options = WorkbookOptions::new().with_projected_columns(columns.iter().copied());
            let book = ColumnarWorkbook::open(path, &options).unwrap();
            let grid = book.sheet("Grid").unwrap();
            prop_assert_eq!(grid.columns(), columns.iter().copied().collect::<Vec<_>>());
            prop_assert_eq!(grid.cell_count(), columns.len() * 10);
        }
    }
}
