//! Row-wise worksheet model.

use crate::ooxml::xlsx::cell::{CellRef, CellValue};
use std::collections::BTreeMap;

/// A stored cell.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Cell {
    pub value: CellValue,
    /// `cellXfs` index.
    pub style: Option<u32>,
    /// The style renders the number as a date.
    pub is_date: bool,
    /// Attributes this model does not interpret (`cm`, `vm`, `ph`), unescaped.
    pub extra: Vec<(String, String)>,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }
}

/// Attributes of a `<row>`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RowProps {
    pub height: Option<f64>,
    pub custom_height: bool,
    pub hidden: bool,
    /// Row format; written with `customFormat="1"`.
    pub style: Option<u32>,
    pub outline_level: u8,
    pub collapsed: bool,
    pub extra: Vec<(String, String)>,
}

impl RowProps {
    pub fn is_default(&self) -> bool {
        *self == RowProps::default()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    pub props: RowProps,
    pub cells: BTreeMap<u32, Cell>,
}

/// A `<col>` definition. `min` and `max` are 1-based and inclusive, as in
/// the part.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ColumnDef {
    pub min: u32,
    pub max: u32,
    pub width: Option<f64>,
    pub style: Option<u32>,
    pub hidden: bool,
    pub custom_width: bool,
    pub outline_level: u8,
    pub extra: Vec<(String, String)>,
}

impl ColumnDef {
    #[inline]
    fn covers(&self, col: u32) -> bool {
        (self.min..=self.max).contains(&(col + 1))
    }
}

/// A formula as found in `<f>`, with the cell's cached result.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormulaEntry {
    pub text: String,
    /// `<f>` attributes (`t`, `ref`, `si`, `ca`, ...), unescaped.
    pub attrs: Vec<(String, String)>,
    /// Text of `<v>`.
    pub cached: Option<String>,
    /// The cell's `t` attribute (`str`, `b`, `e`); `None` for numbers.
    pub value_type: Option<String>,
}

impl FormulaEntry {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Self::default()
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter().find(|(k, _)| k == name).map(|(_, v)| v.as_str())
    }

    /// Master of a shared formula group: `t="shared"` with a `ref`.
    pub fn is_shared_master(&self) -> bool {
        self.attr("t") == Some("shared") && self.attr("ref").is_some()
    }

    /// The value a dependent cell falls back to once its formula is gone.
    fn cached_value(&self) -> CellValue {
        let Some(cached) = self.cached.as_deref() else {
            return CellValue::Empty;
        };
        match self.value_type.as_deref() {
            Some("str") | Some("inlineStr") => CellValue::Inline(cached.to_string()),
            Some("b") => CellValue::Bool(cached == "1"),
            Some("e") => CellValue::Error(cached.to_string()),
            _ => fast_float2::parse::<f64, _>(cached).map_or(CellValue::Empty, CellValue::Number),
        }
    }
}

/// Formulas of one sheet; cells refer to entries by index.
#[derive(Debug, Clone, Default)]
pub struct FormulaPool {
    entries: Vec<FormulaEntry>,
}

impl FormulaPool {
    pub fn push(&mut self, entry: FormulaEntry) -> u32 {
        self.entries.push(entry);
        (self.entries.len() - 1) as u32
    }

    pub fn get(&self, index: u32) -> Option<&FormulaEntry> {
        self.entries.get(index as usize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FormulaEntry> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FormulaEntry> {
        self.entries.iter_mut()
    }
}

/// Used range as `(first_row, first_col, last_row, last_col)`, 0-based.
pub type UsedRange = (u32, u32, u32, u32);

#[derive(Debug, Clone, Default)]
pub struct Worksheet {
    rows: BTreeMap<u32, Row>,
    cols: Vec<ColumnDef>,
    formulas: FormulaPool,
    /// Relationship id the `<drawing>` element must point to.
    drawing_rel: Option<String>,
    cells: usize,
    cols_changed: bool,
    modified: bool,
}

impl Worksheet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn from_parts(rows: BTreeMap<u32, Row>, cols: Vec<ColumnDef>, formulas: FormulaPool) -> Self {
        let cells = rows.values().map(|r| r.cells.len()).sum();
        Self {
            rows,
            cols,
            formulas,
            cells,
            ..Self::default()
        }
    }

    /// The `<drawing>` relationship found in the source part.
    pub(crate) fn with_drawing_rel(mut self, rel_id: Option<String>) -> Self {
        self.drawing_rel = rel_id;
        self
    }

    pub fn get(&self, cell: CellRef) -> Option<&Cell> {
        self.rows.get(&cell.row).and_then(|r| r.cells.get(&cell.col))
    }

    pub fn rows(&self) -> impl Iterator<Item = (u32, &Row)> {
        self.rows.iter().map(|(&r, row)| (r, row))
    }

    pub fn row(&self, row: u32) -> Option<&Row> {
        self.rows.get(&row)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn cell_count(&self) -> usize {
        self.cells
    }

    pub fn cols(&self) -> &[ColumnDef] {
        &self.cols
    }

    pub fn formulas(&self) -> &FormulaPool {
        &self.formulas
    }

    pub fn formula(&self, index: u32) -> Option<&FormulaEntry> {
        self.formulas.get(index)
    }

    pub fn add_formula(&mut self, entry: FormulaEntry) -> u32 {
        self.formulas.push(entry)
    }

    /// Store a value, keeping the cell's style. Overwriting the master of a
    /// shared formula turns the other cells of its group into their cached
    /// values; the number of such cells is returned.
    pub fn set_value(&mut self, at: CellRef, value: CellValue) -> usize {
        let detached = match self.get(at).map(|c| &c.value) {
            Some(CellValue::Formula { index, .. }) => self.detach_shared_group(at, *index),
            _ => 0,
        };
        let row = self.rows.entry(at.row).or_default();
        match row.cells.get_mut(&at.col) {
            Some(cell) => {
                cell.value = value;
                cell.is_date = false;
            },
            None => {
                row.cells.insert(at.col, Cell::new(value));
                self.cells += 1;
            },
        }
        self.modified = true;
        detached
    }

    /// Assign a `cellXfs` index to a cell, creating it empty if needed.
    pub fn set_style(&mut self, at: CellRef, style: Option<u32>) {
        let row = self.rows.entry(at.row).or_default();
        match row.cells.get_mut(&at.col) {
            Some(cell) => cell.style = style,
            None => {
                row.cells.insert(
                    at.col,
                    Cell {
                        style,
                        ..Cell::default()
                    },
                );
                self.cells += 1;
            },
        }
        self.modified = true;
    }

    fn detach_shared_group(&mut self, master: CellRef, index: u32) -> usize {
        let Some(entry) = self.formulas.get(index).filter(|e| e.is_shared_master()) else {
            return 0;
        };
        let Some(si) = entry.attr("si").map(str::to_string) else {
            return 0;
        };
        let mut detached = 0;
        for (&r, row) in self.rows.iter_mut() {
            for (&c, cell) in row.cells.iter_mut() {
                if (CellRef { row: r, col: c }) == master {
                    continue;
                }
                let CellValue::Formula { index: dep, .. } = cell.value else {
                    continue;
                };
                let Some(dep_entry) = self.formulas.get(dep) else {
                    continue;
                };
                if dep_entry.attr("t") == Some("shared") && dep_entry.attr("si") == Some(si.as_str()) {
                    cell.value = dep_entry.cached_value();
                    detached += 1;
                }
            }
        }
        detached
    }

    /// `(first_row, first_col, last_row, last_col)` over cells holding a
    /// value or a style; `None` for an empty sheet.
    pub fn used_range(&self) -> Option<UsedRange> {
        let mut range: Option<UsedRange> = None;
        for (&r, row) in &self.rows {
            let (Some((&first, _)), Some((&last, _))) = (row.cells.first_key_value(), row.cells.last_key_value())
            else {
                continue;
            };
            range = Some(match range {
                None => (r, first, r, last),
                Some((r0, c0, _, c1)) => (r0, c0.min(first), r, c1.max(last)),
            });
        }
        range
    }

    /// Format of a row, if one was assigned.
    pub fn row_format(&self, row: u32) -> Option<u32> {
        self.rows.get(&row).and_then(|r| r.props.style)
    }

    pub fn set_row_format(&mut self, row: u32, style: Option<u32>) {
        self.rows.entry(row).or_default().props.style = style;
        self.modified = true;
    }

    pub fn row_props_mut(&mut self, row: u32) -> &mut RowProps {
        self.modified = true;
        &mut self.rows.entry(row).or_default().props
    }

    /// Format of a column, if a `<col>` covering it assigns one.
    pub fn column_format(&self, col: u32) -> Option<u32> {
        self.cols.iter().find(|d| d.covers(col)).and_then(|d| d.style)
    }

    /// Assign a format to one column, splitting a `<col>` range if needed.
    pub fn set_column_format(&mut self, col: u32, style: Option<u32>) {
        let one_based = col + 1;
        match self.cols.iter().position(|d| d.covers(col)) {
            Some(i) => {
                let def = self.cols.remove(i);
                let mut pieces = Vec::with_capacity(3);
                if def.min < one_based {
                    pieces.push(ColumnDef {
                        max: one_based - 1,
                        ..def.clone()
                    });
                }
                pieces.push(ColumnDef {
                    min: one_based,
                    max: one_based,
                    style,
                    ..def.clone()
                });
                if def.max > one_based {
                    pieces.push(ColumnDef {
                        min: one_based + 1,
                        ..def
                    });
                }
                for (offset, piece) in pieces.into_iter().enumerate() {
                    self.cols.insert(i + offset, piece);
                }
            },
            None => {
                let at = self.cols.iter().position(|d| d.min > one_based).unwrap_or(self.cols.len());
                self.cols.insert(
                    at,
                    ColumnDef {
                        min: one_based,
                        max: one_based,
                        style,
                        ..ColumnDef::default()
                    },
                );
            },
        }
        self.cols_changed = true;
        self.modified = true;
    }

    pub fn drawing_rel(&self) -> Option<&str> {
        self.drawing_rel.as_deref()
    }

    pub fn set_drawing_rel(&mut self, rel_id: &str) {
        self.drawing_rel = Some(rel_id.to_string());
        self.modified = true;
    }

    pub fn cols_changed(&self) -> bool {
        self.cols_changed
    }

    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub fn clear_modified(&mut self) {
        self.modified = false;
        self.cols_changed = false;
    }

    /// Rough heap footprint, used to pick the output mode.
    pub fn memory_estimate(&self) -> usize {
        const PER_CELL: usize = std::mem::size_of::<Cell>() + 16;
        const PER_ROW: usize = std::mem::size_of::<Row>() + 16;
        self.cells * PER_CELL + self.rows.len() * PER_ROW
    }

    /// Rewrite sheet references in every formula. Returns how many changed.
    pub fn rename_sheet_references(&mut self, old: &str, new: &str) -> usize {
        let mut changed = 0;
        for entry in self.formulas.iter_mut() {
            if let Some(text) = super::workbook::rename_sheet_in_formula(&entry.text, old, new) {
                entry.text = text;
                changed += 1;
            }
        }
        if changed > 0 {
            self.modified = true;
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(r: &str) -> CellRef {
        CellRef::parse(r).unwrap()
    }

    #[test]
    fn test_set_keeps_style_and_counts_cells() {
        let mut ws = Worksheet::new();
        ws.set_style(at("B2"), Some(3));
        ws.set_value(at("B2"), CellValue::Number(1.5));
        ws.set_value(at("C5"), CellValue::Bool(true));
        assert_eq!(ws.cell_count(), 2);
        let cell = ws.get(at("B2")).unwrap();
        assert_eq!(cell.style, Some(3));
        assert_eq!(cell.value, CellValue::Number(1.5));
        assert_eq!(ws.used_range(), Some((1, 1, 4, 2)));
        assert!(ws.is_modified());
    }

    #[test]
    fn test_column_format_splits_ranges() {
        let mut ws = Worksheet::new();
        ws.set_column_format(0, Some(1));
        assert_eq!(ws.column_format(0), Some(1));
        let mut ws = Worksheet::from_parts(
            BTreeMap::new(),
            vec![ColumnDef {
                min: 1,
                max: 5,
                width: Some(12.0),
                custom_width: true,
                ..ColumnDef::default()
            }],
            FormulaPool::default(),
        );
        ws.set_column_format(2, Some(7));
        let spans: Vec<(u32, u32, Option<u32>)> = ws.cols().iter().map(|d| (d.min, d.max, d.style)).collect();
        assert_eq!(spans, vec![(1, 2, None), (3, 3, Some(7)), (4, 5, None)]);
        assert!(ws.cols().iter().all(|d| d.width == Some(12.0)));
        assert_eq!(ws.column_format(2), Some(7));
        assert_eq!(ws.column_format(3), None);
    }

    #[test]
    fn test_overwriting_shared_master_detaches_group() {
        let mut ws = Worksheet::new();
        let master = ws.add_formula(FormulaEntry {
            text: "A1*2".into(),
            attrs: vec![
                ("t".into(), "shared".into()),
                ("ref".into(), "B1:B2".into()),
                ("si".into(), "0".into()),
            ],
            cached: Some("2".into()),
            value_type: None,
        });
        let child = ws.add_formula(FormulaEntry {
            text: String::new(),
            attrs: vec![("t".into(), "shared".into()), ("si".into(), "0".into())],
            cached: Some("4".into()),
            value_type: None,
        });
        ws.set_value(at("B1"), CellValue::Formula { index: master, result: 2.0 });
        ws.set_value(at("B2"), CellValue::Formula { index: child, result: 4.0 });
        assert_eq!(ws.set_value(at("B1"), CellValue::Number(9.0)), 1);
        assert_eq!(ws.get(at("B2")).unwrap().value, CellValue::Number(4.0));
    }

    #[test]
    fn test_row_format() {
        let mut ws = Worksheet::new();
        assert_eq!(ws.row_format(4), None);
        ws.set_row_format(4, Some(2));
        assert_eq!(ws.row_format(4), Some(2));
    }
}
