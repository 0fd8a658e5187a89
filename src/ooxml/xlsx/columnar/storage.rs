//! Per-column, per-type cell maps.

use crate::ooxml::xlsx::model::worksheet::UsedRange;
use crate::ooxml::xlsx::options::Projection;
use std::collections::{BTreeMap, HashMap};
use std::mem::size_of;
use std::sync::Arc;

/// A formula cell as stored: the expression and its cached result text.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaCell {
    pub text: String,
    pub cached: Option<String>,
}

/// A value read out of [`ColumnarStorage`].
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnarValue {
    Number(f64),
    /// Index into the workbook's shared string table.
    SstIndex(u32),
    Bool(bool),
    /// Serial date.
    DateTime(f64),
    Formula(FormulaCell),
    Error(String),
}

impl ColumnarValue {
    pub fn as_number(&self) -> Option<f64> {
        match self {
            ColumnarValue::Number(n) | ColumnarValue::DateTime(n) => Some(*n),
            _ => None,
        }
    }
}

/// Rows of one column, keyed by 0-based row index.
pub type Column<T> = BTreeMap<u32, T>;

type Columns<T> = HashMap<u32, Column<T>>;

// Rough per-entry overhead of a B-tree slot plus its share of the node.
const NODE_OVERHEAD: usize = 16;

fn map_bytes<T>(columns: &Columns<T>) -> usize {
    columns
        .values()
        .map(|c| size_of::<Column<T>>() + size_of::<u32>() + c.len() * (size_of::<u32>() + size_of::<T>() + NODE_OVERHEAD))
        .sum()
}

fn remove_at<T>(columns: &mut Columns<T>, row: u32, col: u32) -> bool {
    let Some(column) = columns.get_mut(&col) else {
        return false;
    };
    let removed = column.remove(&row).is_some();
    if column.is_empty() {
        columns.remove(&col);
    }
    removed
}

/// Cell values of one worksheet, laid out column by column with one map
/// per value type.
///
/// Only the columnar parser writes to a storage; once loaded it is shared
/// read-only behind an [`Arc`].
#[derive(Debug, Default)]
pub struct ColumnarStorage {
    numbers: Columns<f64>,
    sst_indices: Columns<u32>,
    booleans: Columns<bool>,
    datetimes: Columns<f64>,
    formulas: Columns<FormulaCell>,
    errors: Columns<String>,
    projection: Arc<Projection>,
    first_row: u32,
    last_row: u32,
    first_col: u32,
    last_col: u32,
    cells: usize,
}

impl ColumnarStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// A storage that drops every value outside `projection`.
    pub fn with_projection(projection: Arc<Projection>) -> Self {
        Self {
            projection,
            ..Self::default()
        }
    }

    pub fn projection(&self) -> &Projection {
        &self.projection
    }

    /// Whether a value at (`row`, `col`) would be kept.
    #[inline]
    pub fn accepts(&self, row: u32, col: u32) -> bool {
        !self.projection.should_skip_column(col) && !self.projection.should_skip_row(row)
    }

    /// Store `value`, replacing whatever the cell held. Returns `false`
    /// when the projection drops the cell.
    pub fn set_value(&mut self, row: u32, col: u32, value: ColumnarValue) -> bool {
        if !self.accepts(row, col) {
            return false;
        }
        let replaced = self.clear(row, col);
        match value {
            ColumnarValue::Number(n) => {
                self.numbers.entry(col).or_default().insert(row, n);
            },
            ColumnarValue::SstIndex(i) => {
                self.sst_indices.entry(col).or_default().insert(row, i);
            },
            ColumnarValue::Bool(b) => {
                self.booleans.entry(col).or_default().insert(row, b);
            },
            ColumnarValue::DateTime(d) => {
                self.datetimes.entry(col).or_default().insert(row, d);
            },
            ColumnarValue::Formula(f) => {
                self.formulas.entry(col).or_default().insert(row, f);
            },
            ColumnarValue::Error(e) => {
                self.errors.entry(col).or_default().insert(row, e);
            },
        }
        if !replaced {
            self.grow_bounds(row, col);
            self.cells += 1;
        }
        true
    }

    fn clear(&mut self, row: u32, col: u32) -> bool {
        remove_at(&mut self.numbers, row, col)
            || remove_at(&mut self.sst_indices, row, col)
            || remove_at(&mut self.booleans, row, col)
            || remove_at(&mut self.datetimes, row, col)
            || remove_at(&mut self.formulas, row, col)
            || remove_at(&mut self.errors, row, col)
    }

    fn grow_bounds(&mut self, row: u32, col: u32) {
        if self.cells == 0 {
            (self.first_row, self.last_row, self.first_col, self.last_col) = (row, row, col, col);
            return;
        }
        self.first_row = self.first_row.min(row);
        self.last_row = self.last_row.max(row);
        self.first_col = self.first_col.min(col);
        self.last_col = self.last_col.max(col);
    }

    pub fn has_value(&self, row: u32, col: u32) -> bool {
        fn holds<T>(columns: &Columns<T>, row: u32, col: u32) -> bool {
            columns.get(&col).is_some_and(|c| c.contains_key(&row))
        }
        holds(&self.numbers, row, col)
            || holds(&self.sst_indices, row, col)
            || holds(&self.booleans, row, col)
            || holds(&self.datetimes, row, col)
            || holds(&self.formulas, row, col)
            || holds(&self.errors, row, col)
    }

    pub fn get_value(&self, row: u32, col: u32) -> Option<ColumnarValue> {
        fn at<T: Clone>(columns: &Columns<T>, row: u32, col: u32) -> Option<T> {
            columns.get(&col)?.get(&row).cloned()
        }
        at(&self.numbers, row, col)
            .map(ColumnarValue::Number)
            .or_else(|| at(&self.sst_indices, row, col).map(ColumnarValue::SstIndex))
            .or_else(|| at(&self.booleans, row, col).map(ColumnarValue::Bool))
            .or_else(|| at(&self.datetimes, row, col).map(ColumnarValue::DateTime))
            .or_else(|| at(&self.formulas, row, col).map(ColumnarValue::Formula))
            .or_else(|| at(&self.errors, row, col).map(ColumnarValue::Error))
    }

    /// Visit every value of `col` in ascending row order.
    pub fn for_each_in_column<F>(&self, col: u32, mut f: F)
    where
        F: FnMut(u32, ColumnarValue),
    {
        let mut merged: BTreeMap<u32, ColumnarValue> = BTreeMap::new();
        if let Some(c) = self.numbers.get(&col) {
            merged.extend(c.iter().map(|(&r, &v)| (r, ColumnarValue::Number(v))));
        }
        if let Some(c) = self.sst_indices.get(&col) {
            merged.extend(c.iter().map(|(&r, &v)| (r, ColumnarValue::SstIndex(v))));
        }
        if let Some(c) = self.booleans.get(&col) {
            merged.extend(c.iter().map(|(&r, &v)| (r, ColumnarValue::Bool(v))));
        }
        if let Some(c) = self.datetimes.get(&col) {
            merged.extend(c.iter().map(|(&r, &v)| (r, ColumnarValue::DateTime(v))));
        }
        if let Some(c) = self.formulas.get(&col) {
            merged.extend(c.iter().map(|(&r, v)| (r, ColumnarValue::Formula(v.clone()))));
        }
        if let Some(c) = self.errors.get(&col) {
            merged.extend(c.iter().map(|(&r, v)| (r, ColumnarValue::Error(v.clone()))));
        }
        for (row, value) in merged {
            f(row, value);
        }
    }

    pub fn numbers(&self, col: u32) -> Option<&Column<f64>> {
        self.numbers.get(&col)
    }

    pub fn sst_indices(&self, col: u32) -> Option<&Column<u32>> {
        self.sst_indices.get(&col)
    }

    pub fn booleans(&self, col: u32) -> Option<&Column<bool>> {
        self.booleans.get(&col)
    }

    pub fn datetimes(&self, col: u32) -> Option<&Column<f64>> {
        self.datetimes.get(&col)
    }

    pub fn formulas(&self, col: u32) -> Option<&Column<FormulaCell>> {
        self.formulas.get(&col)
    }

    pub fn errors(&self, col: u32) -> Option<&Column<String>> {
        self.errors.get(&col)
    }

    /// Columns holding at least one value, ascending.
    pub fn columns(&self) -> Vec<u32> {
        let mut cols: Vec<u32> = self
            .numbers
            .keys()
            .chain(self.sst_indices.keys())
            .chain(self.booleans.keys())
            .chain(self.datetimes.keys())
            .chain(self.formulas.keys())
            .chain(self.errors.keys())
            .copied()
            .collect();
        cols.sort_unstable();
        cols.dedup();
        cols
    }

    pub fn has_data(&self) -> bool {
        self.cells > 0
    }

    pub fn cell_count(&self) -> usize {
        self.cells
    }

    pub fn first_row(&self) -> Option<u32> {
        self.has_data().then_some(self.first_row)
    }

    pub fn last_row(&self) -> Option<u32> {
        self.has_data().then_some(self.last_row)
    }

    pub fn first_col(&self) -> Option<u32> {
        self.has_data().then_some(self.first_col)
    }

    pub fn last_col(&self) -> Option<u32> {
        self.has_data().then_some(self.last_col)
    }

    /// `(first_row, first_col, last_row, last_col)` of the stored cells.
    pub fn used_range(&self) -> Option<UsedRange> {
        self.has_data()
            .then_some((self.first_row, self.first_col, self.last_row, self.last_col))
    }

    /// Approximate heap bytes held by the value maps.
    pub fn memory_estimate(&self) -> usize {
        let strings: usize = self
            .formulas
            .values()
            .flat_map(|c| c.values())
            .map(|f| f.text.capacity() + f.cached.as_ref().map_or(0, String::capacity))
            .chain(self.errors.values().flat_map(|c| c.values()).map(String::capacity))
            .sum();
        size_of::<Self>()
            + map_bytes(&self.numbers)
            + map_bytes(&self.sst_indices)
            + map_bytes(&self.booleans)
            + map_bytes(&self.datetimes)
            + map_bytes(&self.formulas)
            + map_bytes(&self.errors)
            + strings
    }
}
