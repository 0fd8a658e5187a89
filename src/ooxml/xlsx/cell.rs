//! Cell coordinates, ranges and values.
//!
//! Coordinates are 0-based internally (`row`, `col`); A1-style references
//! are 1-based, as Excel writes them.

use std::fmt;
use std::str::FromStr;

/// Largest 0-based row index (row 1,048,576).
pub const MAX_ROW: u32 = 1_048_575;

/// Largest 0-based column index (column XFD).
pub const MAX_COL: u32 = 16_383;

/// A single cell position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
}

impl CellRef {
    /// A position inside the sheet grid, or `None` when out of bounds.
    pub fn new(row: u32, col: u32) -> Option<Self> {
        (row <= MAX_ROW && col <= MAX_COL).then_some(Self { row, col })
    }

    /// Parse an A1-style reference (`"B17"`, `"$B$17"`) into (row=16, col=1).
    pub fn parse(reference: &str) -> Option<Self> {
        let bytes = reference.as_bytes();
        let mut i = 0;
        if bytes.first() == Some(&b'$') {
            i += 1;
        }
        let letters_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        let col = column_index(&reference[letters_start..i])?;
        if bytes.get(i) == Some(&b'$') {
            i += 1;
        }
        let digits = &bytes[i..];
        if digits.is_empty() || !digits.iter().all(u8::is_ascii_digit) || digits[0] == b'0' {
            return None;
        }
        let row1 = atoi_simd::parse::<u32, false, false>(digits).ok()?;
        Self::new(row1.checked_sub(1)?, col)
    }

    /// Append the A1 form to `out` without allocating.
    pub fn write_a1(&self, out: &mut Vec<u8>) {
        write_column_letters(out, self.col);
        let mut fmt = itoa::Buffer::new();
        out.extend_from_slice(fmt.format(self.row + 1).as_bytes());
    }
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", column_letters(self.col), self.row + 1)
    }
}

impl FromStr for CellRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid cell reference: {s}"))
    }
}

/// An inclusive rectangle of cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: CellRef,
    pub end: CellRef,
}

impl CellRange {
    /// Parse `"A1:C10"` or a single reference `"B2"`. Corners are normalised
    /// so `start` is top-left.
    pub fn parse(range: &str) -> Option<Self> {
        let (a, b) = match range.split_once(':') {
            Some((a, b)) => (CellRef::parse(a)?, CellRef::parse(b)?),
            None => {
                let single = CellRef::parse(range)?;
                (single, single)
            },
        };
        Some(Self {
            start: CellRef {
                row: a.row.min(b.row),
                col: a.col.min(b.col),
            },
            end: CellRef {
                row: a.row.max(b.row),
                col: a.col.max(b.col),
            },
        })
    }

    pub fn contains(&self, cell: CellRef) -> bool {
        (self.start.row..=self.end.row).contains(&cell.row) && (self.start.col..=self.end.col).contains(&cell.col)
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}:{}", self.start, self.end)
        }
    }
}

/// Convert a 0-based column index to Excel letters (0 -> "A", 26 -> "AA").
pub fn column_letters(col: u32) -> String {
    let mut out = Vec::with_capacity(3);
    write_column_letters(&mut out, col);
    String::from_utf8(out).unwrap_or_default()
}

pub fn write_column_letters(out: &mut Vec<u8>, col: u32) {
    let mut buf = [0u8; 4];
    let mut n = col + 1;
    let mut i = buf.len();
    while n > 0 {
        n -= 1;
        i -= 1;
        buf[i] = b'A' + (n % 26) as u8;
        n /= 26;
    }
    out.extend_from_slice(&buf[i..]);
}

/// Convert Excel letters to a 0-based column index ("A" -> 0, "XFD" -> 16383).
pub fn column_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut col = 0u32;
    for b in letters.bytes() {
        if !b.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + u32::from(b.to_ascii_uppercase() - b'A' + 1);
    }
    (col - 1 <= MAX_COL).then(|| col - 1)
}

/// Stored value of a cell.
///
/// Strings live either in the shared string table (`SstIndex`) or inline.
/// Formulas point into the sheet's formula pool and carry the cached
/// numeric result (0.0 when the cached value is not numeric).
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CellValue {
    Number(f64),
    SstIndex(u32),
    Inline(String),
    Bool(bool),
    Formula { index: u32, result: f64 },
    Error(String),
    #[default]
    Empty,
}

impl CellValue {
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }
}

/// A value as seen from the public API: strings are resolved, formulas
/// are text.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Number(f64),
    Bool(bool),
    Formula {
        formula: String,
        /// Cached result as written in the part, if any
        cached: Option<String>,
    },
    Error(String),
    Empty,
}

impl Value {
    /// A formula without a cached result. The leading `=` is optional.
    pub fn formula(text: &str) -> Self {
        Value::Formula {
            formula: text.strip_prefix('=').unwrap_or(text).to_string(),
            cached: None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}
