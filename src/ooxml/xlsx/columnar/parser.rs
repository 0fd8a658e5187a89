//! Worksheet parts straight into a [`ColumnarStorage`].
//!
//! Cells the projection drops are never materialised: their text is not
//! collected and the parse stops at the first row past the row cap.

use super::storage::{ColumnarStorage, ColumnarValue, FormulaCell};
use crate::common::xml::parser::{self, ElementParser, Parsed, ParserContext, attr, attr_u32};
use crate::common::xml::{Attr, HandlerError, HandlerResult, Result, SaxOptions, decode_ooxml_escapes};
use crate::ooxml::xlsx::cell::{CellRef, MAX_ROW};
use crate::ooxml::xlsx::model::SharedStringTable;
use crate::ooxml::xlsx::number_format::iso_to_serial;
use crate::ooxml::xlsx::options::Projection;
use std::sync::Arc;

#[inline]
fn parse_number(text: &str) -> Option<f64> {
    fast_float2::parse::<f64, _>(text.trim()).ok()
}

#[derive(Default)]
struct PendingCell {
    at: Option<CellRef>,
    style: Option<u32>,
    kind: String,
    value: Option<String>,
    formula: Option<String>,
    inline: Option<String>,
}

struct ColumnarParser<'a> {
    storage: ColumnarStorage,
    strings: &'a mut SharedStringTable,
    date_styles: &'a [bool],
    row: u32,
    seen_row: bool,
    next_col: u32,
    /// The current cell is outside the projection.
    skipping: bool,
    cell: PendingCell,
}

impl<'a> ColumnarParser<'a> {
    fn new(projection: Arc<Projection>, strings: &'a mut SharedStringTable, date_styles: &'a [bool]) -> Self {
        Self {
            storage: ColumnarStorage::with_projection(projection),
            strings,
            date_styles,
            row: 0,
            seen_row: false,
            next_col: 0,
            skipping: false,
            cell: PendingCell::default(),
        }
    }

    fn is_date_style(&self, style: Option<u32>) -> bool {
        style.is_some_and(|s| self.date_styles.get(s as usize).copied().unwrap_or(false))
    }

    fn start_row(&mut self, ctx: &mut ParserContext, attrs: &[Attr<'_>]) -> HandlerResult {
        let next = if self.seen_row { self.row + 1 } else { 0 };
        self.seen_row = true;
        self.row = match attr_u32(attrs, "r") {
            Some(r) if (1..=MAX_ROW + 1).contains(&r) => r - 1,
            Some(r) => {
                ctx.warn(format!("row number {r} out of range, using next row"));
                next
            },
            None => next,
        };
        self.next_col = 0;
        // sheetData rows are ordered, nothing past the cap can follow
        if self.storage.projection().should_skip_row(self.row) {
            return Err(HandlerError::Stop);
        }
        Ok(())
    }

    fn start_cell(&mut self, ctx: &mut ParserContext, attrs: &[Attr<'_>]) {
        let at = match attr(attrs, "r") {
            Some(r) => CellRef::parse(r).or_else(|| {
                ctx.warn(format!("invalid cell reference '{r}' skipped"));
                None
            }),
            None => CellRef::new(self.row, self.next_col),
        };
        if let Some(at) = at {
            self.next_col = at.col + 1;
        }
        self.skipping = at.is_none_or(|at| !self.storage.accepts(at.row, at.col));
        self.cell = if self.skipping {
            PendingCell::default()
        } else {
            PendingCell {
                at,
                style: attr_u32(attrs, "s"),
                kind: attr(attrs, "t").unwrap_or("n").to_string(),
                ..PendingCell::default()
            }
        };
    }

    fn finish_cell(&mut self) {
        let pending = std::mem::take(&mut self.cell);
        let Some(at) = pending.at else {
            return;
        };
        let value = match pending.formula {
            Some(text) => Some(ColumnarValue::Formula(FormulaCell {
                text,
                cached: pending.value,
            })),
            None => match pending.kind.as_str() {
                "s" => pending
                    .value
                    .as_deref()
                    .and_then(|v| atoi_simd::parse::<u32, false, false>(v.trim().as_bytes()).ok())
                    .map(ColumnarValue::SstIndex),
                "b" => pending.value.map(|v| ColumnarValue::Bool(v.trim() == "1")),
                "e" => pending.value.map(ColumnarValue::Error),
                "str" => pending.value.map(|v| ColumnarValue::SstIndex(self.strings.add(&v))),
                "inlineStr" => pending.inline.map(|v| ColumnarValue::SstIndex(self.strings.add(&v))),
                "d" => match pending.value.as_deref().and_then(iso_to_serial) {
                    Some(serial) => Some(ColumnarValue::DateTime(serial)),
                    None => pending.value.map(|v| ColumnarValue::SstIndex(self.strings.add(&v))),
                },
                _ => pending.value.as_deref().and_then(parse_number).map(|n| {
                    if self.is_date_style(pending.style) {
                        ColumnarValue::DateTime(n)
                    } else {
                        ColumnarValue::Number(n)
                    }
                }),
            },
        };
        if let Some(value) = value {
            self.storage.set_value(at.row, at.col, value);
        }
    }
}

impl ElementParser for ColumnarParser<'_> {
    fn start(&mut self, ctx: &mut ParserContext, name: &str, attrs: &[Attr<'_>]) -> HandlerResult {
        match name {
            "row" => return self.start_row(ctx, attrs),
            "c" => self.start_cell(ctx, attrs),
            _ if self.skipping => {},
            "v" | "f" if ctx.parent_element() == Some("c") => ctx.start_text(),
            "is" => self.cell.inline = Some(String::new()),
            "t" if ctx.is_in_element("is") && !ctx.is_in_element("rPh") => ctx.start_text(),
            _ => {},
        }
        Ok(())
    }

    fn end(&mut self, ctx: &mut ParserContext, name: &str) -> HandlerResult {
        match name {
            "v" if ctx.is_collecting() => self.cell.value = Some(ctx.take_text()),
            "f" if ctx.is_collecting() => self.cell.formula = Some(ctx.take_text()),
            "t" if ctx.is_collecting() => {
                let text = ctx.take_text();
                if let Some(inline) = self.cell.inline.as_mut() {
                    inline.push_str(&decode_ooxml_escapes(&text));
                }
            },
            "c" => {
                if !self.skipping {
                    self.finish_cell();
                }
                self.skipping = false;
            },
            _ => {},
        }
        Ok(())
    }
}

/// Parse a worksheet part into a columnar store. Inline strings and
/// plain `str` cells are interned into `strings`, so every text cell is
/// stored as an SST index.
pub fn parse_columnar(
    input: &[u8],
    projection: Arc<Projection>,
    strings: &mut SharedStringTable,
    date_styles: &[bool],
) -> Result<Parsed<ColumnarStorage>> {
    let mut parser = ColumnarParser::new(projection, strings, date_styles);
    let warnings = parser::run(&mut parser, input, SaxOptions::preserve_whitespace())?;
    Ok(Parsed {
        value: parser.storage,
        warnings,
    })
}

/// Like [`parse_columnar`], reading the part in chunks.
pub fn parse_columnar_chunked<F>(
    projection: Arc<Projection>,
    strings: &mut SharedStringTable,
    date_styles: &[bool],
    source: F,
) -> Result<Parsed<ColumnarStorage>>
where
    F: FnOnce(&mut dyn FnMut(&[u8]) -> bool) -> Result<()>,
{
    let mut parser = ColumnarParser::new(projection, strings, date_styles);
    let warnings = parser::run_chunked(&mut parser, SaxOptions::preserve_whitespace(), source)?;
    Ok(Parsed {
        value: parser.storage,
        warnings,
    })
}
