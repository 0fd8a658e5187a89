//! Worksheet parts into the row-wise [`Worksheet`] model.
//!
//! Cells keep what the writer needs to reproduce them: shared string
//! indices stay indices, formulas keep their `<f>` attributes and cached
//! results, and attributes without a model field are carried as-is.

use crate::common::xml::parser::{
    self, ElementParser, Parsed, ParserContext, attr, attr_bool, attr_f64, attr_u32,
};
use crate::common::xml::{Attr, HandlerResult, Result, SaxOptions, decode_ooxml_escapes};
use crate::ooxml::xlsx::cell::{CellRef, CellValue, MAX_ROW};
use crate::ooxml::xlsx::model::worksheet::FormulaPool;
use crate::ooxml::xlsx::model::{Cell, ColumnDef, FormulaEntry, Row, RowProps, Worksheet};
use crate::ooxml::xlsx::number_format::iso_to_serial;
use std::collections::BTreeMap;

const ROW_ATTRS: &[&str] = &[
    "r",
    "spans",
    "ht",
    "customHeight",
    "hidden",
    "s",
    "customFormat",
    "outlineLevel",
    "collapsed",
];
const COL_ATTRS: &[&str] = &["min", "max", "width", "style", "hidden", "customWidth", "outlineLevel"];
const CELL_ATTRS: &[&str] = &["r", "s", "t"];

fn extra_attrs(attrs: &[Attr<'_>], known: &[&str]) -> Vec<(String, String)> {
    attrs
        .iter()
        .filter(|a| !known.contains(&a.name))
        .map(|a| (a.name.to_string(), a.unescaped().into_owned()))
        .collect()
}

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
    formula: Option<(String, Vec<(String, String)>)>,
    formula_attrs: Vec<(String, String)>,
    inline: Option<String>,
    extra: Vec<(String, String)>,
}

struct WorksheetParser<'d> {
    rows: BTreeMap<u32, Row>,
    cols: Vec<ColumnDef>,
    formulas: FormulaPool,
    drawing_rel: Option<String>,
    date_styles: &'d [bool],
    row: u32,
    next_col: u32,
    cell: PendingCell,
}

impl<'d> WorksheetParser<'d> {
    fn new(date_styles: &'d [bool]) -> Self {
        Self {
            rows: BTreeMap::new(),
            cols: Vec::new(),
            formulas: FormulaPool::default(),
            drawing_rel: None,
            date_styles,
            row: 0,
            next_col: 0,
            cell: PendingCell::default(),
        }
    }

    fn is_date_style(&self, style: Option<u32>) -> bool {
        style.is_some_and(|s| self.date_styles.get(s as usize).copied().unwrap_or(false))
    }

    fn start_row(&mut self, ctx: &mut ParserContext, attrs: &[Attr<'_>]) {
        let row = match attr_u32(attrs, "r") {
            Some(r) if (1..=MAX_ROW + 1).contains(&r) => r - 1,
            Some(r) => {
                ctx.warn(format!("row number {r} out of range, using next row"));
                self.rows.last_key_value().map_or(0, |(&k, _)| k + 1)
            },
            None => self.rows.last_key_value().map_or(0, |(&k, _)| k + 1),
        };
        self.row = row;
        self.next_col = 0;
        let props = RowProps {
            height: attr_f64(attrs, "ht"),
            custom_height: attr_bool(attrs, "customHeight").unwrap_or(false),
            hidden: attr_bool(attrs, "hidden").unwrap_or(false),
            style: match attr_bool(attrs, "customFormat") {
                Some(true) => attr_u32(attrs, "s"),
                _ => None,
            },
            outline_level: attr_u32(attrs, "outlineLevel").map_or(0, |l| l.min(7) as u8),
            collapsed: attr_bool(attrs, "collapsed").unwrap_or(false),
            extra: extra_attrs(attrs, ROW_ATTRS),
        };
        self.rows.entry(row).or_default().props = props;
    }

    fn start_cell(&mut self, ctx: &mut ParserContext, attrs: &[Attr<'_>]) {
        let at = match attr(attrs, "r") {
            Some(r) => match CellRef::parse(r) {
                Some(at) => Some(at),
                None => {
                    ctx.warn(format!("invalid cell reference '{r}' skipped"));
                    None
                },
            },
            None => CellRef::new(self.row, self.next_col),
        };
        if let Some(at) = at {
            self.next_col = at.col + 1;
        }
        self.cell = PendingCell {
            at,
            style: attr_u32(attrs, "s"),
            kind: attr(attrs, "t").unwrap_or("n").to_string(),
            extra: extra_attrs(attrs, CELL_ATTRS),
            ..PendingCell::default()
        };
    }

    fn finish_cell(&mut self) {
        let pending = std::mem::take(&mut self.cell);
        let Some(at) = pending.at else {
            return;
        };
        let mut is_date = false;
        let value = match pending.formula {
            Some((text, attrs)) => {
                let result = pending.value.as_deref().and_then(parse_number).unwrap_or(0.0);
                let value_type = match pending.kind.as_str() {
                    "n" => None,
                    other => Some(other.to_string()),
                };
                let index = self.formulas.push(FormulaEntry {
                    text,
                    attrs,
                    cached: pending.value,
                    value_type,
                });
                CellValue::Formula { index, result }
            },
            None => match pending.kind.as_str() {
                "s" => pending
                    .value
                    .as_deref()
                    .and_then(|v| atoi_simd::parse::<u32, false, false>(v.trim().as_bytes()).ok())
                    .map_or(CellValue::Empty, CellValue::SstIndex),
                "b" => pending.value.map_or(CellValue::Empty, |v| CellValue::Bool(v.trim() == "1")),
                "e" => pending.value.map_or(CellValue::Empty, CellValue::Error),
                "str" => pending.value.map_or(CellValue::Empty, CellValue::Inline),
                "inlineStr" => pending.inline.map_or(CellValue::Empty, CellValue::Inline),
                "d" => match pending.value.as_deref().and_then(iso_to_serial) {
                    Some(serial) => {
                        is_date = true;
                        CellValue::Number(serial)
                    },
                    None => pending.value.map_or(CellValue::Empty, CellValue::Inline),
                },
                _ => pending
                    .value
                    .as_deref()
                    .and_then(parse_number)
                    .map_or(CellValue::Empty, CellValue::Number),
            },
        };
        if matches!(value, CellValue::Number(_)) && self.is_date_style(pending.style) {
            is_date = true;
        }
        self.rows.entry(at.row).or_default().cells.insert(
            at.col,
            Cell {
                value,
                style: pending.style,
                is_date,
                extra: pending.extra,
            },
        );
    }

    fn start_col(&mut self, ctx: &mut ParserContext, attrs: &[Attr<'_>]) {
        let (Some(min), Some(max)) = (attr_u32(attrs, "min"), attr_u32(attrs, "max")) else {
            ctx.warn("<col> without min/max skipped");
            return;
        };
        self.cols.push(ColumnDef {
            min,
            max: max.max(min),
            width: attr_f64(attrs, "width"),
            style: attr_u32(attrs, "style"),
            hidden: attr_bool(attrs, "hidden").unwrap_or(false),
            custom_width: attr_bool(attrs, "customWidth").unwrap_or(false),
            outline_level: attr_u32(attrs, "outlineLevel").map_or(0, |l| l.min(7) as u8),
            extra: extra_attrs(attrs, COL_ATTRS),
        });
    }
}

impl ElementParser for WorksheetParser<'_> {
    fn start(&mut self, ctx: &mut ParserContext, name: &str, attrs: &[Attr<'_>]) -> HandlerResult {
        match name {
            "row" => self.start_row(ctx, attrs),
            "c" => self.start_cell(ctx, attrs),
            "v" if ctx.parent_element() == Some("c") => ctx.start_text(),
            "f" if ctx.parent_element() == Some("c") => {
                self.cell.formula_attrs = attrs
                    .iter()
                    .map(|a| (a.name.to_string(), a.unescaped().into_owned()))
                    .collect();
                ctx.start_text();
            },
            "is" => self.cell.inline = Some(String::new()),
            "t" if ctx.is_in_element("is") && !ctx.is_in_element("rPh") => ctx.start_text(),
            "col" if ctx.parent_element() == Some("cols") => self.start_col(ctx, attrs),
            "drawing" if ctx.depth() == 2 => {
                self.drawing_rel = attr(attrs, "r:id").map(str::to_string);
            },
            _ => {},
        }
        Ok(())
    }

    fn end(&mut self, ctx: &mut ParserContext, name: &str) -> HandlerResult {
        match name {
            "v" if ctx.is_collecting() => self.cell.value = Some(ctx.take_text()),
            "f" if ctx.is_collecting() => {
                let text = ctx.take_text();
                let attrs = std::mem::take(&mut self.cell.formula_attrs);
                self.cell.formula = Some((text, attrs));
            },
            "t" if ctx.is_collecting() => {
                let text = ctx.take_text();
                if let Some(inline) = self.cell.inline.as_mut() {
                    inline.push_str(&decode_ooxml_escapes(&text));
                }
            },
            "c" => self.finish_cell(),
            _ => {},
        }
        Ok(())
    }
}

impl WorksheetParser<'_> {
    fn into_parsed(self, warnings: Vec<String>) -> Parsed<Worksheet> {
        Parsed {
            value: Worksheet::from_parts(self.rows, self.cols, self.formulas).with_drawing_rel(self.drawing_rel),
            warnings,
        }
    }
}

/// Parse a worksheet part. `date_styles` flags the `cellXfs` indices whose
/// number format is a date.
pub fn parse_worksheet(input: &[u8], date_styles: &[bool]) -> Result<Parsed<Worksheet>> {
    let mut parser = WorksheetParser::new(date_styles);
    let warnings = parser::run(&mut parser, input, SaxOptions::preserve_whitespace())?;
    Ok(parser.into_parsed(warnings))
}

/// Like [`parse_worksheet`], reading the part in chunks.
pub fn parse_worksheet_chunked<F>(date_styles: &[bool], source: F) -> Result<Parsed<Worksheet>>
where
    F: FnOnce(&mut dyn FnMut(&[u8]) -> bool) -> Result<()>,
{
    let mut parser = WorksheetParser::new(date_styles);
    let warnings = parser::run_chunked(&mut parser, SaxOptions::preserve_whitespace(), source)?;
    Ok(parser.into_parsed(warnings))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">
<dimension ref="A1:D3"/>
<cols><col min="1" max="3" width="14.5" customWidth="1" bestFit="1"/></cols>
<sheetData>
<row r="1" spans="1:4" ht="20" customHeight="1"><c r="A1" t="s"><v>0</v></c><c r="B1"><v>42.5</v></c><c r="C1" t="b"><v>1</v></c><c r="D1" t="e"><v>#DIV/0!</v></c></row>
<row r="2" s="3" customFormat="1"><c r="A2" s="1"><v>45306</v></c><c r="B2"><f>B1*2</f><v>85</v></c><c r="C2" t="str"><f>"x"&amp;"y"</f><v>xy</v></c></row>
<row r="3"><c r="A3" t="inlineStr"><is><t xml:space="preserve">inline </t><r><t>rich</t></r></is></c><c t="d"><v>2024-01-15T00:00:00</v></c><c r="D3" cm="1"><f t="shared" ref="D3:D4" si="0">A1+1</f><v>2</v></c></row>
</sheetData>
<drawing r:id="rId4"/>
</worksheet>"#;

    fn at(r: &str) -> CellRef {
        CellRef::parse(r).unwrap()
    }

    #[test]
    fn test_parse_values() {
        let ws = parse_worksheet(SHEET, &[false, true]).unwrap().value;
        assert_eq!(ws.get(at("A1")).unwrap().value, CellValue::SstIndex(0));
        assert_eq!(ws.get(at("B1")).unwrap().value, CellValue::Number(42.5));
        assert_eq!(ws.get(at("C1")).unwrap().value, CellValue::Bool(true));
        assert_eq!(ws.get(at("D1")).unwrap().value, CellValue::Error("#DIV/0!".into()));
        assert_eq!(ws.get(at("A3")).unwrap().value, CellValue::Inline("inline rich".into()));
        assert_eq!(ws.cell_count(), 10);
        assert_eq!(ws.used_range(), Some((0, 0, 2, 3)));
        assert_eq!(ws.drawing_rel(), Some("rId4"));
        assert!(!ws.is_modified());
    }

    #[test]
    fn test_dates() {
        let ws = parse_worksheet(SHEET, &[false, true]).unwrap().value;
        let a2 = ws.get(at("A2")).unwrap();
        assert!(a2.is_date);
        assert_eq!(a2.style, Some(1));
        let b3 = ws.get(at("B3")).unwrap();
        assert!(b3.is_date);
        assert_eq!(b3.value, CellValue::Number(45306.0));
    }

    #[test]
    fn test_formulas_and_extras() {
        let ws = parse_worksheet(SHEET, &[]).unwrap().value;
        let CellValue::Formula { index, result } = ws.get(at("B2")).unwrap().value else {
            panic!("B2 should hold a formula");
        };
        assert_eq!(result, 85.0);
        assert_eq!(ws.formula(index).unwrap().text, "B1*2");

        let CellValue::Formula { index, .. } = ws.get(at("C2")).unwrap().value else {
            panic!("C2 should hold a formula");
        };
        let entry = ws.formula(index).unwrap();
        assert_eq!(entry.text, "\"x\"&\"y\"");
        assert_eq!(entry.value_type.as_deref(), Some("str"));
        assert_eq!(entry.cached.as_deref(), Some("xy"));

        let d3 = ws.get(at("D3")).unwrap();
        assert_eq!(d3.extra, vec![("cm".to_string(), "1".to_string())]);
        let CellValue::Formula { index, .. } = d3.value else {
            panic!("D3 should hold a formula");
        };
        assert!(ws.formula(index).unwrap().is_shared_master());
    }

    #[test]
    fn test_rows_and_cols() {
        let ws = parse_worksheet(SHEET, &[]).unwrap().value;
        let row1 = ws.row(0).unwrap();
        assert_eq!(row1.props.height, Some(20.0));
        assert!(row1.props.custom_height);
        assert!(row1.props.extra.is_empty());
        assert_eq!(ws.row_format(1), Some(3));
        assert_eq!(ws.cols().len(), 1);
        assert_eq!(ws.cols()[0].extra, vec![("bestFit".to_string(), "1".to_string())]);
        assert_eq!(ws.column_format(0), None);
    }

    #[test]
    fn test_chunked() {
        let ws = parse_worksheet_chunked(&[], |sink| {
            for chunk in SHEET.chunks(13) {
                sink(chunk);
            }
            Ok(())
        })
        .unwrap()
        .value;
        assert_eq!(ws.cell_count(), 10);
    }

    #[test]
    fn test_bad_reference_is_a_warning() {
        let parsed = parse_worksheet(br#"<worksheet><sheetData><row r="1"><c r="A0"><v>1</v></c></row></sheetData></worksheet>"#, &[]).unwrap();
        assert_eq!(parsed.warnings.len(), 1);
        assert_eq!(parsed.value.cell_count(), 0);
    }
}
