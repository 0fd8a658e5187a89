//! Worksheet part output.
//!
//! A worksheet is written as a frame (everything before and after
//! `<sheetData>`) around the rows. For an existing part the frame comes
//! from the source with only `dimension`, `cols` and `drawing` replaced;
//! for a new sheet it is generated. Rows can go to memory in one piece or
//! to any [`Write`] sink a batch of rows at a time.

use crate::common::xml::splice::WORKSHEET_ORDER;
use crate::common::xml::{Result, Splice, SpliceRefusal, XmlWriter, encode_ooxml_escapes};
use crate::ooxml::opc::constants::namespace;
use crate::ooxml::xlsx::cell::{CellRef, CellValue};
use crate::ooxml::xlsx::model::worksheet::FormulaPool;
use crate::ooxml::xlsx::model::{Cell, Row, Worksheet};
use std::io::Write;

/// Part bytes around `<sheetData>`.
#[derive(Debug, Clone, Default)]
pub struct SheetFrame {
    pub head: Vec<u8>,
    pub tail: Vec<u8>,
    pub warnings: Vec<String>,
}

/// Build the frame for `ws`. With `src`, the source part is spliced;
/// a source that cannot be spliced is regenerated with a warning.
pub fn sheet_frame(src: Option<&[u8]>, ws: &Worksheet) -> Result<SheetFrame> {
    let Some(src) = src else {
        return Ok(generated_frame(ws));
    };
    let mut splice = match Splice::parse(src)? {
        Ok(splice) => splice,
        Err(SpliceRefusal::PrefixedRoot(root)) => {
            let mut frame = generated_frame(ws);
            frame.warnings.push(format!(
                "worksheet root <{root}> is prefixed; part regenerated without unmodelled content"
            ));
            return Ok(frame);
        },
    };

    splice.replace_or_insert("dimension", dimension_element(ws), WORKSHEET_ORDER);
    if ws.cols_changed() {
        match cols_element(ws) {
            Some(cols) => splice.replace_or_insert("cols", cols, WORKSHEET_ORDER),
            None => {
                splice.remove("cols");
            },
        }
    }
    if let Some(rel_id) = ws.drawing_rel() {
        if splice.root_attr("xmlns:r").is_none() {
            splice.set_root_attr("xmlns:r", Some(namespace::OFC_RELATIONSHIPS));
        }
        splice.replace_or_insert("drawing", drawing_element(rel_id), WORKSHEET_ORDER);
    }
    splice.replace_or_insert("sheetData", b"<sheetData/>".to_vec(), WORKSHEET_ORDER);

    let (head, tail) = splice.split_around("sheetData").unwrap_or_default();
    Ok(SheetFrame {
        head,
        tail,
        warnings: Vec::new(),
    })
}

fn generated_frame(ws: &Worksheet) -> SheetFrame {
    let mut w = XmlWriter::with_capacity(1024);
    w.declaration()
        .start_element("worksheet")
        .attribute("xmlns", namespace::SML_MAIN)
        .attribute("xmlns:r", namespace::OFC_RELATIONSHIPS)
        .raw_bytes(&dimension_element(ws))
        .raw("<sheetViews><sheetView workbookViewId=\"0\"/></sheetViews>")
        .raw("<sheetFormatPr defaultRowHeight=\"15\"/>");
    if let Some(cols) = cols_element(ws) {
        w.raw_bytes(&cols);
    }
    let head = w.into_bytes();

    let mut w = XmlWriter::with_capacity(256);
    w.raw("<pageMargins left=\"0.7\" right=\"0.7\" top=\"0.75\" bottom=\"0.75\" header=\"0.3\" footer=\"0.3\"/>");
    if let Some(rel_id) = ws.drawing_rel() {
        w.raw_bytes(&drawing_element(rel_id));
    }
    w.raw("</worksheet>");
    SheetFrame {
        head,
        tail: w.into_bytes(),
        warnings: Vec::new(),
    }
}

fn dimension_element(ws: &Worksheet) -> Vec<u8> {
    let mut out = Vec::with_capacity(32);
    out.extend_from_slice(b"<dimension ref=\"");
    match ws.used_range() {
        Some((r0, c0, r1, c1)) => {
            let first = CellRef { row: r0, col: c0 };
            let last = CellRef { row: r1, col: c1 };
            first.write_a1(&mut out);
            if first != last {
                out.push(b':');
                last.write_a1(&mut out);
            }
        },
        None => out.extend_from_slice(b"A1"),
    }
    out.extend_from_slice(b"\"/>");
    out
}

fn cols_element(ws: &Worksheet) -> Option<Vec<u8>> {
    if ws.cols().is_empty() {
        return None;
    }
    let mut w = XmlWriter::with_capacity(64 * ws.cols().len());
    w.start_element("cols");
    for col in ws.cols() {
        w.start_element("col")
            .attribute_int("min", col.min)
            .attribute_int("max", col.max);
        if let Some(width) = col.width {
            w.attribute_f64("width", width);
        }
        if let Some(style) = col.style {
            w.attribute_int("style", style);
        }
        if col.hidden {
            w.attribute_bool("hidden", true);
        }
        if col.custom_width {
            w.attribute_bool("customWidth", true);
        }
        if col.outline_level > 0 {
            w.attribute_int("outlineLevel", col.outline_level);
        }
        for (k, v) in &col.extra {
            w.attribute(k, v);
        }
        w.end_element();
    }
    w.end_element();
    Some(w.into_bytes())
}

fn drawing_element(rel_id: &str) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(48);
    w.start_element("drawing").attribute("r:id", rel_id).end_element();
    w.into_bytes()
}

fn needs_space_preserve(text: &str) -> bool {
    text.starts_with(char::is_whitespace) || text.ends_with(char::is_whitespace) || text.contains('\n')
}

fn write_cell(w: &mut XmlWriter, at: CellRef, cell: &Cell, formulas: &FormulaPool) {
    if cell.value.is_empty() && cell.style.is_none() && cell.extra.is_empty() {
        return;
    }
    w.start_element("c").attribute_with("r", |buf| at.write_a1(buf));
    if let Some(style) = cell.style {
        w.attribute_int("s", style);
    }
    let kind = match &cell.value {
        CellValue::SstIndex(_) => Some("s"),
        CellValue::Inline(_) => Some("inlineStr"),
        CellValue::Bool(_) => Some("b"),
        CellValue::Error(_) => Some("e"),
        CellValue::Formula { index, .. } => formulas.get(*index).and_then(|f| f.value_type.as_deref()),
        CellValue::Number(_) | CellValue::Empty => None,
    };
    if let Some(kind) = kind {
        w.attribute("t", kind);
    }
    for (k, v) in &cell.extra {
        w.attribute(k, v);
    }

    match &cell.value {
        CellValue::Number(n) => {
            w.start_element("v").number(*n).end_element();
        },
        CellValue::SstIndex(i) => {
            w.start_element("v").int(*i).end_element();
        },
        CellValue::Inline(s) => {
            let encoded = encode_ooxml_escapes(s);
            w.start_element("is").start_element("t");
            if needs_space_preserve(&encoded) {
                w.attribute("xml:space", "preserve");
            }
            w.text(&encoded).end_element().end_element();
        },
        CellValue::Bool(b) => {
            w.start_element("v").raw(if *b { "1" } else { "0" }).end_element();
        },
        CellValue::Error(e) => {
            w.start_element("v").text(e).end_element();
        },
        CellValue::Formula { index, result } => match formulas.get(*index) {
            Some(entry) => {
                w.start_element("f");
                for (k, v) in &entry.attrs {
                    w.attribute(k, v);
                }
                if !entry.text.is_empty() {
                    w.text(&entry.text);
                }
                w.end_element();
                if let Some(cached) = &entry.cached {
                    w.start_element("v").text(cached).end_element();
                }
            },
            None => {
                w.start_element("v").number(*result).end_element();
            },
        },
        CellValue::Empty => {},
    }
    w.end_element();
}

fn write_row(w: &mut XmlWriter, index: u32, row: &Row, formulas: &FormulaPool) {
    if row.cells.is_empty() && row.props.is_default() {
        return;
    }
    let props = &row.props;
    w.start_element("row").attribute_int("r", index + 1);
    if let Some(style) = props.style {
        w.attribute_int("s", style).attribute_bool("customFormat", true);
    }
    if let Some(height) = props.height {
        w.attribute_f64("ht", height);
    }
    if props.hidden {
        w.attribute_bool("hidden", true);
    }
    if props.custom_height {
        w.attribute_bool("customHeight", true);
    }
    if props.outline_level > 0 {
        w.attribute_int("outlineLevel", props.outline_level);
    }
    if props.collapsed {
        w.attribute_bool("collapsed", true);
    }
    for (k, v) in &props.extra {
        w.attribute(k, v);
    }
    for (&col, cell) in &row.cells {
        write_cell(w, CellRef { row: index, col }, cell, formulas);
    }
    w.end_element();
}

/// The complete `<sheetData>` element.
pub fn sheet_data(ws: &Worksheet) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(64 + ws.cell_count() * 32);
    w.start_element("sheetData");
    for (index, row) in ws.rows() {
        write_row(&mut w, index, row, ws.formulas());
    }
    w.end_element();
    w.into_bytes()
}

/// Serialise the whole part into memory.
pub fn write_worksheet(src: Option<&[u8]>, ws: &Worksheet) -> Result<(Vec<u8>, Vec<String>)> {
    let frame = sheet_frame(src, ws)?;
    let data = sheet_data(ws);
    let mut out = Vec::with_capacity(frame.head.len() + data.len() + frame.tail.len());
    out.extend_from_slice(&frame.head);
    out.extend_from_slice(&data);
    out.extend_from_slice(&frame.tail);
    Ok((out, frame.warnings))
}

/// Serialise the part into `sink`, flushing the row buffer every
/// `rows_per_flush` rows.
pub fn stream_worksheet<W: Write + ?Sized>(
    src: Option<&[u8]>,
    ws: &Worksheet,
    sink: &mut W,
    rows_per_flush: usize,
    buffer_size: usize,
) -> Result<Vec<String>> {
    let frame = sheet_frame(src, ws)?;
    sink.write_all(&frame.head)?;
    let mut w = XmlWriter::with_capacity(buffer_size.min(64 * 1024 * 1024));
    w.start_element("sheetData");
    let rows_per_flush = rows_per_flush.max(1);
    for (n, (index, row)) in ws.rows().enumerate() {
        write_row(&mut w, index, row, ws.formulas());
        if (n + 1) % rows_per_flush == 0 || w.len() >= buffer_size {
            w.drain_to(sink)?;
        }
    }
    w.end_element();
    w.drain_to(sink)?;
    sink.write_all(&frame.tail)?;
    Ok(frame.warnings)
}
