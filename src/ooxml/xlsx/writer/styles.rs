//! Styles part output.
//!
//! Fonts, fills and borders are serialised once into standalone fragments
//! when a format is appended; the same bytes serve as the dedupe key and
//! as what ends up in the part.

use crate::common::xml::splice::STYLESHEET_ORDER;
use crate::common::xml::{Result, Splice, SpliceRefusal, XmlError, XmlErrorKind, XmlWriter};
use crate::ooxml::opc::constants::namespace;
use crate::ooxml::xlsx::model::format::{CellBorder, CellBorderSide, CellFill, CellFont};
use crate::ooxml::xlsx::model::styles::{StyleTable, XfRecord};

const DEFAULT_FONT: &[u8] =
    b"<font><sz val=\"11\"/><color theme=\"1\"/><name val=\"Calibri\"/><family val=\"2\"/><scheme val=\"minor\"/></font>";
const DEFAULT_FILLS: &[u8] =
    b"<fill><patternFill patternType=\"none\"/></fill><fill><patternFill patternType=\"gray125\"/></fill>";
const DEFAULT_BORDER: &[u8] = b"<border><left/><right/><top/><bottom/><diagonal/></border>";

/// `<font>` element for a font descriptor.
pub fn font_fragment(font: &CellFont) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(128);
    w.start_element("font");
    if font.bold {
        w.start_element("b").end_element();
    }
    if font.italic {
        w.start_element("i").end_element();
    }
    if font.underline {
        w.start_element("u").end_element();
    }
    w.start_element("sz").attribute_f64("val", font.size.unwrap_or(11.0)).end_element();
    if let Some(color) = &font.color {
        w.start_element("color").attribute("rgb", color).end_element();
    }
    w.start_element("name")
        .attribute("val", font.name.as_deref().unwrap_or("Calibri"))
        .end_element();
    w.end_element();
    w.into_bytes()
}

/// `<fill>` element for a fill descriptor.
pub fn fill_fragment(fill: &CellFill) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(128);
    w.start_element("fill")
        .start_element("patternFill")
        .attribute("patternType", fill.pattern_type.as_str());
    if let Some(fg) = &fill.fg_color {
        w.start_element("fgColor").attribute("rgb", fg).end_element();
    }
    if let Some(bg) = &fill.bg_color {
        w.start_element("bgColor").attribute("rgb", bg).end_element();
    }
    w.end_element().end_element();
    w.into_bytes()
}

/// `<border>` element for a border descriptor.
pub fn border_fragment(border: &CellBorder) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(192);
    w.start_element("border");
    border_side(&mut w, "left", border.left.as_ref());
    border_side(&mut w, "right", border.right.as_ref());
    border_side(&mut w, "top", border.top.as_ref());
    border_side(&mut w, "bottom", border.bottom.as_ref());
    border_side(&mut w, "diagonal", border.diagonal.as_ref());
    w.end_element();
    w.into_bytes()
}

fn border_side(w: &mut XmlWriter, name: &str, side: Option<&CellBorderSide>) {
    w.start_element(name);
    if let Some(side) = side {
        w.attribute("style", side.style.as_str());
        if let Some(color) = &side.color {
            w.start_element("color").attribute("rgb", color).end_element();
        }
    }
    w.end_element();
}

fn xf_fragment(w: &mut XmlWriter, xf: &XfRecord) {
    w.start_element("xf")
        .attribute_int("numFmtId", xf.num_fmt_id)
        .attribute_int("fontId", xf.font_id)
        .attribute_int("fillId", xf.fill_id)
        .attribute_int("borderId", xf.border_id)
        .attribute_int("xfId", 0u32);
    if xf.num_fmt_id != 0 {
        w.attribute_bool("applyNumberFormat", true);
    }
    if xf.font_id != 0 {
        w.attribute_bool("applyFont", true);
    }
    if xf.fill_id != 0 {
        w.attribute_bool("applyFill", true);
    }
    if xf.border_id != 0 {
        w.attribute_bool("applyBorder", true);
    }
    w.end_element();
}

fn num_fmt_fragment(w: &mut XmlWriter, id: u32, code: &str) {
    w.start_element("numFmt")
        .attribute_int("numFmtId", id)
        .attribute("formatCode", code)
        .end_element();
}

/// Complete styles part for a table that started from
/// [`StyleTable::new_default`].
pub fn write_styles(table: &StyleTable) -> Vec<u8> {
    let pending = table.pending();
    let mut w = XmlWriter::with_capacity(4096);
    w.declaration()
        .start_element("styleSheet")
        .attribute("xmlns", namespace::SML_MAIN);

    if !table.num_fmts().is_empty() {
        w.start_element("numFmts").attribute_int("count", table.num_fmts().len());
        for (&id, code) in table.num_fmts() {
            num_fmt_fragment(&mut w, id, code);
        }
        w.end_element();
    }

    w.start_element("fonts").attribute_int("count", table.font_count()).raw_bytes(DEFAULT_FONT);
    for font in &pending.fonts {
        w.raw_bytes(font);
    }
    w.end_element();

    w.start_element("fills").attribute_int("count", table.fill_count()).raw_bytes(DEFAULT_FILLS);
    for fill in &pending.fills {
        w.raw_bytes(fill);
    }
    w.end_element();

    w.start_element("borders")
        .attribute_int("count", table.border_count())
        .raw_bytes(DEFAULT_BORDER);
    for border in &pending.borders {
        w.raw_bytes(border);
    }
    w.end_element();

    w.raw("<cellStyleXfs count=\"1\"><xf numFmtId=\"0\" fontId=\"0\" fillId=\"0\" borderId=\"0\"/></cellStyleXfs>");

    w.start_element("cellXfs").attribute_int("count", table.xf_count());
    for xf in (0..table.xf_count() as u32).filter_map(|i| table.xf(i)) {
        xf_fragment(&mut w, xf);
    }
    w.end_element();

    w.raw("<cellStyles count=\"1\"><cellStyle name=\"Normal\" xfId=\"0\" builtinId=\"0\"/></cellStyles>");
    w.raw("<dxfs count=\"0\"/><tableStyles count=\"0\" defaultTableStyle=\"TableStyleMedium2\" defaultPivotStyle=\"PivotStyleLight16\"/>");
    w.end_element();
    w.into_bytes()
}

/// Append the pending entries of `table` to an existing styles part,
/// updating each container's `count`. Everything else is kept verbatim.
pub fn append_styles(src: &[u8], table: &StyleTable) -> Result<Vec<u8>> {
    let mut splice = match Splice::parse(src)? {
        Ok(splice) => splice,
        Err(SpliceRefusal::PrefixedRoot(root)) => {
            return Err(XmlError::new(
                XmlErrorKind::InvalidInput,
                format!("cannot append to prefixed <{root}>"),
            ));
        },
    };
    let pending = table.pending();
    let mut itoa_buf = itoa::Buffer::new();

    if !pending.num_fmts.is_empty() {
        let mut w = XmlWriter::with_capacity(256);
        for fmt in &pending.num_fmts {
            num_fmt_fragment(&mut w, fmt.id, &fmt.code);
        }
        let count = itoa_buf.format(table.num_fmts().len()).to_string();
        splice.append_to_child("numFmts", w.as_bytes(), &[("count", Some(&count))], STYLESHEET_ORDER)?;
    }

    for (container, fragments, count) in [
        ("fonts", &pending.fonts, table.font_count()),
        ("fills", &pending.fills, table.fill_count()),
        ("borders", &pending.borders, table.border_count()),
    ] {
        if fragments.is_empty() {
            continue;
        }
        let joined: Vec<u8> = fragments.concat();
        let count = itoa_buf.format(count).to_string();
        splice.append_to_child(container, &joined, &[("count", Some(&count))], STYLESHEET_ORDER)?;
    }

    if !pending.xfs.is_empty() {
        let mut w = XmlWriter::with_capacity(pending.xfs.len() * 96);
        for xf in &pending.xfs {
            xf_fragment(&mut w, xf);
        }
        let count = itoa_buf.format(table.xf_count()).to_string();
        splice.append_to_child("cellXfs", w.as_bytes(), &[("count", Some(&count))], STYLESHEET_ORDER)?;
    }

    Ok(splice.finish())
}
