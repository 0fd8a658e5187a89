//! SpreadsheetDrawingML for pictures anchored to a cell range.

use crate::common::xml::{Result, XmlError, XmlErrorKind, XmlWriter};
use crate::ooxml::opc::constants::namespace;
use crate::ooxml::xlsx::cell::CellRange;
use memchr::memmem;

/// Default column width and row height in EMU (64 px and 20 px at 96 dpi).
const COLUMN_EMU: u64 = 609_600;
const ROW_EMU: u64 = 190_500;

/// A `<xdr:twoCellAnchor>` spanning `range`, inclusive. The anchor
/// declares its own namespaces so it can be dropped into a drawing whose
/// prefixes differ.
pub fn picture_anchor(range: CellRange, rel_id: &str, shape_id: u32, name: &str) -> Vec<u8> {
    let cols = u64::from(range.end.col - range.start.col + 1);
    let rows = u64::from(range.end.row - range.start.row + 1);
    let mut w = XmlWriter::with_capacity(1024);
    w.start_element("xdr:twoCellAnchor")
        .attribute("xmlns:xdr", namespace::DML_SPREADSHEET_DRAWING)
        .attribute("xmlns:a", namespace::DML_MAIN)
        .attribute("xmlns:r", namespace::OFC_RELATIONSHIPS)
        .attribute("editAs", "oneCell");
    for (marker, col, row) in [
        ("xdr:from", range.start.col, range.start.row),
        ("xdr:to", range.end.col + 1, range.end.row + 1),
    ] {
        w.start_element(marker)
            .start_element("xdr:col")
            .int(col)
            .end_element()
            .text_element("xdr:colOff", "0")
            .start_element("xdr:row")
            .int(row)
            .end_element()
            .text_element("xdr:rowOff", "0")
            .end_element();
    }
    w.start_element("xdr:pic")
        .start_element("xdr:nvPicPr")
        .start_element("xdr:cNvPr")
        .attribute_int("id", shape_id)
        .attribute("name", name)
        .end_element()
        .start_element("xdr:cNvPicPr")
        .start_element("a:picLocks")
        .attribute_bool("noChangeAspect", true)
        .end_element()
        .end_element()
        .end_element()
        .start_element("xdr:blipFill")
        .start_element("a:blip")
        .attribute("r:embed", rel_id)
        .end_element()
        .start_element("a:stretch")
        .start_element("a:fillRect")
        .end_element()
        .end_element()
        .end_element()
        .start_element("xdr:spPr")
        .start_element("a:xfrm")
        .start_element("a:off")
        .attribute_int("x", u64::from(range.start.col) * COLUMN_EMU)
        .attribute_int("y", u64::from(range.start.row) * ROW_EMU)
        .end_element()
        .start_element("a:ext")
        .attribute_int("cx", cols * COLUMN_EMU)
        .attribute_int("cy", rows * ROW_EMU)
        .end_element()
        .end_element()
        .start_element("a:prstGeom")
        .attribute("prst", "rect")
        .start_element("a:avLst")
        .end_element()
        .end_element()
        .end_element()
        .end_element()
        .start_element("xdr:clientData")
        .end_element()
        .end_element();
    w.into_bytes()
}

/// A new drawing part holding `anchor`.
pub fn drawing_part(anchor: &[u8]) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(anchor.len() + 512);
    w.declaration()
        .start_element("xdr:wsDr")
        .attribute("xmlns:xdr", namespace::DML_SPREADSHEET_DRAWING)
        .attribute("xmlns:a", namespace::DML_MAIN)
        .raw_bytes(anchor)
        .end_element();
    w.into_bytes()
}

/// Insert `anchor` before the closing tag of the drawing's root element.
pub fn append_anchor(src: &[u8], anchor: &[u8]) -> Result<Vec<u8>> {
    let close = memmem::rfind(src, b"</")
        .ok_or_else(|| XmlError::new(XmlErrorKind::InvalidInput, "drawing part has no closing root tag"))?;
    let mut out = Vec::with_capacity(src.len() + anchor.len());
    out.extend_from_slice(&src[..close]);
    out.extend_from_slice(anchor);
    out.extend_from_slice(&src[close..]);
    Ok(out)
}

/// One past the largest `cNvPr` id in a drawing part.
pub fn next_shape_id(src: &[u8]) -> u32 {
    let mut max = 0u32;
    for at in memmem::find_iter(src, b"cNvPr ") {
        let tag = &src[at..];
        let end = memchr::memchr(b'>', tag).unwrap_or(tag.len());
        let tag = &tag[..end];
        if let Some(id_at) = memmem::find(tag, b" id=\"") {
            let digits = &tag[id_at + 5..];
            let len = digits.iter().take_while(|b| b.is_ascii_digit()).count();
            if let Ok(id) = atoi_simd::parse::<u32, false, false>(&digits[..len]) {
                max = max.max(id);
            }
        }
    }
    max + 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::xml::XmlDocument;

    #[test]
    fn test_new_drawing() {
        let range = CellRange::parse("B2:C4").unwrap();
        let part = drawing_part(&picture_anchor(range, "rId1", 1, "Picture 1"));
        let doc = XmlDocument::parse(&part).unwrap();
        let root = doc.root().unwrap();
        let from = doc.descendants(root, "from").next().unwrap();
        assert_eq!(doc.child_text(from, "col"), Some("1"));
        assert_eq!(doc.child_text(from, "row"), Some("1"));
        let to = doc.descendants(root, "to").next().unwrap();
        assert_eq!(doc.child_text(to, "col"), Some("3"));
        assert_eq!(doc.child_text(to, "row"), Some("4"));
        let blip = doc.descendants(root, "blip").next().unwrap();
        assert_eq!(doc.node(blip).attr("r:embed"), Some("rId1"));
        assert_eq!(next_shape_id(&part), 2);
    }

    #[test]
    fn test_append_anchor() {
        let src = b"<?xml version=\"1.0\"?><xdr:wsDr xmlns:xdr=\"x\"><xdr:oneCellAnchor><xdr:pic><xdr:nvPicPr><xdr:cNvPr id=\"4\" name=\"Logo\"/></xdr:nvPicPr></xdr:pic></xdr:oneCellAnchor></xdr:wsDr>";
        let anchor = picture_anchor(CellRange::parse("A1").unwrap(), "rId2", next_shape_id(src), "Picture 5");
        let out = append_anchor(src, &anchor).unwrap();
        let doc = XmlDocument::parse(&out).unwrap();
        let root = doc.root().unwrap();
        assert_eq!(doc.children(root).count(), 2);
        let ids: Vec<&str> = doc
            .descendants(root, "cNvPr")
            .filter_map(|id| doc.node(id).attr("id"))
            .collect();
        assert_eq!(ids, vec!["4", "5"]);
    }
}
