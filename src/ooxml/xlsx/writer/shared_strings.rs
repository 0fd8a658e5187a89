//! Shared string table output.

use crate::common::xml::{Result, Splice, SpliceRefusal, XmlWriter, encode_ooxml_escapes};
use crate::ooxml::opc::constants::namespace;
use crate::ooxml::xlsx::model::SharedStringTable;

fn write_si(w: &mut XmlWriter, s: &str) {
    let encoded = encode_ooxml_escapes(s);
    w.start_element("si").start_element("t");
    if encoded.starts_with(char::is_whitespace) || encoded.ends_with(char::is_whitespace) {
        w.attribute("xml:space", "preserve");
    }
    w.text(&encoded).end_element().end_element();
}

/// The whole table as a new part.
pub fn write_shared_strings(table: &SharedStringTable) -> Vec<u8> {
    let mut w = XmlWriter::with_capacity(256 + table.len() * 24);
    w.declaration()
        .start_element("sst")
        .attribute("xmlns", namespace::SML_MAIN)
        .attribute_int("count", table.references())
        .attribute_int("uniqueCount", table.len());
    for s in table.iter() {
        write_si(&mut w, s);
    }
    w.end_element();
    w.into_bytes()
}

/// Append the strings added since load to the source part and refresh
/// `count` and `uniqueCount`. Existing entries, rich text included, are
/// not touched.
pub fn append_shared_strings(src: &[u8], table: &SharedStringTable) -> Result<(Vec<u8>, Vec<String>)> {
    let mut splice = match Splice::parse(src)? {
        Ok(splice) => splice,
        Err(SpliceRefusal::PrefixedRoot(root)) => {
            return Ok((
                write_shared_strings(table),
                vec![format!("shared strings root <{root}> is prefixed; part regenerated as plain text")],
            ));
        },
    };
    for s in table.new_strings() {
        let mut w = XmlWriter::with_capacity(s.len() + 32);
        write_si(&mut w, s);
        splice.insert_child("si", w.into_bytes(), &[]);
    }
    let mut fmt = itoa::Buffer::new();
    splice.set_root_attr("count", Some(fmt.format(table.references())));
    splice.set_root_attr("uniqueCount", Some(fmt.format(table.len())));
    Ok((splice.finish(), Vec::new()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::xlsx::parsers::parse_shared_strings;

    #[test]
    fn test_full_table() {
        let mut table = SharedStringTable::new();
        table.add("a<b");
        table.add(" x ");
        table.add("a<b");
        let xml = String::from_utf8(write_shared_strings(&table)).unwrap();
        assert!(xml.contains("count=\"3\" uniqueCount=\"2\""));
        assert!(xml.contains("<si><t>a&lt;b</t></si><si><t xml:space=\"preserve\"> x </t></si>"));
    }

    #[test]
    fn test_append_keeps_rich_text() {
        let src = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<sst xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main" count="2" uniqueCount="1"><si><r><rPr><b/></rPr><t>Bold</t></r></si></sst>"#;
        let mut table = parse_shared_strings(src).unwrap().value;
        table.add("Bold");
        table.add("New");
        let (bytes, warnings) = append_shared_strings(src, &table).unwrap();
        assert!(warnings.is_empty());
        let xml = String::from_utf8(bytes).unwrap();
        assert!(xml.contains("count=\"4\" uniqueCount=\"2\""));
        assert!(xml.contains("<si><r><rPr><b/></rPr><t>Bold</t></r></si><si><t>New</t></si></sst>"));
        let back = parse_shared_strings(xml.as_bytes()).unwrap().value;
        assert_eq!(back.get(1), Some("New"));
    }
}
