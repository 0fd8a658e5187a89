//! `xl/styles.xml`, reduced to what [`StyleTable`] tracks.

use super::root_is_prefixed;
use crate::common::xml::parser::{self, ElementParser, Parsed, ParserContext, attr_str, attr_u32};
use crate::common::xml::{Attr, HandlerResult, Result, SaxOptions};
use crate::ooxml::xlsx::model::{StyleTable, XfRecord};
use std::collections::BTreeMap;

#[derive(Default)]
struct StylesParser {
    num_fmts: BTreeMap<u32, String>,
    xfs: Vec<XfRecord>,
    fonts: u32,
    fills: u32,
    borders: u32,
}

impl ElementParser for StylesParser {
    fn start(&mut self, ctx: &mut ParserContext, name: &str, attrs: &[Attr<'_>]) -> HandlerResult {
        let parent = ctx.parent_element();
        match (parent, name) {
            (Some("numFmts"), "numFmt") => match (attr_u32(attrs, "numFmtId"), attr_str(attrs, "formatCode")) {
                (Some(id), Some(code)) => {
                    self.num_fmts.insert(id, code.into_owned());
                },
                _ => ctx.warn("<numFmt> without numFmtId or formatCode skipped"),
            },
            (Some("fonts"), "font") => self.fonts += 1,
            (Some("fills"), "fill") => self.fills += 1,
            (Some("borders"), "border") => self.borders += 1,
            (Some("cellXfs"), "xf") => self.xfs.push(XfRecord {
                num_fmt_id: attr_u32(attrs, "numFmtId").unwrap_or(0),
                font_id: attr_u32(attrs, "fontId").unwrap_or(0),
                fill_id: attr_u32(attrs, "fillId").unwrap_or(0),
                border_id: attr_u32(attrs, "borderId").unwrap_or(0),
            }),
            _ => {},
        }
        Ok(())
    }
}

pub fn parse_styles(input: &[u8]) -> Result<Parsed<StyleTable>> {
    let mut parser = StylesParser::default();
    let mut warnings = parser::run(&mut parser, input, SaxOptions::default())?;
    let prefixed = root_is_prefixed(input);
    if prefixed {
        warnings.push("styles part uses a prefixed root; new formats cannot be appended".to_string());
    }
    Ok(Parsed {
        value: StyleTable::from_parts(
            parser.num_fmts,
            parser.xfs,
            (parser.fonts, parser.fills, parser.borders),
            prefixed,
        ),
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_styles() {
        let xml = br#"<?xml version="1.0" encoding="UTF-8"?>
<styleSheet xmlns="http://schemas.openxmlformats.org/spreadsheetml/2006/main">
<numFmts count="1"><numFmt numFmtId="165" formatCode="yyyy\-mm\-dd"/></numFmts>
<fonts count="2"><font><sz val="11"/></font><font><b/></font></fonts>
<fills count="2"><fill/><fill/></fills>
<borders count="1"><border/></borders>
<cellStyleXfs count="1"><xf numFmtId="0" fontId="0"/></cellStyleXfs>
<cellXfs count="3"><xf numFmtId="0" fontId="0"/><xf numFmtId="165" fontId="1" applyNumberFormat="1"/><xf numFmtId="14"/></cellXfs>
</styleSheet>"#;
        let parsed = parse_styles(xml).unwrap();
        assert!(parsed.warnings.is_empty());
        let table = parsed.value;
        assert_eq!(table.xf_count(), 3);
        assert_eq!((table.font_count(), table.fill_count(), table.border_count()), (2, 2, 1));
        assert_eq!(table.num_fmt_code(165), Some("yyyy\\-mm\\-dd"));
        assert_eq!(table.date_style_flags(), vec![false, true, true]);
        assert!(!table.is_prefixed_root());
    }

    #[test]
    fn test_prefixed_root() {
        let xml = br#"<x:styleSheet xmlns:x="http://schemas.openxmlformats.org/spreadsheetml/2006/main"><x:cellXfs count="1"><x:xf numFmtId="14"/></x:cellXfs></x:styleSheet>"#;
        let parsed = parse_styles(xml).unwrap();
        assert!(parsed.value.is_prefixed_root());
        assert!(parsed.value.is_date_style(0));
        assert_eq!(parsed.warnings.len(), 1);
    }
}
