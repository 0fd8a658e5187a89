//! `xl/sharedStrings.xml`.
//!
//! Each `<si>` becomes one string: the concatenation of its `<t>` runs,
//! whether direct or inside `<r>`. Phonetic runs (`<rPh>`) are skipped.

use crate::common::xml::parser::{self, ElementParser, Parsed, ParserContext, attr_i64};
use crate::common::xml::{Attr, HandlerResult, Result, SaxOptions, decode_ooxml_escapes};
use crate::ooxml::xlsx::model::SharedStringTable;

#[derive(Debug, Default)]
struct SharedStringsParser {
    strings: Vec<String>,
    current: String,
    in_si: bool,
    count: Option<u64>,
}

impl ElementParser for SharedStringsParser {
    fn start(&mut self, ctx: &mut ParserContext, name: &str, attrs: &[Attr<'_>]) -> HandlerResult {
        match name {
            "sst" => {
                self.count = attr_i64(attrs, "count").and_then(|c| u64::try_from(c).ok());
                if let Some(unique) = attr_i64(attrs, "uniqueCount").and_then(|c| usize::try_from(c).ok()) {
                    self.strings.reserve(unique.min(1 << 20));
                }
            },
            "si" => {
                self.in_si = true;
                self.current.clear();
            },
            "t" if self.in_si && !ctx.is_in_element("rPh") => ctx.start_text(),
            _ => {},
        }
        Ok(())
    }

    fn end(&mut self, ctx: &mut ParserContext, name: &str) -> HandlerResult {
        match name {
            "t" if ctx.is_collecting() => {
                let text = ctx.take_text();
                self.current.push_str(&decode_ooxml_escapes(&text));
            },
            "si" => {
                self.in_si = false;
                self.strings.push(std::mem::take(&mut self.current));
            },
            _ => {},
        }
        Ok(())
    }
}

impl SharedStringsParser {
    fn finish(self, warnings: Vec<String>) -> Parsed<SharedStringTable> {
        Parsed {
            value: SharedStringTable::from_source(self.strings, self.count),
            warnings,
        }
    }
}

pub fn parse_shared_strings(input: &[u8]) -> Result<Parsed<SharedStringTable>> {
    let mut parser = SharedStringsParser::default();
    let warnings = parser::run(&mut parser, input, SaxOptions::preserve_whitespace())?;
    Ok(parser.finish(warnings))
}

/// Like [`parse_shared_strings`], reading the part in chunks.
pub fn parse_shared_strings_chunked<F>(source: F) -> Result<Parsed<SharedStringTable>>
where
    F: FnOnce(&mut dyn FnMut(&[u8]) -> bool) -> Result<()>,
{
    let mut parser = SharedStringsParser::default();
    let warnings = parser::run_chunked(&mut parser, SaxOptions::preserve_whitespace(), source)?;
    Ok(parser.finish(warnings))
}
