//! Targeted rewriting of an existing XML part.
//!
//! [`Splice`] splits a document into its prolog, the root start tag, the
//! root's top-level children (with the bytes between them) and the
//! epilogue. Edits replace, insert or remove whole top-level children and
//! rewrite attributes; everything untouched is copied back byte-for-byte,
//! including elements this crate has no model for.

use super::error::{Result, XmlError, XmlErrorKind};
use super::escape::escape_xml;
use memchr::{memchr3, memmem};
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::borrow::Cow;
use std::ops::Range;

/// Schema order of `CT_Worksheet` children.
pub const WORKSHEET_ORDER: &[&str] = &[
    "sheetPr",
    "dimension",
    "sheetViews",
    "sheetFormatPr",
    "cols",
    "sheetData",
    "sheetCalcPr",
    "sheetProtection",
    "protectedRanges",
    "scenarios",
    "autoFilter",
    "sortState",
    "dataConsolidate",
    "customSheetViews",
    "mergeCells",
    "phoneticPr",
    "conditionalFormatting",
    "dataValidations",
    "hyperlinks",
    "printOptions",
    "pageMargins",
    "pageSetup",
    "headerFooter",
    "rowBreaks",
    "colBreaks",
    "customProperties",
    "cellWatches",
    "ignoredErrors",
    "smartTags",
    "drawing",
    "legacyDrawing",
    "legacyDrawingHF",
    "drawingHF",
    "picture",
    "oleObjects",
    "controls",
    "webPublishItems",
    "tableParts",
    "extLst",
];

/// Schema order of `CT_Workbook` children.
pub const WORKBOOK_ORDER: &[&str] = &[
    "fileVersion",
    "fileSharing",
    "workbookPr",
    "workbookProtection",
    "bookViews",
    "sheets",
    "functionGroups",
    "externalReferences",
    "definedNames",
    "calcPr",
    "oleSize",
    "customWorkbookViews",
    "pivotCaches",
    "smartTagPr",
    "smartTagTypes",
    "webPublishing",
    "fileRecoveryPr",
    "webPublishObjects",
    "extLst",
];

/// Schema order of `CT_Stylesheet` children.
pub const STYLESHEET_ORDER: &[&str] = &[
    "numFmts",
    "fonts",
    "fills",
    "borders",
    "cellStyleXfs",
    "cellXfs",
    "cellStyles",
    "dxfs",
    "tableStyles",
    "colors",
    "extLst",
];

#[derive(Debug, Clone)]
enum Item<'a> {
    /// Bytes between children (whitespace, comments) copied as-is.
    Gap(Range<usize>),
    Child { name: String, bytes: Cow<'a, [u8]> },
}

/// Why a part cannot be spliced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpliceRefusal {
    /// The root element carries a namespace prefix (`<x:worksheet>`).
    PrefixedRoot(String),
}

#[derive(Debug, Clone)]
pub struct Splice<'a> {
    src: &'a [u8],
    prolog: Range<usize>,
    root_name: String,
    root_tag: Range<usize>,
    root_attrs: Vec<(String, String)>,
    root_dirty: bool,
    items: Vec<Item<'a>>,
    epilogue: Range<usize>,
}

impl<'a> Splice<'a> {
    /// Split `src` into top-level pieces.
    ///
    /// The outer `Result` reports malformed XML; the inner one reports a
    /// well-formed part this splicer declines to edit.
    pub fn parse(src: &'a [u8]) -> Result<std::result::Result<Self, SpliceRefusal>> {
        let mut reader = Reader::from_reader(src);
        reader.config_mut().trim_text(false);

        let malformed = |reader: &Reader<&[u8]>, msg: String| {
            XmlError::new(
                XmlErrorKind::ParseFailed,
                format!("{msg} (byte {})", reader.buffer_position()),
            )
        };

        // Root start tag.
        let (root_name, root_tag, root_attrs, self_closing) = loop {
            let before = reader.buffer_position() as usize;
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    let after = reader.buffer_position() as usize;
                    break (name_of(&e)?, before..after, raw_attrs(&e)?, false);
                },
                Ok(Event::Empty(e)) => {
                    let after = reader.buffer_position() as usize;
                    break (name_of(&e)?, before..after, raw_attrs(&e)?, true);
                },
                Ok(Event::Eof) => {
                    return Err(XmlError::new(XmlErrorKind::InvalidInput, "document has no root element"));
                },
                Ok(_) => {},
                Err(e) => return Err(malformed(&reader, e.to_string())),
            }
        };
        if root_name.contains(':') {
            return Ok(Err(SpliceRefusal::PrefixedRoot(root_name)));
        }

        let mut items = Vec::new();
        let mut cursor = root_tag.end;
        let epilogue_start = if self_closing {
            root_tag.end
        } else {
            loop {
                let before = reader.buffer_position() as usize;
                match reader.read_event() {
                    Ok(Event::Start(e)) => {
                        let name = name_of(&e)?;
                        let end = e.to_end().into_owned();
                        reader
                            .read_to_end(end.name())
                            .map_err(|err| malformed(&reader, format!("<{name}>: {err}")))?;
                        let after = reader.buffer_position() as usize;
                        if before > cursor {
                            items.push(Item::Gap(cursor..before));
                        }
                        items.push(Item::Child {
                            name,
                            bytes: Cow::Borrowed(&src[before..after]),
                        });
                        cursor = after;
                    },
                    Ok(Event::Empty(e)) => {
                        let name = name_of(&e)?;
                        let after = reader.buffer_position() as usize;
                        if before > cursor {
                            items.push(Item::Gap(cursor..before));
                        }
                        items.push(Item::Child {
                            name,
                            bytes: Cow::Borrowed(&src[before..after]),
                        });
                        cursor = after;
                    },
                    Ok(Event::End(_)) => {
                        if before > cursor {
                            items.push(Item::Gap(cursor..before));
                        }
                        break before;
                    },
                    Ok(Event::Eof) => {
                        return Err(malformed(&reader, format!("<{root_name}> is not closed")));
                    },
                    Ok(_) => {},
                    Err(e) => return Err(malformed(&reader, e.to_string())),
                }
            }
        };

        Ok(Ok(Splice {
            src,
            prolog: 0..root_tag.start,
            root_name,
            root_tag: root_tag.clone(),
            root_attrs,
            root_dirty: false,
            items,
            epilogue: if self_closing {
                root_tag.end..src.len()
            } else {
                epilogue_start..src.len()
            },
        }))
    }

    pub fn root_name(&self) -> &str {
        &self.root_name
    }

    /// Raw (escaped) value of a root attribute.
    pub fn root_attr(&self, name: &str) -> Option<&str> {
        self.root_attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Prefix bound to `namespace` by an `xmlns:` attribute on the root.
    pub fn root_prefix_for(&self, namespace: &str) -> Option<&str> {
        self.root_attrs.iter().find_map(|(k, v)| match k.strip_prefix("xmlns:") {
            Some(prefix) if v == namespace => Some(prefix),
            _ => None,
        })
    }

    /// Set (or with `None`, remove) a root attribute.
    pub fn set_root_attr(&mut self, name: &str, value: Option<&str>) {
        let pos = self.root_attrs.iter().position(|(k, _)| k == name);
        match (pos, value) {
            (Some(i), Some(v)) => self.root_attrs[i].1 = escape_xml(v),
            (Some(i), None) => {
                self.root_attrs.remove(i);
            },
            (None, Some(v)) => self.root_attrs.push((name.to_string(), escape_xml(v))),
            (None, None) => return,
        }
        self.root_dirty = true;
    }

    /// Names of the top-level children, in document order.
    pub fn child_names(&self) -> impl Iterator<Item = &str> {
        self.items.iter().filter_map(|item| match item {
            Item::Child { name, .. } => Some(name.as_str()),
            Item::Gap(_) => None,
        })
    }

    pub fn has_child(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Bytes of the first child with this name.
    pub fn child(&self, name: &str) -> Option<&[u8]> {
        self.position(name).and_then(|i| match &self.items[i] {
            Item::Child { bytes, .. } => Some(bytes.as_ref()),
            Item::Gap(_) => None,
        })
    }

    /// Replace the first child named `name`, or insert it at its schema
    /// position given by `order`.
    pub fn replace_or_insert(&mut self, name: &str, element: Vec<u8>, order: &[&str]) {
        match self.position(name) {
            Some(i) => {
                self.items[i] = Item::Child {
                    name: name.to_string(),
                    bytes: Cow::Owned(element),
                };
            },
            None => self.insert(name, element, order),
        }
    }

    /// Insert a new child in schema position even if one with the same name
    /// already exists (it goes after the existing ones).
    pub fn insert_child(&mut self, name: &str, element: Vec<u8>, order: &[&str]) {
        self.insert(name, element, order);
    }

    /// Remove every child with this name. Returns how many were removed.
    pub fn remove(&mut self, name: &str) -> usize {
        let before = self.items.len();
        self.items
            .retain(|item| !matches!(item, Item::Child { name: n, .. } if n == name));
        before - self.items.len()
    }

    /// Append `fragment` inside the child `container` and set attributes on
    /// it (typically `count`). A missing container is created in schema
    /// position.
    pub fn append_to_child(
        &mut self,
        container: &str,
        fragment: &[u8],
        attrs: &[(&str, Option<&str>)],
        order: &[&str],
    ) -> Result<()> {
        match self.position(container) {
            Some(i) => {
                let Item::Child { bytes, .. } = &self.items[i] else {
                    return Ok(());
                };
                let appended = append_inside(bytes, fragment)?;
                let updated = set_attributes(&appended, attrs)?;
                self.items[i] = Item::Child {
                    name: container.to_string(),
                    bytes: Cow::Owned(updated),
                };
            },
            None => {
                let mut element = Vec::with_capacity(fragment.len() + 64);
                element.push(b'<');
                element.extend_from_slice(container.as_bytes());
                element.push(b'>');
                element.extend_from_slice(fragment);
                element.extend_from_slice(b"</");
                element.extend_from_slice(container.as_bytes());
                element.push(b'>');
                let element = set_attributes(&element, attrs)?;
                self.insert(container, element, order);
            },
        }
        Ok(())
    }

    /// Rewrite attributes on the start tag of the first child `name`.
    pub fn set_child_attributes(&mut self, name: &str, attrs: &[(&str, Option<&str>)]) -> Result<bool> {
        let Some(i) = self.position(name) else {
            return Ok(false);
        };
        let Item::Child { bytes, .. } = &self.items[i] else {
            return Ok(false);
        };
        let updated = set_attributes(bytes, attrs)?;
        self.items[i] = Item::Child {
            name: name.to_string(),
            bytes: Cow::Owned(updated),
        };
        Ok(true)
    }

    /// Serialise with all edits applied.
    pub fn finish(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.src.len() + 256);
        self.write_head(&mut out, self.items.len());
        self.write_tail(&mut out, self.items.len());
        out
    }

    /// Serialise around the child `name`: everything before it and
    /// everything after it. Used to stream a replacement for a large child.
    /// `None` when the child does not exist.
    pub fn split_around(&self, name: &str) -> Option<(Vec<u8>, Vec<u8>)> {
        let i = self.position(name)?;
        let mut head = Vec::with_capacity(4096);
        self.write_head(&mut head, i);
        let mut tail = Vec::with_capacity(4096);
        self.write_tail(&mut tail, i + 1);
        Some((head, tail))
    }

    fn write_head(&self, out: &mut Vec<u8>, items_until: usize) {
        out.extend_from_slice(&self.src[self.prolog.clone()]);
        self.write_root_start(out);
        for item in &self.items[..items_until] {
            self.write_item(out, item);
        }
    }

    fn write_tail(&self, out: &mut Vec<u8>, items_from: usize) {
        for item in &self.items[items_from.min(self.items.len())..] {
            self.write_item(out, item);
        }
        if self.is_self_closing() {
            out.extend_from_slice(b"</");
            out.extend_from_slice(self.root_name.as_bytes());
            out.push(b'>');
            out.extend_from_slice(&self.src[self.epilogue.clone()]);
        } else {
            out.extend_from_slice(&self.src[self.epilogue.clone()]);
        }
    }

    fn write_root_start(&self, out: &mut Vec<u8>) {
        if !self.root_dirty && !self.is_self_closing() {
            out.extend_from_slice(&self.src[self.root_tag.clone()]);
            return;
        }
        out.push(b'<');
        out.extend_from_slice(self.root_name.as_bytes());
        for (k, v) in &self.root_attrs {
            out.push(b' ');
            out.extend_from_slice(k.as_bytes());
            out.extend_from_slice(b"=\"");
            out.extend_from_slice(v.as_bytes());
            out.push(b'"');
        }
        out.push(b'>');
    }

    fn write_item(&self, out: &mut Vec<u8>, item: &Item<'_>) {
        match item {
            Item::Gap(range) => out.extend_from_slice(&self.src[range.clone()]),
            Item::Child { bytes, .. } => out.extend_from_slice(bytes),
        }
    }

    fn is_self_closing(&self) -> bool {
        self.src[self.root_tag.clone()].ends_with(b"/>")
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.items
            .iter()
            .position(|item| matches!(item, Item::Child { name: n, .. } if n == name))
    }

    fn insert(&mut self, name: &str, element: Vec<u8>, order: &[&str]) {
        let child = Item::Child {
            name: name.to_string(),
            bytes: Cow::Owned(element),
        };
        let Some(rank) = order.iter().position(|n| *n == name) else {
            let at = self.append_position();
            self.items.insert(at, child);
            return;
        };
        let later = self.items.iter().position(|item| match item {
            Item::Child { name: n, .. } => order
                .iter()
                .position(|o| o == n)
                .is_some_and(|r| r > rank),
            Item::Gap(_) => false,
        });
        let at = later.unwrap_or_else(|| self.append_position());
        self.items.insert(at, child);
    }

    /// After the last child, leaving trailing whitespace before the end tag.
    fn append_position(&self) -> usize {
        self.items
            .iter()
            .rposition(|item| matches!(item, Item::Child { .. }))
            .map_or(0, |i| i + 1)
    }
}

fn name_of(e: &BytesStart<'_>) -> Result<String> {
    Ok(std::str::from_utf8(e.name().as_ref())?.to_string())
}

fn raw_attrs(e: &BytesStart<'_>) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for attr in e.attributes().with_checks(false) {
        let attr = attr.map_err(|err| XmlError::new(XmlErrorKind::ParseFailed, err.to_string()))?;
        out.push((
            std::str::from_utf8(attr.key.as_ref())?.to_string(),
            std::str::from_utf8(&attr.value)?.to_string(),
        ));
    }
    Ok(out)
}

/// Offset just past the `>` of the start tag at the beginning of `element`.
fn start_tag_end(element: &[u8]) -> Result<usize> {
    let mut i = 1;
    let mut quote: Option<u8> = None;
    while i < element.len() {
        match quote {
            Some(q) => match memchr::memchr(q, &element[i..]) {
                Some(p) => {
                    i += p + 1;
                    quote = None;
                },
                None => break,
            },
            None => match memchr3(b'"', b'\'', b'>', &element[i..]) {
                Some(p) => {
                    let b = element[i + p];
                    i += p + 1;
                    if b == b'>' {
                        return Ok(i);
                    }
                    quote = Some(b);
                },
                None => break,
            },
        }
    }
    Err(XmlError::new(XmlErrorKind::ParseFailed, "unterminated start tag"))
}

/// Insert `fragment` before the closing tag of `element`, expanding a
/// self-closing element if needed.
pub fn append_inside(element: &[u8], fragment: &[u8]) -> Result<Vec<u8>> {
    let tag_end = start_tag_end(element)?;
    let mut out = Vec::with_capacity(element.len() + fragment.len() + 32);
    if element[..tag_end].ends_with(b"/>") {
        let name_end = element[1..]
            .iter()
            .position(|b| b.is_ascii_whitespace() || *b == b'/' || *b == b'>')
            .map_or(element.len(), |p| p + 1);
        out.extend_from_slice(&element[..tag_end - 2]);
        out.push(b'>');
        out.extend_from_slice(fragment);
        out.extend_from_slice(b"</");
        out.extend_from_slice(&element[1..name_end]);
        out.push(b'>');
        out.extend_from_slice(&element[tag_end..]);
        return Ok(out);
    }
    let close = memmem::rfind(element, b"</")
        .ok_or_else(|| XmlError::new(XmlErrorKind::ParseFailed, "element has no closing tag"))?;
    out.extend_from_slice(&element[..close]);
    out.extend_from_slice(fragment);
    out.extend_from_slice(&element[close..]);
    Ok(out)
}

/// Set or remove attributes on the start tag at the beginning of `element`.
/// Values are given unescaped; untouched attributes keep their source text.
pub fn set_attributes(element: &[u8], updates: &[(&str, Option<&str>)]) -> Result<Vec<u8>> {
    if updates.is_empty() {
        return Ok(element.to_vec());
    }
    let tag_end = start_tag_end(element)?;
    let self_closing = element[..tag_end].ends_with(b"/>");
    let inner_end = if self_closing { tag_end - 2 } else { tag_end - 1 };
    let inner = std::str::from_utf8(&element[1..inner_end])?;
    let name_len = inner
        .find(|c: char| c.is_ascii_whitespace())
        .unwrap_or(inner.len());
    let start = BytesStart::from_content(inner, name_len);

    let mut out = Vec::with_capacity(element.len() + 32);
    out.push(b'<');
    out.extend_from_slice(&inner.as_bytes()[..name_len]);
    let mut applied = vec![false; updates.len()];
    for attr in start.attributes().with_checks(false) {
        let attr = attr.map_err(|err| XmlError::new(XmlErrorKind::ParseFailed, err.to_string()))?;
        let key = std::str::from_utf8(attr.key.as_ref())?;
        match updates.iter().position(|(k, _)| *k == key) {
            Some(u) => {
                applied[u] = true;
                if let Some(value) = updates[u].1 {
                    push_attr(&mut out, key, &escape_xml(value));
                }
            },
            None => push_attr(&mut out, key, std::str::from_utf8(&attr.value)?),
        }
    }
    for (u, (key, value)) in updates.iter().enumerate() {
        if let (false, Some(value)) = (applied[u], value) {
            push_attr(&mut out, key, &escape_xml(value));
        }
    }
    out.extend_from_slice(if self_closing { b"/>" } else { b">" });
    out.extend_from_slice(&element[tag_end..]);
    Ok(out)
}

fn push_attr(out: &mut Vec<u8>, key: &str, raw_value: &str) {
    out.push(b' ');
    out.extend_from_slice(key.as_bytes());
    out.extend_from_slice(b"=\"");
    out.extend_from_slice(raw_value.as_bytes());
    out.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHEET: &[u8] = br#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<worksheet xmlns="urn:main" xmlns:r="urn:r"><dimension ref="A1"/><sheetData><row r="1"><c r="A1"><v>1</v></c></row></sheetData><mergeCells count="1"><mergeCell ref="A1:B1"/></mergeCells>
<extLst><ext uri="{X}"/></extLst></worksheet>"#;

    fn splice(src: &[u8]) -> Splice<'_> {
        Splice::parse(src).unwrap().unwrap()
    }

    #[test]
    fn test_untouched_round_trip_is_identical() {
        let s = splice(SHEET);
        assert_eq!(s.finish(), SHEET);
        assert_eq!(
            s.child_names().collect::<Vec<_>>(),
            vec!["dimension", "sheetData", "mergeCells", "extLst"]
        );
    }

    #[test]
    fn test_replace_keeps_unknown_children() {
        let mut s = splice(SHEET);
        s.replace_or_insert("sheetData", b"<sheetData/>".to_vec(), WORKSHEET_ORDER);
        let out = String::from_utf8(s.finish()).unwrap();
        assert!(out.contains("<dimension ref=\"A1\"/><sheetData/><mergeCells count=\"1\">"));
        assert!(out.contains("<extLst><ext uri=\"{X}\"/></extLst></worksheet>"));
    }

    #[test]
    fn test_insert_in_schema_order() {
        let mut s = splice(SHEET);
        s.replace_or_insert("drawing", br#"<drawing r:id="rId1"/>"#.to_vec(), WORKSHEET_ORDER);
        s.replace_or_insert("cols", b"<cols/>".to_vec(), WORKSHEET_ORDER);
        assert_eq!(
            s.child_names().collect::<Vec<_>>(),
            vec!["dimension", "cols", "sheetData", "mergeCells", "drawing", "extLst"]
        );
    }

    #[test]
    fn test_append_to_child_updates_count() {
        let styles = br#"<styleSheet xmlns="urn:main"><numFmts count="1"><numFmt numFmtId="164" formatCode="0.0"/></numFmts><cellXfs count="1"><xf numFmtId="0"/></cellXfs></styleSheet>"#;
        let mut s = splice(styles);
        s.append_to_child(
            "cellXfs",
            br#"<xf numFmtId="164"/>"#,
            &[("count", Some("2"))],
            STYLESHEET_ORDER,
        )
        .unwrap();
        s.append_to_child("fonts", b"<font/>", &[("count", Some("1"))], STYLESHEET_ORDER)
            .unwrap();
        let out = String::from_utf8(s.finish()).unwrap();
        assert!(out.contains(r#"<cellXfs count="2"><xf numFmtId="0"/><xf numFmtId="164"/></cellXfs>"#));
        assert!(out.contains(r#"</numFmts><fonts count="1"><font/></fonts><cellXfs"#));
    }

    #[test]
    fn test_root_attrs_and_self_closing_root() {
        let mut s = splice(br#"<sst xmlns="urn:main" count="0" uniqueCount="0"/>"#);
        s.set_root_attr("count", Some("1"));
        s.set_root_attr("uniqueCount", Some("1"));
        s.replace_or_insert("si", b"<si><t>a</t></si>".to_vec(), &[]);
        assert_eq!(
            s.finish(),
            br#"<sst xmlns="urn:main" count="1" uniqueCount="1"><si><t>a</t></si></sst>"#
        );
    }

    #[test]
    fn test_split_around() {
        let s = splice(SHEET);
        let (head, tail) = s.split_around("sheetData").unwrap();
        assert!(head.ends_with(b"<dimension ref=\"A1\"/>"));
        assert!(tail.starts_with(b"<mergeCells"));
        assert!(s.split_around("cols").is_none());
    }

    #[test]
    fn test_prefixed_root_is_refused() {
        let refused = Splice::parse(br#"<x:worksheet xmlns:x="urn:main"><x:sheetData/></x:worksheet>"#)
            .unwrap()
            .unwrap_err();
        assert_eq!(refused, SpliceRefusal::PrefixedRoot("x:worksheet".into()));
    }

    #[test]
    fn test_set_attributes_helper() {
        let out = set_attributes(br#"<calcPr calcId="191029"/>"#, &[("fullCalcOnLoad", Some("1"))]).unwrap();
        assert_eq!(out, br#"<calcPr calcId="191029" fullCalcOnLoad="1"/>"#);
        let out = set_attributes(br#"<a x="1" y="2">t</a>"#, &[("x", None), ("y", Some("3"))]).unwrap();
        assert_eq!(out, br#"<a y="3">t</a>"#);
    }

    #[test]
    fn test_remove() {
        let mut s = splice(SHEET);
        assert_eq!(s.remove("mergeCells"), 1);
        assert!(!s.has_child("mergeCells"));
        assert_eq!(s.remove("mergeCells"), 0);
    }
}
