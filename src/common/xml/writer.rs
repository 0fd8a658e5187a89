//! Buffered XML emission.

use super::escape::{escape_attr_into, escape_text_into};
use std::io::{self, Write};

/// Declaration written at the top of every generated part, CRLF-terminated.
pub const XML_DECLARATION: &str =
    "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?>\r\n";

/// Default initial capacity of a part buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 4 * 1024 * 1024;

/// Append-only XML writer over a byte buffer.
///
/// Start tags stay open until content or the end tag arrives, so childless
/// elements come out self-closed. Element names are kept on an internal
/// stack; [`XmlWriter::end_element`] closes the innermost one.
#[derive(Debug, Default)]
pub struct XmlWriter {
    buf: Vec<u8>,
    names: String,
    name_starts: Vec<usize>,
    tag_open: bool,
}

impl XmlWriter {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
            names: String::with_capacity(128),
            name_starts: Vec::with_capacity(16),
            tag_open: false,
        }
    }

    pub fn declaration(&mut self) -> &mut Self {
        self.buf.extend_from_slice(XML_DECLARATION.as_bytes());
        self
    }

    pub fn start_element(&mut self, name: &str) -> &mut Self {
        self.close_start_tag();
        self.buf.push(b'<');
        self.buf.extend_from_slice(name.as_bytes());
        self.name_starts.push(self.names.len());
        self.names.push_str(name);
        self.tag_open = true;
        self
    }

    /// Add an attribute to the start tag just opened. The value is escaped.
    pub fn attribute(&mut self, name: &str, value: &str) -> &mut Self {
        debug_assert!(self.tag_open, "attribute outside a start tag");
        self.attr_prefix(name);
        escape_attr_into(&mut self.buf, value);
        self.buf.push(b'"');
        self
    }

    /// Add an attribute whose value is already escaped.
    pub fn attribute_raw(&mut self, name: &str, value: &str) -> &mut Self {
        self.attr_prefix(name);
        self.buf.extend_from_slice(value.as_bytes());
        self.buf.push(b'"');
        self
    }

    /// Add an attribute whose value `fill` appends directly to the buffer.
    /// The value must not need escaping.
    pub fn attribute_with(&mut self, name: &str, fill: impl FnOnce(&mut Vec<u8>)) -> &mut Self {
        self.attr_prefix(name);
        fill(&mut self.buf);
        self.buf.push(b'"');
        self
    }

    pub fn attribute_int<I: itoa::Integer>(&mut self, name: &str, value: I) -> &mut Self {
        self.attr_prefix(name);
        let mut fmt = itoa::Buffer::new();
        self.buf.extend_from_slice(fmt.format(value).as_bytes());
        self.buf.push(b'"');
        self
    }

    pub fn attribute_f64(&mut self, name: &str, value: f64) -> &mut Self {
        self.attr_prefix(name);
        write_number(&mut self.buf, value);
        self.buf.push(b'"');
        self
    }

    pub fn attribute_bool(&mut self, name: &str, value: bool) -> &mut Self {
        self.attribute_raw(name, if value { "1" } else { "0" })
    }

    /// Escaped character data.
    pub fn text(&mut self, text: &str) -> &mut Self {
        self.close_start_tag();
        escape_text_into(&mut self.buf, text);
        self
    }

    pub fn number(&mut self, value: f64) -> &mut Self {
        self.close_start_tag();
        write_number(&mut self.buf, value);
        self
    }

    pub fn int<I: itoa::Integer>(&mut self, value: I) -> &mut Self {
        self.close_start_tag();
        let mut fmt = itoa::Buffer::new();
        self.buf.extend_from_slice(fmt.format(value).as_bytes());
        self
    }

    /// Pre-serialised markup, copied as-is.
    pub fn raw(&mut self, markup: &str) -> &mut Self {
        self.raw_bytes(markup.as_bytes())
    }

    pub fn raw_bytes(&mut self, markup: &[u8]) -> &mut Self {
        self.close_start_tag();
        self.buf.extend_from_slice(markup);
        self
    }

    /// Close the innermost open element.
    pub fn end_element(&mut self) -> &mut Self {
        let Some(start) = self.name_starts.pop() else {
            debug_assert!(false, "end_element without an open element");
            return self;
        };
        if self.tag_open {
            self.buf.extend_from_slice(b"/>");
            self.tag_open = false;
        } else {
            self.buf.extend_from_slice(b"</");
            self.buf.extend_from_slice(self.names[start..].as_bytes());
            self.buf.push(b'>');
        }
        self.names.truncate(start);
        self
    }

    /// `<name>text</name>`
    pub fn text_element(&mut self, name: &str, text: &str) -> &mut Self {
        self.start_element(name).text(text).end_element()
    }

    /// Number of elements still open.
    pub fn depth(&self) -> usize {
        self.name_starts.len()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Take the buffered bytes. Open elements stay open.
    pub fn into_bytes(mut self) -> Vec<u8> {
        self.close_start_tag();
        std::mem::take(&mut self.buf)
    }

    /// Move everything buffered so far into `sink`, keeping the capacity.
    pub fn drain_to<W: Write + ?Sized>(&mut self, sink: &mut W) -> io::Result<()> {
        self.close_start_tag();
        sink.write_all(&self.buf)?;
        self.buf.clear();
        Ok(())
    }

    fn attr_prefix(&mut self, name: &str) {
        self.buf.push(b' ');
        self.buf.extend_from_slice(name.as_bytes());
        self.buf.extend_from_slice(b"=\"");
    }

    #[inline]
    fn close_start_tag(&mut self) {
        if self.tag_open {
            self.buf.push(b'>');
            self.tag_open = false;
        }
    }
}

/// Shortest round-tripping decimal form; integral values in the exact
/// integer range are written without a fraction.
pub fn write_number(out: &mut Vec<u8>, value: f64) {
    if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e15 {
        let mut fmt = itoa::Buffer::new();
        out.extend_from_slice(fmt.format(value as i64).as_bytes());
    } else {
        let mut fmt = ryu::Buffer::new();
        out.extend_from_slice(fmt.format(value).as_bytes());
    }
}

/// [`write_number`] into a fresh string.
pub fn format_number(value: f64) -> String {
    let mut out = Vec::with_capacity(24);
    write_number(&mut out, value);
    String::from_utf8(out).unwrap_or_default()
}
