//! Event-driven XML reader.
//!
//! The reader tokenizes with `quick-xml` and keeps its own element stack,
//! so element nesting, depth limits and positions are checked uniformly in
//! every mode. Names and attribute views handed to a [`SaxHandler`] borrow
//! the input and are valid only for the duration of the callback.
//!
//! Character data is collected per element while [`SaxHandler::collect_text`]
//! is on and delivered once, as escaped text, right before the element's
//! `end_element` event. CDATA sections are escaped into the same buffer, so
//! consumers always unescape exactly once.
//!
//! Three entry points exist: whole-buffer ([`SaxReader::parse_bytes`],
//! [`SaxReader::parse_str`]), file ([`SaxReader::parse_file`], read in
//! 8 KiB chunks) and incremental ([`SaxReader::begin`] returning a
//! [`PushParser`]).

use super::error::{Result, XmlError, XmlErrorKind};
use super::escape::escape_text;
use memchr::{memchr, memchr_iter, memchr3, memmem, memrchr};
use quick_xml::Reader;
use quick_xml::events::Event;
use quick_xml::events::attributes::Attribute;
use smallvec::SmallVec;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Chunk size used when reading from files and readers.
pub const READ_CHUNK_SIZE: usize = 8 * 1024;

/// Default element nesting limit.
pub const DEFAULT_MAX_DEPTH: usize = 256;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// A borrowed attribute. `value` is the raw, still-escaped source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr<'a> {
    pub name: &'a str,
    pub value: &'a str,
}

impl<'a> Attr<'a> {
    /// Local part of the name (`r:id` → `id`).
    #[inline]
    pub fn local_name(&self) -> &'a str {
        local_name(self.name)
    }

    /// Value with entities and character references decoded.
    #[inline]
    pub fn unescaped(&self) -> std::borrow::Cow<'a, str> {
        super::escape::unescape(self.value)
    }
}

/// Strip a namespace prefix.
#[inline]
pub fn local_name(name: &str) -> &str {
    match name.rfind(':') {
        Some(pos) => &name[pos + 1..],
        None => name,
    }
}

/// Control returned from handler callbacks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Stop parsing cleanly. The parse call returns `Ok`.
    Stop,
    /// Abort with a callback error.
    Failed(String),
}

pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Receiver of SAX events.
///
/// `depth` is the nesting level of the element the event belongs to; the
/// root element is at depth 0.
pub trait SaxHandler {
    fn start_element(&mut self, name: &str, attrs: &[Attr<'_>], depth: usize) -> HandlerResult;

    fn end_element(&mut self, name: &str, depth: usize) -> HandlerResult;

    /// Collected, escaped character data of the element about to end.
    fn text(&mut self, text: &str, depth: usize) -> HandlerResult {
        let _ = (text, depth);
        Ok(())
    }

    fn comment(&mut self, text: &str) -> HandlerResult {
        let _ = text;
        Ok(())
    }

    fn processing_instruction(&mut self, target: &str, data: &str) -> HandlerResult {
        let _ = (target, data);
        Ok(())
    }

    /// Called once with the error that terminates a parse.
    fn error(&mut self, error: &XmlError) {
        let _ = error;
    }

    /// Whether character data should be collected right now.
    fn collect_text(&self) -> bool {
        true
    }
}

/// Reader configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaxOptions {
    /// Trim leading/trailing whitespace from collected text.
    pub trim_text: bool,
    pub max_depth: usize,
    /// Upper bound on the text collected for one element.
    pub max_text_len: usize,
}

impl Default for SaxOptions {
    fn default() -> Self {
        Self {
            trim_text: true,
            max_depth: DEFAULT_MAX_DEPTH,
            max_text_len: 256 * 1024 * 1024,
        }
    }
}

impl SaxOptions {
    /// Keep whitespace exactly as written (cell values, shared strings).
    pub fn preserve_whitespace() -> Self {
        Self {
            trim_text: false,
            ..Self::default()
        }
    }
}

/// Reusable reader with a sticky error state.
#[derive(Debug, Default)]
pub struct SaxReader {
    options: SaxOptions,
    error: Option<XmlError>,
}

impl SaxReader {
    pub fn new(options: SaxOptions) -> Self {
        Self {
            options,
            error: None,
        }
    }

    pub fn options(&self) -> &SaxOptions {
        &self.options
    }

    /// The error that put the reader into its failed state, if any.
    pub fn last_error(&self) -> Option<&XmlError> {
        self.error.as_ref()
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Clear the failed state so the reader can be used again.
    pub fn reset(&mut self) {
        self.error = None;
    }

    /// Parse a complete document held in memory.
    pub fn parse_bytes<H: SaxHandler>(&mut self, input: &[u8], handler: &mut H) -> Result<()> {
        self.check_usable()?;
        let input = input.strip_prefix(UTF8_BOM).unwrap_or(input);
        let mut engine = Engine::new(handler, self.options);
        let result = engine
            .run(input, TextPos::START)
            .and_then(|flow| match flow {
                Flow::Stopped => Ok(()),
                Flow::Continue => engine.finish(TextPos::START.advance(input)),
            });
        self.settle(engine, result)
    }

    pub fn parse_str<H: SaxHandler>(&mut self, input: &str, handler: &mut H) -> Result<()> {
        self.parse_bytes(input.as_bytes(), handler)
    }

    /// Parse a file, reading it in [`READ_CHUNK_SIZE`] chunks.
    pub fn parse_file<H: SaxHandler>(&mut self, path: impl AsRef<Path>, handler: &mut H) -> Result<()> {
        self.check_usable()?;
        let file = match File::open(path.as_ref()) {
            Ok(file) => file,
            Err(e) => {
                let err = XmlError::new(
                    XmlErrorKind::IoError,
                    format!("cannot open {}: {e}", path.as_ref().display()),
                );
                handler.error(&err);
                self.error = Some(err.clone());
                return Err(err);
            },
        };
        self.parse_reader(file, handler)
    }

    /// Parse from any reader in [`READ_CHUNK_SIZE`] chunks.
    pub fn parse_reader<R: Read, H: SaxHandler>(&mut self, mut reader: R, handler: &mut H) -> Result<()> {
        let mut parser = self.begin(handler)?;
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];
        loop {
            let n = match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return parser.fail(XmlError::from(e)),
            };
            parser.feed(&chunk[..n])?;
            if parser.is_stopped() {
                break;
            }
        }
        parser.end()
    }

    /// Start an incremental parse.
    pub fn begin<'a, H: SaxHandler>(&'a mut self, handler: &'a mut H) -> Result<PushParser<'a, H>> {
        self.check_usable()?;
        let options = self.options;
        Ok(PushParser {
            reader: self,
            engine: Engine::new(handler, options),
            buf: Vec::with_capacity(READ_CHUNK_SIZE * 2),
            scanned: 0,
            safe: 0,
            lex: Lex::Text,
            origin: TextPos::START,
            at_start: true,
            stopped: false,
            failed: false,
        })
    }

    fn check_usable(&self) -> Result<()> {
        match &self.error {
            Some(err) => Err(XmlError::new(
                XmlErrorKind::InvalidInput,
                format!("reader is in a failed state ({}); reset it first", err.message),
            )),
            None => Ok(()),
        }
    }

    fn settle<H: SaxHandler>(&mut self, engine: Engine<'_, H>, result: Result<()>) -> Result<()> {
        if let Err(err) = &result {
            engine.handler.error(err);
            self.error = Some(err.clone());
        }
        result
    }
}

/// Incremental parser returned by [`SaxReader::begin`].
///
/// Input is buffered until a markup boundary is seen; everything before the
/// last complete tag is tokenized on each [`PushParser::feed`].
pub struct PushParser<'a, H: SaxHandler> {
    reader: &'a mut SaxReader,
    engine: Engine<'a, H>,
    buf: Vec<u8>,
    scanned: usize,
    safe: usize,
    lex: Lex,
    origin: TextPos,
    at_start: bool,
    stopped: bool,
    failed: bool,
}

impl<H: SaxHandler> PushParser<'_, H> {
    /// Supply the next slice of the document.
    pub fn feed(&mut self, data: &[u8]) -> Result<()> {
        if self.failed {
            return Err(self.sticky());
        }
        if self.stopped || data.is_empty() {
            return Ok(());
        }
        self.buf.extend_from_slice(data);
        if self.at_start {
            if self.buf.len() < UTF8_BOM.len() && UTF8_BOM.starts_with(&self.buf) {
                return Ok(());
            }
            if self.buf.starts_with(UTF8_BOM) {
                self.buf.drain(..UTF8_BOM.len());
            }
            self.at_start = false;
        }
        self.scan();
        if self.safe == 0 {
            return Ok(());
        }

        let cut = self.safe;
        let flow = self.engine.run(&self.buf[..cut], self.origin);
        match flow {
            Ok(Flow::Continue) => {
                self.origin = self.origin.advance(&self.buf[..cut]);
                self.buf.drain(..cut);
                self.scanned -= cut;
                self.safe = 0;
                Ok(())
            },
            Ok(Flow::Stopped) => {
                self.stopped = true;
                self.buf.clear();
                Ok(())
            },
            Err(err) => self.fail(err),
        }
    }

    /// Whether a handler asked to stop.
    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    /// Flush remaining input and check the document is complete.
    pub fn end(mut self) -> Result<()> {
        if self.failed {
            return Err(self.sticky());
        }
        if self.stopped {
            return Ok(());
        }
        let rest = std::mem::take(&mut self.buf);
        let result = self
            .engine
            .run(&rest, self.origin)
            .and_then(|flow| match flow {
                Flow::Stopped => Ok(()),
                Flow::Continue => self.engine.finish(self.origin.advance(&rest)),
            });
        match result {
            Ok(()) => Ok(()),
            Err(err) => self.fail(err),
        }
    }

    fn fail(&mut self, err: XmlError) -> Result<()> {
        self.failed = true;
        self.engine.handler.error(&err);
        self.reader.error = Some(err.clone());
        Err(err)
    }

    fn sticky(&self) -> XmlError {
        self.reader
            .error
            .clone()
            .unwrap_or_else(|| XmlError::new(XmlErrorKind::InvalidInput, "parser already failed"))
    }

    /// Advance the markup lexer over unscanned bytes and record the offset
    /// just past the last complete piece of markup.
    fn scan(&mut self) {
        let buf = &self.buf;
        let mut i = self.scanned;
        while i < buf.len() {
            match self.lex {
                Lex::Text => match memchr(b'<', &buf[i..]) {
                    Some(p) => {
                        i += p;
                        self.lex = Lex::Open;
                    },
                    None => i = buf.len(),
                },
                Lex::Open => {
                    let rest = &buf[i..];
                    if rest.len() < 2 {
                        break;
                    }
                    match rest[1] {
                        b'?' => {
                            self.lex = Lex::Pi;
                            i += 2;
                        },
                        b'!' => {
                            if rest.starts_with(b"<!--") {
                                self.lex = Lex::Comment;
                                i += 4;
                            } else if rest.starts_with(b"<![CDATA[") {
                                self.lex = Lex::CData;
                                i += 9;
                            } else if b"<!--".starts_with(rest) || b"<![CDATA[".starts_with(rest) {
                                break;
                            } else {
                                self.lex = Lex::Doctype(0);
                                i += 2;
                            }
                        },
                        _ => {
                            self.lex = Lex::Tag(None);
                            i += 1;
                        },
                    }
                },
                Lex::Tag(Some(quote)) => match memchr(quote, &buf[i..]) {
                    Some(p) => {
                        i += p + 1;
                        self.lex = Lex::Tag(None);
                    },
                    None => i = buf.len(),
                },
                Lex::Tag(None) => match memchr3(b'"', b'\'', b'>', &buf[i..]) {
                    Some(p) => {
                        let b = buf[i + p];
                        i += p + 1;
                        if b == b'>' {
                            self.lex = Lex::Text;
                            self.safe = i;
                        } else {
                            self.lex = Lex::Tag(Some(b));
                        }
                    },
                    None => i = buf.len(),
                },
                Lex::Comment | Lex::CData | Lex::Pi => {
                    let terminator: &[u8] = match self.lex {
                        Lex::Comment => b"-->",
                        Lex::CData => b"]]>",
                        _ => b"?>",
                    };
                    match memmem::find(&buf[i..], terminator) {
                        Some(p) => {
                            i += p + terminator.len();
                            self.lex = Lex::Text;
                            self.safe = i;
                        },
                        None => {
                            i = buf.len().saturating_sub(terminator.len() - 1).max(i);
                            break;
                        },
                    }
                },
                Lex::Doctype(depth) => {
                    let b = buf[i];
                    i += 1;
                    match b {
                        b'[' => self.lex = Lex::Doctype(depth + 1),
                        b']' => self.lex = Lex::Doctype(depth.saturating_sub(1)),
                        b'>' if depth == 0 => {
                            self.lex = Lex::Text;
                            self.safe = i;
                        },
                        _ => {},
                    }
                },
            }
        }
        self.scanned = i;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lex {
    Text,
    /// Saw `<`, waiting to classify.
    Open,
    Tag(Option<u8>),
    Comment,
    CData,
    Pi,
    Doctype(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stopped,
}

/// 1-based line/column of a byte position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TextPos {
    line: u64,
    column: u64,
}

impl TextPos {
    const START: TextPos = TextPos { line: 1, column: 1 };

    fn advance(self, bytes: &[u8]) -> TextPos {
        match memrchr(b'\n', bytes) {
            Some(last) => TextPos {
                line: self.line + memchr_iter(b'\n', bytes).count() as u64,
                column: (bytes.len() - last) as u64,
            },
            None => TextPos {
                line: self.line,
                column: self.column + bytes.len() as u64,
            },
        }
    }
}

/// Tokenizer state shared across chunks.
struct Engine<'h, H: SaxHandler> {
    handler: &'h mut H,
    options: SaxOptions,
    /// Open element names, concatenated.
    names: String,
    name_starts: Vec<usize>,
    text: String,
    text_marks: Vec<usize>,
    seen_root: bool,
    root_closed: bool,
}

impl<'h, H: SaxHandler> Engine<'h, H> {
    fn new(handler: &'h mut H, options: SaxOptions) -> Self {
        Self {
            handler,
            options,
            names: String::with_capacity(256),
            name_starts: Vec::with_capacity(16),
            text: String::with_capacity(1024),
            text_marks: Vec::with_capacity(16),
            seen_root: false,
            root_closed: false,
        }
    }

    fn run(&mut self, data: &[u8], origin: TextPos) -> Result<Flow> {
        let mut reader = Reader::from_reader(data);
        {
            let config = reader.config_mut();
            config.trim_text(false);
            config.check_end_names = false;
            config.allow_unmatched_ends = true;
            config.expand_empty_elements = false;
        }

        loop {
            let before = reader.buffer_position() as usize;
            let event = match reader.read_event() {
                Ok(event) => event,
                Err(e) => {
                    let at = (reader.error_position() as usize).min(data.len());
                    return Err(self.error_at(XmlErrorKind::ParseFailed, e.to_string(), data, at, origin));
                },
            };
            let step = match event {
                Event::Eof => return Ok(Flow::Continue),
                event => self.dispatch(event),
            };
            match step {
                Ok(()) => {},
                Err(Fault::Stop) => return Ok(Flow::Stopped),
                Err(Fault::Xml(mut err)) => {
                    let pos = origin.advance(&data[..before.min(data.len())]);
                    if err.line == 0 {
                        err.line = pos.line;
                        err.column = pos.column;
                    }
                    return Err(err);
                },
            }
        }
    }

    fn dispatch(&mut self, event: Event<'_>) -> std::result::Result<(), Fault> {
        match event {
            Event::Start(e) => self.on_start(e.name().as_ref(), &e, false),
            Event::Empty(e) => self.on_start(e.name().as_ref(), &e, true),
            Event::End(e) => self.on_end(e.name().as_ref()),
            Event::Text(t) => self.on_text(&t),
            Event::CData(c) => {
                let escaped = escape_text(utf8(&c)?).into_owned();
                self.on_text(escaped.as_bytes())
            },
            Event::GeneralRef(r) => {
                let mut reference = Vec::with_capacity(r.len() + 2);
                reference.push(b'&');
                reference.extend_from_slice(&r);
                reference.push(b';');
                self.on_text(&reference)
            },
            Event::Comment(c) => {
                let text = utf8(&c)?;
                self.handler.comment(text).map_err(Fault::from)
            },
            Event::PI(pi) => {
                let target = utf8(pi.target())?;
                let content = utf8(pi.content())?;
                self.handler
                    .processing_instruction(target, content.trim_start())
                    .map_err(Fault::from)
            },
            Event::Decl(decl) => match decl.encoding() {
                Some(Ok(enc)) if !is_utf8_label(&enc) => Err(Fault::Xml(XmlError::new(
                    XmlErrorKind::EncodingError,
                    format!("unsupported encoding '{}'", String::from_utf8_lossy(&enc)),
                ))),
                _ => Ok(()),
            },
            Event::DocType(_) | Event::Eof => Ok(()),
        }
    }

    /// End-of-document checks.
    fn finish(&mut self, end: TextPos) -> Result<()> {
        if let Some(&start) = self.name_starts.last() {
            return Err(XmlError::at(
                XmlErrorKind::ParseFailed,
                format!("unexpected end of document: <{}> is not closed", &self.names[start..]),
                end.line,
                end.column,
            ));
        }
        if !self.seen_root {
            return Err(XmlError::at(
                XmlErrorKind::InvalidInput,
                "document has no root element",
                end.line,
                end.column,
            ));
        }
        Ok(())
    }

    fn on_start(
        &mut self,
        name: &[u8],
        element: &quick_xml::events::BytesStart<'_>,
        empty: bool,
    ) -> std::result::Result<(), Fault> {
        let name = utf8(name)?;
        let depth = self.name_starts.len();
        if depth == 0 {
            if self.root_closed {
                return Err(Fault::Xml(XmlError::new(
                    XmlErrorKind::ParseFailed,
                    format!("content after the root element: <{name}>"),
                )));
            }
            self.seen_root = true;
        }
        if depth >= self.options.max_depth {
            return Err(Fault::Xml(XmlError::new(
                XmlErrorKind::ParseFailed,
                format!("element depth exceeds {}", self.options.max_depth),
            )));
        }

        let mut owned: SmallVec<[Attribute<'_>; 16]> = SmallVec::new();
        for attr in element.attributes() {
            let attr = attr.map_err(|e| {
                Fault::Xml(XmlError::new(XmlErrorKind::ParseFailed, format!("bad attribute: {e}")))
            })?;
            owned.push(attr);
        }
        let mut views: SmallVec<[Attr<'_>; 16]> = SmallVec::with_capacity(owned.len());
        for attr in &owned {
            views.push(Attr {
                name: utf8(attr.key.as_ref())?,
                value: utf8(&attr.value)?,
            });
        }

        self.handler.start_element(name, &views, depth)?;
        if empty {
            if depth == 0 {
                self.root_closed = true;
            }
            return self.handler.end_element(name, depth).map_err(Fault::from);
        }
        self.name_starts.push(self.names.len());
        self.names.push_str(name);
        self.text_marks.push(self.text.len());
        Ok(())
    }

    fn on_end(&mut self, name: &[u8]) -> std::result::Result<(), Fault> {
        let name = utf8(name)?;
        let Some(&start) = self.name_starts.last() else {
            return Err(Fault::Xml(XmlError::new(
                XmlErrorKind::ParseFailed,
                format!("unexpected closing tag </{name}>"),
            )));
        };
        if &self.names[start..] != name {
            return Err(Fault::Xml(XmlError::new(
                XmlErrorKind::ParseFailed,
                format!("mismatched closing tag: expected </{}>, found </{name}>", &self.names[start..]),
            )));
        }
        let depth = self.name_starts.len() - 1;
        let mark = self.text_marks.pop().unwrap_or(0);

        let collected = &self.text[mark..];
        let collected = if self.options.trim_text {
            collected.trim_matches(|c: char| matches!(c, ' ' | '\t' | '\r' | '\n'))
        } else {
            collected
        };
        let flushed = if collected.is_empty() {
            Ok(())
        } else {
            self.handler.text(collected, depth)
        };
        self.text.truncate(mark);
        flushed?;

        let ended = self.handler.end_element(&self.names[start..], depth);
        self.names.truncate(start);
        self.name_starts.pop();
        if depth == 0 {
            self.root_closed = true;
        }
        ended.map_err(Fault::from)
    }

    fn on_text(&mut self, raw: &[u8]) -> std::result::Result<(), Fault> {
        if self.name_starts.is_empty() || !self.handler.collect_text() {
            return Ok(());
        }
        let s = utf8(raw)?;
        let mark = self.text_marks.last().copied().unwrap_or(0);
        if self.text.len() - mark + s.len() > self.options.max_text_len {
            return Err(Fault::Xml(XmlError::new(
                XmlErrorKind::MemoryError,
                format!("element text exceeds {} bytes", self.options.max_text_len),
            )));
        }
        self.text.push_str(s);
        Ok(())
    }

    fn error_at(
        &self,
        kind: XmlErrorKind,
        message: String,
        data: &[u8],
        at: usize,
        origin: TextPos,
    ) -> XmlError {
        let pos = origin.advance(&data[..at]);
        XmlError::at(kind, message, pos.line, pos.column)
    }
}

/// Internal control flow: a clean stop or an error.
enum Fault {
    Stop,
    Xml(XmlError),
}

impl From<HandlerError> for Fault {
    fn from(err: HandlerError) -> Self {
        match err {
            HandlerError::Stop => Fault::Stop,
            HandlerError::Failed(message) => {
                Fault::Xml(XmlError::new(XmlErrorKind::CallbackError, message))
            },
        }
    }
}

#[inline]
fn utf8(bytes: &[u8]) -> std::result::Result<&str, Fault> {
    std::str::from_utf8(bytes).map_err(|e| Fault::Xml(e.into()))
}

fn is_utf8_label(label: &[u8]) -> bool {
    label.eq_ignore_ascii_case(b"utf-8") || label.eq_ignore_ascii_case(b"utf8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Default)]
    struct Recorder {
        events: Vec<String>,
        attrs: Vec<Vec<(String, String)>>,
        errors: usize,
        stop_at: Option<String>,
    }

    impl SaxHandler for Recorder {
        fn start_element(&mut self, name: &str, attrs: &[Attr<'_>], depth: usize) -> HandlerResult {
            if self.stop_at.as_deref() == Some(name) {
                return Err(HandlerError::Stop);
            }
            if name == "boom" {
                return Err(HandlerError::Failed("boom".into()));
            }
            self.events.push(format!("start {name} {depth}"));
            self.attrs.push(
                attrs
                    .iter()
                    .map(|a| (a.name.to_string(), a.value.to_string()))
                    .collect(),
            );
            Ok(())
        }

        fn end_element(&mut self, name: &str, depth: usize) -> HandlerResult {
            self.events.push(format!("end {name} {depth}"));
            Ok(())
        }

        fn text(&mut self, text: &str, depth: usize) -> HandlerResult {
            self.events.push(format!("text {text} {depth}"));
            Ok(())
        }

        fn error(&mut self, _error: &XmlError) {
            self.errors += 1;
        }
    }

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<root a="1" b="x &amp; y"><item id="7">one</item><empty/><![CDATA[<raw>]]></root>"#;

    #[test]
    fn test_events_in_order() {
        let mut reader = SaxReader::default();
        let mut rec = Recorder::default();
        reader.parse_str(DOC, &mut rec).unwrap();
        assert_eq!(
            rec.events,
            vec![
                "start root 0",
                "start item 1",
                "text one 1",
                "end item 1",
                "start empty 1",
                "end empty 1",
                "text &lt;raw&gt; 0",
                "end root 0",
            ]
        );
        assert_eq!(
            rec.attrs[0],
            vec![("a".into(), "1".into()), ("b".into(), "x &amp; y".into())]
        );
    }

    #[test]
    fn test_push_parser_matches_buffer_parse() {
        let mut whole = Recorder::default();
        SaxReader::default().parse_str(DOC, &mut whole).unwrap();

        for chunk in [1usize, 2, 3, 7, 64] {
            let mut rec = Recorder::default();
            let mut reader = SaxReader::default();
            let mut parser = reader.begin(&mut rec).unwrap();
            for piece in DOC.as_bytes().chunks(chunk) {
                parser.feed(piece).unwrap();
            }
            parser.end().unwrap();
            assert_eq!(rec.events, whole.events, "chunk size {chunk}");
        }
    }

    #[test]
    fn test_entity_split_across_feeds() {
        let mut rec = Recorder::default();
        let mut reader = SaxReader::new(SaxOptions::preserve_whitespace());
        let mut parser = reader.begin(&mut rec).unwrap();
        parser.feed(b"<t>a &am").unwrap();
        parser.feed(b"p; b</t>").unwrap();
        parser.end().unwrap();
        assert_eq!(rec.events[1], "text a &amp; b 0");
    }

    #[test]
    fn test_trim_and_preserve() {
        let xml = "<t>  spaced  </t>";
        let mut rec = Recorder::default();
        SaxReader::default().parse_str(xml, &mut rec).unwrap();
        assert_eq!(rec.events[1], "text spaced 0");

        let mut rec = Recorder::default();
        SaxReader::new(SaxOptions::preserve_whitespace())
            .parse_str(xml, &mut rec)
            .unwrap();
        assert_eq!(rec.events[1], "text   spaced   0");
    }

    #[test]
    fn test_error_is_sticky_until_reset() {
        let mut reader = SaxReader::default();
        let mut rec = Recorder::default();
        let err = reader.parse_str("<a>\n  <b></a>", &mut rec).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::ParseFailed);
        assert_eq!(err.line, 2);
        assert_eq!(rec.errors, 1);
        assert!(reader.has_error());

        let again = reader.parse_str("<ok/>", &mut rec).unwrap_err();
        assert_eq!(again.kind(), XmlErrorKind::InvalidInput);

        reader.reset();
        reader.parse_str("<ok/>", &mut rec).unwrap();
    }

    #[test]
    fn test_unclosed_and_empty_input() {
        let mut rec = Recorder::default();
        let err = SaxReader::default().parse_str("<a><b/>", &mut rec).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::ParseFailed);

        let err = SaxReader::default().parse_str("   ", &mut rec).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::InvalidInput);
    }

    #[test]
    fn test_depth_limit() {
        let options = SaxOptions {
            max_depth: 3,
            ..SaxOptions::default()
        };
        let mut rec = Recorder::default();
        let err = SaxReader::new(options)
            .parse_str("<a><b><c><d/></c></b></a>", &mut rec)
            .unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::ParseFailed);
        assert!(err.message.contains("depth"));
    }

    #[test]
    fn test_non_utf8_declaration() {
        let mut rec = Recorder::default();
        let err = SaxReader::default()
            .parse_str(r#"<?xml version="1.0" encoding="ISO-8859-1"?><a/>"#, &mut rec)
            .unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::EncodingError);
    }

    #[test]
    fn test_stop_and_callback_failure() {
        let mut rec = Recorder {
            stop_at: Some("item".into()),
            ..Recorder::default()
        };
        SaxReader::default().parse_str(DOC, &mut rec).unwrap();
        assert_eq!(rec.events, vec!["start root 0"]);

        let mut rec = Recorder::default();
        let err = SaxReader::default()
            .parse_str("<a><boom/></a>", &mut rec)
            .unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::CallbackError);
    }

    #[test]
    fn test_bom_and_file_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("doc.xml");
        let mut bytes = UTF8_BOM.to_vec();
        bytes.extend_from_slice(DOC.as_bytes());
        std::fs::write(&path, &bytes).unwrap();

        let mut rec = Recorder::default();
        SaxReader::default().parse_file(&path, &mut rec).unwrap();
        assert_eq!(rec.events.len(), 8);

        let mut rec = Recorder::default();
        let err = SaxReader::default()
            .parse_file(dir.path().join("missing.xml"), &mut rec)
            .unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::IoError);
    }

    proptest! {
        #[test]
        fn prop_attribute_order_preserved(values in proptest::collection::vec("[a-z0-9 ]{0,8}", 1..12)) {
            let mut xml = String::from("<e");
            for (i, v) in values.iter().enumerate() {
                xml.push_str(&format!(" a{i}=\"{v}\""));
            }
            xml.push_str("/>");

            let mut rec = Recorder::default();
            SaxReader::default().parse_str(&xml, &mut rec).unwrap();
            let expected: Vec<(String, String)> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (format!("a{i}"), v.clone()))
                .collect();
            prop_assert_eq!(&rec.attrs[0], &expected);
        }
    }
}
