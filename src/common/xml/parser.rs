//! Shared scaffolding for the specialised SAX parsers.
//!
//! A parser implements [`ElementParser`] and is driven by [`run`], which
//! keeps the element stack and the text-collection switch in a
//! [`ParserContext`]. Attribute helpers read typed values straight from
//! the borrowed attribute batch.

use super::error::{Result, XmlError, XmlErrorKind};
use super::escape::unescape;
use super::sax::{Attr, HandlerError, HandlerResult, SaxHandler, SaxOptions, SaxReader, local_name};
use std::borrow::Cow;

/// Parse result together with the warnings raised while producing it.
#[derive(Debug, Clone, Default)]
pub struct Parsed<T> {
    pub value: T,
    pub warnings: Vec<String>,
}

/// Element stack, text buffer and diagnostics shared by every parser.
#[derive(Debug, Default)]
pub struct ParserContext {
    /// Local names of the open elements, root first.
    stack: Vec<String>,
    text: String,
    collecting: bool,
    warnings: Vec<String>,
    error: Option<String>,
}

impl ParserContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an element with this local name is currently open.
    pub fn is_in_element(&self, local: &str) -> bool {
        self.stack.iter().rev().any(|n| n == local)
    }

    /// Local name of the innermost open element.
    pub fn current_element(&self) -> Option<&str> {
        self.stack.last().map(String::as_str)
    }

    /// Local name of the parent of the innermost open element.
    pub fn parent_element(&self) -> Option<&str> {
        let len = self.stack.len();
        if len < 2 { None } else { Some(&self.stack[len - 2]) }
    }

    /// Number of open elements.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Begin collecting character data, discarding anything collected so far.
    pub fn start_text(&mut self) {
        self.text.clear();
        self.collecting = true;
    }

    /// Stop collecting and return the unescaped text.
    pub fn take_text(&mut self) -> String {
        self.collecting = false;
        let raw = std::mem::take(&mut self.text);
        match unescape(&raw) {
            Cow::Borrowed(_) => raw,
            Cow::Owned(s) => s,
        }
    }

    /// Stop collecting without returning anything.
    pub fn stop_text(&mut self) {
        self.collecting = false;
        self.text.clear();
    }

    pub fn is_collecting(&self) -> bool {
        self.collecting
    }

    pub fn warn(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    /// Record a failure and produce the handler error that aborts the parse.
    pub fn fail(&mut self, message: impl Into<String>) -> HandlerError {
        let message = message.into();
        self.error = Some(message.clone());
        HandlerError::Failed(message)
    }

    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_deref()
    }
}

/// A specialised parser driven by [`run`].
///
/// Names handed to the callbacks are local names; `ctx.current_element()`
/// already reflects the element in `start` and still reflects it in `end`.
pub trait ElementParser {
    fn start(&mut self, ctx: &mut ParserContext, name: &str, attrs: &[Attr<'_>]) -> HandlerResult;

    fn end(&mut self, ctx: &mut ParserContext, name: &str) -> HandlerResult {
        let _ = (ctx, name);
        Ok(())
    }
}

struct Driver<'p, P> {
    parser: &'p mut P,
    ctx: ParserContext,
}

impl<P: ElementParser> SaxHandler for Driver<'_, P> {
    fn start_element(&mut self, name: &str, attrs: &[Attr<'_>], _depth: usize) -> HandlerResult {
        let local = local_name(name);
        self.ctx.stack.push(local.to_string());
        self.parser.start(&mut self.ctx, local, attrs)
    }

    fn end_element(&mut self, name: &str, _depth: usize) -> HandlerResult {
        let result = self.parser.end(&mut self.ctx, local_name(name));
        self.ctx.stack.pop();
        result
    }

    fn text(&mut self, text: &str, _depth: usize) -> HandlerResult {
        if self.ctx.collecting {
            self.ctx.text.push_str(text);
        }
        Ok(())
    }

    fn collect_text(&self) -> bool {
        self.ctx.collecting
    }
}

/// Drive `parser` over a complete document held in memory.
pub fn run<P: ElementParser>(parser: &mut P, input: &[u8], options: SaxOptions) -> Result<Vec<String>> {
    let mut driver = Driver {
        parser,
        ctx: ParserContext::new(),
    };
    let outcome = SaxReader::new(options).parse_bytes(input, &mut driver);
    finish(driver.ctx, outcome)
}

/// Drive `parser` over a document delivered in chunks by `source`.
///
/// `source` is called with a sink; it pushes every chunk it has and returns
/// once the input is exhausted. Used with [`longan_zip::ZipReader::stream`]
/// so a large part is never held as one buffer.
pub fn run_chunked<P, F>(parser: &mut P, options: SaxOptions, source: F) -> Result<Vec<String>>
where
    P: ElementParser,
    F: FnOnce(&mut dyn FnMut(&[u8]) -> bool) -> Result<()>,
{
    let mut driver = Driver {
        parser,
        ctx: ParserContext::new(),
    };
    let mut reader = SaxReader::new(options);
    let outcome = (|| {
        let mut push = reader.begin(&mut driver)?;
        let mut failure: Option<XmlError> = None;
        source(&mut |chunk: &[u8]| match push.feed(chunk) {
            Ok(()) => !push.is_stopped(),
            Err(err) => {
                failure = Some(err);
                false
            },
        })?;
        if let Some(err) = failure {
            return Err(err);
        }
        push.end()
    })();
    finish(driver.ctx, outcome)
}

fn finish(ctx: ParserContext, outcome: Result<()>) -> Result<Vec<String>> {
    match (outcome, ctx.error) {
        (Ok(()), None) => Ok(ctx.warnings),
        (Ok(()), Some(message)) => Err(XmlError::new(XmlErrorKind::CallbackError, message)),
        (Err(err), _) => Err(err),
    }
}

/// Raw (still escaped) value of the attribute `name`, matched on the
/// qualified name first and then on the local name.
pub fn attr<'a>(attrs: &[Attr<'a>], name: &str) -> Option<&'a str> {
    attrs
        .iter()
        .find(|a| a.name == name)
        .or_else(|| attrs.iter().find(|a| a.local_name() == name))
        .map(|a| a.value)
}

/// Unescaped value of the attribute `name`.
pub fn attr_str<'a>(attrs: &[Attr<'a>], name: &str) -> Option<Cow<'a, str>> {
    attr(attrs, name).map(unescape)
}

pub fn attr_u32(attrs: &[Attr<'_>], name: &str) -> Option<u32> {
    attr(attrs, name).and_then(|v| atoi_simd::parse::<u32, false, false>(v.trim().as_bytes()).ok())
}

pub fn attr_i64(attrs: &[Attr<'_>], name: &str) -> Option<i64> {
    attr(attrs, name).and_then(|v| atoi_simd::parse::<i64, false, false>(v.trim().as_bytes()).ok())
}

pub fn attr_f64(attrs: &[Attr<'_>], name: &str) -> Option<f64> {
    attr(attrs, name).and_then(|v| fast_float2::parse::<f64, _>(v.trim()).ok())
}

/// `"1"`, `"true"`, `"True"` and `"TRUE"` are true; anything else present is false.
pub fn attr_bool(attrs: &[Attr<'_>], name: &str) -> Option<bool> {
    attr(attrs, name).map(parse_bool)
}

#[inline]
pub fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "True" | "TRUE")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Titles {
        titles: Vec<String>,
        nested: usize,
        sizes: Vec<u32>,
    }

    impl ElementParser for Titles {
        fn start(&mut self, ctx: &mut ParserContext, name: &str, attrs: &[Attr<'_>]) -> HandlerResult {
            match name {
                "title" => {
                    if ctx.parent_element() == Some("group") {
                        self.nested += 1;
                    }
                    ctx.start_text();
                },
                "item" => {
                    if attr_bool(attrs, "bad") == Some(true) {
                        return Err(ctx.fail("bad item"));
                    }
                    if let Some(size) = attr_u32(attrs, "size") {
                        self.sizes.push(size);
                    } else {
                        ctx.warn("item without size");
                    }
                },
                _ => {},
            }
            Ok(())
        }

        fn end(&mut self, ctx: &mut ParserContext, name: &str) -> HandlerResult {
            if name == "title" {
                self.titles.push(ctx.take_text());
            }
            Ok(())
        }
    }

    #[test]
    fn test_driver_tracks_stack_and_text() {
        let xml = br#"<x:root xmlns:x="urn:x"><x:title>A &amp; B</x:title><group><title>in</title></group><item size="4"/><item/></x:root>"#;
        let mut parser = Titles::default();
        let warnings = run(&mut parser, xml, SaxOptions::default()).unwrap();
        assert_eq!(parser.titles, vec!["A & B", "in"]);
        assert_eq!(parser.nested, 1);
        assert_eq!(parser.sizes, vec![4]);
        assert_eq!(warnings, vec!["item without size".to_string()]);
    }

    #[test]
    fn test_failure_is_reported() {
        let mut parser = Titles::default();
        let err = run(&mut parser, br#"<root><item bad="true"/></root>"#, SaxOptions::default()).unwrap_err();
        assert_eq!(err.kind(), XmlErrorKind::CallbackError);
    }

    #[test]
    fn test_chunked_matches_whole() {
        let xml = b"<root><title>chunked text</title><item size=\"12\"/></root>";
        let mut parser = Titles::default();
        run_chunked(&mut parser, SaxOptions::default(), |sink| {
            for chunk in xml.chunks(5) {
                if !sink(chunk) {
                    break;
                }
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(parser.titles, vec!["chunked text"]);
        assert_eq!(parser.sizes, vec![12]);
    }

    #[test]
    fn test_attribute_helpers() {
        let attrs = [
            Attr { name: "r:id", value: "rId3" },
            Attr { name: "ht", value: "15.75" },
            Attr { name: "hidden", value: "TRUE" },
            Attr { name: "name", value: "a&lt;b" },
        ];
        assert_eq!(attr(&attrs, "id"), Some("rId3"));
        assert_eq!(attr_f64(&attrs, "ht"), Some(15.75));
        assert_eq!(attr_bool(&attrs, "hidden"), Some(true));
        assert_eq!(attr_str(&attrs, "name").as_deref(), Some("a<b"));
        assert_eq!(attr_u32(&attrs, "missing"), None);
    }
}
