use aho_corasick::{AhoCorasick, MatchKind};
use memchr::{memchr, memmem};
use once_cell::sync::Lazy;
use std::borrow::Cow;

// Static initialization: automaton is built only once, thread-safe
static ATTR_ESCAPER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .build(["&", "<", ">", "\"", "'", "\r", "\n", "\t"])
        .expect("Failed to build XML attribute escaper")
});

static TEXT_ESCAPER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .build(["&", "<", ">"])
        .expect("Failed to build XML text escaper")
});

// Use LeftmostLongest to ensure longer entities are matched first (e.g., &amp; instead of &lt;)
static XML_UNESCAPER: Lazy<AhoCorasick> = Lazy::new(|| {
    AhoCorasick::builder()
        .match_kind(MatchKind::LeftmostLongest)
        .build(["&amp;", "&lt;", "&gt;", "&quot;", "&apos;"])
        .expect("Failed to build XML unescaper")
});

const ATTR_REPLACEMENTS: [&str; 8] = [
    "&amp;", "&lt;", "&gt;", "&quot;", "&apos;", "&#13;", "&#10;", "&#9;",
];
const TEXT_REPLACEMENTS: [&str; 3] = ["&amp;", "&lt;", "&gt;"];

/// Escape a string for use inside a double-quoted attribute value.
///
/// Line breaks and tabs become character references so they survive
/// attribute-value normalisation.
///
/// # Examples
///
/// ```
/// use longan::common::xml::escape_xml;
/// assert_eq!(escape_xml("a & b"), "a &amp; b");
/// assert_eq!(escape_xml("<tag>\"hello\"</tag>"), "&lt;tag&gt;&quot;hello&quot;&lt;/tag&gt;");
/// ```
#[inline]
pub fn escape_xml(s: &str) -> String {
    ATTR_ESCAPER.replace_all(s, &ATTR_REPLACEMENTS)
}

/// Escape character data. Quotes are left as-is.
#[inline]
pub fn escape_text(s: &str) -> Cow<'_, str> {
    if !s.bytes().any(|b| matches!(b, b'&' | b'<' | b'>')) {
        return Cow::Borrowed(s);
    }
    Cow::Owned(TEXT_ESCAPER.replace_all(s, &TEXT_REPLACEMENTS))
}

/// Append `s` to `out`, escaped for an attribute value.
pub fn escape_attr_into(out: &mut Vec<u8>, s: &str) {
    escape_into(out, s, &ATTR_ESCAPER, &ATTR_REPLACEMENTS);
}

/// Append `s` to `out`, escaped as character data.
pub fn escape_text_into(out: &mut Vec<u8>, s: &str) {
    escape_into(out, s, &TEXT_ESCAPER, &TEXT_REPLACEMENTS);
}

fn escape_into(out: &mut Vec<u8>, s: &str, automaton: &AhoCorasick, replacements: &[&str]) {
    let bytes = s.as_bytes();
    let mut last = 0;
    for m in automaton.find_iter(bytes) {
        out.extend_from_slice(&bytes[last..m.start()]);
        out.extend_from_slice(replacements[m.pattern().as_usize()].as_bytes());
        last = m.end();
    }
    out.extend_from_slice(&bytes[last..]);
}

/// Unescape XML special characters.
///
/// Replaces the five standard XML entities with their corresponding characters.
/// Unknown or malformed entities are left unchanged.
///
/// # Examples
///
/// ```
/// use longan::common::xml::unescape_xml;
/// assert_eq!(unescape_xml("&lt;a &amp; b&gt;"), "<a & b>");
/// assert_eq!(unescape_xml("&quot;hello&apos;"), "\"hello'");
/// assert_eq!(unescape_xml("&amp;lt;"), "&lt;"); // &amp; is matched first
/// assert_eq!(unescape_xml("a & b"), "a & b"); // unchanged
/// assert_eq!(unescape_xml("&invalid;"), "&invalid;"); // unknown entity
/// ```
#[inline]
pub fn unescape_xml(s: &str) -> String {
    XML_UNESCAPER.replace_all(s, &["&", "<", ">", "\"", "'"])
}

/// Unescape the predefined entities and decimal/hex character references.
///
/// Borrows when there is nothing to decode. Malformed references are kept
/// literally.
pub fn unescape(s: &str) -> Cow<'_, str> {
    let bytes = s.as_bytes();
    let Some(first) = memchr(b'&', bytes) else {
        return Cow::Borrowed(s);
    };

    let mut out = String::with_capacity(s.len());
    out.push_str(&s[..first]);
    let mut rest = &s[first..];
    while let Some(amp) = memchr(b'&', rest.as_bytes()) {
        out.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest[1..].find(';').map(|i| i + 1) else {
            break;
        };
        match decode_entity(&rest[1..semi]) {
            Some(ch) => {
                out.push(ch);
                rest = &rest[semi + 1..];
            },
            None => {
                out.push('&');
                rest = &rest[1..];
            },
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn decode_entity(name: &str) -> Option<char> {
    match name {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        _ => {
            let digits = name.strip_prefix('#')?;
            let code = match digits.strip_prefix(['x', 'X']) {
                Some(hex) => u32::from_str_radix(hex, 16).ok()?,
                None => atoi_simd::parse::<u32, false, false>(digits.as_bytes()).ok()?,
            };
            char::from_u32(code)
        },
    }
}

/// Encode characters XML 1.0 cannot carry using the SpreadsheetML `_xHHHH_`
/// form. A literal `_x` that would otherwise be read back as an escape is
/// protected as `_x005F_`.
pub fn encode_ooxml_escapes(s: &str) -> Cow<'_, str> {
    let needs = s.chars().any(is_xml_forbidden) || memmem::find(s.as_bytes(), b"_x").is_some();
    if !needs {
        return Cow::Borrowed(s);
    }

    let mut out = String::with_capacity(s.len() + 8);
    for (i, c) in s.char_indices() {
        if is_xml_forbidden(c) {
            out.push_str(&format!("_x{:04X}_", c as u32));
        } else if c == '_' && looks_like_escape(&s[i..]) {
            out.push_str("_x005F_");
        } else {
            out.push(c);
        }
    }
    Cow::Owned(out)
}

/// Reverse of [`encode_ooxml_escapes`].
pub fn decode_ooxml_escapes(s: &str) -> Cow<'_, str> {
    if memmem::find(s.as_bytes(), b"_x").is_none() {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(pos) = memmem::find(rest.as_bytes(), b"_x") {
        out.push_str(&rest[..pos]);
        let candidate = &rest[pos..];
        if looks_like_escape(candidate) {
            let code = u32::from_str_radix(&candidate[2..6], 16).ok();
            match code.and_then(char::from_u32) {
                Some(ch) => out.push(ch),
                None => out.push_str(&candidate[..7]),
            }
            rest = &candidate[7..];
        } else {
            out.push_str("_x");
            rest = &candidate[2..];
        }
    }
    out.push_str(rest);
    Cow::Owned(out)
}

fn looks_like_escape(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() >= 7
        && b[0] == b'_'
        && b[1] == b'x'
        && b[2..6].iter().all(u8::is_ascii_hexdigit)
        && b[6] == b'_'
}

#[inline]
fn is_xml_forbidden(c: char) -> bool {
    matches!(c, '\u{0}'..='\u{8}' | '\u{B}' | '\u{C}' | '\u{E}'..='\u{1F}' | '\u{FFFE}' | '\u{FFFF}')
}
