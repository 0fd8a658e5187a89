//! XML plumbing shared by every part parser and writer.
//!
//! - [`sax`]: event reader over `quick-xml` with zero-copy attribute views
//! - [`dom`]: arena tree for small parts
//! - [`parser`]: element stack, text collection and attribute helpers for
//!   the specialised parsers
//! - [`writer`]: buffered emitter
//! - [`splice`]: byte-preserving edits of existing parts
//! - [`escape`]: entity and `_xHHHH_` helpers

pub mod dom;
pub mod error;
pub mod escape;
pub mod parser;
pub mod sax;
pub mod splice;
pub mod writer;

pub use dom::{NodeId, XmlDocument, XmlNode};
pub use error::{Result, XmlError, XmlErrorKind};
pub use escape::{
    decode_ooxml_escapes, encode_ooxml_escapes, escape_text, escape_xml, unescape, unescape_xml,
};
pub use parser::{ElementParser, Parsed, ParserContext};
pub use sax::{
    Attr, HandlerError, HandlerResult, PushParser, SaxHandler, SaxOptions, SaxReader, local_name,
};
pub use splice::{Splice, SpliceRefusal};
pub use writer::{XML_DECLARATION, XmlWriter, format_number};
