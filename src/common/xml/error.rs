//! Error types for the XML layer.

use thiserror::Error;

/// Flat classification of XML failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XmlErrorKind {
    InvalidInput,
    ParserCreateFailed,
    ParseFailed,
    IoError,
    EncodingError,
    MemoryError,
    CallbackError,
}

/// An XML failure with the position it was detected at.
///
/// Line and column are 1-based; both are 0 when no position applies
/// (for example an I/O failure before any byte was read).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind:?} at {line}:{column}: {message}")]
pub struct XmlError {
    pub kind: XmlErrorKind,
    pub message: String,
    pub line: u64,
    pub column: u64,
}

impl XmlError {
    pub fn new(kind: XmlErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            line: 0,
            column: 0,
        }
    }

    pub fn at(kind: XmlErrorKind, message: impl Into<String>, line: u64, column: u64) -> Self {
        Self {
            kind,
            message: message.into(),
            line,
            column,
        }
    }

    #[inline]
    pub fn kind(&self) -> XmlErrorKind {
        self.kind
    }
}

impl From<std::io::Error> for XmlError {
    fn from(err: std::io::Error) -> Self {
        XmlError::new(XmlErrorKind::IoError, err.to_string())
    }
}

impl From<std::str::Utf8Error> for XmlError {
    fn from(err: std::str::Utf8Error) -> Self {
        XmlError::new(XmlErrorKind::EncodingError, err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, XmlError>;
