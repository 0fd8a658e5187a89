use std::io;
use thiserror::Error;

/// Errors produced by the archive reader and writer.
#[derive(Debug, Error)]
pub enum ZipError {
    #[error("archive is not open")]
    NotOpen,

    #[error("I/O failure: {0}")]
    Io(#[from] io::Error),

    #[error("malformed archive: {0}")]
    BadFormat(String),

    #[error("too large: {0}")]
    TooLarge(String),

    #[error("entry not found: {0}")]
    FileNotFound(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Flat error code, one per [`ZipError`] variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ZipErrorKind {
    NotOpen,
    IoFail,
    BadFormat,
    TooLarge,
    FileNotFound,
    InvalidParameter,
    InternalError,
}

impl ZipError {
    pub fn kind(&self) -> ZipErrorKind {
        match self {
            ZipError::NotOpen => ZipErrorKind::NotOpen,
            ZipError::Io(_) => ZipErrorKind::IoFail,
            ZipError::BadFormat(_) => ZipErrorKind::BadFormat,
            ZipError::TooLarge(_) => ZipErrorKind::TooLarge,
            ZipError::FileNotFound(_) => ZipErrorKind::FileNotFound,
            ZipError::InvalidParameter(_) => ZipErrorKind::InvalidParameter,
            ZipError::Internal(_) => ZipErrorKind::InternalError,
        }
    }

    pub(crate) fn bad_format(msg: impl Into<String>) -> Self {
        ZipError::BadFormat(msg.into())
    }
}

impl From<ZipError> for io::Error {
    fn from(err: ZipError) -> Self {
        match err {
            ZipError::Io(e) => e,
            ZipError::FileNotFound(p) => io::Error::new(io::ErrorKind::NotFound, p),
            other => io::Error::other(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ZipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(ZipError::NotOpen.kind(), ZipErrorKind::NotOpen);
        assert_eq!(
            ZipError::Io(io::Error::other("x")).kind(),
            ZipErrorKind::IoFail
        );
        assert_eq!(
            ZipError::Internal("deflate".into()).kind(),
            ZipErrorKind::InternalError
        );
    }

    #[test]
    fn test_into_io_error_keeps_not_found() {
        let err: io::Error = ZipError::FileNotFound("a.xml".into()).into();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }
}
