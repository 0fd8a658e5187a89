//! Errors surfaced at the package editor boundary.

use crate::common::xml::XmlError;
use crate::ooxml::opc::OpcError;
use longan_zip::{ZipError, ZipErrorKind};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PackageError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("cannot read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("cannot write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: ZipError,
    },

    #[error("malformed XML in {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: XmlError,
    },

    #[error(transparent)]
    Opc(#[from] OpcError),

    #[error("{0}")]
    Validation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Flat error code, one per failure class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageErrorKind {
    FileNotFound,
    FileReadError,
    FileWriteError,
    XmlParseError,
    InternalError,
    /// Rejected at the edit boundary; nothing was changed.
    Validation,
}

impl PackageError {
    pub fn kind(&self) -> PackageErrorKind {
        match self {
            PackageError::FileNotFound(_) => PackageErrorKind::FileNotFound,
            PackageError::Read { source, .. } => match source.kind() {
                ZipErrorKind::FileNotFound => PackageErrorKind::FileNotFound,
                _ => PackageErrorKind::FileReadError,
            },
            PackageError::Write { .. } => PackageErrorKind::FileWriteError,
            PackageError::Xml { .. } => PackageErrorKind::XmlParseError,
            PackageError::Opc(OpcError::Xml { .. }) => PackageErrorKind::XmlParseError,
            PackageError::Opc(OpcError::Zip(_)) => PackageErrorKind::FileReadError,
            PackageError::Opc(_) => PackageErrorKind::InternalError,
            PackageError::Validation(_) => PackageErrorKind::Validation,
            PackageError::Internal(_) => PackageErrorKind::InternalError,
        }
    }

    pub(crate) fn read(path: &Path, source: ZipError) -> Self {
        match source {
            ZipError::Io(ref e) if e.kind() == io::ErrorKind::NotFound => PackageError::FileNotFound(path.to_path_buf()),
            source => PackageError::Read {
                path: path.to_path_buf(),
                source,
            },
        }
    }

    pub(crate) fn write(path: &Path, source: impl Into<ZipError>) -> Self {
        PackageError::Write {
            path: path.to_path_buf(),
            source: source.into(),
        }
    }

    pub(crate) fn xml(part: impl Into<String>, source: XmlError) -> Self {
        PackageError::Xml {
            part: part.into(),
            source,
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        PackageError::Validation(message.into())
    }
}

pub type Result<T> = std::result::Result<T, PackageError>;
