/// Error types for OPC package operations
use crate::common::xml::XmlError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OpcError {
    #[error("Invalid pack URI: {0}")]
    InvalidPackUri(String),

    #[error("Part not found: {0}")]
    PartNotFound(String),

    #[error("Part already exists: {0}")]
    DuplicatePart(String),

    #[error("Relationship not found: {0}")]
    RelationshipNotFound(String),

    #[error("Invalid relationship: {0}")]
    InvalidRelationship(String),

    #[error("XML error in {part}: {source}")]
    Xml {
        part: String,
        #[source]
        source: XmlError,
    },

    #[error("ZIP error: {0}")]
    Zip(#[from] longan_zip::ZipError),
}

impl OpcError {
    pub(crate) fn xml(part: impl Into<String>, source: XmlError) -> Self {
        OpcError::Xml {
            part: part.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, OpcError>;
