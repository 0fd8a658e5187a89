/// Open Packaging Conventions (OPC) layer.
///
/// This module models the package-level structure shared by every Office
/// Open XML format:
///
/// - Part names and relationship target resolution ([`packuri`])
/// - Relationship parts ([`rel`])
/// - The `[Content_Types].xml` catalog ([`content_types`])
/// - The part graph with forward and reverse edges ([`graph`])
///
/// Part names are ZIP member names throughout: forward slashes, no leading
/// slash. Only content-type Overrides carry the leading `/` on the wire.
pub mod constants;
pub mod content_types;
pub mod error;
pub mod graph;
pub mod packuri;
pub mod rel;

pub use content_types::ContentTypes;
pub use error::{OpcError, Result};
pub use graph::{PACKAGE, PartGraph, PartId, PartNode, PartOrigin};
pub use rel::{Relationship, Relationships, TargetMode};
