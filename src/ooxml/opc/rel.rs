//! Relationship parts (`*.rels`).
//!
//! A [`Relationships`] collection belongs to one source part and keeps its
//! entries in source order, with an id index for O(1) lookup.

use crate::common::xml::parser::{self, ElementParser, Parsed, ParserContext};
use crate::common::xml::sax::{Attr, HandlerResult, SaxOptions};
use crate::common::xml::writer::XmlWriter;
use crate::ooxml::opc::constants::{namespace, target_mode};
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::packuri;
use std::collections::HashMap;

/// Whether a relationship points into the package or outside it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TargetMode {
    #[default]
    Internal,
    External,
}

/// A single relationship from a source part to a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    /// Relationship ID (e.g., "rId1")
    pub id: String,
    /// Relationship type URI
    pub rel_type: String,
    /// Target as written: relative to the source directory, package-absolute
    /// when it starts with `/`, or a URL for external targets
    pub target: String,
    pub mode: TargetMode,
}

impl Relationship {
    pub fn new(id: impl Into<String>, rel_type: impl Into<String>, target: impl Into<String>, mode: TargetMode) -> Self {
        Self {
            id: id.into(),
            rel_type: rel_type.into(),
            target: target.into(),
            mode,
        }
    }

    #[inline]
    pub fn is_external(&self) -> bool {
        self.mode == TargetMode::External
    }

    /// Member name of the target part, resolved against `source`.
    ///
    /// Returns `None` for external relationships.
    pub fn target_part(&self, source: &str) -> Option<String> {
        if self.is_external() {
            None
        } else {
            Some(packuri::resolve_target(source, &self.target))
        }
    }
}

/// Relationships of one source part.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Relationships {
    rels: Vec<Relationship>,
    index: HashMap<String, usize>,
}

impl Relationships {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a rels part.
    ///
    /// Entries with an empty `Id`, `Type` or `Target` are dropped with a
    /// warning, as are repeated ids (the first one wins).
    pub fn from_xml(xml: &[u8]) -> crate::common::xml::Result<Parsed<Self>> {
        let mut parser = RelsParser::default();
        let warnings = parser::run(&mut parser, xml, SaxOptions::default())?;
        Ok(Parsed {
            value: parser.rels,
            warnings,
        })
    }

    #[inline]
    pub fn get(&self, id: &str) -> Option<&Relationship> {
        self.index.get(id).map(|&i| &self.rels[i])
    }

    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Relationship> {
        self.rels.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.rels.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rels.is_empty()
    }

    /// All relationships of a type, in source order.
    pub fn by_type<'a, 'b>(&'a self, rel_type: &'b str) -> impl Iterator<Item = &'a Relationship> + use<'a, 'b> {
        self.rels.iter().filter(move |r| r.rel_type == rel_type)
    }

    /// The single relationship of a type.
    ///
    /// Returns an error if none or more than one exists.
    pub fn part_with_reltype(&self, rel_type: &str) -> Result<&Relationship> {
        let mut matching = self.by_type(rel_type);
        match (matching.next(), matching.next()) {
            (None, _) => Err(OpcError::RelationshipNotFound(format!("no relationship of type '{rel_type}'"))),
            (Some(rel), None) => Ok(rel),
            (Some(_), Some(_)) => Err(OpcError::InvalidRelationship(format!(
                "multiple relationships of type '{rel_type}'"
            ))),
        }
    }

    /// Internal relationship of `rel_type` whose target resolves to `part`.
    pub fn find_target(&self, source: &str, rel_type: &str, part: &str) -> Option<&Relationship> {
        self.by_type(rel_type)
            .find(|r| r.target_part(source).as_deref() == Some(part))
    }

    /// Insert a relationship with a caller-chosen id.
    ///
    /// Returns false (and changes nothing) when the id is already taken.
    pub fn insert(&mut self, rel: Relationship) -> bool {
        if self.index.contains_key(&rel.id) {
            return false;
        }
        self.index.insert(rel.id.clone(), self.rels.len());
        self.rels.push(rel);
        true
    }

    /// Add an internal relationship under the next free id and return the id.
    pub fn add(&mut self, rel_type: &str, target: &str) -> String {
        self.add_with_mode(rel_type, target, TargetMode::Internal)
    }

    pub fn add_with_mode(&mut self, rel_type: &str, target: &str, mode: TargetMode) -> String {
        let id = self.next_r_id();
        self.insert(Relationship::new(id.clone(), rel_type, target, mode));
        id
    }

    /// Id of an existing internal relationship with this type and target,
    /// or of a newly added one.
    pub fn get_or_add(&mut self, rel_type: &str, target: &str) -> String {
        if let Some(rel) = self
            .rels
            .iter()
            .find(|r| r.rel_type == rel_type && r.target == target && !r.is_external())
        {
            return rel.id.clone();
        }
        self.add(rel_type, target)
    }

    pub fn remove(&mut self, id: &str) -> Option<Relationship> {
        let pos = self.index.remove(id)?;
        let rel = self.rels.remove(pos);
        self.reindex();
        Some(rel)
    }

    /// Keep only the relationships for which `keep` returns true.
    /// Returns how many were removed.
    pub fn retain<F: FnMut(&Relationship) -> bool>(&mut self, keep: F) -> usize {
        let before = self.rels.len();
        self.rels.retain(keep);
        self.reindex();
        before - self.rels.len()
    }

    /// Mutable access for target rewrites. Ids cannot change through it.
    pub fn set_target(&mut self, id: &str, target: &str) -> bool {
        match self.index.get(id) {
            Some(&i) => {
                self.rels[i].target = target.to_string();
                true
            },
            None => false,
        }
    }

    /// Next available relationship id.
    ///
    /// Generates "rId1", "rId2", ..., filling the first gap if any exists.
    pub fn next_r_id(&self) -> String {
        let mut used: Vec<u32> = self
            .rels
            .iter()
            .filter_map(|r| {
                r.id
                    .strip_prefix("rId")
                    .and_then(|n| atoi_simd::parse::<u32, false, false>(n.as_bytes()).ok())
            })
            .collect();
        used.sort_unstable();

        let mut next = 1u32;
        for n in used {
            match n.cmp(&next) {
                std::cmp::Ordering::Equal => next += 1,
                std::cmp::Ordering::Greater => break,
                std::cmp::Ordering::Less => {},
            }
        }
        format!("rId{next}")
    }

    /// Serialise as a rels part, in collection order.
    pub fn to_xml(&self) -> Vec<u8> {
        let mut w = XmlWriter::with_capacity(256 + self.rels.len() * 160);
        w.declaration()
            .start_element("Relationships")
            .attribute("xmlns", namespace::OPC_RELATIONSHIPS);
        for rel in &self.rels {
            w.start_element("Relationship")
                .attribute("Id", &rel.id)
                .attribute("Type", &rel.rel_type)
                .attribute("Target", &rel.target);
            if rel.is_external() {
                w.attribute("TargetMode", target_mode::EXTERNAL);
            }
            w.end_element();
        }
        w.end_element();
        w.into_bytes()
    }

    fn reindex(&mut self) {
        self.index.clear();
        for (i, rel) in self.rels.iter().enumerate() {
            self.index.insert(rel.id.clone(), i);
        }
    }
}

#[derive(Default)]
struct RelsParser {
    rels: Relationships,
}

impl ElementParser for RelsParser {
    fn start(&mut self, ctx: &mut ParserContext, name: &str, attrs: &[Attr<'_>]) -> HandlerResult {
        if name != "Relationship" {
            return Ok(());
        }
        let id = parser::attr_str(attrs, "Id").unwrap_or_default();
        let rel_type = parser::attr_str(attrs, "Type").unwrap_or_default();
        let target = parser::attr_str(attrs, "Target").unwrap_or_default();
        if id.is_empty() || rel_type.is_empty() || target.is_empty() {
            ctx.warn(format!(
                "skipping relationship with empty Id, Type or Target (Id=\"{id}\")"
            ));
            return Ok(());
        }
        let mode = match parser::attr(attrs, "TargetMode") {
            Some(target_mode::EXTERNAL) => TargetMode::External,
            _ => TargetMode::Internal,
        };
        let rel = Relationship::new(id.as_ref(), rel_type.as_ref(), target.as_ref(), mode);
        if !self.rels.insert(rel) {
            ctx.warn(format!("duplicate relationship id \"{id}\" ignored"));
        }
        Ok(())
    }
}
