//! The part graph of an OPC package.
//!
//! Parts live in a flat arena addressed by [`PartId`]. Every part keeps the
//! ids of the parts its rels reference (outgoing) and of the parts whose rels
//! reference it (incoming); edges are indices, never pointers. Id 0 is the
//! package itself, whose relationships come from `_rels/.rels`.

use crate::common::xml::parser::Parsed;
use crate::ooxml::opc::error::{OpcError, Result};
use crate::ooxml::opc::packuri;
use crate::ooxml::opc::rel::{Relationship, Relationships};
use longan_zip::ZipReader;
use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

/// Index of a part in its [`PartGraph`].
pub type PartId = usize;

/// Id of the package pseudo-part.
pub const PACKAGE: PartId = 0;

/// Where the bytes of a part come from at commit time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartOrigin {
    /// Present in the source archive.
    Source,
    /// Produced by the editor from its models on commit.
    Generated,
    /// New opaque content held in memory (media, drawings).
    Blob(Arc<Vec<u8>>),
}

#[derive(Debug, Clone)]
pub struct PartNode {
    /// Member name; "" for the package.
    pub path: String,
    pub origin: PartOrigin,
    rels: Relationships,
    outgoing: Vec<PartId>,
    incoming: Vec<PartId>,
}

impl PartNode {
    fn new(path: String, origin: PartOrigin) -> Self {
        Self {
            path,
            origin,
            rels: Relationships::new(),
            outgoing: Vec::new(),
            incoming: Vec::new(),
        }
    }

    #[inline]
    pub fn rels(&self) -> &Relationships {
        &self.rels
    }

    /// Member name of this part's rels part.
    #[inline]
    pub fn rels_path(&self) -> String {
        packuri::rels_path_for(&self.path)
    }
}

#[derive(Debug, Clone)]
pub struct PartGraph {
    nodes: Vec<Option<PartNode>>,
    index: HashMap<String, PartId>,
    /// Sources whose relationships changed since load or the last
    /// [`PartGraph::clear_changes`].
    rels_changed: HashSet<PartId>,
    /// Parts added since load or the last [`PartGraph::clear_changes`].
    added: HashSet<PartId>,
    /// Removed parts and the sources that referenced them at removal time.
    removed: Vec<(String, Vec<String>)>,
    /// Member names of rels parts present in the source archive.
    source_rels: HashSet<String>,
}

impl Default for PartGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl PartGraph {
    /// An empty graph holding only the package pseudo-part.
    pub fn new() -> Self {
        let mut index = HashMap::new();
        index.insert(String::new(), PACKAGE);
        Self {
            nodes: vec![Some(PartNode::new(String::new(), PartOrigin::Source))],
            index,
            rels_changed: HashSet::new(),
            added: HashSet::new(),
            removed: Vec::new(),
            source_rels: HashSet::new(),
        }
    }

    /// Build the graph of an archive.
    ///
    /// Every entry other than `[Content_Types].xml` and the rels parts
    /// becomes a part; every rels part becomes the relationships of its
    /// source. Rels parts without a source and relationships whose target
    /// is missing are reported as warnings.
    pub fn from_reader(reader: &ZipReader) -> Result<Parsed<Self>> {
        let mut graph = Self::new();
        let mut warnings = Vec::new();
        let mut rels_parts = Vec::new();

        for info in reader.entries() {
            if info.is_dir || info.path == packuri::CONTENT_TYPES {
                continue;
            }
            if packuri::is_rels(&info.path) {
                rels_parts.push(info.path.clone());
            } else {
                graph.add_part(&info.path, PartOrigin::Source);
            }
        }

        for rels_path in rels_parts {
            let Some(source) = packuri::source_of_rels(&rels_path) else {
                continue;
            };
            let Some(&source_id) = graph.index.get(&source) else {
                warnings.push(format!("{rels_path}: no part \"{source}\" to attach relationships to"));
                continue;
            };
            let xml = reader.extract(&rels_path)?;
            let parsed = Relationships::from_xml(&xml).map_err(|e| OpcError::xml(rels_path.as_str(), e))?;
            warnings.extend(parsed.warnings.into_iter().map(|w| format!("{rels_path}: {w}")));
            for rel in parsed.value.iter() {
                if let Some(target) = rel.target_part(&source)
                    && !graph.index.contains_key(&target)
                {
                    warnings.push(format!(
                        "{rels_path}: relationship {} targets missing part \"{target}\"",
                        rel.id
                    ));
                }
            }
            graph.source_rels.insert(rels_path);
            graph.set_rels_inner(source_id, parsed.value);
        }
        graph.added.clear();

        Ok(Parsed { value: graph, warnings })
    }

    #[inline]
    pub fn part_id(&self, path: &str) -> Option<PartId> {
        self.index.get(path).copied()
    }

    #[inline]
    pub fn contains(&self, path: &str) -> bool {
        !path.is_empty() && self.index.contains_key(path)
    }

    pub fn get_part(&self, path: &str) -> Option<&PartNode> {
        self.part_id(path).and_then(|id| self.node(id))
    }

    #[inline]
    pub fn node(&self, id: PartId) -> Option<&PartNode> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    /// Member names of all parts, in arena order (the package excluded).
    pub fn part_paths(&self) -> impl Iterator<Item = &str> {
        self.nodes
            .iter()
            .skip(1)
            .filter_map(|n| n.as_ref().map(|n| n.path.as_str()))
    }

    /// Number of parts, the package excluded.
    pub fn len(&self) -> usize {
        self.index.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Relationships of a part ("" for the package).
    pub fn rels(&self, source: &str) -> Option<&Relationships> {
        self.get_part(source).map(PartNode::rels)
    }

    /// Add a part, or return the id of the existing one with this name.
    pub fn add_part(&mut self, path: &str, origin: PartOrigin) -> PartId {
        if let Some(&id) = self.index.get(path) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Some(PartNode::new(path.to_string(), origin)));
        self.index.insert(path.to_string(), id);
        self.added.insert(id);
        // Internal relationships that were dangling may resolve now.
        for source in 0..id {
            let hit = self.nodes[source].as_ref().is_some_and(|n| {
                n.rels
                    .iter()
                    .any(|r| r.target_part(&n.path).as_deref() == Some(path))
            });
            if hit {
                self.link(source, id);
            }
        }
        id
    }

    /// Replace the origin of an existing part.
    pub fn set_origin(&mut self, path: &str, origin: PartOrigin) -> Result<()> {
        let id = self.require(path)?;
        if let Some(node) = self.nodes[id].as_mut() {
            node.origin = origin;
        }
        Ok(())
    }

    /// Remove a part and every edge touching it.
    ///
    /// Relationships in other parts that target the removed part are
    /// deleted, and those sources are recorded as having changed rels.
    pub fn remove_part(&mut self, path: &str) -> Result<PartNode> {
        if path.is_empty() {
            return Err(OpcError::InvalidPackUri("the package cannot be removed".to_string()));
        }
        let id = self.require(path)?;
        let Some(node) = self.nodes[id].take() else {
            return Err(OpcError::PartNotFound(path.to_string()));
        };
        self.index.remove(path);
        self.rels_changed.remove(&id);
        self.added.remove(&id);

        for &target in &node.outgoing {
            if let Some(t) = self.nodes[target].as_mut() {
                t.incoming.retain(|&s| s != id);
            }
        }
        let mut referrers = Vec::with_capacity(node.incoming.len());
        for &source in &node.incoming {
            let Some(s) = self.nodes[source].as_mut() else {
                continue;
            };
            let source_path = s.path.clone();
            s.rels
                .retain(|r| r.target_part(&source_path).as_deref() != Some(path));
            s.outgoing.retain(|&t| t != id);
            self.rels_changed.insert(source);
            referrers.push(source_path);
        }
        self.removed.push((path.to_string(), referrers));
        Ok(node)
    }

    /// Add (or reuse) an internal relationship from `source` to the part
    /// `target` and return its id. The target is stored relative to the
    /// source's directory.
    pub fn relate(&mut self, source: &str, rel_type: &str, target: &str) -> Result<String> {
        let source_id = self.require(source)?;
        let target_id = self.require(target)?;
        let target_ref = packuri::relative_ref(source, target);
        let node = self.nodes[source_id]
            .as_mut()
            .ok_or_else(|| OpcError::PartNotFound(source.to_string()))?;
        let before = node.rels.len();
        let id = node.rels.get_or_add(rel_type, &target_ref);
        if node.rels.len() != before {
            self.rels_changed.insert(source_id);
        }
        self.link(source_id, target_id);
        Ok(id)
    }

    /// Insert a relationship under a caller-chosen id.
    pub fn insert_relationship(&mut self, source: &str, rel: Relationship) -> Result<()> {
        let source_id = self.require(source)?;
        let target = rel.target_part(source);
        let node = self.nodes[source_id]
            .as_mut()
            .ok_or_else(|| OpcError::PartNotFound(source.to_string()))?;
        if !node.rels.insert(rel) {
            return Err(OpcError::InvalidRelationship(format!(
                "{source}: relationship id already in use"
            )));
        }
        self.rels_changed.insert(source_id);
        if let Some(target_id) = target.and_then(|t| self.part_id(&t)) {
            self.link(source_id, target_id);
        }
        Ok(())
    }

    /// Remove a relationship by id. The target part stays in the graph.
    pub fn remove_relationship(&mut self, source: &str, id: &str) -> Result<Relationship> {
        let source_id = self.require(source)?;
        let node = self.nodes[source_id]
            .as_mut()
            .ok_or_else(|| OpcError::PartNotFound(source.to_string()))?;
        let rel = node
            .rels
            .remove(id)
            .ok_or_else(|| OpcError::RelationshipNotFound(format!("{source}: {id}")))?;
        self.rels_changed.insert(source_id);
        self.relink(source_id);
        Ok(rel)
    }

    /// Parts reachable from a worksheet through relationships (drawings,
    /// comments, images, charts, ...), in breadth-first order. The sheet
    /// itself is not included.
    pub fn sheet_related_parts(&self, sheet: &str) -> Vec<String> {
        let Some(start) = self.part_id(sheet) else {
            return Vec::new();
        };
        self.reachable(start)
            .into_iter()
            .filter_map(|id| self.node(id).map(|n| n.path.clone()))
            .collect()
    }

    /// The subset of [`PartGraph::sheet_related_parts`] that nothing outside
    /// the sheet's subgraph references. These can go when the sheet goes.
    pub fn exclusively_owned_parts(&self, sheet: &str) -> Vec<String> {
        let Some(start) = self.part_id(sheet) else {
            return Vec::new();
        };
        let reachable = self.reachable(start);
        let mut owned: HashSet<PartId> = reachable.iter().copied().collect();
        owned.insert(start);
        // Shrink until every member is referenced only from inside the set.
        loop {
            let outside: Vec<PartId> = owned
                .iter()
                .copied()
                .filter(|&id| id != start)
                .filter(|&id| {
                    self.node(id)
                        .is_some_and(|n| n.incoming.iter().any(|s| !owned.contains(s)))
                })
                .collect();
            if outside.is_empty() {
                break;
            }
            for id in outside {
                owned.remove(&id);
            }
        }
        reachable
            .into_iter()
            .filter(|id| owned.contains(id))
            .filter_map(|id| self.node(id).map(|n| n.path.clone()))
            .collect()
    }

    /// Rels parts that must be regenerated for a set of dirty parts: the
    /// part's own rels when its relationships changed, plus the rels of the
    /// parts referencing it when it was added or removed.
    pub fn dirty_rels<'a, I>(&self, dirty: I) -> BTreeSet<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut out = BTreeSet::new();
        for path in dirty {
            match self.part_id(path) {
                Some(id) => {
                    if self.rels_changed.contains(&id) {
                        out.insert(packuri::rels_path_for(path));
                    }
                    if let Some(node) = self.node(id).filter(|_| self.added.contains(&id)) {
                        for &source in &node.incoming {
                            if self.rels_changed.contains(&source)
                                && let Some(s) = self.node(source)
                            {
                                out.insert(s.rels_path());
                            }
                        }
                    }
                },
                None => {
                    for (_, referrers) in self.removed.iter().filter(|(p, _)| p == path) {
                        for referrer in referrers {
                            if self.part_id(referrer).is_some() {
                                out.insert(packuri::rels_path_for(referrer));
                            }
                        }
                    }
                },
            }
        }
        out
    }

    /// Sources whose relationships changed, as member names ("" is the package).
    pub fn changed_rels_sources(&self) -> Vec<String> {
        let mut out: Vec<String> = self
            .rels_changed
            .iter()
            .filter_map(|&id| self.node(id).map(|n| n.path.clone()))
            .collect();
        out.sort();
        out
    }

    /// Whether a part was added since load or the last commit.
    pub fn is_added(&self, path: &str) -> bool {
        self.part_id(path).is_some_and(|id| self.added.contains(&id))
    }

    /// Parts removed since load or the last [`PartGraph::clear_changes`].
    pub fn removed_parts(&self) -> impl Iterator<Item = &str> {
        self.removed.iter().map(|(p, _)| p.as_str())
    }

    /// Whether the source archive carried this rels part.
    pub fn had_source_rels(&self, rels_path: &str) -> bool {
        self.source_rels.contains(rels_path)
    }

    /// Forget recorded changes after a successful commit.
    pub fn clear_changes(&mut self) {
        self.added.clear();
        for id in self.rels_changed.drain() {
            if let Some(node) = self.nodes[id].as_ref() {
                self.source_rels.insert(node.rels_path());
            }
        }
        for (path, _) in self.removed.drain(..) {
            self.source_rels.remove(&packuri::rels_path_for(&path));
        }
        self.source_rels.retain(|rels| {
            packuri::source_of_rels(rels)
                .and_then(|s| self.index.get(&s).and_then(|&id| self.nodes[id].as_ref()))
                .is_some_and(|n| !n.rels.is_empty())
        });
        for node in self.nodes.iter_mut().flatten() {
            if node.origin == PartOrigin::Generated || matches!(node.origin, PartOrigin::Blob(_)) {
                node.origin = PartOrigin::Source;
            }
        }
    }

    fn require(&self, path: &str) -> Result<PartId> {
        self.part_id(path)
            .ok_or_else(|| OpcError::PartNotFound(path.to_string()))
    }

    fn set_rels_inner(&mut self, source: PartId, rels: Relationships) {
        if let Some(node) = self.nodes[source].as_mut() {
            node.rels = rels;
        }
        self.relink(source);
    }

    /// Recompute the outgoing edges of `source` from its relationships.
    fn relink(&mut self, source: PartId) {
        let Some(node) = self.nodes[source].as_ref() else {
            return;
        };
        let targets: Vec<PartId> = node
            .rels
            .iter()
            .filter_map(|r| r.target_part(&node.path))
            .filter_map(|t| self.index.get(&t).copied())
            .collect();
        let old = self.nodes[source]
            .as_mut()
            .map(|n| std::mem::take(&mut n.outgoing))
            .unwrap_or_default();
        for target in old {
            if let Some(t) = self.nodes[target].as_mut() {
                t.incoming.retain(|&s| s != source);
            }
        }
        for target in targets {
            self.link(source, target);
        }
    }

    fn link(&mut self, source: PartId, target: PartId) {
        let Some(s) = self.nodes[source].as_mut() else {
            return;
        };
        if s.outgoing.contains(&target) {
            return;
        }
        s.outgoing.push(target);
        if let Some(t) = self.nodes[target].as_mut() {
            t.incoming.push(source);
        }
    }

    fn reachable(&self, start: PartId) -> Vec<PartId> {
        let mut seen = HashSet::new();
        seen.insert(start);
        let mut order = Vec::new();
        let mut queue = VecDeque::new();
        queue.push_back(start);
        while let Some(id) = queue.pop_front() {
            let Some(node) = self.node(id) else {
                continue;
            };
            for &next in &node.outgoing {
                if next != PACKAGE && seen.insert(next) {
                    order.push(next);
                    queue.push_back(next);
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ooxml::opc::constants::relationship_type as rt;
    use crate::ooxml::opc::rel::TargetMode;

    /// workbook -> sheet1, sheet2; sheet1 -> drawing1 -> image1;
    /// sheet2 -> drawing2 -> image1 (shared)
    fn sample() -> PartGraph {
        let mut g = PartGraph::new();
        for path in [
            "xl/workbook.xml",
            "xl/worksheets/sheet1.xml",
            "xl/worksheets/sheet2.xml",
            "xl/drawings/drawing1.xml",
            "xl/drawings/drawing2.xml",
            "xl/media/image1.png",
            "xl/comments1.xml",
        ] {
            g.add_part(path, PartOrigin::Source);
        }
        g.relate("", rt::OFFICE_DOCUMENT, "xl/workbook.xml").unwrap();
        g.relate("xl/workbook.xml", rt::WORKSHEET, "xl/worksheets/sheet1.xml").unwrap();
        g.relate("xl/workbook.xml", rt::WORKSHEET, "xl/worksheets/sheet2.xml").unwrap();
        g.relate("xl/worksheets/sheet1.xml", rt::DRAWING, "xl/drawings/drawing1.xml").unwrap();
        g.relate("xl/worksheets/sheet1.xml", rt::COMMENTS, "xl/comments1.xml").unwrap();
        g.relate("xl/worksheets/sheet2.xml", rt::DRAWING, "xl/drawings/drawing2.xml").unwrap();
        g.relate("xl/drawings/drawing1.xml", rt::IMAGE, "xl/media/image1.png").unwrap();
        g.relate("xl/drawings/drawing2.xml", rt::IMAGE, "xl/media/image1.png").unwrap();
        g.clear_changes();
        g
    }

    #[test]
    fn test_relate_stores_relative_targets() {
        let g = sample();
        let rels = g.rels("xl/drawings/drawing1.xml").unwrap();
        assert_eq!(rels.get("rId1").unwrap().target, "../media/image1.png");
        assert_eq!(g.rels("").unwrap().get("rId1").unwrap().target, "xl/workbook.xml");
        assert_eq!(g.len(), 7);
    }

    #[test]
    fn test_sheet_related_parts() {
        let g = sample();
        assert_eq!(
            g.sheet_related_parts("xl/worksheets/sheet1.xml"),
            vec!["xl/drawings/drawing1.xml", "xl/comments1.xml", "xl/media/image1.png"]
        );
        assert_eq!(
            g.exclusively_owned_parts("xl/worksheets/sheet1.xml"),
            vec!["xl/drawings/drawing1.xml", "xl/comments1.xml"]
        );
        assert!(g.sheet_related_parts("xl/missing.xml").is_empty());
    }

    #[test]
    fn test_remove_part_cascades() {
        let mut g = sample();
        g.remove_part("xl/worksheets/sheet2.xml").unwrap();
        assert!(g.get_part("xl/worksheets/sheet2.xml").is_none());
        let wb_rels = g.rels("xl/workbook.xml").unwrap();
        assert_eq!(wb_rels.len(), 1);
        assert!(wb_rels.get("rId2").is_none());
        // drawing2 lost its only referrer but stays until removed explicitly
        assert!(g.contains("xl/drawings/drawing2.xml"));

        let dirty = g.dirty_rels(["xl/worksheets/sheet2.xml", "xl/workbook.xml"]);
        assert_eq!(dirty.into_iter().collect::<Vec<_>>(), vec!["xl/_rels/workbook.xml.rels"]);
        assert_eq!(g.removed_parts().collect::<Vec<_>>(), vec!["xl/worksheets/sheet2.xml"]);
        assert!(g.remove_part("").is_err());
        assert!(g.remove_part("xl/worksheets/sheet2.xml").is_err());
    }

    #[test]
    fn test_dirty_rels_for_added_part() {
        let mut g = sample();
        g.add_part("xl/worksheets/sheet3.xml", PartOrigin::Generated);
        g.relate("xl/workbook.xml", rt::WORKSHEET, "xl/worksheets/sheet3.xml").unwrap();
        let dirty = g.dirty_rels(["xl/worksheets/sheet3.xml"]);
        assert_eq!(dirty.into_iter().collect::<Vec<_>>(), vec!["xl/_rels/workbook.xml.rels"]);
        // unchanged content edit regenerates nothing
        assert!(g.dirty_rels(["xl/worksheets/sheet1.xml"]).is_empty());
        assert_eq!(g.changed_rels_sources(), vec!["xl/workbook.xml"]);
        g.clear_changes();
        assert!(g.dirty_rels(["xl/worksheets/sheet3.xml"]).is_empty());
    }

    #[test]
    fn test_late_target_links_dangling_relationship() {
        let mut g = PartGraph::new();
        g.add_part("xl/workbook.xml", PartOrigin::Source);
        g.insert_relationship(
            "xl/workbook.xml",
            Relationship::new("rId7", rt::STYLES, "styles.xml", TargetMode::Internal),
        )
        .unwrap();
        g.add_part("xl/styles.xml", PartOrigin::Generated);
        assert_eq!(g.sheet_related_parts("xl/workbook.xml"), vec!["xl/styles.xml"]);
        g.remove_relationship("xl/workbook.xml", "rId7").unwrap();
        assert!(g.sheet_related_parts("xl/workbook.xml").is_empty());
        assert!(g.remove_relationship("xl/workbook.xml", "rId7").is_err());
    }
}
