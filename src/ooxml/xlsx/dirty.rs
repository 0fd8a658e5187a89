//! Per-part change tracking and commit strategy selection.
//!
//! Every edit marks the parts it touches. Marks only ever go up, and a mark
//! propagates one level lower to the parts registered as depending on the
//! marked one (one hop: OPC dependencies are flat).

use std::collections::{BTreeMap, HashMap};

/// How much of a part changed since open or the last commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum DirtyLevel {
    #[default]
    None,
    /// Only metadata changed (timestamps, counters).
    Metadata,
    /// The part's bytes must be regenerated.
    Content,
    /// A container change; the part and its dependents are regenerated.
    Structure,
}

impl DirtyLevel {
    /// The level handed to dependents.
    pub fn propagated(self) -> DirtyLevel {
        match self {
            DirtyLevel::Structure => DirtyLevel::Content,
            DirtyLevel::Content => DirtyLevel::Metadata,
            DirtyLevel::Metadata | DirtyLevel::None => DirtyLevel::None,
        }
    }
}

/// How a commit is carried out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommitStrategy {
    /// No source archive; every part is generated.
    PureCreate,
    /// Nothing changed; the archive is copied.
    None,
    /// A few regenerated parts, everything else copied raw.
    MinimalUpdate,
    /// Many regenerated parts but no container change.
    SmartEdit,
    /// Sheets were added, removed or reordered.
    FullRebuild,
}

/// Content edits up to this count still qualify for a minimal update.
pub const MINIMAL_UPDATE_MAX_PARTS: usize = 3;

/// One entry of [`DirtyManager::changes`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    pub part: String,
    /// Sub-path that triggered the change (a cell or element), if recorded.
    pub affected_path: Option<String>,
    pub level: DirtyLevel,
}

#[derive(Debug, Clone, Default)]
struct PartState {
    level: DirtyLevel,
    affected: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct DirtyManager {
    pure_create: bool,
    states: BTreeMap<String, PartState>,
    /// part -> parts that depend on it
    dependents: HashMap<String, Vec<String>>,
}

impl DirtyManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A manager for a package that has no source archive.
    pub fn for_new_package() -> Self {
        Self {
            pure_create: true,
            ..Self::default()
        }
    }

    pub fn is_pure_create(&self) -> bool {
        self.pure_create
    }

    /// Declare that `dependent` must be revisited when `on` changes.
    pub fn add_dependency(&mut self, dependent: &str, on: &str) {
        let list = self.dependents.entry(on.to_string()).or_default();
        if !list.iter().any(|d| d == dependent) {
            list.push(dependent.to_string());
        }
    }

    /// Forget every dependency declared on `on` (the part is gone).
    pub fn remove_dependencies_on(&mut self, on: &str) {
        self.dependents.remove(on);
    }

    /// Parts registered as depending on `part`.
    pub fn dependents_of(&self, part: &str) -> &[String] {
        self.dependents.get(part).map_or(&[], Vec::as_slice)
    }

    /// Raise `part` to at least `level` and propagate one level lower to its
    /// dependents.
    pub fn mark_dirty(&mut self, part: &str, level: DirtyLevel, affected_path: Option<&str>) {
        if level == DirtyLevel::None {
            return;
        }
        self.raise(part, level, affected_path);
        let lower = level.propagated();
        if lower == DirtyLevel::None {
            return;
        }
        let dependents = self.dependents.get(part).cloned().unwrap_or_default();
        for dependent in dependents {
            self.raise(&dependent, lower, None);
        }
    }

    fn raise(&mut self, part: &str, level: DirtyLevel, affected_path: Option<&str>) {
        let state = self.states.entry(part.to_string()).or_default();
        if level > state.level {
            state.level = level;
        }
        if let Some(path) = affected_path {
            state.affected = Some(path.to_string());
        }
    }

    pub fn level(&self, part: &str) -> DirtyLevel {
        self.states.get(part).map_or(DirtyLevel::None, |s| s.level)
    }

    /// Whether the part's bytes must be regenerated.
    pub fn needs_regeneration(&self, part: &str) -> bool {
        self.level(part) >= DirtyLevel::Content
    }

    pub fn has_changes(&self) -> bool {
        self.states.values().any(|s| s.level > DirtyLevel::None)
    }

    /// Parts at CONTENT or above, in path order.
    pub fn dirty_parts(&self) -> impl Iterator<Item = &str> {
        self.states
            .iter()
            .filter(|(_, s)| s.level >= DirtyLevel::Content)
            .map(|(p, _)| p.as_str())
    }

    /// Everything marked since the last [`DirtyManager::clear`], in path order.
    pub fn changes(&self) -> impl Iterator<Item = Change> + '_ {
        self.states
            .iter()
            .filter(|(_, s)| s.level > DirtyLevel::None)
            .map(|(part, s)| Change {
                part: part.clone(),
                affected_path: s.affected.clone(),
                level: s.level,
            })
    }

    pub fn optimal_strategy(&self) -> CommitStrategy {
        if self.pure_create {
            return CommitStrategy::PureCreate;
        }
        let mut content = 0usize;
        let mut metadata = 0usize;
        for state in self.states.values() {
            match state.level {
                DirtyLevel::Structure => return CommitStrategy::FullRebuild,
                DirtyLevel::Content => content += 1,
                DirtyLevel::Metadata => metadata += 1,
                DirtyLevel::None => {},
            }
        }
        match (content, metadata) {
            (0, 0) => CommitStrategy::None,
            (c, _) if c <= MINIMAL_UPDATE_MAX_PARTS => CommitStrategy::MinimalUpdate,
            _ => CommitStrategy::SmartEdit,
        }
    }

    /// Reset all marks after a successful commit. Dependencies stay; the
    /// package now has a source archive.
    pub fn clear(&mut self) {
        self.states.clear();
        self.pure_create = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> DirtyManager {
        let mut dm = DirtyManager::new();
        for sheet in ["xl/worksheets/sheet1.xml", "xl/worksheets/sheet2.xml"] {
            dm.add_dependency("xl/workbook.xml", sheet);
            dm.add_dependency("xl/_rels/workbook.xml.rels", sheet);
            dm.add_dependency("[Content_Types].xml", sheet);
        }
        dm
    }

    #[test]
    fn test_levels_never_downgrade() {
        let mut dm = manager();
        dm.mark_dirty("xl/styles.xml", DirtyLevel::Content, None);
        dm.mark_dirty("xl/styles.xml", DirtyLevel::Metadata, Some("cellXfs"));
        assert_eq!(dm.level("xl/styles.xml"), DirtyLevel::Content);
        let change = dm.changes().next().unwrap();
        assert_eq!(change.affected_path.as_deref(), Some("cellXfs"));
    }

    #[test]
    fn test_structure_propagates_content_to_dependents() {
        let mut dm = manager();
        dm.mark_dirty("xl/worksheets/sheet2.xml", DirtyLevel::Structure, None);
        assert!(dm.needs_regeneration("xl/workbook.xml"));
        assert!(dm.needs_regeneration("xl/_rels/workbook.xml.rels"));
        assert!(dm.needs_regeneration("[Content_Types].xml"));
        assert_eq!(dm.optimal_strategy(), CommitStrategy::FullRebuild);
    }

    #[test]
    fn test_content_propagates_metadata_only() {
        let mut dm = manager();
        dm.mark_dirty("xl/worksheets/sheet1.xml", DirtyLevel::Content, Some("A1"));
        assert_eq!(dm.level("xl/workbook.xml"), DirtyLevel::Metadata);
        assert!(!dm.needs_regeneration("xl/workbook.xml"));
        assert_eq!(
            dm.dirty_parts().collect::<Vec<_>>(),
            vec!["xl/worksheets/sheet1.xml"]
        );
        assert_eq!(dm.optimal_strategy(), CommitStrategy::MinimalUpdate);
    }

    #[test]
    fn test_strategy_thresholds() {
        let mut dm = DirtyManager::new();
        assert_eq!(dm.optimal_strategy(), CommitStrategy::None);
        dm.mark_dirty("docProps/core.xml", DirtyLevel::Metadata, None);
        assert_eq!(dm.optimal_strategy(), CommitStrategy::MinimalUpdate);
        for i in 0..4 {
            dm.mark_dirty(&format!("xl/worksheets/sheet{i}.xml"), DirtyLevel::Content, None);
        }
        assert_eq!(dm.optimal_strategy(), CommitStrategy::SmartEdit);
        dm.clear();
        assert!(!dm.has_changes());
        assert_eq!(DirtyManager::for_new_package().optimal_strategy(), CommitStrategy::PureCreate);
    }
}
