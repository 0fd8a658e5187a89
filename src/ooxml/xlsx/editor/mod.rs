//! Open, edit and repack a SpreadsheetML package.
//!
//! [`PackageEditor`] keeps the source archive open and builds part models
//! only when an edit or a lookup needs them. Every edit marks the parts it
//! touches in a [`DirtyManager`]; on commit the marked parts are
//! regenerated, spliced into their source bytes where possible, and every
//! other part is copied still compressed.
//!
//! ```rust,no_run
//! use longan::ooxml::xlsx::{PackageEditor, Value};
//!
//! let mut editor = PackageEditor::open("report.xlsx")?;
//! editor.set_cell("Data", "B2", 42.0)?;
//! editor.set_cell("Data", "C2", Value::formula("=B2*2"))?;
//! editor.rename_sheet("Data", "Numbers")?;
//! let report = editor.save()?;
//! println!("{:?}: {} parts regenerated", report.strategy, report.regenerated.len());
//! # Ok::<(), longan::ooxml::xlsx::PackageError>(())
//! ```

mod commit;
mod image;
mod slot;
pub(crate) mod source;
#[cfg(test)]
mod tests;

pub use commit::CommitReport;

use self::slot::Lazy;
use self::source::Source;
use crate::ooxml::opc::constants::{content_type, relationship_type};
use crate::ooxml::opc::packuri::{self, CONTENT_TYPES};
use crate::ooxml::opc::{ContentTypes, OpcError, PartGraph, PartOrigin};
use crate::ooxml::xlsx::cell::{CellRef, CellValue, MAX_COL, MAX_ROW, Value};
use crate::ooxml::xlsx::dirty::{CommitStrategy, DirtyLevel, DirtyManager};
use crate::ooxml::xlsx::error::{PackageError, Result};
use crate::ooxml::xlsx::model::worksheet::UsedRange;
use crate::ooxml::xlsx::model::{
    AppProperties, CellFormat, CoreProperties, DefinedName, DocProps, FormulaEntry, SharedStringTable, SheetState,
    StyleTable, Workbook, Worksheet, WorksheetInfo,
};
use crate::ooxml::xlsx::options::WorkbookOptions;
use crate::ooxml::xlsx::parsers::{
    parse_app_properties, parse_core_properties, parse_shared_strings_chunked, parse_styles, parse_workbook,
    parse_worksheet_chunked,
};
use crate::ooxml::xlsx::validate::{parse_cell_ref, validate_sheet_name};
use crate::ooxml::xlsx::writer::Theme;
use longan_zip::{SharedDiagnostics, diag::default_sink};
use memchr::memmem;
use std::cell::Ref;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

const DEFAULT_WORKBOOK: &str = "xl/workbook.xml";
const STYLES_PART: &str = "xl/styles.xml";
const THEME_PART: &str = "xl/theme/theme1.xml";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const CALC_CHAIN_PART: &str = "xl/calcChain.xml";
const CORE_PART: &str = "docProps/core.xml";
const APP_PART: &str = "docProps/app.xml";

/// Member names of the parts the editor models, as found through the
/// package and workbook relationships.
#[derive(Debug, Clone, Default)]
struct PartPaths {
    workbook: String,
    shared_strings: Option<String>,
    styles: Option<String>,
    core: Option<String>,
    app: Option<String>,
}

/// Builds part models from the source archive.
#[derive(Clone, Copy)]
struct Loader<'a> {
    source: Option<&'a Source>,
    paths: &'a PartPaths,
}

impl<'a> Loader<'a> {
    fn source_part(&self, part: Option<&'a str>) -> Option<(&'a Source, &'a str)> {
        let source = self.source?;
        let part = part?;
        source.contains(part).then_some((source, part))
    }

    fn shared_strings(&self) -> Result<Option<SharedStringTable>> {
        let Some((source, part)) = self.source_part(self.paths.shared_strings.as_deref()) else {
            return Ok(None);
        };
        source
            .parse_streamed(part, |feed| parse_shared_strings_chunked(feed))
            .map(Some)
    }

    fn styles(&self) -> Result<Option<StyleTable>> {
        let Some((source, part)) = self.source_part(self.paths.styles.as_deref()) else {
            return Ok(None);
        };
        let parsed = parse_styles(&source.extract(part)?).map_err(|e| PackageError::xml(part, e))?;
        source.warn_all(part, parsed.warnings);
        Ok(Some(parsed.value))
    }

    fn doc_props(&self) -> Result<Option<DocProps>> {
        let mut props = DocProps::default();
        if let Some((source, part)) = self.source_part(self.paths.core.as_deref()) {
            props.core = parse_core_properties(&source.extract(part)?).map_err(|e| PackageError::xml(part, e))?;
        }
        if let Some((source, part)) = self.source_part(self.paths.app.as_deref()) {
            props.app = parse_app_properties(&source.extract(part)?).map_err(|e| PackageError::xml(part, e))?;
        }
        Ok(Some(props))
    }

    fn date_flags(&self, styles: &Lazy<StyleTable>) -> Result<Vec<bool>> {
        Ok(styles
            .get(|| self.styles())?
            .map(|table| table.date_style_flags())
            .unwrap_or_default())
    }

    fn worksheet(&self, part: &str, date_flags: &[bool]) -> Result<Option<Worksheet>> {
        let Some(source) = self.source.filter(|s| s.contains(part)) else {
            return Ok(None);
        };
        source
            .parse_streamed(part, |feed| parse_worksheet_chunked(date_flags, feed))
            .map(Some)
    }
}

/// First internal target of `rel_type` among `owner`'s relationships that
/// exists in the graph.
pub(crate) fn target_of(graph: &PartGraph, owner: &str, rel_type: &str) -> Option<String> {
    graph
        .rels(owner)?
        .by_type(rel_type)
        .find_map(|r| r.target_part(owner))
        .filter(|p| graph.contains(p))
}

/// The workbook part: the package's officeDocument target, else
/// `xl/workbook.xml` when the package holds one.
pub(crate) fn workbook_part(graph: &PartGraph) -> Option<String> {
    target_of(graph, "", relationship_type::OFFICE_DOCUMENT)
        .or_else(|| graph.contains(DEFAULT_WORKBOOK).then(|| DEFAULT_WORKBOOK.to_string()))
}

fn slot_for<T>(path: &Option<String>) -> Lazy<T> {
    match path {
        Some(_) => Lazy::unloaded(),
        None => Lazy::absent(),
    }
}

/// Register the static dependencies of an opened package: the workbook on
/// its sheets, every rels part on its targets and the content-type catalog
/// on every overridden part.
fn register_dependencies(dirty: &mut DirtyManager, graph: &PartGraph, content_types: &ContentTypes, workbook: &Workbook, workbook_path: &str) {
    for sheet in &workbook.sheets {
        dirty.add_dependency(workbook_path, &sheet.worksheet_path);
    }
    for owner in std::iter::once("").chain(graph.part_paths()) {
        let Some(rels) = graph.rels(owner).filter(|r| !r.is_empty()) else {
            continue;
        };
        let rels_path = packuri::rels_path_for(owner);
        for target in rels.iter().filter_map(|r| r.target_part(owner)) {
            dirty.add_dependency(&rels_path, &target);
        }
    }
    for (part, _) in content_types.overrides() {
        dirty.add_dependency(CONTENT_TYPES, part);
    }
}

/// An open spreadsheet package.
///
/// Lookups take `&self` and load what they need; edits take `&mut self`,
/// validate their arguments before touching any model and mark the parts
/// they change. Nothing reaches the disk before [`commit`](Self::commit)
/// or [`save`](Self::save).
pub struct PackageEditor {
    source: Option<Source>,
    options: WorkbookOptions,
    diagnostics: SharedDiagnostics,
    graph: PartGraph,
    content_types: ContentTypes,
    dirty: DirtyManager,
    paths: PartPaths,
    workbook: Workbook,
    shared_strings: Lazy<SharedStringTable>,
    styles: Lazy<StyleTable>,
    /// Keyed by worksheet member name.
    sheets: HashMap<String, Lazy<Worksheet>>,
    doc_props: Lazy<DocProps>,
    /// The calculation chain was dropped for this session.
    calc_dropped: bool,
    /// SHA-256 digest to media member name, built on the first image insert.
    media: Option<HashMap<Vec<u8>, String>>,
}

impl std::fmt::Debug for PackageEditor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PackageEditor")
            .field("path", &self.path())
            .field("sheets", &self.sheet_names())
            .field("strategy", &self.strategy())
            .finish_non_exhaustive()
    }
}

impl PackageEditor {
    /// Open an existing package with default options, reporting through
    /// the `log` facade.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, WorkbookOptions::default(), default_sink())
    }

    pub fn open_with(path: impl AsRef<Path>, options: WorkbookOptions, diagnostics: SharedDiagnostics) -> Result<Self> {
        let source = Source::open(path.as_ref(), diagnostics.clone())?;
        if !source.contains(CONTENT_TYPES) {
            return Err(OpcError::PartNotFound(CONTENT_TYPES.to_string()).into());
        }
        let parsed = ContentTypes::from_xml(&source.extract(CONTENT_TYPES)?)
            .map_err(|e| PackageError::xml(CONTENT_TYPES, e))?;
        source.warn_all(CONTENT_TYPES, parsed.warnings);
        let content_types = parsed.value;

        let parsed = PartGraph::from_reader(source.reader())?;
        for warning in &parsed.warnings {
            diagnostics.warn(warning);
        }
        let graph = parsed.value;

        let workbook_path = workbook_part(&graph).ok_or_else(|| OpcError::PartNotFound(DEFAULT_WORKBOOK.to_string()))?;
        let workbook = {
            let bytes = source.extract(&workbook_path)?;
            let rels = graph.rels(&workbook_path);
            let resolve = |id: &str| {
                rels.and_then(|r| r.get(id))
                    .and_then(|r| r.target_part(&workbook_path))
            };
            let parsed = parse_workbook(&bytes, &resolve).map_err(|e| PackageError::xml(workbook_path.as_str(), e))?;
            source.warn_all(&workbook_path, parsed.warnings);
            parsed.value
        };

        let paths = PartPaths {
            shared_strings: target_of(&graph, &workbook_path, relationship_type::SHARED_STRINGS),
            styles: target_of(&graph, &workbook_path, relationship_type::STYLES),
            core: target_of(&graph, "", relationship_type::CORE_PROPERTIES),
            app: target_of(&graph, "", relationship_type::EXTENDED_PROPERTIES),
            workbook: workbook_path,
        };
        let mut dirty = DirtyManager::new();
        register_dependencies(&mut dirty, &graph, &content_types, &workbook, &paths.workbook);
        let sheets = workbook
            .sheets
            .iter()
            .map(|s| (s.worksheet_path.clone(), Lazy::unloaded()))
            .collect();
        log::debug!(
            "opened {} with {} parts and {} sheets",
            source.path().display(),
            graph.len(),
            workbook.sheets.len()
        );

        Ok(Self {
            shared_strings: slot_for(&paths.shared_strings),
            styles: slot_for(&paths.styles),
            source: Some(source),
            options,
            diagnostics,
            graph,
            content_types,
            dirty,
            paths,
            workbook,
            sheets,
            doc_props: Lazy::unloaded(),
            calc_dropped: false,
            media: None,
        })
    }

    /// Start a package from scratch: a workbook without sheets, a minimal
    /// styles part, the default theme and document properties.
    pub fn create() -> Result<Self> {
        Self::create_with(WorkbookOptions::default(), default_sink())
    }

    pub fn create_with(options: WorkbookOptions, diagnostics: SharedDiagnostics) -> Result<Self> {
        let mut editor = Self {
            source: None,
            options,
            diagnostics,
            graph: PartGraph::new(),
            content_types: ContentTypes::with_standard_defaults(),
            dirty: DirtyManager::for_new_package(),
            paths: PartPaths {
                workbook: DEFAULT_WORKBOOK.to_string(),
                ..PartPaths::default()
            },
            workbook: Workbook::new(),
            shared_strings: Lazy::absent(),
            styles: Lazy::absent(),
            sheets: HashMap::new(),
            doc_props: Lazy::loaded(DocProps {
                core: CoreProperties::for_new_package(),
                app: AppProperties::for_new_package(),
            }),
            calc_dropped: false,
            media: None,
        };
        editor.attach_part(
            DEFAULT_WORKBOOK,
            PartOrigin::Generated,
            Some(content_type::SML_SHEET_MAIN),
            "",
            relationship_type::OFFICE_DOCUMENT,
        )?;
        editor.create_styles()?;
        editor.attach_part(
            THEME_PART,
            PartOrigin::Blob(Arc::new(Theme::default().to_xml())),
            Some(content_type::OFC_THEME),
            DEFAULT_WORKBOOK,
            relationship_type::THEME,
        )?;
        editor.ensure_core_part()?;
        editor.ensure_app_part()?;
        Ok(editor)
    }

    /// The archive the editor reads from; `None` until a new package is
    /// first committed.
    pub fn path(&self) -> Option<&Path> {
        self.source.as_ref().map(Source::path)
    }

    pub fn options(&self) -> &WorkbookOptions {
        &self.options
    }

    pub fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names().map(str::to_string).collect()
    }

    pub fn sheet_count(&self) -> usize {
        self.workbook.sheets.len()
    }

    pub fn defined_names(&self) -> &[DefinedName] {
        &self.workbook.defined_names
    }

    pub fn graph(&self) -> &PartGraph {
        &self.graph
    }

    pub fn content_types(&self) -> &ContentTypes {
        &self.content_types
    }

    pub fn dirty(&self) -> &DirtyManager {
        &self.dirty
    }

    /// The strategy the next commit would use.
    pub fn strategy(&self) -> CommitStrategy {
        self.dirty.optimal_strategy()
    }

    pub fn is_modified(&self) -> bool {
        self.dirty.has_changes() || self.content_types.is_modified()
    }

    // Cells

    /// Write a value to an A1 reference.
    pub fn set_cell(&mut self, sheet: &str, reference: &str, value: impl Into<Value>) -> Result<()> {
        let at = parse_cell_ref(reference)?;
        self.set_cell_at(sheet, at.row, at.col, value)
    }

    /// Write a value to a 0-based position.
    ///
    /// Strings go through the shared string table unless
    /// [`WorkbookOptions::use_shared_strings`] is off. The first value edit
    /// on an opened package drops the calculation chain and asks the
    /// consumer to recalculate on load.
    pub fn set_cell_at(&mut self, sheet: &str, row: u32, col: u32, value: impl Into<Value>) -> Result<()> {
        let at = CellRef::new(row, col)
            .ok_or_else(|| PackageError::validation(format!("cell ({row}, {col}) is outside the sheet grid")))?;
        let value = value.into();
        validate_value(&value)?;
        let path = self.sheet_path(sheet)?;
        // every fallible step runs before the cell changes
        self.worksheet_mut(&path)?;
        if matches!(value, Value::String(_)) && self.options.use_shared_strings {
            self.shared_strings_mut()?;
        }
        self.invalidate_calculation()?;

        let stored = match value {
            Value::String(s) if self.options.use_shared_strings => {
                let index = self.shared_strings_mut()?.add(&s);
                if let Some(sst) = self.paths.shared_strings.clone() {
                    self.dirty.mark_dirty(&sst, DirtyLevel::Content, None);
                }
                CellValue::SstIndex(index)
            },
            Value::String(s) => CellValue::Inline(s),
            Value::Number(n) => CellValue::Number(n),
            Value::Bool(b) => CellValue::Bool(b),
            Value::Error(e) => CellValue::Error(e),
            Value::Empty => CellValue::Empty,
            Value::Formula { formula, cached } => {
                let result = cached.as_deref().and_then(|c| fast_float2::parse::<f64, _>(c).ok());
                let mut entry = FormulaEntry::new(formula.strip_prefix('=').unwrap_or(&formula));
                if cached.is_some() && result.is_none() {
                    entry.value_type = Some("str".to_string());
                }
                entry.cached = cached;
                let index = self.worksheet_mut(&path)?.add_formula(entry);
                CellValue::Formula {
                    index,
                    result: result.unwrap_or(0.0),
                }
            },
        };
        let detached = self.worksheet_mut(&path)?.set_value(at, stored);
        if detached > 0 {
            self.diagnostics.info(&format!(
                "{path}: {at} led a shared formula; {detached} cells now hold their cached values"
            ));
        }
        self.dirty.mark_dirty(&path, DirtyLevel::Content, Some(&at.to_string()));
        Ok(())
    }

    pub fn get_cell(&self, sheet: &str, reference: &str) -> Result<Value> {
        let at = parse_cell_ref(reference)?;
        self.get_cell_at(sheet, at.row, at.col)
    }

    /// The value at a 0-based position; [`Value::Empty`] when nothing is
    /// stored there. Dates come back as their serial number.
    pub fn get_cell_at(&self, sheet: &str, row: u32, col: u32) -> Result<Value> {
        let at = CellRef::new(row, col)
            .ok_or_else(|| PackageError::validation(format!("cell ({row}, {col}) is outside the sheet grid")))?;
        let path = self.sheet_path(sheet)?;
        let ws = self.worksheet(&path)?;
        let Some(cell) = ws.get(at) else {
            return Ok(Value::Empty);
        };
        Ok(match &cell.value {
            CellValue::Number(n) => Value::Number(*n),
            CellValue::SstIndex(index) => {
                let table = self.shared_strings()?;
                match table.as_deref().and_then(|t| t.get(*index)) {
                    Some(s) => Value::String(s.to_string()),
                    None => {
                        self.diagnostics
                            .warn(&format!("{path}: {at} refers to missing shared string {index}"));
                        Value::Empty
                    },
                }
            },
            CellValue::Inline(s) => Value::String(s.clone()),
            CellValue::Bool(b) => Value::Bool(*b),
            CellValue::Formula { index, .. } => match ws.formula(*index) {
                Some(entry) => Value::Formula {
                    formula: entry.text.clone(),
                    cached: entry.cached.clone(),
                },
                None => Value::Empty,
            },
            CellValue::Error(e) => Value::Error(e.clone()),
            CellValue::Empty => Value::Empty,
        })
    }

    // Formats

    /// Number of `cellXfs` entries; valid style ids are below it.
    pub fn style_count(&self) -> Result<usize> {
        let loader = self.loader();
        Ok(self
            .styles
            .get(|| loader.styles())?
            .map_or(0, |table| table.xf_count()))
    }

    /// Add a cell format and return its `cellXfs` id. Ids are stable: an
    /// existing id never changes meaning.
    pub fn append_style(&mut self, format: &CellFormat) -> Result<u32> {
        let styles = self.styles_mut()?;
        if styles.is_prefixed_root() {
            return Err(PackageError::validation(
                "the styles part uses a prefixed root element; formats cannot be appended",
            ));
        }
        let id = styles.append(format);
        let has_pending = styles.has_pending();
        if has_pending && let Some(path) = self.paths.styles.clone() {
            self.dirty.mark_dirty(&path, DirtyLevel::Content, Some("cellXfs"));
        }
        Ok(id)
    }

    pub fn set_cell_style(&mut self, sheet: &str, reference: &str, style: u32) -> Result<()> {
        let at = parse_cell_ref(reference)?;
        self.check_style(Some(style))?;
        let path = self.sheet_path(sheet)?;
        self.worksheet_mut(&path)?.set_style(at, Some(style));
        self.dirty.mark_dirty(&path, DirtyLevel::Content, Some(reference));
        Ok(())
    }

    pub fn cell_style(&self, sheet: &str, reference: &str) -> Result<Option<u32>> {
        let at = parse_cell_ref(reference)?;
        let path = self.sheet_path(sheet)?;
        Ok(self.worksheet(&path)?.get(at).and_then(|c| c.style))
    }

    /// Assign (or with `None`, clear) the format of a 0-based column.
    pub fn set_column_format(&mut self, sheet: &str, col: u32, style: Option<u32>) -> Result<()> {
        if col > MAX_COL {
            return Err(PackageError::validation(format!("column {col} is outside the sheet grid")));
        }
        self.check_style(style)?;
        let path = self.sheet_path(sheet)?;
        self.worksheet_mut(&path)?.set_column_format(col, style);
        self.dirty.mark_dirty(&path, DirtyLevel::Content, Some("cols"));
        Ok(())
    }

    /// Assign (or with `None`, clear) the format of a 0-based row.
    pub fn set_row_format(&mut self, sheet: &str, row: u32, style: Option<u32>) -> Result<()> {
        if row > MAX_ROW {
            return Err(PackageError::validation(format!("row {row} is outside the sheet grid")));
        }
        self.check_style(style)?;
        let path = self.sheet_path(sheet)?;
        self.worksheet_mut(&path)?.set_row_format(row, style);
        self.dirty.mark_dirty(&path, DirtyLevel::Content, None);
        Ok(())
    }

    pub fn column_format(&self, sheet: &str, col: u32) -> Result<Option<u32>> {
        let path = self.sheet_path(sheet)?;
        Ok(self.worksheet(&path)?.column_format(col))
    }

    pub fn row_format(&self, sheet: &str, row: u32) -> Result<Option<u32>> {
        let path = self.sheet_path(sheet)?;
        Ok(self.worksheet(&path)?.row_format(row))
    }

    /// `(first_row, first_col, last_row, last_col)`, 0-based; `None` for an
    /// empty sheet.
    pub fn used_range(&self, sheet: &str) -> Result<Option<UsedRange>> {
        let path = self.sheet_path(sheet)?;
        Ok(self.worksheet(&path)?.used_range())
    }

    // Sheets

    /// Append an empty worksheet.
    pub fn add_sheet(&mut self, name: &str) -> Result<()> {
        validate_sheet_name(name, self.workbook.sheet_names())?;
        self.doc_props_mut()?;
        let path = self.free_part_name("xl/worksheets/sheet", "xml");
        let workbook = self.paths.workbook.clone();
        self.dirty.add_dependency(&workbook, &path);
        let rel_id = self.attach_part(
            &path,
            PartOrigin::Generated,
            Some(content_type::SML_WORKSHEET),
            &workbook,
            relationship_type::WORKSHEET,
        )?;
        let sheet_id = self.workbook.next_sheet_id();
        self.workbook.push_sheet(WorksheetInfo {
            name: name.to_string(),
            sheet_id,
            rel_id,
            worksheet_path: path.clone(),
            state: SheetState::Visible,
        });
        self.sheets.insert(path, Lazy::loaded(Worksheet::new()));
        self.sync_app_titles()
    }

    /// Remove a worksheet together with the parts only it refers to
    /// (drawings, comments, images no other part uses).
    pub fn remove_sheet(&mut self, name: &str) -> Result<()> {
        let index = self.sheet_index(name)?;
        if self.workbook.sheets.len() == 1 {
            return Err(PackageError::validation("a workbook must keep at least one sheet"));
        }
        self.doc_props_mut()?;
        let info = self
            .workbook
            .remove_sheet(index)
            .ok_or_else(|| PackageError::Internal(format!("sheet index {index} vanished")))?;
        let path = info.worksheet_path;
        let owned = self.graph.exclusively_owned_parts(&path);
        self.dirty.mark_dirty(&path, DirtyLevel::Structure, None);
        for part in owned.iter().chain(std::iter::once(&path)) {
            if self.graph.contains(part) {
                self.remove_part(part)?;
            }
        }
        self.sheets.remove(&path);
        self.media = None;
        log::debug!("removed sheet {} ({path}) and {} owned parts", info.name, owned.len());
        self.sync_app_titles()
    }

    /// Rename a worksheet. References to it in defined names and in the
    /// formulas of every sheet are rewritten.
    pub fn rename_sheet(&mut self, old: &str, new: &str) -> Result<()> {
        let index = self.sheet_index(old)?;
        let others = self
            .workbook
            .sheets
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != index)
            .map(|(_, s)| s.name.as_str());
        validate_sheet_name(new, others)?;
        let old_name = self.workbook.sheets[index].name.clone();
        if old_name == new {
            return Ok(());
        }

        self.doc_props_mut()?;
        let paths: Vec<String> = self
            .workbook
            .sheets
            .iter()
            .map(|s| s.worksheet_path.clone())
            .collect();
        for path in &paths {
            if self.may_hold_formulas(path)? {
                self.worksheet_mut(path)?;
            }
        }

        self.workbook.rename_sheet(index, new);
        for path in &paths {
            let Some(ws) = self.sheets.get_mut(path).and_then(Lazy::loaded_mut) else {
                continue;
            };
            if ws.rename_sheet_references(&old_name, new) > 0 {
                self.dirty.mark_dirty(path, DirtyLevel::Content, Some("formulas"));
            }
        }
        let workbook = self.paths.workbook.clone();
        self.dirty.mark_dirty(&workbook, DirtyLevel::Content, Some("sheets"));
        self.sync_app_titles()
    }

    // Document properties

    pub fn doc_props(&self) -> Result<DocProps> {
        let loader = self.loader();
        Ok(self
            .doc_props
            .get(|| loader.doc_props())?
            .map(|props| props.clone())
            .unwrap_or_default())
    }

    /// Replace the document properties. `TitlesOfParts` always follows the
    /// sheet list, so `props.app.titles` is ignored.
    pub fn set_doc_props(&mut self, mut props: DocProps) -> Result<()> {
        let current = self.doc_props_mut()?.clone();
        props.app.titles = current.app.titles.clone();
        if props.core != current.core {
            let core = self.ensure_core_part()?;
            self.dirty.mark_dirty(&core, DirtyLevel::Content, None);
        }
        if props.app != current.app {
            let app = self.ensure_app_part()?;
            self.dirty.mark_dirty(&app, DirtyLevel::Content, None);
        }
        *self.doc_props_mut()? = props;
        Ok(())
    }

    // Internals

    fn loader(&self) -> Loader<'_> {
        Loader {
            source: self.source.as_ref(),
            paths: &self.paths,
        }
    }

    fn sheet_index(&self, name: &str) -> Result<usize> {
        self.workbook
            .sheet_index(name)
            .ok_or_else(|| PackageError::validation(format!("no sheet named \"{name}\"")))
    }

    fn sheet_path(&self, name: &str) -> Result<String> {
        self.workbook
            .sheet(name)
            .map(|s| s.worksheet_path.clone())
            .ok_or_else(|| PackageError::validation(format!("no sheet named \"{name}\"")))
    }

    fn worksheet(&self, path: &str) -> Result<Ref<'_, Worksheet>> {
        let loader = self.loader();
        let slot = self
            .sheets
            .get(path)
            .ok_or_else(|| PackageError::Internal(format!("no model slot for {path}")))?;
        slot.get(|| loader.worksheet(path, &loader.date_flags(&self.styles)?))?
            .ok_or_else(|| OpcError::PartNotFound(path.to_string()).into())
    }

    fn worksheet_mut(&mut self, path: &str) -> Result<&mut Worksheet> {
        let loader = Loader {
            source: self.source.as_ref(),
            paths: &self.paths,
        };
        let styles = &self.styles;
        let slot = self
            .sheets
            .get_mut(path)
            .ok_or_else(|| PackageError::Internal(format!("no model slot for {path}")))?;
        slot.get_mut(|| loader.worksheet(path, &loader.date_flags(styles)?))?
            .ok_or_else(|| OpcError::PartNotFound(path.to_string()).into())
    }

    /// Whether a sheet is loaded or its source part contains a formula.
    fn may_hold_formulas(&self, path: &str) -> Result<bool> {
        if self.sheets.get(path).is_some_and(Lazy::is_loaded) {
            return Ok(true);
        }
        let Some(source) = self.source.as_ref().filter(|s| s.contains(path)) else {
            return Ok(false);
        };
        let bytes = source.extract(path)?;
        Ok(memmem::find(&bytes, b"<f>").is_some() || memmem::find(&bytes, b"<f ").is_some())
    }

    fn shared_strings(&self) -> Result<Option<Ref<'_, SharedStringTable>>> {
        let loader = self.loader();
        self.shared_strings.get(|| loader.shared_strings())
    }

    /// The shared string table, creating the part on first use.
    fn shared_strings_mut(&mut self) -> Result<&mut SharedStringTable> {
        if self.paths.shared_strings.is_none() {
            self.claim_part_name(SHARED_STRINGS_PART)?;
            let workbook = self.paths.workbook.clone();
            self.attach_part(
                SHARED_STRINGS_PART,
                PartOrigin::Generated,
                Some(content_type::SML_SHARED_STRINGS),
                &workbook,
                relationship_type::SHARED_STRINGS,
            )?;
            self.paths.shared_strings = Some(SHARED_STRINGS_PART.to_string());
            self.shared_strings.set(SharedStringTable::new());
        }
        let loader = Loader {
            source: self.source.as_ref(),
            paths: &self.paths,
        };
        self.shared_strings
            .get_mut(|| loader.shared_strings())?
            .ok_or_else(|| OpcError::PartNotFound(SHARED_STRINGS_PART.to_string()).into())
    }

    fn create_styles(&mut self) -> Result<()> {
        self.claim_part_name(STYLES_PART)?;
        let workbook = self.paths.workbook.clone();
        self.attach_part(
            STYLES_PART,
            PartOrigin::Generated,
            Some(content_type::SML_STYLES),
            &workbook,
            relationship_type::STYLES,
        )?;
        self.paths.styles = Some(STYLES_PART.to_string());
        self.styles.set(StyleTable::new_default());
        Ok(())
    }

    fn styles_mut(&mut self) -> Result<&mut StyleTable> {
        if self.paths.styles.is_none() {
            self.create_styles()?;
        }
        let loader = Loader {
            source: self.source.as_ref(),
            paths: &self.paths,
        };
        self.styles
            .get_mut(|| loader.styles())?
            .ok_or_else(|| OpcError::PartNotFound(STYLES_PART.to_string()).into())
    }

    fn check_style(&self, style: Option<u32>) -> Result<()> {
        let Some(style) = style else {
            return Ok(());
        };
        let count = self.style_count()?;
        if style as usize >= count {
            return Err(PackageError::validation(format!(
                "style {style} does not exist; the workbook has {count}"
            )));
        }
        Ok(())
    }

    fn doc_props_mut(&mut self) -> Result<&mut DocProps> {
        let loader = Loader {
            source: self.source.as_ref(),
            paths: &self.paths,
        };
        self.doc_props
            .get_mut(|| loader.doc_props())?
            .ok_or_else(|| PackageError::Internal("document properties unavailable".to_string()))
    }

    /// Member name of the core properties part, creating it if needed.
    fn ensure_core_part(&mut self) -> Result<String> {
        if let Some(path) = &self.paths.core {
            return Ok(path.clone());
        }
        self.claim_part_name(CORE_PART)?;
        self.attach_part(
            CORE_PART,
            PartOrigin::Generated,
            Some(content_type::OPC_CORE_PROPERTIES),
            "",
            relationship_type::CORE_PROPERTIES,
        )?;
        self.paths.core = Some(CORE_PART.to_string());
        Ok(CORE_PART.to_string())
    }

    fn ensure_app_part(&mut self) -> Result<String> {
        if let Some(path) = &self.paths.app {
            return Ok(path.clone());
        }
        self.claim_part_name(APP_PART)?;
        self.attach_part(
            APP_PART,
            PartOrigin::Generated,
            Some(content_type::OFC_EXTENDED_PROPERTIES),
            "",
            relationship_type::EXTENDED_PROPERTIES,
        )?;
        self.paths.app = Some(APP_PART.to_string());
        let titles = self.sheet_names();
        self.doc_props_mut()?.app.titles = titles;
        Ok(APP_PART.to_string())
    }

    /// Keep `TitlesOfParts` in step with the sheet list.
    fn sync_app_titles(&mut self) -> Result<()> {
        let Some(app) = self.paths.app.clone() else {
            return Ok(());
        };
        let titles = self.sheet_names();
        let props = self.doc_props_mut()?;
        if props.app.titles != titles {
            props.app.titles = titles;
            self.dirty.mark_dirty(&app, DirtyLevel::Content, Some("TitlesOfParts"));
        }
        Ok(())
    }

    /// Drop the calculation chain once per session and have the consumer
    /// recalculate everything on load.
    fn invalidate_calculation(&mut self) -> Result<()> {
        if self.calc_dropped || self.source.is_none() {
            return Ok(());
        }
        let workbook = self.paths.workbook.clone();
        let chain = target_of(&self.graph, &workbook, relationship_type::CALC_CHAIN)
            .or_else(|| self.graph.contains(CALC_CHAIN_PART).then(|| CALC_CHAIN_PART.to_string()));
        if let Some(chain) = chain {
            self.remove_part(&chain)?;
            log::debug!("dropped {chain}");
        }
        self.calc_dropped = true;
        self.workbook.set_calc_attr("fullCalcOnLoad", Some("1"));
        self.dirty.mark_dirty(&workbook, DirtyLevel::Content, Some("calcPr"));
        Ok(())
    }

    /// Add a part, its content-type override and a relationship from
    /// `owner`. Returns the relationship id.
    fn attach_part(
        &mut self,
        path: &str,
        origin: PartOrigin,
        media_type: Option<&str>,
        owner: &str,
        rel_type: &str,
    ) -> Result<String> {
        self.graph.add_part(path, origin);
        if let Some(media_type) = media_type {
            self.content_types.add_override(path, media_type);
            self.dirty.add_dependency(CONTENT_TYPES, path);
        }
        let rel_id = self.graph.relate(owner, rel_type, path)?;
        self.dirty.add_dependency(&packuri::rels_path_for(owner), path);
        self.dirty.mark_dirty(path, DirtyLevel::Structure, None);
        Ok(rel_id)
    }

    /// Remove a part and everything that pointed at it.
    fn remove_part(&mut self, path: &str) -> Result<()> {
        self.graph.remove_part(path)?;
        self.dirty.mark_dirty(path, DirtyLevel::Content, None);
        self.content_types.remove_override(path);
        self.dirty.remove_dependencies_on(path);
        Ok(())
    }

    fn claim_part_name(&self, path: &str) -> Result<()> {
        if self.graph.contains(path) {
            return Err(PackageError::Internal(format!("{path} already exists but is not related as expected")));
        }
        Ok(())
    }

    /// `{stem}{n}.{ext}` with the smallest `n` used neither in the graph nor
    /// in the source archive.
    fn free_part_name(&self, stem: &str, ext: &str) -> String {
        let mut n = 1u32;
        loop {
            let name = format!("{stem}{n}.{ext}");
            let in_source = self.source.as_ref().is_some_and(|s| s.contains(&name));
            if !self.graph.contains(&name) && !in_source {
                return name;
            }
            n += 1;
        }
    }

    /// Current bytes of a part: its in-memory blob or the source entry.
    fn part_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let node = self
            .graph
            .get_part(path)
            .ok_or_else(|| OpcError::PartNotFound(path.to_string()))?;
        match &node.origin {
            PartOrigin::Blob(bytes) => Ok(bytes.as_ref().clone()),
            PartOrigin::Source => match &self.source {
                Some(source) => source.extract(path),
                None => Err(OpcError::PartNotFound(path.to_string()).into()),
            },
            PartOrigin::Generated => Err(PackageError::Internal(format!("{path} has no bytes before commit"))),
        }
    }
}

fn validate_value(value: &Value) -> Result<()> {
    match value {
        Value::Number(n) if !n.is_finite() => {
            Err(PackageError::validation(format!("{n} cannot be stored in a cell")))
        },
        Value::Error(code) if !code.starts_with('#') => {
            Err(PackageError::validation(format!("\"{code}\" is not an error code")))
        },
        Value::Formula { formula, .. } if formula.trim_start_matches('=').trim().is_empty() => {
            Err(PackageError::validation("empty formula"))
        },
        _ => Ok(()),
    }
}
