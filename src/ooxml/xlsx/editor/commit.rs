//! Repacking an edited package.
//!
//! Entries are written in source order with `[Content_Types].xml` first.
//! A part is regenerated from its model only when it was created in this
//! session or marked at content level or above; everything else is copied
//! as raw compressed bytes. New parts and rels follow the source entries.

use super::PackageEditor;
use super::slot::Lazy;
use super::source::Source;
use crate::common::xml::{XmlError, XmlErrorKind};
use crate::ooxml::opc::packuri::{self, CONTENT_TYPES};
use crate::ooxml::opc::{OpcError, PartOrigin};
use crate::ooxml::xlsx::dirty::{CommitStrategy, DirtyLevel};
use crate::ooxml::xlsx::error::{PackageError, Result};
use crate::ooxml::xlsx::options::Mode;
use crate::ooxml::xlsx::writer::{
    append_shared_strings, append_styles, stream_worksheet, update_app_properties, update_workbook,
    write_app_properties, write_core_properties, write_shared_strings, write_styles, write_workbook,
    write_worksheet,
};
use longan_zip::{ZipStats, ZipWriter};
use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};

/// What a commit wrote.
#[derive(Debug, Clone)]
pub struct CommitReport {
    pub strategy: CommitStrategy,
    /// Entries serialised from models or in-memory blobs.
    pub regenerated: Vec<String>,
    /// Entries copied compressed from the source.
    pub copied: Vec<String>,
    /// Source entries left out of the new archive.
    pub removed: Vec<String>,
    pub stats: ZipStats,
}

impl CommitReport {
    fn new(strategy: CommitStrategy) -> Self {
        Self {
            strategy,
            regenerated: Vec::new(),
            copied: Vec::new(),
            removed: Vec::new(),
            stats: ZipStats::default(),
        }
    }
}

type Archive = ZipWriter<BufWriter<File>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PartKind {
    Workbook,
    SharedStrings,
    Styles,
    Core,
    App,
    Sheet,
    Other,
}

impl PackageEditor {
    /// Write the package to `dst` through a temporary file in the same
    /// directory (or [`WorkbookOptions::tmpdir`](crate::ooxml::xlsx::WorkbookOptions::tmpdir))
    /// and rename it into place. On success the editor reads from `dst`.
    ///
    /// If anything fails, `dst` and the source are left as they were.
    pub fn commit(&mut self, dst: impl AsRef<Path>) -> Result<CommitReport> {
        let dst = dst.as_ref();
        if self.workbook.sheets.is_empty() {
            return Err(PackageError::validation("a workbook needs at least one sheet"));
        }
        if self.options.compression_level > 9 {
            return Err(PackageError::validation(format!(
                "compression level {} is outside 0..=9",
                self.options.compression_level
            )));
        }
        self.prepare_commit()?;
        let mut report = CommitReport::new(self.dirty.optimal_strategy());
        log::debug!("committing to {} with {:?}", dst.display(), report.strategy);

        let dir = self
            .options
            .tmpdir
            .clone()
            .or_else(|| {
                dst.parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .map(Path::to_path_buf)
            })
            .unwrap_or_else(|| PathBuf::from("."));
        let tmp = tempfile::Builder::new()
            .prefix(".longan-")
            .suffix(".tmp")
            .tempfile_in(&dir)
            .map_err(|e| PackageError::write(dst, e))?;
        let file = tmp.as_file().try_clone().map_err(|e| PackageError::write(dst, e))?;
        let mut zip = ZipWriter::with_diagnostics(BufWriter::new(file), self.diagnostics.clone());
        zip.set_compression_level(self.options.compression_level)
            .map_err(|e| PackageError::write(dst, e))?;
        zip.set_zip64(self.options.use_zip64);

        let mode = self.output_mode();
        self.write_entries(&mut zip, dst, mode, &mut report)?;
        report.stats = zip.close().map_err(|e| PackageError::write(dst, e))?;
        let file = zip
            .finish()
            .map_err(|e| PackageError::write(dst, e))?
            .into_inner()
            .map_err(|e| PackageError::write(dst, e.into_error()))?;
        file.sync_all().map_err(|e| PackageError::write(dst, e))?;
        drop(file);

        let same_file = self.source.as_ref().is_some_and(|s| same_path(s.path(), dst));
        if same_file && let Some(source) = &self.source {
            source.close();
        }
        if let Err(e) = tmp.persist(dst) {
            if same_file && let Some(path) = self.path().map(Path::to_path_buf) {
                self.source = Some(Source::open(&path, self.diagnostics.clone())?);
            }
            return Err(PackageError::write(dst, e.error));
        }
        self.finish_commit(dst)?;
        log::debug!(
            "wrote {} entries to {}: {} regenerated, {} copied, {} removed",
            report.stats.entries_written,
            dst.display(),
            report.regenerated.len(),
            report.copied.len(),
            report.removed.len()
        );
        Ok(report)
    }

    /// Commit back to the archive the editor reads from.
    pub fn save(&mut self) -> Result<CommitReport> {
        let path = self
            .path()
            .map(Path::to_path_buf)
            .ok_or_else(|| PackageError::validation("a new package has no path yet; use commit"))?;
        self.commit(path)
    }

    /// Refresh the modification time and apply the calculation options.
    fn prepare_commit(&mut self) -> Result<()> {
        if self.dirty.is_pure_create() || self.is_modified() {
            let core = self.ensure_core_part()?;
            self.doc_props_mut()?.core.touch();
            self.dirty.mark_dirty(&core, DirtyLevel::Content, Some("dcterms:modified"));
        }
        let wanted = [
            ("calcOnLoad", self.options.calc_on_load),
            ("fullCalcOnLoad", self.options.full_calc_on_load),
        ];
        for (attr, on) in wanted {
            if on && self.workbook.calc_attr(attr) != Some("1") {
                self.workbook.set_calc_attr(attr, Some("1"));
                let workbook = self.paths.workbook.clone();
                self.dirty.mark_dirty(&workbook, DirtyLevel::Content, Some("calcPr"));
            }
        }
        Ok(())
    }

    fn output_mode(&self) -> Mode {
        let (cells, bytes) = self
            .sheets
            .values()
            .filter_map(Lazy::loaded_ref)
            .fold((0, 0), |(cells, bytes), ws| {
                (cells + ws.cell_count(), bytes + ws.memory_estimate())
            });
        self.options.effective_mode(cells, bytes)
    }

    fn write_entries(&self, zip: &mut Archive, dst: &Path, mode: Mode, report: &mut CommitReport) -> Result<()> {
        let source = self.source.as_ref();
        let write_types = source.is_none_or(|s| !s.contains(CONTENT_TYPES))
            || self.content_types.is_modified()
            || self.dirty.needs_regeneration(CONTENT_TYPES);
        if write_types {
            self.emit(zip, CONTENT_TYPES, &self.content_types.to_xml(), Vec::new(), dst)?;
            report.regenerated.push(CONTENT_TYPES.to_string());
        } else if let Some(source) = source {
            self.copy_raw(zip, source, CONTENT_TYPES, dst)?;
            report.copied.push(CONTENT_TYPES.to_string());
        }

        let mut stale_rels: BTreeSet<String> = self.graph.dirty_rels(self.dirty.dirty_parts());
        stale_rels.extend(
            self.graph
                .changed_rels_sources()
                .iter()
                .map(|owner| packuri::rels_path_for(owner)),
        );

        if let Some(source) = source {
            let removed: BTreeSet<&str> = self.graph.removed_parts().collect();
            for entry in source.reader().entries() {
                let path = entry.path.as_str();
                if entry.is_dir || path == CONTENT_TYPES || zip.contains(path) {
                    continue;
                }
                match packuri::source_of_rels(path) {
                    Some(owner) if removed.contains(owner.as_str()) => {
                        report.removed.push(path.to_string());
                    },
                    Some(owner) if !owner.is_empty() && !self.graph.contains(&owner) => {
                        self.copy_raw(zip, source, path, dst)?;
                        report.copied.push(path.to_string());
                    },
                    Some(owner) if stale_rels.contains(path) || self.dirty.needs_regeneration(path) => {
                        self.write_rels(zip, &owner, dst, report)?;
                    },
                    Some(_) => {
                        self.copy_raw(zip, source, path, dst)?;
                        report.copied.push(path.to_string());
                    },
                    None if !self.graph.contains(path) => {
                        report.removed.push(path.to_string());
                    },
                    None => self.write_part(zip, path, mode, dst, report)?,
                }
            }
        }

        for path in self.graph.part_paths() {
            if !zip.contains(path) {
                self.write_part(zip, path, mode, dst, report)?;
            }
        }
        for owner in std::iter::once("").chain(self.graph.part_paths()) {
            let rels_path = packuri::rels_path_for(owner);
            let has_rels = self.graph.rels(owner).is_some_and(|r| !r.is_empty());
            if has_rels && !zip.contains(&rels_path) {
                self.write_rels(zip, owner, dst, report)?;
            }
        }
        Ok(())
    }

    fn write_rels(&self, zip: &mut Archive, owner: &str, dst: &Path, report: &mut CommitReport) -> Result<()> {
        let rels_path = packuri::rels_path_for(owner);
        match self.graph.rels(owner).filter(|r| !r.is_empty()) {
            Some(rels) => {
                self.emit(zip, &rels_path, &rels.to_xml(), Vec::new(), dst)?;
                report.regenerated.push(rels_path);
            },
            None => report.removed.push(rels_path),
        }
        Ok(())
    }

    fn write_part(&self, zip: &mut Archive, path: &str, mode: Mode, dst: &Path, report: &mut CommitReport) -> Result<()> {
        let node = self
            .graph
            .get_part(path)
            .ok_or_else(|| OpcError::PartNotFound(path.to_string()))?;
        let generated = match &node.origin {
            PartOrigin::Blob(bytes) => {
                self.emit(zip, path, bytes, Vec::new(), dst)?;
                report.regenerated.push(path.to_string());
                return Ok(());
            },
            PartOrigin::Generated => true,
            PartOrigin::Source => false,
        };
        if (generated || self.dirty.needs_regeneration(path)) && self.regenerate(zip, path, generated, mode, dst)? {
            report.regenerated.push(path.to_string());
            return Ok(());
        }
        match self.source.as_ref().filter(|s| s.contains(path)) {
            Some(source) => {
                self.copy_raw(zip, source, path, dst)?;
                report.copied.push(path.to_string());
                Ok(())
            },
            None => Err(PackageError::Internal(format!("{path} has neither a model nor source bytes"))),
        }
    }

    fn part_kind(&self, path: &str) -> PartKind {
        let is = |p: &Option<String>| p.as_deref() == Some(path);
        if path == self.paths.workbook {
            PartKind::Workbook
        } else if is(&self.paths.shared_strings) {
            PartKind::SharedStrings
        } else if is(&self.paths.styles) {
            PartKind::Styles
        } else if is(&self.paths.core) {
            PartKind::Core
        } else if is(&self.paths.app) {
            PartKind::App
        } else if self.sheets.contains_key(path) {
            PartKind::Sheet
        } else {
            PartKind::Other
        }
    }

    /// Serialise a part from its model. `Ok(false)` when there is no model
    /// to write from and the source bytes should be copied instead.
    fn regenerate(&self, zip: &mut Archive, path: &str, generated: bool, mode: Mode, dst: &Path) -> Result<bool> {
        let kind = self.part_kind(path);
        let has_model = match kind {
            PartKind::Workbook => true,
            PartKind::SharedStrings => self.shared_strings.is_loaded(),
            PartKind::Styles => self.styles.is_loaded(),
            PartKind::Core | PartKind::App => self.doc_props.is_loaded(),
            PartKind::Sheet => self.sheets.get(path).is_some_and(Lazy::is_loaded),
            PartKind::Other => false,
        };
        if !has_model {
            return Ok(false);
        }
        let src = match self.source.as_ref().filter(|s| !generated && s.contains(path)) {
            Some(source) => Some(source.extract(path)?),
            None => None,
        };
        let src = src.as_deref();
        let xml = |e: XmlError| PackageError::xml(path, e);

        let (bytes, warnings) = match kind {
            PartKind::Workbook => match src {
                Some(src) => update_workbook(src, &self.workbook).map_err(xml)?,
                None => (write_workbook(&self.workbook), Vec::new()),
            },
            PartKind::SharedStrings => {
                let Some(table) = self.shared_strings.loaded_ref() else {
                    return Ok(false);
                };
                match src {
                    Some(src) => append_shared_strings(src, &table).map_err(xml)?,
                    None => (write_shared_strings(&table), Vec::new()),
                }
            },
            PartKind::Styles => {
                let Some(table) = self.styles.loaded_ref() else {
                    return Ok(false);
                };
                match src {
                    Some(src) => (append_styles(src, &table).map_err(xml)?, Vec::new()),
                    None => (write_styles(&table), Vec::new()),
                }
            },
            PartKind::Core => {
                let Some(props) = self.doc_props.loaded_ref() else {
                    return Ok(false);
                };
                (write_core_properties(&props.core), Vec::new())
            },
            PartKind::App => {
                let Some(props) = self.doc_props.loaded_ref() else {
                    return Ok(false);
                };
                match src {
                    Some(src) => update_app_properties(src, &props.app).map_err(xml)?,
                    None => (write_app_properties(&props.app), Vec::new()),
                }
            },
            PartKind::Sheet => {
                let Some(ws) = self.sheets.get(path).and_then(Lazy::loaded_ref) else {
                    return Ok(false);
                };
                if mode == Mode::Streaming {
                    let mut entry = zip
                        .open_entry(path)
                        .map_err(|e| PackageError::write(dst, e))?
                        .ok_or_else(|| PackageError::Internal(format!("{path} written twice")))?;
                    let warnings = stream_worksheet(
                        src,
                        &ws,
                        &mut entry,
                        self.options.row_buffer_size,
                        self.options.xml_buffer_size,
                    )
                    .map_err(|e| match e.kind() {
                        XmlErrorKind::IoError => PackageError::write(dst, io::Error::other(e.to_string())),
                        _ => PackageError::xml(path, e),
                    })?;
                    entry.close().map_err(|e| PackageError::write(dst, e))?;
                    self.forward(path, warnings);
                    return Ok(true);
                }
                write_worksheet(src, &ws).map_err(xml)?
            },
            PartKind::Other => return Ok(false),
        };
        self.emit(zip, path, &bytes, warnings, dst)?;
        Ok(true)
    }

    fn emit(&self, zip: &mut Archive, path: &str, bytes: &[u8], warnings: Vec<String>, dst: &Path) -> Result<()> {
        zip.add(path, bytes).map_err(|e| PackageError::write(dst, e))?;
        self.forward(path, warnings);
        Ok(())
    }

    fn copy_raw(&self, zip: &mut Archive, source: &Source, path: &str, dst: &Path) -> Result<()> {
        let raw = source.raw_entry(path)?;
        zip.write_raw(path, &raw.data, &raw.info)
            .map_err(|e| PackageError::write(dst, e))?;
        Ok(())
    }

    fn forward(&self, path: &str, warnings: Vec<String>) {
        for warning in warnings {
            self.diagnostics.warn(&format!("{path}: {warning}"));
        }
    }

    /// Rebind to the committed archive and forget recorded changes.
    fn finish_commit(&mut self, dst: &Path) -> Result<()> {
        self.source = Some(Source::open(dst, self.diagnostics.clone())?);
        let parts: Vec<String> = self.graph.part_paths().map(str::to_string).collect();
        for part in &parts {
            self.graph.set_origin(part, PartOrigin::Source)?;
        }
        self.graph.clear_changes();
        self.content_types.clear_modified();
        self.dirty.clear();
        self.workbook.clear_changes();
        for slot in self.sheets.values_mut() {
            if let Some(ws) = slot.loaded_mut() {
                ws.clear_modified();
            }
        }
        if let Some(table) = self.shared_strings.loaded_mut() {
            table.mark_persisted();
        }
        if let Some(table) = self.styles.loaded_mut() {
            table.clear_pending();
        }
        Ok(())
    }
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
