//! Append-only view of the styles part.
//!
//! Only what the engine needs is modelled: custom number formats, the
//! `cellXfs` records and the sizes of the font, fill and border tables.
//! New entries are kept as pending fragments until the next commit appends
//! them; an index, once handed out, never changes meaning.

use super::format::CellFormat;
use crate::ooxml::xlsx::number_format::{self, FIRST_CUSTOM_ID, NumberFormat};
use crate::ooxml::xlsx::writer::styles::{border_fragment, fill_fragment, font_fragment};
use std::collections::{BTreeMap, HashMap};

/// One `<xf>` of `cellXfs`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct XfRecord {
    pub num_fmt_id: u32,
    pub font_id: u32,
    pub fill_id: u32,
    pub border_id: u32,
}

/// Entries appended since load or the last commit.
#[derive(Debug, Clone, Default)]
pub struct PendingStyles {
    pub num_fmts: Vec<NumberFormat>,
    pub fonts: Vec<Vec<u8>>,
    pub fills: Vec<Vec<u8>>,
    pub borders: Vec<Vec<u8>>,
    pub xfs: Vec<XfRecord>,
}

impl PendingStyles {
    pub fn is_empty(&self) -> bool {
        self.num_fmts.is_empty()
            && self.fonts.is_empty()
            && self.fills.is_empty()
            && self.borders.is_empty()
            && self.xfs.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StyleTable {
    num_fmts: BTreeMap<u32, String>,
    xfs: Vec<XfRecord>,
    font_count: u32,
    fill_count: u32,
    border_count: u32,
    pending: PendingStyles,
    fonts_seen: HashMap<Vec<u8>, u32>,
    fills_seen: HashMap<Vec<u8>, u32>,
    borders_seen: HashMap<Vec<u8>, u32>,
    xfs_seen: HashMap<XfRecord, u32>,
    /// Root element carries a namespace prefix; fragments cannot be spliced in.
    prefixed_root: bool,
}

impl StyleTable {
    /// The table of a freshly generated styles part: one font, the two
    /// mandatory fills, one border and the default `xf`.
    pub fn new_default() -> Self {
        Self::from_parts(BTreeMap::new(), vec![XfRecord::default()], (1, 2, 1), false)
    }

    /// Assemble a table from parsed counts and records.
    pub(crate) fn from_parts(
        num_fmts: BTreeMap<u32, String>,
        xfs: Vec<XfRecord>,
        counts: (u32, u32, u32),
        prefixed_root: bool,
    ) -> Self {
        let mut xfs_seen = HashMap::with_capacity(xfs.len());
        for (i, xf) in xfs.iter().enumerate() {
            xfs_seen.entry(*xf).or_insert(i as u32);
        }
        Self {
            num_fmts,
            xfs,
            xfs_seen,
            font_count: counts.0,
            fill_count: counts.1,
            border_count: counts.2,
            prefixed_root,
            ..Self::default()
        }
    }

    pub fn xf_count(&self) -> usize {
        self.xfs.len()
    }

    pub fn xf(&self, index: u32) -> Option<&XfRecord> {
        self.xfs.get(index as usize)
    }

    pub fn font_count(&self) -> u32 {
        self.font_count
    }

    pub fn fill_count(&self) -> u32 {
        self.fill_count
    }

    pub fn border_count(&self) -> u32 {
        self.border_count
    }

    /// Custom number formats by id.
    pub fn num_fmts(&self) -> &BTreeMap<u32, String> {
        &self.num_fmts
    }

    /// Code of a number format, built-in or custom.
    pub fn num_fmt_code(&self, id: u32) -> Option<&str> {
        self.num_fmts
            .get(&id)
            .map(String::as_str)
            .or_else(|| number_format::builtin_format_code(id))
    }

    /// Whether cells using this `cellXfs` index render as dates.
    pub fn is_date_style(&self, xf_index: u32) -> bool {
        let Some(xf) = self.xf(xf_index) else {
            return false;
        };
        if number_format::is_builtin_date_id(xf.num_fmt_id) {
            return true;
        }
        self.num_fmts
            .get(&xf.num_fmt_id)
            .is_some_and(|code| number_format::is_date_format(code))
    }

    /// One flag per `cellXfs` index, for hot parse loops.
    pub fn date_style_flags(&self) -> Vec<bool> {
        (0..self.xfs.len() as u32).map(|i| self.is_date_style(i)).collect()
    }

    pub fn is_prefixed_root(&self) -> bool {
        self.prefixed_root
    }

    pub fn pending(&self) -> &PendingStyles {
        &self.pending
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Append a cell format and return its `cellXfs` index. Appending the
    /// same descriptor twice returns the same index.
    pub fn append(&mut self, format: &CellFormat) -> u32 {
        let num_fmt_id = match &format.number_format {
            Some(code) => self.number_format_id(code),
            None => 0,
        };
        let font_id = match &format.font {
            Some(font) => {
                let fragment = font_fragment(font);
                Self::intern(&mut self.fonts_seen, &mut self.pending.fonts, &mut self.font_count, fragment)
            },
            None => 0,
        };
        let fill_id = match &format.fill {
            Some(fill) => {
                let fragment = fill_fragment(fill);
                Self::intern(&mut self.fills_seen, &mut self.pending.fills, &mut self.fill_count, fragment)
            },
            None => 0,
        };
        let border_id = match &format.border {
            Some(border) => {
                let fragment = border_fragment(border);
                Self::intern(
                    &mut self.borders_seen,
                    &mut self.pending.borders,
                    &mut self.border_count,
                    fragment,
                )
            },
            None => 0,
        };

        let xf = XfRecord {
            num_fmt_id,
            font_id,
            fill_id,
            border_id,
        };
        if let Some(&index) = self.xfs_seen.get(&xf) {
            return index;
        }
        let index = self.xfs.len() as u32;
        self.xfs.push(xf);
        self.pending.xfs.push(xf);
        self.xfs_seen.insert(xf, index);
        index
    }

    fn intern(seen: &mut HashMap<Vec<u8>, u32>, pending: &mut Vec<Vec<u8>>, count: &mut u32, fragment: Vec<u8>) -> u32 {
        if let Some(&id) = seen.get(&fragment) {
            return id;
        }
        let id = *count;
        *count += 1;
        pending.push(fragment.clone());
        seen.insert(fragment, id);
        id
    }

    fn number_format_id(&mut self, code: &str) -> u32 {
        if let Some(id) = number_format::builtin_id(code) {
            return id;
        }
        if let Some((&id, _)) = self.num_fmts.iter().find(|(_, c)| c.as_str() == code) {
            return id;
        }
        let id = self
            .num_fmts
            .keys()
            .next_back()
            .map_or(FIRST_CUSTOM_ID, |&last| (last + 1).max(FIRST_CUSTOM_ID));
        self.num_fmts.insert(id, code.to_string());
        self.pending.num_fmts.push(NumberFormat::new(id, code));
        id
    }

    /// Pending entries have been written; they are now part of the source.
    pub fn clear_pending(&mut self) {
        self.pending = PendingStyles::default();
    }
}
