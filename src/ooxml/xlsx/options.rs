//! Workbook options.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use crate::common::xml::writer::DEFAULT_BUFFER_SIZE;

/// How worksheets are written on commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Pick batch or streaming from the workbook size.
    #[default]
    Auto,
    /// Build every regenerated part in memory.
    Batch,
    /// Write worksheet rows through a streaming archive entry.
    Streaming,
}

/// Configuration of an editor or columnar load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbookOptions {
    /// Force streaming output of worksheets.
    pub constant_memory: bool,
    /// Write ZIP64 end-of-central-directory records.
    pub use_zip64: bool,
    /// Directory for the temporary archive; the destination's directory when unset.
    pub tmpdir: Option<PathBuf>,
    pub calc_on_load: bool,
    pub full_calc_on_load: bool,
    /// Route new string cells through the shared string table.
    pub use_shared_strings: bool,
    pub mode: Mode,
    /// Rows buffered between flushes in streaming mode.
    pub row_buffer_size: usize,
    /// 0 stores entries uncompressed; 1..=9 deflate.
    pub compression_level: u32,
    /// Initial capacity of a part's XML buffer.
    pub xml_buffer_size: usize,
    /// Columns loaded by the columnar reader (0-based); empty loads all.
    pub projected_columns: BTreeSet<u32>,
    /// Rows loaded by the columnar reader; 0 is unlimited.
    pub max_rows: u32,
    pub auto_mode_cell_threshold: usize,
    pub auto_mode_memory_threshold: usize,
}

impl Default for WorkbookOptions {
    fn default() -> Self {
        Self {
            constant_memory: false,
            use_zip64: false,
            tmpdir: None,
            calc_on_load: false,
            full_calc_on_load: false,
            use_shared_strings: true,
            mode: Mode::Auto,
            row_buffer_size: 1000,
            compression_level: 6,
            xml_buffer_size: DEFAULT_BUFFER_SIZE,
            projected_columns: BTreeSet::new(),
            max_rows: 0,
            auto_mode_cell_threshold: 1_000_000,
            auto_mode_memory_threshold: 256 * 1024 * 1024,
        }
    }
}

impl WorkbookOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_constant_memory(mut self, on: bool) -> Self {
        self.constant_memory = on;
        self
    }

    pub fn with_zip64(mut self, on: bool) -> Self {
        self.use_zip64 = on;
        self
    }

    pub fn with_tmpdir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.tmpdir = Some(dir.into());
        self
    }

    pub fn with_calc_on_load(mut self, on: bool) -> Self {
        self.calc_on_load = on;
        self
    }

    pub fn with_full_calc_on_load(mut self, on: bool) -> Self {
        self.full_calc_on_load = on;
        self
    }

    pub fn with_shared_strings(mut self, on: bool) -> Self {
        self.use_shared_strings = on;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_row_buffer_size(mut self, rows: usize) -> Self {
        self.row_buffer_size = rows.max(1);
        self
    }

    /// Levels above 9 are clamped.
    pub fn with_compression_level(mut self, level: u32) -> Self {
        self.compression_level = level.min(9);
        self
    }

    pub fn with_xml_buffer_size(mut self, bytes: usize) -> Self {
        self.xml_buffer_size = bytes;
        self
    }

    pub fn with_projected_columns<I: IntoIterator<Item = u32>>(mut self, columns: I) -> Self {
        self.projected_columns = columns.into_iter().collect();
        self
    }

    pub fn with_max_rows(mut self, rows: u32) -> Self {
        self.max_rows = rows;
        self
    }

    pub fn with_auto_thresholds(mut self, cells: usize, bytes: usize) -> Self {
        self.auto_mode_cell_threshold = cells;
        self.auto_mode_memory_threshold = bytes;
        self
    }

    /// The columnar read filter described by these options.
    pub fn projection(&self) -> Projection {
        Projection {
            columns: self.projected_columns.clone(),
            max_rows: self.max_rows,
        }
    }

    /// Resolve [`Mode::Auto`] for a workbook of `cells` cells taking an
    /// estimated `bytes` of memory. `constant_memory` always streams.
    pub fn effective_mode(&self, cells: usize, bytes: usize) -> Mode {
        if self.constant_memory {
            return Mode::Streaming;
        }
        match self.mode {
            Mode::Auto if cells > self.auto_mode_cell_threshold || bytes > self.auto_mode_memory_threshold => {
                Mode::Streaming
            },
            Mode::Auto => Mode::Batch,
            other => other,
        }
    }
}

/// Parse-time row/column filter for the columnar reader.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    /// Columns to keep; empty keeps all.
    pub columns: BTreeSet<u32>,
    /// Number of leading rows to keep; 0 keeps all.
    pub max_rows: u32,
}

impl Projection {
    pub fn all() -> Self {
        Self::default()
    }

    #[inline]
    pub fn should_skip_column(&self, col: u32) -> bool {
        !self.columns.is_empty() && !self.columns.contains(&col)
    }

    #[inline]
    pub fn should_skip_row(&self, row: u32) -> bool {
        self.max_rows != 0 && row >= self.max_rows
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}
