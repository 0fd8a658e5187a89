//! The archive an editor was opened from.

use crate::common::xml::{self, Parsed};
use crate::ooxml::xlsx::error::{PackageError, Result};
use longan_zip::{RawEntry, SharedDiagnostics, ZipError, ZipReader};
use std::cell::Cell;
use std::path::{Path, PathBuf};

/// Chunk pump handed to the chunked part parsers.
pub(crate) type ChunkFeed<'a> = Box<dyn FnOnce(&mut dyn FnMut(&[u8]) -> bool) -> xml::Result<()> + 'a>;

pub(crate) struct Source {
    reader: ZipReader,
    path: PathBuf,
}

impl Source {
    pub fn open(path: &Path, diagnostics: SharedDiagnostics) -> Result<Self> {
        if !path.is_file() {
            return Err(PackageError::FileNotFound(path.to_path_buf()));
        }
        let reader = ZipReader::open_with(path, diagnostics).map_err(|e| PackageError::read(path, e))?;
        Ok(Self {
            reader,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn reader(&self) -> &ZipReader {
        &self.reader
    }

    pub fn contains(&self, part: &str) -> bool {
        self.reader.contains(part)
    }

    pub fn extract(&self, part: &str) -> Result<Vec<u8>> {
        self.reader.extract(part).map_err(|e| PackageError::read(&self.path, e))
    }

    pub fn raw_entry(&self, part: &str) -> Result<RawEntry> {
        self.reader.raw_entry(part).map_err(|e| PackageError::read(&self.path, e))
    }

    /// Run a chunked parser over a part without inflating it in one piece.
    /// Parser warnings go to the reader's diagnostics.
    pub fn parse_streamed<T, P>(&self, part: &str, parse: P) -> Result<T>
    where
        P: FnOnce(ChunkFeed<'_>) -> xml::Result<Parsed<T>>,
    {
        let failure: Cell<Option<ZipError>> = Cell::new(None);
        let feed: ChunkFeed<'_> = Box::new(|sink| match self.reader.stream(part, sink) {
            Ok(_) => Ok(()),
            Err(e) => {
                let message = e.to_string();
                failure.set(Some(e));
                Err(xml::XmlError::new(xml::XmlErrorKind::IoError, message))
            },
        });
        let parsed = parse(feed);
        if let Some(e) = failure.take() {
            return Err(PackageError::read(&self.path, e));
        }
        let parsed = parsed.map_err(|e| PackageError::xml(part, e))?;
        self.warn_all(part, parsed.warnings);
        Ok(parsed.value)
    }

    pub fn warn_all(&self, part: &str, warnings: Vec<String>) {
        let diagnostics = self.reader.diagnostics();
        for warning in warnings {
            diagnostics.warn(&format!("{part}: {warning}"));
        }
    }

    pub fn close(&self) {
        self.reader.close();
    }
}
