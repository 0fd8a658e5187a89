//! Archive writer: buffered entries, streamed entries and raw copies.
//!
//! Entries are written with general purpose flags cleared (no data
//! descriptor), so a streamed entry reserves its local header up front and
//! patches sizes and CRC in place when it is closed. A path is accepted at
//! most once per archive; later attempts are skipped with a warning.

use crate::crc::Checksum;
use crate::diag::{SharedDiagnostics, default_sink};
use crate::error::{Result, ZipError};
use crate::format::{
    self, CompressionMethod, EntryInfo, LOCAL_HEADER_LEN, U16_MAX, U32_MAX,
};
use crate::time::DosDateTime;
use flate2::Compression;
use flate2::write::DeflateEncoder;
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Cursor, Seek, SeekFrom, Write};
use std::path::Path;

/// Default deflate level.
pub const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Output targets a [`ZipWriter`] can finalise into.
///
/// Appending rewrites the central directory over the old one; a sink that
/// supports truncation drops whatever old bytes remain past the new end.
pub trait ArchiveSink: Write + Seek {
    fn truncate_at(&mut self, len: u64) -> io::Result<()> {
        let _ = len;
        Ok(())
    }
}

impl ArchiveSink for File {
    fn truncate_at(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl ArchiveSink for BufWriter<File> {
    fn truncate_at(&mut self, len: u64) -> io::Result<()> {
        self.flush()?;
        self.get_ref().set_len(len)
    }
}

impl ArchiveSink for Cursor<Vec<u8>> {
    fn truncate_at(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().truncate(len as usize);
        Ok(())
    }
}

impl ArchiveSink for Cursor<&mut Vec<u8>> {
    fn truncate_at(&mut self, len: u64) -> io::Result<()> {
        self.get_mut().truncate(len as usize);
        Ok(())
    }
}

/// How [`ZipWriter::open`] treats an existing file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Truncate (or create) the file.
    Create,
    /// Keep existing entries and add new ones after them.
    Append,
}

/// Counters reported when the archive is closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ZipStats {
    pub entries_written: usize,
    /// Uncompressed payload bytes.
    pub bytes_written: u64,
    /// Payload bytes as stored in the archive.
    pub compressed_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Open,
    Poisoned(String),
    Closed,
}

pub struct ZipWriter<W: ArchiveSink> {
    inner: Option<W>,
    records: Vec<EntryInfo>,
    seen: HashSet<String>,
    level: u32,
    zip64: bool,
    /// Offset at which the next local header goes.
    position: u64,
    truncate_on_close: bool,
    state: State,
    stats: ZipStats,
    diagnostics: SharedDiagnostics,
}

impl ZipWriter<BufWriter<File>> {
    /// Create (or truncate) an archive at `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, OpenMode::Create)
    }

    pub fn open(path: impl AsRef<Path>, mode: OpenMode) -> Result<Self> {
        Self::open_with(path, mode, default_sink())
    }

    pub fn open_with(
        path: impl AsRef<Path>,
        mode: OpenMode,
        diagnostics: SharedDiagnostics,
    ) -> Result<Self> {
        let path = path.as_ref();
        match mode {
            OpenMode::Create => {
                let file = File::create(path)?;
                Ok(Self::with_diagnostics(BufWriter::new(file), diagnostics))
            },
            OpenMode::Append => {
                let mut file = OpenOptions::new().read(true).write(true).open(path)?;
                let cd = format::read_central_directory(&mut file)?;
                file.seek(SeekFrom::Start(cd.offset))?;
                let mut writer = Self::with_diagnostics(BufWriter::new(file), diagnostics);
                writer.position = cd.offset;
                writer.truncate_on_close = true;
                writer.seen = cd.entries.iter().map(|e| e.path.clone()).collect();
                writer.records = cd.entries;
                Ok(writer)
            },
        }
    }
}

impl<W: ArchiveSink> ZipWriter<W> {
    /// Write a fresh archive into `inner`, starting at its current position.
    pub fn new(inner: W) -> Self {
        Self::with_diagnostics(inner, default_sink())
    }

    pub fn with_diagnostics(mut inner: W, diagnostics: SharedDiagnostics) -> Self {
        let position = inner.stream_position().unwrap_or(0);
        Self {
            inner: Some(inner),
            records: Vec::new(),
            seen: HashSet::new(),
            level: DEFAULT_COMPRESSION_LEVEL,
            zip64: false,
            position,
            truncate_on_close: false,
            state: State::Open,
            stats: ZipStats::default(),
            diagnostics,
        }
    }

    /// 0 selects STORE; 1..=9 selects DEFLATE at that level.
    pub fn set_compression_level(&mut self, level: u32) -> Result<()> {
        if level > 9 {
            return Err(ZipError::InvalidParameter(format!(
                "compression level {level} is outside 0..=9"
            )));
        }
        self.level = level;
        Ok(())
    }

    pub fn compression_level(&self) -> u32 {
        self.level
    }

    /// Emit ZIP64 end records and allow entries past the ZIP32 limits.
    pub fn set_zip64(&mut self, enabled: bool) {
        self.zip64 = enabled;
    }

    pub fn stats(&self) -> ZipStats {
        self.stats
    }

    pub fn is_closed(&self) -> bool {
        self.state == State::Closed
    }

    /// Whether `path` has already been written (or was present when appending).
    pub fn contains(&self, path: &str) -> bool {
        self.seen.contains(path)
    }

    /// Add one entry. Returns `false` when the path was already written.
    pub fn add(&mut self, path: &str, data: &[u8]) -> Result<bool> {
        self.ensure_writable()?;
        validate_path(path)?;
        if !self.claim(path) {
            return Ok(false);
        }

        let crc = crate::crc32(data);
        let result = if self.level == 0 {
            self.write_entry(
                path,
                CompressionMethod::Stored,
                DosDateTime::now(),
                crc,
                data,
                data.len() as u64,
            )
        } else {
            let mut encoder = DeflateEncoder::new(
                Vec::with_capacity(data.len() / 2 + 64),
                Compression::new(self.level),
            );
            encoder
                .write_all(data)
                .map_err(|e| ZipError::Internal(format!("deflate: {e}")))?;
            let compressed = encoder
                .finish()
                .map_err(|e| ZipError::Internal(format!("deflate: {e}")))?;
            self.write_entry(
                path,
                CompressionMethod::Deflated,
                DosDateTime::now(),
                crc,
                &compressed,
                data.len() as u64,
            )
        };
        self.poison_on_err(result).map(|_| true)
    }

    /// Add a batch of entries, returning how many were written.
    pub fn add_many<I, P, D>(&mut self, entries: I) -> Result<usize>
    where
        I: IntoIterator<Item = (P, D)>,
        P: AsRef<str>,
        D: AsRef<[u8]>,
    {
        let mut written = 0;
        for (path, data) in entries {
            if self.add(path.as_ref(), data.as_ref())? {
                written += 1;
            }
        }
        Ok(written)
    }

    /// Copy an already-compressed entry verbatim.
    ///
    /// `meta` supplies method, CRC, sizes and timestamp, typically from
    /// [`crate::ZipReader::raw_entry`]. Returns `false` for a duplicate path.
    pub fn write_raw(&mut self, path: &str, raw: &[u8], meta: &EntryInfo) -> Result<bool> {
        self.ensure_writable()?;
        validate_path(path)?;
        if raw.len() as u64 != meta.compressed_size {
            return Err(ZipError::InvalidParameter(format!(
                "raw data for '{path}' is {} bytes, metadata says {}",
                raw.len(),
                meta.compressed_size
            )));
        }
        if !self.claim(path) {
            return Ok(false);
        }
        let result = self.write_entry(
            path,
            meta.method,
            meta.mtime,
            meta.crc32,
            raw,
            meta.uncompressed_size,
        );
        self.poison_on_err(result).map(|_| true)
    }

    /// Begin a streamed entry.
    ///
    /// The returned [`EntryWriter`] borrows the archive exclusively, so no
    /// other entry can be written until it is closed. `None` means the path
    /// was already written and the entry was skipped.
    pub fn open_entry(&mut self, path: &str) -> Result<Option<EntryWriter<'_, W>>> {
        self.ensure_writable()?;
        validate_path(path)?;
        if !self.claim(path) {
            return Ok(None);
        }

        let method = if self.level == 0 {
            CompressionMethod::Stored
        } else {
            CompressionMethod::Deflated
        };
        let mtime = DosDateTime::now();
        let offset = self.position;
        let header = format::local_header(path, method, 0, mtime, 0, 0, 0, self.zip64);
        let result = self.emit(&header);
        self.poison_on_err(result)?;

        let encoder = match method {
            CompressionMethod::Deflated => Some(DeflateEncoder::new(
                Vec::with_capacity(64 * 1024),
                Compression::new(self.level),
            )),
            _ => None,
        };
        Ok(Some(EntryWriter {
            path: path.to_string(),
            offset,
            method,
            mtime,
            encoder,
            checksum: Checksum::new(),
            compressed: 0,
            finished: false,
            writer: self,
        }))
    }

    /// Write the central directory and end records.
    ///
    /// Safe to call more than once; later calls return the same stats.
    pub fn close(&mut self) -> Result<ZipStats> {
        match &self.state {
            State::Closed => return Ok(self.stats),
            State::Poisoned(reason) => return Err(ZipError::Internal(reason.clone())),
            State::Open => {},
        }
        let result = self.write_central_directory();
        match result {
            Ok(()) => {
                self.state = State::Closed;
                Ok(self.stats)
            },
            Err(e) => {
                self.state = State::Poisoned(format!("finalising archive failed: {e}"));
                Err(e)
            },
        }
    }

    /// Close the archive and hand back the underlying sink.
    pub fn finish(mut self) -> Result<W> {
        self.close()?;
        self.inner.take().ok_or(ZipError::NotOpen)
    }

    fn write_central_directory(&mut self) -> Result<()> {
        let cd_offset = self.position;
        let mut cd = Vec::with_capacity(self.records.len() * 96);
        for record in &self.records {
            format::write_central_header(&mut cd, record);
        }
        let cd_size = cd.len() as u64;
        let count = self.records.len() as u64;

        let overflow = count >= U16_MAX || cd_offset >= U32_MAX || cd_size >= U32_MAX;
        if overflow && !self.zip64 {
            return Err(ZipError::TooLarge(format!(
                "{count} entries / {} bytes need ZIP64; enable use_zip64",
                cd_offset + cd_size
            )));
        }
        format::write_end_records(&mut cd, count, cd_offset, cd_size, self.zip64);
        self.emit(&cd)?;

        let end = self.position;
        let inner = self.inner.as_mut().ok_or(ZipError::NotOpen)?;
        inner.flush()?;
        if self.truncate_on_close {
            inner.truncate_at(end)?;
        }
        Ok(())
    }

    fn write_entry(
        &mut self,
        path: &str,
        method: CompressionMethod,
        mtime: DosDateTime,
        crc: u32,
        payload: &[u8],
        uncompressed: u64,
    ) -> Result<()> {
        let compressed = payload.len() as u64;
        let offset = self.position;
        self.check_limits(path, offset, compressed, uncompressed)?;

        let header = format::local_header(
            path,
            method,
            0,
            mtime,
            crc,
            compressed,
            uncompressed,
            self.zip64,
        );
        self.emit(&header)?;
        self.emit(payload)?;
        self.record(path, method, mtime, crc, compressed, uncompressed, offset);
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    fn record(
        &mut self,
        path: &str,
        method: CompressionMethod,
        mtime: DosDateTime,
        crc: u32,
        compressed: u64,
        uncompressed: u64,
        offset: u64,
    ) {
        self.records.push(EntryInfo {
            path: path.to_string(),
            compressed_size: compressed,
            uncompressed_size: uncompressed,
            crc32: crc,
            method,
            mtime,
            flags: 0,
            is_dir: path.ends_with('/'),
            version_made_by: format::host_version_made_by(),
            external_attributes: format::host_external_attributes(),
            header_offset: offset,
        });
        self.stats.entries_written += 1;
        self.stats.bytes_written += uncompressed;
        self.stats.compressed_bytes += compressed;
    }

    fn check_limits(&self, path: &str, offset: u64, compressed: u64, uncompressed: u64) -> Result<()> {
        if !self.zip64 && (offset >= U32_MAX || compressed >= U32_MAX || uncompressed >= U32_MAX) {
            return Err(ZipError::TooLarge(format!(
                "'{path}' exceeds ZIP32 limits; enable use_zip64"
            )));
        }
        Ok(())
    }

    fn emit(&mut self, bytes: &[u8]) -> Result<()> {
        let inner = self.inner.as_mut().ok_or(ZipError::NotOpen)?;
        inner.write_all(bytes)?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    fn claim(&mut self, path: &str) -> bool {
        if self.seen.insert(path.to_string()) {
            true
        } else {
            self.diagnostics
                .warn(&format!("zip entry '{path}' already written; skipping duplicate"));
            false
        }
    }

    fn ensure_writable(&self) -> Result<()> {
        match &self.state {
            State::Open => Ok(()),
            State::Closed => Err(ZipError::NotOpen),
            State::Poisoned(reason) => Err(ZipError::Internal(reason.clone())),
        }
    }

    fn poison_on_err<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.poison(format!("write failed: {e}"));
        }
        result
    }

    fn poison(&mut self, reason: String) {
        if self.state == State::Open {
            self.state = State::Poisoned(reason);
        }
    }
}

impl<W: ArchiveSink> Drop for ZipWriter<W> {
    fn drop(&mut self) {
        if self.inner.is_none() {
            return;
        }
        match self.state.clone() {
            State::Open => {
                if let Err(e) = self.close() {
                    self.diagnostics
                        .warn(&format!("zip archive dropped without close; finalising failed: {e}"));
                }
            },
            State::Poisoned(reason) => {
                self.diagnostics
                    .warn(&format!("zip archive dropped in a failed state: {reason}"));
            },
            State::Closed => {},
        }
    }
}

/// An open streamed entry. Consumed by [`EntryWriter::close`].
///
/// Dropping it without closing leaves the archive unusable: every later call
/// on the [`ZipWriter`] fails.
pub struct EntryWriter<'a, W: ArchiveSink> {
    writer: &'a mut ZipWriter<W>,
    path: String,
    offset: u64,
    method: CompressionMethod,
    mtime: DosDateTime,
    encoder: Option<DeflateEncoder<Vec<u8>>>,
    checksum: Checksum,
    compressed: u64,
    finished: bool,
}

impl<W: ArchiveSink> EntryWriter<'_, W> {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Uncompressed bytes accepted so far.
    pub fn bytes_in(&self) -> u64 {
        self.checksum.len()
    }

    /// Append bytes to the entry.
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        let result = self.push(data);
        if let Err(e) = &result {
            self.writer.poison(format!("streaming '{}' failed: {e}", self.path));
        }
        result
    }

    /// Finalise the entry: flush the compressor and patch the local header.
    pub fn close(mut self) -> Result<()> {
        self.finished = true;
        let result = self.finish_entry();
        if let Err(e) = &result {
            self.writer.poison(format!("closing '{}' failed: {e}", self.path));
        }
        result
    }

    fn push(&mut self, data: &[u8]) -> Result<()> {
        self.checksum.update(data);
        match self.encoder.as_mut() {
            Some(encoder) => {
                encoder
                    .write_all(data)
                    .map_err(|e| ZipError::Internal(format!("deflate: {e}")))?;
                let pending = encoder.get_mut();
                if !pending.is_empty() {
                    self.writer.emit(pending)?;
                    self.compressed += pending.len() as u64;
                    pending.clear();
                }
            },
            None => {
                self.writer.emit(data)?;
                self.compressed += data.len() as u64;
            },
        }
        Ok(())
    }

    fn finish_entry(&mut self) -> Result<()> {
        if let Some(encoder) = self.encoder.take() {
            let tail = encoder
                .finish()
                .map_err(|e| ZipError::Internal(format!("deflate: {e}")))?;
            self.writer.emit(&tail)?;
            self.compressed += tail.len() as u64;
        }
        self.writer
            .check_limits(&self.path, self.offset, self.compressed, self.checksum.len())?;

        let (crc, uncompressed) = (self.checksum.crc(), self.checksum.len());
        let zip64 = self.writer.zip64;
        let end = self.writer.position;
        let inner = self.writer.inner.as_mut().ok_or(ZipError::NotOpen)?;

        let mut patch = Vec::with_capacity(12);
        format::put_u32(&mut patch, crc);
        if zip64 {
            format::put_u32(&mut patch, U32_MAX as u32);
            format::put_u32(&mut patch, U32_MAX as u32);
        } else {
            format::put_u32(&mut patch, self.compressed as u32);
            format::put_u32(&mut patch, uncompressed as u32);
        }
        inner.seek(SeekFrom::Start(self.offset + 14))?;
        inner.write_all(&patch)?;
        if zip64 {
            let mut sizes = Vec::with_capacity(16);
            format::put_u64(&mut sizes, uncompressed);
            format::put_u64(&mut sizes, self.compressed);
            inner.seek(SeekFrom::Start(
                self.offset + LOCAL_HEADER_LEN + self.path.len() as u64 + 4,
            ))?;
            inner.write_all(&sizes)?;
        }
        inner.seek(SeekFrom::Start(end))?;

        let (path, method, mtime, compressed, offset) =
            (self.path.clone(), self.method, self.mtime, self.compressed, self.offset);
        self.writer
            .record(&path, method, mtime, crc, compressed, uncompressed, offset);
        Ok(())
    }
}

impl<W: ArchiveSink> Write for EntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_chunk(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<W: ArchiveSink> Drop for EntryWriter<'_, W> {
    fn drop(&mut self) {
        if !self.finished {
            self.writer.poison(format!(
                "streamed entry '{}' was dropped without close_entry",
                self.path
            ));
        }
    }
}

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty()
        || path.starts_with('/')
        || path.contains('\\')
        || path.split('/').any(|seg| seg == "..")
        || path.len() > u16::MAX as usize
    {
        return Err(ZipError::InvalidParameter(format!(
            "'{path}' is not a valid archive path"
        )));
    }
    Ok(())
}
