//! Read-only access to an existing archive.
//!
//! The central directory is parsed once on [`ZipReader::open`] and kept as an
//! immutable cache; every lookup afterwards is a hash probe. The file handle
//! sits behind one exclusive lock so a reader can be shared, but calls on the
//! same instance are serialised.

use crate::crc::Checksum;
use crate::diag::{SharedDiagnostics, default_sink};
use crate::error::{Result, ZipError};
use crate::format::{self, CompressionMethod, EntryInfo};
use flate2::read::DeflateDecoder;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Chunk size used by [`ZipReader::extract_to_sink`] and [`ZipReader::stream`].
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Largest entry that [`ZipReader::extract`] and [`ZipReader::raw_entry`]
/// will materialise in memory.
pub const MAX_IN_MEMORY_ENTRY: u64 = 2 * 1024 * 1024 * 1024;

/// Compressed bytes of one entry plus its metadata.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub info: EntryInfo,
    pub data: Vec<u8>,
}

pub struct ZipReader {
    path: PathBuf,
    file: Mutex<Option<File>>,
    /// Central directory order, duplicates included.
    entries: Vec<EntryInfo>,
    /// Path to the index of the last entry with that path.
    index: HashMap<String, usize>,
    /// Unique paths in first-appearance order.
    names: Vec<String>,
    diagnostics: SharedDiagnostics,
}

impl ZipReader {
    /// Open an archive, reporting through the `log` facade.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, default_sink())
    }

    /// Open an archive with an injected diagnostics sink.
    pub fn open_with(path: impl AsRef<Path>, diagnostics: SharedDiagnostics) -> Result<Self> {
        let path = path.as_ref();
        let mut file = File::open(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ZipError::FileNotFound(path.display().to_string()),
            _ => ZipError::Io(e),
        })?;
        let cd = format::read_central_directory(&mut file)?;

        let mut index = HashMap::with_capacity(cd.entries.len());
        let mut names = Vec::with_capacity(cd.entries.len());
        for (i, entry) in cd.entries.iter().enumerate() {
            if index.insert(entry.path.clone(), i).is_some() {
                diagnostics.warn(&format!(
                    "archive '{}' holds duplicate entry '{}'; the last one wins",
                    path.display(),
                    entry.path
                ));
            } else {
                names.push(entry.path.clone());
            }
        }

        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(Some(file)),
            entries: cd.entries,
            index,
            names,
            diagnostics,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_open(&self) -> bool {
        self.file.lock().is_some()
    }

    /// Release the file handle. Later calls fail with [`ZipError::NotOpen`].
    pub fn close(&self) {
        self.file.lock().take();
    }

    pub fn diagnostics(&self) -> &SharedDiagnostics {
        &self.diagnostics
    }

    /// Unique entry paths in archive order.
    pub fn list_files(&self) -> Result<&[String]> {
        self.ensure_open()?;
        Ok(&self.names)
    }

    /// Every central directory record, duplicates included.
    pub fn entries(&self) -> &[EntryInfo] {
        &self.entries
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(normalize(path))
    }

    /// `Ok` when the entry exists, [`ZipError::FileNotFound`] otherwise.
    pub fn file_exists(&self, path: &str) -> Result<()> {
        self.entry_info(path).map(|_| ())
    }

    pub fn entry_info(&self, path: &str) -> Result<&EntryInfo> {
        self.ensure_open()?;
        let path = normalize(path);
        self.index
            .get(path)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| ZipError::FileNotFound(path.to_string()))
    }

    /// Decompress an entry into memory.
    pub fn extract(&self, path: &str) -> Result<Vec<u8>> {
        let info = self.entry_info(path)?;
        if info.uncompressed_size > MAX_IN_MEMORY_ENTRY {
            return Err(ZipError::TooLarge(format!(
                "'{}' expands to {} bytes",
                info.path, info.uncompressed_size
            )));
        }
        let mut out = Vec::with_capacity(info.uncompressed_size.min(64 * 1024 * 1024) as usize);
        self.pump(info, |chunk| {
            out.extend_from_slice(chunk);
            Ok(true)
        })?;
        Ok(out)
    }

    /// Decompress an entry and validate it as UTF-8.
    pub fn extract_string(&self, path: &str) -> Result<String> {
        let bytes = self.extract(path)?;
        String::from_utf8(bytes)
            .map_err(|_| ZipError::bad_format(format!("'{}' is not valid UTF-8", normalize(path))))
    }

    /// Stream an entry into `sink` through a fixed 8 KiB buffer.
    pub fn extract_to_sink<W: Write + ?Sized>(&self, path: &str, sink: &mut W) -> Result<u64> {
        let info = self.entry_info(path)?;
        self.pump(info, |chunk| {
            sink.write_all(chunk)?;
            Ok(true)
        })
    }

    /// Deliver decompressed chunks to `callback` until it returns `false` or
    /// the entry ends. Stopping early is not an error.
    pub fn stream<F>(&self, path: &str, mut callback: F) -> Result<u64>
    where
        F: FnMut(&[u8]) -> bool,
    {
        let info = self.entry_info(path)?;
        self.pump(info, |chunk| Ok(callback(chunk)))
    }

    /// Compressed bytes and metadata, for copying an entry without
    /// recompressing it.
    pub fn raw_entry(&self, path: &str) -> Result<RawEntry> {
        let info = self.entry_info(path)?;
        if info.compressed_size > MAX_IN_MEMORY_ENTRY {
            return Err(ZipError::TooLarge(format!(
                "'{}' holds {} compressed bytes",
                info.path, info.compressed_size
            )));
        }
        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(ZipError::NotOpen)?;
        let start = format::data_offset(file, info)?;
        file.seek(SeekFrom::Start(start))?;
        let mut data = vec![0u8; info.compressed_size as usize];
        file.read_exact(&mut data)?;
        Ok(RawEntry {
            info: info.clone(),
            data,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.file.lock().is_some() {
            Ok(())
        } else {
            Err(ZipError::NotOpen)
        }
    }

    /// Decompress `info` chunk by chunk, holding the file lock throughout.
    fn pump<F>(&self, info: &EntryInfo, mut deliver: F) -> Result<u64>
    where
        F: FnMut(&[u8]) -> Result<bool>,
    {
        if info.is_encrypted() {
            return Err(ZipError::bad_format(format!(
                "'{}' is encrypted",
                info.path
            )));
        }
        if info.is_dir {
            return Ok(0);
        }

        let mut guard = self.file.lock();
        let file = guard.as_mut().ok_or(ZipError::NotOpen)?;
        let start = format::data_offset(file, info)?;
        file.seek(SeekFrom::Start(start))?;
        let compressed = Read::take(&mut *file, info.compressed_size);

        match info.method {
            CompressionMethod::Stored => drain(compressed, info, &mut deliver),
            CompressionMethod::Deflated => drain(DeflateDecoder::new(compressed), info, &mut deliver),
            CompressionMethod::Other(code) => Err(ZipError::bad_format(format!(
                "'{}' uses unsupported compression method {code}",
                info.path
            ))),
        }
    }
}

fn drain<R, F>(mut source: R, info: &EntryInfo, deliver: &mut F) -> Result<u64>
where
    R: Read,
    F: FnMut(&[u8]) -> Result<bool>,
{
    let mut buf = [0u8; CHUNK_SIZE];
    let mut sum = Checksum::new();
    loop {
        let n = source.read(&mut buf)?;
        if n == 0 {
            break;
        }
        sum.update(&buf[..n]);
        if !deliver(&buf[..n])? {
            return Ok(sum.len());
        }
    }

    let total = sum.len();

    if total != info.uncompressed_size {
        return Err(ZipError::bad_format(format!(
            "'{}' expanded to {total} bytes, expected {}",
            info.path, info.uncompressed_size
        )));
    }
    if sum.crc() != info.crc32 {
        return Err(ZipError::bad_format(format!(
            "CRC mismatch in '{}'",
            info.path
        )));
    }
    Ok(total)
}

fn normalize(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

impl std::fmt::Debug for ZipReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipReader")
            .field("path", &self.path)
            .field("entries", &self.entries.len())
            .field("open", &self.is_open())
            .finish()
    }
}
