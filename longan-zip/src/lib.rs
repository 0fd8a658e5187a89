//! ZIP reading and writing tuned for OOXML packages.
//!
//! The reader indexes the central directory once and extracts entries with
//! CRC verification, either whole or in fixed-size chunks. The writer emits
//! one entry per path (later duplicates are skipped with a warning), supports
//! streamed entries whose headers are patched on close, and can copy
//! compressed entries verbatim from another archive.
//!
//! ```rust,no_run
//! use longan_zip::{ZipReader, ZipWriter};
//!
//! let reader = ZipReader::open("book.xlsx")?;
//! let workbook = reader.extract_string("xl/workbook.xml")?;
//!
//! let mut writer = ZipWriter::create("copy.xlsx")?;
//! for path in reader.list_files()? {
//!     let raw = reader.raw_entry(path)?;
//!     writer.write_raw(path, &raw.data, &raw.info)?;
//! }
//! writer.close()?;
//! # let _ = workbook;
//! # Ok::<(), longan_zip::ZipError>(())
//! ```
#![forbid(unsafe_code)]

mod crc;
pub mod diag;
mod error;
mod format;
mod reader;
pub mod time;
mod writer;

pub use crc::{Checksum, crc32};
pub use diag::{Diagnostic, Diagnostics, Level, LogSink, MemorySink, SharedDiagnostics};
pub use error::{Result, ZipError, ZipErrorKind};
pub use format::{CompressionMethod, EntryInfo};
pub use reader::{CHUNK_SIZE, MAX_IN_MEMORY_ENTRY, RawEntry, ZipReader};
pub use time::DosDateTime;
pub use writer::{
    ArchiveSink, DEFAULT_COMPRESSION_LEVEL, EntryWriter, OpenMode, ZipStats, ZipWriter,
};
