//! On-disk record layouts: local headers, central directory, end records.

use crate::error::{Result, ZipError};
use crate::time::DosDateTime;
use std::io::{Read, Seek, SeekFrom};

pub(crate) const LOCAL_HEADER_SIG: u32 = 0x0403_4b50;
pub(crate) const CENTRAL_HEADER_SIG: u32 = 0x0201_4b50;
pub(crate) const EOCD_SIG: u32 = 0x0605_4b50;
pub(crate) const ZIP64_EOCD_SIG: u32 = 0x0606_4b50;
pub(crate) const ZIP64_LOCATOR_SIG: u32 = 0x0706_4b50;
pub(crate) const ZIP64_EXTRA_ID: u16 = 0x0001;

pub(crate) const LOCAL_HEADER_LEN: u64 = 30;
pub(crate) const CENTRAL_HEADER_LEN: usize = 46;
pub(crate) const EOCD_LEN: usize = 22;
pub(crate) const ZIP64_EOCD_LEN: usize = 56;
pub(crate) const ZIP64_LOCATOR_LEN: usize = 20;

pub(crate) const U16_MAX: u64 = 0xFFFF;
pub(crate) const U32_MAX: u64 = 0xFFFF_FFFF;

/// General purpose flag: entry is encrypted.
pub(crate) const FLAG_ENCRYPTED: u16 = 0x0001;
/// General purpose flag: file name is UTF-8.
pub(crate) const FLAG_UTF8: u16 = 0x0800;

/// Largest central directory accepted when opening.
const MAX_CENTRAL_DIRECTORY: u64 = 512 * 1024 * 1024;

/// ZIP specification version written by this crate (2.0).
pub(crate) const SPEC_VERSION: u16 = 20;
pub(crate) const SPEC_VERSION_ZIP64: u16 = 45;

#[cfg(windows)]
const HOST_SYSTEM: u16 = 10;
#[cfg(not(windows))]
const HOST_SYSTEM: u16 = 3;

/// `version_made_by` for entries created on this host.
pub(crate) const fn host_version_made_by() -> u16 {
    (HOST_SYSTEM << 8) | SPEC_VERSION
}

/// External attributes for a regular file created on this host.
pub(crate) const fn host_external_attributes() -> u32 {
    if HOST_SYSTEM == 3 { 0o100644 << 16 } else { 0 }
}

/// Compression method of an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    Stored,
    Deflated,
    Other(u16),
}

impl CompressionMethod {
    pub fn from_code(code: u16) -> Self {
        match code {
            0 => CompressionMethod::Stored,
            8 => CompressionMethod::Deflated,
            other => CompressionMethod::Other(other),
        }
    }

    pub fn code(self) -> u16 {
        match self {
            CompressionMethod::Stored => 0,
            CompressionMethod::Deflated => 8,
            CompressionMethod::Other(code) => code,
        }
    }
}

/// Metadata of one archive entry, as recorded in the central directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo {
    pub path: String,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    pub crc32: u32,
    pub method: CompressionMethod,
    pub mtime: DosDateTime,
    pub flags: u16,
    pub is_dir: bool,
    pub version_made_by: u16,
    pub external_attributes: u32,
    /// Offset of the local file header.
    pub header_offset: u64,
}

impl EntryInfo {
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    fn needs_zip64(&self) -> bool {
        self.compressed_size >= U32_MAX
            || self.uncompressed_size >= U32_MAX
            || self.header_offset >= U32_MAX
    }
}

/// Parsed central directory of an existing archive.
#[derive(Debug)]
pub(crate) struct CentralDirectory {
    pub entries: Vec<EntryInfo>,
    pub offset: u64,
}

pub(crate) fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

pub(crate) fn put_u64(out: &mut Vec<u8>, v: u64) {
    out.extend_from_slice(&v.to_le_bytes());
}

/// Little-endian cursor over a byte slice; every read is bounds checked.
struct Le<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Le<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&e| e <= self.data.len())
            .ok_or_else(|| ZipError::bad_format("record truncated"))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn u64(&mut self) -> Result<u64> {
        let b = self.bytes(8)?;
        let mut raw = [0u8; 8];
        raw.copy_from_slice(b);
        Ok(u64::from_le_bytes(raw))
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }
}

/// Build a local file header.
///
/// With `zip64` set, the 32-bit size fields hold the ZIP64 marker and the
/// sizes live in a ZIP64 extra field, which keeps the header length fixed
/// so sizes can be patched after a streamed write.
#[allow(clippy::too_many_arguments)]
pub(crate) fn local_header(
    path: &str,
    method: CompressionMethod,
    flags: u16,
    mtime: DosDateTime,
    crc: u32,
    compressed: u64,
    uncompressed: u64,
    zip64: bool,
) -> Vec<u8> {
    let name = path.as_bytes();
    let extra_len: u16 = if zip64 { 20 } else { 0 };
    let mut out = Vec::with_capacity(LOCAL_HEADER_LEN as usize + name.len() + extra_len as usize);
    put_u32(&mut out, LOCAL_HEADER_SIG);
    put_u16(&mut out, if zip64 { SPEC_VERSION_ZIP64 } else { SPEC_VERSION });
    put_u16(&mut out, flags);
    put_u16(&mut out, method.code());
    put_u16(&mut out, mtime.time);
    put_u16(&mut out, mtime.date);
    put_u32(&mut out, crc);
    if zip64 {
        put_u32(&mut out, U32_MAX as u32);
        put_u32(&mut out, U32_MAX as u32);
    } else {
        put_u32(&mut out, compressed as u32);
        put_u32(&mut out, uncompressed as u32);
    }
    put_u16(&mut out, name.len() as u16);
    put_u16(&mut out, extra_len);
    out.extend_from_slice(name);
    if zip64 {
        put_u16(&mut out, ZIP64_EXTRA_ID);
        put_u16(&mut out, 16);
        put_u64(&mut out, uncompressed);
        put_u64(&mut out, compressed);
    }
    out
}

/// Append a central directory header for `entry`.
pub(crate) fn write_central_header(out: &mut Vec<u8>, entry: &EntryInfo) {
    let name = entry.path.as_bytes();
    let mut extra = Vec::new();
    if entry.needs_zip64() {
        let mut body = Vec::with_capacity(24);
        if entry.uncompressed_size >= U32_MAX {
            put_u64(&mut body, entry.uncompressed_size);
        }
        if entry.compressed_size >= U32_MAX {
            put_u64(&mut body, entry.compressed_size);
        }
        if entry.header_offset >= U32_MAX {
            put_u64(&mut body, entry.header_offset);
        }
        put_u16(&mut extra, ZIP64_EXTRA_ID);
        put_u16(&mut extra, body.len() as u16);
        extra.extend_from_slice(&body);
    }
    let clamp = |v: u64| if v >= U32_MAX { U32_MAX as u32 } else { v as u32 };

    put_u32(out, CENTRAL_HEADER_SIG);
    put_u16(out, entry.version_made_by);
    put_u16(
        out,
        if extra.is_empty() { SPEC_VERSION } else { SPEC_VERSION_ZIP64 },
    );
    put_u16(out, entry.flags);
    put_u16(out, entry.method.code());
    put_u16(out, entry.mtime.time);
    put_u16(out, entry.mtime.date);
    put_u32(out, entry.crc32);
    put_u32(out, clamp(entry.compressed_size));
    put_u32(out, clamp(entry.uncompressed_size));
    put_u16(out, name.len() as u16);
    put_u16(out, extra.len() as u16);
    put_u16(out, 0); // comment length
    put_u16(out, 0); // disk number start
    put_u16(out, 0); // internal attributes
    put_u32(out, entry.external_attributes);
    put_u32(out, clamp(entry.header_offset));
    out.extend_from_slice(name);
    out.extend_from_slice(&extra);
}

/// Append the end-of-central-directory records.
pub(crate) fn write_end_records(
    out: &mut Vec<u8>,
    entry_count: u64,
    cd_offset: u64,
    cd_size: u64,
    zip64: bool,
) {
    if zip64 {
        let zip64_eocd_offset = cd_offset + cd_size;
        put_u32(out, ZIP64_EOCD_SIG);
        put_u64(out, (ZIP64_EOCD_LEN - 12) as u64);
        put_u16(out, host_version_made_by());
        put_u16(out, SPEC_VERSION_ZIP64);
        put_u32(out, 0);
        put_u32(out, 0);
        put_u64(out, entry_count);
        put_u64(out, entry_count);
        put_u64(out, cd_size);
        put_u64(out, cd_offset);

        put_u32(out, ZIP64_LOCATOR_SIG);
        put_u32(out, 0);
        put_u64(out, zip64_eocd_offset);
        put_u32(out, 1);
    }
    let count16 = if entry_count >= U16_MAX { U16_MAX as u16 } else { entry_count as u16 };
    let clamp = |v: u64| if v >= U32_MAX { U32_MAX as u32 } else { v as u32 };
    put_u32(out, EOCD_SIG);
    put_u16(out, 0);
    put_u16(out, 0);
    put_u16(out, count16);
    put_u16(out, count16);
    put_u32(out, clamp(cd_size));
    put_u32(out, clamp(cd_offset));
    put_u16(out, 0);
}

/// Locate and parse the central directory of an archive.
pub(crate) fn read_central_directory<R: Read + Seek>(reader: &mut R) -> Result<CentralDirectory> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    if file_len < EOCD_LEN as u64 {
        return Err(ZipError::bad_format("file too small to be a zip archive"));
    }

    let tail_len = file_len.min((EOCD_LEN + u16::MAX as usize) as u64);
    let tail_start = file_len - tail_len;
    reader.seek(SeekFrom::Start(tail_start))?;
    let mut tail = vec![0u8; tail_len as usize];
    reader.read_exact(&mut tail)?;

    let eocd_pos = find_eocd(&tail)
        .ok_or_else(|| ZipError::bad_format("end of central directory not found"))?;
    let mut eocd = Le::new(&tail[eocd_pos + 4..]);
    let _disk = eocd.u16()?;
    let _cd_disk = eocd.u16()?;
    let _entries_on_disk = eocd.u16()?;
    let mut total_entries = eocd.u16()? as u64;
    let mut cd_size = eocd.u32()? as u64;
    let mut cd_offset = eocd.u32()? as u64;

    let eocd_abs = tail_start + eocd_pos as u64;
    if eocd_abs >= ZIP64_LOCATOR_LEN as u64 {
        let locator_abs = eocd_abs - ZIP64_LOCATOR_LEN as u64;
        let mut locator = [0u8; ZIP64_LOCATOR_LEN];
        reader.seek(SeekFrom::Start(locator_abs))?;
        reader.read_exact(&mut locator)?;
        let mut loc = Le::new(&locator);
        if loc.u32()? == ZIP64_LOCATOR_SIG {
            let _disk = loc.u32()?;
            let zip64_eocd_abs = loc.u64()?;
            let mut record = [0u8; ZIP64_EOCD_LEN];
            reader.seek(SeekFrom::Start(zip64_eocd_abs))?;
            reader.read_exact(&mut record)?;
            let mut z = Le::new(&record);
            if z.u32()? != ZIP64_EOCD_SIG {
                return Err(ZipError::bad_format("zip64 end record signature mismatch"));
            }
            let _size = z.u64()?;
            let _made_by = z.u16()?;
            let _needed = z.u16()?;
            let _disk = z.u32()?;
            let _cd_disk = z.u32()?;
            let _entries_on_disk = z.u64()?;
            total_entries = z.u64()?;
            cd_size = z.u64()?;
            cd_offset = z.u64()?;
        }
    }

    if cd_size > MAX_CENTRAL_DIRECTORY {
        return Err(ZipError::TooLarge(format!(
            "central directory of {cd_size} bytes"
        )));
    }
    if cd_offset.checked_add(cd_size).is_none_or(|end| end > eocd_abs) {
        return Err(ZipError::bad_format("central directory lies outside the file"));
    }

    reader.seek(SeekFrom::Start(cd_offset))?;
    let mut cd = vec![0u8; cd_size as usize];
    reader.read_exact(&mut cd)?;

    let mut entries = Vec::with_capacity(total_entries.min(65_536) as usize);
    let mut le = Le::new(&cd);
    while le.remaining() >= CENTRAL_HEADER_LEN {
        if entries.len() as u64 == total_entries && total_entries != U16_MAX {
            break;
        }
        entries.push(parse_central_header(&mut le)?);
    }
    if (entries.len() as u64) < total_entries && total_entries != U16_MAX {
        return Err(ZipError::bad_format(format!(
            "central directory lists {total_entries} entries but holds {}",
            entries.len()
        )));
    }

    Ok(CentralDirectory {
        entries,
        offset: cd_offset,
    })
}

fn find_eocd(tail: &[u8]) -> Option<usize> {
    let sig = EOCD_SIG.to_le_bytes();
    let last = tail.len().checked_sub(EOCD_LEN)?;
    (0..=last).rev().find(|&pos| {
        if tail[pos..pos + 4] != sig {
            return false;
        }
        let comment_len = u16::from_le_bytes([tail[pos + 20], tail[pos + 21]]) as usize;
        pos + EOCD_LEN + comment_len <= tail.len()
    })
}

fn parse_central_header(le: &mut Le<'_>) -> Result<EntryInfo> {
    if le.u32()? != CENTRAL_HEADER_SIG {
        return Err(ZipError::bad_format("central directory header signature mismatch"));
    }
    let version_made_by = le.u16()?;
    let _version_needed = le.u16()?;
    let flags = le.u16()?;
    let method = CompressionMethod::from_code(le.u16()?);
    let time = le.u16()?;
    let date = le.u16()?;
    let crc32 = le.u32()?;
    let mut compressed_size = le.u32()? as u64;
    let mut uncompressed_size = le.u32()? as u64;
    let name_len = le.u16()? as usize;
    let extra_len = le.u16()? as usize;
    let comment_len = le.u16()? as usize;
    let _disk = le.u16()?;
    let _internal = le.u16()?;
    let external_attributes = le.u32()?;
    let mut header_offset = le.u32()? as u64;
    let raw_name = le.bytes(name_len)?;
    let extra = le.bytes(extra_len)?;
    le.bytes(comment_len)?;

    let mut fields = Le::new(extra);
    while fields.remaining() >= 4 {
        let id = fields.u16()?;
        let size = fields.u16()? as usize;
        let body = fields.bytes(size)?;
        if id != ZIP64_EXTRA_ID {
            continue;
        }
        let mut z = Le::new(body);
        if uncompressed_size == U32_MAX {
            uncompressed_size = z.u64()?;
        }
        if compressed_size == U32_MAX {
            compressed_size = z.u64()?;
        }
        if header_offset == U32_MAX {
            header_offset = z.u64()?;
        }
    }

    let path = decode_name(raw_name, flags);
    Ok(EntryInfo {
        is_dir: path.ends_with('/'),
        path,
        compressed_size,
        uncompressed_size,
        crc32,
        method,
        mtime: DosDateTime { date, time },
        flags,
        version_made_by,
        external_attributes,
        header_offset,
    })
}

/// Offset of an entry's data, read from its local header.
pub(crate) fn data_offset<R: Read + Seek>(reader: &mut R, entry: &EntryInfo) -> Result<u64> {
    let mut header = [0u8; LOCAL_HEADER_LEN as usize];
    reader.seek(SeekFrom::Start(entry.header_offset))?;
    reader.read_exact(&mut header)?;
    let mut le = Le::new(&header);
    if le.u32()? != LOCAL_HEADER_SIG {
        return Err(ZipError::bad_format(format!(
            "local header signature mismatch for '{}'",
            entry.path
        )));
    }
    le.bytes(22)?;
    let name_len = le.u16()? as u64;
    let extra_len = le.u16()? as u64;
    Ok(entry.header_offset + LOCAL_HEADER_LEN + name_len + extra_len)
}

fn decode_name(raw: &[u8], flags: u16) -> String {
    if flags & FLAG_UTF8 != 0 || raw.is_ascii() {
        return String::from_utf8_lossy(raw).into_owned();
    }
    match std::str::from_utf8(raw) {
        Ok(s) => s.to_string(),
        Err(_) => raw
            .iter()
            .map(|&b| {
                if b < 0x80 {
                    b as char
                } else {
                    CP437_HIGH[(b - 0x80) as usize]
                }
            })
            .collect(),
    }
}

const CP437_HIGH: [char; 128] = [
    'Ç', 'ü', 'é', 'â', 'ä', 'à', 'å', 'ç', 'ê', 'ë', 'è', 'ï', 'î', 'ì', 'Ä', 'Å', 'É', 'æ', 'Æ',
    'ô', 'ö', 'ò', 'û', 'ù', 'ÿ', 'Ö', 'Ü', '¢', '£', '¥', '₧', 'ƒ', 'á', 'í', 'ó', 'ú', 'ñ', 'Ñ',
    'ª', 'º', '¿', '⌐', '¬', '½', '¼', '¡', '«', '»', '░', '▒', '▓', '│', '┤', '╡', '╢', '╖', '╕',
    '╣', '║', '╗', '╝', '╜', '╛', '┐', '└', '┴', '┬', '├', '─', '┼', '╞', '╟', '╚', '╔', '╩', '╦',
    '╠', '═', '╬', '╧', '╨', '╤', '╥', '╙', '╘', '╒', '╓', '╫', '╪', '┘', '┌', '█', '▄', '▌', '▐',
    '▀', 'α', 'ß', 'Γ', 'π', 'Σ', 'σ', 'µ', 'τ', 'Φ', 'Θ', 'Ω', 'δ', '∞', 'φ', 'ε', '∩', '≡', '±',
    '≥', '≤', '⌠', '⌡', '÷', '≈', '°', '∙', '·', '√', 'ⁿ', '²', '■', '\u{a0}',
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn sample_entry(path: &str, offset: u64) -> EntryInfo {
        EntryInfo {
            path: path.to_string(),
            compressed_size: 5,
            uncompressed_size: 5,
            crc32: 0x1234_5678,
            method: CompressionMethod::Stored,
            mtime: DosDateTime::EPOCH,
            flags: 0,
            is_dir: false,
            version_made_by: host_version_made_by(),
            external_attributes: host_external_attributes(),
            header_offset: offset,
        }
    }

    #[test]
    fn test_central_directory_round_trip() {
        let entry = sample_entry("xl/workbook.xml", 0);
        let mut archive = local_header(
            &entry.path,
            entry.method,
            0,
            entry.mtime,
            entry.crc32,
            5,
            5,
            false,
        );
        archive.extend_from_slice(b"hello");
        let cd_offset = archive.len() as u64;
        let mut cd = Vec::new();
        write_central_header(&mut cd, &entry);
        let cd_size = cd.len() as u64;
        archive.extend_from_slice(&cd);
        write_end_records(&mut archive, 1, cd_offset, cd_size, false);

        let parsed = read_central_directory(&mut Cursor::new(&archive)).unwrap();
        assert_eq!(parsed.offset, cd_offset);
        assert_eq!(parsed.entries, vec![entry.clone()]);

        let data_at = data_offset(&mut Cursor::new(&archive), &entry).unwrap();
        assert_eq!(&archive[data_at as usize..data_at as usize + 5], b"hello");
    }

    #[test]
    fn test_zip64_end_records_are_found() {
        let entry = sample_entry("a.xml", 0);
        let mut archive = local_header("a.xml", entry.method, 0, entry.mtime, entry.crc32, 5, 5, true);
        archive.extend_from_slice(b"hello");
        let cd_offset = archive.len() as u64;
        let mut cd = Vec::new();
        write_central_header(&mut cd, &entry);
        let cd_size = cd.len() as u64;
        archive.extend_from_slice(&cd);
        write_end_records(&mut archive, 1, cd_offset, cd_size, true);

        let parsed = read_central_directory(&mut Cursor::new(&archive)).unwrap();
        assert_eq!(parsed.entries.len(), 1);
        assert_eq!(parsed.entries[0].path, "a.xml");
    }

    #[test]
    fn test_rejects_garbage() {
        let err = read_central_directory(&mut Cursor::new(vec![0u8; 64])).unwrap_err();
        assert!(matches!(err, ZipError::BadFormat(_)));
    }

    #[test]
    fn test_cp437_names() {
        assert_eq!(decode_name(&[b'a', 0x81], 0), "aü");
        assert_eq!(decode_name("表.xml".as_bytes(), FLAG_UTF8), "表.xml");
    }
}
