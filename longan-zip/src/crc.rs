/// CRC32 (IEEE) of a byte slice.
#[inline]
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}

/// Running CRC32 and byte count of an entry's uncompressed data, fed one
/// chunk at a time.
#[derive(Clone, Default)]
pub struct Checksum {
    hasher: crc32fast::Hasher,
    len: u64,
}

impl Checksum {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn update(&mut self, chunk: &[u8]) {
        self.hasher.update(chunk);
        self.len += chunk.len() as u64;
    }

    pub fn crc(&self) -> u32 {
        self.hasher.clone().finalize()
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
