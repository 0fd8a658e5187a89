//! The shared string table.

use std::collections::HashMap;

/// Ordered shared strings with a lookup for de-duplication.
///
/// Strings loaded from the source keep their positions; new strings are
/// appended after them.
#[derive(Debug, Clone, Default)]
pub struct SharedStringTable {
    strings: Vec<String>,
    index: HashMap<String, u32>,
    /// Number of `<si>` entries in the source part.
    source_len: usize,
    /// Value of the `count` attribute (total references), kept up to date
    /// as new references are added.
    references: u64,
}

impl SharedStringTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from strings in source order. `references` is the source's
    /// `count` attribute when present.
    pub fn from_source(strings: Vec<String>, references: Option<u64>) -> Self {
        let mut index = HashMap::with_capacity(strings.len());
        for (i, s) in strings.iter().enumerate() {
            index.entry(s.clone()).or_insert(i as u32);
        }
        Self {
            source_len: strings.len(),
            references: references.unwrap_or(strings.len() as u64),
            strings,
            index,
        }
    }

    /// Index of `s`, appending it if it is new.
    pub fn add(&mut self, s: &str) -> u32 {
        self.references += 1;
        if let Some(&i) = self.index.get(s) {
            return i;
        }
        let i = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), i);
        i
    }

    pub fn get(&self, index: u32) -> Option<&str> {
        self.strings.get(index as usize).map(String::as_str)
    }

    pub fn position(&self, s: &str) -> Option<u32> {
        self.index.get(s).copied()
    }

    /// Number of entries (`uniqueCount`).
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Total references (`count`).
    pub fn references(&self) -> u64 {
        self.references.max(self.strings.len() as u64)
    }

    pub fn source_len(&self) -> usize {
        self.source_len
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.strings.iter().map(String::as_str)
    }

    /// Strings added since load or the last commit.
    pub fn new_strings(&self) -> &[String] {
        &self.strings[self.source_len..]
    }

    pub fn has_new_strings(&self) -> bool {
        self.strings.len() > self.source_len
    }

    /// Everything has been written; the table now matches its part.
    pub fn mark_persisted(&mut self) {
        self.source_len = self.strings.len();
    }

    /// Current length and reference count, for [`Self::rollback`].
    pub fn checkpoint(&self) -> StringsCheckpoint {
        StringsCheckpoint {
            len: self.strings.len(),
            references: self.references,
        }
    }

    /// Forget every string added after `checkpoint`.
    pub fn rollback(&mut self, checkpoint: StringsCheckpoint) {
        if checkpoint.len < self.strings.len() {
            for s in self.strings.drain(checkpoint.len..) {
                if self.index.get(&s).is_some_and(|&i| i as usize >= checkpoint.len) {
                    self.index.remove(&s);
                }
            }
        }
        self.source_len = self.source_len.min(checkpoint.len);
        self.references = checkpoint.references;
    }
}

/// A point [`SharedStringTable::rollback`] can return to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringsCheckpoint {
    len: usize,
    references: u64,
}
