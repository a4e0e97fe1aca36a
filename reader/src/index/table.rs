use super::IndexEntry;
use crate::Error;
use commonware_codec::{FixedSize, ReadExt, Write as _};
use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    ops::Range,
    path::Path,
};
use tracing::{debug, warn};

/// In-memory index of a log.
///
/// Entries are held as parallel columns so that [Index::time_to_index] can binary search
/// the timestamps directly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Index {
    offsets: Vec<u64>,
    sizes: Vec<u64>,
    timestamps: Vec<u64>,
}

impl Index {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry to the end of the index.
    pub fn push(&mut self, entry: IndexEntry) {
        self.offsets.push(entry.offset);
        self.sizes.push(entry.size);
        self.timestamps.push(entry.timestamp);
    }

    /// Decode an index from its on-disk representation.
    ///
    /// Fails with [Error::CorruptEntry] if an entry ends past `u64::MAX` or does not start
    /// after the previous entry.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        if bytes.len() % IndexEntry::SIZE != 0 {
            return Err(Error::CorruptIndex {
                len: bytes.len() as u64,
                width: IndexEntry::SIZE,
            });
        }

        let mut index = Self::with_capacity(bytes.len() / IndexEntry::SIZE);
        let mut buf = bytes;
        while !buf.is_empty() {
            let entry = IndexEntry::read(&mut buf)?;

            // Entries must end within the address space and start after their predecessor
            let previous = index.offsets.last().copied();
            if entry.offset.checked_add(entry.size).is_none()
                || previous.is_some_and(|previous| previous >= entry.offset)
            {
                return Err(Error::CorruptEntry {
                    position: index.len(),
                    offset: entry.offset,
                    size: entry.size,
                });
            }
            index.push(entry);
        }
        if let Some(position) = index.timestamps.windows(2).position(|w| w[0] > w[1]) {
            warn!(
                position,
                "index timestamps decrease, time lookups may be incorrect"
            );
        }
        Ok(index)
    }

    /// Load an index file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        let bytes = fs::read(path)?;
        let index = Self::decode(&bytes)?;
        debug!(path = %path.display(), entries = index.len(), "loaded index");
        Ok(index)
    }

    /// Write the on-disk representation of the index to `writer`.
    pub fn write_to(&self, mut writer: impl Write) -> Result<(), Error> {
        let mut buf = Vec::with_capacity(IndexEntry::SIZE);
        for entry in self.entries() {
            buf.clear();
            entry.write(&mut buf);
            writer.write_all(&buf)?;
        }
        writer.flush()?;
        Ok(())
    }

    /// Write the index to a new file at `path` (replacing any existing file).
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        self.write_to(&mut writer)?;
        writer.into_inner().map_err(|err| err.into_error())?.sync_all()?;
        Ok(())
    }

    /// Number of entries in the index.
    pub fn len(&self) -> u64 {
        self.offsets.len() as u64
    }

    /// Whether the index has no entries.
    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    /// Return the entry at position `index`.
    pub fn entry_at(&self, index: u64) -> Result<IndexEntry, Error> {
        self.check_range(index, index.saturating_add(1))?;
        Ok(self.entry(index as usize))
    }

    /// Iterate over all entries in log order.
    pub fn entries(&self) -> impl ExactSizeIterator<Item = IndexEntry> + '_ {
        (0..self.offsets.len()).map(|i| self.entry(i))
    }

    pub fn offsets(&self) -> &[u64] {
        &self.offsets
    }

    pub fn sizes(&self) -> &[u64] {
        &self.sizes
    }

    pub fn timestamps(&self) -> &[u64] {
        &self.timestamps
    }

    /// Return the position of the first entry with a timestamp at or after `timestamp`.
    ///
    /// If `timestamp` is after all entries, the length of the index is returned.
    pub fn time_to_index(&self, timestamp: u64) -> u64 {
        self.timestamps.partition_point(|t| *t < timestamp) as u64
    }

    /// Like [Index::time_to_index] but passes `None` through (for open-ended bounds).
    pub fn locate(&self, timestamp: Option<u64>) -> Option<u64> {
        timestamp.map(|t| self.time_to_index(t))
    }

    /// Return a new index containing the entries in `[start, stop)`.
    ///
    /// The returned entries still reference the same log.
    pub fn slice(&self, start: u64, stop: u64) -> Result<Self, Error> {
        self.check_range(start, stop)?;
        let range = start as usize..stop as usize;
        Ok(Self {
            offsets: self.offsets[range.clone()].to_vec(),
            sizes: self.sizes[range.clone()].to_vec(),
            timestamps: self.timestamps[range].to_vec(),
        })
    }

    /// Return the byte span of the log covered by the entries in `[start, stop)`.
    ///
    /// An empty range yields an empty span.
    pub fn span(&self, start: u64, stop: u64) -> Result<Range<u64>, Error> {
        self.check_range(start, stop)?;
        if start == stop {
            let at = self
                .offsets
                .get(start as usize)
                .copied()
                .or_else(|| self.entries().last().map(|e| e.end()))
                .unwrap_or(0);
            return Ok(at..at);
        }
        self.covering(start, stop - 1)
    }

    /// Whether each entry in `[start, stop)` begins exactly where the previous one ends.
    pub fn is_contiguous(&self, start: u64, stop: u64) -> bool {
        if self.check_range(start, stop).is_err() {
            return false;
        }
        let range = start as usize..stop as usize;
        self.offsets[range.clone()]
            .windows(2)
            .zip(&self.sizes[range])
            .all(|(offsets, size)| offsets[0].checked_add(*size) == Some(offsets[1]))
    }

    /// Return the byte span extracted for the interval `[start, stop)`.
    ///
    /// The span runs through the end of the entry at `stop` (the first entry at or after the
    /// end of the interval). When `stop` is the length of the index, the span ends with the
    /// last entry instead. When `start` is the length of the index, the span is empty.
    pub fn extract_span(&self, start: u64, stop: u64) -> Result<Range<u64>, Error> {
        self.check_range(start, stop)?;
        if start == self.len() {
            return self.span(start, stop);
        }
        self.covering(start, stop.min(self.len() - 1))
    }

    /// Return the bytes from the start of entry `first` to the end of entry `last`.
    fn covering(&self, first: u64, last: u64) -> Result<Range<u64>, Error> {
        let start = self.entry(first as usize).offset;
        let entry = self.entry(last as usize);
        let end = entry.end();
        if end < start {
            return Err(Error::CorruptEntry {
                position: last,
                offset: entry.offset,
                size: entry.size,
            });
        }
        Ok(start..end)
    }

    /// Ensure `[start, stop)` is a valid range of positions.
    pub(crate) fn check_range(&self, start: u64, stop: u64) -> Result<(), Error> {
        let len = self.len();
        if start > stop || stop > len {
            return Err(Error::OutOfRange { start, stop, len });
        }
        Ok(())
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            offsets: Vec::with_capacity(capacity),
            sizes: Vec::with_capacity(capacity),
            timestamps: Vec::with_capacity(capacity),
        }
    }

    fn entry(&self, index: usize) -> IndexEntry {
        IndexEntry::new(
            self.offsets[index],
            self.sizes[index],
            self.timestamps[index],
        )
    }
}

impl FromIterator<IndexEntry> for Index {
    fn from_iter<I: IntoIterator<Item = IndexEntry>>(iter: I) -> Self {
        let mut index = Self::new();
        for entry in iter {
            index.push(entry);
        }
        index
    }
}
