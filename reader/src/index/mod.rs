//! Side-table enabling random access into a log without scanning it.
//!
//! # Format
//!
//! An index file is a flat sequence of [IndexEntry] values, one per indexed record and in log
//! order. Each entry is 24 bytes: the big-endian `u64` byte offset of the record, the `u64`
//! size of the record (header included), and the `u64` timestamp of the record in
//! microseconds. There is no header or trailer, so the number of entries in an index file is
//! its length divided by [IndexEntry::SIZE].
//!
//! Because records are indexed in the order they appear in the log (which is the order they
//! were written), timestamps are non-decreasing. This lets [Index::time_to_index] map a
//! wall-clock time to a position with a binary search.
//!
//! # Building
//!
//! [build] makes one linear pass over a log, parsing only record headers, and writes each
//! entry as soon as it is produced (so an interrupted build leaves a valid prefix behind).
//! [build_file] is the file-backed variant used when a log is opened without an index.

mod builder;
mod table;

pub use builder::{build, build_file};
pub use table::Index;

use bytes::{Buf, BufMut};
use commonware_codec::{FixedSize, Read, ReadExt, Write};

/// Extension of index files.
pub const EXTENSION: &str = "idx";

/// Location and time of a single record in a log.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IndexEntry {
    /// Byte offset of the start of the record header.
    pub offset: u64,
    /// Size of the whole record (header, channel, and payload).
    pub size: u64,
    /// Timestamp of the record (in microseconds).
    pub timestamp: u64,
}

impl IndexEntry {
    pub fn new(offset: u64, size: u64, timestamp: u64) -> Self {
        Self {
            offset,
            size,
            timestamp,
        }
    }

    /// Offset of the first byte after the record.
    ///
    /// Saturates at `u64::MAX` (no log can be that long, so reads of such an entry fail).
    pub fn end(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

impl FixedSize for IndexEntry {
    const SIZE: usize = u64::SIZE * 3;
}

impl Write for IndexEntry {
    fn write(&self, buf: &mut impl BufMut) {
        self.offset.write(buf);
        self.size.write(buf);
        self.timestamp.write(buf);
    }
}

impl Read for IndexEntry {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, commonware_codec::Error> {
        let offset = u64::read(buf)?;
        let size = u64::read(buf)?;
        let timestamp = u64::read(buf)?;
        Ok(Self {
            offset,
            size,
            timestamp,
        })
    }
}

/// Convert a time in seconds to microseconds (rounded to the nearest microsecond).
///
/// Negative and NaN inputs map to `0`.
pub fn micros(seconds: f64) -> u64 {
    if seconds.is_nan() || seconds <= 0.0 {
        return 0;
    }
    (seconds * 1_000_000.0).round() as u64
}
