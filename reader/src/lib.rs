//! Index and randomly access append-only LMP log files.
//!
//! An LMP log is a sequence of self-framed records (see [record]), each carrying a channel
//! name, a timestamp (in microseconds), and an opaque payload. Logs are only ever appended to,
//! so the order of records in the file is also the order of their timestamps.
//!
//! This crate makes such a log addressable as an ordered, randomly accessible, and
//! time-queryable sequence without rescanning it:
//!
//! - [index] builds (once) and loads a compact side-table of `(offset, size, timestamp)`
//!   entries and maps wall-clock times to positions with a binary search.
//! - [reader] resolves positions (or times) to records with positional reads and decodes
//!   their payloads with a caller-supplied [Decoder].
//! - [transform] layers per-entry and per-sequence transforms over a [Reader].
//! - [split] derives sub-indices (or extracts sub-logs) for intervals of time.
//!
//! # Concurrency
//!
//! All reads are positional (each read names its own offset and length), so any number of
//! threads may share a single [Reader] without coordinating on a file cursor. Building an
//! index is a one-time, single-threaded pass that must not overlap with other access to the
//! same log or index file.
//!
//! # Example
//!
//! ```no_run
//! use lmp_reader::{micros, Config, Entries, Raw, Reader};
//!
//! let reader = Reader::open("drive.lmp", Config::default(), Raw).unwrap();
//! println!("entries: {}", reader.len());
//! let first = reader.get(0).unwrap();
//! let window = reader
//!     .get_range_by_time(Some(micros(1.0)), Some(micros(2.0)))
//!     .unwrap();
//! # let _ = (first, window);
//! ```

use std::path::PathBuf;
use thiserror::Error;

pub mod blob;
pub mod index;
pub mod reader;
pub mod record;
pub mod split;
pub mod transform;

pub use blob::Blob;
pub use index::{micros, Index, IndexEntry};
pub use reader::{Config, DecodeError, Decoder, Entries, Raw, Reader};
pub use split::{split, Copier, FileCopier, Mode, Split};
pub use transform::Transformed;

/// Errors that can occur when indexing or reading a log.
#[derive(Debug, Error)]
pub enum Error {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] commonware_codec::Error),
    #[error("corrupt header: {0}")]
    CorruptHeader(String),
    #[error("truncated record: expected {expected} bytes, found {found}")]
    TruncatedRecord { expected: u64, found: u64 },
    #[error("short read at offset {offset}: expected {expected} bytes")]
    ShortRead { offset: u64, expected: u64 },
    #[error("channel mismatch: expected {expected}, found {found}")]
    ChannelMismatch { expected: String, found: String },
    #[error("corrupt index: length {len} is not a multiple of {width}")]
    CorruptIndex { len: u64, width: usize },
    #[error("corrupt index entry {position}: offset={offset} size={size}")]
    CorruptEntry { position: u64, offset: u64, size: u64 },
    #[error("out of range: {start}..{stop} (len={len})")]
    OutOfRange { start: u64, stop: u64, len: u64 },
    #[error("unsupported stride: {0}")]
    UnsupportedStride(u64),
    #[error("decode failed: {0}")]
    Decode(DecodeError),
    #[error("invalid destination: {0}")]
    InvalidDestination(PathBuf),
    #[error("invalid extension: {0}")]
    InvalidExtension(PathBuf),
    #[error("missing index: {0}")]
    MissingIndex(PathBuf),
}

#[cfg(test)]
pub(crate) mod mocks;
