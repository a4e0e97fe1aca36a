//! Random access to the records of a log.
//!
//! A [Reader] pairs a positionally readable [Blob] (usually the log file) with the [Index] of
//! that log. Every access resolves a position to an `(offset, size)` pair, reads exactly those
//! bytes, parses the framing, and hands the payload to the [Decoder] supplied at construction.
//!
//! Reads never touch a shared cursor, so a [Reader] can be shared freely across threads.

use crate::{
    blob::Blob,
    index::{self, Index, IndexEntry},
    record::{parse_record, Frame},
    Error,
};
use bytes::Bytes;
use prometheus_client::{
    metrics::{counter::Counter, gauge::Gauge},
    registry::Registry,
};
use std::{
    fs::File,
    ops::Range,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

/// Extension of log files.
pub const EXTENSION: &str = "lmp";

/// Largest log that fits on a FAT32 volume. Larger logs are accepted but flagged.
pub const MAX_LOG_SIZE: u64 = u32::MAX as u64;

/// Channel read when none is configured.
pub const DEFAULT_CHANNEL: &str = "harvest";

/// Default upper bound on the number of bytes fetched by a single bulk range read.
pub const DEFAULT_BULK_READ_LIMIT: u64 = 1024 * 1024;

/// Failure reported by a [Decoder].
pub type DecodeError = Box<dyn std::error::Error + Send + Sync>;

/// Converts the payload of a record into a value.
pub trait Decoder: Send + Sync {
    /// Value produced from a payload.
    type Item;

    /// Decode a record payload.
    fn decode(&self, payload: Bytes) -> Result<Self::Item, DecodeError>;
}

impl<F, T, E> Decoder for F
where
    F: Fn(Bytes) -> Result<T, E> + Send + Sync,
    E: Into<DecodeError>,
{
    type Item = T;

    fn decode(&self, payload: Bytes) -> Result<T, DecodeError> {
        self(payload).map_err(Into::into)
    }
}

/// [Decoder] that returns payloads unchanged.
#[derive(Clone, Copy, Debug, Default)]
pub struct Raw;

impl Decoder for Raw {
    type Item = Bytes;

    fn decode(&self, payload: Bytes) -> Result<Bytes, DecodeError> {
        Ok(payload)
    }
}

/// Configuration for a [Reader].
#[derive(Clone, Debug)]
pub struct Config {
    /// Channel every read record must belong to.
    pub channel: String,

    /// Index file to load. When `None`, the index is expected next to the log (with the
    /// extension replaced by [index::EXTENSION]) and is built there if missing.
    pub index: Option<PathBuf>,

    /// When building a missing index, only index records on [Config::channel].
    pub index_channel_only: bool,

    /// Largest span (in bytes) fetched with a single read by [Entries::get_range].
    pub bulk_read_limit: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel: DEFAULT_CHANNEL.to_string(),
            index: None,
            index_channel_only: false,
            bulk_read_limit: DEFAULT_BULK_READ_LIMIT,
        }
    }
}

/// Read access shared by a [Reader] and the layers built on top of it.
pub trait Entries {
    /// Value produced for each entry.
    type Item;

    /// Index of the underlying log.
    fn index(&self) -> &Index;

    /// Return the entry at position `index`.
    fn get(&self, index: u64) -> Result<Self::Item, Error>;

    /// Return the entries at positions `[start, stop)`, in order.
    fn get_range(&self, start: u64, stop: u64) -> Result<Vec<Self::Item>, Error>;

    /// Number of entries.
    fn len(&self) -> u64 {
        self.index().len()
    }

    /// Whether there are no entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Like [Entries::get_range] but with an explicit step between positions.
    ///
    /// Only a step of `1` is supported.
    fn get_range_stepped(
        &self,
        start: u64,
        stop: u64,
        step: u64,
    ) -> Result<Vec<Self::Item>, Error> {
        if step != 1 {
            return Err(Error::UnsupportedStride(step));
        }
        self.get_range(start, stop)
    }

    /// Return the first entry with a timestamp at or after `timestamp` (in microseconds).
    fn get_by_time(&self, timestamp: u64) -> Result<Self::Item, Error> {
        self.get(self.index().time_to_index(timestamp))
    }

    /// Return the entries with timestamps in `[start, end)` (in microseconds).
    ///
    /// A `None` bound is open (the first or last entry, respectively).
    fn get_range_by_time(
        &self,
        start: Option<u64>,
        end: Option<u64>,
    ) -> Result<Vec<Self::Item>, Error> {
        let index = self.index();
        let start = index.locate(start).unwrap_or(0);
        let stop = index.locate(end).unwrap_or(index.len());
        self.get_range(start, stop)
    }

    /// Iterate over all entries in log order.
    ///
    /// Each call starts a new traversal and each element is read when it is requested, so
    /// stopping early leaves nothing to clean up.
    fn iter(&self) -> impl Iterator<Item = Result<Self::Item, Error>> + '_ {
        (0..self.len()).map(move |i| self.get(i))
    }
}

/// Random access reader over the records of a single channel of a log.
pub struct Reader<D: Decoder, B: Blob = File> {
    blob: B,
    size: u64,
    index: Index,
    channel: String,
    bulk_read_limit: u64,
    decoder: D,

    reads: Counter,
    read_bytes: Counter,
    decode_failures: Counter,
    entries: Gauge,
}

impl<D: Decoder> Reader<D, File> {
    /// Open the log at `path`, loading (or building) its index.
    pub fn open(path: impl AsRef<Path>, config: Config, decoder: D) -> Result<Self, Error> {
        let path = path.as_ref();
        if !has_extension(path, EXTENSION) {
            return Err(Error::InvalidExtension(path.into()));
        }
        let blob = File::open(path)?;

        let index = match &config.index {
            Some(index_path) => {
                if !has_extension(index_path, index::EXTENSION) {
                    return Err(Error::InvalidExtension(index_path.clone()));
                }
                if !index_path.is_file() {
                    return Err(Error::MissingIndex(index_path.clone()));
                }
                Index::load(index_path)?
            }
            None => {
                let index_path = path.with_extension(index::EXTENSION);
                if index_path.is_file() {
                    Index::load(&index_path)?
                } else {
                    info!(index = %index_path.display(), "generating index");
                    let channel = config
                        .index_channel_only
                        .then_some(config.channel.as_str());
                    index::build_file(path, &index_path, channel)?
                }
            }
        };

        let reader = Self::init(blob, index, config, decoder)?;
        debug!(
            log = %path.display(),
            size = reader.size,
            entries = reader.len(),
            "opened log"
        );
        Ok(reader)
    }
}

impl<D: Decoder, B: Blob> Reader<D, B> {
    /// Create a reader over an already open `blob` described by `index`.
    pub fn init(blob: B, index: Index, config: Config, decoder: D) -> Result<Self, Error> {
        let size = blob.len()?;
        if size > MAX_LOG_SIZE {
            warn!(size, max = MAX_LOG_SIZE, "log is too big");
        }

        let entries = Gauge::default();
        entries.set(index.len() as i64);
        Ok(Self {
            blob,
            size,
            index,
            channel: config.channel,
            bulk_read_limit: config.bulk_read_limit,
            decoder,
            reads: Counter::default(),
            read_bytes: Counter::default(),
            decode_failures: Counter::default(),
            entries,
        })
    }

    /// Register the metrics of this reader with `registry`.
    pub fn register(&self, registry: &mut Registry) {
        registry.register("reads", "Number of positional reads", self.reads.clone());
        registry.register(
            "read_bytes",
            "Number of bytes read from the log",
            self.read_bytes.clone(),
        );
        registry.register(
            "decode_failures",
            "Number of payloads the decoder rejected",
            self.decode_failures.clone(),
        );
        registry.register("entries", "Number of indexed entries", self.entries.clone());
    }

    /// Size of the log (in bytes).
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Channel this reader accepts.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Read and parse the record at position `index` without decoding its payload.
    pub fn raw(&self, index: u64) -> Result<Frame, Error> {
        let entry = self.index.entry_at(index)?;
        let raw = self.read(entry.offset, entry.size)?;
        parse_record(&raw, &self.channel)
    }

    fn read(&self, offset: u64, len: u64) -> Result<Bytes, Error> {
        // Reject reads past the end of the log before allocating a buffer for them
        let short = || Error::ShortRead {
            offset,
            expected: len,
        };
        if !matches!(offset.checked_add(len), Some(end) if end <= self.size) {
            return Err(short());
        }
        let size = usize::try_from(len).map_err(|_| short())?;
        let raw = self.blob.read(offset, size)?;
        self.reads.inc();
        self.read_bytes.inc_by(len);
        Ok(raw)
    }

    fn decode(&self, frame: Frame) -> Result<D::Item, Error> {
        self.decoder.decode(frame.payload).map_err(|err| {
            self.decode_failures.inc();
            Error::Decode(err)
        })
    }

    /// Fetch `[start, stop)` with one read and slice out each record.
    fn get_bulk(&self, start: u64, stop: u64, span: Range<u64>) -> Result<Vec<D::Item>, Error> {
        let bulk = self.read(span.start, span.end - span.start)?;
        let mut items = Vec::with_capacity((stop - start) as usize);
        for position in start..stop {
            let IndexEntry { offset, size, .. } = self.index.entry_at(position)?;
            let begin = (offset - span.start) as usize;
            let raw = bulk.slice(begin..begin + size as usize);
            items.push(self.decode(parse_record(&raw, &self.channel)?)?);
        }
        Ok(items)
    }
}

impl<D: Decoder, B: Blob> Entries for Reader<D, B> {
    type Item = D::Item;

    fn index(&self) -> &Index {
        &self.index
    }

    fn get(&self, index: u64) -> Result<D::Item, Error> {
        let frame = self.raw(index)?;
        self.decode(frame)
    }

    fn get_range(&self, start: u64, stop: u64) -> Result<Vec<D::Item>, Error> {
        let span = self.index.span(start, stop)?;
        if span.is_empty() {
            return Ok(Vec::new());
        }
        if span.end - span.start <= self.bulk_read_limit && self.index.is_contiguous(start, stop) {
            return self.get_bulk(start, stop, span);
        }
        (start..stop).map(|i| self.get(i)).collect()
    }
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|ext| ext == extension)
}
