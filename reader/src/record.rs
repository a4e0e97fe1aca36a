//! Framing of individual log records.
//!
//! Every record in an LMP log is laid out contiguously as:
//!
//! ```text
//! +--------+----------+--------------+-------------+-------------+---------+---------+
//! | magic  | sequence | timestamp_us | channel_len | payload_len | channel | payload |
//! | u32    | u64      | u64          | u32         | u32         | bytes   | bytes   |
//! +--------+----------+--------------+-------------+-------------+---------+---------+
//! ```
//!
//! All integers are big-endian. The header is [RecordHeader::SIZE] bytes and the channel and
//! payload immediately follow it. The payload is opaque at this layer.

use crate::Error;
use bytes::{Buf, BufMut, Bytes};
use commonware_codec::{EncodeSize, FixedSize, Read, ReadExt, Write};
use commonware_utils::hex;

/// Constant found at the start of every record header.
pub const MAGIC: u32 = 0xEDA1_DA01;

/// Channel names must be strictly shorter than this (guards against reading garbage lengths).
pub const MAX_CHANNEL_LEN: u32 = 256;

/// Fixed header preceding the channel name and payload of each record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordHeader {
    pub magic: u32,
    pub sequence: u64,
    pub timestamp: u64,
    pub channel_len: u32,
    pub payload_len: u32,
}

impl RecordHeader {
    /// Create a header for a record with the given channel and payload lengths.
    pub fn new(sequence: u64, timestamp: u64, channel_len: u32, payload_len: u32) -> Self {
        Self {
            magic: MAGIC,
            sequence,
            timestamp,
            channel_len,
            payload_len,
        }
    }

    /// Total size of the record described by this header (header included).
    pub fn record_size(&self) -> u64 {
        Self::SIZE as u64 + self.channel_len as u64 + self.payload_len as u64
    }
}

impl FixedSize for RecordHeader {
    const SIZE: usize = u32::SIZE + u64::SIZE + u64::SIZE + u32::SIZE + u32::SIZE;
}

impl Write for RecordHeader {
    fn write(&self, buf: &mut impl BufMut) {
        self.magic.write(buf);
        self.sequence.write(buf);
        self.timestamp.write(buf);
        self.channel_len.write(buf);
        self.payload_len.write(buf);
    }
}

impl Read for RecordHeader {
    type Cfg = ();

    fn read_cfg(buf: &mut impl Buf, _: &Self::Cfg) -> Result<Self, commonware_codec::Error> {
        let magic = u32::read(buf)?;
        let sequence = u64::read(buf)?;
        let timestamp = u64::read(buf)?;
        let channel_len = u32::read(buf)?;
        let payload_len = u32::read(buf)?;
        Ok(Self {
            magic,
            sequence,
            timestamp,
            channel_len,
            payload_len,
        })
    }
}

/// A complete record, as written to a log.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub sequence: u64,
    pub timestamp: u64,
    pub channel: Bytes,
    pub payload: Bytes,
}

impl Record {
    pub fn new(sequence: u64, timestamp: u64, channel: &str, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            timestamp,
            channel: Bytes::copy_from_slice(channel.as_bytes()),
            payload: payload.into(),
        }
    }

    /// Header describing this record.
    ///
    /// # Panics
    ///
    /// Panics if the channel or payload length does not fit in a `u32`.
    pub fn header(&self) -> RecordHeader {
        let channel_len = u32::try_from(self.channel.len()).expect("channel too large");
        let payload_len = u32::try_from(self.payload.len()).expect("payload too large");
        RecordHeader::new(self.sequence, self.timestamp, channel_len, payload_len)
    }
}

impl Write for Record {
    fn write(&self, buf: &mut impl BufMut) {
        self.header().write(buf);
        buf.put_slice(&self.channel);
        buf.put_slice(&self.payload);
    }
}

impl EncodeSize for Record {
    fn encode_size(&self) -> usize {
        RecordHeader::SIZE + self.channel.len() + self.payload.len()
    }
}

/// A record parsed from raw log bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub header: RecordHeader,
    pub channel: Bytes,
    pub payload: Bytes,
}

/// Parse and validate a record header from the start of `bytes`.
pub fn parse_header(bytes: &[u8]) -> Result<RecordHeader, Error> {
    if bytes.len() < RecordHeader::SIZE {
        return Err(Error::CorruptHeader(hex(bytes)));
    }
    let raw = &bytes[..RecordHeader::SIZE];
    let header = RecordHeader::read(&mut &raw[..])?;
    if header.magic != MAGIC {
        return Err(Error::CorruptHeader(hex(raw)));
    }
    if header.channel_len >= MAX_CHANNEL_LEN {
        return Err(Error::CorruptHeader(hex(raw)));
    }
    Ok(header)
}

/// Parse a complete record from `raw`, requiring it to belong to `channel`.
///
/// The returned channel and payload share the allocation of `raw`.
pub fn parse_record(raw: &Bytes, channel: &str) -> Result<Frame, Error> {
    let header = parse_header(raw)?;
    let expected = header.record_size();
    if (raw.len() as u64) < expected {
        return Err(Error::TruncatedRecord {
            expected,
            found: raw.len() as u64,
        });
    }

    let channel_start = RecordHeader::SIZE;
    let payload_start = channel_start + header.channel_len as usize;
    let found = raw.slice(channel_start..payload_start);
    if found.as_ref() != channel.as_bytes() {
        return Err(Error::ChannelMismatch {
            expected: channel.to_string(),
            found: String::from_utf8_lossy(&found).into_owned(),
        });
    }
    let payload = raw.slice(payload_start..payload_start + header.payload_len as usize);

    Ok(Frame {
        header,
        channel: found,
        payload,
    })
}
