use super::{Index, IndexEntry};
use crate::{
    blob::Blob,
    record::{parse_header, RecordHeader},
    Error,
};
use commonware_codec::{FixedSize, Write as _};
use std::{
    fs::{File, OpenOptions},
    io::{BufWriter, Write},
    path::Path,
};
use tracing::{debug, warn};

/// Number of entries buffered before they are written to the index file.
const WRITE_BUFFER_ENTRIES: usize = 1024;

/// Scan `log` from the beginning and produce an [Index] of its records.
///
/// Each entry is written to `out` as soon as its record header has been parsed. When
/// `channel` is provided, only records on that channel are indexed.
///
/// Scanning stops (without error) when fewer than [RecordHeader::SIZE] bytes remain. Payloads
/// are never read or validated.
pub fn build<B: Blob>(log: &B, mut out: impl Write, channel: Option<&str>) -> Result<Index, Error> {
    let len = log.len()?;
    let mut index = Index::new();
    let mut header = [0u8; RecordHeader::SIZE];
    let mut entry_buf = Vec::with_capacity(IndexEntry::SIZE);
    let mut skipped = 0u64;
    let mut offset = 0u64;
    while offset + RecordHeader::SIZE as u64 <= len {
        log.read_at(&mut header, offset)?;
        let parsed = parse_header(&header)?;
        let size = parsed.record_size();
        if offset + size > len {
            warn!(offset, size, len, "final record extends past end of log");
        }

        // Filter by channel (if requested)
        if let Some(channel) = channel {
            let start = offset + RecordHeader::SIZE as u64;
            if start + parsed.channel_len as u64 > len {
                break;
            }
            let found = log.read(start, parsed.channel_len as usize)?;
            if found.as_ref() != channel.as_bytes() {
                skipped += 1;
                offset += size;
                continue;
            }
        }

        // Record the entry
        let entry = IndexEntry::new(offset, size, parsed.timestamp);
        entry_buf.clear();
        entry.write(&mut entry_buf);
        out.write_all(&entry_buf)?;
        index.push(entry);
        offset += size;
    }
    if offset < len {
        warn!(
            offset,
            trailing = len - offset,
            "ignoring trailing bytes shorter than a record header"
        );
    }
    out.flush()?;
    debug!(entries = index.len(), skipped, "built index");
    Ok(index)
}

/// Build the index of the log at `log_path` and append it to the file at `index_path`.
pub fn build_file(
    log_path: impl AsRef<Path>,
    index_path: impl AsRef<Path>,
    channel: Option<&str>,
) -> Result<Index, Error> {
    let log = File::open(log_path.as_ref())?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(index_path.as_ref())?;

    // Only whole entries are handed to the file
    let mut writer = BufWriter::with_capacity(WRITE_BUFFER_ENTRIES * IndexEntry::SIZE, file);
    let index = build(&log, &mut writer, channel)?;
    writer.into_inner().map_err(|err| err.into_error())?.sync_all()?;
    debug!(
        log = %log_path.as_ref().display(),
        index = %index_path.as_ref().display(),
        entries = index.len(),
        "wrote index"
    );
    Ok(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use bytes::{BufMut, Bytes, BytesMut};
    use commonware_codec::{Encode, EncodeSize};
    use commonware_macros::test_traced;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::{env, fs};

    fn log_of(records: &[Record]) -> Bytes {
        let mut log = BytesMut::new();
        for record in records {
            log.put(record.encode());
        }
        log.freeze()
    }

    fn random_records(rng: &mut StdRng, count: usize) -> Vec<Record> {
        let mut timestamp = 0;
        (0..count)
            .map(|i| {
                timestamp += rng.gen_range(0..1_000);
                let payload: Vec<u8> = (0..rng.gen_range(0..512)).map(|_| rng.gen()).collect();
                Record::new(i as u64, timestamp, "harvest", payload)
            })
            .collect()
    }

    #[test_traced]
    fn test_build_counts_and_contiguity() {
        let mut rng = StdRng::seed_from_u64(0);
        let records = random_records(&mut rng, 100);
        let log = log_of(&records);

        let mut out = Vec::new();
        let index = build(&log, &mut out, None).expect("Failed to build index");

        // One entry per record, written as it was produced
        assert_eq!(index.len(), records.len() as u64);
        assert_eq!(out.len(), records.len() * IndexEntry::SIZE);
        assert_eq!(Index::decode(&out).unwrap(), index);

        // Entries are contiguous and cover the whole log
        assert!(index.is_contiguous(0, index.len()));
        assert_eq!(index.span(0, index.len()).unwrap(), 0..log.len() as u64);
        for (entry, record) in index.entries().zip(&records) {
            assert_eq!(entry.timestamp, record.timestamp);
            assert_eq!(entry.size, record.encode_size() as u64);
        }
    }

    #[test_traced]
    fn test_build_empty() {
        let mut out = Vec::new();
        let index = build(&Bytes::new(), &mut out, None).unwrap();
        assert!(index.is_empty());
        assert!(out.is_empty());
    }

    #[test_traced]
    fn test_build_trailing_bytes() {
        let records = vec![
            Record::new(0, 10, "harvest", vec![1u8; 8]),
            Record::new(1, 20, "harvest", vec![2u8; 8]),
        ];
        let mut log = BytesMut::from(log_of(&records).as_ref());
        log.put_slice(&[0u8; RecordHeader::SIZE - 1]);

        let index = build(&log.freeze(), Vec::new(), None).unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test_traced]
    fn test_build_truncated_final_record() {
        let records = vec![
            Record::new(0, 10, "harvest", vec![1u8; 8]),
            Record::new(1, 20, "harvest", vec![2u8; 8]),
        ];
        let log = log_of(&records);
        let log = log.slice(..log.len() - 4);

        // The final record is still indexed (reading it will fail)
        let index = build(&log, Vec::new(), None).unwrap();
        assert_eq!(index.len(), 2);
        assert!(index.entry_at(1).unwrap().end() > log.len() as u64);
    }

    #[test_traced]
    fn test_build_corrupt_header() {
        let records = vec![
            Record::new(0, 10, "harvest", vec![1u8; 8]),
            Record::new(1, 20, "harvest", vec![2u8; 8]),
        ];
        let mut log = BytesMut::from(log_of(&records).as_ref());
        let second = records[0].encode_size();
        log[second] ^= 0xFF;

        let result = build(&log.freeze(), Vec::new(), None);
        assert!(matches!(result, Err(Error::CorruptHeader(_))));
    }

    #[test_traced]
    fn test_build_channel_filter() {
        let records = vec![
            Record::new(0, 10, "harvest", vec![1u8; 8]),
            Record::new(1, 15, "camera", vec![9u8; 64]),
            Record::new(2, 20, "harvest", vec![2u8; 8]),
            Record::new(3, 25, "camera", vec![9u8; 64]),
        ];
        let log = log_of(&records);

        // Without a filter every frame is indexed
        let all = build(&log, Vec::new(), None).unwrap();
        assert_eq!(all.len(), 4);

        // With a filter only matching frames are indexed
        let harvest = build(&log, Vec::new(), Some("harvest")).unwrap();
        assert_eq!(harvest.len(), 2);
        assert_eq!(harvest.timestamps(), &[10, 20]);
        assert_eq!(harvest.entry_at(1).unwrap(), all.entry_at(2).unwrap());
        assert!(!harvest.is_contiguous(0, 2));
    }

    #[test_traced]
    fn test_build_file() {
        let mut rng = StdRng::seed_from_u64(1);
        let records = random_records(&mut rng, 10);
        let log = log_of(&records);

        let name = format!("lmp_builder_{}", rand::thread_rng().gen::<u64>());
        let log_path = env::temp_dir().join(format!("{name}.lmp"));
        let index_path = env::temp_dir().join(format!("{name}.idx"));
        fs::write(&log_path, &log).unwrap();

        let index = build_file(&log_path, &index_path, None).expect("Failed to build index");
        assert_eq!(index.len(), 10);
        assert_eq!(fs::metadata(&index_path).unwrap().len(), 10 * 24);
        assert_eq!(Index::load(&index_path).unwrap(), index);

        fs::remove_file(&log_path).unwrap();
        fs::remove_file(&index_path).unwrap();
    }
}
