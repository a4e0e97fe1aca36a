//! Helpers shared by the reader benchmarks.

use bytes::{BufMut, Bytes, BytesMut};
use commonware_codec::Encode;
use lmp_reader::{index, record::Record, Config, Raw, Reader};
use rand::{rngs::StdRng, Rng, SeedableRng};

/// Size of each record payload in bytes.
pub const PAYLOAD_SIZE: usize = 256;

/// Generate an in-memory log of `count` records with random payloads.
pub fn random_log(count: u64) -> Bytes {
    let mut rng = StdRng::seed_from_u64(0);
    let mut log = BytesMut::new();
    let mut timestamp = 0;
    let mut payload = [0u8; PAYLOAD_SIZE];
    for sequence in 0..count {
        timestamp += rng.gen_range(1..1_000);
        rng.fill(&mut payload[..]);
        log.put(Record::new(sequence, timestamp, "harvest", payload.to_vec()).encode());
    }
    log.freeze()
}

/// Index `log` and return a reader over it.
pub fn reader(log: Bytes, bulk_read_limit: u64) -> Reader<Raw, Bytes> {
    let index = index::build(&log, std::io::sink(), None).unwrap();
    let config = Config {
        bulk_read_limit,
        ..Config::default()
    };
    Reader::init(log, index, config, Raw).unwrap()
}
