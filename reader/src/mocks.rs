//! Fixtures shared by tests.

use crate::record::Record;
use bytes::{BufMut, Bytes, BytesMut};
use commonware_codec::Encode;
use rand::Rng;
use std::{
    env, fs,
    path::{Path, PathBuf},
};

/// Timestamps of the records in [harvest].
pub const HARVEST_TIMESTAMPS: [u64; 5] = [100, 200, 200, 350, 500];

/// Five records on the `harvest` channel (the payload of record `i` is `3 + i` copies of `i`).
pub fn harvest() -> Vec<Record> {
    HARVEST_TIMESTAMPS
        .iter()
        .enumerate()
        .map(|(i, t)| Record::new(i as u64, *t, "harvest", vec![i as u8; 3 + i]))
        .collect()
}

/// Concatenate the encoding of `records`.
pub fn encode(records: &[Record]) -> Bytes {
    let mut log = BytesMut::new();
    for record in records {
        log.put(record.encode());
    }
    log.freeze()
}

/// A fresh directory under the system temporary directory (removed on drop).
pub struct TempDir(PathBuf);

impl TempDir {
    pub fn new(prefix: &str) -> Self {
        let path = env::temp_dir().join(format!("{prefix}_{}", rand::thread_rng().gen::<u64>()));
        fs::create_dir_all(&path).expect("Failed to create temporary directory");
        Self(path)
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// Write `records` to `<name>.lmp` and return its path.
    pub fn write_log(&self, name: &str, records: &[Record]) -> PathBuf {
        let path = self.0.join(format!("{name}.lmp"));
        fs::write(&path, encode(records)).expect("Failed to write log");
        path
    }
}

impl Drop for TempDir {
    fn drop(&mut self) {
        let _ = fs::remove_dir_all(&self.0);
    }
}
