//! Derive sub-logs for intervals of time.
//!
//! Each interval `(t_start, t_end)` (in seconds) resolves to the positions
//! `start = time_to_index(t_start)` and `stop = time_to_index(t_end)`. Depending on the [Mode],
//! either the entries `[start, stop)` are written as a new index file (referencing the original
//! log) or the bytes from the start of entry `start` through the end of entry `stop` (see
//! [Index::extract_span]) are physically copied out of the log by a [Copier].

use crate::{index::micros, Error, Index};
use std::{
    fs::{self, File},
    io::{self, Read, Seek, SeekFrom},
    ops::Range,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// How each interval is materialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Write an index file containing only the entries of the interval.
    IndexOnly,
    /// Copy the bytes of the interval's records into a new log file.
    Extract,
}

impl Mode {
    fn extension(&self) -> &'static str {
        match self {
            Self::IndexOnly => crate::index::EXTENSION,
            Self::Extract => crate::reader::EXTENSION,
        }
    }
}

/// A materialized interval.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Split {
    /// File written for the interval.
    pub path: PathBuf,
    /// First position of the interval.
    pub start: u64,
    /// First position at or after the end of the interval.
    pub stop: u64,
    /// Bytes of the log referenced (or copied) for the interval.
    pub span: Range<u64>,
}

impl Split {
    /// Number of entries in the interval.
    pub fn len(&self) -> u64 {
        self.stop - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.stop
    }
}

/// Copies a byte range of one file into a new file.
pub trait Copier {
    /// Copy `len` bytes starting at `offset` of `src` into a new file at `dst`.
    fn copy(&self, src: &Path, dst: &Path, offset: u64, len: u64) -> Result<(), Error>;
}

/// [Copier] backed by the local filesystem.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileCopier;

impl Copier for FileCopier {
    fn copy(&self, src: &Path, dst: &Path, offset: u64, len: u64) -> Result<(), Error> {
        // Use a dedicated handle so the cursor is never shared
        let mut source = File::open(src)?;
        source.seek(SeekFrom::Start(offset))?;
        let mut target = File::create(dst)?;
        let copied = io::copy(&mut source.take(len), &mut target)?;
        if copied != len {
            return Err(Error::ShortRead {
                offset,
                expected: len,
            });
        }
        target.sync_all()?;
        Ok(())
    }
}

/// Materialize each of `intervals` (in seconds) of the log at `log` into `dest`.
///
/// Outputs are named `interval_{i:06}` (with the index or log extension, per `mode`) after the
/// position of their interval in `intervals`. Extraction is delegated to `copier`.
pub fn split(
    index: &Index,
    log: &Path,
    intervals: &[(f64, f64)],
    dest: &Path,
    mode: Mode,
    copier: &impl Copier,
) -> Result<Vec<Split>, Error> {
    check_destination(dest)?;

    let mut splits = Vec::with_capacity(intervals.len());
    for (i, (t_start, t_end)) in intervals.iter().enumerate() {
        let start = index.time_to_index(micros(*t_start));
        let stop = index.time_to_index(micros(*t_end));
        let path = dest.join(format!("interval_{i:06}.{}", mode.extension()));
        let span = match mode {
            Mode::IndexOnly => {
                index.slice(start, stop)?.persist(&path)?;
                index.span(start, stop)?
            }
            Mode::Extract => {
                let span = index.extract_span(start, stop)?;
                copier.copy(log, &path, span.start, span.end - span.start)?;
                span
            }
        };
        debug!(
            path = %path.display(),
            start,
            stop,
            bytes = span.end - span.start,
            "wrote interval"
        );
        splits.push(Split {
            path,
            start,
            stop,
            span,
        });
    }
    info!(
        dest = %dest.display(),
        intervals = splits.len(),
        ?mode,
        "split log"
    );
    Ok(splits)
}

/// Ensure `dest` is an existing, writable directory.
fn check_destination(dest: &Path) -> Result<(), Error> {
    let invalid = || Error::InvalidDestination(dest.to_path_buf());
    let metadata = fs::metadata(dest).map_err(|_| invalid())?;
    if !metadata.is_dir() || metadata.permissions().readonly() {
        return Err(invalid());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        index::build,
        mocks::{harvest, TempDir},
        reader::Config,
        Entries, Raw, Reader,
    };
    use commonware_macros::test_traced;
    use std::{cell::RefCell, fs};

    #[test_traced]
    fn test_split_index_only() {
        let dir = TempDir::new("lmp_split");
        let log = dir.write_log("drive", &harvest());
        let index = build(&File::open(&log).unwrap(), io::sink(), None).unwrap();
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();

        let splits = split(
            &index,
            &log,
            &[(0.0001, 0.0003)],
            &dest,
            Mode::IndexOnly,
            &FileCopier,
        )
        .unwrap();
        assert_eq!(splits.len(), 1);
        let split = &splits[0];
        assert_eq!(split.path, dest.join("interval_000000.idx"));
        assert_eq!((split.start, split.stop), (0, 3));
        assert_eq!(split.len(), 3);

        // The sub-index references the original log
        assert_eq!(fs::metadata(&split.path).unwrap().len(), 3 * 24);
        let sub = Index::load(&split.path).unwrap();
        assert_eq!(sub.timestamps(), &[100, 200, 200]);
        assert_eq!(sub, index.slice(0, 3).unwrap());

        // ...and can be used to read it
        let config = Config {
            index: Some(split.path.clone()),
            ..Config::default()
        };
        let reader = Reader::open(&log, config, Raw).unwrap();
        assert_eq!(reader.len(), 3);
        assert_eq!(reader.get(2).unwrap(), harvest()[2].payload);
    }

    #[test_traced]
    fn test_split_extract() {
        let dir = TempDir::new("lmp_split");
        let log = dir.write_log("drive", &harvest());
        let index = build(&File::open(&log).unwrap(), io::sink(), None).unwrap();

        let intervals = [(0.00015, 0.00045), (0.0, 1.0), (0.0006, 0.0007)];
        let splits = split(
            &index,
            &log,
            &intervals,
            dir.path(),
            Mode::Extract,
            &FileCopier,
        )
        .unwrap();
        assert_eq!(splits.len(), 3);

        // Extracted bytes are exactly the span of the interval
        let bytes = fs::read(&log).unwrap();
        for split in &splits {
            let extracted = fs::read(&split.path).unwrap();
            let span = split.span.start as usize..split.span.end as usize;
            assert_eq!(extracted, bytes[span]);
        }
        assert_eq!((splits[0].start, splits[0].stop), (1, 4));
        assert_eq!(splits[0].span, index.span(1, 5).unwrap());
        assert_eq!(splits[1].span, 0..bytes.len() as u64);
        assert!(splits[2].is_empty());
        assert_eq!(splits[2].path, dir.path().join("interval_000002.lmp"));

        // An extracted log is a log of its own (including the entry at `stop`)
        let reader = Reader::open(&splits[0].path, Config::default(), Raw).unwrap();
        assert_eq!(reader.index().timestamps(), &[200, 200, 350, 500]);
    }

    #[test_traced]
    fn test_split_extract_through_stop() {
        let dir = TempDir::new("lmp_split");
        let log = dir.write_log("drive", &harvest());
        let index = build(&File::open(&log).unwrap(), io::sink(), None).unwrap();
        let dest = dir.path().join("out");
        fs::create_dir(&dest).unwrap();

        let splits = split(
            &index,
            &log,
            &[(0.0001, 0.0003)],
            &dest,
            Mode::Extract,
            &FileCopier,
        )
        .unwrap();
        let split = &splits[0];
        assert_eq!((split.start, split.stop), (0, 3));

        // Bytes run from the first record through the end of the record at `stop`
        let stop = index.entry_at(3).unwrap();
        assert_eq!(split.span, 0..stop.offset + stop.size);
        let bytes = fs::read(&log).unwrap();
        let extracted = fs::read(&split.path).unwrap();
        assert_eq!(extracted, bytes[..stop.end() as usize]);

        let reader = Reader::open(&split.path, Config::default(), Raw).unwrap();
        assert_eq!(reader.index().timestamps(), &[100, 200, 200, 350]);
        assert_eq!(reader.get(3).unwrap(), harvest()[3].payload);
    }

    #[test_traced]
    fn test_split_copier() {
        #[derive(Default)]
        struct Recorder(RefCell<Vec<(u64, u64)>>);

        impl Copier for Recorder {
            fn copy(&self, _: &Path, _: &Path, offset: u64, len: u64) -> Result<(), Error> {
                self.0.borrow_mut().push((offset, len));
                Ok(())
            }
        }

        let dir = TempDir::new("lmp_split");
        let log = dir.write_log("drive", &harvest());
        let index = build(&File::open(&log).unwrap(), io::sink(), None).unwrap();

        let recorder = Recorder::default();
        let splits = split(
            &index,
            &log,
            &[(0.0002, 0.0004)],
            dir.path(),
            Mode::Extract,
            &recorder,
        )
        .unwrap();
        let expected = index.span(1, 5).unwrap();
        assert_eq!(splits[0].span, expected);
        assert_eq!(
            recorder.0.into_inner(),
            vec![(expected.start, expected.end - expected.start)]
        );
    }

    #[test_traced]
    fn test_split_invalid_destination() {
        let dir = TempDir::new("lmp_split");
        let log = dir.write_log("drive", &harvest());
        let index = build(&File::open(&log).unwrap(), io::sink(), None).unwrap();
        let intervals = [(0.0, 1.0)];

        // Missing
        let missing = dir.path().join("missing");
        let result = split(&index, &log, &intervals, &missing, Mode::IndexOnly, &FileCopier);
        assert!(matches!(result, Err(Error::InvalidDestination(path)) if path == missing));

        // Not a directory
        let result = split(&index, &log, &intervals, &log, Mode::IndexOnly, &FileCopier);
        assert!(matches!(result, Err(Error::InvalidDestination(_))));

        // Read-only
        let readonly = dir.path().join("readonly");
        fs::create_dir(&readonly).unwrap();
        let mut permissions = fs::metadata(&readonly).unwrap().permissions();
        permissions.set_readonly(true);
        fs::set_permissions(&readonly, permissions.clone()).unwrap();
        let result = split(&index, &log, &intervals, &readonly, Mode::Extract, &FileCopier);
        assert!(matches!(result, Err(Error::InvalidDestination(_))));
        #[allow(clippy::permissions_set_readonly_false)]
        permissions.set_readonly(false);
        fs::set_permissions(&readonly, permissions).unwrap();
    }

    #[test_traced]
    fn test_split_inverted_interval() {
        let dir = TempDir::new("lmp_split");
        let log = dir.write_log("drive", &harvest());
        let index = build(&File::open(&log).unwrap(), io::sink(), None).unwrap();

        let result = split(
            &index,
            &log,
            &[(0.0004, 0.0001)],
            dir.path(),
            Mode::IndexOnly,
            &FileCopier,
        );
        assert!(matches!(result, Err(Error::OutOfRange { start: 4, stop: 0, .. })));
    }
}
