//! Positional access to log bytes.
//!
//! Every read names its own offset and length. No read depends on (or moves) a cursor
//! shared with other reads, so a single [Blob] can serve any number of concurrent readers.

use crate::Error;
use bytes::Bytes;
use std::{fs::File, io::ErrorKind};

/// Read-only, positionally addressed byte source.
#[allow(clippy::len_without_is_empty)]
pub trait Blob: Send + Sync {
    /// Length of the blob in bytes.
    fn len(&self) -> Result<u64, Error>;

    /// Fill `buf` with the bytes starting at `offset`.
    ///
    /// Returns [Error::ShortRead] if the blob ends before `buf` is full.
    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<(), Error>;

    /// Read `len` bytes starting at `offset` into a new buffer.
    fn read(&self, offset: u64, len: usize) -> Result<Bytes, Error> {
        let mut buf = vec![0u8; len];
        self.read_at(&mut buf, offset)?;
        Ok(buf.into())
    }
}

impl Blob for File {
    fn len(&self) -> Result<u64, Error> {
        Ok(self.metadata()?.len())
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<(), Error> {
        let expected = buf.len() as u64;
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileExt;
            self.read_exact_at(buf, offset).map_err(|err| match err.kind() {
                ErrorKind::UnexpectedEof => Error::ShortRead { offset, expected },
                _ => Error::Io(err),
            })
        }
        #[cfg(windows)]
        {
            use std::os::windows::fs::FileExt;
            let mut read = 0;
            while read < buf.len() {
                let n = match self.seek_read(&mut buf[read..], offset + read as u64) {
                    Ok(n) => n,
                    Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                    Err(err) => return Err(Error::Io(err)),
                };
                if n == 0 {
                    return Err(Error::ShortRead { offset, expected });
                }
                read += n;
            }
            Ok(())
        }
    }
}

impl Blob for Bytes {
    fn len(&self) -> Result<u64, Error> {
        Ok(Bytes::len(self) as u64)
    }

    fn read_at(&self, buf: &mut [u8], offset: u64) -> Result<(), Error> {
        let expected = buf.len() as u64;
        let short = || Error::ShortRead { offset, expected };
        let start = usize::try_from(offset).map_err(|_| short())?;
        let end = start.checked_add(buf.len()).ok_or_else(short)?;
        if end > Bytes::len(self) {
            return Err(short());
        }
        buf.copy_from_slice(&self[start..end]);
        Ok(())
    }

    fn read(&self, offset: u64, len: usize) -> Result<Bytes, Error> {
        let short = || Error::ShortRead {
            offset,
            expected: len as u64,
        };
        let start = usize::try_from(offset).map_err(|_| short())?;
        let end = start.checked_add(len).ok_or_else(short)?;
        if end > Bytes::len(self) {
            return Err(short());
        }
        Ok(self.slice(start..end))
    }
}
