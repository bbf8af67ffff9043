//! [`GzipBuffer`]: whole-stream gzip compression (`spec.md` §4.4),
//! used when a stream's path is `.gz`-suffixed on write, or when the
//! first two bytes read back as the gzip magic number `1f 8b` on read
//! (`spec.md` §4.1's header-read algorithm).
//!
//! Unlike [`crate::basic_buffer::BasicBuffer`], a gzip stream is never
//! seekable: `skip` always falls back to read-and-discard, and `write`
//! never buffers past what `flate2`'s encoder already buffers
//! internally.

use crate::error::{IoError, Result};
use crate::traits::ByteStream;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::io::{Read, Write};

enum Inner<T: Read + Write> {
    Reader(GzDecoder<T>),
    Writer(GzEncoder<T>),
}

pub struct GzipBuffer<T: Read + Write> {
    inner: Inner<T>,
    closed: bool,
}

impl<T: Read + Write> GzipBuffer<T> {
    /// Wraps `inner` for inflating a gzip stream read from it.
    /// Callers are expected to have already peeked the `1f 8b` magic
    /// bytes and rewound/prepended them before constructing this (the
    /// peek lives in `silk::stream`'s header-read algorithm, not
    /// here, since only that layer owns the raw peek buffer).
    pub fn new_reader(inner: T) -> Self {
        GzipBuffer {
            inner: Inner::Reader(GzDecoder::new(inner)),
            closed: false,
        }
    }

    /// Wraps `inner` for deflating a gzip stream written to it, at
    /// the given compression level (`flate2::Compression::default()`
    /// is a reasonable choice for most callers).
    pub fn new_writer(inner: T, level: Compression) -> Self {
        GzipBuffer {
            inner: Inner::Writer(GzEncoder::new(inner, level)),
            closed: false,
        }
    }
}

impl<T: Read + Write> ByteStream for GzipBuffer<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        match &mut self.inner {
            Inner::Reader(dec) => Ok(dec.read(buf)?),
            Inner::Writer(_) => Err(IoError::Sys(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "gzip buffer opened for writing cannot be read",
            ))),
        }
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        match &mut self.inner {
            Inner::Writer(enc) => {
                if buf.is_empty() {
                    return self.flush();
                }
                enc.write_all(buf)?;
                Ok(())
            }
            Inner::Reader(_) => Err(IoError::Sys(std::io::Error::new(
                std::io::ErrorKind::Unsupported,
                "gzip buffer opened for reading cannot be written",
            ))),
        }
    }

    fn flush(&mut self) -> Result<()> {
        if let Inner::Writer(enc) = &mut self.inner {
            enc.flush()?;
        }
        Ok(())
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        let mut remaining = n;
        let mut scratch = [0u8; 8192];
        while remaining > 0 {
            let want = remaining.min(scratch.len() as u64) as usize;
            let got = self.read(&mut scratch[..want])?;
            if got == 0 {
                return Err(IoError::Eof);
            }
            remaining -= got as u64;
        }
        Ok(())
    }

    /// Idempotent. For a writer, this is the point at which the
    /// `Z_FINISH` trailer (CRC32 + uncompressed-size footer) is
    /// emitted; for a reader it simply drops the decoder.
    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        if let Inner::Writer(enc) = &mut self.inner {
            enc.try_finish()?;
        }
        self.closed = true;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn compresses_and_inflates_round_trip() {
        let payload = b"silk flow record payload bytes".repeat(20);
        let mut compressed = Vec::new();
        {
            let mut w = GzipBuffer::new_writer(Cursor::new(&mut compressed), Compression::default());
            w.write(&payload).unwrap();
            w.close().unwrap();
        }
        assert_eq!(&compressed[..2], &[0x1f, 0x8b]);

        let mut r = GzipBuffer::new_reader(Cursor::new(compressed));
        let mut out = Vec::new();
        let mut scratch = [0u8; 4096];
        loop {
            let n = r.read(&mut scratch).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&scratch[..n]);
        }
        assert_eq!(out, payload);
    }

    #[test]
    fn is_never_reported_as_seekable() {
        let r = GzipBuffer::new_reader(Cursor::new(Vec::<u8>::new()));
        assert!(!r.is_seekable());
    }
}
