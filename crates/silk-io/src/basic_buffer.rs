//! [`BasicBuffer`]: single-buffer, non-compressing I/O over a seekable
//! or pipe-like byte source (`spec.md` §4.4).

use crate::error::{IoError, Result};
use crate::traits::ByteStream;
use std::io::{Read, Seek, SeekFrom, Write};

const DEFAULT_CAPACITY: usize = 64 * 1024;

/// Wraps a `Read + Write` source that does not support seeking (a
/// pipe, a socket, stdin/stdout) so it can still satisfy the `Seek`
/// bound [`BasicBuffer`] requires: every seek attempt fails with
/// `ESPIPE`, exactly as the real syscall would on a FIFO, which is
/// what lets [`BasicBuffer::skip`] share one fallback path for both
/// "genuinely not seekable" and "seekable but the OS said no".
pub struct NonSeekable<T>(pub T);

impl<T: Read> Read for NonSeekable<T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.0.read(buf)
    }
}

impl<T: Write> Write for NonSeekable<T> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.flush()
    }
}

impl<T> Seek for NonSeekable<T> {
    fn seek(&mut self, _pos: SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::from_raw_os_error(ESPIPE))
    }
}

/// `ESPIPE`'s value is stable across the Unix targets this crate cares
/// about; kept as a local constant rather than pulling in `libc` for
/// one errno.
const ESPIPE: i32 = 29;

/// A buffered read/write facility over any `Read + Write + Seek`
/// source. Seekability is probed lazily: the buffer starts out
/// assuming the source is seekable and demotes itself permanently to
/// read-and-discard the first time a seek attempt fails with
/// `ESPIPE`, matching `spec.md` §4.4.
pub struct BasicBuffer<T> {
    inner: T,
    read_buf: Vec<u8>,
    read_pos: usize,
    read_len: usize,
    write_buf: Vec<u8>,
    seekable: bool,
    closed: bool,
}

impl<T: Read + Write + Seek> BasicBuffer<T> {
    pub fn new(inner: T) -> Self {
        BasicBuffer {
            inner,
            read_buf: vec![0u8; DEFAULT_CAPACITY],
            read_pos: 0,
            read_len: 0,
            write_buf: Vec::with_capacity(DEFAULT_CAPACITY),
            seekable: true,
            closed: false,
        }
    }

    /// Constructs a buffer that never attempts to seek, for backends
    /// known up front to be pipe-like (saves one failed syscall on
    /// the first skip).
    pub fn new_unseekable(inner: T) -> Self {
        let mut buf = Self::new(inner);
        buf.seekable = false;
        buf
    }

    fn fill(&mut self) -> Result<usize> {
        if self.read_pos < self.read_len {
            return Ok(self.read_len - self.read_pos);
        }
        self.read_pos = 0;
        self.read_len = self.inner.read(&mut self.read_buf)?;
        Ok(self.read_len)
    }

    /// Reads into `buf`, stopping either when `buf` fills or the next
    /// byte equals `stop` (consumed but not copied), matching the
    /// original's `read_to_char` used for text-mode line reading.
    /// Returns the number of bytes written to `buf`.
    pub fn read_to_char(&mut self, buf: &mut [u8], stop: u8) -> Result<usize> {
        let mut written = 0;
        while written < buf.len() {
            if self.fill()? == 0 {
                break;
            }
            let byte = self.read_buf[self.read_pos];
            self.read_pos += 1;
            if byte == stop {
                return Ok(written);
            }
            buf[written] = byte;
            written += 1;
        }
        if written == buf.len() {
            return Err(IoError::LongLine);
        }
        Ok(written)
    }

    /// Fills the read buffer until at least `n` bytes are available
    /// (or the source is exhausted) and returns a view of whatever is
    /// buffered, without consuming it. Used by `silk::stream`'s
    /// header-read algorithm to peek the first two bytes for the
    /// gzip magic number (`spec.md` §4.1) before deciding whether to
    /// hand the underlying descriptor off to a
    /// [`crate::gzip_buffer::GzipBuffer`].
    pub fn peek(&mut self, n: usize) -> Result<&[u8]> {
        while self.read_len - self.read_pos < n {
            if self.read_pos > 0 {
                self.read_buf.copy_within(self.read_pos..self.read_len, 0);
                self.read_len -= self.read_pos;
                self.read_pos = 0;
            }
            if self.read_buf.len() < n {
                self.read_buf.resize(n, 0);
            }
            let got = self.inner.read(&mut self.read_buf[self.read_len..])?;
            if got == 0 {
                break;
            }
            self.read_len += got;
        }
        Ok(&self.read_buf[self.read_pos..self.read_len])
    }

    /// Consumes `self` and returns the inner source, with any bytes
    /// still sitting in the read buffer prepended to a fresh read —
    /// used to hand a peeked-but-not-yet-gzip-decoded descriptor to
    /// [`crate::gzip_buffer::GzipBuffer`] without losing the bytes
    /// already buffered by the peek.
    pub fn into_inner_with_unread(self) -> (T, Vec<u8>) {
        let unread = self.read_buf[self.read_pos..self.read_len].to_vec();
        (self.inner, unread)
    }

    fn read_and_discard(&mut self, mut n: u64) -> Result<()> {
        let mut scratch = [0u8; 8192];
        while n > 0 {
            let want = n.min(scratch.len() as u64) as usize;
            let got = self.inner.read(&mut scratch[..want])?;
            if got == 0 {
                return Err(IoError::Eof);
            }
            n -= got as u64;
        }
        Ok(())
    }
}

impl<T: Read + Write + Seek> ByteStream for BasicBuffer<T> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.fill()? == 0 {
            return Ok(0);
        }
        let avail = self.read_len - self.read_pos;
        let n = avail.min(buf.len());
        buf[..n].copy_from_slice(&self.read_buf[self.read_pos..self.read_pos + n]);
        self.read_pos += n;
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            return self.flush();
        }
        self.write_buf.extend_from_slice(buf);
        if self.write_buf.len() >= DEFAULT_CAPACITY {
            self.flush()?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.write_buf.is_empty() {
            self.inner.write_all(&self.write_buf)?;
            self.write_buf.clear();
        }
        self.inner.flush()?;
        Ok(())
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        if n == 0 {
            return Ok(());
        }
        let buffered = (self.read_len - self.read_pos) as u64;
        let from_buf = buffered.min(n);
        self.read_pos += from_buf as usize;
        let remaining = n - from_buf;
        if remaining == 0 {
            return Ok(());
        }
        if self.seekable {
            match self.inner.seek(SeekFrom::Current(remaining as i64)) {
                Ok(_) => return Ok(()),
                Err(e) if e.raw_os_error() == Some(ESPIPE) => {
                    self.seekable = false;
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.read_and_discard(remaining)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.flush()?;
        self.closed = true;
        Ok(())
    }

    fn is_seekable(&self) -> bool {
        self.seekable
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn write_then_read_round_trips() {
        let mut buf = BasicBuffer::new(Cursor::new(Vec::new()));
        buf.write(b"hello, silk").unwrap();
        buf.flush().unwrap();
        assert_eq!(buf.inner.get_ref(), b"hello, silk");
    }

    #[test]
    fn read_to_char_stops_at_delimiter_and_consumes_it() {
        let mut buf = BasicBuffer::new(Cursor::new(b"line one\nline two\n".to_vec()));
        let mut line = [0u8; 64];
        let n = buf.read_to_char(&mut line, b'\n').unwrap();
        assert_eq!(&line[..n], b"line one");
        let n2 = buf.read_to_char(&mut line, b'\n').unwrap();
        assert_eq!(&line[..n2], b"line two");
    }

    #[test]
    fn skip_discards_buffered_and_upstream_bytes() {
        let mut buf = BasicBuffer::new(Cursor::new(b"0123456789".to_vec()));
        let mut one = [0u8; 1];
        buf.read(&mut one).unwrap();
        buf.skip(5).unwrap();
        let mut rest = [0u8; 4];
        buf.read(&mut rest).unwrap();
        assert_eq!(&rest, b"6789");
    }

    #[test]
    fn skip_falls_back_to_read_discard_on_espipe() {
        let mut buf = BasicBuffer::new(NonSeekable(Cursor::new(b"0123456789".to_vec())));
        assert!(buf.is_seekable());
        buf.skip(4).unwrap();
        assert!(!buf.is_seekable());
        let mut rest = [0u8; 6];
        buf.read(&mut rest).unwrap();
        assert_eq!(&rest, b"456789");
    }
}
