//! The common byte-stream interface shared by the basic buffer and the
//! gzip buffer (`spec.md` §4.4), so the block buffer and the top-level
//! `FlowStream` can sit on top of either without caring which one is
//! underneath.

use crate::error::Result;

/// A buffered, possibly-compressed byte stream over a file descriptor.
///
/// Implemented by [`crate::basic_buffer::BasicBuffer`] (plain buffered
/// I/O) and [`crate::gzip_buffer::GzipBuffer`] (whole-stream gzip).
/// `silk-io`'s block buffer and `silk`'s `FlowStream` program against
/// this trait, not against either concrete type, matching `spec.md`
/// §4.1's header-read algorithm switching into gzip mode transparently
/// partway through opening a stream.
pub trait ByteStream {
    /// Reads up to `buf.len()` bytes, returning the number actually
    /// read (`0` only at true EOF).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Reads until `buf` is completely filled or the stream is
    /// exhausted; returns [`crate::error::IoError::Eof`] on a short read.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                return Err(crate::error::IoError::Eof);
            }
            filled += n;
        }
        Ok(())
    }

    /// Writes the entirety of `buf`. Passing an empty slice is a
    /// no-op write used by callers that want to force a flush without
    /// writing new data (`spec.md` §4.4: "`n == 0` to force a flush").
    fn write(&mut self, buf: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;

    /// Advances past `n` bytes of input without returning them.
    /// Implementations use `lseek` when the underlying descriptor is
    /// seekable, and fall back to a read-and-discard loop (marking the
    /// descriptor non-seekable for the rest of the session) when
    /// `lseek` fails with `ESPIPE`.
    fn skip(&mut self, n: u64) -> Result<()>;

    /// Idempotent; flushes outstanding writes (and, for gzip writers,
    /// emits the `Z_FINISH` trailer) then releases the descriptor.
    fn close(&mut self) -> Result<()>;

    /// `true` if the underlying descriptor supports `lseek`.
    fn is_seekable(&self) -> bool;
}

/// Lets `silk::FlowStream` hold whichever concrete byte stream it
/// opened (a file-backed [`crate::basic_buffer::BasicBuffer`], a
/// standard-stream one, or [`crate::gzip_buffer::GzipBuffer`]) behind
/// one `Box<dyn ByteStream>`, and lets `BlockWriter`/`BlockReader`
/// stay generic over `S: ByteStream` while still accepting that box.
impl ByteStream for Box<dyn ByteStream> {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        (**self).read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> Result<()> {
        (**self).write(buf)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn skip(&mut self, n: u64) -> Result<()> {
        (**self).skip(n)
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }

    fn is_seekable(&self) -> bool {
        (**self).is_seekable()
    }
}
