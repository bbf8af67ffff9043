//! Legacy (pre-`BlockHeader`) compressed-chunk framing (`spec.md`
//! §4.3 "Legacy (non-block) compression", §6 "Legacy block framing").
//!
//! Older file versions that still wanted compression but predate the
//! 16-byte [`crate::block::BlockHeader`] framing use a simpler
//! `{comp_length:u32, uncomp_length:u32}` big-endian pair ahead of
//! each compressed chunk; a `comp_length == 0` is the well-defined
//! EOF marker. There is only one logical stream here (no sidecar
//! pairing — sidecar data postdates this framing), so this is
//! `silk_io::block`'s write-accumulate/flush shape, minus the second
//! buffer and the `block_id`/`prev_block_length` bookkeeping.

use crate::compression::CompressionMethod;
use crate::error::{IoError, Result};
use crate::traits::ByteStream;

pub struct LegacyChunkWriter<S> {
    stream: S,
    compression: CompressionMethod,
    capacity: usize,
    buf: Vec<u8>,
    scratch: Vec<u8>,
}

impl<S: ByteStream> LegacyChunkWriter<S> {
    pub fn new(stream: S, compression: CompressionMethod, capacity: usize) -> Self {
        LegacyChunkWriter {
            stream,
            compression,
            capacity,
            buf: Vec::with_capacity(capacity),
            scratch: Vec::new(),
        }
    }

    pub fn write_record(&mut self, record: &[u8]) -> Result<()> {
        if self.buf.len() + record.len() > self.capacity {
            self.flush()?;
        }
        self.buf.extend_from_slice(record);
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return self.stream.flush();
        }
        let buf = std::mem::replace(&mut self.buf, Vec::with_capacity(self.capacity));
        let uncomp_length = buf.len() as u32;
        self.compression.compress(&buf, &mut self.scratch)?;
        self.stream.write(&(self.scratch.len() as u32).to_be_bytes())?;
        self.stream.write(&uncomp_length.to_be_bytes())?;
        self.stream.write(&self.scratch)?;
        self.stream.flush()
    }

    /// Flushes any pending data, writes the `comp_length == 0` EOF
    /// marker, closes the underlying stream, and hands it back.
    pub fn close(mut self) -> Result<S> {
        self.flush()?;
        self.stream.write(&0u32.to_be_bytes())?;
        self.stream.write(&0u32.to_be_bytes())?;
        self.stream.close()?;
        Ok(self.stream)
    }

    pub fn into_stream(self) -> S {
        self.stream
    }
}

pub struct LegacyChunkReader<S> {
    stream: S,
    compression: CompressionMethod,
    pending: Vec<u8>,
    pending_pos: usize,
    eof: bool,
}

impl<S: ByteStream> LegacyChunkReader<S> {
    pub fn new(stream: S, compression: CompressionMethod) -> Self {
        LegacyChunkReader {
            stream,
            compression,
            pending: Vec::new(),
            pending_pos: 0,
            eof: false,
        }
    }

    fn refill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let mut len_buf = [0u8; 4];
        match self.stream.read_exact(&mut len_buf) {
            Ok(()) => {}
            Err(IoError::Eof) => {
                self.eof = true;
                return Ok(false);
            }
            Err(e) => return Err(e),
        }
        let comp_length = u32::from_be_bytes(len_buf) as usize;
        let mut uncomp_buf = [0u8; 4];
        self.stream.read_exact(&mut uncomp_buf)?;
        let uncomp_length = u32::from_be_bytes(uncomp_buf) as usize;
        if comp_length == 0 {
            self.eof = true;
            return Ok(false);
        }
        let mut compressed = vec![0u8; comp_length];
        self.stream.read_exact(&mut compressed)?;
        self.pending.clear();
        self.compression
            .decompress(&compressed, uncomp_length, &mut self.pending)?;
        self.pending_pos = 0;
        Ok(true)
    }

    /// Reads exactly `record_length` bytes of decompressed record
    /// data, refilling across chunk boundaries transparently.
    /// Returns `Ok(None)` at the EOF marker.
    pub fn read_record(&mut self, record_length: usize) -> Result<Option<Vec<u8>>> {
        let mut out = Vec::with_capacity(record_length);
        while out.len() < record_length {
            if self.pending_pos >= self.pending.len() && !self.refill()? {
                if out.is_empty() {
                    return Ok(None);
                }
                return Err(IoError::ReadShort {
                    expected: record_length,
                    got: out.len(),
                });
            }
            let avail = self.pending.len() - self.pending_pos;
            let want = avail.min(record_length - out.len());
            out.extend_from_slice(&self.pending[self.pending_pos..self.pending_pos + want]);
            self.pending_pos += want;
        }
        Ok(Some(out))
    }

    pub fn into_stream(self) -> S {
        self.stream
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_buffer::BasicBuffer;
    use std::io::Cursor;

    #[test]
    fn round_trips_records_across_chunk_boundaries() {
        let mut w = LegacyChunkWriter::new(
            BasicBuffer::new(Cursor::new(Vec::new())),
            CompressionMethod::Zlib,
            16,
        );
        for i in 0u8..10 {
            w.write_record(&[i; 8]).unwrap();
        }
        let bytes = w.close().unwrap();

        let mut r = LegacyChunkReader::new(bytes, CompressionMethod::Zlib);
        for i in 0u8..10 {
            let rec = r.read_record(8).unwrap().unwrap();
            assert_eq!(rec, vec![i; 8]);
        }
        assert!(r.read_record(8).unwrap().is_none());
    }
}
