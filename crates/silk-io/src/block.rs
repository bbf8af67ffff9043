//! The block buffer (`spec.md` §4.3): framed, independently-compressed
//! groups of records (`DATA`) and sidecar bytes (`SIDECAR`), each
//! prefixed by a 16-byte [`BlockHeader`].

use crate::compression::CompressionMethod;
use crate::error::{IoError, Result};
use crate::traits::ByteStream;
use binrw::{BinRead, BinWrite};
use std::io::Cursor;

/// Block carries flow records.
pub const BLOCK_ID_DATA: u32 = 0x8000_0001;
/// Block carries per-record sidecar bytes, paired positionally with
/// the most recently flushed `DATA` block.
pub const BLOCK_ID_SIDECAR: u32 = 0x8000_0002;
/// Terminal marker block; has no payload.
pub const BLOCK_ID_END: u32 = 0xFEEB_DAED;

/// Refuse to decompress a block claiming an absurd uncompressed size;
/// this is a sanity ceiling against a corrupt or hostile file, not a
/// real capacity limit — `spec.md` §9 Open Question 3 leaves the
/// choice between a resizable buffer and a hard cap to the
/// implementation, and this crate resizes freely up to this ceiling.
const MAX_SANE_UNCOMPRESSED_LEN: usize = 64 * 1024 * 1024;

/// On-disk 16-byte block frame header. All four fields are big-endian
/// `u32`s per `spec.md` §6.
#[derive(BinRead, BinWrite, Debug, Clone, Copy, PartialEq, Eq)]
#[brw(big)]
pub struct BlockHeader {
    pub block_id: u32,
    /// On-disk byte count, header included.
    pub block_length: u32,
    /// `block_length` of the previous block written to this file,
    /// regardless of stream (`DATA` or `SIDECAR`); `0` for the first
    /// block.
    pub prev_block_length: u32,
    /// Payload byte count after decompression.
    pub uncompressed_length: u32,
}

impl BlockHeader {
    pub const SIZE: usize = 16;

    fn read_from(bytes: [u8; Self::SIZE]) -> Result<Self> {
        let mut cur = Cursor::new(bytes);
        BlockHeader::read(&mut cur).map_err(|e| IoError::BlockUncompress(e.to_string()))
    }

    fn write_to(&self) -> Result<[u8; Self::SIZE]> {
        let mut buf = [0u8; Self::SIZE];
        let mut cur = Cursor::new(&mut buf[..]);
        self.write(&mut cur)
            .map_err(|e| IoError::BlockUncompress(e.to_string()))?;
        Ok(buf)
    }
}

/// Writes `DATA`/`SIDECAR` blocks to an underlying [`ByteStream`],
/// accumulating record bytes until a caller-chosen flush point (or
/// until the accumulation buffer is full).
pub struct BlockWriter<S> {
    stream: S,
    compression: CompressionMethod,
    capacity: usize,
    data_buf: Vec<u8>,
    sidecar_buf: Vec<u8>,
    prev_block_length: u32,
    scratch: Vec<u8>,
    carries_sidecar: bool,
}

impl<S: ByteStream> BlockWriter<S> {
    /// A writer that never frames sidecar entries at all (the `SIDECAR`
    /// stream is never written, matching a stream with no sidecar
    /// schema attached).
    pub fn new(stream: S, compression: CompressionMethod, capacity: usize) -> Self {
        Self::with_sidecar(stream, compression, capacity, false)
    }

    /// A writer whose `SIDECAR` stream is length-delimited per entry
    /// (`spec.md` §4.3: "Nth sidecar entry matches the Nth record in
    /// the preceding DATA block"). Set `carries_sidecar` whenever the
    /// file's header declares a sidecar schema, so every record —
    /// even one with no sidecar bytes of its own — gets a positional
    /// entry the reader can line back up against the data stream.
    pub fn with_sidecar(stream: S, compression: CompressionMethod, capacity: usize, carries_sidecar: bool) -> Self {
        BlockWriter {
            stream,
            compression,
            capacity,
            data_buf: Vec::with_capacity(capacity),
            sidecar_buf: Vec::with_capacity(capacity),
            prev_block_length: 0,
            scratch: Vec::new(),
            carries_sidecar,
        }
    }

    /// Appends one record's bytes (and, if present, its sidecar
    /// bytes) to the accumulation buffers, flushing first if either
    /// would overflow its buffer's capacity. `spec.md` §4.3's
    /// invariant that a record and its sidecar never straddle a block
    /// boundary holds because both buffers are flushed together.
    ///
    /// When `carries_sidecar` is set, every record contributes a
    /// 4-byte big-endian length prefix to the sidecar stream (zero for
    /// a record with no sidecar bytes), so a multi-record block's
    /// sidecar entries stay positionally splittable
    /// ([`split_sidecar_entries`]) even when record 2..N's sidecar
    /// lengths differ from record 1's.
    pub fn write_record(&mut self, record: &[u8], sidecar: Option<&[u8]>) -> Result<()> {
        let sidecar_len = sidecar.map_or(0, <[u8]>::len);
        let sidecar_entry_len = if self.carries_sidecar { 4 + sidecar_len } else { 0 };
        if self.data_buf.len() + record.len() > self.capacity
            || self.sidecar_buf.len() + sidecar_entry_len > self.capacity
        {
            self.flush()?;
        }
        self.data_buf.extend_from_slice(record);
        if self.carries_sidecar {
            self.sidecar_buf
                .extend_from_slice(&(sidecar_len as u32).to_be_bytes());
            if let Some(sc) = sidecar {
                self.sidecar_buf.extend_from_slice(sc);
            }
        }
        Ok(())
    }

    /// Flushes the current data block, then the current sidecar block
    /// if it has any content, in that write order (`spec.md` §4.3).
    pub fn flush(&mut self) -> Result<()> {
        if !self.data_buf.is_empty() {
            self.write_block(BLOCK_ID_DATA)?;
        }
        if !self.sidecar_buf.is_empty() {
            self.write_block(BLOCK_ID_SIDECAR)?;
        }
        self.stream.flush()
    }

    fn write_block(&mut self, id: u32) -> Result<()> {
        let buf = if id == BLOCK_ID_DATA {
            std::mem::take(&mut self.data_buf)
        } else {
            std::mem::take(&mut self.sidecar_buf)
        };
        let uncompressed_length = buf.len() as u32;
        self.compression.compress(&buf, &mut self.scratch)?;
        let block_length = (BlockHeader::SIZE + self.scratch.len()) as u32;
        let header = BlockHeader {
            block_id: id,
            block_length,
            prev_block_length: self.prev_block_length,
            uncompressed_length,
        };
        self.stream.write(&header.write_to()?)?;
        self.stream.write(&self.scratch)?;
        log::debug!(
            "flushed block id={id:#010x} length={block_length} uncompressed={uncompressed_length}"
        );
        self.prev_block_length = block_length;
        // restore capacity for the next round of accumulation
        if id == BLOCK_ID_DATA {
            self.data_buf = Vec::with_capacity(self.capacity);
        } else {
            self.sidecar_buf = Vec::with_capacity(self.capacity);
        }
        Ok(())
    }

    /// Flushes any pending data, then writes the terminal `END`
    /// marker block (header only, no payload), closes the underlying
    /// stream, and hands it back.
    pub fn close(mut self) -> Result<S> {
        self.flush()?;
        let header = BlockHeader {
            block_id: BLOCK_ID_END,
            block_length: BlockHeader::SIZE as u32,
            prev_block_length: self.prev_block_length,
            uncompressed_length: 0,
        };
        self.stream.write(&header.write_to()?)?;
        self.stream.close()?;
        Ok(self.stream)
    }

    pub fn into_stream(self) -> S {
        self.stream
    }
}

/// Reads `DATA`/`SIDECAR` blocks from an underlying [`ByteStream`].
pub struct BlockReader<S> {
    stream: S,
    compression: CompressionMethod,
    pending_header: Option<BlockHeader>,
}

impl<S: ByteStream> BlockReader<S> {
    pub fn new(stream: S, compression: CompressionMethod) -> Self {
        BlockReader {
            stream,
            compression,
            pending_header: None,
        }
    }

    fn read_header(&mut self) -> Result<BlockHeader> {
        let mut raw = [0u8; BlockHeader::SIZE];
        match self.stream.read_exact(&mut raw) {
            Ok(()) => {}
            Err(IoError::Eof) => return Err(IoError::BlockShortHeader(0)),
            Err(e) => return Err(e),
        }
        let header = BlockHeader::read_from(raw)?;
        if (header.block_length as usize) < BlockHeader::SIZE {
            return Err(IoError::BlockInvalidLen(header.block_length));
        }
        Ok(header)
    }

    fn read_body(&mut self, header: &BlockHeader) -> Result<Vec<u8>> {
        let payload_len = header.block_length as usize - BlockHeader::SIZE;
        let mut compressed = vec![0u8; payload_len];
        self.stream.read_exact(&mut compressed).map_err(|e| match e {
            IoError::Eof => IoError::BlockIncomplete {
                expected: payload_len,
                got: 0,
            },
            other => other,
        })?;
        let uncompressed_len = header.uncompressed_length as usize;
        if uncompressed_len > MAX_SANE_UNCOMPRESSED_LEN {
            return Err(IoError::BadCompressionSize(uncompressed_len));
        }
        let mut out = Vec::new();
        self.compression
            .decompress(&compressed, uncompressed_len, &mut out)?;
        Ok(out)
    }

    fn skip_body(&mut self, header: &BlockHeader) -> Result<()> {
        let payload_len = (header.block_length as usize - BlockHeader::SIZE) as u64;
        self.stream.skip(payload_len)
    }

    /// Reads and decodes the next block whose id equals `wanted`.
    /// Returns `Ok(None)` at the `END` marker. On an id mismatch,
    /// returns [`IoError::BlockWantedId`] without discarding the
    /// unexpected block's payload; the caller must then call
    /// [`BlockReader::skip_pending`] before retrying, or
    /// [`BlockReader::take_pending`] to consume it as the other kind.
    pub fn read_matching(&mut self, wanted: u32) -> Result<Option<Vec<u8>>> {
        let header = match self.pending_header.take() {
            Some(h) => h,
            None => self.read_header()?,
        };
        if header.block_id == BLOCK_ID_END {
            return Ok(None);
        }
        if header.block_id != wanted {
            self.pending_header = Some(header);
            return Err(IoError::BlockWantedId {
                wanted,
                found: header.block_id,
            });
        }
        self.read_body(&header).map(Some)
    }

    /// Discards the payload of a pending mismatched block recorded by
    /// [`BlockReader::read_matching`], so the next `read_matching`
    /// call advances to the block after it.
    pub fn skip_pending(&mut self) -> Result<()> {
        if let Some(header) = self.pending_header.take() {
            self.skip_body(&header)?;
        }
        Ok(())
    }

    /// Consumes and decodes a pending mismatched block directly
    /// (used when the caller actually wants the other stream, e.g.
    /// it asked for `DATA` but got `SIDECAR` and wants to read the
    /// sidecar payload instead of skipping it).
    pub fn take_pending(&mut self) -> Result<Option<Vec<u8>>> {
        match self.pending_header.take() {
            Some(header) if header.block_id == BLOCK_ID_END => Ok(None),
            Some(header) => self.read_body(&header).map(Some),
            None => Ok(None),
        }
    }

    pub fn into_stream(self) -> S {
        self.stream
    }
}

/// Splits a decoded `SIDECAR` block payload back into its per-record
/// entries, inverting the 4-byte big-endian length prefix
/// [`BlockWriter::write_record`] puts ahead of each record's sidecar
/// bytes. A zero-length entry decodes to `None`: that record had no
/// sidecar bytes of its own.
pub fn split_sidecar_entries(bytes: &[u8]) -> Result<Vec<Option<Vec<u8>>>> {
    let mut out = Vec::new();
    let mut pos = 0usize;
    while pos < bytes.len() {
        let len_bytes = bytes.get(pos..pos + 4).ok_or(IoError::BlockIncomplete {
            expected: pos + 4,
            got: bytes.len(),
        })?;
        let len = u32::from_be_bytes(len_bytes.try_into().unwrap()) as usize;
        pos += 4;
        let entry = bytes.get(pos..pos + len).ok_or(IoError::BlockIncomplete {
            expected: pos + len,
            got: bytes.len(),
        })?;
        out.push(if len == 0 { None } else { Some(entry.to_vec()) });
        pos += len;
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic_buffer::BasicBuffer;
    use std::io::Cursor;

    fn writer(compression: CompressionMethod) -> BlockWriter<BasicBuffer<Cursor<Vec<u8>>>> {
        BlockWriter::with_sidecar(
            BasicBuffer::new(Cursor::new(Vec::new())),
            compression,
            4096,
            true,
        )
    }

    #[test]
    fn prev_block_length_chains_across_flushes() {
        let mut w = writer(CompressionMethod::None);
        w.write_record(b"aaaa", None).unwrap();
        w.flush().unwrap();
        let first_len = w.prev_block_length;
        assert!(first_len > 0);
        w.write_record(b"bbbbbbbb", None).unwrap();
        w.flush().unwrap();
        assert_ne!(w.prev_block_length, first_len);
    }

    #[test]
    fn reader_sees_data_then_sidecar_then_end() {
        let mut w = writer(CompressionMethod::None);
        w.write_record(b"rec", Some(b"sc")).unwrap();
        let bytes = w.close().unwrap();

        let mut r = BlockReader::new(bytes, CompressionMethod::None);
        let data = r.read_matching(BLOCK_ID_DATA).unwrap().unwrap();
        assert_eq!(data, b"rec");

        let sidecar = r.read_matching(BLOCK_ID_SIDECAR).unwrap().unwrap();
        let entries = split_sidecar_entries(&sidecar).unwrap();
        assert_eq!(entries, vec![Some(b"sc".to_vec())]);

        let eof = r.read_matching(BLOCK_ID_DATA).unwrap();
        assert!(eof.is_none());
    }

    #[test]
    fn unexpected_block_id_must_be_skipped_before_retry() {
        let mut w = writer(CompressionMethod::None);
        w.write_record(b"rec", Some(b"sc")).unwrap();
        let bytes = w.close().unwrap();

        let mut r = BlockReader::new(bytes, CompressionMethod::None);
        // ask for SIDECAR first; DATA comes first on disk, so this
        // must fail with BlockWantedId rather than silently skipping.
        let err = r.read_matching(BLOCK_ID_SIDECAR).unwrap_err();
        assert!(matches!(err, IoError::BlockWantedId { .. }));
        r.skip_pending().unwrap();
        let sidecar = r.read_matching(BLOCK_ID_SIDECAR).unwrap().unwrap();
        let entries = split_sidecar_entries(&sidecar).unwrap();
        assert_eq!(entries, vec![Some(b"sc".to_vec())]);
    }

    #[test]
    fn split_sidecar_entries_recovers_mixed_empty_and_non_empty_records() {
        let mut w = writer(CompressionMethod::None);
        w.write_record(b"rec1", Some(b"abc")).unwrap();
        w.write_record(b"rec2", None).unwrap();
        w.write_record(b"rec3", Some(b"xy")).unwrap();
        w.flush().unwrap();

        let mut r = BlockReader::new(w.into_stream(), CompressionMethod::None);
        let _ = r.read_matching(BLOCK_ID_DATA).unwrap().unwrap();
        let sidecar = r.read_matching(BLOCK_ID_SIDECAR).unwrap().unwrap();
        let entries = split_sidecar_entries(&sidecar).unwrap();
        assert_eq!(
            entries,
            vec![Some(b"abc".to_vec()), None, Some(b"xy".to_vec())]
        );
    }
}
