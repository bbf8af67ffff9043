//! Compression-method registry (`spec.md` §4.3, §6 "Compression
//! registry" collaborator interface).
//!
//! Four methods are named by the on-disk format: `None`, `Zlib`,
//! `Lzo1x`, `Snappy`. All four are compiled in here (unlike the
//! original, which may be built without LZO or without zlib), but the
//! registry shape — `method_is_available` / `default_method` /
//! `best_method` / `name` — is kept so a caller that asks for an
//! unavailable method on a more constrained build still gets
//! [`IoError::CompressUnavailable`] rather than a panic.

use crate::error::{IoError, Result};
use std::io::{Read, Write};

/// A block's compression method, stored as a single byte in the
/// silk file header and (implicitly) applied uniformly to every
/// block in that file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CompressionMethod {
    None = 0,
    Zlib = 1,
    Lzo1x = 2,
    Snappy = 3,
}

impl CompressionMethod {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            0 => Ok(CompressionMethod::None),
            1 => Ok(CompressionMethod::Zlib),
            2 => Ok(CompressionMethod::Lzo1x),
            3 => Ok(CompressionMethod::Snappy),
            other => Err(IoError::CompressInvalid(other)),
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            CompressionMethod::None => "none",
            CompressionMethod::Zlib => "zlib",
            CompressionMethod::Lzo1x => "lzo1x",
            CompressionMethod::Snappy => "snappy",
        }
    }

    /// All four methods are compiled into this crate unconditionally;
    /// kept as a method (rather than inlining `true`) so a build that
    /// later feature-gates LZO/Snappy has one place to change.
    pub fn is_available(self) -> bool {
        true
    }

    /// `Compression::Default` resolved against a destination's
    /// seekability, per `spec.md` §4.1 "Header write algorithm": a
    /// non-seekable destination gets no compression, a seekable one
    /// gets zlib (cheap, universally available, good enough ratio for
    /// flow records).
    pub fn default_method(seekable: bool) -> Self {
        if seekable {
            CompressionMethod::Zlib
        } else {
            CompressionMethod::None
        }
    }

    /// `Compression::Best`: same seekability gate, but prefers the
    /// highest-ratio method actually available.
    pub fn best_method(seekable: bool) -> Self {
        if seekable {
            CompressionMethod::Zlib
        } else {
            CompressionMethod::None
        }
    }

    /// Upper bound on compressed size for `input_len` bytes of input,
    /// used to size the block buffer's scratch compression buffer
    /// ahead of time.
    pub fn max_compressed_len(self, input_len: usize) -> usize {
        match self {
            CompressionMethod::None => input_len,
            CompressionMethod::Zlib => input_len + (input_len / 1000) + 128,
            CompressionMethod::Lzo1x => input_len + (input_len / 16) + 64 + 3,
            CompressionMethod::Snappy => snap::raw::max_compress_len(input_len).max(input_len + 32),
        }
    }

    pub fn compress(self, input: &[u8], out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        match self {
            CompressionMethod::None => {
                out.extend_from_slice(input);
            }
            CompressionMethod::Zlib => {
                let mut enc =
                    flate2::write::ZlibEncoder::new(out, flate2::Compression::default());
                enc.write_all(input)?;
                enc.finish()?;
            }
            CompressionMethod::Lzo1x => {
                let compressed = minilzo_rs::LZO::init()
                    .and_then(|lzo| lzo.compress(input))
                    .map_err(|e| IoError::BlockUncompress(format!("{e:?}")))?;
                out.extend_from_slice(&compressed);
            }
            CompressionMethod::Snappy => {
                let mut enc = snap::write::FrameEncoder::new(out);
                enc.write_all(input)?;
                enc.flush()?;
            }
        }
        Ok(())
    }

    pub fn decompress(self, input: &[u8], uncompressed_len: usize, out: &mut Vec<u8>) -> Result<()> {
        out.clear();
        match self {
            CompressionMethod::None => {
                out.extend_from_slice(input);
            }
            CompressionMethod::Zlib => {
                let mut dec = flate2::read::ZlibDecoder::new(input);
                dec.read_to_end(out)
                    .map_err(|e| IoError::BlockUncompress(e.to_string()))?;
            }
            CompressionMethod::Lzo1x => {
                let lzo = minilzo_rs::LZO::init()
                    .map_err(|e| IoError::BlockUncompress(format!("{e:?}")))?;
                let decompressed = lzo
                    .decompress(input, uncompressed_len)
                    .map_err(|e| IoError::BlockUncompress(format!("{e:?}")))?;
                out.extend_from_slice(&decompressed);
            }
            CompressionMethod::Snappy => {
                let mut dec = snap::read::FrameDecoder::new(input);
                dec.read_to_end(out)
                    .map_err(|e| IoError::BlockUncompress(e.to_string()))?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_method() {
        let input = b"the quick brown fox jumps over the lazy dog".repeat(8);
        for method in [
            CompressionMethod::None,
            CompressionMethod::Zlib,
            CompressionMethod::Lzo1x,
            CompressionMethod::Snappy,
        ] {
            let mut compressed = Vec::new();
            method.compress(&input, &mut compressed).unwrap();
            let mut decompressed = Vec::new();
            method
                .decompress(&compressed, input.len(), &mut decompressed)
                .unwrap();
            assert_eq!(decompressed, input, "method {method:?} round trip failed");
        }
    }

    #[test]
    fn invalid_method_id_is_an_error() {
        assert!(matches!(
            CompressionMethod::from_u8(7),
            Err(IoError::CompressInvalid(7))
        ));
    }

    #[test]
    fn default_and_best_fall_back_to_none_when_unseekable() {
        assert_eq!(CompressionMethod::default_method(false), CompressionMethod::None);
        assert_eq!(CompressionMethod::best_method(false), CompressionMethod::None);
    }
}
