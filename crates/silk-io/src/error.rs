//! Errors produced by the byte-level and block-level I/O layers.
//!
//! Roughly `spec.md` §7's `Sys*` / `Read / Write / ReadShort / Eof` /
//! `Block*` / `Compress*` / friction-and-policy rows. State-machine
//! violations (`Closed`, `NotOpen`, ...) belong to `silk::Error`, one
//! layer up, since only the stream knows its own lifecycle.

use crate::compression::CompressionMethod;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum IoError {
    /// An errno-bearing OS call failed (open/lseek/fdopen/mkstemp/
    /// fcntl/pipe/fork/ftruncate in the original's taxonomy; here a
    /// single variant wraps whatever `std::io::Error` the OS returned,
    /// since Rust does not split these by syscall name).
    #[error("system I/O error: {0}")]
    Sys(#[from] std::io::Error),

    #[error("short read: expected {expected} bytes, got {got}")]
    ReadShort { expected: usize, got: usize },

    #[error("unexpected end of stream")]
    Eof,

    #[error("stream is not seekable")]
    NotSeekable,

    #[error("line exceeded the maximum buffered length")]
    LongLine,

    #[error("refusing to overwrite an existing regular file (set SILK_CLOBBER to allow)")]
    FileExists,

    #[error("cannot open a binary stream bound to a terminal")]
    IsTerminal,

    #[error("no pager is available for text output")]
    NoPager,

    #[error("block header is truncated: got {0} of 16 bytes")]
    BlockShortHeader(usize),

    #[error("block payload incomplete: expected {expected} bytes, got {got}")]
    BlockIncomplete { expected: usize, got: usize },

    #[error("block declares an invalid length {0}")]
    BlockInvalidLen(u32),

    #[error("unrecognized block id {0:#010x}")]
    BlockUnknownId(u32),

    #[error("wanted block id {wanted:#010x}, found {found:#010x}")]
    BlockWantedId { wanted: u32, found: u32 },

    #[error("failed to decompress block payload: {0}")]
    BlockUncompress(String),

    #[error("declared uncompressed length {0} exceeds the block buffer's capacity")]
    BadCompressionSize(usize),

    #[error("compression method {0:?} is not available in this build")]
    CompressUnavailable(CompressionMethod),

    #[error("invalid compression method id {0}")]
    CompressInvalid(u8),
}

pub type Result<T> = std::result::Result<T, IoError>;
