//! Buffered stream, compressed-block, and compression-method plumbing
//! for silk flow-record files (`spec.md` §4.3, §4.4).
//!
//! This crate is the bottom of the dependency order in `spec.md` §2:
//! it knows nothing about flow records, schemas, or file headers —
//! only about framing and compressing bytes. `silk` (the top crate)
//! builds `FlowStream` on top of [`basic_buffer::BasicBuffer`],
//! [`gzip_buffer::GzipBuffer`], and [`block::BlockWriter`]/
//! [`block::BlockReader`].

#![forbid(unsafe_code)]

pub mod basic_buffer;
pub mod block;
pub mod compression;
pub mod error;
pub mod gzip_buffer;
pub mod legacy_chunk;
pub mod traits;

pub use basic_buffer::{BasicBuffer, NonSeekable};
pub use block::{BlockHeader, BlockReader, BlockWriter, BLOCK_ID_DATA, BLOCK_ID_END, BLOCK_ID_SIDECAR};
pub use compression::CompressionMethod;
pub use error::{IoError, Result};
pub use gzip_buffer::GzipBuffer;
pub use legacy_chunk::{LegacyChunkReader, LegacyChunkWriter};
pub use traits::ByteStream;
