//! Versioned, compressible flow-record I/O: file headers, record
//! framing (raw, legacy-chunked, block-buffered), and the codecs that
//! pack/unpack the historical on-disk record formats.
//!
//! [`stream::FlowStream`] is the entry point most callers want —
//! `create`/`bind`/`open` a stream, then `read_record`/`write_record`
//! to move flow records, `close` to tear it down. The rest of this
//! crate (header parsing, runtime configuration, content/mode
//! plumbing) backs that type without needing to be touched directly.

#![forbid(unsafe_code)]

pub mod config;
pub mod content;
pub mod error;
pub mod header;
pub mod stream;

pub use config::{IcmpSportHandler, Ipv6Policy, RuntimeConfig};
pub use content::{Mode, StreamContent};
pub use error::{Error, Result};
pub use header::{ByteOrder, FileHeader, HeaderEntry, HeaderState};
pub use stream::{CompressionChoice, FlowStream};

pub use silk_codec::{Codec, CodecContext, FlowAddr, FlowRecord, FormatId, Registry, TcpState};
pub use silk_io::CompressionMethod;
