//! The historical flow-record codec family: one [`codec::Codec`]
//! implementation per (format, version) pair, dispatched through
//! [`codec::Registry`], plus the format-independent [`record::FlowRecord`]
//! every codec packs into and unpacks from.
//!
//! `formats::*` holds the concrete on-disk layouts. Each is grounded
//! directly on a file under `original_source/silk-src/src/libsilk/`;
//! see that module's doc comments for the citation.

pub mod bitpack;
pub mod codec;
pub mod error;
pub mod formats;
pub mod record;

pub use codec::{Codec, CodecContext, FormatId, Registry};
pub use error::{CodecError, Result};
pub use record::{FlowAddr, FlowRecord, TcpState};
