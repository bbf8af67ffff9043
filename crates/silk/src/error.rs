//! The aggregate error type for the `silk` crate: state-machine
//! violations and stream-lifecycle policy errors (`spec.md` §7) that
//! belong one layer above `silk-io`/`silk-codec`/`silk-schema`, plus
//! `#[from]` wiring to every lower-layer error so a caller only ever
//! has to match on one enum.
//!
//! Mirrors the teacher's per-crate error (`SmbMsgError`/
//! `TransportError`) aggregated by a root `smb::Error` with `#[from]`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // ---- state machine ---------------------------------------------------
    #[error("required argument was null/empty")]
    NullArgument,
    #[error("stream is closed")]
    Closed,
    #[error("stream is not open")]
    NotOpen,
    #[error("a path or descriptor has already been bound to this stream")]
    PrevBound,
    #[error("this stream has already been opened")]
    PrevOpen,
    #[error("records have already been read or written on this stream")]
    PrevData,
    #[error("a copy-input stream was already attached")]
    PrevCopyInput,

    // ---- capability mismatches --------------------------------------------
    #[error("I/O mode {0:?} is not supported for this operation")]
    UnsupportedIoMode(crate::content::Mode),
    #[error("content type {0:?} does not support this operation")]
    UnsupportedContent(crate::content::StreamContent),
    #[error("unsupported file format: {0}")]
    UnsupportedFormat(String),
    #[error("unsupported record format version {0}")]
    UnsupportedVersion(u8),
    #[error("this codec cannot represent a genuine IPv6 address")]
    UnsupportedIpv6,

    // ---- friction / policy -------------------------------------------------
    #[error("cannot open a binary stream bound to a terminal")]
    IsTerminal,
    #[error("refusing to overwrite an existing regular file (set SILK_CLOBBER to allow)")]
    FileExists,
    #[error("stream is not seekable")]
    NotSeekable,
    #[error("line exceeded the maximum buffered length")]
    LongLine,
    #[error("no pager is available for text output")]
    NoPager,

    // ---- schema lifecycle (surfaced at this layer too, e.g. a stream's
    //      sidecar-schema header entry is frozen once the header is
    //      written) --------------------------------------------------------
    #[error("object is frozen and can no longer be modified")]
    Frozen,
    #[error("object must be frozen before use")]
    NotFrozen,
    #[error("no schema is attached")]
    NoSchema,

    #[error("out of memory")]
    Alloc,

    // ---- lower layers -------------------------------------------------------
    #[error(transparent)]
    Io(#[from] silk_io::IoError),
    #[error(transparent)]
    Codec(#[from] silk_codec::CodecError),
    #[error(transparent)]
    Schema(#[from] silk_schema::SchemaError),
    #[error(transparent)]
    Dtyp(#[from] silk_dtyp::DtypError),
    #[error("binary layout error: {0}")]
    Binrw(#[from] binrw::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
