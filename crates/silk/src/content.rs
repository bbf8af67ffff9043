//! [`Mode`] and [`StreamContent`]: the sum types that replace the
//! original's pointer-heavy inheritance-by-struct-prefix
//! (`silk_hdr`/`silkflow`/codec callbacks) — `spec.md` §9: "model as a
//! sum type `StreamContent ∈ {Text, OtherBinary, Silk{header},
//! SilkFlow{header, codec}}`".

use crate::header::FileHeader;
use silk_codec::codec::FormatId;

/// How a [`crate::stream::FlowStream`] was opened (`spec.md` §4.1
/// `create(mode, content)`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Read,
    Write,
    Append,
}

/// What kind of bytes a stream carries (`spec.md` §4.1). `Append` is
/// rejected for `Text` and `OtherBinary` by
/// [`crate::stream::FlowStream::create`].
#[derive(Debug, Default)]
pub enum StreamContent {
    /// Line-oriented text; no silk header at all.
    #[default]
    Text,
    /// Arbitrary binary data with no silk header.
    OtherBinary,
    /// A silk file header, but not dispatched to a flow-record codec
    /// (used by callers that just want the header-plus-framing
    /// machinery without per-record semantics this crate defines).
    Silk { header: Option<FileHeader> },
    /// A silk file header whose format id is bound to a
    /// [`silk_codec::Codec`] that packs/unpacks [`silk_codec::FlowRecord`]s
    /// (`spec.md` §4.1 "dispatch on file format to bind a record
    /// codec").
    SilkFlow {
        header: Option<FileHeader>,
        format: Option<FormatId>,
    },
}

impl StreamContent {
    pub fn is_flow(&self) -> bool {
        matches!(self, StreamContent::SilkFlow { .. })
    }

    pub fn has_header(&self) -> bool {
        matches!(self, StreamContent::Silk { .. } | StreamContent::SilkFlow { .. })
    }

    pub fn header(&self) -> Option<&FileHeader> {
        match self {
            StreamContent::Silk { header } => header.as_ref(),
            StreamContent::SilkFlow { header, .. } => header.as_ref(),
            _ => None,
        }
    }

    pub fn header_mut(&mut self) -> Option<&mut FileHeader> {
        match self {
            StreamContent::Silk { header } => header.as_mut(),
            StreamContent::SilkFlow { header, .. } => header.as_mut(),
            _ => None,
        }
    }
}
