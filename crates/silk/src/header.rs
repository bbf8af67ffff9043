//! [`FileHeader`]: the fixed-prefix-plus-entry-chain silk file header
//! (`spec.md` §3 "FileHeader", §6 "File format, fixed prefix").
//!
//! The fixed prefix is always written/read big-endian regardless of
//! the record byte order it declares — a reader has to be able to
//! parse the prefix *before* it knows which order the records
//! themselves use. Entries following the prefix are a generic
//! `{entry_type:u32, entry_length:u32, body}` chain terminated by an
//! `entry_type == 0`, matching `original_source/skstream_priv.h`'s
//! header-entry typing (`SPEC_FULL.md`'s Supplemented Features #3).

use crate::error::{Error, Result};
use binrw::{BinRead, BinWrite};
use silk_io::ByteStream;
use std::io::Cursor;

/// Size of the fixed prefix, in bytes: magic(4) + byte_order(1) +
/// file_version(1) + compression(1) + file_format_id(1) +
/// record_version(1) + header_length(2) + record_length(2). A reader
/// has to know this before it has parsed anything else, since it's
/// what tells it where the entry chain starts.
pub const FIXED_PREFIX_LEN: usize = 4 + 1 + 1 + 1 + 1 + 1 + 2 + 2;

/// Fixed magic number every silk file begins with.
pub const MAGIC: u32 = 0xDEAD_BEEF;

/// `spec.md` §6: "file-version byte (0 legacy ... BlockHeader = 16 in
/// our numbering)". Only the two endpoints of the original's version
/// range are meaningful to this crate's framing logic: everything
/// below `BlockHeader` uses the legacy `{comp_length, uncomp_length}`
/// block pair (`spec.md` §4.3 "Legacy (non-block) compression"),
/// `BlockHeader` switches to the 16-byte block-buffer framing.
pub const FILE_VERSION_LEGACY_MIN: u8 = 0;
pub const FILE_VERSION_BLOCK_HEADER: u8 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteOrder {
    Big,
    Little,
}

impl ByteOrder {
    fn to_byte(self) -> u8 {
        match self {
            ByteOrder::Big => b'B',
            ByteOrder::Little => b'L',
        }
    }

    fn from_byte(b: u8) -> Result<Self> {
        match b {
            b'B' => Ok(ByteOrder::Big),
            b'L' => Ok(ByteOrder::Little),
            other => Err(Error::UnsupportedFormat(format!(
                "unrecognized byte-order flag {other:#04x}"
            ))),
        }
    }

    /// The host's native byte order, used to decide whether a codec's
    /// `swap_in_place` must run on read/write (`spec.md` §4.1, §4.2).
    pub fn native() -> Self {
        if cfg!(target_endian = "little") {
            ByteOrder::Little
        } else {
            ByteOrder::Big
        }
    }
}

/// One header-entry kind (`spec.md` §3 FileHeader, `SPEC_FULL.md`
/// Supplemented Features #3). Probename/annotation/invocation are
/// pure pass-through byte blobs from this crate's point of view — no
/// semantic interpretation, consistent with `spec.md` §1's "external
/// collaborators" boundary — so they're carried as opaque strings
/// rather than parsed further.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderEntry {
    /// Packedfile entry: the hour boundary (ms since epoch) this
    /// file's records' hour-relative start times are offset from,
    /// plus the sensor id and flowtype id every record in the file
    /// shares (`silk_codec::CodecContext`).
    Packedfile {
        hour_start_ms: i64,
        sensor_id: u16,
        flow_type: u8,
    },
    Probename(String),
    Annotation(String),
    /// The command line the file was produced by, stored verbatim
    /// (never re-parsed — `spec.md` §1).
    Invocation(String),
    /// Opaque serialized sidecar schema, produced and consumed by the
    /// sidecar codec collaborator (`spec.md` §6); this crate only
    /// carries the bytes.
    SidecarSchema(Vec<u8>),
    /// Any entry type this crate doesn't know the shape of is kept
    /// verbatim so a file round-trips even through entry kinds this
    /// version of the crate doesn't interpret.
    Unknown { entry_type: u32, body: Vec<u8> },
}

const ENTRY_TYPE_TERMINATOR: u32 = 0;
const ENTRY_TYPE_PACKEDFILE: u32 = 1;
const ENTRY_TYPE_PROBENAME: u32 = 2;
const ENTRY_TYPE_ANNOTATION: u32 = 3;
const ENTRY_TYPE_INVOCATION: u32 = 4;
const ENTRY_TYPE_SIDECAR_SCHEMA: u32 = 5;

#[derive(BinRead, BinWrite)]
#[brw(big)]
struct PackedfileBody {
    hour_start_ms: i64,
    sensor_id: u16,
    flow_type: u8,
}

impl HeaderEntry {
    fn entry_type(&self) -> u32 {
        match self {
            HeaderEntry::Packedfile { .. } => ENTRY_TYPE_PACKEDFILE,
            HeaderEntry::Probename(_) => ENTRY_TYPE_PROBENAME,
            HeaderEntry::Annotation(_) => ENTRY_TYPE_ANNOTATION,
            HeaderEntry::Invocation(_) => ENTRY_TYPE_INVOCATION,
            HeaderEntry::SidecarSchema(_) => ENTRY_TYPE_SIDECAR_SCHEMA,
            HeaderEntry::Unknown { entry_type, .. } => *entry_type,
        }
    }

    fn body(&self) -> Result<Vec<u8>> {
        Ok(match self {
            HeaderEntry::Packedfile {
                hour_start_ms,
                sensor_id,
                flow_type,
            } => {
                let mut buf = Vec::new();
                let body = PackedfileBody {
                    hour_start_ms: *hour_start_ms,
                    sensor_id: *sensor_id,
                    flow_type: *flow_type,
                };
                body.write(&mut Cursor::new(&mut buf))?;
                buf
            }
            HeaderEntry::Probename(s) | HeaderEntry::Annotation(s) | HeaderEntry::Invocation(s) => {
                s.as_bytes().to_vec()
            }
            HeaderEntry::SidecarSchema(b) | HeaderEntry::Unknown { body: b, .. } => b.clone(),
        })
    }

    fn from_parts(entry_type: u32, body: Vec<u8>) -> Result<Self> {
        Ok(match entry_type {
            ENTRY_TYPE_PACKEDFILE => {
                let parsed = PackedfileBody::read(&mut Cursor::new(&body))?;
                HeaderEntry::Packedfile {
                    hour_start_ms: parsed.hour_start_ms,
                    sensor_id: parsed.sensor_id,
                    flow_type: parsed.flow_type,
                }
            }
            ENTRY_TYPE_PROBENAME => HeaderEntry::Probename(String::from_utf8_lossy(&body).into_owned()),
            ENTRY_TYPE_ANNOTATION => HeaderEntry::Annotation(String::from_utf8_lossy(&body).into_owned()),
            ENTRY_TYPE_INVOCATION => HeaderEntry::Invocation(String::from_utf8_lossy(&body).into_owned()),
            ENTRY_TYPE_SIDECAR_SCHEMA => HeaderEntry::SidecarSchema(body),
            other => HeaderEntry::Unknown { entry_type: other, body },
        })
    }
}

/// Header lifecycle states (`spec.md` §3: "Header is locked after
/// write; reading transitions `Modifiable -> EntryOk -> Fixed`").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderState {
    Modifiable,
    EntryOk,
    Fixed,
}

/// The self-describing silk file header: fixed prefix plus entry
/// chain (`spec.md` §3, §6).
#[derive(Debug, Clone)]
pub struct FileHeader {
    pub byte_order: ByteOrder,
    pub file_version: u8,
    pub compression: silk_io::CompressionMethod,
    pub file_format_id: u8,
    pub record_version: u8,
    pub record_length: u16,
    entries: Vec<HeaderEntry>,
    state: HeaderState,
}

impl FileHeader {
    /// A fresh, modifiable header for writing. `record_length` of `0`
    /// means "let the codec's `prepare` step fill it in" (`spec.md`
    /// §4.1 "Header write algorithm").
    pub fn new(file_format_id: u8) -> Self {
        FileHeader {
            byte_order: ByteOrder::native(),
            file_version: FILE_VERSION_LEGACY_MIN,
            compression: silk_io::CompressionMethod::None,
            file_format_id,
            record_version: 0,
            record_length: 0,
            entries: Vec::new(),
            state: HeaderState::Modifiable,
        }
    }

    pub fn state(&self) -> HeaderState {
        self.state
    }

    pub fn is_block_framed(&self) -> bool {
        self.file_version >= FILE_VERSION_BLOCK_HEADER
    }

    pub fn entries(&self) -> &[HeaderEntry] {
        &self.entries
    }

    pub fn sidecar_schema(&self) -> Option<&[u8]> {
        self.entries.iter().find_map(|e| match e {
            HeaderEntry::SidecarSchema(bytes) => Some(bytes.as_slice()),
            _ => None,
        })
    }

    pub fn packedfile(&self) -> Option<(i64, u16, u8)> {
        self.entries.iter().find_map(|e| match e {
            HeaderEntry::Packedfile {
                hour_start_ms,
                sensor_id,
                flow_type,
            } => Some((*hour_start_ms, *sensor_id, *flow_type)),
            _ => None,
        })
    }

    /// Appends an entry. Rejected once the header has left
    /// `Modifiable` (`spec.md` §3 lifecycle).
    pub fn push_entry(&mut self, entry: HeaderEntry) -> Result<()> {
        if self.state != HeaderState::Modifiable {
            return Err(Error::Frozen);
        }
        if matches!(entry, HeaderEntry::SidecarSchema(_)) {
            // Carrying a sidecar entry upgrades the file to
            // block-framed, since only the block buffer's parallel
            // SIDECAR stream can carry per-record sidecar data
            // (`spec.md` §4.1 "Header write algorithm").
            self.file_version = self.file_version.max(FILE_VERSION_BLOCK_HEADER);
        }
        self.entries.push(entry);
        Ok(())
    }

    /// Serializes the fixed prefix and entry chain to bytes. Locks
    /// the header to [`HeaderState::Fixed`].
    pub fn write_to(&mut self, out: &mut Vec<u8>) -> Result<()> {
        out.extend_from_slice(&MAGIC.to_be_bytes());
        out.push(self.byte_order.to_byte());
        out.push(self.file_version);
        out.push(self.compression.as_u8());
        out.push(self.file_format_id);
        out.push(self.record_version);

        let mut entry_bytes = Vec::new();
        for entry in &self.entries {
            let body = entry.body()?;
            entry_bytes.extend_from_slice(&entry.entry_type().to_be_bytes());
            entry_bytes.extend_from_slice(&(body.len() as u32).to_be_bytes());
            entry_bytes.extend_from_slice(&body);
        }
        entry_bytes.extend_from_slice(&ENTRY_TYPE_TERMINATOR.to_be_bytes());
        entry_bytes.extend_from_slice(&0u32.to_be_bytes());

        // fixed prefix header_length field counts only the fixed
        // prefix itself, not the entry chain that follows it, so a
        // reader can always find where records start: prefix + chain.
        out.extend_from_slice(&(FIXED_PREFIX_LEN as u16).to_be_bytes());
        out.extend_from_slice(&self.record_length.to_be_bytes());
        out.extend_from_slice(&entry_bytes);

        self.state = HeaderState::Fixed;
        Ok(())
    }

    /// Parses the fixed prefix and entry chain from `bytes`, which
    /// must contain at least the whole header (callers read the
    /// fixed-length prefix first to learn where the chain ends, via
    /// [`FileHeader::peek_prefix_len`]).
    pub fn read_from(bytes: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let take = |pos: &mut usize, n: usize| -> Result<&[u8]> {
            let slice = bytes
                .get(*pos..*pos + n)
                .ok_or_else(|| Error::UnsupportedFormat("truncated file header".into()))?;
            *pos += n;
            Ok(slice)
        };

        let magic = u32::from_be_bytes(take(&mut pos, 4)?.try_into().unwrap());
        if magic != MAGIC {
            return Err(Error::UnsupportedFormat(format!(
                "bad magic {magic:#010x}, expected {MAGIC:#010x}"
            )));
        }
        let byte_order = ByteOrder::from_byte(take(&mut pos, 1)?[0])?;
        let file_version = take(&mut pos, 1)?[0];
        let compression = silk_io::CompressionMethod::from_u8(take(&mut pos, 1)?[0])?;
        let file_format_id = take(&mut pos, 1)?[0];
        let record_version = take(&mut pos, 1)?[0];
        let _header_length = u16::from_be_bytes(take(&mut pos, 2)?.try_into().unwrap());
        let record_length = u16::from_be_bytes(take(&mut pos, 2)?.try_into().unwrap());

        let mut header = FileHeader {
            byte_order,
            file_version,
            compression,
            file_format_id,
            record_version,
            record_length,
            entries: Vec::new(),
            state: HeaderState::EntryOk,
        };

        loop {
            let entry_type = u32::from_be_bytes(take(&mut pos, 4)?.try_into().unwrap());
            let entry_length = u32::from_be_bytes(take(&mut pos, 4)?.try_into().unwrap()) as usize;
            if entry_type == ENTRY_TYPE_TERMINATOR {
                break;
            }
            let body = take(&mut pos, entry_length)?.to_vec();
            header.entries.push(HeaderEntry::from_parts(entry_type, body)?);
        }

        header.state = HeaderState::Fixed;
        Ok(header)
    }

    /// Streams the fixed prefix and the entry chain off `stream`,
    /// stopping right after the terminator entry, and hands the raw
    /// bytes to [`FileHeader::read_from`]. The entry chain has no
    /// total-length field of its own (only each entry's own length),
    /// so the only way to know where it ends is to walk it.
    pub fn read_from_stream(stream: &mut dyn ByteStream) -> Result<Self> {
        let mut raw = vec![0u8; FIXED_PREFIX_LEN];
        stream.read_exact(&mut raw)?;

        loop {
            let mut type_and_len = [0u8; 8];
            stream.read_exact(&mut type_and_len)?;
            let entry_type = u32::from_be_bytes(type_and_len[0..4].try_into().unwrap());
            let entry_length = u32::from_be_bytes(type_and_len[4..8].try_into().unwrap()) as usize;
            raw.extend_from_slice(&type_and_len);
            if entry_type == ENTRY_TYPE_TERMINATOR {
                break;
            }
            let mut body = vec![0u8; entry_length];
            stream.read_exact(&mut body)?;
            raw.extend_from_slice(&body);
        }

        Self::read_from(&raw)
    }

    /// Serializes the header and writes it directly to `stream`.
    pub fn write_to_stream(&mut self, stream: &mut dyn ByteStream) -> Result<()> {
        let mut buf = Vec::new();
        self.write_to(&mut buf)?;
        stream.write(&buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_fixed_prefix_and_entries() {
        let mut header = FileHeader::new(1);
        header.record_length = 28;
        header.compression = silk_io::CompressionMethod::Zlib;
        header
            .push_entry(HeaderEntry::Packedfile {
                hour_start_ms: 1_577_836_800_000,
                sensor_id: 42,
                flow_type: 3,
            })
            .unwrap();
        header
            .push_entry(HeaderEntry::Probename("S0".into()))
            .unwrap();

        let mut bytes = Vec::new();
        header.write_to(&mut bytes).unwrap();
        assert_eq!(header.state(), HeaderState::Fixed);

        let parsed = FileHeader::read_from(&bytes).unwrap();
        assert_eq!(parsed.record_length, 28);
        assert_eq!(parsed.compression, silk_io::CompressionMethod::Zlib);
        assert_eq!(
            parsed.packedfile(),
            Some((1_577_836_800_000, 42, 3))
        );
        assert_eq!(parsed.entries().len(), 2);
    }

    #[test]
    fn sidecar_entry_upgrades_file_version_to_block_header() {
        let mut header = FileHeader::new(1);
        assert!(!header.is_block_framed());
        header
            .push_entry(HeaderEntry::SidecarSchema(vec![1, 2, 3]))
            .unwrap();
        assert!(header.is_block_framed());
    }

    #[test]
    fn bad_magic_is_rejected() {
        let bytes = [0u8; 16];
        assert!(FileHeader::read_from(&bytes).is_err());
    }
}
