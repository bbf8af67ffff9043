//! [`FlowStream`]: the client-facing facade that owns a file header,
//! dispatches to a record codec, and sits on top of whichever framing
//! (raw fixed-length records, legacy compressed chunks, or the
//! block buffer) the header's file version and compression method
//! select.
//!
//! This is the one type most callers touch: `create` / `bind` / `open`
//! set up a stream, then `read_record`/`write_record` move flow
//! records, and `close` tears it down. Everything below it (header
//! parsing, codec dispatch, block/legacy framing, gzip) is plumbing
//! this module wires together, not reimplements.

use crate::config::{IcmpSportHandler, Ipv6Policy, RuntimeConfig};
use crate::content::{Mode, StreamContent};
use crate::error::{Error, Result};
use crate::header::{ByteOrder, FileHeader, HeaderEntry};
use silk_codec::codec::{Codec, CodecContext, FormatId, Registry};
use silk_codec::record::{FlowAddr, FlowRecord};
use silk_io::basic_buffer::BasicBuffer;
use silk_io::block::{split_sidecar_entries, BlockReader, BlockWriter, BLOCK_ID_DATA, BLOCK_ID_SIDECAR};
use silk_io::error::IoError;
use silk_io::gzip_buffer::GzipBuffer;
use silk_io::legacy_chunk::{LegacyChunkReader, LegacyChunkWriter};
use silk_io::traits::ByteStream;
use silk_io::CompressionMethod;
use std::fs::{File, OpenOptions};
use std::io::{Cursor, IsTerminal, Read, Seek, SeekFrom, Write};
use std::path::PathBuf;

const DEFAULT_BLOCK_CAPACITY: usize = 64 * 1024;
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Where a path string resolves to (`create`/`bind`: `"-"`, `"stdin"`,
/// `"stdout"`, `"stderr"` are the standard streams; everything else is
/// an ordinary file).
#[derive(Debug, Clone)]
enum Binding {
    Path(PathBuf),
    Stdin,
    Stdout,
    Stderr,
}

/// How the write side should pick a compression method, mirroring the
/// three choices a caller has before a writer's header is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionChoice {
    /// Resolve against the destination's seekability: non-seekable
    /// destinations get `None`.
    Default,
    /// Same seekability gate, prefers the best-ratio method available.
    Best,
    Method(CompressionMethod),
}

impl Default for CompressionChoice {
    fn default() -> Self {
        CompressionChoice::Default
    }
}

/// A small `Read + Write` shim over the three standard streams, since
/// [`BasicBuffer`] wants a single type that implements both (stdin is
/// read-only, stdout/stderr are write-only; each side errors on the
/// unsupported direction rather than panicking).
enum StdHandle {
    In(std::io::Stdin),
    Out(std::io::Stdout),
    Err(std::io::Stderr),
}

impl StdHandle {
    fn is_terminal(&self) -> bool {
        match self {
            StdHandle::In(s) => s.is_terminal(),
            StdHandle::Out(s) => s.is_terminal(),
            StdHandle::Err(s) => s.is_terminal(),
        }
    }
}

fn unsupported(what: &str) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Unsupported, what.to_string())
}

impl Read for StdHandle {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            StdHandle::In(s) => s.read(buf),
            _ => Err(unsupported("this stream is not readable")),
        }
    }
}

impl Write for StdHandle {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match self {
            StdHandle::Out(s) => s.write(buf),
            StdHandle::Err(s) => s.write(buf),
            StdHandle::In(_) => Err(unsupported("this stream is not writable")),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match self {
            StdHandle::Out(s) => s.flush(),
            StdHandle::Err(s) => s.flush(),
            StdHandle::In(_) => Ok(()),
        }
    }
}

/// `Seek` is never actually exercised on a standard stream (`BasicBuffer`
/// only calls it from [`BasicBuffer::skip`], and this wrapper is always
/// constructed via [`BasicBuffer::new_unseekable`]), but the trait bound
/// is required regardless.
impl Seek for StdHandle {
    fn seek(&mut self, _pos: SeekFrom) -> std::io::Result<u64> {
        Err(std::io::Error::from_raw_os_error(29))
    }
}

/// Which stage of its lifecycle a stream is in. `create` yields
/// `Created`; a successful `bind` yields `Bound`; a successful `open`
/// yields `Opened`; `close` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Created,
    Bound,
    Opened,
    Closed,
}

/// Per-record framing once the stream is open: either plain
/// fixed-length records with no chunking at all, the older
/// `{comp_length, uncomp_length}` chunk pairs, or the 16-byte
/// block-header framing.
enum ReadFraming {
    Raw(Box<dyn ByteStream>),
    Legacy(LegacyChunkReader<Box<dyn ByteStream>>),
    Block(BlockCursor),
}

/// Cursor state over one block reader's decoded `DATA`/`SIDECAR`
/// payloads: a single `DATA` block legitimately holds many
/// concatenated records (`spec.md` §4.3's "flush every 40 records"
/// scenario), so the decoded payload and its paired sidecar entries
/// are retained here and drained `record_length` bytes (one sidecar
/// entry) at a time before the next block is fetched.
struct BlockCursor {
    reader: BlockReader<Box<dyn ByteStream>>,
    data: Vec<u8>,
    data_pos: usize,
    sidecar_entries: Vec<Option<Vec<u8>>>,
    sidecar_pos: usize,
}

impl BlockCursor {
    fn new(reader: BlockReader<Box<dyn ByteStream>>) -> Self {
        BlockCursor {
            reader,
            data: Vec::new(),
            data_pos: 0,
            sidecar_entries: Vec::new(),
            sidecar_pos: 0,
        }
    }
}

enum WriteFraming {
    Raw(Box<dyn ByteStream>),
    Legacy(LegacyChunkWriter<Box<dyn ByteStream>>),
    Block(BlockWriter<Box<dyn ByteStream>>),
}

/// Codec binding resolved once the header is read (on a reader) or
/// about to be written (on a writer): which (format, version) this
/// stream's records are packed/unpacked with, plus the ambient
/// per-stream context (sensor, flowtype, hour boundary) every
/// hour-relative-time format needs on both directions.
struct CodecBinding {
    codec: &'static dyn Codec,
    ctx: CodecContext,
    needs_swap: bool,
    /// The file's declared version and format, retained past header
    /// parsing only so [`FlowStream::repair_icmp`] can reproduce the
    /// original's version/format-gated ICMP byte-swap.
    file_version: u8,
    format: FormatId,
}

/// The client-facing flow-record stream: owns a [`FileHeader`],
/// dispatches record bytes to the bound [`Codec`], and carries
/// whichever framing (raw / legacy chunk / block) the header selects.
pub struct FlowStream {
    mode: Mode,
    content: StreamContent,
    config: RuntimeConfig,
    ipv6_policy: Ipv6Policy,
    phase: Phase,
    binding: Option<Binding>,
    force_gzip: bool,
    reader: Option<ReadFraming>,
    writer: Option<WriteFraming>,
    codec_binding: Option<CodecBinding>,
    copy_input: Option<Box<FlowStream>>,
    // writer-only pre-open configuration
    pending_format: Option<(FormatId, Option<u8>)>,
    pending_packedfile: Option<(i64, u16, u8)>,
    pending_sidecar_schema: Option<Vec<u8>>,
    pending_compression: CompressionChoice,
    records_touched: bool,
}

impl FlowStream {
    /// `create(mode, content)`: a fresh stream with no path bound yet.
    /// `Append` is rejected outright for `Text`/`OtherBinary` content,
    /// which have no header machinery to resume from.
    pub fn create(mode: Mode, content: StreamContent) -> Result<Self> {
        if mode == Mode::Append
            && matches!(content, StreamContent::Text | StreamContent::OtherBinary)
        {
            return Err(Error::UnsupportedIoMode(mode));
        }
        Ok(FlowStream {
            mode,
            content,
            config: RuntimeConfig::from_env(),
            ipv6_policy: Ipv6Policy::default(),
            phase: Phase::Created,
            binding: None,
            force_gzip: false,
            reader: None,
            writer: None,
            codec_binding: None,
            copy_input: None,
            pending_format: None,
            pending_packedfile: None,
            pending_sidecar_schema: None,
            pending_compression: CompressionChoice::default(),
            records_touched: false,
        })
    }

    /// One-shot path binding. `"-"`/`"stdin"`/`"stdout"`/`"stderr"`
    /// resolve to the OS standard streams (stdin for a read stream,
    /// stdout otherwise, unless the name pins one explicitly);
    /// anything else is an ordinary file path. A `.gz` suffix marks a
    /// write-side stream for whole-file gzip; that combination is
    /// rejected for `Append` and for a `Text`-content writer.
    pub fn bind(&mut self, path: &str) -> Result<()> {
        if self.phase != Phase::Created {
            return Err(Error::PrevBound);
        }
        let is_gz = path.ends_with(".gz");
        if is_gz && (self.mode == Mode::Append || matches!(self.content, StreamContent::Text)) {
            return Err(Error::UnsupportedFormat(
                "whole-stream gzip is not supported for append or text-mode writes".into(),
            ));
        }
        self.binding = Some(match path {
            "-" if self.mode == Mode::Read => Binding::Stdin,
            "-" => Binding::Stdout,
            "stdin" => Binding::Stdin,
            "stdout" => Binding::Stdout,
            "stderr" => Binding::Stderr,
            other => Binding::Path(PathBuf::from(other)),
        });
        self.force_gzip = is_gz;
        self.phase = Phase::Bound;
        Ok(())
    }

    pub fn set_ipv6_policy(&mut self, policy: Ipv6Policy) {
        self.ipv6_policy = policy;
    }

    /// Pins the on-disk format/version a write stream will use. Must
    /// be called before [`FlowStream::open`]; if never called, `open`
    /// defaults to the registry's latest version of [`FormatId::Generic`].
    pub fn set_format(&mut self, format: FormatId, version: Option<u8>) -> Result<()> {
        if self.phase == Phase::Opened || self.phase == Phase::Closed {
            return Err(Error::Frozen);
        }
        self.pending_format = Some((format, version));
        Ok(())
    }

    /// Sets the packedfile header entry (hour boundary, sensor,
    /// flowtype) a write stream's records are encoded against.
    pub fn set_packedfile(&mut self, hour_start_ms: i64, sensor_id: u16, flow_type: u8) -> Result<()> {
        if self.phase == Phase::Opened || self.phase == Phase::Closed {
            return Err(Error::Frozen);
        }
        self.pending_packedfile = Some((hour_start_ms, sensor_id, flow_type));
        Ok(())
    }

    /// Attaches an opaque serialized sidecar schema. Carrying one
    /// upgrades the header to block framing, since only the block
    /// buffer's parallel `SIDECAR` stream can carry per-record
    /// sidecar bytes.
    pub fn set_sidecar_schema(&mut self, schema_bytes: Vec<u8>) -> Result<()> {
        if self.phase == Phase::Opened || self.phase == Phase::Closed {
            return Err(Error::Frozen);
        }
        self.pending_sidecar_schema = Some(schema_bytes);
        Ok(())
    }

    pub fn set_compression(&mut self, choice: CompressionChoice) -> Result<()> {
        if self.phase == Phase::Opened || self.phase == Phase::Closed {
            return Err(Error::Frozen);
        }
        self.pending_compression = choice;
        Ok(())
    }

    /// Attaches a second stream that every successfully-read record is
    /// forwarded to (write side), before IPv6 filtering is applied.
    /// Rejected once any record has already been read.
    pub fn set_copy_input(&mut self, input: FlowStream) -> Result<()> {
        if self.copy_input.is_some() {
            return Err(Error::PrevCopyInput);
        }
        if self.records_touched {
            return Err(Error::PrevData);
        }
        self.copy_input = Some(Box::new(input));
        Ok(())
    }

    /// Reads the first two bytes of `inner` to decide whether it is a
    /// gzip stream before boxing it: the decision has to happen while
    /// the concrete [`BasicBuffer`] is still in hand, since only it
    /// exposes [`BasicBuffer::peek`] and
    /// [`BasicBuffer::into_inner_with_unread`]; once erased to
    /// `Box<dyn ByteStream>` the two bytes already peeked would
    /// otherwise be unrecoverable.
    fn boxed_read_stream<T>(inner: T, seekable_hint: bool) -> Result<Box<dyn ByteStream>>
    where
        T: Read + Write + Seek + 'static,
    {
        let mut buf = if seekable_hint {
            BasicBuffer::new(inner)
        } else {
            BasicBuffer::new_unseekable(inner)
        };
        let is_gzip = {
            let magic = buf.peek(2)?;
            magic.len() >= 2 && magic[..2] == GZIP_MAGIC
        };
        if is_gzip {
            let (inner, unread) = buf.into_inner_with_unread();
            Ok(Box::new(GzipBuffer::new_reader(ChainedReader {
                prefix: Cursor::new(unread),
                rest: inner,
            })))
        } else {
            Ok(Box::new(buf))
        }
    }

    fn open_raw_read_source(&self) -> Result<Box<dyn ByteStream>> {
        match self.binding.as_ref().ok_or(Error::NotOpen)? {
            Binding::Path(path) => {
                let file = File::open(path).map_err(IoError::Sys)?;
                Self::boxed_read_stream(file, true)
            }
            Binding::Stdin => {
                let stdin = std::io::stdin();
                if !matches!(self.content, StreamContent::Text) && stdin.is_terminal() {
                    return Err(Error::IsTerminal);
                }
                Self::boxed_read_stream(StdHandle::In(stdin), false)
            }
            Binding::Stdout | Binding::Stderr => Err(Error::UnsupportedIoMode(self.mode)),
        }
    }

    fn finish_write_backing<T>(&self, inner: T, seekable_hint: bool) -> Box<dyn ByteStream>
    where
        T: Read + Write + Seek + 'static,
    {
        if self.force_gzip {
            return Box::new(GzipBuffer::new_writer(inner, flate2::Compression::default()));
        }
        if seekable_hint {
            Box::new(BasicBuffer::new(inner))
        } else {
            Box::new(BasicBuffer::new_unseekable(inner))
        }
    }

    fn open_raw_write_source(&self) -> Result<Box<dyn ByteStream>> {
        match self.binding.as_ref().ok_or(Error::NotOpen)? {
            Binding::Path(path) => {
                if !self.config.clobber && path.exists() && path.is_file() {
                    return Err(Error::FileExists);
                }
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .truncate(true)
                    .open(path)
                    .map_err(IoError::Sys)?;
                Ok(self.finish_write_backing(file, true))
            }
            Binding::Stdout => {
                let stdout = std::io::stdout();
                if !matches!(self.content, StreamContent::Text) && stdout.is_terminal() {
                    return Err(Error::IsTerminal);
                }
                Ok(self.finish_write_backing(StdHandle::Out(stdout), false))
            }
            Binding::Stderr => {
                let stderr = std::io::stderr();
                if !matches!(self.content, StreamContent::Text) && stderr.is_terminal() {
                    return Err(Error::IsTerminal);
                }
                Ok(self.finish_write_backing(StdHandle::Err(stderr), false))
            }
            Binding::Stdin => Err(Error::UnsupportedIoMode(self.mode)),
        }
    }

    /// Creates or opens the bound path/descriptor, reads (for `Read`)
    /// or prepares to write (for `Write`/`Append`) the silk file
    /// header, and stands up the right framing (raw, legacy chunk, or
    /// block) underneath it.
    pub fn open(&mut self) -> Result<()> {
        log::trace!("open: mode={:?} binding={:?}", self.mode, self.binding);
        match self.phase {
            Phase::Created => return Err(Error::NotOpen),
            Phase::Opened => return Err(Error::PrevOpen),
            Phase::Closed => return Err(Error::Closed),
            Phase::Bound => {}
        }

        if !self.content.has_header() {
            match self.mode {
                Mode::Read => self.reader = Some(ReadFraming::Raw(self.open_raw_read_source()?)),
                Mode::Write | Mode::Append => {
                    self.writer = Some(WriteFraming::Raw(self.open_raw_write_source()?))
                }
            }
            self.phase = Phase::Opened;
            return Ok(());
        }

        match self.mode {
            Mode::Read => self.open_for_read()?,
            Mode::Write => self.open_for_write()?,
            Mode::Append => self.open_for_append()?,
        }
        self.phase = Phase::Opened;
        Ok(())
    }

    fn bind_codec_from_header(&mut self, header: &FileHeader) -> Result<()> {
        if !self.content.is_flow() {
            return Ok(());
        }
        let format = FormatId::from_u8(header.file_format_id)
            .ok_or_else(|| Error::UnsupportedFormat(format!("unknown format id {}", header.file_format_id)))?;
        let codec = Registry::shared().get(format, header.record_version)?;
        if header.record_length != 0 && header.record_length != codec.record_length() {
            return Err(Error::Codec(silk_codec::CodecError::RecordLengthMismatch {
                format: format as u16,
                version: header.record_version,
                expected: codec.record_length(),
                declared: header.record_length,
            }));
        }
        let (hour_start_ms, sensor_id, flow_type) = header.packedfile().unwrap_or((0, 0, 0));
        self.codec_binding = Some(CodecBinding {
            codec,
            ctx: CodecContext {
                sensor_id,
                flow_type,
                hour_start_ms,
            },
            needs_swap: header.byte_order != ByteOrder::native(),
            file_version: header.file_version,
            format,
        });
        Ok(())
    }

    fn open_for_read(&mut self) -> Result<()> {
        let mut stream = self.open_raw_read_source()?;
        let header = FileHeader::read_from_stream(stream.as_mut())?;
        self.bind_codec_from_header(&header)?;

        self.reader = Some(if header.is_block_framed() {
            ReadFraming::Block(BlockCursor::new(BlockReader::new(stream, header.compression)))
        } else if header.compression != CompressionMethod::None {
            ReadFraming::Legacy(LegacyChunkReader::new(stream, header.compression))
        } else {
            ReadFraming::Raw(stream)
        });
        Ok(())
    }

    fn resolve_write_codec(&self) -> Result<(FormatId, &'static dyn Codec)> {
        let format = self.pending_format.map(|(f, _)| f).unwrap_or(FormatId::Generic);
        let version = self.pending_format.and_then(|(_, v)| v);
        let registry = Registry::shared();
        let version = version
            .or_else(|| registry.latest_version(format))
            .ok_or_else(|| Error::UnsupportedFormat(format!("no codec registered for {format:?}")))?;
        Ok((format, registry.get(format, version)?))
    }

    fn build_write_header(&mut self, codec: &'static dyn Codec, format: FormatId) -> Result<FileHeader> {
        let backing_seekable = matches!(self.binding, Some(Binding::Path(_)));
        let compression = if self.force_gzip {
            CompressionMethod::None
        } else {
            match self.pending_compression {
                CompressionChoice::Default => CompressionMethod::default_method(backing_seekable),
                CompressionChoice::Best => CompressionMethod::best_method(backing_seekable),
                CompressionChoice::Method(m) => m,
            }
        };

        let mut header = FileHeader::new(format as u8);
        header.record_version = codec.version();
        header.record_length = codec.record_length();
        header.compression = compression;

        if let Some((hour_start_ms, sensor_id, flow_type)) = self.pending_packedfile {
            header.push_entry(HeaderEntry::Packedfile {
                hour_start_ms,
                sensor_id,
                flow_type,
            })?;
        }
        if let Some(bytes) = self.pending_sidecar_schema.take() {
            header.push_entry(HeaderEntry::SidecarSchema(bytes))?;
        }

        let (hour_start_ms, sensor_id, flow_type) = self.pending_packedfile.unwrap_or((0, 0, 0));
        self.codec_binding = Some(CodecBinding {
            codec,
            ctx: CodecContext {
                sensor_id,
                flow_type,
                hour_start_ms,
            },
            needs_swap: false,
            file_version: header.file_version,
            format,
        });
        Ok(header)
    }

    fn open_for_write(&mut self) -> Result<()> {
        let (format, codec) = self.resolve_write_codec()?;
        let mut header = self.build_write_header(codec, format)?;
        let compression = header.compression;

        let mut stream = self.open_raw_write_source()?;
        header.write_to_stream(stream.as_mut())?;

        self.writer = Some(if self.force_gzip {
            WriteFraming::Raw(stream)
        } else if header.is_block_framed() {
            let carries_sidecar = header.sidecar_schema().is_some();
            WriteFraming::Block(BlockWriter::with_sidecar(
                stream,
                compression,
                DEFAULT_BLOCK_CAPACITY,
                carries_sidecar,
            ))
        } else if compression != CompressionMethod::None {
            WriteFraming::Legacy(LegacyChunkWriter::new(stream, compression, DEFAULT_BLOCK_CAPACITY))
        } else {
            WriteFraming::Raw(stream)
        });
        Ok(())
    }

    /// Append resumes only raw, uncompressed framing: recovering the
    /// prior chain's `prev_block_length` (block framing) or mid-stream
    /// decompressor state (legacy chunks) to resume either safely is
    /// not attempted, so both are rejected with
    /// [`Error::UnsupportedFormat`] rather than silently corrupting
    /// the file.
    fn open_for_append(&mut self) -> Result<()> {
        let path = match self.binding.as_ref() {
            Some(Binding::Path(p)) => p.clone(),
            _ => return Err(Error::UnsupportedIoMode(Mode::Append)),
        };
        #[cfg(unix)]
        {
            use std::os::unix::fs::FileTypeExt;
            if let Ok(meta) = std::fs::symlink_metadata(&path) {
                if meta.file_type().is_fifo() {
                    return Err(Error::UnsupportedIoMode(Mode::Append));
                }
            }
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(IoError::Sys)?;
        let existing_len = file.metadata().map_err(IoError::Sys)?.len();

        if existing_len == 0 {
            let (format, codec) = self.resolve_write_codec()?;
            let mut header = self.build_write_header(codec, format)?;
            header.compression = CompressionMethod::None;
            let mut stream: Box<dyn ByteStream> = Box::new(BasicBuffer::new(file));
            header.write_to_stream(stream.as_mut())?;
            self.writer = Some(WriteFraming::Raw(stream));
            return Ok(());
        }

        let mut buf = BasicBuffer::new(file);
        let header = FileHeader::read_from_stream(&mut buf)?;
        if header.is_block_framed() || header.compression != CompressionMethod::None {
            return Err(Error::UnsupportedFormat(
                "append is only supported for raw, uncompressed files".into(),
            ));
        }
        self.bind_codec_from_header(&header)?;
        let (mut file, _unread) = buf.into_inner_with_unread();
        file.seek(SeekFrom::End(0)).map_err(IoError::Sys)?;
        self.writer = Some(WriteFraming::Raw(Box::new(BasicBuffer::new(file))));
        Ok(())
    }

    /// Reads and decodes the next flow record, applying ICMP
    /// sport/dport repair, forwarding to the attached copy-input
    /// stream, and filtering by the configured IPv6 policy. Records
    /// dropped by the IPv6 policy are transparently skipped; this
    /// returns `Ok(None)` only at genuine end of stream.
    pub fn read_record(&mut self) -> Result<Option<FlowRecord>> {
        log::trace!("read_record");
        if !self.content.is_flow() {
            return Err(Error::UnsupportedIoMode(self.mode));
        }
        loop {
            let Some((buf, sidecar)) = self.read_one_record_frame()? else {
                return Ok(None);
            };
            self.records_touched = true;
            let binding = self.codec_binding.as_ref().ok_or(Error::NoSchema)?;
            let mut raw = buf;
            if binding.needs_swap {
                binding.codec.swap_in_place(&mut raw);
            }
            let mut rec = binding.codec.unpack(&raw, &binding.ctx)?;
            rec.sidecar = sidecar;

            self.repair_icmp(&mut rec);

            if let Some(input) = self.copy_input.as_mut() {
                input.write_record(&rec)?;
            }

            match self.apply_ipv6_policy(rec) {
                Some(rec) => return Ok(Some(rec)),
                None => continue,
            }
        }
    }

    fn read_one_record_frame(&mut self) -> Result<Option<(Vec<u8>, Option<Vec<u8>>)>> {
        let record_length = self
            .codec_binding
            .as_ref()
            .ok_or(Error::NoSchema)?
            .codec
            .record_length() as usize;
        match self.reader.as_mut().ok_or(Error::NotOpen)? {
            ReadFraming::Raw(stream) => {
                let mut buf = vec![0u8; record_length];
                match stream.read_exact(&mut buf) {
                    Ok(()) => Ok(Some((buf, None))),
                    Err(IoError::Eof) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            }
            ReadFraming::Legacy(reader) => Ok(reader
                .read_record(record_length)?
                .map(|bytes| (bytes, None))),
            ReadFraming::Block(cursor) => {
                loop {
                    if cursor.data_pos + record_length <= cursor.data.len() {
                        let rec_bytes = cursor.data[cursor.data_pos..cursor.data_pos + record_length].to_vec();
                        cursor.data_pos += record_length;
                        let sidecar = if cursor.sidecar_pos < cursor.sidecar_entries.len() {
                            let entry = cursor.sidecar_entries[cursor.sidecar_pos].clone();
                            cursor.sidecar_pos += 1;
                            entry
                        } else {
                            None
                        };
                        return Ok(Some((rec_bytes, sidecar)));
                    }
                    if cursor.data_pos != cursor.data.len() {
                        // leftover bytes don't make up a whole record
                        return Err(IoError::ReadShort {
                            expected: record_length,
                            got: cursor.data.len() - cursor.data_pos,
                        }
                        .into());
                    }

                    // current DATA block is exhausted; fetch the next one
                    let data = match cursor.reader.read_matching(BLOCK_ID_DATA) {
                        Ok(Some(bytes)) => bytes,
                        Ok(None) => return Ok(None),
                        Err(IoError::BlockWantedId { .. }) => {
                            // a sidecar block arrived before the next data
                            // block; drain it and retry once.
                            cursor.reader.skip_pending()?;
                            match cursor.reader.read_matching(BLOCK_ID_DATA)? {
                                Some(bytes) => bytes,
                                None => return Ok(None),
                            }
                        }
                        Err(e) => return Err(e.into()),
                    };
                    cursor.data = data;
                    cursor.data_pos = 0;

                    let sidecar_raw = match cursor.reader.read_matching(BLOCK_ID_SIDECAR) {
                        Ok(Some(bytes)) => Some(bytes),
                        Ok(None) => None,
                        Err(IoError::BlockWantedId { found, .. }) if found == BLOCK_ID_DATA => {
                            // next DATA block arrived with no sidecar for
                            // this one; leave it pending for the next read.
                            None
                        }
                        Err(e) => return Err(e.into()),
                    };
                    cursor.sidecar_entries = match sidecar_raw {
                        Some(bytes) => split_sidecar_entries(&bytes)?,
                        None => Vec::new(),
                    };
                    cursor.sidecar_pos = 0;
                }
            }
        }
    }

    fn repair_icmp(&self, rec: &mut FlowRecord) {
        if self.config.icmp_sport_handler != IcmpSportHandler::Repair {
            return;
        }
        if matches!(rec.proto, 1 | 58) && rec.dport == 0 && rec.sport != 0 {
            let moved = rec.sport;
            rec.dport = if self.needs_icmp_byte_swap() {
                moved.swap_bytes()
            } else {
                moved
            };
            rec.sport = 0;
        }
    }

    /// Files written by versions of the original tool before 16, in the
    /// formats that packed sport/dport through a union with the ICMP
    /// type/code fields, stored the moved value byte-swapped relative to
    /// every later writer. Reproduced from
    /// `original_source/silk-src/src/libsilk/skstream.c`'s `rwpackUnpack`
    /// ICMP-repair logic.
    fn needs_icmp_byte_swap(&self) -> bool {
        match &self.codec_binding {
            Some(binding) => {
                binding.file_version < 16
                    && matches!(
                        binding.format,
                        FormatId::Filter
                            | FormatId::NotRouted
                            | FormatId::Routed
                            | FormatId::Split
                            | FormatId::Www
                    )
            }
            None => false,
        }
    }

    fn apply_ipv6_policy(&self, mut rec: FlowRecord) -> Option<FlowRecord> {
        match self.ipv6_policy {
            Ipv6Policy::Mix => Some(rec),
            Ipv6Policy::Ignore => {
                if rec.is_ipv6() {
                    None
                } else {
                    Some(rec)
                }
            }
            Ipv6Policy::AsV4 => {
                if !rec.is_ipv6() {
                    return Some(rec);
                }
                let sip = rec.sip.to_v4()?;
                let dip = rec.dip.to_v4()?;
                let nh = match rec.next_hop {
                    FlowAddr::V4(a) => a,
                    FlowAddr::V6(a) => a.to_ipv4_mapped().unwrap_or(std::net::Ipv4Addr::UNSPECIFIED),
                };
                rec.sip = FlowAddr::V4(sip);
                rec.dip = FlowAddr::V4(dip);
                rec.next_hop = FlowAddr::V4(nh);
                Some(rec)
            }
            Ipv6Policy::Force => {
                if rec.is_ipv6() {
                    return Some(rec);
                }
                let promote = |a: FlowAddr| match a {
                    FlowAddr::V4(v4) => FlowAddr::V6(v4.to_ipv6_mapped()),
                    v6 => v6,
                };
                rec.sip = promote(rec.sip);
                rec.dip = promote(rec.dip);
                rec.next_hop = promote(rec.next_hop);
                Some(rec)
            }
            Ipv6Policy::Only => {
                if rec.is_ipv6() {
                    Some(rec)
                } else {
                    None
                }
            }
        }
    }

    /// Encodes and writes one flow record.
    pub fn write_record(&mut self, rec: &FlowRecord) -> Result<()> {
        log::trace!("write_record");
        if !self.content.is_flow() {
            return Err(Error::UnsupportedIoMode(self.mode));
        }
        let binding = self.codec_binding.as_ref().ok_or(Error::NoSchema)?;
        let mut buf = binding.codec.pack(rec, &binding.ctx)?;
        if binding.needs_swap {
            binding.codec.swap_in_place(&mut buf);
        }
        self.records_touched = true;
        match self.writer.as_mut().ok_or(Error::NotOpen)? {
            WriteFraming::Raw(stream) => stream.write(&buf).map_err(Into::into),
            WriteFraming::Legacy(writer) => writer.write_record(&buf).map_err(Into::into),
            WriteFraming::Block(writer) => writer
                .write_record(&buf, rec.sidecar.as_deref())
                .map_err(Into::into),
        }
    }

    /// Raw byte read, only valid while the read side is framed
    /// [`ReadFraming::Raw`] (non-flow content, or a flow stream before
    /// any record has been decoded).
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        log::trace!("read: requested {} bytes", buf.len());
        match self.reader.as_mut().ok_or(Error::NotOpen)? {
            ReadFraming::Raw(stream) => stream.read(buf).map_err(Into::into),
            _ => Err(Error::UnsupportedIoMode(self.mode)),
        }
    }

    /// Raw byte write, only valid while the write side is framed
    /// [`WriteFraming::Raw`].
    pub fn write(&mut self, buf: &[u8]) -> Result<()> {
        log::trace!("write: {} bytes", buf.len());
        match self.writer.as_mut().ok_or(Error::NotOpen)? {
            WriteFraming::Raw(stream) => stream.write(buf).map_err(Into::into),
            _ => Err(Error::UnsupportedIoMode(self.mode)),
        }
    }

    /// Advances past `n` records. If a copy-input stream is attached,
    /// each skipped record is read and forwarded rather than
    /// discarded at the framing layer, matching `read_record`'s
    /// forwarding contract. Returns the number of records actually
    /// skipped (fewer than `n` at end of stream).
    pub fn skip_records(&mut self, n: u64) -> Result<u64> {
        let mut skipped = 0;
        for _ in 0..n {
            match self.read_record()? {
                Some(_) => skipped += 1,
                None => break,
            }
        }
        Ok(skipped)
    }

    pub fn flush(&mut self) -> Result<()> {
        match self.writer.as_mut() {
            Some(WriteFraming::Raw(stream)) => stream.flush()?,
            Some(WriteFraming::Legacy(writer)) => writer.flush()?,
            Some(WriteFraming::Block(writer)) => writer.flush()?,
            None => {}
        }
        Ok(())
    }

    /// Idempotent; flushes and releases the underlying descriptor.
    pub fn close(&mut self) -> Result<()> {
        if self.phase == Phase::Closed {
            return Ok(());
        }
        if let Some(writer) = self.writer.take() {
            match writer {
                WriteFraming::Raw(mut stream) => stream.close()?,
                WriteFraming::Legacy(writer) => {
                    writer.close()?;
                }
                WriteFraming::Block(writer) => {
                    writer.close()?;
                }
            }
        }
        if let Some(reader) = self.reader.take() {
            match reader {
                ReadFraming::Raw(mut stream) => stream.close()?,
                ReadFraming::Legacy(reader) => {
                    reader.into_stream().close()?;
                }
                ReadFraming::Block(cursor) => {
                    cursor.reader.into_stream().close()?;
                }
            }
        }
        if let Some(mut input) = self.copy_input.take() {
            input.close()?;
        }
        self.phase = Phase::Closed;
        Ok(())
    }
}

/// Chains the bytes a [`BasicBuffer`] had already buffered in front of
/// whatever remains on its inner source, so a [`GzipBuffer`] built on
/// top never misses the peeked magic-number bytes.
struct ChainedReader<T> {
    prefix: Cursor<Vec<u8>>,
    rest: T,
}

impl<T: Read> Read for ChainedReader<T> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if (self.prefix.position() as usize) < self.prefix.get_ref().len() {
            let n = self.prefix.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
        }
        self.rest.read(buf)
    }
}

impl<T: Write> Write for ChainedReader<T> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.rest.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.rest.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn sample_record() -> FlowRecord {
        FlowRecord {
            stime_ms: 1_577_836_800_000,
            elapsed_ms: 5000,
            sport: 1024,
            dport: 80,
            proto: 6,
            packets: 3,
            bytes: 600,
            flags: 0x1B,
            input: 5,
            output: 12,
            sip: FlowAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 1)),
            dip: FlowAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 2)),
            next_hop: FlowAddr::V4(std::net::Ipv4Addr::new(10, 0, 0, 3)),
            ..Default::default()
        }
    }

    fn flow_content() -> StreamContent {
        StreamContent::SilkFlow {
            header: None,
            format: None,
        }
    }

    #[test]
    fn raw_round_trip_through_a_real_file() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let mut writer = FlowStream::create(Mode::Write, flow_content()).unwrap();
        writer.bind(&path).unwrap();
        writer.set_format(FormatId::Routed, Some(5)).unwrap();
        writer.set_packedfile(1_577_836_800_000, 1, 1).unwrap();
        writer.open().unwrap();
        writer.write_record(&sample_record()).unwrap();
        writer.close().unwrap();

        let mut reader = FlowStream::create(Mode::Read, flow_content()).unwrap();
        reader.bind(&path).unwrap();
        reader.open().unwrap();
        let got = reader.read_record().unwrap().unwrap();
        assert_eq!(got.sip, sample_record().sip);
        assert_eq!(got.dip, sample_record().dip);
        assert_eq!(got.packets, 3);
        assert_eq!(got.bytes, 600);
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn icmp_sport_is_moved_into_dport_on_read() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let mut writer = FlowStream::create(Mode::Write, flow_content()).unwrap();
        writer.bind(&path).unwrap();
        writer.set_format(FormatId::Routed, Some(5)).unwrap();
        writer.open().unwrap();
        let mut rec = sample_record();
        rec.proto = 1;
        rec.sport = 0x0803;
        rec.dport = 0;
        writer.write_record(&rec).unwrap();
        writer.close().unwrap();

        let mut reader = FlowStream::create(Mode::Read, flow_content()).unwrap();
        reader.bind(&path).unwrap();
        reader.open().unwrap();
        let got = reader.read_record().unwrap().unwrap();
        assert_eq!(got.sport, 0);
        assert_eq!(got.dport, 0x0803);
    }

    #[test]
    fn block_framed_file_carries_sidecar_bytes_through() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let mut writer = FlowStream::create(Mode::Write, flow_content()).unwrap();
        writer.bind(&path).unwrap();
        writer.set_format(FormatId::Routed, Some(5)).unwrap();
        writer.set_sidecar_schema(vec![9, 9, 9]).unwrap();
        writer.open().unwrap();
        let mut rec = sample_record();
        rec.sidecar = Some(vec![1, 2, 3, 4, 5]);
        writer.write_record(&rec).unwrap();
        writer.close().unwrap();

        let mut reader = FlowStream::create(Mode::Read, flow_content()).unwrap();
        reader.bind(&path).unwrap();
        reader.open().unwrap();
        let got = reader.read_record().unwrap().unwrap();
        assert_eq!(got.sidecar, Some(vec![1, 2, 3, 4, 5]));
    }

    #[test]
    fn block_framed_file_reads_every_record_in_a_shared_block() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let mut writer = FlowStream::create(Mode::Write, flow_content()).unwrap();
        writer.bind(&path).unwrap();
        writer.set_format(FormatId::Routed, Some(5)).unwrap();
        writer.set_sidecar_schema(vec![9, 9, 9]).unwrap();
        writer.open().unwrap();
        for i in 0..4u16 {
            let mut rec = sample_record();
            rec.sport = 1024 + i;
            rec.sidecar = if i % 2 == 0 { Some(vec![i as u8; 3]) } else { None };
            writer.write_record(&rec).unwrap();
        }
        writer.close().unwrap();

        let mut reader = FlowStream::create(Mode::Read, flow_content()).unwrap();
        reader.bind(&path).unwrap();
        reader.open().unwrap();
        for i in 0..4u16 {
            let got = reader.read_record().unwrap().unwrap();
            assert_eq!(got.sport, 1024 + i);
            assert_eq!(got.sidecar, if i % 2 == 0 { Some(vec![i as u8; 3]) } else { None });
        }
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn ipv6_only_policy_drops_v4_records() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let mut writer = FlowStream::create(Mode::Write, flow_content()).unwrap();
        writer.bind(&path).unwrap();
        writer.set_format(FormatId::Routed, Some(5)).unwrap();
        writer.open().unwrap();
        writer.write_record(&sample_record()).unwrap();
        writer.close().unwrap();

        let mut reader = FlowStream::create(Mode::Read, flow_content()).unwrap();
        reader.bind(&path).unwrap();
        reader.set_ipv6_policy(Ipv6Policy::Only);
        reader.open().unwrap();
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn legacy_compressed_round_trip() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let mut writer = FlowStream::create(Mode::Write, flow_content()).unwrap();
        writer.bind(&path).unwrap();
        writer.set_format(FormatId::Routed, Some(5)).unwrap();
        writer
            .set_compression(CompressionChoice::Method(CompressionMethod::Zlib))
            .unwrap();
        writer.open().unwrap();
        for _ in 0..5 {
            writer.write_record(&sample_record()).unwrap();
        }
        writer.close().unwrap();

        let mut reader = FlowStream::create(Mode::Read, flow_content()).unwrap();
        reader.bind(&path).unwrap();
        reader.open().unwrap();
        let mut count = 0;
        while reader.read_record().unwrap().is_some() {
            count += 1;
        }
        assert_eq!(count, 5);
    }

    #[test]
    fn whole_stream_gzip_round_trip_via_gz_suffix() {
        let tmp = tempfile::Builder::new()
            .suffix(".gz")
            .tempfile()
            .unwrap();
        let path = tmp.path().to_str().unwrap().to_string();

        let mut writer = FlowStream::create(Mode::Write, flow_content()).unwrap();
        writer.bind(&path).unwrap();
        writer.set_format(FormatId::Routed, Some(5)).unwrap();
        writer.open().unwrap();
        writer.write_record(&sample_record()).unwrap();
        let mut icmp_rec = sample_record();
        icmp_rec.proto = 1;
        icmp_rec.sport = 0x0803;
        icmp_rec.dport = 0;
        writer.write_record(&icmp_rec).unwrap();
        writer.close().unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], &GZIP_MAGIC, "file must be transparently gzipped on disk");

        let mut reader = FlowStream::create(Mode::Read, flow_content()).unwrap();
        reader.bind(&path).unwrap();
        reader.open().unwrap();
        let first = reader.read_record().unwrap().unwrap();
        assert_eq!(first.sip, sample_record().sip);
        assert_eq!(first.packets, 3);
        let second = reader.read_record().unwrap().unwrap();
        assert_eq!(second.sport, 0);
        assert_eq!(second.dport, 0x0803);
        assert!(reader.read_record().unwrap().is_none());
    }

    #[test]
    fn bind_is_one_shot() {
        let mut s = FlowStream::create(Mode::Read, StreamContent::Text).unwrap();
        s.bind("-").unwrap();
        assert!(matches!(s.bind("-"), Err(Error::PrevBound)));
    }

    #[test]
    fn double_close_is_a_no_op() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_str().unwrap().to_string();
        let mut s = FlowStream::create(Mode::Write, StreamContent::OtherBinary).unwrap();
        s.bind(&path).unwrap();
        s.open().unwrap();
        s.write(b"abc").unwrap();
        s.close().unwrap();
        s.close().unwrap();
    }
}
