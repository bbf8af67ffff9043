//! Errors produced while packing or unpacking a single flow record.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("no codec registered for format {format:#06x} version {version}")]
    UnknownFormatVersion { format: u16, version: u8 },

    #[error("record length mismatch for format {format:#06x} version {version}: expected {expected}, header declares {declared}")]
    RecordLengthMismatch {
        format: u16,
        version: u8,
        expected: u16,
        declared: u16,
    },

    #[error("field {field} value {value} exceeds representable range for this format")]
    FieldOutOfRange { field: &'static str, value: i64 },

    #[error("packet count is zero, which no format may encode")]
    PktsZero,

    #[error("packet count {value} exceeds the {max} this format can represent")]
    PktsOverflow { value: u64, max: u64 },

    #[error("byte count {value} exceeds the {max} this format can represent")]
    BytesOverflow { value: u64, max: u64 },

    #[error("SNMP interface index {value} exceeds the field width for this format")]
    SnmpOverflow { value: u32 },

    #[error("sensor id {value} exceeds the field width for this format")]
    SensorIdOverflow { value: u32 },

    #[error("elapsed time {value}ms exceeds the {max}ms this format can represent")]
    ElapsedOverflow { value: u64, max: u64 },

    #[error("start time is before the record's packed-file hour boundary: {value}ms")]
    StartTimeUnderflow { value: i64 },

    #[error("start time offset {value}ms exceeds the {max}ms this format can represent")]
    StartTimeOverflow { value: i64, max: i64 },

    #[error("bytes-per-packet ratio overflows this format's fixed-point field")]
    BppOverflow,

    #[error(transparent)]
    Dtyp(#[from] silk_dtyp::DtypError),

    #[error("binary layout error: {0}")]
    Binrw(#[from] binrw::Error),

    #[error("unexpected end of record data")]
    Truncated,
}

pub type Result<T> = std::result::Result<T, CodecError>;
