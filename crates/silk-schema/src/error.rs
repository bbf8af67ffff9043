//! Errors produced by the schema/template/record engine (`spec.md`
//! §4.5, §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("no information element named {0:?} is registered with this model")]
    UnknownIe(String),

    #[error("schema has no field with ident {0}")]
    FieldNotFound(u32),

    #[error("field {field} does not hold the requested type")]
    BadType { field: &'static str },

    #[error("value of length {got} does not fit field {field} (capacity {capacity})")]
    BadSize {
        field: &'static str,
        got: usize,
        capacity: usize,
    },

    #[error("address is not representable as IPv4")]
    NotIpv4,

    #[error("boolean field holds neither 0 nor 1 ({0})")]
    UnknownBool(u8),

    #[error("schema is frozen and can no longer be modified")]
    Frozen,

    #[error("schema must be frozen before it can be used to allocate or transcode records")]
    NotFrozen,

    #[error("record has no attached schema")]
    NoSchema,

    #[error("source and destination records are incompatible for this operation")]
    Incompatible,

    #[error(transparent)]
    Dtyp(#[from] silk_dtyp::DtypError),

    #[error("memory allocation failed")]
    Alloc,
}

pub type Result<T> = std::result::Result<T, SchemaError>;
