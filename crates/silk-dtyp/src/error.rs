//! Shared error primitives used by every layer above `silk-dtyp`.

use thiserror::Error;

/// Errors produced by the data-type primitives themselves: time
/// conversions out of range, template-id exhaustion, and varlen
/// descriptor misuse.
#[derive(Debug, Error)]
pub enum DtypError {
    /// A millisecond timestamp could not be expressed relative to its
    /// containing hour (the 12-bit hour-relative start-time fields used
    /// by most historical record formats top out at 4095ms of slack
    /// past a 32-bit hour boundary).
    #[error("timestamp {0} is not representable relative to its hour boundary")]
    TimeOutOfRange(i64),

    /// The process-wide template-id space (u16, starting at 257) has
    /// been exhausted. There is no recovery from this: callers must
    /// reduce the number of distinct live schemas.
    #[error("template id space exhausted")]
    TemplateIdsExhausted,

    /// A varlen descriptor was asked to yield inline bytes but holds an
    /// owned (heap) value, or vice-versa.
    #[error("varlen descriptor holds {0}, not the requested representation")]
    WrongVarlenRepr(&'static str),
}
