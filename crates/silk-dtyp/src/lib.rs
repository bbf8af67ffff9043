//! Common data types shared by every layer of the silk flow-record stack.
//!
//! This crate has no notion of a record format or a stream; it only owns
//! the primitives that the codec, schema, and I/O layers all need: the
//! millisecond-epoch time conversions used by every historical record
//! format, the template-id allocator shared by the schema engine, the
//! varlen descriptor tagged union used by `FixedRecord`, and the
//! `#[mbitfield]` macro used to declare packed bitfields.

pub mod error;
pub mod ident;
pub mod time;
pub mod varlen;

pub use error::DtypError;
pub use ident::TemplateIdAllocator;
pub use silk_dtyp_derive::mbitfield;
pub use time::{hour_boundary_ms, hour_relative_secs_ms, ms_since_epoch, ntp_to_unix_ms, unix_ms_to_ntp};
pub use varlen::Varlen;
