//! The IPFIX-style schema/template engine (`spec.md` §3 "Schema /
//! Template", §4.5): information elements, fields, frozen schemas,
//! schema-bound fixed records, the three list kinds, and the
//! `SchemaMap`/`TemplateMap` transcoding machinery.
//!
//! This crate has no notion of a file, a stream, or a historical
//! on-disk record layout (that's `silk-codec` and `silk-io`); it only
//! knows how to describe a template, allocate a record against it, and
//! move data between two schemas.

#![forbid(unsafe_code)]

pub mod element;
pub mod error;
pub mod field;
pub mod list;
pub mod record;
pub mod schema;
pub mod schema_map;
pub mod session;
pub mod template_map;

pub use element::{Datatype, InformationElement, Semantics, Units, VARLEN};
pub use error::{Result, SchemaError};
pub use field::{ComputeFn, Field, FieldOps, VARLEN_DESCRIPTOR_LEN};
pub use list::{BasicList, SubTemplateList, SubTemplateMultiList};
pub use record::{CopyFlags, FixedRecord, ListValue};
pub use schema::{FieldSpec, Schema, FIELD_SPEC_FORCE_VARLEN};
pub use schema_map::{SchemaMap, SchemaMapOp};
pub use session::{InformationModel, Session, StaticInformationModel, Template};
pub use template_map::TemplateMap;
