//! [`Field`]: one entry in a [`crate::schema::Schema`] — an
//! information element plus length, semantics/units, byte offset, and
//! an optional [`FieldOps`] bundle (`spec.md` §3 "Schema / Template").

use crate::element::{Datatype, InformationElement, Semantics, Units, VARLEN};
use crate::record::FixedRecord;
use std::cmp::Ordering;
use std::sync::Arc;

/// `Copy`/`merge`/`compare`/`to_text` overrides for a field, replacing
/// the original's `sk_field_ops_t` pointer-plus-context-ident bundle
/// with plain function pointers and an `Arc`-captured closure for the
/// one callback that needs to close over state (`compute`).
#[derive(Clone, Default)]
pub struct FieldOps {
    /// Three-way compare of two encoded values of this field.
    pub compare: Option<fn(&[u8], &[u8]) -> Ordering>,
    /// In-place merge of `src` into `dst` (used by aggregation
    /// callers that fold many records' fields together — e.g. OR-ing
    /// a flags field, or taking the later of two timestamps).
    pub merge: Option<fn(dst: &mut [u8], src: &[u8])>,
    /// Renders an encoded value as text, overriding the generic
    /// datatype-driven renderer in [`crate::record::FixedRecord::to_text`].
    pub to_text: Option<fn(&[u8]) -> String>,
    /// A derived field: evaluated by
    /// [`crate::record::FixedRecord::update_computed`] in schema
    /// order once this field's named inputs have been resolved at
    /// freeze time.
    pub compute: Option<ComputeFn>,
}

impl std::fmt::Debug for FieldOps {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldOps")
            .field("compare", &self.compare.is_some())
            .field("merge", &self.merge.is_some())
            .field("to_text", &self.to_text.is_some())
            .field("compute", &self.compute.is_some())
            .finish()
    }
}

/// A computed field's evaluation callback. Takes the containing
/// record (already holding its other, already-computed fields) and
/// the resolved byte offsets of its declared inputs.
pub type ComputeFn = Arc<dyn Fn(&mut FixedRecord, &[usize]) + Send + Sync>;

/// One field in a schema: an information element's identity, its
/// on-disk length (fixed or variable), annotative semantics/units, an
/// offset assigned at freeze time, and an optional [`FieldOps`]
/// bundle.
#[derive(Clone)]
pub struct Field {
    pub ie: InformationElement,
    length: u16,
    pub semantics: Semantics,
    pub units: Units,
    pub ops: Option<FieldOps>,
    /// Field names this field's `compute` callback reads; resolved to
    /// byte offsets in the containing schema at freeze time.
    pub compute_inputs: Vec<String>,
    offset: Option<u16>,
    resolved_inputs: Vec<usize>,
}

impl std::fmt::Debug for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Field")
            .field("name", &self.ie.name)
            .field("datatype", &self.ie.datatype)
            .field("length", &self.length)
            .field("offset", &self.offset)
            .finish()
    }
}

impl Field {
    /// Builds a field at the information element's natural length.
    pub fn new(ie: InformationElement) -> Self {
        let length = ie.datatype.natural_length().unwrap_or(VARLEN);
        Field {
            ie,
            length,
            semantics: Semantics::default(),
            units: Units::default(),
            ops: None,
            compute_inputs: Vec::new(),
            offset: None,
            resolved_inputs: Vec::new(),
        }
    }

    /// Overrides the on-disk length (`spec.md` §4.5's schema `spec`
    /// entries: `(element_name, length_override?, flag mask)`); used
    /// to narrow an integer field (e.g. a 4-byte counter down to 2
    /// bytes) or to force a string/octet-array field variable-length
    /// even though a caller supplied a fixed capacity.
    pub fn with_length(mut self, length: u16) -> Self {
        self.length = length;
        self
    }

    pub fn with_semantics(mut self, semantics: Semantics) -> Self {
        self.semantics = semantics;
        self
    }

    pub fn with_units(mut self, units: Units) -> Self {
        self.units = units;
        self
    }

    pub fn with_ops(mut self, ops: FieldOps) -> Self {
        self.ops = Some(ops);
        self
    }

    pub fn with_compute(mut self, compute: ComputeFn, inputs: Vec<String>) -> Self {
        self.compute_inputs = inputs;
        let ops = self.ops.get_or_insert_with(FieldOps::default);
        ops.compute = Some(compute);
        self
    }

    pub fn name(&self) -> &str {
        &self.ie.name
    }

    pub fn datatype(&self) -> Datatype {
        self.ie.datatype
    }

    pub fn is_varlen(&self) -> bool {
        self.length == VARLEN
    }

    /// On-disk length: for a fixed field, the byte width stored
    /// inline; for a varlen field, the fixed size of the inline
    /// descriptor (`spec.md` §4.5 "Varlen and list storage": `{len:
    /// u16, buf: *bytes}`, 2 bytes of length plus a pointer-sized
    /// slot — represented here as a `u32` index into the record's
    /// heap side-table, so 6 bytes).
    pub fn storage_len(&self) -> u16 {
        if self.is_varlen() {
            VARLEN_DESCRIPTOR_LEN
        } else {
            self.length
        }
    }

    /// The length a caller declared for a fixed field, or `None` for
    /// a varlen field.
    pub fn declared_length(&self) -> Option<u16> {
        if self.is_varlen() {
            None
        } else {
            Some(self.length)
        }
    }

    pub fn offset(&self) -> Option<u16> {
        self.offset
    }

    pub(crate) fn set_offset(&mut self, offset: u16) {
        self.offset = Some(offset);
    }

    pub(crate) fn set_resolved_inputs(&mut self, inputs: Vec<usize>) {
        self.resolved_inputs = inputs;
    }

    pub(crate) fn resolved_inputs(&self) -> &[usize] {
        &self.resolved_inputs
    }
}

/// Byte width of the inline varlen descriptor: a `u16` length plus a
/// `u32` index into the record's vardata side-table.
pub const VARLEN_DESCRIPTOR_LEN: u16 = 6;
