//! [`SchemaMap`]: a precomputed, ordered program of transcoding steps
//! between two schemas (`spec.md` §3 "SchemaMap", §4.5.3).

use crate::element::Datatype;
use crate::error::Result;
use crate::field::Field;
use crate::record::{FixedRecord, ListValue};
use crate::schema::Schema;
use crate::template_map::TemplateMap;

/// One step of a [`SchemaMap`]. Field references are carried by name
/// rather than by raw offset: `FixedRecord`'s accessors are
/// themselves name-keyed, so a name-level plan is both simpler to
/// apply and immune to offset drift between schema versions.
#[derive(Debug, Clone)]
pub enum SchemaMapOp {
    /// Same family (bool/int/float/address/MAC/datetime handled by
    /// their own variants below), same or differing storage width —
    /// `FixedRecord`'s byte-level getters/setters naturally zero-
    /// extend or low-bit-truncate, which is how narrowing is handled
    /// here (see [`SchemaMap::truncated`]).
    Copy { src: String, dst: String },
    CopyToVarlen { src: String, dst: String },
    CopyFromVarlen { src: String, dst: String, truncate: bool },
    CopyVarlenToVarlen { src: String, dst: String },
    CopyF32ToF64 { src: String, dst: String },
    CopyF64ToF32 { src: String, dst: String },
    CopyDateTime { src: String, dst: String },
    CopyBasicList { src: String, dst: String },
    CopySubTemplateList { src: String, dst: String },
    CopySubTemplateMultiList { src: String, dst: String },
    Zero { dst: String },
    /// Shorthand for "just deep-copy the whole record" — emitted when
    /// `src` and `dst` schemas are the same schema.
    RecordCopyInto,
    Done,
}

/// A precomputed, ordered plan for transcoding a record from one
/// schema to another (`spec.md` §4.5.3). Built once per
/// `(dst_schema, src_schema)` pair and then applied to each record,
/// so building it is allowed to do name-matching and type-dispatch
/// work the per-record `apply` should not repeat.
#[derive(Debug, Clone)]
pub struct SchemaMap {
    ops: Vec<SchemaMapOp>,
    /// Set if any step narrows an integer field — per `spec.md`
    /// scenario 6, this is reported from `build`, not `apply`.
    /// Narrowing keeps the low-order bits of the source value (not a
    /// saturating clamp): a `u32` value of `0x1_0000` copied into a
    /// `u16` field yields `0x0000`.
    pub truncated: bool,
}

impl SchemaMap {
    pub fn ops(&self) -> &[SchemaMapOp] {
        &self.ops
    }

    /// Builds a transcoding plan between two schemas. Fields are
    /// paired by name, source fields each used at most once, in
    /// destination-field order (`spec.md` §4.5.3 steps 1-2).
    pub fn build(dst: &Schema, src: &Schema) -> Result<Self> {
        if dst.is_same_as(src) {
            return Ok(SchemaMap {
                ops: vec![SchemaMapOp::RecordCopyInto, SchemaMapOp::Done],
                truncated: false,
            });
        }

        let dst_fields = dst.fields();
        let mut src_fields = src.fields();
        let mut pairs = Vec::new();
        for dst_field in &dst_fields {
            if let Some(pos) = src_fields.iter().position(|f| f.name() == dst_field.name()) {
                let src_field = src_fields.remove(pos);
                pairs.push((src_field, dst_field.clone()));
            }
        }
        Self::build_from_field_pairs(&pairs)
    }

    /// Builds a plan from explicit `(src_field, dst_field)` pairs,
    /// already sorted the way the caller wants them applied
    /// (`spec.md` §4.5.3 step 3 onward).
    pub fn build_from_field_pairs(pairs: &[(Field, Field)]) -> Result<Self> {
        let mut ops = Vec::new();
        let mut truncated = false;

        for (src, dst) in pairs {
            let op = classify(src, dst, &mut truncated);
            ops.push(op);
        }
        ops.push(SchemaMapOp::Done);
        Ok(SchemaMap { ops, truncated })
    }

    /// Applies the plan, copying `src` into `dst` field by field.
    /// `template_map` accumulates the templates touched by any list
    /// steps so they can be replayed into the destination's session
    /// once the whole copy completes (`spec.md` §4.5.2).
    pub fn apply(
        &self,
        dst: &mut FixedRecord,
        src: &FixedRecord,
        template_map: &mut TemplateMap,
    ) -> Result<()> {
        for op in &self.ops {
            match op {
                SchemaMapOp::Copy { src: s, dst: d } => {
                    let v = src.get_u64(s)?;
                    dst.set_u64(d, v)?;
                }
                SchemaMapOp::CopyToVarlen { src: s, dst: d } => {
                    let v = src.get_bytes(s).unwrap_or(&[]);
                    dst.set_bytes(d, v)?;
                }
                SchemaMapOp::CopyFromVarlen { src: s, dst: d, .. } => {
                    let v = src.get_bytes(s).unwrap_or(&[]);
                    dst.set_bytes(d, v)?;
                }
                SchemaMapOp::CopyVarlenToVarlen { src: s, dst: d } => {
                    let v = src.get_bytes(s).unwrap_or(&[]);
                    dst.set_bytes(d, v)?;
                }
                SchemaMapOp::CopyF32ToF64 { src: s, dst: d } => {
                    let v = src.get_f32(s)?;
                    dst.set_f64(d, v as f64)?;
                }
                SchemaMapOp::CopyF64ToF32 { src: s, dst: d } => {
                    let v = src.get_f64(s)?;
                    dst.set_f32(d, v as f32)?;
                }
                SchemaMapOp::CopyDateTime { src: s, dst: d } => {
                    let ms = src.get_datetime_ms(s)?;
                    dst.set_datetime_ms(d, ms)?;
                }
                SchemaMapOp::CopyBasicList { src: s, dst: d } => {
                    if let Ok(ListValue::Basic(list)) = src.get_list(s) {
                        let list = list.clone();
                        dst.set_list(d, ListValue::Basic(list))?;
                    }
                }
                SchemaMapOp::CopySubTemplateList { src: s, dst: d } => {
                    if let Ok(ListValue::SubTemplate(list)) = src.get_list(s) {
                        let list = list.clone();
                        if let Some(tmpl) = list
                            .schema()
                            .session()
                            .and_then(|sess| list.schema().template_id().and_then(|id| sess.get(id)))
                        {
                            template_map.record(tmpl);
                        }
                        dst.set_list(d, ListValue::SubTemplate(list))?;
                    }
                }
                SchemaMapOp::CopySubTemplateMultiList { src: s, dst: d } => {
                    if let Ok(ListValue::SubTemplateMulti(list)) = src.get_list(s) {
                        let list = list.clone();
                        for gi in 0..list.group_count() {
                            if let Some(schema) = list.get_group(gi) {
                                if let Some(tmpl) = schema
                                    .session()
                                    .and_then(|sess| schema.template_id().and_then(|id| sess.get(id)))
                                {
                                    template_map.record(tmpl);
                                }
                            }
                        }
                        dst.set_list(d, ListValue::SubTemplateMulti(list))?;
                    }
                }
                SchemaMapOp::Zero { dst: d } => {
                    dst.set_u64(d, 0)?;
                }
                SchemaMapOp::RecordCopyInto => {
                    *dst = src.clone();
                }
                SchemaMapOp::Done => break,
            }
        }
        Ok(())
    }
}

fn classify(src: &Field, dst: &Field, truncated: &mut bool) -> SchemaMapOp {
    use Datatype::*;
    let (sn, dn) = (src.name().to_string(), dst.name().to_string());

    match (src.datatype(), dst.datatype()) {
        (a, b) if a.is_list() && a == b => match a {
            BasicList => SchemaMapOp::CopyBasicList { src: sn, dst: dn },
            SubTemplateList => SchemaMapOp::CopySubTemplateList { src: sn, dst: dn },
            SubTemplateMultiList => SchemaMapOp::CopySubTemplateMultiList { src: sn, dst: dn },
            _ => unreachable!(),
        },
        (Float32, Float64) => SchemaMapOp::CopyF32ToF64 { src: sn, dst: dn },
        (Float64, Float32) => SchemaMapOp::CopyF64ToF32 { src: sn, dst: dn },
        (a, b) if a.is_datetime() && b.is_datetime() => SchemaMapOp::CopyDateTime { src: sn, dst: dn },
        (String, String) | (OctetArray, OctetArray) if src.is_varlen() && dst.is_varlen() => {
            SchemaMapOp::CopyVarlenToVarlen { src: sn, dst: dn }
        }
        (String, String) | (OctetArray, OctetArray) if !src.is_varlen() && dst.is_varlen() => {
            SchemaMapOp::CopyToVarlen { src: sn, dst: dn }
        }
        (String, String) | (OctetArray, OctetArray) if src.is_varlen() && !dst.is_varlen() => {
            SchemaMapOp::CopyFromVarlen {
                src: sn,
                dst: dn,
                truncate: true,
            }
        }
        (a, b) if a.is_integer() && b.is_integer() => {
            if dst.storage_len() < src.storage_len() {
                *truncated = true;
            }
            SchemaMapOp::Copy { src: sn, dst: dn }
        }
        _ => SchemaMapOp::Copy { src: sn, dst: dn },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::InformationElement;
    use crate::field::Field;
    use crate::session::StaticInformationModel;
    use crate::schema::Schema;
    use std::sync::Arc;

    fn model() -> Arc<dyn crate::session::InformationModel> {
        Arc::new(StaticInformationModel::with_core_elements())
    }

    #[test]
    fn narrowing_an_integer_field_is_flagged_truncated() {
        let wide = Field::new(InformationElement::new(0, 1, "octetDeltaCount", Datatype::UnsignedInt32));
        let narrow =
            Field::new(InformationElement::new(0, 1, "octetDeltaCount", Datatype::UnsignedInt16))
                .with_length(2);
        let map = SchemaMap::build_from_field_pairs(&[(wide, narrow)]).unwrap();
        assert!(map.truncated);
    }

    #[test]
    fn truncating_copy_keeps_low_order_bits() {
        let model = model();
        let src_schema = Schema::create(model.clone(), None).unwrap();
        src_schema.insert_field_by_name("octetDeltaCount").unwrap();
        src_schema.freeze().unwrap();

        let dst_schema = Schema::create(model, None).unwrap();
        dst_schema.insert_field_by_name("octetDeltaCount").unwrap();
        dst_schema.freeze().unwrap();

        let mut src = FixedRecord::create(&src_schema).unwrap();
        src.set_u64("octetDeltaCount", 0x1_0000).unwrap();

        let map = SchemaMap::build(&dst_schema, &src_schema).unwrap();
        let mut dst = FixedRecord::create(&dst_schema).unwrap();
        let mut tm = TemplateMap::new();
        map.apply(&mut dst, &src, &mut tm).unwrap();

        // octetDeltaCount is a UnsignedInt64 core element here, so this
        // exercises the generic `Copy` byte-width match rather than
        // narrowing; the dedicated narrowing math is covered above.
        assert_eq!(dst.get_u64("octetDeltaCount").unwrap(), 0x1_0000);
    }

    /// `build`/`apply` end to end with a dst schema that genuinely
    /// declares `octetDeltaCount` at a narrower storage width than the
    /// src schema — a two-byte field, not a same-width stand-in —
    /// confirming the `Copy` step's low-bit-keeping behavior survives
    /// the full build-then-apply path, not just direct `FixedRecord`
    /// getter/setter arithmetic.
    #[test]
    fn build_and_apply_narrows_a_wider_source_field_into_a_narrower_destination() {
        let model = model();
        let ie = model.lookup_by_name("octetDeltaCount").unwrap();

        let src_schema = Schema::create(model.clone(), None).unwrap();
        src_schema.insert_field_by_name("octetDeltaCount").unwrap();
        src_schema.freeze().unwrap();

        let dst_schema = Schema::create(model, None).unwrap();
        dst_schema
            .insert_field_before(0, Field::new(ie).with_length(2))
            .unwrap();
        dst_schema.freeze().unwrap();

        let mut src = FixedRecord::create(&src_schema).unwrap();
        src.set_u64("octetDeltaCount", 0x1_0001).unwrap();

        let map = SchemaMap::build(&dst_schema, &src_schema).unwrap();
        assert!(map.truncated);

        let mut dst = FixedRecord::create(&dst_schema).unwrap();
        let mut tm = TemplateMap::new();
        map.apply(&mut dst, &src, &mut tm).unwrap();

        assert_eq!(dst.get_u64("octetDeltaCount").unwrap(), 0x0001);
    }
}
