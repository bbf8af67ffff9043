//! The three list kinds a [`crate::field::Field`] of list datatype can
//! hold (`spec.md` §3 "Lists", §4.5.1).
//!
//! Each wraps its own [`Session`] so that, per `spec.md`'s append
//! rule, "append paths must update the list's internal session so
//! that the templates referenced by the list ... are all registered
//! at known template ids before the block buffer serializes
//! anything."

use crate::error::{Result, SchemaError};
use crate::element::InformationElement;
use crate::record::FixedRecord;
use crate::schema::Schema;
use crate::session::{InformationModel, Session};
use silk_dtyp::Varlen;
use std::sync::Arc;

/// A list of values of a single information element, with no
/// per-entry template (`spec.md`'s "basic" list kind).
#[derive(Debug, Clone)]
pub struct BasicList {
    element: InformationElement,
    entries: Vec<Arc<Varlen>>,
    iter_pos: usize,
}

impl BasicList {
    pub fn new(element: InformationElement) -> Self {
        BasicList {
            element,
            entries: Vec::new(),
            iter_pos: 0,
        }
    }

    pub fn element(&self) -> &InformationElement {
        &self.element
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends an encoded value. `ie` must match the list's declared
    /// element identity (`spec.md` §4.5.1: "the appended element's
    /// information-element identity ... must match the list's
    /// declared element").
    pub fn append(&mut self, ie: &InformationElement, value: &[u8]) -> Result<()> {
        if ie.enterprise_number != self.element.enterprise_number
            || ie.element_id != self.element.element_id
            || ie.datatype != self.element.datatype
        {
            return Err(SchemaError::BadType { field: "basicList" });
        }
        self.entries.push(Arc::new(Varlen::new(value)));
        Ok(())
    }

    pub fn get_element(&self, idx: usize) -> Option<&[u8]> {
        self.entries.get(idx).map(|v| v.as_slice())
    }

    pub fn reset_iter(&mut self) {
        self.iter_pos = 0;
    }

    pub fn next_element(&mut self) -> Option<&[u8]> {
        let slot = self.entries.get(self.iter_pos)?;
        self.iter_pos += 1;
        Some(slot.as_slice())
    }
}

/// A list of records that all share one template (`spec.md`'s
/// "subTemplate" list kind).
#[derive(Clone)]
pub struct SubTemplateList {
    schema: Schema,
    session: Arc<Session>,
    entries: Vec<Arc<[u8]>>,
    iter_pos: usize,
}

impl std::fmt::Debug for SubTemplateList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubTemplateList")
            .field("template_id", &self.schema.template_id())
            .field("len", &self.entries.len())
            .finish()
    }
}

impl SubTemplateList {
    /// Builds an empty, writable list bound to `schema`, which must
    /// already be frozen. The list's own session registers `schema`'s
    /// template so it is resolvable once this list is serialized.
    pub fn new(model: Arc<dyn InformationModel>, schema: Schema) -> Result<Self> {
        if !schema.is_frozen() {
            return Err(SchemaError::NotFrozen);
        }
        let session = Session::new(model);
        if let Some(tmpl) = schema.session().and_then(|s| s.get(schema.template_id().unwrap())) {
            session.register_at(tmpl.id, tmpl.fields.clone())?;
        }
        Ok(SubTemplateList {
            schema,
            session,
            entries: Vec::new(),
            iter_pos: 0,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Deep-copies `record`'s fixed bytes into a freshly grown entry.
    /// `record`'s schema must match this list's schema by template id
    /// (`spec.md` §4.5.1: "the appended record's schema must match the
    /// list's schema").
    pub fn append(&mut self, record: &FixedRecord) -> Result<()> {
        if record.schema().template_id() != self.schema.template_id() {
            return Err(SchemaError::Incompatible);
        }
        let len = self.schema.record_len()? as usize;
        self.entries.push(Arc::from(record.raw_at(0, len)));
        Ok(())
    }

    pub fn get_element(&self, idx: usize) -> Option<Result<FixedRecord>> {
        self.entries
            .get(idx)
            .map(|bytes| FixedRecord::from_foreign(&self.schema, bytes.clone()))
    }

    pub fn reset_iter(&mut self) {
        self.iter_pos = 0;
    }

    pub fn next_element(&mut self) -> Option<Result<FixedRecord>> {
        let bytes = self.entries.get(self.iter_pos)?.clone();
        self.iter_pos += 1;
        Some(FixedRecord::from_foreign(&self.schema, bytes))
    }
}

/// One template-homogeneous run of entries within a
/// [`SubTemplateMultiList`].
#[derive(Clone)]
struct Group {
    schema: Schema,
    entries: Vec<Arc<[u8]>>,
}

/// A list whose entries are grouped by template, consecutive entries
/// sharing a template forming one group (`spec.md`'s
/// "subTemplateMulti" list kind).
#[derive(Clone)]
pub struct SubTemplateMultiList {
    model: Arc<dyn InformationModel>,
    session: Arc<Session>,
    groups: Vec<Group>,
}

impl std::fmt::Debug for SubTemplateMultiList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubTemplateMultiList")
            .field("groups", &self.groups.len())
            .finish()
    }
}

impl SubTemplateMultiList {
    pub fn new(model: Arc<dyn InformationModel>) -> Self {
        let session = Session::new(model.clone());
        SubTemplateMultiList {
            model,
            session,
            groups: Vec::new(),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn count_elements(&self) -> usize {
        self.groups.iter().map(|g| g.entries.len()).sum()
    }

    /// Appends `record`. If the most recently appended group's
    /// template equals `record`'s template, the entry joins that
    /// group; otherwise a new group starts (`spec.md` §4.5.1).
    pub fn append(&mut self, record: &FixedRecord) -> Result<()> {
        let record_tid = record.schema().template_id();
        let len = record.schema().record_len()? as usize;
        let bytes: Arc<[u8]> = Arc::from(record.raw_at(0, len));

        if let Some(last) = self.groups.last_mut() {
            if last.schema.template_id() == record_tid {
                last.entries.push(bytes);
                return Ok(());
            }
        }

        if let Some(tmpl) = record
            .schema()
            .session()
            .and_then(|s| record_tid.and_then(|id| s.get(id)))
        {
            self.session.register_at(tmpl.id, tmpl.fields.clone())?;
        }
        self.groups.push(Group {
            schema: record.schema().clone(),
            entries: vec![bytes],
        });
        Ok(())
    }

    pub fn model(&self) -> &Arc<dyn InformationModel> {
        &self.model
    }

    pub fn get_group(&self, group_idx: usize) -> Option<&Schema> {
        self.groups.get(group_idx).map(|g| &g.schema)
    }

    pub fn get_element(&self, group_idx: usize, idx: usize) -> Option<Result<FixedRecord>> {
        let group = self.groups.get(group_idx)?;
        group
            .entries
            .get(idx)
            .map(|bytes| FixedRecord::from_foreign(&group.schema, bytes.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StaticInformationModel;
    use crate::element::Datatype;

    fn model() -> Arc<dyn InformationModel> {
        Arc::new(StaticInformationModel::with_core_elements())
    }

    fn frozen_schema(model: Arc<dyn InformationModel>) -> Schema {
        let schema = Schema::create(model, None).unwrap();
        schema.insert_field_by_name("protocolIdentifier").unwrap();
        schema.freeze().unwrap();
        schema
    }

    #[test]
    fn basic_list_rejects_mismatched_element() {
        let ie = InformationElement::new(0, 4, "protocolIdentifier", Datatype::UnsignedInt8);
        let mut list = BasicList::new(ie);
        let wrong = InformationElement::new(0, 8, "sourceIPv4Address", Datatype::Ipv4Address);
        assert!(matches!(
            list.append(&wrong, &[1, 2, 3, 4]),
            Err(SchemaError::BadType { .. })
        ));
        let ie2 = InformationElement::new(0, 4, "protocolIdentifier", Datatype::UnsignedInt8);
        list.append(&ie2, &[6]).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list.get_element(0), Some(&[6u8][..]));
    }

    #[test]
    fn sub_template_list_round_trips_entries() {
        let model = model();
        let schema = frozen_schema(model.clone());
        let mut list = SubTemplateList::new(model, schema.clone()).unwrap();
        let mut rec = FixedRecord::create(&schema).unwrap();
        rec.set_u64("protocolIdentifier", 17).unwrap();
        list.append(&rec).unwrap();
        assert_eq!(list.len(), 1);
        let back = list.get_element(0).unwrap().unwrap();
        assert_eq!(back.get_u64("protocolIdentifier").unwrap(), 17);
    }

    #[test]
    fn sub_template_multi_list_groups_by_template() {
        let model = model();
        let schema_a = frozen_schema(model.clone());
        let schema_b = {
            let s = Schema::create(model.clone(), None).unwrap();
            s.insert_field_by_name("sourceTransportPort").unwrap();
            s.freeze().unwrap();
            s
        };
        let mut list = SubTemplateMultiList::new(model);
        let mut a1 = FixedRecord::create(&schema_a).unwrap();
        a1.set_u64("protocolIdentifier", 6).unwrap();
        let mut a2 = FixedRecord::create(&schema_a).unwrap();
        a2.set_u64("protocolIdentifier", 17).unwrap();
        let mut b1 = FixedRecord::create(&schema_b).unwrap();
        b1.set_u64("sourceTransportPort", 80).unwrap();

        list.append(&a1).unwrap();
        list.append(&a2).unwrap();
        list.append(&b1).unwrap();

        assert_eq!(list.group_count(), 2);
        assert_eq!(list.count_elements(), 3);
    }
}
