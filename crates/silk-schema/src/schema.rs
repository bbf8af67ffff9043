//! [`Schema`]: a frozen-or-unfrozen, reference-counted wrapper around
//! a [`Template`], carrying per-field byte offsets and ops (`spec.md`
//! §3 "Schema / Template", §4.5).

use crate::element::InformationElement;
use crate::error::{Result, SchemaError};
use crate::field::Field;
use crate::session::{InformationModel, Session, Template};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// An optional per-field override supplied to [`Schema::create`]:
/// `(element_name, length_override, flags)`, matching `spec.md` §4.5's
/// `schema::create(model, spec?)` signature. `flags` is opaque to this
/// crate beyond bit 0, which forces a fixed-width field to be treated
/// as variable-length (mirrors the original's per-field creation
/// flags, most of which are collector-policy knobs outside this
/// crate's scope).
#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub element_name: String,
    pub length_override: Option<u16>,
    pub flags: u32,
}

pub const FIELD_SPEC_FORCE_VARLEN: u32 = 0x1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SchemaState {
    Unfrozen,
    Frozen,
}

struct SchemaInner {
    model: Arc<dyn InformationModel>,
    fields: Vec<Field>,
    state: SchemaState,
    record_len: u16,
    template_id: Option<u16>,
    session: Option<Arc<Session>>,
    contexts: HashMap<u32, Box<dyn Any + Send + Sync>>,
}

/// A schema: an ordered list of [`Field`]s plus the bookkeeping
/// (offsets, session binding, template id, per-field contexts)
/// attached once it is [`Schema::freeze`]n. Cheaply `Clone`-able —
/// cloning bumps the `Arc` refcount, matching `spec.md`'s "Schemas are
/// reference-counted; cloning adds a reference."
#[derive(Clone)]
pub struct Schema {
    inner: Arc<Mutex<SchemaInner>>,
}

impl Schema {
    /// Builds a fresh, unfrozen schema. `spec`, if given, both
    /// determines field order and lets the caller override length or
    /// force variable-length storage per field.
    pub fn create(model: Arc<dyn InformationModel>, spec: Option<Vec<FieldSpec>>) -> Result<Self> {
        let mut fields = Vec::new();
        if let Some(spec) = spec {
            for entry in spec {
                let ie = model
                    .lookup_by_name(&entry.element_name)
                    .ok_or_else(|| SchemaError::UnknownIe(entry.element_name.clone()))?;
                let mut field = Field::new(ie);
                if entry.flags & FIELD_SPEC_FORCE_VARLEN != 0 {
                    field = field.with_length(crate::element::VARLEN);
                } else if let Some(len) = entry.length_override {
                    field = field.with_length(len);
                }
                fields.push(field);
            }
        }
        Ok(Schema {
            inner: Arc::new(Mutex::new(SchemaInner {
                model,
                fields,
                state: SchemaState::Unfrozen,
                record_len: 0,
                template_id: None,
                session: None,
                contexts: HashMap::new(),
            })),
        })
    }

    /// Builds an already-frozen schema wrapping an externally-owned
    /// [`Template`] bound to `session` (`spec.md` §4.5
    /// `schema::wrap_template`) — used when a record arrives already
    /// described by a template the block buffer or a sub-template
    /// list decoded, rather than one this crate is building up field
    /// by field.
    pub fn wrap_template(
        model: Arc<dyn InformationModel>,
        template: Arc<Template>,
        session: Arc<Session>,
    ) -> Self {
        let fields: Vec<Field> = template
            .fields
            .iter()
            .cloned()
            .map(Field::new)
            .collect();
        let schema = Schema {
            inner: Arc::new(Mutex::new(SchemaInner {
                model,
                fields,
                state: SchemaState::Unfrozen,
                record_len: 0,
                template_id: Some(template.id),
                session: Some(session),
                contexts: HashMap::new(),
            })),
        };
        schema.assign_offsets();
        schema.inner.lock().expect("schema poisoned").state = SchemaState::Frozen;
        schema
    }

    fn require_unfrozen(inner: &SchemaInner) -> Result<()> {
        if inner.state == SchemaState::Frozen {
            Err(SchemaError::Frozen)
        } else {
            Ok(())
        }
    }

    /// Appends a field looked up by name in the schema's information
    /// model.
    pub fn insert_field_by_name(&self, name: &str) -> Result<()> {
        let mut inner = self.inner.lock().expect("schema poisoned");
        Self::require_unfrozen(&inner)?;
        let ie = inner
            .model
            .lookup_by_name(name)
            .ok_or_else(|| SchemaError::UnknownIe(name.to_string()))?;
        inner.fields.push(Field::new(ie));
        Ok(())
    }

    /// Appends a field looked up by `(enterprise_number, element_id)`.
    pub fn insert_field_by_id(&self, enterprise_number: u32, element_id: u16) -> Result<()> {
        let mut inner = self.inner.lock().expect("schema poisoned");
        Self::require_unfrozen(&inner)?;
        let ie = inner
            .model
            .lookup_by_id(enterprise_number, element_id)
            .ok_or_else(|| SchemaError::UnknownIe(format!("{enterprise_number}:{element_id}")))?;
        inner.fields.push(Field::new(ie));
        Ok(())
    }

    /// Inserts `field` before the field currently at `before_index`.
    pub fn insert_field_before(&self, before_index: usize, field: Field) -> Result<()> {
        let mut inner = self.inner.lock().expect("schema poisoned");
        Self::require_unfrozen(&inner)?;
        let idx = before_index.min(inner.fields.len());
        inner.fields.insert(idx, field);
        Ok(())
    }

    fn assign_offsets(&self) {
        let mut inner = self.inner.lock().expect("schema poisoned");
        let mut offset: u16 = 0;
        for field in inner.fields.iter_mut() {
            field.set_offset(offset);
            offset = offset.saturating_add(field.storage_len());
        }
        inner.record_len = offset;

        // Resolve each field's named compute inputs to the byte
        // offsets of the first field in the schema with that name.
        let snapshot: Vec<(String, u16)> = inner
            .fields
            .iter()
            .map(|f| (f.name().to_string(), f.offset().unwrap_or(0)))
            .collect();
        for field in inner.fields.iter_mut() {
            if field.compute_inputs.is_empty() {
                continue;
            }
            let resolved: Vec<usize> = field
                .compute_inputs
                .iter()
                .filter_map(|name| {
                    snapshot
                        .iter()
                        .find(|(n, _)| n == name)
                        .map(|(_, off)| *off as usize)
                })
                .collect();
            field.set_resolved_inputs(resolved);
        }
    }

    /// Assigns offsets, binds to a session (creating one if none was
    /// supplied), registers the field set as a template, and
    /// transitions `Unfrozen -> Frozen`. Idempotent: freezing an
    /// already-frozen schema is a no-op.
    pub fn freeze(&self) -> Result<()> {
        {
            let inner = self.inner.lock().expect("schema poisoned");
            if inner.state == SchemaState::Frozen {
                return Ok(());
            }
        }
        self.assign_offsets();
        let mut inner = self.inner.lock().expect("schema poisoned");
        let session = inner
            .session
            .get_or_insert_with(|| Session::new(inner.model.clone()))
            .clone();
        let ies: Vec<InformationElement> = inner.fields.iter().map(|f| f.ie.clone()).collect();
        let template = session.register(ies)?;
        inner.template_id = Some(template.id);
        inner.state = SchemaState::Frozen;
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.lock().expect("schema poisoned").state == SchemaState::Frozen
    }

    pub fn record_len(&self) -> Result<u16> {
        let inner = self.inner.lock().expect("schema poisoned");
        if inner.state != SchemaState::Frozen {
            return Err(SchemaError::NotFrozen);
        }
        Ok(inner.record_len)
    }

    pub fn template_id(&self) -> Option<u16> {
        self.inner.lock().expect("schema poisoned").template_id
    }

    pub fn session(&self) -> Option<Arc<Session>> {
        self.inner.lock().expect("schema poisoned").session.clone()
    }

    pub fn model(&self) -> Arc<dyn InformationModel> {
        self.inner.lock().expect("schema poisoned").model.clone()
    }

    /// A point-in-time copy of the field list, safe to hold onto
    /// without keeping the schema's internal lock.
    pub fn fields(&self) -> Vec<Field> {
        self.inner.lock().expect("schema poisoned").fields.clone()
    }

    pub fn field_count(&self) -> usize {
        self.inner.lock().expect("schema poisoned").fields.len()
    }

    pub fn field_by_name(&self, name: &str) -> Option<Field> {
        self.inner
            .lock()
            .expect("schema poisoned")
            .fields
            .iter()
            .find(|f| f.name() == name)
            .cloned()
    }

    /// Strong-reference count, exposed mainly for tests that assert
    /// cloning a schema does not duplicate its underlying storage.
    pub fn ref_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// `true` if `self` and `other` are clones of the same underlying
    /// schema (pointer equality on the shared inner state), per
    /// `spec.md` §4.5.3's "If `src == dst` (pointer equality)"
    /// shorthand.
    pub fn is_same_as(&self, other: &Schema) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Attaches an opaque, schema-owned context value under `ident`,
    /// replacing the original's `(pointer, free_fn)` pair
    /// (`spec.md` §3: "Schema contexts are keyed by integer idents").
    /// Ordinary `Drop` on the boxed value stands in for the original's
    /// explicit free callback.
    pub fn set_context(&self, ident: u32, value: Box<dyn Any + Send + Sync>) {
        self.inner
            .lock()
            .expect("schema poisoned")
            .contexts
            .insert(ident, value);
    }

    pub fn with_context<T: 'static, R>(&self, ident: u32, f: impl FnOnce(Option<&T>) -> R) -> R {
        let inner = self.inner.lock().expect("schema poisoned");
        let value = inner.contexts.get(&ident).and_then(|b| b.downcast_ref::<T>());
        f(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::StaticInformationModel;

    fn model() -> Arc<dyn InformationModel> {
        Arc::new(StaticInformationModel::with_core_elements())
    }

    #[test]
    fn freeze_assigns_sequential_offsets() {
        let schema = Schema::create(model(), None).unwrap();
        schema.insert_field_by_name("sourceIPv4Address").unwrap();
        schema.insert_field_by_name("sourceTransportPort").unwrap();
        schema.freeze().unwrap();
        let fields = schema.fields();
        assert_eq!(fields[0].offset(), Some(0));
        assert_eq!(fields[1].offset(), Some(4));
        assert_eq!(schema.record_len().unwrap(), 6);
    }

    #[test]
    fn insert_after_freeze_is_rejected() {
        let schema = Schema::create(model(), None).unwrap();
        schema.freeze().unwrap();
        assert!(matches!(
            schema.insert_field_by_name("protocolIdentifier"),
            Err(SchemaError::Frozen)
        ));
    }

    #[test]
    fn clone_shares_the_same_backing_storage() {
        let schema = Schema::create(model(), None).unwrap();
        let clone = schema.clone();
        assert_eq!(schema.ref_count(), clone.ref_count());
        assert!(schema.ref_count() >= 2);
    }

    #[test]
    fn freeze_auto_allocates_a_template_id() {
        let schema = Schema::create(model(), None).unwrap();
        schema.insert_field_by_name("protocolIdentifier").unwrap();
        schema.freeze().unwrap();
        assert_eq!(schema.template_id(), Some(silk_dtyp::ident::FIRST_TEMPLATE_ID));
    }
}
