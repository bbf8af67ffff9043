//! [`Session`]: the registry binding template ids to templates for a
//! stream or a standalone list (GLOSSARY: "Session"), and
//! [`InformationModel`]: the external collaborator that owns the
//! element registry (`spec.md` §6, out of scope for this crate to
//! populate from text).

use crate::element::InformationElement;
use crate::error::{Result, SchemaError};
use silk_dtyp::TemplateIdAllocator;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// An ordered tuple of information elements, identified by a 16-bit
/// id within a [`Session`] (GLOSSARY: "Template").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    pub id: u16,
    pub fields: Vec<InformationElement>,
}

impl Template {
    /// Structural equality on field identity (enterprise number +
    /// element id + datatype), ignoring the assigned id — used by
    /// [`crate::template_map::TemplateMap`] to find an existing
    /// equivalent template in a destination session rather than
    /// registering a duplicate.
    pub fn structurally_equal(&self, other: &Template) -> bool {
        self.fields.len() == other.fields.len()
            && self.fields.iter().zip(other.fields.iter()).all(|(a, b)| {
                a.enterprise_number == b.enterprise_number
                    && a.element_id == b.element_id
                    && a.datatype == b.datatype
            })
    }
}

/// The external information-element registry (`spec.md` §6). This
/// crate only consumes it: populating the registry from an IPFIX
/// element dictionary is explicitly out of scope (`spec.md` §1).
pub trait InformationModel: Send + Sync {
    fn lookup_by_id(&self, enterprise_number: u32, element_id: u16) -> Option<InformationElement>;
    fn lookup_by_name(&self, name: &str) -> Option<InformationElement>;
    /// Registers a new element and returns the stable copy now owned
    /// by the model (subsequent lookups return equal values).
    fn add_element(&self, ie: InformationElement) -> InformationElement;
}

/// A registry binding template ids to [`Template`]s, shared by every
/// schema built against it and by every list that needs to register
/// the templates its entries reference (`spec.md` §4.5.1).
///
/// Template ids are handed out by [`TemplateIdAllocator`], which is
/// process-wide per `spec.md` §5 ("a process-wide mutex in the
/// original"); a `Session` may also `register` a template at a
/// caller-chosen id (used when replaying a [`crate::template_map::TemplateMap`]
/// into a destination session that must preserve specific ids).
pub struct Session {
    model: Arc<dyn InformationModel>,
    allocator: Arc<TemplateIdAllocator>,
    templates: Mutex<HashMap<u16, Arc<Template>>>,
}

impl Session {
    pub fn new(model: Arc<dyn InformationModel>) -> Arc<Self> {
        Arc::new(Session {
            model,
            allocator: Arc::new(TemplateIdAllocator::new()),
            templates: Mutex::new(HashMap::new()),
        })
    }

    pub fn model(&self) -> &Arc<dyn InformationModel> {
        &self.model
    }

    /// Registers `fields` as a new template, auto-allocating an id.
    pub fn register(&self, fields: Vec<InformationElement>) -> Result<Arc<Template>> {
        let id = self.allocator.alloc()?;
        let tmpl = Arc::new(Template { id, fields });
        self.templates
            .lock()
            .expect("session template map poisoned")
            .insert(id, tmpl.clone());
        Ok(tmpl)
    }

    /// Registers `fields` at a specific id (used when replaying a
    /// template map with ids the caller insists on preserving).
    /// Returns [`SchemaError::Incompatible`] if that id is already
    /// bound to a structurally different template.
    pub fn register_at(&self, id: u16, fields: Vec<InformationElement>) -> Result<Arc<Template>> {
        let mut templates = self.templates.lock().expect("session template map poisoned");
        let candidate = Template { id, fields };
        if let Some(existing) = templates.get(&id) {
            if existing.structurally_equal(&candidate) {
                return Ok(existing.clone());
            }
            return Err(SchemaError::Incompatible);
        }
        let tmpl = Arc::new(candidate);
        templates.insert(id, tmpl.clone());
        Ok(tmpl)
    }

    pub fn get(&self, id: u16) -> Option<Arc<Template>> {
        self.templates
            .lock()
            .expect("session template map poisoned")
            .get(&id)
            .cloned()
    }

    /// Scans the session for a template structurally equal to
    /// `fields`, used by [`crate::template_map::TemplateMap`] replay
    /// for templates whose id collided and was reset to auto.
    pub fn find_matching(&self, fields: &[InformationElement]) -> Option<Arc<Template>> {
        let probe = Template {
            id: 0,
            fields: fields.to_vec(),
        };
        self.templates
            .lock()
            .expect("session template map poisoned")
            .values()
            .find(|t| t.structurally_equal(&probe))
            .cloned()
    }
}

/// A minimal, in-memory [`InformationModel`] pre-populated with the
/// core flow-record information elements this crate's own schemas
/// use. Production callers supply their own model (backed by the
/// full IPFIX/IANA registry); this one exists so `silk-schema`'s
/// tests, and any caller without an external registry, have
/// something concrete to build schemas against.
#[derive(Default)]
pub struct StaticInformationModel {
    by_key: Mutex<HashMap<(u32, u16), InformationElement>>,
    by_name: Mutex<HashMap<String, InformationElement>>,
}

impl StaticInformationModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_core_elements() -> Self {
        let model = Self::new();
        use crate::element::Datatype::*;
        let core: &[(u16, &str, crate::element::Datatype)] = &[
            (8, "sourceIPv4Address", Ipv4Address),
            (12, "destinationIPv4Address", Ipv4Address),
            (27, "sourceIPv6Address", Ipv6Address),
            (28, "destinationIPv6Address", Ipv6Address),
            (7, "sourceTransportPort", UnsignedInt16),
            (11, "destinationTransportPort", UnsignedInt16),
            (4, "protocolIdentifier", UnsignedInt8),
            (152, "flowStartMilliseconds", DateTimeMilliseconds),
            (161, "flowDurationMilliseconds", UnsignedInt32),
            (2, "packetDeltaCount", UnsignedInt64),
            (1, "octetDeltaCount", UnsignedInt64),
            (6, "tcpControlBits", UnsignedInt8),
            (10, "ingressInterface", UnsignedInt32),
            (14, "egressInterface", UnsignedInt32),
            (15, "ipNextHopIPv4Address", Ipv4Address),
            (62, "ipNextHopIPv6Address", Ipv6Address),
        ];
        for (id, name, ty) in core {
            model.add_element(InformationElement::new(0, *id, name, *ty));
        }
        model
    }
}

impl InformationModel for StaticInformationModel {
    fn lookup_by_id(&self, enterprise_number: u32, element_id: u16) -> Option<InformationElement> {
        self.by_key
            .lock()
            .expect("model poisoned")
            .get(&(enterprise_number, element_id))
            .cloned()
    }

    fn lookup_by_name(&self, name: &str) -> Option<InformationElement> {
        self.by_name.lock().expect("model poisoned").get(name).cloned()
    }

    fn add_element(&self, ie: InformationElement) -> InformationElement {
        self.by_key
            .lock()
            .expect("model poisoned")
            .insert((ie.enterprise_number, ie.element_id), ie.clone());
        self.by_name
            .lock()
            .expect("model poisoned")
            .insert(ie.name.to_string(), ie.clone());
        ie
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::Datatype;

    #[test]
    fn register_auto_allocates_starting_at_257() {
        let model: Arc<dyn InformationModel> = Arc::new(StaticInformationModel::new());
        let session = Session::new(model);
        let tmpl = session
            .register(vec![InformationElement::new(0, 8, "sourceIPv4Address", Datatype::Ipv4Address)])
            .unwrap();
        assert_eq!(tmpl.id, 257);
        assert!(session.get(257).is_some());
    }

    #[test]
    fn register_at_colliding_id_with_same_shape_is_idempotent() {
        let model: Arc<dyn InformationModel> = Arc::new(StaticInformationModel::new());
        let session = Session::new(model);
        let fields = vec![InformationElement::new(0, 8, "sourceIPv4Address", Datatype::Ipv4Address)];
        let a = session.register_at(300, fields.clone()).unwrap();
        let b = session.register_at(300, fields).unwrap();
        assert_eq!(a.id, b.id);
    }

    #[test]
    fn register_at_colliding_id_with_different_shape_errors() {
        let model: Arc<dyn InformationModel> = Arc::new(StaticInformationModel::new());
        let session = Session::new(model);
        session
            .register_at(300, vec![InformationElement::new(0, 8, "a", Datatype::Ipv4Address)])
            .unwrap();
        let err = session
            .register_at(300, vec![InformationElement::new(0, 12, "b", Datatype::Ipv4Address)])
            .unwrap_err();
        assert!(matches!(err, SchemaError::Incompatible));
    }
}
