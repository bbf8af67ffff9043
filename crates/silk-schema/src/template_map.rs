//! [`TemplateMap`]: a per-copy scratch that tracks every template a
//! deep copy touches, resolves id collisions, and replays a
//! consistent registration into a destination session (`spec.md`
//! §4.5.2).

use crate::error::Result;
use crate::session::{Session, Template};
use std::collections::HashMap;
use std::sync::Arc;

/// One entry collected while walking a record's list fields (and
/// their sublists): the template as seen at the source, and the id it
/// should be registered at in the destination — `None` once an id
/// collision in the destination forces it to auto-allocate instead.
struct Entry {
    template: Arc<Template>,
    dst_id: Option<u16>,
}

/// Collects `(template, template_id)` pairs touched by a deep copy,
/// then replays them into a destination [`Session`] once all
/// collisions are known (`spec.md` §4.5.2).
#[derive(Default)]
pub struct TemplateMap {
    entries: Vec<Entry>,
    seen_ids: HashMap<u16, usize>,
}

impl TemplateMap {
    pub fn new() -> Self {
        TemplateMap::default()
    }

    /// Records that `template` was encountered at its source id. If
    /// another, structurally different template was already recorded
    /// at the same id, both it and the new one are marked to
    /// auto-allocate in the destination instead of reusing the
    /// colliding id ("detects template-id collisions ... sets the
    /// colliding id to auto").
    pub fn record(&mut self, template: Arc<Template>) {
        if let Some(&existing_idx) = self.seen_ids.get(&template.id) {
            if !self.entries[existing_idx].template.structurally_equal(&template) {
                self.entries[existing_idx].dst_id = None;
                self.entries.push(Entry {
                    template,
                    dst_id: None,
                });
                return;
            }
            return;
        }
        let idx = self.entries.len();
        let id = template.id;
        self.entries.push(Entry {
            template,
            dst_id: Some(id),
        });
        self.seen_ids.insert(id, idx);
    }

    /// Replays every recorded template into `dst`: templates with a
    /// surviving id are registered at that id; templates whose id was
    /// reset to auto are matched against an existing equivalent
    /// template in `dst`, or added fresh.
    pub fn replay_into(&self, dst: &Session) -> Result<HashMap<u16, u16>> {
        let mut remap = HashMap::new();
        for entry in &self.entries {
            let new_tmpl = match entry.dst_id {
                Some(id) => dst.register_at(id, entry.template.fields.clone())?,
                None => match dst.find_matching(&entry.template.fields) {
                    Some(existing) => existing,
                    None => dst.register(entry.template.fields.clone())?,
                },
            };
            remap.insert(entry.template.id, new_tmpl.id);
        }
        Ok(remap)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Datatype, InformationElement};
    use crate::session::StaticInformationModel;

    fn tmpl(id: u16, element_id: u16) -> Arc<Template> {
        Arc::new(Template {
            id,
            fields: vec![InformationElement::new(0, element_id, "f", Datatype::UnsignedInt8)],
        })
    }

    #[test]
    fn colliding_ids_with_different_shapes_fall_back_to_auto() {
        let mut map = TemplateMap::new();
        map.record(tmpl(300, 4));
        map.record(tmpl(300, 8));
        assert_eq!(map.len(), 2);

        let model: Arc<dyn crate::session::InformationModel> =
            Arc::new(StaticInformationModel::new());
        let session = Session::new(model);
        let remap = map.replay_into(&session).unwrap();
        assert_eq!(remap.len(), 2);
        let ids: std::collections::HashSet<_> = remap.values().collect();
        assert_eq!(ids.len(), 2, "colliding templates must land at distinct ids");
    }

    #[test]
    fn identical_id_and_shape_is_recorded_once() {
        let mut map = TemplateMap::new();
        map.record(tmpl(300, 4));
        map.record(tmpl(300, 4));
        assert_eq!(map.len(), 1);
    }
}
