//! Payload reading and writing: JSON, Atom, CSDL, and content negotiation.

pub mod atom;
pub mod content_type;
pub mod csdl;
pub mod json_reader;
pub mod json_writer;

use crate::access::AccessGate;
use crate::invoke::OperationRegistry;
use crate::model::{Entity, OperationKind, ServiceModel, TypeRef};
use indexmap::IndexMap;

pub use content_type::{Format, MetadataLevel, PayloadKind};

/// Everything a writer needs to produce links and action advertisements.
#[derive(Clone, Copy)]
pub struct WriteContext<'a> {
    pub model: &'a ServiceModel,
    pub registry: &'a OperationRegistry,
    pub gate: &'a AccessGate,
    pub service_root: &'a str,
}

/// A bound action that can be invoked on a serialized entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvertisedAction {
    pub qualified_name: String,
    pub title: String,
    pub target: String,
}

impl<'a> WriteContext<'a> {
    pub fn metadata_url(&self) -> String {
        format!("{}/$metadata", self.service_root)
    }

    pub fn context_url(&self, fragment: &str) -> String {
        format!("{}#{fragment}", self.metadata_url())
    }

    /// Relative edit link, e.g. `Customers(1)`; `None` while the key is incomplete.
    pub fn edit_link(&self, set: &str, entity: &Entity) -> Option<String> {
        let key = entity.key()?;
        Some(format!("{set}({})", key.predicate(entity.shape())))
    }

    pub fn entity_id(&self, set: &str, entity: &Entity) -> Option<String> {
        self.edit_link(set, entity)
            .map(|link| format!("{}/{link}", self.service_root))
    }

    /// Visible bound actions applicable to `entity`, one per qualified name, choosing
    /// the overload with the most derived binding type.
    pub fn advertised_actions(&self, set: &str, entity: &Entity) -> Vec<AdvertisedAction> {
        let Some(id) = self.entity_id(set, entity) else {
            return Vec::new();
        };
        let set_type = self.model.set(set).map(|s| s.entity_type.as_str());

        let mut best: IndexMap<String, (usize, &str, &str)> = IndexMap::new();
        for op in self.registry.iter() {
            let definition = &op.definition;
            if definition.kind != OperationKind::Action || !self.gate.is_operation_visible(definition) {
                continue;
            }
            let Some(TypeRef::Entity(binding_type)) = definition.binding_parameter().map(|p| &p.type_ref)
            else {
                continue;
            };
            if !self.model.is_assignable(entity.type_name(), binding_type)
                || !op.handler.is_available(entity)
                || self.gate.result_set(self.model, definition, Some(set)).is_err()
            {
                continue;
            }
            let depth = self.model.ancestors(binding_type).count();
            let name = definition.qualified_name();
            if best.get(&name).map_or(true, |(d, _, _)| depth > *d) {
                best.insert(name, (depth, binding_type.as_str(), definition.name.as_str()));
            }
        }

        best.into_iter()
            .map(|(qualified_name, (_, binding_type, title))| {
                let target = if Some(binding_type) == set_type {
                    format!("{id}/{qualified_name}")
                } else {
                    format!("{id}/{binding_type}/{qualified_name}")
                };
                AdvertisedAction {
                    qualified_name,
                    title: title.to_string(),
                    target,
                }
            })
            .collect()
    }
}

pub(crate) fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
