//! JSON response payloads at the three metadata levels, the service document, and
//! error bodies.

use super::{MetadataLevel, WriteContext};
use crate::error::ServiceError;
use crate::model::{Entity, PropertyKind, TypeRef, Value};
use serde_json::{json, Map, Value as Json};

pub struct JsonWriter<'a> {
    ctx: WriteContext<'a>,
    level: MetadataLevel,
}

impl<'a> JsonWriter<'a> {
    pub fn new(ctx: WriteContext<'a>, level: MetadataLevel) -> Self {
        Self { ctx, level }
    }

    fn with_context(&self, fragment: &str) -> Map<String, Json> {
        let mut object = Map::new();
        if self.level != MetadataLevel::None {
            object.insert(
                "@odata.context".to_string(),
                Json::String(self.ctx.context_url(fragment)),
            );
        }
        object
    }

    /// A single entity, addressed through `set` with static type `static_type`.
    pub fn entity(&self, set: &str, static_type: &str, entity: &Entity, select: Option<&[String]>) -> Json {
        let fragment = if self.is_set_type(set, static_type) {
            format!("{set}/$entity")
        } else {
            format!("{set}/{static_type}/$entity")
        };
        let mut object = self.with_context(&fragment);
        object.extend(self.entity_members(set, static_type, entity, select));
        Json::Object(object)
    }

    /// A collection of entities with an optional `@odata.count`.
    pub fn feed(
        &self,
        set: &str,
        static_type: &str,
        entities: &[Entity],
        count: Option<usize>,
        select: Option<&[String]>,
    ) -> Json {
        let fragment = if self.is_set_type(set, static_type) {
            set.to_string()
        } else {
            format!("{set}/{static_type}")
        };
        let mut object = self.with_context(&fragment);
        if let Some(count) = count {
            object.insert("@odata.count".to_string(), json!(count));
        }
        let items = entities
            .iter()
            .map(|e| Json::Object(self.entity_members(set, static_type, e, select)))
            .collect();
        object.insert("value".to_string(), Json::Array(items));
        Json::Object(object)
    }

    /// A property value or a non-entity operation result of type `type_ref`.
    ///
    /// Complex values are written as a bare object; everything else is wrapped in `value`.
    pub fn value(&self, type_ref: &TypeRef, value: &Value) -> Json {
        let mut object = self.with_context(&type_ref.edm_name());
        match (type_ref, self.value_json(value)) {
            (TypeRef::Complex(_), Json::Object(members)) => object.extend(members),
            (_, json) => {
                object.insert("value".to_string(), json);
            }
        }
        Json::Object(object)
    }

    /// The service document listing the visible entity sets.
    pub fn service_document(&self) -> Json {
        let sets: Vec<Json> = self
            .ctx
            .model
            .sets()
            .filter(|s| self.ctx.gate.is_set_visible(&s.name))
            .map(|s| json!({"name": s.name, "kind": "EntitySet", "url": s.name}))
            .collect();
        let mut object = Map::new();
        if self.level != MetadataLevel::None {
            object.insert("@odata.context".to_string(), Json::String(self.ctx.metadata_url()));
        }
        object.insert("value".to_string(), Json::Array(sets));
        Json::Object(object)
    }

    fn is_set_type(&self, set: &str, type_name: &str) -> bool {
        self.ctx
            .model
            .set(set)
            .is_some_and(|s| s.entity_type == type_name)
    }

    fn entity_members(
        &self,
        set: &str,
        static_type: &str,
        entity: &Entity,
        select: Option<&[String]>,
    ) -> Map<String, Json> {
        let mut object = Map::new();
        let full = self.level == MetadataLevel::Full;
        if full || (self.level == MetadataLevel::Minimal && entity.type_name() != static_type) {
            object.insert(
                "@odata.type".to_string(),
                Json::String(format!("#{}", entity.type_name())),
            );
        }
        if full {
            if let Some(id) = self.ctx.entity_id(set, entity) {
                object.insert("@odata.id".to_string(), Json::String(id));
            }
            if let Some(link) = self.ctx.edit_link(set, entity) {
                object.insert("@odata.editLink".to_string(), Json::String(link));
            }
        }
        if self.level != MetadataLevel::None {
            if let Some(etag) = entity.compute_etag() {
                object.insert("@odata.etag".to_string(), Json::String(etag));
            }
        }
        if full {
            for action in self.ctx.advertised_actions(set, entity) {
                object.insert(
                    format!("#{}", action.qualified_name),
                    json!({"title": action.title, "target": action.target}),
                );
            }
        }

        let selected = |name: &str| select.map_or(true, |names| names.iter().any(|n| n == name));
        let edit_link = self.ctx.edit_link(set, entity);
        for property in self.ctx.model.properties(entity.type_name()) {
            if !selected(&property.name) {
                continue;
            }
            if let PropertyKind::Navigation { .. } = property.kind {
                if let (true, Some(link)) = (full, &edit_link) {
                    object.insert(
                        format!("{}@odata.navigationLink", property.name),
                        Json::String(format!("{link}/{}", property.name)),
                    );
                }
                continue;
            }
            let value = entity.get(&property.name).unwrap_or(&Value::Null);
            object.insert(property.name.clone(), self.value_json(value));
        }
        object
    }

    fn value_json(&self, value: &Value) -> Json {
        match value {
            Value::Null => Json::Null,
            Value::Boolean(v) => json!(v),
            Value::Int32(v) => json!(v),
            Value::Int64(v) => json!(v),
            Value::Double(v) if v.is_nan() => json!("NaN"),
            Value::Double(v) if v.is_infinite() => json!(if *v > 0.0 { "INF" } else { "-INF" }),
            Value::Double(v) => json!(v),
            Value::String(v) => json!(v),
            Value::Guid(v) => json!(v.to_string()),
            Value::DateTimeOffset(v) => json!(v.to_rfc3339()),
            Value::Complex(complex) => {
                let mut object = Map::new();
                if self.level == MetadataLevel::Full {
                    object.insert(
                        "@odata.type".to_string(),
                        Json::String(format!("#{}", complex.type_name)),
                    );
                }
                for property in self.ctx.model.properties(&complex.type_name) {
                    let value = complex.properties.get(&property.name).unwrap_or(&Value::Null);
                    object.insert(property.name.clone(), self.value_json(value));
                }
                Json::Object(object)
            }
            Value::Collection(items) => Json::Array(items.iter().map(|v| self.value_json(v)).collect()),
        }
    }
}

/// `{"error":{"code":"","message":...}}`, with the root cause under `innererror`
/// when verbose errors are enabled.
pub fn error_body(error: &ServiceError, verbose: bool) -> Json {
    let mut body = Map::new();
    body.insert("code".to_string(), json!(""));
    body.insert("message".to_string(), json!(error.to_string()));
    if verbose {
        body.insert(
            "innererror".to_string(),
            json!({"message": error.root_message(), "type": error.kind(), "status": error.status().as_u16()}),
        );
    }
    json!({ "error": body })
}

pub fn to_bytes(json: &Json) -> Vec<u8> {
    json.to_string().into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessGate;
    use crate::invoke::{handler_fn, InvocationResult, OperationRegistry};
    use crate::model::{
        BindingKind, ComplexValue, ModelBuilder, OperationDefinition, PrimitiveKind, ResourceSet,
        ResourceType, ServiceModel,
    };
    use std::sync::Arc;

    fn model() -> ServiceModel {
        ModelBuilder::new("Demo")
            .add_type(ResourceType::complex("Demo", "Address").property("City", PrimitiveKind::String))
            .add_type(
                ResourceType::entity("Demo", "Customer")
                    .key("ID", PrimitiveKind::Int32)
                    .property("Name", PrimitiveKind::String)
                    .etag_property("Version", PrimitiveKind::Int32)
                    .navigation("Orders", "Demo.Order", true),
            )
            .add_type(ResourceType::entity("Demo", "Vip").derives_from("Demo.Customer"))
            .add_type(ResourceType::entity("Demo", "Order").key("ID", PrimitiveKind::Int32))
            .add_set(ResourceSet::new("Customers", "Demo.Customer").navigates("Orders", "Orders"))
            .add_set(ResourceSet::new("Orders", "Demo.Order"))
            .build()
            .unwrap()
    }

    fn registry(model: &ServiceModel) -> OperationRegistry {
        let mut registry = OperationRegistry::new();
        registry
            .register(
                model,
                OperationDefinition::action("Demo", "Promote").binding(
                    BindingKind::Always,
                    "c",
                    TypeRef::Entity("Demo.Vip".into()),
                ),
                handler_fn(|_, _| async { Ok(InvocationResult::Void) }),
            )
            .unwrap();
        registry
    }

    fn customer(model: &ServiceModel, type_name: &str) -> Entity {
        Entity::new(Arc::clone(model.shape(type_name).unwrap()))
            .with("ID", 1)
            .with("Name", "Ann")
            .with("Version", 4)
    }

    #[test]
    fn test_minimal_entity() {
        let model = model();
        let registry = registry(&model);
        let gate = AccessGate::allow_all();
        let ctx = WriteContext {
            model: &model,
            registry: &registry,
            gate: &gate,
            service_root: "http://host",
        };
        let json = JsonWriter::new(ctx, MetadataLevel::Minimal).entity(
            "Customers",
            "Demo.Customer",
            &customer(&model, "Demo.Customer"),
            None,
        );
        assert_eq!(
            json.to_string(),
            r#"{"@odata.context":"http://host/$metadata#Customers/$entity","@odata.etag":"W/\"4\"","ID":1,"Name":"Ann","Version":4}"#
        );
    }

    #[test]
    fn test_full_metadata_advertises_actions() {
        let model = model();
        let registry = registry(&model);
        let gate = AccessGate::allow_all();
        let ctx = WriteContext {
            model: &model,
            registry: &registry,
            gate: &gate,
            service_root: "http://host",
        };
        let writer = JsonWriter::new(ctx, MetadataLevel::Full);
        let json = writer.entity("Customers", "Demo.Customer", &customer(&model, "Demo.Vip"), None);
        assert_eq!(json["@odata.type"], "#Demo.Vip");
        assert_eq!(json["@odata.id"], "http://host/Customers(1)");
        assert_eq!(
            json["#Demo.Promote"]["target"],
            "http://host/Customers(1)/Demo.Vip/Demo.Promote"
        );
        assert_eq!(json["Orders@odata.navigationLink"], "Customers(1)/Orders");

        let json = writer.entity("Customers", "Demo.Customer", &customer(&model, "Demo.Customer"), None);
        assert!(json.get("#Demo.Promote").is_none());
    }

    #[test]
    fn test_values_and_feeds() {
        let model = model();
        let registry = OperationRegistry::new();
        let gate = AccessGate::allow_all();
        let ctx = WriteContext {
            model: &model,
            registry: &registry,
            gate: &gate,
            service_root: "http://host",
        };
        let writer = JsonWriter::new(ctx, MetadataLevel::Minimal);
        assert_eq!(
            writer
                .value(&TypeRef::Primitive(PrimitiveKind::String), &Value::from("entity1"))
                .to_string(),
            r#"{"@odata.context":"http://host/$metadata#Edm.String","value":"entity1"}"#
        );
        assert_eq!(
            writer
                .value(
                    &TypeRef::PrimitiveCollection(PrimitiveKind::String),
                    &Value::Collection(vec![])
                )
                .to_string(),
            r#"{"@odata.context":"http://host/$metadata#Collection(Edm.String)","value":[]}"#
        );
        let address = Value::Complex(ComplexValue::new("Demo.Address").with("City", "Oslo"));
        assert_eq!(
            writer.value(&TypeRef::Complex("Demo.Address".into()), &address).to_string(),
            r#"{"@odata.context":"http://host/$metadata#Demo.Address","City":"Oslo"}"#
        );
        let feed = writer.feed("Customers", "Demo.Customer", &[], Some(0), None);
        assert_eq!(
            feed.to_string(),
            r#"{"@odata.context":"http://host/$metadata#Customers","@odata.count":0,"value":[]}"#
        );
    }

    #[test]
    fn test_error_body() {
        let err = ServiceError::resource_not_found("Set");
        assert_eq!(
            error_body(&err, false).to_string(),
            r#"{"error":{"code":"","message":"Resource not found for the segment 'Set'."}}"#
        );
        assert_eq!(
            error_body(&err, true)["error"]["innererror"]["message"],
            "Resource not found for the segment 'Set'."
        );
    }
}
