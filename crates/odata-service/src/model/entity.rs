//! Entity instances and their keys, stored by one `StoreActor<Entity>` per resource set.

use super::types::PrimitiveKind;
use super::value::Value;
use crate::error::ServiceError;
use crate::interceptor::{ChangeContext, UpdateOperation};
use crate::uri::literal::format_literal;
use async_trait::async_trait;
use odata_store::StoreEntity;
use std::collections::BTreeMap;
use std::fmt::{self, Display};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Per-type facts every instance needs: its name, key layout, and concurrency properties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityShape {
    pub type_name: String,
    /// Key properties (inherited from the root type) in declaration order.
    pub key: Vec<(String, PrimitiveKind)>,
    /// Concurrency properties, base type first.
    pub etag: Vec<String>,
}

/// One component of an entity key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KeyValue {
    Boolean(bool),
    Integer(i64),
    String(String),
    Guid(Uuid),
}

impl KeyValue {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Boolean(v) => Some(KeyValue::Boolean(*v)),
            Value::Int32(v) => Some(KeyValue::Integer(i64::from(*v))),
            Value::Int64(v) => Some(KeyValue::Integer(*v)),
            Value::String(v) => Some(KeyValue::String(v.clone())),
            Value::Guid(v) => Some(KeyValue::Guid(*v)),
            _ => None,
        }
    }

    /// Converts back to a property value of the declared key kind.
    pub fn to_value(&self, kind: PrimitiveKind) -> Option<Value> {
        match (self, kind) {
            (KeyValue::Integer(v), PrimitiveKind::Int32) => i32::try_from(*v).ok().map(Value::Int32),
            (KeyValue::Integer(v), PrimitiveKind::Int64) => Some(Value::Int64(*v)),
            (KeyValue::String(v), PrimitiveKind::String) => Some(Value::String(v.clone())),
            (KeyValue::Guid(v), PrimitiveKind::Guid) => Some(Value::Guid(*v)),
            (KeyValue::Boolean(v), PrimitiveKind::Boolean) => Some(Value::Boolean(*v)),
            _ => None,
        }
    }
}

impl Display for KeyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyValue::Boolean(v) => write!(f, "{v}"),
            KeyValue::Integer(v) => write!(f, "{v}"),
            KeyValue::String(v) => write!(f, "'{}'", v.replace('\'', "''")),
            KeyValue::Guid(v) => write!(f, "{v}"),
        }
    }
}

/// Key of an entity: one value per key property, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey(pub Vec<KeyValue>);

impl EntityKey {
    pub fn single(value: KeyValue) -> Self {
        Self(vec![value])
    }

    /// Key predicate text, e.g. `1` or `ID=1,Code='a'`.
    pub fn predicate(&self, shape: &EntityShape) -> String {
        match self.0.as_slice() {
            [single] => single.to_string(),
            values => shape
                .key
                .iter()
                .zip(values)
                .map(|((name, _), value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

impl From<u32> for EntityKey {
    fn from(value: u32) -> Self {
        Self::single(KeyValue::Integer(i64::from(value)))
    }
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(ToString::to_string).collect();
        f.write_str(&parts.join(","))
    }
}

/// An entity instance: structural property values plus navigation links.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    shape: Arc<EntityShape>,
    properties: BTreeMap<String, Value>,
    /// Navigation property name to keys of the linked entities in the target set.
    links: BTreeMap<String, Vec<EntityKey>>,
}

impl Entity {
    pub fn new(shape: Arc<EntityShape>) -> Self {
        Self {
            shape,
            properties: BTreeMap::new(),
            links: BTreeMap::new(),
        }
    }

    /// Links a navigation property to entities of its target set.
    pub fn linked(mut self, navigation: &str, keys: Vec<EntityKey>) -> Self {
        self.links.insert(navigation.to_string(), keys);
        self
    }

    pub fn links(&self, navigation: &str) -> &[EntityKey] {
        self.links.get(navigation).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        self.properties.insert(name.to_string(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> &BTreeMap<String, Value> {
        &self.properties
    }

    pub fn type_name(&self) -> &str {
        &self.shape.type_name
    }

    pub fn shape(&self) -> &Arc<EntityShape> {
        &self.shape
    }

    /// `None` while any key property is missing or null.
    pub fn key(&self) -> Option<EntityKey> {
        self.shape
            .key
            .iter()
            .map(|(name, _)| self.get(name).and_then(KeyValue::from_value))
            .collect::<Option<Vec<_>>>()
            .map(EntityKey)
    }

    /// Weak ETag over the concurrency properties, e.g. `W/"1,'abc'"`.
    pub fn compute_etag(&self) -> Option<String> {
        if self.shape.etag.is_empty() {
            return None;
        }
        let literals: Vec<String> = self
            .shape
            .etag
            .iter()
            .map(|name| format_literal(self.get(name).unwrap_or(&Value::Null)))
            .collect();
        Some(format!("W/\"{}\"", literals.join(",").replace('"', "%22")))
    }

    fn is_key_property(&self, name: &str) -> bool {
        self.shape.key.iter().any(|(key, _)| key == name)
    }

    fn fill_key(&mut self, key: &EntityKey) -> Result<(), ServiceError> {
        let shape = Arc::clone(&self.shape);
        for ((name, kind), value) in shape.key.iter().zip(&key.0) {
            let value = value.to_value(*kind).ok_or_else(|| {
                ServiceError::internal(format!(
                    "Generated key '{key}' does not fit key property '{name}'."
                ))
            })?;
            self.properties.insert(name.clone(), value);
        }
        Ok(())
    }
}

/// Payload accepted by the store to insert an entity.
#[derive(Debug)]
pub struct EntityCreate {
    pub entity: Entity,
}

/// Property values and navigation links carried by an update.
#[derive(Debug, Clone, Default)]
pub struct EntityChanges {
    pub values: BTreeMap<String, Value>,
    pub links: BTreeMap<String, Vec<EntityKey>>,
}

/// Change applied to a stored entity. Links named in the changes replace the
/// existing links of that navigation property in both modes.
#[derive(Debug, Clone)]
pub enum EntityUpdate {
    /// Replace every non-key property; properties absent from the changes become null.
    Replace(EntityChanges),
    /// Overwrite only the given properties.
    Merge(EntityChanges),
}

#[async_trait]
impl StoreEntity for Entity {
    type Key = EntityKey;
    type Create = EntityCreate;
    type Update = EntityUpdate;
    type Context = ChangeContext;
    type Error = ServiceError;

    fn from_create_params(key: EntityKey, params: EntityCreate) -> Result<Self, ServiceError> {
        let mut entity = params.entity;
        if entity.key().is_none() {
            entity.fill_key(&key)?;
        }
        Ok(entity)
    }

    fn etag(&self) -> Option<String> {
        self.compute_etag()
    }

    async fn on_create(&mut self, ctx: &ChangeContext) -> Result<(), ServiceError> {
        ctx.notify(self, UpdateOperation::Add).await
    }

    async fn on_update(
        &mut self,
        update: EntityUpdate,
        ctx: &ChangeContext,
    ) -> Result<(), ServiceError> {
        let changes = match update {
            EntityUpdate::Replace(changes) => {
                for (name, value) in self.properties.iter_mut() {
                    if !self.shape.key.iter().any(|(key, _)| key == name) {
                        *value = Value::Null;
                    }
                }
                changes
            }
            EntityUpdate::Merge(changes) => changes,
        };
        for (name, value) in changes.values {
            if !self.is_key_property(&name) {
                self.properties.insert(name, value);
            }
        }
        self.links.extend(changes.links);
        debug!(entity_type = %self.shape.type_name, "Applied update");
        ctx.notify(self, UpdateOperation::Change).await
    }

    async fn on_delete(&self, ctx: &ChangeContext) -> Result<(), ServiceError> {
        ctx.notify_delete(self).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape() -> Arc<EntityShape> {
        Arc::new(EntityShape {
            type_name: "Demo.Customer".into(),
            key: vec![("ID".into(), PrimitiveKind::Int32)],
            etag: vec!["Version".into(), "Name".into()],
        })
    }

    #[test]
    fn test_key_and_etag() {
        let entity = Entity::new(shape())
            .with("ID", 7)
            .with("Name", "O'Neil")
            .with("Version", 2);
        assert_eq!(
            entity.key(),
            Some(EntityKey::single(KeyValue::Integer(7)))
        );
        assert_eq!(entity.compute_etag().as_deref(), Some("W/\"2,'O''Neil'\""));
    }

    #[test]
    fn test_missing_key_is_filled_from_generated_key() {
        let entity = Entity::new(shape()).with("Name", "a");
        assert!(entity.key().is_none());
        let created = Entity::from_create_params(
            EntityKey::from(3),
            EntityCreate { entity },
        )
        .unwrap();
        assert_eq!(created.get("ID"), Some(&Value::Int32(3)));
    }

    #[test]
    fn test_composite_predicate() {
        let shape = EntityShape {
            type_name: "Demo.Line".into(),
            key: vec![
                ("Order".into(), PrimitiveKind::Int32),
                ("Code".into(), PrimitiveKind::String),
            ],
            etag: vec![],
        };
        let key = EntityKey(vec![KeyValue::Integer(1), KeyValue::String("a".into())]);
        assert_eq!(key.predicate(&shape), "Order=1,Code='a'");
        assert_eq!(key.to_string(), "1,'a'");
    }

    #[tokio::test]
    async fn test_replace_resets_absent_properties() {
        let mut entity = Entity::new(shape())
            .with("ID", 1)
            .with("Name", "a")
            .with("Version", 1);
        let ctx = ChangeContext::new("Customers", Vec::new());
        let changes = EntityChanges {
            values: BTreeMap::from([("Version".to_string(), Value::Int32(2))]),
            links: BTreeMap::new(),
        };
        entity
            .on_update(EntityUpdate::Replace(changes), &ctx)
            .await
            .unwrap();
        assert_eq!(entity.get("Name"), Some(&Value::Null));
        assert_eq!(entity.get("ID"), Some(&Value::Int32(1)));
        assert_eq!(entity.get("Version"), Some(&Value::Int32(2)));
    }
}
