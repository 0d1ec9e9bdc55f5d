//! Resource types (entity and complex) and resource sets.

use super::types::PrimitiveKind;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceTypeKind {
    Entity,
    Complex,
}

/// Shape of a declared property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    Primitive(PrimitiveKind),
    /// Full name of a complex type.
    Complex(String),
    PrimitiveCollection(PrimitiveKind),
    ComplexCollection(String),
    /// Full name of the target entity type; `many` for collection-valued navigation.
    Navigation { target: String, many: bool },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Property {
    pub name: String,
    pub kind: PropertyKind,
    pub nullable: bool,
}

impl Property {
    pub fn is_navigation(&self) -> bool {
        matches!(self.kind, PropertyKind::Navigation { .. })
    }
}

/// A named entity or complex type.
///
/// Built fluently:
///
/// ```rust
/// use odata_service::model::{PrimitiveKind, ResourceType};
///
/// let customer = ResourceType::entity("Demo", "Customer")
///     .key("ID", PrimitiveKind::Int32)
///     .property("Name", PrimitiveKind::String)
///     .etag_property("Version", PrimitiveKind::Int32)
///     .navigation("Orders", "Demo.Order", true);
/// assert_eq!(customer.full_name(), "Demo.Customer");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceType {
    pub namespace: String,
    pub name: String,
    pub kind: ResourceTypeKind,
    /// Full name of the base type.
    pub base_type: Option<String>,
    pub is_abstract: bool,
    /// Declared (not inherited) properties in declaration order.
    pub properties: Vec<Property>,
    /// Declared key property names; inherited from the root type when empty.
    pub key: Vec<String>,
    /// Declared concurrency (ETag) property names.
    pub etag: Vec<String>,
}

impl ResourceType {
    fn new(namespace: &str, name: &str, kind: ResourceTypeKind) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind,
            base_type: None,
            is_abstract: false,
            properties: Vec::new(),
            key: Vec::new(),
            etag: Vec::new(),
        }
    }

    pub fn entity(namespace: &str, name: &str) -> Self {
        Self::new(namespace, name, ResourceTypeKind::Entity)
    }

    pub fn complex(namespace: &str, name: &str) -> Self {
        Self::new(namespace, name, ResourceTypeKind::Complex)
    }

    pub fn full_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    pub fn is_entity(&self) -> bool {
        self.kind == ResourceTypeKind::Entity
    }

    pub fn derives_from(mut self, base: impl Into<String>) -> Self {
        self.base_type = Some(base.into());
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    fn push(mut self, name: &str, kind: PropertyKind, nullable: bool) -> Self {
        self.properties.push(Property {
            name: name.to_string(),
            kind,
            nullable,
        });
        self
    }

    pub fn key(mut self, name: &str, kind: PrimitiveKind) -> Self {
        self.key.push(name.to_string());
        self.push(name, PropertyKind::Primitive(kind), false)
    }

    pub fn property(self, name: &str, kind: PrimitiveKind) -> Self {
        self.push(name, PropertyKind::Primitive(kind), true)
    }

    pub fn required(self, name: &str, kind: PrimitiveKind) -> Self {
        self.push(name, PropertyKind::Primitive(kind), false)
    }

    pub fn etag_property(mut self, name: &str, kind: PrimitiveKind) -> Self {
        self.etag.push(name.to_string());
        self.push(name, PropertyKind::Primitive(kind), true)
    }

    pub fn complex_property(self, name: &str, type_name: &str) -> Self {
        self.push(name, PropertyKind::Complex(type_name.to_string()), true)
    }

    pub fn primitive_collection(self, name: &str, kind: PrimitiveKind) -> Self {
        self.push(name, PropertyKind::PrimitiveCollection(kind), false)
    }

    pub fn complex_collection(self, name: &str, type_name: &str) -> Self {
        self.push(
            name,
            PropertyKind::ComplexCollection(type_name.to_string()),
            false,
        )
    }

    pub fn navigation(self, name: &str, target: &str, many: bool) -> Self {
        self.push(
            name,
            PropertyKind::Navigation {
                target: target.to_string(),
                many,
            },
            !many,
        )
    }
}

/// A named, addressable collection of entities.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceSet {
    pub name: String,
    /// Full name of the set's entity type.
    pub entity_type: String,
    /// Navigation property name to target set name.
    pub navigation_targets: BTreeMap<String, String>,
}

impl ResourceSet {
    pub fn new(name: &str, entity_type: &str) -> Self {
        Self {
            name: name.to_string(),
            entity_type: entity_type.to_string(),
            navigation_targets: BTreeMap::new(),
        }
    }

    pub fn navigates(mut self, property: &str, target_set: &str) -> Self {
        self.navigation_targets
            .insert(property.to_string(), target_set.to_string());
        self
    }
}
