//! The validated metadata model: resource types and resource sets.

use super::entity::EntityShape;
use super::resource::{Property, PropertyKind, ResourceSet, ResourceType, ResourceTypeKind};
use super::types::TypeRef;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Problems found while building a [`ServiceModel`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ModelError {
    #[error("Type '{0}' is declared more than once")]
    DuplicateType(String),
    #[error("Resource set '{0}' is declared more than once")]
    DuplicateSet(String),
    #[error("Type '{name}' references unknown type '{missing}'")]
    UnknownType { name: String, missing: String },
    #[error("Type '{0}' has a cyclic base type chain")]
    CyclicInheritance(String),
    #[error("Type '{name}' derives from '{base}' of a different kind")]
    BaseKindMismatch { name: String, base: String },
    #[error("Entity type '{0}' has no key")]
    MissingKey(String),
    #[error("Derived type '{0}' cannot redeclare the key")]
    DerivedKey(String),
    #[error("Key property '{property}' of '{name}' is not a key-compatible primitive")]
    InvalidKey { name: String, property: String },
    #[error("Property '{property}' is declared more than once on '{name}'")]
    DuplicateProperty { name: String, property: String },
    #[error("Complex type '{name}' cannot declare navigation property '{property}'")]
    ComplexNavigation { name: String, property: String },
    #[error("Resource set '{set}' must use an entity type, found '{type_name}'")]
    NotAnEntitySet { set: String, type_name: String },
    #[error("Resource set '{set}' binds unknown navigation property '{property}'")]
    UnknownNavigation { set: String, property: String },
    #[error("Navigation '{property}' of set '{set}' targets '{target}', which is missing or of the wrong type")]
    InvalidNavigationTarget {
        set: String,
        property: String,
        target: String,
    },
}

/// Collects types and sets, then validates them in [`ModelBuilder::build`].
pub struct ModelBuilder {
    namespace: String,
    container: String,
    types: Vec<ResourceType>,
    sets: Vec<ResourceSet>,
}

impl ModelBuilder {
    pub fn new(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            container: "Container".to_string(),
            types: Vec::new(),
            sets: Vec::new(),
        }
    }

    pub fn container(mut self, name: &str) -> Self {
        self.container = name.to_string();
        self
    }

    pub fn add_type(mut self, resource_type: ResourceType) -> Self {
        self.types.push(resource_type);
        self
    }

    pub fn add_set(mut self, set: ResourceSet) -> Self {
        self.sets.push(set);
        self
    }

    pub fn build(self) -> Result<ServiceModel, ModelError> {
        let mut types = IndexMap::new();
        for resource_type in self.types {
            let name = resource_type.full_name();
            if types.insert(name.clone(), resource_type).is_some() {
                return Err(ModelError::DuplicateType(name));
            }
        }
        let mut sets = IndexMap::new();
        for set in self.sets {
            let name = set.name.clone();
            if sets.insert(name.clone(), set).is_some() {
                return Err(ModelError::DuplicateSet(name));
            }
        }

        let mut model = ServiceModel {
            namespace: self.namespace,
            container: self.container,
            types,
            sets,
            shapes: IndexMap::new(),
        };
        model.validate_types()?;
        model.validate_sets()?;
        model.shapes = model
            .types
            .values()
            .filter(|t| t.is_entity())
            .map(|t| {
                let name = t.full_name();
                let shape = model.build_shape(&name);
                (name, Arc::new(shape))
            })
            .collect();

        info!(
            namespace = %model.namespace,
            types = model.types.len(),
            sets = model.sets.len(),
            "Model built"
        );
        Ok(model)
    }
}

/// Immutable, validated metadata shared by every request.
#[derive(Debug)]
pub struct ServiceModel {
    namespace: String,
    container: String,
    types: IndexMap<String, ResourceType>,
    sets: IndexMap<String, ResourceSet>,
    shapes: IndexMap<String, Arc<EntityShape>>,
}

impl ServiceModel {
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn resource_type(&self, name: &str) -> Option<&ResourceType> {
        self.types.get(name)
    }

    pub fn types(&self) -> impl Iterator<Item = &ResourceType> {
        self.types.values()
    }

    pub fn set(&self, name: &str) -> Option<&ResourceSet> {
        self.sets.get(name)
    }

    pub fn sets(&self) -> impl Iterator<Item = &ResourceSet> {
        self.sets.values()
    }

    pub fn shape(&self, type_name: &str) -> Option<&Arc<EntityShape>> {
        self.shapes.get(type_name)
    }

    /// The type itself followed by its base types, most derived first.
    pub fn ancestors<'a>(&'a self, type_name: &str) -> impl Iterator<Item = &'a ResourceType> + 'a {
        let mut next = self.types.get(type_name);
        let mut seen = 0usize;
        let limit = self.types.len();
        std::iter::from_fn(move || {
            let current = next?;
            seen += 1;
            if seen > limit {
                return None;
            }
            next = current
                .base_type
                .as_deref()
                .and_then(|base| self.types.get(base));
            Some(current)
        })
    }

    /// Whether a value of type `from` can be used where `to` is expected.
    pub fn is_assignable(&self, from: &str, to: &str) -> bool {
        self.ancestors(from).any(|t| t.full_name() == to)
    }

    /// Types assignable to `type_name`, including itself.
    pub fn derived_types<'a>(&'a self, type_name: &'a str) -> impl Iterator<Item = &'a ResourceType> + 'a {
        self.types
            .values()
            .filter(move |t| self.is_assignable(&t.full_name(), type_name))
    }

    /// Looks up a property declared on the type or any base type.
    pub fn property(&self, type_name: &str, name: &str) -> Option<&Property> {
        self.ancestors(type_name)
            .find_map(|t| t.properties.iter().find(|p| p.name == name))
    }

    /// All properties of the type, base type properties first.
    pub fn properties(&self, type_name: &str) -> Vec<&Property> {
        let chain: Vec<&ResourceType> = self.ancestors(type_name).collect();
        chain
            .into_iter()
            .rev()
            .flat_map(|t| t.properties.iter())
            .collect()
    }

    /// Set reached from `set` through the navigation property `property`.
    pub fn navigation_target(&self, set: &str, property: &str) -> Option<&ResourceSet> {
        self.sets
            .get(set)?
            .navigation_targets
            .get(property)
            .and_then(|target| self.sets.get(target))
    }

    /// Static type of a property as a [`TypeRef`].
    pub fn property_type(&self, property: &Property) -> TypeRef {
        match &property.kind {
            PropertyKind::Primitive(kind) => TypeRef::Primitive(*kind),
            PropertyKind::Complex(name) => TypeRef::Complex(name.clone()),
            PropertyKind::PrimitiveCollection(kind) => TypeRef::PrimitiveCollection(*kind),
            PropertyKind::ComplexCollection(name) => TypeRef::ComplexCollection(name.clone()),
            PropertyKind::Navigation { target, many: true } => {
                TypeRef::EntityCollection(target.clone())
            }
            PropertyKind::Navigation { target, many: false } => TypeRef::Entity(target.clone()),
        }
    }

    /// Whether a type reference names a type of this model (or a primitive).
    pub fn resolves(&self, type_ref: &TypeRef) -> bool {
        match type_ref {
            TypeRef::Primitive(_) | TypeRef::PrimitiveCollection(_) => true,
            TypeRef::Complex(name) | TypeRef::ComplexCollection(name) => self
                .types
                .get(name)
                .is_some_and(|t| t.kind == ResourceTypeKind::Complex),
            TypeRef::Entity(name) | TypeRef::EntityCollection(name) | TypeRef::EntityQueryable(name) => {
                self.types.get(name).is_some_and(ResourceType::is_entity)
            }
        }
    }

    fn build_shape(&self, type_name: &str) -> EntityShape {
        let chain: Vec<&ResourceType> = self.ancestors(type_name).collect();
        let key = chain
            .iter()
            .rev()
            .flat_map(|t| t.key.iter())
            .filter_map(|name| match self.property(type_name, name).map(|p| &p.kind) {
                Some(PropertyKind::Primitive(kind)) => Some((name.clone(), *kind)),
                _ => None,
            })
            .collect();
        let etag = chain.iter().rev().flat_map(|t| t.etag.iter().cloned()).collect();
        EntityShape {
            type_name: type_name.to_string(),
            key,
            etag,
        }
    }

    fn validate_types(&self) -> Result<(), ModelError> {
        for resource_type in self.types.values() {
            let name = resource_type.full_name();

            if let Some(base) = &resource_type.base_type {
                let Some(base_type) = self.types.get(base) else {
                    return Err(ModelError::UnknownType {
                        name,
                        missing: base.clone(),
                    });
                };
                if base_type.kind != resource_type.kind {
                    return Err(ModelError::BaseKindMismatch {
                        name,
                        base: base.clone(),
                    });
                }
                if self.ancestors(base).any(|t| t.full_name() == name) {
                    return Err(ModelError::CyclicInheritance(name));
                }
            }

            let mut seen = HashSet::new();
            for property in self.properties(&name) {
                if !seen.insert(property.name.as_str()) {
                    return Err(ModelError::DuplicateProperty {
                        name,
                        property: property.name.clone(),
                    });
                }
                match &property.kind {
                    PropertyKind::Primitive(_) | PropertyKind::PrimitiveCollection(_) => {}
                    PropertyKind::Complex(target) | PropertyKind::ComplexCollection(target) => {
                        if !self.resolves(&TypeRef::Complex(target.clone())) {
                            return Err(ModelError::UnknownType {
                                name,
                                missing: target.clone(),
                            });
                        }
                    }
                    PropertyKind::Navigation { target, .. } => {
                        if !resource_type.is_entity() {
                            return Err(ModelError::ComplexNavigation {
                                name,
                                property: property.name.clone(),
                            });
                        }
                        if !self.resolves(&TypeRef::Entity(target.clone())) {
                            return Err(ModelError::UnknownType {
                                name,
                                missing: target.clone(),
                            });
                        }
                    }
                }
            }

            if resource_type.is_entity() {
                match (&resource_type.base_type, resource_type.key.is_empty()) {
                    (None, true) => return Err(ModelError::MissingKey(name)),
                    (Some(_), false) => return Err(ModelError::DerivedKey(name)),
                    _ => {}
                }
                for key in &resource_type.key {
                    let valid = matches!(
                        self.property(&name, key).map(|p| &p.kind),
                        Some(PropertyKind::Primitive(kind)) if kind.is_key_kind()
                    );
                    if !valid {
                        return Err(ModelError::InvalidKey {
                            name,
                            property: key.clone(),
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn validate_sets(&self) -> Result<(), ModelError> {
        for set in self.sets.values() {
            if !self.resolves(&TypeRef::Entity(set.entity_type.clone())) {
                return Err(ModelError::NotAnEntitySet {
                    set: set.name.clone(),
                    type_name: set.entity_type.clone(),
                });
            }
            for (property, target) in &set.navigation_targets {
                // A binding may name a navigation property of a derived type.
                let nav = self
                    .derived_types(&set.entity_type)
                    .find_map(|t| t.properties.iter().find(|p| &p.name == property));
                let Some(PropertyKind::Navigation { target: nav_type, .. }) = nav.map(|p| &p.kind)
                else {
                    return Err(ModelError::UnknownNavigation {
                        set: set.name.clone(),
                        property: property.clone(),
                    });
                };
                let valid = self
                    .sets
                    .get(target)
                    .is_some_and(|t| self.is_assignable(nav_type, &t.entity_type)
                        || self.is_assignable(&t.entity_type, nav_type));
                if !valid {
                    return Err(ModelError::InvalidNavigationTarget {
                        set: set.name.clone(),
                        property: property.clone(),
                        target: target.clone(),
                    });
                }
            }
        }
        Ok(())
    }
}
