//! # Metadata Model
//!
//! Types, sets, operations, and rights that describe a data service, plus the
//! [`Entity`] record stored for each resource set.
//!
//! A [`ServiceModel`] is built once with [`ModelBuilder`] and shared read-only by every
//! request. Derived types reference their base type by name; assignability is an
//! ancestor-chain walk ([`ServiceModel::is_assignable`]).

pub mod entity;
pub mod operation;
pub mod resource;
pub mod rights;
pub mod service_model;
pub mod types;
pub mod value;

pub use entity::{
    Entity, EntityChanges, EntityCreate, EntityKey, EntityShape, EntityUpdate, KeyValue,
};
pub use operation::{BindingKind, OperationDefinition, OperationKind, Parameter, ResultSet};
pub use resource::{Property, PropertyKind, ResourceSet, ResourceType, ResourceTypeKind};
pub use rights::{
    AccessRules, EntitySetRights, OperationRights, ServiceActionRights, ServiceOperationRights,
};
pub use service_model::{ModelBuilder, ModelError, ServiceModel};
pub use types::{PrimitiveKind, TypeRef};
pub use value::{ComplexValue, Value};
