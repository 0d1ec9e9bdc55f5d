//! Primitive kinds and type references used by properties, parameters, and return types.

use std::fmt::{self, Display};

/// EDM primitive types supported by the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Boolean,
    Int32,
    Int64,
    Double,
    String,
    Guid,
    DateTimeOffset,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 7] = [
        PrimitiveKind::Boolean,
        PrimitiveKind::Int32,
        PrimitiveKind::Int64,
        PrimitiveKind::Double,
        PrimitiveKind::String,
        PrimitiveKind::Guid,
        PrimitiveKind::DateTimeOffset,
    ];

    pub fn edm_name(self) -> &'static str {
        match self {
            PrimitiveKind::Boolean => "Edm.Boolean",
            PrimitiveKind::Int32 => "Edm.Int32",
            PrimitiveKind::Int64 => "Edm.Int64",
            PrimitiveKind::Double => "Edm.Double",
            PrimitiveKind::String => "Edm.String",
            PrimitiveKind::Guid => "Edm.Guid",
            PrimitiveKind::DateTimeOffset => "Edm.DateTimeOffset",
        }
    }

    pub fn from_edm_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.edm_name() == name)
    }

    /// Name without the `Edm.` prefix, as used by Atom `m:type` attributes.
    pub fn short_name(self) -> &'static str {
        &self.edm_name()[4..]
    }

    /// Whether a property of this kind can serve as an entity key.
    pub fn is_key_kind(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Int32
                | PrimitiveKind::Int64
                | PrimitiveKind::String
                | PrimitiveKind::Guid
                | PrimitiveKind::Boolean
        )
    }
}

impl Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.edm_name())
    }
}

/// Reference to a type, as declared by an operation parameter or return type.
///
/// Complex and entity types are referenced by full name (`Namespace.Name`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeRef {
    Primitive(PrimitiveKind),
    Complex(String),
    Entity(String),
    PrimitiveCollection(PrimitiveKind),
    ComplexCollection(String),
    /// An enumerable of entities; not composable.
    EntityCollection(String),
    /// A queryable of entities; composable when returned by a service operation.
    EntityQueryable(String),
}

impl TypeRef {
    pub fn is_collection(&self) -> bool {
        matches!(
            self,
            TypeRef::PrimitiveCollection(_)
                | TypeRef::ComplexCollection(_)
                | TypeRef::EntityCollection(_)
                | TypeRef::EntityQueryable(_)
        )
    }

    /// Entity type name when this reference is entity-valued (single or collection).
    pub fn entity_type(&self) -> Option<&str> {
        match self {
            TypeRef::Entity(name) | TypeRef::EntityCollection(name) | TypeRef::EntityQueryable(name) => {
                Some(name)
            }
            _ => None,
        }
    }

    /// CSDL / context-URL spelling, e.g. `Collection(Edm.String)`.
    pub fn edm_name(&self) -> String {
        match self {
            TypeRef::Primitive(kind) => kind.edm_name().to_string(),
            TypeRef::Complex(name) | TypeRef::Entity(name) => name.clone(),
            TypeRef::PrimitiveCollection(kind) => format!("Collection({})", kind.edm_name()),
            TypeRef::ComplexCollection(name)
            | TypeRef::EntityCollection(name)
            | TypeRef::EntityQueryable(name) => format!("Collection({name})"),
        }
    }
}

impl Display for TypeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.edm_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edm_names_round_trip() {
        for kind in PrimitiveKind::ALL {
            assert_eq!(PrimitiveKind::from_edm_name(kind.edm_name()), Some(kind));
        }
        assert_eq!(PrimitiveKind::from_edm_name("Edm.Decimal"), None);
        assert_eq!(PrimitiveKind::Int32.short_name(), "Int32");
    }

    #[test]
    fn test_type_ref_names() {
        assert_eq!(
            TypeRef::PrimitiveCollection(PrimitiveKind::String).edm_name(),
            "Collection(Edm.String)"
        );
        assert_eq!(
            TypeRef::EntityQueryable("NS.Customer".into()).edm_name(),
            "Collection(NS.Customer)"
        );
        assert_eq!(
            TypeRef::EntityCollection("NS.Customer".into()).entity_type(),
            Some("NS.Customer")
        );
        assert!(TypeRef::Complex("NS.Address".into()).entity_type().is_none());
    }
}
