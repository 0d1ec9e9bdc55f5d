//! Resolves raw segments against the model, the operation registry, and the access rules.
//!
//! At each position a name is tried as a resource set or property first, then as a
//! type cast, and only then as an operation.

use super::literal::parse_typed;
use super::parser::{split_key_text, RawSegment};
use super::segment::{ResolvedPath, Segment, SegmentKind, Target};
use crate::access::AccessGate;
use crate::binding::resolve_operation;
use crate::error::ServiceError;
use crate::invoke::{OperationRegistry, RegisteredOperation};
use crate::model::{EntityKey, EntityShape, KeyValue, Property, PropertyKind, ServiceModel, TypeRef};
use std::sync::Arc;
use tracing::trace;

pub struct PathResolver<'a> {
    model: &'a ServiceModel,
    registry: &'a OperationRegistry,
    gate: &'a AccessGate,
}

impl<'a> PathResolver<'a> {
    pub fn new(model: &'a ServiceModel, registry: &'a OperationRegistry, gate: &'a AccessGate) -> Self {
        Self {
            model,
            registry,
            gate,
        }
    }

    pub fn resolve(&self, raw: &[RawSegment]) -> Result<ResolvedPath, ServiceError> {
        let mut segments: Vec<Segment> = Vec::with_capacity(raw.len());
        for (index, raw_segment) in raw.iter().enumerate() {
            let segment = match segments.last() {
                None => self.resolve_first(raw_segment, index + 1 < raw.len())?,
                Some(previous) => {
                    ensure_composable(previous)?;
                    self.resolve_next(previous, raw_segment)?
                }
            };
            trace!(segment = %segment.identifier, target = ?segment.target, "Resolved segment");
            segments.push(segment);
        }
        Ok(ResolvedPath { segments })
    }

    fn resolve_first(&self, raw: &RawSegment, has_more: bool) -> Result<Segment, ServiceError> {
        let id = raw.identifier.as_str();
        match id {
            "$metadata" => return special(raw, SegmentKind::Metadata, Target::Metadata),
            "$batch" => return special(raw, SegmentKind::Batch, Target::Batch),
            "$count" | "$value" => return Err(ServiceError::resource_not_found(id)),
            _ => {}
        }

        // A hidden set is treated as absent. Only a bare segment may fall through to an
        // operation of the same name.
        if let Some(set) = self.model.set(id) {
            if self.gate.is_set_visible(&set.name) {
                let key = self.parse_key(raw, &set.entity_type)?;
                let target = entities_or_entity(&set.name, &set.entity_type, true, key.is_some());
                return Ok(Segment {
                    identifier: id.to_string(),
                    kind: SegmentKind::EntitySet(set.name.clone()),
                    key,
                    target,
                });
            }
            if raw.has_key_text() || has_more {
                return Err(ServiceError::resource_not_found(id));
            }
        }

        match resolve_operation(self.model, self.registry, self.gate, id, None)? {
            Some(op) => self.operation_segment(op, raw, None),
            None => Err(ServiceError::resource_not_found(id)),
        }
    }

    fn resolve_next(&self, previous: &Segment, raw: &RawSegment) -> Result<Segment, ServiceError> {
        let id = raw.identifier.as_str();
        match id {
            "$count" => {
                let counts = match &previous.target {
                    Target::Entities { .. } => true,
                    Target::Value(type_ref) => type_ref.is_collection(),
                    _ => false,
                };
                return if counts {
                    special(raw, SegmentKind::Count, Target::Count)
                } else {
                    Err(not_applicable(id, &previous.identifier))
                };
            }
            "$value" => {
                return if matches!(previous.target, Target::Value(TypeRef::Primitive(_))) {
                    special(raw, SegmentKind::Value, Target::RawValue)
                } else {
                    Err(not_applicable(id, &previous.identifier))
                };
            }
            "$metadata" | "$batch" => return Err(ServiceError::resource_not_found(id)),
            _ => {}
        }

        match &previous.target {
            Target::Entity { set, type_name } => {
                if let Some(property) = self.model.property(type_name, id) {
                    return self.property_segment(raw, set, property);
                }
                if let Some(cast) = self.type_cast(raw, type_name)? {
                    if raw.has_key_text() {
                        return Err(ServiceError::key_predicate_not_allowed(id));
                    }
                    return Ok(Segment {
                        identifier: id.to_string(),
                        kind: SegmentKind::TypeCast(cast.clone()),
                        key: None,
                        target: Target::Entity {
                            set: set.clone(),
                            type_name: cast,
                        },
                    });
                }
                self.bound_operation(previous, raw, set)
            }
            Target::Entities {
                set,
                type_name,
                queryable,
            } => {
                if let Some(cast) = self.type_cast(raw, type_name)? {
                    let key = self.parse_key(raw, &cast)?;
                    return Ok(Segment {
                        identifier: id.to_string(),
                        kind: SegmentKind::TypeCast(cast.clone()),
                        target: entities_or_entity(set, &cast, *queryable, key.is_some()),
                        key,
                    });
                }
                self.bound_operation(previous, raw, set)
            }
            Target::Value(type_ref) => {
                let property = match type_ref {
                    TypeRef::Complex(complex) => self.model.property(complex, id),
                    _ => None,
                };
                if let Some(property) = property {
                    if raw.has_key_text() {
                        return Err(ServiceError::key_predicate_not_allowed(id));
                    }
                    return Ok(Segment {
                        identifier: id.to_string(),
                        kind: SegmentKind::Property(property.name.clone()),
                        key: None,
                        target: Target::Value(self.model.property_type(property)),
                    });
                }
                // Fails when a bound operation of this name exists.
                resolve_operation(
                    self.model,
                    self.registry,
                    self.gate,
                    id,
                    Some((&previous.target, previous.identifier.as_str())),
                )?;
                if type_ref.is_collection() {
                    Err(ServiceError::must_be_leaf(&previous.identifier))
                } else {
                    Err(ServiceError::resource_not_found(id))
                }
            }
            _ => Err(ServiceError::must_be_leaf(&previous.identifier)),
        }
    }

    fn bound_operation(
        &self,
        previous: &Segment,
        raw: &RawSegment,
        set: &str,
    ) -> Result<Segment, ServiceError> {
        let binding = Some((&previous.target, previous.identifier.as_str()));
        match resolve_operation(self.model, self.registry, self.gate, &raw.identifier, binding)? {
            Some(op) => self.operation_segment(op, raw, Some(set)),
            None => Err(ServiceError::resource_not_found(&raw.identifier)),
        }
    }

    fn property_segment(
        &self,
        raw: &RawSegment,
        set: &str,
        property: &Property,
    ) -> Result<Segment, ServiceError> {
        let id = raw.identifier.as_str();
        match &property.kind {
            PropertyKind::Navigation { target, many } => {
                let target_set = self
                    .model
                    .navigation_target(set, &property.name)
                    .ok_or_else(|| ServiceError::resource_not_found(id))?;
                self.gate.require_visible(&target_set.name, id)?;
                let key = if *many {
                    self.parse_key(raw, target)?
                } else if raw.has_key_text() {
                    return Err(ServiceError::key_predicate_not_allowed(id));
                } else {
                    None
                };
                let target = if *many {
                    entities_or_entity(&target_set.name, target, false, key.is_some())
                } else {
                    Target::Entity {
                        set: target_set.name.clone(),
                        type_name: target.clone(),
                    }
                };
                Ok(Segment {
                    identifier: id.to_string(),
                    kind: SegmentKind::Navigation(property.name.clone()),
                    key,
                    target,
                })
            }
            _ => {
                if raw.has_key_text() {
                    return Err(ServiceError::key_predicate_not_allowed(id));
                }
                Ok(Segment {
                    identifier: id.to_string(),
                    kind: SegmentKind::Property(property.name.clone()),
                    key: None,
                    target: Target::Value(self.model.property_type(property)),
                })
            }
        }
    }

    /// `Some(type)` when the identifier names an entity type related to `current`.
    fn type_cast(&self, raw: &RawSegment, current: &str) -> Result<Option<String>, ServiceError> {
        let id = raw.identifier.as_str();
        let Some(resource_type) = self.model.resource_type(id) else {
            return Ok(None);
        };
        if !resource_type.is_entity() {
            return Ok(None);
        }
        if self.model.is_assignable(id, current) {
            Ok(Some(id.to_string()))
        } else if self.model.is_assignable(current, id) {
            Ok(Some(current.to_string()))
        } else {
            Err(ServiceError::bad_path(format!(
                "The type '{id}' specified in the URI is neither a base type nor a sub-type of the previously-specified type '{current}'."
            )))
        }
    }

    fn operation_segment(
        &self,
        op: Arc<RegisteredOperation>,
        raw: &RawSegment,
        binding_set: Option<&str>,
    ) -> Result<Segment, ServiceError> {
        let definition = &op.definition;
        let id = raw.identifier.as_str();
        if raw.has_key_text() && !definition.is_composable() {
            return Err(ServiceError::key_predicate_not_allowed(id));
        }
        let result_set = self.gate.result_set(self.model, definition, binding_set)?;
        let entity_set = || {
            result_set.clone().ok_or_else(|| {
                ServiceError::internal(format!(
                    "The operation '{}' returns entities but has no result set.",
                    definition.name
                ))
            })
        };

        let mut key = None;
        let target = match &definition.return_type {
            None => Target::Void,
            Some(TypeRef::Entity(type_name)) => Target::Entity {
                set: entity_set()?,
                type_name: type_name.clone(),
            },
            Some(TypeRef::EntityCollection(type_name) | TypeRef::EntityQueryable(type_name)) => {
                key = self.parse_key(raw, type_name)?;
                entities_or_entity(&entity_set()?, type_name, definition.is_composable(), key.is_some())
            }
            Some(other) => Target::Value(other.clone()),
        };
        Ok(Segment {
            identifier: id.to_string(),
            kind: SegmentKind::Operation(Arc::clone(&op)),
            key,
            target,
        })
    }

    /// Parses the key predicate of `raw` for an entity of `type_name`; `None` without one.
    fn parse_key(&self, raw: &RawSegment, type_name: &str) -> Result<Option<EntityKey>, ServiceError> {
        if !raw.has_key_text() {
            return Ok(None);
        }
        self.model
            .shape(type_name)
            .and_then(|shape| parse_key_predicate(shape, raw.parens.as_deref().unwrap_or_default()))
            .map(Some)
            .ok_or_else(|| ServiceError::bad_path("Bad Request - Error in query syntax."))
    }
}

/// Parses `1` or `ID=1,Line='a'` against the key layout of `shape`.
pub fn parse_key_predicate(shape: &EntityShape, text: &str) -> Option<EntityKey> {
    let parts = split_key_text(text);
    let values = match parts.as_slice() {
        [(None, literal)] if shape.key.len() == 1 => vec![parse_typed(literal, shape.key[0].1)?],
        _ if parts.len() != shape.key.len() => return None,
        _ => shape
            .key
            .iter()
            .map(|(name, kind)| {
                let mut named = parts.iter().filter(|(n, _)| n.as_deref() == Some(name.as_str()));
                match (named.next(), named.next()) {
                    (Some((_, literal)), None) => parse_typed(literal, *kind),
                    _ => None,
                }
            })
            .collect::<Option<Vec<_>>>()?,
    };
    values
        .iter()
        .map(KeyValue::from_value)
        .collect::<Option<Vec<_>>>()
        .map(EntityKey)
}

fn ensure_composable(previous: &Segment) -> Result<(), ServiceError> {
    let leaf = match (&previous.kind, &previous.target) {
        (SegmentKind::Metadata | SegmentKind::Batch | SegmentKind::Count | SegmentKind::Value, _) => true,
        (SegmentKind::Operation(op), _) => !op.definition.is_composable(),
        (_, Target::Void | Target::Count | Target::RawValue) => true,
        _ => false,
    };
    if leaf {
        Err(ServiceError::must_be_leaf(&previous.identifier))
    } else {
        Ok(())
    }
}

fn special(raw: &RawSegment, kind: SegmentKind, target: Target) -> Result<Segment, ServiceError> {
    if raw.parens.is_some() {
        return Err(ServiceError::key_predicate_not_allowed(&raw.identifier));
    }
    Ok(Segment {
        identifier: raw.identifier.clone(),
        kind,
        key: None,
        target,
    })
}

fn not_applicable(segment: &str, previous: &str) -> ServiceError {
    ServiceError::bad_path(format!(
        "The request URI is not valid. The segment '{segment}' cannot be applied to the segment '{previous}'."
    ))
}

fn entities_or_entity(set: &str, type_name: &str, queryable: bool, keyed: bool) -> Target {
    if keyed {
        Target::Entity {
            set: set.to_string(),
            type_name: type_name.to_string(),
        }
    } else {
        Target::Entities {
            set: set.to_string(),
            type_name: type_name.to_string(),
            queryable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::{handler_fn, InvocationResult};
    use crate::model::{
        AccessRules, BindingKind, EntitySetRights, ModelBuilder, OperationDefinition,
        OperationRights, PrimitiveKind, ResourceSet, ResourceType,
    };
    use crate::uri::parser::parse_uri;
    use http::StatusCode;

    struct Fixture {
        model: ServiceModel,
        registry: OperationRegistry,
        gate: AccessGate,
    }

    impl Fixture {
        fn new(gate: AccessGate) -> Self {
            let model = ModelBuilder::new("Demo")
                .add_type(ResourceType::complex("Demo", "Address").property("City", PrimitiveKind::String))
                .add_type(
                    ResourceType::entity("Demo", "Customer")
                        .key("ID", PrimitiveKind::Int32)
                        .property("Name", PrimitiveKind::String)
                        .property("Reset", PrimitiveKind::Int32)
                        .complex_property("Address", "Demo.Address")
                        .primitive_collection("Tags", PrimitiveKind::String)
                        .navigation("Orders", "Demo.Order", true)
                        .navigation("BestFriend", "Demo.Customer", false),
                )
                .add_type(ResourceType::entity("Demo", "Vip").derives_from("Demo.Customer"))
                .add_type(
                    ResourceType::entity("Demo", "Order")
                        .key("ID", PrimitiveKind::Int32)
                        .key("Line", PrimitiveKind::String),
                )
                .add_set(
                    ResourceSet::new("Customers", "Demo.Customer")
                        .navigates("Orders", "Orders")
                        .navigates("BestFriend", "Customers"),
                )
                .add_set(ResourceSet::new("Orders", "Demo.Order"))
                .build()
                .unwrap();

            let noop = || handler_fn(|_, _| async { Ok(InvocationResult::Void) });
            let mut registry = OperationRegistry::new();
            for definition in [
                OperationDefinition::action("Demo", "Customers"),
                OperationDefinition::action("Demo", "Reset").binding(
                    BindingKind::Always,
                    "c",
                    TypeRef::Entity("Demo.Customer".into()),
                ),
                OperationDefinition::action("Demo", "City").binding(
                    BindingKind::Always,
                    "c",
                    TypeRef::Entity("Demo.Customer".into()),
                ),
                OperationDefinition::action("Demo", "Ping").returns_primitive(PrimitiveKind::String),
                OperationDefinition::function("Demo", "TopCustomers")
                    .returns(TypeRef::EntityQueryable("Demo.Customer".into()))
                    .result_set("Customers"),
            ] {
                registry.register(&model, definition, noop()).unwrap();
            }
            Self {
                model,
                registry,
                gate,
            }
        }

        fn resolve(&self, uri: &str) -> Result<ResolvedPath, ServiceError> {
            let parsed = parse_uri(uri, "http://host")?;
            PathResolver::new(&self.model, &self.registry, &self.gate).resolve(&parsed.segments)
        }
    }

    #[test]
    fn test_set_and_property_win_over_operations() {
        let fixture = Fixture::new(AccessGate::allow_all());
        let path = fixture.resolve("/Customers").unwrap();
        assert!(matches!(path.segments[0].kind, SegmentKind::EntitySet(_)));

        let path = fixture.resolve("/Customers(1)/Reset").unwrap();
        assert!(matches!(path.segments[1].kind, SegmentKind::Property(_)));
        assert_eq!(path.target(), &Target::Value(TypeRef::Primitive(PrimitiveKind::Int32)));

        let path = fixture.resolve("/Customers(1)/Demo.Reset").unwrap();
        assert!(path.invoked_operation().is_some());

        let path = fixture.resolve("/Customers(1)/Address/City").unwrap();
        assert!(matches!(path.segments[2].kind, SegmentKind::Property(_)));
        assert_eq!(path.target(), &Target::Value(TypeRef::Primitive(PrimitiveKind::String)));
    }

    #[test]
    fn test_keys_and_navigation() {
        let fixture = Fixture::new(AccessGate::allow_all());
        let path = fixture.resolve("/Customers(1)/Orders(ID=2,Line='a')").unwrap();
        assert_eq!(
            path.segments[1].key,
            Some(EntityKey(vec![KeyValue::Integer(2), KeyValue::String("a".into())]))
        );
        assert_eq!(
            path.target(),
            &Target::Entity {
                set: "Orders".into(),
                type_name: "Demo.Order".into()
            }
        );

        let err = fixture.resolve("/Customers('x')").unwrap_err();
        assert_eq!(err.to_string(), "Bad Request - Error in query syntax.");
        let err = fixture.resolve("/Customers(1)/BestFriend(2)").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(fixture.resolve("/Customers()").is_ok());
    }

    #[test]
    fn test_type_cast() {
        let fixture = Fixture::new(AccessGate::allow_all());
        let path = fixture.resolve("/Customers/Demo.Vip(3)").unwrap();
        assert_eq!(
            path.target(),
            &Target::Entity {
                set: "Customers".into(),
                type_name: "Demo.Vip".into()
            }
        );
        let err = fixture.resolve("/Customers/Demo.Order").unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_leaf_segments() {
        let fixture = Fixture::new(AccessGate::allow_all());
        let err = fixture.resolve("/Ping/Name").unwrap_err();
        assert!(err.to_string().contains("The segment 'Ping' must be the last segment"));
        let err = fixture.resolve("/$metadata/Customers").unwrap_err();
        assert!(err.to_string().contains("The segment '$metadata' must be the last segment"));
        let err = fixture.resolve("/Customers(1)/Tags/Name").unwrap_err();
        assert!(err.to_string().contains("The segment 'Tags' must be the last segment"));
        let err = fixture.resolve("/Customers(1)/Tags/Demo.Reset").unwrap_err();
        assert_eq!(err.to_string(), "Found an operation bound to a non-entity type.");

        let path = fixture.resolve("/TopCustomers(1)/Orders/$count").unwrap();
        assert_eq!(path.target(), &Target::Count);
        let path = fixture.resolve("/Customers(1)/Name/$value").unwrap();
        assert_eq!(path.target(), &Target::RawValue);
        assert!(fixture.resolve("/Customers/$value").is_err());
    }

    #[test]
    fn test_action_segments() {
        let fixture = Fixture::new(AccessGate::allow_all());
        let err = fixture.resolve("/Ping(1)").unwrap_err();
        assert_eq!(
            err.to_string(),
            "The request URI is not valid. The segment 'Ping' cannot include key predicates, however it may end with empty parenthesis."
        );
        assert!(fixture.resolve("/Ping()").unwrap().invoked_operation().is_some());
        assert!(fixture.resolve("/Demo.Container.Ping").unwrap().invoked_operation().is_some());

        let err = fixture.resolve("/Customers/Demo.Reset").unwrap_err();
        assert_eq!(
            err.to_string(),
            "The binding parameter for 'Reset' is not assignable from the result of the uri segment 'Customers'."
        );
        let err = fixture.resolve("/Customers(1)/Ping").unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_hidden_sets_and_operations() {
        let gate = AccessGate::new(
            AccessRules::new()
                .with("*", EntitySetRights::ALL)
                .with("Customers", EntitySetRights::NONE),
            AccessRules::new()
                .with("*", OperationRights::Invoke)
                .with("Ping", OperationRights::None),
            AccessRules::new().with("*", OperationRights::Invoke),
        );
        let fixture = Fixture::new(gate);
        let err = fixture.resolve("/Customers(1)/Demo.Reset").unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Resource not found for the segment 'Customers'.");

        let err = fixture.resolve("/Customers(1)").unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Resource not found for the segment 'Customers'.");

        // The set is hidden, so the unbound action of the same name is reachable.
        assert!(fixture.resolve("/Customers").unwrap().invoked_operation().is_some());

        let err = fixture.resolve("/Ping").unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let err = fixture.resolve("/TopCustomers").unwrap_err();
        assert!(err.to_string().starts_with("The operation 'TopCustomers' has the resource set 'Customers' that is not visible."));
    }
}
