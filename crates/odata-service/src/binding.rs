//! Binding resolution: which registered operation a path segment invokes.
//!
//! Sets and properties are matched before operations by the caller, so this module
//! only runs once a name is known not to be a set or property.

use crate::access::AccessGate;
use crate::error::ServiceError;
use crate::invoke::{OperationRegistry, RegisteredOperation};
use crate::model::{ServiceModel, TypeRef};
use crate::uri::segment::Target;
use std::sync::Arc;
use tracing::debug;

/// Finds the operation `identifier` names when applied to `binding`.
///
/// `binding` is `None` at the service root, where only unbound operations apply.
/// `binding_segment` is the previous segment's identifier, used in error messages.
/// Returns `Ok(None)` when no visible operation of that name applies here.
pub fn resolve_operation(
    model: &ServiceModel,
    registry: &OperationRegistry,
    gate: &AccessGate,
    identifier: &str,
    binding: Option<(&Target, &str)>,
) -> Result<Option<Arc<RegisteredOperation>>, ServiceError> {
    let candidates: Vec<&Arc<RegisteredOperation>> = registry
        .named(identifier, model.container())
        .filter(|op| gate.is_operation_visible(&op.definition))
        .collect();
    if candidates.is_empty() {
        return Ok(None);
    }

    let Some((target, binding_segment)) = binding else {
        return Ok(candidates
            .into_iter()
            .find(|op| !op.definition.is_bound())
            .cloned());
    };

    let bound: Vec<&Arc<RegisteredOperation>> = candidates
        .into_iter()
        .filter(|op| op.definition.is_bound())
        .collect();
    let Some(first) = bound.first() else {
        // Unbound operations are never reachable through a binding path.
        return Ok(None);
    };

    let (segment_type, single) = match target {
        Target::Entity { type_name, .. } => (type_name, true),
        Target::Entities { type_name, .. } => (type_name, false),
        Target::Value(_) => return Err(ServiceError::bound_to_non_entity()),
        _ => return Ok(None),
    };

    let best = bound
        .iter()
        .filter_map(|op| {
            let parameter = op.definition.binding_parameter()?;
            let expected = match (&parameter.type_ref, single) {
                (TypeRef::Entity(name), true) => name,
                (TypeRef::EntityCollection(name) | TypeRef::EntityQueryable(name), false) => name,
                _ => return None,
            };
            model
                .is_assignable(segment_type, expected)
                .then(|| (model.ancestors(expected).count(), *op))
        })
        .max_by_key(|(depth, _)| *depth)
        .map(|(_, op)| Arc::clone(op));

    match best {
        Some(op) => {
            debug!(operation = %op.definition.qualified_name(), binding = %segment_type, "Resolved bound operation");
            Ok(Some(op))
        }
        None => Err(ServiceError::binding_not_assignable(
            &first.definition.name,
            binding_segment,
        )),
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

    fn model() -> ServiceModel {
        ModelBuilder::new("Demo")
            .add_type(ResourceType::entity("Demo", "Customer").key("ID", PrimitiveKind::Int32))
            .add_type(ResourceType::entity("Demo", "Vip").derives_from("Demo.Customer"))
            .add_set(ResourceSet::new("Customers", "Demo.Customer"))
            .build()
            .unwrap()
    }

    fn registry(model: &ServiceModel) -> OperationRegistry {
        let noop = || handler_fn(|_, _| async { Ok(InvocationResult::Void) });
        let mut registry = OperationRegistry::new();
        for definition in [
            OperationDefinition::action("Demo", "Touch").binding(
                BindingKind::Always,
                "c",
                TypeRef::Entity("Demo.Customer".into()),
            ),
            OperationDefinition::action("Demo", "Touch").binding(
                BindingKind::Always,
                "c",
                TypeRef::Entity("Demo.Vip".into()),
            ),
            OperationDefinition::action("Demo", "TouchAll").binding(
                BindingKind::Always,
                "c",
                TypeRef::EntityQueryable("Demo.Customer".into()),
            ),
            OperationDefinition::action("Demo", "Reset"),
        ] {
            registry.register(model, definition, noop()).unwrap();
        }
        registry
    }

    fn entity(type_name: &str) -> Target {
        Target::Entity {
            set: "Customers".into(),
            type_name: type_name.into(),
        }
    }

    #[test]
    fn test_most_derived_overload_wins() {
        let model = model();
        let registry = registry(&model);
        let gate = AccessGate::allow_all();
        let target = entity("Demo.Vip");
        let op = resolve_operation(&model, &registry, &gate, "Touch", Some((&target, "NS.Vip")))
            .unwrap()
            .unwrap();
        assert_eq!(
            op.definition.binding_parameter().unwrap().type_ref,
            TypeRef::Entity("Demo.Vip".into())
        );
        let target = entity("Demo.Customer");
        let op = resolve_operation(&model, &registry, &gate, "Demo.Touch", Some((&target, "Customers")))
            .unwrap()
            .unwrap();
        assert_eq!(
            op.definition.binding_parameter().unwrap().type_ref,
            TypeRef::Entity("Demo.Customer".into())
        );
    }

    #[test]
    fn test_single_versus_collection_mismatch() {
        let model = model();
        let registry = registry(&model);
        let gate = AccessGate::allow_all();
        let target = entity("Demo.Customer");
        let err = resolve_operation(&model, &registry, &gate, "TouchAll", Some((&target, "Customers")))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "The binding parameter for 'TouchAll' is not assignable from the result of the uri segment 'Customers'."
        );
    }

    #[test]
    fn test_non_entity_binding() {
        let model = model();
        let registry = registry(&model);
        let gate = AccessGate::allow_all();
        let target = Target::Value(TypeRef::PrimitiveCollection(PrimitiveKind::String));
        let err = resolve_operation(&model, &registry, &gate, "Touch", Some((&target, "Tags")))
            .unwrap_err();
        assert_eq!(err.to_string(), "Found an operation bound to a non-entity type.");
    }

    #[test]
    fn test_unbound_and_hidden() {
        let model = model();
        let registry = registry(&model);
        let gate = AccessGate::allow_all();
        assert!(resolve_operation(&model, &registry, &gate, "Demo.Container.Reset", None)
            .unwrap()
            .is_some());
        let target = entity("Demo.Customer");
        assert!(resolve_operation(&model, &registry, &gate, "Reset", Some((&target, "Customers")))
            .unwrap()
            .is_none());
        assert!(resolve_operation(&model, &registry, &gate, "Touch", None)
            .unwrap()
            .is_none());

        let hidden = AccessGate::new(
            AccessRules::new().with("*", EntitySetRights::ALL),
            AccessRules::new(),
            AccessRules::new().with("*", OperationRights::Invoke),
        );
        assert!(resolve_operation(&model, &registry, &hidden, "Reset", None)
            .unwrap()
            .is_none());
    }
}
