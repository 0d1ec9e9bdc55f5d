//! Access control: entity set visibility and verb rights, operation visibility, and
//! the visibility of the sets an operation returns entities from.

use crate::error::ServiceError;
use crate::model::{
    AccessRules, EntitySetRights, OperationDefinition, OperationKind, OperationRights, ResultSet,
    ServiceModel,
};
use http::Method;
use tracing::debug;

/// Rights tables consulted while resolving and dispatching a request.
#[derive(Debug, Clone, Default)]
pub struct AccessGate {
    sets: AccessRules<EntitySetRights>,
    actions: AccessRules<OperationRights>,
    functions: AccessRules<OperationRights>,
}

impl AccessGate {
    pub fn new(
        sets: AccessRules<EntitySetRights>,
        actions: AccessRules<OperationRights>,
        functions: AccessRules<OperationRights>,
    ) -> Self {
        Self {
            sets,
            actions,
            functions,
        }
    }

    /// Everything visible and writable; convenient for tests and samples.
    pub fn allow_all() -> Self {
        Self::new(
            AccessRules::new().with("*", EntitySetRights::ALL),
            AccessRules::new().with("*", OperationRights::Invoke),
            AccessRules::new().with("*", OperationRights::Invoke),
        )
    }

    pub fn set_rights(&self, set: &str) -> EntitySetRights {
        self.sets.lookup(set)
    }

    pub fn is_set_visible(&self, set: &str) -> bool {
        self.set_rights(set).is_visible()
    }

    /// Rules may name an operation by its simple or its qualified name.
    pub fn operation_rights(&self, definition: &OperationDefinition) -> OperationRights {
        let rules = match definition.kind {
            OperationKind::Action => &self.actions,
            OperationKind::Function => &self.functions,
        };
        rules.lookup_any(&[definition.qualified_name().as_str(), definition.name.as_str()])
    }

    pub fn is_operation_visible(&self, definition: &OperationDefinition) -> bool {
        self.operation_rights(definition).is_visible()
    }

    /// A hidden set behaves as if it did not exist.
    pub fn require_visible(&self, set: &str, segment: &str) -> Result<(), ServiceError> {
        if self.is_set_visible(set) {
            Ok(())
        } else {
            debug!(entity_set = set, "Set is not visible");
            Err(ServiceError::resource_not_found(segment))
        }
    }

    /// A visible set lacking the right for the request is forbidden.
    pub fn require(&self, set: &str, needed: EntitySetRights) -> Result<(), ServiceError> {
        if self.set_rights(set).contains(needed) {
            Ok(())
        } else {
            debug!(entity_set = set, %needed, "Right missing");
            Err(ServiceError::forbidden())
        }
    }

    /// Resolves and checks the set an operation's entity results belong to.
    ///
    /// Returns `None` for operations that do not return entities.
    pub fn result_set(
        &self,
        model: &ServiceModel,
        definition: &OperationDefinition,
        binding_set: Option<&str>,
    ) -> Result<Option<String>, ServiceError> {
        let name = &definition.name;
        match &definition.result_set {
            None => Ok(None),
            Some(ResultSet::Set(set)) => {
                if self.is_set_visible(set) {
                    Ok(Some(set.clone()))
                } else {
                    Err(ServiceError::bad_path(format!(
                        "The operation '{name}' has the resource set '{set}' that is not visible. The operation '{name}' should be made hidden or the resource set '{set}' should be made visible."
                    )))
                }
            }
            Some(ResultSet::Path(expression)) => {
                let unreachable = || ServiceError::bad_path(format!(
                    "The service action '{name}' has the resource set path expression '{expression}', but there is no visible resource set that can be reached from the binding parameter through the path expression."
                ));
                let mut current = binding_set.ok_or_else(unreachable)?.to_string();
                for navigation in expression.split('/').skip(1) {
                    let target = model
                        .navigation_target(&current, navigation)
                        .ok_or_else(unreachable)?;
                    current = target.name.clone();
                }
                if self.is_set_visible(&current) {
                    Ok(Some(current))
                } else {
                    Err(unreachable())
                }
            }
        }
    }
}

/// Right a request needs on the addressed set.
pub fn right_for(method: &Method, single: bool) -> Option<EntitySetRights> {
    match (method.as_str(), single) {
        ("GET", true) => Some(EntitySetRights::READ_SINGLE),
        ("GET", false) => Some(EntitySetRights::READ_MULTIPLE),
        ("POST", false) => Some(EntitySetRights::WRITE_APPEND),
        ("PUT", true) => Some(EntitySetRights::WRITE_REPLACE),
        ("PATCH" | "MERGE", true) => Some(EntitySetRights::WRITE_MERGE),
        ("DELETE", true) => Some(EntitySetRights::WRITE_DELETE),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;
    use crate::model::{
        BindingKind, ModelBuilder, PrimitiveKind, ResourceSet, ResourceType, TypeRef,
    };

    fn model() -> ServiceModel {
        ModelBuilder::new("Demo")
            .add_type(
                ResourceType::entity("Demo", "Customer")
                    .key("ID", PrimitiveKind::Int32)
                    .navigation("Orders", "Demo.Order", true),
            )
            .add_type(ResourceType::entity("Demo", "Order").key("ID", PrimitiveKind::Int32))
            .add_set(ResourceSet::new("Customers", "Demo.Customer").navigates("Orders", "Orders"))
            .add_set(ResourceSet::new("Orders", "Demo.Order"))
            .build()
            .unwrap()
    }

    fn gate(orders: EntitySetRights) -> AccessGate {
        AccessGate::new(
            AccessRules::new()
                .with("*", EntitySetRights::ALL_READ)
                .with("Orders", orders),
            AccessRules::new()
                .with("*", OperationRights::Invoke)
                .with("Hidden", OperationRights::None),
            AccessRules::new(),
        )
    }

    #[test]
    fn test_visibility_and_rights() {
        let gate = gate(EntitySetRights::NONE);
        assert!(gate.require_visible("Customers", "Customers").is_ok());
        let err = gate.require_visible("Orders", "Orders").unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "Resource not found for the segment 'Orders'.");
        let err = gate
            .require("Customers", EntitySetRights::WRITE_APPEND)
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_operation_rules() {
        let gate = gate(EntitySetRights::ALL);
        assert!(gate.is_operation_visible(&OperationDefinition::action("Demo", "Any")));
        assert!(!gate.is_operation_visible(&OperationDefinition::action("Demo", "Hidden")));
        // No rule at all for functions.
        assert!(!gate.is_operation_visible(&OperationDefinition::function("Demo", "Any")));
    }

    #[test]
    fn test_hidden_result_set() {
        let model = model();
        let op = OperationDefinition::action("Demo", "GetOrders")
            .returns(TypeRef::EntityCollection("Demo.Order".into()))
            .result_set("Orders");
        let err = gate(EntitySetRights::NONE)
            .result_set(&model, &op, None)
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "The operation 'GetOrders' has the resource set 'Orders' that is not visible. The operation 'GetOrders' should be made hidden or the resource set 'Orders' should be made visible."
        );
    }

    #[test]
    fn test_path_expression() {
        let model = model();
        let op = OperationDefinition::action("Demo", "Orders")
            .binding(BindingKind::Always, "customer", TypeRef::Entity("Demo.Customer".into()))
            .returns(TypeRef::EntityCollection("Demo.Order".into()))
            .result_path("customer/Orders");
        assert_eq!(
            gate(EntitySetRights::ALL)
                .result_set(&model, &op, Some("Customers"))
                .unwrap()
                .as_deref(),
            Some("Orders")
        );
        let err = gate(EntitySetRights::NONE)
            .result_set(&model, &op, Some("Customers"))
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("The service action 'Orders' has the resource set path expression 'customer/Orders'"));
    }
}
