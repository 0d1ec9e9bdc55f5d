//! Registration table mapping operation names to definitions and handlers.

use super::handler::OperationHandler;
use crate::model::{OperationDefinition, OperationKind, ResultSet, ServiceModel, TypeRef};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("Operation '{0}' is already registered for the same binding type")]
    Duplicate(String),
    #[error("Operation '{0}' is bound but declares no binding parameter")]
    MissingBindingParameter(String),
    #[error("The binding parameter of operation '{0}' must be an entity or a collection of entities")]
    NonEntityBinding(String),
    #[error("Service operation '{0}' cannot be bound")]
    BoundFunction(String),
    #[error("Parameter '{parameter}' of action '{operation}' must be a primitive, complex, or collection type")]
    InvalidParameterType { operation: String, parameter: String },
    #[error("Operation '{operation}' references unknown type '{type_name}'")]
    UnknownType { operation: String, type_name: String },
    #[error("Operation '{0}' returns entities but declares no result set")]
    MissingResultSet(String),
    #[error("Operation '{operation}' declares unknown result set '{set}'")]
    UnknownResultSet { operation: String, set: String },
    #[error("Operation '{operation}' has path expression '{expression}' that does not start with its binding parameter")]
    InvalidPathExpression { operation: String, expression: String },
}

/// A definition paired with the handler that implements it.
pub struct RegisteredOperation {
    pub definition: OperationDefinition,
    pub handler: Arc<dyn OperationHandler>,
}

impl fmt::Debug for RegisteredOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredOperation")
            .field("definition", &self.definition)
            .finish_non_exhaustive()
    }
}

/// Operations known to the service, validated against the model at registration.
#[derive(Debug, Default)]
pub struct OperationRegistry {
    operations: Vec<Arc<RegisteredOperation>>,
}

impl OperationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        model: &ServiceModel,
        definition: OperationDefinition,
        handler: Arc<dyn OperationHandler>,
    ) -> Result<(), RegistrationError> {
        validate(model, &definition)?;

        let bound_to = binding_type(&definition);
        let duplicate = self.operations.iter().any(|existing| {
            existing.definition.qualified_name() == definition.qualified_name()
                && binding_type(&existing.definition) == bound_to
        });
        if duplicate {
            return Err(RegistrationError::Duplicate(definition.qualified_name()));
        }

        debug!(operation = %definition.qualified_name(), binding = ?definition.binding, "Registered operation");
        self.operations.push(Arc::new(RegisteredOperation {
            definition,
            handler,
        }));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<RegisteredOperation>> {
        self.operations.iter()
    }

    /// Operations a URI segment can name.
    pub fn named<'a>(
        &'a self,
        identifier: &'a str,
        container: &'a str,
    ) -> impl Iterator<Item = &'a Arc<RegisteredOperation>> + 'a {
        self.operations
            .iter()
            .filter(move |op| op.definition.is_named(identifier, container))
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

fn binding_type(definition: &OperationDefinition) -> Option<TypeRef> {
    definition.binding_parameter().map(|p| p.type_ref.clone())
}

fn validate(model: &ServiceModel, definition: &OperationDefinition) -> Result<(), RegistrationError> {
    let name = definition.qualified_name();

    if definition.is_bound() {
        if definition.kind == OperationKind::Function {
            return Err(RegistrationError::BoundFunction(name));
        }
        let Some(binding) = definition.binding_parameter() else {
            return Err(RegistrationError::MissingBindingParameter(name));
        };
        if binding.type_ref.entity_type().is_none() {
            return Err(RegistrationError::NonEntityBinding(name));
        }
    }

    for parameter in &definition.parameters {
        if !model.resolves(&parameter.type_ref) {
            return Err(RegistrationError::UnknownType {
                operation: name,
                type_name: parameter.type_ref.edm_name(),
            });
        }
    }
    for parameter in definition.non_binding_parameters() {
        if parameter.type_ref.entity_type().is_some() {
            return Err(RegistrationError::InvalidParameterType {
                operation: name,
                parameter: parameter.name.clone(),
            });
        }
    }

    let Some(return_type) = &definition.return_type else {
        return Ok(());
    };
    if !model.resolves(return_type) {
        return Err(RegistrationError::UnknownType {
            operation: name,
            type_name: return_type.edm_name(),
        });
    }
    if return_type.entity_type().is_none() {
        return Ok(());
    }
    match &definition.result_set {
        None => Err(RegistrationError::MissingResultSet(name)),
        Some(ResultSet::Set(set)) if model.set(set).is_none() => {
            Err(RegistrationError::UnknownResultSet {
                operation: name,
                set: set.clone(),
            })
        }
        Some(ResultSet::Path(expression)) => {
            let first = expression.split('/').next().unwrap_or_default();
            match definition.binding_parameter() {
                Some(binding) if binding.name == first => Ok(()),
                _ => Err(RegistrationError::InvalidPathExpression {
                    operation: name,
                    expression: expression.clone(),
                }),
            }
        }
        Some(ResultSet::Set(_)) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoke::{handler_fn, InvocationResult};
    use crate::model::{BindingKind, ModelBuilder, PrimitiveKind, ResourceSet, ResourceType};

    fn model() -> ServiceModel {
        ModelBuilder::new("Demo")
            .add_type(ResourceType::entity("Demo", "Customer").key("ID", PrimitiveKind::Int32))
            .add_set(ResourceSet::new("Customers", "Demo.Customer"))
            .build()
            .unwrap()
    }

    fn noop() -> Arc<dyn OperationHandler> {
        handler_fn(|_, _| async { Ok(InvocationResult::Void) })
    }

    #[test]
    fn test_register_and_lookup() {
        let model = model();
        let mut registry = OperationRegistry::new();
        registry
            .register(&model, OperationDefinition::action("Demo", "Reset"), noop())
            .unwrap();
        assert_eq!(registry.named("Reset", "Container").count(), 1);
        assert_eq!(registry.named("Demo.Container.Reset", "Container").count(), 1);
        assert_eq!(registry.named("Other.Reset", "Container").count(), 0);
        assert_eq!(
            registry.register(&model, OperationDefinition::action("Demo", "Reset"), noop()),
            Err(RegistrationError::Duplicate("Demo.Reset".into()))
        );
    }

    #[test]
    fn test_overloads_on_binding_type_are_allowed() {
        let model = model();
        let mut registry = OperationRegistry::new();
        let single = OperationDefinition::action("Demo", "Touch").binding(
            BindingKind::Always,
            "c",
            TypeRef::Entity("Demo.Customer".into()),
        );
        let many = OperationDefinition::action("Demo", "Touch").binding(
            BindingKind::Always,
            "c",
            TypeRef::EntityCollection("Demo.Customer".into()),
        );
        registry.register(&model, single, noop()).unwrap();
        registry.register(&model, many, noop()).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_rejects_invalid_definitions() {
        let model = model();
        let mut registry = OperationRegistry::new();

        let entity_param = OperationDefinition::action("Demo", "A")
            .parameter("c", TypeRef::Entity("Demo.Customer".into()));
        assert!(matches!(
            registry.register(&model, entity_param, noop()),
            Err(RegistrationError::InvalidParameterType { .. })
        ));

        let no_set = OperationDefinition::action("Demo", "B")
            .returns(TypeRef::Entity("Demo.Customer".into()));
        assert_eq!(
            registry.register(&model, no_set, noop()),
            Err(RegistrationError::MissingResultSet("Demo.B".into()))
        );

        let bad_path = OperationDefinition::action("Demo", "C")
            .binding(BindingKind::Always, "c", TypeRef::Entity("Demo.Customer".into()))
            .returns(TypeRef::EntityCollection("Demo.Customer".into()))
            .result_path("other/Orders");
        assert!(matches!(
            registry.register(&model, bad_path, noop()),
            Err(RegistrationError::InvalidPathExpression { .. })
        ));

        let bound_function = OperationDefinition::function("Demo", "D").binding(
            BindingKind::Always,
            "c",
            TypeRef::Entity("Demo.Customer".into()),
        );
        assert_eq!(
            registry.register(&model, bound_function, noop()),
            Err(RegistrationError::BoundFunction("Demo.D".into()))
        );
        assert!(registry.is_empty());
    }
}
