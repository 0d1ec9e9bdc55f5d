//! Service operation definitions: actions (POST) and service operations (GET).

use super::types::{PrimitiveKind, TypeRef};
use std::fmt::{self, Display};

/// Whether an operation takes a binding parameter from the URI path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    /// Unbound; invoked from the service root.
    Never,
    /// Bound; advertised and invocable only where the handler reports it available.
    Sometimes,
    /// Bound; always available on any assignable binding segment.
    Always,
}

impl BindingKind {
    pub fn is_bound(self) -> bool {
        !matches!(self, BindingKind::Never)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Side-effecting operation invoked with POST.
    Action,
    /// Service operation invoked with GET, parameters in the query string.
    Function,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::Action => f.write_str("action"),
            OperationKind::Function => f.write_str("service operation"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameter {
    pub name: String,
    pub type_ref: TypeRef,
}

/// Where entity results of an operation live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultSet {
    /// A fixed resource set.
    Set(String),
    /// A path from the binding parameter through navigation properties,
    /// e.g. `customer/Orders`.
    Path(String),
}

/// Immutable description of a registered operation.
///
/// ```rust
/// use odata_service::model::{BindingKind, OperationDefinition, PrimitiveKind, TypeRef};
///
/// let op = OperationDefinition::action("Demo", "Rename")
///     .binding(BindingKind::Always, "customer", TypeRef::Entity("Demo.Customer".into()))
///     .parameter("name", TypeRef::Primitive(PrimitiveKind::String));
/// assert_eq!(op.qualified_name(), "Demo.Rename");
/// assert_eq!(op.non_binding_parameters().count(), 1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationDefinition {
    pub namespace: String,
    pub name: String,
    pub kind: OperationKind,
    pub binding: BindingKind,
    /// Ordered parameters; the first is the binding parameter when bound.
    pub parameters: Vec<Parameter>,
    /// `None` for void operations.
    pub return_type: Option<TypeRef>,
    pub result_set: Option<ResultSet>,
}

impl OperationDefinition {
    fn new(namespace: &str, name: &str, kind: OperationKind) -> Self {
        Self {
            namespace: namespace.to_string(),
            name: name.to_string(),
            kind,
            binding: BindingKind::Never,
            parameters: Vec::new(),
            return_type: None,
            result_set: None,
        }
    }

    pub fn action(namespace: &str, name: &str) -> Self {
        Self::new(namespace, name, OperationKind::Action)
    }

    pub fn function(namespace: &str, name: &str) -> Self {
        Self::new(namespace, name, OperationKind::Function)
    }

    /// Declares the binding parameter; it becomes the first parameter.
    pub fn binding(mut self, kind: BindingKind, name: &str, type_ref: TypeRef) -> Self {
        self.binding = kind;
        self.parameters.insert(
            0,
            Parameter {
                name: name.to_string(),
                type_ref,
            },
        );
        self
    }

    pub fn parameter(mut self, name: &str, type_ref: TypeRef) -> Self {
        self.parameters.push(Parameter {
            name: name.to_string(),
            type_ref,
        });
        self
    }

    pub fn returns(mut self, type_ref: TypeRef) -> Self {
        self.return_type = Some(type_ref);
        self
    }

    pub fn returns_primitive(self, kind: PrimitiveKind) -> Self {
        self.returns(TypeRef::Primitive(kind))
    }

    pub fn result_set(mut self, set: &str) -> Self {
        self.result_set = Some(ResultSet::Set(set.to_string()));
        self
    }

    pub fn result_path(mut self, expression: &str) -> Self {
        self.result_set = Some(ResultSet::Path(expression.to_string()));
        self
    }

    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// Whether a URI segment names this operation: `Name`, `Namespace.Name`,
    /// `Container.Name`, or `Namespace.Container.Name`.
    pub fn is_named(&self, identifier: &str, container: &str) -> bool {
        let Some(prefix) = identifier.strip_suffix(self.name.as_str()) else {
            return false;
        };
        if prefix.is_empty() {
            return true;
        }
        let Some(prefix) = prefix.strip_suffix('.') else {
            return false;
        };
        prefix == self.namespace
            || prefix == container
            || prefix == format!("{}.{}", self.namespace, container)
    }

    pub fn is_bound(&self) -> bool {
        self.binding.is_bound()
    }

    pub fn binding_parameter(&self) -> Option<&Parameter> {
        if self.is_bound() {
            self.parameters.first()
        } else {
            None
        }
    }

    /// Parameters supplied by the request payload or query string.
    pub fn non_binding_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters.iter().skip(usize::from(self.is_bound()))
    }

    /// Whether further path segments may follow this operation.
    pub fn is_composable(&self) -> bool {
        self.kind == OperationKind::Function
            && matches!(self.return_type, Some(TypeRef::EntityQueryable(_)))
    }
}
