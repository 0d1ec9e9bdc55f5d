//! The handler side of an operation: what user code implements and receives.

use super::result::InvocationResult;
use crate::data::DataSource;
use crate::error::ServiceError;
use crate::model::{Entity, Value};
use async_trait::async_trait;
use indexmap::IndexMap;
use std::future::Future;
use std::sync::Arc;

/// Receives notifications about operation calls, in place of global counters.
pub trait InvocationObserver: Send + Sync {
    /// The handler was called.
    fn invoked(&self, _operation: &str) {}
    /// The handler's result was materialized for the response (never for void operations).
    fn result_fetched(&self, _operation: &str) {}
}

/// Observer that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl InvocationObserver for NoopObserver {}

/// Services available to a handler while it runs.
#[derive(Clone)]
pub struct InvocationContext {
    pub data: DataSource,
    pub service_root: String,
    /// Qualified name of the operation being invoked.
    pub operation: String,
}

/// The binding parameter value produced by the path before the operation segment.
#[derive(Debug, Clone)]
pub enum BindingValue {
    Entity(Entity),
    Entities(Vec<Entity>),
}

/// Arguments of one invocation.
#[derive(Debug, Clone, Default)]
pub struct Arguments {
    pub binding: Option<BindingValue>,
    /// Non-binding parameter values in declaration order.
    pub values: IndexMap<String, Value>,
}

impl Arguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn binding_entity(&self) -> Option<&Entity> {
        match &self.binding {
            Some(BindingValue::Entity(entity)) => Some(entity),
            _ => None,
        }
    }

    pub fn binding_entities(&self) -> Option<&[Entity]> {
        match &self.binding {
            Some(BindingValue::Entities(entities)) => Some(entities),
            _ => None,
        }
    }
}

/// User code behind an action or service operation.
#[async_trait]
pub trait OperationHandler: Send + Sync {
    async fn invoke(
        &self,
        ctx: InvocationContext,
        args: Arguments,
    ) -> Result<InvocationResult, ServiceError>;

    /// For `Sometimes`-bound actions: whether the action applies to this entity.
    fn is_available(&self, _binding: &Entity) -> bool {
        true
    }
}

struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> OperationHandler for FnHandler<F>
where
    F: Fn(InvocationContext, Arguments) -> Fut + Send + Sync,
    Fut: Future<Output = Result<InvocationResult, ServiceError>> + Send + 'static,
{
    async fn invoke(
        &self,
        ctx: InvocationContext,
        args: Arguments,
    ) -> Result<InvocationResult, ServiceError> {
        (self.0)(ctx, args).await
    }
}

/// Wraps an async closure as an always-available handler.
///
/// ```rust
/// use odata_service::invoke::{handler_fn, InvocationResult};
/// use odata_service::model::Value;
///
/// let handler = handler_fn(|_ctx, _args| async {
///     Ok(InvocationResult::Primitive(Some(Value::from("entity1"))))
/// });
/// # let _ = handler;
/// ```
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn OperationHandler>
where
    F: Fn(InvocationContext, Arguments) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<InvocationResult, ServiceError>> + Send + 'static,
{
    Arc::new(FnHandler(f))
}
