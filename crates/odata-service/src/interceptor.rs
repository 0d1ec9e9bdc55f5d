//! Change interceptors: user hooks that run before a write to an entity set commits.
//!
//! Interceptors for a set are handed to that set's store actor as its hook context,
//! so they run inside the actor's turn, in registration order, and an error from any
//! of them aborts the write.

use crate::error::ServiceError;
use crate::model::Entity;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOperation {
    Add,
    Change,
    Delete,
}

/// Hook invoked for every insert, update, and delete on the sets it is registered for.
///
/// ```rust
/// use async_trait::async_trait;
/// use odata_service::error::ServiceError;
/// use odata_service::interceptor::{ChangeInterceptor, UpdateOperation};
/// use odata_service::model::Entity;
///
/// struct Stamp;
///
/// #[async_trait]
/// impl ChangeInterceptor for Stamp {
///     async fn on_change(&self, _set: &str, entity: &mut Entity, op: UpdateOperation)
///         -> Result<(), ServiceError> {
///         if op == UpdateOperation::Add {
///             entity.set("Source", "api");
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait ChangeInterceptor: Send + Sync {
    /// Called for `Add` and `Change` with the entity as it will be stored.
    async fn on_change(
        &self,
        set: &str,
        entity: &mut Entity,
        operation: UpdateOperation,
    ) -> Result<(), ServiceError>;

    /// Called before an entity is removed.
    async fn on_delete(&self, _set: &str, _entity: &Entity) -> Result<(), ServiceError> {
        Ok(())
    }
}

/// Hook context of one entity set's store actor.
#[derive(Clone)]
pub struct ChangeContext {
    set: String,
    interceptors: Vec<Arc<dyn ChangeInterceptor>>,
}

impl ChangeContext {
    pub fn new(set: impl Into<String>, interceptors: Vec<Arc<dyn ChangeInterceptor>>) -> Self {
        Self {
            set: set.into(),
            interceptors,
        }
    }

    pub fn set_name(&self) -> &str {
        &self.set
    }

    pub(crate) async fn notify(
        &self,
        entity: &mut Entity,
        operation: UpdateOperation,
    ) -> Result<(), ServiceError> {
        for interceptor in &self.interceptors {
            debug!(entity_set = %self.set, ?operation, "Running change interceptor");
            interceptor.on_change(&self.set, entity, operation).await?;
        }
        Ok(())
    }

    pub(crate) async fn notify_delete(&self, entity: &Entity) -> Result<(), ServiceError> {
        for interceptor in &self.interceptors {
            debug!(entity_set = %self.set, operation = ?UpdateOperation::Delete, "Running change interceptor");
            interceptor.on_delete(&self.set, entity).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityShape, Value};
    use http::StatusCode;
    use std::sync::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl ChangeInterceptor for Recorder {
        async fn on_change(
            &self,
            set: &str,
            entity: &mut Entity,
            operation: UpdateOperation,
        ) -> Result<(), ServiceError> {
            self.log
                .lock()
                .unwrap()
                .push(format!("{}:{set}:{operation:?}", self.name));
            entity.set("Touched", self.name);
            Ok(())
        }
    }

    struct Veto;

    #[async_trait]
    impl ChangeInterceptor for Veto {
        async fn on_change(
            &self,
            _set: &str,
            _entity: &mut Entity,
            _operation: UpdateOperation,
        ) -> Result<(), ServiceError> {
            Err(ServiceError::user(StatusCode::IM_A_TEAPOT, "vetoed"))
        }
    }

    fn entity() -> Entity {
        Entity::new(Arc::new(EntityShape {
            type_name: "Demo.Item".into(),
            key: vec![("ID".into(), crate::model::PrimitiveKind::Int32)],
            etag: vec![],
        }))
        .with("ID", 1)
    }

    #[tokio::test]
    async fn test_interceptors_run_in_registration_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = ChangeContext::new(
            "Items",
            vec![
                Arc::new(Recorder { name: "first", log: log.clone() }),
                Arc::new(Recorder { name: "second", log: log.clone() }),
            ],
        );
        let mut item = entity();
        ctx.notify(&mut item, UpdateOperation::Add).await.unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["first:Items:Add".to_string(), "second:Items:Add".to_string()]
        );
        assert_eq!(item.get("Touched"), Some(&Value::from("second")));
    }

    #[tokio::test]
    async fn test_interceptor_error_stops_the_chain() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let ctx = ChangeContext::new(
            "Items",
            vec![
                Arc::new(Veto),
                Arc::new(Recorder { name: "after", log: log.clone() }),
            ],
        );
        let err = ctx
            .notify(&mut entity(), UpdateOperation::Change)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::IM_A_TEAPOT);
        assert!(log.lock().unwrap().is_empty());
    }
}
