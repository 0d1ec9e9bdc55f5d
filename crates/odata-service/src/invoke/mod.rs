//! # Invocation
//!
//! Operations are registered explicitly: an [`OperationDefinition`](crate::model::OperationDefinition)
//! plus an [`OperationHandler`] go into the [`OperationRegistry`] at startup. The
//! [`engine`] calls the handler, checks its [`InvocationResult`] against the declared
//! return type, and reports calls to an [`InvocationObserver`].

pub mod engine;
pub mod handler;
pub mod registry;
pub mod result;

pub use handler::{
    handler_fn, Arguments, BindingValue, InvocationContext, InvocationObserver, NoopObserver,
    OperationHandler,
};
pub use registry::{OperationRegistry, RegisteredOperation, RegistrationError};
pub use result::InvocationResult;
