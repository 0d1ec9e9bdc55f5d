//! Error types for the data service.
//!
//! Every protocol failure is a [`ServiceError`] value threaded through path
//! resolution, binding, invocation, and the update pipeline; the request handler is
//! the only place that turns one into an HTTP response.

use http::StatusCode;
use thiserror::Error;

/// Errors that can occur while processing a request.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Malformed segment ordering, illegal key predicates, unknown segments.
    #[error("{message}")]
    PathResolution { status: StatusCode, message: String },

    /// The binding parameter type is not assignable from the path segment.
    #[error("{message}")]
    BindingMismatch { message: String },

    /// A referenced resource set or operation is not visible.
    #[error("{message}")]
    Visibility { status: StatusCode, message: String },

    /// Missing, unknown, duplicate, or mistyped payload content.
    #[error("{message}")]
    PayloadValidation { message: String },

    /// Missing, malformed, or mismatched conditional headers.
    #[error("{message}")]
    Concurrency { status: StatusCode, message: String },

    /// The verb is not supported for the addressed resource.
    #[error("{message}")]
    MethodNotAllowed { message: String },

    /// Protocol-level problems outside the path: version headers, batch envelopes.
    #[error("{message}")]
    BadRequest { message: String },

    #[error("{message}")]
    UnsupportedMediaType { message: String },

    #[error("{message}")]
    NotImplemented { message: String },

    #[error("{message}")]
    Conflict { message: String },

    /// A request in a `$batch` changeset was skipped or undone because another one failed.
    #[error("{message}")]
    FailedDependency { message: String },

    /// Raised by user code (operation handlers, change interceptors) with its own status.
    #[error("{message}")]
    User { status: StatusCode, message: String },

    #[error("{message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::PathResolution { status, .. }
            | ServiceError::Visibility { status, .. }
            | ServiceError::Concurrency { status, .. }
            | ServiceError::User { status, .. } => *status,
            ServiceError::BindingMismatch { .. }
            | ServiceError::PayloadValidation { .. }
            | ServiceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            ServiceError::UnsupportedMediaType { .. } => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ServiceError::NotImplemented { .. } => StatusCode::NOT_IMPLEMENTED,
            ServiceError::Conflict { .. } => StatusCode::CONFLICT,
            ServiceError::FailedDependency { .. } => StatusCode::FAILED_DEPENDENCY,
            ServiceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Name of the error category, reported in verbose error bodies.
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::PathResolution { .. } => "PathResolutionError",
            ServiceError::BindingMismatch { .. } => "BindingMismatchError",
            ServiceError::Visibility { .. } => "VisibilityError",
            ServiceError::PayloadValidation { .. } => "PayloadValidationError",
            ServiceError::Concurrency { .. } => "ConcurrencyError",
            ServiceError::MethodNotAllowed { .. } => "MethodNotAllowedError",
            ServiceError::BadRequest { .. } => "BadRequestError",
            ServiceError::UnsupportedMediaType { .. } => "UnsupportedMediaTypeError",
            ServiceError::NotImplemented { .. } => "NotImplementedError",
            ServiceError::Conflict { .. } => "ConflictError",
            ServiceError::FailedDependency { .. } => "FailedDependencyError",
            ServiceError::User { .. } => "UserError",
            ServiceError::Internal { .. } => "InternalError",
        }
    }

    /// Message of the innermost error in the `source()` chain.
    pub fn root_message(&self) -> String {
        let mut current: &dyn std::error::Error = self;
        while let Some(next) = current.source() {
            current = next;
        }
        current.to_string()
    }

    // --- path resolution ---

    pub fn resource_not_found(segment: &str) -> Self {
        ServiceError::PathResolution {
            status: StatusCode::NOT_FOUND,
            message: format!("Resource not found for the segment '{segment}'."),
        }
    }

    pub fn bad_path(message: impl Into<String>) -> Self {
        ServiceError::PathResolution {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn must_be_leaf(segment: &str) -> Self {
        Self::bad_path(format!(
            "The request URI is not valid. The segment '{segment}' must be the last segment in the URI because it is one of the following: $batch, $value, $metadata, $count, a collection of complex types, a collection of primitive types, a service action, a noncomposable service operation, or an operation with void return type."
        ))
    }

    pub fn key_predicate_not_allowed(segment: &str) -> Self {
        Self::bad_path(format!(
            "The request URI is not valid. The segment '{segment}' cannot include key predicates, however it may end with empty parenthesis."
        ))
    }

    pub fn query_options_not_applicable() -> Self {
        Self::bad_path(
            "Query options $select, $expand, $filter, $orderby, $count, $skip, $skiptoken and $top are not supported by this request method or cannot be applied to the requested resource.",
        )
    }

    // --- binding ---

    pub fn binding_not_assignable(operation: &str, segment: &str) -> Self {
        ServiceError::BindingMismatch {
            message: format!(
                "The binding parameter for '{operation}' is not assignable from the result of the uri segment '{segment}'."
            ),
        }
    }

    pub fn bound_to_non_entity() -> Self {
        ServiceError::BindingMismatch {
            message: "Found an operation bound to a non-entity type.".to_string(),
        }
    }

    // --- payload ---

    pub fn payload(message: impl Into<String>) -> Self {
        ServiceError::PayloadValidation {
            message: message.into(),
        }
    }

    // --- misc ---

    pub fn bad_request(message: impl Into<String>) -> Self {
        ServiceError::BadRequest {
            message: message.into(),
        }
    }

    pub fn not_implemented(message: impl Into<String>) -> Self {
        ServiceError::NotImplemented {
            message: message.into(),
        }
    }

    pub fn failed_dependency() -> Self {
        ServiceError::FailedDependency {
            message: "The request was not executed because another request in its atomicity group failed.".to_string(),
        }
    }

    /// A changeset failed and its writes could not be undone.
    pub fn rollback_failed(group: &str, cause: &ServiceError) -> Self {
        ServiceError::Internal {
            message: format!(
                "The atomicity group '{group}' failed and could not be rolled back: {cause}"
            ),
            source: None,
        }
    }

    pub fn forbidden() -> Self {
        ServiceError::Visibility {
            status: StatusCode::FORBIDDEN,
            message: "Forbidden".to_string(),
        }
    }

    pub fn method_not_allowed(message: impl Into<String>) -> Self {
        ServiceError::MethodNotAllowed {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ServiceError::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// Error raised by user code, reported with the given status.
    pub fn user(status: StatusCode, message: impl Into<String>) -> Self {
        ServiceError::User {
            status,
            message: message.into(),
        }
    }
}
