//! # Store Errors
//!
//! Errors raised by the store actor and its clients. Entity-specific failures
//! (for example a rejected change) travel inside [`StoreError::EntityError`] so the
//! caller can downcast them back to its own error type.

/// Errors that can occur within the entity store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store actor closed")]
    ActorClosed,
    #[error("Store actor dropped response channel")]
    ActorDropped,
    #[error("Entity not found: {0}")]
    NotFound(String),
    #[error("Entity already exists: {0}")]
    Conflict(String),
    #[error("Precondition failed for entity {key}")]
    PreconditionFailed {
        key: String,
        current: Option<String>,
    },
    #[error("Entity error: {0}")]
    EntityError(Box<dyn std::error::Error + Send + Sync>),
}

impl StoreError {
    /// Returns the entity error carried by this store error, if it is of type `E`.
    pub fn entity_error<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            StoreError::EntityError(inner) => inner.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Outcome of comparing a request precondition with an entity's current tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
    /// No precondition supplied; the write proceeds unconditionally.
    None,
    /// `If-Match: *`: any existing entity matches.
    Any,
    /// `If-Match: <tag>`: the current tag must equal this value.
    Matches(String),
}

impl Precondition {
    /// Checks the precondition against the entity's current tag.
    pub fn is_satisfied_by(&self, current: Option<&str>) -> bool {
        match self {
            Precondition::None | Precondition::Any => true,
            Precondition::Matches(expected) => current == Some(expected.as_str()),
        }
    }
}
