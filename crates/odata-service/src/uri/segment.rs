//! Resolved path segments.

use crate::invoke::RegisteredOperation;
use crate::model::{EntityKey, TypeRef};
use std::sync::Arc;

/// What the path addresses after a segment has been applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    ServiceDocument,
    Metadata,
    Batch,
    /// A collection of entities of `type_name` (or derived) from `set`.
    Entities {
        set: String,
        type_name: String,
        /// Entity sets and composable operation results; navigation collections are not.
        queryable: bool,
    },
    Entity {
        set: String,
        type_name: String,
    },
    /// A primitive, complex, or collection-valued property or operation result.
    Value(TypeRef),
    Count,
    RawValue,
    /// Result of a void operation.
    Void,
}

impl Target {
    pub fn set(&self) -> Option<&str> {
        match self {
            Target::Entities { set, .. } | Target::Entity { set, .. } => Some(set),
            _ => None,
        }
    }

    pub fn entity_type(&self) -> Option<&str> {
        match self {
            Target::Entities { type_name, .. } | Target::Entity { type_name, .. } => {
                Some(type_name)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum SegmentKind {
    Metadata,
    Batch,
    Count,
    Value,
    EntitySet(String),
    Navigation(String),
    Property(String),
    TypeCast(String),
    Operation(Arc<RegisteredOperation>),
}

/// One resolved path segment.
#[derive(Debug, Clone)]
pub struct Segment {
    /// The segment name as written in the URI, without parentheses.
    pub identifier: String,
    pub kind: SegmentKind,
    pub key: Option<EntityKey>,
    pub target: Target,
}

impl Segment {
    pub fn operation(&self) -> Option<&Arc<RegisteredOperation>> {
        match &self.kind {
            SegmentKind::Operation(op) => Some(op),
            _ => None,
        }
    }
}

/// A fully resolved request path.
#[derive(Debug, Clone, Default)]
pub struct ResolvedPath {
    pub segments: Vec<Segment>,
}

impl ResolvedPath {
    pub fn target(&self) -> &Target {
        self.segments
            .last()
            .map_or(&Target::ServiceDocument, |s| &s.target)
    }

    /// The operation named by the last segment, if any.
    pub fn invoked_operation(&self) -> Option<&Arc<RegisteredOperation>> {
        self.segments.last().and_then(Segment::operation)
    }

    /// Whether any segment invokes an operation.
    pub fn has_operation(&self) -> bool {
        self.segments.iter().any(|s| s.operation().is_some())
    }
}
