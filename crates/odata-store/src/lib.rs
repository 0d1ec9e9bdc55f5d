//! # OData Store
//!
//! A single-writer, actor-based entity store. Each entity set of a data service is
//! owned by one [`StoreActor`] running in its own Tokio task; every read and write is a
//! message processed sequentially by that task.
//!
//! ## Why a single writer?
//!
//! Optimistic concurrency needs the ETag comparison and the write it guards to be
//! atomic from the caller's point of view. Because the actor owns its records and
//! handles one message at a time, an `Update` or `Delete` carrying a [`Precondition`]
//! is checked and applied in the same turn; no lock is needed and no other writer can
//! slip in between.
//!
//! ## Layers
//!
//! 1. **Entity Layer** ([`StoreEntity`]) - key, payload types, concurrency tag, and hooks
//! 2. **Runtime Layer** ([`StoreActor`]) - message loop and record ownership
//! 3. **Interface Layer** ([`StoreClient`], [`StoreAccess`]) - typed async API
//!
//! ## Changesets
//!
//! [`StoreClient::snapshot`] and [`StoreClient::restore`] copy and replace a store's
//! records. A caller that serializes its writers can take snapshots before a group of
//! writes and restore them if any write fails.
//!
//! ## Testing
//!
//! [`mock::MockStore`] answers requests from scripted expectations so callers can
//! exercise failure paths without a live actor.

pub mod actor;
pub mod client;
pub mod client_trait;
pub mod entity;
pub mod error;
pub mod message;
pub mod mock;

// Re-export core types for convenience
pub use actor::StoreActor;
pub use client::StoreClient;
pub use client_trait::StoreAccess;
pub use entity::StoreEntity;
pub use error::{Precondition, StoreError};
pub use message::{Response, Snapshot, StoreRequest};
