//! # StoreEntity Trait
//!
//! The `StoreEntity` trait is the contract every record kept by a [`StoreActor`](crate::StoreActor)
//! implements. It names the key, creation and update payloads, the runtime context
//! injected into hooks, and the entity's error type, and it exposes the entity's
//! current concurrency tag so the actor can evaluate `If-Match` preconditions inside
//! the same turn that performs the write.
//!
//! # Provided Methods (Hooks)
//! - [`StoreEntity::etag`] defaults to `None` (no optimistic concurrency).
//! - [`StoreEntity::on_create`] and [`StoreEntity::on_delete`] default to `Ok(())`.

use async_trait::async_trait;
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Trait that any stored record must implement to be managed by `StoreActor`.
///
/// # Async & Context
/// Hooks are `#[async_trait]` so they can await other services. The `Context` type is
/// injected into every hook at `run()` time ("late binding"), which is how change
/// interceptors reach the entity without the entity owning them.
#[async_trait]
pub trait StoreEntity: Clone + Send + Sync + 'static {
    /// The key identifying a record inside one store.
    /// Must be convertible from u32 for generated keys.
    type Key: Eq + Ord + Hash + Clone + Send + Sync + Display + Debug + From<u32>;

    /// The data required to create a new record.
    type Create: Send + Sync + Debug;

    /// The data required to change an existing record.
    type Update: Send + Sync + Debug;

    /// The runtime context (dependencies) injected into the actor.
    type Context: Send + Sync;

    /// The error type for this entity.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Construct the record from its key and creation payload.
    /// This is called synchronously before `on_create`.
    fn from_create_params(key: Self::Key, params: Self::Create) -> Result<Self, Self::Error>;

    /// Current concurrency tag, or `None` when the record has no concurrency tokens.
    fn etag(&self) -> Option<String> {
        None
    }

    // --- Lifecycle Hooks (Async) ---

    /// Called after the record is constructed and before it is inserted.
    async fn on_create(&mut self, _ctx: &Self::Context) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Called when an update request passed its precondition.
    /// The hook mutates `self`; returning an error leaves the stored record untouched.
    async fn on_update(&mut self, update: Self::Update, ctx: &Self::Context)
        -> Result<(), Self::Error>;

    /// Called immediately before the record is removed.
    async fn on_delete(&self, _ctx: &Self::Context) -> Result<(), Self::Error> {
        Ok(())
    }
}
