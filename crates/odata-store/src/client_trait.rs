//! # StoreAccess Trait
//!
//! Common interface for domain-specific store wrappers: provides `fetch` and `fetch_all`
//! on top of a generic [`StoreClient`], translating [`StoreError`] into the wrapper's
//! own error type.
use crate::{StoreClient, StoreEntity, StoreError};
use async_trait::async_trait;

/// Trait for domain wrappers around a [`StoreClient`].
///
/// # Example
///
/// ```rust
/// use odata_store::{StoreAccess, StoreClient, StoreEntity, StoreError};
/// use async_trait::async_trait;
///
/// #[derive(Clone, Debug)] struct Tag { id: u32 }
/// #[derive(Debug)] struct TagCreate;
/// #[derive(Debug)] struct TagUpdate;
/// #[derive(Debug, thiserror::Error)] #[error("{0}")] struct TagError(String);
///
/// #[async_trait]
/// impl StoreEntity for Tag {
///     type Key = u32; type Create = TagCreate; type Update = TagUpdate;
///     type Context = (); type Error = TagError;
///     fn from_create_params(id: u32, _: TagCreate) -> Result<Self, TagError> { Ok(Self { id }) }
///     async fn on_update(&mut self, _: TagUpdate, _: &()) -> Result<(), TagError> { Ok(()) }
/// }
///
/// struct Tags { inner: StoreClient<Tag> }
///
/// #[async_trait]
/// impl StoreAccess<Tag> for Tags {
///     type Error = TagError;
///     fn inner(&self) -> &StoreClient<Tag> { &self.inner }
///     fn map_error(e: StoreError) -> TagError { TagError(e.to_string()) }
/// }
///
/// async fn usage(tags: Tags) {
///     // fetch() and fetch_all() are provided automatically
///     let _ = tags.fetch(1).await;
///     let _ = tags.fetch_all().await;
/// }
/// ```
#[async_trait]
pub trait StoreAccess<T: StoreEntity>: Send + Sync {
    /// The wrapper's error type.
    type Error: Send + Sync;

    /// Access the inner generic client.
    fn inner(&self) -> &StoreClient<T>;

    /// Map store errors to the wrapper's error type.
    fn map_error(e: StoreError) -> Self::Error;

    /// Fetch one record by key.
    #[tracing::instrument(skip(self))]
    async fn fetch(&self, key: T::Key) -> Result<Option<T>, Self::Error> {
        tracing::debug!("Sending request");
        self.inner().get(key).await.map_err(Self::map_error)
    }

    /// Fetch every record in key order.
    #[tracing::instrument(skip(self))]
    async fn fetch_all(&self) -> Result<Vec<T>, Self::Error> {
        tracing::debug!("Sending request");
        self.inner().list().await.map_err(Self::map_error)
    }
}
