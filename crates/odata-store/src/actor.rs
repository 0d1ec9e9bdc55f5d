//! # Store Actor
//!
//! This module defines the `StoreActor`, the single writer for one entity set. It
//! processes messages sequentially, so a precondition check and the write it guards
//! always happen in the same turn and no other request can interleave between them.

use crate::client::StoreClient;
use crate::entity::StoreEntity;
use crate::error::{Precondition, StoreError};
use crate::message::{Snapshot, StoreRequest};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// The actor that owns the records of one store.
///
/// # Concurrency Model
/// Each `StoreActor` runs in its own Tokio task and handles one message at a time.
/// The `records` map is owned exclusively by that task, so no locks are needed and
/// optimistic concurrency checks are atomic with the writes they protect.
///
/// ```rust
/// use odata_store::{StoreActor, StoreEntity, Precondition};
/// use async_trait::async_trait;
///
/// #[derive(Clone, Debug)] struct Note { id: u32, text: String, version: u32 }
/// #[derive(Debug)] struct NoteCreate { text: String }
/// #[derive(Debug)] struct NoteUpdate { text: String }
/// #[derive(Debug, thiserror::Error)] #[error("note error")] struct NoteError;
///
/// #[async_trait]
/// impl StoreEntity for Note {
///     type Key = u32; type Create = NoteCreate; type Update = NoteUpdate;
///     type Context = (); type Error = NoteError;
///     fn from_create_params(id: u32, p: NoteCreate) -> Result<Self, NoteError> {
///         Ok(Self { id, text: p.text, version: 1 })
///     }
///     fn etag(&self) -> Option<String> { Some(format!("W/\"{}\"", self.version)) }
///     async fn on_update(&mut self, u: NoteUpdate, _: &()) -> Result<(), NoteError> {
///         self.text = u.text;
///         self.version += 1;
///         Ok(())
///     }
/// }
///
/// #[tokio::main]
/// async fn main() {
///     let (actor, client) = StoreActor::<Note>::new(10);
///     tokio::spawn(actor.run(()));
///
///     let note = client.create(None, NoteCreate { text: "a".into() }).await.unwrap();
///     let tag = Precondition::Matches(note.etag().unwrap());
///     let updated = client.update(note.id, tag, NoteUpdate { text: "b".into() }).await.unwrap();
///     assert_eq!(updated.version, 2);
/// }
/// ```
pub struct StoreActor<T: StoreEntity> {
    receiver: mpsc::Receiver<StoreRequest<T>>,
    records: BTreeMap<T::Key, T>,
    next_key: u32,
    label: String,
}

impl<T: StoreEntity> StoreActor<T> {
    /// Creates a new `StoreActor` and its associated `StoreClient`.
    ///
    /// `buffer_size` is the capacity of the MPSC channel; callers wait when it is full.
    pub fn new(buffer_size: usize) -> (Self, StoreClient<T>) {
        let label = std::any::type_name::<T>()
            .split("::")
            .last()
            .unwrap_or("Unknown")
            .to_string();
        Self::with_label(buffer_size, label)
    }

    /// Same as [`StoreActor::new`], with an explicit label used in log records
    /// (typically the entity set name).
    pub fn with_label(buffer_size: usize, label: impl Into<String>) -> (Self, StoreClient<T>) {
        let (sender, receiver) = mpsc::channel(buffer_size);
        let actor = Self {
            receiver,
            records: BTreeMap::new(),
            next_key: 1,
            label: label.into(),
        };
        (actor, StoreClient::new(sender))
    }

    fn generate_key(&mut self) -> T::Key {
        loop {
            let key = T::Key::from(self.next_key);
            self.next_key += 1;
            if !self.records.contains_key(&key) {
                return key;
            }
        }
    }

    fn check(&self, key: &T::Key, precondition: &Precondition) -> Result<(), StoreError> {
        let Some(current) = self.records.get(key) else {
            return Err(StoreError::NotFound(key.to_string()));
        };
        let tag = current.etag();
        if precondition.is_satisfied_by(tag.as_deref()) {
            Ok(())
        } else {
            Err(StoreError::PreconditionFailed {
                key: key.to_string(),
                current: tag,
            })
        }
    }

    /// Runs the actor's event loop until every client has been dropped.
    ///
    /// The `context` is handed to every entity hook.
    pub async fn run(mut self, context: T::Context) {
        let store = self.label.clone();
        let store = store.as_str();
        info!(store, "Store started");

        while let Some(msg) = self.receiver.recv().await {
            match msg {
                StoreRequest::Create {
                    key,
                    params,
                    respond_to,
                } => {
                    debug!(store, ?params, "Create");
                    let key = match key {
                        Some(key) if self.records.contains_key(&key) => {
                            warn!(store, %key, "Key already in use");
                            let _ = respond_to.send(Err(StoreError::Conflict(key.to_string())));
                            continue;
                        }
                        Some(key) => key,
                        None => self.generate_key(),
                    };

                    match T::from_create_params(key.clone(), params) {
                        Ok(mut record) => {
                            if let Err(e) = record.on_create(&context).await {
                                warn!(store, %key, error = %e, "on_create failed");
                                let _ = respond_to.send(Err(StoreError::EntityError(Box::new(e))));
                                continue;
                            }
                            self.records.insert(key.clone(), record.clone());
                            info!(store, %key, size = self.records.len(), "Created");
                            let _ = respond_to.send(Ok(record));
                        }
                        Err(e) => {
                            warn!(store, error = %e, "Create failed");
                            let _ = respond_to.send(Err(StoreError::EntityError(Box::new(e))));
                        }
                    }
                }
                StoreRequest::Get { key, respond_to } => {
                    let record = self.records.get(&key).cloned();
                    debug!(store, %key, found = record.is_some(), "Get");
                    let _ = respond_to.send(Ok(record));
                }
                StoreRequest::List { respond_to } => {
                    debug!(store, size = self.records.len(), "List");
                    let _ = respond_to.send(Ok(self.records.values().cloned().collect()));
                }
                StoreRequest::Update {
                    key,
                    precondition,
                    update,
                    respond_to,
                } => {
                    debug!(store, %key, ?precondition, ?update, "Update");
                    if let Err(e) = self.check(&key, &precondition) {
                        warn!(store, %key, error = %e, "Update rejected");
                        let _ = respond_to.send(Err(e));
                        continue;
                    }
                    let Some(current) = self.records.get(&key) else {
                        let _ = respond_to.send(Err(StoreError::NotFound(key.to_string())));
                        continue;
                    };
                    // Hooks run against a copy so a failed hook leaves the record as it was.
                    let mut candidate = current.clone();
                    if let Err(e) = candidate.on_update(update, &context).await {
                        warn!(store, %key, error = %e, "Update failed");
                        let _ = respond_to.send(Err(StoreError::EntityError(Box::new(e))));
                        continue;
                    }
                    self.records.insert(key.clone(), candidate.clone());
                    info!(store, %key, "Updated");
                    let _ = respond_to.send(Ok(candidate));
                }
                StoreRequest::Delete {
                    key,
                    precondition,
                    respond_to,
                } => {
                    debug!(store, %key, ?precondition, "Delete");
                    if let Err(e) = self.check(&key, &precondition) {
                        warn!(store, %key, error = %e, "Delete rejected");
                        let _ = respond_to.send(Err(e));
                        continue;
                    }
                    if let Some(record) = self.records.get(&key) {
                        if let Err(e) = record.on_delete(&context).await {
                            warn!(store, %key, error = %e, "on_delete failed");
                            let _ = respond_to.send(Err(StoreError::EntityError(Box::new(e))));
                            continue;
                        }
                    }
                    self.records.remove(&key);
                    info!(store, %key, size = self.records.len(), "Deleted");
                    let _ = respond_to.send(Ok(()));
                }
                StoreRequest::Snapshot { respond_to } => {
                    debug!(store, size = self.records.len(), "Snapshot");
                    let _ = respond_to.send(Ok(Snapshot {
                        records: self.records.clone(),
                        next_key: self.next_key,
                    }));
                }
                StoreRequest::Restore {
                    snapshot,
                    respond_to,
                } => {
                    self.records = snapshot.records;
                    self.next_key = snapshot.next_key;
                    info!(store, size = self.records.len(), "Restored");
                    let _ = respond_to.send(Ok(()));
                }
            }
        }

        info!(store, size = self.records.len(), "Shutdown");
    }
}
