//! # Store Messages
//!
//! Messages exchanged between a [`StoreClient`](crate::StoreClient) and its
//! [`StoreActor`](crate::StoreActor). Every request carries a oneshot sender the
//! actor answers on.

use crate::entity::StoreEntity;
use crate::error::{Precondition, StoreError};
use std::collections::BTreeMap;
use tokio::sync::oneshot;

/// Type alias for the one-shot response channel used by the store actor.
pub type Response<T> = oneshot::Sender<Result<T, StoreError>>;

/// Point-in-time copy of a store's records, used to roll back a failed changeset.
#[derive(Debug, Clone)]
pub struct Snapshot<T: StoreEntity> {
    pub records: BTreeMap<T::Key, T>,
    pub next_key: u32,
}

/// Request sent to the store actor.
///
/// - **Create** inserts a record. With `key: None` the actor generates the next free key.
/// - **Get** / **List** read the current state.
/// - **Update** / **Delete** evaluate their [`Precondition`] and perform the write in the same turn.
/// - **Snapshot** / **Restore** copy and replace the whole store.
#[derive(Debug)]
pub enum StoreRequest<T: StoreEntity> {
    Create {
        key: Option<T::Key>,
        params: T::Create,
        respond_to: Response<T>,
    },
    Get {
        key: T::Key,
        respond_to: Response<Option<T>>,
    },
    List {
        respond_to: Response<Vec<T>>,
    },
    Update {
        key: T::Key,
        precondition: Precondition,
        update: T::Update,
        respond_to: Response<T>,
    },
    Delete {
        key: T::Key,
        precondition: Precondition,
        respond_to: Response<()>,
    },
    Snapshot {
        respond_to: Response<Snapshot<T>>,
    },
    Restore {
        snapshot: Snapshot<T>,
        respond_to: Response<()>,
    },
}
