//! # Store Client
//!
//! The cloneable handle used to talk to a [`StoreActor`](crate::StoreActor).

use crate::entity::StoreEntity;
use crate::error::{Precondition, StoreError};
use crate::message::{Snapshot, StoreRequest};
use tokio::sync::{mpsc, oneshot};

/// A type-safe client for interacting with a `StoreActor`.
///
/// Holds only the sender half of the actor's channel, so cloning is cheap. Every
/// method sends one [`StoreRequest`] and awaits the actor's answer.
pub struct StoreClient<T: StoreEntity> {
    sender: mpsc::Sender<StoreRequest<T>>,
}

impl<T: StoreEntity> Clone for StoreClient<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

impl<T: StoreEntity> StoreClient<T> {
    pub fn new(sender: mpsc::Sender<StoreRequest<T>>) -> Self {
        Self { sender }
    }

    async fn call<R>(
        &self,
        request: impl FnOnce(oneshot::Sender<Result<R, StoreError>>) -> StoreRequest<T>,
    ) -> Result<R, StoreError> {
        let (respond_to, response) = oneshot::channel();
        self.sender
            .send(request(respond_to))
            .await
            .map_err(|_| StoreError::ActorClosed)?;
        response.await.map_err(|_| StoreError::ActorDropped)?
    }

    pub async fn create(&self, key: Option<T::Key>, params: T::Create) -> Result<T, StoreError> {
        self.call(|respond_to| StoreRequest::Create {
            key,
            params,
            respond_to,
        })
        .await
    }

    pub async fn get(&self, key: T::Key) -> Result<Option<T>, StoreError> {
        self.call(|respond_to| StoreRequest::Get { key, respond_to })
            .await
    }

    pub async fn list(&self) -> Result<Vec<T>, StoreError> {
        self.call(|respond_to| StoreRequest::List { respond_to }).await
    }

    pub async fn update(
        &self,
        key: T::Key,
        precondition: Precondition,
        update: T::Update,
    ) -> Result<T, StoreError> {
        self.call(|respond_to| StoreRequest::Update {
            key,
            precondition,
            update,
            respond_to,
        })
        .await
    }

    pub async fn delete(&self, key: T::Key, precondition: Precondition) -> Result<(), StoreError> {
        self.call(|respond_to| StoreRequest::Delete {
            key,
            precondition,
            respond_to,
        })
        .await
    }

    pub async fn snapshot(&self) -> Result<Snapshot<T>, StoreError> {
        self.call(|respond_to| StoreRequest::Snapshot { respond_to })
            .await
    }

    pub async fn restore(&self, snapshot: Snapshot<T>) -> Result<(), StoreError> {
        self.call(|respond_to| StoreRequest::Restore {
            snapshot,
            respond_to,
        })
        .await
    }
}
