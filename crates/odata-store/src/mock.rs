//! # Mock Store
//!
//! `MockStore<T>` hands out a real [`StoreClient<T>`] whose requests are answered from a
//! queue of expectations instead of a running [`StoreActor`](crate::StoreActor). Use it
//! to drive failure paths that a live actor cannot easily produce, such as a closed
//! actor or a precondition failure racing with another writer.
//!
//! | Feature | MockStore | StoreActor |
//! |---------|-----------|------------|
//! | **State** | None (scripted answers) | Real records |
//! | **Error injection** | Easy (`return_err`) | Requires specific state |
//! | **Use case** | Code *around* the client | The store itself, full service |
//!
//! ```rust
//! use odata_store::mock::MockStore;
//! use odata_store::{StoreEntity, StoreError};
//! use async_trait::async_trait;
//!
//! #[derive(Clone, Debug)] struct Item { id: u32 }
//! #[derive(Debug)] struct ItemCreate;
//! #[derive(Debug)] struct ItemUpdate;
//! #[derive(Debug, thiserror::Error)] #[error("Err")] struct ItemError;
//!
//! #[async_trait]
//! impl StoreEntity for Item {
//!     type Key = u32; type Create = ItemCreate; type Update = ItemUpdate;
//!     type Context = (); type Error = ItemError;
//!     fn from_create_params(id: u32, _: ItemCreate) -> Result<Self, ItemError> { Ok(Self { id }) }
//!     async fn on_update(&mut self, _: ItemUpdate, _: &()) -> Result<(), ItemError> { Ok(()) }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let mut mock = MockStore::<Item>::new();
//!     mock.expect_get(1).return_err(StoreError::ActorClosed);
//!
//!     let result = mock.client().get(1).await;
//!     assert!(matches!(result, Err(StoreError::ActorClosed)));
//!     mock.verify();
//! }
//! ```

use crate::client::StoreClient;
use crate::entity::StoreEntity;
use crate::error::StoreError;
use crate::message::{Snapshot, StoreRequest};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

// =============================================================================
// EXPECTATION BUILDER API
// =============================================================================

/// An expected request and the scripted answer for it.
enum Expectation<T: StoreEntity> {
    Get {
        key: T::Key,
        response: Result<Option<T>, StoreError>,
    },
    List {
        response: Result<Vec<T>, StoreError>,
    },
    Create {
        response: Result<T, StoreError>,
    },
    Update {
        key: T::Key,
        response: Result<T, StoreError>,
    },
    Delete {
        key: T::Key,
        response: Result<(), StoreError>,
    },
    Snapshot {
        response: Result<Snapshot<T>, StoreError>,
    },
    Restore {
        response: Result<(), StoreError>,
    },
}

type Expectations<T> = Arc<Mutex<VecDeque<Expectation<T>>>>;

/// A mock store with expectation tracking.
///
/// Requests must arrive in the order the expectations were registered; a request
/// that does not match the next expectation (kind or key) panics the mock task,
/// which the caller observes as [`StoreError::ActorDropped`].
pub struct MockStore<T: StoreEntity> {
    client: StoreClient<T>,
    expectations: Expectations<T>,
    _handle: tokio::task::JoinHandle<()>,
}

impl<T: StoreEntity> Default for MockStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: StoreEntity> MockStore<T> {
    /// Creates a new mock with no expectations. Must be called inside a Tokio runtime.
    pub fn new() -> Self {
        let (sender, mut receiver) = mpsc::channel::<StoreRequest<T>>(100);
        let expectations: Expectations<T> = Arc::new(Mutex::new(VecDeque::new()));
        let queue = expectations.clone();

        let handle = tokio::spawn(async move {
            while let Some(request) = receiver.recv().await {
                let next = queue.lock().unwrap().pop_front();
                match (request, next) {
                    (
                        StoreRequest::Get { key, respond_to },
                        Some(Expectation::Get { key: expected, response }),
                    ) if key == expected => {
                        let _ = respond_to.send(response);
                    }
                    (StoreRequest::List { respond_to }, Some(Expectation::List { response })) => {
                        let _ = respond_to.send(response);
                    }
                    (
                        StoreRequest::Create { respond_to, .. },
                        Some(Expectation::Create { response }),
                    ) => {
                        let _ = respond_to.send(response);
                    }
                    (
                        StoreRequest::Update {
                            key, respond_to, ..
                        },
                        Some(Expectation::Update { key: expected, response }),
                    ) if key == expected => {
                        let _ = respond_to.send(response);
                    }
                    (
                        StoreRequest::Delete {
                            key, respond_to, ..
                        },
                        Some(Expectation::Delete { key: expected, response }),
                    ) if key == expected => {
                        let _ = respond_to.send(response);
                    }
                    (
                        StoreRequest::Snapshot { respond_to },
                        Some(Expectation::Snapshot { response }),
                    ) => {
                        let _ = respond_to.send(response);
                    }
                    (
                        StoreRequest::Restore { respond_to, .. },
                        Some(Expectation::Restore { response }),
                    ) => {
                        let _ = respond_to.send(response);
                    }
                    _ => panic!("Unexpected store request or expectation mismatch"),
                }
            }
        });

        Self {
            client: StoreClient::new(sender),
            expectations,
            _handle: handle,
        }
    }

    /// Returns a client wired to this mock.
    pub fn client(&self) -> StoreClient<T> {
        self.client.clone()
    }

    fn push(&self, expectation: Expectation<T>) {
        self.expectations.lock().unwrap().push_back(expectation);
    }

    /// Expects a `get` for `key`.
    pub fn expect_get(&mut self, key: T::Key) -> ExpectationBuilder<'_, T, Option<T>> {
        ExpectationBuilder::new(self, move |response| Expectation::Get { key, response })
    }

    /// Expects a `list`.
    pub fn expect_list(&mut self) -> ExpectationBuilder<'_, T, Vec<T>> {
        ExpectationBuilder::new(self, |response| Expectation::List { response })
    }

    /// Expects a `create`.
    pub fn expect_create(&mut self) -> ExpectationBuilder<'_, T, T> {
        ExpectationBuilder::new(self, |response| Expectation::Create { response })
    }

    /// Expects an `update` of `key`.
    pub fn expect_update(&mut self, key: T::Key) -> ExpectationBuilder<'_, T, T> {
        ExpectationBuilder::new(self, move |response| Expectation::Update { key, response })
    }

    /// Expects a `delete` of `key`.
    pub fn expect_delete(&mut self, key: T::Key) -> ExpectationBuilder<'_, T, ()> {
        ExpectationBuilder::new(self, move |response| Expectation::Delete { key, response })
    }

    /// Expects a `snapshot`.
    pub fn expect_snapshot(&mut self) -> ExpectationBuilder<'_, T, Snapshot<T>> {
        ExpectationBuilder::new(self, |response| Expectation::Snapshot { response })
    }

    /// Expects a `restore`. The restored records are not checked.
    pub fn expect_restore(&mut self) -> ExpectationBuilder<'_, T, ()> {
        ExpectationBuilder::new(self, |response| Expectation::Restore { response })
    }

    /// Panics unless every expectation was consumed.
    pub fn verify(&self) {
        let remaining = self.expectations.lock().unwrap().len();
        if remaining != 0 {
            panic!("Not all expectations were met. {remaining} remaining");
        }
    }
}

/// Builder that records the answer for one expectation.
pub struct ExpectationBuilder<'a, T: StoreEntity, R> {
    mock: &'a MockStore<T>,
    make: Box<dyn FnOnce(Result<R, StoreError>) -> Expectation<T> + 'a>,
}

impl<'a, T: StoreEntity, R> ExpectationBuilder<'a, T, R> {
    fn new(
        mock: &'a MockStore<T>,
        make: impl FnOnce(Result<R, StoreError>) -> Expectation<T> + 'a,
    ) -> Self {
        Self {
            mock,
            make: Box::new(make),
        }
    }

    /// Answers the request successfully.
    pub fn return_ok(self, value: R) {
        self.mock.push((self.make)(Ok(value)));
    }

    /// Answers the request with an error.
    pub fn return_err(self, error: StoreError) {
        self.mock.push((self.make)(Err(error)));
    }
}

// =============================================================================
// CHANNEL HELPERS
// =============================================================================

/// Creates a client together with the raw receiver, for tests that want to inspect
/// each request and answer it by hand.
pub fn create_mock_client<T: StoreEntity>(
    buffer_size: usize,
) -> (StoreClient<T>, mpsc::Receiver<StoreRequest<T>>) {
    let (sender, receiver) = mpsc::channel(buffer_size);
    (StoreClient::new(sender), receiver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Precondition;
    use async_trait::async_trait;

    #[derive(Clone, Debug, PartialEq)]
    struct Item {
        id: u32,
        label: String,
    }

    #[derive(Debug)]
    struct ItemCreate {
        label: String,
    }

    #[derive(Debug)]
    struct ItemUpdate;

    #[derive(Debug, thiserror::Error)]
    #[error("Item error")]
    struct ItemError;

    #[async_trait]
    impl StoreEntity for Item {
        type Key = u32;
        type Create = ItemCreate;
        type Update = ItemUpdate;
        type Context = ();
        type Error = ItemError;

        fn from_create_params(id: u32, params: ItemCreate) -> Result<Self, Self::Error> {
            Ok(Self {
                id,
                label: params.label,
            })
        }

        async fn on_update(&mut self, _: ItemUpdate, _: &()) -> Result<(), Self::Error> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_raw_channel_mock() {
        let (client, mut receiver) = create_mock_client::<Item>(10);

        let create_task = tokio::spawn(async move {
            client
                .create(
                    None,
                    ItemCreate {
                        label: "first".to_string(),
                    },
                )
                .await
        });

        match receiver.recv().await {
            Some(StoreRequest::Create {
                key,
                params,
                respond_to,
            }) => {
                assert!(key.is_none());
                assert_eq!(params.label, "first");
                respond_to
                    .send(Ok(Item {
                        id: 7,
                        label: params.label,
                    }))
                    .unwrap();
            }
            other => panic!("Expected Create request, got {other:?}"),
        }

        let created = create_task.await.unwrap().unwrap();
        assert_eq!(created.id, 7);
    }

    #[tokio::test]
    async fn test_mock_store_with_expectations() {
        let mut mock = MockStore::<Item>::new();
        mock.expect_create().return_ok(Item {
            id: 1,
            label: "a".into(),
        });
        mock.expect_update(1).return_err(StoreError::PreconditionFailed {
            key: "1".into(),
            current: Some("W/\"2\"".into()),
        });
        mock.expect_delete(1).return_ok(());

        let client = mock.client();
        let created = client
            .create(None, ItemCreate { label: "a".into() })
            .await
            .unwrap();
        assert_eq!(created.id, 1);

        let updated = client
            .update(1, Precondition::Matches("W/\"1\"".into()), ItemUpdate)
            .await;
        assert!(matches!(updated, Err(StoreError::PreconditionFailed { .. })));

        client.delete(1, Precondition::None).await.unwrap();
        mock.verify();
    }

    #[tokio::test]
    async fn test_mock_store_key_mismatch_drops_response() {
        let mut mock = MockStore::<Item>::new();
        mock.expect_get(1).return_ok(None);

        let result = mock.client().get(2).await;
        assert!(matches!(result, Err(StoreError::ActorDropped)));
    }
}
