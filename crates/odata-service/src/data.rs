//! Typed access to the per-set store actors.

use crate::error::ServiceError;
use crate::model::{Entity, EntityCreate, EntityKey, EntityUpdate, ServiceModel};
use async_trait::async_trait;
use http::StatusCode;
use odata_store::{Precondition, Snapshot, StoreAccess, StoreClient, StoreError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Client for one entity set's store actor.
#[derive(Clone)]
pub struct SetClient {
    set: String,
    inner: StoreClient<Entity>,
}

#[async_trait]
impl StoreAccess<Entity> for SetClient {
    type Error = ServiceError;

    fn inner(&self) -> &StoreClient<Entity> {
        &self.inner
    }

    fn map_error(e: StoreError) -> ServiceError {
        match e {
            StoreError::EntityError(inner) => match inner.downcast::<ServiceError>() {
                Ok(err) => *err,
                Err(other) => ServiceError::Internal {
                    message: "The entity store rejected the change.".to_string(),
                    source: Some(other),
                },
            },
            StoreError::PreconditionFailed { .. } => ServiceError::Concurrency {
                status: StatusCode::PRECONDITION_FAILED,
                message: "The etag value in the request header does not match with the current etag value of the object.".to_string(),
            },
            StoreError::Conflict(key) => ServiceError::Conflict {
                message: format!("An entity with the key '{key}' already exists."),
            },
            StoreError::NotFound(key) => ServiceError::PathResolution {
                status: StatusCode::NOT_FOUND,
                message: format!("No entity with the key '{key}' exists."),
            },
            other @ (StoreError::ActorClosed | StoreError::ActorDropped) => ServiceError::Internal {
                message: "The entity store is unavailable.".to_string(),
                source: Some(Box::new(other)),
            },
        }
    }
}

impl SetClient {
    pub fn new(set: impl Into<String>, inner: StoreClient<Entity>) -> Self {
        Self {
            set: set.into(),
            inner,
        }
    }

    pub fn name(&self) -> &str {
        &self.set
    }

    #[instrument(skip(self, entity), fields(entity_set = %self.set))]
    pub async fn create(&self, key: Option<EntityKey>, entity: Entity) -> Result<Entity, ServiceError> {
        debug!(?entity, "Sending create");
        self.inner
            .create(key, EntityCreate { entity })
            .await
            .map_err(Self::map_error)
    }

    #[instrument(skip(self, key, update), fields(entity_set = %self.set, key = %key))]
    pub async fn update(
        &self,
        key: EntityKey,
        precondition: Precondition,
        update: EntityUpdate,
    ) -> Result<Entity, ServiceError> {
        debug!(?update, "Sending update");
        self.inner
            .update(key, precondition, update)
            .await
            .map_err(Self::map_error)
    }

    #[instrument(skip(self, key), fields(entity_set = %self.set, key = %key))]
    pub async fn delete(&self, key: EntityKey, precondition: Precondition) -> Result<(), ServiceError> {
        self.inner
            .delete(key, precondition)
            .await
            .map_err(Self::map_error)
    }
}

/// Point-in-time copy of every set, used to roll back a failed changeset.
pub struct DataSnapshot {
    sets: Vec<(SetClient, Snapshot<Entity>)>,
}

/// All entity sets of a running service, addressed by set name.
#[derive(Clone, Default)]
pub struct DataSource {
    sets: Arc<BTreeMap<String, SetClient>>,
}

impl DataSource {
    pub fn new(sets: impl IntoIterator<Item = SetClient>) -> Self {
        Self {
            sets: Arc::new(
                sets.into_iter()
                    .map(|client| (client.set.clone(), client))
                    .collect(),
            ),
        }
    }

    pub fn set(&self, name: &str) -> Result<&SetClient, ServiceError> {
        self.sets
            .get(name)
            .ok_or_else(|| ServiceError::resource_not_found(name))
    }

    pub async fn get(&self, set: &str, key: EntityKey) -> Result<Option<Entity>, ServiceError> {
        self.set(set)?.fetch(key).await
    }

    pub async fn list(&self, set: &str) -> Result<Vec<Entity>, ServiceError> {
        self.set(set)?.fetch_all().await
    }

    /// Entities linked from `entity` through `navigation`, read from the target set.
    /// Dangling links are skipped.
    pub async fn navigate(
        &self,
        model: &ServiceModel,
        set: &str,
        entity: &Entity,
        navigation: &str,
    ) -> Result<Vec<Entity>, ServiceError> {
        let Some(target) = model.navigation_target(set, navigation) else {
            return Ok(Vec::new());
        };
        let client = self.set(&target.name)?;
        let mut linked = Vec::new();
        for key in entity.links(navigation) {
            if let Some(found) = client.fetch(key.clone()).await? {
                linked.push(found);
            }
        }
        Ok(linked)
    }

    pub async fn snapshot_all(&self) -> Result<DataSnapshot, ServiceError> {
        let mut sets = Vec::with_capacity(self.sets.len());
        for client in self.sets.values() {
            let snapshot = client
                .inner
                .snapshot()
                .await
                .map_err(SetClient::map_error)?;
            sets.push((client.clone(), snapshot));
        }
        Ok(DataSnapshot { sets })
    }

    pub async fn restore_all(&self, snapshot: DataSnapshot) -> Result<(), ServiceError> {
        for (client, records) in snapshot.sets {
            debug!(entity_set = %client.set, "Restoring snapshot");
            client
                .inner
                .restore(records)
                .await
                .map_err(SetClient::map_error)?;
        }
        Ok(())
    }
}
