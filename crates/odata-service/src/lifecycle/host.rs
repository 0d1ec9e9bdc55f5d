use crate::access::AccessGate;
use crate::config::ServiceConfig;
use crate::data::{DataSource, SetClient};
use crate::error::ServiceError;
use crate::interceptor::{ChangeContext, ChangeInterceptor};
use crate::invoke::{InvocationObserver, NoopObserver, OperationHandler, OperationRegistry, RegistrationError};
use crate::model::{Entity, ModelError, OperationDefinition, ServiceModel};
use crate::request::{ODataRequest, ODataResponse};
use crate::service::{DataService, ServiceSettings};
use odata_store::StoreActor;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info};

#[derive(Debug, Error)]
pub enum HostError {
    #[error("invalid service model: {0}")]
    Model(#[from] ModelError),

    #[error("operation registration failed: {0}")]
    Registration(#[from] RegistrationError),

    #[error("seeding entity set '{set}' failed: {source}")]
    Seed {
        set: String,
        #[source]
        source: ServiceError,
    },

    #[error("store task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Collects the model, operations, rules, and seed data of a service before
/// its store actors are started.
pub struct HostBuilder {
    model: Arc<ServiceModel>,
    registry: OperationRegistry,
    gate: AccessGate,
    settings: ServiceSettings,
    store_capacity: usize,
    observer: Arc<dyn InvocationObserver>,
    interceptors: HashMap<String, Vec<Arc<dyn ChangeInterceptor>>>,
    seed: Vec<(String, Entity)>,
}

impl HostBuilder {
    /// A builder with default settings where every set and operation is visible.
    pub fn new(model: ServiceModel) -> Self {
        Self {
            model: Arc::new(model),
            registry: OperationRegistry::new(),
            gate: AccessGate::allow_all(),
            settings: ServiceSettings::default(),
            store_capacity: 32,
            observer: Arc::new(NoopObserver),
            interceptors: HashMap::new(),
            seed: Vec::new(),
        }
    }

    /// Takes settings, rights tables, and store capacity from `config`.
    pub fn configured(model: ServiceModel, config: &ServiceConfig) -> Self {
        Self::new(model)
            .settings(config.settings())
            .access(config.access_gate())
            .store_capacity(config.store_capacity)
    }

    pub fn model(&self) -> &ServiceModel {
        &self.model
    }

    pub fn operation(
        mut self,
        definition: OperationDefinition,
        handler: Arc<dyn OperationHandler>,
    ) -> Result<Self, RegistrationError> {
        self.registry.register(&self.model, definition, handler)?;
        Ok(self)
    }

    pub fn access(mut self, gate: AccessGate) -> Self {
        self.gate = gate;
        self
    }

    pub fn settings(mut self, settings: ServiceSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn store_capacity(mut self, capacity: usize) -> Self {
        self.store_capacity = capacity.max(1);
        self
    }

    pub fn observer(mut self, observer: Arc<dyn InvocationObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Registers a change interceptor for `set`; interceptors run in registration order.
    pub fn interceptor(mut self, set: &str, interceptor: Arc<dyn ChangeInterceptor>) -> Self {
        self.interceptors
            .entry(set.to_string())
            .or_default()
            .push(interceptor);
        self
    }

    /// Adds an entity inserted into `set` when the host starts.
    pub fn seed(mut self, set: &str, entity: Entity) -> Self {
        self.seed.push((set.to_string(), entity));
        self
    }

    /// Spawns one store actor per entity set, loads the seed data, and returns the
    /// running host.
    pub async fn start(mut self) -> Result<ServiceHost, HostError> {
        let mut clients = Vec::new();
        let mut handles = Vec::new();
        for set in self.model.sets() {
            let (actor, client) = StoreActor::<Entity>::with_label(self.store_capacity, &set.name);
            let interceptors = self.interceptors.remove(&set.name).unwrap_or_default();
            handles.push(tokio::spawn(actor.run(ChangeContext::new(&set.name, interceptors))));
            clients.push(SetClient::new(&set.name, client));
        }
        let data = DataSource::new(clients);

        for (set, entity) in self.seed {
            let key = entity.key();
            let seeded = match data.set(&set) {
                Ok(client) => client.create(key, entity).await,
                Err(e) => Err(e),
            };
            seeded.map_err(|source| HostError::Seed { set, source })?;
        }

        info!(
            sets = handles.len(),
            operations = self.registry.len(),
            "Service started"
        );
        let service = DataService::new(
            self.model,
            Arc::new(self.registry),
            self.gate,
            data,
            self.observer,
            self.settings,
        );
        Ok(ServiceHost { service, handles })
    }
}

/// A running data service and the tasks of its store actors.
pub struct ServiceHost {
    service: DataService,
    handles: Vec<JoinHandle<()>>,
}

impl ServiceHost {
    /// The request processor. Clones share the same stores.
    pub fn service(&self) -> &DataService {
        &self.service
    }

    pub async fn handle(&self, request: ODataRequest) -> ODataResponse {
        self.service.handle(request).await
    }

    /// Drops the store clients and waits for every store actor to finish.
    pub async fn shutdown(self) -> Result<(), HostError> {
        info!("Shutting down service...");
        drop(self.service);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!("Store task failed: {:?}", e);
                return Err(HostError::Task(e));
            }
        }

        info!("Service shutdown complete.");
        Ok(())
    }
}
