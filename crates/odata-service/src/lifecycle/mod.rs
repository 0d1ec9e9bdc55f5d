//! # Service Lifecycle
//!
//! Starting and stopping a hosted data service.
//!
//! Every entity set of the model gets its own store actor. [`HostBuilder::start`]
//! creates the actors, hands each one its change interceptors as its run context,
//! spawns it on the runtime, and wires the resulting clients into a
//! [`DataSource`](crate::data::DataSource):
//!
//! ```rust,ignore
//! let host = HostBuilder::new(model)
//!     .operation(definition, handler)?
//!     .interceptor("Orders", Arc::new(AuditTrail))
//!     .seed("Customers", customer)
//!     .start()
//!     .await?;
//!
//! let response = host.service().handle(ODataRequest::get("Customers")).await;
//! host.shutdown().await?;
//! ```
//!
//! ## Shutdown
//!
//! Store actors exit when the last client of their channel is dropped. Shutdown drops
//! the host's service (and with it the clients), then awaits every actor task. Any
//! [`DataService`](crate::service::DataService) clone still alive elsewhere keeps its
//! actors running, so callers drop their clones first.
//!
//! ## Tracing
//!
//! [`setup_tracing`] installs a `tracing-subscriber` formatter filtered by `RUST_LOG`:
//!
//! ```bash
//! RUST_LOG=info odata-service      # request and store lifecycle
//! RUST_LOG=debug odata-service     # payloads, bindings, and store messages
//! ```

pub mod host;
pub mod tracing;

pub use host::*;
pub use tracing::*;
