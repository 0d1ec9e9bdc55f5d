//! # OData Service
//!
//! An OData data service engine focused on service actions and entity updates.
//!
//! ## Components
//!
//! - **[model]**: the metadata model (types, sets, operations, rights) and the
//!   [`Entity`](model::Entity) record kept for each resource.
//! - **[uri]**: request URI parsing and resolution into typed segments.
//! - **[invoke]**: the operation registry, handler trait, and invocation engine.
//! - **[service]**: [`DataService`](service::DataService), which turns one request into one response.
//! - **[codec]**: JSON, Atom, and CSDL payloads plus content negotiation.
//! - **[data]**: typed clients for the per-set [`odata_store`] actors.
//! - **[lifecycle]**: starting, seeding, and shutting down a hosted service.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! let host = sample::register(HostBuilder::new(sample::model()?))?.start().await?;
//! let response = host
//!     .handle(ODataRequest::post("TopLevelAction_Primitive"))
//!     .await;
//! assert_eq!(response.status, StatusCode::OK);
//! host.shutdown().await?;
//! ```
//!
//! ## Testing
//!
//! [`sample`] provides a model with seed data and one operation for every result
//! shape; the integration tests under `tests/` drive it through [`lifecycle::ServiceHost`].

pub mod access;
mod batch;
pub mod binding;
pub mod codec;
pub mod config;
pub mod data;
pub mod error;
pub mod interceptor;
pub mod invoke;
pub mod lifecycle;
pub mod model;
pub mod request;
pub mod sample;
pub mod service;
pub mod update;
pub mod uri;
