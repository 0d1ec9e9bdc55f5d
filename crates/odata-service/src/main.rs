//! # OData service host
//!
//! Serves the sample model over HTTP. Every request is handed to the
//! transport-neutral [`DataService`] through a single fallback route.
//!
//! ```text
//! odata-service --config odata.toml
//! RUST_LOG=debug odata-service --listen 0.0.0.0:9000
//! ```

use anyhow::{Context, Result};
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    response::{IntoResponse, Response},
    Router,
};
use clap::Parser;
use odata_service::config::ServiceConfig;
use odata_service::lifecycle::{setup_tracing, HostBuilder};
use odata_service::request::ODataRequest;
use odata_service::sample;
use odata_service::service::DataService;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing::{info, warn};

const MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Parser, Debug)]
#[command(author, version, about = "OData action and update service")]
struct Args {
    /// TOML configuration file; defaults apply when omitted
    #[arg(long)]
    config: Option<PathBuf>,
    /// Socket address to bind, overriding the configuration
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listen = listen;
    }

    info!(service_root = %config.service_root, "Starting OData service");
    let builder = HostBuilder::configured(sample::model()?, &config);
    let host = sample::register(builder)?.start().await?;

    let app = Router::new()
        .fallback(dispatch)
        .with_state(host.service().clone());
    let listener = TcpListener::bind(&config.listen)
        .await
        .with_context(|| format!("failed to bind {}", config.listen))?;
    info!("HTTP server listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    host.shutdown().await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
    }
    info!("Shutdown signal received");
}

async fn dispatch(State(service): State<DataService>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes.to_vec(),
        Err(e) => {
            warn!("Failed to read request body: {}", e);
            return (http::StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response();
        }
    };
    let uri = parts
        .uri
        .path_and_query()
        .map_or_else(|| parts.uri.path().to_string(), |pq| pq.as_str().to_string());

    let mut odata = ODataRequest::new(parts.method, uri).body(body);
    odata.headers = parts.headers;
    let answer = service.handle(odata).await;

    let mut response = Response::new(Body::from(answer.body));
    *response.status_mut() = answer.status;
    *response.headers_mut() = answer.headers;
    response
}
