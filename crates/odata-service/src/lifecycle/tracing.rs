use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset: request outcomes, without per-message store noise.
const DEFAULT_FILTER: &str = "info,odata_store=warn";

/// Installs the global subscriber. Call once, at the start of `main`.
pub fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false) // entity_set and operation fields identify the source
        .compact()
        .init();
}
