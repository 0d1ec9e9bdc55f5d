//! # Data Service
//!
//! [`DataService`] turns one [`ODataRequest`] into one [`ODataResponse`]:
//!
//! 1. negotiate the protocol version from `OData-Version` / `OData-MaxVersion`
//! 2. parse the URI and resolve it against the model, registry, and access rules
//! 3. dispatch on the addressed resource and the method
//! 4. map any [`ServiceError`] to a status code and an error body
//!
//! Reads go straight to the store actors. Writes and action invocations take the
//! service write gate so that a `$batch` changeset can snapshot, run, and roll back
//! without another writer interleaving.

mod operation;
mod query;
mod read;
mod write;

use crate::access::AccessGate;
use crate::codec::content_type::{header_value, negotiate};
use crate::codec::json_writer::{error_body, to_bytes};
use crate::codec::{Format, MetadataLevel, PayloadKind, WriteContext};
use crate::data::DataSource;
use crate::error::ServiceError;
use crate::invoke::{InvocationObserver, OperationRegistry};
use crate::model::ServiceModel;
use crate::request::{header_str, ODataRequest, ODataResponse, ODATA_MAX_VERSION, ODATA_VERSION};
use crate::uri::{parse_uri, ParsedUri, PathResolver, ResolvedPath, Target};
use http::header::ACCEPT;
use http::{HeaderMap, Method};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, instrument};

/// Runtime settings of a data service.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Absolute URI of the service root, without a trailing slash.
    pub service_root: String,
    /// Adds the root cause and error category to error bodies.
    pub verbose_errors: bool,
    pub max_batch_requests: usize,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            service_root: "http://host".to_string(),
            verbose_errors: false,
            max_batch_requests: 100,
        }
    }
}

/// Protocol version of a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ProtocolVersion {
    V4_0,
    V4_01,
}

impl ProtocolVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            ProtocolVersion::V4_0 => "4.0",
            ProtocolVersion::V4_01 => "4.01",
        }
    }
}

fn parse_version(text: &str) -> Option<(u32, u32)> {
    let text = text.split(';').next()?.trim();
    let (major, minor) = text.split_once('.').unwrap_or((text, "0"));
    Some((major.parse().ok()?, minor.parse().ok()?))
}

/// Checks the version headers of a request and picks the response version.
pub fn negotiate_version(headers: &HeaderMap) -> Result<ProtocolVersion, ServiceError> {
    if let Some(text) = header_str(headers, &ODATA_VERSION) {
        let version = parse_version(text).ok_or_else(|| {
            ServiceError::bad_request(format!(
                "The value '{text}' of the OData-Version header is not a valid version."
            ))
        })?;
        if version > (4, 1) {
            return Err(ServiceError::bad_request(format!(
                "The OData-Version '{text}' is not supported; the maximum version supported by the service is 4.01."
            )));
        }
        if version < (4, 0) {
            return Err(ServiceError::bad_request(format!(
                "The OData-Version '{text}' is not supported; the minimum version supported by the service is 4.0."
            )));
        }
    }
    let Some(text) = header_str(headers, &ODATA_MAX_VERSION) else {
        return Ok(ProtocolVersion::V4_0);
    };
    let max = parse_version(text).ok_or_else(|| {
        ServiceError::bad_request(format!(
            "The value '{text}' of the OData-MaxVersion header is not a valid version."
        ))
    })?;
    if max < (4, 0) {
        return Err(ServiceError::bad_request(format!(
            "The OData-MaxVersion '{text}' is lower than the minimum version 4.0 supported by the service."
        )));
    }
    Ok(if max >= (4, 1) {
        ProtocolVersion::V4_01
    } else {
        ProtocolVersion::V4_0
    })
}

/// How a request is being executed.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Dispatch {
    /// The caller already holds the write gate (a `$batch` changeset).
    pub in_changeset: bool,
}

/// The OData request processor. Cheap to clone; clones share every component.
#[derive(Clone)]
pub struct DataService {
    model: Arc<ServiceModel>,
    registry: Arc<OperationRegistry>,
    gate: Arc<AccessGate>,
    data: DataSource,
    observer: Arc<dyn InvocationObserver>,
    settings: Arc<ServiceSettings>,
    write_gate: Arc<Mutex<()>>,
}

impl DataService {
    pub fn new(
        model: Arc<ServiceModel>,
        registry: Arc<OperationRegistry>,
        gate: AccessGate,
        data: DataSource,
        observer: Arc<dyn InvocationObserver>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            model,
            registry,
            gate: Arc::new(gate),
            data,
            observer,
            settings: Arc::new(settings),
            write_gate: Arc::new(Mutex::new(())),
        }
    }

    pub fn model(&self) -> &ServiceModel {
        &self.model
    }

    pub fn data(&self) -> &DataSource {
        &self.data
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    /// Processes one request. Every failure becomes an error response.
    #[instrument(skip_all, fields(method = %request.method, uri = %request.uri))]
    pub async fn handle(&self, request: ODataRequest) -> ODataResponse {
        let version = match negotiate_version(&request.headers) {
            Ok(version) => version,
            Err(e) => return self.finish(Err(e), ProtocolVersion::V4_0),
        };
        let result = match self.prepare(&request) {
            Ok((_, path)) if *path.target() == Target::Batch => {
                self.execute_batch(&request).await
            }
            Ok((parsed, path)) => {
                self.execute(&request, &parsed, &path, Dispatch { in_changeset: false })
                    .await
            }
            Err(e) => Err(e),
        };
        self.finish(result, version)
    }

    pub(crate) fn finish(
        &self,
        result: Result<ODataResponse, ServiceError>,
        version: ProtocolVersion,
    ) -> ODataResponse {
        let mut response = match result {
            Ok(response) => response,
            Err(e) => self.error_response(&e),
        };
        response.set_header(ODATA_VERSION, version.as_str());
        info!(status = response.status.as_u16(), "Request completed");
        response
    }

    pub(crate) fn prepare(&self, request: &ODataRequest) -> Result<(ParsedUri, ResolvedPath), ServiceError> {
        let parsed = parse_uri(&request.uri, &self.settings.service_root)?;
        let path = PathResolver::new(&self.model, &self.registry, &self.gate).resolve(&parsed.segments)?;
        Ok((parsed, path))
    }

    fn error_response(&self, error: &ServiceError) -> ODataResponse {
        let status = error.status();
        if status.is_server_error() {
            error!(%status, error = %error, cause = %error.root_message(), "Request failed");
        } else {
            debug!(%status, error = %error, "Request rejected");
        }
        let body = error_body(error, self.settings.verbose_errors);
        ODataResponse::new(status).with_body(
            &header_value(Format::Json(MetadataLevel::Minimal), false),
            to_bytes(&body),
        )
    }

    pub(crate) fn write_context(&self) -> WriteContext<'_> {
        WriteContext {
            model: &self.model,
            registry: &self.registry,
            gate: &self.gate,
            service_root: &self.settings.service_root,
        }
    }

    pub(crate) fn negotiate(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
        kind: PayloadKind,
    ) -> Result<Format, ServiceError> {
        negotiate(request.header_str(&ACCEPT), parsed.query_option("$format"), kind)
    }

    /// Takes the write gate unless the caller already holds it.
    pub(crate) async fn lock_writes(&self, dispatch: Dispatch) -> Option<MutexGuard<'_, ()>> {
        if dispatch.in_changeset {
            None
        } else {
            Some(self.write_gate.lock().await)
        }
    }

    pub(crate) async fn lock_changeset(&self) -> MutexGuard<'_, ()> {
        self.write_gate.lock().await
    }

    /// Dispatches a resolved request on its target and method.
    pub(crate) async fn execute(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
        path: &ResolvedPath,
        dispatch: Dispatch,
    ) -> Result<ODataResponse, ServiceError> {
        query::check_known_options(parsed)?;
        let method = request.method.as_str();
        if !matches!(method, "GET" | "POST" | "PUT" | "PATCH" | "MERGE" | "DELETE") {
            return Err(ServiceError::method_not_allowed(format!(
                "The method '{method}' is not supported by this service."
            )));
        }
        if let Some(operation) = path.invoked_operation() {
            return self
                .invoke_operation(request, parsed, path, operation, dispatch)
                .await;
        }

        match path.target() {
            Target::ServiceDocument => {
                require_get(&request.method, "the service root")?;
                self.service_document(request, parsed)
            }
            Target::Metadata => {
                require_get(&request.method, "the $metadata resource")?;
                self.metadata(request, parsed)
            }
            Target::Batch => Err(ServiceError::bad_request(
                "A $batch request cannot be nested inside another $batch request.",
            )),
            Target::Entities { .. } => match method {
                "GET" => self.read(request, parsed, path).await,
                "POST" => self.create(request, parsed, path, dispatch).await,
                _ => Err(ServiceError::method_not_allowed(format!(
                    "The method '{method}' cannot be applied to a collection of entities."
                ))),
            },
            Target::Entity { .. } => match method {
                "GET" => self.read(request, parsed, path).await,
                "POST" => Err(ServiceError::method_not_allowed(
                    "The method 'POST' cannot be applied to a single entity.",
                )),
                _ => self.modify(request, parsed, path, dispatch).await,
            },
            Target::Value(_) | Target::Count | Target::RawValue => match method {
                "GET" => self.read(request, parsed, path).await,
                "POST" => Err(ServiceError::method_not_allowed(
                    "The method 'POST' cannot be applied to a property.",
                )),
                _ => Err(ServiceError::not_implemented(
                    "Updating individual properties is not supported by this service.",
                )),
            },
            Target::Void => Err(ServiceError::internal(
                "A void target was reached without an operation segment.",
            )),
        }
    }
}

fn require_get(method: &Method, resource: &str) -> Result<(), ServiceError> {
    if *method == Method::GET {
        Ok(())
    } else {
        Err(ServiceError::method_not_allowed(format!(
            "The method '{method}' is not allowed on {resource}."
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderValue, StatusCode};

    fn headers(version: Option<&'static str>, max: Option<&'static str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Some(v) = version {
            headers.insert(ODATA_VERSION, HeaderValue::from_static(v));
        }
        if let Some(v) = max {
            headers.insert(ODATA_MAX_VERSION, HeaderValue::from_static(v));
        }
        headers
    }

    #[test]
    fn test_version_negotiation() {
        assert_eq!(negotiate_version(&headers(None, None)).unwrap(), ProtocolVersion::V4_0);
        assert_eq!(
            negotiate_version(&headers(Some("4.0"), Some("4.01"))).unwrap(),
            ProtocolVersion::V4_01
        );
        assert_eq!(
            negotiate_version(&headers(None, Some("4.0"))).unwrap(),
            ProtocolVersion::V4_0
        );

        let err = negotiate_version(&headers(Some("5.0"), None)).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        let err = negotiate_version(&headers(None, Some("3.0"))).unwrap_err();
        assert!(err.to_string().contains("lower than the minimum version 4.0"));
        assert!(negotiate_version(&headers(Some("four"), None)).is_err());
    }
}
