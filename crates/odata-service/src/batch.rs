//! JSON `$batch` requests.
//!
//! A batch body lists requests that run in order. Consecutive requests sharing an
//! `atomicityGroup` form a changeset: the changeset holds the service write gate,
//! and the first failure restores every entity set to the state before the group
//! started. The failing request reports its own error and every other request of
//! the group reports 424 Failed Dependency. When the rollback itself fails, every
//! request of the group reports 500.

use crate::codec::content_type::{check_request_body, JSON};
use crate::error::ServiceError;
use crate::request::{ODataRequest, ODataResponse};
use crate::service::{negotiate_version, DataService, Dispatch, ProtocolVersion};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::{HeaderMap, Method, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashSet};
use tracing::{error, info, instrument, warn};

#[derive(Debug, Deserialize)]
struct BatchEnvelope {
    requests: Vec<BatchPart>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BatchPart {
    id: String,
    method: String,
    url: String,
    #[serde(default)]
    headers: BTreeMap<String, String>,
    #[serde(default)]
    body: Option<Json>,
    #[serde(default)]
    atomicity_group: Option<String>,
}

#[derive(Debug, Serialize)]
struct PartResponse {
    id: String,
    status: u16,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<Json>,
}

/// A request ready to run, with the id it answers to.
struct Prepared {
    id: String,
    request: ODataRequest,
}

enum Unit {
    Single(Prepared),
    Changeset(String, Vec<Prepared>),
}

impl DataService {
    #[instrument(skip_all)]
    pub(crate) async fn execute_batch(&self, request: &ODataRequest) -> Result<ODataResponse, ServiceError> {
        if request.method != Method::POST {
            return Err(ServiceError::method_not_allowed(format!(
                "The method '{}' is not allowed on the $batch resource.",
                request.method
            )));
        }
        check_request_body(request.header_str(&CONTENT_TYPE), &request.body)?;
        let envelope: BatchEnvelope = serde_json::from_slice(&request.body)
            .map_err(|e| ServiceError::bad_request(format!("The batch request body is not valid: {e}.")))?;

        let max = self.settings().max_batch_requests;
        if envelope.requests.len() > max {
            return Err(ServiceError::bad_request(format!(
                "The batch contains {} requests, which exceeds the maximum of {max}.",
                envelope.requests.len()
            )));
        }
        let units = group_parts(envelope.requests)?;
        info!(units = units.len(), "Executing batch");

        let mut responses = Vec::new();
        for unit in units {
            match unit {
                Unit::Single(part) => {
                    let response = self.execute_part(&part.request, Dispatch { in_changeset: false }).await;
                    responses.push(part_response(part.id, response));
                }
                Unit::Changeset(group, parts) => {
                    let results = self.execute_changeset(&group, &parts).await;
                    responses.extend(
                        parts
                            .into_iter()
                            .zip(results)
                            .map(|(part, response)| part_response(part.id, response)),
                    );
                }
            }
        }

        let body = serde_json::to_vec(&serde_json::json!({ "responses": responses }))
            .map_err(|e| ServiceError::internal(format!("The batch response could not be written: {e}.")))?;
        Ok(ODataResponse::new(StatusCode::OK).with_body(JSON, body))
    }

    async fn execute_changeset(&self, group: &str, parts: &[Prepared]) -> Vec<ODataResponse> {
        let _guard = self.lock_changeset().await;
        let snapshot = match self.data().snapshot_all().await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                error!(group, error = %e, "Changeset snapshot failed");
                return parts
                    .iter()
                    .map(|_| self.finish(Err(ServiceError::internal(e.to_string())), ProtocolVersion::V4_0))
                    .collect();
            }
        };

        let mut responses = Vec::with_capacity(parts.len());
        for part in parts {
            let response = self.execute_part(&part.request, Dispatch { in_changeset: true }).await;
            let failed = is_failure(&response);
            responses.push(response);
            if failed {
                break;
            }
        }
        let Some(failed) = responses.iter().position(is_failure) else {
            return responses;
        };
        let failure = responses.swap_remove(failed);

        warn!(group, failed = %parts[failed].id, "Changeset failed, rolling back");
        if let Err(e) = self.data().restore_all(snapshot).await {
            error!(group, error = %e, cause = %e.root_message(), "Changeset rollback failed");
            return parts
                .iter()
                .map(|_| self.finish(Err(ServiceError::rollback_failed(group, &e)), ProtocolVersion::V4_0))
                .collect();
        }
        let mut results: Vec<ODataResponse> = parts
            .iter()
            .map(|_| self.finish(Err(ServiceError::failed_dependency()), ProtocolVersion::V4_0))
            .collect();
        results[failed] = failure;
        results
    }

    async fn execute_part(&self, request: &ODataRequest, dispatch: Dispatch) -> ODataResponse {
        let version = match negotiate_version(&request.headers) {
            Ok(version) => version,
            Err(e) => return self.finish(Err(e), ProtocolVersion::V4_0),
        };
        let result = match self.prepare(request) {
            Ok((parsed, path)) => self.execute(request, &parsed, &path, dispatch).await,
            Err(e) => Err(e),
        };
        self.finish(result, version)
    }
}

fn is_failure(response: &ODataResponse) -> bool {
    response.status.is_client_error() || response.status.is_server_error()
}

/// Orders parts into units. An atomicity group must be contiguous and ids unique.
fn group_parts(parts: Vec<BatchPart>) -> Result<Vec<Unit>, ServiceError> {
    let mut ids = HashSet::new();
    let mut closed: HashSet<String> = HashSet::new();
    let mut units: Vec<Unit> = Vec::new();
    for part in parts {
        if !ids.insert(part.id.clone()) {
            return Err(ServiceError::bad_request(format!(
                "The request id '{}' appears more than once in the batch.",
                part.id
            )));
        }
        let group = part.atomicity_group.clone();
        let prepared = prepare_part(part)?;
        match (group, units.last_mut()) {
            (Some(group), Some(Unit::Changeset(current, members))) if *current == group => {
                members.push(prepared);
            }
            (Some(group), last) => {
                if let Some(Unit::Changeset(previous, _)) = last {
                    closed.insert(previous.clone());
                }
                if closed.contains(&group) {
                    return Err(ServiceError::bad_request(format!(
                        "The requests of the atomicity group '{group}' must be adjacent in the batch."
                    )));
                }
                units.push(Unit::Changeset(group, vec![prepared]));
            }
            (None, last) => {
                if let Some(Unit::Changeset(previous, _)) = last {
                    closed.insert(previous.clone());
                }
                units.push(Unit::Single(prepared));
            }
        }
    }
    Ok(units)
}

fn prepare_part(part: BatchPart) -> Result<Prepared, ServiceError> {
    let method = Method::from_bytes(part.method.to_ascii_uppercase().as_bytes()).map_err(|_| {
        ServiceError::bad_request(format!(
            "The method '{}' of the batch request '{}' is not valid.",
            part.method, part.id
        ))
    })?;
    let mut headers = HeaderMap::new();
    for (name, value) in &part.headers {
        let (Ok(name), Ok(value)) = (HeaderName::try_from(name.as_str()), HeaderValue::try_from(value.as_str())) else {
            return Err(ServiceError::bad_request(format!(
                "The header '{name}' of the batch request '{}' is not valid.",
                part.id
            )));
        };
        headers.append(name, value);
    }
    let body = match part.body {
        None => Vec::new(),
        Some(json) => {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(JSON));
            }
            json.to_string().into_bytes()
        }
    };
    Ok(Prepared {
        id: part.id,
        request: ODataRequest {
            method,
            uri: part.url,
            headers,
            body,
        },
    })
}

fn part_response(id: String, response: ODataResponse) -> PartResponse {
    let headers = response
        .headers
        .iter()
        .filter_map(|(name, value)| Some((name.to_string(), value.to_str().ok()?.to_string())))
        .collect();
    let is_json = response
        .header(&CONTENT_TYPE)
        .is_some_and(|ct| ct.starts_with(JSON));
    let body = match (response.body.is_empty(), is_json) {
        (true, _) => None,
        (false, true) => Some(
            serde_json::from_slice(&response.body).unwrap_or_else(|_| Json::String(response.text())),
        ),
        (false, false) => Some(Json::String(response.text())),
    };
    PartResponse {
        id,
        status: response.status.as_u16(),
        headers,
        body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::AccessGate;
    use crate::data::{DataSource, SetClient};
    use crate::invoke::{NoopObserver, OperationRegistry};
    use crate::model::{Entity, ModelBuilder, PrimitiveKind, ResourceSet, ResourceType};
    use crate::service::ServiceSettings;
    use odata_store::mock::MockStore;
    use odata_store::{Snapshot, StoreError};
    use std::sync::Arc;

    fn part(id: &str, group: Option<&str>) -> BatchPart {
        BatchPart {
            id: id.to_string(),
            method: "get".to_string(),
            url: "Customers".to_string(),
            headers: BTreeMap::new(),
            body: None,
            atomicity_group: group.map(str::to_string),
        }
    }

    #[test]
    fn test_grouping() {
        let units = group_parts(vec![
            part("1", None),
            part("2", Some("g")),
            part("3", Some("g")),
            part("4", None),
        ])
        .unwrap();
        assert_eq!(units.len(), 3);
        assert!(matches!(&units[1], Unit::Changeset(g, members) if g == "g" && members.len() == 2));
        let Unit::Single(first) = &units[0] else {
            panic!("expected a single request");
        };
        assert_eq!(first.request.method, Method::GET);
    }

    #[test]
    fn test_invalid_groups() {
        let err = group_parts(vec![part("1", Some("g")), part("2", None), part("3", Some("g"))])
            .err()
            .unwrap();
        assert!(err.to_string().contains("must be adjacent"));
        let err = group_parts(vec![part("1", None), part("1", None)]).err().unwrap();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_json_body_gets_content_type() {
        let mut with_body = part("1", None);
        with_body.method = "POST".into();
        with_body.body = Some(serde_json::json!({"Name": "a"}));
        let prepared = prepare_part(with_body).unwrap();
        assert_eq!(prepared.request.header_str(&CONTENT_TYPE), Some(JSON));
        assert_eq!(prepared.request.body, br#"{"Name":"a"}"#.to_vec());
    }

    #[tokio::test]
    async fn test_failed_rollback_fails_the_whole_group() {
        let model = ModelBuilder::new("Demo")
            .add_type(
                ResourceType::entity("Demo", "Item")
                    .key("ID", PrimitiveKind::Int32)
                    .property("Name", PrimitiveKind::String),
            )
            .add_set(ResourceSet::new("Items", "Demo.Item"))
            .build()
            .unwrap();

        let mut mock = MockStore::<Entity>::new();
        mock.expect_snapshot().return_ok(Snapshot {
            records: BTreeMap::new(),
            next_key: 1,
        });
        mock.expect_create().return_err(StoreError::Conflict("1".into()));
        mock.expect_restore().return_err(StoreError::ActorClosed);

        let service = DataService::new(
            Arc::new(model),
            Arc::new(OperationRegistry::new()),
            AccessGate::allow_all(),
            DataSource::new([SetClient::new("Items", mock.client())]),
            Arc::new(NoopObserver),
            ServiceSettings::default(),
        );
        let body = serde_json::json!({"requests": [
            {"id": "1", "method": "POST", "url": "Items", "atomicityGroup": "g",
             "body": {"ID": 1, "Name": "a"}},
            {"id": "2", "method": "POST", "url": "Items", "atomicityGroup": "g",
             "body": {"ID": 2, "Name": "b"}}
        ]});
        let response = service.handle(ODataRequest::post("$batch").json(&body)).await;
        assert_eq!(response.status, StatusCode::OK);

        let body = response.json().unwrap();
        let parts = body["responses"].as_array().unwrap();
        assert_eq!(parts.len(), 2);
        for part in parts {
            assert_eq!(part["status"], 500);
            assert_eq!(
                part["body"]["error"]["message"],
                "The atomicity group 'g' failed and could not be rolled back: The entity store is unavailable."
            );
        }
        mock.verify();
    }
}
