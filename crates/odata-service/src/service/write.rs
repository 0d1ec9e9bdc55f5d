//! POST, PUT, PATCH, MERGE, and DELETE on entities.

use super::query::reject_options;
use super::read::Evaluated;
use super::{DataService, Dispatch};
use crate::access::right_for;
use crate::codec::content_type::check_request_body;
use crate::codec::json_reader::{read_entity, EntityPayload};
use crate::error::ServiceError;
use crate::model::{Entity, EntityKey, EntitySetRights, EntityUpdate, PrimitiveKind};
use crate::request::{ODataRequest, ODataResponse, ODATA_ENTITY_ID, PREFERENCE_APPLIED};
use crate::update::{return_preference, write_outcome, Conditions};
use crate::uri::{ParsedUri, ResolvedPath, SegmentKind, Target};
use http::header::{CONTENT_TYPE, ETAG, LOCATION};
use http::{Method, StatusCode};
use tracing::{debug, info};

impl DataService {
    /// Inserts an entity into the set addressed by `path`.
    pub(super) async fn create(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
        path: &ResolvedPath,
        dispatch: Dispatch,
    ) -> Result<ODataResponse, ServiceError> {
        if !path
            .segments
            .iter()
            .all(|s| matches!(s.kind, SegmentKind::EntitySet(_) | SegmentKind::TypeCast(_)))
        {
            return Err(ServiceError::not_implemented(
                "Inserting entities through a navigation property is not supported by this service.",
            ));
        }
        let Target::Entities { set, type_name, .. } = path.target() else {
            return Err(ServiceError::internal("An insert must address an entity set."));
        };

        reject_options(parsed)?;
        self.gate.require(set, EntitySetRights::WRITE_APPEND)?;
        Conditions::from_headers(&request.headers).check_insert()?;
        check_request_body(request.header_str(&CONTENT_TYPE), &request.body)?;
        let payload = read_entity(
            &request.body,
            &self.model,
            set,
            type_name,
            &self.settings.service_root,
        )?;
        let (entity, key) = self.new_entity(payload)?;

        let created = {
            let _guard = self.lock_writes(dispatch).await;
            self.data.set(set)?.create(key, entity).await?
        };
        info!(entity_set = %set, key = ?created.key(), "Entity created");
        self.write_response(request, parsed, set, type_name, &created)
    }

    fn new_entity(&self, payload: EntityPayload) -> Result<(Entity, Option<EntityKey>), ServiceError> {
        let EntityPayload { type_name, changes } = payload;
        if self
            .model
            .resource_type(&type_name)
            .is_some_and(|t| t.is_abstract)
        {
            return Err(ServiceError::payload(format!(
                "The type '{type_name}' is abstract and cannot be instantiated. Specify a derived type with '@odata.type'."
            )));
        }
        let shape = self.model.shape(&type_name).ok_or_else(|| {
            ServiceError::payload(format!("The type '{type_name}' is not an entity type."))
        })?;

        let mut entity = Entity::new(shape.clone());
        for (name, value) in changes.values {
            entity.set(&name, value);
        }
        for (navigation, keys) in changes.links {
            entity = entity.linked(&navigation, keys);
        }
        if let Some(key) = entity.key() {
            return Ok((entity, Some(key)));
        }
        // Only a single integer key can be generated by the store.
        match shape.key.as_slice() {
            [(_, PrimitiveKind::Int32 | PrimitiveKind::Int64)] => Ok((entity, None)),
            keys => {
                let missing = keys
                    .iter()
                    .find(|(name, _)| entity.get(name).map_or(true, |v| v.is_null()))
                    .map_or("", |(name, _)| name.as_str());
                Err(ServiceError::payload(format!(
                    "The key property '{missing}' must be specified."
                )))
            }
        }
    }

    /// Replaces, merges, or deletes the entity addressed by `path`.
    pub(super) async fn modify(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
        path: &ResolvedPath,
        dispatch: Dispatch,
    ) -> Result<ODataResponse, ServiceError> {
        let Target::Entity { set, type_name } = path.target() else {
            return Err(ServiceError::internal("An update must address a single entity."));
        };
        reject_options(parsed)?;
        let right = right_for(&request.method, true).ok_or_else(|| {
            ServiceError::method_not_allowed(format!(
                "The method '{}' cannot be applied to a single entity.",
                request.method
            ))
        })?;
        self.gate.require(set, right)?;

        let identifier = path.segments.last().map_or("", |s| s.identifier.as_str());
        let current = match self.evaluate(&path.segments, parsed, false).await? {
            Evaluated::Entity(entity) => entity,
            _ => return Err(ServiceError::resource_not_found(identifier)),
        };
        let key = current
            .key()
            .ok_or_else(|| ServiceError::internal("A stored entity has no key."))?;
        let precondition = Conditions::from_headers(&request.headers)
            .write_precondition(current.type_name(), !current.shape().etag.is_empty())?;

        if request.method == Method::DELETE {
            {
                let _guard = self.lock_writes(dispatch).await;
                self.data.set(set)?.delete(key.clone(), precondition).await?;
            }
            info!(entity_set = %set, %key, "Entity deleted");
            return Ok(ODataResponse::new(StatusCode::NO_CONTENT));
        }

        check_request_body(request.header_str(&CONTENT_TYPE), &request.body)?;
        let payload = read_entity(
            &request.body,
            &self.model,
            set,
            current.type_name(),
            &self.settings.service_root,
        )?;
        if payload.type_name != current.type_name() {
            return Err(ServiceError::payload(format!(
                "The type '{}' does not match the type '{}' of the entity being updated.",
                payload.type_name,
                current.type_name()
            )));
        }
        let mut changes = payload.changes;
        for (name, _) in &current.shape().key {
            if let Some(value) = changes.values.remove(name) {
                if current.get(name) != Some(&value) {
                    return Err(ServiceError::payload(format!(
                        "The key property '{name}' cannot be changed."
                    )));
                }
            }
        }
        let update = if request.method == Method::PUT {
            EntityUpdate::Replace(changes)
        } else {
            EntityUpdate::Merge(changes)
        };
        debug!(entity_set = %set, %key, ?update, "Updating entity");

        let updated = {
            let _guard = self.lock_writes(dispatch).await;
            self.data.set(set)?.update(key.clone(), precondition, update).await?
        };
        info!(entity_set = %set, %key, "Entity updated");
        self.write_response(request, parsed, set, type_name, &updated)
    }

    /// Status, body, and headers after a successful insert or update.
    fn write_response(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
        set: &str,
        static_type: &str,
        entity: &Entity,
    ) -> Result<ODataResponse, ServiceError> {
        let preference = return_preference(&request.headers);
        let (status, with_body) = write_outcome(&request.method, preference);
        let mut response = if with_body {
            self.entity_response(request, parsed, status, set, static_type, entity, None)?
        } else {
            let mut response = ODataResponse::new(status);
            if let Some(etag) = entity.compute_etag() {
                response.set_header(ETAG, &etag);
            }
            response
        };
        if request.method == Method::POST {
            if let Some(id) = self.write_context().entity_id(set, entity) {
                response.set_header(LOCATION, &id);
                if !with_body {
                    response.set_header(ODATA_ENTITY_ID, &id);
                }
            }
        }
        if let Some(preference) = preference {
            response.set_header(PREFERENCE_APPLIED, preference.as_header());
        }
        Ok(response)
    }
}
