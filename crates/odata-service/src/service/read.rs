//! Path evaluation and GET responses.

use super::query::{reject_options, QueryOptions};
use super::DataService;
use crate::codec::atom::AtomWriter;
use crate::codec::content_type::header_value;
use crate::codec::csdl::write_metadata;
use crate::codec::json_writer::{to_bytes, JsonWriter};
use crate::codec::{Format, PayloadKind};
use crate::error::ServiceError;
use crate::model::{Entity, EntitySetRights, TypeRef, Value};
use crate::request::{ODataRequest, ODataResponse};
use crate::update::{Conditions, ReadCondition};
use crate::uri::{ParsedUri, ResolvedPath, Segment, SegmentKind, Target};
use http::header::ETAG;
use http::StatusCode;
use tracing::debug;

/// What a path prefix evaluates to against the stores.
#[derive(Debug, Clone)]
pub(super) enum Evaluated {
    Entities(Vec<Entity>),
    Entity(Entity),
    Value(Value),
    /// An unset single-valued navigation property.
    Null,
}

impl DataService {
    /// Evaluates `segments` from the first one. Read rights are checked on every
    /// entity-addressing segment, and on the last one only when `read_last` is set.
    pub(super) async fn evaluate(
        &self,
        segments: &[Segment],
        parsed: &ParsedUri,
        read_last: bool,
    ) -> Result<Evaluated, ServiceError> {
        let mut current = Evaluated::Null;
        let mut source_set: Option<&str> = None;
        for (index, segment) in segments.iter().enumerate() {
            let is_last = index + 1 == segments.len();
            if !matches!(segment.kind, SegmentKind::Operation(_)) && (read_last || !is_last) {
                self.require_read(&segment.target)?;
            }
            current = self.apply_segment(segment, current, source_set, parsed).await?;
            if let Some(set) = segment.target.set() {
                source_set = Some(set);
            }
        }
        Ok(current)
    }

    fn require_read(&self, target: &Target) -> Result<(), ServiceError> {
        match target {
            Target::Entities { set, .. } => self.gate.require(set, EntitySetRights::READ_MULTIPLE),
            Target::Entity { set, .. } => self.gate.require(set, EntitySetRights::READ_SINGLE),
            _ => Ok(()),
        }
    }

    async fn apply_segment(
        &self,
        segment: &Segment,
        current: Evaluated,
        source_set: Option<&str>,
        parsed: &ParsedUri,
    ) -> Result<Evaluated, ServiceError> {
        let not_found = || ServiceError::resource_not_found(&segment.identifier);
        let evaluated = match (&segment.kind, current) {
            (SegmentKind::EntitySet(set), _) => match &segment.key {
                Some(key) => self
                    .data
                    .get(set, key.clone())
                    .await?
                    .map(Evaluated::Entity)
                    .ok_or_else(not_found)?,
                None => Evaluated::Entities(self.data.list(set).await?),
            },
            (SegmentKind::Navigation(name), Evaluated::Entity(entity)) => {
                let source = source_set.ok_or_else(not_found)?;
                let linked = self.data.navigate(&self.model, source, &entity, name).await?;
                match (&segment.target, &segment.key) {
                    (_, Some(key)) => select_key(linked, key).ok_or_else(not_found)?,
                    (Target::Entities { .. }, None) => Evaluated::Entities(linked),
                    (_, None) => linked.into_iter().next().map_or(Evaluated::Null, Evaluated::Entity),
                }
            }
            (SegmentKind::Property(name), Evaluated::Entity(entity)) => {
                Evaluated::Value(entity.get(name).cloned().unwrap_or(Value::Null))
            }
            (SegmentKind::Property(name), Evaluated::Value(Value::Complex(complex))) => {
                Evaluated::Value(complex.properties.get(name).cloned().unwrap_or(Value::Null))
            }
            (SegmentKind::Property(_), Evaluated::Value(Value::Null)) => Evaluated::Value(Value::Null),
            (SegmentKind::TypeCast(type_name), Evaluated::Entities(entities)) => {
                let cast: Vec<Entity> = entities
                    .into_iter()
                    .filter(|e| self.model.is_assignable(e.type_name(), type_name))
                    .collect();
                match &segment.key {
                    Some(key) => select_key(cast, key).ok_or_else(not_found)?,
                    None => Evaluated::Entities(cast),
                }
            }
            (SegmentKind::TypeCast(type_name), Evaluated::Entity(entity)) => {
                if !self.model.is_assignable(entity.type_name(), type_name) {
                    return Err(not_found());
                }
                Evaluated::Entity(entity)
            }
            (SegmentKind::Count, Evaluated::Entities(entities)) => {
                Evaluated::Value(Value::Int64(entities.len() as i64))
            }
            (SegmentKind::Count, Evaluated::Value(Value::Collection(items))) => {
                Evaluated::Value(Value::Int64(items.len() as i64))
            }
            (SegmentKind::Value, value @ Evaluated::Value(_)) => value,
            (SegmentKind::Operation(operation), _) => {
                // Only composable service operations are evaluated mid-path.
                let entities = self.call_composable(operation, parsed).await?;
                match &segment.key {
                    Some(key) => select_key(entities, key).ok_or_else(not_found)?,
                    None => Evaluated::Entities(entities),
                }
            }
            (_, Evaluated::Null) => return Err(not_found()),
            (kind, _) => {
                return Err(ServiceError::internal(format!(
                    "The segment '{}' ({kind:?}) cannot be evaluated here.",
                    segment.identifier
                )))
            }
        };
        Ok(evaluated)
    }

    /// GET on an entity, a feed, a property, `$count`, or `$value`.
    pub(super) async fn read(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
        path: &ResolvedPath,
    ) -> Result<ODataResponse, ServiceError> {
        let target = path.target();
        let options = QueryOptions::parse(parsed, target, &self.model)?;
        let conditions = Conditions::from_headers(&request.headers);
        if !conditions.is_empty() && !matches!(target, Target::Entity { .. }) {
            return Err(ServiceError::bad_request(
                "If-Match or If-None-Match HTTP headers cannot be specified since the URI does not refer to a single entity.",
            ));
        }
        let evaluated = self.evaluate(&path.segments, parsed, true).await?;
        debug!(?target, "Evaluated path");

        match (target, evaluated) {
            (Target::Entities { set, type_name, .. }, Evaluated::Entities(entities)) => {
                self.feed_response(request, parsed, set, type_name, entities, &options)
            }
            (Target::Entity { set, type_name }, Evaluated::Entity(entity)) => {
                let etag = entity.compute_etag();
                if conditions.check_read(entity.type_name(), etag.as_deref())? == ReadCondition::NotModified {
                    let mut response = ODataResponse::new(StatusCode::NOT_MODIFIED);
                    if let Some(etag) = &etag {
                        response.set_header(ETAG, etag);
                    }
                    return Ok(response);
                }
                self.entity_response(
                    request,
                    parsed,
                    StatusCode::OK,
                    set,
                    type_name,
                    &entity,
                    options.select.as_deref(),
                )
            }
            (Target::Entity { .. }, Evaluated::Null) => Ok(ODataResponse::new(StatusCode::NO_CONTENT)),
            (Target::Value(type_ref), Evaluated::Value(value)) => {
                self.value_response(request, parsed, type_ref, &value)
            }
            (Target::Count | Target::RawValue, Evaluated::Value(value)) => {
                self.raw_response(request, parsed, &value)
            }
            (target, _) => Err(ServiceError::internal(format!(
                "The path evaluated to a result that does not match its target {target:?}."
            ))),
        }
    }

    pub(super) fn service_document(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
    ) -> Result<ODataResponse, ServiceError> {
        reject_options(parsed)?;
        let format = self.negotiate(request, parsed, PayloadKind::Value)?;
        let Format::Json(level) = format else {
            return Err(ServiceError::internal("The service document is only written as JSON."));
        };
        let body = JsonWriter::new(self.write_context(), level).service_document();
        Ok(ODataResponse::new(StatusCode::OK).with_body(&header_value(format, false), to_bytes(&body)))
    }

    pub(super) fn metadata(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
    ) -> Result<ODataResponse, ServiceError> {
        reject_options(parsed)?;
        let format = self.negotiate(request, parsed, PayloadKind::Metadata)?;
        let document = write_metadata(&self.write_context());
        Ok(ODataResponse::new(StatusCode::OK).with_body(&header_value(format, false), document.into_bytes()))
    }

    pub(super) fn feed_response(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
        set: &str,
        static_type: &str,
        entities: Vec<Entity>,
        options: &QueryOptions,
    ) -> Result<ODataResponse, ServiceError> {
        let format = self.negotiate(request, parsed, PayloadKind::Entities)?;
        let (page, count) = options.apply(entities);
        let body = match format {
            Format::Json(level) => to_bytes(&JsonWriter::new(self.write_context(), level).feed(
                set,
                static_type,
                &page,
                count,
                options.select.as_deref(),
            )),
            Format::Atom => AtomWriter::new(self.write_context())
                .feed(set, &page, count)
                .into_bytes(),
            other => return Err(unwritable(other)),
        };
        Ok(ODataResponse::new(StatusCode::OK).with_body(&header_value(format, true), body))
    }

    #[allow(clippy::too_many_arguments)]
    pub(super) fn entity_response(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
        status: StatusCode,
        set: &str,
        static_type: &str,
        entity: &Entity,
        select: Option<&[String]>,
    ) -> Result<ODataResponse, ServiceError> {
        let format = self.negotiate(request, parsed, PayloadKind::Entities)?;
        let body = match format {
            Format::Json(level) => to_bytes(
                &JsonWriter::new(self.write_context(), level).entity(set, static_type, entity, select),
            ),
            Format::Atom => AtomWriter::new(self.write_context())
                .entry(set, entity)
                .into_bytes(),
            other => return Err(unwritable(other)),
        };
        let mut response = ODataResponse::new(status).with_body(&header_value(format, false), body);
        if let Some(etag) = entity.compute_etag() {
            response.set_header(ETAG, &etag);
        }
        Ok(response)
    }

    pub(super) fn value_response(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
        type_ref: &TypeRef,
        value: &Value,
    ) -> Result<ODataResponse, ServiceError> {
        if value.is_null() {
            return Ok(ODataResponse::new(StatusCode::NO_CONTENT));
        }
        let format = self.negotiate(request, parsed, PayloadKind::Value)?;
        let Format::Json(level) = format else {
            return Err(unwritable(format));
        };
        let body = JsonWriter::new(self.write_context(), level).value(type_ref, value);
        Ok(ODataResponse::new(StatusCode::OK).with_body(&header_value(format, false), to_bytes(&body)))
    }

    fn raw_response(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
        value: &Value,
    ) -> Result<ODataResponse, ServiceError> {
        if value.is_null() {
            return Ok(ODataResponse::new(StatusCode::NO_CONTENT));
        }
        let format = self.negotiate(request, parsed, PayloadKind::Raw)?;
        Ok(ODataResponse::new(StatusCode::OK)
            .with_body(&header_value(format, false), raw_text(value).into_bytes()))
    }
}

fn select_key(entities: Vec<Entity>, key: &crate::model::EntityKey) -> Option<Evaluated> {
    entities
        .into_iter()
        .find(|e| e.key().as_ref() == Some(key))
        .map(Evaluated::Entity)
}

fn unwritable(format: Format) -> ServiceError {
    ServiceError::internal(format!("Negotiated format {format:?} cannot be written here."))
}

/// Text of a primitive for `$value` and `$count`.
fn raw_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        Value::Boolean(v) => v.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Double(v) if v.is_nan() => "NaN".to_string(),
        Value::Double(v) if v.is_infinite() => if *v > 0.0 { "INF" } else { "-INF" }.to_string(),
        Value::Double(v) => v.to_string(),
        Value::Guid(v) => v.to_string(),
        Value::DateTimeOffset(v) => v.to_rfc3339(),
        Value::Null | Value::Complex(_) | Value::Collection(_) => String::new(),
    }
}
