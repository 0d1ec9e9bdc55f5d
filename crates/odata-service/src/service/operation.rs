//! Action and service operation requests.

use super::query::{reject_options, QueryOptions};
use super::read::Evaluated;
use super::{DataService, Dispatch};
use crate::codec::content_type::check_request_body;
use crate::codec::json_reader::read_parameters;
use crate::error::ServiceError;
use crate::invoke::engine::{invoke, status_for};
use crate::invoke::{Arguments, BindingValue, InvocationContext, InvocationResult, RegisteredOperation};
use crate::model::{BindingKind, Entity, OperationDefinition, OperationKind, PrimitiveKind, TypeRef, Value};
use crate::request::{ODataRequest, ODataResponse};
use crate::update::Conditions;
use crate::uri::literal::parse_typed;
use crate::uri::{ParsedUri, ResolvedPath, Segment, Target};
use http::header::CONTENT_TYPE;
use http::StatusCode;
use indexmap::IndexMap;
use std::sync::Arc;
use tracing::{debug, info};

impl DataService {
    /// Invokes the operation named by the last path segment.
    pub(super) async fn invoke_operation(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
        path: &ResolvedPath,
        operation: &Arc<RegisteredOperation>,
        dispatch: Dispatch,
    ) -> Result<ODataResponse, ServiceError> {
        let definition = &operation.definition;
        let method = request.method.as_str();
        match (definition.kind, method) {
            (OperationKind::Action, "POST") | (OperationKind::Function, "GET") => {}
            (OperationKind::Action, _) => {
                return Err(ServiceError::method_not_allowed(format!(
                    "The method '{method}' is not allowed on the service action '{}'. Service actions must be invoked with POST.",
                    definition.name
                )))
            }
            (OperationKind::Function, _) => {
                return Err(ServiceError::method_not_allowed(format!(
                    "The method '{method}' is not allowed on the service operation '{}'. Service operations must be invoked with GET.",
                    definition.name
                )))
            }
        }

        Conditions::from_headers(&request.headers).check_action()?;
        let values = match definition.kind {
            OperationKind::Action => {
                reject_options(parsed)?;
                check_request_body(request.header_str(&CONTENT_TYPE), &request.body)?;
                read_parameters(&request.body, definition, &self.model)?
            }
            OperationKind::Function => {
                if !definition.is_composable() {
                    reject_options(parsed)?;
                }
                function_arguments(definition, parsed)?
            }
        };

        let (segment, prefix) = path
            .segments
            .split_last()
            .ok_or_else(|| ServiceError::internal("An operation request has no segments."))?;
        let result = {
            // Held from reading the binding value through the handler's writes.
            let _guard = match definition.kind {
                OperationKind::Action => self.lock_writes(dispatch).await,
                OperationKind::Function => None,
            };
            let binding = if definition.is_bound() {
                Some(self.binding_value(operation, segment, prefix, parsed).await?)
            } else {
                None
            };
            self.call(operation, Arguments { binding, values }).await?
        };
        info!(operation = %definition.qualified_name(), status = %status_for(&result), "Operation invoked");
        self.result_response(request, parsed, segment, definition, result)
    }

    async fn binding_value(
        &self,
        operation: &RegisteredOperation,
        segment: &Segment,
        prefix: &[Segment],
        parsed: &ParsedUri,
    ) -> Result<BindingValue, ServiceError> {
        let source = prefix.last().map_or(segment.identifier.as_str(), |s| s.identifier.as_str());
        match self.evaluate(prefix, parsed, true).await? {
            Evaluated::Entity(entity) => {
                if operation.definition.binding == BindingKind::Sometimes
                    && !operation.handler.is_available(&entity)
                {
                    debug!(operation = %operation.definition.qualified_name(), "Action not available for entity");
                    return Err(ServiceError::resource_not_found(&segment.identifier));
                }
                Ok(BindingValue::Entity(entity))
            }
            Evaluated::Entities(entities) => Ok(BindingValue::Entities(entities)),
            Evaluated::Null => Err(ServiceError::resource_not_found(source)),
            Evaluated::Value(_) => Err(ServiceError::bound_to_non_entity()),
        }
    }

    async fn call(
        &self,
        operation: &RegisteredOperation,
        args: Arguments,
    ) -> Result<InvocationResult, ServiceError> {
        let ctx = InvocationContext {
            data: self.data.clone(),
            service_root: self.settings.service_root.clone(),
            operation: operation.definition.qualified_name(),
        };
        invoke(&self.model, self.observer.as_ref(), operation, ctx, args).await
    }

    /// Runs a composable service operation that is followed by more segments.
    pub(super) async fn call_composable(
        &self,
        operation: &RegisteredOperation,
        parsed: &ParsedUri,
    ) -> Result<Vec<Entity>, ServiceError> {
        let values = function_arguments(&operation.definition, parsed)?;
        match self.call(operation, Arguments { binding: None, values }).await? {
            InvocationResult::EntityQueryable(Some(entities))
            | InvocationResult::EntityCollection(Some(entities)) => Ok(entities),
            InvocationResult::EntityQueryable(None) | InvocationResult::EntityCollection(None) => {
                Ok(Vec::new())
            }
            _ => Err(ServiceError::internal(format!(
                "The operation '{}' did not return a collection of entities.",
                operation.definition.name
            ))),
        }
    }

    fn result_response(
        &self,
        request: &ODataRequest,
        parsed: &ParsedUri,
        segment: &Segment,
        definition: &OperationDefinition,
        result: InvocationResult,
    ) -> Result<ODataResponse, ServiceError> {
        if status_for(&result) == StatusCode::NO_CONTENT {
            return Ok(ODataResponse::new(StatusCode::NO_CONTENT));
        }
        let return_type = definition
            .return_type
            .as_ref()
            .ok_or_else(|| ServiceError::internal("A void operation produced a result."))?;

        match (result, &segment.target) {
            (InvocationResult::Entity(Some(entity)), Target::Entity { set, type_name }) => self
                .entity_response(request, parsed, StatusCode::OK, set, type_name, &entity, None),
            (
                InvocationResult::EntityCollection(Some(entities))
                | InvocationResult::EntityQueryable(Some(entities)),
                target,
            ) => match (target, &segment.key) {
                (Target::Entity { set, type_name }, Some(key)) => {
                    let entity = entities
                        .into_iter()
                        .find(|e| e.key().as_ref() == Some(key))
                        .ok_or_else(|| ServiceError::resource_not_found(&segment.identifier))?;
                    self.entity_response(request, parsed, StatusCode::OK, set, type_name, &entity, None)
                }
                (Target::Entities { set, type_name, .. }, None) => {
                    let options = QueryOptions::parse(parsed, target, &self.model)?;
                    self.feed_response(request, parsed, set, type_name, entities, &options)
                }
                _ => Err(ServiceError::internal(
                    "An entity collection result does not match the operation segment.",
                )),
            },
            (InvocationResult::Primitive(Some(value)), _) => {
                self.value_response(request, parsed, return_type, &value)
            }
            (InvocationResult::Complex(Some(complex)), _) => {
                self.value_response(request, parsed, return_type, &Value::Complex(complex))
            }
            (InvocationResult::PrimitiveCollection(Some(items)), _) => {
                self.value_response(request, parsed, return_type, &Value::Collection(items))
            }
            (InvocationResult::ComplexCollection(Some(items)), _) => {
                let items = items.into_iter().map(Value::Complex).collect();
                self.value_response(request, parsed, return_type, &Value::Collection(items))
            }
            (result, target) => Err(ServiceError::internal(format!(
                "The result {result:?} does not match the operation target {target:?}."
            ))),
        }
    }
}

/// Reads service operation parameters from non-`$` query options.
fn function_arguments(
    definition: &OperationDefinition,
    parsed: &ParsedUri,
) -> Result<IndexMap<String, Value>, ServiceError> {
    let mut values = IndexMap::new();
    let mut missing = Vec::new();
    for parameter in definition.non_binding_parameters() {
        let Some(text) = parsed.query_option(&parameter.name) else {
            missing.push(parameter.name.as_str());
            continue;
        };
        let TypeRef::Primitive(kind) = &parameter.type_ref else {
            return Err(ServiceError::payload(format!(
                "The parameter '{}' of the service operation '{}' cannot be supplied in the query string.",
                parameter.name, definition.name
            )));
        };
        // A bare word is taken as a string value.
        let value = parse_typed(text, *kind)
            .or_else(|| (*kind == PrimitiveKind::String).then(|| Value::from(text)))
            .ok_or_else(|| {
                ServiceError::payload(format!(
                    "Cannot convert the query value for '{}' to the type '{}'.",
                    parameter.name, parameter.type_ref
                ))
            })?;
        values.insert(parameter.name.clone(), value);
    }
    if !missing.is_empty() {
        return Err(ServiceError::payload(format!(
            "One or more parameters of the operation '{}' are missing from the request payload. The missing parameters are: {}.",
            definition.name,
            missing.join(",")
        )));
    }
    Ok(values)
}
