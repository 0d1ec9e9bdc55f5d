//! Reads JSON request payloads: action parameters and entity bodies.
//!
//! Top-level members are collected in order with duplicates kept, so repeated
//! parameter or property names can be reported instead of silently overwritten.

use crate::error::ServiceError;
use crate::model::{
    ComplexValue, EntityChanges, EntityKey, OperationDefinition, PrimitiveKind, PropertyKind,
    ServiceModel, TypeRef, Value,
};
use crate::uri::parser::parse_uri;
use crate::uri::resolver::parse_key_predicate;
use chrono::DateTime;
use indexmap::IndexMap;
use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};
use serde_json::Value as Json;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use tracing::debug;
use uuid::Uuid;

/// Members of a JSON object in document order, duplicates included.
#[derive(Debug, Default)]
struct Members(Vec<(String, Json)>);

impl<'de> Deserialize<'de> for Members {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct MembersVisitor;

        impl<'de> Visitor<'de> for MembersVisitor {
            type Value = Members;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a JSON object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Members, A::Error> {
                let mut members = Vec::new();
                while let Some((name, value)) = map.next_entry::<String, Json>()? {
                    members.push((name, value));
                }
                Ok(Members(members))
            }
        }

        deserializer.deserialize_map(MembersVisitor)
    }
}

fn read_members(body: &[u8]) -> Result<Members, ServiceError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Members::default());
    }
    serde_json::from_slice(body).map_err(|e| {
        if e.is_data() {
            ServiceError::payload("The request payload must be a JSON object.")
        } else {
            ServiceError::payload(format!("The request payload is not valid JSON: {e}"))
        }
    })
}

/// Reads the non-binding parameters of `definition` from an action request body.
///
/// Values are returned in declaration order. Every declared parameter must be
/// present (possibly as `null`).
pub fn read_parameters(
    body: &[u8],
    definition: &OperationDefinition,
    model: &ServiceModel,
) -> Result<IndexMap<String, Value>, ServiceError> {
    let members = read_members(body)?;
    let action = &definition.name;
    let mut read: IndexMap<String, Value> = IndexMap::new();

    for (name, json) in members.0 {
        if name.starts_with('@') {
            continue;
        }
        let Some(parameter) = definition.non_binding_parameters().find(|p| p.name == name) else {
            return Err(ServiceError::payload(format!(
                "The parameter '{name}' in the request payload is not a valid parameter for the operation '{action}'."
            )));
        };
        if read.contains_key(&name) {
            return Err(ServiceError::payload(format!(
                "Multiple parameters with the name '{name}' were found in the request payload."
            )));
        }
        let value = convert(&name, &json, &parameter.type_ref, model)?;
        read.insert(name, value);
    }

    let missing: Vec<&str> = definition
        .non_binding_parameters()
        .filter(|p| !read.contains_key(&p.name))
        .map(|p| p.name.as_str())
        .collect();
    if !missing.is_empty() {
        return Err(ServiceError::payload(format!(
            "One or more parameters of the operation '{action}' are missing from the request payload. The missing parameters are: {}.",
            missing.join(",")
        )));
    }

    Ok(definition
        .non_binding_parameters()
        .filter_map(|p| read.shift_remove(&p.name).map(|v| (p.name.clone(), v)))
        .collect())
}

/// An entity body: its (possibly derived) type and the values and links it sets.
#[derive(Debug)]
pub struct EntityPayload {
    pub type_name: String,
    pub changes: EntityChanges,
}

/// Reads an entity body for `set`, whose static type is `static_type`.
///
/// `@odata.type` may name a derived type. Navigation links are set with
/// `Nav@odata.bind` whose value is an entity URI (or an array of them).
pub fn read_entity(
    body: &[u8],
    model: &ServiceModel,
    set: &str,
    static_type: &str,
    service_root: &str,
) -> Result<EntityPayload, ServiceError> {
    let members = read_members(body)?;
    let type_name = match members.0.iter().find(|(n, _)| n == "@odata.type") {
        Some((_, Json::String(declared))) => {
            let declared = declared.trim_start_matches('#');
            if !model.is_assignable(declared, static_type) {
                return Err(ServiceError::payload(format!(
                    "The type '{declared}' is not assignable to the type '{static_type}' of the resource set '{set}'."
                )));
            }
            declared.to_string()
        }
        Some(_) => return Err(ServiceError::payload("The '@odata.type' annotation must be a string.")),
        None => static_type.to_string(),
    };

    let mut changes = EntityChanges::default();
    let mut seen = HashSet::new();
    for (name, json) in &members.0 {
        if let Some(navigation) = name.strip_suffix("@odata.bind") {
            let links = read_links(model, set, &type_name, navigation, json, service_root)?;
            changes.links.insert(navigation.to_string(), links);
            continue;
        }
        if name.contains('@') {
            continue;
        }
        if !seen.insert(name.as_str()) {
            return Err(ServiceError::payload(format!(
                "Multiple property values with the name '{name}' were found in the request payload."
            )));
        }
        let Some(property) = model.property(&type_name, name) else {
            return Err(ServiceError::payload(format!(
                "The property '{name}' does not exist on type '{type_name}'. Make sure to only use property names that are defined by the type."
            )));
        };
        if property.is_navigation() {
            return Err(ServiceError::NotImplemented {
                message: format!(
                    "Inline content for the navigation property '{name}' is not supported; use '{name}@odata.bind'."
                ),
            });
        }
        if json.is_null() && !property.nullable {
            return Err(ServiceError::payload(format!(
                "The property '{name}' does not allow null values."
            )));
        }
        let value = convert(name, json, &model.property_type(property), model)?;
        changes.values.insert(name.clone(), value);
    }
    debug!(entity_type = %type_name, properties = changes.values.len(), "Read entity payload");
    Ok(EntityPayload { type_name, changes })
}

fn read_links(
    model: &ServiceModel,
    set: &str,
    type_name: &str,
    navigation: &str,
    json: &Json,
    service_root: &str,
) -> Result<Vec<EntityKey>, ServiceError> {
    let many = match model.property(type_name, navigation).map(|p| &p.kind) {
        Some(PropertyKind::Navigation { many, .. }) => *many,
        _ => {
            return Err(ServiceError::payload(format!(
                "The property '{navigation}' does not exist on type '{type_name}' or is not a navigation property."
            )))
        }
    };
    let target = model
        .navigation_target(set, navigation)
        .ok_or_else(|| ServiceError::resource_not_found(navigation))?;
    let shape = model
        .shape(&target.entity_type)
        .ok_or_else(|| ServiceError::internal(format!("No key layout for '{}'.", target.entity_type)))?;

    let uris: Vec<&str> = match (json, many) {
        (Json::String(uri), false) => vec![uri.as_str()],
        (Json::Array(items), true) => items
            .iter()
            .map(|item| {
                item.as_str().ok_or_else(|| {
                    ServiceError::payload(format!(
                        "The links for the navigation property '{navigation}' must be entity URIs."
                    ))
                })
            })
            .collect::<Result<_, _>>()?,
        _ => {
            return Err(ServiceError::payload(format!(
                "The value of '{navigation}@odata.bind' does not match the multiplicity of the navigation property."
            )))
        }
    };

    uris.into_iter()
        .map(|uri| {
            let invalid = || {
                ServiceError::payload(format!(
                    "The link '{uri}' for the navigation property '{navigation}' does not identify an entity in the resource set '{}'.",
                    target.name
                ))
            };
            let parsed = parse_uri(uri, service_root).map_err(|_| invalid())?;
            match parsed.segments.as_slice() {
                [segment] if segment.identifier == target.name => segment
                    .parens
                    .as_deref()
                    .and_then(|text| parse_key_predicate(shape, text))
                    .ok_or_else(invalid),
                _ => Err(invalid()),
            }
        })
        .collect()
}

fn json_kind(json: &Json) -> &'static str {
    match json {
        Json::Null => "Null",
        Json::Bool(_) => "Boolean",
        Json::Number(_) => "Number",
        Json::String(_) => "String",
        Json::Array(_) => "Array",
        Json::Object(_) => "Object",
    }
}

/// Converts a JSON value to a value of `type_ref`. `name` is used in error messages.
pub fn convert(
    name: &str,
    json: &Json,
    type_ref: &TypeRef,
    model: &ServiceModel,
) -> Result<Value, ServiceError> {
    if json.is_null() {
        return Ok(Value::Null);
    }
    let mismatch = || {
        ServiceError::payload(format!(
            "Cannot convert the JSON value for '{name}' to the type '{type_ref}'."
        ))
    };
    match type_ref {
        TypeRef::Primitive(kind) => convert_primitive(json, *kind).ok_or_else(mismatch),
        TypeRef::Complex(type_name) => convert_complex(name, json, type_name, model),
        TypeRef::PrimitiveCollection(_) | TypeRef::ComplexCollection(_) => {
            let Json::Array(items) = json else {
                return Err(ServiceError::payload(format!(
                    "A collection was expected for the parameter '{name}' but a value of JSON type '{}' was found.",
                    json_kind(json)
                )));
            };
            items
                .iter()
                .map(|item| match type_ref {
                    TypeRef::PrimitiveCollection(kind) => {
                        convert(name, item, &TypeRef::Primitive(*kind), model)
                    }
                    TypeRef::ComplexCollection(t) => convert(name, item, &TypeRef::Complex(t.clone()), model),
                    _ => Err(mismatch()),
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Collection)
        }
        TypeRef::Entity(_) | TypeRef::EntityCollection(_) | TypeRef::EntityQueryable(_) => {
            Err(mismatch())
        }
    }
}

fn convert_primitive(json: &Json, kind: PrimitiveKind) -> Option<Value> {
    match (kind, json) {
        (PrimitiveKind::Boolean, Json::Bool(v)) => Some(Value::Boolean(*v)),
        (PrimitiveKind::Int32, Json::Number(n)) => {
            n.as_i64().and_then(|v| i32::try_from(v).ok()).map(Value::Int32)
        }
        (PrimitiveKind::Int64, Json::Number(n)) => n.as_i64().map(Value::Int64),
        (PrimitiveKind::Int64, Json::String(s)) => s.parse().ok().map(Value::Int64),
        (PrimitiveKind::Double, Json::Number(n)) => n.as_f64().map(Value::Double),
        (PrimitiveKind::Double, Json::String(s)) => match s.as_str() {
            "INF" => Some(Value::Double(f64::INFINITY)),
            "-INF" => Some(Value::Double(f64::NEG_INFINITY)),
            "NaN" => Some(Value::Double(f64::NAN)),
            other => other.parse().ok().map(Value::Double),
        },
        (PrimitiveKind::String, Json::String(s)) => Some(Value::String(s.clone())),
        (PrimitiveKind::Guid, Json::String(s)) => Uuid::parse_str(s).ok().map(Value::Guid),
        (PrimitiveKind::DateTimeOffset, Json::String(s)) => DateTime::parse_from_rfc3339(s)
            .ok()
            .map(Value::DateTimeOffset),
        _ => None,
    }
}

fn convert_complex(
    name: &str,
    json: &Json,
    declared: &str,
    model: &ServiceModel,
) -> Result<Value, ServiceError> {
    let Json::Object(members) = json else {
        return Err(ServiceError::payload(format!(
            "Cannot convert the JSON value for '{name}' to the type '{declared}'."
        )));
    };
    let type_name = match members.get("@odata.type").and_then(Json::as_str) {
        Some(actual) => {
            let actual = actual.trim_start_matches('#');
            if !model.is_assignable(actual, declared) {
                return Err(ServiceError::payload(format!(
                    "Cannot convert the JSON value for '{name}' to the type '{declared}'."
                )));
            }
            actual
        }
        None => declared,
    };

    let mut properties = BTreeMap::new();
    for (property_name, value) in members.iter().filter(|(n, _)| !n.contains('@')) {
        let property = model.property(type_name, property_name).ok_or_else(|| {
            ServiceError::payload(format!(
                "The property '{property_name}' does not exist on type '{type_name}'. Make sure to only use property names that are defined by the type."
            ))
        })?;
        let value = convert(property_name, value, &model.property_type(property), model)?;
        properties.insert(property_name.clone(), value);
    }
    Ok(Value::Complex(ComplexValue {
        type_name: type_name.to_string(),
        properties,
    }))
}
