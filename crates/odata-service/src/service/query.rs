//! System query options.

use crate::error::ServiceError;
use crate::model::{Entity, ServiceModel};
use crate::uri::{ParsedUri, Target};

const KNOWN: [&str; 9] = [
    "$select",
    "$expand",
    "$filter",
    "$orderby",
    "$count",
    "$skip",
    "$skiptoken",
    "$top",
    "$format",
];

const UNSUPPORTED: [&str; 4] = ["$filter", "$orderby", "$expand", "$skiptoken"];

/// Unknown `$` options are rejected on every request.
pub(super) fn check_known_options(parsed: &ParsedUri) -> Result<(), ServiceError> {
    match parsed.system_options().find(|name| !KNOWN.contains(name)) {
        Some(name) => Err(ServiceError::bad_path(format!(
            "The query parameter '{name}' begins with a system-reserved '$' character but is not recognized."
        ))),
        None => Ok(()),
    }
}

/// Rejects every system option except `$format`.
pub(super) fn reject_options(parsed: &ParsedUri) -> Result<(), ServiceError> {
    if parsed.system_options().any(|name| name != "$format") {
        Err(ServiceError::query_options_not_applicable())
    } else {
        Ok(())
    }
}

/// Options applied to a GET response.
#[derive(Debug, Default, PartialEq, Eq)]
pub(super) struct QueryOptions {
    pub top: Option<usize>,
    pub skip: Option<usize>,
    pub count: bool,
    /// `None` selects every property.
    pub select: Option<Vec<String>>,
}

impl QueryOptions {
    pub fn parse(parsed: &ParsedUri, target: &Target, model: &ServiceModel) -> Result<Self, ServiceError> {
        if let Some(name) = parsed.system_options().find(|name| UNSUPPORTED.contains(name)) {
            return Err(ServiceError::not_implemented(format!(
                "The query option '{name}' is not supported by this service."
            )));
        }
        let collection = matches!(target, Target::Entities { .. });
        let has = |name: &str| parsed.query_option(name).is_some();
        if !collection && (has("$top") || has("$skip") || has("$count")) {
            return Err(ServiceError::query_options_not_applicable());
        }
        let Some(type_name) = target.entity_type() else {
            return if has("$select") {
                Err(ServiceError::query_options_not_applicable())
            } else {
                Ok(Self::default())
            };
        };

        let count = match parsed.query_option("$count") {
            None | Some("false") => false,
            Some("true") => true,
            Some(other) => {
                return Err(ServiceError::bad_path(format!(
                    "Invalid value '{other}' for $count query option. Only 'true' and 'false' are allowed."
                )))
            }
        };
        let select = match parsed.query_option("$select") {
            None => None,
            Some(text) => parse_select(text, type_name, model)?,
        };
        Ok(Self {
            top: parse_count_option(parsed, "$top")?,
            skip: parse_count_option(parsed, "$skip")?,
            count,
            select,
        })
    }

    /// Pages `entities`; the total is taken before paging.
    pub fn apply(&self, entities: Vec<Entity>) -> (Vec<Entity>, Option<usize>) {
        let total = self.count.then_some(entities.len());
        let page = entities
            .into_iter()
            .skip(self.skip.unwrap_or(0))
            .take(self.top.unwrap_or(usize::MAX))
            .collect();
        (page, total)
    }
}

fn parse_count_option(parsed: &ParsedUri, name: &str) -> Result<Option<usize>, ServiceError> {
    parsed
        .query_option(name)
        .map(|text| {
            text.trim().parse().map_err(|_| {
                ServiceError::bad_path(format!(
                    "Invalid value '{text}' for {name} query option. The value must be a non-negative integer."
                ))
            })
        })
        .transpose()
}

fn parse_select(text: &str, type_name: &str, model: &ServiceModel) -> Result<Option<Vec<String>>, ServiceError> {
    let names: Vec<&str> = text.split(',').map(str::trim).filter(|n| !n.is_empty()).collect();
    if names.is_empty() || names.contains(&"*") {
        return Ok(None);
    }
    names
        .into_iter()
        .map(|name| match model.property(type_name, name) {
            Some(_) => Ok(name.to_string()),
            None => Err(ServiceError::bad_path(format!(
                "Could not find a property named '{name}' on type '{type_name}'."
            ))),
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}
