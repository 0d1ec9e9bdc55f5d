//! Conditional request headers and `Prefer` handling for writes.
//!
//! Status and body decisions:
//!
//! | Method       | Prefer                  | Status | Body |
//! |--------------|-------------------------|--------|------|
//! | POST         | absent / representation | 201    | yes  |
//! | POST         | minimal                 | 204    | no   |
//! | PUT / PATCH  | representation          | 200    | yes  |
//! | PUT / PATCH  | absent / minimal        | 204    | no   |
//! | DELETE       | any                     | 204    | no   |

use crate::error::ServiceError;
use crate::request::{header_str, PREFER};
use http::header::{IF_MATCH, IF_NONE_MATCH};
use http::{HeaderMap, Method, StatusCode};
use odata_store::Precondition;

/// A `return=` preference from the `Prefer` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnPreference {
    Minimal,
    Representation,
}

impl ReturnPreference {
    /// Value for the `Preference-Applied` header.
    pub fn as_header(self) -> &'static str {
        match self {
            ReturnPreference::Minimal => "return=minimal",
            ReturnPreference::Representation => "return=representation",
        }
    }
}

/// Reads the `return` preference; other preferences and unknown values are ignored.
pub fn return_preference(headers: &HeaderMap) -> Option<ReturnPreference> {
    headers
        .get_all(PREFER)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .find_map(|token| {
            let (name, value) = token.split_once('=')?;
            if !name.trim().eq_ignore_ascii_case("return") {
                return None;
            }
            match value.trim().trim_matches('"').to_ascii_lowercase().as_str() {
                "minimal" => Some(ReturnPreference::Minimal),
                "representation" => Some(ReturnPreference::Representation),
                _ => None,
            }
        })
}

/// Status of a successful write and whether the entity is written in the body.
pub fn write_outcome(method: &Method, preference: Option<ReturnPreference>) -> (StatusCode, bool) {
    match (method.as_str(), preference) {
        ("POST", Some(ReturnPreference::Minimal)) => (StatusCode::NO_CONTENT, false),
        ("POST", _) => (StatusCode::CREATED, true),
        ("PUT" | "PATCH" | "MERGE", Some(ReturnPreference::Representation)) => (StatusCode::OK, true),
        _ => (StatusCode::NO_CONTENT, false),
    }
}

/// `If-Match` and `If-None-Match` values of a request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Conditions {
    pub if_match: Option<String>,
    pub if_none_match: Option<String>,
}

/// Outcome of evaluating conditions on a read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCondition {
    Proceed,
    NotModified,
}

fn both_headers() -> ServiceError {
    ServiceError::Concurrency {
        status: StatusCode::BAD_REQUEST,
        message: "Both If-Match and If-None-Match HTTP headers cannot be specified at the same time. Please specify either one of the headers or none of them.".to_string(),
    }
}

fn bad_request(message: String) -> ServiceError {
    ServiceError::Concurrency {
        status: StatusCode::BAD_REQUEST,
        message,
    }
}

impl Conditions {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        Self {
            if_match: header_str(headers, &IF_MATCH).map(str::to_string),
            if_none_match: header_str(headers, &IF_NONE_MATCH).map(str::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.if_match.is_none() && self.if_none_match.is_none()
    }

    fn ensure_not_both(&self) -> Result<(), ServiceError> {
        if self.if_match.is_some() && self.if_none_match.is_some() {
            Err(both_headers())
        } else {
            Ok(())
        }
    }

    /// Operation invocations accept no conditional headers at all.
    pub fn check_action(&self) -> Result<(), ServiceError> {
        self.ensure_not_both()?;
        if self.is_empty() {
            Ok(())
        } else {
            Err(bad_request(
                "If-Match or If-None-Match headers cannot be specified for service actions.".to_string(),
            ))
        }
    }

    /// Inserts accept no conditional headers.
    pub fn check_insert(&self) -> Result<(), ServiceError> {
        self.ensure_not_both()?;
        if self.is_empty() {
            Ok(())
        } else {
            Err(bad_request(
                "If-Match or If-None-Match HTTP headers cannot be specified for POST operations.".to_string(),
            ))
        }
    }

    /// Precondition for PUT, PATCH, or DELETE on an entity of `type_name`.
    pub fn write_precondition(&self, type_name: &str, has_etag: bool) -> Result<Precondition, ServiceError> {
        self.ensure_not_both()?;
        if self.if_none_match.is_some() {
            return Err(bad_request(
                "If-None-Match HTTP header cannot be specified for DELETE, PUT, PATCH and MERGE operations.".to_string(),
            ));
        }
        match (&self.if_match, has_etag) {
            (None, false) => Ok(Precondition::None),
            (None, true) => Err(bad_request(format!(
                "Since entity type '{type_name}' has one or more etag properties, If-Match HTTP header must be specified for DELETE/PUT/PATCH operations on this type."
            ))),
            (Some(_), false) => Err(no_etag_properties(type_name)),
            (Some(tag), true) if tag.trim() == "*" => Ok(Precondition::Any),
            (Some(tag), true) => Ok(Precondition::Matches(tag.trim().to_string())),
        }
    }

    /// Evaluates conditions for a GET of an entity whose current ETag is `current`.
    pub fn check_read(&self, type_name: &str, current: Option<&str>) -> Result<ReadCondition, ServiceError> {
        self.ensure_not_both()?;
        if self.is_empty() {
            return Ok(ReadCondition::Proceed);
        }
        let Some(current) = current else {
            return Err(no_etag_properties(type_name));
        };
        if let Some(tag) = &self.if_match {
            let tag = tag.trim();
            if tag != "*" && tag != current {
                return Err(ServiceError::Concurrency {
                    status: StatusCode::PRECONDITION_FAILED,
                    message: "The etag value in the request header does not match with the current etag value of the object.".to_string(),
                });
            }
        }
        if let Some(tag) = &self.if_none_match {
            let tag = tag.trim();
            if tag == "*" || tag == current {
                return Ok(ReadCondition::NotModified);
            }
        }
        Ok(ReadCondition::Proceed)
    }
}

fn no_etag_properties(type_name: &str) -> ServiceError {
    bad_request(format!(
        "If-Match or If-None-Match HTTP headers cannot be specified since the entity type '{type_name}' does not have any etag properties."
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn conditions(if_match: Option<&str>, if_none_match: Option<&str>) -> Conditions {
        Conditions {
            if_match: if_match.map(str::to_string),
            if_none_match: if_none_match.map(str::to_string),
        }
    }

    #[test]
    fn test_prefer_parsing() {
        let mut headers = HeaderMap::new();
        assert_eq!(return_preference(&headers), None);
        headers.insert(PREFER, HeaderValue::from_static("odata.continue-on-error, return=minimal"));
        assert_eq!(return_preference(&headers), Some(ReturnPreference::Minimal));
        headers.insert(PREFER, HeaderValue::from_static("return=sometimes"));
        assert_eq!(return_preference(&headers), None);
        headers.insert(PREFER, HeaderValue::from_static("Return = \"representation\""));
        assert_eq!(return_preference(&headers), Some(ReturnPreference::Representation));
    }

    #[test]
    fn test_write_outcomes() {
        use ReturnPreference::*;
        assert_eq!(write_outcome(&Method::POST, None), (StatusCode::CREATED, true));
        assert_eq!(write_outcome(&Method::POST, Some(Representation)), (StatusCode::CREATED, true));
        assert_eq!(write_outcome(&Method::POST, Some(Minimal)), (StatusCode::NO_CONTENT, false));
        assert_eq!(write_outcome(&Method::PATCH, Some(Representation)), (StatusCode::OK, true));
        assert_eq!(write_outcome(&Method::PUT, None), (StatusCode::NO_CONTENT, false));
        assert_eq!(write_outcome(&Method::DELETE, Some(Representation)), (StatusCode::NO_CONTENT, false));
    }

    #[test]
    fn test_action_conditions() {
        assert!(conditions(None, None).check_action().is_ok());
        let err = conditions(Some("*"), None).check_action().unwrap_err();
        assert_eq!(err.to_string(), "If-Match or If-None-Match headers cannot be specified for service actions.");
        let err = conditions(Some("*"), Some("*")).check_action().unwrap_err();
        assert!(err.to_string().starts_with("Both If-Match and If-None-Match"));
    }

    #[test]
    fn test_write_preconditions() {
        assert_eq!(
            conditions(None, None).write_precondition("Demo.T", false).unwrap(),
            Precondition::None
        );
        let err = conditions(None, None).write_precondition("Demo.T", true).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("If-Match HTTP header must be specified"));
        assert_eq!(
            conditions(Some("W/\"1\""), None).write_precondition("Demo.T", true).unwrap(),
            Precondition::Matches("W/\"1\"".into())
        );
        assert_eq!(
            conditions(Some("*"), None).write_precondition("Demo.T", true).unwrap(),
            Precondition::Any
        );
        assert!(conditions(None, Some("*")).write_precondition("Demo.T", true).is_err());
        assert!(conditions(Some("*"), None).write_precondition("Demo.T", false).is_err());
    }

    #[test]
    fn test_read_conditions() {
        let current = Some("W/\"1\"");
        assert_eq!(
            conditions(None, Some("W/\"1\"")).check_read("Demo.T", current).unwrap(),
            ReadCondition::NotModified
        );
        assert_eq!(
            conditions(None, Some("W/\"2\"")).check_read("Demo.T", current).unwrap(),
            ReadCondition::Proceed
        );
        let err = conditions(Some("W/\"2\""), None).check_read("Demo.T", current).unwrap_err();
        assert_eq!(err.status(), StatusCode::PRECONDITION_FAILED);
    }
}
