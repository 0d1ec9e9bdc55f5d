//! Content negotiation for responses and content-type checks for request bodies.

use crate::error::ServiceError;

pub const JSON: &str = "application/json";
pub const ATOM: &str = "application/atom+xml";
pub const XML: &str = "application/xml";
pub const TEXT: &str = "text/plain";

/// Amount of control information written into JSON payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataLevel {
    None,
    #[default]
    Minimal,
    Full,
}

impl MetadataLevel {
    fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "none" => Some(MetadataLevel::None),
            "minimal" => Some(MetadataLevel::Minimal),
            "full" => Some(MetadataLevel::Full),
            _ => None,
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            MetadataLevel::None => "none",
            MetadataLevel::Minimal => "minimal",
            MetadataLevel::Full => "full",
        }
    }
}

/// Serialization chosen for a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json(MetadataLevel),
    Atom,
    Xml,
    Text,
}

/// What a response carries, which decides the formats it can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// A single entity or a feed; JSON or Atom.
    Entities,
    /// Properties, operation results, counts in JSON, the service document.
    Value,
    /// The CSDL document.
    Metadata,
    /// `$value` and `$count`.
    Raw,
}

impl PayloadKind {
    fn default_format(self) -> Format {
        match self {
            PayloadKind::Entities | PayloadKind::Value => Format::Json(MetadataLevel::Minimal),
            PayloadKind::Metadata => Format::Xml,
            PayloadKind::Raw => Format::Text,
        }
    }
}

struct MediaRange {
    essence: String,
    params: Vec<(String, String)>,
    quality: f32,
}

impl MediaRange {
    fn parse(text: &str) -> Option<Self> {
        let mut parts = text.split(';');
        let essence = parts.next()?.trim().to_ascii_lowercase();
        if essence.is_empty() {
            return None;
        }
        let mut params = Vec::new();
        let mut quality = 1.0;
        for param in parts {
            let Some((name, value)) = param.split_once('=') else {
                continue;
            };
            let name = name.trim().to_ascii_lowercase();
            let value = value.trim().trim_matches('"').to_string();
            if name == "q" {
                quality = value.parse().unwrap_or(0.0);
            } else {
                params.push((name, value));
            }
        }
        Some(Self {
            essence,
            params,
            quality,
        })
    }

    fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    fn format_for(&self, kind: PayloadKind) -> Option<Format> {
        let json = || {
            let level = self
                .param("odata.metadata")
                .and_then(MetadataLevel::parse)
                .unwrap_or_default();
            Format::Json(level)
        };
        match (self.essence.as_str(), kind) {
            ("*/*", _) => Some(kind.default_format()),
            ("application/*", PayloadKind::Raw) => None,
            ("application/*", PayloadKind::Metadata) => Some(Format::Xml),
            ("application/*" | JSON, PayloadKind::Entities | PayloadKind::Value) => Some(json()),
            (ATOM, PayloadKind::Entities) => Some(Format::Atom),
            (XML, PayloadKind::Metadata) => Some(Format::Xml),
            (TEXT | "text/*", PayloadKind::Raw) => Some(Format::Text),
            _ => None,
        }
    }
}

/// Picks the response format from `$format` (which wins) or the `Accept` header.
///
/// ```rust
/// use odata_service::codec::content_type::{negotiate, Format, MetadataLevel, PayloadKind};
///
/// let format = negotiate(Some("application/json;odata.metadata=full"), None, PayloadKind::Entities).unwrap();
/// assert_eq!(format, Format::Json(MetadataLevel::Full));
/// assert!(negotiate(Some("application/atom+xml"), None, PayloadKind::Value).is_err());
/// ```
pub fn negotiate(
    accept: Option<&str>,
    format_option: Option<&str>,
    kind: PayloadKind,
) -> Result<Format, ServiceError> {
    let requested = match format_option {
        Some("json") => JSON,
        Some("atom") => ATOM,
        Some("xml") => XML,
        Some(other) => other,
        None => accept.unwrap_or_default(),
    };
    if requested.trim().is_empty() {
        return Ok(kind.default_format());
    }

    let mut ranges: Vec<MediaRange> = requested.split(',').filter_map(MediaRange::parse).collect();
    ranges.sort_by(|a, b| b.quality.total_cmp(&a.quality));
    ranges
        .iter()
        .filter(|range| range.quality > 0.0)
        .find_map(|range| range.format_for(kind))
        .ok_or_else(|| ServiceError::UnsupportedMediaType {
            message: "Unsupported media type requested.".to_string(),
        })
}

/// Only JSON request bodies are read. An absent content type is accepted for empty bodies.
pub fn check_request_body(content_type: Option<&str>, body: &[u8]) -> Result<(), ServiceError> {
    let Some(content_type) = content_type else {
        return if body.iter().all(u8::is_ascii_whitespace) {
            Ok(())
        } else {
            Err(ServiceError::UnsupportedMediaType {
                message: "A request with a body must specify a Content-Type.".to_string(),
            })
        };
    };
    match MediaRange::parse(content_type) {
        Some(range) if range.essence == JSON => Ok(()),
        _ => Err(ServiceError::UnsupportedMediaType {
            message: format!("Content-Type '{content_type}' is not supported for this request."),
        }),
    }
}

/// `Content-Type` header value for a response in `format`.
pub fn header_value(format: Format, feed: bool) -> String {
    match format {
        Format::Json(level) => format!("{JSON};odata.metadata={}", level.as_str()),
        Format::Atom if feed => format!("{ATOM};type=feed;charset=utf-8"),
        Format::Atom => format!("{ATOM};type=entry;charset=utf-8"),
        Format::Xml => format!("{XML};charset=utf-8"),
        Format::Text => format!("{TEXT};charset=utf-8"),
    }
}
