//! URI literals: key predicates, function parameters, and ETag components.

use crate::model::{PrimitiveKind, Value};
use chrono::DateTime;
use uuid::Uuid;

/// Parses a literal without a target type, inferring the narrowest kind.
///
/// ```rust
/// use odata_service::model::Value;
/// use odata_service::uri::literal::parse_literal;
///
/// assert_eq!(parse_literal("42"), Some(Value::Int32(42)));
/// assert_eq!(parse_literal("42L"), Some(Value::Int64(42)));
/// assert_eq!(parse_literal("'it''s'"), Some(Value::String("it's".into())));
/// assert_eq!(parse_literal("nope"), None);
/// ```
pub fn parse_literal(text: &str) -> Option<Value> {
    let text = text.trim();
    match text {
        "" => return None,
        "null" => return Some(Value::Null),
        "true" => return Some(Value::Boolean(true)),
        "false" => return Some(Value::Boolean(false)),
        _ => {}
    }

    if let Some(inner) = quoted(text) {
        return unescape(inner).map(Value::String);
    }
    if let Some(inner) = text.strip_prefix("guid").and_then(quoted) {
        return Uuid::parse_str(inner).ok().map(Value::Guid);
    }
    if let Some(inner) = text.strip_prefix("datetimeoffset").and_then(quoted) {
        return DateTime::parse_from_rfc3339(inner)
            .ok()
            .map(Value::DateTimeOffset);
    }
    if let Some(digits) = text.strip_suffix(['L', 'l']) {
        return digits.parse::<i64>().ok().map(Value::Int64);
    }
    if let Some(number) = text.strip_suffix(['d', 'D']) {
        return number.parse::<f64>().ok().map(Value::Double);
    }
    if let Ok(v) = text.parse::<i32>() {
        return Some(Value::Int32(v));
    }
    if let Ok(v) = text.parse::<i64>() {
        return Some(Value::Int64(v));
    }
    if is_decimal(text) {
        return text.parse::<f64>().ok().map(Value::Double);
    }
    if text.len() == 36 {
        if let Ok(guid) = Uuid::parse_str(text) {
            return Some(Value::Guid(guid));
        }
    }
    DateTime::parse_from_rfc3339(text)
        .ok()
        .map(Value::DateTimeOffset)
}

/// Parses a literal and converts it to `kind`.
pub fn parse_typed(text: &str, kind: PrimitiveKind) -> Option<Value> {
    parse_literal(text)?.coerce(kind)
}

/// Formats a value as a URI literal.
pub fn format_literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Boolean(v) => v.to_string(),
        Value::Int32(v) => v.to_string(),
        Value::Int64(v) => v.to_string(),
        Value::Double(v) if v.fract() == 0.0 && v.is_finite() => format!("{v:.1}"),
        Value::Double(v) => v.to_string(),
        Value::String(v) => format!("'{}'", v.replace('\'', "''")),
        Value::Guid(v) => v.to_string(),
        Value::DateTimeOffset(v) => v.to_rfc3339(),
        Value::Complex(c) => format!("{}(...)", c.type_name),
        Value::Collection(items) => {
            let parts: Vec<String> = items.iter().map(format_literal).collect();
            format!("[{}]", parts.join(","))
        }
    }
}

fn quoted(text: &str) -> Option<&str> {
    text.strip_prefix('\'')?.strip_suffix('\'')
}

/// Collapses doubled quotes; a lone quote inside the literal is malformed.
fn unescape(inner: &str) -> Option<String> {
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.next_if_eq(&'\'').is_none() {
                return None;
            }
        }
        out.push(c);
    }
    Some(out)
}

fn is_decimal(text: &str) -> bool {
    let body = text.strip_prefix(['-', '+']).unwrap_or(text);
    !body.is_empty()
        && body.chars().next().is_some_and(|c| c.is_ascii_digit())
        && body
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '-' | '+'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numbers() {
        assert_eq!(parse_literal("-3"), Some(Value::Int32(-3)));
        assert_eq!(parse_literal("3000000000"), Some(Value::Int64(3_000_000_000)));
        assert_eq!(parse_literal("1.5"), Some(Value::Double(1.5)));
        assert_eq!(parse_literal("2d"), Some(Value::Double(2.0)));
        assert_eq!(parse_literal("1e3"), Some(Value::Double(1000.0)));
    }

    #[test]
    fn test_strings_and_quotes() {
        assert_eq!(parse_literal("''"), Some(Value::String(String::new())));
        assert_eq!(parse_literal("'a'b'"), None);
        assert_eq!(format_literal(&Value::from("it's")), "'it''s'");
    }

    #[test]
    fn test_guid_and_dates() {
        let guid = "0b4b2e1a-58e6-4a6b-9a3b-0c5d6f7e8a9b";
        assert!(matches!(parse_literal(guid), Some(Value::Guid(_))));
        assert!(matches!(
            parse_literal(&format!("guid'{guid}'")),
            Some(Value::Guid(_))
        ));
        assert!(matches!(
            parse_literal("2024-05-01T10:00:00Z"),
            Some(Value::DateTimeOffset(_))
        ));
    }

    #[test]
    fn test_typed_parsing() {
        assert_eq!(parse_typed("5", PrimitiveKind::Int64), Some(Value::Int64(5)));
        assert_eq!(parse_typed("'5'", PrimitiveKind::Int32), None);
        assert_eq!(parse_typed("null", PrimitiveKind::String), Some(Value::Null));
        assert_eq!(format_literal(&Value::Double(2.0)), "2.0");
    }
}
