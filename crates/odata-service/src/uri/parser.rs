//! Lexical parsing of request URIs into raw segments and query options.

use crate::error::ServiceError;

/// One path segment before it is resolved against the model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSegment {
    pub identifier: String,
    /// Text between parentheses: `None` without parentheses, `Some("")` for `()`.
    pub parens: Option<String>,
}

impl RawSegment {
    pub fn has_key_text(&self) -> bool {
        self.parens.as_deref().is_some_and(|p| !p.trim().is_empty())
    }
}

/// A request URI split into decoded segments and query options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedUri {
    pub segments: Vec<RawSegment>,
    /// Decoded `name=value` pairs in request order.
    pub query: Vec<(String, String)>,
}

impl ParsedUri {
    /// Value of the first query option with this name.
    pub fn query_option(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Names of system (`$`-prefixed) query options.
    pub fn system_options(&self) -> impl Iterator<Item = &str> {
        self.query
            .iter()
            .map(|(n, _)| n.as_str())
            .filter(|n| n.starts_with('$'))
    }
}

/// Splits `uri` (absolute under `service_root`, or root-relative) into segments and
/// query options.
///
/// ```rust
/// use odata_service::uri::parser::parse_uri;
///
/// let uri = parse_uri("http://host/svc/Customers(1)/Orders?$top=2", "http://host/svc").unwrap();
/// assert_eq!(uri.segments.len(), 2);
/// assert_eq!(uri.segments[0].parens.as_deref(), Some("1"));
/// assert_eq!(uri.query_option("$top"), Some("2"));
/// ```
pub fn parse_uri(uri: &str, service_root: &str) -> Result<ParsedUri, ServiceError> {
    let relative = relative_path(uri, service_root)?;
    let (path, query) = match relative.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (relative, None),
    };

    let mut segments = Vec::new();
    let parts = split_path(path.trim_start_matches('/'))?;
    let count = parts.len();
    for (index, part) in parts.into_iter().enumerate() {
        if part.is_empty() {
            if index + 1 == count {
                break;
            }
            return Err(ServiceError::bad_path(
                "The request URI is not valid. Empty segments are not allowed.",
            ));
        }
        segments.push(parse_segment(&part)?);
    }

    let query = match query {
        Some(query) => parse_query(query)?,
        None => Vec::new(),
    };
    Ok(ParsedUri { segments, query })
}

fn relative_path<'a>(uri: &'a str, service_root: &str) -> Result<&'a str, ServiceError> {
    if !uri.contains("://") {
        let root_path = service_root
            .split_once("://")
            .and_then(|(_, rest)| rest.find('/').map(|i| &rest[i..]))
            .unwrap_or("")
            .trim_end_matches('/');
        if !root_path.is_empty() {
            if let Some(rest) = uri.strip_prefix(root_path) {
                if rest.is_empty() || rest.starts_with(['/', '?']) {
                    return Ok(rest);
                }
            }
        }
        return Ok(uri);
    }
    let root = service_root.trim_end_matches('/');
    match uri.strip_prefix(root) {
        Some(rest) if rest.is_empty() || rest.starts_with(['/', '?']) => Ok(rest),
        _ => Err(ServiceError::bad_path(format!(
            "The request URI '{uri}' is not valid because it is not based on '{root}/'."
        ))),
    }
}

/// Splits on `/` outside quotes, then percent-decodes each part.
fn split_path(path: &str) -> Result<Vec<String>, ServiceError> {
    if path.is_empty() {
        return Ok(Vec::new());
    }
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in path.chars() {
        match c {
            '\'' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            '/' if !in_quotes => parts.push(percent_decode(&std::mem::take(&mut current))?),
            _ => current.push(c),
        }
    }
    parts.push(percent_decode(&current)?);
    Ok(parts)
}

fn parse_segment(text: &str) -> Result<RawSegment, ServiceError> {
    let Some(open) = find_unquoted(text, '(') else {
        return Ok(RawSegment {
            identifier: text.to_string(),
            parens: None,
        });
    };
    let Some(inner) = text[open + 1..].strip_suffix(')') else {
        return Err(ServiceError::bad_path(format!(
            "Bad Request - Error in query syntax. The segment '{text}' has unbalanced parentheses."
        )));
    };
    let identifier = &text[..open];
    if identifier.is_empty() {
        return Err(ServiceError::bad_path(format!(
            "Bad Request - Error in query syntax. The segment '{text}' has no name."
        )));
    }
    Ok(RawSegment {
        identifier: identifier.to_string(),
        parens: Some(inner.to_string()),
    })
}

fn find_unquoted(text: &str, needle: char) -> Option<usize> {
    let mut in_quotes = false;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => in_quotes = !in_quotes,
            c if c == needle && !in_quotes => return Some(i),
            _ => {}
        }
    }
    None
}

/// Splits `Name=value,Other=value` (or a bare value) on commas outside quotes.
pub fn split_key_text(text: &str) -> Vec<(Option<String>, String)> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in text.chars() {
        match c {
            '\'' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|part| match find_unquoted(&part, '=') {
            Some(eq) => (
                Some(part[..eq].trim().to_string()),
                part[eq + 1..].trim().to_string(),
            ),
            None => (None, part.trim().to_string()),
        })
        .collect()
}

fn parse_query(query: &str) -> Result<Vec<(String, String)>, ServiceError> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            Ok((
                percent_decode(&name.replace('+', " "))?,
                percent_decode(&value.replace('+', " "))?,
            ))
        })
        .collect()
}

/// Decodes `%XX` escapes; the result must be valid UTF-8.
pub fn percent_decode(text: &str) -> Result<String, ServiceError> {
    if !text.contains('%') {
        return Ok(text.to_string());
    }
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|h| std::str::from_utf8(h).ok())
                .and_then(|h| u8::from_str_radix(h, 16).ok());
            match hex {
                Some(byte) => {
                    out.push(byte);
                    i += 3;
                    continue;
                }
                None => {
                    return Err(ServiceError::bad_path(format!(
                        "The request URI contains an invalid escape sequence in '{text}'."
                    )))
                }
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8(out).map_err(|_| {
        ServiceError::bad_path(format!(
            "The request URI contains an escape sequence in '{text}' that is not valid UTF-8."
        ))
    })
}
