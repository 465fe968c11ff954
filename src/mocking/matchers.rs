//! Request matchers
//!
//! Every matcher is a closed set of shapes (literal, wildcard, regex,
//! predicate, ...) sharing one `accepts` check. Construction validates the
//! shape so that a bad pattern fails when the interceptor is declared, long
//! before any request is made.

use crate::utils::errors::{EngineError, Result};
use bytes::Bytes;
use regex::Regex;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use wildmatch::WildMatch;

pub type StrPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;
pub type QueryPredicate = Arc<dyn Fn(&[(String, String)]) -> bool + Send + Sync>;
pub type BodyPredicate = Arc<dyn Fn(&[u8]) -> bool + Send + Sync>;

/// Matcher for a single string value (path, header value, host)
#[derive(Clone)]
pub enum ValueMatcher {
    Any,
    Literal(String),
    Wildcard { pattern: String, matcher: WildMatch },
    Pattern(Regex),
    Predicate(StrPredicate),
}

impl ValueMatcher {
    pub fn literal(value: impl Into<String>) -> Self {
        ValueMatcher::Literal(value.into())
    }

    /// `*` matches any run of characters, `?` exactly one
    pub fn wildcard(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let matcher = WildMatch::new(&pattern);
        ValueMatcher::Wildcard { pattern, matcher }
    }

    pub fn pattern(regex: &str) -> Result<Self> {
        Regex::new(regex)
            .map(ValueMatcher::Pattern)
            .map_err(|e| EngineError::MatcherConfiguration(format!("bad pattern '{}': {}", regex, e)))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        ValueMatcher::Predicate(Arc::new(f))
    }

    /// Path matcher from its declared text: `*` makes a wildcard, otherwise
    /// the path must be a literal starting with `/`.
    pub fn path(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(EngineError::MatcherConfiguration("empty path".to_string()));
        }
        if path.contains('*') {
            return Ok(Self::wildcard(path));
        }
        if !path.starts_with('/') {
            return Err(EngineError::MatcherConfiguration(format!(
                "path '{}' must start with '/'",
                path
            )));
        }
        Ok(Self::literal(path))
    }

    /// Host matcher: wildcard when it contains `*`, literal otherwise
    pub fn host(pattern: &str) -> Self {
        if pattern.contains('*') {
            Self::wildcard(pattern.to_ascii_lowercase())
        } else {
            Self::literal(pattern.to_ascii_lowercase())
        }
    }

    pub fn accepts(&self, value: &str) -> bool {
        match self {
            ValueMatcher::Any => true,
            ValueMatcher::Literal(expected) => expected == value,
            ValueMatcher::Wildcard { matcher, .. } => matcher.matches(value),
            ValueMatcher::Pattern(regex) => regex.is_match(value),
            ValueMatcher::Predicate(f) => f(value),
        }
    }
}

impl fmt::Debug for ValueMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueMatcher::Any => f.write_str("*"),
            ValueMatcher::Literal(s) => write!(f, "{}", s),
            ValueMatcher::Wildcard { pattern, .. } => write!(f, "{}", pattern),
            ValueMatcher::Pattern(r) => write!(f, "/{}/", r.as_str()),
            ValueMatcher::Predicate(_) => f.write_str("<fn>"),
        }
    }
}

impl From<&str> for ValueMatcher {
    fn from(s: &str) -> Self {
        ValueMatcher::literal(s)
    }
}

impl From<String> for ValueMatcher {
    fn from(s: String) -> Self {
        ValueMatcher::Literal(s)
    }
}

impl From<Regex> for ValueMatcher {
    fn from(regex: Regex) -> Self {
        ValueMatcher::Pattern(regex)
    }
}

/// Decode a query string into ordered key/value pairs
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Matcher for the request query string
#[derive(Clone, Default)]
pub enum QueryMatcher {
    /// The request must carry no query parameters
    #[default]
    None,
    Any,
    /// Same pairs in any order
    Exact(Vec<(String, String)>),
    /// At least these pairs
    Partial(Vec<(String, String)>),
    Predicate(QueryPredicate),
}

impl QueryMatcher {
    pub fn exact<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        QueryMatcher::Exact(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn partial<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        QueryMatcher::Partial(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&[(String, String)]) -> bool + Send + Sync + 'static,
    {
        QueryMatcher::Predicate(Arc::new(f))
    }

    pub fn accepts(&self, query: Option<&str>) -> bool {
        let actual = query.map(parse_query).unwrap_or_default();
        match self {
            QueryMatcher::None => actual.is_empty(),
            QueryMatcher::Any => true,
            QueryMatcher::Exact(expected) => {
                let mut expected = expected.clone();
                let mut actual = actual;
                expected.sort();
                actual.sort();
                expected == actual
            }
            QueryMatcher::Partial(expected) => expected.iter().all(|pair| actual.contains(pair)),
            QueryMatcher::Predicate(f) => f(&actual),
        }
    }
}

impl fmt::Debug for QueryMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryMatcher::None => f.write_str("None"),
            QueryMatcher::Any => f.write_str("Any"),
            QueryMatcher::Exact(p) => f.debug_tuple("Exact").field(p).finish(),
            QueryMatcher::Partial(p) => f.debug_tuple("Partial").field(p).finish(),
            QueryMatcher::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}

/// Matcher for the fully buffered request body
#[derive(Clone)]
pub enum BodyMatcher {
    Exact(Bytes),
    /// Deep equality with a JSON body, or with a form-encoded body read as
    /// an object of strings
    Json(Value),
    Pattern(Regex),
    Predicate(BodyPredicate),
}

impl BodyMatcher {
    pub fn exact(body: impl Into<Bytes>) -> Self {
        BodyMatcher::Exact(body.into())
    }

    pub fn json(value: Value) -> Self {
        BodyMatcher::Json(value)
    }

    pub fn pattern(regex: &str) -> Result<Self> {
        Regex::new(regex)
            .map(BodyMatcher::Pattern)
            .map_err(|e| EngineError::MatcherConfiguration(format!("bad body pattern '{}': {}", regex, e)))
    }

    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&[u8]) -> bool + Send + Sync + 'static,
    {
        BodyMatcher::Predicate(Arc::new(f))
    }

    pub fn accepts(&self, body: &[u8]) -> bool {
        match self {
            BodyMatcher::Exact(expected) => expected.as_ref() == body,
            BodyMatcher::Json(expected) => match serde_json::from_slice::<Value>(body) {
                Ok(actual) => &actual == expected,
                Err(_) => form_as_json(body).map_or(false, |actual| &actual == expected),
            },
            BodyMatcher::Pattern(regex) => regex.is_match(&String::from_utf8_lossy(body)),
            BodyMatcher::Predicate(f) => f(body),
        }
    }
}

fn form_as_json(body: &[u8]) -> Option<Value> {
    let text = std::str::from_utf8(body).ok()?;
    if !text.contains('=') {
        return None;
    }
    let object = parse_query(text)
        .into_iter()
        .map(|(k, v)| (k, Value::String(v)))
        .collect();
    Some(Value::Object(object))
}

impl fmt::Debug for BodyMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BodyMatcher::Exact(b) => write!(f, "Exact({} bytes)", b.len()),
            BodyMatcher::Json(v) => write!(f, "Json({})", v),
            BodyMatcher::Pattern(r) => write!(f, "Pattern(/{}/)", r.as_str()),
            BodyMatcher::Predicate(_) => f.write_str("Predicate(<fn>)"),
        }
    }
}
