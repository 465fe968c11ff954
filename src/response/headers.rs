//! Header normalization
//!
//! Raw wire headers arrive as an ordered list that may repeat a name with
//! different casings. [`NormalizedHeaders`] folds them into one entry per
//! lowercase name, keeping the first casing seen. [`HeaderSet`] is the
//! case-preserving, case-insensitive container exposed on responses.

use std::collections::HashMap;

/// Single-valued headers: repeats after the first occurrence are dropped
const NO_DUPLICATES: &[&str] = &[
    "age",
    "authorization",
    "content-length",
    "content-type",
    "etag",
    "expires",
    "from",
    "host",
    "if-modified-since",
    "if-unmodified-since",
    "last-modified",
    "location",
    "max-forwards",
    "proxy-authorization",
    "referer",
    "retry-after",
    "server",
    "user-agent",
];

fn is_single_valued(lower: &str) -> bool {
    NO_DUPLICATES.contains(&lower)
}

/// Separator used when a repeated header is folded into one value
fn list_separator(lower: &str) -> &'static str {
    if lower == "cookie" {
        "; "
    } else {
        ", "
    }
}

/// Ordered wire-level headers, duplicates and mixed casing allowed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawHeaders(Vec<(String, String)>);

impl RawHeaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the flat `name, value, name, value, ...` representation.
    /// A trailing name without a value is dropped.
    pub fn from_flat<I, S>(flat: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut iter = flat.into_iter();
        let mut pairs = Vec::new();
        while let (Some(name), Some(value)) = (iter.next(), iter.next()) {
            pairs.push((name.into(), value.into()));
        }
        Self(pairs)
    }

    pub fn from_pairs<I, N, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        )
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.push((name.into(), value.into()));
    }

    /// First value for `name`, compared case-insensitively
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Back to the flat alternating representation
    pub fn to_flat(&self) -> Vec<String> {
        self.0
            .iter()
            .flat_map(|(n, v)| [n.clone(), v.clone()])
            .collect()
    }
}

/// A header after normalization: first-seen casing plus its value(s)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedHeader {
    pub name: String,
    pub values: Vec<String>,
}

impl NormalizedHeader {
    /// All values folded into one: `"; "` for `cookie`, `", "` otherwise
    pub fn joined(&self) -> String {
        self.values
            .join(list_separator(&self.name.to_ascii_lowercase()))
    }
}

/// One entry per lowercase header name, in first-seen order
#[derive(Debug, Clone, Default)]
pub struct NormalizedHeaders {
    entries: Vec<NormalizedHeader>,
    index: HashMap<String, usize>,
}

impl NormalizedHeaders {
    pub fn normalize(raw: &RawHeaders) -> Self {
        let mut normalized = Self::default();

        for (name, value) in raw.iter() {
            let lower = name.to_ascii_lowercase();
            match normalized.index.get(&lower) {
                Some(&idx) => {
                    if !is_single_valued(&lower) {
                        normalized.entries[idx].values.push(value.to_string());
                    }
                }
                None => {
                    normalized.index.insert(lower, normalized.entries.len());
                    normalized.entries.push(NormalizedHeader {
                        name: name.to_string(),
                        values: vec![value.to_string()],
                    });
                }
            }
        }

        normalized
    }

    /// Canonical (first-seen) casing for a header name
    pub fn canonical_name(&self, name: &str) -> Option<&str> {
        self.lookup(name).map(|h| h.name.as_str())
    }

    pub fn values(&self, name: &str) -> &[String] {
        self.lookup(name).map(|h| h.values.as_slice()).unwrap_or(&[])
    }

    pub fn iter(&self) -> impl Iterator<Item = &NormalizedHeader> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn lookup(&self, name: &str) -> Option<&NormalizedHeader> {
        self.index
            .get(&name.to_ascii_lowercase())
            .map(|&idx| &self.entries[idx])
    }
}

/// Response header container.
///
/// Lookups ignore case; enumeration yields names as they were set. Unlike
/// a plain map, a name may hold several entries (see [`HeaderSet::append`]).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    entries: Vec<(String, String)>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace every entry for `name` with a single one.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        match self
            .entries
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(&name))
        {
            Some(pos) => {
                self.entries[pos].1 = value.into();
                let mut seen = false;
                self.entries.retain(|(n, _)| {
                    if !n.eq_ignore_ascii_case(&name) {
                        return true;
                    }
                    let keep = !seen;
                    seen = true;
                    keep
                });
            }
            None => self.entries.push((name, value.into())),
        }
    }

    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.entries.push((name.into(), value.into()));
    }

    /// Remove every entry for `name`; returns whether anything was removed
    pub fn delete(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        before != self.entries.len()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Entries in insertion order with their original casing
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_from_flat_drops_dangling_name() {
        let raw = RawHeaders::from_flat(["A", "1", "B", "2", "C"]);
        assert_eq!(raw.len(), 2);
        assert_eq!(raw.get("b"), Some("2"));
        assert_eq!(raw.to_flat(), vec!["A", "1", "B", "2"]);
    }

    #[test]
    fn test_first_casing_and_value_win() {
        let raw = RawHeaders::from_flat([
            "Content-Type",
            "text/plain",
            "content-type",
            "text/html",
        ]);
        let normalized = NormalizedHeaders::normalize(&raw);

        assert_eq!(normalized.len(), 1);
        assert_eq!(normalized.canonical_name("CONTENT-TYPE"), Some("Content-Type"));
        assert_eq!(normalized.values("content-type"), ["text/plain"]);
    }

    #[test]
    fn test_set_cookie_accumulates() {
        let raw = RawHeaders::from_flat([
            "Set-Cookie",
            "a=1",
            "X-Other",
            "x",
            "set-cookie",
            "b=2",
        ]);
        let normalized = NormalizedHeaders::normalize(&raw);

        assert_eq!(normalized.canonical_name("set-cookie"), Some("Set-Cookie"));
        assert_eq!(normalized.values("set-cookie"), ["a=1", "b=2"]);
        let names: Vec<_> = normalized.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, ["Set-Cookie", "X-Other"]);
    }

    #[test]
    fn test_repeated_headers_accumulate() {
        let raw = RawHeaders::from_flat([
            "Vary", "Accept", "vary", "Origin", "Cookie", "a=1", "cookie", "b=2",
        ]);
        let normalized = NormalizedHeaders::normalize(&raw);

        assert_eq!(normalized.values("vary"), ["Accept", "Origin"]);
        let joined: Vec<_> = normalized.iter().map(|h| h.joined()).collect();
        assert_eq!(joined, vec!["Accept, Origin", "a=1; b=2"]);
    }

    #[test]
    fn test_empty_input() {
        let normalized = NormalizedHeaders::normalize(&RawHeaders::new());
        assert!(normalized.is_empty());
        assert!(normalized.values("anything").is_empty());
    }

    #[test]
    fn test_header_set_operations() {
        let mut headers = HeaderSet::new();
        headers.append("Set-Cookie", "a=1");
        headers.append("set-cookie", "b=2");
        headers.set("X-Trace", "1");

        assert_eq!(headers.get_all("SET-COOKIE"), ["a=1", "b=2"]);

        headers.set("Set-Cookie", "c=3");
        assert_eq!(headers.get_all("set-cookie"), ["c=3"]);

        assert!(headers.delete("set-cookie"));
        assert!(!headers.delete("set-cookie"));
        assert_eq!(headers.len(), 1);
        assert_eq!(headers.iter().next(), Some(("X-Trace", "1")));
    }

    proptest! {
        #[test]
        fn prop_one_entry_per_lowercase_name(
            pairs in proptest::collection::vec(("[A-Za-z]{1,3}", "[a-z0-9]{0,4}"), 0..24)
        ) {
            let raw = RawHeaders::from_pairs(pairs.clone());
            let normalized = NormalizedHeaders::normalize(&raw);

            let mut lowers: Vec<String> = pairs.iter().map(|(n, _)| n.to_ascii_lowercase()).collect();
            lowers.sort();
            lowers.dedup();
            prop_assert_eq!(normalized.len(), lowers.len());

            for header in normalized.iter() {
                let first = pairs
                    .iter()
                    .find(|(n, _)| n.eq_ignore_ascii_case(&header.name))
                    .unwrap();
                prop_assert_eq!(&header.name, &first.0);
                prop_assert_eq!(&header.values[0], &first.1);
            }
        }
    }
}
