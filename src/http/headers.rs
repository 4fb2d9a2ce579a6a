//! HTTP headers handling
//!
//! This module provides a type for managing HTTP headers with case-insensitive
//! lookups and support for multiple values per header name.

use super::{Error, Result};
use std::fmt;

/// Normalize a header name the way lookups see it
///
/// The first letter of every alphabetic run is upper-cased, every other
/// letter lower-cased: `content-TYPE` becomes `Content-Type`.
pub fn title_case(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut prev_is_alpha = false;
    for c in name.chars() {
        if c.is_alphabetic() {
            if prev_is_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_is_alpha = true;
        } else {
            out.push(c);
            prev_is_alpha = false;
        }
    }
    out
}

#[derive(Debug, Clone)]
struct Entry {
    key: String,
    values: Vec<(String, String)>,
}

/// HTTP headers collection
///
/// Headers are grouped by their normalized name, in order of first
/// insertion, and support:
/// - Case-insensitive header name lookups
/// - Multiple values for the same header name (e.g. repeated `Set-Cookie`)
/// - The original casing of every name as it was added
///
/// Equality ignores name casing and the order of distinct names, but not the
/// order of values under one name.
#[derive(Debug, Clone, Default)]
pub struct Headers {
    entries: Vec<Entry>,
}

impl Headers {
    /// Create a new empty headers collection
    pub fn new() -> Self {
        Headers {
            entries: Vec::new(),
        }
    }

    fn entry(&self, name: &str) -> Option<&Entry> {
        let key = title_case(name);
        self.entries.iter().find(|e| e.key == key)
    }

    /// Add a header value, keeping any existing values for the name
    pub fn add(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let key = title_case(&name);
        let value = value.into();
        match self.entries.iter_mut().find(|e| e.key == key) {
            Some(entry) => entry.values.push((name, value)),
            None => self.entries.push(Entry {
                key,
                values: vec![(name, value)],
            }),
        }
    }

    /// Add every pair from `iter`
    pub fn add_all<I, K, V>(&mut self, iter: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in iter {
            self.add(name, value);
        }
    }

    /// Replace all values for a name with a single value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        self.remove(&name);
        self.add(name, value);
    }

    /// Add the value only if the name is absent
    ///
    /// Returns true if the value was added.
    pub fn setdefault(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let name = name.into();
        if self.contains(&name) {
            return false;
        }
        self.add(name, value);
        true
    }

    /// All values for a name, joined with `"; "`
    pub fn get(&self, name: &str) -> Option<String> {
        self.entry(name).map(|e| {
            e.values
                .iter()
                .map(|(_, v)| v.as_str())
                .collect::<Vec<_>>()
                .join("; ")
        })
    }

    /// The first value for a name
    pub fn get_first(&self, name: &str) -> Option<&str> {
        self.entry(name)
            .and_then(|e| e.values.first())
            .map(|(_, v)| v.as_str())
    }

    /// Get all values for a header (case-insensitive)
    pub fn get_all(&self, name: &str) -> Vec<&str> {
        self.entry(name)
            .map(|e| e.values.iter().map(|(_, v)| v.as_str()).collect())
            .unwrap_or_default()
    }

    /// Check if a header exists
    pub fn contains(&self, name: &str) -> bool {
        self.entry(name).is_some()
    }

    /// Remove all values for a name, returning how many were dropped
    pub fn remove(&mut self, name: &str) -> usize {
        let key = title_case(name);
        match self.entries.iter().position(|e| e.key == key) {
            Some(pos) => self.entries.remove(pos).values.len(),
            None => 0,
        }
    }

    /// Number of name/value pairs
    pub fn len(&self) -> usize {
        self.entries.iter().map(|e| e.values.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Distinct header names, as first added
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.values[0].0.as_str())
    }

    /// Iterate over all pairs with their original name casing
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .iter()
            .flat_map(|e| e.values.iter().map(|(n, v)| (n.as_str(), v.as_str())))
    }

    /// All pairs, with names either raw or title-cased
    pub fn items(&self, normalise_keys: bool) -> Vec<(String, String)> {
        self.entries
            .iter()
            .flat_map(|e| {
                e.values.iter().map(move |(n, v)| {
                    let name = if normalise_keys { &e.key } else { n };
                    (name.clone(), v.clone())
                })
            })
            .collect()
    }

    /// Title-cased pairs sorted by name, then value
    pub fn sorted_items(&self) -> Vec<(String, String)> {
        let mut items = self.items(true);
        items.sort();
        items
    }

    /// Parse a header line into name and value
    pub fn parse_header_line(line: &str) -> Result<(String, String)> {
        if let Some(colon_pos) = line.find(':') {
            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();

            if name.is_empty() {
                return Err(Error::InvalidHeader("Empty header name".to_string()));
            }

            Ok((name, value))
        } else {
            Err(Error::InvalidHeader(format!("No colon in header: {}", line)))
        }
    }
}

impl PartialEq for Headers {
    fn eq(&self, other: &Self) -> bool {
        if self.entries.len() != other.entries.len() {
            return false;
        }
        self.entries.iter().all(|mine| {
            other.entries.iter().any(|theirs| {
                mine.key == theirs.key
                    && mine.values.len() == theirs.values.len()
                    && mine
                        .values
                        .iter()
                        .zip(&theirs.values)
                        .all(|((_, a), (_, b))| a == b)
            })
        })
    }
}

impl Eq for Headers {}

impl fmt::Display for Headers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (name, value) in self.iter() {
            writeln!(f, "{}: {}", name, value)?;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Headers {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        let mut headers = Headers::new();
        headers.add_all(iter);
        headers
    }
}

impl<K: Into<String>, V: Into<String>, const N: usize> From<[(K, V); N]> for Headers {
    fn from(pairs: [(K, V); N]) -> Self {
        pairs.into_iter().collect()
    }
}
