//! Ordered, case-insensitive, multi-valued header container.
//!
//! # Design Decisions
//! - Names are stored lowercased; comparisons never depend on wire casing
//! - First-seen name order and per-name value order are preserved so a parsed
//!   message serializes back in the same order
//! - Canonical casing is applied only when writing a message out

use std::collections::HashMap;

/// Header name whose top value is pushed/popped by every relay.
pub const VIA: &str = "via";

/// A message's header set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    names: Vec<String>,
    values: HashMap<String, Vec<String>>,
}

impl Headers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value, registering the name if it was not present.
    pub fn add(&mut self, name: &str, value: impl Into<String>) {
        let key = name.to_ascii_lowercase();
        match self.values.get_mut(&key) {
            Some(values) => values.push(value.into()),
            None => {
                self.names.push(key.clone());
                self.values.insert(key, vec![value.into()]);
            }
        }
    }

    /// Replace every value of `name` with a single value.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let key = name.to_ascii_lowercase();
        if !self.values.contains_key(&key) {
            self.names.push(key.clone());
        }
        self.values.insert(key, vec![value.into()]);
    }

    /// All values of `name`, in insertion order.
    pub fn get_all(&self, name: &str) -> &[String] {
        self.values
            .get(&name.to_ascii_lowercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// First value of `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.get_all(name).first().map(String::as_str)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(&name.to_ascii_lowercase())
    }

    /// Every header whose name starts with `prefix`, in registration order.
    pub fn with_prefix(&self, prefix: &str) -> Vec<(&str, &[String])> {
        let prefix = prefix.to_ascii_lowercase();
        self.names
            .iter()
            .filter(|n| n.starts_with(&prefix))
            .filter_map(|n| self.values.get(n).map(|v| (n.as_str(), v.as_slice())))
            .collect()
    }

    /// Delete a header entirely. Returns whether it existed.
    pub fn remove(&mut self, name: &str) -> bool {
        let key = name.to_ascii_lowercase();
        let existed = self.values.remove(&key).is_some();
        if existed {
            self.names.retain(|n| *n != key);
        }
        existed
    }

    /// Insert `value` as the topmost value of `name`.
    ///
    /// A name seen for the first time is registered ahead of every other
    /// header, where a relay's own hop header belongs.
    pub fn push_top(&mut self, name: &str, value: impl Into<String>) {
        let key = name.to_ascii_lowercase();
        match self.values.get_mut(&key) {
            Some(values) => values.insert(0, value.into()),
            None => {
                self.names.insert(0, key.clone());
                self.values.insert(key, vec![value.into()]);
            }
        }
    }

    /// Remove and return the topmost value of `name`.
    ///
    /// A header line holding several comma-separated values only loses its
    /// first element.
    pub fn pop_top(&mut self, name: &str) -> Option<String> {
        let key = name.to_ascii_lowercase();
        let values = self.values.get_mut(&key)?;
        if values.is_empty() {
            return None;
        }

        let top = match split_first_value(&values[0]) {
            Some((first, rest)) => {
                let first = first.to_string();
                values[0] = rest.to_string();
                first
            }
            None => values.remove(0),
        };

        if values.is_empty() {
            self.values.remove(&key);
            self.names.retain(|n| *n != key);
        }
        Some(top)
    }

    pub fn push_via(&mut self, value: impl Into<String>) {
        self.push_top(VIA, value);
    }

    pub fn pop_via(&mut self) -> Option<String> {
        self.pop_top(VIA)
    }

    /// Iterate `(lowercase name, value)` pairs in serialization order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter().flat_map(move |name| {
            self.values
                .get(name)
                .into_iter()
                .flatten()
                .map(move |v| (name.as_str(), v.as_str()))
        })
    }

    /// Registered names in order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Split `a, b, c` into `("a", "b, c")`, ignoring commas inside quotes or
/// angle brackets. `None` when the value holds a single element.
fn split_first_value(value: &str) -> Option<(&str, &str)> {
    let mut in_quotes = false;
    let mut depth = 0usize;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            '<' if !in_quotes => depth += 1,
            '>' if !in_quotes => depth = depth.saturating_sub(1),
            ',' if !in_quotes && depth == 0 => {
                let rest = value[i + 1..].trim_start();
                if rest.is_empty() {
                    return None;
                }
                return Some((value[..i].trim_end(), rest));
            }
            _ => {}
        }
    }
    None
}

/// Expand a compact header form to its full lowercase name.
pub fn expand_compact(name: &str) -> Option<&'static str> {
    let full = match name {
        "i" => "call-id",
        "f" => "from",
        "t" => "to",
        "v" => "via",
        "l" => "content-length",
        "m" => "contact",
        "c" => "content-type",
        "k" => "supported",
        "s" => "subject",
        "e" => "content-encoding",
        "o" => "event",
        "r" => "refer-to",
        _ => return None,
    };
    Some(full)
}

/// Canonical casing used when writing a header name.
pub fn canonical_name(name: &str) -> String {
    let special = match name {
        "call-id" => Some("Call-ID"),
        "cseq" => Some("CSeq"),
        "www-authenticate" => Some("WWW-Authenticate"),
        "mime-version" => Some("MIME-Version"),
        "rseq" => Some("RSeq"),
        "rack" => Some("RAck"),
        "sip-etag" => Some("SIP-ETag"),
        "sip-if-match" => Some("SIP-If-Match"),
        _ => None,
    };
    if let Some(s) = special {
        return s.to_string();
    }

    name.split('-')
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}
