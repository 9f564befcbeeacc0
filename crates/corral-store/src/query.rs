//! In-memory node filters shared by the store and its callers.

use crate::types::Node;

/// A tag query term: a key alone matches any value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagFilter {
    /// Tag key.
    pub key: String,
    /// Required value, if any.
    pub value: Option<String>,
}

impl TagFilter {
    /// Match nodes carrying `key` with any value.
    #[must_use]
    pub fn key(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: None,
        }
    }

    /// Match nodes carrying `key=value`.
    #[must_use]
    pub fn pair(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: Some(value.into()),
        }
    }

    /// Returns true if the node carries this tag.
    #[must_use]
    pub fn matches(&self, node: &Node) -> bool {
        match (node.tags.get(&self.key), &self.value) {
            (Some(_), None) => true,
            (Some(actual), Some(wanted)) => actual == wanted,
            (None, _) => false,
        }
    }
}

/// Returns true if any of the filters matches the node.
#[must_use]
pub fn matches_any_tag(node: &Node, filters: &[TagFilter]) -> bool {
    filters.iter().any(|f| f.matches(node))
}

/// Case-insensitive `LIKE` match where `%` matches any run of characters.
///
/// Patterns without a `.` are also tried against the short host name, so
/// `compute-%` matches `compute-01.cluster`.
#[must_use]
pub fn name_matches(pattern: &str, name: &str) -> bool {
    let pattern = pattern.to_lowercase();
    let name = name.to_lowercase();
    if like(&pattern, &name) {
        return true;
    }
    if !pattern.contains('.') {
        if let Some((short, _)) = name.split_once('.') {
            return like(&pattern, short);
        }
    }
    false
}

fn like(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('%').collect();
    if parts.len() == 1 {
        return pattern == text;
    }

    let first = parts[0];
    let last = parts[parts.len() - 1];
    if !text.starts_with(first) || text.len() < first.len() + last.len() {
        return false;
    }

    let mut rest = &text[first.len()..];
    for part in &parts[1..parts.len() - 1] {
        match rest.find(part) {
            Some(pos) => rest = &rest[pos + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
