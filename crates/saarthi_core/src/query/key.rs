//! Query keys.
//!
//! A key is an ordered list of JSON segments. Equality and hashing go through
//! the canonical serialization, so two keys built from the same values are the
//! same key no matter how their parameter records were assembled.

use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Canonical identifier for a cached remote resource.
#[derive(Debug, Clone)]
pub struct QueryKey {
    segments: Vec<Value>,
    canonical: String,
}

impl QueryKey {
    /// Starts a key with its first (usually path-like) segment.
    pub fn new(root: impl Into<String>) -> Self {
        Self::from_segments(vec![Value::String(root.into())])
    }

    pub fn from_segments(segments: Vec<Value>) -> Self {
        let segments: Vec<Value> = segments.into_iter().map(sorted).collect();
        let canonical = Value::Array(segments.clone()).to_string();
        Self { segments, canonical }
    }

    /// Appends one segment. Anything serializable works; a value that fails to
    /// serialize becomes `null`.
    pub fn with(mut self, segment: impl Serialize) -> Self {
        self.segments
            .push(serde_json::to_value(segment).unwrap_or(Value::Null));
        Self::from_segments(self.segments)
    }

    pub fn segments(&self) -> &[Value] {
        &self.segments
    }

    pub fn canonical(&self) -> &str {
        &self.canonical
    }

    /// True when `prefix`'s segments are the leading segments of this key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        prefix.segments.len() <= self.segments.len()
            && prefix
                .segments
                .iter()
                .zip(&self.segments)
                .all(|(a, b)| a == b)
    }
}

/// Rebuilds objects with their fields in key order, at every depth.
/// `serde_json::Map` keeps insertion order when `preserve_order` is enabled
/// anywhere in the dependency graph.
fn sorted(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(String, Value)> = map.into_iter().collect();
            fields.sort_by(|a, b| a.0.cmp(&b.0));
            Value::Object(fields.into_iter().map(|(k, v)| (k, sorted(v))).collect())
        }
        Value::Array(items) => Value::Array(items.into_iter().map(sorted).collect()),
        other => other,
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        self.canonical == other.canonical
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.canonical.hash(state);
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.canonical)
    }
}

/// The keys used by the Saarthi screens.
pub mod keys {
    use super::QueryKey;
    use uuid::Uuid;

    pub fn emotions() -> QueryKey {
        QueryKey::new("/api/krishna-path/emotions")
    }

    pub fn verse_count(emotion_id: Option<Uuid>) -> QueryKey {
        QueryKey::new("/api/krishna-path/verses/count").with(emotion_id)
    }

    pub fn chat_messages() -> QueryKey {
        QueryKey::new("/api/chat/messages")
    }

    pub fn current_thought() -> QueryKey {
        QueryKey::new("/api/thought-of-the-day/current")
    }

    pub fn me() -> QueryKey {
        QueryKey::new("/api/auth/me")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn parameter_records_compare_by_value() {
        let a = QueryKey::new("admin/users").with(json!({"search": "ram", "is_admin": true, "is_active": null}));
        let b = QueryKey::new("admin/users").with(json!({"is_active": null, "is_admin": true, "search": "ram"}));

        assert_eq!(a, b);
        assert_eq!(a.canonical(), b.canonical());

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn segment_types_are_distinguished() {
        let text = QueryKey::new("posts").with("1");
        let number = QueryKey::new("posts").with(1);
        assert_ne!(text, number);
    }

    #[test]
    fn prefix_matching() {
        let id = uuid::Uuid::new_v4();
        let count = keys::verse_count(Some(id));
        let root = QueryKey::new("/api/krishna-path/verses/count");

        assert!(count.starts_with(&root));
        assert!(count.starts_with(&count));
        assert!(!root.starts_with(&count));
        assert!(!keys::emotions().starts_with(&root));
    }

    #[test]
    fn missing_emotion_is_a_null_segment() {
        assert_eq!(
            keys::verse_count(None).canonical(),
            r#"["/api/krishna-path/verses/count",null]"#
        );
    }
}
