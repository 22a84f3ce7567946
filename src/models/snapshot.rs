use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Segment holding an array's length: `co_drive_logs.@len`.
pub const LEN_SEGMENT: &str = "@len";
/// Segment holding a named array item's position: `controllers.Neural Pilot Alpha.@index`.
pub const INDEX_SEGMENT: &str = "@index";

/// Flat view of a status payload, keyed by dotted metric path
/// (`system_status.connection`, `controllers.Neural Pilot Alpha.accuracy`).
///
/// Arrays also record their length, so a shorter array in a fresh payload
/// is visible after a merge even though the tail keys survive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusSnapshot {
    values: BTreeMap<String, Value>,
}

impl StatusSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Flattens nested objects into dotted keys. Array items that carry a
    /// string `name` are keyed by it (with their position under
    /// [`INDEX_SEGMENT`]), everything else by position.
    pub fn from_json(value: &Value) -> Self {
        let mut snapshot = Self::new();
        flatten("", value, &mut snapshot);
        snapshot
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(Value::as_str)
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.values.get(key).and_then(Value::as_u64)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    /// Length of the array most recently flattened under `prefix`.
    pub fn array_len(&self, prefix: &str) -> Option<usize> {
        self.get_u64(&join(prefix, LEN_SEGMENT))
            .and_then(|n| usize::try_from(n).ok())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Entries below `prefix.`, with the prefix stripped.
    pub fn section<'a>(&'a self, prefix: &str) -> impl Iterator<Item = (&'a str, &'a Value)> + 'a {
        let lead = format!("{}.", prefix);
        let skip = lead.len();
        self.values
            .range(lead.clone()..)
            .take_while(move |(k, _)| k.starts_with(&lead))
            .map(move |(k, v)| (&k[skip..], v))
    }

    /// Per-key overwrite. Keys absent from `fresh` keep their old value.
    pub fn merge(&mut self, fresh: StatusSnapshot) {
        self.values.extend(fresh.values);
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut StatusSnapshot) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                flatten(&join(prefix, key), child, out);
            }
        }
        Value::Array(items) => {
            out.insert(join(prefix, LEN_SEGMENT), items.len());
            for (idx, item) in items.iter().enumerate() {
                match item.get("name").and_then(Value::as_str) {
                    Some(name) => {
                        let base = join(prefix, name);
                        out.insert(join(&base, INDEX_SEGMENT), idx);
                        flatten(&base, item, out);
                    }
                    None => flatten(&join(prefix, &idx.to_string()), item, out),
                }
            }
        }
        scalar => {
            let key = if prefix.is_empty() { "value" } else { prefix };
            out.insert(key, scalar.clone());
        }
    }
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{}.{}", prefix, segment)
    }
}
