//! Dotted-path access over the request context.
//!
//! The context is a JSON tree; a path like `request.metadata.task_type`
//! descends through maps, and numeric segments index into lists. Resolution
//! distinguishes a missing field from a present-but-falsy one.

use serde_json::{Map, Value};

/// Resolve a dotted path.
///
/// Returns `None` when any segment is missing; a present `null` resolves to
/// `Some(&Value::Null)`.
#[must_use]
pub fn resolve<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => {
                let index: usize = segment.parse().ok()?;
                items.get(index)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Whether a dotted path resolves at all.
#[must_use]
pub fn is_present(root: &Value, path: &str) -> bool {
    resolve(root, path).is_some()
}

/// Write a value at a dotted path, creating intermediate maps.
///
/// Intermediate non-map values are overwritten with maps; list segments are
/// not created by writes.
pub fn set(root: &mut Value, path: &str, value: Value) {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = root;

    for segment in &segments[..segments.len() - 1] {
        if !current.is_object() {
            *current = Value::Object(Map::new());
        }
        match current {
            Value::Object(map) => {
                current = map
                    .entry((*segment).to_string())
                    .or_insert_with(|| Value::Object(Map::new()));
            }
            _ => return,
        }
    }

    let last = segments[segments.len() - 1];
    if !current.is_object() {
        *current = Value::Object(Map::new());
    }
    if let Some(map) = current.as_object_mut() {
        map.insert(last.to_string(), value);
    }
}

/// Remove the value at a dotted path.
///
/// Returns true when something was removed.
pub fn delete(root: &mut Value, path: &str) -> bool {
    let segments: Vec<&str> = path.split('.').collect();
    let mut current = root;

    for segment in &segments[..segments.len() - 1] {
        current = match current {
            Value::Object(map) => match map.get_mut(*segment) {
                Some(next) => next,
                None => return false,
            },
            _ => return false,
        };
    }

    match current {
        Value::Object(map) => map.remove(segments[segments.len() - 1]).is_some(),
        _ => false,
    }
}
