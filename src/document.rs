//! Dotted-path access into stored JSON documents.

use crate::schema::IDENTITY_PATH;
use serde_json::Value;

/// All values reachable at `path`. Arrays met on the way, and at the end, are
/// flattened so a path through a collection yields one value per element.
pub fn values_at<'a>(doc: &'a Value, path: &str) -> Vec<&'a Value> {
    let mut current = vec![doc];
    for segment in path.split('.') {
        let mut next = Vec::new();
        for value in flatten(current) {
            if let Some(v) = value.get(segment) {
                next.push(v);
            }
        }
        current = next;
    }
    flatten(current)
}

fn flatten(values: Vec<&Value>) -> Vec<&Value> {
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        match v {
            Value::Array(items) => out.extend(items.iter()),
            other => out.push(other),
        }
    }
    out
}

/// First value at `path`, if any.
pub fn first_value_at<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    values_at(doc, path).into_iter().next()
}

/// Text form of a scalar identifier component.
pub fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Canonical identifier string of a document: the component itself for a single
/// identity, a JSON array of components for a compound one.
pub fn identifier_of(doc: &Value, identity: &[String]) -> Option<String> {
    match identity {
        [] => None,
        [single] => doc.get(single).and_then(scalar_text),
        many => {
            let parts: Option<Vec<Value>> = many.iter().map(|p| doc.get(p).cloned()).collect();
            parts.map(|p| Value::Array(p).to_string())
        }
    }
}

/// Identity of a document as exposed in cursor links: scalar or component mapping.
pub fn identity_value(doc: &Value, identity: &[String]) -> Option<Value> {
    match identity {
        [] => None,
        [single] => doc.get(single).cloned(),
        many => {
            let mut map = serde_json::Map::new();
            for p in many {
                map.insert(p.clone(), doc.get(p)?.clone());
            }
            Some(Value::Object(map))
        }
    }
}

/// Identifier of a stored reference: a bare string, or an object carrying
/// `__identity` or the exposed alias.
pub fn reference_identifier(value: &Value, alias: &str) -> Option<String> {
    match value {
        Value::Object(map) => map
            .get(IDENTITY_PATH)
            .or_else(|| map.get(alias))
            .and_then(scalar_text),
        other => scalar_text(other),
    }
}
