//! Schema description output and resource type name normalization.

use crate::schema::reflect::ResourceSchema;
use serde_json::Value;

const MODEL_NAMESPACE: &str = "::model::";
const CONTAINER_PREFIXES: &[&str] = &["std::vec::", "std::collections::"];

/// Strip the module path up to `::model::`, keeping a container prefix like `Vec<`.
pub fn normalize_type_name(type_name: &str) -> String {
    let mut name = type_name.to_string();
    for prefix in CONTAINER_PREFIXES {
        name = name.replace(prefix, "");
    }
    let Some(model) = name.find(MODEL_NAMESPACE) else {
        return name;
    };
    let container = match name.find('<') {
        Some(open) if open < model => &name[..=open],
        _ => "",
    };
    format!("{}{}", container, &name[model + MODEL_NAMESPACE.len()..])
}

/// Property name to descriptor mapping, as served by the describe action.
pub fn describe(schema: &ResourceSchema, normalize: bool) -> Value {
    let mut value = serde_json::to_value(schema).unwrap_or(Value::Null);
    if normalize {
        normalize_types(&mut value);
    }
    value
}

fn normalize_types(value: &mut Value) {
    let Value::Object(properties) = value else {
        return;
    };
    for descriptor in properties.values_mut() {
        let Value::Object(d) = descriptor else {
            continue;
        };
        for key in ["type", "elementType"] {
            if let Some(Value::String(t)) = d.get_mut(key) {
                *t = normalize_type_name(t);
            }
        }
        match d.get_mut("schema") {
            Some(Value::String(t)) => *t = normalize_type_name(t),
            Some(nested @ Value::Object(_)) => normalize_types(nested),
            _ => {}
        }
    }
}
