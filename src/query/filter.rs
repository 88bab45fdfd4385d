//! Property filters: query arguments to predicates.

use crate::config::ArgumentNames;
use crate::error::AppError;
use crate::query::predicate::Predicate;
use crate::schema::{NestedSchema, ResourceSchema, IDENTITY_PATH};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Ordered property path to filter value.
pub type FilterSet = Map<String, Value>;

/// Map an argument name onto a document path: the identifier alias (alone or
/// as a suffix) addresses `__identity`.
pub fn canonical_path(name: &str, alias: &str) -> String {
    if name == alias {
        return IDENTITY_PATH.to_string();
    }
    let suffix = format!(".{}", alias);
    match name.strip_suffix(&suffix) {
        Some(prefix) => format!("{}.{}", prefix, IDENTITY_PATH),
        None => name.to_string(),
    }
}

/// Default filters overlaid with query arguments that address persisted properties.
pub fn filter_set(
    defaults: &FilterSet,
    args: &Map<String, Value>,
    schema: &ResourceSchema,
    arguments: &ArgumentNames,
    alias: &str,
) -> FilterSet {
    let query = args.iter().filter(|(name, _)| !arguments.is_reserved(name));
    let mut set = FilterSet::new();
    for (name, value) in defaults.iter().chain(query) {
        let path = canonical_path(name, alias);
        if schema.is_persistent_path(&path, false) {
            set.insert(path, value.clone());
        }
    }
    set
}

/// AND of one predicate per filter entry.
pub fn build_filter_predicate(
    filters: &FilterSet,
    schema: &ResourceSchema,
) -> Result<Option<Predicate>, AppError> {
    let mut predicates = Vec::with_capacity(filters.len());
    for (path, value) in filters {
        let predicate = if path == IDENTITY_PATH || path.ends_with(&format!(".{}", IDENTITY_PATH)) {
            identity_match(path, value, schema)?
        } else {
            value_predicate(path, value, schema)
        };
        predicates.push(predicate);
    }
    Ok(Predicate::all(predicates))
}

/// Plain decimal or exponent notation, optionally signed and padded.
fn is_numeric(s: &str) -> bool {
    static NUMERIC: OnceLock<Regex> = OnceLock::new();
    let re = NUMERIC.get_or_init(|| {
        Regex::new(r"^\s*[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?\s*$").expect("static numeric pattern")
    });
    re.is_match(s)
}

fn value_predicate(path: &str, value: &Value, schema: &ResourceSchema) -> Predicate {
    if let Value::Array(items) = value {
        return Predicate::any(items.iter().map(|v| value_predicate(path, v, schema)).collect());
    }
    let is_reference = schema
        .resolve(path)
        .map(|p| p.reference_type().is_some())
        .unwrap_or(false);
    match schema.coerce(path, value.clone()) {
        Value::Null => Predicate::IsNull(path.to_string()),
        Value::String(s) if !is_reference && !is_numeric(&s) => {
            Predicate::like(path, s, false)
        }
        other => Predicate::equals(path, other),
    }
}

/// Expand a filter on `<prefix>.__identity`.
pub fn identity_match(path: &str, value: &Value, schema: &ResourceSchema) -> Result<Predicate, AppError> {
    let prefix = path
        .strip_suffix(IDENTITY_PATH)
        .map(|p| p.trim_end_matches('.'))
        .unwrap_or("");
    let target = if prefix.is_empty() {
        schema
    } else {
        let prop = schema
            .resolve(prefix)
            .ok_or_else(|| AppError::BadRequest(format!("unknown property path '{}'", prefix)))?;
        match &prop.nested {
            Some(NestedSchema::Reference(_)) => {
                return Ok(Predicate::equals(prefix, scalar_identity(value, path)?))
            }
            Some(NestedSchema::Inline(inner)) => inner,
            None => return Err(AppError::BadRequest(format!("'{}' has no identity", prefix))),
        }
    };
    let qualify = |component: &str| {
        if prefix.is_empty() {
            component.to_string()
        } else {
            format!("{}.{}", prefix, component)
        }
    };
    match target.identity.as_slice() {
        [] => Err(AppError::BadRequest(format!("'{}' has no identity", path))),
        [single] => {
            let component = qualify(single);
            let value = match value {
                Value::Object(map) => map.get(single).cloned().ok_or_else(|| {
                    AppError::BadRequest(format!("missing identity component '{}'", single))
                })?,
                other => scalar_identity(other, path)?,
            };
            Ok(Predicate::equals(component.clone(), schema.coerce(&component, value)))
        }
        components => {
            let Value::Object(map) = value else {
                return Err(AppError::BadRequest(format!(
                    "'{}' is a compound identity; expected components {:?}",
                    path, components
                )));
            };
            let mut parts = Vec::with_capacity(components.len());
            for c in components {
                let v = map
                    .get(c)
                    .ok_or_else(|| AppError::BadRequest(format!("missing identity component '{}'", c)))?;
                let component = qualify(c);
                let v = schema.coerce(&component, v.clone());
                parts.push(Predicate::equals(component, v));
            }
            Ok(Predicate::And(parts))
        }
    }
}

fn scalar_identity(value: &Value, path: &str) -> Result<Value, AppError> {
    match value {
        Value::Array(items) if items.len() == 1 => Ok(items[0].clone()),
        Value::Object(_) | Value::Array(_) | Value::Null => Err(AppError::BadRequest(format!(
            "'{}' expects a single identifier",
            path
        ))),
        scalar => Ok(scalar.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TypeConfig;
    use crate::schema::reflect::tests::{entity, fixture_registry, prop};
    use crate::schema::{reflect, TypeRegistry};
    use serde_json::json;

    fn schema() -> ResourceSchema {
        reflect(&fixture_registry(), "AggregateRoot", "uuid").unwrap()
    }

    fn args(v: Value) -> Map<String, Value> {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn alias_maps_to_identity_path() {
        assert_eq!(canonical_path("uuid", "uuid"), "__identity");
        assert_eq!(canonical_path("entities.uuid", "uuid"), "entities.__identity");
        assert_eq!(canonical_path("title", "uuid"), "title");
    }

    #[test]
    fn only_persisted_paths_survive_and_query_overrides_defaults() {
        let defaults = args(json!({"email": "%@example.com"}));
        let set = filter_set(
            &defaults,
            &args(json!({"email": "x", "title": "Foo", "nope": 1, "limit": "3", "otherAggregate.uuid": "id"})),
            &schema(),
            &ArgumentNames::default(),
            "uuid",
        );
        assert_eq!(
            Value::Object(set),
            json!({"email": "x", "title": "Foo", "otherAggregate.__identity": "id"})
        );
    }

    #[test]
    fn strings_use_case_insensitive_like_and_numbers_equality() {
        let filters = args(json!({"title": "Fo%", "email": "42"}));
        let p = build_filter_predicate(&filters, &schema()).unwrap().unwrap();
        assert_eq!(
            p,
            Predicate::And(vec![
                Predicate::like("title", "Fo%", false),
                Predicate::equals("email", json!("42")),
            ])
        );
        let words = args(json!({"title": "infinity", "email": "NaN"}));
        let p = build_filter_predicate(&words, &schema()).unwrap().unwrap();
        assert_eq!(
            p,
            Predicate::And(vec![
                Predicate::like("title", "infinity", false),
                Predicate::like("email", "NaN", false),
            ])
        );
    }

    #[test]
    fn numeric_strings_are_plain_decimals() {
        for s in ["42", "-1.5", ".5", "3.", "1e10", "+2E-3", " 7 "] {
            assert!(is_numeric(s), "{}", s);
        }
        for s in ["inf", "infinity", "NaN", "-inf", "1.2.3", "0x1A", "", "e5"] {
            assert!(!is_numeric(s), "{}", s);
        }
    }

    #[test]
    fn references_compare_the_stored_identifier() {
        let filters = args(json!({"otherAggregate.__identity": "abc"}));
        let p = build_filter_predicate(&filters, &schema()).unwrap().unwrap();
        assert_eq!(p, Predicate::equals("otherAggregate", json!("abc")));
    }

    #[test]
    fn inline_entities_match_on_their_own_identity() {
        let filters = args(json!({"entities.__identity": "e1"}));
        let p = build_filter_predicate(&filters, &schema()).unwrap().unwrap();
        assert_eq!(p, Predicate::equals("entities.__identity", json!("e1")));
    }

    #[test]
    fn compound_identity_requires_all_components() {
        let registry = TypeRegistry::from_configs(vec![TypeConfig {
            identity: vec!["code".into(), "year".into()],
            ..entity("Edition", true, vec![prop("code", "string"), prop("year", "integer")])
        }])
        .unwrap();
        let schema = reflect(&registry, "Edition", "uuid").unwrap();
        let ok = identity_match("__identity", &json!({"code": "X", "year": "2024"}), &schema).unwrap();
        assert_eq!(
            ok,
            Predicate::And(vec![
                Predicate::equals("code", json!("X")),
                Predicate::equals("year", json!(2024)),
            ])
        );
        assert!(matches!(
            identity_match("__identity", &json!("X"), &schema),
            Err(AppError::BadRequest(_))
        ));
        assert!(identity_match("__identity", &json!({"code": "X"}), &schema).is_err());
    }
}
