//! Schema reflection over the type catalog, bounded at aggregate boundaries.

use crate::config::ValidationRule;
use crate::error::ConfigError;
use crate::schema::catalog::TypeCatalog;
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::Value;
use std::collections::HashSet;

/// Distinguished path element addressing an entity's identity.
pub const IDENTITY_PATH: &str = "__identity";

/// Hard ceiling on nesting; reaching it means the type graph is misconfigured.
pub const MAX_RECURSION_DEPTH: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    Integer,
    Float,
    Boolean,
    DateTime,
    Array,
}

/// Simple types end a branch. Anything else is looked up in the catalog.
pub fn scalar_kind(type_name: &str) -> Option<ScalarKind> {
    match type_name.to_ascii_lowercase().as_str() {
        "string" | "str" | "text" => Some(ScalarKind::String),
        "integer" | "int" | "i32" | "i64" | "u32" | "u64" => Some(ScalarKind::Integer),
        "float" | "double" | "number" | "f32" | "f64" => Some(ScalarKind::Float),
        "boolean" | "bool" => Some(ScalarKind::Boolean),
        "datetime" | "date-time" | "date" => Some(ScalarKind::DateTime),
        "array" => Some(ScalarKind::Array),
        _ => None,
    }
}

/// UTC, fixed microsecond precision, so stored timestamps order lexically.
pub fn normalize_datetime(raw: &str) -> Option<String> {
    chrono::DateTime::parse_from_rfc3339(raw).ok().map(|d| {
        d.with_timezone(&chrono::Utc)
            .to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
    })
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(untagged)]
pub enum NestedSchema {
    Inline(ResourceSchema),
    /// Aggregate root or cycle break: rendered and stored by identifier.
    Reference(String),
}

#[derive(Clone, Debug, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    /// Exposed name.
    #[serde(skip)]
    pub name: String,
    /// Key inside stored documents.
    #[serde(skip)]
    pub path: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub element_type: Option<String>,
    pub transient: bool,
    pub identity: bool,
    pub multi_valued: bool,
    #[serde(rename = "schema", skip_serializing_if = "Option::is_none")]
    pub nested: Option<NestedSchema>,
    #[serde(skip)]
    pub validation: Option<ValidationRule>,
    #[serde(skip)]
    pub description: Option<String>,
}

impl PropertyDescriptor {
    fn technical(alias: &str) -> Self {
        PropertyDescriptor {
            name: alias.to_string(),
            path: IDENTITY_PATH.to_string(),
            type_name: "string".into(),
            element_type: None,
            transient: false,
            identity: true,
            multi_valued: false,
            nested: None,
            validation: None,
            description: None,
        }
    }

    pub fn is_technical_identity(&self) -> bool {
        self.path == IDENTITY_PATH
    }

    /// Kind of the value, or of each element for collections.
    pub fn scalar_kind(&self) -> Option<ScalarKind> {
        scalar_kind(self.element_type.as_deref().unwrap_or(&self.type_name))
    }

    pub fn inline_schema(&self) -> Option<&ResourceSchema> {
        match &self.nested {
            Some(NestedSchema::Inline(s)) => Some(s),
            _ => None,
        }
    }

    pub fn reference_type(&self) -> Option<&str> {
        match &self.nested {
            Some(NestedSchema::Reference(t)) => Some(t),
            _ => None,
        }
    }

    fn is_searchable(&self) -> bool {
        !self.transient
            && !self.identity
            && !self.multi_valued
            && self.nested.is_none()
            && self.scalar_kind() == Some(ScalarKind::String)
    }
}

/// Ordered property descriptors of one type.
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceSchema {
    pub type_name: String,
    pub properties: Vec<PropertyDescriptor>,
    /// Document paths of the identity components. Empty for value objects.
    pub identity: Vec<String>,
}

impl Serialize for ResourceSchema {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.properties.len()))?;
        for p in &self.properties {
            map.serialize_entry(&p.name, p)?;
        }
        map.end()
    }
}

impl ResourceSchema {
    pub fn property(&self, name: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.name == name)
    }

    pub fn by_path(&self, key: &str) -> Option<&PropertyDescriptor> {
        self.properties.iter().find(|p| p.path == key)
    }

    pub fn has_identity(&self) -> bool {
        !self.identity.is_empty()
    }

    /// Descriptor at a dotted document path, walking inline schemas only.
    pub fn resolve(&self, path: &str) -> Option<&PropertyDescriptor> {
        let mut schema = self;
        let mut segments = path.split('.').peekable();
        while let Some(segment) = segments.next() {
            let prop = schema.by_path(segment)?;
            if segments.peek().is_none() {
                return Some(prop);
            }
            schema = prop.inline_schema()?;
        }
        None
    }

    /// Whether `path` addresses a persisted, single-valued leaf (or an identity).
    /// With `searchable_only`, the leaf must also be a non-identity string.
    pub fn is_persistent_path(&self, path: &str, searchable_only: bool) -> bool {
        let segments: Vec<&str> = path.split('.').collect();
        let mut schema = self;
        for (i, segment) in segments.iter().enumerate() {
            let last = i + 1 == segments.len();
            if *segment == IDENTITY_PATH {
                return !searchable_only && last && schema.has_identity();
            }
            let Some(prop) = schema.by_path(segment) else {
                return false;
            };
            if prop.transient {
                return false;
            }
            if last {
                if searchable_only {
                    return prop.is_searchable();
                }
                return !prop.multi_valued && prop.inline_schema().is_none();
            }
            match &prop.nested {
                Some(NestedSchema::Inline(s)) => schema = s,
                Some(NestedSchema::Reference(_)) => {
                    return !searchable_only && segments[i + 1..] == [IDENTITY_PATH];
                }
                None => return false,
            }
        }
        false
    }

    /// Every searchable leaf path, descending into inline schemas (collections included).
    pub fn searchable_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        collect_searchable(self, "", &mut out);
        out
    }

    /// Convert a raw query string value to the JSON type of the property at `path`.
    pub fn coerce(&self, path: &str, value: Value) -> Value {
        let Value::String(raw) = &value else {
            return value;
        };
        let kind = self.resolve(path).and_then(PropertyDescriptor::scalar_kind);
        match kind {
            Some(ScalarKind::Integer) => raw
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or(value),
            Some(ScalarKind::Float) => raw
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or(value),
            Some(ScalarKind::Boolean) => match raw.as_str() {
                "true" | "1" => Value::Bool(true),
                "false" | "0" => Value::Bool(false),
                _ => value,
            },
            Some(ScalarKind::DateTime) => normalize_datetime(raw)
                .map(Value::String)
                .unwrap_or(value),
            _ => value,
        }
    }
}

fn collect_searchable(schema: &ResourceSchema, prefix: &str, out: &mut Vec<String>) {
    for prop in &schema.properties {
        if prop.transient {
            continue;
        }
        let path = format!("{}{}", prefix, prop.path);
        if let Some(inner) = prop.inline_schema() {
            collect_searchable(inner, &format!("{}.", path), out);
        } else if prop.is_searchable() {
            out.push(path);
        }
    }
}

/// Build the schema of `entity_type`, exposing its technical identifier as `identifier`.
pub fn reflect(
    catalog: &dyn TypeCatalog,
    entity_type: &str,
    identifier: &str,
) -> Result<ResourceSchema, ConfigError> {
    let mut visited = HashSet::new();
    visited.insert(entity_type.to_string());
    Reflector { catalog, identifier }.walk(entity_type, &mut visited, 0)
}

struct Reflector<'a> {
    catalog: &'a dyn TypeCatalog,
    identifier: &'a str,
}

impl Reflector<'_> {
    fn walk(
        &self,
        type_name: &str,
        visited: &mut HashSet<String>,
        depth: usize,
    ) -> Result<ResourceSchema, ConfigError> {
        let depth = depth + 1;
        if depth >= MAX_RECURSION_DEPTH {
            return Err(ConfigError::RecursionLimit {
                type_name: type_name.to_string(),
                limit: MAX_RECURSION_DEPTH,
            });
        }
        let ty = self
            .catalog
            .lookup(type_name)
            .ok_or_else(|| ConfigError::UnknownType(type_name.to_string()))?;

        let mut properties = Vec::with_capacity(ty.properties.len() + 1);
        for prop in &ty.properties {
            let multi_valued =
                prop.element_type.is_some() || prop.type_name.eq_ignore_ascii_case("array");
            let target = prop.element_type.as_deref().unwrap_or(&prop.type_name);
            let nested = self.nested(target, visited, depth)?;
            properties.push(PropertyDescriptor {
                name: prop.name.clone(),
                path: prop.name.clone(),
                type_name: prop.type_name.clone(),
                element_type: prop.element_type.clone(),
                transient: prop.transient,
                identity: ty.identity.contains(&prop.name),
                multi_valued,
                nested,
                validation: prop.validation.clone(),
                description: prop.description.clone(),
            });
        }

        let identity = if ty.has_technical_identity() {
            properties.push(PropertyDescriptor::technical(self.identifier));
            vec![IDENTITY_PATH.to_string()]
        } else if ty.is_entity() {
            ty.identity.clone()
        } else {
            Vec::new()
        };

        Ok(ResourceSchema {
            type_name: ty.name.clone(),
            properties,
            identity,
        })
    }

    fn nested(
        &self,
        target: &str,
        visited: &mut HashSet<String>,
        depth: usize,
    ) -> Result<Option<NestedSchema>, ConfigError> {
        if scalar_kind(target).is_some() {
            return Ok(None);
        }
        let Some(ty) = self.catalog.lookup(target) else {
            return Ok(None);
        };
        if ty.is_entity() && (ty.aggregate_root || visited.contains(target)) {
            return Ok(Some(NestedSchema::Reference(target.to_string())));
        }
        let inserted = visited.insert(target.to_string());
        let schema = self.walk(target, visited, depth);
        if inserted {
            visited.remove(target);
        }
        schema.map(|s| Some(NestedSchema::Inline(s)))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{ModelKind, PropertyConfig, TypeConfig};
    use crate::schema::catalog::TypeRegistry;
    use serde_json::json;

    pub(crate) fn prop(name: &str, type_name: &str) -> PropertyConfig {
        PropertyConfig {
            name: name.into(),
            type_name: type_name.into(),
            element_type: None,
            transient: false,
            validation: None,
            description: None,
        }
    }

    pub(crate) fn collection(name: &str, element: &str) -> PropertyConfig {
        PropertyConfig {
            element_type: Some(element.into()),
            ..prop(name, "array")
        }
    }

    pub(crate) fn entity(name: &str, root: bool, properties: Vec<PropertyConfig>) -> TypeConfig {
        TypeConfig {
            name: name.into(),
            kind: ModelKind::Entity,
            aggregate_root: root,
            identity: vec![],
            properties,
            description: None,
        }
    }

    pub(crate) fn fixture_registry() -> TypeRegistry {
        TypeRegistry::from_configs(vec![
            entity(
                "AggregateRoot",
                true,
                vec![
                    prop("title", "string"),
                    prop("email", "string"),
                    collection("entities", "Entity"),
                    prop("otherAggregate", "AggregateRoot"),
                ],
            ),
            entity(
                "Entity",
                false,
                vec![prop("title", "string"), collection("entities", "Entity")],
            ),
        ])
        .unwrap()
    }

    #[test]
    fn aggregate_roots_and_revisited_entities_become_references() {
        let registry = fixture_registry();
        let schema = reflect(&registry, "AggregateRoot", "uuid").unwrap();
        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!({
                "title": {"type": "string", "elementType": null, "transient": false, "identity": false, "multiValued": false},
                "email": {"type": "string", "elementType": null, "transient": false, "identity": false, "multiValued": false},
                "entities": {"type": "array", "elementType": "Entity", "transient": false, "identity": false, "multiValued": true,
                    "schema": {
                        "title": {"type": "string", "elementType": null, "transient": false, "identity": false, "multiValued": false},
                        "entities": {"type": "array", "elementType": "Entity", "transient": false, "identity": false, "multiValued": true, "schema": "Entity"},
                        "uuid": {"type": "string", "elementType": null, "transient": false, "identity": true, "multiValued": false}
                    }},
                "otherAggregate": {"type": "AggregateRoot", "elementType": null, "transient": false, "identity": false, "multiValued": false, "schema": "AggregateRoot"},
                "uuid": {"type": "string", "elementType": null, "transient": false, "identity": true, "multiValued": false}
            })
        );
    }

    #[test]
    fn siblings_may_expand_the_same_type() {
        let registry = TypeRegistry::from_configs(vec![
            entity(
                "Race",
                true,
                vec![prop("start", "Point"), prop("finish", "Point")],
            ),
            entity("Point", false, vec![prop("label", "string")]),
        ])
        .unwrap();
        let schema = reflect(&registry, "Race", "id").unwrap();
        assert!(schema.property("start").unwrap().inline_schema().is_some());
        assert!(schema.property("finish").unwrap().inline_schema().is_some());
        assert_eq!(schema.property("id").unwrap().path, IDENTITY_PATH);
    }

    #[test]
    fn deep_value_object_chains_stop_at_the_ceiling() {
        let mut types = vec![entity("Root", true, vec![prop("next", "V0")])];
        for i in 0..150 {
            types.push(TypeConfig {
                kind: ModelKind::ValueObject,
                ..entity(&format!("V{}", i), false, vec![prop("next", &format!("V{}", i + 1))])
            });
        }
        let registry = TypeRegistry::from_configs(types).unwrap();
        assert!(matches!(
            reflect(&registry, "Root", "uuid"),
            Err(ConfigError::RecursionLimit { limit: MAX_RECURSION_DEPTH, .. })
        ));
    }

    #[test]
    fn self_referencing_value_object_hits_the_ceiling() {
        let registry = TypeRegistry::from_configs(vec![
            entity("Root", true, vec![prop("tree", "Node")]),
            TypeConfig {
                kind: ModelKind::ValueObject,
                ..entity("Node", false, vec![prop("child", "Node")])
            },
        ])
        .unwrap();
        assert!(reflect(&registry, "Root", "uuid").is_err());
    }

    #[test]
    fn declared_identity_replaces_the_technical_identifier() {
        let registry = TypeRegistry::from_configs(vec![TypeConfig {
            identity: vec!["code".into(), "year".into()],
            ..entity("Edition", true, vec![prop("code", "string"), prop("year", "integer")])
        }])
        .unwrap();
        let schema = reflect(&registry, "Edition", "uuid").unwrap();
        assert_eq!(schema.identity, vec!["code", "year"]);
        assert!(schema.property("uuid").is_none());
        assert!(schema.property("code").unwrap().identity);
    }

    #[test]
    fn persistence_paths() {
        let registry = fixture_registry();
        let schema = reflect(&registry, "AggregateRoot", "uuid").unwrap();
        assert!(schema.is_persistent_path("title", false));
        assert!(schema.is_persistent_path("entities.title", false));
        assert!(schema.is_persistent_path("otherAggregate.__identity", false));
        assert!(schema.is_persistent_path("__identity", false));
        assert!(!schema.is_persistent_path("otherAggregate.title", false));
        assert!(!schema.is_persistent_path("entities", false));
        assert!(!schema.is_persistent_path("missing", false));
        assert!(!schema.is_persistent_path("__identity", true));
        assert_eq!(schema.searchable_paths(), vec!["title", "email", "entities.title"]);
    }

    #[test]
    fn coercion_follows_property_type() {
        let registry = TypeRegistry::from_configs(vec![entity(
            "Lap",
            true,
            vec![
                prop("number", "integer"),
                prop("valid", "boolean"),
                prop("at", "DateTime"),
                prop("name", "string"),
            ],
        )])
        .unwrap();
        let schema = reflect(&registry, "Lap", "uuid").unwrap();
        assert_eq!(schema.coerce("number", json!("5")), json!(5));
        assert_eq!(schema.coerce("valid", json!("true")), json!(true));
        assert_eq!(
            schema.coerce("at", json!("2024-01-01T02:00:00+02:00")),
            json!("2024-01-01T00:00:00.000000Z")
        );
        assert_eq!(schema.coerce("name", json!("5")), json!("5"));
    }
}
