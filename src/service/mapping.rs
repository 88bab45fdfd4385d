//! Input JSON to stored documents: typed, identified, references normalized.

use crate::document::{identifier_of, reference_identifier, scalar_text};
use crate::error::AppError;
use crate::schema::{normalize_datetime, NestedSchema, PropertyDescriptor, ResourceSchema, ScalarKind, IDENTITY_PATH};
use crate::service::validation::{codes, RequestValidator};
use serde_json::{Map, Value};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MapMode {
    /// Every required and identity property must be present.
    Create,
    /// Only the given properties are mapped; missing ones are left alone.
    Update,
}

/// A reference to another aggregate found in the input.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingReference {
    pub field: String,
    pub entity_type: String,
    pub identifier: String,
}

#[derive(Debug)]
pub struct MappedDocument {
    pub document: Map<String, Value>,
    /// Identifier given in the input under the alias or `__identity`.
    pub supplied_identifier: Option<String>,
    pub references: Vec<PendingReference>,
}

pub struct DocumentMapper<'a> {
    alias: &'a str,
    validator: RequestValidator,
    references: Vec<PendingReference>,
}

impl<'a> DocumentMapper<'a> {
    pub fn new(alias: &'a str) -> Self {
        DocumentMapper {
            alias,
            validator: RequestValidator::new(),
            references: Vec::new(),
        }
    }

    /// Unknown properties fail fast with 400; type and rule failures are
    /// collected into one 422.
    pub fn map_root(
        mut self,
        input: &Value,
        schema: &ResourceSchema,
        mode: MapMode,
    ) -> Result<MappedDocument, AppError> {
        let Value::Object(map) = input else {
            return Err(AppError::BadRequest("resource must be a JSON object".into()));
        };
        let (document, supplied_identifier) = self.map_object(map, schema, mode, "")?;
        self.validator.finish()?;
        Ok(MappedDocument {
            document,
            supplied_identifier,
            references: self.references,
        })
    }

    fn map_object(
        &mut self,
        input: &Map<String, Value>,
        schema: &ResourceSchema,
        mode: MapMode,
        prefix: &str,
    ) -> Result<(Map<String, Value>, Option<String>), AppError> {
        let mut out = Map::new();
        let mut supplied = None;
        for (key, value) in input {
            let prop = schema.property(key).filter(|p| !p.is_technical_identity());
            let Some(prop) = prop else {
                if (key == IDENTITY_PATH || key == self.alias) && schema.has_identity() {
                    supplied = scalar_text(value);
                    continue;
                }
                return Err(AppError::BadRequest(format!(
                    "unknown property '{}{}' for {}",
                    prefix, key, schema.type_name
                )));
            };
            if prop.transient {
                continue;
            }
            let field = format!("{}{}", prefix, key);
            let mapped = self.map_property(prop, value, &field)?;
            let required = prop.validation.as_ref().and_then(|r| r.required) == Some(true);
            if mapped.is_null() && (prop.identity || required) {
                self.validator.required(&field);
            }
            if let Some(rule) = &prop.validation {
                self.validator.check(&field, &mapped, rule);
            }
            out.insert(prop.path.clone(), mapped);
        }
        if mode == MapMode::Create {
            for prop in &schema.properties {
                if prop.transient || prop.is_technical_identity() || input.contains_key(&prop.name) {
                    continue;
                }
                let required = prop.validation.as_ref().and_then(|r| r.required) == Some(true);
                if prop.identity || required {
                    self.validator.required(&format!("{}{}", prefix, prop.name));
                }
            }
        }
        Ok((out, supplied))
    }

    fn map_property(&mut self, prop: &PropertyDescriptor, value: &Value, field: &str) -> Result<Value, AppError> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        if !prop.multi_valued {
            return self.map_single(prop, value, field);
        }
        let Value::Array(items) = value else {
            self.type_error(field, "array");
            return Ok(Value::Null);
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            if prop.element_type.is_none() {
                out.push(item.clone());
            } else {
                out.push(self.map_single(prop, item, &format!("{}.{}", field, i))?);
            }
        }
        Ok(Value::Array(out))
    }

    fn map_single(&mut self, prop: &PropertyDescriptor, value: &Value, field: &str) -> Result<Value, AppError> {
        match &prop.nested {
            Some(NestedSchema::Inline(schema)) => {
                let Value::Object(map) = value else {
                    self.type_error(field, &schema.type_name);
                    return Ok(Value::Null);
                };
                let (doc, supplied) = self.map_object(map, schema, MapMode::Create, &format!("{}.", field))?;
                let mut doc = Value::Object(doc);
                if schema.has_identity() {
                    let identifier = if schema.identity.iter().any(|p| p == IDENTITY_PATH) {
                        supplied.unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
                    } else {
                        identifier_of(&doc, &schema.identity).unwrap_or_default()
                    };
                    if let Value::Object(map) = &mut doc {
                        map.insert(IDENTITY_PATH.to_string(), Value::String(identifier));
                    }
                }
                Ok(doc)
            }
            Some(NestedSchema::Reference(type_name)) => match reference_identifier(value, self.alias) {
                Some(identifier) => {
                    self.references.push(PendingReference {
                        field: field.to_string(),
                        entity_type: type_name.clone(),
                        identifier: identifier.clone(),
                    });
                    Ok(Value::String(identifier))
                }
                None => {
                    self.type_error(field, &format!("reference to {}", type_name));
                    Ok(Value::Null)
                }
            },
            None => Ok(self.map_scalar(prop, value, field)),
        }
    }

    fn map_scalar(&mut self, prop: &PropertyDescriptor, value: &Value, field: &str) -> Value {
        let matches = match prop.scalar_kind() {
            Some(ScalarKind::String) => value.is_string(),
            Some(ScalarKind::Integer) => {
                value.is_i64() || value.is_u64() || value.as_f64().map_or(false, |f| f.fract() == 0.0)
            }
            Some(ScalarKind::Float) => value.is_number(),
            Some(ScalarKind::Boolean) => value.is_boolean(),
            Some(ScalarKind::Array) => value.is_array(),
            Some(ScalarKind::DateTime) => {
                return match value.as_str().and_then(normalize_datetime) {
                    Some(normalized) => Value::String(normalized),
                    None => {
                        self.validator.push(
                            codes::DATE_TIME,
                            field,
                            format!("{} must be an RFC 3339 date-time", field),
                        );
                        value.clone()
                    }
                };
            }
            None => true,
        };
        if !matches {
            let expected = prop.element_type.as_deref().unwrap_or(&prop.type_name);
            self.type_error(field, expected);
        }
        value.clone()
    }

    fn type_error(&mut self, field: &str, expected: &str) {
        self.validator
            .push(codes::TYPE, field, format!("{} must be of type {}", field, expected));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PropertyConfig, ValidationRule};
    use crate::schema::reflect;
    use crate::schema::reflect::tests::{entity, fixture_registry, prop};
    use crate::schema::TypeRegistry;
    use serde_json::json;

    fn aggregate() -> ResourceSchema {
        reflect(&fixture_registry(), "AggregateRoot", "uuid").unwrap()
    }

    #[test]
    fn references_and_nested_identities_are_normalized() {
        let mapped = DocumentMapper::new("uuid")
            .map_root(
                &json!({
                    "uuid": "root",
                    "title": "Root",
                    "otherAggregate": {"uuid": "other"},
                    "entities": [{"uuid": "e1", "title": "A", "entities": []}, {"title": "B"}]
                }),
                &aggregate(),
                MapMode::Create,
            )
            .unwrap();
        assert_eq!(mapped.supplied_identifier.as_deref(), Some("root"));
        let doc = Value::Object(mapped.document);
        assert_eq!(doc["otherAggregate"], "other");
        assert_eq!(doc["entities"][0]["__identity"], "e1");
        assert!(uuid::Uuid::parse_str(doc["entities"][1]["__identity"].as_str().unwrap()).is_ok());
        assert!(doc.get("uuid").is_none());
        assert_eq!(
            mapped.references,
            vec![PendingReference {
                field: "otherAggregate".into(),
                entity_type: "AggregateRoot".into(),
                identifier: "other".into(),
            }]
        );
    }

    #[test]
    fn unknown_property_is_a_bad_request() {
        let err = DocumentMapper::new("uuid")
            .map_root(&json!({"nope": 1}), &aggregate(), MapMode::Create)
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(m) if m.contains("nope")));
    }

    #[test]
    fn type_errors_are_collected_with_paths() {
        let err = DocumentMapper::new("uuid")
            .map_root(
                &json!({"title": 5, "entities": [{"title": true}]}),
                &aggregate(),
                MapMode::Create,
            )
            .unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields: Vec<_> = errors.iter().map(|e| (e.code, e.field.as_str())).collect();
        assert_eq!(fields, vec![(codes::TYPE, "title"), (codes::TYPE, "entities.0.title")]);
    }

    #[test]
    fn datetimes_transients_and_required_rules() {
        let registry = TypeRegistry::from_configs(vec![entity(
            "Race",
            true,
            vec![
                PropertyConfig {
                    validation: Some(ValidationRule {
                        required: Some(true),
                        ..Default::default()
                    }),
                    ..prop("name", "string")
                },
                prop("startsAt", "date-time"),
                PropertyConfig {
                    transient: true,
                    ..prop("scratch", "string")
                },
            ],
        )])
        .unwrap();
        let schema = reflect(&registry, "Race", "uuid").unwrap();

        let mapped = DocumentMapper::new("uuid")
            .map_root(
                &json!({"name": "Marathon", "startsAt": "2024-05-01T10:00:00+02:00", "scratch": "x"}),
                &schema,
                MapMode::Create,
            )
            .unwrap();
        assert_eq!(mapped.document["startsAt"], "2024-05-01T08:00:00.000000Z");
        assert!(!mapped.document.contains_key("scratch"));

        let err = DocumentMapper::new("uuid")
            .map_root(&json!({"startsAt": "yesterday"}), &schema, MapMode::Create)
            .unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let codes_seen: Vec<_> = errors.iter().map(|e| e.code).collect();
        assert_eq!(codes_seen, vec![codes::DATE_TIME, codes::REQUIRED]);

        DocumentMapper::new("uuid")
            .map_root(&json!({"startsAt": null}), &schema, MapMode::Update)
            .unwrap();
    }
}
