//! Resolved resource model: config validated and reflected for runtime use.

use crate::config::{validate_resource, validate_types, ApiConfig, ResourceConfig};
use crate::error::ConfigError;
use crate::projection::{build_default_projection, with_render_fields, ProjectionConfig};
use crate::schema::{ResourceSchema, SchemaCache, TypeRegistry};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Clone, Debug)]
pub struct ResolvedResource {
    pub config: ResourceConfig,
    pub schema: Arc<ResourceSchema>,
    /// Default projection with the configured render fields applied.
    pub default_projection: ProjectionConfig,
    pub description: Option<String>,
}

impl ResolvedResource {
    pub fn segment(&self) -> &str {
        &self.config.path_segment
    }

    /// Key under which identifiers are exposed.
    pub fn alias(&self) -> &str {
        &self.config.identifier
    }

    pub fn identity(&self) -> &[String] {
        &self.schema.identity
    }

    pub fn entity_type(&self) -> &str {
        &self.config.entity_type
    }
}

#[derive(Clone, Debug, Default)]
pub struct ResolvedModel {
    /// In declaration order.
    pub resources: Vec<ResolvedResource>,
    by_segment: HashMap<String, usize>,
}

impl ResolvedModel {
    pub fn resource(&self, segment: &str) -> Option<&ResolvedResource> {
        self.by_segment.get(segment).map(|i| &self.resources[*i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResolvedResource> {
        self.resources.iter()
    }
}

/// Reflect and validate every resource. Any failure aborts startup.
pub fn resolve(resources: &[ResourceConfig], schemas: &SchemaCache) -> Result<ResolvedModel, ConfigError> {
    let mut model = ResolvedModel::default();
    for config in resources {
        if model.by_segment.contains_key(&config.path_segment) {
            return Err(ConfigError::DuplicatePathSegment(config.path_segment.clone()));
        }
        let ty = schemas
            .catalog()
            .lookup(&config.entity_type)
            .ok_or_else(|| ConfigError::UnknownType(config.entity_type.clone()))?;
        if !ty.is_entity() {
            return Err(ConfigError::Validation(format!(
                "{}: resource type {} is not an entity",
                config.path_segment, config.entity_type
            )));
        }
        let description = config.description.clone().or_else(|| ty.description.clone());
        let schema = schemas.get(&config.entity_type, &config.identifier)?;
        validate_resource(config, &schema)?;
        let default_projection = with_render_fields(
            build_default_projection(&schema, &config.identifier),
            config.render_fields.as_deref(),
        );
        tracing::debug!(segment = %config.path_segment, entity_type = %config.entity_type, "resolved resource");
        model
            .by_segment
            .insert(config.path_segment.clone(), model.resources.len());
        model.resources.push(ResolvedResource {
            config: config.clone(),
            schema,
            default_projection,
            description,
        });
    }
    Ok(model)
}

/// Validate the declared types, build the registry and schema cache, and resolve resources.
pub fn load_model(config: &ApiConfig) -> Result<(Arc<SchemaCache>, ResolvedModel), ConfigError> {
    validate_types(&config.types)?;
    let registry = TypeRegistry::from_configs(config.types.iter().cloned())?;
    let schemas = Arc::new(SchemaCache::new(Arc::new(registry)));
    let model = resolve(&config.resources, &schemas)?;
    tracing::info!(resources = model.resources.len(), "resource model ready");
    Ok((schemas, model))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelKind, TypeConfig};
    use crate::schema::reflect::tests::{entity, fixture_registry, prop};

    fn resources(segments: &[&str]) -> Vec<ResourceConfig> {
        segments
            .iter()
            .map(|s| {
                ApiConfig::from_json_str(&format!(
                    r#"{{"resources": [{{"path_segment": "{}", "entity_type": "AggregateRoot"}}]}}"#,
                    s
                ))
                .unwrap()
                .resources
                .remove(0)
            })
            .collect()
    }

    #[test]
    fn resolves_in_declaration_order() {
        let cache = SchemaCache::new(Arc::new(fixture_registry()));
        let model = resolve(&resources(&["b", "a"]), &cache).unwrap();
        let segments: Vec<_> = model.iter().map(|r| r.segment()).collect();
        assert_eq!(segments, vec!["b", "a"]);
        let a = model.resource("a").unwrap();
        assert_eq!(a.identity(), ["__identity".to_string()]);
        assert_eq!(a.default_projection.expose_identifier_as.as_deref(), Some("uuid"));
    }

    #[test]
    fn duplicate_segments_are_rejected() {
        let cache = SchemaCache::new(Arc::new(fixture_registry()));
        assert_eq!(
            resolve(&resources(&["a", "a"]), &cache).unwrap_err(),
            ConfigError::DuplicatePathSegment("a".into())
        );
    }

    #[test]
    fn value_objects_cannot_be_resources() {
        let mut registry = fixture_registry();
        registry
            .insert(TypeConfig {
                kind: ModelKind::ValueObject,
                ..entity("Address", false, vec![prop("street", "string")])
            })
            .unwrap();
        let cache = SchemaCache::new(Arc::new(registry));
        let mut r = resources(&["addresses"]);
        r[0].entity_type = "Address".into();
        assert!(matches!(resolve(&r, &cache), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn value_object_cycles_abort_startup() {
        let mut config = ApiConfig {
            types: vec![
                entity("Root", true, vec![prop("node", "Node")]),
                TypeConfig {
                    kind: ModelKind::ValueObject,
                    ..entity("Node", false, vec![prop("next", "Node")])
                },
            ],
            resources: resources(&["roots"]),
            ..Default::default()
        };
        config.resources[0].entity_type = "Root".into();
        assert!(matches!(load_model(&config), Err(ConfigError::RecursionLimit { .. })));
    }
}
