//! Projection configs: what to render, derived from the schema and narrowed
//! or widened by `fields` and `embed`.

use crate::error::AppError;
use crate::schema::{NestedSchema, PropertyDescriptor, ResourceSchema};
use std::collections::BTreeMap;

const WILDCARD: &str = "*";

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ProjectionConfig {
    /// When false only the exposed identifier is rendered (reference stub).
    pub include_all: bool,
    /// Allow-list of property names at this level.
    pub only: Option<Vec<String>>,
    pub exclude: Vec<String>,
    pub descend: BTreeMap<String, ProjectionConfig>,
    /// Applies to every non-scalar child without its own entry.
    pub descend_all: Option<Box<ProjectionConfig>>,
    /// Set on collection properties: applies to each element.
    pub elements: Option<Box<ProjectionConfig>>,
    pub expose_identifier_as: Option<String>,
}

impl ProjectionConfig {
    pub fn all() -> Self {
        ProjectionConfig {
            include_all: true,
            ..Default::default()
        }
    }

    pub fn stub(alias: &str) -> Self {
        ProjectionConfig {
            include_all: false,
            expose_identifier_as: Some(alias.to_string()),
            ..Default::default()
        }
    }

    fn collection(element: ProjectionConfig) -> Self {
        ProjectionConfig {
            elements: Some(Box::new(element)),
            ..Self::all()
        }
    }

    pub fn allows(&self, name: &str) -> bool {
        self.only.as_ref().map_or(true, |only| only.iter().any(|o| o == name))
            && !self.exclude.iter().any(|e| e == name)
    }

    pub fn child(&self, name: &str) -> Option<&ProjectionConfig> {
        self.descend.get(name).or(self.descend_all.as_deref())
    }
}

/// Every property descends one level; references become identifier stubs.
pub fn build_default_projection(schema: &ResourceSchema, alias: &str) -> ProjectionConfig {
    let mut node = ProjectionConfig::all();
    if schema.has_identity() {
        node.expose_identifier_as = Some(alias.to_string());
    }
    for prop in &schema.properties {
        if prop.is_technical_identity() {
            continue;
        }
        if let Some(child) = property_projection(prop, alias) {
            node.descend.insert(prop.name.clone(), child);
        }
    }
    node
}

fn property_projection(prop: &PropertyDescriptor, alias: &str) -> Option<ProjectionConfig> {
    let element = match &prop.nested {
        Some(NestedSchema::Inline(schema)) => Some(build_default_projection(schema, alias)),
        Some(NestedSchema::Reference(_)) => Some(ProjectionConfig::stub(alias)),
        None if prop.multi_valued || prop.scalar_kind().is_none() => Some(ProjectionConfig::all()),
        None => None,
    }?;
    Some(if prop.multi_valued {
        ProjectionConfig::collection(element)
    } else {
        element
    })
}

/// Root allow-list from the resource's render configuration.
pub fn with_render_fields(mut config: ProjectionConfig, render_fields: Option<&[String]>) -> ProjectionConfig {
    if let Some(fields) = render_fields {
        config.only = Some(fields.to_vec());
    }
    config
}

/// `fields=a,b,!c`: inclusions intersect with the current allow-list, exclusions subtract.
pub fn apply_field_overrides(mut config: ProjectionConfig, fields: &str) -> ProjectionConfig {
    let mut include = Vec::new();
    for entry in fields.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match entry.strip_prefix('!') {
            Some(excluded) => {
                if !config.exclude.iter().any(|e| e == excluded) {
                    config.exclude.push(excluded.to_string());
                }
            }
            None => include.push(entry.to_string()),
        }
    }
    if !include.is_empty() {
        config.only = Some(match config.only.take() {
            Some(base) => include.into_iter().filter(|f| base.contains(f)).collect(),
            None => include,
        });
    }
    config
}

/// `embed=a.b,c.*`: merge each path into the config as a descend tree. A
/// leading wildcard is rejected.
pub fn apply_embed_overrides(mut config: ProjectionConfig, embed: &str) -> Result<ProjectionConfig, AppError> {
    for path in embed.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.first() == Some(&WILDCARD) {
            return Err(AppError::BadRequest(format!(
                "embed path '{}' may not start with a wildcard",
                path
            )));
        }
        merge_path(&mut config, &segments);
    }
    Ok(config)
}

fn merge_path(node: &mut ProjectionConfig, segments: &[&str]) {
    node.include_all = true;
    if let Some(elements) = node.elements.as_deref_mut() {
        merge_path(elements, segments);
        return;
    }
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    if *head == WILDCARD {
        for child in node.descend.values_mut() {
            merge_path(child, rest);
        }
        let all = node
            .descend_all
            .get_or_insert_with(|| Box::new(ProjectionConfig::all()));
        merge_path(all, rest);
    } else {
        let child = node
            .descend
            .entry(head.to_string())
            .or_insert_with(ProjectionConfig::all);
        merge_path(child, rest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::reflect;
    use crate::schema::reflect::tests::fixture_registry;

    fn default_config() -> ProjectionConfig {
        let schema = reflect(&fixture_registry(), "AggregateRoot", "uuid").unwrap();
        build_default_projection(&schema, "uuid")
    }

    #[test]
    fn default_projection_stops_at_references() {
        let config = default_config();
        assert_eq!(config.expose_identifier_as.as_deref(), Some("uuid"));
        assert!(!config.descend.contains_key("title"));
        assert_eq!(config.descend["otherAggregate"], ProjectionConfig::stub("uuid"));

        let entities = &config.descend["entities"];
        let element = entities.elements.as_deref().unwrap();
        assert!(element.include_all);
        assert_eq!(element.expose_identifier_as.as_deref(), Some("uuid"));
        let nested = &element.descend["entities"];
        assert_eq!(nested.elements.as_deref(), Some(&ProjectionConfig::stub("uuid")));
    }

    #[test]
    fn field_inclusions_never_widen_the_allow_list() {
        let base = with_render_fields(default_config(), Some(&["title".into(), "email".into()]));
        let narrowed = apply_field_overrides(base.clone(), "title,entities");
        assert_eq!(narrowed.only, Some(vec!["title".to_string()]));
        assert!(!narrowed.allows("entities"));

        let excluded = apply_field_overrides(base, "!email");
        assert_eq!(excluded.only, Some(vec!["title".to_string(), "email".to_string()]));
        assert!(!excluded.allows("email"));
        assert!(excluded.allows("title"));
    }

    #[test]
    fn fields_without_allow_list_become_one() {
        let config = apply_field_overrides(default_config(), "title");
        assert!(config.allows("title"));
        assert!(!config.allows("email"));
    }

    #[test]
    fn embed_widens_references() {
        let config = apply_embed_overrides(default_config(), "otherAggregate").unwrap();
        let other = &config.descend["otherAggregate"];
        assert!(other.include_all);
        assert_eq!(other.expose_identifier_as.as_deref(), Some("uuid"));
    }

    #[test]
    fn embed_through_collections_targets_elements() {
        let config = apply_embed_overrides(default_config(), "entities.entities").unwrap();
        let element = config.descend["entities"].elements.as_deref().unwrap();
        let nested = element.descend["entities"].elements.as_deref().unwrap();
        assert!(nested.include_all);
    }

    #[test]
    fn embed_never_removes_defaults() {
        let before = default_config();
        let after = apply_embed_overrides(before.clone(), "otherAggregate.entities,entities.*").unwrap();
        for key in before.descend.keys() {
            assert!(after.descend.contains_key(key));
        }
        assert_eq!(after.expose_identifier_as, before.expose_identifier_as);
    }

    #[test]
    fn leading_wildcard_is_rejected() {
        assert!(matches!(
            apply_embed_overrides(default_config(), "*.title"),
            Err(AppError::BadRequest(_))
        ));
    }
}
