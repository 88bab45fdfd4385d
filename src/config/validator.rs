//! Config validation: type references, identities and resource argument names.

use crate::config::{ResourceConfig, TypeConfig};
use crate::error::ConfigError;
use crate::query::canonical_path;
use crate::schema::{scalar_kind, ResourceSchema, IDENTITY_PATH};
use std::collections::HashSet;

/// Reserved top-level segment serving the entry manifest.
pub const ENTRY_SEGMENT: &str = "discover";

pub fn validate_types(types: &[TypeConfig]) -> Result<(), ConfigError> {
    let names: HashSet<&str> = types.iter().map(|t| t.name.as_str()).collect();
    let known = |type_name: &str| scalar_kind(type_name).is_some() || names.contains(type_name);

    for t in types {
        let mut seen = HashSet::new();
        for p in &t.properties {
            if p.name == IDENTITY_PATH {
                return Err(ConfigError::Validation(format!(
                    "{}: property name '{}' is reserved",
                    t.name, IDENTITY_PATH
                )));
            }
            if !seen.insert(p.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "{}: duplicate property '{}'",
                    t.name, p.name
                )));
            }
            if !known(&p.type_name) {
                return Err(ConfigError::UnknownType(p.type_name.clone()));
            }
            if let Some(element) = &p.element_type {
                if !known(element) {
                    return Err(ConfigError::UnknownType(element.clone()));
                }
            }
        }
        if !t.is_entity() && !t.identity.is_empty() {
            return Err(ConfigError::Validation(format!(
                "{}: value objects have no identity",
                t.name
            )));
        }
        for component in &t.identity {
            let prop = t.properties.iter().find(|p| &p.name == component).ok_or_else(|| {
                ConfigError::Validation(format!("{}: identity property '{}' not declared", t.name, component))
            })?;
            if prop.transient || prop.element_type.is_some() || scalar_kind(&prop.type_name).is_none() {
                return Err(ConfigError::Validation(format!(
                    "{}: identity property '{}' must be a persisted scalar",
                    t.name, component
                )));
            }
        }
    }
    Ok(())
}

/// Checks one resource against the schema of its entity type.
pub fn validate_resource(resource: &ResourceConfig, schema: &ResourceSchema) -> Result<(), ConfigError> {
    let segment = &resource.path_segment;
    if segment.is_empty() || segment.contains('/') || segment == ENTRY_SEGMENT {
        return Err(ConfigError::Validation(format!("invalid path segment '{}'", segment)));
    }

    let mut arguments = HashSet::new();
    for name in resource.arguments.all() {
        if !arguments.insert(name) {
            return Err(ConfigError::Validation(format!(
                "{}: argument name '{}' used twice",
                segment, name
            )));
        }
        if name == resource.identifier || schema.property(name).is_some() {
            return Err(ConfigError::Validation(format!(
                "{}: argument name '{}' collides with a property of {}",
                segment, name, schema.type_name
            )));
        }
    }

    if let Some(cursor) = &resource.cursor_property {
        let path = canonical_path(cursor, &resource.identifier);
        if !schema.is_persistent_path(&path, false) {
            return Err(ConfigError::Validation(format!(
                "{}: cursor property '{}' is not a persisted single-valued property",
                segment, cursor
            )));
        }
    }

    for field in resource.render_fields.iter().flatten() {
        if schema.property(field).is_none() {
            return Err(ConfigError::Validation(format!(
                "{}: render field '{}' not in {}",
                segment, field, schema.type_name
            )));
        }
    }

    for key in resource.default_filter.keys() {
        let path = canonical_path(key, &resource.identifier);
        if !schema.is_persistent_path(&path, false) {
            return Err(ConfigError::Validation(format!(
                "{}: default filter '{}' does not address a persisted property",
                segment, key
            )));
        }
    }
    Ok(())
}
