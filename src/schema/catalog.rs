//! Type catalog: the statically declared descriptors reflection walks over.

use crate::config::TypeConfig;
use crate::error::ConfigError;
use std::collections::HashMap;

/// Lookup of type descriptors by name.
pub trait TypeCatalog: Send + Sync {
    fn lookup(&self, name: &str) -> Option<&TypeConfig>;
}

/// Implemented by Rust types that declare their own descriptor.
pub trait DescribeType {
    fn describe_type() -> TypeConfig;
}

#[derive(Clone, Debug, Default)]
pub struct TypeRegistry {
    types: HashMap<String, TypeConfig>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_configs(configs: impl IntoIterator<Item = TypeConfig>) -> Result<Self, ConfigError> {
        let mut registry = Self::new();
        for config in configs {
            registry.insert(config)?;
        }
        Ok(registry)
    }

    pub fn insert(&mut self, config: TypeConfig) -> Result<(), ConfigError> {
        if self.types.contains_key(&config.name) {
            return Err(ConfigError::DuplicateType(config.name));
        }
        self.types.insert(config.name.clone(), config);
        Ok(())
    }

    pub fn register<T: DescribeType>(&mut self) -> Result<(), ConfigError> {
        self.insert(T::describe_type())
    }
}

impl TypeCatalog for TypeRegistry {
    fn lookup(&self, name: &str) -> Option<&TypeConfig> {
        self.types.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ModelKind, PropertyConfig};

    struct Checkpoint;

    impl DescribeType for Checkpoint {
        fn describe_type() -> TypeConfig {
            TypeConfig {
                name: "Checkpoint".into(),
                kind: ModelKind::ValueObject,
                aggregate_root: false,
                identity: vec![],
                properties: vec![PropertyConfig {
                    name: "label".into(),
                    type_name: "string".into(),
                    element_type: None,
                    transient: false,
                    validation: None,
                    description: None,
                }],
                description: None,
            }
        }
    }

    #[test]
    fn registering_twice_is_rejected() {
        let mut registry = TypeRegistry::new();
        registry.register::<Checkpoint>().unwrap();
        assert!(registry.lookup("Checkpoint").is_some());
        assert_eq!(
            registry.register::<Checkpoint>(),
            Err(ConfigError::DuplicateType("Checkpoint".into()))
        );
    }
}
