//! Process-wide schema cache keyed by entity type and identifier name.

use crate::error::ConfigError;
use crate::schema::catalog::TypeCatalog;
use crate::schema::reflect::{reflect, ResourceSchema};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

type Slot = Arc<OnceLock<Result<Arc<ResourceSchema>, ConfigError>>>;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct SchemaKey {
    entity_type: String,
    identifier: String,
}

/// Reflection results are computed once per key; concurrent callers for the
/// same key wait on the first computation.
pub struct SchemaCache {
    catalog: Arc<dyn TypeCatalog>,
    slots: Mutex<HashMap<SchemaKey, Slot>>,
}

impl SchemaCache {
    pub fn new(catalog: Arc<dyn TypeCatalog>) -> Self {
        SchemaCache {
            catalog,
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn catalog(&self) -> &dyn TypeCatalog {
        self.catalog.as_ref()
    }

    pub fn get(&self, entity_type: &str, identifier: &str) -> Result<Arc<ResourceSchema>, ConfigError> {
        let key = SchemaKey {
            entity_type: entity_type.to_string(),
            identifier: identifier.to_string(),
        };
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            slots.entry(key).or_default().clone()
        };
        slot.get_or_init(|| {
            tracing::debug!(entity_type, identifier, "reflecting schema");
            reflect(self.catalog.as_ref(), entity_type, identifier).map(Arc::new)
        })
        .clone()
    }

    pub fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
