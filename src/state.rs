//! Shared application state for all routes. The resource model is fixed at startup.

use crate::action::{ActionExtension, ActionRegistry};
use crate::config::{load_model, ApiConfig, ApiSettings, ResolvedModel};
use crate::error::ConfigError;
use crate::schema::SchemaCache;
use crate::store::ResourceStore;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ResourceStore>,
    pub schemas: Arc<SchemaCache>,
    pub model: Arc<ResolvedModel>,
    pub settings: Arc<ApiSettings>,
    pub actions: Arc<ActionRegistry>,
}

impl AppState {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        schemas: Arc<SchemaCache>,
        model: ResolvedModel,
        settings: ApiSettings,
    ) -> Self {
        AppState {
            store,
            schemas,
            model: Arc::new(model),
            settings: Arc::new(settings),
            actions: Arc::new(ActionRegistry::new()),
        }
    }

    /// Validate and resolve `config` over `store`. Any descriptor error aborts.
    pub fn from_config(store: Arc<dyn ResourceStore>, config: &ApiConfig) -> Result<Self, ConfigError> {
        let (schemas, model) = load_model(config)?;
        Ok(Self::new(store, schemas, model, config.api.clone()))
    }

    /// Mount a custom action on an existing resource.
    pub fn with_action(mut self, segment: &str, action: Arc<dyn ActionExtension>) -> Result<Self, ConfigError> {
        if self.model.resource(segment).is_none() {
            return Err(ConfigError::Validation(format!(
                "cannot register action '{}' on unknown resource '{}'",
                action.name(),
                segment
            )));
        }
        Arc::make_mut(&mut self.actions).register(segment, action)?;
        Ok(self)
    }
}
