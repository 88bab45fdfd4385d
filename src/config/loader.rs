//! Load descriptors from a JSON document or a config directory.

use crate::config::types::{ApiConfig, ApiSettings};
use crate::error::ConfigError;
use std::path::Path;

impl ApiConfig {
    /// Parse one combined document with `api`, `types` and `resources` keys.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Load(e.to_string()))
    }
}

/// Read `types.json`, `resources.json` and the optional `api.json` from `dir`.
pub async fn load_from_dir(dir: impl AsRef<Path>) -> Result<ApiConfig, ConfigError> {
    let dir = dir.as_ref();
    let types = serde_json::from_str(&read(dir, "types.json").await?)
        .map_err(|e| ConfigError::Load(format!("types.json: {}", e)))?;
    let resources = serde_json::from_str(&read(dir, "resources.json").await?)
        .map_err(|e| ConfigError::Load(format!("resources.json: {}", e)))?;
    let api: ApiSettings = match tokio::fs::read_to_string(dir.join("api.json")).await {
        Ok(s) => serde_json::from_str(&s).map_err(|e| ConfigError::Load(format!("api.json: {}", e)))?,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => ApiSettings::default(),
        Err(e) => return Err(ConfigError::Load(format!("api.json: {}", e))),
    };
    tracing::info!(dir = %dir.display(), "loaded resource descriptors");
    Ok(ApiConfig {
        api: api.with_env_overrides(),
        types,
        resources,
    })
}

async fn read(dir: &Path, file: &str) -> Result<String, ConfigError> {
    tokio::fs::read_to_string(dir.join(file))
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", file, e)))
}
