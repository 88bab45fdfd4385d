//! Descriptor types deserialized from JSON config (types.json, resources.json, api.json).

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    #[default]
    Entity,
    ValueObject,
}

/// One domain type: its properties and how it is identified.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TypeConfig {
    pub name: String,
    #[serde(default)]
    pub kind: ModelKind,
    /// Aggregate roots are stored on their own and only referenced from other aggregates.
    #[serde(default)]
    pub aggregate_root: bool,
    /// Declared identity properties. Empty means a generated technical identifier.
    #[serde(default)]
    pub identity: Vec<String>,
    #[serde(default)]
    pub properties: Vec<PropertyConfig>,
    #[serde(default)]
    pub description: Option<String>,
}

impl TypeConfig {
    pub fn is_entity(&self) -> bool {
        self.kind == ModelKind::Entity
    }

    pub fn has_technical_identity(&self) -> bool {
        self.is_entity() && self.identity.is_empty()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PropertyConfig {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    /// Set for collections; the type of each element.
    #[serde(default)]
    pub element_type: Option<String>,
    /// Transient properties are never persisted, filtered or searched.
    #[serde(default)]
    pub transient: bool,
    #[serde(default)]
    pub validation: Option<ValidationRule>,
    #[serde(default)]
    pub description: Option<String>,
}

/// Per-property validation rules.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default)]
    pub required: Option<bool>,
    /// One of `email`, `uuid`, `date-time`.
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub max_length: Option<u32>,
    #[serde(default)]
    pub min_length: Option<u32>,
    #[serde(default)]
    pub pattern: Option<String>,
    #[serde(default)]
    pub allowed: Option<Vec<Value>>,
    #[serde(default)]
    pub minimum: Option<f64>,
    #[serde(default)]
    pub maximum: Option<f64>,
}

/// Request argument names for one resource. Checked against property names at startup.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArgumentNames {
    pub resource: String,
    pub resources: String,
    pub embed: String,
    pub fields: String,
    pub search: String,
    pub query: String,
    pub sort: String,
    pub limit: String,
    pub offset: String,
    pub cursor: String,
    pub last: String,
    pub last_id: String,
    pub dir: String,
}

impl Default for ArgumentNames {
    fn default() -> Self {
        ArgumentNames {
            resource: "resource".into(),
            resources: "resources".into(),
            embed: "embed".into(),
            fields: "fields".into(),
            search: "search".into(),
            query: "query".into(),
            sort: "sort".into(),
            limit: "limit".into(),
            offset: "offset".into(),
            cursor: "cursor".into(),
            last: "last".into(),
            last_id: "lastId".into(),
            dir: "dir".into(),
        }
    }
}

impl ArgumentNames {
    pub fn all(&self) -> [&str; 13] {
        [
            &self.resource,
            &self.resources,
            &self.embed,
            &self.fields,
            &self.search,
            &self.query,
            &self.sort,
            &self.limit,
            &self.offset,
            &self.cursor,
            &self.last,
            &self.last_id,
            &self.dir,
        ]
    }

    pub fn is_reserved(&self, name: &str) -> bool {
        self.all().contains(&name)
    }
}

fn default_identifier() -> String {
    "uuid".into()
}

/// One REST resource mounted at `/{path_segment}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub path_segment: String,
    pub entity_type: String,
    /// Key under which identifiers are exposed.
    #[serde(default = "default_identifier")]
    pub identifier: String,
    /// Property used for keyset pagination; defaults to the identity.
    #[serde(default)]
    pub cursor_property: Option<String>,
    /// Allow-list of rendered root properties.
    #[serde(default)]
    pub render_fields: Option<Vec<String>>,
    /// Filters applied to every list, filter and search query.
    #[serde(default)]
    pub default_filter: Map<String, Value>,
    #[serde(default)]
    pub arguments: ArgumentNames,
    #[serde(default)]
    pub description: Option<String>,
}

fn default_api_version() -> String {
    "1.0".into()
}

fn default_true() -> bool {
    true
}

fn default_body_limit() -> usize {
    2 * 1024 * 1024
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ApiSettings {
    #[serde(default = "default_api_version")]
    pub api_version: String,
    /// Scheme and host for generated URIs. Taken from the `Host` header when unset.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Path the resource router is nested under, e.g. `/api/v1`.
    #[serde(default)]
    pub mount_path: String,
    #[serde(default = "default_true")]
    pub use_absolute_uris: bool,
    #[serde(default)]
    pub normalize_resource_types: bool,
    /// Echo internal error messages in 500 responses.
    #[serde(default)]
    pub expose_internal_errors: bool,
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            api_version: default_api_version(),
            base_url: None,
            mount_path: String::new(),
            use_absolute_uris: true,
            normalize_resource_types: false,
            expose_internal_errors: false,
            body_limit_bytes: default_body_limit(),
        }
    }
}

impl ApiSettings {
    /// Apply `RESOURCE_BASE_URL` and `RESOURCE_MOUNT_PATH` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(base) = std::env::var("RESOURCE_BASE_URL") {
            self.base_url = Some(base);
        }
        if let Ok(mount) = std::env::var("RESOURCE_MOUNT_PATH") {
            self.mount_path = mount;
        }
        self
    }
}

/// All descriptors in one struct for in-memory loading.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub types: Vec<TypeConfig>,
    #[serde(default)]
    pub resources: Vec<ResourceConfig>,
}
