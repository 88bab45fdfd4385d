//! Action resolution (method + identifier presence to a logical action) and
//! discovery manifests mapping actions back onto URI templates.

use crate::config::{ResolvedModel, ResolvedResource};
use crate::error::{AppError, ConfigError};
use crate::schema::normalize_type_name;
use crate::service::Args;
use crate::store::ResourceStore;
use async_trait::async_trait;
use axum::http::Method;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Action {
    Index,
    List,
    Show,
    Create,
    Update,
    Remove,
    Options,
    Describe,
    Discover,
    Filter,
    Search,
}

impl Action {
    /// Actions addressable as `/{resource}/{action}`.
    pub const NAMED: [Action; 4] = [Action::Describe, Action::Discover, Action::Filter, Action::Search];

    pub fn name(&self) -> &'static str {
        match self {
            Action::Index => "index",
            Action::List => "list",
            Action::Show => "show",
            Action::Create => "create",
            Action::Update => "update",
            Action::Remove => "remove",
            Action::Options => "options",
            Action::Describe => "describe",
            Action::Discover => "discover",
            Action::Filter => "filter",
            Action::Search => "search",
        }
    }

    pub fn from_segment(segment: &str) -> Option<Action> {
        Self::NAMED.into_iter().find(|a| a.name() == segment)
    }

    fn is_builtin_name(name: &str) -> bool {
        matches!(
            name,
            "index" | "list" | "show" | "create" | "update" | "remove" | "options"
        ) || Self::from_segment(name).is_some()
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// `OPTIONS` is always the preflight. `Index` splits by method; a GET or
/// HEAD with an identifier shows, without one lists. Named actions pass through.
pub fn resolve(requested: Action, method: &Method, has_identifier: bool) -> Result<Action, AppError> {
    if method == Method::OPTIONS {
        return Ok(Action::Options);
    }
    match requested {
        Action::Index => match *method {
            Method::GET | Method::HEAD if has_identifier => Ok(Action::Show),
            Method::GET | Method::HEAD => Ok(Action::List),
            Method::POST => Ok(Action::Create),
            Method::PUT | Method::PATCH => Ok(Action::Update),
            Method::DELETE => Ok(Action::Remove),
            _ => Err(AppError::MethodNotAllowed(method.to_string())),
        },
        other => Ok(other),
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParameterManifest {
    pub name: String,
    pub required: bool,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    pub description: String,
}

impl ParameterManifest {
    pub fn new(name: &str, required: bool, type_name: &str, description: &str) -> Self {
        ParameterManifest {
            name: name.to_string(),
            required,
            type_name: type_name.to_string(),
            default: None,
            description: description.to_string(),
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct ActionManifest {
    pub uri: String,
    pub methods: Vec<String>,
    pub parameters: Vec<ParameterManifest>,
    pub description: String,
    #[serde(rename = "return")]
    pub returns: String,
}

/// Request seen by a custom action.
pub struct ActionContext<'a> {
    pub resource: &'a ResolvedResource,
    pub store: &'a dyn ResourceStore,
    pub method: Method,
    pub args: Args,
    pub body: Option<Value>,
}

/// Extra named action mounted at `/{resource}/{name}`. Failures with their
/// own status are raised as `AppError::Application`.
#[async_trait]
pub trait ActionExtension: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn methods(&self) -> Vec<Method> {
        vec![Method::GET]
    }

    fn parameters(&self) -> Vec<ParameterManifest> {
        Vec::new()
    }

    async fn invoke(&self, ctx: ActionContext<'_>) -> Result<Value, AppError>;
}

/// Custom actions per path segment.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    by_segment: HashMap<String, Vec<Arc<dyn ActionExtension>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, segment: &str, action: Arc<dyn ActionExtension>) -> Result<(), ConfigError> {
        let name = action.name().to_string();
        if name.is_empty() || Action::is_builtin_name(&name) {
            return Err(ConfigError::Validation(format!(
                "{}: action name '{}' is reserved",
                segment, name
            )));
        }
        let actions = self.by_segment.entry(segment.to_string()).or_default();
        if actions.iter().any(|a| a.name() == name) {
            return Err(ConfigError::Validation(format!(
                "{}: action '{}' registered twice",
                segment, name
            )));
        }
        tracing::debug!(segment, action = %name, "registered custom action");
        actions.push(action);
        Ok(())
    }

    pub fn get(&self, segment: &str, name: &str) -> Option<&Arc<dyn ActionExtension>> {
        self.for_segment(segment).iter().find(|a| a.name() == name)
    }

    pub fn for_segment(&self, segment: &str) -> &[Arc<dyn ActionExtension>] {
        self.by_segment.get(segment).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn methods(list: &[Method]) -> Vec<String> {
    list.iter().map(|m| m.to_string()).collect()
}

/// Manifests of every action of `resource`, keyed by action name. `base` is
/// the resource URI (absolute or path-only).
pub fn resource_manifest(
    resource: &ResolvedResource,
    base: &str,
    extensions: &[Arc<dyn ActionExtension>],
) -> Map<String, Value> {
    let names = &resource.config.arguments;
    let alias = resource.alias();
    let type_name = &resource.schema.type_name;
    let member = format!("{}/{{{}}}", base, alias);
    let identifier = ParameterManifest::new(alias, true, "string", "Resource identifier");
    let fields = ParameterManifest::new(
        &names.fields,
        false,
        "string",
        "Comma separated properties to render; a leading ! excludes",
    );
    let embed = ParameterManifest::new(
        &names.embed,
        false,
        "string",
        "Comma separated property paths to expand, * for all children",
    );
    let limit = ParameterManifest::new(&names.limit, false, "integer", "Maximum number of results");
    let offset = ParameterManifest::new(&names.offset, false, "integer", "Number of results to skip")
        .with_default(Value::from(0));
    let sort = ParameterManifest::new(
        &names.sort,
        false,
        "string",
        "Comma separated properties to order by; a leading - sorts descending",
    );
    let resource_arg = ParameterManifest::new(&names.resource, true, type_name, "Resource to store");

    let mut filter_params: Vec<ParameterManifest> = resource
        .schema
        .properties
        .iter()
        .filter(|p| !p.transient && !p.multi_valued && p.inline_schema().is_none())
        .map(|p| {
            let description = p
                .description
                .clone()
                .unwrap_or_else(|| format!("Filter by {}", p.name));
            ParameterManifest::new(&p.name, false, &p.type_name, &description)
        })
        .collect();
    filter_params.extend([sort.clone(), limit.clone(), offset.clone(), fields.clone(), embed.clone()]);

    let cursor_default = resource
        .config
        .cursor_property
        .clone()
        .unwrap_or_else(|| alias.to_string());
    let entries = vec![
        (
            Action::List,
            ActionManifest {
                uri: base.to_string(),
                methods: methods(&[Method::GET, Method::HEAD]),
                parameters: vec![
                    ParameterManifest::new(&names.cursor, false, "string", "Property to paginate by")
                        .with_default(Value::String(cursor_default)),
                    ParameterManifest::new(&names.last, false, "string", "Cursor value of the last row seen"),
                    ParameterManifest::new(
                        &names.last_id,
                        false,
                        "string",
                        "Identity of the last row seen, for non-unique cursors",
                    ),
                    ParameterManifest::new(&names.dir, false, "string", "ASC or DESC")
                        .with_default(Value::String("ASC".into())),
                    limit.clone(),
                    fields.clone(),
                    embed.clone(),
                ],
                description: format!("List {} resources by cursor", type_name),
                returns: format!("Vec<{}>", type_name),
            },
        ),
        (
            Action::Show,
            ActionManifest {
                uri: member.clone(),
                methods: methods(&[Method::GET, Method::HEAD]),
                parameters: vec![identifier.clone(), fields.clone(), embed.clone()],
                description: format!("Show one {}", type_name),
                returns: type_name.clone(),
            },
        ),
        (
            Action::Create,
            ActionManifest {
                uri: format!("{}/({{{}}})", base, alias),
                methods: methods(&[Method::POST]),
                parameters: vec![
                    ParameterManifest::new(alias, false, "string", "Identifier to create the resource under"),
                    resource_arg.clone(),
                    ParameterManifest::new(
                        &names.resources,
                        false,
                        &format!("Vec<{}>", type_name),
                        "Resources to create together, all or none",
                    ),
                ],
                description: format!("Create {} resources", type_name),
                returns: type_name.clone(),
            },
        ),
        (
            Action::Update,
            ActionManifest {
                uri: member.clone(),
                methods: methods(&[Method::PUT, Method::PATCH]),
                parameters: vec![identifier.clone(), resource_arg],
                description: format!("Update one {}", type_name),
                returns: "empty".into(),
            },
        ),
        (
            Action::Remove,
            ActionManifest {
                uri: member,
                methods: methods(&[Method::DELETE]),
                parameters: vec![identifier],
                description: format!("Remove one {}", type_name),
                returns: "empty".into(),
            },
        ),
        (
            Action::Describe,
            ActionManifest {
                uri: format!("{}/describe", base),
                methods: methods(&[Method::GET]),
                parameters: Vec::new(),
                description: format!("Schema of {}", type_name),
                returns: "schema".into(),
            },
        ),
        (
            Action::Filter,
            ActionManifest {
                uri: format!("{}/filter", base),
                methods: methods(&[Method::GET]),
                parameters: filter_params,
                description: format!("Filter {} resources by property values", type_name),
                returns: format!("Vec<{}>", type_name),
            },
        ),
        (
            Action::Search,
            ActionManifest {
                uri: format!("{}/search", base),
                methods: methods(&[Method::GET]),
                parameters: vec![
                    ParameterManifest::new(
                        &names.query,
                        true,
                        "string",
                        "Terms; +term is required, -term excluded, \"quoted phrases\" kept together",
                    ),
                    ParameterManifest::new(&names.search, false, "string", "Comma separated properties to search"),
                    sort,
                    limit,
                    offset,
                    fields,
                    embed,
                ],
                description: format!("Search {} resources", type_name),
                returns: "{terms, fields, results}".into(),
            },
        ),
    ];

    let mut out = Map::new();
    for (action, manifest) in entries {
        out.insert(action.name().to_string(), manifest_value(&manifest));
    }
    for extension in extensions {
        let manifest = ActionManifest {
            uri: format!("{}/{}", base, extension.name()),
            methods: methods(&extension.methods()),
            parameters: extension.parameters(),
            description: extension.description().to_string(),
            returns: "json".into(),
        };
        out.insert(extension.name().to_string(), manifest_value(&manifest));
    }
    out
}

fn manifest_value(manifest: &ActionManifest) -> Value {
    serde_json::to_value(manifest).unwrap_or(Value::Null)
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPoint {
    pub uri: String,
    pub resource_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryManifest {
    pub api_version: String,
    pub entrypoints: Map<String, Value>,
}

/// One entry per resource pointing at its discovery URI. `root` is the
/// mount URI the resources hang off.
pub fn entry_manifest(model: &ResolvedModel, root: &str, api_version: &str, normalize_types: bool) -> EntryManifest {
    let mut entrypoints = Map::new();
    for resource in model.iter() {
        let entity_type = resource.entity_type();
        let entry = EntryPoint {
            uri: format!("{}/{}/discover", root, resource.segment()),
            resource_type: if normalize_types {
                normalize_type_name(entity_type)
            } else {
                entity_type.to_string()
            },
            description: resource.description.clone(),
        };
        entrypoints.insert(
            resource.segment().to_string(),
            serde_json::to_value(&entry).unwrap_or(Value::Null),
        );
    }
    EntryManifest {
        api_version: api_version.to_string(),
        entrypoints,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{resolve as resolve_model, ApiConfig};
    use crate::schema::reflect::tests::fixture_registry;
    use crate::schema::SchemaCache;

    #[test]
    fn index_resolves_by_method_and_identifier() {
        let cases = [
            (Method::GET, false, Action::List),
            (Method::HEAD, false, Action::List),
            (Method::GET, true, Action::Show),
            (Method::HEAD, true, Action::Show),
            (Method::POST, false, Action::Create),
            (Method::POST, true, Action::Create),
            (Method::PUT, true, Action::Update),
            (Method::PATCH, true, Action::Update),
            (Method::DELETE, true, Action::Remove),
            (Method::OPTIONS, true, Action::Options),
        ];
        for (method, has_id, expected) in cases {
            assert_eq!(resolve(Action::Index, &method, has_id).unwrap(), expected, "{} {}", method, has_id);
        }
        assert!(matches!(
            resolve(Action::Index, &Method::TRACE, false),
            Err(AppError::MethodNotAllowed(_))
        ));
    }

    #[test]
    fn named_actions_pass_through_except_options() {
        assert_eq!(resolve(Action::Search, &Method::GET, false).unwrap(), Action::Search);
        assert_eq!(resolve(Action::Describe, &Method::OPTIONS, false).unwrap(), Action::Options);
        assert_eq!(Action::from_segment("filter"), Some(Action::Filter));
        assert_eq!(Action::from_segment("show"), None);
    }

    fn model() -> ResolvedModel {
        let schemas = SchemaCache::new(Arc::new(fixture_registry()));
        let resources = ApiConfig::from_json_str(
            r#"{"resources": [{"path_segment": "aggregates", "entity_type": "AggregateRoot", "description": "Roots"}]}"#,
        )
        .unwrap()
        .resources;
        resolve_model(&resources, &schemas).unwrap()
    }

    #[test]
    fn crud_actions_share_the_index_uri() {
        let model = model();
        let manifest = resource_manifest(model.resource("aggregates").unwrap(), "/api/aggregates", &[]);
        assert_eq!(manifest["list"]["uri"], "/api/aggregates");
        assert_eq!(manifest["show"]["uri"], "/api/aggregates/{uuid}");
        assert_eq!(manifest["create"]["uri"], "/api/aggregates/({uuid})");
        assert_eq!(manifest["remove"]["uri"], "/api/aggregates/{uuid}");
        assert_eq!(manifest["search"]["parameters"][0]["required"], true);
        assert!(manifest.get("discover").is_none());
        assert!(manifest.get("options").is_none());
    }

    #[test]
    fn entry_manifest_links_discovery() {
        let manifest = entry_manifest(&model(), "http://h/api", "2.1", false);
        assert_eq!(manifest.api_version, "2.1");
        assert_eq!(manifest.entrypoints["aggregates"]["uri"], "http://h/api/aggregates/discover");
        assert_eq!(manifest.entrypoints["aggregates"]["resourceType"], "AggregateRoot");
        assert_eq!(manifest.entrypoints["aggregates"]["description"], "Roots");
    }

    struct Ping;

    #[async_trait]
    impl ActionExtension for Ping {
        fn name(&self) -> &str {
            "ping"
        }

        async fn invoke(&self, _ctx: ActionContext<'_>) -> Result<Value, AppError> {
            Ok(Value::String("pong".into()))
        }
    }

    struct Shadow;

    #[async_trait]
    impl ActionExtension for Shadow {
        fn name(&self) -> &str {
            "search"
        }

        async fn invoke(&self, _ctx: ActionContext<'_>) -> Result<Value, AppError> {
            Ok(Value::Null)
        }
    }

    #[test]
    fn registry_rejects_builtin_and_duplicate_names() {
        let mut registry = ActionRegistry::new();
        registry.register("aggregates", Arc::new(Ping)).unwrap();
        assert!(registry.register("aggregates", Arc::new(Ping)).is_err());
        assert!(registry.register("aggregates", Arc::new(Shadow)).is_err());
        assert!(registry.get("aggregates", "ping").is_some());
        assert!(registry.for_segment("other").is_empty());
    }
}
