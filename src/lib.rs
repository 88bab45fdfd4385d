//! Resource SDK: descriptor-driven REST resources over a document store, with
//! keyset pagination, property filters and term search.

pub mod action;
pub mod config;
pub mod document;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod link;
pub mod logging;
pub mod projection;
pub mod query;
pub mod response;
pub mod routes;
pub mod schema;
pub mod service;
pub mod sql;
pub mod state;
pub mod store;

pub use action::{Action, ActionContext, ActionExtension, ActionRegistry, ParameterManifest};
pub use config::{load_from_dir, load_model, resolve, ApiConfig, ApiSettings, ResolvedModel, ResolvedResource};
pub use error::{AppError, ConfigError, FieldError, StoreError};
pub use logging::init_tracing;
pub use routes::{app, common_routes, resource_routes};
pub use schema::{DescribeType, SchemaCache, TypeCatalog, TypeRegistry};
pub use service::ResourceService;
pub use state::AppState;
pub use store::{ensure_database_exists, MemoryStore, PgStore, ResourceStore};
