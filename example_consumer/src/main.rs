//! Example consumer: a separate Rust project that uses resource-sdk as a dependency.
//! Serves an in-memory resource with one custom action.
//!
//! Run from repo root: `cargo run -p example-consumer`

use async_trait::async_trait;
use resource_sdk::query::Query;
use resource_sdk::{app, init_tracing, ActionContext, ActionExtension, ApiConfig, AppError, AppState, MemoryStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

const CONFIG: &str = r#"{
    "types": [{"name": "Note", "aggregate_root": true,
               "properties": [{"name": "title", "type": "string"}, {"name": "body", "type": "string"}]}],
    "resources": [{"path_segment": "notes", "entity_type": "Note"}]
}"#;

/// `GET /notes/count`: number of stored notes.
struct CountNotes;

#[async_trait]
impl ActionExtension for CountNotes {
    fn name(&self) -> &str {
        "count"
    }

    fn description(&self) -> &str {
        "Number of stored notes"
    }

    async fn invoke(&self, ctx: ActionContext<'_>) -> Result<Value, AppError> {
        let rows = ctx.store.query(ctx.resource.entity_type(), &Query::default()).await?;
        Ok(json!({ "count": rows.len() }))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("resource_sdk=info,example_consumer=info");

    let config = ApiConfig::from_json_str(CONFIG)?;
    let state = AppState::from_config(Arc::new(MemoryStore::new()), &config)?
        .with_action("notes", Arc::new(CountNotes))?;

    let listener = TcpListener::bind("127.0.0.1:3000").await?;
    let port = listener.local_addr()?.port();
    tracing::info!("Example consumer listening on http://127.0.0.1:{}", port);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
