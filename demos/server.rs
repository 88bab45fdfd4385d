//! Example server: loads descriptors from CONFIG_PATH, stores documents in
//! Postgres, mounts health routes and the resource surface.

use resource_sdk::{app, ensure_database_exists, init_tracing, load_from_dir, AppState, PgStore};
use std::sync::Arc;
use tokio::net::TcpListener;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    init_tracing("resource_sdk=info");

    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "postgres://localhost/resources".into());
    ensure_database_exists(&database_url).await?;
    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;
    let store = PgStore::new(pool);
    store.ensure_document_table().await?;

    let config_path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "demos/config".into());
    let config = load_from_dir(&config_path).await?;
    let state = AppState::from_config(Arc::new(store), &config)?;

    let listener = TcpListener::bind("0.0.0.0:3000").await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app(state)).await?;
    Ok(())
}
