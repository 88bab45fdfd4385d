//! API entry point: one discovery link per mounted resource.

use crate::action::entry_manifest;
use crate::extractors::Origin;
use crate::response::{pretty_json, X_API_VERSION};
use crate::state::AppState;
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::Response,
};

pub async fn discover(State(state): State<AppState>, origin: Origin) -> Response {
    let settings = &state.settings;
    let manifest = entry_manifest(
        &state.model,
        &origin.root,
        &settings.api_version,
        settings.normalize_resource_types,
    );
    let mut response = pretty_json(StatusCode::OK, &manifest);
    if let Ok(v) = HeaderValue::from_str(&settings.api_version) {
        response.headers_mut().insert(X_API_VERSION, v);
    }
    response
}
