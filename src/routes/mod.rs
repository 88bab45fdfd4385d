//! Router assembly.

mod common;
mod resource;

pub use common::common_routes;
pub use resource::resource_routes;

use crate::state::AppState;
use axum::Router;

/// Common routes at the root, resources under the configured mount path.
pub fn app(state: AppState) -> Router {
    let mount = state.settings.mount_path.trim_matches('/').to_string();
    let resources = resource_routes(state.clone());
    let router = common_routes(state);
    if mount.is_empty() {
        router.merge(resources)
    } else {
        router.nest(&format!("/{}", mount), resources)
    }
}
