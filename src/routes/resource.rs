//! Resource routes. All methods of a path share one handler so unsupported
//! ones surface as 405 from action resolution.

use crate::handlers::{discover, index, member};
use crate::response::CONTENT_SECURITY_POLICY;
use crate::state::AppState;
use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue},
    routing::{any, get},
    Router,
};
use tower_http::{limit::RequestBodyLimitLayer, set_header::SetResponseHeaderLayer};

pub fn resource_routes(state: AppState) -> Router {
    let body_limit = state.settings.body_limit_bytes;
    Router::new()
        .route("/discover", get(discover))
        .route("/:resource", any(index))
        .route("/:resource/:member", any(member))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(body_limit))
        .layer(SetResponseHeaderLayer::overriding(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
        .layer(SetResponseHeaderLayer::if_not_present(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static(CONTENT_SECURITY_POLICY),
        ))
        .with_state(state)
}
