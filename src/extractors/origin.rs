//! Base URI for generated links: configured base URL, else the request `Host`.

use crate::state::AppState;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts},
};
use std::convert::Infallible;

#[derive(Clone, Debug, PartialEq)]
pub struct Origin {
    /// Scheme, host and mount path, without a trailing slash. Path-only when
    /// absolute URIs are disabled.
    pub root: String,
}

impl Origin {
    pub fn resource(&self, segment: &str) -> String {
        format!("{}/{}", self.root, segment)
    }
}

fn join(host: &str, mount: &str) -> String {
    let mount = mount.trim_matches('/');
    let host = host.trim_end_matches('/');
    if mount.is_empty() {
        host.to_string()
    } else {
        format!("{}/{}", host, mount)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for Origin {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let settings = &state.settings;
        let host = if !settings.use_absolute_uris {
            String::new()
        } else if let Some(base) = &settings.base_url {
            base.clone()
        } else {
            parts
                .headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .map(|h| format!("http://{}", h))
                .unwrap_or_default()
        };
        Ok(Origin {
            root: join(&host, &settings.mount_path),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn joins_host_and_mount_path() {
        assert_eq!(join("http://h/", "/api/v1/"), "http://h/api/v1");
        assert_eq!(join("http://h", ""), "http://h");
        assert_eq!(join("", "api"), "/api");
    }
}
