//! Response helpers: pretty JSON bodies and resource headers.

use axum::{
    body::Body,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Serialize;

pub const X_RESOURCE_IDENTIFIER: &str = "x-resource-identifier";
pub const X_API_VERSION: &str = "x-api-version";
pub const CONTENT_SECURITY_POLICY: &str = "default-src 'none'; frame-ancestors 'none'";
pub const ALLOWED_METHODS: &str = "HEAD, GET, POST, PUT, PATCH, DELETE, OPTIONS";

/// Pretty-printed JSON with the given status. Forward slashes stay unescaped.
pub fn pretty_json<T: Serialize>(status: StatusCode, body: &T) -> Response {
    match serde_json::to_vec_pretty(body) {
        Ok(bytes) => (
            status,
            [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
            bytes,
        )
            .into_response(),
        Err(e) => {
            tracing::error!(error = %e, "response serialization failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub fn empty(status: StatusCode) -> Response {
    (status, Body::empty()).into_response()
}

/// 201 with `Location` and, for single creates, `X-Resource-Identifier`.
pub fn created<T: Serialize>(location: &str, identifier: Option<&str>, body: &T) -> Response {
    let mut response = pretty_json(StatusCode::CREATED, body);
    let headers = response.headers_mut();
    if let Ok(v) = HeaderValue::from_str(location) {
        headers.insert(header::LOCATION, v);
    }
    if let Some(id) = identifier.and_then(|id| HeaderValue::from_str(id).ok()) {
        headers.insert(X_RESOURCE_IDENTIFIER, id);
    }
    response
}

/// Append one `Link` header value per entry.
pub fn append_links(response: &mut Response, links: &[String]) {
    for link in links {
        if let Ok(v) = HeaderValue::from_str(link) {
            response.headers_mut().append(header::LINK, v);
        }
    }
}

/// CORS preflight answer. Requested headers are reflected back.
pub fn preflight(requested_headers: Option<&HeaderValue>) -> Response {
    let mut response = empty(StatusCode::OK);
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    if let Some(requested) = requested_headers {
        headers.insert(header::ACCESS_CONTROL_ALLOW_HEADERS, requested.clone());
    }
    headers.insert(
        header::ACCESS_CONTROL_MAX_AGE,
        HeaderValue::from_static("3600"),
    );
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_sets_location_and_identifier() {
        let r = created("http://h/a/1", Some("1"), &serde_json::json!({}));
        assert_eq!(r.status(), StatusCode::CREATED);
        assert_eq!(r.headers().get(header::LOCATION).unwrap(), "http://h/a/1");
        assert_eq!(r.headers().get(X_RESOURCE_IDENTIFIER).unwrap(), "1");
    }

    #[test]
    fn links_are_separate_headers() {
        let mut r = empty(StatusCode::OK);
        append_links(&mut r, &["<a>; rel=\"next\"".into(), "<b>; rel=\"prev\"".into()]);
        assert_eq!(r.headers().get_all(header::LINK).iter().count(), 2);
    }

    #[test]
    fn preflight_reflects_requested_headers() {
        let requested = HeaderValue::from_static("x-foo, content-type");
        let r = preflight(Some(&requested));
        assert_eq!(
            r.headers().get(header::ACCESS_CONTROL_ALLOW_HEADERS).unwrap(),
            "x-foo, content-type"
        );
        assert_eq!(r.headers().get(header::ACCESS_CONTROL_MAX_AGE).unwrap(), "3600");
    }
}
