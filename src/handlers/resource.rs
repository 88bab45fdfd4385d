//! Resource handlers: `/{resource}` and `/{resource}/{identifier-or-action}`.
//! Every method lands here; the action is resolved from method, segment and
//! identifier presence.

use crate::action::{self, resource_manifest, Action, ActionContext, ActionExtension};
use crate::config::ResolvedResource;
use crate::error::AppError;
use crate::extractors::{Origin, QueryArgs};
use crate::link::{encode_segment, format_link, page_uri};
use crate::response::{append_links, created, empty, preflight, pretty_json};
use crate::service::{ListPage, ResourceService};
use crate::state::AppState;
use axum::{
    body::{Body, Bytes},
    extract::{Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::sync::Arc;

/// What the path names below the resource.
enum Target<'a> {
    Collection,
    Named(Action),
    Extension(&'a Arc<dyn ActionExtension>),
    Member(&'a str),
}

struct Request<'a> {
    method: Method,
    origin: Origin,
    query: QueryArgs,
    headers: HeaderMap,
    body: Bytes,
    target: Target<'a>,
}

pub async fn index(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    method: Method,
    origin: Origin,
    query: QueryArgs,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = Request {
        method,
        origin,
        query,
        headers,
        body,
        target: Target::Collection,
    };
    finish(&state, dispatch(&state, &segment, request).await)
}

pub async fn member(
    State(state): State<AppState>,
    Path((segment, member)): Path<(String, String)>,
    method: Method,
    origin: Origin,
    query: QueryArgs,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let target = match Action::from_segment(&member) {
        Some(named) => Target::Named(named),
        None => match state.actions.get(&segment, &member) {
            Some(extension) => Target::Extension(extension),
            None => Target::Member(&member),
        },
    };
    let request = Request {
        method,
        origin,
        query,
        headers,
        body,
        target,
    };
    finish(&state, dispatch(&state, &segment, request).await)
}

fn finish(state: &AppState, result: Result<Response, AppError>) -> Response {
    match result {
        Ok(response) => response,
        Err(e) => e.translate(state.settings.expose_internal_errors).into_response(),
    }
}

/// Empty bodies carry no arguments; anything else must be JSON.
fn parse_body(body: &Bytes) -> Result<Option<Value>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| AppError::BadRequest(format!("invalid JSON body: {}", e)))
}

fn is_read(method: &Method) -> bool {
    *method == Method::GET || *method == Method::HEAD
}

async fn dispatch(state: &AppState, segment: &str, request: Request<'_>) -> Result<Response, AppError> {
    let resource = state
        .model
        .resource(segment)
        .ok_or_else(|| AppError::NotFound(format!("resource '{}'", segment)))?;
    let (requested, identifier) = match request.target {
        Target::Collection => (Action::Index, None),
        Target::Member(id) => (Action::Index, Some(id)),
        Target::Named(named) => (named, None),
        Target::Extension(extension) => {
            if request.method == Method::OPTIONS {
                return Ok(preflight(request.headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS)));
            }
            return invoke_extension(state, resource, extension, request).await;
        }
    };
    let resolved = action::resolve(requested, &request.method, identifier.is_some())?;
    tracing::debug!(segment, action = %resolved, method = %request.method, "dispatch");

    let service = ResourceService::new(state.store.as_ref(), &state.schemas, resource);
    let args = &request.query.args;
    let base = request.origin.resource(segment);
    let response = match resolved {
        Action::Options => preflight(request.headers.get(header::ACCESS_CONTROL_REQUEST_HEADERS)),
        named @ (Action::Describe | Action::Discover | Action::Filter | Action::Search)
            if !is_read(&request.method) =>
        {
            tracing::debug!(action = %named, "read-only action called with {}", request.method);
            return Err(AppError::MethodNotAllowed(request.method.to_string()));
        }
        Action::List => {
            let page = service.list(args).await?;
            list_response(resource, &base, &request.query, page)
        }
        Action::Show => {
            let id = identifier.unwrap_or_default();
            pretty_json(StatusCode::OK, &service.show(id, args).await?)
        }
        Action::Create => {
            let body = parse_body(&request.body)?;
            let result = service.create(identifier, body.as_ref(), args).await?;
            if result.batch {
                created(&base, None, &result.body)
            } else {
                let id = result.identifiers.first().map(String::as_str).unwrap_or_default();
                let location = format!("{}/{}", base, encode_segment(id));
                created(&location, Some(id), &result.body)
            }
        }
        Action::Update => {
            let body = parse_body(&request.body)?;
            service.update(identifier.unwrap_or_default(), body.as_ref()).await?;
            empty(StatusCode::OK)
        }
        Action::Remove => {
            service.remove(identifier.unwrap_or_default()).await?;
            empty(StatusCode::NO_CONTENT)
        }
        Action::Describe => pretty_json(
            StatusCode::OK,
            &service.describe(state.settings.normalize_resource_types),
        ),
        Action::Discover => pretty_json(
            StatusCode::OK,
            &Value::Object(resource_manifest(
                resource,
                &base,
                state.actions.for_segment(segment),
            )),
        ),
        Action::Filter => pretty_json(StatusCode::OK, &service.filter(args).await?),
        Action::Search => pretty_json(StatusCode::OK, &service.search(args).await?),
        Action::Index => return Err(AppError::Internal("unresolved index action".into())),
    };
    Ok(strip_head(&request.method, response))
}

fn list_response(resource: &ResolvedResource, base: &str, query: &QueryArgs, page: ListPage) -> Response {
    let names = &resource.config.arguments;
    let mut links = Vec::new();
    if let Some(next) = &page.adjacent.next {
        links.push(format_link(&page_uri(base, &query.raw, names, next), "next"));
    }
    if let Some(prev) = &page.adjacent.prev {
        links.push(format_link(&page_uri(base, &query.raw, names, prev), "prev"));
    }
    let mut response = pretty_json(StatusCode::OK, &page.items);
    append_links(&mut response, &links);
    response
}

async fn invoke_extension(
    state: &AppState,
    resource: &ResolvedResource,
    extension: &Arc<dyn ActionExtension>,
    request: Request<'_>,
) -> Result<Response, AppError> {
    let allowed = extension.methods();
    let permitted = allowed.contains(&request.method)
        || (request.method == Method::HEAD && allowed.contains(&Method::GET));
    if !permitted {
        return Err(AppError::MethodNotAllowed(request.method.to_string()));
    }
    let body = parse_body(&request.body)?;
    let ctx = ActionContext {
        resource,
        store: state.store.as_ref(),
        method: request.method.clone(),
        args: request.query.args,
        body,
    };
    tracing::debug!(segment = resource.segment(), action = extension.name(), "custom action");
    let result = extension.invoke(ctx).await?;
    Ok(strip_head(&request.method, pretty_json(StatusCode::OK, &result)))
}

/// HEAD answers carry the GET headers without a body.
fn strip_head(method: &Method, mut response: Response) -> Response {
    if *method == Method::HEAD {
        *response.body_mut() = Body::empty();
    }
    response
}
