//! Query-string arguments: `x=1&x=2` and `x[]=` collect into arrays, `x[k]=` into objects.

use crate::service::Args;
use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts};
use serde_json::{Map, Value};
use std::convert::Infallible;
use url::form_urlencoded;

#[derive(Clone, Debug, Default)]
pub struct QueryArgs {
    pub args: Args,
    /// Decoded pairs in request order, for rebuilding page links.
    pub raw: Vec<(String, String)>,
}

impl QueryArgs {
    pub fn parse(query: &str) -> Self {
        let raw: Vec<(String, String)> = form_urlencoded::parse(query.as_bytes()).into_owned().collect();
        let mut args = Map::new();
        for (key, value) in &raw {
            insert(&mut args, key, Value::String(value.clone()));
        }
        QueryArgs { args, raw }
    }
}

fn insert(args: &mut Args, key: &str, value: Value) {
    let bracket = key
        .find('[')
        .filter(|i| *i > 0 && key.ends_with(']'));
    let Some(open) = bracket else {
        match args.get_mut(key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                args.insert(key.to_string(), value);
            }
        }
        return;
    };
    let name = &key[..open];
    let inner = &key[open + 1..key.len() - 1];
    let slot = args.entry(name.to_string()).or_insert(Value::Null);
    if inner.is_empty() {
        match slot {
            Value::Array(items) => items.push(value),
            Value::Null => *slot = Value::Array(vec![value]),
            other => {
                let first = other.take();
                *other = Value::Array(vec![first, value]);
            }
        }
    } else {
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        if let Value::Object(map) = slot {
            map.insert(inner.to_string(), value);
        }
    }
}

#[async_trait]
impl<S> FromRequestParts<S> for QueryArgs
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(QueryArgs::parse(parts.uri.query().unwrap_or("")))
    }
}
