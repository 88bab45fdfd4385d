//! Keyset pagination: comparator predicates, orderings and adjacent page cursors.

use crate::document::{first_value_at, identity_value};
use crate::error::AppError;
use crate::query::predicate::{Direction, Ordering, Predicate, Query};
use crate::schema::IDENTITY_PATH;
use serde_json::Value;

#[derive(Clone, Debug, PartialEq)]
pub struct CursorPageRequest {
    /// Document path compared against `last_cursor_value`.
    pub cursor_property: String,
    pub direction: Direction,
    pub last_cursor_value: Option<Value>,
    /// Tie-break identity of the last seen row; needed when the cursor is not unique.
    pub last_identity: Option<Value>,
    pub limit: Option<u64>,
}

impl CursorPageRequest {
    /// Results fetched in reverse to get the right window are flipped back.
    pub fn reverses_results(&self) -> bool {
        self.last_identity.is_some() && self.direction == Direction::Desc
    }
}

/// The identity path doubles as "first identity component" when used as a cursor.
pub fn cursor_path(cursor: &str, identity: &[String]) -> String {
    if cursor == IDENTITY_PATH {
        identity
            .first()
            .cloned()
            .unwrap_or_else(|| IDENTITY_PATH.to_string())
    } else {
        cursor.to_string()
    }
}

/// Pair each identity component with its value from `lastId`.
pub fn identity_components(
    value: &Value,
    identity: &[String],
) -> Result<Vec<(String, Value)>, AppError> {
    match (identity, value) {
        ([], _) => Err(AppError::BadRequest("resource has no identity".into())),
        ([single], Value::Object(map)) => map
            .get(single)
            .or_else(|| map.values().next())
            .map(|v| vec![(single.clone(), v.clone())])
            .ok_or_else(|| AppError::BadRequest("empty identity".into())),
        ([single], Value::Array(items)) => items
            .first()
            .map(|v| vec![(single.clone(), v.clone())])
            .ok_or_else(|| AppError::BadRequest("empty identity".into())),
        ([single], scalar) => Ok(vec![(single.clone(), scalar.clone())]),
        (components, Value::Object(map)) => components
            .iter()
            .map(|c| {
                map.get(c)
                    .map(|v| (c.clone(), v.clone()))
                    .ok_or_else(|| AppError::BadRequest(format!("missing identity component '{}'", c)))
            })
            .collect(),
        (components, Value::Array(items)) if items.len() == components.len() => Ok(components
            .iter()
            .cloned()
            .zip(items.iter().cloned())
            .collect()),
        (components, _) => Err(AppError::BadRequest(format!(
            "compound identity expects components {:?}",
            components
        ))),
    }
}

/// `C > V` alone, or with a tie-break identity
/// `C >= V AND (C > V OR every identity component > I)`; mirrored for DESC.
pub fn build_cursor_predicate(
    request: &CursorPageRequest,
    identity: &[String],
) -> Result<Option<Predicate>, AppError> {
    let Some(last) = &request.last_cursor_value else {
        return Ok(None);
    };
    let cursor = cursor_path(&request.cursor_property, identity);
    let strict = request.direction.strict();
    let Some(last_identity) = &request.last_identity else {
        return Ok(Some(Predicate::compare(cursor, strict, last.clone())));
    };
    let tie_break: Vec<Predicate> = identity_components(last_identity, identity)?
        .into_iter()
        .map(|(path, v)| Predicate::compare(path, strict, v))
        .collect();
    let tie_break = Predicate::all(tie_break).unwrap_or(Predicate::And(Vec::new()));
    Ok(Some(Predicate::And(vec![
        Predicate::compare(cursor.clone(), request.direction.inclusive(), last.clone()),
        Predicate::Or(vec![Predicate::compare(cursor, strict, last.clone()), tie_break]),
    ])))
}

/// Cursor first, then each identity component, all in the request direction.
pub fn cursor_orderings(request: &CursorPageRequest, identity: &[String]) -> Vec<Ordering> {
    let cursor = cursor_path(&request.cursor_property, identity);
    let mut orderings = vec![Ordering::new(cursor.clone(), request.direction)];
    for component in identity {
        if *component != cursor {
            orderings.push(Ordering::new(component.clone(), request.direction));
        }
    }
    orderings
}

pub fn cursor_query(
    request: &CursorPageRequest,
    identity: &[String],
    filter: Option<Predicate>,
) -> Result<Query, AppError> {
    let query = Query {
        predicate: filter,
        orderings: cursor_orderings(request, identity),
        limit: request.limit.filter(|l| *l > 0),
        offset: None,
    };
    Ok(query.and_where(build_cursor_predicate(request, identity)?))
}

/// Arguments of a link to an adjacent page.
#[derive(Clone, Debug, PartialEq)]
pub struct CursorLink {
    pub cursor: Option<String>,
    pub limit: Option<u64>,
    pub direction: Direction,
    pub last: Value,
    pub last_identity: Option<Value>,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct AdjacentPages {
    pub next: Option<CursorLink>,
    pub prev: Option<CursorLink>,
}

/// Next continues past the far edge of the page in the request direction; prev
/// runs the flipped direction from the near edge. `rows` must be in query
/// order, before any reversal.
pub fn adjacent_pages(
    request: &CursorPageRequest,
    requested_cursor: Option<&str>,
    rows: &[Value],
    identity: &[String],
) -> AdjacentPages {
    let cursor = cursor_path(&request.cursor_property, identity);
    let link = |row: &Value, direction: Direction| -> Option<CursorLink> {
        let last = first_value_at(row, &cursor).filter(|v| !v.is_null())?.clone();
        let last_identity = match &request.last_identity {
            Some(_) => Some(identity_value(row, identity)?),
            None => None,
        };
        Some(CursorLink {
            cursor: requested_cursor.map(str::to_string),
            limit: request.limit,
            direction,
            last,
            last_identity,
        })
    };
    let page_full = match request.limit {
        None | Some(0) => true,
        Some(limit) => rows.len() as u64 >= limit,
    };
    AdjacentPages {
        next: rows
            .last()
            .filter(|_| page_full)
            .and_then(|row| link(row, request.direction)),
        prev: rows.first().and_then(|row| link(row, request.direction.flip())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::predicate::Comparison;
    use serde_json::json;

    fn request(last: Option<Value>, last_id: Option<Value>, dir: Direction) -> CursorPageRequest {
        CursorPageRequest {
            cursor_property: "title".into(),
            direction: dir,
            last_cursor_value: last,
            last_identity: last_id,
            limit: Some(2),
        }
    }

    fn technical() -> Vec<String> {
        vec![IDENTITY_PATH.to_string()]
    }

    #[test]
    fn unique_cursor_is_a_strict_bound() {
        let p = build_cursor_predicate(&request(Some(json!("b")), None, Direction::Desc), &technical())
            .unwrap()
            .unwrap();
        assert_eq!(p, Predicate::compare("title", Comparison::Lt, json!("b")));
    }

    #[test]
    fn tie_break_uses_inclusive_outer_bound() {
        let p = build_cursor_predicate(
            &request(Some(json!("b")), Some(json!("id-1")), Direction::Asc),
            &technical(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(
            p,
            Predicate::And(vec![
                Predicate::compare("title", Comparison::Ge, json!("b")),
                Predicate::Or(vec![
                    Predicate::compare("title", Comparison::Gt, json!("b")),
                    Predicate::compare("__identity", Comparison::Gt, json!("id-1")),
                ]),
            ])
        );
    }

    #[test]
    fn compound_tie_break_requires_every_component() {
        let identity = vec!["code".to_string(), "year".to_string()];
        let p = build_cursor_predicate(
            &request(Some(json!("b")), Some(json!(["X", 2024])), Direction::Asc),
            &identity,
        )
        .unwrap()
        .unwrap();
        let Predicate::And(parts) = p else { panic!("expected conjunction") };
        assert_eq!(
            parts[1],
            Predicate::Or(vec![
                Predicate::compare("title", Comparison::Gt, json!("b")),
                Predicate::And(vec![
                    Predicate::compare("code", Comparison::Gt, json!("X")),
                    Predicate::compare("year", Comparison::Gt, json!(2024)),
                ]),
            ])
        );
        assert!(build_cursor_predicate(&request(Some(json!("b")), Some(json!("X")), Direction::Asc), &identity).is_err());
    }

    #[test]
    fn orderings_follow_cursor_then_identity() {
        let o = cursor_orderings(&request(None, None, Direction::Desc), &technical());
        assert_eq!(
            o,
            vec![
                Ordering::new("title", Direction::Desc),
                Ordering::new("__identity", Direction::Desc)
            ]
        );
        let mut r = request(None, None, Direction::Asc);
        r.cursor_property = IDENTITY_PATH.into();
        assert_eq!(cursor_orderings(&r, &technical()).len(), 1);
    }

    #[test]
    fn reversal_only_for_descending_tie_break() {
        assert!(request(None, Some(json!("x")), Direction::Desc).reverses_results());
        assert!(!request(None, None, Direction::Desc).reverses_results());
        assert!(!request(None, Some(json!("x")), Direction::Asc).reverses_results());
    }

    #[test]
    fn adjacent_pages_use_page_edges() {
        let rows = vec![
            json!({"title": "a", "__identity": "1"}),
            json!({"title": "b", "__identity": "2"}),
        ];
        let r = request(None, Some(json!("0")), Direction::Asc);
        let pages = adjacent_pages(&r, Some("title"), &rows, &technical());
        let next = pages.next.unwrap();
        assert_eq!(next.last, json!("b"));
        assert_eq!(next.last_identity, Some(json!("2")));
        assert_eq!(next.direction, Direction::Asc);
        let prev = pages.prev.unwrap();
        assert_eq!(prev.last, json!("a"));
        assert_eq!(prev.direction, Direction::Desc);
    }

    #[test]
    fn short_page_has_no_next() {
        let rows = vec![json!({"title": "a", "__identity": "1"})];
        let pages = adjacent_pages(&request(None, None, Direction::Asc), None, &rows, &technical());
        assert!(pages.next.is_none());
        assert!(pages.prev.unwrap().last_identity.is_none());
    }
}
