//! In-process store evaluating predicates over JSON documents.

use crate::document::{first_value_at, scalar_text, values_at};
use crate::error::StoreError;
use crate::query::{Comparison, Direction, Ordering, Predicate, Query};
use crate::store::ResourceStore;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering as CmpOrdering;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Documents kept in insertion order per entity type.
#[derive(Default)]
pub struct MemoryStore {
    partitions: RwLock<HashMap<String, Vec<(String, Value)>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn query(&self, entity_type: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        tracing::debug!(entity_type, predicate = ?query.predicate, orderings = ?query.orderings, "query");
        let partitions = self.partitions.read().await;
        let Some(documents) = partitions.get(entity_type) else {
            return Ok(Vec::new());
        };
        let mut matched: Vec<&Value> = documents
            .iter()
            .map(|(_, doc)| doc)
            .filter(|doc| {
                query
                    .predicate
                    .as_ref()
                    .map_or(true, |p| evaluate(p, doc) == Some(true))
            })
            .collect();
        matched.sort_by(|a, b| order_documents(a, b, &query.orderings));
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.map_or(usize::MAX, |l| l as usize);
        Ok(matched.into_iter().skip(offset).take(limit).cloned().collect())
    }

    async fn find(&self, entity_type: &str, identifier: &str) -> Result<Option<Value>, StoreError> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .get(entity_type)
            .and_then(|docs| docs.iter().find(|(id, _)| id == identifier))
            .map(|(_, doc)| doc.clone()))
    }

    async fn add(&self, entity_type: &str, identifier: &str, document: Value) -> Result<(), StoreError> {
        self.add_all(entity_type, vec![(identifier.to_string(), document)]).await
    }

    async fn add_all(&self, entity_type: &str, documents: Vec<(String, Value)>) -> Result<(), StoreError> {
        let mut partitions = self.partitions.write().await;
        let partition = partitions.entry(entity_type.to_string()).or_default();
        for (i, (identifier, _)) in documents.iter().enumerate() {
            let taken = partition.iter().any(|(id, _)| id == identifier)
                || documents[..i].iter().any(|(id, _)| id == identifier);
            if taken {
                return Err(StoreError::Conflict {
                    identifier: identifier.clone(),
                });
            }
        }
        partition.extend(documents);
        Ok(())
    }

    async fn update(&self, entity_type: &str, identifier: &str, document: Value) -> Result<bool, StoreError> {
        let mut partitions = self.partitions.write().await;
        let slot = partitions
            .get_mut(entity_type)
            .and_then(|docs| docs.iter_mut().find(|(id, _)| id == identifier));
        Ok(match slot {
            Some((_, doc)) => {
                *doc = document;
                true
            }
            None => false,
        })
    }

    async fn remove(&self, entity_type: &str, identifier: &str) -> Result<bool, StoreError> {
        let mut partitions = self.partitions.write().await;
        let Some(docs) = partitions.get_mut(entity_type) else {
            return Ok(false);
        };
        let before = docs.len();
        docs.retain(|(id, _)| id != identifier);
        Ok(docs.len() != before)
    }
}

/// SQL three-valued evaluation: `None` is unknown. Comparisons against a
/// missing or null value are unknown; paths through collections match if any
/// element does.
pub fn evaluate(predicate: &Predicate, doc: &Value) -> Option<bool> {
    match predicate {
        Predicate::Equals { path, value } => {
            any_present(doc, path, |v| compare(v, value) == Some(CmpOrdering::Equal) || v == value)
        }
        Predicate::Like {
            path,
            pattern,
            case_sensitive,
        } => any_present(doc, path, |v| {
            scalar_text(v).map_or(false, |text| like_match(pattern, &text, *case_sensitive))
        }),
        Predicate::Compare { path, op, value } => any_present(doc, path, |v| {
            compare(v, value).map_or(false, |ord| satisfies(*op, ord))
        }),
        Predicate::IsNull(path) => Some(values_at(doc, path).iter().all(|v| v.is_null())),
        Predicate::And(parts) => {
            let mut unknown = false;
            for p in parts {
                match evaluate(p, doc) {
                    Some(false) => return Some(false),
                    None => unknown = true,
                    Some(true) => {}
                }
            }
            if unknown {
                None
            } else {
                Some(true)
            }
        }
        Predicate::Or(parts) => {
            let mut unknown = false;
            for p in parts {
                match evaluate(p, doc) {
                    Some(true) => return Some(true),
                    None => unknown = true,
                    Some(false) => {}
                }
            }
            if unknown {
                None
            } else {
                Some(false)
            }
        }
        Predicate::Not(inner) => evaluate(inner, doc).map(|b| !b),
    }
}

fn any_present(doc: &Value, path: &str, test: impl Fn(&Value) -> bool) -> Option<bool> {
    let values: Vec<&Value> = values_at(doc, path).into_iter().filter(|v| !v.is_null()).collect();
    if values.is_empty() {
        return None;
    }
    Some(values.into_iter().any(test))
}

fn satisfies(op: Comparison, ord: CmpOrdering) -> bool {
    match op {
        Comparison::Gt => ord == CmpOrdering::Greater,
        Comparison::Ge => ord != CmpOrdering::Less,
        Comparison::Lt => ord == CmpOrdering::Less,
        Comparison::Le => ord != CmpOrdering::Greater,
    }
}

/// Same-typed comparison; numeric strings compare against numbers.
fn compare(a: &Value, b: &Value) -> Option<CmpOrdering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::String(y)) => x.as_f64()?.partial_cmp(&y.parse::<f64>().ok()?),
        (Value::String(x), Value::Number(y)) => x.parse::<f64>().ok()?.partial_cmp(&y.as_f64()?),
        _ => None,
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::String(_) => 1,
        Value::Number(_) => 2,
        Value::Bool(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Nulls sort last ascending and first descending.
fn order_documents(a: &Value, b: &Value, orderings: &[Ordering]) -> CmpOrdering {
    for ordering in orderings {
        let x = first_value_at(a, &ordering.path).filter(|v| !v.is_null());
        let y = first_value_at(b, &ordering.path).filter(|v| !v.is_null());
        let ord = match (x, y) {
            (None, None) => CmpOrdering::Equal,
            (None, Some(_)) => CmpOrdering::Greater,
            (Some(_), None) => CmpOrdering::Less,
            (Some(x), Some(y)) => compare(x, y).unwrap_or_else(|| type_rank(x).cmp(&type_rank(y))),
        };
        let ord = match ordering.direction {
            Direction::Asc => ord,
            Direction::Desc => ord.reverse(),
        };
        if ord != CmpOrdering::Equal {
            return ord;
        }
    }
    CmpOrdering::Equal
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum LikeToken {
    Any,
    One,
    Literal(char),
}

fn like_tokens(pattern: &str) -> Vec<LikeToken> {
    let mut tokens = Vec::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        tokens.push(match c {
            '%' => LikeToken::Any,
            '_' => LikeToken::One,
            '\\' => LikeToken::Literal(chars.next().unwrap_or('\\')),
            other => LikeToken::Literal(other),
        });
    }
    tokens
}

/// SQL `LIKE`: `%` any run, `_` one character, backslash escapes.
pub fn like_match(pattern: &str, text: &str, case_sensitive: bool) -> bool {
    let (pattern, text) = if case_sensitive {
        (pattern.to_string(), text.to_string())
    } else {
        (pattern.to_lowercase(), text.to_lowercase())
    };
    let tokens = like_tokens(&pattern);
    let chars: Vec<char> = text.chars().collect();
    let (mut t, mut c) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;
    while c < chars.len() {
        match tokens.get(t) {
            Some(LikeToken::One) => {
                t += 1;
                c += 1;
            }
            Some(LikeToken::Literal(ch)) if *ch == chars[c] => {
                t += 1;
                c += 1;
            }
            Some(LikeToken::Any) => {
                backtrack = Some((t, c));
                t += 1;
            }
            _ => match backtrack {
                Some((bt, bc)) => {
                    t = bt + 1;
                    c = bc + 1;
                    backtrack = Some((bt, bc + 1));
                }
                None => return false,
            },
        }
    }
    tokens[t..].iter().all(|tok| *tok == LikeToken::Any)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn like_wildcards() {
        assert!(like_match("%Bar%", "Foo Bar", true));
        assert!(!like_match("%bar%", "Foo Bar", true));
        assert!(like_match("%bar%", "Foo Bar", false));
        assert!(like_match("F_o%", "Foo", true));
        assert!(!like_match("F_o", "Fooo", true));
        assert!(like_match("100\\%", "100%", true));
        assert!(like_match("%@trackmyrace.com", "a@trackmyrace.com", false));
    }

    #[test]
    fn not_over_null_is_unknown_but_null_check_rescues_it() {
        let doc = json!({"title": null});
        let contains = Predicate::like("title", "%Foo%", true);
        assert_eq!(evaluate(&contains.clone().negate(), &doc), None);
        let safe = Predicate::Or(vec![Predicate::IsNull("title".into()), contains.negate()]);
        assert_eq!(evaluate(&safe, &doc), Some(true));
    }

    #[test]
    fn collections_match_any_element() {
        let doc = json!({"entities": [{"title": "a"}, {"title": "b"}]});
        assert_eq!(evaluate(&Predicate::equals("entities.title", json!("b")), &doc), Some(true));
        assert_eq!(evaluate(&Predicate::equals("entities.title", json!("c")), &doc), Some(false));
    }

    #[test]
    fn search_terms_ignore_case() {
        use crate::query::search::{build_search_predicate, SearchTerms};
        let fields = ["title".to_string()];
        let doc = json!({"title": "Foo Bar"});
        let any = build_search_predicate(&SearchTerms::parse("foo"), &fields).unwrap();
        assert_eq!(evaluate(&any, &doc), Some(true));
        let excluded = build_search_predicate(&SearchTerms::parse("-FOO"), &fields).unwrap();
        assert_eq!(evaluate(&excluded, &doc), Some(false));
    }

    #[test]
    fn numeric_strings_compare_with_numbers() {
        let doc = json!({"n": 10});
        assert_eq!(
            evaluate(&Predicate::compare("n", Comparison::Gt, json!("9")), &doc),
            Some(true)
        );
    }

    #[tokio::test]
    async fn batch_add_is_all_or_nothing() {
        let store = MemoryStore::new();
        store.add("T", "a", json!({"__identity": "a"})).await.unwrap();
        let err = store
            .add_all(
                "T",
                vec![("b".into(), json!({"__identity": "b"})), ("a".into(), json!({"__identity": "a"}))],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict { identifier } if identifier == "a"));
        assert!(store.find("T", "b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn query_orders_and_pages() {
        let store = MemoryStore::new();
        for (id, title) in [("1", Some("c")), ("2", Some("a")), ("3", Some("b")), ("4", None)] {
            store
                .add("T", id, json!({"__identity": id, "title": title}))
                .await
                .unwrap();
        }
        let query = Query {
            orderings: vec![Ordering::new("title", Direction::Asc)],
            limit: Some(3),
            offset: Some(1),
            ..Default::default()
        };
        let ids: Vec<_> = store
            .query("T", &query)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d["__identity"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec!["3", "1", "4"]);
        assert!(store.remove("T", "4").await.unwrap());
        assert!(!store.remove("T", "4").await.unwrap());
    }
}
