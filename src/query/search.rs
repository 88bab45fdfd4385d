//! Boolean term search over string properties.

use crate::query::predicate::Predicate;
use crate::schema::{ResourceSchema, IDENTITY_PATH};
use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

fn token_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"([-+]?"[^"]+"|[^\s]+)\s*"#).expect("token pattern compiles"))
}

/// Tokenized search query, one bucket per term class.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct SearchTerms {
    #[serde(rename = "*", skip_serializing_if = "Vec::is_empty")]
    pub any: Vec<String>,
    #[serde(rename = "+", skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(rename = "-", skip_serializing_if = "Vec::is_empty")]
    pub excluded: Vec<String>,
}

impl SearchTerms {
    /// Split on whitespace, keeping `"quoted phrases"` together. A leading `+`
    /// marks a required term, `-` an excluded one.
    pub fn parse(query: &str) -> Self {
        let mut terms = SearchTerms::default();
        for capture in token_pattern().captures_iter(query) {
            let token = &capture[1];
            let bucket = match token.chars().next() {
                Some('+') => &mut terms.required,
                Some('-') => &mut terms.excluded,
                _ => &mut terms.any,
            };
            let term = token.trim_start_matches(['+', '-']).trim_matches('"');
            if term.is_empty() || bucket.iter().any(|t| t == term) {
                continue;
            }
            bucket.push(term.to_string());
        }
        terms
    }

    pub fn is_empty(&self) -> bool {
        self.any.is_empty() && self.required.is_empty() && self.excluded.is_empty()
    }
}

/// Properties to search: the requested comma list when given, otherwise every
/// searchable leaf. Either way only eligible paths are kept.
pub fn search_fields(schema: &ResourceSchema, requested: Option<&str>, alias: &str) -> Vec<String> {
    let identity_suffix = format!(".{}", alias);
    let candidates: Vec<String> = match requested {
        Some(list) => list
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| s.replace(&identity_suffix, &format!(".{}", IDENTITY_PATH)))
            .collect(),
        None => schema.searchable_paths(),
    };
    let mut fields: Vec<String> = Vec::with_capacity(candidates.len());
    for field in candidates {
        if field.ends_with(IDENTITY_PATH) || !schema.is_persistent_path(&field, true) {
            continue;
        }
        if !fields.contains(&field) {
            fields.push(field);
        }
    }
    fields
}

fn contains(path: &str, term: &str) -> Predicate {
    Predicate::like(path, format!("%{}%", term), false)
}

/// Optional terms: any field contains any term. Required: every term in some
/// field. Excluded: no field contains the term, a null field counting as not
/// containing it.
pub fn build_search_predicate(terms: &SearchTerms, properties: &[String]) -> Option<Predicate> {
    let mut clauses = Vec::new();
    if !terms.any.is_empty() {
        clauses.push(Predicate::Or(
            terms
                .any
                .iter()
                .flat_map(|t| properties.iter().map(move |p| contains(p, t)))
                .collect(),
        ));
    }
    for term in &terms.required {
        clauses.push(Predicate::Or(properties.iter().map(|p| contains(p, term)).collect()));
    }
    for term in &terms.excluded {
        for p in properties {
            clauses.push(Predicate::Or(vec![
                Predicate::IsNull(p.clone()),
                contains(p, term).negate(),
            ]));
        }
    }
    Predicate::all(clauses)
}
