use crate::query::filter::canonical_path;
use crate::query::predicate::{Direction, Ordering};
use crate::schema::ResourceSchema;

/// Comma list of properties, `-` prefix for descending. Paths outside the
/// persistence schema are ignored.
pub fn parse_sort(sort: &str, schema: &ResourceSchema, alias: &str) -> Vec<Ordering> {
    sort.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|entry| {
            let (name, direction) = match entry.strip_prefix('-') {
                Some(name) => (name, Direction::Desc),
                None => (entry.trim_start_matches('+'), Direction::Asc),
            };
            let path = canonical_path(name, alias);
            schema
                .is_persistent_path(&path, false)
                .then(|| Ordering::new(path, direction))
        })
        .collect()
}
