pub mod cursor;
pub mod filter;
pub mod predicate;
pub mod search;
pub mod sort;

pub use cursor::{adjacent_pages, build_cursor_predicate, cursor_query, AdjacentPages, CursorLink, CursorPageRequest};
pub use filter::{build_filter_predicate, canonical_path, filter_set, FilterSet};
pub use predicate::{Comparison, Direction, Ordering, Predicate, Query};
pub use search::{build_search_predicate, search_fields, SearchTerms};
pub use sort::parse_sort;
