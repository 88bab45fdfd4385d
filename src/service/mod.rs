//! ResourceService: resource actions over a `ResourceStore`, with input mapping and validation.

pub mod mapping;
pub mod resource;
pub mod validation;
pub use mapping::{DocumentMapper, MapMode, MappedDocument, PendingReference};
pub use resource::{arg_str, Args, Created, ListPage, ResourceService, SearchResult};
pub use validation::{codes, RequestValidator};
