//! Request extractors shared by the resource handlers.

pub mod origin;
pub mod query;

pub use origin::Origin;
pub use query::QueryArgs;
