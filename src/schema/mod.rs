pub mod cache;
pub mod catalog;
pub mod describe;
pub mod reflect;

pub use cache::SchemaCache;
pub use catalog::{DescribeType, TypeCatalog, TypeRegistry};
pub use describe::{describe, normalize_type_name};
pub use reflect::{
    normalize_datetime, reflect, scalar_kind, NestedSchema, PropertyDescriptor, ResourceSchema, ScalarKind,
    IDENTITY_PATH, MAX_RECURSION_DEPTH,
};
