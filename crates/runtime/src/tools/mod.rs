//! Structured query tools over the portal's record store
//!
//! A closed set of operations (search, aggregate, fetch-by-id, edit, create),
//! each with typed arguments and a typed result, validated against the
//! [`CollectionRegistry`] before the store is touched.

pub mod error;
pub mod schema;
pub mod store;
pub mod toolset;
pub mod types;

pub use error::{ToolError, ToolResult};
pub use schema::{CollectionRegistry, CollectionSchema};
pub use store::{InMemoryRecordStore, JsonFileRecordStore, RecordStore};
pub use toolset::StructuredToolSet;
pub use types::*;
