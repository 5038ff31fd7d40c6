//! In-memory store backend for Dynaquery.
//!
//! [`MemStore`] implements [`dynaquery_model::StoreClient`] over concurrent
//! in-process tables. It speaks the same expression language as the real
//! store (key conditions, filters, projections with `#name`/`:value`
//! placeholders), honors `Limit` and `ExclusiveStartKey` the same way, and
//! can be told to misbehave so callers' retry and resume paths get exercised.
#![allow(clippy::doc_markdown)]

pub mod client;
pub mod expression;
pub mod fault;
pub mod schema;
pub mod storage;

pub use client::MemStore;
pub use schema::{IndexSchema, KeyAttribute, KeySchema, TableSchema};
pub use storage::StorageError;
