//! Dynaquery data layer.
//!
//! Compiles declarative query definitions into the store's condition
//! expressions, pages through query and scan results with opaque cursors, and
//! wraps both in a per-entity [`Repository`].
//!
//! ```
//! use std::sync::Arc;
//!
//! use dynaquery_core::config::DataLayerConfig;
//! use dynaquery_core::repository::{EntityDefinition, QueryParams, Repository};
//! use dynaquery_core::expression::QueryDefinition;
//! use dynaquery_memstore::{KeyAttribute, MemStore, TableSchema};
//! use serde_json::json;
//!
//! let store = Arc::new(MemStore::new());
//! store
//!     .create_table(TableSchema::new("app", KeyAttribute::s("featurePartition")).with_sort_key(KeyAttribute::s("id")))
//!     .unwrap();
//!
//! let entity = EntityDefinition::builder().table_name("app").partition_value("orders").build();
//! let repo = Repository::new(entity, store, DataLayerConfig::default());
//!
//! tokio_test::block_on(async {
//!     repo.create(json!({ "id": "o1", "status": "active" })).await.unwrap();
//!     repo.create(json!({ "id": "o2", "status": "closed" })).await.unwrap();
//!
//!     let params = QueryParams::builder()
//!         .partition_key_equals("orders")
//!         .query(QueryDefinition::from_json(&json!({ "status": "active" })).unwrap())
//!         .build();
//!     let records = repo.query_by_condition(params).await.unwrap();
//!     assert_eq!(records.len(), 1);
//! });
//! ```
#![allow(clippy::doc_markdown, clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod expression;
pub mod index;
pub mod pagination;
pub mod repository;
pub mod schema;

pub use config::DataLayerConfig;
pub use error::DataError;
pub use expression::{CompiledQuery, QueryCompiler, QueryDefinition, compile_query};
pub use index::SecondaryIndex;
pub use pagination::{Page, PageRequest, Paginator};
pub use repository::{Record, RecordPage, Repository};
