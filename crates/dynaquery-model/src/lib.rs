//! Store wire types for Dynaquery.
//!
//! Attribute values, request and response payloads, the store error type, and
//! the [`StoreClient`] trait every store backend implements. The data layer in
//! `dynaquery-core` only depends on this crate, never on a concrete client.
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod attribute_value;
pub mod client;
pub mod error;
pub mod input;
pub mod marshal;
pub mod operations;
pub mod output;
pub mod types;

pub use attribute_value::AttributeValue;
pub use client::StoreClient;
pub use error::{StoreError, StoreErrorCode};
pub use operations::StoreOperation;
pub use types::{Item, Key};
