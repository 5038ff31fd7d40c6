//! The store client seam.
//!
//! Everything that talks to the store goes through [`StoreClient`]. A process
//! builds one client at start-up and hands it around as
//! `Arc<dyn StoreClient>`; nothing in the data layer looks one up globally.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::input::{
    BatchGetItemInput, BatchWriteItemInput, DeleteItemInput, GetItemInput, PutItemInput,
    QueryInput, ScanInput,
};
use crate::output::{
    BatchGetItemOutput, BatchWriteItemOutput, DeleteItemOutput, GetItemOutput, PutItemOutput,
    QueryOutput, ScanOutput,
};

/// Asynchronous access to a partitioned key-value store.
///
/// Implementations must be cheap to share across tasks; each call is a single
/// request/response round trip with no hidden retries.
#[async_trait]
pub trait StoreClient: Send + Sync + std::fmt::Debug {
    /// Read items matching a key condition.
    async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError>;

    /// Read items of a table or index in storage order.
    async fn scan(&self, input: ScanInput) -> Result<ScanOutput, StoreError>;

    /// Insert or replace one item.
    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError>;

    /// Read one item by primary key.
    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, StoreError>;

    /// Delete one item by primary key.
    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, StoreError>;

    /// Read many items by primary key.
    async fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> Result<BatchGetItemOutput, StoreError>;

    /// Put or delete many items.
    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> Result<BatchWriteItemOutput, StoreError>;
}
