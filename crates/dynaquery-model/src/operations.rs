//! Store operation names.

use std::fmt;

/// The store operations the data layer issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreOperation {
    // Item CRUD
    /// Insert or replace an item.
    PutItem,
    /// Read an item by primary key.
    GetItem,
    /// Delete an item by primary key.
    DeleteItem,

    // Reads
    /// Read items by key condition.
    Query,
    /// Read every item of a table or index.
    Scan,

    // Batch
    /// Read many items by key.
    BatchGetItem,
    /// Put or delete many items.
    BatchWriteItem,
}

impl StoreOperation {
    /// Returns the operation name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PutItem => "PutItem",
            Self::GetItem => "GetItem",
            Self::DeleteItem => "DeleteItem",
            Self::Query => "Query",
            Self::Scan => "Scan",
            Self::BatchGetItem => "BatchGetItem",
            Self::BatchWriteItem => "BatchWriteItem",
        }
    }

    /// Returns `true` for operations that never modify data.
    #[must_use]
    pub fn is_read(&self) -> bool {
        matches!(
            self,
            Self::GetItem | Self::Query | Self::Scan | Self::BatchGetItem
        )
    }
}

impl fmt::Display for StoreOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
