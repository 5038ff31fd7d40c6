//! Secondary index descriptors.

use serde::{Deserialize, Serialize};

use dynaquery_model::types::ScalarAttributeType;

use crate::error::DataError;

/// How much of an item a secondary index carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexProjection {
    /// Every attribute.
    All,
    /// Only the table and index keys.
    KeysOnly,
    /// The keys plus the listed attributes.
    Include(Vec<String>),
}

/// A declared secondary index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryIndex {
    /// Index name, as known to the store.
    pub index_name: String,
    /// Partition-key attribute of the index.
    pub partition_field: String,
    /// Sort-key attribute of the index.
    pub sort_field: String,
    /// Scalar type of both key attributes.
    #[serde(default)]
    pub key_type: ScalarAttributeType,
    /// Non-key attributes copied into the index; empty projects everything.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub projected_fields: Vec<String>,
}

impl SecondaryIndex {
    /// Declares an index over `partition_field` and `sort_field`.
    pub fn new(
        index_name: impl Into<String>,
        partition_field: impl Into<String>,
        sort_field: impl Into<String>,
        key_type: ScalarAttributeType,
    ) -> Self {
        Self {
            index_name: index_name.into(),
            partition_field: partition_field.into(),
            sort_field: sort_field.into(),
            key_type,
            projected_fields: Vec::new(),
        }
    }

    /// Restricts the index to the keys plus `fields`.
    #[must_use]
    pub fn with_projected_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projected_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    /// The projection the store should maintain for this index.
    ///
    /// Key attributes listed in `projected_fields` are dropped; a list that
    /// held only keys means keys-only.
    #[must_use]
    pub fn projection(&self) -> IndexProjection {
        if self.projected_fields.is_empty() {
            return IndexProjection::All;
        }
        let non_key: Vec<String> = self
            .projected_fields
            .iter()
            .filter(|f| **f != self.partition_field && **f != self.sort_field)
            .cloned()
            .collect();
        if non_key.is_empty() {
            IndexProjection::KeysOnly
        } else {
            IndexProjection::Include(non_key)
        }
    }

    /// Checks that the descriptor is usable.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::IndexMisconfigured`] for blank names or a sort
    /// field equal to the partition field.
    pub fn validate(&self) -> Result<(), DataError> {
        if self.index_name.trim().is_empty()
            || self.partition_field.trim().is_empty()
            || self.sort_field.trim().is_empty()
        {
            return Err(DataError::index("Invalid secondary index definitions"));
        }
        if self.partition_field == self.sort_field {
            return Err(DataError::index("Invalid secondary index field definitions"));
        }
        Ok(())
    }
}

/// Finds the index a query names and checks its partition field.
///
/// # Errors
///
/// Returns [`DataError::IndexMisconfigured`] when no indexes are declared,
/// the name is unknown, the descriptor is unusable, or `partition_field` is
/// not the index's partition key.
pub fn resolve_index<'a>(
    indexes: &'a [SecondaryIndex],
    index_name: &str,
    partition_field: &str,
) -> Result<&'a SecondaryIndex, DataError> {
    if indexes.is_empty() {
        return Err(DataError::index("Invalid secondary index definitions"));
    }
    let index = indexes
        .iter()
        .find(|index| index.index_name == index_name)
        .ok_or_else(|| DataError::index("Invalid secondary index name"))?;
    index.validate()?;
    if index.partition_field != partition_field {
        return Err(DataError::index("Invalid secondary index field definitions"));
    }
    Ok(index)
}
