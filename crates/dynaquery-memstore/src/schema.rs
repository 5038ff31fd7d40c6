//! Table and index key schemas.

use dynaquery_model::AttributeValue;
use dynaquery_model::types::ScalarAttributeType;

/// A key attribute and its scalar type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    /// Attribute name.
    pub name: String,
    /// Scalar type every value must have.
    pub attr_type: ScalarAttributeType,
}

impl KeyAttribute {
    /// A key attribute of the given type.
    pub fn new(name: impl Into<String>, attr_type: ScalarAttributeType) -> Self {
        Self {
            name: name.into(),
            attr_type,
        }
    }

    /// A string key attribute.
    pub fn s(name: impl Into<String>) -> Self {
        Self::new(name, ScalarAttributeType::S)
    }

    /// A number key attribute.
    pub fn n(name: impl Into<String>) -> Self {
        Self::new(name, ScalarAttributeType::N)
    }

    /// Returns `true` when `value` has this attribute's type.
    #[must_use]
    pub fn accepts(&self, value: &AttributeValue) -> bool {
        self.attr_type.matches(value)
    }
}

/// A partition key with an optional sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySchema {
    /// Partition (hash) key.
    pub partition_key: KeyAttribute,
    /// Sort (range) key, if any.
    pub sort_key: Option<KeyAttribute>,
}

impl KeySchema {
    /// Key attributes in partition, sort order.
    pub fn attributes(&self) -> impl Iterator<Item = &KeyAttribute> {
        std::iter::once(&self.partition_key).chain(self.sort_key.as_ref())
    }
}

/// A global secondary index. Items lacking either index key are not indexed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSchema {
    /// Index name.
    pub name: String,
    /// Index keys.
    pub key_schema: KeySchema,
}

impl IndexSchema {
    /// An index partitioned on `partition_key`.
    pub fn new(name: impl Into<String>, partition_key: KeyAttribute) -> Self {
        Self {
            name: name.into(),
            key_schema: KeySchema {
                partition_key,
                sort_key: None,
            },
        }
    }

    /// Adds a sort key.
    #[must_use]
    pub fn with_sort_key(mut self, sort_key: KeyAttribute) -> Self {
        self.key_schema.sort_key = Some(sort_key);
        self
    }
}

/// Everything needed to create a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name.
    pub name: String,
    /// Primary key.
    pub key_schema: KeySchema,
    /// Global secondary indexes.
    pub indexes: Vec<IndexSchema>,
}

impl TableSchema {
    /// A table keyed by `partition_key` only.
    pub fn new(name: impl Into<String>, partition_key: KeyAttribute) -> Self {
        Self {
            name: name.into(),
            key_schema: KeySchema {
                partition_key,
                sort_key: None,
            },
            indexes: Vec::new(),
        }
    }

    /// Adds a sort key to the primary key.
    #[must_use]
    pub fn with_sort_key(mut self, sort_key: KeyAttribute) -> Self {
        self.key_schema.sort_key = Some(sort_key);
        self
    }

    /// Declares a global secondary index.
    #[must_use]
    pub fn with_index(mut self, index: IndexSchema) -> Self {
        self.indexes.push(index);
        self
    }

    /// Looks up an index by name.
    #[must_use]
    pub fn index(&self, name: &str) -> Option<&IndexSchema> {
        self.indexes.iter().find(|index| index.name == name)
    }
}
