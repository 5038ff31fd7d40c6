//! Item storage for one table.
//!
//! Items live in a [`DashMap`] of partitions, each a [`BTreeMap`] ordered by
//! sort key. Reads take a snapshot of the candidates they may touch, order it
//! by key position, and walk it from the exclusive start key.
//!
//! ## Positions
//!
//! A read over the table orders items by `(partition, sort)`. A read over an
//! index orders them by `(index partition, index sort, partition, sort)`, so
//! items sharing index keys still have a total order. The last evaluated key
//! of a read carries every attribute of that position.

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

use dashmap::DashMap;
use dynaquery_model::AttributeValue;
use dynaquery_model::types::{ExpressionAttributeNames, ExpressionAttributeValues, Item, Key};

use crate::expression::{AttributePath, EvalContext, Expr, ExpressionError};
use crate::schema::{IndexSchema, KeyAttribute, TableSchema};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised by table storage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// An item or key lacks a key attribute.
    #[error("One of the required keys was not given a value: {attr}")]
    MissingKey {
        /// The missing attribute.
        attr: String,
    },
    /// A key attribute has the wrong type.
    #[error("Type mismatch for key {attr}: expected {expected}, got {actual}")]
    InvalidKeyType {
        /// The attribute.
        attr: String,
        /// Declared type.
        expected: String,
        /// Supplied type.
        actual: String,
    },
    /// The exclusive start key does not name a position of this read.
    #[error("The provided starting key is invalid: {message}")]
    InvalidStartKey {
        /// Explanation.
        message: String,
    },
    /// An expression failed to evaluate.
    #[error(transparent)]
    Expression(#[from] ExpressionError),
}

// ---------------------------------------------------------------------------
// Sortable key values
// ---------------------------------------------------------------------------

/// A key value with the store's ordering: strings and binaries by bytes,
/// numbers numerically.
#[derive(Debug, Clone)]
pub enum SortableAttributeValue {
    /// String key.
    S(String),
    /// Number key, kept in its original form.
    N(String),
    /// Binary key.
    B(bytes::Bytes),
}

impl SortableAttributeValue {
    /// Converts a key scalar.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidKeyType`] for non-scalar values.
    pub fn from_attribute_value(attr: &str, value: &AttributeValue) -> Result<Self, StorageError> {
        match value {
            AttributeValue::S(s) => Ok(Self::S(s.clone())),
            AttributeValue::N(n) => Ok(Self::N(n.clone())),
            AttributeValue::B(b) => Ok(Self::B(b.clone())),
            other => Err(StorageError::InvalidKeyType {
                attr: attr.to_owned(),
                expected: "S, N, or B".to_owned(),
                actual: other.type_descriptor().to_owned(),
            }),
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::S(_) => 0,
            Self::N(_) => 1,
            Self::B(_) => 2,
        }
    }
}

impl PartialEq for SortableAttributeValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SortableAttributeValue {}

impl PartialOrd for SortableAttributeValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SortableAttributeValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::S(a), Self::S(b)) => a.as_bytes().cmp(b.as_bytes()),
            (Self::N(a), Self::N(b)) => {
                let a = a.parse::<f64>().unwrap_or(f64::NAN);
                let b = b.parse::<f64>().unwrap_or(f64::NAN);
                a.total_cmp(&b)
            }
            (Self::B(a), Self::B(b)) => a.as_ref().cmp(b.as_ref()),
            (a, b) => a.rank().cmp(&b.rank()),
        }
    }
}

/// A key position; `None` stands for a schema without a sort key.
type Position = Vec<Option<SortableAttributeValue>>;

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// One query or scan call against a table or index.
#[derive(Debug, Clone, Copy)]
pub struct ReadPlan<'a> {
    /// Index to read, or the table itself.
    pub index: Option<&'a IndexSchema>,
    /// Condition an item must meet to be evaluated at all.
    pub key_condition: Option<&'a Expr>,
    /// Condition an evaluated item must meet to be returned.
    pub filter: Option<&'a Expr>,
    /// Attributes to return; everything when `None`.
    pub projection: Option<&'a [AttributePath]>,
    /// `#name` substitutions.
    pub names: &'a ExpressionAttributeNames,
    /// `:value` substitutions.
    pub values: &'a ExpressionAttributeValues,
    /// Ascending key order.
    pub forward: bool,
    /// Maximum number of items to evaluate.
    pub limit: Option<usize>,
    /// Resume strictly after this key.
    pub exclusive_start_key: Option<&'a Key>,
}

/// What one read produced.
#[derive(Debug, Clone, Default)]
pub struct ReadResult {
    /// Items that passed the filter, projected.
    pub items: Vec<Item>,
    /// Items evaluated before filtering.
    pub scanned: usize,
    /// Set when the limit stopped the read with candidates left.
    pub last_evaluated_key: Option<Key>,
}

// ---------------------------------------------------------------------------
// Table storage
// ---------------------------------------------------------------------------

/// Items of one table.
#[derive(Debug)]
pub struct TableStorage {
    schema: TableSchema,
    partitions: DashMap<AttributeValue, BTreeMap<Option<SortableAttributeValue>, Item>>,
}

impl TableStorage {
    /// An empty table.
    #[must_use]
    pub fn new(schema: TableSchema) -> Self {
        Self {
            schema,
            partitions: DashMap::new(),
        }
    }

    /// The table's schema.
    #[must_use]
    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Number of stored items.
    #[must_use]
    pub fn item_count(&self) -> usize {
        self.partitions.iter().map(|p| p.value().len()).sum()
    }

    /// Inserts or replaces an item, returning the replaced one.
    ///
    /// # Errors
    ///
    /// Returns an error when a table or index key is missing or mistyped.
    pub fn put_item(&self, item: Item) -> Result<Option<Item>, StorageError> {
        let (partition, sort) = self.primary_key(&item)?;
        for index in &self.schema.indexes {
            for attr in index.key_schema.attributes() {
                if let Some(value) = item.get(&attr.name) {
                    check_type(attr, value)?;
                }
            }
        }
        Ok(self.partitions.entry(partition).or_default().insert(sort, item))
    }

    /// Reads an item by primary key.
    ///
    /// # Errors
    ///
    /// Returns an error when the key is incomplete or mistyped.
    pub fn get_item(&self, key: &Key) -> Result<Option<Item>, StorageError> {
        let (partition, sort) = self.primary_key(key)?;
        Ok(self
            .partitions
            .get(&partition)
            .and_then(|items| items.get(&sort).cloned()))
    }

    /// Deletes an item by primary key, returning it.
    ///
    /// # Errors
    ///
    /// Returns an error when the key is incomplete or mistyped.
    pub fn delete_item(&self, key: &Key) -> Result<Option<Item>, StorageError> {
        let (partition, sort) = self.primary_key(key)?;
        let removed = self
            .partitions
            .get_mut(&partition)
            .and_then(|mut items| items.remove(&sort));
        self.partitions.remove_if(&partition, |_, items| items.is_empty());
        Ok(removed)
    }

    /// Runs a query or scan.
    ///
    /// Only items meeting the key condition count toward the limit. When the
    /// limit is reached and another such item follows, the key of the last
    /// evaluated item is returned to resume from.
    ///
    /// # Errors
    ///
    /// Returns an error for an invalid start key or a failing expression.
    pub fn read(&self, plan: &ReadPlan<'_>) -> Result<ReadResult, StorageError> {
        let layout = self.layout(plan.index);
        let mut candidates = self.candidates(&layout);
        candidates.sort_by(|a, b| a.0.cmp(&b.0));
        if !plan.forward {
            candidates.reverse();
        }

        let start = plan
            .exclusive_start_key
            .filter(|key| !key.is_empty())
            .map(|key| position_of(&layout, key))
            .transpose()?;

        let mut remaining = candidates.into_iter().filter(|(position, _)| {
            start.as_ref().is_none_or(|start| match position.cmp(start) {
                Ordering::Greater => plan.forward,
                Ordering::Less => !plan.forward,
                Ordering::Equal => false,
            })
        });

        let in_range = |item: &Item| -> Result<bool, StorageError> {
            let ctx = EvalContext::new(item, plan.names, plan.values);
            Ok(plan.key_condition.map_or(Ok(true), |kc| ctx.evaluate(kc))?)
        };

        let mut result = ReadResult::default();
        loop {
            let Some((_, item)) = remaining.next() else {
                break;
            };
            if !in_range(&item)? {
                continue;
            }
            result.scanned += 1;
            let ctx = EvalContext::new(&item, plan.names, plan.values);
            if plan.filter.map_or(Ok(true), |f| ctx.evaluate(f))? {
                result.items.push(match plan.projection {
                    Some(paths) => ctx.project(paths),
                    None => item.clone(),
                });
            }

            if plan.limit.is_some_and(|limit| result.scanned >= limit) {
                for (_, next) in remaining.by_ref() {
                    if in_range(&next)? {
                        result.last_evaluated_key = Some(key_of(&layout, &item));
                        break;
                    }
                }
                break;
            }
        }
        Ok(result)
    }

    fn primary_key(
        &self,
        item: &Item,
    ) -> Result<(AttributeValue, Option<SortableAttributeValue>), StorageError> {
        let schema = &self.schema.key_schema;
        let partition = required(&schema.partition_key, item)?.clone();
        let sort = schema
            .sort_key
            .as_ref()
            .map(|attr| {
                let value = required(attr, item)?;
                SortableAttributeValue::from_attribute_value(&attr.name, value)
            })
            .transpose()?;
        Ok((partition, sort))
    }

    /// Key attributes that make up a position, outermost first.
    fn layout<'s>(&'s self, index: Option<&'s IndexSchema>) -> Vec<Option<&'s KeyAttribute>> {
        let table = &self.schema.key_schema;
        let mut layout = Vec::with_capacity(4);
        if let Some(index) = index {
            layout.push(Some(&index.key_schema.partition_key));
            layout.push(index.key_schema.sort_key.as_ref());
        }
        layout.push(Some(&table.partition_key));
        layout.push(table.sort_key.as_ref());
        layout
    }

    fn candidates(&self, layout: &[Option<&KeyAttribute>]) -> Vec<(Position, Item)> {
        self.partitions
            .iter()
            .flat_map(|partition| partition.value().values().cloned().collect::<Vec<_>>())
            .filter_map(|item| {
                // Sparse index: items without the index keys are skipped.
                let position = position_of(layout, &item).ok()?;
                Some((position, item))
            })
            .collect()
    }
}

fn required<'i>(attr: &KeyAttribute, item: &'i Item) -> Result<&'i AttributeValue, StorageError> {
    let value = item.get(&attr.name).ok_or_else(|| StorageError::MissingKey {
        attr: attr.name.clone(),
    })?;
    check_type(attr, value)?;
    Ok(value)
}

fn check_type(attr: &KeyAttribute, value: &AttributeValue) -> Result<(), StorageError> {
    if attr.accepts(value) {
        Ok(())
    } else {
        Err(StorageError::InvalidKeyType {
            attr: attr.name.clone(),
            expected: attr.attr_type.as_str().to_owned(),
            actual: value.type_descriptor().to_owned(),
        })
    }
}

fn position_of(layout: &[Option<&KeyAttribute>], item: &Item) -> Result<Position, StorageError> {
    layout
        .iter()
        .map(|attr| {
            attr.map(|attr| {
                let value = required(attr, item).map_err(|err| StorageError::InvalidStartKey {
                    message: err.to_string(),
                })?;
                SortableAttributeValue::from_attribute_value(&attr.name, value)
            })
            .transpose()
        })
        .collect()
}

fn key_of(layout: &[Option<&KeyAttribute>], item: &Item) -> Key {
    layout
        .iter()
        .flatten()
        .filter_map(|attr| {
            item.get(&attr.name)
                .map(|value| (attr.name.clone(), value.clone()))
        })
        .collect::<HashMap<_, _>>()
}

/// Returns `true` if `expr` pins the partition key with `=` at its top
/// level.
#[must_use]
pub fn pins_partition(expr: &Expr, partition_key: &str, names: &ExpressionAttributeNames) -> bool {
    use crate::expression::{CompareOp, Operand, PathElement};

    let is_partition = |operand: &Operand| match operand {
        Operand::Path(path) => match path.elements.as_slice() {
            [PathElement::Attribute(name)] => {
                crate::expression::evaluator::resolve_name(name, names) == Some(partition_key)
            }
            _ => false,
        },
        _ => false,
    };
    expr.conjuncts().into_iter().any(|conjunct| {
        matches!(
            conjunct,
            Expr::Compare { left, op: CompareOp::Eq, right }
                if (is_partition(left) && matches!(right, Operand::Value(_)))
                    || (is_partition(right) && matches!(left, Operand::Value(_)))
        )
    })
}
