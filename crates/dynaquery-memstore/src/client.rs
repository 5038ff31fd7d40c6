//! [`MemStore`]: an in-process [`StoreClient`].

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, info};

use dynaquery_model::input::{
    BatchGetItemInput, BatchWriteItemInput, DeleteItemInput, GetItemInput, PutItemInput,
    QueryInput, ScanInput,
};
use dynaquery_model::output::{
    BatchGetItemOutput, BatchWriteItemOutput, DeleteItemOutput, GetItemOutput, PutItemOutput,
    QueryOutput, ScanOutput,
};
use dynaquery_model::types::{
    ExpressionAttributeNames, ExpressionAttributeValues, Item, Key, KeysAndAttributes,
    WriteRequest,
};
use dynaquery_model::{StoreClient, StoreError, StoreErrorCode, StoreOperation};

use crate::expression::{
    AttributePath, EvalContext, ExpressionError, check_placeholders, parse_condition,
    parse_projection,
};
use crate::fault::FaultPlan;
use crate::schema::{IndexSchema, TableSchema};
use crate::storage::{ReadPlan, ReadResult, StorageError, TableStorage, pins_partition};

/// Most keys one `BatchGetItem` call accepts.
pub const MAX_BATCH_GET_KEYS: usize = 100;

/// Most requests one `BatchWriteItem` call accepts.
pub const MAX_BATCH_WRITE_REQUESTS: usize = 25;

impl From<StorageError> for StoreError {
    fn from(err: StorageError) -> Self {
        StoreError::validation(err.to_string())
    }
}

fn expression_error(err: &ExpressionError) -> StoreError {
    StoreError::validation(format!("Invalid expression: {err}"))
}

/// An in-memory store.
///
/// Cheap to share behind an `Arc`; every method takes `&self`.
#[derive(Debug, Default)]
pub struct MemStore {
    tables: DashMap<String, Arc<TableStorage>>,
    faults: FaultPlan,
}

impl MemStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a table.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the table exists or an index name repeats.
    pub fn create_table(&self, schema: TableSchema) -> Result<(), StoreError> {
        let mut names: Vec<&str> = schema.indexes.iter().map(|i| i.name.as_str()).collect();
        names.sort_unstable();
        if names.windows(2).any(|pair| pair[0] == pair[1]) {
            return Err(StoreError::validation("Duplicate index name"));
        }
        let name = schema.name.clone();
        match self.tables.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(StoreError::validation(format!(
                "Table already exists: {name}"
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(Arc::new(TableStorage::new(schema)));
                info!(table = %name, "table created");
                Ok(())
            }
        }
    }

    /// Inserts an item directly, bypassing call accounting and faults.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown table or an invalid key.
    pub fn insert(&self, table_name: &str, item: Item) -> Result<(), StoreError> {
        self.table(table_name)?.put_item(item)?;
        Ok(())
    }

    /// Number of items in a table; zero for unknown tables.
    #[must_use]
    pub fn item_count(&self, table_name: &str) -> usize {
        self.tables.get(table_name).map_or(0, |t| t.item_count())
    }

    /// Caps how many items any single query or scan evaluates, as a busy
    /// store does regardless of the requested limit.
    pub fn set_evaluation_ceiling(&self, ceiling: Option<usize>) {
        self.faults.set_evaluation_ceiling(ceiling);
    }

    /// Fails the `nth` next call of `operation` with `code`.
    pub fn inject_failure(&self, operation: StoreOperation, nth: usize, code: StoreErrorCode) {
        self.faults.fail_nth(operation, nth, code);
    }

    /// Makes the next batch call of `operation` hand back its last `count`
    /// entries as unprocessed.
    pub fn leave_unprocessed(&self, operation: StoreOperation, count: usize) {
        self.faults.leave_unprocessed(operation, count);
    }

    /// Calls of `operation` made through [`StoreClient`] so far.
    #[must_use]
    pub fn call_count(&self, operation: StoreOperation) -> usize {
        self.faults.call_count(operation)
    }

    fn table(&self, name: &str) -> Result<Arc<TableStorage>, StoreError> {
        self.tables
            .get(name)
            .map(|t| Arc::clone(t.value()))
            .ok_or_else(|| StoreError::resource_not_found(format!("Table not found: {name}")))
    }

    fn read(&self, request: Read<'_>) -> Result<ReadResult, StoreError> {
        let table = self.table(request.table_name)?;
        let index: Option<&IndexSchema> = match request.index_name {
            Some(name) => Some(table.schema().index(name).ok_or_else(|| {
                StoreError::validation(format!("The table does not have the specified index: {name}"))
            })?),
            None => None,
        };

        let key_condition = request
            .key_condition
            .map(parse_condition)
            .transpose()
            .map_err(|e| expression_error(&e))?;
        let filter = request
            .filter
            .map(parse_condition)
            .transpose()
            .map_err(|e| expression_error(&e))?;
        let projection = request
            .projection
            .map(parse_projection)
            .transpose()
            .map_err(|e| expression_error(&e))?;

        for expr in key_condition.iter().chain(filter.iter()) {
            check_placeholders(expr, request.names, request.values)
                .map_err(|e| expression_error(&e))?;
        }

        if request.operation == StoreOperation::Query {
            let Some(kc) = &key_condition else {
                return Err(StoreError::validation(
                    "Query requires a KeyConditionExpression",
                ));
            };
            let partition_key = index.map_or(
                &table.schema().key_schema.partition_key.name,
                |index| &index.key_schema.partition_key.name,
            );
            if !pins_partition(kc, partition_key, request.names) {
                return Err(StoreError::validation(format!(
                    "Query condition missed key schema element: {partition_key}"
                )));
            }
        }

        let limit = match request.limit {
            Some(limit) if limit <= 0 => {
                return Err(StoreError::validation("Limit must be greater than 0"));
            }
            Some(limit) => usize::try_from(limit).ok(),
            None => None,
        };

        let plan = ReadPlan {
            index,
            key_condition: key_condition.as_ref(),
            filter: filter.as_ref(),
            projection: projection.as_deref(),
            names: request.names,
            values: request.values,
            forward: request.forward,
            limit: self.faults.effective_limit(limit),
            exclusive_start_key: Some(request.exclusive_start_key),
        };
        let result = table.read(&plan)?;
        debug!(
            table = %request.table_name,
            operation = %request.operation,
            returned = result.items.len(),
            scanned = result.scanned,
            more = result.last_evaluated_key.is_some(),
            "read served"
        );
        Ok(result)
    }
}

/// The parts of a query or scan request the store reads.
struct Read<'a> {
    operation: StoreOperation,
    table_name: &'a str,
    index_name: Option<&'a str>,
    key_condition: Option<&'a str>,
    filter: Option<&'a str>,
    projection: Option<&'a str>,
    names: &'a ExpressionAttributeNames,
    values: &'a ExpressionAttributeValues,
    forward: bool,
    limit: Option<i32>,
    exclusive_start_key: &'a Key,
}

fn count(n: usize) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

fn project(item: Item, projection: Option<&[AttributePath]>, names: &ExpressionAttributeNames) -> Item {
    match projection {
        Some(paths) => {
            let values = ExpressionAttributeValues::new();
            EvalContext::new(&item, names, &values).project(paths)
        }
        None => item,
    }
}

fn parse_optional_projection(
    projection: Option<&str>,
) -> Result<Option<Vec<AttributePath>>, StoreError> {
    projection
        .map(parse_projection)
        .transpose()
        .map_err(|e| expression_error(&e))
}

#[async_trait]
impl StoreClient for MemStore {
    async fn query(&self, input: QueryInput) -> Result<QueryOutput, StoreError> {
        self.faults.record(StoreOperation::Query)?;
        let result = self.read(Read {
            operation: StoreOperation::Query,
            table_name: &input.table_name,
            index_name: input.index_name.as_deref(),
            key_condition: input.key_condition_expression.as_deref(),
            filter: input.filter_expression.as_deref(),
            projection: input.projection_expression.as_deref(),
            names: &input.expression_attribute_names,
            values: &input.expression_attribute_values,
            forward: input.scan_index_forward.unwrap_or(true),
            limit: input.limit,
            exclusive_start_key: &input.exclusive_start_key,
        })?;
        Ok(QueryOutput {
            count: count(result.items.len()),
            scanned_count: count(result.scanned),
            items: result.items,
            last_evaluated_key: result.last_evaluated_key,
        })
    }

    async fn scan(&self, input: ScanInput) -> Result<ScanOutput, StoreError> {
        self.faults.record(StoreOperation::Scan)?;
        let result = self.read(Read {
            operation: StoreOperation::Scan,
            table_name: &input.table_name,
            index_name: input.index_name.as_deref(),
            key_condition: None,
            filter: input.filter_expression.as_deref(),
            projection: input.projection_expression.as_deref(),
            names: &input.expression_attribute_names,
            values: &input.expression_attribute_values,
            forward: true,
            limit: input.limit,
            exclusive_start_key: &input.exclusive_start_key,
        })?;
        Ok(ScanOutput {
            count: count(result.items.len()),
            scanned_count: count(result.scanned),
            items: result.items,
            last_evaluated_key: result.last_evaluated_key,
        })
    }

    async fn put_item(&self, input: PutItemInput) -> Result<PutItemOutput, StoreError> {
        self.faults.record(StoreOperation::PutItem)?;
        let replaced = self.table(&input.table_name)?.put_item(input.item)?;
        debug!(table = %input.table_name, replaced = replaced.is_some(), "item put");
        Ok(PutItemOutput { attributes: None })
    }

    async fn get_item(&self, input: GetItemInput) -> Result<GetItemOutput, StoreError> {
        self.faults.record(StoreOperation::GetItem)?;
        let projection = parse_optional_projection(input.projection_expression.as_deref())?;
        let item = self.table(&input.table_name)?.get_item(&input.key)?;
        Ok(GetItemOutput {
            item: item.map(|item| {
                project(item, projection.as_deref(), &input.expression_attribute_names)
            }),
        })
    }

    async fn delete_item(&self, input: DeleteItemInput) -> Result<DeleteItemOutput, StoreError> {
        self.faults.record(StoreOperation::DeleteItem)?;
        let removed = self.table(&input.table_name)?.delete_item(&input.key)?;
        debug!(table = %input.table_name, removed = removed.is_some(), "item deleted");
        Ok(DeleteItemOutput { attributes: None })
    }

    async fn batch_get_item(
        &self,
        input: BatchGetItemInput,
    ) -> Result<BatchGetItemOutput, StoreError> {
        self.faults.record(StoreOperation::BatchGetItem)?;
        let total: usize = input.request_items.values().map(|r| r.keys.len()).sum();
        if total == 0 || total > MAX_BATCH_GET_KEYS {
            return Err(StoreError::validation(format!(
                "BatchGetItem takes 1 to {MAX_BATCH_GET_KEYS} keys, got {total}"
            )));
        }

        let mut skip = self.faults.take_unprocessed(StoreOperation::BatchGetItem);
        let mut output = BatchGetItemOutput::default();
        let mut tables: Vec<_> = input.request_items.into_iter().collect();
        tables.sort_by(|a, b| a.0.cmp(&b.0));

        for (table_name, mut request) in tables {
            let table = self.table(&table_name)?;
            let projection = parse_optional_projection(request.projection_expression.as_deref())?;
            let deferred = skip.min(request.keys.len());
            skip -= deferred;
            let unprocessed = request.keys.split_off(request.keys.len() - deferred);

            let mut found = Vec::with_capacity(request.keys.len());
            for key in &request.keys {
                if let Some(item) = table.get_item(key)? {
                    found.push(project(
                        item,
                        projection.as_deref(),
                        &request.expression_attribute_names,
                    ));
                }
            }
            output.responses.insert(table_name.clone(), found);
            if !unprocessed.is_empty() {
                output.unprocessed_keys.insert(
                    table_name,
                    KeysAndAttributes {
                        keys: unprocessed,
                        ..request
                    },
                );
            }
        }
        Ok(output)
    }

    async fn batch_write_item(
        &self,
        input: BatchWriteItemInput,
    ) -> Result<BatchWriteItemOutput, StoreError> {
        self.faults.record(StoreOperation::BatchWriteItem)?;
        let total: usize = input.request_items.values().map(Vec::len).sum();
        if total == 0 || total > MAX_BATCH_WRITE_REQUESTS {
            return Err(StoreError::validation(format!(
                "BatchWriteItem takes 1 to {MAX_BATCH_WRITE_REQUESTS} requests, got {total}"
            )));
        }

        let mut skip = self.faults.take_unprocessed(StoreOperation::BatchWriteItem);
        let mut unprocessed_items: HashMap<String, Vec<WriteRequest>> = HashMap::new();
        let mut tables: Vec<_> = input.request_items.into_iter().collect();
        tables.sort_by(|a, b| a.0.cmp(&b.0));

        for (table_name, mut requests) in tables {
            let table = self.table(&table_name)?;
            let deferred = skip.min(requests.len());
            skip -= deferred;
            let held_back = requests.split_off(requests.len() - deferred);
            for request in requests {
                if let Some(put) = request.put_request {
                    table.put_item(put.item)?;
                } else if let Some(delete) = request.delete_request {
                    table.delete_item(&delete.key)?;
                }
            }
            if !held_back.is_empty() {
                unprocessed_items.insert(table_name, held_back);
            }
        }
        Ok(BatchWriteItemOutput { unprocessed_items })
    }
}

#[cfg(test)]
mod tests {
    use dynaquery_model::AttributeValue;

    use super::*;
    use crate::schema::KeyAttribute;

    fn make_item(pairs: &[(&str, AttributeValue)]) -> Item {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn store() -> MemStore {
        let store = MemStore::new();
        store
            .create_table(
                TableSchema::new("orders", KeyAttribute::s("pk"))
                    .with_sort_key(KeyAttribute::s("id"))
                    .with_index(
                        IndexSchema::new("byStatus", KeyAttribute::s("status"))
                            .with_sort_key(KeyAttribute::n("amount")),
                    ),
            )
            .unwrap();
        for (id, status, amount) in [("a", "open", 30), ("b", "open", 10), ("c", "done", 20)] {
            store
                .insert(
                    "orders",
                    make_item(&[
                        ("pk", AttributeValue::s("p")),
                        ("id", AttributeValue::s(id)),
                        ("status", AttributeValue::s(status)),
                        ("amount", AttributeValue::n(amount)),
                    ]),
                )
                .unwrap();
        }
        store
    }

    fn key(id: &str) -> Key {
        make_item(&[("pk", AttributeValue::s("p")), ("id", AttributeValue::s(id))])
    }

    #[tokio::test]
    async fn test_should_query_index_by_partition() {
        let store = store();
        let output = store
            .query(QueryInput {
                table_name: "orders".to_owned(),
                index_name: Some("byStatus".to_owned()),
                key_condition_expression: Some("#s = :s".to_owned()),
                expression_attribute_names: [("#s".to_owned(), "status".to_owned())].into(),
                expression_attribute_values: [(":s".to_owned(), AttributeValue::s("open"))].into(),
                ..QueryInput::default()
            })
            .await
            .unwrap();
        let ids: Vec<_> = output
            .items
            .iter()
            .filter_map(|item| item.get("id").and_then(AttributeValue::as_s))
            .collect();
        assert_eq!(ids, ["b", "a"]);
        assert_eq!(output.count, 2);
    }

    #[tokio::test]
    async fn test_should_reject_query_without_partition_equality() {
        let store = store();
        let err = store
            .query(QueryInput {
                table_name: "orders".to_owned(),
                key_condition_expression: Some("id = :id".to_owned()),
                expression_attribute_values: [(":id".to_owned(), AttributeValue::s("a"))].into(),
                ..QueryInput::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, StoreErrorCode::ValidationException);

        let err = store
            .query(QueryInput {
                table_name: "orders".to_owned(),
                key_condition_expression: Some("pk = :missing".to_owned()),
                ..QueryInput::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, StoreErrorCode::ValidationException);
    }

    #[tokio::test]
    async fn test_should_report_unknown_table() {
        let err = store()
            .scan(ScanInput {
                table_name: "nope".to_owned(),
                ..ScanInput::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.code, StoreErrorCode::ResourceNotFoundException);
    }

    #[tokio::test]
    async fn test_should_project_get_item() {
        let output = store()
            .get_item(GetItemInput {
                table_name: "orders".to_owned(),
                key: key("a"),
                projection_expression: Some("#s, id".to_owned()),
                expression_attribute_names: [("#s".to_owned(), "status".to_owned())].into(),
                ..GetItemInput::default()
            })
            .await
            .unwrap();
        let item = output.item.unwrap();
        assert_eq!(item.len(), 2);
        assert_eq!(item.get("status"), Some(&AttributeValue::s("open")));
    }

    #[tokio::test]
    async fn test_should_hand_back_unprocessed_batch_keys() {
        let store = store();
        store.leave_unprocessed(StoreOperation::BatchGetItem, 1);
        let request = KeysAndAttributes {
            keys: vec![key("a"), key("b"), key("zz")],
            ..KeysAndAttributes::default()
        };
        let output = store
            .batch_get_item(BatchGetItemInput {
                request_items: [("orders".to_owned(), request)].into(),
            })
            .await
            .unwrap();
        assert_eq!(output.responses["orders"].len(), 2);
        assert_eq!(output.unprocessed_keys["orders"].keys, vec![key("zz")]);
    }

    #[tokio::test]
    async fn test_should_apply_batch_writes() {
        let store = store();
        let output = store
            .batch_write_item(BatchWriteItemInput {
                request_items: [(
                    "orders".to_owned(),
                    vec![
                        WriteRequest::delete(key("a")),
                        WriteRequest::put(make_item(&[
                            ("pk", AttributeValue::s("p")),
                            ("id", AttributeValue::s("d")),
                        ])),
                    ],
                )]
                .into(),
            })
            .await
            .unwrap();
        assert!(output.unprocessed_items.is_empty());
        assert_eq!(store.item_count("orders"), 3);
        assert_eq!(store.call_count(StoreOperation::BatchWriteItem), 1);
    }

    #[tokio::test]
    async fn test_should_fire_injected_failure() {
        let store = store();
        store.inject_failure(StoreOperation::GetItem, 1, StoreErrorCode::ThrottlingException);
        let input = GetItemInput {
            table_name: "orders".to_owned(),
            key: key("a"),
            ..GetItemInput::default()
        };
        let err = store.get_item(input.clone()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.get_item(input).await.unwrap().item.is_some());
    }
}
