//! Record operation façade.
//!
//! A [`Repository`] serves one entity type stored in one table. Every record
//! of the entity shares a fixed partition value (held in `partition_field`)
//! and is addressed by its id (held in `sort_field`).

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use typed_builder::TypedBuilder;

use dynaquery_model::input::{
    BatchGetItemInput, BatchWriteItemInput, DeleteItemInput, GetItemInput, PutItemInput,
};
use dynaquery_model::marshal::{marshal_item, unmarshal_item};
use dynaquery_model::types::{KeysAndAttributes, WriteRequest};
use dynaquery_model::{AttributeValue, Item, Key, StoreClient, StoreError};

use crate::config::DataLayerConfig;
use crate::error::DataError;
use crate::expression::{
    CompiledQuery, FieldLeaf, QueryCompiler, QueryDefinition, ReadExpressions,
};
use crate::index::{IndexProjection, SecondaryIndex, resolve_index};
use crate::pagination::{PageRequest, Paginator, ReadOperation, ReadRequest};
use crate::schema::{PassthroughValidator, SchemaValidator, require_strings};

/// Field stamped when a record is created.
pub const CREATED_AT_FIELD: &str = "createdAtDate";
/// Field stamped when a record is replaced by [`Repository::update_one_direct`].
pub const LAST_MODIFIED_FIELD: &str = "lastModifiedDate";

/// Largest number of writes in one `BatchWriteItem` call.
const BATCH_WRITE_CHUNK: usize = 25;
/// Largest number of keys in one `BatchGetItem` call.
const BATCH_GET_CHUNK: usize = 100;

/// A JSON record as stored by a repository.
pub type Record = Map<String, Value>;

// ---------------------------------------------------------------------------
// Definitions and parameters
// ---------------------------------------------------------------------------

/// Where and how one entity type is stored.
#[derive(Debug, Clone, TypedBuilder)]
pub struct EntityDefinition {
    /// Table holding the records.
    #[builder(setter(into))]
    pub table_name: String,
    /// Value of the partition field shared by every record of the entity.
    #[builder(setter(into))]
    pub partition_value: String,
    /// Partition-key attribute of the table.
    #[builder(default = "featurePartition".to_owned(), setter(into))]
    pub partition_field: String,
    /// Sort-key attribute of the table, holding the record id.
    #[builder(default = "id".to_owned(), setter(into))]
    pub sort_field: String,
    /// Declared secondary indexes.
    #[builder(default)]
    pub secondary_indexes: Vec<SecondaryIndex>,
    /// Fields that must be present and non-null on every write.
    #[builder(default)]
    pub strict_required_fields: Vec<String>,
}

/// Parameters of a partition-scoped query.
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct QueryParams {
    /// Partition value to query.
    #[builder(setter(into))]
    pub partition_key_equals: String,
    /// Condition on the sort field; must name the sort field.
    #[builder(default, setter(strip_option))]
    pub sort_key_query: Option<QueryDefinition>,
    /// Filter over non-key fields.
    #[builder(default, setter(strip_option))]
    pub query: Option<QueryDefinition>,
    /// Fields to return; all when absent.
    #[builder(default, setter(strip_option))]
    pub fields: Option<Vec<String>>,
    /// Page size, cursor, evaluation cap and order.
    #[builder(default)]
    pub paging: PageRequest,
}

/// Parameters of a secondary-index query.
#[derive(Debug, Clone, TypedBuilder)]
pub struct IndexQueryParams {
    /// Declared index to query.
    #[builder(setter(into))]
    pub index_name: String,
    /// Partition field of the index; must match the declaration.
    #[builder(setter(into))]
    pub partition_field: String,
    /// Partition value to query.
    pub partition_value: Value,
    /// Condition on the index sort field.
    #[builder(default, setter(strip_option))]
    pub sort_key_query: Option<QueryDefinition>,
    /// Filter over the remaining fields.
    #[builder(default, setter(strip_option))]
    pub query: Option<QueryDefinition>,
    /// Fields to return; all projected fields when absent.
    #[builder(default, setter(strip_option))]
    pub fields: Option<Vec<String>>,
    /// Page size, cursor, evaluation cap and order.
    #[builder(default)]
    pub paging: PageRequest,
}

/// Parameters of an entity-wide scan.
#[derive(Debug, Clone, Default, TypedBuilder)]
pub struct ScanParams {
    /// Filter over the records.
    #[builder(default, setter(strip_option))]
    pub query: Option<QueryDefinition>,
    /// Fields to return; all when absent.
    #[builder(default, setter(strip_option))]
    pub fields: Option<Vec<String>>,
    /// Page size, cursor and evaluation cap.
    #[builder(default)]
    pub paging: PageRequest,
}

/// One page of records.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordPage {
    /// The records, in store order.
    pub items: Vec<Record>,
    /// Cursor for the next page; `None` when there is nothing more.
    pub next_cursor: Option<String>,
}

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// CRUD, batch and query operations over one entity type.
#[derive(Debug, Clone)]
pub struct Repository {
    entity: EntityDefinition,
    client: Arc<dyn StoreClient>,
    config: DataLayerConfig,
    validator: Arc<dyn SchemaValidator>,
    paginator: Paginator,
}

impl Repository {
    /// Creates a repository that writes records without schema validation.
    #[must_use]
    pub fn new(entity: EntityDefinition, client: Arc<dyn StoreClient>, config: DataLayerConfig) -> Self {
        let paginator = Paginator::new(Arc::clone(&client), &config);
        Self {
            entity,
            client,
            config,
            validator: Arc::new(PassthroughValidator),
            paginator,
        }
    }

    /// Uses `validator` for every write.
    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// The entity this repository serves.
    #[must_use]
    pub fn entity(&self) -> &EntityDefinition {
        &self.entity
    }

    /// The configuration in use.
    #[must_use]
    pub fn config(&self) -> &DataLayerConfig {
        &self.config
    }

    // -- writes -------------------------------------------------------------

    /// Creates a record, generating its id when absent.
    ///
    /// # Errors
    ///
    /// Fails when `data` is not an object, a required field is missing, the
    /// validator rejects the record, or the store write fails.
    pub async fn create(&self, data: Value) -> Result<Record, DataError> {
        let mut record = into_record(data)?;
        let id = match string_field(&record, &self.entity.sort_field) {
            Some(id) => id.to_owned(),
            None => uuid::Uuid::new_v4().to_string(),
        };
        self.check_required(&record)?;

        record.insert(CREATED_AT_FIELD.to_owned(), Value::String(now()));
        self.stamp_keys(&mut record, &id);
        let created = self.persist(record).await?;
        debug!(table = %self.entity.table_name, id = %id, "record created");
        Ok(created)
    }

    /// Replaces a record with `data`, which must carry the id.
    ///
    /// # Errors
    ///
    /// Fails when `data` is not an object or lacks the id, a required field
    /// is missing, the validator rejects the record, or the write fails.
    pub async fn update_one_direct(&self, data: Value) -> Result<Record, DataError> {
        let mut record = into_record(data)?;
        let Some(id) = string_field(&record, &self.entity.sort_field).map(str::to_owned) else {
            return Err(DataError::validation("Update data requires sort key field value"));
        };
        self.check_required(&record)?;

        record.insert(LAST_MODIFIED_FIELD.to_owned(), Value::String(now()));
        self.stamp_keys(&mut record, &id);
        let updated = self.persist(record).await?;
        debug!(table = %self.entity.table_name, id = %id, "record replaced");
        Ok(updated)
    }

    /// Merges `data` into the stored record `id`.
    ///
    /// The key fields always keep their stored values.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotFound`] when the record does not exist, plus
    /// the failures of [`Self::update_one_direct`].
    pub async fn update_one_by_id(&self, id: &str, data: Value) -> Result<Record, DataError> {
        let changes = into_record(data)?;
        require_strings(&[("Id", id)])?;
        let Some(mut record) = self.get_one_by_id(id).await? else {
            return Err(DataError::not_found("Data does NOT exists"));
        };
        self.check_required(&changes)?;

        record.extend(changes);
        self.stamp_keys(&mut record, id);
        let updated = self.persist(record).await?;
        debug!(table = %self.entity.table_name, id = %id, "record merged");
        Ok(updated)
    }

    /// Deletes record `id`, returning what was deleted.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::NotFound`] when the record does not exist.
    pub async fn delete_by_id(&self, id: &str) -> Result<Record, DataError> {
        require_strings(&[("Id", id)])?;
        let Some(existing) = self.get_one_by_id(id).await? else {
            return Err(DataError::not_found("Record does NOT exists"));
        };
        self.client
            .delete_item(DeleteItemInput {
                table_name: self.entity.table_name.clone(),
                key: self.key(id),
            })
            .await?;
        debug!(table = %self.entity.table_name, id = %id, "record deleted");
        Ok(existing)
    }

    /// Deletes many records without reading them first.
    ///
    /// Writes go out in chunks of 25; unprocessed writes are resent up to
    /// `batch_get_max_rounds` times per chunk.
    ///
    /// # Errors
    ///
    /// Fails on a blank id, a store error, or writes still unprocessed after
    /// the last round (reported as a retryable throttling error).
    pub async fn delete_many_by_ids(&self, ids: &[String]) -> Result<(), DataError> {
        for id in ids {
            require_strings(&[("Id", id)])?;
        }
        let table = &self.entity.table_name;
        for chunk in ids.chunks(BATCH_WRITE_CHUNK) {
            let mut pending: Vec<WriteRequest> =
                chunk.iter().map(|id| WriteRequest::delete(self.key(id))).collect();
            let mut round = 0;
            while !pending.is_empty() {
                if round == self.config.batch_get_max_rounds.max(1) {
                    return Err(StoreError::throttled(format!(
                        "{} deletes left unprocessed after {round} rounds",
                        pending.len()
                    ))
                    .into());
                }
                round += 1;
                let mut output = self
                    .client
                    .batch_write_item(BatchWriteItemInput {
                        request_items: HashMap::from([(table.clone(), pending)]),
                    })
                    .await?;
                pending = output.unprocessed_items.remove(table).unwrap_or_default();
                debug!(table = %table, round, unprocessed = pending.len(), "batch delete round");
            }
        }
        info!(table = %table, count = ids.len(), "records deleted");
        Ok(())
    }

    // -- point reads --------------------------------------------------------

    /// Reads record `id`.
    ///
    /// # Errors
    ///
    /// Fails on a blank id or partition value, or a store error.
    pub async fn get_one_by_id(&self, id: &str) -> Result<Option<Record>, DataError> {
        self.get(id, None).await
    }

    /// Reads only `fields` of record `id`.
    ///
    /// # Errors
    ///
    /// See [`Self::get_one_by_id`].
    pub async fn get_one_by_id_projected(
        &self,
        id: &str,
        fields: &[String],
    ) -> Result<Option<Record>, DataError> {
        self.get(id, Some(fields)).await
    }

    /// Returns `true` if record `id` exists.
    ///
    /// # Errors
    ///
    /// See [`Self::get_one_by_id`].
    pub async fn exists_by_id(&self, id: &str) -> Result<bool, DataError> {
        let fields = [self.entity.sort_field.clone()];
        let found = self.get(id, Some(&fields)).await?;
        Ok(found.is_some_and(|record| record.contains_key(&self.entity.sort_field)))
    }

    /// Reads many records by id with strongly consistent reads.
    ///
    /// Keys go out in chunks of 100; unprocessed keys are re-requested up to
    /// `batch_get_max_rounds` times. A store error after some records were
    /// read returns those records.
    ///
    /// # Errors
    ///
    /// Fails on a blank id, or a store error before anything was read.
    pub async fn batch_get_many_by_ids(
        &self,
        ids: &[String],
        fields: Option<&[String]>,
    ) -> Result<Vec<Record>, DataError> {
        for id in ids {
            require_strings(&[("Id", id)])?;
        }
        let table = &self.entity.table_name;
        let projection = self.projection(fields)?;
        let mut records = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(BATCH_GET_CHUNK) {
            let mut pending = KeysAndAttributes {
                keys: chunk.iter().map(|id| self.key(id)).collect(),
                projection_expression: projection.projection_expression.clone(),
                expression_attribute_names: projection.attribute_names.clone().unwrap_or_default(),
                consistent_read: self.config.consistent_batch_reads.then_some(true),
            };
            let mut round = 0;
            loop {
                round += 1;
                let result = self
                    .client
                    .batch_get_item(BatchGetItemInput {
                        request_items: HashMap::from([(table.clone(), pending)]),
                    })
                    .await;
                let mut output = match result {
                    Ok(output) => output,
                    Err(err) if records.is_empty() => return Err(err.into()),
                    Err(err) => {
                        warn!(
                            table = %table,
                            round,
                            collected = records.len(),
                            error = %err,
                            "batch get failed, returning partial result"
                        );
                        return Ok(records);
                    }
                };
                let items = output.responses.remove(table).unwrap_or_default();
                records.extend(items.iter().map(unmarshal_item));

                match output.unprocessed_keys.remove(table) {
                    Some(next) if !next.keys.is_empty() => {
                        if round >= self.config.batch_get_max_rounds.max(1) {
                            warn!(
                                table = %table,
                                round,
                                unprocessed = next.keys.len(),
                                "batch get gave up on unprocessed keys"
                            );
                            break;
                        }
                        pending = next;
                    }
                    _ => break,
                }
            }
        }
        Ok(records)
    }

    // -- queries ------------------------------------------------------------

    /// Queries one partition, reading every page.
    ///
    /// # Errors
    ///
    /// See [`Self::query_by_condition_paginate`].
    pub async fn query_by_condition(&self, params: QueryParams) -> Result<Vec<Record>, DataError> {
        let paging = read_all(&params.paging);
        let page = self
            .query_by_condition_paginate(QueryParams { paging, ..params })
            .await?;
        Ok(page.items)
    }

    /// Queries one partition, one page at a time.
    ///
    /// The partition equality and the sort-key condition form the key
    /// condition; `query` becomes the filter.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a blank partition value, a sort-key
    /// query that does not name the sort field or uses a non-range
    /// operator, or a malformed filter; store errors from the first round
    /// are passed through.
    pub async fn query_by_condition_paginate(
        &self,
        params: QueryParams,
    ) -> Result<RecordPage, DataError> {
        if params.partition_key_equals.trim().is_empty() {
            return Err(DataError::validation("Invalid Hash key value"));
        }
        let sort_field = &self.entity.sort_field;
        let mut key_definition = QueryDefinition::new();
        if let Some(sort_query) = &params.sort_key_query {
            key_definition.leaves = sort_leaves(sort_query, sort_field)?;
        }
        key_definition.leaves.push(FieldLeaf::equals(
            self.entity.partition_field.clone(),
            Value::String(params.partition_key_equals.clone()),
        ));

        let key_fields = self.table_key_fields();
        let (fields, hidden) = paged_projection(params.fields.as_deref(), &key_fields, &params.paging);
        let mut compiler = self.compiler();
        let key = compiler.compile_key_condition(&key_definition, fields.as_deref())?;
        let filter = self.compile_filter(&mut compiler, params.query.as_ref())?;

        let request = ReadRequest::builder()
            .table_name(self.entity.table_name.clone())
            .operation(ReadOperation::Query)
            .expressions(ReadExpressions::key_condition(key).with_filter(filter))
            .key_fields(key_fields)
            .build();
        self.read_page(&request, &params.paging, &hidden).await
    }

    /// Queries a secondary index, reading every page.
    ///
    /// # Errors
    ///
    /// See [`Self::query_by_secondary_index_paginate`].
    pub async fn query_by_secondary_index(
        &self,
        params: IndexQueryParams,
    ) -> Result<Vec<Record>, DataError> {
        let paging = read_all(&params.paging);
        let page = self
            .query_by_secondary_index_paginate(IndexQueryParams { paging, ..params })
            .await?;
        Ok(page.items)
    }

    /// Queries a secondary index, one page at a time.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::IndexMisconfigured`] when no indexes are
    /// declared, the index is unknown, or the partition field does not
    /// match; a validation error for a sort-key condition on another field
    /// or with a non-range operator. Nothing reaches the store in those
    /// cases.
    pub async fn query_by_secondary_index_paginate(
        &self,
        params: IndexQueryParams,
    ) -> Result<RecordPage, DataError> {
        let index = resolve_index(
            &self.entity.secondary_indexes,
            &params.index_name,
            &params.partition_field,
        )?;
        if params.partition_value.is_null() {
            return Err(DataError::validation("Invalid Hash key value"));
        }

        let mut key_definition = QueryDefinition::new();
        if let Some(sort_query) = &params.sort_key_query {
            key_definition.leaves = sort_leaves(sort_query, &index.sort_field)?;
        }
        key_definition.leaves.push(FieldLeaf::equals(
            index.partition_field.clone(),
            params.partition_value.clone(),
        ));

        let mut key_fields = self.table_key_fields();
        for field in [&index.partition_field, &index.sort_field] {
            if !key_fields.contains(field) {
                key_fields.push(field.clone());
            }
        }
        let requested = params
            .fields
            .clone()
            .or_else(|| index_fields(index, &key_fields));
        let (fields, hidden) = paged_projection(requested.as_deref(), &key_fields, &params.paging);

        let mut compiler = self.compiler();
        let key = compiler.compile_key_condition(&key_definition, fields.as_deref())?;
        let filter = self.compile_filter(&mut compiler, params.query.as_ref())?;

        let request = ReadRequest::builder()
            .table_name(self.entity.table_name.clone())
            .index_name(index.index_name.clone())
            .operation(ReadOperation::Query)
            .expressions(ReadExpressions::key_condition(key).with_filter(filter))
            .key_fields(key_fields)
            .build();
        self.read_page(&request, &params.paging, &hidden).await
    }

    /// Scans the entity's records, one page at a time.
    ///
    /// Only records carrying this entity's partition value are returned.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed filter; store errors from
    /// the first round are passed through.
    pub async fn scan_by_condition_paginate(&self, params: ScanParams) -> Result<RecordPage, DataError> {
        let mut definition = params.query.clone().unwrap_or_default();
        definition.leaves.push(FieldLeaf::equals(
            self.entity.partition_field.clone(),
            Value::String(self.entity.partition_value.clone()),
        ));

        let key_fields = self.table_key_fields();
        let (fields, hidden) = paged_projection(params.fields.as_deref(), &key_fields, &params.paging);
        let filter = self.compiler().compile(&definition, fields.as_deref())?;
        let request = ReadRequest::builder()
            .table_name(self.entity.table_name.clone())
            .operation(ReadOperation::Scan)
            .expressions(ReadExpressions::filter(filter))
            .key_fields(key_fields)
            .build();
        self.read_page(&request, &params.paging, &hidden).await
    }

    // -- helpers ------------------------------------------------------------

    fn compiler(&self) -> QueryCompiler {
        QueryCompiler::new(self.config.strict_operators)
    }

    fn compile_filter(
        &self,
        compiler: &mut QueryCompiler,
        query: Option<&QueryDefinition>,
    ) -> Result<CompiledQuery, DataError> {
        match query {
            Some(definition) if !definition.is_empty() => Ok(compiler.compile(definition, None)?),
            _ => Ok(CompiledQuery::default()),
        }
    }

    fn projection(&self, fields: Option<&[String]>) -> Result<CompiledQuery, DataError> {
        Ok(self.compiler().compile(&QueryDefinition::new(), fields)?)
    }

    /// Runs one paged read; `hidden` fields were projected only to cut the
    /// page and are stripped from the records.
    async fn read_page(
        &self,
        request: &ReadRequest,
        paging: &PageRequest,
        hidden: &[String],
    ) -> Result<RecordPage, DataError> {
        let page = self.paginator.paginate(request, paging).await?;
        let items = page
            .items
            .iter()
            .map(|item| {
                let mut record = unmarshal_item(item);
                for field in hidden {
                    record.remove(field);
                }
                record
            })
            .collect();
        Ok(RecordPage {
            items,
            next_cursor: page.next_cursor,
        })
    }

    async fn get(&self, id: &str, fields: Option<&[String]>) -> Result<Option<Record>, DataError> {
        require_strings(&[
            ("PartitionKey", self.entity.partition_value.as_str()),
            ("Id", id),
        ])?;
        let projection = self.projection(fields)?;
        let output = self
            .client
            .get_item(GetItemInput {
                table_name: self.entity.table_name.clone(),
                key: self.key(id),
                consistent_read: None,
                projection_expression: projection.projection_expression,
                expression_attribute_names: projection.attribute_names.unwrap_or_default(),
            })
            .await?;
        Ok(output.item.as_ref().map(unmarshal_item))
    }

    async fn persist(&self, record: Record) -> Result<Record, DataError> {
        let owned: Vec<(String, Value)> = [
            self.entity.partition_field.as_str(),
            self.entity.sort_field.as_str(),
            CREATED_AT_FIELD,
            LAST_MODIFIED_FIELD,
        ]
        .into_iter()
        .filter_map(|field| record.get(field).map(|v| (field.to_owned(), v.clone())))
        .collect();

        let mut validated = self.validator.validate(record)?;
        validated.extend(owned);

        let item: Item = marshal_item(&validated);
        self.client
            .put_item(PutItemInput {
                table_name: self.entity.table_name.clone(),
                item,
            })
            .await?;
        Ok(validated)
    }

    fn check_required(&self, record: &Record) -> Result<(), DataError> {
        match self
            .entity
            .strict_required_fields
            .iter()
            .find(|field| record.get(*field).is_none_or(Value::is_null))
        {
            Some(field) => Err(DataError::RequiredField {
                field: field.clone(),
            }),
            None => Ok(()),
        }
    }

    fn stamp_keys(&self, record: &mut Record, id: &str) {
        record.insert(
            self.entity.partition_field.clone(),
            Value::String(self.entity.partition_value.clone()),
        );
        record.insert(self.entity.sort_field.clone(), Value::String(id.to_owned()));
    }

    fn key(&self, id: &str) -> Key {
        HashMap::from([
            (
                self.entity.partition_field.clone(),
                AttributeValue::s(self.entity.partition_value.as_str()),
            ),
            (self.entity.sort_field.clone(), AttributeValue::s(id)),
        ])
    }

    fn table_key_fields(&self) -> Vec<String> {
        vec![self.entity.partition_field.clone(), self.entity.sort_field.clone()]
    }
}

fn into_record(data: Value) -> Result<Record, DataError> {
    match data {
        Value::Object(record) => Ok(record),
        _ => Err(DataError::validation("Data MUST be valid object")),
    }
}

fn string_field<'a>(record: &'a Record, field: &str) -> Option<&'a str> {
    record
        .get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

fn now() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Paging for the read-everything variants: keep the cap and order, drop the
/// page size and cursor.
fn read_all(paging: &PageRequest) -> PageRequest {
    PageRequest {
        page_size: None,
        cursor: None,
        evaluation_limit: paging.evaluation_limit,
        descending: paging.descending,
    }
}

/// The fields to project for a paged read, and which of them the caller
/// did not ask for.
///
/// A sized page is cut at an item boundary, which needs every key field of
/// the boundary item.
fn paged_projection(
    fields: Option<&[String]>,
    key_fields: &[String],
    paging: &PageRequest,
) -> (Option<Vec<String>>, Vec<String>) {
    let Some(fields) = fields.filter(|f| !f.is_empty()) else {
        return (None, Vec::new());
    };
    let mut projected = fields.to_vec();
    let mut hidden = Vec::new();
    if paging.page_size.is_some_and(|n| n > 0) {
        for field in key_fields {
            if !projected.contains(field) {
                projected.push(field.clone());
                hidden.push(field.clone());
            }
        }
    }
    (Some(projected), hidden)
}

/// What an index query returns when no fields are requested: everything
/// the index carries.
fn index_fields(index: &SecondaryIndex, key_fields: &[String]) -> Option<Vec<String>> {
    match index.projection() {
        IndexProjection::All => None,
        IndexProjection::KeysOnly => Some(key_fields.to_vec()),
        IndexProjection::Include(extra) => {
            Some(key_fields.iter().cloned().chain(extra).collect())
        }
    }
}

/// The top-level leaves of `definition` that target `sort_field`.
fn sort_leaves(definition: &QueryDefinition, sort_field: &str) -> Result<Vec<FieldLeaf>, DataError> {
    let groups = !definition.and_group.is_empty() || !definition.or_group.is_empty();
    let leaves: Vec<FieldLeaf> = definition
        .leaves
        .iter()
        .filter(|leaf| leaf.field == sort_field)
        .cloned()
        .collect();
    if groups || leaves.is_empty() || leaves.len() != definition.leaves.len() {
        return Err(DataError::validation("Invalid Sort key value"));
    }
    Ok(leaves)
}

#[cfg(test)]
mod tests {
    use dynaquery_memstore::{KeyAttribute, MemStore, TableSchema};
    use dynaquery_model::StoreOperation;
    use serde_json::json;

    use super::*;
    use crate::expression::ExpressionError;
    use crate::schema::{FieldKind, FieldListValidator};

    const TABLE: &str = "entities";

    fn setup() -> (Arc<MemStore>, Repository) {
        let store = Arc::new(MemStore::new());
        store
            .create_table(
                TableSchema::new(TABLE, KeyAttribute::s("featurePartition"))
                    .with_sort_key(KeyAttribute::s("id")),
            )
            .unwrap();
        let entity = EntityDefinition::builder()
            .table_name(TABLE)
            .partition_value("orders")
            .strict_required_fields(vec!["name".to_owned()])
            .build();
        let repo = Repository::new(entity, Arc::clone(&store) as Arc<dyn StoreClient>, DataLayerConfig::default());
        (store, repo)
    }

    #[tokio::test]
    async fn test_should_create_with_generated_id_and_timestamp() {
        let (_store, repo) = setup();
        let created = repo.create(json!({ "name": "first" })).await.unwrap();

        let id = created["id"].as_str().unwrap();
        assert!(uuid::Uuid::parse_str(id).is_ok());
        assert_eq!(created["featurePartition"], "orders");
        assert!(created.contains_key(CREATED_AT_FIELD));

        let loaded = repo.get_one_by_id(id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
    }

    #[tokio::test]
    async fn test_should_reject_non_object_and_missing_required_field() {
        let (store, repo) = setup();
        let err = repo.create(json!([1, 2])).await.unwrap_err();
        assert_eq!(err.to_string(), "Data MUST be valid object");

        let err = repo.create(json!({ "name": null })).await.unwrap_err();
        assert!(matches!(err, DataError::RequiredField { ref field } if field == "name"));
        assert_eq!(store.call_count(StoreOperation::PutItem), 0);
    }

    #[tokio::test]
    async fn test_should_keep_key_fields_through_stripping_validator() {
        let (_store, repo) = setup();
        let repo = repo.with_validator(Arc::new(
            FieldListValidator::new().required("name", FieldKind::String),
        ));
        let created = repo
            .create(json!({ "id": "a1", "name": "n", "junk": 1 }))
            .await
            .unwrap();
        assert_eq!(created["id"], "a1");
        assert!(created.contains_key("featurePartition"));
        assert!(!created.contains_key("junk"));
    }

    #[tokio::test]
    async fn test_should_require_id_for_direct_update() {
        let (_store, repo) = setup();
        let err = repo.update_one_direct(json!({ "name": "x" })).await.unwrap_err();
        assert_eq!(err.to_string(), "Update data requires sort key field value");

        let updated = repo
            .update_one_direct(json!({ "id": "a1", "name": "x" }))
            .await
            .unwrap();
        assert!(updated.contains_key(LAST_MODIFIED_FIELD));
    }

    #[tokio::test]
    async fn test_should_merge_update_into_existing_record() {
        let (_store, repo) = setup();
        repo.create(json!({ "id": "a1", "name": "old", "amount": 1 }))
            .await
            .unwrap();

        let updated = repo
            .update_one_by_id("a1", json!({ "name": "new", "id": "hijack" }))
            .await
            .unwrap();
        assert_eq!(updated["name"], "new");
        assert_eq!(updated["amount"], 1);
        assert_eq!(updated["id"], "a1");

        let err = repo
            .update_one_by_id("missing", json!({ "name": "x" }))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Data does NOT exists");
    }

    #[tokio::test]
    async fn test_should_delete_and_report_missing_record() {
        let (_store, repo) = setup();
        repo.create(json!({ "id": "a1", "name": "n" })).await.unwrap();

        let deleted = repo.delete_by_id("a1").await.unwrap();
        assert_eq!(deleted["name"], "n");
        assert!(!repo.exists_by_id("a1").await.unwrap());

        let err = repo.delete_by_id("a1").await.unwrap_err();
        assert_eq!(err.to_string(), "Record does NOT exists");
        assert!(matches!(err, DataError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_should_reject_blank_ids() {
        let (_store, repo) = setup();
        let err = repo.get_one_by_id("").await.unwrap_err();
        assert_eq!(err.to_string(), "Id is required.");
    }

    #[tokio::test]
    async fn test_should_project_single_record() {
        let (_store, repo) = setup();
        repo.create(json!({ "id": "a1", "name": "n", "amount": 5 }))
            .await
            .unwrap();
        let record = repo
            .get_one_by_id_projected("a1", &["amount".to_owned()])
            .await
            .unwrap()
            .unwrap();
        assert_eq!(Value::Object(record), json!({ "amount": 5 }));
        assert!(repo.exists_by_id("a1").await.unwrap());
    }

    #[tokio::test]
    async fn test_should_require_sort_field_in_sort_key_query() {
        let (store, repo) = setup();
        let params = QueryParams::builder()
            .partition_key_equals("orders")
            .sort_key_query(QueryDefinition::new().equals("name", json!("x")))
            .build();
        let err = repo.query_by_condition_paginate(params).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid Sort key value");

        let err = repo
            .query_by_condition_paginate(QueryParams::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid Hash key value");
        assert_eq!(store.call_count(StoreOperation::Query), 0);
    }

    #[tokio::test]
    async fn test_should_reject_set_membership_on_sort_key() {
        let (_store, repo) = setup();
        let params = QueryParams::builder()
            .partition_key_equals("orders")
            .sort_key_query(QueryDefinition::from_json(&json!({ "id": { "$in": ["a"] } })).unwrap())
            .build();
        let err = repo.query_by_condition_paginate(params).await.unwrap_err();
        assert!(matches!(
            err,
            DataError::Expression(ExpressionError::NotAKeyOperator { .. })
        ));
    }

    #[tokio::test]
    async fn test_should_query_partition_with_sort_condition_and_filter() {
        let (_store, repo) = setup();
        for (id, amount) in [("a1", 10), ("a2", 200), ("b1", 300)] {
            repo.create(json!({ "id": id, "name": id, "amount": amount }))
                .await
                .unwrap();
        }
        let params = QueryParams::builder()
            .partition_key_equals("orders")
            .sort_key_query(QueryDefinition::from_json(&json!({ "id": { "$beginsWith": "a" } })).unwrap())
            .query(QueryDefinition::from_json(&json!({ "amount": { "$gte": 100 } })).unwrap())
            .build();
        let records = repo.query_by_condition(params).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0]["id"], "a2");
    }

    #[tokio::test]
    async fn test_should_scan_only_own_partition() {
        let (store, repo) = setup();
        repo.create(json!({ "id": "a1", "name": "mine" })).await.unwrap();
        store
            .insert(
                TABLE,
                HashMap::from([
                    ("featurePartition".to_owned(), AttributeValue::s("users")),
                    ("id".to_owned(), AttributeValue::s("u1")),
                ]),
            )
            .unwrap();
        let page = repo
            .scan_by_condition_paginate(ScanParams::default())
            .await
            .unwrap();
        assert_eq!(page.items.len(), 1);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_should_batch_get_across_unprocessed_rounds() {
        let (store, repo) = setup();
        let ids: Vec<String> = (0..5).map(|i| format!("id{i}")).collect();
        for id in &ids {
            repo.create(json!({ "id": id, "name": id })).await.unwrap();
        }
        store.leave_unprocessed(StoreOperation::BatchGetItem, 2);

        let records = repo.batch_get_many_by_ids(&ids, None).await.unwrap();
        assert_eq!(records.len(), 5);
        assert_eq!(store.call_count(StoreOperation::BatchGetItem), 2);
    }

    #[tokio::test]
    async fn test_should_delete_many_in_chunks() {
        let (store, repo) = setup();
        let ids: Vec<String> = (0..30).map(|i| format!("id{i:02}")).collect();
        for id in &ids {
            repo.create(json!({ "id": id, "name": id })).await.unwrap();
        }
        repo.delete_many_by_ids(&ids).await.unwrap();
        assert_eq!(store.call_count(StoreOperation::BatchWriteItem), 2);
        assert!(repo.batch_get_many_by_ids(&ids, None).await.unwrap().is_empty());
    }

    #[test]
    fn test_should_project_key_fields_only_for_sized_pages() {
        let keys = vec!["featurePartition".to_owned(), "id".to_owned()];
        let fields = vec!["name".to_owned(), "id".to_owned()];
        let sized = PageRequest::builder().page_size(5).build();

        let (projected, hidden) = paged_projection(Some(fields.as_slice()), &keys, &sized);
        assert_eq!(projected.unwrap(), ["name", "id", "featurePartition"]);
        assert_eq!(hidden, ["featurePartition"]);

        let (projected, hidden) = paged_projection(Some(fields.as_slice()), &keys, &PageRequest::default());
        assert_eq!(projected.unwrap(), fields);
        assert!(hidden.is_empty());

        assert_eq!(paged_projection(None, &keys, &sized), (None, Vec::new()));
    }
}
