//! The pagination loop.
//!
//! Each call runs `Start -> Fetching -> {PageReady | Exhausted | Failed}`:
//!
//! - **Start** decodes the cursor and computes the per-round evaluation cap.
//! - **Fetching** issues one read at a time, feeding each round's
//!   `LastEvaluatedKey` into the next round's `ExclusiveStartKey`.
//! - **PageReady** once the buffer holds `page_size` items.
//! - **Exhausted** once the store stops returning a continuation key.
//! - **Failed** on a store error; with items already buffered the buffer is
//!   returned as a partial page instead.
//!
//! All state lives on the call's stack, so independent calls may run
//! concurrently over one shared [`Paginator`].

use std::sync::Arc;

use tracing::{debug, warn};
use typed_builder::TypedBuilder;

use dynaquery_model::input::{QueryInput, ScanInput};
use dynaquery_model::{Item, Key, StoreClient, StoreError};

use super::cursor::{encode_cursor, try_decode_cursor};
use crate::config::{
    DEFAULT_EVALUATION_LIMIT, DataLayerConfig, MAX_EVALUATION_LIMIT, MIN_EVALUATION_LIMIT,
};
use crate::error::DataError;
use crate::expression::ReadExpressions;

// ---------------------------------------------------------------------------
// Requests and results
// ---------------------------------------------------------------------------

/// Which store read a request issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadOperation {
    /// `Query`: key-condition read in index order.
    #[default]
    Query,
    /// `Scan`: full read in storage order.
    Scan,
}

/// What to read: the target and its compiled expressions.
#[derive(Debug, Clone, TypedBuilder)]
pub struct ReadRequest {
    /// Table to read.
    #[builder(setter(into))]
    pub table_name: String,
    /// Secondary index to read instead of the table.
    #[builder(default, setter(strip_option, into))]
    pub index_name: Option<String>,
    /// Query or scan.
    #[builder(default)]
    pub operation: ReadOperation,
    /// Compiled key condition, filter and projection.
    #[builder(default)]
    pub expressions: ReadExpressions,
    /// Attributes that make up a continuation key for this read: the table
    /// key, plus the index key for index reads. Used to cut a page at an
    /// exact item boundary.
    #[builder(default)]
    pub key_fields: Vec<String>,
    /// Strongly consistent read.
    #[builder(default = false)]
    pub consistent_read: bool,
}

/// How much to read, and from where.
#[derive(Debug, Clone, Default, PartialEq, Eq, TypedBuilder)]
pub struct PageRequest {
    /// Items per page; `None` (or zero) reads until exhaustion.
    #[builder(default, setter(strip_option))]
    pub page_size: Option<usize>,
    /// Cursor from a previous page.
    #[builder(default, setter(strip_option, into))]
    pub cursor: Option<String>,
    /// Explicit per-round evaluation cap.
    #[builder(default, setter(strip_option))]
    pub evaluation_limit: Option<usize>,
    /// Walk the index backwards; ignored for scans.
    #[builder(default = false)]
    pub descending: bool,
}

/// One page of results.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    /// The items, in store order.
    pub items: Vec<Item>,
    /// Cursor for the next page; `None` means there is nothing more.
    pub next_cursor: Option<String>,
}

impl Page {
    /// Returns `true` if no further page exists.
    #[must_use]
    pub fn is_last(&self) -> bool {
        self.next_cursor.is_none()
    }
}

// ---------------------------------------------------------------------------
// Evaluation cap
// ---------------------------------------------------------------------------

/// Bounds for the per-round evaluation cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluationLimits {
    /// Cap used when a page size is given without an explicit cap.
    pub default: usize,
    /// Lower clamp.
    pub min: usize,
    /// Upper clamp.
    pub max: usize,
}

impl Default for EvaluationLimits {
    fn default() -> Self {
        Self {
            default: DEFAULT_EVALUATION_LIMIT,
            min: MIN_EVALUATION_LIMIT,
            max: MAX_EVALUATION_LIMIT,
        }
    }
}

impl From<&DataLayerConfig> for EvaluationLimits {
    fn from(config: &DataLayerConfig) -> Self {
        Self {
            default: config.default_evaluation_limit,
            min: config.min_evaluation_limit,
            max: config.max_evaluation_limit,
        }
    }
}

impl EvaluationLimits {
    /// The `Limit` to send each round, or `None` to send no limit.
    ///
    /// The explicit cap (or the default when only a page size is given) is
    /// clamped into `[min, max]`, then raised to `page_size + 1` when the page
    /// would not fit in one round.
    #[must_use]
    pub fn effective_cap(&self, page_size: Option<usize>, explicit: Option<usize>) -> Option<usize> {
        let page_size = page_size.filter(|n| *n > 0);
        let explicit = explicit.filter(|n| *n > 0);
        if page_size.is_none() && explicit.is_none() {
            return None;
        }

        let upper = self.max.max(self.min);
        let cap = explicit.unwrap_or(self.default).clamp(self.min, upper);
        match page_size {
            Some(size) if size > cap => Some(size + 1),
            _ => Some(cap),
        }
    }
}

// ---------------------------------------------------------------------------
// Paginator
// ---------------------------------------------------------------------------

/// Runs paginated reads against a shared store client.
#[derive(Debug, Clone)]
pub struct Paginator {
    client: Arc<dyn StoreClient>,
    limits: EvaluationLimits,
    reject_malformed_cursor: bool,
}

impl Paginator {
    /// Creates a paginator using `config`'s cap bounds and cursor policy.
    #[must_use]
    pub fn new(client: Arc<dyn StoreClient>, config: &DataLayerConfig) -> Self {
        Self {
            client,
            limits: EvaluationLimits::from(config),
            reject_malformed_cursor: config.reject_malformed_cursor,
        }
    }

    /// The cap bounds in use.
    #[must_use]
    pub fn limits(&self) -> EvaluationLimits {
        self.limits
    }

    /// Reads one page.
    ///
    /// # Errors
    ///
    /// Returns [`DataError::Store`] when the first round fails, and
    /// [`DataError::InvalidCursor`] for an undecodable cursor when malformed
    /// cursors are rejected. A failure after items were buffered is not an
    /// error: the buffered items come back with a cursor that resumes at the
    /// failed round.
    pub async fn paginate(&self, request: &ReadRequest, page: &PageRequest) -> Result<Page, DataError> {
        let mut start_key = self.start_key(page.cursor.as_deref())?;
        let page_size = page.page_size.filter(|n| *n > 0);
        let cap = self.limits.effective_cap(page_size, page.evaluation_limit);
        let mut buffer: Vec<Item> = Vec::new();
        let mut round = 0_usize;

        loop {
            round += 1;
            let (items, last_key) = match self
                .fetch(request, page.descending, cap, start_key.clone())
                .await
            {
                Ok(result) => result,
                Err(err) if buffer.is_empty() => return Err(err.into()),
                Err(err) => {
                    warn!(
                        table = %request.table_name,
                        round,
                        buffered = buffer.len(),
                        error = %err,
                        "store read failed mid-pagination, returning partial page"
                    );
                    let next_cursor = start_key.as_ref().and_then(|key| encode_cursor(key).ok());
                    return Ok(Page {
                        items: buffer,
                        next_cursor,
                    });
                }
            };

            let fetched = items.len();
            buffer.extend(items);
            debug!(
                table = %request.table_name,
                round,
                fetched,
                buffered = buffer.len(),
                more = last_key.is_some(),
                "pagination round complete"
            );

            if let Some(size) = page_size.filter(|size| buffer.len() >= *size) {
                return Ok(page_ready(request, buffer, size, last_key));
            }
            match last_key {
                Some(key) => start_key = Some(key),
                None => {
                    return Ok(Page {
                        items: buffer,
                        next_cursor: None,
                    });
                }
            }
        }
    }

    fn start_key(&self, cursor: Option<&str>) -> Result<Option<Key>, DataError> {
        let Some(token) = cursor.filter(|t| !t.trim().is_empty()) else {
            return Ok(None);
        };
        match try_decode_cursor(token) {
            Ok(key) => Ok(Some(key)),
            Err(err) if self.reject_malformed_cursor => Err(err.into()),
            Err(err) => {
                warn!(error = %err, "discarding malformed cursor, reading from the start");
                Ok(None)
            }
        }
    }

    async fn fetch(
        &self,
        request: &ReadRequest,
        descending: bool,
        cap: Option<usize>,
        start_key: Option<Key>,
    ) -> Result<(Vec<Item>, Option<Key>), StoreError> {
        let expressions = request.expressions.clone();
        let limit = cap.map(|n| i32::try_from(n).unwrap_or(i32::MAX));
        let exclusive_start_key = start_key.unwrap_or_default();
        let consistent_read = request.consistent_read.then_some(true);

        let (items, last_key) = match request.operation {
            ReadOperation::Query => {
                let output = self
                    .client
                    .query(QueryInput {
                        table_name: request.table_name.clone(),
                        index_name: request.index_name.clone(),
                        key_condition_expression: expressions.key_condition_expression,
                        filter_expression: expressions.filter_expression,
                        projection_expression: expressions.projection_expression,
                        expression_attribute_names: expressions.attribute_names.unwrap_or_default(),
                        expression_attribute_values: expressions
                            .attribute_values
                            .unwrap_or_default(),
                        scan_index_forward: descending.then_some(false),
                        limit,
                        exclusive_start_key,
                        consistent_read,
                    })
                    .await?;
                (output.items, output.last_evaluated_key)
            }
            ReadOperation::Scan => {
                let output = self
                    .client
                    .scan(ScanInput {
                        table_name: request.table_name.clone(),
                        index_name: request.index_name.clone(),
                        filter_expression: expressions.filter_expression,
                        projection_expression: expressions.projection_expression,
                        expression_attribute_names: expressions.attribute_names.unwrap_or_default(),
                        expression_attribute_values: expressions
                            .attribute_values
                            .unwrap_or_default(),
                        limit,
                        exclusive_start_key,
                        consistent_read,
                    })
                    .await?;
                (output.items, output.last_evaluated_key)
            }
        };
        Ok((items, last_key.filter(|key| !key.is_empty())))
    }
}

/// Cuts a full buffer down to `size` items.
///
/// The continuation key is taken from the last kept item when it carries
/// every key field; otherwise the whole buffer is returned with the store's
/// own continuation key so no item is skipped.
fn page_ready(request: &ReadRequest, mut buffer: Vec<Item>, size: usize, store_key: Option<Key>) -> Page {
    if buffer.len() > size {
        if let Some(key) = item_key(&buffer[size - 1], &request.key_fields) {
            buffer.truncate(size);
            return Page {
                items: buffer,
                next_cursor: encode_cursor(&key).ok(),
            };
        }
        debug!(
            table = %request.table_name,
            size,
            buffered = buffer.len(),
            "key fields missing from page boundary item, returning the full buffer"
        );
    }
    Page {
        items: buffer,
        next_cursor: store_key.and_then(|key| encode_cursor(&key).ok()),
    }
}

fn item_key(item: &Item, key_fields: &[String]) -> Option<Key> {
    if key_fields.is_empty() {
        return None;
    }
    key_fields
        .iter()
        .map(|field| item.get(field).map(|value| (field.clone(), value.clone())))
        .collect()
}
