//! End-to-end tests of the Dynaquery data layer.
//!
//! Every test builds its own [`MemStore`], so tests share nothing and run in
//! parallel. Set `RUST_LOG=dynaquery_core=debug` to watch pagination rounds.

use std::sync::{Arc, Once};

use dynaquery_core::config::DataLayerConfig;
use dynaquery_core::index::SecondaryIndex;
use dynaquery_core::repository::{EntityDefinition, Record, Repository};
use dynaquery_memstore::{IndexSchema, KeyAttribute, MemStore, TableSchema};
use dynaquery_model::StoreClient;
use dynaquery_model::types::ScalarAttributeType;
use serde_json::Value;

static INIT: Once = Once::new();

/// Table every test entity lives in.
pub const TABLE: &str = "app-data";

/// Index over `status` (partition) and `amount` (sort).
pub const STATUS_INDEX: &str = "byStatus";

/// Initialize tracing (once).
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// A store holding the shared table and its status index.
#[must_use]
pub fn new_store() -> Arc<MemStore> {
    init_tracing();
    let store = Arc::new(MemStore::new());
    store
        .create_table(
            TableSchema::new(TABLE, KeyAttribute::s("featurePartition"))
                .with_sort_key(KeyAttribute::s("id"))
                .with_index(
                    IndexSchema::new(STATUS_INDEX, KeyAttribute::s("status"))
                        .with_sort_key(KeyAttribute::n("amount")),
                ),
        )
        .unwrap_or_else(|e| panic!("failed to create table {TABLE}: {e}"));
    store
}

/// A repository for `partition` entities with default configuration.
#[must_use]
pub fn repository(store: &Arc<MemStore>, partition: &str) -> Repository {
    repository_with(store, partition, DataLayerConfig::default())
}

/// A repository for `partition` entities with the status index declared.
#[must_use]
pub fn repository_with(
    store: &Arc<MemStore>,
    partition: &str,
    config: DataLayerConfig,
) -> Repository {
    let entity = EntityDefinition::builder()
        .table_name(TABLE)
        .partition_value(partition)
        .secondary_indexes(vec![SecondaryIndex::new(
            STATUS_INDEX,
            "status",
            "amount",
            ScalarAttributeType::N,
        )])
        .build();
    Repository::new(entity, Arc::clone(store) as Arc<dyn StoreClient>, config)
}

/// Creates every record through the repository.
pub async fn seed(repo: &Repository, records: Vec<Value>) -> anyhow::Result<Vec<Record>> {
    let mut created = Vec::with_capacity(records.len());
    for record in records {
        created.push(repo.create(record).await?);
    }
    Ok(created)
}

/// The `id` of every record, in order.
#[must_use]
pub fn ids(records: &[Record]) -> Vec<String> {
    records
        .iter()
        .filter_map(|r| r.get("id").and_then(Value::as_str).map(str::to_owned))
        .collect()
}

mod test_pagination;
mod test_repository;
mod test_scenarios;
mod test_secondary_index;
