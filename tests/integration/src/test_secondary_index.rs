//! Queries against the status index.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dynaquery_core::config::DataLayerConfig;
    use dynaquery_core::error::DataError;
    use dynaquery_core::expression::QueryDefinition;
    use dynaquery_core::index::SecondaryIndex;
    use dynaquery_core::pagination::{PageRequest, decode_cursor};
    use dynaquery_core::repository::{EntityDefinition, IndexQueryParams, Repository};
    use dynaquery_memstore::MemStore;
    use dynaquery_model::types::ScalarAttributeType;
    use dynaquery_model::{AttributeValue, StoreClient, StoreOperation};
    use serde_json::{Value, json};

    use crate::{STATUS_INDEX, TABLE, ids, new_store, repository, seed};

    async fn seeded_orders() -> (Arc<MemStore>, Repository) {
        let store = new_store();
        let repo = repository(&store, "orders");
        seed(
            &repo,
            vec![
                json!({ "id": "o1", "status": "active", "amount": 150, "region": "eu" }),
                json!({ "id": "o2", "status": "active", "amount": 40, "region": "us" }),
                json!({ "id": "o3", "status": "active", "amount": 300, "region": "eu" }),
                json!({ "id": "o4", "status": "pending", "amount": 200, "region": "eu" }),
                json!({ "id": "o5", "status": "active", "amount": 100, "region": "us" }),
                json!({ "id": "o6", "region": "eu" }),
            ],
        )
        .await
        .unwrap();
        (store, repo)
    }

    fn by_status(status: &str) -> IndexQueryParams {
        IndexQueryParams::builder()
            .index_name(STATUS_INDEX)
            .partition_field("status")
            .partition_value(json!(status))
            .build()
    }

    fn definition(value: &Value) -> QueryDefinition {
        QueryDefinition::from_json(value).unwrap()
    }

    #[tokio::test]
    async fn test_should_query_index_in_sort_key_order() {
        let (_store, repo) = seeded_orders().await;

        let all = repo.query_by_secondary_index(by_status("active")).await.unwrap();
        assert_eq!(ids(&all), ["o2", "o5", "o1", "o3"]);

        let ranged = repo
            .query_by_secondary_index(IndexQueryParams {
                sort_key_query: Some(definition(&json!({ "amount": { "$between": [100, 300] } }))),
                ..by_status("active")
            })
            .await
            .unwrap();
        assert_eq!(ids(&ranged), ["o5", "o1", "o3"]);
    }

    #[tokio::test]
    async fn test_should_filter_and_project_index_results() {
        let (_store, repo) = seeded_orders().await;

        let records = repo
            .query_by_secondary_index(IndexQueryParams {
                query: Some(definition(&json!({ "region": "eu" }))),
                fields: Some(vec!["id".to_owned()]),
                ..by_status("active")
            })
            .await
            .unwrap();
        assert_eq!(ids(&records), ["o1", "o3"]);
        assert!(records.iter().all(|r| r.len() == 1));
    }

    #[tokio::test]
    async fn test_should_page_index_backwards_with_index_cursor() {
        let (_store, repo) = seeded_orders().await;
        let paging = PageRequest::builder().page_size(2).descending(true).build();

        let first = repo
            .query_by_secondary_index_paginate(IndexQueryParams {
                paging: paging.clone(),
                ..by_status("active")
            })
            .await
            .unwrap();
        assert_eq!(ids(&first.items), ["o3", "o1"]);

        let cursor = first.next_cursor.unwrap();
        let key = decode_cursor(&cursor).unwrap();
        assert_eq!(key.get("id"), Some(&AttributeValue::s("o1")));
        assert_eq!(key.get("status"), Some(&AttributeValue::s("active")));
        assert_eq!(key.get("amount"), Some(&AttributeValue::n(150)));

        let mut rest = Vec::new();
        let mut cursor = Some(cursor);
        while let Some(next) = cursor {
            let page = repo
                .query_by_secondary_index_paginate(IndexQueryParams {
                    paging: PageRequest {
                        cursor: Some(next),
                        ..paging.clone()
                    },
                    ..by_status("active")
                })
                .await
                .unwrap();
            rest.extend(ids(&page.items));
            cursor = page.next_cursor;
        }
        assert_eq!(rest, ["o5", "o2"]);
    }

    #[tokio::test]
    async fn test_should_follow_status_change_into_other_partition() {
        let (_store, repo) = seeded_orders().await;
        repo.update_one_by_id("o4", json!({ "status": "active" }))
            .await
            .unwrap();

        let active = repo.query_by_secondary_index(by_status("active")).await.unwrap();
        assert_eq!(ids(&active), ["o2", "o5", "o1", "o4", "o3"]);
        let pending = repo.query_by_secondary_index(by_status("pending")).await.unwrap();
        assert!(pending.is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_index_mismatches_before_store_call() {
        let (store, repo) = seeded_orders().await;
        let bare = Repository::new(
            EntityDefinition::builder()
                .table_name(TABLE)
                .partition_value("orders")
                .build(),
            Arc::clone(&store) as Arc<dyn StoreClient>,
            DataLayerConfig::default(),
        );

        let cases = [
            (&bare, by_status("active"), "Invalid secondary index definitions"),
            (
                &repo,
                IndexQueryParams {
                    index_name: "byOwner".to_owned(),
                    ..by_status("active")
                },
                "Invalid secondary index name",
            ),
            (
                &repo,
                IndexQueryParams {
                    partition_field: "owner".to_owned(),
                    ..by_status("active")
                },
                "Invalid secondary index field definitions",
            ),
        ];
        for (repo, params, message) in cases {
            let err = repo.query_by_secondary_index_paginate(params).await.unwrap_err();
            assert!(matches!(err, DataError::IndexMisconfigured { .. }));
            assert_eq!(err.to_string(), message);
        }
        assert_eq!(store.call_count(StoreOperation::Query), 0);
    }

    fn orders_with_index(store: &Arc<MemStore>, index: SecondaryIndex) -> Repository {
        Repository::new(
            EntityDefinition::builder()
                .table_name(TABLE)
                .partition_value("orders")
                .secondary_indexes(vec![index])
                .build(),
            Arc::clone(store) as Arc<dyn StoreClient>,
            DataLayerConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_should_return_only_what_the_index_carries() {
        let (store, _repo) = seeded_orders().await;
        let narrow = orders_with_index(
            &store,
            SecondaryIndex::new(STATUS_INDEX, "status", "amount", ScalarAttributeType::N)
                .with_projected_fields(["region"]),
        );

        let records = narrow.query_by_secondary_index(by_status("active")).await.unwrap();
        assert_eq!(ids(&records), ["o2", "o5", "o1", "o3"]);
        for record in &records {
            let mut fields: Vec<&str> = record.keys().map(String::as_str).collect();
            fields.sort_unstable();
            assert_eq!(fields, ["amount", "featurePartition", "id", "region", "status"]);
        }

        let paged = narrow
            .query_by_secondary_index_paginate(IndexQueryParams {
                fields: Some(vec!["region".to_owned()]),
                paging: PageRequest::builder().page_size(3).build(),
                ..by_status("active")
            })
            .await
            .unwrap();
        assert_eq!(paged.items.len(), 3);
        assert!(paged.items.iter().all(|r| r.len() == 1 && r.contains_key("region")));
        assert!(paged.next_cursor.is_some());
    }

    #[tokio::test]
    async fn test_should_reject_index_keyed_twice_on_one_field() {
        let (store, _repo) = seeded_orders().await;
        let broken = orders_with_index(
            &store,
            SecondaryIndex::new(STATUS_INDEX, "status", "status", ScalarAttributeType::S),
        );

        let err = broken
            .query_by_secondary_index_paginate(by_status("active"))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::IndexMisconfigured { .. }));
        assert_eq!(err.to_string(), "Invalid secondary index field definitions");
        assert_eq!(store.call_count(StoreOperation::Query), 0);
    }

    #[tokio::test]
    async fn test_should_reject_bad_index_key_conditions() {
        let (store, repo) = seeded_orders().await;

        let err = repo
            .query_by_secondary_index_paginate(IndexQueryParams {
                sort_key_query: Some(definition(&json!({ "region": "eu" }))),
                ..by_status("active")
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid Sort key value");

        let err = repo
            .query_by_secondary_index_paginate(IndexQueryParams {
                partition_value: Value::Null,
                ..by_status("active")
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid Hash key value");
        assert!(err.is_validation());

        assert_eq!(store.call_count(StoreOperation::Query), 0);
    }
}
