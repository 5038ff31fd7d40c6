//! Reference scenarios for compiling and running queries.

#[cfg(test)]
mod tests {
    use dynaquery_core::expression::{QueryDefinition, compile_query};
    use dynaquery_core::pagination::PageRequest;
    use dynaquery_core::repository::{QueryParams, ScanParams};
    use dynaquery_model::StoreOperation;
    use serde_json::json;

    use crate::{ids, new_store, repository, seed};

    #[tokio::test]
    async fn test_should_return_both_matches_of_an_and_query() {
        let store = new_store();
        let repo = repository(&store, "orders");
        seed(
            &repo,
            vec![
                json!({ "id": "o1", "status": "active", "amount": 150 }),
                json!({ "id": "o2", "status": "active", "amount": 40 }),
                json!({ "id": "o3", "status": "active", "amount": 100 }),
            ],
        )
        .await
        .unwrap();

        let definition =
            QueryDefinition::from_json(&json!({ "status": "active", "amount": { "$gte": 100 } }))
                .unwrap();
        let compiled = compile_query(&definition, None, false).unwrap();
        assert_eq!(compiled.expression.split(" AND ").count(), 2);
        assert_eq!(compiled.attribute_values.as_ref().unwrap().len(), 2);

        let page = repo
            .query_by_condition_paginate(
                QueryParams::builder()
                    .partition_key_equals("orders")
                    .query(definition)
                    .paging(PageRequest::builder().page_size(10).build())
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&page.items), ["o1", "o3"]);
        assert!(page.next_cursor.is_none());
    }

    #[tokio::test]
    async fn test_should_return_or_matches_in_store_order() {
        let store = new_store();
        let repo = repository(&store, "products");
        seed(
            &repo,
            vec![
                json!({ "id": "p1", "category": "A" }),
                json!({ "id": "p2", "category": "C" }),
                json!({ "id": "p3", "category": "B" }),
                json!({ "id": "p4", "category": "A" }),
            ],
        )
        .await
        .unwrap();

        let definition = QueryDefinition::from_json(&json!({
            "$or": [{ "category": "A" }, { "category": "B" }]
        }))
        .unwrap();
        let compiled = compile_query(&definition, None, false).unwrap();
        assert_eq!(compiled.expression.matches(" OR ").count(), 1);

        let records = repo
            .query_by_condition(
                QueryParams::builder()
                    .partition_key_equals("products")
                    .query(definition.clone())
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&records), ["p1", "p3", "p4"]);

        let scanned = repo
            .scan_by_condition_paginate(ScanParams::builder().query(definition).build())
            .await
            .unwrap();
        assert_eq!(ids(&scanned.items), ["p1", "p3", "p4"]);
    }

    #[tokio::test]
    async fn test_should_match_any_field_of_a_multi_field_or_member() {
        let store = new_store();
        let repo = repository(&store, "pairs");
        seed(
            &repo,
            vec![
                json!({ "id": "r1", "a": 1, "b": 9 }),
                json!({ "id": "r2", "a": 7, "b": 2 }),
                json!({ "id": "r3", "a": 1, "b": 2 }),
                json!({ "id": "r4", "a": 5, "b": 5 }),
            ],
        )
        .await
        .unwrap();

        let definition = QueryDefinition::from_json(&json!({ "$or": [{ "a": 1, "b": 2 }] })).unwrap();
        let compiled = compile_query(&definition, None, false).unwrap();
        assert_eq!(compiled.expression.matches(" OR ").count(), 1);
        assert!(!compiled.expression.contains(" AND "));

        let records = repo
            .query_by_condition(
                QueryParams::builder()
                    .partition_key_equals("pairs")
                    .query(definition)
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&records), ["r1", "r2", "r3"]);
    }

    #[tokio::test]
    async fn test_should_reject_single_bound_between_before_store_call() {
        let store = new_store();
        let repo = repository(&store, "readings");

        let definition = QueryDefinition::from_json(&json!({ "range": { "$between": [10] } }))
            .unwrap();
        let err = repo
            .query_by_condition_paginate(
                QueryParams::builder()
                    .partition_key_equals("readings")
                    .query(definition.clone())
                    .build(),
            )
            .await
            .unwrap_err();
        assert!(err.is_validation());
        assert!(!err.is_retryable());

        let err = repo
            .scan_by_condition_paginate(ScanParams::builder().query(definition).build())
            .await
            .unwrap_err();
        assert!(err.is_validation());

        assert_eq!(store.call_count(StoreOperation::Query), 0);
        assert_eq!(store.call_count(StoreOperation::Scan), 0);
    }

    #[tokio::test]
    async fn test_should_keep_entities_apart_in_shared_table() {
        let store = new_store();
        let orders = repository(&store, "orders");
        let invoices = repository(&store, "invoices");
        seed(&orders, vec![json!({ "id": "x1", "status": "open" })])
            .await
            .unwrap();
        seed(&invoices, vec![json!({ "id": "x2", "status": "open" })])
            .await
            .unwrap();

        let open = QueryDefinition::from_json(&json!({ "status": "open" })).unwrap();
        let page = invoices
            .scan_by_condition_paginate(ScanParams::builder().query(open).build())
            .await
            .unwrap();
        assert_eq!(ids(&page.items), ["x2"]);
    }
}
