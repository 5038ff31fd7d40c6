//! Record lifecycle through the repository against the in-memory store.

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use dynaquery_core::config::DataLayerConfig;
    use dynaquery_core::error::DataError;
    use dynaquery_core::repository::{CREATED_AT_FIELD, LAST_MODIFIED_FIELD};
    use dynaquery_core::schema::{FieldKind, FieldListValidator};
    use dynaquery_model::{StoreErrorCode, StoreOperation};
    use serde_json::json;

    use crate::{TABLE, ids, new_store, repository, repository_with, seed};

    #[tokio::test]
    async fn test_should_run_full_record_lifecycle() {
        let store = new_store();
        let repo = repository(&store, "tickets");

        let created = repo
            .create(json!({ "title": "printer on fire", "status": "open", "amount": 3 }))
            .await
            .unwrap();
        let id = created["id"].as_str().unwrap().to_owned();
        assert!(created.contains_key(CREATED_AT_FIELD));
        assert!(!created.contains_key(LAST_MODIFIED_FIELD));
        assert_eq!(store.item_count(TABLE), 1);
        assert!(repo.exists_by_id(&id).await.unwrap());

        let merged = repo
            .update_one_by_id(&id, json!({ "status": "closed", "id": "hijacked" }))
            .await
            .unwrap();
        assert_eq!(merged["id"], id.as_str());
        assert_eq!(merged["status"], "closed");
        assert_eq!(merged["title"], "printer on fire");

        let mut replacement = merged.clone();
        replacement.remove("title");
        let replaced = repo
            .update_one_direct(serde_json::Value::Object(replacement))
            .await
            .unwrap();
        assert!(replaced.contains_key(LAST_MODIFIED_FIELD));

        let stored = repo.get_one_by_id(&id).await.unwrap().unwrap();
        assert!(!stored.contains_key("title"));
        assert_eq!(stored["status"], "closed");

        let deleted = repo.delete_by_id(&id).await.unwrap();
        assert_eq!(deleted["id"], id.as_str());
        assert!(!repo.exists_by_id(&id).await.unwrap());
        assert_eq!(store.item_count(TABLE), 0);
    }

    #[tokio::test]
    async fn test_should_report_missing_records() {
        let store = new_store();
        let repo = repository(&store, "tickets");

        let err = repo
            .update_one_by_id("ghost", json!({ "status": "open" }))
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::NotFound { .. }));
        assert_eq!(err.to_string(), "Data does NOT exists");

        let err = repo.delete_by_id("ghost").await.unwrap_err();
        assert_eq!(err.to_string(), "Record does NOT exists");
        assert!(!err.is_validation());
        assert_eq!(store.call_count(StoreOperation::DeleteItem), 0);
    }

    #[tokio::test]
    async fn test_should_not_read_other_entities_by_id() {
        let store = new_store();
        let orders = repository(&store, "orders");
        let invoices = repository(&store, "invoices");
        seed(&orders, vec![json!({ "id": "shared" })]).await.unwrap();

        assert!(orders.exists_by_id("shared").await.unwrap());
        assert!(invoices.get_one_by_id("shared").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_should_strip_and_reject_through_validator() {
        let store = new_store();
        let repo = repository(&store, "people").with_validator(Arc::new(
            FieldListValidator::new()
                .required("name", FieldKind::String)
                .optional("age", FieldKind::Number),
        ));

        let created = repo
            .create(json!({ "name": "Ada", "age": 36, "nickname": "countess" }))
            .await
            .unwrap();
        assert!(!created.contains_key("nickname"));
        assert_eq!(created["featurePartition"], "people");
        assert!(created.contains_key("id"));
        assert!(created.contains_key(CREATED_AT_FIELD));

        let stored = repo
            .get_one_by_id(created["id"].as_str().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, created);

        let puts = store.call_count(StoreOperation::PutItem);
        let err = repo.create(json!({ "age": "old" })).await.unwrap_err();
        match &err {
            DataError::Schema { details, .. } => assert_eq!(details.len(), 2),
            other => panic!("expected schema error, got {other:?}"),
        }
        assert!(err.is_validation());
        assert_eq!(store.call_count(StoreOperation::PutItem), puts);
    }

    #[tokio::test]
    async fn test_should_batch_get_beyond_one_request() {
        let store = new_store();
        let repo = repository(&store, "sensors");
        let records = (0..130)
            .map(|i| json!({ "id": format!("s{i:03}"), "amount": i, "label": "x" }))
            .collect();
        seed(&repo, records).await.unwrap();

        let wanted: Vec<String> = (0..130).map(|i| format!("s{i:03}")).collect();
        let fields = ["id".to_owned(), "amount".to_owned()];
        let found = repo
            .batch_get_many_by_ids(&wanted, Some(&fields[..]))
            .await
            .unwrap();
        assert_eq!(found.len(), 130);
        assert!(found.iter().all(|r| r.len() == 2 && !r.contains_key("label")));
        assert_eq!(store.call_count(StoreOperation::BatchGetItem), 2);
    }

    #[tokio::test]
    async fn test_should_return_partial_batch_when_retry_fails() {
        let store = new_store();
        let repo = repository(&store, "sensors");
        seed(
            &repo,
            vec![json!({ "id": "a" }), json!({ "id": "b" }), json!({ "id": "c" })],
        )
        .await
        .unwrap();

        store.leave_unprocessed(StoreOperation::BatchGetItem, 1);
        store.inject_failure(StoreOperation::BatchGetItem, 2, StoreErrorCode::InternalServerError);

        let wanted = ["a".to_owned(), "b".to_owned(), "c".to_owned()];
        let found = repo.batch_get_many_by_ids(&wanted, None).await.unwrap();
        assert_eq!(ids(&found), ["a", "b"]);
    }

    #[tokio::test]
    async fn test_should_delete_many_and_retry_unprocessed() {
        let store = new_store();
        let repo = repository(&store, "events");
        let records = (0..30).map(|i| json!({ "id": format!("e{i:02}") })).collect();
        seed(&repo, records).await.unwrap();

        store.leave_unprocessed(StoreOperation::BatchWriteItem, 5);
        let all: Vec<String> = (0..30).map(|i| format!("e{i:02}")).collect();
        repo.delete_many_by_ids(&all).await.unwrap();

        assert_eq!(store.item_count(TABLE), 0);
        assert_eq!(store.call_count(StoreOperation::BatchWriteItem), 3);
    }

    #[tokio::test]
    async fn test_should_give_up_on_unprocessed_deletes_after_last_round() {
        let store = new_store();
        let repo = repository_with(
            &store,
            "events",
            DataLayerConfig {
                batch_get_max_rounds: 1,
                ..DataLayerConfig::default()
            },
        );
        seed(
            &repo,
            vec![json!({ "id": "e1" }), json!({ "id": "e2" }), json!({ "id": "e3" })],
        )
        .await
        .unwrap();

        store.leave_unprocessed(StoreOperation::BatchWriteItem, 1);
        let all = ["e1".to_owned(), "e2".to_owned(), "e3".to_owned()];
        let err = repo.delete_many_by_ids(&all).await.unwrap_err();

        match &err {
            DataError::Store(store_err) => {
                assert_eq!(store_err.code, StoreErrorCode::ThrottlingException);
            }
            other => panic!("expected store error, got {other:?}"),
        }
        assert!(err.is_retryable());
        assert_eq!(store.item_count(TABLE), 1);
        assert!(repo.exists_by_id("e3").await.unwrap());
    }
}
