//! Cursor pagination through the repository.

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use base64::Engine;
    use base64::engine::general_purpose::STANDARD as BASE64;

    use dynaquery_core::config::DataLayerConfig;
    use dynaquery_core::error::DataError;
    use dynaquery_core::expression::QueryDefinition;
    use dynaquery_core::pagination::{PageRequest, decode_cursor};
    use dynaquery_core::repository::{QueryParams, RecordPage, Repository, ScanParams};
    use dynaquery_model::{AttributeValue, StoreErrorCode, StoreOperation};
    use futures::future::join_all;
    use serde_json::json;

    use crate::{ids, new_store, repository, repository_with, seed};

    async fn seeded(partition: &str, count: usize) -> (std::sync::Arc<dynaquery_memstore::MemStore>, Repository) {
        let store = new_store();
        let repo = repository(&store, partition);
        let records = (0..count)
            .map(|i| json!({ "id": format!("r{i:02}"), "amount": i, "even": i % 2 == 0 }))
            .collect();
        seed(&repo, records).await.unwrap();
        (store, repo)
    }

    fn page(size: usize, cursor: Option<String>) -> PageRequest {
        PageRequest {
            page_size: Some(size),
            cursor,
            ..PageRequest::default()
        }
    }

    async fn query_page(repo: &Repository, paging: PageRequest) -> RecordPage {
        repo.query_by_condition_paginate(
            QueryParams::builder()
                .partition_key_equals(repo.entity().partition_value.clone())
                .paging(paging)
                .build(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_should_enumerate_every_record_once_for_any_page_size() {
        let (_store, repo) = seeded("ledger", 17).await;
        for size in 1..=8 {
            let mut seen = Vec::new();
            let mut cursor = None;
            let mut pages = 0;
            loop {
                let page = query_page(&repo, page(size, cursor)).await;
                assert!(page.items.len() <= size);
                pages += 1;
                seen.extend(ids(&page.items));
                match page.next_cursor {
                    Some(next) => cursor = Some(next),
                    None => break,
                }
                assert!(pages <= 17, "pagination did not terminate for size {size}");
            }
            let unique: HashSet<_> = seen.iter().collect();
            assert_eq!(seen.len(), 17, "size {size}");
            assert_eq!(unique.len(), 17, "size {size}");
        }
    }

    #[tokio::test]
    async fn test_should_fill_page_beyond_store_ceiling() {
        let (store, repo) = seeded("ledger", 30).await;
        store.set_evaluation_ceiling(Some(5));

        let first = query_page(&repo, page(12, None)).await;
        assert_eq!(first.items.len(), 12);
        assert!(store.call_count(StoreOperation::Query) >= 3);

        let cursor = first.next_cursor.unwrap();
        let key = decode_cursor(&cursor).unwrap();
        assert_eq!(key.get("id"), Some(&AttributeValue::s("r11")));

        let second = query_page(&repo, page(12, Some(cursor))).await;
        assert_eq!(ids(&second.items).first().map(String::as_str), Some("r12"));
    }

    #[tokio::test]
    async fn test_should_fill_filtered_page_across_rounds() {
        let (store, repo) = seeded("ledger", 20).await;
        store.set_evaluation_ceiling(Some(5));

        let even = QueryDefinition::from_json(&json!({ "even": true })).unwrap();
        let page = repo
            .query_by_condition_paginate(
                QueryParams::builder()
                    .partition_key_equals("ledger")
                    .query(even)
                    .paging(page(4, None))
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(ids(&page.items), ["r00", "r02", "r04", "r06"]);
        assert!(page.next_cursor.is_some());
    }

    #[tokio::test]
    async fn test_should_resume_after_mid_pagination_failure() {
        let (store, repo) = seeded("ledger", 10).await;
        store.set_evaluation_ceiling(Some(3));
        store.inject_failure(StoreOperation::Query, 2, StoreErrorCode::ServiceUnavailable);

        let partial = query_page(&repo, page(8, None)).await;
        assert_eq!(ids(&partial.items), ["r00", "r01", "r02"]);
        let cursor = partial.next_cursor.unwrap();

        let rest = query_page(&repo, page(8, Some(cursor))).await;
        assert_eq!(ids(&rest.items).first().map(String::as_str), Some("r03"));
    }

    #[tokio::test]
    async fn test_should_surface_first_round_failure_as_retryable() {
        let (store, repo) = seeded("ledger", 3).await;
        store.inject_failure(StoreOperation::Query, 1, StoreErrorCode::ProvisionedThroughputExceededException);

        let err = repo
            .query_by_condition_paginate(
                QueryParams::builder()
                    .partition_key_equals("ledger")
                    .paging(page(2, None))
                    .build(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::Store(_)));
        assert!(err.is_retryable());
        assert!(!err.is_validation());
    }

    #[tokio::test]
    async fn test_should_restart_or_reject_on_malformed_cursor() {
        let (store, repo) = seeded("ledger", 4).await;
        let restarted = query_page(&repo, page(2, Some("%%% not a cursor".to_owned()))).await;
        assert_eq!(ids(&restarted.items), ["r00", "r01"]);

        let strict = repository_with(
            &store,
            "ledger",
            DataLayerConfig {
                reject_malformed_cursor: true,
                ..DataLayerConfig::default()
            },
        );
        let before = store.call_count(StoreOperation::Query);
        let err = strict
            .query_by_condition_paginate(
                QueryParams::builder()
                    .partition_key_equals("ledger")
                    .paging(page(2, Some("%%% not a cursor".to_owned())))
                    .build(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, DataError::InvalidCursor(_)));
        assert!(err.is_validation());
        assert_eq!(store.call_count(StoreOperation::Query), before);
    }

    #[tokio::test]
    async fn test_should_cut_projected_pages_at_exact_size() {
        let (store, repo) = seeded("ledger", 30).await;
        store.set_evaluation_ceiling(Some(4));
        let fields = vec!["amount".to_owned()];

        let mut amounts = Vec::new();
        let mut cursor = None;
        loop {
            let page = repo
                .query_by_condition_paginate(
                    QueryParams::builder()
                        .partition_key_equals("ledger")
                        .fields(fields.clone())
                        .paging(page(10, cursor))
                        .build(),
                )
                .await
                .unwrap();
            assert!(page.items.len() <= 10);
            assert!(page.items.iter().all(|r| r.len() == 1 && r.contains_key("amount")));
            amounts.extend(page.items.iter().filter_map(|r| r["amount"].as_u64()));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        assert_eq!(amounts, (0..30).collect::<Vec<u64>>());

        let scanned = repo
            .scan_by_condition_paginate(
                ScanParams::builder()
                    .fields(fields)
                    .paging(page(10, None))
                    .build(),
            )
            .await
            .unwrap();
        assert_eq!(scanned.items.len(), 10);
        assert!(scanned.items.iter().all(|r| r.len() == 1));
        let key = decode_cursor(&scanned.next_cursor.unwrap()).unwrap();
        assert_eq!(key.get("id"), Some(&AttributeValue::s("r09")));
    }

    #[tokio::test]
    async fn test_should_resume_from_plain_value_cursor() {
        let (_store, repo) = seeded("ledger", 6).await;
        let cursor = BASE64.encode(r#"{"featurePartition":"ledger","id":"r02"}"#);

        let page = query_page(&repo, page(2, Some(cursor))).await;
        assert_eq!(ids(&page.items), ["r03", "r04"]);
    }

    #[tokio::test]
    async fn test_should_page_backwards() {
        let (_store, repo) = seeded("ledger", 7).await;
        let paging = PageRequest {
            descending: true,
            ..page(3, None)
        };
        let first = query_page(&repo, paging.clone()).await;
        assert_eq!(ids(&first.items), ["r06", "r05", "r04"]);

        let second = query_page(
            &repo,
            PageRequest {
                cursor: first.next_cursor,
                ..paging
            },
        )
        .await;
        assert_eq!(ids(&second.items), ["r03", "r02", "r01"]);
    }

    #[tokio::test]
    async fn test_should_scan_pages_with_cursor() {
        let (store, repo) = seeded("ledger", 9).await;
        store.set_evaluation_ceiling(Some(4));

        let mut all = Vec::new();
        let mut cursor = None;
        loop {
            let page = repo
                .scan_by_condition_paginate(ScanParams::builder().paging(page(4, cursor)).build())
                .await
                .unwrap();
            all.extend(ids(&page.items));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        assert_eq!(all.len(), 9);
        assert_eq!(all.first().map(String::as_str), Some("r00"));
    }

    #[tokio::test]
    async fn test_should_run_independent_paginations_concurrently() {
        let (store, repo) = seeded("ledger", 25).await;
        store.set_evaluation_ceiling(Some(5));

        let runs = (1..=6).map(|size| {
            let repo = repo.clone();
            async move {
                let mut count = 0;
                let mut cursor = None;
                loop {
                    let page = query_page(&repo, page(size, cursor)).await;
                    count += page.items.len();
                    match page.next_cursor {
                        Some(next) => cursor = Some(next),
                        None => break count,
                    }
                }
            }
        });
        let counts = join_all(runs).await;
        assert_eq!(counts, vec![25; 6]);
    }
}
