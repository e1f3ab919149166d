//! Runs against the database named by `DATABASE_URL`.
//!
//! `cargo test -- --ignored` with a disposable Postgres database.

use casebatch::{
    BatchConfig, BulkUpdateError, BulkUpdater, Criteria, Criterion, PostgresClient, RowScope,
    SqlValue, TransactionMode, ValueMap,
};

async fn seed(table: &str, names: &[&str]) -> PostgresClient {
    let client = PostgresClient::new().await.unwrap();
    client
        .batch_execute(&format!(
            "DROP TABLE IF EXISTS {table};
             CREATE TABLE {table} (id SERIAL PRIMARY KEY, name TEXT UNIQUE, owner_id INT4);"
        ))
        .await
        .unwrap();

    for (i, name) in names.iter().enumerate() {
        let owner_id = i as i32 % 2;
        client
            .execute(
                &format!("INSERT INTO {table} (name, owner_id) VALUES ($1, $2)"),
                &[name, &owner_id],
            )
            .await
            .unwrap();
    }

    client
}

async fn names(client: &PostgresClient, table: &str) -> Vec<String> {
    client
        .query(&format!("SELECT name FROM {table} ORDER BY id"), &[])
        .await
        .unwrap()
        .iter()
        .map(|row| row.get(0))
        .collect()
}

fn literal_values() -> ValueMap {
    [("content 1", "update 1"), ("content 2", "update 2"), ("content ?", "should not exist")]
        .into_iter()
        .map(|(key, value)| (SqlValue::from(key), SqlValue::from(value)))
        .collect()
}

#[tokio::test]
#[ignore]
async fn postgres_literal_example() {
    let client = seed("casebatch_literal", &["content 1", "content 2", "content 3"]).await;
    let updater = BulkUpdater::new(client, BatchConfig::default()).unwrap();

    let count =
        updater.bulk_update("casebatch_literal", "name", &literal_values(), None).await.unwrap();

    assert_eq!(count, 2);
    assert_eq!(
        names(updater.store(), "casebatch_literal").await,
        vec!["update 1", "update 2", "content 3"]
    );
}

#[tokio::test]
#[ignore]
async fn postgres_all_rows_scope_with_int_criterion() {
    let client = seed("casebatch_scope", &["content 1", "content 2", "content 3"]).await;
    let config = BatchConfig::with_block_sizes(2, 2).with_row_scope(RowScope::AllRows);
    let updater = BulkUpdater::new(client, config).unwrap();

    let mut criteria = Criteria::new();
    criteria.insert("owner_id".to_string(), Criterion::from(0i64));

    let count = updater
        .bulk_update("casebatch_scope", "name", &literal_values(), Some(&criteria))
        .await
        .unwrap();

    // rows 0 and 2 have owner 0
    assert_eq!(count, 2);
    assert_eq!(
        names(updater.store(), "casebatch_scope").await,
        vec!["update 1", "content 2", "content 3"]
    );
}

#[tokio::test]
#[ignore]
async fn postgres_single_transaction_rolls_back() {
    let client = seed("casebatch_rollback", &["a", "b", "c", "d"]).await;
    let config =
        BatchConfig::with_block_sizes(2, 2).with_transaction_mode(TransactionMode::Single);
    let updater = BulkUpdater::new(client, config).unwrap();

    let values: ValueMap = [("a", "a1"), ("b", "b1"), ("c", "a1"), ("d", "d1")]
        .into_iter()
        .map(|(key, value)| (SqlValue::from(key), SqlValue::from(value)))
        .collect();

    let err =
        updater.bulk_update("casebatch_rollback", "name", &values, None).await.unwrap_err();

    assert!(matches!(err, BulkUpdateError::RolledBack { .. }));
    assert_eq!(names(updater.store(), "casebatch_rollback").await, vec!["a", "b", "c", "d"]);
}
