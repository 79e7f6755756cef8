//! Database initialization tests

use promobot_common::db::{init_database, init_memory_database, BUSY_TIMEOUT};

#[tokio::test]
async fn test_init_creates_database_and_parent_folder() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("nested").join("promobot.db");
    assert!(!db_path.exists());

    let pool = init_database(&db_path).await.unwrap();
    assert!(db_path.exists(), "Database file should be created");

    let mode: String = sqlx::query_scalar("PRAGMA journal_mode")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(mode.to_lowercase(), "wal");
}

#[tokio::test]
async fn test_busy_timeout_on_every_connection() {
    let temp_dir = tempfile::tempdir().unwrap();
    let pool = init_database(&temp_dir.path().join("promobot.db")).await.unwrap();

    // Hold two connections at once so the second one is a fresh connection
    let mut first = pool.acquire().await.unwrap();
    let mut second = pool.acquire().await.unwrap();

    for conn in [&mut first, &mut second] {
        let timeout: i64 = sqlx::query_scalar("PRAGMA busy_timeout")
            .fetch_one(&mut **conn)
            .await
            .unwrap();
        assert_eq!(timeout, BUSY_TIMEOUT.as_millis() as i64);
    }
}

#[tokio::test]
async fn test_reopen_existing_database_keeps_data() {
    let temp_dir = tempfile::tempdir().unwrap();
    let db_path = temp_dir.path().join("promobot.db");

    {
        let pool = init_database(&db_path).await.unwrap();
        sqlx::query("CREATE TABLE marker (value TEXT)").execute(&pool).await.unwrap();
        sqlx::query("INSERT INTO marker VALUES ('kept')").execute(&pool).await.unwrap();
        pool.close().await;
    }

    let pool = init_database(&db_path).await.unwrap();
    let value: String = sqlx::query_scalar("SELECT value FROM marker")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(value, "kept");
}

#[tokio::test]
async fn test_memory_database_is_shared_across_queries() {
    let pool = init_memory_database().await.unwrap();
    sqlx::query("CREATE TABLE t (id INTEGER)").execute(&pool).await.unwrap();
    sqlx::query("INSERT INTO t VALUES (1)").execute(&pool).await.unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM t")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}
