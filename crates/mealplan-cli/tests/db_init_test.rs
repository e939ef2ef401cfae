//! Integration tests for the steps behind `mealplan db-init`.
//!
//! Each test names a fresh database on the shared PostgreSQL instance and
//! drops it on completion.

use uuid::Uuid;

use mealplan_db::config::DbConfig;
use mealplan_db::pool;
use mealplan_test_utils::{drop_test_db, pg_url};

fn fresh_config(base_url: &str) -> (DbConfig, String) {
    let db_name = format!("mealplan_init_{}", Uuid::new_v4().simple());
    (DbConfig::new(format!("{base_url}/{db_name}")), db_name)
}

#[tokio::test]
async fn db_init_creates_and_migrates_a_missing_database() {
    let (config, db_name) = fresh_config(pg_url().await);

    pool::ensure_database_exists(&config)
        .await
        .expect("database should be created");
    let db_pool = pool::create_pool(&config).await.unwrap();
    pool::run_migrations(&db_pool).await.unwrap();

    let counts = pool::table_counts(&db_pool).await.unwrap();
    assert_eq!(
        counts,
        vec![
            ("meal_plans", 0),
            ("weekly_meal_plans", 0),
            ("daily_meal_plans", 0),
        ]
    );

    db_pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn db_init_is_idempotent() {
    let (config, db_name) = fresh_config(pg_url().await);

    pool::ensure_database_exists(&config).await.unwrap();
    pool::ensure_database_exists(&config)
        .await
        .expect("second call should find the existing database");

    let db_pool = pool::create_pool(&config).await.unwrap();
    pool::run_migrations(&db_pool).await.unwrap();
    pool::run_migrations(&db_pool)
        .await
        .expect("re-running migrations should be a no-op");

    db_pool.close().await;
    drop_test_db(&db_name).await;
}

#[tokio::test]
async fn db_init_rejects_unsafe_database_names() {
    let config = DbConfig::new(format!("{}/bad-name", pg_url().await));
    let err = pool::ensure_database_exists(&config).await.unwrap_err();
    assert!(err.to_string().contains("invalid characters"), "{err}");
}
