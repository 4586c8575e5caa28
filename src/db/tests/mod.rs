//! Shared database repository test infrastructure
//!
//! Each repository has a test module containing shared test functions that
//! take a context of `&dyn` repos, plus a `sqlite_tests` module that wires
//! them to an in-memory SQLite database with the real migrations applied.
//!
//! ```bash
//! cargo test db::tests
//! ```

mod records;
mod run_log;

#[tokio::test]
async fn test_pool_health_check() {
    let db = super::DbPool::from_sqlite(harness::migrated_sqlite_pool().await);
    db.health_check().await.expect("health check failed");
    assert!(db.run_logs().find_active_run().await.unwrap().is_none());
}
