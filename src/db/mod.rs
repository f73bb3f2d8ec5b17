use sqlx::{postgres::PgPoolOptions, Pool, Postgres};
use std::time::Duration;

pub type Db = Pool<Postgres>;

/// Connect the primary read-write pool and run pending migrations.
///
/// The acquire timeout is generous because `SigningWorker` and `DrainExecutor`
/// hold a transaction open across one external call; see SPEC_FULL.md §5.
pub async fn init_db(database_url: &str) -> anyhow::Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}

/// Connect an optional read replica for read-path queries (`RO_DATABASE_URL`).
/// Falls back to the primary pool when unset.
pub async fn init_ro_db(database_url: &str) -> anyhow::Result<Db> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(5))
        .connect(database_url)
        .await?;

    Ok(pool)
}

// Schema lives in migrations/0001_initial_schema.sql, applied via sqlx::migrate!.
