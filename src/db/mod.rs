use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

pub mod models;
pub mod repo;

pub async fn init_pool(database_url: &str) -> anyhow::Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .acquire_timeout(Duration::from_secs(30))
        .connect_with(options)
        .await?;
    initialise(&pool).await?;
    Ok(pool)
}

/// Create tables on first run. Schema changes are additive; the store is a
/// plain record store keyed by id.
pub async fn initialise(pool: &SqlitePool) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS guilds (
            id            INTEGER PRIMARY KEY,
            warden_role   INTEGER,
            inmate_role   INTEGER,
            organiser_role INTEGER,
            jail_channel  INTEGER,
            log_channel   INTEGER,
            updated_at    TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS raids (
            id            INTEGER PRIMARY KEY AUTOINCREMENT,
            guild_id      INTEGER NOT NULL,
            organiser     INTEGER NOT NULL,
            title         TEXT NOT NULL,
            description   TEXT NOT NULL,
            kind          TEXT NOT NULL,
            arrays        INTEGER NOT NULL DEFAULT 1,
            channel_id    INTEGER NOT NULL DEFAULT 0,
            message_id    INTEGER NOT NULL DEFAULT 0,
            ping_role     INTEGER,
            roster        TEXT NOT NULL,
            apply_by      TEXT NOT NULL,
            happens_on    TEXT NOT NULL,
            reminder_sent INTEGER NOT NULL DEFAULT 0,
            start_sent    INTEGER NOT NULL DEFAULT 0,
            version       INTEGER NOT NULL DEFAULT 0,
            updated_at    TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS riddles (
            guild_id   INTEGER NOT NULL,
            user_id    INTEGER NOT NULL,
            text       TEXT NOT NULL,
            solution   TEXT NOT NULL,
            is_sudoku  INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (guild_id, user_id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS jobs (
            id         INTEGER PRIMARY KEY AUTOINCREMENT,
            guild_id   INTEGER NOT NULL,
            fire_at    TEXT NOT NULL,
            args       TEXT NOT NULL,
            done       INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// In-memory database for tests. Single connection: every connection to
/// `:memory:` is its own database otherwise.
#[cfg(test)]
pub async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    initialise(&pool).await.expect("schema");
    pool
}
