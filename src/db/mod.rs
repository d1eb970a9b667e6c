mod models;
mod orders;
mod seeders;
mod store;

pub use models::*;
pub use orders::{place_order, OrderError};
pub use seeders::seed_defaults;
pub use store::SqliteStore;

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

pub type DbPool = SqlitePool;

/// Tables every running instance needs.
pub const ESSENTIAL_TABLES: [&str; 9] = [
    "barbers",
    "users",
    "bookings",
    "booking_confirmations",
    "products",
    "orders",
    "order_items",
    "contacts",
    "change_log",
];

/// Split a migration file into statements and run them in order.
///
/// Trigger bodies contain `;` of their own, so a `CREATE TRIGGER` statement
/// runs until its closing `END;` line.
async fn execute_sql(pool: &SqlitePool, sql: &str) -> Result<()> {
    for statement in split_statements(sql) {
        sqlx::query(&statement)
            .execute(pool)
            .await
            .with_context(|| format!("Migration statement failed: {}", first_line(&statement)))?;
    }
    Ok(())
}

fn split_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_trigger = false;

    for line in sql.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with("--") {
            continue;
        }
        if current.is_empty() && trimmed.to_ascii_uppercase().starts_with("CREATE TRIGGER") {
            in_trigger = true;
        }
        current.push_str(line);
        current.push('\n');

        let ends = if in_trigger {
            trimmed.eq_ignore_ascii_case("END;")
        } else {
            trimmed.ends_with(';')
        };
        if ends {
            statements.push(current.trim().trim_end_matches(';').to_string());
            current.clear();
            in_trigger = false;
        }
    }

    let rest = current.trim();
    if !rest.is_empty() {
        statements.push(rest.to_string());
    }
    statements
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or_default()
}

pub async fn init(data_dir: &Path) -> Result<DbPool> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory: {}", data_dir.display()))?;
    let db_path = data_dir.join("barberbook.db");

    info!("Initializing database at {}", db_path.display());

    let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path.display()))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("Database initialized successfully");
    Ok(pool)
}

/// A private in-memory database with the full schema.
///
/// Every connection to `sqlite::memory:` opens a separate database, so the
/// pool is pinned to a single connection that is never recycled.
pub async fn connect_in_memory() -> Result<DbPool> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .min_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect_with(options)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Running database migrations...");

    // Migration 001: Core tables
    execute_sql(pool, include_str!("../../migrations/001_initial.sql")).await?;

    // Migration 002: Change log and its triggers
    execute_sql(pool, include_str!("../../migrations/002_change_log.sql")).await?;

    info!("Migrations complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keeps_trigger_bodies_whole() {
        let sql = r#"
-- comment
CREATE TABLE a (id TEXT);
CREATE TRIGGER t AFTER INSERT ON a
BEGIN
    INSERT INTO b VALUES (NEW.id);
    INSERT INTO c VALUES (NEW.id);
END;
CREATE INDEX i ON a(id);
"#;
        let statements = split_statements(sql);
        assert_eq!(statements.len(), 3);
        assert!(statements[1].starts_with("CREATE TRIGGER"));
        assert!(statements[1].contains("INSERT INTO c"));
        assert!(statements[1].ends_with("END"));
        assert_eq!(statements[2], "CREATE INDEX i ON a(id)");
    }

    #[tokio::test]
    async fn test_migrations_create_schema_and_triggers() {
        let pool = connect_in_memory().await.unwrap();

        for table in ESSENTIAL_TABLES {
            let found: Option<(String,)> =
                sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' AND name = ?")
                    .bind(table)
                    .fetch_optional(&pool)
                    .await
                    .unwrap();
            assert!(found.is_some(), "missing table {}", table);
        }

        let (triggers,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'trigger' AND name LIKE 'trg_changelog_%'",
        )
        .fetch_one(&pool)
        .await
        .unwrap();
        assert_eq!(triggers, 12);
    }

    #[tokio::test]
    async fn test_migrations_are_idempotent() {
        let pool = connect_in_memory().await.unwrap();
        run_migrations(&pool).await.unwrap();
    }
}
