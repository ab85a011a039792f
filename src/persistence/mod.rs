//! Persistence Layer
//!
//! SQLite-backed storage for the five tables the core owns (spec §6):
//! `settings`, `managed_positions`, `trade_history`, `events`,
//! `strategy_presets`, and `scanner_candidates`. All access goes through
//! `repository`; `models` holds the row shapes.

pub mod models;
pub mod repository;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::ConnectOptions;
use std::path::Path;
use std::str::FromStr;
use tracing::info;

/// Database connection pool
pub type DbPool = SqlitePool;

/// Database initialization error
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Database connection error: {0}")]
    ConnectionError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Query error: {0}")]
    QueryError(String),
}

/// Initialize the database connection pool
///
/// # Arguments
/// - `database_url`: Path to SQLite database file (e.g., "sqlite://data/trading.db")
///
/// # Errors
/// Returns error if database connection fails or migrations fail
pub async fn init_database(database_url: &str) -> Result<DbPool, DatabaseError> {
    init_database_with(database_url, 5, true).await
}

/// Same as [`init_database`] but honoring a full [`DatabaseConfig`] (pool
/// size, query logging) rather than the hardcoded test defaults.
pub async fn init_database_with_config(config: &DatabaseConfig) -> Result<DbPool, DatabaseError> {
    init_database_with(&config.url, config.max_connections, config.log_queries).await
}

async fn init_database_with(
    database_url: &str,
    max_connections: u32,
    log_queries: bool,
) -> Result<DbPool, DatabaseError> {
    info!("Initializing database: {}", database_url);

    if let Some(db_path) = database_url.strip_prefix("sqlite://") {
        if let Some(parent) = Path::new(db_path).parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::ConnectionError(sqlx::Error::Configuration(Box::new(e)))
            })?;
        }
    }

    let log_level = if log_queries { tracing::log::LevelFilter::Debug } else { tracing::log::LevelFilter::Off };
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .log_statements(log_level);

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await?;

    run_migrations(&pool).await?;

    info!("database ready");

    Ok(pool)
}

async fn run_migrations(pool: &DbPool) -> Result<(), DatabaseError> {
    info!("running migrations");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            kind TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("settings: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS managed_positions (
            symbol TEXT PRIMARY KEY,
            side TEXT NOT NULL CHECK(side IN ('buy', 'sell')),
            entry_price REAL NOT NULL,
            initial_amount REAL NOT NULL,
            initial_stop_loss REAL NOT NULL,
            leverage REAL NOT NULL,
            timeframe TEXT NOT NULL,
            reason TEXT NOT NULL,
            created_at DATETIME NOT NULL,
            amount REAL NOT NULL,
            stop_loss REAL NOT NULL,
            take_profit REAL NOT NULL,
            pnl REAL NOT NULL DEFAULT 0.0,
            pnl_percentage REAL NOT NULL DEFAULT 0.0,
            partial_tp_executed BOOLEAN NOT NULL DEFAULT 0,
            bailout_armed BOOLEAN NOT NULL DEFAULT 0,
            extremum_price REAL NOT NULL DEFAULT 0.0,
            bailout_analysis_triggered BOOLEAN NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("managed_positions: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS trade_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT NOT NULL,
            side TEXT NOT NULL,
            initial_amount REAL NOT NULL,
            entry_price REAL NOT NULL,
            close_price REAL NOT NULL,
            pnl REAL NOT NULL,
            status TEXT NOT NULL,
            timeframe TEXT NOT NULL,
            opened_at DATETIME NOT NULL,
            closed_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("trade_history: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp DATETIME NOT NULL,
            level TEXT NOT NULL,
            category TEXT NOT NULL,
            message TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("events: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS scanner_candidates (
            symbol TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            timeframe TEXT NOT NULL,
            indicators_json TEXT NOT NULL,
            last_updated DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("scanner_candidates: {e}")))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS strategy_presets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            settings_json TEXT NOT NULL,
            created_at DATETIME NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| DatabaseError::MigrationError(format!("strategy_presets: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_trade_history_symbol ON trade_history(symbol)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("index: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_events_timestamp ON events(timestamp)")
        .execute(pool)
        .await
        .map_err(|e| DatabaseError::MigrationError(format!("index: {e}")))?;

    info!("migrations complete");

    Ok(())
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub log_queries: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/trading.db".to_string(),
            max_connections: 5,
            log_queries: cfg!(debug_assertions),
        }
    }
}

impl DatabaseConfig {
    pub fn from_env() -> Self {
        let url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite://data/trading.db".to_string());

        let max_connections = std::env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(5);

        let log_queries = std::env::var("DATABASE_LOG_QUERIES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(cfg!(debug_assertions));

        Self {
            url,
            max_connections,
            log_queries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_init() {
        let pool = init_database("sqlite::memory:").await;
        assert!(pool.is_ok());
    }

    #[tokio::test]
    async fn test_migrations_create_all_tables() {
        let pool = init_database("sqlite::memory:").await.unwrap();

        let result: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name IN \
             ('settings', 'managed_positions', 'trade_history', 'events', \
             'scanner_candidates', 'strategy_presets')",
        )
        .fetch_one(&pool)
        .await
        .unwrap();

        assert_eq!(result.0, 6);
    }

    #[test]
    fn test_database_config_default() {
        let config = DatabaseConfig::default();
        assert_eq!(config.url, "sqlite://data/trading.db");
        assert_eq!(config.max_connections, 5);
    }
}
