//! Database Layer with Connection Pooling and Safe Transactions
//!
//! SQLite database layer featuring:
//! - Connection pooling via r2d2 for concurrent access
//! - Panic-safe transactions with automatic rollback
//! - Version-tracked schema
//! - WAL mode for concurrent readers while a generation run writes

use std::path::Path;
use std::sync::Arc;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::types::{PlanwrightError, Result, ResultExt};

/// Shared database handle for async contexts.
pub type SharedDatabase = Arc<Database>;

const SCHEMA: &str = include_str!("schema.sql");

/// Current schema version
const SCHEMA_VERSION: u32 = 1;

/// Connection pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
    /// Maximum number of connections in the pool
    pub max_size: u32,
    /// Minimum idle connections to keep ready
    pub min_idle: u32,
    /// Timeout for acquiring a connection (seconds)
    pub connection_timeout_secs: u64,
}

impl PoolConfig {
    const MIN_POOL_SIZE: u32 = 2;
    const MAX_POOL_SIZE: u32 = 8;

    /// One connection per core, clamped
    pub fn optimal_pool_size() -> u32 {
        let cores = std::thread::available_parallelism()
            .map(|p| p.get() as u32)
            .unwrap_or(4);
        cores.clamp(Self::MIN_POOL_SIZE, Self::MAX_POOL_SIZE)
    }

    pub fn auto() -> Self {
        Self {
            max_size: Self::optimal_pool_size(),
            min_idle: 1,
            connection_timeout_secs: 30,
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self::auto()
    }
}

/// Thread-safe database with connection pooling.
pub struct Database {
    pool: Pool<SqliteConnectionManager>,
}

impl Database {
    /// Open database with connection pooling at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, PoolConfig::default())
    }

    /// Open database with custom pool configuration.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: PoolConfig) -> Result<Self> {
        let manager =
            SqliteConnectionManager::file(path.as_ref()).with_init(Self::configure_connection);

        let pool = Pool::builder()
            .max_size(config.max_size)
            .min_idle(Some(config.min_idle))
            .connection_timeout(std::time::Duration::from_secs(
                config.connection_timeout_secs,
            ))
            .build(manager)
            .map_err(|e| {
                PlanwrightError::Storage(format!("Failed to create connection pool: {}", e))
            })?;

        Ok(Self { pool })
    }

    /// Open an in-memory database for testing or temporary use.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();

        // Every in-memory connection is a separate database
        let pool = Pool::builder().max_size(1).build(manager).map_err(|e| {
            PlanwrightError::Storage(format!("Failed to create in-memory pool: {}", e))
        })?;

        Ok(Self { pool })
    }

    fn configure_connection(conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA busy_timeout = 5000;
            PRAGMA wal_autocheckpoint = 1000;
            "#,
        )?;
        Ok(())
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(|e| {
            PlanwrightError::Storage(format!("Failed to acquire database connection: {}", e))
        })
    }

    /// Initialize database schema.
    pub fn initialize(&self) -> Result<()> {
        let conn = self.conn()?;

        let current: u32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap_or(0);
        if current > SCHEMA_VERSION {
            return Err(PlanwrightError::Storage(format!(
                "Usage database schema v{} is newer than supported v{}",
                current, SCHEMA_VERSION
            )));
        }

        conn.execute_batch(SCHEMA)
            .with_context("Failed to initialize database schema")?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)
            .with_context("Failed to set schema version")?;
        Ok(())
    }

    /// Get a raw connection for advanced operations.
    pub fn connection(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.conn()
    }

    /// Execute a function within a panic-safe database transaction.
    ///
    /// If the closure returns an error or panics, the transaction is rolled
    /// back and an error is returned instead of poisoning the pool.
    pub fn transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction()
            .with_context("Failed to start transaction")?;

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| f(&tx)));

        match result {
            Ok(Ok(value)) => {
                tx.commit().with_context("Failed to commit transaction")?;
                Ok(value)
            }
            Ok(Err(e)) => Err(e),
            Err(panic_payload) => {
                let panic_msg = panic_payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic_payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "Unknown panic".to_string());

                tracing::error!("Transaction panicked: {}", panic_msg);
                Err(PlanwrightError::Storage(format!(
                    "Transaction panicked: {}",
                    panic_msg
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn table_names(db: &Database) -> Vec<String> {
        let conn = db.connection().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap();
        stmt.query_map([], |row| row.get(0))
            .unwrap()
            .filter_map(|r| r.ok())
            .collect()
    }

    #[test]
    fn test_open_in_memory() {
        let db = Database::open_in_memory().expect("Failed to open in-memory database");
        db.initialize().expect("Failed to initialize schema");
        assert!(table_names(&db).contains(&"usage_records".to_string()));
    }

    #[test]
    fn test_initialize_is_idempotent_on_disk() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("usage.db");

        let db = Database::open(&path).unwrap();
        db.initialize().unwrap();
        db.initialize().unwrap();

        let version: u32 = db
            .connection()
            .unwrap()
            .pragma_query_value(None, "user_version", |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);

        let mode: String = db
            .connection()
            .unwrap()
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");
    }

    #[test]
    fn test_newer_schema_rejected() {
        let db = Database::open_in_memory().unwrap();
        db.connection()
            .unwrap()
            .pragma_update(None, "user_version", SCHEMA_VERSION + 1)
            .unwrap();
        assert!(matches!(db.initialize(), Err(PlanwrightError::Storage(_))));
    }

    #[test]
    fn test_transaction_panic_safety() {
        let db = Database::open_in_memory().expect("Failed to open database");
        db.initialize().expect("Failed to initialize");

        let result: Result<()> = db.transaction(|_conn| {
            panic!("Intentional panic for testing");
        });

        assert!(result.unwrap_err().to_string().contains("panicked"));
        assert!(db.connection().is_ok());
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let db = Database::open_in_memory().unwrap();
        db.initialize().unwrap();

        let result: Result<()> = db.transaction(|conn| {
            conn.execute(
                "INSERT INTO usage_records (request_id, document_type, provider, model, total_tokens,
                 context_window, utilization_pct, duration_ms, success, record_json, recorded_at)
                 VALUES ('r', 'd', 'p', 'm', 1, 1, 1.0, 1, 1, '{}', 'now')",
                [],
            )?;
            Err(PlanwrightError::Storage("abort".to_string()))
        });
        assert!(result.is_err());

        let count: i64 = db
            .connection()
            .unwrap()
            .query_row("SELECT COUNT(*) FROM usage_records", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn test_pool_config_optimal_sizing() {
        let size = PoolConfig::optimal_pool_size();
        assert!(size >= PoolConfig::MIN_POOL_SIZE);
        assert!(size <= PoolConfig::MAX_POOL_SIZE);
        assert_eq!(PoolConfig::auto().max_size, size);
    }
}
