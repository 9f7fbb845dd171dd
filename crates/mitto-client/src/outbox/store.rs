//! Durable storage for queued notifications.
//!
//! Rows are append-only: a delivered notification is stamped with its send
//! time, never deleted, so the table doubles as an audit trail. The worker
//! consumes rows strictly oldest-first.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use sqlx::sqlite::SqlitePoolOptions;
use thiserror::Error;

/// Errors raised by notification stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("notification row {0} not found")]
    NotFound(i64),

    #[error("invalid table name: {0}")]
    InvalidTable(String),
}

/// A notification not handed to the store yet.
#[derive(Debug, Clone)]
pub struct NewNotification {
    /// Wire method name.
    pub method: String,
    /// Input parameters as a positional JSON array.
    pub input: String,
    /// Instance identifier attached at enqueue time (zero when none).
    pub session: i64,
}

/// One persisted notification row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingNotification {
    pub id: i64,
    pub method: String,
    pub input: String,
    pub session: i64,
    pub created_at: DateTime<Utc>,
    /// Delivery timestamp; `None` while the row is pending.
    pub sent: Option<DateTime<Utc>>,
    /// Microseconds the successful delivery took.
    pub elapsed_us: Option<i64>,
    /// Failed attempts so far.
    pub error_count: i64,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    /// Microseconds the most recent failed attempt took.
    pub last_elapsed_us: Option<i64>,
}

/// Durable backing store for one notification queue.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    /// Persist a new notification; returns its row id.
    async fn insert(&self, notification: NewNotification) -> Result<i64, StoreError>;

    /// The oldest row not delivered yet.
    async fn oldest_unsent(&self) -> Result<Option<PendingNotification>, StoreError>;

    /// Stamp a row as delivered. The row stays in the table.
    async fn mark_sent(
        &self,
        id: i64,
        sent_at: DateTime<Utc>,
        elapsed_us: i64,
    ) -> Result<(), StoreError>;

    /// Merge one failed attempt into the row's error accumulator.
    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        failed_at: DateTime<Utc>,
        elapsed_us: i64,
    ) -> Result<(), StoreError>;

    /// Number of rows awaiting delivery.
    async fn count_pending(&self) -> Result<i64, StoreError>;
}

const DEFAULT_TABLE: &str = "pending_notification";

/// SQLite-backed [`NotificationStore`].
#[derive(Clone)]
pub struct SqliteNotificationStore {
    pool: SqlitePool,
    table: String,
}

impl SqliteNotificationStore {
    /// Create a store over an existing pool, using the default table name.
    ///
    /// Call [`ensure_schema`](Self::ensure_schema) before first use.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            table: DEFAULT_TABLE.to_string(),
        }
    }

    /// Create and initialize a store from a database file path.
    ///
    /// Creates parent directories and the database file as needed, then
    /// creates the notification table if it is missing.
    pub async fn from_path(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                StoreError::Database(sqlx::Error::Io(std::io::Error::other(format!(
                    "failed to create directory {parent:?}: {e}"
                ))))
            })?;
        }

        let url = format!("sqlite:{}?mode=rwc", path.to_string_lossy());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let store = Self::from_pool(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Use a different table, e.g. to keep one audit table per interface.
    ///
    /// # Errors
    ///
    /// The name must be a plain SQL identifier.
    pub fn with_table(mut self, table: impl Into<String>) -> Result<Self, StoreError> {
        let table = table.into();
        let mut chars = table.chars();
        let valid = match chars.next() {
            Some(c) if c.is_ascii_alphabetic() || c == '_' => {
                chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
            }
            _ => false,
        };
        if !valid {
            return Err(StoreError::InvalidTable(table));
        }
        self.table = table;
        Ok(self)
    }

    /// Table the rows live in.
    pub fn table_name(&self) -> &str {
        &self.table
    }

    /// Create the notification table and its pending index if missing.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                method TEXT NOT NULL,
                input TEXT NOT NULL,
                session INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                sent TEXT,
                elapsed_us INTEGER,
                error_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT,
                last_error_at TEXT,
                last_elapsed_us INTEGER
            )
            "#,
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        sqlx::query(&format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_pending ON {table} (id) WHERE sent IS NULL",
            table = self.table
        ))
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl NotificationStore for SqliteNotificationStore {
    async fn insert(&self, notification: NewNotification) -> Result<i64, StoreError> {
        let result = sqlx::query(&format!(
            r#"
            INSERT INTO {table} (method, input, session, created_at)
            VALUES (?, ?, ?, ?)
            "#,
            table = self.table
        ))
        .bind(&notification.method)
        .bind(&notification.input)
        .bind(notification.session)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn oldest_unsent(&self) -> Result<Option<PendingNotification>, StoreError> {
        let record = sqlx::query_as::<_, PendingNotification>(&format!(
            r#"
            SELECT id, method, input, session, created_at, sent, elapsed_us,
                   error_count, last_error, last_error_at, last_elapsed_us
            FROM {table}
            WHERE sent IS NULL
            ORDER BY id ASC
            LIMIT 1
            "#,
            table = self.table
        ))
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn mark_sent(
        &self,
        id: i64,
        sent_at: DateTime<Utc>,
        elapsed_us: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            "UPDATE {table} SET sent = ?, elapsed_us = ? WHERE id = ?",
            table = self.table
        ))
        .bind(sent_at)
        .bind(elapsed_us)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn record_failure(
        &self,
        id: i64,
        error: &str,
        failed_at: DateTime<Utc>,
        elapsed_us: i64,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {table}
            SET error_count = error_count + 1,
                last_error = ?,
                last_error_at = ?,
                last_elapsed_us = ?
            WHERE id = ?
            "#,
            table = self.table
        ))
        .bind(error)
        .bind(failed_at)
        .bind(elapsed_us)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn count_pending(&self) -> Result<i64, StoreError> {
        let count: (i64,) = sqlx::query_as(&format!(
            "SELECT COUNT(*) FROM {table} WHERE sent IS NULL",
            table = self.table
        ))
        .fetch_one(&self.pool)
        .await?;

        Ok(count.0)
    }
}
