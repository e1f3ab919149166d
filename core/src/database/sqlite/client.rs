use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use async_trait::async_trait;
use dotenv::dotenv;
use rusqlite::{params_from_iter, Connection};
use tracing::{debug, error, info};

use crate::{
    bulk::{GeneratedStatement, PlaceholderStyle},
    database::{Store, StoreError},
};

/// How long a call waits on a lock held by another writer before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

pub fn connection_string() -> String {
    dotenv().ok();
    // Default to ./casebatch.db if DATABASE_URL is not set
    env::var("DATABASE_URL").unwrap_or_else(|_| "./casebatch.db".to_string())
}

#[derive(thiserror::Error, Debug)]
pub enum SqliteConnectionError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] SqliteError),

    #[error("Can not connect to the database please make sure your connection string is correct")]
    CanNotConnectToDatabase,
}

#[derive(thiserror::Error, Debug)]
pub enum SqliteError {
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[error("SQLite task failed: {0}")]
    TaskJoinError(#[from] tokio::task::JoinError),
}

/// SQLite store. Each call opens its own connection on a blocking thread.
pub struct SqliteClient {
    db_path: String,
}

impl SqliteClient {
    /// Opens the database named by `DATABASE_URL`, or `./casebatch.db`.
    pub async fn new() -> Result<Self, SqliteConnectionError> {
        Self::open(connection_string()).await
    }

    pub async fn open(db_path: impl AsRef<Path>) -> Result<Self, SqliteConnectionError> {
        let db_path = db_path.as_ref().to_string_lossy().to_string();

        info!("Connecting to SQLite database at: {}", db_path);

        let db_path_clone = db_path.clone();
        tokio::task::spawn_blocking(move || {
            if let Some(parent) = PathBuf::from(&db_path_clone).parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    std::fs::create_dir_all(parent).map_err(|e| {
                        error!("Failed to create parent directories for SQLite database: {}", e);
                        SqliteConnectionError::CanNotConnectToDatabase
                    })?;
                }
            }

            let conn = Connection::open(&db_path_clone).map_err(|e| {
                error!("Error connecting to SQLite database: {}", e);
                SqliteConnectionError::CanNotConnectToDatabase
            })?;

            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;").map_err(
                |e| {
                    error!("Error setting SQLite pragmas: {}", e);
                    SqliteConnectionError::CanNotConnectToDatabase
                },
            )?;

            Ok::<(), SqliteConnectionError>(())
        })
        .await
        .map_err(|_| SqliteConnectionError::CanNotConnectToDatabase)??;

        Ok(SqliteClient { db_path })
    }

    pub fn db_path(&self) -> &str {
        &self.db_path
    }

    /// Runs `f` against a fresh connection on the blocking pool.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T, SqliteError>
    where
        F: FnOnce(&mut Connection) -> Result<T, rusqlite::Error> + Send + 'static,
        T: Send + 'static,
    {
        let db_path = self.db_path.clone();

        let result = tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(&db_path)?;
            conn.busy_timeout(BUSY_TIMEOUT)?;
            f(&mut conn)
        })
        .await??;

        Ok(result)
    }

    pub async fn batch_execute(&self, sql: &str) -> Result<(), SqliteError> {
        let sql = sql.to_string();
        self.with_connection(move |conn| conn.execute_batch(&sql)).await
    }
}

fn execute_on(conn: &Connection, statement: &GeneratedStatement) -> Result<u64, rusqlite::Error> {
    let mut prepared = conn.prepare(&statement.sql)?;
    let count = prepared.execute(params_from_iter(statement.params.iter()))?;
    Ok(count as u64)
}

#[async_trait]
impl Store for SqliteClient {
    fn placeholder_style(&self) -> PlaceholderStyle {
        PlaceholderStyle::Question
    }

    async fn execute_statement(&self, statement: &GeneratedStatement) -> Result<u64, StoreError> {
        debug!("Executing sqlite statement with {} params", statement.params.len());

        let statement = statement.clone();
        Ok(self.with_connection(move |conn| execute_on(conn, &statement)).await?)
    }

    async fn execute_in_transaction(
        &self,
        statements: &[GeneratedStatement],
    ) -> Result<Vec<u64>, StoreError> {
        debug!("Executing {} sqlite statements in one transaction", statements.len());

        let statements = statements.to_vec();
        let counts = self
            .with_connection(move |conn| {
                // an uncommitted transaction rolls back when dropped
                let transaction = conn.transaction()?;
                let counts = statements
                    .iter()
                    .map(|statement| execute_on(&transaction, statement))
                    .collect::<Result<Vec<_>, _>>()?;
                transaction.commit()?;
                Ok(counts)
            })
            .await?;

        Ok(counts)
    }
}
