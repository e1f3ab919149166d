pub mod postgres;
pub mod sqlite;

use async_trait::async_trait;

use crate::{
    bulk::{GeneratedStatement, PlaceholderStyle},
    database::{postgres::client::PostgresError, sqlite::client::SqliteError},
};

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Postgres(#[from] PostgresError),

    #[error("{0}")]
    Sqlite(#[from] SqliteError),
}

/// A database the bulk engine can run generated statements against.
#[async_trait]
pub trait Store: Send + Sync {
    fn placeholder_style(&self) -> PlaceholderStyle;

    /// Runs one statement in its own implicit transaction and returns the
    /// number of rows it affected.
    async fn execute_statement(&self, statement: &GeneratedStatement) -> Result<u64, StoreError>;

    /// Runs every statement inside one transaction, committing only if all of
    /// them succeed. Returns the per-statement row counts in order.
    async fn execute_in_transaction(
        &self,
        statements: &[GeneratedStatement],
    ) -> Result<Vec<u64>, StoreError>;
}
