// public
pub mod bulk;
pub mod config;
pub mod manifest;
pub mod types;

mod database;
pub use database::{
    postgres::client::{connection_string, PostgresClient, PostgresConnectionError, PostgresError},
    sqlite::client::{SqliteClient, SqliteConnectionError, SqliteError},
    Store, StoreError,
};

mod helpers;
pub use helpers::{block_count, partition, read_env_value, substitute_env_variables};

mod logger;
pub use logger::{level_for_verbosity, setup_info_logger, setup_logger};

pub use bulk::{
    BatchResult, BulkPlanner, BulkUpdateError, BulkUpdater, DeleteSpec, GeneratedStatement,
    PlaceholderStyle, UpdateSpec,
};
pub use config::{BatchConfig, BatchConfigError, RowScope, TransactionMode};
pub use types::{Criteria, Criterion, SqlValue, ValueMap};

// export 3rd party dependencies
pub use async_trait::async_trait;
pub use tracing::level_filters::LevelFilter;
