//! Batched keyed-value updates.
//!
//! A `old value -> new value` mapping plus optional filter criteria is cut
//! into blocks (`chunker`), each block is rendered as one parameterized
//! `UPDATE ... SET col = CASE ... END WHERE ...` statement (`query_builder`),
//! and the statements are run against a [`Store`](crate::Store) with their
//! row counts summed (`executor`).

mod chunker;
mod executor;
mod planner;
mod query_builder;

pub use chunker::{ChunkCombination, ChunkPlan, Chunker, CriterionChunk};
pub use executor::BulkUpdater;
pub use planner::{BulkPlanner, StatementPlan};
pub use query_builder::{
    build_delete_statement, build_update_statement, format_table_name, quote_identifier,
    validate_identifier, PlaceholderStyle,
};
use serde::{Deserialize, Serialize};

use crate::{
    database::StoreError,
    types::{Criteria, SqlValue, ValueMap},
};

/// One bulk update: rewrite `target_column` for rows whose `match_column`
/// value is a key of `values`, restricted by `criteria`.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct UpdateSpec {
    pub table: String,

    #[serde(alias = "column")]
    pub match_column: String,

    /// Column receiving the new values. Defaults to `match_column`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_column: Option<String>,

    #[serde(default)]
    pub values: ValueMap,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub criteria: Option<Criteria>,
}

impl UpdateSpec {
    pub fn new(table: impl Into<String>, match_column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            match_column: match_column.into(),
            target_column: None,
            values: ValueMap::new(),
            criteria: None,
        }
    }

    pub fn target_column(mut self, target_column: impl Into<String>) -> Self {
        self.target_column = Some(target_column.into());
        self
    }

    pub fn value(mut self, current: impl Into<SqlValue>, new: impl Into<SqlValue>) -> Self {
        self.values.insert(current.into(), new.into());
        self
    }

    pub fn values(mut self, values: ValueMap) -> Self {
        self.values = values;
        self
    }

    pub fn criterion(
        mut self,
        column: impl Into<String>,
        criterion: impl Into<crate::types::Criterion>,
    ) -> Self {
        self.criteria.get_or_insert_with(Criteria::new).insert(column.into(), criterion.into());
        self
    }

    pub fn target(&self) -> UpdateTarget<'_> {
        UpdateTarget {
            table: &self.table,
            match_column: &self.match_column,
            target_column: self.target_column.as_deref().unwrap_or(&self.match_column),
        }
    }
}

/// One bulk delete of rows matching every criterion.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct DeleteSpec {
    pub table: String,

    #[serde(default)]
    pub criteria: Criteria,
}

impl DeleteSpec {
    pub fn new(table: impl Into<String>) -> Self {
        Self { table: table.into(), criteria: Criteria::new() }
    }

    pub fn criterion(
        mut self,
        column: impl Into<String>,
        criterion: impl Into<crate::types::Criterion>,
    ) -> Self {
        self.criteria.insert(column.into(), criterion.into());
        self
    }
}

/// Identifiers an update statement is rendered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpdateTarget<'a> {
    pub table: &'a str,
    pub match_column: &'a str,
    pub target_column: &'a str,
}

impl<'a> UpdateTarget<'a> {
    pub fn new(table: &'a str, match_column: &'a str) -> Self {
        Self { table, match_column, target_column: match_column }
    }
}

/// SQL text plus its positional parameters, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedStatement {
    pub sql: String,
    pub params: Vec<SqlValue>,

    /// Index of the value chunk this statement was rendered from.
    pub value_chunk: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchResult {
    pub rows_affected: u64,
    pub statements_executed: usize,
}

#[derive(thiserror::Error, Debug)]
pub enum BulkUpdateError {
    #[error("Invalid {kind} identifier: {value:?}")]
    InvalidIdentifier { kind: &'static str, value: String },

    #[error("A generated statement would bind {required} parameters, the limit is {limit}")]
    ParameterLimitExceeded { required: usize, limit: usize },

    #[error("New value {value:?} of value chunk {chunk} is a key of value chunk {later_chunk}, rows would be rewritten twice")]
    ChainedValue { value: SqlValue, chunk: usize, later_chunk: usize },

    #[error("Refusing to delete from {0} without any criteria")]
    UnrestrictedDelete(String),

    #[error("Bulk statement failed after {completed_statements} of {total_statements} statements had applied {rows_applied} rows: {source}")]
    PartiallyApplied {
        completed_statements: usize,
        total_statements: usize,
        rows_applied: u64,
        #[source]
        source: StoreError,
    },

    #[error("Bulk transaction of {total_statements} statements was rolled back: {source}")]
    RolledBack {
        total_statements: usize,
        #[source]
        source: StoreError,
    },
}

impl BulkUpdateError {
    /// The store error behind an execution failure, if any.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            BulkUpdateError::PartiallyApplied { source, .. } |
            BulkUpdateError::RolledBack { source, .. } => Some(source),
            _ => None,
        }
    }
}
