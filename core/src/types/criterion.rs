use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::types::sql_value::SqlValue;

/// A restriction on one column: either equality with a scalar or membership
/// in a list of values.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Criterion {
    Single(SqlValue),
    Multiple(Vec<SqlValue>),
}

impl Criterion {
    pub fn list<I, T>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<SqlValue>,
    {
        Criterion::Multiple(values.into_iter().map(Into::into).collect())
    }
}

impl From<SqlValue> for Criterion {
    fn from(value: SqlValue) -> Self {
        Criterion::Single(value)
    }
}

impl From<&str> for Criterion {
    fn from(value: &str) -> Self {
        Criterion::Single(value.into())
    }
}

impl From<i64> for Criterion {
    fn from(value: i64) -> Self {
        Criterion::Single(value.into())
    }
}

impl<T: Into<SqlValue>> From<Vec<T>> for Criterion {
    fn from(values: Vec<T>) -> Self {
        Criterion::list(values)
    }
}

/// Column name to restriction, applied as a conjunction in insertion order.
pub type Criteria = IndexMap<String, Criterion>;
