pub mod criterion;
pub mod sql_value;

pub use criterion::{Criteria, Criterion};
pub use sql_value::{SqlValue, ValueMap};
