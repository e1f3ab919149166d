use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// An opaque scalar bound into a generated statement.
///
/// Values are never rendered into SQL text; they only ever travel as
/// statement parameters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl SqlValue {
    pub fn is_null(&self) -> bool {
        matches!(self, SqlValue::Null)
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        SqlValue::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        SqlValue::Text(value)
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        SqlValue::Int(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        SqlValue::Int(i64::from(value))
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        SqlValue::Bool(value)
    }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(SqlValue::Null, Into::into)
    }
}

/// Ordered `current value -> new value` mapping. Inserting an existing key
/// overwrites its new value in place.
pub type ValueMap = IndexMap<SqlValue, SqlValue>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sql_value_from_yaml_scalars() {
        let yaml = r#"
          - ~
          - true
          - 42
          - "content 1"
        "#;

        let values: Vec<SqlValue> = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(
            values,
            vec![
                SqlValue::Null,
                SqlValue::Bool(true),
                SqlValue::Int(42),
                SqlValue::Text("content 1".to_string())
            ]
        );
    }

    #[test]
    fn test_value_map_overwrites_duplicate_keys() {
        let mut values = ValueMap::new();
        values.insert("c1".into(), "first".into());
        values.insert("c2".into(), "second".into());
        values.insert("c1".into(), "third".into());

        assert_eq!(values.len(), 2);
        assert_eq!(values.get_index(0), Some((&SqlValue::from("c1"), &SqlValue::from("third"))));
    }
}
