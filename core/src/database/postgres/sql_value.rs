use bytes::BytesMut;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type as PgType};

use crate::types::SqlValue;

/// Parameters are bound against whatever type Postgres inferred for the
/// placeholder, so integers and text are narrowed or parsed to fit it.
impl ToSql for SqlValue {
    fn to_sql(
        &self,
        ty: &PgType,
        out: &mut BytesMut,
    ) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlValue::Null => Ok(IsNull::Yes),
            SqlValue::Bool(value) => match *ty {
                PgType::BOOL => value.to_sql(ty, out),
                _ => value.to_string().to_sql(ty, out),
            },
            SqlValue::Int(value) => int_to_sql(*value, ty, out),
            SqlValue::Text(value) => match *ty {
                PgType::INT2 | PgType::INT4 | PgType::INT8 => {
                    int_to_sql(value.trim().parse::<i64>()?, ty, out)
                }
                PgType::BOOL => value.trim().parse::<bool>()?.to_sql(ty, out),
                _ => value.to_sql(ty, out),
            },
        }
    }

    fn accepts(_ty: &PgType) -> bool {
        true
    }

    to_sql_checked!();
}

fn int_to_sql(
    value: i64,
    ty: &PgType,
    out: &mut BytesMut,
) -> Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
    match *ty {
        PgType::INT2 => i16::try_from(value)?.to_sql(ty, out),
        PgType::INT4 => i32::try_from(value)?.to_sql(ty, out),
        PgType::INT8 => value.to_sql(ty, out),
        _ => value.to_string().to_sql(ty, out),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_is_narrowed_to_column_type() {
        let mut out = BytesMut::new();
        let result = SqlValue::Int(7).to_sql(&PgType::INT4, &mut out).unwrap();

        assert!(matches!(result, IsNull::No));
        assert_eq!(out.as_ref(), &7i32.to_be_bytes());
    }

    #[test]
    fn test_int_out_of_range_errors() {
        let mut out = BytesMut::new();

        assert!(SqlValue::Int(i64::from(i16::MAX) + 1).to_sql(&PgType::INT2, &mut out).is_err());
    }

    #[test]
    fn test_text_is_parsed_for_int_columns() {
        let mut out = BytesMut::new();
        SqlValue::from("42").to_sql(&PgType::INT8, &mut out).unwrap();

        assert_eq!(out.as_ref(), &42i64.to_be_bytes());
    }

    #[test]
    fn test_null_binds_as_null() {
        let mut out = BytesMut::new();
        let result = SqlValue::Null.to_sql(&PgType::TEXT, &mut out).unwrap();

        assert!(matches!(result, IsNull::Yes));
        assert!(out.is_empty());
    }
}
