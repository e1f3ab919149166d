//! SQL rendering for bulk update and delete statements.
//!
//! Only identifiers are written into the SQL text. Every value is bound as a
//! positional parameter.

use crate::{
    bulk::{
        chunker::{ChunkCombination, CriterionChunk},
        BulkUpdateError, GeneratedStatement, UpdateTarget,
    },
    config::RowScope,
    types::SqlValue,
};

/// Reserved SQL keywords that need quoting.
pub const RESERVED_KEYWORDS: &[&str] = &[
    "case", "check", "default", "end", "from", "group", "index", "key", "limit", "offset", "order",
    "primary", "references", "select", "table", "user", "values", "when", "where",
];

/// How a store spells positional parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaceholderStyle {
    /// `$1`, `$2`, ... (Postgres)
    Dollar,
    /// `?1`, `?2`, ... (SQLite)
    Question,
}

impl PlaceholderStyle {
    pub fn placeholder(&self, position: usize) -> String {
        match self {
            PlaceholderStyle::Dollar => format!("${}", position),
            PlaceholderStyle::Question => format!("?{}", position),
        }
    }
}

/// Quotes an identifier if it's a reserved keyword.
#[inline]
pub fn quote_identifier(name: &str) -> String {
    if !name.starts_with('"') &&
        RESERVED_KEYWORDS.iter().any(|keyword| keyword.eq_ignore_ascii_case(name))
    {
        format!("\"{}\"", name)
    } else {
        name.to_string()
    }
}

/// Formats a table name, quoting each part of `schema.table` on its own.
pub fn format_table_name(table_name: &str) -> String {
    table_name.split('.').map(quote_identifier).collect::<Vec<_>>().join(".")
}

fn is_valid_identifier_part(part: &str) -> bool {
    let bare = match part.strip_prefix('"') {
        Some(quoted) => match quoted.strip_suffix('"') {
            Some(inner) => inner,
            None => return false,
        },
        None => part,
    };

    let mut chars = bare.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

/// Rejects empty or malformed identifiers. Tables may carry one `schema.`
/// prefix, columns may not.
pub fn validate_identifier(kind: &'static str, name: &str) -> Result<(), BulkUpdateError> {
    let max_parts = if kind == "table" { 2 } else { 1 };
    let parts: Vec<&str> = name.split('.').collect();

    if name.is_empty() || parts.len() > max_parts || !parts.iter().all(|p| is_valid_identifier_part(p))
    {
        return Err(BulkUpdateError::InvalidIdentifier { kind, value: name.to_string() });
    }

    Ok(())
}

/// Collects bound values and hands out their placeholders.
struct ParameterWriter {
    style: PlaceholderStyle,
    params: Vec<SqlValue>,
}

impl ParameterWriter {
    fn new(style: PlaceholderStyle) -> Self {
        Self { style, params: Vec::new() }
    }

    fn bind(&mut self, value: &SqlValue) -> String {
        self.params.push(value.clone());
        self.style.placeholder(self.params.len())
    }

    fn finish(self, sql: String, value_chunk: usize) -> GeneratedStatement {
        GeneratedStatement { sql, params: self.params, value_chunk }
    }
}

/// Builds the conditions for one chunk of criteria, in criteria order.
fn build_criteria_conditions(
    writer: &mut ParameterWriter,
    criteria: &[CriterionChunk<'_>],
) -> Vec<String> {
    criteria
        .iter()
        .map(|criterion| match criterion {
            CriterionChunk::Equals { column, value } if value.is_null() => {
                format!("{} IS NULL", quote_identifier(column))
            }
            CriterionChunk::Equals { column, value } => {
                format!("{} = {}", quote_identifier(column), writer.bind(value))
            }
            CriterionChunk::In { column, values } => {
                let placeholders =
                    values.iter().map(|value| writer.bind(value)).collect::<Vec<_>>().join(", ");
                format!("{} IN ({})", quote_identifier(column), placeholders)
            }
        })
        .collect()
}

/// Builds the complete WHERE clause from conditions.
pub fn build_where_clause(conditions: &[String]) -> String {
    if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    }
}

/// Renders the update statement for one chunk combination.
///
/// A multi-entry chunk becomes
/// `SET target = CASE match WHEN k1 THEN v1 ... ELSE target END`; keys are
/// bound once and their placeholders reused in the `match IN (...)` predicate.
/// A single-entry chunk becomes `SET target = v WHERE match = k`. With
/// [`RowScope::AllRows`] the key predicate of multi-entry chunks is left out.
pub fn build_update_statement(
    target: &UpdateTarget<'_>,
    combination: &ChunkCombination<'_>,
    row_scope: RowScope,
    style: PlaceholderStyle,
) -> GeneratedStatement {
    let mut writer = ParameterWriter::new(style);
    let match_column = quote_identifier(target.match_column);
    let target_column = quote_identifier(target.target_column);
    let mut conditions = Vec::new();

    let set_clause = match combination.values {
        [(key, value)] => {
            let value_placeholder = writer.bind(value);
            conditions.push(format!("{} = {}", match_column, writer.bind(key)));
            format!("{} = {}", target_column, value_placeholder)
        }
        entries => {
            let mut clause = format!("{} = CASE {}", target_column, match_column);
            let mut key_placeholders = Vec::with_capacity(entries.len());

            for (key, value) in entries {
                let key_placeholder = writer.bind(key);
                let value_placeholder = writer.bind(value);
                clause.push_str(&format!(" WHEN {} THEN {}", key_placeholder, value_placeholder));
                key_placeholders.push(key_placeholder);
            }

            clause.push_str(&format!(" ELSE {} END", target_column));

            if row_scope == RowScope::MatchedKeys {
                conditions.push(format!("{} IN ({})", match_column, key_placeholders.join(", ")));
            }

            clause
        }
    };

    conditions.extend(build_criteria_conditions(&mut writer, &combination.criteria));

    let sql = format!(
        "UPDATE {} SET {}{}",
        format_table_name(target.table),
        set_clause,
        build_where_clause(&conditions)
    );

    writer.finish(sql, combination.value_chunk)
}

/// Renders the delete statement for one criteria chunk combination.
pub fn build_delete_statement(
    table: &str,
    combination: &ChunkCombination<'_>,
    style: PlaceholderStyle,
) -> GeneratedStatement {
    let mut writer = ParameterWriter::new(style);
    let conditions = build_criteria_conditions(&mut writer, &combination.criteria);

    let sql =
        format!("DELETE FROM {}{}", format_table_name(table), build_where_clause(&conditions));

    writer.finish(sql, combination.value_chunk)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        bulk::Chunker,
        types::{Criteria, Criterion, ValueMap},
    };

    fn values(pairs: &[(&str, &str)]) -> ValueMap {
        pairs.iter().map(|(k, v)| (SqlValue::from(*k), SqlValue::from(*v))).collect()
    }

    fn render(
        values: &ValueMap,
        criteria: Option<&Criteria>,
        row_scope: RowScope,
        style: PlaceholderStyle,
    ) -> Vec<GeneratedStatement> {
        let chunker = Chunker::new(2, 2).unwrap();
        let plan = chunker.plan(values, criteria);
        let target = UpdateTarget::new("cp_cdn", "name");
        plan.iter().map(|c| build_update_statement(&target, &c, row_scope, style)).collect()
    }

    #[test]
    fn test_case_statement_with_key_predicate() {
        let values = values(&[("c1", "c1updated"), ("c2", "c2updated")]);

        let statements =
            render(&values, None, RowScope::MatchedKeys, PlaceholderStyle::Dollar);

        assert_eq!(statements.len(), 1);
        assert_eq!(
            statements[0].sql,
            "UPDATE cp_cdn SET name = CASE name WHEN $1 THEN $2 WHEN $3 THEN $4 ELSE name END WHERE name IN ($1, $3)"
        );
        assert_eq!(
            statements[0].params,
            vec!["c1".into(), "c1updated".into(), "c2".into(), SqlValue::from("c2updated")]
        );
    }

    #[test]
    fn test_case_statement_all_rows_scope_has_no_key_predicate() {
        let values = values(&[("c1", "c1updated"), ("c2", "c2updated")]);

        let statements = render(&values, None, RowScope::AllRows, PlaceholderStyle::Question);

        assert_eq!(
            statements[0].sql,
            "UPDATE cp_cdn SET name = CASE name WHEN ?1 THEN ?2 WHEN ?3 THEN ?4 ELSE name END"
        );
    }

    #[test]
    fn test_single_entry_chunk_has_no_case() {
        let values = values(&[("c1", "a"), ("c2", "b"), ("c3", "c")]);

        let statements =
            render(&values, None, RowScope::MatchedKeys, PlaceholderStyle::Question);

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[1].sql, "UPDATE cp_cdn SET name = ?1 WHERE name = ?2");
        assert_eq!(statements[1].params, vec![SqlValue::from("c"), SqlValue::from("c3")]);
        assert_eq!(statements[1].value_chunk, 1);
    }

    #[test]
    fn test_criteria_conditions_follow_criteria_order() {
        let values = values(&[("c1", "a"), ("c2", "b")]);
        let mut criteria = Criteria::new();
        criteria.insert("id".to_string(), Criterion::from(7i64));
        criteria.insert("owner_id".to_string(), Criterion::list([1i64, 2, 3]));
        criteria.insert("deleted_at".to_string(), Criterion::Single(SqlValue::Null));

        let statements =
            render(&values, Some(&criteria), RowScope::MatchedKeys, PlaceholderStyle::Dollar);

        assert_eq!(statements.len(), 2);
        assert_eq!(
            statements[0].sql,
            "UPDATE cp_cdn SET name = CASE name WHEN $1 THEN $2 WHEN $3 THEN $4 ELSE name END \
             WHERE name IN ($1, $3) AND id = $5 AND owner_id IN ($6, $7) AND deleted_at IS NULL"
        );
        assert_eq!(
            statements[1].sql,
            "UPDATE cp_cdn SET name = CASE name WHEN $1 THEN $2 WHEN $3 THEN $4 ELSE name END \
             WHERE name IN ($1, $3) AND id = $5 AND owner_id IN ($6) AND deleted_at IS NULL"
        );
        assert_eq!(statements[1].params[5], SqlValue::Int(3));
    }

    #[test]
    fn test_separate_target_column() {
        let values = values(&[("uuid-1", "uuid-9"), ("uuid-2", "uuid-8")]);
        let chunker = Chunker::new(10, 10).unwrap();
        let plan = chunker.plan(&values, None);
        let target = UpdateTarget {
            table: "public.cp2_pool",
            match_column: "product_uuid",
            target_column: "derived_product_uuid",
        };

        let statement = plan
            .iter()
            .map(|c| build_update_statement(&target, &c, RowScope::MatchedKeys, PlaceholderStyle::Dollar))
            .next()
            .unwrap();

        assert_eq!(
            statement.sql,
            "UPDATE public.cp2_pool SET derived_product_uuid = CASE product_uuid WHEN $1 THEN $2 \
             WHEN $3 THEN $4 ELSE derived_product_uuid END WHERE product_uuid IN ($1, $3)"
        );
    }

    #[test]
    fn test_values_are_never_rendered_into_sql() {
        let values = values(&[("content ?", "x'; DROP TABLE cp_cdn; --"), ("%_", "$1")]);

        let statements =
            render(&values, None, RowScope::MatchedKeys, PlaceholderStyle::Question);

        assert!(!statements[0].sql.contains("DROP"));
        assert!(!statements[0].sql.contains('%'));
        assert_eq!(statements[0].params[1], SqlValue::from("x'; DROP TABLE cp_cdn; --"));
    }

    #[test]
    fn test_delete_statement() {
        let mut criteria = Criteria::new();
        criteria.insert("owner_id".to_string(), Criterion::from(4i64));
        criteria.insert("id".to_string(), Criterion::list(["a", "b", "c"]));
        let chunker = Chunker::new(2, 2).unwrap();
        let plan = chunker.plan_criteria(&criteria);

        let statements: Vec<_> =
            plan.iter().map(|c| build_delete_statement("order", &c, PlaceholderStyle::Dollar)).collect();

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].sql, "DELETE FROM \"order\" WHERE owner_id = $1 AND id IN ($2, $3)");
        assert_eq!(statements[1].sql, "DELETE FROM \"order\" WHERE owner_id = $1 AND id IN ($2)");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("user"), "\"user\"");
        assert_eq!(quote_identifier("ORDER"), "\"ORDER\"");
        assert_eq!(quote_identifier("\"user\""), "\"user\"");
        assert_eq!(quote_identifier("name"), "name");
    }

    #[test]
    fn test_format_table_name_quotes_parts_like_unqualified_names() {
        assert_eq!(format_table_name("CP_CDN"), "CP_CDN");
        assert_eq!(format_table_name("public.CP_CDN"), "public.CP_CDN");
        assert_eq!(format_table_name("public.order"), "public.\"order\"");
        assert_eq!(format_table_name("\"Billing\".cp_cdn"), "\"Billing\".cp_cdn");
    }

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("table", "cp_cdn").is_ok());
        assert!(validate_identifier("table", "public.cp_cdn").is_ok());
        assert!(validate_identifier("column", "\"Name\"").is_ok());
        assert!(validate_identifier("column", "_col$1").is_ok());

        for bad in ["", "1name", "name; DROP", "na me", "a.b", "\"open", "x'y"] {
            assert!(
                matches!(
                    validate_identifier("column", bad),
                    Err(BulkUpdateError::InvalidIdentifier { kind: "column", .. })
                ),
                "{:?} should be rejected",
                bad
            );
        }

        assert!(validate_identifier("table", "a.b.c").is_err());
    }
}
