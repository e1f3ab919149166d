use crate::{
    bulk::{
        chunker::{ChunkPlan, Chunker},
        query_builder::{
            build_delete_statement, build_update_statement, validate_identifier, PlaceholderStyle,
        },
        BulkUpdateError, DeleteSpec, GeneratedStatement, UpdateSpec, UpdateTarget,
    },
    config::{BatchConfig, BatchConfigError, RowScope},
    types::{Criteria, ValueMap},
};

#[derive(Debug, Clone, Copy)]
enum StatementKind<'a> {
    Update(UpdateTarget<'a>),
    Delete(&'a str),
}

/// Validated, chunked work for one bulk call. Statements are rendered lazily.
#[derive(Debug, Clone)]
pub struct StatementPlan<'a> {
    kind: StatementKind<'a>,
    chunks: ChunkPlan<'a>,
    row_scope: RowScope,
    style: PlaceholderStyle,
}

impl<'a> StatementPlan<'a> {
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn statement_count(&self) -> usize {
        self.chunks.statement_count()
    }

    pub fn row_scope(&self) -> RowScope {
        self.row_scope
    }

    pub fn table(&self) -> &'a str {
        match self.kind {
            StatementKind::Update(target) => target.table,
            StatementKind::Delete(table) => table,
        }
    }

    /// Whether rows reported by `statement` add to the call's total.
    ///
    /// Under [`RowScope::AllRows`] every value chunk rewrites the same rows, so
    /// only the first value chunk is counted.
    pub fn counts_toward_total(&self, statement: &GeneratedStatement) -> bool {
        self.row_scope == RowScope::MatchedKeys || statement.value_chunk == 0
    }

    pub fn statements(&self) -> impl Iterator<Item = GeneratedStatement> + Send + '_ {
        self.chunks.iter().map(move |combination| match self.kind {
            StatementKind::Update(target) => {
                build_update_statement(&target, &combination, self.row_scope, self.style)
            }
            StatementKind::Delete(table) => build_delete_statement(table, &combination, self.style),
        })
    }
}

/// Validates bulk requests and turns them into statement plans.
#[derive(Debug, Clone, Copy)]
pub struct BulkPlanner {
    config: BatchConfig,
    chunker: Chunker,
}

impl BulkPlanner {
    pub fn new(config: BatchConfig) -> Result<Self, BatchConfigError> {
        config.validate()?;
        let chunker = Chunker::new(config.case_block_size, config.in_block_size)?;

        Ok(Self { config, chunker })
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn prepare_update<'a>(
        &self,
        target: UpdateTarget<'a>,
        values: &'a ValueMap,
        criteria: Option<&'a Criteria>,
        style: PlaceholderStyle,
    ) -> Result<StatementPlan<'a>, BulkUpdateError> {
        validate_identifier("table", target.table)?;
        validate_identifier("column", target.match_column)?;
        validate_identifier("column", target.target_column)?;
        validate_criteria_columns(criteria)?;

        let chunks = self.chunker.plan(values, criteria);
        self.check_parameter_limit(&chunks)?;

        if target.target_column == target.match_column {
            if let Some((value, chunk, later_chunk)) = chunks.chained_value() {
                return Err(BulkUpdateError::ChainedValue {
                    value: value.clone(),
                    chunk,
                    later_chunk,
                });
            }
        }

        Ok(StatementPlan {
            kind: StatementKind::Update(target),
            chunks,
            row_scope: self.config.row_scope,
            style,
        })
    }

    pub fn prepare_delete<'a>(
        &self,
        table: &'a str,
        criteria: &'a Criteria,
        style: PlaceholderStyle,
    ) -> Result<StatementPlan<'a>, BulkUpdateError> {
        validate_identifier("table", table)?;
        validate_criteria_columns(Some(criteria))?;

        if criteria.is_empty() {
            return Err(BulkUpdateError::UnrestrictedDelete(table.to_string()));
        }

        let chunks = self.chunker.plan_criteria(criteria);
        self.check_parameter_limit(&chunks)?;

        Ok(StatementPlan {
            kind: StatementKind::Delete(table),
            chunks,
            row_scope: RowScope::MatchedKeys,
            style,
        })
    }

    /// Renders every statement an update would run, without running it.
    pub fn plan_update(
        &self,
        spec: &UpdateSpec,
        style: PlaceholderStyle,
    ) -> Result<Vec<GeneratedStatement>, BulkUpdateError> {
        let plan = self.prepare_update(spec.target(), &spec.values, spec.criteria.as_ref(), style)?;
        Ok(plan.statements().collect())
    }

    /// Renders every statement a delete would run, without running it.
    pub fn plan_delete(
        &self,
        spec: &DeleteSpec,
        style: PlaceholderStyle,
    ) -> Result<Vec<GeneratedStatement>, BulkUpdateError> {
        let plan = self.prepare_delete(&spec.table, &spec.criteria, style)?;
        Ok(plan.statements().collect())
    }

    fn check_parameter_limit(&self, chunks: &ChunkPlan<'_>) -> Result<(), BulkUpdateError> {
        let required = chunks.max_parameter_count();

        if required > self.config.query_parameter_limit {
            return Err(BulkUpdateError::ParameterLimitExceeded {
                required,
                limit: self.config.query_parameter_limit,
            });
        }

        Ok(())
    }
}

fn validate_criteria_columns(criteria: Option<&Criteria>) -> Result<(), BulkUpdateError> {
    for column in criteria.into_iter().flat_map(|criteria| criteria.keys()) {
        validate_identifier("column", column)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Criterion, SqlValue};

    fn planner(case_block_size: usize, in_block_size: usize) -> BulkPlanner {
        BulkPlanner::new(BatchConfig::with_block_sizes(case_block_size, in_block_size)).unwrap()
    }

    #[test]
    fn test_new_validates_config() {
        assert!(matches!(
            BulkPlanner::new(BatchConfig::with_block_sizes(0, 1)),
            Err(BatchConfigError::InvalidCaseBlockSize)
        ));
    }

    #[test]
    fn test_plan_update_statement_count_follows_cross_product() {
        let mut spec = UpdateSpec::new("cp_content", "name");
        for i in 1..=25 {
            spec = spec.value(format!("content-{}", i), format!("update-{}", i));
        }
        let spec = spec
            .criterion("name", Criterion::list((1..=7).map(|i| format!("content-{}", i))))
            .criterion("owner_id", 3i64);

        let statements = planner(10, 3).plan_update(&spec, PlaceholderStyle::Dollar).unwrap();

        // ceil(25/10) * ceil(7/3)
        assert_eq!(statements.len(), 9);
        assert_eq!(statements.iter().filter(|s| s.value_chunk == 2).count(), 3);
    }

    #[test]
    fn test_plan_update_empty_values() {
        let spec = UpdateSpec::new("cp_content", "name");

        let plan = planner(10, 10);
        let prepared = plan
            .prepare_update(spec.target(), &spec.values, None, PlaceholderStyle::Dollar)
            .unwrap();

        assert!(prepared.is_empty());
        assert_eq!(prepared.statements().count(), 0);
    }

    #[test]
    fn test_plan_update_rejects_bad_identifiers() {
        let spec = UpdateSpec::new("cp_content; DROP TABLE x", "name").value("a", "b");
        assert!(matches!(
            planner(10, 10).plan_update(&spec, PlaceholderStyle::Dollar),
            Err(BulkUpdateError::InvalidIdentifier { kind: "table", .. })
        ));

        let spec = UpdateSpec::new("cp_content", "").value("a", "b");
        assert!(matches!(
            planner(10, 10).plan_update(&spec, PlaceholderStyle::Dollar),
            Err(BulkUpdateError::InvalidIdentifier { kind: "column", .. })
        ));

        let spec = UpdateSpec::new("cp_content", "name").value("a", "b").criterion("1=1 OR id", 1i64);
        assert!(matches!(
            planner(10, 10).plan_update(&spec, PlaceholderStyle::Dollar),
            Err(BulkUpdateError::InvalidIdentifier { kind: "column", .. })
        ));
    }

    #[test]
    fn test_plan_update_rejects_identifiers_even_when_values_are_empty() {
        let spec = UpdateSpec::new("", "name");

        assert!(planner(10, 10).plan_update(&spec, PlaceholderStyle::Dollar).is_err());
    }

    #[test]
    fn test_parameter_limit_exceeded() {
        let config = BatchConfig::with_block_sizes(2, 3).with_query_parameter_limit(8);
        let planner = BulkPlanner::new(config).unwrap();
        let spec = UpdateSpec::new("cp_content", "name")
            .value("a", "1")
            .value("b", "2")
            .criterion("id", Criterion::list([1i64, 2, 3]))
            .criterion("owner_id", Criterion::list([4i64, 5, 6]));

        assert!(matches!(
            planner.plan_update(&spec, PlaceholderStyle::Question),
            Err(BulkUpdateError::ParameterLimitExceeded { required: 10, limit: 8 })
        ));
    }

    #[test]
    fn test_prepare_update_rejects_values_chained_across_chunks() {
        let spec = UpdateSpec::new("cp_content", "name").value("a", "b").value("b", "c");

        assert!(matches!(
            planner(1, 10).plan_update(&spec, PlaceholderStyle::Dollar),
            Err(BulkUpdateError::ChainedValue { chunk: 0, later_chunk: 1, .. })
        ));
        assert_eq!(planner(2, 10).plan_update(&spec, PlaceholderStyle::Dollar).unwrap().len(), 1);

        let spec = spec.target_column("title");
        assert_eq!(planner(1, 10).plan_update(&spec, PlaceholderStyle::Dollar).unwrap().len(), 2);
    }

    #[test]
    fn test_plan_delete() {
        let spec = DeleteSpec::new("cp_pool").criterion("id", Criterion::list(["p1", "p2", "p3"]));

        let statements = planner(10, 2).plan_delete(&spec, PlaceholderStyle::Dollar).unwrap();

        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].sql, "DELETE FROM cp_pool WHERE id IN ($1, $2)");
        assert_eq!(statements[1].params, vec![SqlValue::from("p3")]);
    }

    #[test]
    fn test_plan_delete_requires_criteria() {
        let spec = DeleteSpec::new("cp_pool");

        assert!(matches!(
            planner(10, 10).plan_delete(&spec, PlaceholderStyle::Dollar),
            Err(BulkUpdateError::UnrestrictedDelete(table)) if table == "cp_pool"
        ));
    }

    #[test]
    fn test_counts_toward_total() {
        let spec = UpdateSpec::new("cp_content", "name").value("a", "1").value("b", "2").value("c", "3");
        let config = BatchConfig::with_block_sizes(2, 10).with_row_scope(RowScope::AllRows);
        let planner = BulkPlanner::new(config).unwrap();

        let plan = planner
            .prepare_update(spec.target(), &spec.values, None, PlaceholderStyle::Dollar)
            .unwrap();
        let counted: Vec<bool> =
            plan.statements().map(|statement| plan.counts_toward_total(&statement)).collect();

        assert_eq!(counted, vec![true, false]);
    }
}
