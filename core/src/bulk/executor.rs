use tracing::{debug, error, trace};

use crate::{
    bulk::{
        planner::{BulkPlanner, StatementPlan},
        BatchResult, BulkUpdateError, DeleteSpec, GeneratedStatement, UpdateSpec, UpdateTarget,
    },
    config::{BatchConfig, BatchConfigError, TransactionMode},
    database::Store,
    types::{Criteria, ValueMap},
};

/// Runs bulk updates and deletes against a [`Store`].
pub struct BulkUpdater<S> {
    store: S,
    planner: BulkPlanner,
}

impl<S: Store> BulkUpdater<S> {
    pub fn new(store: S, config: BatchConfig) -> Result<Self, BatchConfigError> {
        Ok(Self { store, planner: BulkPlanner::new(config)? })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &BatchConfig {
        self.planner.config()
    }

    /// Rewrites `match_column` from each key of `values` to its mapped value
    /// on rows satisfying `criteria`, returning the number of rows affected.
    pub async fn bulk_update(
        &self,
        table: &str,
        match_column: &str,
        values: &ValueMap,
        criteria: Option<&Criteria>,
    ) -> Result<u64, BulkUpdateError> {
        let plan = self.planner.prepare_update(
            UpdateTarget::new(table, match_column),
            values,
            criteria,
            self.store.placeholder_style(),
        )?;

        Ok(self.execute_plan(plan).await?.rows_affected)
    }

    pub async fn execute_update(&self, spec: &UpdateSpec) -> Result<BatchResult, BulkUpdateError> {
        let plan = self.planner.prepare_update(
            spec.target(),
            &spec.values,
            spec.criteria.as_ref(),
            self.store.placeholder_style(),
        )?;

        self.execute_plan(plan).await
    }

    pub fn plan_update(&self, spec: &UpdateSpec) -> Result<Vec<GeneratedStatement>, BulkUpdateError> {
        self.planner.plan_update(spec, self.store.placeholder_style())
    }

    /// Deletes rows satisfying every criterion, returning the number of rows
    /// removed. Empty criteria are refused.
    pub async fn bulk_delete(&self, table: &str, criteria: &Criteria) -> Result<u64, BulkUpdateError> {
        let plan = self.planner.prepare_delete(table, criteria, self.store.placeholder_style())?;

        Ok(self.execute_plan(plan).await?.rows_affected)
    }

    pub async fn execute_delete(&self, spec: &DeleteSpec) -> Result<BatchResult, BulkUpdateError> {
        let plan =
            self.planner.prepare_delete(&spec.table, &spec.criteria, self.store.placeholder_style())?;

        self.execute_plan(plan).await
    }

    pub fn plan_delete(&self, spec: &DeleteSpec) -> Result<Vec<GeneratedStatement>, BulkUpdateError> {
        self.planner.plan_delete(spec, self.store.placeholder_style())
    }

    async fn execute_plan(&self, plan: StatementPlan<'_>) -> Result<BatchResult, BulkUpdateError> {
        if plan.is_empty() {
            debug!("Bulk operation on {} has nothing to apply", plan.table());
            return Ok(BatchResult::default());
        }

        let result = match self.config().transaction_mode {
            TransactionMode::PerStatement => self.execute_each(&plan).await?,
            TransactionMode::Single => self.execute_transaction(&plan).await?,
        };

        debug!(
            "Bulk operation on {} ran {} statements affecting {} rows",
            plan.table(),
            result.statements_executed,
            result.rows_affected
        );

        Ok(result)
    }

    async fn execute_each(&self, plan: &StatementPlan<'_>) -> Result<BatchResult, BulkUpdateError> {
        let total_statements = plan.statement_count();
        let mut result = BatchResult::default();
        let mut rows_applied = 0;

        for statement in plan.statements() {
            trace!("Bulk statement: {}", statement.sql);

            let count = match self.store.execute_statement(&statement).await {
                Ok(count) => count,
                Err(e) => {
                    error!(
                        "Bulk statement {} of {} on {} failed: {}",
                        result.statements_executed + 1,
                        total_statements,
                        plan.table(),
                        e
                    );
                    error!("Failed query:\n{}", statement.sql);
                    return Err(BulkUpdateError::PartiallyApplied {
                        completed_statements: result.statements_executed,
                        total_statements,
                        rows_applied,
                        source: e,
                    });
                }
            };

            rows_applied += count;
            if plan.counts_toward_total(&statement) {
                result.rows_affected += count;
            }
            result.statements_executed += 1;
        }

        Ok(result)
    }

    async fn execute_transaction(
        &self,
        plan: &StatementPlan<'_>,
    ) -> Result<BatchResult, BulkUpdateError> {
        let statements: Vec<GeneratedStatement> = plan.statements().collect();
        let total_statements = statements.len();

        let counts = self.store.execute_in_transaction(&statements).await.map_err(|e| {
            error!("Bulk transaction on {} rolled back: {}", plan.table(), e);
            BulkUpdateError::RolledBack { total_statements, source: e }
        })?;

        let rows_affected = statements
            .iter()
            .zip(counts)
            .filter(|(statement, _)| plan.counts_toward_total(statement))
            .map(|(_, count)| count)
            .sum();

        Ok(BatchResult { rows_affected, statements_executed: total_statements })
    }
}
