use std::path::{Path, PathBuf};

use casebatch::{
    manifest::{read_manifest, BulkManifest, YAML_MANIFEST_NAME},
    BatchConfig, BulkPlanner, GeneratedStatement, PlaceholderStyle, SqlValue,
};
use serde::Serialize;

use crate::{
    cli_interface::PlanDetails,
    console::{print_error_message, print_success_message, print_warn_message},
};

/// One rendered statement as printed by `plan` and `apply --dry-run`.
#[derive(Debug, Serialize, PartialEq)]
pub struct PlannedStatement {
    pub operation: &'static str,
    pub table: String,
    pub sql: String,
    pub params: Vec<SqlValue>,
}

impl PlannedStatement {
    fn new(operation: &'static str, table: &str, statement: GeneratedStatement) -> Self {
        Self { operation, table: table.to_string(), sql: statement.sql, params: statement.params }
    }
}

pub fn resolve_manifest_path(manifest: Option<PathBuf>) -> PathBuf {
    manifest.unwrap_or_else(|| PathBuf::from(YAML_MANIFEST_NAME))
}

/// The manifest's config block wins, otherwise `CASEBATCH_*` env vars and defaults.
pub fn resolve_config(manifest: &BulkManifest) -> Result<BatchConfig, casebatch::BatchConfigError> {
    match manifest.config {
        Some(config) => Ok(config),
        None => BatchConfig::from_env(),
    }
}

pub fn plan_manifest(
    manifest: &BulkManifest,
    config: BatchConfig,
    style: PlaceholderStyle,
) -> Result<Vec<PlannedStatement>, Box<dyn std::error::Error>> {
    let planner = BulkPlanner::new(config)?;
    let mut planned = Vec::new();

    for update in &manifest.updates {
        let statements = planner.plan_update(update, style)?;
        planned.extend(
            statements.into_iter().map(|statement| PlannedStatement::new("update", &update.table, statement)),
        );
    }

    for delete in &manifest.deletes {
        let statements = planner.plan_delete(delete, style)?;
        planned.extend(
            statements.into_iter().map(|statement| PlannedStatement::new("delete", &delete.table, statement)),
        );
    }

    Ok(planned)
}

pub fn print_plan(planned: &[PlannedStatement]) -> Result<(), Box<dyn std::error::Error>> {
    if planned.is_empty() {
        print_warn_message("Nothing to run, every update and delete in the manifest is empty.");
        return Ok(());
    }

    println!("{}", serde_yaml::to_string(planned)?);
    print_success_message(&format!("{} statements planned", planned.len()));

    Ok(())
}

pub fn handle_plan_command(details: PlanDetails) -> Result<(), Box<dyn std::error::Error>> {
    let manifest_path = resolve_manifest_path(details.manifest);
    let style = if details.sqlite { PlaceholderStyle::Question } else { PlaceholderStyle::Dollar };

    let planned = load_and_plan(&manifest_path, style)?;

    print_plan(&planned)
}

pub fn load_and_plan(
    manifest_path: &Path,
    style: PlaceholderStyle,
) -> Result<Vec<PlannedStatement>, Box<dyn std::error::Error>> {
    let manifest = read_manifest(manifest_path).map_err(|e| {
        print_error_message(&format!(
            "Could not read the manifest at {}: trace: {}",
            manifest_path.display(),
            e
        ));
        e
    })?;
    let config = resolve_config(&manifest)?;

    plan_manifest(&manifest, config, style).map_err(|e| {
        print_error_message(&format!("Could not plan the manifest: trace: {}", e));
        e
    })
}
