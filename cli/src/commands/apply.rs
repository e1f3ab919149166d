use casebatch::{
    manifest::{read_manifest, BulkManifest},
    BatchConfig, BatchResult, BulkUpdateError, BulkUpdater, PlaceholderStyle, PostgresClient,
    SqliteClient, Store,
};
use tracing::info;

use crate::{
    cli_interface::ApplyDetails,
    commands::plan::{plan_manifest, print_plan, resolve_config, resolve_manifest_path},
    console::{
        print_error_message, print_success_message, print_warn_message, prompt_for_input_list,
    },
};

/// Outcome of one manifest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedEntry {
    pub operation: &'static str,
    pub table: String,
    pub result: BatchResult,
}

/// Runs every update, then every delete, stopping at the first failure.
pub async fn apply_manifest<S: Store>(
    store: S,
    config: BatchConfig,
    manifest: &BulkManifest,
) -> Result<Vec<AppliedEntry>, Box<dyn std::error::Error>> {
    let updater = BulkUpdater::new(store, config)?;
    let mut applied = Vec::with_capacity(manifest.updates.len() + manifest.deletes.len());

    for update in &manifest.updates {
        let result = updater.execute_update(update).await.map_err(|e| report_failure(&update.table, e))?;
        info!("Updated {} rows in {}", result.rows_affected, update.table);
        applied.push(AppliedEntry { operation: "update", table: update.table.clone(), result });
    }

    for delete in &manifest.deletes {
        let result = updater.execute_delete(delete).await.map_err(|e| report_failure(&delete.table, e))?;
        info!("Deleted {} rows from {}", result.rows_affected, delete.table);
        applied.push(AppliedEntry { operation: "delete", table: delete.table.clone(), result });
    }

    Ok(applied)
}

fn report_failure(table: &str, e: BulkUpdateError) -> BulkUpdateError {
    match &e {
        BulkUpdateError::PartiallyApplied { completed_statements, total_statements, rows_applied, .. } => {
            print_warn_message(&format!(
                "{} of {} statements on {} were already applied ({} rows) and were not rolled back",
                completed_statements, total_statements, table, rows_applied
            ));
        }
        BulkUpdateError::RolledBack { .. } => {
            print_warn_message(&format!("All changes to {} were rolled back", table));
        }
        _ => {}
    }
    print_error_message(&format!("Bulk operation on {} failed: trace: {}", table, e));
    e
}

fn print_applied(applied: &[AppliedEntry]) {
    for entry in applied {
        let verb = if entry.operation == "delete" { "Deleted" } else { "Updated" };
        print_success_message(&format!(
            "{} {} rows in {} ({} statements)",
            verb, entry.result.rows_affected, entry.table, entry.result.statements_executed
        ));
    }
}

pub async fn handle_apply_command(details: ApplyDetails) -> Result<(), Box<dyn std::error::Error>> {
    let manifest_path = resolve_manifest_path(details.manifest);
    let manifest = read_manifest(&manifest_path).map_err(|e| {
        print_error_message(&format!(
            "Could not read the manifest at {}: trace: {}",
            manifest_path.display(),
            e
        ));
        e
    })?;
    let config = resolve_config(&manifest)?;

    if manifest.is_empty() {
        print_warn_message("The manifest has no updates or deletes.");
        return Ok(());
    }

    if details.dry_run {
        let style =
            if details.sqlite.is_some() { PlaceholderStyle::Question } else { PlaceholderStyle::Dollar };
        return print_plan(&plan_manifest(&manifest, config, style)?);
    }

    if !manifest.deletes.is_empty() && !details.yes {
        print_warn_message(&format!(
            "This manifest deletes rows from {} table(s). This operation can not be reverted.",
            manifest.deletes.len()
        ));
        let answer = prompt_for_input_list(
            "Are you sure you wish to continue?",
            &["yes".to_string(), "no".to_string()],
        )?;
        if answer != "yes" {
            print_warn_message("Aborted, nothing was applied.");
            return Ok(());
        }
    }

    let applied = match details.sqlite {
        Some(path) => {
            let client = SqliteClient::open(&path).await.map_err(|e| {
                print_error_message(&format!(
                    "Could not open SQLite database at {}: trace: {}",
                    path.display(),
                    e
                ));
                e
            })?;
            apply_manifest(client, config, &manifest).await?
        }
        None => {
            let client = PostgresClient::new().await.map_err(|e| {
                print_error_message(&format!("Could not connect to Postgres, make sure your connection string is mapping in the .env correctly: trace: {}", e));
                e
            })?;
            apply_manifest(client, config, &manifest).await?
        }
    };

    print_applied(&applied);

    Ok(())
}
