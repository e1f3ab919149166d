use std::path::PathBuf;

use clap::{Args, Parser};

#[allow(clippy::upper_case_acronyms)]
#[derive(Parser, Debug)]
#[clap(name = "casebatch", about, version)]
pub struct CLI {
    #[clap(subcommand)]
    pub command: Commands,

    /// Increase log output, `-v` for debug and `-vv` for every generated statement.
    #[clap(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Parser, Debug)]
#[clap(about = "Batched CASE/IN bulk updates from a YAML manifest", long_about = None)]
pub enum Commands {
    /// Applies every update and delete in a manifest.
    ///
    /// Runs against Postgres using `DATABASE_URL` unless `--sqlite` is given.
    ///
    /// Example:
    /// `casebatch apply --manifest casebatch.yaml` or `casebatch apply --sqlite ./local.db`
    #[clap(name = "apply")]
    Apply(ApplyDetails),

    /// Prints the statements a manifest would run without touching a database.
    ///
    /// Example:
    /// `casebatch plan --manifest casebatch.yaml`
    #[clap(name = "plan")]
    Plan(PlanDetails),
}

#[derive(Args, Debug, Clone)]
pub struct ApplyDetails {
    /// optional - The manifest to apply, default is casebatch.yaml where the command is run.
    #[clap(long, short)]
    pub manifest: Option<PathBuf>,

    /// optional - Apply to this SQLite database file instead of Postgres.
    #[clap(long)]
    pub sqlite: Option<PathBuf>,

    /// Print the planned statements instead of running them.
    #[clap(long)]
    pub dry_run: bool,

    /// Skip the confirmation prompt before deletes.
    #[clap(long, short)]
    pub yes: bool,
}

#[derive(Args, Debug, Clone)]
pub struct PlanDetails {
    /// optional - The manifest to plan, default is casebatch.yaml where the command is run.
    #[clap(long, short)]
    pub manifest: Option<PathBuf>,

    /// Render SQLite `?n` placeholders instead of Postgres `$n`.
    #[clap(long)]
    pub sqlite: bool,
}
