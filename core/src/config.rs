use std::{fmt, fs, path::Path, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::helpers::{read_env_value, substitute_env_variables, SubstituteEnvError};

pub const DEFAULT_CASE_BLOCK_SIZE: usize = 100;
pub const DEFAULT_IN_BLOCK_SIZE: usize = 1000;
pub const DEFAULT_QUERY_PARAMETER_LIMIT: usize = 32000;

/// Which rows a generated update statement touches, and so what the
/// returned row count means.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum RowScope {
    /// Only rows whose match column holds one of the value map keys (and that
    /// satisfy every criterion) are rewritten and counted.
    #[default]
    MatchedKeys,

    /// Every row satisfying the criteria is rewritten, to itself when no key
    /// matches, and counted once.
    AllRows,
}

impl FromStr for RowScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "matched_keys" => Ok(RowScope::MatchedKeys),
            "all_rows" => Ok(RowScope::AllRows),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for RowScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RowScope::MatchedKeys => write!(f, "matched_keys"),
            RowScope::AllRows => write!(f, "all_rows"),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransactionMode {
    /// Each statement commits on its own; a failure leaves earlier chunks applied.
    #[default]
    PerStatement,

    /// All statements of one call share a transaction and roll back together.
    Single,
}

impl FromStr for TransactionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "per_statement" => Ok(TransactionMode::PerStatement),
            "single" => Ok(TransactionMode::Single),
            other => Err(other.to_string()),
        }
    }
}

/// Block size and execution settings for the bulk engine. Fixed once an
/// engine is built from it.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum number of `WHEN` branches in one generated `CASE` expression.
    pub case_block_size: usize,

    /// Maximum number of values in one criteria `IN (...)` list.
    pub in_block_size: usize,

    /// Maximum number of bound parameters any single statement may carry.
    ///
    /// Postgres rejects more than 65535 parameters per statement and SQLite
    /// defaults to 32766, so the default sits under both.
    pub query_parameter_limit: usize,

    pub row_scope: RowScope,

    pub transaction_mode: TransactionMode,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            case_block_size: DEFAULT_CASE_BLOCK_SIZE,
            in_block_size: DEFAULT_IN_BLOCK_SIZE,
            query_parameter_limit: DEFAULT_QUERY_PARAMETER_LIMIT,
            row_scope: RowScope::default(),
            transaction_mode: TransactionMode::default(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum BatchConfigError {
    #[error("case_block_size must be greater than zero")]
    InvalidCaseBlockSize,

    #[error("in_block_size must be greater than zero")]
    InvalidInBlockSize,

    #[error("query_parameter_limit {limit} is too small, a full case block plus a full in block needs {required} parameters")]
    ParameterLimitTooSmall { limit: usize, required: usize },

    #[error("Environment variable {name} has an invalid value: {value}")]
    InvalidEnvValue { name: &'static str, value: String },

    #[error("Could not read config file: {0}")]
    CouldNotReadConfig(#[from] std::io::Error),

    #[error("Could not substitute environment variables in config: {0}")]
    CouldNotSubstituteEnv(#[from] SubstituteEnvError),

    #[error("Could not parse config: {0}")]
    CouldNotParseConfig(#[from] serde_yaml::Error),
}

impl BatchConfig {
    pub const CASE_BLOCK_SIZE_ENV: &'static str = "CASEBATCH_CASE_BLOCK_SIZE";
    pub const IN_BLOCK_SIZE_ENV: &'static str = "CASEBATCH_IN_BLOCK_SIZE";
    pub const QUERY_PARAMETER_LIMIT_ENV: &'static str = "CASEBATCH_QUERY_PARAMETER_LIMIT";
    pub const ROW_SCOPE_ENV: &'static str = "CASEBATCH_ROW_SCOPE";
    pub const TRANSACTION_MODE_ENV: &'static str = "CASEBATCH_TRANSACTION_MODE";

    pub fn with_block_sizes(case_block_size: usize, in_block_size: usize) -> Self {
        Self { case_block_size, in_block_size, ..Self::default() }
    }

    pub fn with_row_scope(mut self, row_scope: RowScope) -> Self {
        self.row_scope = row_scope;
        self
    }

    pub fn with_transaction_mode(mut self, transaction_mode: TransactionMode) -> Self {
        self.transaction_mode = transaction_mode;
        self
    }

    pub fn with_query_parameter_limit(mut self, query_parameter_limit: usize) -> Self {
        self.query_parameter_limit = query_parameter_limit;
        self
    }

    /// Checks the block sizes and that the parameter limit can hold at least
    /// one full case block next to one full in block.
    pub fn validate(&self) -> Result<(), BatchConfigError> {
        if self.case_block_size == 0 {
            return Err(BatchConfigError::InvalidCaseBlockSize);
        }

        if self.in_block_size == 0 {
            return Err(BatchConfigError::InvalidInBlockSize);
        }

        let required = self
            .case_block_size
            .saturating_mul(2)
            .saturating_add(self.in_block_size);

        if required > self.query_parameter_limit {
            return Err(BatchConfigError::ParameterLimitTooSmall {
                limit: self.query_parameter_limit,
                required,
            });
        }

        Ok(())
    }

    /// Builds a config from `CASEBATCH_*` environment variables, falling back
    /// to the defaults for unset ones. Set but unparsable values are errors.
    pub fn from_env() -> Result<Self, BatchConfigError> {
        let defaults = Self::default();

        let config = Self {
            case_block_size: parse_env(Self::CASE_BLOCK_SIZE_ENV)?
                .unwrap_or(defaults.case_block_size),
            in_block_size: parse_env(Self::IN_BLOCK_SIZE_ENV)?.unwrap_or(defaults.in_block_size),
            query_parameter_limit: parse_env(Self::QUERY_PARAMETER_LIMIT_ENV)?
                .unwrap_or(defaults.query_parameter_limit),
            row_scope: parse_env(Self::ROW_SCOPE_ENV)?.unwrap_or(defaults.row_scope),
            transaction_mode: parse_env(Self::TRANSACTION_MODE_ENV)?
                .unwrap_or(defaults.transaction_mode),
        };

        config.validate()?;

        Ok(config)
    }
}

fn parse_env<T: FromStr>(name: &'static str) -> Result<Option<T>, BatchConfigError> {
    match read_env_value(name) {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|_| BatchConfigError::InvalidEnvValue { name, value }),
        None => Ok(None),
    }
}

/// Reads a YAML config file, substituting `${VAR}` references first.
pub fn read_config(file_path: &Path) -> Result<BatchConfig, BatchConfigError> {
    let contents = fs::read_to_string(file_path)?;
    let contents = substitute_env_variables(&contents)?;
    let config: BatchConfig = serde_yaml::from_str(&contents)?;

    config.validate()?;

    Ok(config)
}
