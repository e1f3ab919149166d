use std::{
    fs::File,
    io::Read,
    path::{Path, PathBuf},
};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    bulk::{DeleteSpec, UpdateSpec},
    config::{BatchConfig, BatchConfigError},
    helpers::{substitute_env_variables, SubstituteEnvError},
};

pub const YAML_MANIFEST_NAME: &str = "casebatch.yaml";

/// A file-described set of bulk updates and deletes, applied in order.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq)]
pub struct BulkManifest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment_path: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<BatchConfig>,

    #[serde(default)]
    pub updates: Vec<UpdateSpec>,

    #[serde(default)]
    pub deletes: Vec<DeleteSpec>,
}

impl BulkManifest {
    /// The manifest's config block, or the defaults.
    pub fn batch_config(&self) -> BatchConfig {
        self.config.unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.updates.is_empty() && self.deletes.is_empty()
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ValidateManifestError {
    #[error("Invalid config: {0}")]
    InvalidConfig(#[from] BatchConfigError),

    #[error("Delete on {0} has no criteria, refusing to delete every row")]
    DeleteWithoutCriteria(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ReadManifestError {
    #[error("Could not open file: {0}")]
    CouldNotOpenFile(#[from] std::io::Error),

    #[error("Could not parse manifest: {0}")]
    CouldNotParseManifest(#[from] serde_yaml::Error),

    #[error("Could not substitute env variables: {0}")]
    CouldNotSubstituteEnvVariables(#[from] SubstituteEnvError),

    #[error("Could not read environment_path: {0}")]
    CouldNotReadEnvironmentPath(#[from] regex::Error),

    #[error("Could not validate manifest: {0}")]
    CouldNotValidateManifest(#[from] ValidateManifestError),
}

pub fn validate_manifest(manifest: &BulkManifest) -> Result<(), ValidateManifestError> {
    if let Some(config) = &manifest.config {
        config.validate()?;
    }

    if let Some(delete) = manifest.deletes.iter().find(|delete| delete.criteria.is_empty()) {
        return Err(ValidateManifestError::DeleteWithoutCriteria(delete.table.clone()));
    }

    Ok(())
}

fn extract_environment_path(
    contents: &str,
    file_path: &Path,
) -> Result<Option<PathBuf>, regex::Error> {
    let re = Regex::new(r"(?m)^environment_path:\s*(.+)$")?;

    Ok(re.captures(contents).and_then(|cap| cap.get(1)).map(|m| {
        let path_str = m.as_str().trim().replace('\"', "");
        let base_dir = file_path.parent().unwrap_or(Path::new(""));
        let full_path = base_dir.join(path_str);
        full_path.canonicalize().unwrap_or(full_path)
    }))
}

/// Reads a manifest, loading its `environment_path` file (relative to the
/// manifest) before `${VAR}` references are substituted.
pub fn read_manifest(file_path: &Path) -> Result<BulkManifest, ReadManifestError> {
    let mut file = File::open(file_path)?;
    let mut contents = String::new();

    file.read_to_string(&mut contents)?;

    if let Some(path) = extract_environment_path(&contents, file_path)? {
        match dotenv::from_path(&path) {
            Ok(()) => debug!("Loaded environment from {}", path.display()),
            Err(e) => warn!("Could not load environment from {}: {}", path.display(), e),
        }
    }

    let contents = substitute_env_variables(&contents)?;
    let manifest: BulkManifest = serde_yaml::from_str(&contents)?;

    validate_manifest(&manifest)?;

    Ok(manifest)
}
