use std::env;

use dotenv::dotenv;
use regex::Regex;
use tracing::error;

#[derive(thiserror::Error, Debug)]
pub enum SubstituteEnvError {
    #[error("Environment variable {0} not found")]
    EnvironmentVariableNotFound(String),

    #[error("Could not build environment variable pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

/// Replaces every `${NAME}` reference in `contents` with the value of the
/// environment variable `NAME`. `.env` is loaded first.
pub fn substitute_env_variables(contents: &str) -> Result<String, SubstituteEnvError> {
    dotenv().ok();

    let re = Regex::new(r"\$\{([^}]+)\}")?;

    for caps in re.captures_iter(contents) {
        let var_name = &caps[1];
        if env::var(var_name).is_err() {
            error!("Environment variable {} not found", var_name);
            return Err(SubstituteEnvError::EnvironmentVariableNotFound(var_name.to_string()));
        }
    }

    let result = re.replace_all(contents, |caps: &regex::Captures| {
        env::var(&caps[1]).unwrap_or_default()
    });

    Ok(result.into_owned())
}

/// Reads an environment variable after loading `.env`, returning `None` when
/// it is unset.
pub fn read_env_value(var_name: &str) -> Option<String> {
    dotenv().ok();
    env::var(var_name).ok()
}
