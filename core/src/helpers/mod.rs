mod array;
mod env;

pub use array::{block_count, partition};
pub use env::{read_env_value, substitute_env_variables, SubstituteEnvError};
