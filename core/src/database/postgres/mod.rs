pub mod client;
mod sql_value;
