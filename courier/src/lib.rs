//! The `courier` command-line front end: configuration discovery and
//! argument handling for the report delivery pipeline.

pub mod cli;
pub mod config;

pub use cli::{Cli, Command, RequestError, SendArgs};
pub use config::{CourierConfig, find_config_file};
