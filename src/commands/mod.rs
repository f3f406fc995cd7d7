//! CLI command implementations for services-metrics-exporter.
//!
//! - `check`: configuration and runtime validation
//! - `config`: configuration file generation
//! - `test`: scrape cycles from the command line
//! - `generate-fixture`: synthetic fixture generation

pub mod check;
pub mod config;
pub mod generate;

pub use check::command_check;
pub use config::command_config;
pub use generate::command_generate_fixture;
pub use test::command_test;
