//! CLI module - argument parsing and subcommands

mod args;
pub mod commands;

pub use args::{Cli, Commands, RunArgs};
pub use commands::*;
