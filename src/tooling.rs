//! Tooling & Integration Layer
//!
//! The `notes` command line front end over the storage router.

pub mod cli;

pub use cli::{BackendArg, Cli, CliContext, Commands};
