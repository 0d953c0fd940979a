//! Typed failures surfaced by the application.
//!
//! Most code returns `anyhow::Result`; these variants exist for conditions
//! callers (and tests) need to recognize with `downcast_ref`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OracleError {
    #[error("Not an oracle project (or any parent up to /): {0}\nRun `oracle init` first.")]
    NotInitialized(PathBuf),

    #[error("Project already initialized at {0}")]
    AlreadyInitialized(PathBuf),

    #[error("Paths do not exist: {}", .0.join(", "))]
    MissingPaths(Vec<String>),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("Refusing to run a mutating or multi-statement query: {0}")]
    ReadOnlyViolation(String),

    #[error("{0} provider is not configured (set it in the config file)")]
    ProviderNotConfigured(&'static str),

    #[error("Agent exceeded {0} steps in one turn")]
    StepLimit(usize),
}
