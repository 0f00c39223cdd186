//! Error taxonomy for the weaving pipeline
//!
//! Variants follow the behavioral classes of the run: configuration,
//! discovery, schema validation, planning, rendering, hookups, subprocess.

use std::path::PathBuf;
use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, LoomError>;

/// Errors surfaced by the loom.
///
/// Fatality differs per class: schema and planning errors abort the run,
/// configuration / rendering / hookup / subprocess errors fail the task or
/// spec that raised them while the run continues and aggregates them.
#[derive(Debug, Error)]
pub enum LoomError {
    /// Invalid WARP, Management, or treadle definition.
    #[error("configuration error: {0}")]
    Config(String),

    /// A module or file could not be loaded during discovery.
    #[error("discovery error in {path}: {message}")]
    Discovery { path: PathBuf, message: String },

    /// The parsed schema cannot be woven (missing primary key, unknown type).
    #[error("schema validation failed: {0}")]
    Schema(String),

    /// Plan construction could not complete.
    #[error("planning error: {0}")]
    Planning(String),

    /// The plan was traversed before construction finished.
    #[error("weaving plan is not complete; nodes are unavailable during the build phase")]
    PlanIncomplete,

    /// Template read or substitution failure.
    #[error("render error in template '{template}': {message}")]
    Render { template: String, message: String },

    /// A hookup spec failed validation or application.
    #[error("hookup error for {path}: {message}")]
    Hookup { path: PathBuf, message: String },

    /// An external tool exited non-zero or could not be resolved.
    #[error("subprocess '{tool}' failed: {message}")]
    Subprocess { tool: String, message: String },

    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Userland callback failure (treadle data/validate closures).
    #[error(transparent)]
    Userland(#[from] anyhow::Error),
}

impl LoomError {
    /// Attach a path to a raw io error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn hookup(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Hookup {
            path: path.into(),
            message: message.into(),
        }
    }
}
