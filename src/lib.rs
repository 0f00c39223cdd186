//! Spire-Loom - polyglot weaving engine
//!
//! Weaves a declarative WARP (core rings wrapped by platform and frontend
//! rings) into a heterogeneous workspace of Rust crates, TypeScript
//! packages, Android modules, and Tauri plugins. The pipeline runs reed
//! (discovery) -> heddles (planning) -> treadles (generation) with every
//! foreign-file write mediated by marker-delimited blocks and the
//! cross-run block registry.
//!
//! The crate is a library: command-line front ends, TUIs, and watch loops
//! are external collaborators that construct a [`LoomSystem`] and call
//! [`LoomSystem::weave`].

pub mod decorators;
pub mod error;
pub mod heddles;
pub mod hookups;
pub mod marker;
pub mod reed;
pub mod registry;
pub mod render;
pub mod shell;
pub mod sley;
pub mod tracing_config;
pub mod treadle;
pub mod treadles;
pub mod warp;
pub mod workspace;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

pub use decorators::{DecoratorKernel, Management, MethodDecl, Reach, StructDef, Wrapper};
pub use error::{LoomError, Result};
pub use heddles::{Planner, WeavingPlan};
pub use hookups::{HookupResult, HookupSpec, HookupStatus};
pub use registry::BlockRegistry;
pub use sley::MgmtMethod;
pub use treadle::{TreadleDefinition, TreadleKit};
pub use warp::{CrudOp, Ring, Spiraler, Warp};

/// Workspace configuration, read from `loom/loom.yaml` when present.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoomConfig {
    /// Root for relative output paths; defaults to the workspace root.
    pub output_root: Option<PathBuf>,
    /// Workspace template override directory (defaults to `loom/templates`).
    pub template_overrides: Option<PathBuf>,
    /// Drizzle schema modules to parse.
    pub schemas: Vec<PathBuf>,
    /// Files to pre-scan for marked blocks at run start.
    pub scan: Vec<PathBuf>,
    /// Explicit tool binary overrides (cargo, npx, npm).
    pub tools: BTreeMap<String, PathBuf>,
}

impl LoomConfig {
    /// Load the workspace configuration; an absent file means defaults.
    pub fn load(workspace_root: &Path) -> Result<Self> {
        let path = workspace_root.join("loom/loom.yaml");
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(&path).map_err(|e| LoomError::io(&path, e))?;
        serde_yaml::from_str(&content).map_err(|e| {
            LoomError::Config(format!("invalid loom.yaml: {}", e))
        })
    }
}

/// Final report of one weaving run.
#[derive(Debug, Default, Serialize)]
pub struct RunReport {
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub files_generated: Vec<PathBuf>,
    pub files_modified: Vec<PathBuf>,
    pub files_unchanged: Vec<PathBuf>,
    pub blocks_cleaned: usize,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

impl RunReport {
    /// Process exit code contract: non-zero on any recorded error.
    pub fn exit_code(&self) -> i32 {
        if self.errors.is_empty() {
            0
        } else {
            1
        }
    }

    /// Serialize for CI consumption.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| LoomError::Config(format!("cannot serialize report: {}", e)))
    }
}

/// The assembled loom: WARP, managements, schemas, treadle kit, registry.
pub struct LoomSystem {
    warp: Warp,
    managements: Vec<Management>,
    schema_paths: Vec<PathBuf>,
    scan_paths: Vec<PathBuf>,
    kit: TreadleKit,
    registry: BlockRegistry,
}

impl LoomSystem {
    pub fn new(warp: Warp, kit: TreadleKit) -> Self {
        Self {
            warp,
            managements: Vec::new(),
            schema_paths: Vec::new(),
            scan_paths: Vec::new(),
            kit,
            registry: BlockRegistry::new(),
        }
    }

    /// Register a Management collected from the loom directory.
    pub fn management(mut self, management: Management) -> Self {
        self.managements.push(management);
        self
    }

    /// Register a Drizzle schema module to parse during discovery.
    pub fn schema(mut self, path: impl Into<PathBuf>) -> Self {
        self.schema_paths.push(path.into());
        self
    }

    /// Register files to pre-scan for marked blocks (cross-run cleanup).
    pub fn scan_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.scan_paths.push(path.into());
        self
    }

    pub fn kit_mut(&mut self) -> &mut TreadleKit {
        &mut self.kit
    }

    /// Run the full weaving pipeline: reed, heddles, per-task generation,
    /// orphan cleanup. Schema and planning errors abort the run; task and
    /// hookup errors are aggregated into the report.
    #[instrument(skip_all)]
    pub async fn weave(&mut self) -> Result<RunReport> {
        let mut report = RunReport {
            started_at: Some(Utc::now()),
            ..Default::default()
        };

        // Reed: discovery. Schema validation failure is fatal here.
        let discovery =
            reed::discover(&self.warp, self.managements.clone(), &self.schema_paths).await?;
        report.warnings.extend(discovery.warnings.clone());

        // Heddles: plan construction against the composed matrix.
        let matrix = self.kit.matrix();
        let plan = Planner::new().build_plan(&self.warp, &discovery.managements, &matrix)?;
        for error in &plan.validation_errors {
            report.errors.push(error.clone());
        }

        // Shuttle bookkeeping: rebuild cross-run knowledge, then partition.
        self.registry.scan_paths(self.scan_paths.iter());
        self.registry.start_generation();

        // Treadles: tasks run sequentially, in collection order.
        for task in &plan.tasks {
            let task_report = self.kit.execute_task(task, &plan, &mut self.registry).await;
            if task_report.skipped {
                continue;
            }
            for (path, outcome) in task_report.files {
                match outcome {
                    treadle::FileOutcome::Generated => report.files_generated.push(path),
                    treadle::FileOutcome::Unchanged => report.files_unchanged.push(path),
                }
            }
            for hookup in task_report.hookups {
                match hookup.status {
                    HookupStatus::Applied => report.files_modified.push(hookup.path),
                    HookupStatus::Skipped => report.files_unchanged.push(hookup.path),
                    HookupStatus::Error => report.errors.push(format!(
                        "hookup {}: {}",
                        hookup.path.display(),
                        hookup.message.unwrap_or_default()
                    )),
                }
            }
            report.errors.extend(task_report.errors);
        }

        // Shuttle: garbage-collect blocks no generator re-emitted.
        let cleanup = self.registry.cleanup_all_blocks()?;
        report.blocks_cleaned = cleanup.removed.len();
        for path in cleanup.files_touched {
            if !report.files_modified.contains(&path) {
                report.files_modified.push(path);
            }
        }

        report.finished_at = Some(Utc::now());
        if report.errors.is_empty() {
            info!(
                generated = report.files_generated.len(),
                modified = report.files_modified.len(),
                unchanged = report.files_unchanged.len(),
                cleaned = report.blocks_cleaned,
                "weave complete"
            );
        } else {
            warn!(errors = report.errors.len(), "weave completed with errors");
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_exit_code() {
        let mut report = RunReport::default();
        assert_eq!(report.exit_code(), 0);
        report.errors.push("boom".into());
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_loom_config_defaults_when_absent() {
        let dir = tempfile::tempdir().unwrap();
        let config = LoomConfig::load(dir.path()).unwrap();
        assert!(config.schemas.is_empty());
        assert!(config.output_root.is_none());
    }

    #[test]
    fn test_loom_config_parses_yaml() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("loom")).unwrap();
        std::fs::write(
            dir.path().join("loom/loom.yaml"),
            "schemas:\n  - packages/db/schema.ts\nscan:\n  - crates/app/Cargo.toml\n",
        )
        .unwrap();
        let config = LoomConfig::load(dir.path()).unwrap();
        assert_eq!(config.schemas.len(), 1);
        assert_eq!(config.scan.len(), 1);
    }
}
