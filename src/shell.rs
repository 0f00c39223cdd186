//! Non-interactive shell-outs
//!
//! The loom drives external tools (ORM client generation, formatters,
//! package managers) without reimplementing them: resolve the binary,
//! run it to completion, pipe stdout for parsing, surface stderr on
//! failure. A failing tool fails the current task; other tasks still run.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, info, instrument, warn};

use crate::error::{LoomError, Result};

/// Captured output of one completed tool run.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    pub status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Resolve a tool binary on PATH, or via an explicit override.
pub fn resolve_tool(program: &str, override_path: Option<&Path>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(LoomError::Subprocess {
            tool: program.to_string(),
            message: format!("configured path {} does not exist", path.display()),
        });
    }
    which::which(program).map_err(|_| LoomError::Subprocess {
        tool: program.to_string(),
        message: "not found on PATH".to_string(),
    })
}

/// Run a tool to completion, capturing stdout and stderr.
///
/// Non-zero exit is an error carrying the tool's stderr. There is no
/// implicit retry and no timeout; the caller owns scheduling.
#[instrument(skip(args), fields(program = %program, args = args.len()))]
pub async fn run_tool(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<ToolOutput> {
    let binary = resolve_tool(program, None)?;
    debug!(binary = %binary.display(), "spawning tool");

    let mut command = Command::new(&binary);
    command
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());
    if let Some(cwd) = cwd {
        command.current_dir(cwd);
    }

    let output = command.output().await.map_err(|err| LoomError::Subprocess {
        tool: program.to_string(),
        message: err.to_string(),
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
    let status = output.status.code().unwrap_or(-1);

    if !output.status.success() {
        warn!(status, stderr = %stderr.trim(), "tool failed");
        return Err(LoomError::Subprocess {
            tool: program.to_string(),
            message: format!("exit status {}: {}", status, stderr.trim()),
        });
    }

    info!(status, "tool completed");
    Ok(ToolOutput {
        status,
        stdout,
        stderr,
    })
}

/// ORM and build-tool wrappers the treadles shell out to.
pub struct OrmTools;

impl OrmTools {
    /// `npx prisma generate` in a package directory.
    pub async fn prisma_generate(package_dir: &Path) -> Result<ToolOutput> {
        run_tool("npx", &["prisma", "generate"], Some(package_dir)).await
    }

    /// `npx drizzle-kit generate` in a package directory.
    pub async fn drizzle_generate(package_dir: &Path) -> Result<ToolOutput> {
        run_tool("npx", &["drizzle-kit", "generate"], Some(package_dir)).await
    }

    /// `cargo fmt` over a generated crate.
    pub async fn cargo_fmt(crate_dir: &Path) -> Result<ToolOutput> {
        run_tool("cargo", &["fmt"], Some(crate_dir)).await
    }

    /// `npm install` in a package directory.
    pub async fn npm_install(package_dir: &Path) -> Result<ToolOutput> {
        run_tool("npm", &["install", "--no-audit", "--no-fund"], Some(package_dir)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_tool_captures_stdout() {
        let output = run_tool("sh", &["-c", "echo woven"], None).await.unwrap();
        assert_eq!(output.status, 0);
        assert_eq!(output.stdout.trim(), "woven");
    }

    #[tokio::test]
    async fn test_failing_tool_surfaces_stderr() {
        let err = run_tool("sh", &["-c", "echo broken thread 1>&2; exit 3"], None)
            .await
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("exit status 3"));
        assert!(message.contains("broken thread"));
    }

    #[tokio::test]
    async fn test_unresolvable_tool_is_subprocess_error() {
        let err = run_tool("definitely-not-a-real-tool-xyz", &[], None)
            .await
            .unwrap_err();
        assert!(matches!(err, LoomError::Subprocess { .. }));
    }

    #[test]
    fn test_resolve_tool_override_must_exist() {
        let err = resolve_tool("cargo", Some(Path::new("/nonexistent/cargo")));
        assert!(err.is_err());
    }
}
