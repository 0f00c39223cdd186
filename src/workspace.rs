//! Workspace layout discovery
//!
//! A directory is a workspace root if it holds a pnpm workspace manifest,
//! a Cargo manifest with a `[workspace]` table, or a `loom/WARP.ts`. A
//! directory is a package directory if it holds a `package.json` or a
//! `Cargo.toml`. Invocation from inside a package suggests a default
//! filter derived from the package name.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

/// Whether a directory is a workspace root.
pub fn is_workspace_root(dir: &Path) -> bool {
    if dir.join("pnpm-workspace.yaml").exists() {
        return true;
    }
    if dir.join("loom/WARP.ts").exists() {
        return true;
    }
    let cargo_toml = dir.join("Cargo.toml");
    if cargo_toml.exists() {
        if let Ok(content) = fs::read_to_string(&cargo_toml) {
            if content.contains("[workspace]") {
                return true;
            }
        }
    }
    false
}

/// Whether a directory is a package directory.
pub fn is_package_dir(dir: &Path) -> bool {
    dir.join("package.json").exists() || dir.join("Cargo.toml").exists()
}

/// Walk up from `start` to the nearest workspace root.
pub fn find_workspace_root(start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if is_workspace_root(dir) {
            debug!(root = %dir.display(), "workspace root found");
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

/// Package name of a package directory, from either manifest.
pub fn package_name(dir: &Path) -> Option<String> {
    let package_json = dir.join("package.json");
    if package_json.exists() {
        let content = fs::read_to_string(&package_json).ok()?;
        let manifest: serde_json::Value = serde_json::from_str(&content).ok()?;
        if let Some(name) = manifest.get("name").and_then(|n| n.as_str()) {
            return Some(name.to_string());
        }
    }
    let cargo_toml = dir.join("Cargo.toml");
    if cargo_toml.exists() {
        let content = fs::read_to_string(&cargo_toml).ok()?;
        let name_re = regex::Regex::new(r#"(?m)^\s*name\s*=\s*"([^"]+)""#).ok()?;
        if let Some(caps) = name_re.captures(&content) {
            return Some(caps[1].to_string());
        }
    }
    None
}

/// Default generation filter suggested by the invoking package: the bare
/// package name, scope and path prefixes stripped.
pub fn default_filter(dir: &Path) -> Option<String> {
    let name = package_name(dir)?;
    let bare = name.rsplit('/').next().unwrap_or(&name);
    Some(bare.to_string())
}
