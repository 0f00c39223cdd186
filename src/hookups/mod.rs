//! Hookup handlers - idempotent patchers for foreign build files
//!
//! A hookup is a declarative patch to a file the loom does not own:
//! Android manifests, Cargo manifests, Gradle scripts, Kotlin sources,
//! Rust module roots, TypeScript index files, Vite configs, npm manifests,
//! iOS plists, and generic marked blocks. Kind is inferred from the path
//! suffix; every handler shares the `apply -> HookupResult` contract and
//! records its blocks with the run's block registry.

pub mod android_manifest;
pub mod cargo_toml;
pub mod gradle;
pub mod kotlin;
pub mod misc;
pub mod rust_module;
pub mod typescript;
pub mod vite;

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::error::LoomError;
use crate::registry::BlockRegistry;

pub use android_manifest::ManifestHookup;
pub use cargo_toml::{CargoHookup, DependencySpec};
pub use gradle::GradleHookup;
pub use kotlin::KotlinHookup;
pub use misc::{FileBlockHookup, NpmHookup, PlistHookup};
pub use rust_module::RustModuleHookup;
pub use typescript::TsIndexHookup;
pub use vite::ViteHookup;

/// File kinds a hookup can target, inferred from the path suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum HookupKind {
    AndroidManifest,
    CargoToml,
    Gradle,
    RustModule,
    Kotlin,
    TypeScript,
    ViteConfig,
    NpmPackage,
    IosPlist,
    FileBlock,
}

impl HookupKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookupKind::AndroidManifest => "android-manifest",
            HookupKind::CargoToml => "cargo-toml",
            HookupKind::Gradle => "gradle",
            HookupKind::RustModule => "rust-module",
            HookupKind::Kotlin => "kotlin",
            HookupKind::TypeScript => "typescript",
            HookupKind::ViteConfig => "vite-config",
            HookupKind::NpmPackage => "npm-package",
            HookupKind::IosPlist => "ios-plist",
            HookupKind::FileBlock => "file-block",
        }
    }
}

/// Infer the handler kind from a file path.
pub fn detect_kind(path: &Path) -> Option<HookupKind> {
    let name = path.file_name().and_then(|n| n.to_str())?;
    if name == "AndroidManifest.xml" {
        return Some(HookupKind::AndroidManifest);
    }
    if name == "Cargo.toml" {
        return Some(HookupKind::CargoToml);
    }
    if name.ends_with(".gradle") || name.ends_with(".gradle.kts") {
        return Some(HookupKind::Gradle);
    }
    if name == "package.json" {
        return Some(HookupKind::NpmPackage);
    }
    if name == "Info.plist" {
        return Some(HookupKind::IosPlist);
    }
    if name.starts_with("vite.config.") {
        return Some(HookupKind::ViteConfig);
    }
    if name == "lib.rs" || name == "main.rs" {
        return Some(HookupKind::RustModule);
    }
    if name.ends_with(".kt") {
        return Some(HookupKind::Kotlin);
    }
    if name.starts_with("index.") && (name.ends_with(".ts") || name.ends_with(".js")) {
        return Some(HookupKind::TypeScript);
    }
    None
}

/// Application status of one hookup spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HookupStatus {
    Applied,
    Skipped,
    Error,
}

/// Per-spec application outcome.
#[derive(Debug, Clone, Serialize)]
pub struct HookupResult {
    pub path: PathBuf,
    pub kind: &'static str,
    pub status: HookupStatus,
    pub message: Option<String>,
}

impl HookupResult {
    pub fn applied(path: &Path, kind: HookupKind, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: kind.as_str(),
            status: HookupStatus::Applied,
            message: Some(message.into()),
        }
    }

    pub fn skipped(path: &Path, kind: HookupKind, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: kind.as_str(),
            status: HookupStatus::Skipped,
            message: Some(message.into()),
        }
    }

    pub fn error(path: &Path, kind: HookupKind, message: impl Into<String>) -> Self {
        Self {
            path: path.to_path_buf(),
            kind: kind.as_str(),
            status: HookupStatus::Error,
            message: Some(message.into()),
        }
    }
}

/// One declarative patch, discriminated by payload kind.
#[derive(Debug, Clone)]
pub enum HookupSpec {
    AndroidManifest(ManifestHookup),
    CargoToml(CargoHookup),
    Gradle(GradleHookup),
    RustModule(RustModuleHookup),
    Kotlin(KotlinHookup),
    TypeScript(TsIndexHookup),
    ViteConfig(ViteHookup),
    NpmPackage(NpmHookup),
    IosPlist(PlistHookup),
    FileBlock(FileBlockHookup),
}

impl HookupSpec {
    pub fn kind(&self) -> HookupKind {
        match self {
            HookupSpec::AndroidManifest(_) => HookupKind::AndroidManifest,
            HookupSpec::CargoToml(_) => HookupKind::CargoToml,
            HookupSpec::Gradle(_) => HookupKind::Gradle,
            HookupSpec::RustModule(_) => HookupKind::RustModule,
            HookupSpec::Kotlin(_) => HookupKind::Kotlin,
            HookupSpec::TypeScript(_) => HookupKind::TypeScript,
            HookupSpec::ViteConfig(_) => HookupKind::ViteConfig,
            HookupSpec::NpmPackage(_) => HookupKind::NpmPackage,
            HookupSpec::IosPlist(_) => HookupKind::IosPlist,
            HookupSpec::FileBlock(_) => HookupKind::FileBlock,
        }
    }

    /// Kind-specific required-subfield validation.
    fn validate(&self) -> Result<(), String> {
        match self {
            HookupSpec::AndroidManifest(spec) => spec.validate(),
            HookupSpec::CargoToml(spec) => spec.validate(),
            HookupSpec::Gradle(spec) => spec.validate(),
            HookupSpec::RustModule(spec) => spec.validate(),
            HookupSpec::Kotlin(spec) => spec.validate(),
            HookupSpec::TypeScript(spec) => spec.validate(),
            HookupSpec::ViteConfig(spec) => spec.validate(),
            HookupSpec::NpmPackage(spec) => spec.validate(),
            HookupSpec::IosPlist(spec) => spec.validate(),
            HookupSpec::FileBlock(spec) => spec.validate(),
        }
    }
}

/// Shared handler context for one batch of hookups.
pub struct HookupContext<'a> {
    /// Base directory for resolving relative spec paths.
    pub package_dir: PathBuf,
    /// Run registry; every written block is recorded here.
    pub registry: Option<&'a mut BlockRegistry>,
    /// Compute statuses without writing files.
    pub dry_run: bool,
}

impl<'a> HookupContext<'a> {
    pub fn new(package_dir: impl Into<PathBuf>) -> Self {
        Self {
            package_dir: package_dir.into(),
            registry: None,
            dry_run: false,
        }
    }

    pub fn with_registry(mut self, registry: &'a mut BlockRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn record_block(&mut self, path: &Path, scope: &str, identifier: &str) {
        if let Some(registry) = self.registry.as_deref_mut() {
            registry.record_generated(path, scope, identifier);
        }
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.package_dir.join(path)
        }
    }
}

/// Read a target file for patching. Missing files are a hookup error.
pub(crate) fn read_target(path: &Path, kind: HookupKind) -> Result<String, HookupResult> {
    fs::read_to_string(path).map_err(|err| {
        HookupResult::error(
            path,
            kind,
            format!("cannot read target file: {}", err),
        )
    })
}

/// Write the patched buffer back, whole-file, unless dry-running.
pub(crate) fn write_target(
    path: &Path,
    kind: HookupKind,
    content: &str,
    dry_run: bool,
) -> Result<(), HookupResult> {
    if dry_run {
        return Ok(());
    }
    fs::write(path, content).map_err(|err| {
        HookupResult::error(path, kind, format!("cannot write target file: {}", err))
    })
}

/// Apply one hookup spec against a target path.
#[instrument(skip(spec, ctx), fields(kind = spec.kind().as_str(), path = %path.display()))]
pub fn apply_hookup(path: &Path, spec: &HookupSpec, ctx: &mut HookupContext) -> HookupResult {
    let kind = spec.kind();

    if let Err(message) = spec.validate() {
        return HookupResult::error(path, kind, message);
    }

    let resolved = ctx.resolve(path);

    // The path must agree with the payload kind, except for the generic
    // file-block patcher which accepts any text file.
    if kind != HookupKind::FileBlock {
        match detect_kind(&resolved) {
            Some(detected) if detected == kind => {}
            Some(detected) => {
                return HookupResult::error(
                    &resolved,
                    kind,
                    format!(
                        "path looks like a {} target but the spec is {}",
                        detected.as_str(),
                        kind.as_str()
                    ),
                );
            }
            None => {
                return HookupResult::error(
                    &resolved,
                    kind,
                    "cannot infer a handler from the path suffix",
                );
            }
        }
    }

    let result = match spec {
        HookupSpec::AndroidManifest(spec) => android_manifest::apply(&resolved, spec, ctx),
        HookupSpec::CargoToml(spec) => cargo_toml::apply(&resolved, spec, ctx),
        HookupSpec::Gradle(spec) => gradle::apply(&resolved, spec, ctx),
        HookupSpec::RustModule(spec) => rust_module::apply(&resolved, spec, ctx),
        HookupSpec::Kotlin(spec) => kotlin::apply(&resolved, spec, ctx),
        HookupSpec::TypeScript(spec) => typescript::apply(&resolved, spec, ctx),
        HookupSpec::ViteConfig(spec) => vite::apply(&resolved, spec, ctx),
        HookupSpec::NpmPackage(spec) => misc::apply_npm(&resolved, spec, ctx),
        HookupSpec::IosPlist(spec) => misc::apply_plist(&resolved, spec, ctx),
        HookupSpec::FileBlock(spec) => misc::apply_file_block(&resolved, spec, ctx),
    };

    if result.status == HookupStatus::Error {
        warn!(message = ?result.message, "hookup failed");
    } else {
        debug!(status = ?result.status, "hookup done");
    }
    result
}

/// Apply a batch of hookup specs. One failure does not abort the others.
pub fn apply_hookups(
    specs: &[(PathBuf, HookupSpec)],
    ctx: &mut HookupContext,
) -> Vec<HookupResult> {
    specs
        .iter()
        .map(|(path, spec)| apply_hookup(path, spec, ctx))
        .collect()
}

impl HookupResult {
    /// Lift an error result into the crate error type.
    pub fn to_error(&self) -> Option<LoomError> {
        match self.status {
            HookupStatus::Error => Some(LoomError::hookup(
                &self.path,
                self.message.clone().unwrap_or_default(),
            )),
            _ => None,
        }
    }
}
