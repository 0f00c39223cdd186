//! Gradle build-script hookups
//!
//! Adds plugins, per-configuration dependencies, Android source-set
//! overrides, and a named Rust build task driving `cargo ndk`. Source-set
//! overrides append directories through `srcDir` (never replacing
//! `srcDirs`) and live in a separate managed `android {}` configuration
//! block, so manual edits inside the user's own `android {}` are preserved.

use std::path::Path;

use crate::marker::{
    ensure_block, is_within_marked_span, marked_spans, marker_ident, BlockMarker, InsertAnchor,
    MarkerLanguage,
};

use super::{read_target, write_target, HookupContext, HookupKind, HookupResult};

/// A dependency in one Gradle configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GradleDependency {
    pub configuration: String,
    pub notation: String,
}

impl GradleDependency {
    pub fn implementation(notation: &str) -> Self {
        Self {
            configuration: "implementation".to_string(),
            notation: notation.to_string(),
        }
    }
}

/// One appended source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSetDir {
    /// Source set name, e.g. `main`.
    pub set: String,
    /// Language bucket inside the set, e.g. `java` or `kotlin`.
    pub bucket: String,
    pub src_dir: String,
}

/// A named task that builds Rust libraries into `jniLibs` via `cargo ndk`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RustBuildTask {
    pub name: String,
    /// Crate directory, relative to the Gradle module.
    pub crate_dir: String,
    /// ABI targets; empty means the default arm64-v8a + x86_64 pair.
    pub targets: Vec<String>,
    /// Output directory for the built libraries.
    pub jni_libs_dir: String,
}

impl RustBuildTask {
    pub fn new(name: &str, crate_dir: &str) -> Self {
        Self {
            name: name.to_string(),
            crate_dir: crate_dir.to_string(),
            targets: Vec::new(),
            jni_libs_dir: "src/main/jniLibs".to_string(),
        }
    }

    fn effective_targets(&self) -> Vec<String> {
        if self.targets.is_empty() {
            vec!["arm64-v8a".to_string(), "x86_64".to_string()]
        } else {
            self.targets.clone()
        }
    }
}

/// Declarative Gradle patch.
#[derive(Debug, Clone, Default)]
pub struct GradleHookup {
    pub plugins: Vec<String>,
    pub dependencies: Vec<GradleDependency>,
    pub source_sets: Vec<SourceSetDir>,
    pub rust_build_task: Option<RustBuildTask>,
}

impl GradleHookup {
    pub fn plugin(mut self, id: &str) -> Self {
        self.plugins.push(id.to_string());
        self
    }

    pub fn dependency(mut self, dep: GradleDependency) -> Self {
        self.dependencies.push(dep);
        self
    }

    pub fn source_set(mut self, set: &str, bucket: &str, src_dir: &str) -> Self {
        self.source_sets.push(SourceSetDir {
            set: set.to_string(),
            bucket: bucket.to_string(),
            src_dir: src_dir.to_string(),
        });
        self
    }

    pub fn rust_task(mut self, task: RustBuildTask) -> Self {
        self.rust_build_task = Some(task);
        self
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.plugins.is_empty()
            && self.dependencies.is_empty()
            && self.source_sets.is_empty()
            && self.rust_build_task.is_none()
        {
            return Err("gradle hookup declares nothing to add".to_string());
        }
        for dep in &self.dependencies {
            if dep.configuration.is_empty() || dep.notation.is_empty() {
                return Err("gradle dependency needs configuration and notation".to_string());
            }
        }
        if let Some(task) = &self.rust_build_task {
            if task.name.is_empty() || task.crate_dir.is_empty() {
                return Err("rust build task needs a name and crate directory".to_string());
            }
        }
        Ok(())
    }
}

fn is_kts(path: &Path) -> bool {
    path.to_str().map(|p| p.ends_with(".kts")).unwrap_or(false)
}

fn plugin_line(id: &str, kts: bool) -> String {
    if kts {
        format!("    id(\"{}\")", id)
    } else {
        format!("    id '{}'", id)
    }
}

fn dependency_line(dep: &GradleDependency, kts: bool) -> String {
    if kts {
        format!("    {}(\"{}\")", dep.configuration, dep.notation)
    } else {
        format!("    {} '{}'", dep.configuration, dep.notation)
    }
}

/// Whether `needle` occurs outside every marked block.
fn present_manually(content: &str, needle: &str) -> bool {
    let spans = marked_spans(content);
    let mut from = 0;
    while let Some(rel) = content[from..].find(needle) {
        let pos = from + rel;
        if !is_within_marked_span(&spans, pos) {
            return true;
        }
        from = pos + needle.len();
    }
    false
}

pub(super) fn apply(path: &Path, spec: &GradleHookup, ctx: &mut HookupContext) -> HookupResult {
    let kind = HookupKind::Gradle;
    let original = match read_target(path, kind) {
        Ok(content) => content,
        Err(result) => return result,
    };
    let kts = is_kts(path);

    let mut content = original.clone();
    let mut added = Vec::new();

    // Plugins.
    let wanted_plugins: Vec<&String> = spec
        .plugins
        .iter()
        .filter(|id| !present_manually(&content, &format!("'{}'", id))
            && !present_manually(&content, &format!("\"{}\"", id)))
        .collect();
    if !wanted_plugins.is_empty() {
        let marker = BlockMarker::new("GRADLE", "PLUGINS", MarkerLanguage::Gradle);
        let lines: Vec<String> = wanted_plugins
            .iter()
            .map(|id| plugin_line(id, kts))
            .collect();
        let (body, anchor) = if content.contains("plugins {") {
            (lines.join("\n"), InsertAnchor::After("plugins {".to_string()))
        } else {
            (
                format!("plugins {{\n{}\n}}", lines.join("\n")),
                InsertAnchor::End,
            )
        };
        let edit = ensure_block(&content, &marker, &body, &anchor);
        if edit.modified {
            added.push("plugins".to_string());
        }
        content = edit.content;
        ctx.record_block(path, "GRADLE", "PLUGINS");
    }

    // Dependencies per configuration.
    let wanted_deps: Vec<&GradleDependency> = spec
        .dependencies
        .iter()
        .filter(|d| !present_manually(&content, &d.notation))
        .collect();
    if !wanted_deps.is_empty() {
        let marker = BlockMarker::new("GRADLE", "DEPENDENCIES", MarkerLanguage::Gradle);
        let lines: Vec<String> = wanted_deps
            .iter()
            .map(|d| dependency_line(d, kts))
            .collect();
        let (body, anchor) = if content.contains("dependencies {") {
            (
                lines.join("\n"),
                InsertAnchor::After("dependencies {".to_string()),
            )
        } else {
            (
                format!("dependencies {{\n{}\n}}", lines.join("\n")),
                InsertAnchor::End,
            )
        };
        let edit = ensure_block(&content, &marker, &body, &anchor);
        if edit.modified {
            added.push("dependencies".to_string());
        }
        content = edit.content;
        ctx.record_block(path, "GRADLE", "DEPENDENCIES");
    }

    // Source-set overrides: a separate managed android {} configuration
    // block; Gradle merges repeated android {} closures.
    if !spec.source_sets.is_empty() {
        let marker = BlockMarker::new("GRADLE", "SOURCESETS", MarkerLanguage::Gradle);
        let mut body = String::from("android {\n    sourceSets {\n");
        for dir in &spec.source_sets {
            if kts {
                body.push_str(&format!(
                    "        getByName(\"{}\") {{ {}.srcDir(\"{}\") }}\n",
                    dir.set, dir.bucket, dir.src_dir
                ));
            } else {
                body.push_str(&format!(
                    "        {} {{ {}.srcDir '{}' }}\n",
                    dir.set, dir.bucket, dir.src_dir
                ));
            }
        }
        body.push_str("    }\n}");
        let edit = ensure_block(&content, &marker, &body, &InsertAnchor::End);
        if edit.modified {
            added.push("sourceSets".to_string());
        }
        content = edit.content;
        ctx.record_block(path, "GRADLE", "SOURCESETS");
    }

    // Rust build task.
    if let Some(task) = &spec.rust_build_task {
        let register_groovy = format!("tasks.register('{}'", task.name);
        let register_kts = format!("tasks.register(\"{}\"", task.name);
        if !present_manually(&content, &register_groovy)
            && !present_manually(&content, &register_kts)
        {
            let identifier = format!("TASK_{}", marker_ident(&task.name));
            let marker = BlockMarker::new("GRADLE", &identifier, MarkerLanguage::Gradle);
            let mut body = String::new();
            if kts {
                body.push_str(&format!(
                    "tasks.register<Exec>(\"{}\") {{\n    workingDir(\"{}\")\n    commandLine(\n        \"cargo\", \"ndk\",\n",
                    task.name, task.crate_dir
                ));
                for target in task.effective_targets() {
                    body.push_str(&format!("        \"-t\", \"{}\",\n", target));
                }
                body.push_str(&format!(
                    "        \"-o\", \"{}\",\n        \"build\", \"--release\"\n    )\n}}\n",
                    task.jni_libs_dir
                ));
                body.push_str(&format!(
                    "tasks.named(\"preBuild\") {{ dependsOn(\"{}\") }}",
                    task.name
                ));
            } else {
                body.push_str(&format!(
                    "tasks.register('{}', Exec) {{\n    workingDir '{}'\n    commandLine 'cargo', 'ndk',\n",
                    task.name, task.crate_dir
                ));
                for target in task.effective_targets() {
                    body.push_str(&format!("        '-t', '{}',\n", target));
                }
                body.push_str(&format!(
                    "        '-o', '{}',\n        'build', '--release'\n}}\n",
                    task.jni_libs_dir
                ));
                body.push_str(&format!("preBuild.dependsOn '{}'", task.name));
            }
            let edit = ensure_block(&content, &marker, &body, &InsertAnchor::End);
            if edit.modified {
                added.push(format!("task {}", task.name));
            }
            content = edit.content;
            ctx.record_block(path, "GRADLE", &identifier);
        }
    }

    if content == original {
        return HookupResult::skipped(path, kind, "all entries already present");
    }
    if let Err(result) = write_target(path, kind, &content, ctx.dry_run) {
        return result;
    }
    HookupResult::applied(path, kind, format!("added {}", added.join(", ")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const BUILD_GRADLE: &str = r#"plugins {
    id 'com.android.application'
}

android {
    namespace 'ty.circulari.o19'
    compileSdk 34
}

dependencies {
    implementation 'androidx.core:core-ktx:1.12.0'
}
"#;

    fn apply_to(name: &str, content: &str, spec: &GradleHookup) -> (String, HookupResult) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        let mut ctx = HookupContext::new(dir.path());
        let result = apply(&path, spec, &mut ctx);
        (fs::read_to_string(&path).unwrap(), result)
    }

    #[test]
    fn test_plugin_and_dependency_insertion() {
        let spec = GradleHookup::default()
            .plugin("org.mozilla.rust-android-gradle.rust-android")
            .dependency(GradleDependency::implementation("net.java.dev.jna:jna:5.13.0@aar"));
        let (after, result) = apply_to("build.gradle", BUILD_GRADLE, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Applied);
        assert!(after.contains("id 'org.mozilla.rust-android-gradle.rust-android'"));
        assert!(after.contains("implementation 'net.java.dev.jna:jna:5.13.0@aar'"));
        // Managed lines sit under the existing blocks, right after the headers.
        let plugins_pos = after.find("plugins {").unwrap();
        let marker_pos = after.find("// SPIRE-LOOM:GRADLE:PLUGINS").unwrap();
        assert!(marker_pos > plugins_pos);
        assert!(marker_pos < after.find("android {").unwrap());
    }

    #[test]
    fn test_manual_dependency_preserved() {
        let spec = GradleHookup::default()
            .dependency(GradleDependency::implementation("androidx.core:core-ktx:1.12.0"));
        let (after, result) = apply_to("build.gradle", BUILD_GRADLE, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Skipped);
        assert_eq!(after, BUILD_GRADLE);
    }

    #[test]
    fn test_source_sets_live_in_managed_android_block() {
        let spec = GradleHookup::default().source_set("main", "kotlin", "../../gen/kotlin");
        let (after, _) = apply_to("build.gradle", BUILD_GRADLE, &spec);
        assert!(after.contains("main { kotlin.srcDir '../../gen/kotlin' }"));
        // The user's android block is untouched.
        assert!(after.contains("namespace 'ty.circulari.o19'"));
        assert_eq!(after.matches("android {").count(), 2);
    }

    #[test]
    fn test_rust_build_task_with_default_targets() {
        let spec = GradleHookup::default()
            .rust_task(RustBuildTask::new("cargoBuildFoundframe", "../../crates/foundframe-android"));
        let (after, _) = apply_to("build.gradle", BUILD_GRADLE, &spec);
        assert!(after.contains("tasks.register('cargoBuildFoundframe', Exec)"));
        assert!(after.contains("'-t', 'arm64-v8a',"));
        assert!(after.contains("'-t', 'x86_64',"));
        assert!(after.contains("'-o', 'src/main/jniLibs',"));
        assert!(after.contains("preBuild.dependsOn 'cargoBuildFoundframe'"));
    }

    #[test]
    fn test_kts_syntax() {
        let base = "plugins {\n    id(\"com.android.application\")\n}\ndependencies {\n}\n";
        let spec = GradleHookup::default()
            .plugin("org.jetbrains.kotlin.android")
            .dependency(GradleDependency::implementation("androidx.activity:activity:1.8.0"));
        let (after, _) = apply_to("build.gradle.kts", base, &spec);
        assert!(after.contains("id(\"org.jetbrains.kotlin.android\")"));
        assert!(after.contains("implementation(\"androidx.activity:activity:1.8.0\")"));
    }

    #[test]
    fn test_idempotent_reapplication() {
        let spec = GradleHookup::default()
            .plugin("org.mozilla.rust-android-gradle.rust-android")
            .source_set("main", "java", "../gen")
            .rust_task(RustBuildTask::new("cargoBuild", "../crates/core"));
        let (first, _) = apply_to("build.gradle", BUILD_GRADLE, &spec);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("build.gradle");
        fs::write(&path, &first).unwrap();
        let mut ctx = HookupContext::new(dir.path());
        let result = apply(&path, &spec, &mut ctx);
        assert_eq!(result.status, super::super::HookupStatus::Skipped);
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }
}
