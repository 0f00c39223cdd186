//! Cargo manifest hookups
//!
//! Inserts entries into `[dependencies]`, `[workspace.dependencies]`,
//! `[dev-dependencies]`, `[build-dependencies]`, `[features]`, and `[lib]`.
//! Every managed entry lives in its own marked block keyed by section and
//! name; keys already present outside a marker are manual and preserved
//! untouched.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;

use crate::marker::{ensure_block, is_within_marked_span, marked_spans, BlockMarker, InsertAnchor, MarkerLanguage};
use crate::marker::marker_ident;

use super::{read_target, write_target, HookupContext, HookupKind, HookupResult};

/// A dependency value: a bare version string or an inline table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DependencyDetail {
    pub version: Option<String>,
    pub path: Option<String>,
    pub git: Option<String>,
    pub branch: Option<String>,
    pub features: Vec<String>,
    pub optional: Option<bool>,
    pub default_features: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DependencySpec {
    Version(String),
    Detailed(DependencyDetail),
}

impl DependencySpec {
    pub fn version(version: &str) -> Self {
        DependencySpec::Version(version.to_string())
    }

    pub fn detailed(detail: DependencyDetail) -> Self {
        DependencySpec::Detailed(detail)
    }

    /// Render the right-hand side of the manifest entry.
    fn render(&self) -> String {
        match self {
            DependencySpec::Version(v) => format!("\"{}\"", v),
            DependencySpec::Detailed(d) => {
                let mut parts = Vec::new();
                if let Some(v) = &d.version {
                    parts.push(format!("version = \"{}\"", v));
                }
                if let Some(p) = &d.path {
                    parts.push(format!("path = \"{}\"", p));
                }
                if let Some(g) = &d.git {
                    parts.push(format!("git = \"{}\"", g));
                }
                if let Some(b) = &d.branch {
                    parts.push(format!("branch = \"{}\"", b));
                }
                if !d.features.is_empty() {
                    let feats: Vec<String> =
                        d.features.iter().map(|f| format!("\"{}\"", f)).collect();
                    parts.push(format!("features = [{}]", feats.join(", ")));
                }
                if let Some(o) = d.optional {
                    parts.push(format!("optional = {}", o));
                }
                if let Some(df) = d.default_features {
                    parts.push(format!("default-features = {}", df));
                }
                format!("{{ {} }}", parts.join(", "))
            }
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            DependencySpec::Version(v) => v.is_empty(),
            DependencySpec::Detailed(d) => {
                d.version.is_none() && d.path.is_none() && d.git.is_none()
            }
        }
    }
}

/// `[lib]` section entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LibSection {
    pub name: Option<String>,
    pub crate_type: Vec<String>,
}

/// Declarative Cargo manifest patch.
#[derive(Debug, Clone, Default)]
pub struct CargoHookup {
    pub dependencies: BTreeMap<String, DependencySpec>,
    pub dev_dependencies: BTreeMap<String, DependencySpec>,
    pub build_dependencies: BTreeMap<String, DependencySpec>,
    pub workspace_dependencies: BTreeMap<String, DependencySpec>,
    pub features: BTreeMap<String, Vec<String>>,
    pub lib: Option<LibSection>,
}

impl CargoHookup {
    pub fn dependency(mut self, name: &str, spec: DependencySpec) -> Self {
        self.dependencies.insert(name.to_string(), spec);
        self
    }

    pub fn dev_dependency(mut self, name: &str, spec: DependencySpec) -> Self {
        self.dev_dependencies.insert(name.to_string(), spec);
        self
    }

    pub fn build_dependency(mut self, name: &str, spec: DependencySpec) -> Self {
        self.build_dependencies.insert(name.to_string(), spec);
        self
    }

    pub fn workspace_dependency(mut self, name: &str, spec: DependencySpec) -> Self {
        self.workspace_dependencies.insert(name.to_string(), spec);
        self
    }

    pub fn feature(mut self, name: &str, values: &[&str]) -> Self {
        self.features
            .insert(name.to_string(), values.iter().map(|s| s.to_string()).collect());
        self
    }

    pub fn lib_section(mut self, lib: LibSection) -> Self {
        self.lib = Some(lib);
        self
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        for (name, spec) in self
            .dependencies
            .iter()
            .chain(&self.dev_dependencies)
            .chain(&self.build_dependencies)
            .chain(&self.workspace_dependencies)
        {
            if name.is_empty() {
                return Err("dependency with empty name".to_string());
            }
            if spec.is_empty() {
                return Err(format!(
                    "dependency '{}' needs a version, path, or git source",
                    name
                ));
            }
        }
        if self.dependencies.is_empty()
            && self.dev_dependencies.is_empty()
            && self.build_dependencies.is_empty()
            && self.workspace_dependencies.is_empty()
            && self.features.is_empty()
            && self.lib.is_none()
        {
            return Err("cargo hookup declares nothing to add".to_string());
        }
        Ok(())
    }
}

/// Span of a `[section]` body: from just after the header line to the next
/// top-level section header or EOF.
fn section_span(content: &str, header: &str) -> Option<std::ops::Range<usize>> {
    let header_re = Regex::new(&format!(r"(?m)^\s*{}\s*$", regex::escape(header))).ok()?;
    let m = header_re.find(content)?;
    let body_start = content[m.end()..]
        .find('\n')
        .map(|i| m.end() + i + 1)
        .unwrap_or(content.len());
    let next_re = Regex::new(r"(?m)^\s*\[").unwrap();
    let body_end = next_re
        .find_at(content, body_start)
        .map(|n| n.start())
        .unwrap_or(content.len());
    Some(body_start..body_end)
}

/// Whether `key = ...` exists within the span, outside any marked block.
fn manual_key_present(content: &str, span: &std::ops::Range<usize>, key: &str) -> bool {
    let spans = marked_spans(content);
    let key_re = Regex::new(&format!(r"(?m)^\s*{}\s*=", regex::escape(key))).unwrap();
    let found = key_re
        .find_iter(&content[span.clone()])
        .any(|m| !is_within_marked_span(&spans, span.start + m.start()));
    found
}

fn ensure_section(content: &mut String, header: &str) -> bool {
    if section_span(content, header).is_some() {
        return false;
    }
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    if !content.is_empty() && !content.ends_with("\n\n") {
        // keep a blank line between sections, matching hand-written manifests
        content.push('\n');
    }
    content.push_str(header);
    content.push('\n');
    true
}

struct SectionWork {
    header: &'static str,
    entries: Vec<(String, String)>,
}

pub(super) fn apply(path: &Path, spec: &CargoHookup, ctx: &mut HookupContext) -> HookupResult {
    let kind = HookupKind::CargoToml;
    let original = match read_target(path, kind) {
        Ok(content) => content,
        Err(result) => return result,
    };

    let mut sections: Vec<SectionWork> = Vec::new();
    let dep_sections: [(&'static str, &BTreeMap<String, DependencySpec>); 4] = [
        ("[dependencies]", &spec.dependencies),
        ("[dev-dependencies]", &spec.dev_dependencies),
        ("[build-dependencies]", &spec.build_dependencies),
        ("[workspace.dependencies]", &spec.workspace_dependencies),
    ];
    for (header, deps) in dep_sections {
        if deps.is_empty() {
            continue;
        }
        sections.push(SectionWork {
            header,
            entries: deps
                .iter()
                .map(|(name, dep)| (name.clone(), format!("{} = {}", name, dep.render())))
                .collect(),
        });
    }
    if !spec.features.is_empty() {
        sections.push(SectionWork {
            header: "[features]",
            entries: spec
                .features
                .iter()
                .map(|(name, values)| {
                    let vals: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
                    (name.clone(), format!("{} = [{}]", name, vals.join(", ")))
                })
                .collect(),
        });
    }
    if let Some(lib) = &spec.lib {
        let mut entries = Vec::new();
        if let Some(name) = &lib.name {
            entries.push(("name".to_string(), format!("name = \"{}\"", name)));
        }
        if !lib.crate_type.is_empty() {
            let vals: Vec<String> = lib.crate_type.iter().map(|v| format!("\"{}\"", v)).collect();
            entries.push((
                "crate-type".to_string(),
                format!("crate-type = [{}]", vals.join(", ")),
            ));
        }
        sections.push(SectionWork {
            header: "[lib]",
            entries,
        });
    }

    let mut content = original.clone();
    let mut added = Vec::new();
    let mut preserved = Vec::new();

    for section in &sections {
        if section.entries.is_empty() {
            continue;
        }
        ensure_section(&mut content, section.header);
        for (key, line) in &section.entries {
            let span = match section_span(&content, section.header) {
                Some(span) => span,
                None => {
                    return HookupResult::error(
                        path,
                        kind,
                        format!("failed to locate section {}", section.header),
                    )
                }
            };
            let identifier = format!(
                "{}_{}",
                marker_ident(section.header.trim_matches(['[', ']'])),
                marker_ident(key)
            );
            if manual_key_present(&content, &span, key) {
                preserved.push(format!("{} {}", section.header, key));
                continue;
            }
            let marker = BlockMarker::new("CARGO", &identifier, MarkerLanguage::Toml);
            let edit = ensure_block(
                &content,
                &marker,
                line,
                &InsertAnchor::After(section.header.to_string()),
            );
            if edit.modified {
                added.push(format!("{} {}", section.header, key));
            }
            content = edit.content;
            ctx.record_block(path, "CARGO", &identifier);
        }
    }

    if content == original {
        return HookupResult::skipped(
            path,
            kind,
            format!("nothing to change ({} manual entries preserved)", preserved.len()),
        );
    }

    if let Err(result) = write_target(path, kind, &content, ctx.dry_run) {
        return result;
    }
    HookupResult::applied(
        path,
        kind,
        format!("added {}; preserved {} manual", added.join(", "), preserved.len()),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn apply_to(content: &str, spec: &CargoHookup) -> (String, HookupResult) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Cargo.toml");
        fs::write(&path, content).unwrap();
        let mut ctx = HookupContext::new(dir.path());
        let result = apply(&path, spec, &mut ctx);
        (fs::read_to_string(&path).unwrap(), result)
    }

    #[test]
    fn test_idempotent_dependency_insert() {
        let base = "[package]\nname = \"a\"\nversion = \"0.1.0\"\n[dependencies]\n";
        let spec = CargoHookup::default().dependency(
            "tokio",
            DependencySpec::Detailed(DependencyDetail {
                version: Some("1".into()),
                features: vec!["rt".into()],
                ..Default::default()
            }),
        );

        let (first, result) = apply_to(base, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Applied);
        assert!(first.contains("tokio = { version = \"1\", features = [\"rt\"] }"));
        // The entry landed in the dependencies section.
        let span = section_span(&first, "[dependencies]").unwrap();
        assert!(first[span].contains("tokio"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Cargo.toml");
        fs::write(&path, &first).unwrap();
        let mut ctx = HookupContext::new(dir.path());
        let second = apply(&path, &spec, &mut ctx);
        assert_eq!(second.status, super::super::HookupStatus::Skipped);
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn test_manual_key_preserved() {
        let base = "[package]\nname = \"a\"\n\n[dependencies]\ntokio = \"0.9\"\n";
        let spec = CargoHookup::default().dependency("tokio", DependencySpec::version("1"));
        let (after, result) = apply_to(base, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Skipped);
        assert!(after.contains("tokio = \"0.9\""));
        assert!(!after.contains("tokio = \"1\""));
    }

    #[test]
    fn test_missing_section_is_created() {
        let base = "[package]\nname = \"a\"\n";
        let spec = CargoHookup::default()
            .dependency("serde", DependencySpec::version("1.0"))
            .feature("default", &["std"]);
        let (after, result) = apply_to(base, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Applied);
        assert!(after.contains("[dependencies]"));
        assert!(after.contains("serde = \"1.0\""));
        assert!(after.contains("[features]"));
        assert!(after.contains("default = [\"std\"]"));
    }

    #[test]
    fn test_workspace_dependencies_and_lib() {
        let base = "[workspace]\nmembers = [\"crates/*\"]\n";
        let spec = CargoHookup::default()
            .workspace_dependency(
                "o19-foundframe",
                DependencySpec::Detailed(DependencyDetail {
                    path: Some("crates/foundframe".into()),
                    ..Default::default()
                }),
            )
            .lib_section(LibSection {
                name: None,
                crate_type: vec!["cdylib".into(), "staticlib".into(), "rlib".into()],
            });
        let (after, _) = apply_to(base, &spec);
        assert!(after.contains("[workspace.dependencies]"));
        assert!(after.contains("o19-foundframe = { path = \"crates/foundframe\" }"));
        assert!(after.contains("crate-type = [\"cdylib\", \"staticlib\", \"rlib\"]"));
    }

    #[test]
    fn test_validation_rejects_empty_spec() {
        assert!(CargoHookup::default().validate().is_err());
        assert!(CargoHookup::default()
            .dependency("x", DependencySpec::version(""))
            .validate()
            .is_err());
    }

    #[test]
    fn test_dependency_rendering_key_order() {
        let spec = DependencySpec::Detailed(DependencyDetail {
            version: Some("2".into()),
            path: Some("../x".into()),
            git: None,
            branch: None,
            features: vec!["a".into(), "b".into()],
            optional: Some(true),
            default_features: Some(false),
        });
        assert_eq!(
            spec.render(),
            "{ version = \"2\", path = \"../x\", features = [\"a\", \"b\"], optional = true, default-features = false }"
        );
    }
}
