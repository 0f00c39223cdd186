//! TypeScript index-file hookups
//!
//! Adds `export * from`, named re-exports, and imports (side-effect,
//! default, named, namespace, type-only) to package index files.
//! Statements are normalized and deduplicated by source, kind, and name
//! set. Imports are inserted after the last existing import; exports after
//! the last existing export, or after the imports if none exist yet.

use std::collections::BTreeSet;
use std::path::Path;

use regex::Regex;

use crate::marker::{ensure_block, find_block, BlockMarker, InsertAnchor, MarkerLanguage};

use super::{read_target, write_target, HookupContext, HookupKind, HookupResult};

/// Import clause shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TsImportKind {
    SideEffect,
    Default(String),
    Named(Vec<String>),
    Namespace(String),
}

/// One import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TsImport {
    pub kind: TsImportKind,
    pub source: String,
    pub type_only: bool,
}

impl TsImport {
    pub fn side_effect(source: &str) -> Self {
        Self {
            kind: TsImportKind::SideEffect,
            source: source.to_string(),
            type_only: false,
        }
    }

    pub fn named(names: &[&str], source: &str) -> Self {
        Self {
            kind: TsImportKind::Named(names.iter().map(|n| n.to_string()).collect()),
            source: source.to_string(),
            type_only: false,
        }
    }

    pub fn type_named(names: &[&str], source: &str) -> Self {
        Self {
            type_only: true,
            ..Self::named(names, source)
        }
    }

    pub fn default(name: &str, source: &str) -> Self {
        Self {
            kind: TsImportKind::Default(name.to_string()),
            source: source.to_string(),
            type_only: false,
        }
    }

    pub fn namespace(name: &str, source: &str) -> Self {
        Self {
            kind: TsImportKind::Namespace(name.to_string()),
            source: source.to_string(),
            type_only: false,
        }
    }

    fn render(&self) -> String {
        let type_kw = if self.type_only { "type " } else { "" };
        match &self.kind {
            TsImportKind::SideEffect => format!("import '{}';", self.source),
            TsImportKind::Default(name) => {
                format!("import {}{} from '{}';", type_kw, name, self.source)
            }
            TsImportKind::Named(names) => format!(
                "import {}{{ {} }} from '{}';",
                type_kw,
                names.join(", "),
                self.source
            ),
            TsImportKind::Namespace(name) => {
                format!("import {}* as {} from '{}';", type_kw, name, self.source)
            }
        }
    }

    /// Normalized dedup signature: source + clause kind + sorted name set.
    fn signature(&self) -> String {
        let (kind, names) = match &self.kind {
            TsImportKind::SideEffect => ("side", String::new()),
            TsImportKind::Default(name) => ("default", name.clone()),
            TsImportKind::Named(names) => {
                let set: BTreeSet<&str> = names.iter().map(|s| s.trim()).collect();
                ("named", set.into_iter().collect::<Vec<_>>().join(","))
            }
            TsImportKind::Namespace(name) => ("namespace", name.clone()),
        };
        format!("import|{}|{}|{}", kind, self.source, names)
    }
}

/// A named re-export group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedReexport {
    pub names: Vec<String>,
    pub source: String,
}

impl NamedReexport {
    fn render(&self) -> String {
        format!("export {{ {} }} from '{}';", self.names.join(", "), self.source)
    }

    fn signature(&self) -> String {
        let set: BTreeSet<&str> = self.names.iter().map(|s| s.trim()).collect();
        format!(
            "export|named|{}|{}",
            self.source,
            set.into_iter().collect::<Vec<_>>().join(",")
        )
    }
}

/// Declarative index-file patch.
#[derive(Debug, Clone, Default)]
pub struct TsIndexHookup {
    pub star_exports: Vec<String>,
    pub named_exports: Vec<NamedReexport>,
    pub imports: Vec<TsImport>,
}

impl TsIndexHookup {
    pub fn star_export(mut self, source: &str) -> Self {
        self.star_exports.push(source.to_string());
        self
    }

    pub fn named_export(mut self, names: &[&str], source: &str) -> Self {
        self.named_exports.push(NamedReexport {
            names: names.iter().map(|n| n.to_string()).collect(),
            source: source.to_string(),
        });
        self
    }

    pub fn import(mut self, import: TsImport) -> Self {
        self.imports.push(import);
        self
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.star_exports.is_empty() && self.named_exports.is_empty() && self.imports.is_empty()
        {
            return Err("typescript hookup declares nothing to add".to_string());
        }
        for e in &self.named_exports {
            if e.names.is_empty() || e.source.is_empty() {
                return Err("named re-export needs names and a source".to_string());
            }
        }
        Ok(())
    }
}

/// Signatures of every import/export statement already in the buffer.
fn existing_signatures(content: &str) -> BTreeSet<String> {
    let mut signatures = BTreeSet::new();

    let star_re = Regex::new(r#"(?m)^\s*export\s+\*\s+from\s+['"]([^'"]+)['"]"#).unwrap();
    for cap in star_re.captures_iter(content) {
        signatures.insert(format!("export|star|{}|", &cap[1]));
    }

    let named_export_re =
        Regex::new(r#"(?m)^\s*export\s+(?:type\s+)?\{([^}]*)\}\s+from\s+['"]([^'"]+)['"]"#).unwrap();
    for cap in named_export_re.captures_iter(content) {
        let set: BTreeSet<&str> = cap[1].split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
        signatures.insert(format!(
            "export|named|{}|{}",
            &cap[2],
            set.into_iter().collect::<Vec<_>>().join(",")
        ));
    }

    let side_re = Regex::new(r#"(?m)^\s*import\s+['"]([^'"]+)['"]"#).unwrap();
    for cap in side_re.captures_iter(content) {
        signatures.insert(format!("import|side|{}|", &cap[1]));
    }

    let import_re =
        Regex::new(r#"(?m)^\s*import\s+(?:type\s+)?([^'";]+?)\s+from\s+['"]([^'"]+)['"]"#).unwrap();
    for cap in import_re.captures_iter(content) {
        let clause = cap[1].trim();
        let source = &cap[2];
        if let Some(inner) = clause.strip_prefix('{').and_then(|c| c.strip_suffix('}')) {
            let set: BTreeSet<&str> =
                inner.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
            signatures.insert(format!(
                "import|named|{}|{}",
                source,
                set.into_iter().collect::<Vec<_>>().join(",")
            ));
        } else if let Some(name) = clause.strip_prefix("* as ") {
            signatures.insert(format!("import|namespace|{}|{}", source, name.trim()));
        } else {
            signatures.insert(format!("import|default|{}|{}", source, clause));
        }
    }

    signatures
}

/// Anchor line for the managed import block: the last existing import.
fn last_import_line(content: &str) -> Option<String> {
    let re = Regex::new(r#"(?m)^\s*import\s+.*$"#).unwrap();
    re.find_iter(content).last().map(|m| m.as_str().to_string())
}

/// Anchor line for the managed export block: the last existing export, or
/// the last import if none.
fn last_export_line(content: &str) -> Option<String> {
    let re = Regex::new(r#"(?m)^\s*export\s+.*$"#).unwrap();
    re.find_iter(content)
        .last()
        .map(|m| m.as_str().to_string())
        .or_else(|| last_import_line(content))
}

fn merged_block_lines(
    content: &str,
    marker: &BlockMarker,
    fresh: impl IntoIterator<Item = String>,
) -> Vec<String> {
    let mut lines: Vec<String> = match find_block(content, marker) {
        Some(span) => content[span.inner_start..span.inner_end]
            .lines()
            .map(|l| l.to_string())
            .collect(),
        None => Vec::new(),
    };
    for line in fresh {
        if !lines.contains(&line) {
            lines.push(line);
        }
    }
    lines
}

pub(super) fn apply(path: &Path, spec: &TsIndexHookup, ctx: &mut HookupContext) -> HookupResult {
    let kind = HookupKind::TypeScript;
    let original = match read_target(path, kind) {
        Ok(content) => content,
        Err(result) => return result,
    };

    let mut content = original.clone();
    let mut added = Vec::new();

    // Imports first so exports can anchor after them.
    let fresh_imports: Vec<String> = {
        let present = existing_signatures(&content);
        spec.imports
            .iter()
            .filter(|i| !present.contains(&i.signature()))
            .map(|i| i.render())
            .collect()
    };
    if !fresh_imports.is_empty() || find_block(&content, &BlockMarker::new("TS", "IMPORTS", MarkerLanguage::TypeScript)).is_some() {
        let marker = BlockMarker::new("TS", "IMPORTS", MarkerLanguage::TypeScript);
        let lines = merged_block_lines(&content, &marker, fresh_imports.iter().cloned());
        if !lines.is_empty() {
            let anchor = match last_import_line(&content) {
                Some(line) => InsertAnchor::After(line),
                None => InsertAnchor::End,
            };
            let edit = ensure_block(&content, &marker, &lines.join("\n"), &anchor);
            if edit.modified {
                added.push(format!("{} imports", fresh_imports.len()));
            }
            content = edit.content;
            ctx.record_block(path, "TS", "IMPORTS");
        }
    }

    // Exports.
    let fresh_exports: Vec<String> = {
        let present = existing_signatures(&content);
        let mut fresh = Vec::new();
        for source in &spec.star_exports {
            if !present.contains(&format!("export|star|{}|", source)) {
                fresh.push(format!("export * from '{}';", source));
            }
        }
        for export in &spec.named_exports {
            if !present.contains(&export.signature()) {
                fresh.push(export.render());
            }
        }
        fresh
    };
    if !fresh_exports.is_empty() || find_block(&content, &BlockMarker::new("TS", "EXPORTS", MarkerLanguage::TypeScript)).is_some() {
        let marker = BlockMarker::new("TS", "EXPORTS", MarkerLanguage::TypeScript);
        let lines = merged_block_lines(&content, &marker, fresh_exports.iter().cloned());
        if !lines.is_empty() {
            let anchor = match last_export_line(&content) {
                Some(line) => InsertAnchor::After(line),
                None => InsertAnchor::End,
            };
            let edit = ensure_block(&content, &marker, &lines.join("\n"), &anchor);
            if edit.modified {
                added.push(format!("{} exports", fresh_exports.len()));
            }
            content = edit.content;
            ctx.record_block(path, "TS", "EXPORTS");
        }
    }

    if content == original {
        return HookupResult::skipped(path, kind, "all statements already present");
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

    const INDEX_TS: &str = r#"import { invoke } from '@tauri-apps/api/core';

export * from './types';
"#;

    fn apply_to(content: &str, spec: &TsIndexHookup) -> (String, HookupResult) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.ts");
        fs::write(&path, content).unwrap();
        let mut ctx = HookupContext::new(dir.path());
        let result = apply(&path, spec, &mut ctx);
        (fs::read_to_string(&path).unwrap(), result)
    }

    #[test]
    fn test_star_export_added_after_existing_exports() {
        let spec = TsIndexHookup::default().star_export("./bookmark");
        let (after, result) = apply_to(INDEX_TS, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Applied);
        let existing = after.find("export * from './types';").unwrap();
        let added = after.find("export * from './bookmark';").unwrap();
        assert!(added > existing);
    }

    #[test]
    fn test_duplicate_star_export_skipped() {
        let spec = TsIndexHookup::default().star_export("./types");
        let (after, result) = apply_to(INDEX_TS, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Skipped);
        assert_eq!(after, INDEX_TS);
    }

    #[test]
    fn test_named_export_dedup_is_name_set_based() {
        let base = "export { B, A } from './x';\n";
        let spec = TsIndexHookup::default().named_export(&["A", "B"], "./x");
        let (after, result) = apply_to(base, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Skipped);
        assert_eq!(after, base);
    }

    #[test]
    fn test_import_kinds_render() {
        let spec = TsIndexHookup::default()
            .import(TsImport::side_effect("./polyfill"))
            .import(TsImport::default("Loom", "./loom"))
            .import(TsImport::named(&["invoke"], "@tauri-apps/api/core"))
            .import(TsImport::namespace("bindings", "./gen"))
            .import(TsImport::type_named(&["Bookmark"], "./types"));
        let (after, _) = apply_to(INDEX_TS, &spec);
        assert!(after.contains("import './polyfill';"));
        assert!(after.contains("import Loom from './loom';"));
        // Named import of invoke from the same source already exists.
        assert_eq!(after.matches("import { invoke } from '@tauri-apps/api/core';").count(), 1);
        assert!(after.contains("import * as bindings from './gen';"));
        assert!(after.contains("import type { Bookmark } from './types';"));
    }

    #[test]
    fn test_imports_inserted_after_last_import() {
        let spec = TsIndexHookup::default().import(TsImport::named(&["listen"], "@tauri-apps/api/event"));
        let (after, _) = apply_to(INDEX_TS, &spec);
        let manual = after.find("import { invoke }").unwrap();
        let managed = after.find("import { listen }").unwrap();
        let exports = after.find("export * from './types';").unwrap();
        assert!(manual < managed);
        assert!(managed < exports);
    }

    #[test]
    fn test_empty_file_gets_statements() {
        let spec = TsIndexHookup::default()
            .import(TsImport::named(&["invoke"], "@tauri-apps/api/core"))
            .star_export("./bookmark");
        let (after, result) = apply_to("", &spec);
        assert_eq!(result.status, super::super::HookupStatus::Applied);
        assert!(after.contains("import { invoke } from '@tauri-apps/api/core';"));
        assert!(after.contains("export * from './bookmark';"));
    }

    #[test]
    fn test_reapplication_is_byte_identical() {
        let spec = TsIndexHookup::default()
            .import(TsImport::namespace("gen", "./gen"))
            .named_export(&["BookmarkMgmt"], "./bookmark");
        let (first, _) = apply_to(INDEX_TS, &spec);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.ts");
        fs::write(&path, &first).unwrap();
        let mut ctx = HookupContext::new(dir.path());
        let result = apply(&path, &spec, &mut ctx);
        assert_eq!(result.status, super::super::HookupStatus::Skipped);
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }
}
