//! npm manifest, iOS plist, and generic file-block hookups
//!
//! `package.json` cannot carry comment markers, so it is patched as
//! structured JSON: missing keys are inserted, existing keys preserved,
//! and the file is only rewritten when something was actually added.
//! `Info.plist` entries and generic file blocks go through the marker
//! codec like every other managed region.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::marker::{
    ensure_block, find_block, is_within_marked_span, marked_spans, marker_ident, BlockMarker,
    InsertAnchor, MarkerLanguage,
};
use crate::registry::language_for_path;

use super::{read_target, write_target, HookupContext, HookupKind, HookupResult};

/// Declarative `package.json` patch.
#[derive(Debug, Clone, Default)]
pub struct NpmHookup {
    pub dependencies: BTreeMap<String, String>,
    pub dev_dependencies: BTreeMap<String, String>,
    pub scripts: BTreeMap<String, String>,
}

impl NpmHookup {
    pub fn dependency(mut self, name: &str, version: &str) -> Self {
        self.dependencies.insert(name.to_string(), version.to_string());
        self
    }

    pub fn dev_dependency(mut self, name: &str, version: &str) -> Self {
        self.dev_dependencies
            .insert(name.to_string(), version.to_string());
        self
    }

    pub fn script(mut self, name: &str, command: &str) -> Self {
        self.scripts.insert(name.to_string(), command.to_string());
        self
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.dependencies.is_empty() && self.dev_dependencies.is_empty() && self.scripts.is_empty()
        {
            return Err("npm hookup declares nothing to add".to_string());
        }
        Ok(())
    }
}

/// One `<key>/<value>` pair for a plist dict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlistEntry {
    pub key: String,
    /// Pre-rendered value element, e.g. `<string>processing</string>`.
    pub value_xml: String,
}

/// Declarative `Info.plist` patch.
#[derive(Debug, Clone, Default)]
pub struct PlistHookup {
    pub entries: Vec<PlistEntry>,
}

impl PlistHookup {
    pub fn entry(mut self, key: &str, value_xml: &str) -> Self {
        self.entries.push(PlistEntry {
            key: key.to_string(),
            value_xml: value_xml.to_string(),
        });
        self
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.entries.is_empty() {
            return Err("plist hookup declares nothing to add".to_string());
        }
        for e in &self.entries {
            if e.key.is_empty() || e.value_xml.is_empty() {
                return Err("plist entry needs key and value".to_string());
            }
        }
        Ok(())
    }
}

/// Generic marked-block patch for any text file.
#[derive(Debug, Clone)]
pub struct FileBlockHookup {
    pub scope: String,
    pub identifier: String,
    pub content: String,
    pub anchor: InsertAnchor,
    /// Override the marker language inferred from the path.
    pub language: Option<MarkerLanguage>,
    /// Create the target file when it does not exist.
    pub create_if_missing: bool,
}

impl FileBlockHookup {
    pub fn new(scope: &str, identifier: &str, content: &str) -> Self {
        Self {
            scope: scope.to_string(),
            identifier: identifier.to_string(),
            content: content.to_string(),
            anchor: InsertAnchor::End,
            language: None,
            create_if_missing: false,
        }
    }

    pub fn anchored(mut self, anchor: InsertAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn language(mut self, language: MarkerLanguage) -> Self {
        self.language = Some(language);
        self
    }

    pub fn create_if_missing(mut self) -> Self {
        self.create_if_missing = true;
        self
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.scope.is_empty() || self.identifier.is_empty() {
            return Err("file block needs scope and identifier".to_string());
        }
        Ok(())
    }
}

pub(super) fn apply_npm(path: &Path, spec: &NpmHookup, ctx: &mut HookupContext) -> HookupResult {
    let kind = HookupKind::NpmPackage;
    let original = match read_target(path, kind) {
        Ok(content) => content,
        Err(result) => return result,
    };

    let mut manifest: Value = match serde_json::from_str(&original) {
        Ok(value) => value,
        Err(err) => {
            return HookupResult::error(path, kind, format!("invalid package.json: {}", err))
        }
    };
    let Some(root) = manifest.as_object_mut() else {
        return HookupResult::error(path, kind, "package.json root is not an object");
    };

    let mut added = Vec::new();
    let sections = [
        ("dependencies", &spec.dependencies),
        ("devDependencies", &spec.dev_dependencies),
        ("scripts", &spec.scripts),
    ];
    for (section, entries) in sections {
        if entries.is_empty() {
            continue;
        }
        let object = root
            .entry(section.to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        let Some(object) = object.as_object_mut() else {
            return HookupResult::error(path, kind, format!("'{}' is not an object", section));
        };
        for (name, version) in entries {
            if !object.contains_key(name) {
                object.insert(name.clone(), Value::String(version.clone()));
                added.push(format!("{}.{}", section, name));
            }
        }
    }

    if added.is_empty() {
        return HookupResult::skipped(path, kind, "all keys already present");
    }

    let mut rendered = match serde_json::to_string_pretty(&manifest) {
        Ok(rendered) => rendered,
        Err(err) => return HookupResult::error(path, kind, err.to_string()),
    };
    rendered.push('\n');
    if let Err(result) = write_target(path, kind, &rendered, ctx.dry_run) {
        return result;
    }
    HookupResult::applied(path, kind, format!("added {}", added.join(", ")))
}

pub(super) fn apply_plist(path: &Path, spec: &PlistHookup, ctx: &mut HookupContext) -> HookupResult {
    let kind = HookupKind::IosPlist;
    let original = match read_target(path, kind) {
        Ok(content) => content,
        Err(result) => return result,
    };

    let Some(last_dict_close) = original.rfind("</dict>") else {
        return HookupResult::error(path, kind, "plist has no closing </dict>");
    };

    let mut content = original.clone();
    let mut added = Vec::new();
    let mut manual = Vec::new();

    for entry in &spec.entries {
        let identifier = format!("PLIST_{}", marker_ident(&entry.key));
        let marker = BlockMarker::new("XML", &identifier, MarkerLanguage::Xml);
        let body = format!("<key>{}</key>\n{}", entry.key, entry.value_xml);

        if find_block(&content, &marker).is_some() {
            let edit = ensure_block(&content, &marker, &body, &InsertAnchor::End);
            if edit.modified {
                added.push(entry.key.clone());
            }
            content = edit.content;
            ctx.record_block(path, "XML", &identifier);
            continue;
        }

        // A manual entry with the same key is an override.
        let needle = format!("<key>{}</key>", entry.key);
        let spans = marked_spans(&content);
        let manual_present = {
            let mut found = false;
            let mut from = 0;
            while let Some(rel) = content[from..].find(&needle) {
                let pos = from + rel;
                if !is_within_marked_span(&spans, pos) {
                    found = true;
                    break;
                }
                from = pos + needle.len();
            }
            found
        };
        if manual_present {
            manual.push(entry.key.clone());
            continue;
        }

        let at = content
            .rfind("</dict>")
            .map(|p| crate::marker::line_start_of(&content, p))
            .unwrap_or(last_dict_close);
        let mut block = String::new();
        block.push_str(&marker.start_line());
        block.push('\n');
        block.push_str(&body);
        block.push('\n');
        block.push_str(&marker.end_line());
        block.push('\n');
        content.insert_str(at, &block);
        added.push(entry.key.clone());
        ctx.record_block(path, "XML", &identifier);
    }

    if content == original {
        return HookupResult::skipped(
            path,
            kind,
            format!("added=[]; manual overrides: [{}]", manual.join(", ")),
        );
    }
    if let Err(result) = write_target(path, kind, &content, ctx.dry_run) {
        return result;
    }
    HookupResult::applied(path, kind, format!("added [{}]", added.join(", ")))
}

pub(super) fn apply_file_block(
    path: &Path,
    spec: &FileBlockHookup,
    ctx: &mut HookupContext,
) -> HookupResult {
    let kind = HookupKind::FileBlock;
    let original = if path.exists() {
        match read_target(path, kind) {
            Ok(content) => content,
            Err(result) => return result,
        }
    } else if spec.create_if_missing {
        String::new()
    } else {
        return HookupResult::error(path, kind, "target file does not exist");
    };

    let Some(language) = spec.language.or_else(|| language_for_path(path)) else {
        return HookupResult::error(path, kind, "cannot infer marker language for target");
    };

    let marker = BlockMarker::new(&spec.scope, &spec.identifier, language);
    let edit = ensure_block(&original, &marker, &spec.content, &spec.anchor);
    ctx.record_block(path, &spec.scope, &spec.identifier);

    if !edit.modified {
        return HookupResult::skipped(path, kind, "block already up to date");
    }
    if !ctx.dry_run {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                if let Err(err) = fs::create_dir_all(parent) {
                    return HookupResult::error(path, kind, err.to_string());
                }
            }
        }
    }
    if let Err(result) = write_target(path, kind, &edit.content, ctx.dry_run) {
        return result;
    }
    HookupResult::applied(path, kind, "block written")
}
