//! Rust module-root hookups (`lib.rs` / `main.rs`)
//!
//! Adds module declarations (optionally with `#[path]`), deduplicated `use`
//! statements, and a Tauri plugin init function. Module declarations are
//! deduplicated against the whole file so re-application never produces a
//! second `mod foo;`.

use std::path::Path;

use regex::Regex;

use crate::marker::{
    ensure_block, find_block, BlockMarker, InsertAnchor, MarkerLanguage,
};

use super::{read_target, write_target, HookupContext, HookupKind, HookupResult};

/// One `mod` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModDecl {
    pub name: String,
    pub public: bool,
    pub path_attr: Option<String>,
}

impl ModDecl {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            public: false,
            path_attr: None,
        }
    }

    pub fn public(mut self) -> Self {
        self.public = true;
        self
    }

    pub fn path(mut self, path: &str) -> Self {
        self.path_attr = Some(path.to_string());
        self
    }

    fn render(&self) -> String {
        let decl = if self.public {
            format!("pub mod {};", self.name)
        } else {
            format!("mod {};", self.name)
        };
        match &self.path_attr {
            Some(path) => format!("#[path = \"{}\"]\n{}", path, decl),
            None => decl,
        }
    }
}

/// A generated Tauri plugin init function.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PluginInitFn {
    pub fn_name: String,
    pub plugin_name: String,
    pub state_type: Option<String>,
    pub setup: Vec<String>,
    pub commands: Vec<String>,
}

impl PluginInitFn {
    fn render(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "pub fn {}<R: tauri::Runtime>() -> tauri::plugin::TauriPlugin<R> {{\n",
            self.fn_name
        ));
        out.push_str(&format!(
            "    tauri::plugin::Builder::new(\"{}\")\n",
            self.plugin_name
        ));
        if !self.commands.is_empty() {
            out.push_str("        .invoke_handler(tauri::generate_handler![\n");
            for command in &self.commands {
                out.push_str(&format!("            {},\n", command));
            }
            out.push_str("        ])\n");
        }
        out.push_str("        .setup(|app| {\n");
        if let Some(state) = &self.state_type {
            out.push_str(&format!("            app.manage({}::default());\n", state));
        }
        for line in &self.setup {
            out.push_str(&format!("            {}\n", line));
        }
        out.push_str("            Ok(())\n");
        out.push_str("        })\n");
        out.push_str("        .build()\n");
        out.push_str("}");
        out
    }
}

/// Declarative module-root patch.
#[derive(Debug, Clone, Default)]
pub struct RustModuleHookup {
    pub modules: Vec<ModDecl>,
    pub uses: Vec<String>,
    pub plugin_init: Option<PluginInitFn>,
}

impl RustModuleHookup {
    pub fn module(mut self, decl: ModDecl) -> Self {
        self.modules.push(decl);
        self
    }

    pub fn use_statement(mut self, statement: &str) -> Self {
        self.uses.push(statement.to_string());
        self
    }

    pub fn plugin(mut self, init: PluginInitFn) -> Self {
        self.plugin_init = Some(init);
        self
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.modules.is_empty() && self.uses.is_empty() && self.plugin_init.is_none() {
            return Err("rust-module hookup declares nothing to add".to_string());
        }
        for m in &self.modules {
            if m.name.is_empty() {
                return Err("mod declaration with empty name".to_string());
            }
        }
        if let Some(init) = &self.plugin_init {
            if init.fn_name.is_empty() || init.plugin_name.is_empty() {
                return Err("plugin init needs fn_name and plugin_name".to_string());
            }
        }
        Ok(())
    }
}

/// Whether a `mod name;` declaration (pub or not) exists anywhere.
fn mod_declared(content: &str, name: &str) -> bool {
    let re = Regex::new(&format!(r"(?m)^\s*(?:pub\s+)?mod\s+{}\s*;", regex::escape(name))).unwrap();
    re.is_match(content)
}

fn normalize_use(statement: &str) -> String {
    statement.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// All `use` statements present in the buffer, normalized.
fn existing_uses(content: &str) -> Vec<String> {
    let re = Regex::new(r"(?m)^\s*(pub\s+)?use\s+[^;]+;").unwrap();
    re.find_iter(content)
        .map(|m| normalize_use(m.as_str()))
        .collect()
}

/// Current inner lines of a marked block, if present.
fn block_lines(content: &str, marker: &BlockMarker) -> Vec<String> {
    match find_block(content, marker) {
        Some(span) => content[span.inner_start..span.inner_end]
            .lines()
            .map(|l| l.to_string())
            .collect(),
        None => Vec::new(),
    }
}

pub(super) fn apply(path: &Path, spec: &RustModuleHookup, ctx: &mut HookupContext) -> HookupResult {
    let kind = HookupKind::RustModule;
    let original = match read_target(path, kind) {
        Ok(content) => content,
        Err(result) => return result,
    };

    let mut content = original.clone();
    let mut added = Vec::new();

    // Module declarations accumulate in one marked block; anything already
    // declared (manually or managed) is left alone.
    if !spec.modules.is_empty() {
        let marker = BlockMarker::new("CRATE", "MODULES", MarkerLanguage::Rust);
        let mut lines = block_lines(&content, &marker);
        for decl in &spec.modules {
            if mod_declared(&content, &decl.name) {
                let managed = lines.iter().any(|l| l.contains(&format!("mod {};", decl.name)));
                if !managed {
                    continue;
                }
            }
            let rendered = decl.render();
            if !lines.contains(&rendered)
                && !lines
                    .iter()
                    .any(|l| l.contains(&format!("mod {};", decl.name)))
            {
                lines.push(rendered);
                added.push(format!("mod {}", decl.name));
            }
        }
        if !lines.is_empty() {
            let edit = ensure_block(&content, &marker, &lines.join("\n"), &InsertAnchor::End);
            content = edit.content;
            ctx.record_block(path, "CRATE", "MODULES");
        }
    }

    // Use statements, deduplicated by normalized whitespace.
    if !spec.uses.is_empty() {
        let marker = BlockMarker::new("CRATE", "USES", MarkerLanguage::Rust);
        let mut lines = block_lines(&content, &marker);
        let present = existing_uses(&content);
        for statement in &spec.uses {
            let statement = statement.trim_end_matches(';');
            let full = format!("use {};", statement.trim_start_matches("use ").trim());
            let normalized = normalize_use(&full);
            if present.contains(&normalized) {
                continue;
            }
            if lines.iter().any(|l| normalize_use(l) == normalized) {
                continue;
            }
            lines.push(full.clone());
            added.push(normalized);
        }
        if !lines.is_empty() {
            let edit = ensure_block(&content, &marker, &lines.join("\n"), &InsertAnchor::End);
            content = edit.content;
            ctx.record_block(path, "CRATE", "USES");
        }
    }

    // Plugin init: re-invocation is a no-op if the function already exists.
    if let Some(init) = &spec.plugin_init {
        let fn_re = Regex::new(&format!(r"fn\s+{}\b", regex::escape(&init.fn_name))).unwrap();
        if !fn_re.is_match(&content) {
            let identifier = crate::marker::marker_ident(&init.fn_name);
            let marker = BlockMarker::new("PLUGIN", &identifier, MarkerLanguage::Rust);
            let edit = ensure_block(&content, &marker, &init.render(), &InsertAnchor::End);
            if edit.modified {
                added.push(format!("fn {}", init.fn_name));
            }
            content = edit.content;
            ctx.record_block(path, "PLUGIN", &identifier);
        } else if find_block(
            &content,
            &BlockMarker::new(
                "PLUGIN",
                &crate::marker::marker_ident(&init.fn_name),
                MarkerLanguage::Rust,
            ),
        )
        .is_some()
        {
            // Managed function survives cleanup across runs.
            ctx.record_block(path, "PLUGIN", &crate::marker::marker_ident(&init.fn_name));
        }
    }

    if content == original {
        return HookupResult::skipped(path, kind, "all declarations already present");
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

    fn apply_to(content: &str, spec: &RustModuleHookup) -> (String, HookupResult) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.rs");
        fs::write(&path, content).unwrap();
        let mut ctx = HookupContext::new(dir.path());
        let result = apply(&path, spec, &mut ctx);
        (fs::read_to_string(&path).unwrap(), result)
    }

    #[test]
    fn test_mod_declaration_unique_after_reapplication() {
        let spec = RustModuleHookup::default().module(ModDecl::new("bookmark").public());
        let (first, _) = apply_to("pub mod error;\n", &spec);
        assert_eq!(first.matches("pub mod bookmark;").count(), 1);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lib.rs");
        fs::write(&path, &first).unwrap();
        let mut ctx = HookupContext::new(dir.path());
        let result = apply(&path, &spec, &mut ctx);
        assert_eq!(result.status, super::super::HookupStatus::Skipped);
        let second = fs::read_to_string(&path).unwrap();
        assert_eq!(second.matches("pub mod bookmark;").count(), 1);
        assert_eq!(first, second);
    }

    #[test]
    fn test_manual_mod_declaration_respected() {
        let spec = RustModuleHookup::default().module(ModDecl::new("bookmark"));
        let (after, result) = apply_to("mod bookmark;\n", &spec);
        assert_eq!(result.status, super::super::HookupStatus::Skipped);
        assert_eq!(after.matches("mod bookmark;").count(), 1);
        assert!(!after.contains("SPIRE-LOOM"));
    }

    #[test]
    fn test_path_attribute_rendering() {
        let spec = RustModuleHookup::default()
            .module(ModDecl::new("generated").path("spire/generated.rs"));
        let (after, _) = apply_to("", &spec);
        assert!(after.contains("#[path = \"spire/generated.rs\"]\nmod generated;"));
    }

    #[test]
    fn test_use_statements_deduplicated_by_whitespace() {
        let spec = RustModuleHookup::default()
            .use_statement("use std::sync::Arc;")
            .use_statement("use   std::sync::Arc ;")
            .use_statement("use tauri::Manager;");
        let (after, _) = apply_to("use std::sync::Arc;\n", &spec);
        assert_eq!(after.matches("use std::sync::Arc;").count(), 1);
        assert!(after.contains("use tauri::Manager;"));
    }

    #[test]
    fn test_plugin_init_generated_once() {
        let spec = RustModuleHookup::default().plugin(PluginInitFn {
            fn_name: "init".into(),
            plugin_name: "o19-ffi".into(),
            state_type: Some("FfiState".into()),
            setup: vec!["let _ = app.path();".into()],
            commands: vec!["commands::bookmark_add".into(), "commands::bookmark_list".into()],
        });
        let (first, result) = apply_to("", &spec);
        assert_eq!(result.status, super::super::HookupStatus::Applied);
        assert!(first.contains("pub fn init<R: tauri::Runtime>() -> tauri::plugin::TauriPlugin<R>"));
        assert!(first.contains("tauri::plugin::Builder::new(\"o19-ffi\")"));
        assert!(first.contains("tauri::generate_handler![\n            commands::bookmark_add,"));
        assert!(first.contains("app.manage(FfiState::default());"));

        let (second, result2) = {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("lib.rs");
            fs::write(&path, &first).unwrap();
            let mut ctx = HookupContext::new(dir.path());
            let r = apply(&path, &spec, &mut ctx);
            (fs::read_to_string(&path).unwrap(), r)
        };
        assert_eq!(result2.status, super::super::HookupStatus::Skipped);
        assert_eq!(first, second);
    }

    #[test]
    fn test_existing_manual_fn_blocks_generation() {
        let manual = "pub fn init() {}\n";
        let spec = RustModuleHookup::default().plugin(PluginInitFn {
            fn_name: "init".into(),
            plugin_name: "x".into(),
            state_type: None,
            setup: vec![],
            commands: vec![],
        });
        let (after, result) = apply_to(manual, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Skipped);
        assert_eq!(after, manual);
    }
}
