//! Vite config hookups
//!
//! Patches the default-exported config object of `vite.config.ts` /
//! `vite.config.js`: adds `build.rollupOptions.input`, extends `define`
//! (merging keys, preserving existing), appends plugin expressions to
//! `plugins`, and sets `server` fields. Both `defineConfig({...})` and
//! plain-object exports are tolerated. Edits are key-level merges into the
//! live object, so idempotence comes from key presence rather than markers.

use std::collections::BTreeMap;
use std::path::Path;

use regex::Regex;

use super::{read_target, write_target, HookupContext, HookupKind, HookupResult};

/// `build.rollupOptions.input` value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViteInput {
    Single(String),
    Entries(BTreeMap<String, String>),
}

/// `server` fields to set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViteServer {
    pub port: Option<u16>,
    pub host: Option<String>,
}

/// Declarative Vite config patch.
#[derive(Debug, Clone, Default)]
pub struct ViteHookup {
    pub input: Option<ViteInput>,
    pub define: BTreeMap<String, String>,
    pub plugins: Vec<String>,
    pub server: Option<ViteServer>,
}

impl ViteHookup {
    pub fn input_entries(mut self, entries: &[(&str, &str)]) -> Self {
        self.input = Some(ViteInput::Entries(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));
        self
    }

    pub fn define_value(mut self, key: &str, value_expr: &str) -> Self {
        self.define.insert(key.to_string(), value_expr.to_string());
        self
    }

    pub fn plugin(mut self, expr: &str) -> Self {
        self.plugins.push(expr.to_string());
        self
    }

    pub fn server(mut self, server: ViteServer) -> Self {
        self.server = Some(server);
        self
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.input.is_none()
            && self.define.is_empty()
            && self.plugins.is_empty()
            && self.server.is_none()
        {
            return Err("vite hookup declares nothing to add".to_string());
        }
        Ok(())
    }
}

/// Balanced bracket end for JS source, skipping strings, template literals
/// and line comments. `open` must index the opening bracket.
fn bracket_end(content: &str, open: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let open_ch = bytes[open];
    let close_ch = match open_ch {
        b'{' => b'}',
        b'[' => b']',
        b'(' => b')',
        _ => return None,
    };
    let mut depth = 0usize;
    let mut i = open;
    let mut in_str: Option<u8> = None;
    let mut in_comment = false;
    while i < bytes.len() {
        let b = bytes[i];
        if in_comment {
            if b == b'\n' {
                in_comment = false;
            }
        } else if let Some(quote) = in_str {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == quote {
                in_str = None;
            }
        } else {
            match b {
                b'\'' | b'"' | b'`' => in_str = Some(b),
                b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => in_comment = true,
                b if b == open_ch => depth += 1,
                b if b == close_ch => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Inner range of the exported config object.
fn config_object(content: &str) -> Option<std::ops::Range<usize>> {
    let define_config_re = Regex::new(r"defineConfig\s*\(\s*\{").unwrap();
    let plain_re = Regex::new(r"export\s+default\s+\{").unwrap();
    let open = define_config_re
        .find(content)
        .or_else(|| plain_re.find(content))
        .map(|m| m.end() - 1)?;
    let close = bracket_end(content, open)?;
    Some(open + 1..close)
}

/// Inner range of `key: {...}` within a range.
fn key_object(content: &str, range: &std::ops::Range<usize>, key: &str) -> Option<std::ops::Range<usize>> {
    let re = Regex::new(&format!(r"\b{}\s*:\s*\{{", regex::escape(key))).ok()?;
    let m = re.find(&content[range.clone()])?;
    let open = range.start + m.end() - 1;
    let close = bracket_end(content, open)?;
    Some(open + 1..close)
}

/// Inner range of `key: [...]` within a range.
fn key_array(content: &str, range: &std::ops::Range<usize>, key: &str) -> Option<std::ops::Range<usize>> {
    let re = Regex::new(&format!(r"\b{}\s*:\s*\[", regex::escape(key))).ok()?;
    let m = re.find(&content[range.clone()])?;
    let open = range.start + m.end() - 1;
    let close = bracket_end(content, open)?;
    Some(open + 1..close)
}

fn key_present(content: &str, range: &std::ops::Range<usize>, key: &str) -> bool {
    Regex::new(&format!(r"\b{}\s*:", regex::escape(key)))
        .map(|re| re.is_match(&content[range.clone()]))
        .unwrap_or(false)
}

/// Insert `text` right after the opening brace of `range`, on its own line.
fn insert_at_start(content: &mut String, range: &std::ops::Range<usize>, text: &str) {
    content.insert_str(range.start, &format!("\n{}", text));
}

fn render_input(input: &ViteInput) -> String {
    match input {
        ViteInput::Single(path) => format!("'{}'", path),
        ViteInput::Entries(entries) => {
            let pairs: Vec<String> = entries
                .iter()
                .map(|(k, v)| format!("{}: '{}'", k, v))
                .collect();
            format!("{{ {} }}", pairs.join(", "))
        }
    }
}

pub(super) fn apply(path: &Path, spec: &ViteHookup, ctx: &mut HookupContext) -> HookupResult {
    let kind = HookupKind::ViteConfig;
    let original = match read_target(path, kind) {
        Ok(content) => content,
        Err(result) => return result,
    };

    let mut content = original.clone();
    let mut added = Vec::new();

    if config_object(&content).is_none() {
        return HookupResult::error(
            path,
            kind,
            "no defineConfig({...}) or default-exported object found",
        );
    }

    // define: merge keys, preserving existing values.
    for (key, value) in &spec.define {
        let Some(config) = config_object(&content) else {
            break;
        };
        match key_object(&content, &config, "define") {
            Some(define) => {
                if !key_present(&content, &define, key) {
                    insert_at_start(&mut content, &define, &format!("    {}: {},", key, value));
                    added.push(format!("define.{}", key));
                }
            }
            None => {
                insert_at_start(
                    &mut content,
                    &config,
                    &format!("  define: {{\n    {}: {},\n  }},", key, value),
                );
                added.push(format!("define.{}", key));
            }
        }
    }

    // plugins: append expressions not already present.
    for plugin in &spec.plugins {
        let Some(config) = config_object(&content) else {
            break;
        };
        match key_array(&content, &config, "plugins") {
            Some(plugins) => {
                if !content[plugins.clone()].contains(plugin.as_str()) {
                    insert_at_start(&mut content, &plugins, &format!("    {},", plugin));
                    added.push(format!("plugin {}", plugin));
                }
            }
            None => {
                insert_at_start(&mut content, &config, &format!("  plugins: [{}],", plugin));
                added.push(format!("plugin {}", plugin));
            }
        }
    }

    // server fields.
    if let Some(server) = &spec.server {
        let mut fields = Vec::new();
        if let Some(port) = server.port {
            fields.push(("port", port.to_string()));
        }
        if let Some(host) = &server.host {
            fields.push(("host", format!("'{}'", host)));
        }
        for (key, value) in fields {
            let Some(config) = config_object(&content) else {
                break;
            };
            match key_object(&content, &config, "server") {
                Some(range) => {
                    if !key_present(&content, &range, key) {
                        insert_at_start(&mut content, &range, &format!("    {}: {},", key, value));
                        added.push(format!("server.{}", key));
                    }
                }
                None => {
                    insert_at_start(
                        &mut content,
                        &config,
                        &format!("  server: {{\n    {}: {},\n  }},", key, value),
                    );
                    added.push(format!("server.{}", key));
                }
            }
        }
    }

    // build.rollupOptions.input.
    if let Some(input) = &spec.input {
        let config = match config_object(&content) {
            Some(config) => config,
            None => {
                return HookupResult::error(path, kind, "config object vanished during patching")
            }
        };
        match key_object(&content, &config, "build") {
            None => {
                insert_at_start(
                    &mut content,
                    &config,
                    &format!(
                        "  build: {{\n    rollupOptions: {{\n      input: {},\n    }},\n  }},",
                        render_input(input)
                    ),
                );
                added.push("build.rollupOptions.input".to_string());
            }
            Some(build) => match key_object(&content, &build, "rollupOptions") {
                None => {
                    insert_at_start(
                        &mut content,
                        &build,
                        &format!(
                            "    rollupOptions: {{\n      input: {},\n    }},",
                            render_input(input)
                        ),
                    );
                    added.push("build.rollupOptions.input".to_string());
                }
                Some(rollup) => {
                    if !key_present(&content, &rollup, "input") {
                        insert_at_start(
                            &mut content,
                            &rollup,
                            &format!("      input: {},", render_input(input)),
                        );
                        added.push("build.rollupOptions.input".to_string());
                    } else if let ViteInput::Entries(entries) = input {
                        // Merge missing entry keys into an existing input
                        // object; a string input is preserved as-is. Ranges
                        // are recomputed per insertion since edits shift
                        // offsets.
                        for (key, value) in entries {
                            let existing = config_object(&content)
                                .and_then(|c| key_object(&content, &c, "build"))
                                .and_then(|b| key_object(&content, &b, "rollupOptions"))
                                .and_then(|r| key_object(&content, &r, "input"));
                            let Some(existing) = existing else {
                                break;
                            };
                            if !key_present(&content, &existing, key) {
                                insert_at_start(
                                    &mut content,
                                    &existing,
                                    &format!("        {}: '{}',", key, value),
                                );
                                added.push(format!("input.{}", key));
                            }
                        }
                    }
                }
            },
        }
    }

    if content == original {
        return HookupResult::skipped(path, kind, "all config keys already present");
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

    const VITE_TS: &str = r#"import { defineConfig } from 'vite';

export default defineConfig({
  plugins: [
    svelte(),
  ],
  server: {
    port: 5173,
  },
});
"#;

    fn apply_to(name: &str, content: &str, spec: &ViteHookup) -> (String, HookupResult) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        fs::write(&path, content).unwrap();
        let mut ctx = HookupContext::new(dir.path());
        let result = apply(&path, spec, &mut ctx);
        (fs::read_to_string(&path).unwrap(), result)
    }

    #[test]
    fn test_define_created_and_merged() {
        let spec = ViteHookup::default().define_value("__LOOM_GENERATION__", "true");
        let (after, result) = apply_to("vite.config.ts", VITE_TS, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Applied);
        assert!(after.contains("define: {"));
        assert!(after.contains("__LOOM_GENERATION__: true,"));

        // Existing keys are preserved when merging further values.
        let spec2 = ViteHookup::default()
            .define_value("__LOOM_GENERATION__", "false")
            .define_value("__APP__", "'o19'");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vite.config.ts");
        fs::write(&path, &after).unwrap();
        let mut ctx = HookupContext::new(dir.path());
        apply(&path, &spec2, &mut ctx);
        let merged = fs::read_to_string(&path).unwrap();
        assert!(merged.contains("__LOOM_GENERATION__: true,"));
        assert!(!merged.contains("__LOOM_GENERATION__: false"));
        assert!(merged.contains("__APP__: 'o19',"));
    }

    #[test]
    fn test_plugin_appended_once() {
        let spec = ViteHookup::default().plugin("loomBindings()");
        let (first, _) = apply_to("vite.config.ts", VITE_TS, &spec);
        assert!(first.contains("loomBindings(),"));
        assert!(first.contains("svelte(),"));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vite.config.ts");
        fs::write(&path, &first).unwrap();
        let mut ctx = HookupContext::new(dir.path());
        let result = apply(&path, &spec, &mut ctx);
        assert_eq!(result.status, super::super::HookupStatus::Skipped);
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn test_server_fields_respect_existing() {
        let spec = ViteHookup::default().server(ViteServer {
            port: Some(1420),
            host: Some("0.0.0.0".into()),
        });
        let (after, _) = apply_to("vite.config.ts", VITE_TS, &spec);
        // Existing port wins; host is added.
        assert!(after.contains("port: 5173,"));
        assert!(!after.contains("port: 1420"));
        assert!(after.contains("host: '0.0.0.0',"));
    }

    #[test]
    fn test_rollup_input_created_through_missing_levels() {
        let spec = ViteHookup::default().input_entries(&[("main", "index.html")]);
        let (after, _) = apply_to("vite.config.ts", VITE_TS, &spec);
        assert!(after.contains("build: {"));
        assert!(after.contains("rollupOptions: {"));
        assert!(after.contains("input: { main: 'index.html' }"));
    }

    #[test]
    fn test_plain_object_export_tolerated() {
        let base = "export default {\n  plugins: [],\n};\n";
        let spec = ViteHookup::default().plugin("tauri()");
        let (after, result) = apply_to("vite.config.js", base, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Applied);
        assert!(after.contains("tauri(),"));
    }

    #[test]
    fn test_config_object_missing_is_error() {
        let base = "console.log('not a config');\n";
        let spec = ViteHookup::default().plugin("x()");
        let (_, result) = apply_to("vite.config.ts", base, &spec);
        assert_eq!(result.status, super::super::HookupStatus::Error);
    }
}
