//! Kotlin source hookups
//!
//! Adds imports after the package declaration (or the existing import
//! group), and modifies named classes: fields at the top of the class body,
//! new methods deduplicated by name, and statement groups prepended or
//! appended inside existing method bodies, deduplicated by substring
//! containment.

use std::path::Path;

use regex::Regex;

use crate::marker::{
    ensure_block, find_block, is_within_marked_span, marked_spans, marker_ident, BlockMarker,
    InsertAnchor, MarkerLanguage,
};

use super::{read_target, write_target, HookupContext, HookupKind, HookupResult};

/// Where a statement group lands inside a method body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementPosition {
    Prepend,
    Append,
}

/// A statement group patched into an existing method body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KotlinMethodPatch {
    pub method: String,
    pub statements: Vec<String>,
    pub position: StatementPosition,
}

/// A whole method added to a class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KotlinMethod {
    pub name: String,
    pub source: String,
}

/// Modifications to one named class.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KotlinClassMod {
    pub class_name: String,
    pub fields: Vec<String>,
    pub methods: Vec<KotlinMethod>,
    pub method_patches: Vec<KotlinMethodPatch>,
}

impl KotlinClassMod {
    pub fn new(class_name: &str) -> Self {
        Self {
            class_name: class_name.to_string(),
            ..Default::default()
        }
    }

    pub fn field(mut self, declaration: &str) -> Self {
        self.fields.push(declaration.to_string());
        self
    }

    pub fn method(mut self, name: &str, source: &str) -> Self {
        self.methods.push(KotlinMethod {
            name: name.to_string(),
            source: source.to_string(),
        });
        self
    }

    pub fn patch_method(
        mut self,
        method: &str,
        position: StatementPosition,
        statements: &[&str],
    ) -> Self {
        self.method_patches.push(KotlinMethodPatch {
            method: method.to_string(),
            statements: statements.iter().map(|s| s.to_string()).collect(),
            position,
        });
        self
    }
}

/// Declarative Kotlin patch.
#[derive(Debug, Clone, Default)]
pub struct KotlinHookup {
    pub imports: Vec<String>,
    pub classes: Vec<KotlinClassMod>,
}

impl KotlinHookup {
    pub fn import(mut self, import: &str) -> Self {
        self.imports.push(import.to_string());
        self
    }

    pub fn class_mod(mut self, class: KotlinClassMod) -> Self {
        self.classes.push(class);
        self
    }

    pub(super) fn validate(&self) -> Result<(), String> {
        if self.imports.is_empty() && self.classes.is_empty() {
            return Err("kotlin hookup declares nothing to add".to_string());
        }
        for class in &self.classes {
            if class.class_name.is_empty() {
                return Err("kotlin class modification needs a class name".to_string());
            }
            for patch in &class.method_patches {
                if patch.method.is_empty() || patch.statements.is_empty() {
                    return Err("kotlin method patch needs a method and statements".to_string());
                }
            }
        }
        Ok(())
    }
}

/// Balanced `{..}` end for Kotlin source, skipping strings and line comments.
fn brace_end(content: &str, open: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    let mut in_str = false;
    let mut in_comment = false;
    while i < bytes.len() {
        let b = bytes[i];
        if in_comment {
            if b == b'\n' {
                in_comment = false;
            }
        } else if in_str {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == b'"' {
                in_str = false;
            }
        } else {
            match b {
                b'"' => in_str = true,
                b'/' if i + 1 < bytes.len() && bytes[i + 1] == b'/' => in_comment = true,
                b'{' => depth += 1,
                b'}' => {
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

/// Byte range of a class body (between its braces, exclusive).
fn class_body(content: &str, class_name: &str) -> Option<std::ops::Range<usize>> {
    let re = Regex::new(&format!(
        r"(?m)^\s*(?:\w+\s+)*class\s+{}\b[^{{]*\{{",
        regex::escape(class_name)
    ))
    .ok()?;
    let m = re.find(content)?;
    let open = m.end() - 1;
    let close = brace_end(content, open)?;
    Some(open + 1..close)
}

/// Byte range of a method body inside a class body range.
fn method_body(
    content: &str,
    class_range: &std::ops::Range<usize>,
    method: &str,
) -> Option<std::ops::Range<usize>> {
    let re = Regex::new(&format!(r"fun\s+{}\s*\(", regex::escape(method))).ok()?;
    let body = &content[class_range.clone()];
    let m = re.find(body)?;

    // Walk past the parameter list so default values don't confuse the
    // expression-body check below.
    let mut depth = 1usize;
    let mut params_end = None;
    for (i, ch) in body[m.end()..].char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 {
                    params_end = Some(m.end() + i + 1);
                    break;
                }
            }
            _ => {}
        }
    }
    let params_end = params_end?;

    let open_rel = body[params_end..].find('{')? + params_end;
    // Expression-bodied functions have no block to patch.
    if body[params_end..open_rel].contains('=') {
        return None;
    }
    let open = class_range.start + open_rel;
    let close = brace_end(content, open)?;
    Some(open + 1..close)
}

/// Splice a rendered marked block into the buffer at `pos`.
fn splice_block(content: &str, marker: &BlockMarker, body: &str, pos: usize) -> String {
    let mut block = String::new();
    block.push_str(&marker.start_line());
    block.push('\n');
    if !body.is_empty() {
        block.push_str(body);
        if !body.ends_with('\n') {
            block.push('\n');
        }
    }
    block.push_str(&marker.end_line());
    block.push('\n');

    let mut out = String::with_capacity(content.len() + block.len() + 1);
    out.push_str(&content[..pos]);
    if !out.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(&block);
    out.push_str(&content[pos..]);
    out
}

pub(super) fn apply(path: &Path, spec: &KotlinHookup, ctx: &mut HookupContext) -> HookupResult {
    let kind = HookupKind::Kotlin;
    let original = match read_target(path, kind) {
        Ok(content) => content,
        Err(result) => return result,
    };

    let mut content = original.clone();
    let mut added = Vec::new();
    let mut errors = Vec::new();

    // Imports land after the package declaration or the import group.
    if !spec.imports.is_empty() {
        let marker = BlockMarker::new("KOTLIN", "IMPORTS", MarkerLanguage::Kotlin);
        let missing: Vec<String> = spec
            .imports
            .iter()
            .map(|i| {
                let trimmed = i.trim();
                if trimmed.starts_with("import ") {
                    trimmed.to_string()
                } else {
                    format!("import {}", trimmed)
                }
            })
            .filter(|line| !content.contains(line.as_str()))
            .collect();

        let mut lines: Vec<String> = match find_block(&content, &marker) {
            Some(span) => content[span.inner_start..span.inner_end]
                .lines()
                .map(|l| l.to_string())
                .collect(),
            None => Vec::new(),
        };
        lines.extend(missing);

        if !lines.is_empty() {
            let import_re = Regex::new(r"(?m)^import .*$").unwrap();
            let anchor = import_re
                .find_iter(&content)
                .last()
                .map(|m| m.as_str().to_string())
                .or_else(|| {
                    let package_re = Regex::new(r"(?m)^package .*$").unwrap();
                    package_re.find(&content).map(|m| m.as_str().to_string())
                });
            let anchor = match anchor {
                Some(text) => InsertAnchor::After(text),
                None => InsertAnchor::End,
            };
            let edit = ensure_block(&content, &marker, &lines.join("\n"), &anchor);
            if edit.modified {
                added.push("imports".to_string());
            }
            content = edit.content;
            ctx.record_block(path, "KOTLIN", "IMPORTS");
        }
    }

    for class in &spec.classes {
        // Fields at the top of the class body.
        if !class.fields.is_empty() {
            let identifier = format!("FIELDS_{}", marker_ident(&class.class_name));
            let marker = BlockMarker::new("KOTLIN", &identifier, MarkerLanguage::Kotlin);
            let body = class
                .fields
                .iter()
                .map(|f| format!("    {}", f))
                .collect::<Vec<_>>()
                .join("\n");
            if find_block(&content, &marker).is_some() {
                let edit = ensure_block(&content, &marker, &body, &InsertAnchor::End);
                if edit.modified {
                    added.push(format!("fields of {}", class.class_name));
                }
                content = edit.content;
            } else {
                match class_body(&content, &class.class_name) {
                    Some(range) => {
                        content = splice_block(&content, &marker, &body, range.start);
                        added.push(format!("fields of {}", class.class_name));
                    }
                    None => {
                        errors.push(format!("class '{}' not found", class.class_name));
                        continue;
                    }
                }
            }
            ctx.record_block(path, "KOTLIN", &identifier);
        }

        // New methods, deduplicated by name.
        for method in &class.methods {
            let Some(range) = class_body(&content, &class.class_name) else {
                errors.push(format!("class '{}' not found", class.class_name));
                continue;
            };
            let identifier = format!(
                "METHOD_{}_{}",
                marker_ident(&class.class_name),
                marker_ident(&method.name)
            );
            let marker = BlockMarker::new("KOTLIN", &identifier, MarkerLanguage::Kotlin);

            if find_block(&content, &marker).is_some() {
                let edit = ensure_block(&content, &marker, &method.source, &InsertAnchor::End);
                if edit.modified {
                    added.push(format!("{}.{}", class.class_name, method.name));
                }
                content = edit.content;
                ctx.record_block(path, "KOTLIN", &identifier);
                continue;
            }

            // A manual method with the same name suppresses the managed one.
            let fun_re =
                Regex::new(&format!(r"fun\s+{}\s*\(", regex::escape(&method.name))).unwrap();
            let spans = marked_spans(&content);
            let manual = fun_re
                .find_iter(&content[range.clone()])
                .any(|m| !is_within_marked_span(&spans, range.start + m.start()));
            if manual {
                continue;
            }

            content = splice_block(&content, &marker, &method.source, range.end);
            added.push(format!("{}.{}", class.class_name, method.name));
            ctx.record_block(path, "KOTLIN", &identifier);
        }

        // Statement groups inside existing method bodies.
        for patch in &class.method_patches {
            let Some(class_range) = class_body(&content, &class.class_name) else {
                errors.push(format!("class '{}' not found", class.class_name));
                continue;
            };
            let Some(body_range) = method_body(&content, &class_range, &patch.method) else {
                errors.push(format!(
                    "method '{}' not found in class '{}'",
                    patch.method, class.class_name
                ));
                continue;
            };

            let joined = patch.statements.join("\n");
            // Dedup by substring containment of the joined group.
            if content[body_range.clone()].contains(&joined) {
                continue;
            }

            let pos_tag = match patch.position {
                StatementPosition::Prepend => "PRE",
                StatementPosition::Append => "POST",
            };
            let identifier = format!(
                "STMT_{}_{}_{}",
                marker_ident(&class.class_name),
                marker_ident(&patch.method),
                pos_tag
            );
            let marker = BlockMarker::new("KOTLIN", &identifier, MarkerLanguage::Kotlin);
            let at = match patch.position {
                StatementPosition::Prepend => body_range.start,
                StatementPosition::Append => body_range.end,
            };
            content = splice_block(&content, &marker, &joined, at);
            added.push(format!("{}.{} statements", class.class_name, patch.method));
            ctx.record_block(path, "KOTLIN", &identifier);
        }
    }

    if !errors.is_empty() {
        return HookupResult::error(path, kind, errors.join("; "));
    }
    if content == original {
        return HookupResult::skipped(path, kind, "all modifications already present");
    }
    if let Err(result) = write_target(path, kind, &content, ctx.dry_run) {
        return result;
    }
    HookupResult::applied(path, kind, format!("added {}", added.join(", ")))
}
