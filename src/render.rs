//! Template renderer - minimal EJS-dialect expansion
//!
//! The dialect is deliberately small: `<%= expr %>` substitutes with
//! language-aware escaping, `<%- expr %>` substitutes raw. Expressions are
//! dotted paths into the merged data record with an optional `| filter`
//! chain, evaluated by a safe mini-evaluator over declared identifiers; no
//! general templating framework is involved, so escaping stays explicit.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::{LoomError, Result};
use crate::marker::MarkerLanguage;

/// Convert to snake_case. Handles camelCase, PascalCase, kebab-case.
pub fn snake_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 4);
    let mut prev_lower = false;
    for ch in value.chars() {
        if ch == '-' || ch == ' ' || ch == '_' {
            if !out.ends_with('_') && !out.is_empty() {
                out.push('_');
            }
            prev_lower = false;
        } else if ch.is_uppercase() {
            if prev_lower && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(ch.to_lowercase());
            prev_lower = false;
        } else {
            out.push(ch);
            prev_lower = ch.is_lowercase() || ch.is_ascii_digit();
        }
    }
    out
}

/// Convert to camelCase.
pub fn camel_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut upper_next = false;
    for (i, ch) in value.chars().enumerate() {
        if ch == '_' || ch == '-' || ch == ' ' {
            upper_next = !out.is_empty();
        } else if upper_next {
            out.extend(ch.to_uppercase());
            upper_next = false;
        } else if i == 0 {
            out.extend(ch.to_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// Convert to PascalCase.
pub fn pascal_case(value: &str) -> String {
    let camel = camel_case(value);
    let mut chars = camel.chars();
    match chars.next() {
        None => String::new(),
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
    }
}

/// Convert to kebab-case.
pub fn kebab_case(value: &str) -> String {
    snake_case(value).replace('_', "-")
}

/// Convert to SCREAMING_SNAKE_CASE.
pub fn screaming_snake_case(value: &str) -> String {
    snake_case(value).to_uppercase()
}

/// TypeScript surface types to Rust types, for `map_types` pipelines.
pub fn rust_type_map() -> HashMap<String, String> {
    HashMap::from(
        [
            ("string", "String"),
            ("number", "f64"),
            ("boolean", "bool"),
            ("bigint", "i64"),
            ("void", "()"),
            ("Uint8Array", "Vec<u8>"),
        ]
        .map(|(k, v)| (k.to_string(), v.to_string())),
    )
}

/// TypeScript surface types to Kotlin types.
pub fn kotlin_type_map() -> HashMap<String, String> {
    HashMap::from(
        [
            ("string", "String"),
            ("number", "Double"),
            ("boolean", "Boolean"),
            ("bigint", "Long"),
            ("void", "Unit"),
            ("Uint8Array", "ByteArray"),
        ]
        .map(|(k, v)| (k.to_string(), v.to_string())),
    )
}

fn xml_escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(ch),
        }
    }
    out
}

fn apply_filter(template: &str, value: String, filter: &str) -> Result<String> {
    match filter {
        "snake" => Ok(snake_case(&value)),
        "camel" => Ok(camel_case(&value)),
        "pascal" => Ok(pascal_case(&value)),
        "kebab" => Ok(kebab_case(&value)),
        "screaming" => Ok(screaming_snake_case(&value)),
        "upper" => Ok(value.to_uppercase()),
        "lower" => Ok(value.to_lowercase()),
        _ => Err(LoomError::Render {
            template: template.to_string(),
            message: format!("unknown filter '{}'", filter),
        }),
    }
}

fn value_to_string(template: &str, expr: &str, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(LoomError::Render {
            template: template.to_string(),
            message: format!(
                "expression '{}' resolved to a non-scalar value ({})",
                expr,
                match other {
                    Value::Array(_) => "array",
                    _ => "object",
                }
            ),
        }),
    }
}

fn eval_expr(template: &str, expr: &str, data: &Value) -> Result<String> {
    let mut parts = expr.split('|').map(str::trim);
    let path = parts.next().unwrap_or_default();
    if path.is_empty() {
        return Err(LoomError::Render {
            template: template.to_string(),
            message: "empty expression".to_string(),
        });
    }

    let mut current = data;
    for segment in path.split('.').map(str::trim) {
        current = current.get(segment).ok_or_else(|| LoomError::Render {
            template: template.to_string(),
            message: format!("unknown key '{}' in expression '{}'", segment, expr),
        })?;
    }

    let mut rendered = value_to_string(template, expr, current)?;
    for filter in parts {
        rendered = apply_filter(template, rendered, filter)?;
    }
    Ok(rendered)
}

/// Render a template source against a merged data record.
///
/// `language` selects the escaping applied by `<%= %>`: XML outputs escape
/// entities, everything else is the identity. `<%- %>` is always raw.
pub fn render_template(
    name: &str,
    source: &str,
    data: &Value,
    language: Option<MarkerLanguage>,
) -> Result<String> {
    let mut out = String::with_capacity(source.len());
    let mut rest = source;

    while let Some(open) = rest.find("<%") {
        out.push_str(&rest[..open]);
        let after = &rest[open + 2..];
        let (raw, body_start) = match after.chars().next() {
            Some('-') => (true, 1),
            Some('=') => (false, 1),
            _ => {
                return Err(LoomError::Render {
                    template: name.to_string(),
                    message: "expected '<%=' or '<%-'".to_string(),
                })
            }
        };
        let body = &after[body_start..];
        let close = body.find("%>").ok_or_else(|| LoomError::Render {
            template: name.to_string(),
            message: "unterminated '<%' tag".to_string(),
        })?;
        let expr = body[..close].trim();

        let value = eval_expr(name, expr, data)?;
        if raw {
            out.push_str(&value);
        } else {
            match language {
                Some(MarkerLanguage::Xml) => out.push_str(&xml_escape(&value)),
                _ => out.push_str(&value),
            }
        }
        rest = &body[close + 2..];
    }
    out.push_str(rest);
    Ok(out)
}

/// Template lookup with workspace-overrides-first precedence.
///
/// Built-ins live under the machinery bobbin; a workspace may mirror the
/// same relative layout under `loom/templates/` to override any of them.
#[derive(Debug, Clone)]
pub struct TemplateSource {
    pub builtin_dir: PathBuf,
    pub override_dir: Option<PathBuf>,
}

impl TemplateSource {
    pub fn new(builtin_dir: impl Into<PathBuf>, override_dir: Option<PathBuf>) -> Self {
        Self {
            builtin_dir: builtin_dir.into(),
            override_dir,
        }
    }

    /// Locate a template by relative path, workspace override first.
    pub fn locate(&self, relative: &Path) -> Result<PathBuf> {
        if let Some(dir) = &self.override_dir {
            let candidate = dir.join(relative);
            if candidate.exists() {
                return Ok(candidate);
            }
        }
        let builtin = self.builtin_dir.join(relative);
        if builtin.exists() {
            return Ok(builtin);
        }
        Err(LoomError::Render {
            template: relative.display().to_string(),
            message: "template not found in workspace overrides or built-ins".to_string(),
        })
    }

    /// Read a template's source text.
    pub async fn load(&self, relative: &Path) -> Result<String> {
        let path = self.locate(relative)?;
        tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| LoomError::io(&path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_case_helpers() {
        assert_eq!(snake_case("HelloWorld"), "hello_world");
        assert_eq!(snake_case("bookmarkAdd"), "bookmark_add");
        assert_eq!(snake_case("foreground-service"), "foreground_service");
        assert_eq!(camel_case("hello_world"), "helloWorld");
        assert_eq!(camel_case("bookmark_add"), "bookmarkAdd");
        assert_eq!(pascal_case("hello_world"), "HelloWorld");
        assert_eq!(kebab_case("HelloWorld"), "hello-world");
        assert_eq!(screaming_snake_case("helloWorld"), "HELLO_WORLD");
    }

    #[test]
    fn test_render_substitutes_paths() {
        let data = json!({ "coreName": "foundframe", "package": { "name": "o19-core" } });
        let out = render_template(
            "t",
            "pub mod <%= coreName %>; // from <%= package.name %>\n",
            &data,
            Some(MarkerLanguage::Rust),
        )
        .unwrap();
        assert_eq!(out, "pub mod foundframe; // from o19-core\n");
    }

    #[test]
    fn test_render_filters() {
        let data = json!({ "name": "BookmarkMgmt" });
        let out = render_template("t", "<%= name | snake %> <%= name | kebab %>", &data, None).unwrap();
        assert_eq!(out, "bookmark_mgmt bookmark-mgmt");
    }

    #[test]
    fn test_render_unknown_key_fails() {
        let data = json!({ "a": 1 });
        let err = render_template("t", "<%= missing %>", &data, None).unwrap_err();
        assert!(err.to_string().contains("unknown key"));
    }

    #[test]
    fn test_render_xml_escaping() {
        let data = json!({ "value": "a<b&c" });
        let escaped =
            render_template("t", "<%= value %>", &data, Some(MarkerLanguage::Xml)).unwrap();
        assert_eq!(escaped, "a&lt;b&amp;c");
        let raw = render_template("t", "<%- value %>", &data, Some(MarkerLanguage::Xml)).unwrap();
        assert_eq!(raw, "a<b&c");
    }

    #[test]
    fn test_render_unterminated_tag_fails() {
        let data = json!({});
        assert!(render_template("t", "<%= broken", &data, None).is_err());
    }

    #[test]
    fn test_render_numbers_and_null() {
        let data = json!({ "port": 1420, "nothing": null });
        let out = render_template("t", "port: <%= port %><%= nothing %>", &data, None).unwrap();
        assert_eq!(out, "port: 1420");
    }

    #[test]
    fn test_template_source_override_precedence() {
        let dir = tempfile::tempdir().unwrap();
        let builtin = dir.path().join("machinery");
        let overrides = dir.path().join("loom-templates");
        std::fs::create_dir_all(builtin.join("tauri")).unwrap();
        std::fs::create_dir_all(overrides.join("tauri")).unwrap();
        std::fs::write(builtin.join("tauri/commands.rs.ejs"), "builtin").unwrap();
        std::fs::write(overrides.join("tauri/commands.rs.ejs"), "override").unwrap();

        let source = TemplateSource::new(&builtin, Some(overrides.clone()));
        let located = source.locate(Path::new("tauri/commands.rs.ejs")).unwrap();
        assert!(located.starts_with(&overrides));

        let missing = source.locate(Path::new("tauri/absent.ejs"));
        assert!(missing.is_err());
    }
}
