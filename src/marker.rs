//! Marker codec - language-aware delimited-block read/write over text buffers
//!
//! Every generated region of a foreign file is bracketed by a start/end
//! marker pair whose inner tag is `SPIRE-LOOM:<SCOPE>:<IDENTIFIER>`. The
//! comment syntax wrapping the tag is chosen per language. All operations
//! are pure functions over string buffers; the caller owns file I/O.
//!
//! Blocks are line-oriented: markers occupy whole lines and a buffer that
//! lacks a final newline gains one on first insert.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Comment syntax families for marker emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MarkerLanguage {
    /// Block comments: `/* TAG */`
    Rust,
    /// Line comments, newline terminated: `// TAG`
    Kotlin,
    /// Line comments, newline terminated: `// TAG`
    Gradle,
    /// Line comments, newline terminated: `// TAG`
    TypeScript,
    /// HTML-style comments: `<!-- TAG -->`
    Xml,
    /// Hash comments: `# TAG`
    Toml,
}

impl MarkerLanguage {
    fn wrap(&self, tag: &str) -> String {
        match self {
            MarkerLanguage::Rust => format!("/* {} */", tag),
            MarkerLanguage::Kotlin | MarkerLanguage::Gradle | MarkerLanguage::TypeScript => {
                format!("// {}", tag)
            }
            MarkerLanguage::Xml => format!("<!-- {} -->", tag),
            MarkerLanguage::Toml => format!("# {}", tag),
        }
    }
}

/// Normalize a free-form scope or identifier into marker charset `[A-Z0-9_]`.
pub fn marker_ident(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push('_');
        }
    }
    out
}

/// A marked block identity: scope + identifier + comment language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMarker {
    scope: String,
    identifier: String,
    language: MarkerLanguage,
}

impl BlockMarker {
    pub fn new(scope: &str, identifier: &str, language: MarkerLanguage) -> Self {
        Self {
            scope: marker_ident(scope),
            identifier: marker_ident(identifier),
            language,
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn language(&self) -> MarkerLanguage {
        self.language
    }

    /// Inner tag of the start marker, e.g. `SPIRE-LOOM:XML:CAMERA_PERM`.
    pub fn start_tag(&self) -> String {
        format!("SPIRE-LOOM:{}:{}", self.scope, self.identifier)
    }

    /// Inner tag of the end marker (the `/`-prefixed twin).
    pub fn end_tag(&self) -> String {
        format!("/SPIRE-LOOM:{}:{}", self.scope, self.identifier)
    }

    /// Full start marker line content (without trailing newline).
    pub fn start_line(&self) -> String {
        self.language.wrap(&self.start_tag())
    }

    /// Full end marker line content (without trailing newline).
    pub fn end_line(&self) -> String {
        self.language.wrap(&self.end_tag())
    }
}

/// Byte spans of a located block.
///
/// `start..end` covers the marker lines inclusively (including the end
/// marker's trailing newline when present). `inner_start..inner_end` covers
/// the lines between the markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockSpan {
    pub start: usize,
    pub end: usize,
    pub inner_start: usize,
    pub inner_end: usize,
}

/// Where to place a block on insert.
#[derive(Debug, Clone, Default)]
pub enum InsertAnchor {
    /// Append after the last line of the buffer.
    #[default]
    End,
    /// Insert on the line following the first line containing the substring.
    After(String),
    /// Insert on the line preceding the first line containing the substring.
    Before(String),
}

/// Result of a buffer operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEdit {
    pub modified: bool,
    pub content: String,
}

impl BlockEdit {
    fn unchanged(content: &str) -> Self {
        Self {
            modified: false,
            content: content.to_string(),
        }
    }
}

/// Find `line` occupying a whole line of `content`, starting at `from`.
///
/// Line-exact matching matters for line-comment markers: an identifier
/// that is a strict prefix of another must not match the longer marker.
fn find_marker_line(content: &str, line: &str, from: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut search = from;
    while let Some(rel) = content[search..].find(line) {
        let pos = search + rel;
        let end = pos + line.len();
        let at_line_start = pos == 0 || bytes[pos - 1] == b'\n';
        let at_line_end = end == content.len() || bytes[end] == b'\n';
        if at_line_start && at_line_end {
            return Some(pos);
        }
        search = pos + 1;
    }
    None
}

/// Locate a block in `content`.
///
/// A start marker without a matching end marker after it is treated as not
/// found; the buffer is never modified through a truncated pair.
pub fn find_block(content: &str, marker: &BlockMarker) -> Option<BlockSpan> {
    let start_line = marker.start_line();
    let end_line = marker.end_line();

    let start = find_marker_line(content, &start_line, 0)?;
    let after_start = start + start_line.len();
    let end_pos = find_marker_line(content, &end_line, after_start)?;

    // Inner content begins after the start marker's newline.
    let inner_start = if after_start < end_pos {
        after_start + 1
    } else {
        end_pos
    };
    let inner_end = end_pos.min(content.len());

    // Consume the end marker line including its trailing newline.
    let after_end = end_pos + end_line.len();
    let end = if after_end < content.len() && content.as_bytes()[after_end] == b'\n' {
        after_end + 1
    } else {
        after_end
    };

    Some(BlockSpan {
        start,
        end,
        inner_start,
        inner_end,
    })
}

fn render_block(marker: &BlockMarker, body: &str) -> String {
    let mut out = String::new();
    out.push_str(&marker.start_line());
    out.push('\n');
    if !body.is_empty() {
        out.push_str(body);
        if !body.ends_with('\n') {
            out.push('\n');
        }
    }
    out.push_str(&marker.end_line());
    out.push('\n');
    out
}

/// Byte offset of the start of the line containing `pos`.
fn line_start(content: &str, pos: usize) -> usize {
    content[..pos].rfind('\n').map(|i| i + 1).unwrap_or(0)
}

/// Public form of the line-start computation, for handlers that splice
/// blocks at positions the anchor enum cannot express.
pub fn line_start_of(content: &str, pos: usize) -> usize {
    line_start(content, pos)
}

/// Byte offset just past the newline ending the line containing `pos`.
fn line_end(content: &str, pos: usize) -> usize {
    content[pos..]
        .find('\n')
        .map(|i| pos + i + 1)
        .unwrap_or(content.len())
}

/// Insert a block if absent. Inserting an already-present block is a no-op.
///
/// An anchor substring that does not occur in the buffer degrades to append
/// at end.
pub fn insert_block(
    content: &str,
    marker: &BlockMarker,
    body: &str,
    anchor: &InsertAnchor,
) -> BlockEdit {
    if find_block(content, marker).is_some() {
        return BlockEdit::unchanged(content);
    }

    let block = render_block(marker, body);
    let insert_at = match anchor {
        InsertAnchor::End => None,
        InsertAnchor::After(needle) => content.find(needle).map(|pos| line_end(content, pos)),
        InsertAnchor::Before(needle) => content.find(needle).map(|pos| line_start(content, pos)),
    };

    let mut out = String::with_capacity(content.len() + block.len() + 1);
    match insert_at {
        Some(at) => {
            out.push_str(&content[..at]);
            // An anchor on the buffer's unterminated last line needs a break
            // before the block.
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&block);
            out.push_str(&content[at..]);
        }
        None => {
            out.push_str(content);
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&block);
        }
    }

    BlockEdit {
        modified: true,
        content: out,
    }
}

/// Replace the inner content of a present block, preserving the markers.
/// Absent block is a no-op.
pub fn replace_block(content: &str, marker: &BlockMarker, body: &str) -> BlockEdit {
    let Some(span) = find_block(content, marker) else {
        return BlockEdit::unchanged(content);
    };

    let mut new_inner = String::new();
    if !body.is_empty() {
        new_inner.push_str(body);
        if !body.ends_with('\n') {
            new_inner.push('\n');
        }
    }

    if &content[span.inner_start..span.inner_end] == new_inner {
        return BlockEdit::unchanged(content);
    }

    let mut out = String::with_capacity(content.len());
    out.push_str(&content[..span.inner_start]);
    out.push_str(&new_inner);
    out.push_str(&content[span.inner_end..]);

    BlockEdit {
        modified: true,
        content: out,
    }
}

/// Delete an entire block including its markers. Absent block is a no-op.
pub fn remove_block(content: &str, marker: &BlockMarker) -> BlockEdit {
    let Some(span) = find_block(content, marker) else {
        return BlockEdit::unchanged(content);
    };

    let line_from = line_start(content, span.start);
    let mut out = String::with_capacity(content.len());
    out.push_str(&content[..line_from]);
    out.push_str(&content[span.end..]);

    BlockEdit {
        modified: true,
        content: out,
    }
}

/// Idempotent write: replace a present block's inner content, else insert.
pub fn ensure_block(
    content: &str,
    marker: &BlockMarker,
    body: &str,
    anchor: &InsertAnchor,
) -> BlockEdit {
    if find_block(content, marker).is_some() {
        replace_block(content, marker, body)
    } else {
        insert_block(content, marker, body, anchor)
    }
}

/// A block identity discovered by scanning, comment syntax agnostic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef {
    pub scope: String,
    pub identifier: String,
}

impl BlockRef {
    pub fn new(scope: &str, identifier: &str) -> Self {
        Self {
            scope: marker_ident(scope),
            identifier: marker_ident(identifier),
        }
    }
}

/// Byte ranges covered by complete marker pairs, comment syntax agnostic.
///
/// Used to decide whether a piece of content is managed (inside a block) or
/// manually authored (outside every block).
pub fn marked_spans(content: &str) -> Vec<std::ops::Range<usize>> {
    let tag_re = Regex::new(r"(/?)SPIRE-LOOM:([A-Z0-9_]+):([A-Z0-9_]+)").unwrap();

    let mut spans = Vec::new();
    let mut open: Vec<(BlockRef, usize)> = Vec::new();
    for cap in tag_re.captures_iter(content) {
        let whole = cap.get(0).unwrap();
        let closing = &cap[1] == "/";
        let block = BlockRef::new(&cap[2], &cap[3]);
        if closing {
            if let Some(idx) = open.iter().position(|(b, _)| *b == block) {
                let (_, start) = open.remove(idx);
                spans.push(start..whole.end());
            }
        } else {
            open.push((block, whole.start()));
        }
    }
    spans
}

/// Whether `pos` lies within any complete marked block.
pub fn is_within_marked_span(spans: &[std::ops::Range<usize>], pos: usize) -> bool {
    spans.iter().any(|r| r.contains(&pos))
}

/// Scan a buffer for complete marker pairs, in order of appearance.
///
/// Start tags whose end twin never appears are skipped with a warning; a
/// truncated pair must never be edited or garbage-collected.
pub fn scan_blocks(content: &str) -> Vec<BlockRef> {
    let tag_re = Regex::new(r"(/?)SPIRE-LOOM:([A-Z0-9_]+):([A-Z0-9_]+)").unwrap();

    let mut found = Vec::new();
    let mut open: Vec<BlockRef> = Vec::new();
    for cap in tag_re.captures_iter(content) {
        let closing = &cap[1] == "/";
        let block = BlockRef::new(&cap[2], &cap[3]);
        if closing {
            if let Some(idx) = open.iter().position(|b| *b == block) {
                open.remove(idx);
                if !found.contains(&block) {
                    found.push(block);
                }
            }
        } else {
            open.push(block);
        }
    }

    for orphan in open {
        tracing::warn!(
            scope = %orphan.scope,
            identifier = %orphan.identifier,
            "start marker without end twin; block ignored"
        );
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rust_marker(ident: &str) -> BlockMarker {
        BlockMarker::new("crate", ident, MarkerLanguage::Rust)
    }

    #[test]
    fn test_marker_ident_normalization() {
        assert_eq!(marker_ident("android.permission.CAMERA"), "ANDROID_PERMISSION_CAMERA");
        assert_eq!(marker_ident("my-plugin"), "MY_PLUGIN");
        assert_eq!(marker_ident("abc_123"), "ABC_123");
    }

    #[test]
    fn test_marker_lines_per_language() {
        let m = BlockMarker::new("xml", "perm", MarkerLanguage::Xml);
        assert_eq!(m.start_line(), "<!-- SPIRE-LOOM:XML:PERM -->");
        assert_eq!(m.end_line(), "<!-- /SPIRE-LOOM:XML:PERM -->");

        let m = BlockMarker::new("gradle", "deps", MarkerLanguage::Gradle);
        assert_eq!(m.start_line(), "// SPIRE-LOOM:GRADLE:DEPS");

        let m = BlockMarker::new("cargo", "deps", MarkerLanguage::Toml);
        assert_eq!(m.start_line(), "# SPIRE-LOOM:CARGO:DEPS");

        let m = rust_marker("mods");
        assert_eq!(m.start_line(), "/* SPIRE-LOOM:CRATE:MODS */");
    }

    #[test]
    fn test_insert_and_find() {
        let edit = insert_block("fn main() {}\n", &rust_marker("A"), "mod gen;", &InsertAnchor::End);
        assert!(edit.modified);
        assert!(edit.content.contains("/* SPIRE-LOOM:CRATE:A */\nmod gen;\n/* /SPIRE-LOOM:CRATE:A */\n"));

        let span = find_block(&edit.content, &rust_marker("A")).unwrap();
        assert_eq!(&edit.content[span.inner_start..span.inner_end], "mod gen;\n");
    }

    #[test]
    fn test_insert_is_idempotent() {
        let once = insert_block("x\n", &rust_marker("A"), "body", &InsertAnchor::End);
        let twice = insert_block(&once.content, &rust_marker("A"), "body", &InsertAnchor::End);
        assert!(!twice.modified);
        assert_eq!(once.content, twice.content);
    }

    #[test]
    fn test_insert_after_anchor() {
        let content = "line one\nline two\nline three\n";
        let edit = insert_block(content, &rust_marker("A"), "b", &InsertAnchor::After("line two".into()));
        assert!(edit.content.starts_with("line one\nline two\n/* SPIRE-LOOM:CRATE:A */"));
    }

    #[test]
    fn test_insert_before_anchor() {
        let content = "line one\nline two\n";
        let edit = insert_block(content, &rust_marker("A"), "b", &InsertAnchor::Before("line two".into()));
        assert!(edit.content.starts_with("line one\n/* SPIRE-LOOM:CRATE:A */"));
        assert!(edit.content.ends_with("line two\n"));
    }

    #[test]
    fn test_missing_anchor_appends_at_end() {
        let content = "only line\n";
        let edit = insert_block(content, &rust_marker("A"), "b", &InsertAnchor::After("nope".into()));
        assert!(edit.content.starts_with("only line\n/* SPIRE-LOOM:CRATE:A */"));
    }

    #[test]
    fn test_replace_preserves_markers() {
        let edit = insert_block("", &rust_marker("A"), "old", &InsertAnchor::End);
        let replaced = replace_block(&edit.content, &rust_marker("A"), "new body");
        assert!(replaced.modified);
        assert!(replaced.content.contains("/* SPIRE-LOOM:CRATE:A */\nnew body\n/* /SPIRE-LOOM:CRATE:A */\n"));
        assert!(!replaced.content.contains("old"));
    }

    #[test]
    fn test_replace_same_body_is_noop() {
        let edit = insert_block("", &rust_marker("A"), "same", &InsertAnchor::End);
        let replaced = replace_block(&edit.content, &rust_marker("A"), "same");
        assert!(!replaced.modified);
        assert_eq!(edit.content, replaced.content);
    }

    #[test]
    fn test_remove_round_trip() {
        let original = "fn main() {}\n";
        let inserted = ensure_block(original, &rust_marker("A"), "mod gen;", &InsertAnchor::End);
        let removed = remove_block(&inserted.content, &rust_marker("A"));
        assert_eq!(removed.content, original);
    }

    #[test]
    fn test_missing_end_marker_is_not_found() {
        let content = "/* SPIRE-LOOM:CRATE:A */\ndangling\n";
        assert!(find_block(content, &rust_marker("A")).is_none());

        let removed = remove_block(content, &rust_marker("A"));
        assert!(!removed.modified);
        assert_eq!(removed.content, content);
    }

    #[test]
    fn test_ensure_inserts_then_replaces() {
        let first = ensure_block("x\n", &rust_marker("A"), "v1", &InsertAnchor::End);
        assert!(first.modified);
        let second = ensure_block(&first.content, &rust_marker("A"), "v2", &InsertAnchor::End);
        assert!(second.modified);
        assert!(second.content.contains("v2"));
        assert!(!second.content.contains("v1"));
        let third = ensure_block(&second.content, &rust_marker("A"), "v2", &InsertAnchor::End);
        assert!(!third.modified);
        assert_eq!(second.content, third.content);
    }

    #[test]
    fn test_empty_body_block() {
        let edit = insert_block("", &rust_marker("A"), "", &InsertAnchor::End);
        assert_eq!(
            edit.content,
            "/* SPIRE-LOOM:CRATE:A */\n/* /SPIRE-LOOM:CRATE:A */\n"
        );
        let span = find_block(&edit.content, &rust_marker("A")).unwrap();
        assert_eq!(span.inner_start, span.inner_end);
    }

    #[test]
    fn test_prefixed_identifiers_do_not_collide() {
        let serde_json = BlockMarker::new("CARGO", "DEPENDENCIES_SERDE_JSON", MarkerLanguage::Toml);
        let serde = BlockMarker::new("CARGO", "DEPENDENCIES_SERDE", MarkerLanguage::Toml);

        let content = insert_block("", &serde_json, "serde_json = \"1\"", &InsertAnchor::End).content;
        // The shorter identifier is a strict prefix of the longer one; it
        // must not resolve to the longer block's markers.
        assert!(find_block(&content, &serde).is_none());

        let both = insert_block(&content, &serde, "serde = \"1\"", &InsertAnchor::End).content;
        let span = find_block(&both, &serde).unwrap();
        assert!(both[span.inner_start..span.inner_end].contains("serde = \"1\""));
        let span = find_block(&both, &serde_json).unwrap();
        assert!(both[span.inner_start..span.inner_end].contains("serde_json = \"1\""));
    }

    #[test]
    fn test_scan_blocks_pairs_only() {
        let mut content = String::from("# SPIRE-LOOM:CARGO:DANGLING\n");
        content.push_str("# SPIRE-LOOM:CARGO:DEPS\ntokio = \"1\"\n# /SPIRE-LOOM:CARGO:DEPS\n");
        content.push_str("<!-- SPIRE-LOOM:XML:PERM -->\n<!-- /SPIRE-LOOM:XML:PERM -->\n");

        let found = scan_blocks(&content);
        assert_eq!(
            found,
            vec![BlockRef::new("CARGO", "DEPS"), BlockRef::new("XML", "PERM")]
        );
    }
}
