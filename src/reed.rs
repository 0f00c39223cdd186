//! Reed - discovery and reflection
//!
//! The reed pulls raw material into the loom: Drizzle schema tables parsed
//! from the operator's schema module, WARP roots with canonical names, and
//! the Management set with its decorator metadata.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, info, instrument, warn};

use crate::decorators::Management;
use crate::error::{LoomError, Result};
use crate::warp::{Ring, RingId, Warp};

/// Column types the loom can weave bindings for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Text,
    Real,
    Blob,
    Boolean,
    Numeric,
}

impl ColumnType {
    fn from_drizzle(name: &str) -> Option<Self> {
        match name {
            "integer" | "int" => Some(ColumnType::Integer),
            "text" | "varchar" => Some(ColumnType::Text),
            "real" | "doublePrecision" => Some(ColumnType::Real),
            "blob" => Some(ColumnType::Blob),
            "boolean" => Some(ColumnType::Boolean),
            "numeric" => Some(ColumnType::Numeric),
            _ => None,
        }
    }
}

/// A foreign key derived from a column-level `references` descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKey {
    pub table: String,
    pub column: String,
}

/// One parsed schema column.
#[derive(Debug, Clone)]
pub struct SchemaColumn {
    pub name: String,
    pub property: String,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default_value: Option<String>,
    pub is_primary_key: bool,
    pub references: Option<ForeignKey>,
}

/// One parsed schema table.
#[derive(Debug, Clone)]
pub struct SchemaTable {
    pub export_name: String,
    pub name: String,
    pub columns: Vec<SchemaColumn>,
}

impl SchemaTable {
    pub fn primary_key(&self) -> Option<&SchemaColumn> {
        self.columns.iter().find(|c| c.is_primary_key)
    }
}

/// Find the span of a balanced `{ ... }` starting at `open` (which must
/// index a `{`). Returns the index one past the closing brace.
fn balanced_brace_end(content: &str, open: usize) -> Option<usize> {
    let bytes = content.as_bytes();
    let mut depth = 0usize;
    let mut in_str: Option<u8> = None;
    let mut i = open;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(quote) = in_str {
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
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        return Some(i + 1);
                    }
                }
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Split a columns-object body into top-level `key: expr` entries.
fn split_top_level_entries(body: &str) -> Vec<String> {
    let mut entries = Vec::new();
    let mut depth = 0i32;
    let mut in_str: Option<char> = None;
    let mut current = String::new();
    let mut chars = body.chars().peekable();
    while let Some(ch) = chars.next() {
        if let Some(quote) = in_str {
            current.push(ch);
            if ch == '\\' {
                if let Some(next) = chars.next() {
                    current.push(next);
                }
                continue;
            }
            if ch == quote {
                in_str = None;
            }
            continue;
        }
        match ch {
            '\'' | '"' | '`' => {
                in_str = Some(ch);
                current.push(ch);
            }
            '(' | '{' | '[' => {
                depth += 1;
                current.push(ch);
            }
            ')' | '}' | ']' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                entries.push(std::mem::take(&mut current));
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        entries.push(current);
    }
    entries
        .into_iter()
        .map(|e| e.trim().to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

/// Parse one `prop: type('col')...chain` column entry.
fn parse_column_entry(entry: &str, table: &str, errors: &mut Vec<String>) -> Option<SchemaColumn> {
    let head_re = Regex::new(r"^(\w+)\s*:\s*(\w+)\s*\(\s*['\x22]([^'\x22]+)['\x22]").unwrap();
    let caps = match head_re.captures(entry) {
        Some(caps) => caps,
        None => {
            // Not a column descriptor (spread, comment remnant); skip quietly.
            debug!(table, entry, "skipping non-column entry");
            return None;
        }
    };

    let property = caps[1].to_string();
    let type_fn = caps[2].to_string();
    let column_name = caps[3].to_string();

    let ty = match ColumnType::from_drizzle(&type_fn) {
        Some(ty) => ty,
        None => {
            errors.push(format!(
                "table '{}' column '{}' has unresolved type '{}'",
                table, column_name, type_fn
            ));
            return None;
        }
    };

    let is_primary_key = entry.contains(".primaryKey(");
    let not_null = entry.contains(".notNull(");

    let default_re = Regex::new(r"\.default\(([^)]*)\)").unwrap();
    let default_value = default_re
        .captures(entry)
        .map(|c| c[1].trim().to_string());

    let refs_re = Regex::new(r"\.references\(\s*\(\)\s*=>\s*(\w+)\.(\w+)\s*\)").unwrap();
    let references = refs_re.captures(entry).map(|c| ForeignKey {
        table: c[1].to_string(),
        column: c[2].to_string(),
    });

    Some(SchemaColumn {
        name: column_name,
        property,
        ty,
        nullable: !not_null && !is_primary_key,
        default_value,
        is_primary_key,
        references,
    })
}

/// Parse a Drizzle schema module's source text.
///
/// Every export matching the table-shape fingerprint (a `*Table('name', {..})`
/// call) is treated as a table. Unresolved column types are collected and
/// reported together with the tables that lack a primary key; schema errors
/// are fatal for the run.
#[instrument(skip(content), fields(path = %path.display()))]
pub fn parse_drizzle_schema(content: &str, path: &Path) -> Result<Vec<SchemaTable>> {
    let table_re =
        Regex::new(r#"export\s+const\s+(\w+)\s*=\s*(?:sqliteTable|pgTable|mysqlTable)\s*\(\s*['\x22]([^'\x22]+)['\x22]\s*,\s*\{"#)
            .unwrap();

    let mut tables = Vec::new();
    let mut errors = Vec::new();

    for caps in table_re.captures_iter(content) {
        let export_name = caps[1].to_string();
        let table_name = caps[2].to_string();
        let whole = caps.get(0).unwrap();
        let open = whole.end() - 1;
        let Some(close) = balanced_brace_end(content, open) else {
            errors.push(format!("table '{}' has an unterminated column object", table_name));
            continue;
        };
        let body = &content[open + 1..close - 1];

        let mut columns = Vec::new();
        for entry in split_top_level_entries(body) {
            if let Some(column) = parse_column_entry(&entry, &table_name, &mut errors) {
                columns.push(column);
            }
        }

        if !columns.iter().any(|c| c.is_primary_key) {
            errors.push(format!("table '{}' has no primary key", table_name));
        }

        debug!(table = %table_name, columns = columns.len(), "parsed schema table");
        tables.push(SchemaTable {
            export_name,
            name: table_name,
            columns,
        });
    }

    if !errors.is_empty() {
        return Err(LoomError::Schema(errors.join("; ")));
    }

    info!(tables = tables.len(), "drizzle schema parsed");
    Ok(tables)
}

/// Read and parse a Drizzle schema file.
pub async fn load_drizzle_schema(path: &Path) -> Result<Vec<SchemaTable>> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LoomError::io(path, e))?;
    parse_drizzle_schema(&content, path)
}

/// Walk each WARP root and ensure every reachable layer has a canonical
/// name: explicit names are kept, otherwise the first export name under
/// which the layer was reachable wins.
pub fn assign_primary_names(warp: &Warp) {
    let mut visited: HashSet<RingId> = HashSet::new();
    for (export_name, root) in warp.roots() {
        name_walk(&root, &export_name, &mut visited);
    }
}

fn name_walk(ring: &Ring, export_name: &str, visited: &mut HashSet<RingId>) {
    if !visited.insert(ring.id()) {
        return;
    }
    ring.claim_name(export_name);
    for inner in ring.inner_rings() {
        name_walk(&inner, export_name, visited);
    }
    for (_, spiraler) in ring.spiralers() {
        for inner in spiraler.inner_rings() {
            name_walk(&inner, export_name, visited);
        }
    }
}

/// Everything the reed discovered for one run.
#[derive(Debug, Default)]
pub struct Discovery {
    pub roots: Vec<(String, Ring)>,
    pub managements: Vec<Management>,
    pub tables: Vec<SchemaTable>,
    pub warnings: Vec<String>,
}

/// Collect and validate the management set.
///
/// Per-management validation failures are configuration errors for the
/// affected class: the class is skipped with a warning and the run
/// continues, matching the per-file discovery contract.
pub fn collect_managements(candidates: Vec<Management>) -> (Vec<Management>, Vec<String>) {
    let mut managements = Vec::new();
    let mut warnings = Vec::new();
    for management in candidates {
        match management.validate() {
            Ok(()) => managements.push(management),
            Err(err) => {
                let message = format!("skipping management '{}': {}", management.name, err);
                warn!("{}", message);
                warnings.push(message);
            }
        }
    }
    (managements, warnings)
}

/// Run the reed: load schemas, resolve WARP roots and canonical names, and
/// collect the management set.
#[instrument(skip_all, fields(schemas = schema_paths.len()))]
pub async fn discover(
    warp: &Warp,
    candidates: Vec<Management>,
    schema_paths: &[PathBuf],
) -> Result<Discovery> {
    let mut tables = Vec::new();
    for path in schema_paths {
        tables.extend(load_drizzle_schema(path).await?);
    }

    assign_primary_names(warp);
    let roots = warp.roots();
    if roots.is_empty() {
        warn!("warp module exports no layers; nothing to weave");
    }

    let (managements, warnings) = collect_managements(candidates);
    info!(
        roots = roots.len(),
        managements = managements.len(),
        tables = tables.len(),
        "discovery complete"
    );

    Ok(Discovery {
        roots,
        managements,
        tables,
        warnings,
    })
}
