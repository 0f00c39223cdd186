//! Block registry - cross-run tracking of generated blocks
//!
//! During a run the registry is the single in-memory writer of record for
//! every marked block the loom emits. Across runs it has no persistence of
//! its own; knowledge of previous generations is rebuilt by scanning files
//! for marker pairs at run start. Blocks known from scanning but not
//! re-emitted this run are orphans and are garbage-collected at run end.
//!
//! Markers are the sole contract: manually-authored content that merely
//! resembles a generated payload is never touched.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{LoomError, Result};
use crate::marker::{remove_block, scan_blocks, BlockMarker, BlockRef, MarkerLanguage};

/// Marker comment syntax inferred from a file path suffix.
///
/// Returns `None` for formats that cannot carry comments (JSON); those are
/// patched structurally, not through marked blocks.
pub fn language_for_path(path: &Path) -> Option<MarkerLanguage> {
    let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if name.ends_with(".gradle") || name.ends_with(".gradle.kts") {
        return Some(MarkerLanguage::Gradle);
    }
    if name.ends_with(".plist") {
        return Some(MarkerLanguage::Xml);
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("rs") => Some(MarkerLanguage::Rust),
        Some("kt") => Some(MarkerLanguage::Kotlin),
        Some("xml") => Some(MarkerLanguage::Xml),
        Some("toml") => Some(MarkerLanguage::Toml),
        Some("ts") | Some("js") | Some("mjs") | Some("cjs") => Some(MarkerLanguage::TypeScript),
        Some("json") => None,
        _ => None,
    }
}

/// Outcome of an orphan sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    /// Blocks removed, per file.
    pub removed: Vec<(PathBuf, BlockRef)>,
    /// Files rewritten by the sweep.
    pub files_touched: Vec<PathBuf>,
}

/// Cross-run registry of marked blocks.
#[derive(Debug, Default)]
pub struct BlockRegistry {
    /// Blocks present on disk at run start, from scanning.
    known: BTreeMap<PathBuf, BTreeSet<BlockRef>>,
    /// Blocks emitted during the current generation.
    generated: BTreeMap<PathBuf, BTreeSet<BlockRef>>,
    generating: bool,
}

impl BlockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild cross-run knowledge by scanning files for marker pairs.
    ///
    /// Unreadable files are skipped with a warning; a scan never fails the
    /// run.
    pub fn scan_paths<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            let path = path.as_ref();
            match fs::read_to_string(path) {
                Ok(content) => self.register_scanned(path, &content),
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable file during block scan");
                }
            }
        }
    }

    /// Record the blocks found in one file's content.
    pub fn register_scanned(&mut self, path: &Path, content: &str) {
        let blocks = scan_blocks(content);
        if blocks.is_empty() {
            return;
        }
        debug!(path = %path.display(), count = blocks.len(), "scanned marked blocks");
        self.known
            .entry(path.to_path_buf())
            .or_default()
            .extend(blocks);
    }

    /// Begin a generation: partition block knowledge into the
    /// previously-generated bag (`known`, from scanning) and an empty
    /// to-be-generated bag for this run.
    pub fn start_generation(&mut self) {
        self.generated.clear();
        self.generating = true;
    }

    pub fn is_generating(&self) -> bool {
        self.generating
    }

    /// Record a block emitted this run.
    pub fn record_generated(&mut self, path: &Path, scope: &str, identifier: &str) {
        self.generated
            .entry(path.to_path_buf())
            .or_default()
            .insert(BlockRef::new(scope, identifier));
    }

    /// Previously-generated blocks that were not re-emitted this run.
    pub fn orphans(&self) -> Vec<(PathBuf, BlockRef)> {
        let mut orphans = Vec::new();
        for (path, blocks) in &self.known {
            let current = self.generated.get(path);
            for block in blocks {
                let survives = current.map(|c| c.contains(block)).unwrap_or(false);
                if !survives {
                    orphans.push((path.clone(), block.clone()));
                }
            }
        }
        orphans
    }

    /// Remove every orphaned block from disk and end the generation.
    ///
    /// Writes are whole-file read-modify-write; a file that no longer exists
    /// is skipped (its blocks are gone with it).
    pub fn cleanup_all_blocks(&mut self) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        let orphans = self.orphans();

        let mut by_file: BTreeMap<PathBuf, Vec<BlockRef>> = BTreeMap::new();
        for (path, block) in orphans {
            by_file.entry(path).or_default().push(block);
        }

        for (path, blocks) in by_file {
            if !path.exists() {
                debug!(path = %path.display(), "file with orphaned blocks no longer exists");
                continue;
            }
            let Some(language) = language_for_path(&path) else {
                warn!(path = %path.display(), "cannot infer marker language; leaving blocks in place");
                continue;
            };

            let mut content =
                fs::read_to_string(&path).map_err(|e| LoomError::io(&path, e))?;
            let mut touched = false;
            for block in blocks {
                let marker = BlockMarker::new(&block.scope, &block.identifier, language);
                let edit = remove_block(&content, &marker);
                if edit.modified {
                    content = edit.content;
                    touched = true;
                    report.removed.push((path.clone(), block));
                }
            }
            if touched {
                fs::write(&path, &content).map_err(|e| LoomError::io(&path, e))?;
                report.files_touched.push(path.clone());
            }
        }

        if !report.removed.is_empty() {
            info!(
                blocks = report.removed.len(),
                files = report.files_touched.len(),
                "garbage-collected orphaned blocks"
            );
        }

        self.generating = false;
        Ok(report)
    }
}
