//! HR manual scanner.
//!
//! Walks `[manual].root`, keeps files matching `include_globs` and not
//! matching `exclude_globs` (plus `.git`, `target` and `node_modules`),
//! and turns each into a [`SourceItem`] with source `"manual"`. Files that
//! match but cannot be read are listed separately so indexing can keep their
//! previous version instead of treating them as deleted.

use anyhow::{bail, Result};
use chrono::DateTime;
use globset::{Glob, GlobSet, GlobSetBuilder};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;

use crate::config::ManualConfig;
use crate::models::SourceItem;

pub const SOURCE: &str = "manual";

const DEFAULT_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

/// Result of [`scan_manual`].
#[derive(Debug, Default)]
pub struct ManualScan {
    /// Sorted by relative path.
    pub items: Vec<SourceItem>,
    /// Relative paths of matching files that could not be read.
    pub unreadable: Vec<String>,
}

/// Scan the manual directory.
pub fn scan_manual(config: &ManualConfig) -> Result<ManualScan> {
    let root = &config.root;
    if !root.exists() {
        bail!("Manual root does not exist: {}", root.display());
    }

    let include_set = build_globset(config.include_globs.iter().map(String::as_str))?;
    let exclude_set = build_globset(
        DEFAULT_EXCLUDES
            .iter()
            .copied()
            .chain(config.exclude_globs.iter().map(String::as_str)),
    )?;

    let mut scan = ManualScan::default();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");
        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match file_to_source_item(path, &rel_str) {
            Ok(item) => scan.items.push(item),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable manual file");
                scan.unreadable.push(rel_str);
            }
        }
    }

    scan.items.sort_by(|a, b| a.source_id.cmp(&b.source_id));
    scan.unreadable.sort();
    Ok(scan)
}

/// What `hrctl status` reports about the manual directory.
#[derive(Debug, Serialize)]
pub struct ManualStatus {
    pub root: PathBuf,
    pub exists: bool,
    pub files: usize,
}

pub fn manual_status(config: &ManualConfig) -> ManualStatus {
    let files = scan_manual(config)
        .map(|scan| scan.items.len() + scan.unreadable.len())
        .unwrap_or(0);
    ManualStatus {
        root: config.root.clone(),
        exists: config.root.exists(),
        files,
    }
}

fn file_to_source_item(path: &Path, relative_path: &str) -> Result<SourceItem> {
    let modified = std::fs::metadata(path)?
        .modified()
        .unwrap_or(SystemTime::UNIX_EPOCH)
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64;

    let body = std::fs::read_to_string(path)?;
    let is_markdown = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("md" | "markdown")
    );

    let h1 = if is_markdown { first_h1(&body) } else { None };
    let title = h1.or_else(|| {
        path.file_stem()
            .map(|n| n.to_string_lossy().replace(['_', '-'], " "))
    });

    Ok(SourceItem {
        source: SOURCE.to_string(),
        source_id: relative_path.to_string(),
        title,
        updated_at: DateTime::from_timestamp(modified, 0).unwrap_or_default(),
        content_type: if is_markdown {
            "text/markdown"
        } else {
            "text/plain"
        }
        .to_string(),
        body,
    })
}

fn first_h1(body: &str) -> Option<String> {
    body.lines()
        .map(str::trim)
        .find_map(|l| l.strip_prefix("# "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

fn build_globset<'a>(patterns: impl IntoIterator<Item = &'a str>) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
