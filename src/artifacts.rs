//! On-disk artifact layout and the shared "already finalized?" predicate.
//!
//! Raw text lives at `raw_dir/<identifier>.txt`, downloaded PDFs at
//! `pdf_dir/<identifier>.pdf`, and summaries at
//! `summary_dir/<category>/<identifier>.txt` (nested) or
//! `summary_dir/<identifier>.txt` (flat).
//!
//! Presence of a summary is the checkpoint for *every* processing stage:
//! once it exists, categorize, sanitize and summarize all skip the
//! identifier. The stages receive that check as a [`FinalizedCheck`].

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::categories;
use crate::config::SummaryLayout;

/// File stem for an identifier; path separators and NULs are replaced.
pub fn artifact_stem(identifier: &str) -> String {
    identifier
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

pub fn raw_path(raw_dir: &Path, identifier: &str) -> PathBuf {
    raw_dir.join(format!("{}.txt", artifact_stem(identifier)))
}

pub fn pdf_path(pdf_dir: &Path, identifier: &str) -> PathBuf {
    pdf_dir.join(format!("{}.pdf", artifact_stem(identifier)))
}

/// Write a text artifact, creating parent directories.
pub fn write_text(path: &Path, text: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))
}

/// Answers whether an identifier has already reached the terminal stage.
pub trait FinalizedCheck: Send + Sync {
    fn is_finalized(&self, identifier: &str) -> bool;
}

/// A summarized artifact found on disk.
#[derive(Debug, Clone)]
pub struct SummaryArtifact {
    pub path: PathBuf,
    pub file_name: String,
    pub identifier: String,
    pub category: Option<String>,
}

/// The summary directory: where finalized output is written and found.
#[derive(Debug, Clone)]
pub struct SummaryArtifacts {
    dir: PathBuf,
    layout: SummaryLayout,
    labels: Vec<String>,
}

impl SummaryArtifacts {
    pub fn new(dir: &Path, layout: SummaryLayout, labels: &[String]) -> Self {
        Self {
            dir: dir.to_path_buf(),
            layout,
            labels: labels.to_vec(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Where the summary for `identifier` is written under this layout.
    pub fn path_for(&self, identifier: &str, category: Option<&str>) -> PathBuf {
        let file = format!("{}.txt", artifact_stem(identifier));
        match (self.layout, category) {
            (SummaryLayout::Nested, Some(cat)) => self.dir.join(categories::dir_name(cat)).join(file),
            _ => self.dir.join(file),
        }
    }

    /// Enumerate summaries at the top level and one category level down.
    ///
    /// Sorted by (category, file name) for deterministic index builds.
    pub fn list(&self) -> Result<Vec<SummaryArtifact>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut found = Vec::new();
        for entry in WalkDir::new(&self.dir).min_depth(1).max_depth(2) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("txt") {
                continue;
            }
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
                continue;
            };
            let category = if entry.depth() == 2 {
                path.parent()
                    .and_then(|p| p.file_name())
                    .map(|d| categories::label_for_dir(&d.to_string_lossy(), &self.labels))
            } else {
                None
            };
            found.push(SummaryArtifact {
                path: path.to_path_buf(),
                file_name: format!("{}.txt", stem),
                identifier: stem,
                category,
            });
        }

        found.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.file_name.cmp(&b.file_name))
        });
        Ok(found)
    }

    /// Category labels that currently have a directory on disk.
    pub fn categories_on_disk(&self) -> Vec<String> {
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut cats: Vec<String> = entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| categories::label_for_dir(&e.file_name().to_string_lossy(), &self.labels))
            .collect();
        cats.sort();
        cats
    }
}

impl FinalizedCheck for SummaryArtifacts {
    /// Checks the flat location and every category subdirectory, whatever
    /// the configured layout.
    fn is_finalized(&self, identifier: &str) -> bool {
        let file = format!("{}.txt", artifact_stem(identifier));
        if self.dir.join(&file).is_file() {
            return true;
        }
        let Ok(entries) = std::fs::read_dir(&self.dir) else {
            return false;
        };
        entries
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .any(|e| e.path().join(&file).is_file())
    }
}
