//! Processing stages: categorize → sanitize → summarize.
//!
//! Every stage is handed the same [`FinalizedCheck`] and skips any
//! identifier whose summary already exists, so re-running an earlier stage
//! after the terminal artifact is written never touches that identifier and
//! never calls the model for it. Intermediate results stay in memory; the
//! summary written by [`summarize`] is the only persisted stage output.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::artifacts::{self, FinalizedCheck, SummaryArtifacts};
use crate::categories;
use crate::config::Config;
use crate::llm::{self, LanguageModel};
use crate::models::{RawDocument, StageItem};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::sanitize::sanitize;

/// Per-stage counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StageReport {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// The first `n` whitespace-separated words of `text`, single-spaced.
pub fn first_words(text: &str, n: usize) -> String {
    text.split_whitespace().take(n).collect::<Vec<_>>().join(" ")
}

/// Load every raw text under `raw_dir` matching `include_globs`, sorted by
/// identifier. A missing directory yields nothing.
pub fn load_raw_texts(raw_dir: &Path, include_globs: &[String]) -> Result<Vec<RawDocument>> {
    if !raw_dir.exists() {
        return Ok(Vec::new());
    }
    let include_set = build_globset(include_globs)?;

    let mut docs = Vec::new();
    for entry in WalkDir::new(raw_dir) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        let relative = path.strip_prefix(raw_dir).unwrap_or(path);
        if !include_set.is_match(relative) {
            continue;
        }
        let Some(identifier) = path.file_stem().map(|s| s.to_string_lossy().to_string()) else {
            continue;
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        docs.push(RawDocument { identifier, text });
    }

    docs.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    Ok(docs)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

fn step(
    progress: &dyn ProgressReporter,
    step: &'static str,
    identifier: &str,
    n: usize,
    total: usize,
    skipped: bool,
) {
    progress.report(ProgressEvent::Step {
        step,
        identifier: identifier.to_string(),
        n: n as u64,
        total: total as u64,
        skipped,
    });
}

/// Settings for the categorize stage.
#[derive(Debug, Clone, Copy)]
pub struct CategorizeOptions<'a> {
    pub labels: &'a [String],
    pub fallback: &'a str,
    pub excerpt_words: usize,
}

/// Assign one label per document from a classification of its opening
/// words. A reply outside `labels` becomes `fallback`; a failed call drops
/// the document from this run.
pub async fn categorize(
    docs: Vec<RawDocument>,
    model: &dyn LanguageModel,
    options: CategorizeOptions<'_>,
    finalized: &dyn FinalizedCheck,
    progress: &dyn ProgressReporter,
) -> (Vec<StageItem>, StageReport) {
    let total = docs.len();
    let mut report = StageReport::default();
    let mut items = Vec::new();

    for (i, doc) in docs.into_iter().enumerate() {
        let skipped = finalized.is_finalized(&doc.identifier);
        step(progress, "categorize", &doc.identifier, i + 1, total, skipped);
        if skipped {
            report.skipped += 1;
            continue;
        }

        let excerpt = first_words(&doc.text, options.excerpt_words);
        let reply = match model.classify(&excerpt, options.labels).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!(identifier = %doc.identifier, error = %e, "classification failed");
                report.failed += 1;
                continue;
            }
        };

        let label = categories::resolve_label(&reply, options.labels, options.fallback);
        if label != reply.trim() {
            debug!(identifier = %doc.identifier, %reply, %label, "classifier reply mapped");
        }
        items.push(StageItem {
            identifier: doc.identifier,
            category: Some(label),
            text: doc.text,
        });
        report.processed += 1;
    }

    (items, report)
}

/// Normalize each item's text; no external calls.
pub fn sanitize_items(
    items: Vec<StageItem>,
    finalized: &dyn FinalizedCheck,
    progress: &dyn ProgressReporter,
) -> (Vec<StageItem>, StageReport) {
    let total = items.len();
    let mut report = StageReport::default();
    let mut out = Vec::with_capacity(items.len());

    for (i, mut item) in items.into_iter().enumerate() {
        let skipped = finalized.is_finalized(&item.identifier);
        step(progress, "sanitize", &item.identifier, i + 1, total, skipped);
        if skipped {
            report.skipped += 1;
            continue;
        }
        item.text = sanitize(&item.text);
        out.push(item);
        report.processed += 1;
    }

    (out, report)
}

/// Settings for the summarize stage.
#[derive(Debug, Clone, Copy)]
pub struct SummarizeOptions {
    pub truncate_words: usize,
    pub summary_tokens: usize,
}

/// Summarize each item and write its summary artifact as soon as it is
/// produced. Returns the items carrying their summaries.
pub async fn summarize(
    items: Vec<StageItem>,
    model: &dyn LanguageModel,
    options: SummarizeOptions,
    finalized: &dyn FinalizedCheck,
    output: &SummaryArtifacts,
    progress: &dyn ProgressReporter,
) -> Result<(Vec<StageItem>, StageReport)> {
    let total = items.len();
    let mut report = StageReport::default();
    let mut out = Vec::with_capacity(items.len());

    for (i, item) in items.into_iter().enumerate() {
        let skipped = finalized.is_finalized(&item.identifier);
        step(progress, "summarize", &item.identifier, i + 1, total, skipped);
        if skipped {
            report.skipped += 1;
            continue;
        }

        let truncated = first_words(&item.text, options.truncate_words);
        let summary = match model.summarize(&truncated, options.summary_tokens).await {
            Ok(summary) => summary.trim().to_string(),
            Err(e) => {
                warn!(identifier = %item.identifier, error = %e, "summarization failed");
                report.failed += 1;
                continue;
            }
        };

        let path = output.path_for(&item.identifier, item.category.as_deref());
        artifacts::write_text(&path, &summary)?;
        info!(identifier = %item.identifier, category = ?item.category, "saved summary");

        out.push(StageItem {
            text: summary,
            ..item
        });
        report.processed += 1;
    }

    Ok((out, report))
}

/// Counters for one full `process` run.
#[derive(Debug, Clone, Default)]
pub struct ProcessReport {
    pub loaded: usize,
    pub categorize: StageReport,
    pub sanitize: StageReport,
    pub summarize: StageReport,
}

/// Run all three stages over the raw texts in `raw_dir`.
pub async fn process_all(
    raw_dir: &Path,
    include_globs: &[String],
    model: &dyn LanguageModel,
    categorize_options: CategorizeOptions<'_>,
    summarize_options: SummarizeOptions,
    output: &SummaryArtifacts,
    progress: &dyn ProgressReporter,
) -> Result<ProcessReport> {
    let docs = load_raw_texts(raw_dir, include_globs)?;
    let loaded = docs.len();

    let (categorized, categorize_report) =
        categorize(docs, model, categorize_options, output, progress).await;
    let (sanitized, sanitize_report) = sanitize_items(categorized, output, progress);
    let (_, summarize_report) =
        summarize(sanitized, model, summarize_options, output, output, progress).await?;

    Ok(ProcessReport {
        loaded,
        categorize: categorize_report,
        sanitize: sanitize_report,
        summarize: summarize_report,
    })
}

/// `reglex process`
pub async fn run_process(config: &Config, progress: &dyn ProgressReporter) -> Result<()> {
    let model = llm::create_model(&config.llm)?;
    let output = SummaryArtifacts::new(
        &config.paths.summary_dir,
        config.processing.layout,
        &config.processing.categories,
    );

    let report = process_all(
        &config.paths.raw_dir,
        &config.processing.include_globs,
        model.as_ref(),
        CategorizeOptions {
            labels: &config.processing.categories,
            fallback: &config.processing.fallback_category,
            excerpt_words: config.processing.categorize_words,
        },
        SummarizeOptions {
            truncate_words: config.processing.truncate_words,
            summary_tokens: config.processing.summary_tokens,
        },
        &output,
        progress,
    )
    .await?;

    println!("process");
    println!("  raw documents: {}", report.loaded);
    for (name, stage) in [
        ("categorize", &report.categorize),
        ("sanitize", &report.sanitize),
        ("summarize", &report.summarize),
    ] {
        println!(
            "  {}: {} processed, {} skipped (already summarized), {} failed",
            name, stage.processed, stage.skipped, stage.failed
        );
    }
    println!("ok");
    Ok(())
}
