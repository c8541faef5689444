//! Binary-document path: PDF download and PDF-to-text cleaning.
//!
//! `fetch-pdf` follows the same checkpoint rule as the HTML fetcher (skip
//! when `pdf_dir/<identifier>.pdf` exists) and additionally needs the
//! format-specific download link on the rendered page. `clean-pdfs` turns
//! every downloaded PDF into `raw_dir/<identifier>.txt`, skipping those
//! whose raw text already exists.

use anyhow::{anyhow, Context, Result};
use regex::Regex;
use scraper::Html;
use std::path::Path;
use tracing::{info, warn};
use url::Url;

use crate::artifacts;
use crate::config::{Config, DocumentFormat, PdfConfig};
use crate::fetch::{document_url, FetchReport};
use crate::harvest::selector;
use crate::models::Record;
use crate::page::{self, HttpPageSource, PageSource};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::store::RecordStore;

/// Locate the PDF download link for `language` on a rendered document page.
///
/// Returns the absolute URL, or `None` when the page has no such link.
pub fn find_pdf_link(html: &str, page_url: &str, language: &str) -> Result<Option<String>> {
    let doc = Html::parse_document(html);
    let sel = selector(&format!(
        "a#format_language_table_PDF_{}",
        language.to_uppercase()
    ))?;

    let Some(href) = doc
        .select(&sel)
        .next()
        .and_then(|a| a.value().attr("href"))
    else {
        return Ok(None);
    };

    let base = Url::parse(page_url).with_context(|| format!("invalid page URL: {}", page_url))?;
    Ok(Some(base.join(href)?.to_string()))
}

/// Download PDFs for each record.
///
/// A page without a PDF link is logged and counted as failed.
pub async fn fetch_pdfs(
    records: &[Record],
    pdf_dir: &Path,
    language: &str,
    wait_ms: u64,
    pages: &dyn PageSource,
    progress: &dyn ProgressReporter,
) -> Result<FetchReport> {
    let mut report = FetchReport {
        total: records.len(),
        ..Default::default()
    };

    for (i, record) in records.iter().enumerate() {
        let out = artifacts::pdf_path(pdf_dir, &record.identifier);
        let skipped = out.exists();
        progress.report(ProgressEvent::Step {
            step: "fetch-pdf",
            identifier: record.identifier.clone(),
            n: (i + 1) as u64,
            total: records.len() as u64,
            skipped,
        });
        if skipped {
            report.skipped += 1;
            continue;
        }

        let page_url = document_url(&record.link, language);
        let html = match pages.fetch_html(&page_url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(identifier = %record.identifier, url = %page_url, error = %e, "document page failed");
                report.failed += 1;
                continue;
            }
        };
        page::settle(wait_ms).await;

        let pdf_url = match find_pdf_link(&html, &page_url, language) {
            Ok(Some(url)) => url,
            Ok(None) => {
                warn!(identifier = %record.identifier, "no PDF link on document page");
                report.failed += 1;
                continue;
            }
            Err(e) => {
                warn!(identifier = %record.identifier, error = %e, "could not resolve PDF link");
                report.failed += 1;
                continue;
            }
        };

        let bytes = match pages.fetch_bytes(&pdf_url).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(identifier = %record.identifier, url = %pdf_url, error = %e, "PDF download failed");
                report.failed += 1;
                continue;
            }
        };

        let written = std::fs::create_dir_all(pdf_dir).and_then(|_| std::fs::write(&out, &bytes));
        if let Err(e) = written {
            warn!(identifier = %record.identifier, error = %e, "could not write PDF");
            report.failed += 1;
            continue;
        }
        info!(identifier = %record.identifier, bytes = bytes.len(), "downloaded PDF");
        report.fetched += 1;
    }

    Ok(report)
}

/// Compiled cleaning rules for PDF text.
pub struct PdfCleaner {
    strip: Vec<Regex>,
    skip_first_page: bool,
}

impl PdfCleaner {
    pub fn new(config: &PdfConfig) -> Result<Self> {
        let strip = config
            .strip_patterns
            .iter()
            .map(|p| Regex::new(p).with_context(|| format!("invalid strip pattern: {}", p)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            strip,
            skip_first_page: config.skip_first_page,
        })
    }

    /// Join page texts (optionally without the cover page) and clean them.
    pub fn clean_pages(&self, pages: &[String]) -> String {
        let start = usize::from(self.skip_first_page && pages.len() > 1);
        self.clean_text(&pages[start..].join("\n"))
    }

    /// Drop gazette boilerplate lines, repair extraction artifacts, strip
    /// every line and remove empty ones.
    pub fn clean_text(&self, raw: &str) -> String {
        let mut text = raw.to_string();
        for re in &self.strip {
            text = re.replace_all(&text, "").into_owned();
        }
        let text = text.replace('\u{4}', "…").replace('\u{FFFD}', "");

        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Per-page text of a PDF held in memory.
pub fn extract_pdf_pages(bytes: &[u8]) -> Result<Vec<String>> {
    pdf_extract::extract_text_from_mem_by_pages(bytes)
        .map_err(|e| anyhow!("PDF extraction failed: {}", e))
}

/// Counters for one `clean-pdfs` run.
#[derive(Debug, Clone, Default)]
pub struct CleanReport {
    pub total: usize,
    pub cleaned: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Convert every `pdf_dir/*.pdf` into `raw_dir/<stem>.txt`.
pub fn clean_pdfs(
    pdf_dir: &Path,
    raw_dir: &Path,
    cleaner: &PdfCleaner,
    progress: &dyn ProgressReporter,
) -> Result<CleanReport> {
    let mut pdfs: Vec<_> = match std::fs::read_dir(pdf_dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("pdf"))
            .collect(),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", pdf_dir.display())),
    };
    pdfs.sort();

    let mut report = CleanReport {
        total: pdfs.len(),
        ..Default::default()
    };

    for (i, pdf) in pdfs.iter().enumerate() {
        let stem = pdf
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default();
        let out = artifacts::raw_path(raw_dir, &stem);
        let skipped = out.exists();
        progress.report(ProgressEvent::Step {
            step: "clean-pdfs",
            identifier: stem.clone(),
            n: (i + 1) as u64,
            total: pdfs.len() as u64,
            skipped,
        });
        if skipped {
            report.skipped += 1;
            continue;
        }

        let pages = match std::fs::read(pdf)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| extract_pdf_pages(&bytes))
        {
            Ok(pages) => pages,
            Err(e) => {
                warn!(pdf = %pdf.display(), error = %e, "could not read PDF");
                report.failed += 1;
                continue;
            }
        };

        artifacts::write_text(&out, &cleaner.clean_pages(&pages))?;
        info!(identifier = %stem, "cleaned PDF text");
        report.cleaned += 1;
    }

    Ok(report)
}

/// `reglex fetch-pdf`: download PDFs for every record of PDF-format sources.
pub async fn run_fetch_pdf(
    config: &Config,
    source: Option<&str>,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    let sources = config.select_sources(source)?;
    let pages = HttpPageSource::new(std::time::Duration::from_secs(
        config.harvest.page_timeout_secs,
    ))?;

    for src in sources
        .into_iter()
        .filter(|s| s.format == DocumentFormat::Pdf)
    {
        let store = RecordStore::load(&src.metadata, &src.date_format)?;
        let report = fetch_pdfs(
            &store.sorted_view(),
            &config.paths.pdf_dir,
            &src.language,
            config.harvest.document_wait_ms,
            &pages,
            progress,
        )
        .await?;

        println!("fetch-pdf {}", src.name);
        println!("  records: {}", report.total);
        println!("  downloaded: {}", report.fetched);
        println!("  skipped (already downloaded): {}", report.skipped);
        println!("  failed: {}", report.failed);
    }
    println!("ok");
    Ok(())
}

/// `reglex clean-pdfs`
pub fn run_clean_pdfs(config: &Config, progress: &dyn ProgressReporter) -> Result<()> {
    let cleaner = PdfCleaner::new(&config.pdf)?;
    let report = clean_pdfs(
        &config.paths.pdf_dir,
        &config.paths.raw_dir,
        &cleaner,
        progress,
    )?;

    println!("clean-pdfs");
    println!("  pdfs: {}", report.total);
    println!("  cleaned: {}", report.cleaned);
    println!("  skipped (already extracted): {}", report.skipped);
    println!("  failed: {}", report.failed);
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoProgress;
    use tempfile::TempDir;

    fn cleaner() -> PdfCleaner {
        PdfCleaner::new(&PdfConfig::default()).unwrap()
    }

    #[test]
    fn finds_language_pdf_link() {
        let html = r#"<a id="format_language_table_PDF_RO" href="/legal-content/RO/TXT/PDF/?uri=CELEX:32025R0001">PDF</a>"#;
        let link = find_pdf_link(
            html,
            "https://eur-lex.europa.eu/legal-content/RO/TXT/?uri=CELEX:32025R0001",
            "ro",
        )
        .unwrap();
        assert_eq!(
            link.as_deref(),
            Some("https://eur-lex.europa.eu/legal-content/RO/TXT/PDF/?uri=CELEX:32025R0001")
        );
    }

    #[test]
    fn missing_pdf_link_is_none() {
        let link = find_pdf_link("<p>no link</p>", "https://x.test/doc", "RO").unwrap();
        assert!(link.is_none());
    }

    #[test]
    fn cleaning_drops_gazette_boilerplate() {
        let raw = "MONITORUL OFICIAL AL ROMÂNIEI, PARTEA I, Nr. 12\n  P A R T E A  I\nISSN 1453—4495\n\n\n  Articolul 1 \u{4}\n\nText\u{FFFD} final  \n";
        assert_eq!(cleaner().clean_text(raw), "Articolul 1 …\nText final");
    }

    #[test]
    fn first_page_is_skipped_when_configured() {
        let pages = vec!["Cover".to_string(), "Body one".to_string(), "Body two".to_string()];
        assert_eq!(cleaner().clean_pages(&pages), "Body one\nBody two");

        let single = vec!["Only page".to_string()];
        assert_eq!(cleaner().clean_pages(&single), "Only page");
    }

    #[test]
    fn clean_pdfs_skips_existing_and_reports_broken() {
        let tmp = TempDir::new().unwrap();
        let pdf_dir = tmp.path().join("pdf");
        let raw_dir = tmp.path().join("raw");
        std::fs::create_dir_all(&pdf_dir).unwrap();
        std::fs::write(pdf_dir.join("DONE.pdf"), b"%PDF-irrelevant").unwrap();
        std::fs::write(pdf_dir.join("BROKEN.pdf"), b"not a pdf").unwrap();
        artifacts::write_text(&raw_dir.join("DONE.txt"), "already extracted").unwrap();

        let report = clean_pdfs(&pdf_dir, &raw_dir, &cleaner(), &NoProgress).unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failed, 1);
        assert_eq!(
            std::fs::read_to_string(raw_dir.join("DONE.txt")).unwrap(),
            "already extracted"
        );
        assert!(!raw_dir.join("BROKEN.txt").exists());
    }
}
