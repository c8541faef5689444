//! Content fetcher: resolves each record to its document page and stores the
//! extracted plain text at `raw_dir/<identifier>.txt`.
//!
//! An existing raw artifact is the checkpoint: the record is skipped without
//! any network call, whatever the artifact contains.

use anyhow::Result;
use scraper::{ElementRef, Html};
use std::path::Path;
use tracing::{info, warn};

use crate::artifacts;
use crate::config::{Config, DocumentFormat};
use crate::harvest::{element_text, selector};
use crate::models::Record;
use crate::page::{self, HttpPageSource, PageSource};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::store::RecordStore;

/// Written when the page has no content region, so the record counts as
/// processed and is not retried.
pub const NO_CONTENT_SENTINEL: &str = "No content found in the div with id 'document1'.";

/// Delimiter between table cells in extracted text.
pub const CELL_DELIMITER: &str = " ; ";

/// Rewrite a stored listing link into the document-rendering variant for
/// `language` (e.g. `AUTO` → `EN/TXT`), dropping the `rid` tracking param.
pub fn document_url(link: &str, language: &str) -> String {
    link.replace("AUTO", &format!("{}/TXT", language))
        .replace("&rid=1", "")
}

/// Extract the primary content region as plain text.
///
/// Paragraphs become one unit each; a table becomes one unit with one line
/// per row and cells joined by [`CELL_DELIMITER`]. Units are joined by a
/// blank line in document order. Paragraphs inside tables belong to the
/// table unit.
pub fn extract_document_text(html: &str) -> Result<String> {
    let doc = Html::parse_document(html);
    let region_sel = selector("div#document1")?;
    let units_sel = selector("p, table")?;
    let row_sel = selector("tr")?;
    let cell_sel = selector("td")?;

    let Some(region) = doc.select(&region_sel).next() else {
        return Ok(NO_CONTENT_SENTINEL.to_string());
    };

    let mut units: Vec<String> = Vec::new();
    for el in region.select(&units_sel) {
        if inside_table(&el) {
            continue;
        }
        if el.value().name() == "table" {
            let rows: Vec<String> = el
                .select(&row_sel)
                .map(|row| {
                    row.select(&cell_sel)
                        .map(|cell| element_text(&cell))
                        .collect::<Vec<_>>()
                })
                .filter(|cells| !cells.is_empty())
                .map(|cells| cells.join(CELL_DELIMITER))
                .collect();
            if !rows.is_empty() {
                units.push(rows.join("\n"));
            }
        } else {
            let text = element_text(&el);
            if !text.is_empty() {
                units.push(text);
            }
        }
    }

    Ok(units.join("\n\n"))
}

fn inside_table(el: &ElementRef<'_>) -> bool {
    el.ancestors().any(|node| {
        node.value()
            .as_element()
            .map(|e| e.name() == "table")
            .unwrap_or(false)
    })
}

/// Counters for one fetch run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchReport {
    pub total: usize,
    pub fetched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Fetch raw text for each record, in the given order.
pub async fn fetch_documents(
    records: &[Record],
    raw_dir: &Path,
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
        let out = artifacts::raw_path(raw_dir, &record.identifier);
        let skipped = out.exists();
        progress.report(ProgressEvent::Step {
            step: "fetch",
            identifier: record.identifier.clone(),
            n: (i + 1) as u64,
            total: records.len() as u64,
            skipped,
        });
        if skipped {
            report.skipped += 1;
            continue;
        }

        let url = document_url(&record.link, language);
        let html = match pages.fetch_html(&url).await {
            Ok(html) => html,
            Err(e) => {
                warn!(identifier = %record.identifier, %url, error = %e, "document fetch failed");
                report.failed += 1;
                continue;
            }
        };
        page::settle(wait_ms).await;

        let text = match extract_document_text(&html) {
            Ok(text) => text,
            Err(e) => {
                warn!(identifier = %record.identifier, error = %e, "text extraction failed");
                report.failed += 1;
                continue;
            }
        };

        if let Err(e) = artifacts::write_text(&out, &text) {
            warn!(identifier = %record.identifier, error = %e, "could not write raw text");
            report.failed += 1;
            continue;
        }
        info!(identifier = %record.identifier, "saved document text");
        report.fetched += 1;
    }

    Ok(report)
}

/// `reglex fetch`: raw text for every record of the HTML-format sources.
pub async fn run_fetch(
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
        .filter(|s| s.format == DocumentFormat::Html)
    {
        let store = RecordStore::load(&src.metadata, &src.date_format)?;
        let records = store.sorted_view();
        let report = fetch_documents(
            &records,
            &config.paths.raw_dir,
            &src.language,
            config.harvest.document_wait_ms,
            &pages,
            progress,
        )
        .await?;

        println!("fetch {}", src.name);
        println!("  records: {}", report.total);
        println!("  fetched: {}", report.fetched);
        println!("  skipped (already saved): {}", report.skipped);
        println!("  failed: {}", report.failed);
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_url_substitutes_language_variant() {
        assert_eq!(
            document_url(
                "https://eur-lex.europa.eu/legal-content/AUTO/?uri=CELEX:32025R0001&rid=1",
                "EN"
            ),
            "https://eur-lex.europa.eu/legal-content/EN/TXT/?uri=CELEX:32025R0001"
        );
    }

    #[test]
    fn extracts_paragraphs_and_tables_in_order() {
        let html = r#"
<html><body>
<p>Outside the region.</p>
<div id="document1">
  <p class="title">COMMISSION   REGULATION (EU) 2025/1</p>
  <p></p>
  <table>
    <tr><td><p>Code</p></td><td>Description</td></tr>
    <tr><td>0101</td><td>Live <b>horses</b></td></tr>
    <tr><th>header only</th></tr>
  </table>
  <p>Article 1</p>
</div>
</body></html>"#;

        let text = extract_document_text(html).unwrap();
        assert_eq!(
            text,
            "COMMISSION REGULATION (EU) 2025/1\n\nCode ; Description\n0101 ; Live horses\n\nArticle 1"
        );
    }

    #[test]
    fn missing_region_yields_sentinel() {
        let text = extract_document_text("<html><body><p>hi</p></body></html>").unwrap();
        assert_eq!(text, NO_CONTENT_SENTINEL);
    }
}
