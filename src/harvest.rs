//! Metadata harvester: paginated discovery of records from a remote listing.
//!
//! For each configured category, pages are requested strictly in order
//! starting at page 1. Each page yields zero or more entries; entries
//! without an identifier are dropped (see [`accept_entry`]). Pagination
//! continues only while the listing shows an enabled "next" affordance,
//! unless the source runs in single-page mode.
//!
//! A failed page load or an unparsable page ends that category's harvest;
//! the remaining categories still run. Records are merged into the
//! [`RecordStore`] and persisted after every page, so a crash mid-category
//! keeps everything discovered up to the last completed page.

use anyhow::{anyhow, Result};
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};
use url::Url;

use crate::config::{CategoryQuery, Config, SourceConfig};
use crate::error::ListingError;
use crate::models::Record;
use crate::page::{self, HttpPageSource, PageSource};
use crate::progress::{ProgressEvent, ProgressReporter};
use crate::store::RecordStore;

/// Parsed content of one listing page.
#[derive(Debug, Clone)]
pub struct ListingPage {
    /// Result count shown by the listing. Informational only.
    pub total_results: u64,
    pub entries: Vec<ListingEntry>,
    pub has_next: bool,
}

/// A listing entry that carries an identifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub identifier: String,
    pub title: String,
    pub link: String,
    pub date: Option<String>,
}

impl ListingEntry {
    pub fn into_record(self, page: u32, category: &str) -> Record {
        Record {
            identifier: self.identifier,
            title: self.title,
            link: self.link,
            date: self.date,
            page,
            category: Some(category.to_string()),
        }
    }
}

/// An entry block as found on the page, before the identifier policy runs.
#[derive(Debug, Clone)]
pub struct RawEntry {
    pub identifier: Option<String>,
    pub title: String,
    pub link: String,
    pub date: Option<String>,
}

/// Drop policy for listing entries: keep an entry if and only if its detail
/// block yielded a non-empty identifier. Dropped entries are neither counted
/// nor reported as errors.
pub fn accept_entry(raw: RawEntry) -> Option<ListingEntry> {
    let identifier = raw.identifier?.trim().to_string();
    if identifier.is_empty() {
        return None;
    }
    Some(ListingEntry {
        identifier,
        title: raw.title,
        link: raw.link,
        date: raw.date,
    })
}

/// Fill a listing URL template.
pub fn build_query_url(template: &str, year: i32, page: u32, filter: &str) -> String {
    template
        .replace("{year}", &year.to_string())
        .replace("{page}", &page.to_string())
        .replace("{filter}", filter)
}

struct ListingSelectors {
    total: Selector,
    result: Selector,
    title_link: Selector,
    detail_columns: Selector,
    dt: Selector,
    dd: Selector,
    next: Selector,
}

impl ListingSelectors {
    fn new() -> Result<Self> {
        Ok(Self {
            total: selector("div.ResultsToolsWrapper strong:last-child")?,
            result: selector(".SearchResult")?,
            title_link: selector("h2 a")?,
            detail_columns: selector(".CollapsePanel-sm .SearchResultData .row .col-sm-6")?,
            dt: selector("dl dt")?,
            dd: selector("dl dd")?,
            next: selector("li.next:not(.disabled)")?,
        })
    }
}

pub(crate) fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| anyhow!("invalid selector '{}': {:?}", css, e))
}

/// Text content of an element with whitespace runs collapsed to one space.
pub(crate) fn element_text(el: &ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse a rendered listing page.
///
/// Relative result links are resolved against `base`.
pub fn parse_listing(html: &str, base: &Url) -> Result<ListingPage> {
    let s = ListingSelectors::new()?;
    let doc = Html::parse_document(html);

    let total_results = match doc.select(&s.total).next() {
        Some(el) => parse_count(&element_text(&el))?,
        None => 0,
    };

    let mut entries = Vec::new();
    for block in doc.select(&s.result) {
        let Some(raw) = read_entry(&block, &s, base) else {
            continue;
        };
        if let Some(entry) = accept_entry(raw) {
            entries.push(entry);
        }
    }

    let has_next = doc.select(&s.next).next().is_some();

    Ok(ListingPage {
        total_results,
        entries,
        has_next,
    })
}

fn parse_count(text: &str) -> Result<u64, ListingError> {
    let digits: String = text
        .chars()
        .filter(|c| !matches!(c, ',' | '.' | ' ' | '\u{a0}'))
        .collect();
    digits
        .parse::<u64>()
        .map_err(|_| ListingError::ResultCount(text.to_string()))
}

fn read_entry(block: &ElementRef<'_>, s: &ListingSelectors, base: &Url) -> Option<RawEntry> {
    let anchor = block.select(&s.title_link).next()?;
    let title = element_text(&anchor);
    let href = anchor.value().attr("href")?;
    let link = match base.join(href) {
        Ok(url) => url.to_string(),
        Err(e) => {
            debug!(href, error = %e, "skipping result with unusable link");
            return None;
        }
    };

    let columns: Vec<ElementRef<'_>> = block.select(&s.detail_columns).collect();

    let identifier = columns.first().and_then(|col| {
        col.select(&s.dt)
            .zip(col.select(&s.dd))
            .find(|(dt, _)| element_text(dt).contains("CELEX number"))
            .map(|(_, dd)| element_text(&dd))
    });

    let date = columns.get(1).and_then(|col| {
        col.select(&s.dd).nth(1).map(|dd| {
            element_text(&dd)
                .split(';')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string()
        })
    });

    Some(RawEntry {
        identifier,
        title,
        link,
        date: date.filter(|d| !d.is_empty()),
    })
}

/// Counters for one source's harvest run.
#[derive(Debug, Clone, Default)]
pub struct HarvestReport {
    pub pages: u32,
    pub entries_found: usize,
    pub updated: usize,
    pub total_records: usize,
    pub failed_categories: Vec<String>,
}

/// Options that shape a single harvest run.
#[derive(Debug, Clone, Copy)]
pub struct HarvestOptions {
    pub year: i32,
    /// Stop after page 1 of every category.
    pub single_page: bool,
    pub render_wait_ms: u64,
}

/// Harvest the given categories of one source into its Record Store.
pub async fn harvest_source(
    source: &SourceConfig,
    categories: &[&CategoryQuery],
    options: HarvestOptions,
    pages: &dyn PageSource,
    progress: &dyn ProgressReporter,
) -> Result<HarvestReport> {
    let base = Url::parse(&source.base_url)?;
    let mut store = RecordStore::load(&source.metadata, &source.date_format)?;
    let mut report = HarvestReport::default();
    let single_page = options.single_page || source.single_page;

    for category in categories {
        info!(source = %source.name, category = %category.name, "harvesting category");
        let mut page_no = 1u32;

        loop {
            progress.report(ProgressEvent::Harvesting {
                source: source.name.clone(),
                category: category.name.clone(),
                page: page_no,
            });

            let url = build_query_url(&source.query_url, options.year, page_no, &category.filter);
            let html = match pages.fetch_html(&url).await {
                Ok(html) => html,
                Err(e) => {
                    warn!(category = %category.name, page = page_no, error = %e, "page load failed; abandoning category");
                    report.failed_categories.push(category.name.clone());
                    break;
                }
            };
            page::settle(options.render_wait_ms).await;

            let listing = match parse_listing(&html, &base) {
                Ok(listing) => listing,
                Err(e) => {
                    warn!(category = %category.name, page = page_no, error = %e, "listing parse failed; abandoning category");
                    report.failed_categories.push(category.name.clone());
                    break;
                }
            };

            if page_no == 1 {
                info!(category = %category.name, total = listing.total_results, "listing total results");
            }

            let records: Vec<Record> = listing
                .entries
                .into_iter()
                .map(|e| e.into_record(page_no, &category.name))
                .collect();
            report.entries_found += records.len();

            let merged = store.merge(records);
            report.updated += merged.updated_count;
            if merged.updated_count > 0 {
                store.save()?;
            }
            report.pages += 1;

            if single_page {
                debug!(category = %category.name, "single-page mode; stopping after page 1");
                break;
            }
            if !listing.has_next {
                debug!(category = %category.name, page = page_no, "no more pages");
                break;
            }
            if source.max_pages.is_some_and(|max| page_no >= max) {
                warn!(category = %category.name, page = page_no, "max_pages reached; stopping");
                break;
            }
            page_no += 1;
        }
    }

    store.save()?;
    report.total_records = store.len();
    Ok(report)
}

/// `reglex harvest`: resolve selections, then harvest each source in order.
pub async fn run_harvest(
    config: &Config,
    source: Option<&str>,
    category: Option<&str>,
    year: Option<i32>,
    single_page: bool,
    progress: &dyn ProgressReporter,
) -> Result<()> {
    // Resolve every selection before any network traffic.
    let mut plan = Vec::new();
    for src in config.select_sources(source)? {
        plan.push((src, src.select_categories(category)?));
    }

    let pages = HttpPageSource::new(std::time::Duration::from_secs(
        config.harvest.page_timeout_secs,
    ))?;
    let options = HarvestOptions {
        year: year.unwrap_or(config.harvest.target_year),
        single_page,
        render_wait_ms: config.harvest.render_wait_ms,
    };

    for (src, categories) in plan {
        let report = harvest_source(src, &categories, options, &pages, progress).await?;
        println!("harvest {}", src.name);
        println!("  pages: {}", report.pages);
        println!("  entries found: {}", report.entries_found);
        println!("  added or updated: {}", report.updated);
        println!("  total records: {}", report.total_records);
        if !report.failed_categories.is_empty() {
            println!("  failed categories: {}", report.failed_categories.join(", "));
        }
    }
    println!("ok");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
<html><body>
<div class="ResultsToolsWrapper"><span>Results</span> <strong>1</strong> to <strong>2</strong> of <strong>1,234</strong></div>
<div class="SearchResult">
  <h2><a href="./legal-content/AUTO/?uri=CELEX:32025R0001&amp;rid=1">Commission Regulation (EU) 2025/1</a></h2>
  <div class="CollapsePanel-sm"><div class="SearchResultData collapse in"><div class="row">
    <div class="col-sm-6"><dl><dt>CELEX number: </dt><dd>32025R0001</dd><dt>Form:</dt><dd>Regulation</dd></dl></div>
    <div class="col-sm-6"><dl><dt>Author:</dt><dd>European Commission</dd><dt>Date of document:</dt><dd>03/01/2025; Date of publication</dd></dl></div>
  </div></div></div>
</div>
<div class="SearchResult">
  <h2><a href="./legal-content/AUTO/?uri=OJ:C_202500001">Information notice</a></h2>
  <div class="CollapsePanel-sm"><div class="SearchResultData collapse in"><div class="row">
    <div class="col-sm-6"><dl><dt>Form:</dt><dd>Information</dd></dl></div>
    <div class="col-sm-6"><dl><dt>Author:</dt><dd>Council</dd><dt>Date of document:</dt><dd>02/01/2025</dd></dl></div>
  </div></div></div>
</div>
<ul class="pagination"><li class="next"><a href="?page=2">Next</a></li></ul>
</body></html>
"#;

    fn base() -> Url {
        Url::parse("https://eur-lex.europa.eu/").unwrap()
    }

    #[test]
    fn parses_entries_and_drops_missing_identifier() {
        let page = parse_listing(LISTING, &base()).unwrap();
        assert_eq!(page.total_results, 1234);
        assert!(page.has_next);
        assert_eq!(page.entries.len(), 1);

        let entry = &page.entries[0];
        assert_eq!(entry.identifier, "32025R0001");
        assert_eq!(entry.title, "Commission Regulation (EU) 2025/1");
        assert_eq!(
            entry.link,
            "https://eur-lex.europa.eu/legal-content/AUTO/?uri=CELEX:32025R0001&rid=1"
        );
        assert_eq!(entry.date.as_deref(), Some("03/01/2025"));
    }

    #[test]
    fn disabled_next_means_last_page() {
        let html = LISTING.replace(r#"<li class="next">"#, r#"<li class="next disabled">"#);
        let page = parse_listing(&html, &base()).unwrap();
        assert!(!page.has_next);
    }

    #[test]
    fn missing_count_is_zero_and_empty_listing_is_fine() {
        let page = parse_listing("<html><body></body></html>", &base()).unwrap();
        assert_eq!(page.total_results, 0);
        assert!(page.entries.is_empty());
        assert!(!page.has_next);
    }

    #[test]
    fn garbled_count_is_a_parse_failure() {
        let html = r#"<div class="ResultsToolsWrapper"><strong>many</strong></div>"#;
        assert!(parse_listing(html, &base()).is_err());
    }

    #[test]
    fn accept_entry_policy() {
        let raw = RawEntry {
            identifier: None,
            title: "t".to_string(),
            link: "l".to_string(),
            date: None,
        };
        assert!(accept_entry(raw.clone()).is_none());
        assert!(accept_entry(RawEntry {
            identifier: Some("  ".to_string()),
            ..raw.clone()
        })
        .is_none());
        assert_eq!(
            accept_entry(RawEntry {
                identifier: Some(" 32025R0002 ".to_string()),
                ..raw
            })
            .unwrap()
            .identifier,
            "32025R0002"
        );
    }

    #[test]
    fn query_url_placeholders() {
        let url = build_query_url(
            "https://x.test/search.html?{filter}&date0=ALL%3A0101{year}%7C3112{year}&page={page}",
            2024,
            3,
            "DB_TYPE_OF_ACT=regulation",
        );
        assert_eq!(
            url,
            "https://x.test/search.html?DB_TYPE_OF_ACT=regulation&date0=ALL%3A01012024%7C31122024&page=3"
        );
    }
}
