//! Persisted, deduplicated, date-sorted Record Store.
//!
//! The store is one pretty-printed JSON array per source. It is loaded fully
//! into memory, merged with replace-on-conflict semantics, and rewritten as a
//! whole (temp file + rename) so readers never see a half-merged artifact.
//! A missing artifact loads as an empty store.

use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::models::Record;

/// Outcome of a [`RecordStore::merge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeResult {
    /// Records inserted or replaced. Identical re-discoveries are not counted.
    pub updated_count: usize,
}

pub struct RecordStore {
    path: PathBuf,
    date_format: String,
    records: HashMap<String, Record>,
}

impl RecordStore {
    /// Load the store at `path`. A missing file yields an empty store.
    pub fn load(path: &Path, date_format: &str) -> Result<Self> {
        let records = match std::fs::read_to_string(path) {
            Ok(content) => {
                let list: Vec<Record> = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse record store: {}", path.display()))?;
                list.into_iter()
                    .map(|r| (r.identifier.clone(), r))
                    .collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read record store: {}", path.display()))
            }
        };

        Ok(Self {
            path: path.to_path_buf(),
            date_format: date_format.to_string(),
            records,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, identifier: &str) -> Option<&Record> {
        self.records.get(identifier)
    }

    /// Merge newly discovered records.
    ///
    /// A record replaces the stored one when it is new or any tracked field
    /// differs. Records absent from `new_records` are never removed: a paged
    /// harvest is not the full universe.
    pub fn merge(&mut self, new_records: Vec<Record>) -> MergeResult {
        let mut result = MergeResult::default();
        for record in new_records {
            if self.records.get(&record.identifier) == Some(&record) {
                continue;
            }
            self.records.insert(record.identifier.clone(), record);
            result.updated_count += 1;
        }
        result
    }

    /// All records, newest publication date first.
    ///
    /// Dates that do not parse with the store's format sort last. Ties are
    /// broken by identifier so the view is deterministic.
    pub fn sorted_view(&self) -> Vec<Record> {
        let mut keyed: Vec<(Option<NaiveDate>, &Record)> = self
            .records
            .values()
            .map(|r| (parse_date(r.date.as_deref(), &self.date_format), r))
            .collect();

        keyed.sort_by(|(da, ra), (db, rb)| {
            compare_dates_desc(*da, *db).then_with(|| ra.identifier.cmp(&rb.identifier))
        });

        keyed.into_iter().map(|(_, r)| r.clone()).collect()
    }

    /// Rewrite the whole artifact, sorted, via a temp file and rename.
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let json = serde_json::to_string_pretty(&self.sorted_view())?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }
}

/// Parse a free-text publication date; `None` when absent or unparsable.
pub fn parse_date(date: Option<&str>, format: &str) -> Option<NaiveDate> {
    date.and_then(|d| NaiveDate::parse_from_str(d.trim(), format).ok())
}

fn compare_dates_desc(a: Option<NaiveDate>, b: Option<NaiveDate>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// `reglex records`: the sorted view of each selected source's store.
pub fn run_records(config: &Config, source: Option<&str>, limit: Option<usize>) -> Result<()> {
    for src in config.select_sources(source)? {
        let store = RecordStore::load(&src.metadata, &src.date_format)?;
        println!("records {} ({})", src.name, store.len());
        for record in store.sorted_view().iter().take(limit.unwrap_or(usize::MAX)) {
            println!(
                "  {}  {}  {}  {}",
                record.identifier,
                record.date.as_deref().unwrap_or("-"),
                record.category.as_deref().unwrap_or("-"),
                record.title
            );
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(id: &str, date: Option<&str>) -> Record {
        Record {
            identifier: id.to_string(),
            title: format!("Regulation {}", id),
            link: format!("https://example.test/{}", id),
            date: date.map(str::to_string),
            page: 1,
            category: Some("regulation".to_string()),
        }
    }

    fn empty_store(tmp: &TempDir) -> RecordStore {
        RecordStore::load(&tmp.path().join("records.json"), "%d/%m/%Y").unwrap()
    }

    #[test]
    fn load_missing_file_is_empty() {
        let tmp = TempDir::new().unwrap();
        let store = empty_store(&tmp);
        assert!(store.is_empty());
    }

    #[test]
    fn merging_identical_record_twice_counts_once() {
        let tmp = TempDir::new().unwrap();
        let mut store = empty_store(&tmp);

        let first = store.merge(vec![record("A", Some("01/02/2025"))]);
        assert_eq!(first.updated_count, 1);

        let before = store.sorted_view();
        let second = store.merge(vec![record("A", Some("01/02/2025"))]);
        assert_eq!(second.updated_count, 0);
        assert_eq!(store.sorted_view(), before);
    }

    #[test]
    fn changed_field_replaces_and_keeps_others() {
        let tmp = TempDir::new().unwrap();
        let mut store = empty_store(&tmp);
        store.merge(vec![record("A", Some("01/02/2025")), record("B", None)]);

        let mut changed = record("A", Some("01/02/2025"));
        changed.title = "Amended title".to_string();
        let result = store.merge(vec![changed]);

        assert_eq!(result.updated_count, 1);
        assert_eq!(store.len(), 2);
        assert_eq!(store.get("A").unwrap().title, "Amended title");
        assert!(store.get("B").is_some());
    }

    #[test]
    fn sorted_view_descending_with_unparsable_last() {
        let tmp = TempDir::new().unwrap();
        let mut store = empty_store(&tmp);
        store.merge(vec![
            record("OLD", Some("05/01/2024")),
            record("BAD", Some("sometime in 2025")),
            record("NEW", Some("20/03/2025")),
            record("NONE", None),
            record("MID", Some("01/12/2024")),
        ]);

        let ids: Vec<String> = store
            .sorted_view()
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        assert_eq!(ids, vec!["NEW", "MID", "OLD", "BAD", "NONE"]);

        let again: Vec<String> = store
            .sorted_view()
            .into_iter()
            .map(|r| r.identifier)
            .collect();
        assert_eq!(ids, again);
    }

    #[test]
    fn save_then_load_preserves_order_and_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested/records.json");
        let mut store = RecordStore::load(&path, "%d/%m/%Y").unwrap();
        store.merge(vec![
            record("OLD", Some("05/01/2024")),
            record("NEW", Some("20/03/2025")),
        ]);
        store.save().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        assert!(raw.contains("\"celex\": \"NEW\""));
        assert!(raw.find("NEW").unwrap() < raw.find("OLD").unwrap());
        assert!(!path.with_extension("json.tmp").exists());

        let reloaded = RecordStore::load(&path, "%d/%m/%Y").unwrap();
        assert_eq!(reloaded.sorted_view(), store.sorted_view());
    }

    #[test]
    fn corrupt_store_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("records.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(RecordStore::load(&path, "%d/%m/%Y").is_err());
    }
}
