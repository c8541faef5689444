//! TOML configuration parsing and validation.
//!
//! Every section has serde defaults so a minimal file only needs `[db]`,
//! `[paths]` and at least one `[[sources]]` entry. Validation happens once in
//! [`load_config`]; configuration problems are the only errors that abort a
//! run before any work starts.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::SelectionError;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    pub paths: PathsConfig,
    #[serde(default)]
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
    #[serde(default)]
    pub pdf: PdfConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PathsConfig {
    pub raw_dir: PathBuf,
    pub summary_dir: PathBuf,
    #[serde(default = "default_pdf_dir")]
    pub pdf_dir: PathBuf,
}

fn default_pdf_dir() -> PathBuf {
    PathBuf::from("data/pdf")
}

/// How a source's documents are retrieved after harvesting.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    /// Rendered HTML page, text extracted by the content fetcher.
    Html,
    /// Binary PDF download, text extracted by `clean-pdfs`.
    Pdf,
}

/// One remote listing interface and the Record Store it feeds.
#[derive(Debug, Deserialize, Clone)]
pub struct SourceConfig {
    pub name: String,
    /// Persisted Record Store (JSON array) for this source.
    pub metadata: PathBuf,
    /// URL template with `{year}`, `{page}` and `{filter}` placeholders.
    pub query_url: String,
    /// Base for resolving relative result links.
    pub base_url: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default = "default_format")]
    pub format: DocumentFormat,
    #[serde(default)]
    pub single_page: bool,
    #[serde(default = "default_date_format")]
    pub date_format: String,
    #[serde(default)]
    pub max_pages: Option<u32>,
    #[serde(default)]
    pub categories: Vec<CategoryQuery>,
}

/// A named listing category and its query-parameter filter.
#[derive(Debug, Deserialize, Clone)]
pub struct CategoryQuery {
    pub name: String,
    #[serde(default)]
    pub filter: String,
}

fn default_language() -> String {
    "EN".to_string()
}
fn default_format() -> DocumentFormat {
    DocumentFormat::Html
}
pub fn default_date_format() -> String {
    "%d/%m/%Y".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    #[serde(default = "default_target_year")]
    pub target_year: i32,
    #[serde(default = "default_page_timeout_secs")]
    pub page_timeout_secs: u64,
    /// Wait after each listing navigation so client-side rendering settles.
    #[serde(default = "default_render_wait_ms")]
    pub render_wait_ms: u64,
    /// Wait after each document navigation.
    #[serde(default = "default_document_wait_ms")]
    pub document_wait_ms: u64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            target_year: default_target_year(),
            page_timeout_secs: default_page_timeout_secs(),
            render_wait_ms: default_render_wait_ms(),
            document_wait_ms: default_document_wait_ms(),
        }
    }
}

fn default_target_year() -> i32 {
    2025
}
fn default_page_timeout_secs() -> u64 {
    300
}
fn default_render_wait_ms() -> u64 {
    5000
}
fn default_document_wait_ms() -> u64 {
    3000
}

/// Directory layout of the summarized artifacts.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SummaryLayout {
    /// `summary_dir/<category>/<identifier>.txt`
    Nested,
    /// `summary_dir/<identifier>.txt`
    Flat,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ProcessingConfig {
    #[serde(default = "default_layout")]
    pub layout: SummaryLayout,
    #[serde(default = "default_categorize_words")]
    pub categorize_words: usize,
    #[serde(default = "default_truncate_words")]
    pub truncate_words: usize,
    #[serde(default = "default_summary_tokens")]
    pub summary_tokens: usize,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default = "default_categories")]
    pub categories: Vec<String>,
    #[serde(default = "default_fallback_category")]
    pub fallback_category: String,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            layout: default_layout(),
            categorize_words: default_categorize_words(),
            truncate_words: default_truncate_words(),
            summary_tokens: default_summary_tokens(),
            include_globs: default_include_globs(),
            categories: default_categories(),
            fallback_category: default_fallback_category(),
        }
    }
}

fn default_layout() -> SummaryLayout {
    SummaryLayout::Nested
}
fn default_categorize_words() -> usize {
    800
}
fn default_truncate_words() -> usize {
    5000
}
fn default_summary_tokens() -> usize {
    600
}
fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}
fn default_categories() -> Vec<String> {
    crate::categories::EU_DOMAINS
        .iter()
        .map(|s| s.to_string())
        .collect()
}
fn default_fallback_category() -> String {
    crate::categories::UNIDENTIFIED.to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PdfConfig {
    #[serde(default = "default_skip_first_page")]
    pub skip_first_page: bool,
    #[serde(default = "default_strip_patterns")]
    pub strip_patterns: Vec<String>,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            skip_first_page: default_skip_first_page(),
            strip_patterns: default_strip_patterns(),
        }
    }
}

fn default_skip_first_page() -> bool {
    true
}
fn default_strip_patterns() -> Vec<String> {
    vec![
        r"MONITORUL OFICIAL.*\n".to_string(),
        r"(?m)^\s*P A R T E A.*\n".to_string(),
        r"(?m)^.*ISSN.*$".to_string(),
    ]
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_llm_model")]
    pub model: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_llm_model(),
            base_url: default_openai_base_url(),
            max_retries: default_max_retries(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

impl LlmConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_timeout_secs() -> u64 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            base_url: default_openai_base_url(),
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
        }
    }
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}

/// Unit in which chunk size and overlap are measured.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    Characters,
    /// Approximate model tokens (fixed chars-per-token ratio).
    Tokens,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_chunk_unit")]
    pub unit: ChunkUnit,
    #[serde(default = "default_chunk_size")]
    pub size: usize,
    #[serde(default)]
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            unit: default_chunk_unit(),
            size: default_chunk_size(),
            overlap: 0,
        }
    }
}

fn default_chunk_unit() -> ChunkUnit {
    ChunkUnit::Characters
}
fn default_chunk_size() -> usize {
    600
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
        }
    }
}

fn default_top_k() -> usize {
    5
}

impl Config {
    /// Look up a configured source by name.
    pub fn source(&self, name: &str) -> Result<&SourceConfig, SelectionError> {
        self.sources
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SelectionError::UnknownSource {
                name: name.to_string(),
                available: self.sources.iter().map(|s| s.name.clone()).collect(),
            })
    }

    /// Resolve an optional `--source` selection into the list of sources to run.
    pub fn select_sources(&self, name: Option<&str>) -> Result<Vec<&SourceConfig>, SelectionError> {
        match name {
            Some(n) => Ok(vec![self.source(n)?]),
            None => Ok(self.sources.iter().collect()),
        }
    }
}

impl SourceConfig {
    /// Resolve an optional `--category` selection into the categories to harvest.
    pub fn select_categories(
        &self,
        name: Option<&str>,
    ) -> Result<Vec<&CategoryQuery>, SelectionError> {
        match name {
            Some(n) => self
                .categories
                .iter()
                .find(|c| c.name == n)
                .map(|c| vec![c])
                .ok_or_else(|| SelectionError::UnknownCategory {
                    source_name: self.name.clone(),
                    name: n.to_string(),
                    available: self.categories.iter().map(|c| c.name.clone()).collect(),
                }),
            None => Ok(self.categories.iter().collect()),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    // Sources
    let mut seen = std::collections::HashSet::new();
    for source in &config.sources {
        if !seen.insert(source.name.as_str()) {
            bail!("duplicate source name: '{}'", source.name);
        }
        if !source.query_url.contains("{page}") {
            bail!(
                "sources.{}.query_url must contain a {{page}} placeholder",
                source.name
            );
        }
        if url::Url::parse(&source.base_url).is_err() {
            bail!("sources.{}.base_url is not a valid URL", source.name);
        }
        if source.max_pages == Some(0) {
            bail!("sources.{}.max_pages must be >= 1", source.name);
        }
    }

    // Chunking
    if config.chunking.size == 0 {
        bail!("chunking.size must be > 0");
    }
    if config.chunking.overlap >= config.chunking.size {
        bail!("chunking.overlap must be smaller than chunking.size");
    }

    // Processing
    if config.processing.categories.is_empty() {
        bail!("processing.categories must not be empty");
    }
    if !config
        .processing
        .categories
        .contains(&config.processing.fallback_category)
    {
        bail!(
            "processing.fallback_category '{}' is not in processing.categories",
            config.processing.fallback_category
        );
    }
    if config.processing.categorize_words == 0 || config.processing.truncate_words == 0 {
        bail!("processing word limits must be > 0");
    }

    for pattern in &config.pdf.strip_patterns {
        regex::Regex::new(pattern)
            .with_context(|| format!("invalid pdf.strip_patterns entry: {}", pattern))?;
    }

    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }

    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }

    // Embedding
    if config.embedding.is_enabled() {
        if config.embedding.provider == "openai"
            && (config.embedding.dims.is_none() || config.embedding.dims == Some(0))
        {
            bail!(
                "embedding.dims must be > 0 when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.provider == "openai" && config.embedding.model.is_none() {
            bail!(
                "embedding.model must be specified when provider is '{}'",
                config.embedding.provider
            );
        }
        if config.embedding.batch_size == 0 {
            bail!("embedding.batch_size must be > 0");
        }
    }

    match config.embedding.provider.as_str() {
        "disabled" | "openai" | "local" => {}
        other => bail!(
            "Unknown embedding provider: '{}'. Must be disabled, openai, or local.",
            other
        ),
    }

    Ok(())
}
