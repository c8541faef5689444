use anyhow::{bail, Result};

use crate::config::Config;
use crate::embedding::{self, Embedder};
use crate::index::{SqliteIndex, VectorIndex};
use crate::models::SearchHit;

/// Embed `query` and return the `k` most similar chunks, optionally within
/// one category. An empty query returns nothing.
pub async fn retrieve(
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    query: &str,
    k: usize,
    category: Option<&str>,
) -> Result<Vec<SearchHit>> {
    if query.trim().is_empty() || k == 0 {
        return Ok(Vec::new());
    }
    let query_vec = embedding::embed_query(embedder, query).await?;
    index.search(&query_vec, k, category).await
}

/// One-line preview of a chunk for terminal output.
pub fn snippet(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let cut: String = flat.chars().take(max_chars).collect();
    format!("{}…", cut.trim_end())
}

/// `reglex search`
pub async fn run_search(
    config: &Config,
    query: &str,
    category: Option<&str>,
    limit: Option<usize>,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }
    if !config.embedding.is_enabled() {
        bail!("Search requires embeddings. Set [embedding] provider in config.");
    }

    let embedder = embedding::create_embedder(&config.embedding)?;
    let index = SqliteIndex::open(&config.db.path).await?;
    let k = limit.unwrap_or(config.retrieval.top_k);
    let hits = retrieve(embedder.as_ref(), &index, query, k, category).await?;
    index.close().await;

    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} ({})",
            i + 1,
            hit.score,
            hit.source,
            hit.category.as_deref().unwrap_or("-")
        );
        println!("    {}", snippet(&hit.text, 200));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snippet_flattens_and_truncates() {
        assert_eq!(snippet("a\n\nb  c", 10), "a b c");
        assert_eq!(snippet("abcdef ghij", 6), "abcdef…");
    }
}
