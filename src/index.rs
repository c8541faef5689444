//! Index builder and the similarity index it writes into.
//!
//! A build is never incremental: every summarized artifact currently on
//! disk is chunked and embedded, then the index contents are replaced.
//! Chunks are tagged with the artifact's file name, identifier, category
//! and character offset.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqliteConnection, SqlitePool};
use std::path::Path;
use std::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::artifacts::SummaryArtifacts;
use crate::chunk::{chunk_text, content_hash};
use crate::config::{ChunkingConfig, Config};
use crate::db;
use crate::embedding::{self, Embedder};
use crate::migrate;
use crate::models::{IndexChunk, SearchHit};
use crate::progress::{ProgressEvent, ProgressReporter};

/// Storage for embedded chunks with top-k cosine retrieval.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn clear(&self) -> Result<()>;
    /// `vectors[i]` belongs to `chunks[i]`.
    async fn insert(&self, chunks: &[IndexChunk], vectors: &[Vec<f32>]) -> Result<()>;
    /// Best `k` chunks by cosine similarity, optionally restricted to one
    /// category.
    async fn search(&self, query: &[f32], k: usize, category: Option<&str>)
        -> Result<Vec<SearchHit>>;
    async fn count(&self) -> Result<usize>;

    /// Swap the whole contents for `chunks`. A failed replacement keeps the
    /// previous contents.
    async fn replace_all(&self, chunks: &[IndexChunk], vectors: &[Vec<f32>]) -> Result<()> {
        self.clear().await?;
        self.insert(chunks, vectors).await
    }
}

fn rank(mut hits: Vec<SearchHit>, k: usize) -> Vec<SearchHit> {
    hits.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.chunk_id.cmp(&b.chunk_id))
    });
    hits.truncate(k);
    hits
}

// ============ SQLite ============

/// Index persisted in the configured SQLite database. Search is brute-force
/// cosine over the stored vectors.
pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    pub async fn open(db_path: &Path) -> Result<Self> {
        let pool = db::connect_path(db_path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

fn check_lengths(chunks: &[IndexChunk], vectors: &[Vec<f32>]) -> Result<()> {
    if chunks.len() != vectors.len() {
        bail!(
            "chunk/vector count mismatch: {} chunks, {} vectors",
            chunks.len(),
            vectors.len()
        );
    }
    Ok(())
}

async fn delete_rows(conn: &mut SqliteConnection) -> Result<()> {
    sqlx::query("DELETE FROM chunk_vectors")
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM index_chunks")
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn insert_rows(
    conn: &mut SqliteConnection,
    chunks: &[IndexChunk],
    vectors: &[Vec<f32>],
) -> Result<()> {
    for (chunk, vector) in chunks.iter().zip(vectors) {
        sqlx::query(
            "INSERT INTO index_chunks (id, source, identifier, category, chunk_index, char_offset, text, hash)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&chunk.id)
        .bind(&chunk.source)
        .bind(&chunk.identifier)
        .bind(&chunk.category)
        .bind(chunk.chunk_index)
        .bind(chunk.offset)
        .bind(&chunk.text)
        .bind(&chunk.hash)
        .execute(&mut *conn)
        .await?;

        sqlx::query("INSERT INTO chunk_vectors (chunk_id, dims, embedding) VALUES (?, ?, ?)")
            .bind(&chunk.id)
            .bind(vector.len() as i64)
            .bind(embedding::vec_to_blob(vector))
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

#[async_trait]
impl VectorIndex for SqliteIndex {
    async fn clear(&self) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        delete_rows(&mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn insert(&self, chunks: &[IndexChunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_lengths(chunks, vectors)?;
        let mut tx = self.pool.begin().await?;
        insert_rows(&mut tx, chunks, vectors).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Delete and refill in one transaction; readers see either the old
    /// index or the new one.
    async fn replace_all(&self, chunks: &[IndexChunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_lengths(chunks, vectors)?;
        let mut tx = self.pool.begin().await?;
        delete_rows(&mut tx).await?;
        insert_rows(&mut tx, chunks, vectors).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        category: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let rows = sqlx::query(
            r#"
            SELECT c.id, c.source, c.identifier, c.category, c.text, v.embedding
            FROM index_chunks c
            JOIN chunk_vectors v ON v.chunk_id = c.id
            WHERE ?1 IS NULL OR c.category = ?1
            "#,
        )
        .bind(category)
        .fetch_all(&self.pool)
        .await?;

        let hits = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                SearchHit {
                    chunk_id: row.get("id"),
                    source: row.get("source"),
                    identifier: row.get("identifier"),
                    category: row.get("category"),
                    score: embedding::cosine_similarity(query, &embedding::blob_to_vec(&blob)),
                    text: row.get("text"),
                }
            })
            .collect();
        Ok(rank(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM index_chunks")
            .fetch_one(&self.pool)
            .await?;
        Ok(n as usize)
    }
}

// ============ In-memory ============

/// Index held in process memory; used by tests and one-shot runs.
#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<Vec<(IndexChunk, Vec<f32>)>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the stored chunks, in insertion order.
    pub fn chunks(&self) -> Result<Vec<IndexChunk>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("index lock poisoned"))?;
        Ok(entries.iter().map(|(c, _)| c.clone()).collect())
    }
}

#[async_trait]
impl VectorIndex for InMemoryIndex {
    async fn clear(&self) -> Result<()> {
        self.entries
            .write()
            .map_err(|_| anyhow!("index lock poisoned"))?
            .clear();
        Ok(())
    }

    async fn insert(&self, chunks: &[IndexChunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_lengths(chunks, vectors)?;
        let mut entries = self
            .entries
            .write()
            .map_err(|_| anyhow!("index lock poisoned"))?;
        entries.extend(chunks.iter().cloned().zip(vectors.iter().cloned()));
        Ok(())
    }

    async fn replace_all(&self, chunks: &[IndexChunk], vectors: &[Vec<f32>]) -> Result<()> {
        check_lengths(chunks, vectors)?;
        let fresh = chunks.iter().cloned().zip(vectors.iter().cloned()).collect();
        *self
            .entries
            .write()
            .map_err(|_| anyhow!("index lock poisoned"))? = fresh;
        Ok(())
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        category: Option<&str>,
    ) -> Result<Vec<SearchHit>> {
        let entries = self
            .entries
            .read()
            .map_err(|_| anyhow!("index lock poisoned"))?;
        let hits = entries
            .iter()
            .filter(|(c, _)| category.is_none() || c.category.as_deref() == category)
            .map(|(c, v)| SearchHit {
                chunk_id: c.id.clone(),
                source: c.source.clone(),
                identifier: c.identifier.clone(),
                category: c.category.clone(),
                score: embedding::cosine_similarity(query, v),
                text: c.text.clone(),
            })
            .collect();
        Ok(rank(hits, k))
    }

    async fn count(&self) -> Result<usize> {
        Ok(self
            .entries
            .read()
            .map_err(|_| anyhow!("index lock poisoned"))?
            .len())
    }
}

// ============ Build ============

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexReport {
    pub files: usize,
    pub chunks: usize,
}

/// Rebuild `index` from every summarized artifact.
///
/// All chunks are embedded before the index is touched, and the swap is a
/// single `replace_all`, so a failing embedder or insert leaves the previous
/// index in place.
pub async fn build_index(
    artifacts: &SummaryArtifacts,
    chunking: &ChunkingConfig,
    embedder: &dyn Embedder,
    index: &dyn VectorIndex,
    batch_size: usize,
    progress: &dyn ProgressReporter,
) -> Result<IndexReport> {
    let files = artifacts.list()?;

    let mut chunks = Vec::new();
    for artifact in &files {
        let text = std::fs::read_to_string(&artifact.path)
            .with_context(|| format!("Failed to read {}", artifact.path.display()))?;
        for piece in chunk_text(&text, chunking) {
            chunks.push(IndexChunk {
                id: Uuid::new_v4().to_string(),
                source: artifact.file_name.clone(),
                identifier: artifact.identifier.clone(),
                category: artifact.category.clone(),
                chunk_index: piece.index,
                offset: piece.offset as i64,
                hash: content_hash(&piece.text),
                text: piece.text,
            });
        }
    }

    let total = chunks.len() as u64;
    let mut vectors = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(batch_size.max(1)) {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder.embed(&texts).await?;
        if embedded.len() != batch.len() {
            bail!(
                "embedder returned {} vectors for {} texts",
                embedded.len(),
                batch.len()
            );
        }
        vectors.extend(embedded);
        progress.report(ProgressEvent::Indexing {
            n: vectors.len() as u64,
            total,
        });
    }

    index.replace_all(&chunks, &vectors).await?;

    info!(files = files.len(), chunks = chunks.len(), model = embedder.model_name(), "index rebuilt");
    Ok(IndexReport {
        files: files.len(),
        chunks: chunks.len(),
    })
}

/// `reglex index`
pub async fn run_index(config: &Config, progress: &dyn ProgressReporter) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Building the index requires embeddings. Set [embedding] provider in config.");
    }
    let embedder = embedding::create_embedder(&config.embedding)?;
    let index = SqliteIndex::open(&config.db.path).await?;
    let artifacts = SummaryArtifacts::new(
        &config.paths.summary_dir,
        config.processing.layout,
        &config.processing.categories,
    );

    let report = build_index(
        &artifacts,
        &config.chunking,
        embedder.as_ref(),
        &index,
        config.embedding.batch_size,
        progress,
    )
    .await?;
    index.close().await;

    println!("index");
    println!("  files: {}", report.files);
    println!("  chunks: {}", report.chunks);
    println!("  model: {}", embedder.model_name());
    println!("ok");
    Ok(())
}
