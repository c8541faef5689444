use anyhow::Result;
use sqlx::SqlitePool;

/// Create the index tables. Safe to run repeatedly.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_chunks (
            id TEXT PRIMARY KEY,
            source TEXT NOT NULL,
            identifier TEXT NOT NULL,
            category TEXT,
            chunk_index INTEGER NOT NULL,
            char_offset INTEGER NOT NULL,
            text TEXT NOT NULL,
            hash TEXT NOT NULL,
            UNIQUE(source, category, chunk_index)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS chunk_vectors (
            chunk_id TEXT PRIMARY KEY,
            dims INTEGER NOT NULL,
            embedding BLOB NOT NULL,
            FOREIGN KEY (chunk_id) REFERENCES index_chunks(id)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_index_chunks_category ON index_chunks(category)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_index_chunks_identifier ON index_chunks(identifier)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// `reglex init`: create the artifact directories and the index schema.
pub async fn run_init(config: &crate::config::Config) -> Result<()> {
    for dir in [
        &config.paths.raw_dir,
        &config.paths.summary_dir,
        &config.paths.pdf_dir,
    ] {
        std::fs::create_dir_all(dir)?;
    }

    let pool = crate::db::connect(config).await?;
    run_migrations(&pool).await?;
    pool.close().await;

    println!("init");
    println!("  raw: {}", config.paths.raw_dir.display());
    println!("  summaries: {}", config.paths.summary_dir.display());
    println!("  pdf: {}", config.paths.pdf_dir.display());
    println!("  index: {}", config.db.path.display());
    println!("ok");
    Ok(())
}
