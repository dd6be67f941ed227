//! Knowledge-index synchronization and retrieval.
//!
//! The derived chunk/embedding index is valid exactly when the persisted
//! corpus fingerprint matches the fingerprint of the corpus on disk. [`sync`]
//! is the one place that decides rebuild-vs-reuse; on a match it performs no
//! chunking and no embedding calls at all.
//!
//! The [`VectorStore`] trait is the retrieval oracle boundary: the SQLite
//! implementation stores chunks and embedding BLOBs and ranks by cosine
//! similarity, swapping the whole index inside a single transaction so a
//! reader never observes a half-rebuilt state.

use anyhow::Result;
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use tracing::{debug, info, warn};

use crate::chunk::{chunk_text, Chunk};
use crate::config::Config;
use crate::corpus::SourceDoc;
use crate::embedding::{self, EmbeddingProvider};
use crate::error::TutorError;
use crate::fingerprint::{self, Fingerprint};

/// One retrieved piece of knowledge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snippet {
    /// Filename the chunk came from.
    pub source: String,
    pub text: String,
}

/// Retrieval oracle over the chunk index.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Best-effort removal of the stale index. Callers treat failure as a
    /// warning, not a precondition for rebuilding.
    async fn clear(&self) -> Result<(), TutorError>;

    /// Replace the index contents with `chunks`, embedding them. Returns the
    /// number of vectors written. The swap must be atomic for readers.
    async fn rebuild(&self, chunks: &[Chunk]) -> Result<usize, TutorError>;

    /// Top-k most relevant snippets for `term`, in the backend's ranking
    /// order. An empty result means "no relevant knowledge" and is not an
    /// error.
    async fn query(&self, term: &str, k: usize) -> Result<Vec<Snippet>, TutorError>;
}

/// Result of one synchronization pass.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// True when the existing index was reused unchanged.
    pub reused: bool,
    pub fingerprint: Fingerprint,
    pub chunks: usize,
    pub embedded: usize,
}

/// Bring the index in line with the corpus.
///
/// Computes the current fingerprint; when `force` is false and the persisted
/// fingerprint equals it, the on-disk index is reused untouched. Otherwise the
/// corpus is re-chunked and re-embedded, and the new fingerprint is persisted
/// only after the rebuild succeeded. Index validity is a pure function of
/// corpus content — modification times play no part.
pub async fn sync(
    config: &Config,
    corpus: &[SourceDoc],
    store: &dyn VectorStore,
    force: bool,
) -> Result<SyncOutcome> {
    let current = fingerprint::fingerprint(corpus);
    let fp_path = config.fingerprint_path();

    if !force {
        if let Some(previous) = fingerprint::load(&fp_path)? {
            if previous == current {
                info!(files = corpus.len(), "corpus unchanged, reusing index");
                return Ok(SyncOutcome {
                    reused: true,
                    fingerprint: current,
                    chunks: 0,
                    embedded: 0,
                });
            }
            debug!("corpus fingerprint changed, rebuilding index");
        } else {
            debug!("no persisted fingerprint, building index");
        }
    }

    // Best-effort cleanup of the stale index; the transactional rebuild below
    // discards leftovers anyway.
    if let Err(e) = store.clear().await {
        warn!(error = %e, "failed to clear stale index, rebuilding over it");
    }

    let mut chunks: Vec<Chunk> = Vec::new();
    for doc in corpus {
        chunks.extend(chunk_text(
            &doc.name,
            &doc.text,
            config.chunking.max_chars,
            config.chunking.overlap_chars,
        ));
    }

    let embedded = store.rebuild(&chunks).await?;
    fingerprint::store(&fp_path, &current)?;

    info!(
        files = corpus.len(),
        chunks = chunks.len(),
        embedded,
        "index rebuilt"
    );

    Ok(SyncOutcome {
        reused: false,
        fingerprint: current,
        chunks: chunks.len(),
        embedded,
    })
}

/// Query the index for up to `k` snippets relevant to `term`.
///
/// The ordering is the backend's relevance ranking and is not re-sorted here.
/// An empty vector is a valid answer, distinct from a backend error.
pub async fn retrieve(
    store: &dyn VectorStore,
    term: &str,
    k: usize,
) -> Result<Vec<Snippet>, TutorError> {
    store.query(term, k).await
}

// ============ SQLite store ============

/// Chunk index backed by SQLite with embedding BLOBs.
pub struct SqliteVectorStore {
    pool: SqlitePool,
    provider: Box<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl SqliteVectorStore {
    pub fn new(pool: SqlitePool, provider: Box<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            pool,
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(pool: SqlitePool, config: &Config) -> Result<Self> {
        let provider = embedding::create_provider(&config.embedding)?;
        Ok(Self::new(pool, provider, config.embedding.batch_size))
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn clear(&self) -> Result<(), TutorError> {
        let index_err = |e: sqlx::Error| TutorError::Index(e.to_string());
        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&self.pool)
            .await
            .map_err(index_err)?;
        sqlx::query("DELETE FROM chunks")
            .execute(&self.pool)
            .await
            .map_err(index_err)?;
        Ok(())
    }

    async fn rebuild(&self, chunks: &[Chunk]) -> Result<usize, TutorError> {
        // Embed everything first so the write transaction stays short and a
        // failed embedding call leaves the old index in place.
        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embedded = self
                .provider
                .embed(&texts)
                .await
                .map_err(|e| TutorError::Index(e.to_string()))?;
            vectors.extend(embedded);
        }

        let index_err = |e: sqlx::Error| TutorError::Index(e.to_string());

        // Delete + insert in one transaction: readers see the old index or
        // the new one, never a mix.
        let mut tx = self.pool.begin().await.map_err(index_err)?;

        sqlx::query("DELETE FROM chunk_vectors")
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        sqlx::query("DELETE FROM chunks")
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;

        for (chunk, vec) in chunks.iter().zip(vectors.iter()) {
            sqlx::query(
                "INSERT INTO chunks (id, source, chunk_index, text, hash) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(&chunk.source)
            .bind(chunk.chunk_index)
            .bind(&chunk.text)
            .bind(&chunk.hash)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;

            let blob = embedding::vec_to_blob(vec);
            sqlx::query(
                "INSERT INTO chunk_vectors (chunk_id, model, dims, embedding) VALUES (?, ?, ?, ?)",
            )
            .bind(&chunk.id)
            .bind(self.provider.model_name())
            .bind(self.provider.dims() as i64)
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(index_err)?;
        }

        tx.commit().await.map_err(index_err)?;

        Ok(vectors.len())
    }

    async fn query(&self, term: &str, k: usize) -> Result<Vec<Snippet>, TutorError> {
        let query_vec = embedding::embed_query(self.provider.as_ref(), term)
            .await
            .map_err(|e| TutorError::Index(e.to_string()))?;

        let rows = sqlx::query(
            r#"
            SELECT c.source, c.text, cv.embedding
            FROM chunk_vectors cv
            JOIN chunks c ON c.id = cv.chunk_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| TutorError::Index(e.to_string()))?;

        let mut scored: Vec<(f32, Snippet)> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = embedding::blob_to_vec(&blob);
                let similarity = embedding::cosine_similarity(&query_vec, &vec);
                (
                    similarity,
                    Snippet {
                        source: row.get("source"),
                        text: row.get("text"),
                    },
                )
            })
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored.into_iter().map(|(_, s)| s).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ChunkingConfig, Config, DbConfig, EmbeddingConfig, KnowledgeConfig};
    use crate::embedding::HashEmbeddings;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn test_config(dir: &std::path::Path) -> Config {
        Config {
            db: DbConfig {
                path: dir.join("tutor.sqlite"),
            },
            knowledge: KnowledgeConfig {
                dir: dir.join("knowledge"),
                include_globs: vec!["**/*.txt".to_string()],
                fingerprint_path: Some(dir.join("fingerprint.json")),
            },
            chunking: ChunkingConfig {
                max_chars: 120,
                overlap_chars: 20,
            },
            retrieval: Default::default(),
            embedding: EmbeddingConfig {
                provider: "hash".to_string(),
                dims: 128,
                ..Default::default()
            },
            model: Default::default(),
            notion: Default::default(),
        }
    }

    fn doc(name: &str, text: &str) -> SourceDoc {
        SourceDoc {
            name: name.to_string(),
            text: text.to_string(),
        }
    }

    /// Store that counts calls instead of embedding anything.
    #[derive(Default)]
    struct CountingStore {
        clears: AtomicUsize,
        rebuilds: AtomicUsize,
        fail_clear: bool,
        fail_rebuild: bool,
        chunks_seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VectorStore for CountingStore {
        async fn clear(&self) -> Result<(), TutorError> {
            self.clears.fetch_add(1, Ordering::SeqCst);
            if self.fail_clear {
                return Err(TutorError::Index("stale index is locked".to_string()));
            }
            Ok(())
        }

        async fn rebuild(&self, chunks: &[Chunk]) -> Result<usize, TutorError> {
            self.rebuilds.fetch_add(1, Ordering::SeqCst);
            if self.fail_rebuild {
                return Err(TutorError::Index("embedding backend down".to_string()));
            }
            let mut seen = self.chunks_seen.lock().unwrap();
            seen.clear();
            seen.extend(chunks.iter().map(|c| c.text.clone()));
            Ok(chunks.len())
        }

        async fn query(&self, _term: &str, _k: usize) -> Result<Vec<Snippet>, TutorError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn first_sync_builds_and_persists_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(tmp.path());
        let corpus = vec![doc("vocab.txt", "hello: hola (greeting)")];
        let store = CountingStore::default();

        let outcome = sync(&cfg, &corpus, &store, false).await.unwrap();
        assert!(!outcome.reused);
        assert_eq!(outcome.chunks, 1);
        assert_eq!(store.rebuilds.load(Ordering::SeqCst), 1);
        assert!(cfg.fingerprint_path().exists());
    }

    #[tokio::test]
    async fn unchanged_corpus_reuses_index_without_rebuilding() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(tmp.path());
        let corpus = vec![doc("vocab.txt", "hello: hola (greeting)")];
        let store = CountingStore::default();

        let first = sync(&cfg, &corpus, &store, false).await.unwrap();
        let second = sync(&cfg, &corpus, &store, false).await.unwrap();

        assert!(second.reused);
        assert_eq!(second.embedded, 0);
        assert_eq!(second.fingerprint, first.fingerprint);
        // No second rebuild, no second clear.
        assert_eq!(store.rebuilds.load(Ordering::SeqCst), 1);
        assert_eq!(store.clears.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn changed_corpus_triggers_rebuild_with_fresh_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(tmp.path());
        let store = CountingStore::default();

        let before = vec![doc("vocab.txt", "hello: hola")];
        sync(&cfg, &before, &store, false).await.unwrap();

        let after = vec![doc("vocab.txt", "hello: hola\nmoon: luna")];
        let outcome = sync(&cfg, &after, &store, false).await.unwrap();

        assert!(!outcome.reused);
        assert_eq!(store.rebuilds.load(Ordering::SeqCst), 2);
        let persisted = fingerprint::load(&cfg.fingerprint_path()).unwrap().unwrap();
        assert_eq!(persisted, outcome.fingerprint);
    }

    #[tokio::test]
    async fn force_rebuilds_even_when_fingerprint_matches() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(tmp.path());
        let corpus = vec![doc("vocab.txt", "hello: hola")];
        let store = CountingStore::default();

        sync(&cfg, &corpus, &store, false).await.unwrap();
        let outcome = sync(&cfg, &corpus, &store, true).await.unwrap();

        assert!(!outcome.reused);
        assert_eq!(store.rebuilds.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failed_rebuild_persists_no_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(tmp.path());
        let corpus = vec![doc("vocab.txt", "hello: hola")];
        let store = CountingStore {
            fail_rebuild: true,
            ..Default::default()
        };

        let err = sync(&cfg, &corpus, &store, false).await.unwrap_err();
        assert!(err.to_string().contains("embedding backend down"));
        assert!(!cfg.fingerprint_path().exists());

        // With no fingerprint on disk the next sync cannot be a cache hit.
        let healthy = CountingStore::default();
        let outcome = sync(&cfg, &corpus, &healthy, false).await.unwrap();
        assert!(!outcome.reused);
        assert_eq!(healthy.rebuilds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_rebuild_keeps_the_previous_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(tmp.path());
        let store = CountingStore::default();

        let before = vec![doc("vocab.txt", "hello: hola")];
        let first = sync(&cfg, &before, &store, false).await.unwrap();

        let after = vec![doc("vocab.txt", "hello: hola\nmoon: luna")];
        let failing = CountingStore {
            fail_rebuild: true,
            ..Default::default()
        };
        sync(&cfg, &after, &failing, false).await.unwrap_err();

        // The edited corpus never made it into the index, so the persisted
        // fingerprint must still describe the old one.
        let persisted = fingerprint::load(&cfg.fingerprint_path()).unwrap().unwrap();
        assert_eq!(persisted, first.fingerprint);
    }

    #[tokio::test]
    async fn clear_failure_does_not_abort_the_rebuild() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(tmp.path());
        let corpus = vec![doc("vocab.txt", "hello: hola")];
        let store = CountingStore {
            fail_clear: true,
            ..Default::default()
        };

        let outcome = sync(&cfg, &corpus, &store, false).await.unwrap();
        assert!(!outcome.reused);
        assert_eq!(store.rebuilds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn sqlite_store_roundtrip_and_ranking() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(tmp.path());
        crate::migrate::run_migrations(&cfg).await.unwrap();
        let pool = crate::db::connect(&cfg.db.path).await.unwrap();
        let store = SqliteVectorStore::new(pool, Box::new(HashEmbeddings::new(128)), 16);

        let chunks = vec![
            chunk_text("saludos.txt", "hello: hola (greeting)", 120, 20).remove(0),
            chunk_text("verduras.txt", "zanahoria: carrot (vegetable)", 120, 20).remove(0),
        ];
        let embedded = store.rebuild(&chunks).await.unwrap();
        assert_eq!(embedded, 2);

        let results = retrieve(&store, "hello", 1).await.unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].text.contains("hola"));
        assert_eq!(results[0].source, "saludos.txt");
    }

    #[tokio::test]
    async fn sqlite_store_query_on_empty_index_is_not_an_error() {
        let tmp = TempDir::new().unwrap();
        let cfg = test_config(tmp.path());
        crate::migrate::run_migrations(&cfg).await.unwrap();
        let pool = crate::db::connect(&cfg.db.path).await.unwrap();
        let store = SqliteVectorStore::new(pool, Box::new(HashEmbeddings::new(64)), 16);

        let results = store.query("hello", 3).await.unwrap();
        assert!(results.is_empty());
    }
}
