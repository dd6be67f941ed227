//! Embedding provider abstraction and implementations.
//!
//! Defines the [`EmbeddingProvider`] trait and the concrete backends:
//! - **openai** — calls an embeddings API with batching, retry, and backoff.
//! - **hash** — deterministic local embeddings from hashed character trigrams;
//!   no network, usable for tests and offline setups.
//!
//! Also provides the vector helpers shared with the SQLite index:
//! [`vec_to_blob`] / [`blob_to_vec`] for BLOB storage and
//! [`cosine_similarity`] for ranking.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::time::Duration;

use crate::config::EmbeddingConfig;

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Model identifier recorded next to each stored vector.
    fn model_name(&self) -> &str;

    /// Vector dimensionality.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input, in input order.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

/// Embed a single query text.
pub async fn embed_query(provider: &dyn EmbeddingProvider, text: &str) -> Result<Vec<f32>> {
    let results = provider.embed(&[text.to_string()]).await?;
    results
        .into_iter()
        .next()
        .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))
}

/// Instantiate the provider named in the configuration.
pub fn create_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    match config.provider.as_str() {
        "openai" => Ok(Box::new(OpenAIEmbeddings::new(config)?)),
        "hash" => Ok(Box::new(HashEmbeddings::new(config.dims))),
        "disabled" => bail!("Embedding provider is disabled. Set [embedding] provider in config."),
        other => bail!("Unknown embedding provider: {}", other),
    }
}

// ============ OpenAI provider ============

/// Embeddings via `POST /v1/embeddings` on an OpenAI-compatible endpoint.
/// Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAIEmbeddings {
    model: String,
    dims: usize,
    max_retries: u32,
    timeout: Duration,
}

impl OpenAIEmbeddings {
    pub fn new(config: &EmbeddingConfig) -> Result<Self> {
        let model = config
            .model
            .clone()
            .ok_or_else(|| anyhow::anyhow!("embedding.model required for the openai provider"))?;
        if std::env::var("OPENAI_API_KEY").is_err() {
            bail!("OPENAI_API_KEY environment variable not set");
        }
        Ok(Self {
            model,
            dims: config.dims,
            max_retries: config.max_retries,
            timeout: Duration::from_secs(config.timeout_secs),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddings {
    fn model_name(&self) -> &str {
        &self.model
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow::anyhow!("OPENAI_API_KEY not set"))?;

        let client = reqwest::Client::builder().timeout(self.timeout).build()?;

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let resp = client
                .post("https://api.openai.com/v1/embeddings")
                .header("Authorization", format!("Bearer {}", api_key))
                .json(&body)
                .send()
                .await;

            match resp {
                Ok(response) => {
                    let status = response.status();

                    if status.is_success() {
                        let json: serde_json::Value = response.json().await?;
                        return parse_embeddings_response(&json);
                    }

                    // Rate limited or server error — retry
                    if status.as_u16() == 429 || status.is_server_error() {
                        let body_text = response.text().await.unwrap_or_default();
                        last_err =
                            Some(anyhow::anyhow!("embeddings API {}: {}", status, body_text));
                        continue;
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    bail!("embeddings API {}: {}", status, body_text);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow::anyhow!("Embedding failed after retries")))
    }
}

fn parse_embeddings_response(json: &serde_json::Value) -> Result<Vec<Vec<f32>>> {
    let data = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing data array"))?;

    let mut embeddings = Vec::with_capacity(data.len());
    for item in data {
        let embedding = item
            .get("embedding")
            .and_then(|e| e.as_array())
            .ok_or_else(|| anyhow::anyhow!("Invalid embeddings response: missing embedding"))?;
        embeddings.push(
            embedding
                .iter()
                .map(|v| v.as_f64().unwrap_or(0.0) as f32)
                .collect(),
        );
    }

    Ok(embeddings)
}

// ============ Hash provider ============

/// Deterministic local embeddings: each character trigram is hashed into one
/// of `dims` buckets and the counts are L2-normalized. Overlapping vocabulary
/// between a query and a chunk yields a higher cosine similarity, which is
/// enough for exact-term lookup without any network dependency.
pub struct HashEmbeddings {
    dims: usize,
}

impl HashEmbeddings {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0.0f32; self.dims];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        for window in chars.windows(3) {
            let trigram: String = window.iter().collect();
            let mut hasher = Sha256::new();
            hasher.update(trigram.as_bytes());
            let digest = hasher.finalize();
            let bucket = u64::from_le_bytes(digest[..8].try_into().unwrap()) as usize % self.dims;
            vec[bucket] += 1.0;
        }

        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddings {
    fn model_name(&self) -> &str {
        "hash-trigram"
    }

    fn dims(&self) -> usize {
        self.dims
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

// ============ Vector helpers ============

/// Encode a float vector as little-endian f32 bytes for SQLite BLOB storage.
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Cosine similarity in `[-1.0, 1.0]`; `0.0` for empty or mismatched lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        let blob = vec_to_blob(&vec);
        assert_eq!(blob.len(), 20);
        assert_eq!(blob_to_vec(&blob), vec);
    }

    #[test]
    fn cosine_identical_and_empty() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[tokio::test]
    async fn hash_embeddings_are_deterministic() {
        let provider = HashEmbeddings::new(64);
        let a = provider.embed(&["hello: hola".to_string()]).await.unwrap();
        let b = provider.embed(&["hello: hola".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
    }

    #[tokio::test]
    async fn hash_embeddings_rank_shared_vocabulary_higher() {
        let provider = HashEmbeddings::new(128);
        let texts = vec![
            "hello".to_string(),
            "hello: hola (greeting)".to_string(),
            "zanahoria: carrot (vegetable)".to_string(),
        ];
        let vecs = provider.embed(&texts).await.unwrap();
        let related = cosine_similarity(&vecs[0], &vecs[1]);
        let unrelated = cosine_similarity(&vecs[0], &vecs[2]);
        assert!(
            related > unrelated,
            "related={} unrelated={}",
            related,
            unrelated
        );
    }
}
