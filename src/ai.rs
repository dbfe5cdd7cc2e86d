//! Talks to OpenAI-compatible APIs for embeddings and LLM calls.
//! All optional — see AiConfig::from_env().

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::MemoirError;

fn ai_err(msg: impl Into<String>) -> MemoirError {
    MemoirError::AiBackend(msg.into())
}

/// Generation can take a while on shared inference endpoints.
const LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// Decoding controls: short, low-randomness answers.
const LLM_TEMPERATURE: f64 = 0.3;
const LLM_MAX_TOKENS: u32 = 400;

/// A black-box text generator: prompt in, text out, may fail transiently.
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String, MemoirError>;
}

/// Maps text to a fixed-length vector. Must be used consistently between
/// indexing and querying — mixing models invalidates all stored vectors.
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoirError>;
}

#[derive(Clone)]
pub struct AiConfig {
    pub llm_url: String,
    pub llm_key: String,
    pub llm_model: String,
    pub embed_url: String,
    pub embed_key: String,
    pub embed_model: String,
    pub client: reqwest::Client,
}

impl AiConfig {
    /// Returns `None` if `MEMOIR_LLM_URL` is not set.
    pub fn from_env() -> Option<Self> {
        let llm_url = std::env::var("MEMOIR_LLM_URL").ok()?;
        let llm_key = std::env::var("MEMOIR_LLM_KEY").unwrap_or_default();
        let llm_model =
            std::env::var("MEMOIR_LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());
        let embed_url = std::env::var("MEMOIR_EMBED_URL").unwrap_or_else(|_| {
            // Only rewrite if this looks like a chat completions endpoint
            if llm_url.contains("/chat/completions") {
                llm_url.replace("/chat/completions", "/embeddings")
            } else {
                format!("{}/embeddings", llm_url.trim_end_matches('/'))
            }
        });
        let embed_key =
            std::env::var("MEMOIR_EMBED_KEY").unwrap_or_else(|_| llm_key.clone());
        let embed_model = std::env::var("MEMOIR_EMBED_MODEL")
            .unwrap_or_else(|_| "text-embedding-3-small".into());

        let client = reqwest::Client::builder()
            .timeout(LLM_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");

        Some(Self {
            llm_url,
            llm_key,
            llm_model,
            embed_url,
            embed_key,
            embed_model,
            client,
        })
    }
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f64,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize, Clone)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

#[async_trait::async_trait]
impl LanguageModel for AiConfig {
    async fn generate(&self, prompt: &str) -> Result<String, MemoirError> {
        let req = ChatRequest {
            model: self.llm_model.clone(),
            messages: vec![ChatMessage { role: "user".into(), content: prompt.into() }],
            temperature: LLM_TEMPERATURE,
            max_tokens: LLM_MAX_TOKENS,
        };

        let mut builder = self.client.post(&self.llm_url).json(&req);
        if !self.llm_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.llm_key));
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| ai_err(format!("LLM request failed: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ai_err(format!("LLM returned {status}: {body}")));
        }

        let chat: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ai_err(format!("LLM response parse failed: {e}")))?;
        let content = chat
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        Ok(content)
    }
}

#[derive(Serialize)]
struct EmbedRequest {
    model: String,
    input: Vec<String>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    data: Vec<EmbedData>,
}

#[derive(Deserialize)]
struct EmbedData {
    embedding: Vec<f32>,
}

impl AiConfig {
    /// Generate embeddings for one or more texts in a single API call.
    pub async fn get_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoirError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        let req = EmbedRequest {
            model: self.embed_model.clone(),
            input: texts.to_vec(),
        };

        let mut builder = self.client.post(&self.embed_url).json(&req);
        if !self.embed_key.is_empty() {
            builder = builder.header("Authorization", format!("Bearer {}", self.embed_key));
        }

        let resp = builder
            .send()
            .await
            .map_err(|e| ai_err(format!("embedding request failed: {e}")))?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ai_err(format!("embedding API returned {status}: {body}")));
        }

        let embed_resp: EmbedResponse = resp
            .json()
            .await
            .map_err(|e| ai_err(format!("embedding response parse failed: {e}")))?;

        let embeddings: Vec<Vec<f32>> = embed_resp.data.into_iter().map(|d| d.embedding).collect();
        if embeddings.len() != texts.len() {
            return Err(ai_err(format!(
                "embedding count mismatch: sent {} texts, got {} embeddings",
                texts.len(),
                embeddings.len()
            )));
        }
        Ok(embeddings)
    }
}

#[async_trait::async_trait]
impl Embedder for AiConfig {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoirError> {
        let mut vecs = self.get_embeddings(&[text.to_string()]).await?;
        vecs.pop().ok_or_else(|| ai_err("no embedding returned"))
    }
}

/// Embedder that fronts another embedder with the shared LRU cache.
/// Used for query embeddings in the chat path.
pub struct CachedEmbedder<'a> {
    pub inner: &'a dyn Embedder,
    pub cache: crate::EmbedCache,
}

#[async_trait::async_trait]
impl Embedder for CachedEmbedder<'_> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, MemoirError> {
        if let Some(hit) = self.cache.get(text) {
            debug!(len = hit.len(), "embed cache hit");
            return Ok(hit);
        }
        let vec = self.inner.embed(text).await?;
        self.cache.insert(text.to_string(), vec.clone());
        Ok(vec)
    }
}

/// Invoke the model, retrying transient failures with a fixed pause.
///
/// The retry policy lives here, independent of the transport: `attempts` is
/// the total number of tries, `backoff` the pause between them.
pub async fn generate_with_retry(
    model: &dyn LanguageModel,
    prompt: &str,
    attempts: u32,
    backoff: Duration,
) -> Result<String, MemoirError> {
    let mut last_err = ai_err("no attempts made");
    for attempt in 1..=attempts.max(1) {
        match model.generate(prompt).await {
            Ok(text) => return Ok(text),
            Err(e) => {
                warn!(attempt, error = %e, "LLM call failed");
                last_err = e;
                if attempt < attempts {
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
    Err(last_err)
}

/// Cosine similarity between two vectors, in [-1, 1].
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for i in 0..a.len() {
        let (ai, bi) = (a[i] as f64, b[i] as f64);
        dot += ai * bi;
        na += ai * ai;
        nb += bi * bi;
    }
    let denom = na.sqrt() * nb.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}

/// Serialize an f32 vector to bytes (little-endian) for SQLite BLOB storage.
pub fn embedding_to_bytes(v: &[f32]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(v.len() * 4);
    for &f in v {
        buf.extend_from_slice(&f.to_le_bytes());
    }
    buf
}

/// Deserialize bytes back to an f32 vector.
pub fn bytes_to_embedding(b: &[u8]) -> Vec<f32> {
    b.chunks_exact(4)
        .map(|chunk| {
            let arr: [u8; 4] = chunk.try_into().expect("4 bytes");
            f32::from_le_bytes(arr)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_same_vec() {
        let v: Vec<f32> = vec![1.0, 2.0, 3.0];
        let sim = cosine_similarity(&v, &v);
        assert!((sim - 1.0).abs() < 1e-10);
    }

    #[test]
    fn cosine_perpendicular() {
        let a: Vec<f32> = vec![1.0, 0.0];
        let b: Vec<f32> = vec![0.0, 1.0];
        let sim = cosine_similarity(&a, &b);
        assert!(sim.abs() < 1e-10);
    }

    #[test]
    fn cosine_opposite() {
        let a: Vec<f32> = vec![1.0, 0.0];
        let b: Vec<f32> = vec![-1.0, 0.0];
        let sim = cosine_similarity(&a, &b);
        assert!((sim + 1.0).abs() < 1e-10);
    }

    #[test]
    fn cosine_empty() {
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn cosine_mismatched_dims() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn embedding_roundtrip() {
        let original: Vec<f32> = vec![1.0, -2.5, 3.125, 0.0, f32::MAX];
        let bytes = embedding_to_bytes(&original);
        let decoded = bytes_to_embedding(&bytes);
        assert_eq!(original, decoded);
    }
}
