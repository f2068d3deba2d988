use crate::config::{resolve_credential, EmbedderProvider, EmbedderSettings};
use crate::error::ProviderError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

const DEFAULT: usize = 128;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = DEFAULT;

/// Maps text to fixed-dimension vectors. Dimension must stay stable for the
/// lifetime of one index.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    /// One vector per input, same order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| ProviderError::MalformedResponse {
            backend: self.name().to_string(),
            details: "no vector returned for query".to_string(),
        })
    }
}

/// Offline embedder hashing character trigrams into unit-length buckets.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        let grams: Vec<&[char]> = if chars.len() < 3 {
            vec![chars.as_slice()]
        } else {
            chars.windows(3).collect()
        };

        for gram in grams {
            let token = gram.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    fn name(&self) -> &str {
        "local-ngram"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingRow {
    #[serde(default)]
    index: Option<usize>,
    embedding: Vec<f32>,
}

/// Client for OpenAI-compatible `/embeddings` endpoints.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: &str, model: impl Into<String>, api_key: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            client: Client::new(),
            endpoint: endpoint_url(base_url, "embeddings")?,
            model: model.into(),
            api_key: api_key.into(),
        })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai-embeddings"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&self.api_key)
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let details = response.text().await.unwrap_or_default();
            return Err(ProviderError::BackendResponse {
                backend: self.name().to_string(),
                status: status.as_u16(),
                details,
            });
        }

        let payload: EmbeddingResponse = response.json().await?;
        order_embedding_rows(payload.data, texts.len()).map_err(|details| {
            ProviderError::MalformedResponse {
                backend: self.name().to_string(),
                details,
            }
        })
    }
}

fn order_embedding_rows(mut rows: Vec<EmbeddingRow>, expected: usize) -> Result<Vec<Vec<f32>>, String> {
    if rows.len() != expected {
        return Err(format!("expected {expected} embeddings, got {}", rows.len()));
    }
    if rows.iter().all(|row| row.index.is_some()) {
        rows.sort_by_key(|row| row.index);
    }
    Ok(rows.into_iter().map(|row| row.embedding).collect())
}

/// Joins `path` onto `base`, treating `base` as a directory.
pub(crate) fn endpoint_url(base: &str, path: &str) -> Result<Url, ProviderError> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    Ok(Url::parse(&base)?.join(path)?)
}

/// The configured embedder, selected once at startup.
#[derive(Debug, Clone)]
pub enum EmbedderBackend {
    Local(CharacterNgramEmbedder),
    OpenAi(OpenAiEmbedder),
}

impl EmbedderBackend {
    pub fn from_settings(settings: &EmbedderSettings) -> Result<Self, ProviderError> {
        match settings.provider {
            EmbedderProvider::Local => Ok(Self::Local(CharacterNgramEmbedder {
                dimensions: settings.dimensions,
            })),
            EmbedderProvider::OpenAi => {
                let api_key = resolve_credential(settings.api_key.as_deref(), "OPENAI_API_KEY")
                    .ok_or_else(|| {
                        ProviderError::MissingCredential(
                            "set embedder.api_key or OPENAI_API_KEY for the openai embedder"
                                .to_string(),
                        )
                    })?;
                Ok(Self::OpenAi(OpenAiEmbedder::new(
                    &settings.base_url,
                    settings.model.clone(),
                    api_key,
                )?))
            }
        }
    }
}

#[async_trait]
impl Embedder for EmbedderBackend {
    fn name(&self) -> &str {
        match self {
            Self::Local(embedder) => embedder.name(),
            Self::OpenAi(embedder) => embedder.name(),
        }
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ProviderError> {
        match self {
            Self::Local(embedder) => embedder.embed_batch(texts).await,
            Self::OpenAi(embedder) => embedder.embed_batch(texts).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedder_is_deterministic() {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed_text("Hydraulic pressure and flow");
        let second = embedder.embed_text("Hydraulic pressure and flow");
        assert_eq!(first, second);
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed_text("abc");
        assert_eq!(vector.len(), 32);
    }

    #[test]
    fn short_text_still_produces_a_unit_vector() {
        let vector = CharacterNgramEmbedder::default().embed_text("ab");
        let norm: f32 = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn batch_matches_single_embeddings() -> Result<(), ProviderError> {
        let embedder = CharacterNgramEmbedder::default();
        let texts = vec!["first text".to_string(), "second text".to_string()];
        let batch = embedder.embed_batch(&texts).await?;
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], embedder.embed_one("second text").await?);
        Ok(())
    }

    #[test]
    fn embedding_rows_are_reordered_by_index() -> Result<(), String> {
        let rows = vec![
            EmbeddingRow {
                index: Some(1),
                embedding: vec![1.0],
            },
            EmbeddingRow {
                index: Some(0),
                embedding: vec![0.0],
            },
        ];
        assert_eq!(order_embedding_rows(rows, 2)?, vec![vec![0.0], vec![1.0]]);
        assert!(order_embedding_rows(Vec::new(), 1).is_err());
        Ok(())
    }

    #[test]
    fn endpoint_joins_relative_to_base() -> Result<(), ProviderError> {
        assert_eq!(
            endpoint_url("https://api.openai.com/v1", "embeddings")?.as_str(),
            "https://api.openai.com/v1/embeddings"
        );
        Ok(())
    }

    #[test]
    fn openai_embedder_requires_a_key() {
        let settings = EmbedderSettings {
            provider: EmbedderProvider::OpenAi,
            api_key: Some("  ".to_string()),
            ..EmbedderSettings::default()
        };
        if std::env::var("OPENAI_API_KEY").is_err() {
            assert!(matches!(
                EmbedderBackend::from_settings(&settings),
                Err(ProviderError::MissingCredential(_))
            ));
        }
    }
}
