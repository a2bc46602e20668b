use crate::IndexError;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Turns text into fixed-width vectors. Implementations must be
/// deterministic for a given [`Embedder::model_id`], because the id is what
/// ties a persisted index to the embedder that can query it.
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> String;
    fn dimensions(&self) -> usize;
    fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IndexError> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Hashed character-trigram embedder. Needs no model download, so it is the
/// default backend and the one tests rely on.
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

impl Embedder for CharacterNgramEmbedder {
    fn model_id(&self) -> String {
        format!("char-trigram-fnv1a-d{}", self.dimensions.max(1))
    }

    fn dimensions(&self) -> usize {
        self.dimensions.max(1)
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        let mut vector = vec![0f32; self.dimensions()];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return Ok(vector);
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
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

        Ok(vector)
    }
}

#[derive(Debug, Clone)]
pub struct HttpEmbedderConfig {
    pub base_url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub dimensions: usize,
    pub batch_size: usize,
    pub timeout: Duration,
}

/// Blocking client for OpenAI-compatible `/embeddings` endpoints. A failed
/// request is reported, never retried.
pub struct HttpEmbedder {
    client: Client,
    endpoint: Url,
    model: String,
    api_key: Option<String>,
    dimensions: usize,
    batch_size: usize,
}

impl HttpEmbedder {
    pub fn new(config: HttpEmbedderConfig) -> Result<Self, IndexError> {
        if config.model.trim().is_empty() {
            return Err(IndexError::Embedding("embedding model name is empty".to_string()));
        }
        if config.dimensions == 0 {
            return Err(IndexError::ZeroDimensions);
        }
        let base = Url::parse(&format!("{}/", config.base_url.trim_end_matches('/')))?;
        let endpoint = base.join("embeddings")?;
        let client = Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            model: config.model,
            api_key: config.api_key.filter(|key| !key.trim().is_empty()),
            dimensions: config.dimensions,
            batch_size: config.batch_size.max(1),
        })
    }

    fn request_batch(&self, inputs: &[&str]) -> Result<Vec<Vec<f32>>, IndexError> {
        let payload = EmbeddingRequest {
            model: &self.model,
            input: inputs,
        };

        let mut request = self.client.post(self.endpoint.clone()).json(&payload);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key.trim());
        }

        let response = request.send()?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .unwrap_or_else(|_| "<body unavailable>".to_string());
            return Err(IndexError::Embedding(format!(
                "{} returned {status}: {body}",
                self.endpoint
            )));
        }

        let mut parsed: EmbeddingResponse = response.json()?;
        parsed.data.sort_by_key(|entry| entry.index);
        if parsed.data.len() != inputs.len() {
            return Err(IndexError::Embedding(format!(
                "endpoint returned {} embeddings for {} inputs",
                parsed.data.len(),
                inputs.len()
            )));
        }

        parsed
            .data
            .into_iter()
            .map(|entry| {
                if entry.embedding.len() != self.dimensions {
                    return Err(IndexError::DimensionMismatch {
                        expected: self.dimensions,
                        actual: entry.embedding.len(),
                    });
                }
                Ok(entry.embedding)
            })
            .collect()
    }
}

impl Embedder for HttpEmbedder {
    fn model_id(&self) -> String {
        format!("http:{}", self.model)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        self.request_batch(&[text])?
            .pop()
            .ok_or_else(|| IndexError::Embedding("endpoint returned no embedding".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IndexError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.batch_size) {
            vectors.extend(self.request_batch(batch)?);
        }
        Ok(vectors)
    }
}

pub const DEFAULT_FASTEMBED_MODEL: &str = "all-MiniLM-L6-v2";

/// A sentence-embedding model that can run in-process through ONNX.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalModelSpec {
    pub name: &'static str,
    pub dimensions: usize,
}

const LOCAL_MODELS: &[LocalModelSpec] = &[
    LocalModelSpec {
        name: "all-MiniLM-L6-v2",
        dimensions: 384,
    },
    LocalModelSpec {
        name: "bge-small-en-v1.5",
        dimensions: 384,
    },
    LocalModelSpec {
        name: "bge-base-en-v1.5",
        dimensions: 768,
    },
];

impl LocalModelSpec {
    /// Unknown names are an error rather than a fallback, since the model id
    /// is recorded in the index manifest.
    pub fn resolve(name: &str) -> Result<Self, IndexError> {
        let wanted = name.trim();
        LOCAL_MODELS
            .iter()
            .copied()
            .find(|spec| spec.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| IndexError::Embedding(format!("unsupported local embedding model '{wanted}'")))
    }

    pub fn model_id(&self) -> String {
        format!("fastembed:{}", self.name)
    }
}

/// In-process embedder backed by `fastembed` (requires the `semantic-search`
/// feature). Model weights are downloaded on first use.
#[cfg(feature = "semantic-search")]
pub struct FastEmbedder {
    model: fastembed::TextEmbedding,
    spec: LocalModelSpec,
}

#[cfg(feature = "semantic-search")]
impl FastEmbedder {
    pub fn new(model_name: &str) -> Result<Self, IndexError> {
        use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

        let spec = LocalModelSpec::resolve(model_name)?;
        let model_name = match spec.name {
            "bge-small-en-v1.5" => EmbeddingModel::BGESmallENV15,
            "bge-base-en-v1.5" => EmbeddingModel::BGEBaseENV15,
            _ => EmbeddingModel::AllMiniLML6V2,
        };

        let model = TextEmbedding::try_new(InitOptions {
            model_name,
            show_download_progress: false,
            ..Default::default()
        })
        .map_err(|error| IndexError::Embedding(format!("failed to load {}: {error}", spec.name)))?;

        Ok(Self { model, spec })
    }
}

#[cfg(feature = "semantic-search")]
impl Embedder for FastEmbedder {
    fn model_id(&self) -> String {
        self.spec.model_id()
    }

    fn dimensions(&self) -> usize {
        self.spec.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, IndexError> {
        self.embed_batch(&[text])?
            .pop()
            .ok_or_else(|| IndexError::Embedding("model returned no embedding".to_string()))
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, IndexError> {
        let vectors = self
            .model
            .embed(texts.to_vec(), None)
            .map_err(|error| IndexError::Embedding(error.to_string()))?;

        for vector in &vectors {
            if vector.len() != self.spec.dimensions {
                return Err(IndexError::DimensionMismatch {
                    expected: self.spec.dimensions,
                    actual: vector.len(),
                });
            }
        }
        Ok(vectors)
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
