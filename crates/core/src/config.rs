use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";
pub const GEMINI_MODEL_ENV: &str = "GEMINI_MODEL";
pub const GEMINI_BASE_URL_ENV: &str = "GEMINI_BASE_URL";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Sampling parameters sent with every answer request. Kept conservative for
/// factual medical answers.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub temperature: f32,
    pub top_p: f32,
    pub top_k: u32,
    pub max_output_tokens: u32,
    pub safety_threshold: String,
    pub timeout: Duration,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            top_p: 1.0,
            top_k: 1,
            max_output_tokens: 2048,
            safety_threshold: "BLOCK_MEDIUM_AND_ABOVE".to_string(),
            timeout: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
    pub settings: GenerationSettings,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            settings: GenerationSettings::default(),
        }
    }

    /// `None` when no API key is set; generation then answers with the
    /// "not configured" message instead of failing at startup.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Option<Self> {
        let api_key = non_empty(lookup(GEMINI_API_KEY_ENV))?;
        let mut config = Self::new(api_key);
        if let Some(model) = non_empty(lookup(GEMINI_MODEL_ENV)) {
            config.model = model;
        }
        if let Some(base_url) = non_empty(lookup(GEMINI_BASE_URL_ENV)) {
            config.base_url = base_url;
        }
        Some(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim().to_string();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed)
        }
    })
}

/// Which embedder backs the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbeddingBackend {
    #[default]
    Ngram,
    Http,
    /// In-process sentence embeddings; needs the `semantic-search` feature.
    FastEmbed,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ngram" => Ok(Self::Ngram),
            "http" => Ok(Self::Http),
            "fastembed" => Ok(Self::FastEmbed),
            other => Err(format!(
                "unknown embedding backend '{other}' (expected ngram, http or fastembed)"
            )),
        }
    }
}

impl fmt::Display for EmbeddingBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ngram => f.write_str("ngram"),
            Self::Http => f.write_str("http"),
            Self::FastEmbed => f.write_str("fastembed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |name: &str| map.get(name).cloned()
    }

    #[test]
    fn missing_or_blank_key_means_unconfigured() {
        assert!(GeminiConfig::from_lookup(lookup_from(&[])).is_none());
        assert!(GeminiConfig::from_lookup(lookup_from(&[(GEMINI_API_KEY_ENV, "   ")])).is_none());
    }

    #[test]
    fn overrides_are_trimmed_and_defaults_kept() {
        let config = GeminiConfig::from_lookup(lookup_from(&[
            (GEMINI_API_KEY_ENV, " secret "),
            (GEMINI_MODEL_ENV, ""),
            (GEMINI_BASE_URL_ENV, "http://localhost:9000/v1beta"),
        ]))
        .expect("key is present");

        assert_eq!(config.api_key, "secret");
        assert_eq!(config.model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.base_url, "http://localhost:9000/v1beta");
        assert_eq!(config.settings, GenerationSettings::default());
    }

    #[test]
    fn embedding_backend_parses() {
        assert_eq!("HTTP".parse::<EmbeddingBackend>(), Ok(EmbeddingBackend::Http));
        assert_eq!("ngram".parse::<EmbeddingBackend>(), Ok(EmbeddingBackend::Ngram));
        assert_eq!("FastEmbed".parse::<EmbeddingBackend>(), Ok(EmbeddingBackend::FastEmbed));
        assert_eq!(EmbeddingBackend::FastEmbed.to_string(), "fastembed");
        assert!("onnx".parse::<EmbeddingBackend>().is_err());
    }
}
