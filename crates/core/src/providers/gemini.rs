use crate::config::{GeminiConfig, GenerationSettings};
use crate::traits::AnswerModel;
use crate::GenerationError;
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use url::Url;

const HARM_CATEGORIES: [&str; 4] = [
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

/// Google Gemini `generateContent` client. One prompt in, one text out.
pub struct GeminiClient {
    client: Client,
    endpoint: Url,
    api_key: String,
    model: String,
    settings: GenerationSettings,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig) -> Result<Self, GenerationError> {
        if config.api_key.trim().is_empty() {
            return Err(GenerationError::MissingCredential);
        }

        let base = Url::parse(&format!("{}/", config.base_url.trim_end_matches('/')))?;
        let endpoint = base.join(&format!("models/{}:generateContent", config.model))?;
        let client = Client::builder().timeout(config.settings.timeout).build()?;

        Ok(Self {
            client,
            endpoint,
            api_key: config.api_key,
            model: config.model,
            settings: config.settings,
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        let safety_settings: Vec<Value> = HARM_CATEGORIES
            .iter()
            .map(|category| {
                json!({
                    "category": category,
                    "threshold": self.settings.safety_threshold,
                })
            })
            .collect();

        json!({
            "contents": [{
                "role": "user",
                "parts": [{ "text": prompt }],
            }],
            "generationConfig": {
                "temperature": self.settings.temperature,
                "topP": self.settings.top_p,
                "topK": self.settings.top_k,
                "maxOutputTokens": self.settings.max_output_tokens,
            },
            "safetySettings": safety_settings,
        })
    }
}

fn parse_response(body: &Value) -> Result<String, GenerationError> {
    let candidate = body
        .pointer("/candidates/0")
        .ok_or_else(|| GenerationError::ResponseParse("response has no candidates".to_string()))?;

    let parts = candidate
        .pointer("/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            let reason = candidate
                .pointer("/finishReason")
                .and_then(Value::as_str)
                .unwrap_or("unknown");
            GenerationError::ResponseParse(format!("candidate has no content (finish reason {reason})"))
        })?;

    let text = parts
        .iter()
        .filter_map(|part| part.get("text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");

    if text.trim().is_empty() {
        return Err(GenerationError::ResponseParse("candidate text is empty".to_string()));
    }
    Ok(text)
}

#[async_trait]
impl AnswerModel for GeminiClient {
    fn name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
        let response = self
            .client
            .post(self.endpoint.clone())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request_body(prompt))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GenerationError::BackendResponse {
                backend: "gemini".to_string(),
                details: response.status().to_string(),
            });
        }

        let body: Value = response.json().await?;
        parse_response(&body)
    }
}
