//! JSON-over-HTTP implementations of the embedding and generation capabilities.
//!
//! Responses are read leniently: `{"embedding": [...]}`, `{"data": [{"embedding": [...]}]}`
//! and `{"embeddings": [[...]]}` for embeddings; `{"text": ..}`, `{"response": ..}`,
//! `{"choices": [{"text": ..}]}` and `{"choices": [{"message": {"content": ..}}]}` for text.

use crate::traits::{Embedder, GroundedGenerator, UnconstrainedGenerator};
use crate::{EngineError, NOT_IN_CONTEXT_SENTINEL};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpProviderConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub temperature: f32,
    pub timeout: Duration,
}

impl HttpProviderConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            model: None,
            temperature: 0.3,
            timeout: Duration::from_secs(60),
        }
    }
}

struct HttpEndpoint {
    url: Url,
    api_key: Option<String>,
    client: Client,
}

impl HttpEndpoint {
    fn new(config: &HttpProviderConfig) -> Result<Self, EngineError> {
        let url = Url::parse(config.endpoint.trim())?;
        let client = Client::builder().timeout(config.timeout).build()?;
        let api_key = config
            .api_key
            .as_ref()
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty());

        Ok(Self {
            url,
            api_key,
            client,
        })
    }

    fn post(&self, body: &Value) -> RequestBuilder {
        let request = self
            .client
            .post(self.url.clone())
            .header("content-type", "application/json")
            .json(body);

        match &self.api_key {
            Some(api_key) => request.bearer_auth(api_key),
            None => request,
        }
    }

    async fn call(&self, body: &Value) -> Result<Value, String> {
        let response = self
            .post(body)
            .send()
            .await
            .map_err(|error| error.to_string())?;

        if !response.status().is_success() {
            return Err(format!("{} returned {}", self.url, response.status()));
        }

        response.json().await.map_err(|error| error.to_string())
    }
}

pub struct HttpEmbedder {
    endpoint: HttpEndpoint,
    model: Option<String>,
    dimensions: usize,
    id: String,
}

impl HttpEmbedder {
    pub fn new(config: &HttpProviderConfig, dimensions: usize) -> Result<Self, EngineError> {
        if dimensions == 0 {
            return Err(EngineError::InvalidParameter(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }
        let model = config.model.clone();
        let id = format!(
            "http:{}:{}",
            model.as_deref().unwrap_or("default"),
            dimensions
        );
        Ok(Self {
            endpoint: HttpEndpoint::new(config)?,
            model,
            dimensions,
            id,
        })
    }
}

#[async_trait]
impl Embedder for HttpEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        let body = json!({ "model": self.model, "input": text });
        let payload = self.endpoint.call(&body).await.map_err(EngineError::Embedding)?;
        parse_embedding(&payload).ok_or_else(|| {
            EngineError::Embedding("response carried no embedding vector".to_string())
        })
    }
}

pub struct HttpGenerator {
    endpoint: HttpEndpoint,
    model: Option<String>,
    temperature: f32,
}

impl HttpGenerator {
    pub fn new(config: &HttpProviderConfig) -> Result<Self, EngineError> {
        Ok(Self {
            endpoint: HttpEndpoint::new(config)?,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }

    async fn complete(&self, prompt: &str) -> Result<String, EngineError> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "temperature": self.temperature,
            "stream": false,
        });
        let payload = self.endpoint.call(&body).await.map_err(EngineError::Generation)?;
        parse_text(&payload)
            .ok_or_else(|| EngineError::Generation("response carried no text".to_string()))
    }
}

#[async_trait]
impl GroundedGenerator for HttpGenerator {
    async fn generate_grounded(
        &self,
        context: &str,
        question: &str,
    ) -> Result<String, EngineError> {
        self.complete(&grounded_prompt(context, question)).await
    }
}

#[async_trait]
impl UnconstrainedGenerator for HttpGenerator {
    async fn generate_unconstrained(&self, question: &str) -> Result<String, EngineError> {
        self.complete(question).await
    }
}

pub fn grounded_prompt(context: &str, question: &str) -> String {
    format!(
        "Use the following context to answer the question as accurately as possible.\n\
         Only use information from the context. If the answer is not in the context, \
         respond with, \"{NOT_IN_CONTEXT_SENTINEL}\"\n\n\
         Context: {context}\n\
         Question: {question}\n\n\
         Answer:"
    )
}

fn parse_embedding(payload: &Value) -> Option<Vec<f32>> {
    let vector = payload
        .pointer("/embedding")
        .or_else(|| payload.pointer("/data/0/embedding"))
        .or_else(|| payload.pointer("/embeddings/0"))?
        .as_array()?;

    vector
        .iter()
        .map(|value| value.as_f64().map(|number| number as f32))
        .collect()
}

fn parse_text(payload: &Value) -> Option<String> {
    ["/text", "/response", "/choices/0/text", "/choices/0/message/content"]
        .iter()
        .find_map(|pointer| payload.pointer(pointer).and_then(Value::as_str))
        .map(|text| text.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedding_shapes_are_recognised() {
        let plain = json!({ "embedding": [0.5, -1.0] });
        let openai = json!({ "data": [{ "embedding": [0.25, 2.0] }] });
        let batched = json!({ "embeddings": [[1.0, 0.0]] });

        assert_eq!(parse_embedding(&plain), Some(vec![0.5, -1.0]));
        assert_eq!(parse_embedding(&openai), Some(vec![0.25, 2.0]));
        assert_eq!(parse_embedding(&batched), Some(vec![1.0, 0.0]));
        assert_eq!(parse_embedding(&json!({ "embedding": ["x"] })), None);
        assert_eq!(parse_embedding(&json!({})), None);
    }

    #[test]
    fn text_shapes_are_recognised_and_trimmed() {
        let chat = json!({ "choices": [{ "message": { "content": " Hi.\n" } }] });
        assert_eq!(parse_text(&json!({ "response": "ok" })), Some("ok".to_string()));
        assert_eq!(parse_text(&chat), Some("Hi.".to_string()));
        assert_eq!(parse_text(&json!({ "unexpected": true })), None);
    }

    #[test]
    fn trimmed_sentinel_survives_parsing() {
        let payload = json!({ "text": format!("{NOT_IN_CONTEXT_SENTINEL}\n") });
        assert_eq!(parse_text(&payload).as_deref(), Some(NOT_IN_CONTEXT_SENTINEL));
    }

    #[test]
    fn grounded_prompt_carries_context_question_and_sentinel() {
        let prompt = grounded_prompt("Pumps run at 3 bar.", "What pressure?");
        assert!(prompt.contains("Context: Pumps run at 3 bar."));
        assert!(prompt.contains("Question: What pressure?"));
        assert!(prompt.contains(NOT_IN_CONTEXT_SENTINEL));
        assert!(prompt.ends_with("Answer:"));
    }

    #[test]
    fn malformed_endpoint_is_rejected() {
        let config = HttpProviderConfig::new("not a url");
        assert!(matches!(
            HttpGenerator::new(&config),
            Err(EngineError::Url(_))
        ));
    }

    #[test]
    fn http_embedder_id_names_model_and_width() -> Result<(), EngineError> {
        let mut config = HttpProviderConfig::new("http://localhost:11434/api/embeddings");
        config.model = Some("nomic-embed-text".to_string());
        let embedder = HttpEmbedder::new(&config, 768)?;
        assert_eq!(embedder.id(), "http:nomic-embed-text:768");
        assert_eq!(embedder.dimensions(), 768);
        Ok(())
    }
}
