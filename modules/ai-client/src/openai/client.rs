use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use crate::traits::EmbedAgent;

const OPENAI_API_URL: &str = "https://api.openai.com/v1";

/// OpenAI-compatible embeddings client. Voyage AI exposes the same wire
/// shape, so the one client covers both providers via `with_base_url`.
#[derive(Clone)]
pub struct OpenAi {
    api_key: String,
    embedding_model: String,
    base_url: String,
    http: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest {
    model: String,
    input: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

impl OpenAi {
    pub fn new(api_key: impl Into<String>, embedding_model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            embedding_model: embedding_model.into(),
            base_url: OPENAI_API_URL.to_string(),
            http: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", self.api_key))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    async fn post_embeddings(&self, input: serde_json::Value) -> Result<EmbeddingResponse> {
        let url = format!("{}/embeddings", self.base_url);
        let request = EmbeddingRequest {
            model: self.embedding_model.clone(),
            input,
        };

        let response = self
            .http
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await?;
            return Err(anyhow!("Embedding API error ({}): {}", status, error_text));
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl EmbedAgent for OpenAi {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let response = self
            .post_embeddings(serde_json::Value::String(text.to_string()))
            .await?;

        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| anyhow!("No embedding in response"))
    }

    async fn embed_batch(&self, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let input = serde_json::Value::Array(
            texts.into_iter().map(serde_json::Value::String).collect(),
        );
        let response = self.post_embeddings(input).await?;

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}
