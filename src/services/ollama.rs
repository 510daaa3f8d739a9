//! Ollama `/api/generate` client, used non-streaming.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{LlmClient, check_status, trim_base_url};
use crate::errors::ServiceError;

const SERVICE: &str = "ollama";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
}

impl OllamaClient {
    pub fn new(http: reqwest::Client, base_url: &str, model: &str) -> Self {
        Self {
            http,
            base_url: trim_base_url(base_url),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn request<'a>(&'a self, prompt: &'a str, json_format: bool) -> GenerateRequest<'a> {
        GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: json_format.then_some("json"),
        }
    }
}

#[async_trait]
impl LlmClient for OllamaClient {
    async fn generate(
        &self,
        prompt: &str,
        json_format: bool,
        timeout: Duration,
    ) -> Result<String, ServiceError> {
        let secs = timeout.as_secs();
        let url = format!("{}/api/generate", self.base_url);
        tracing::debug!(model = %self.model, prompt_chars = prompt.chars().count(), json_format, "calling LLM");

        let response = self
            .http
            .post(&url)
            .json(&self.request(prompt, json_format))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, secs, e))?;
        let response = check_status(SERVICE, response).await?;

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, secs, e))?;
        Ok(body.response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_body_with_json_format() {
        let client = OllamaClient::new(reqwest::Client::new(), "http://localhost:11434/", "llama3.1:8b");
        let body = serde_json::to_value(client.request("hola", true)).unwrap();
        assert_eq!(
            body,
            json!({"model": "llama3.1:8b", "prompt": "hola", "stream": false, "format": "json"})
        );
    }

    #[test]
    fn test_request_body_without_format() {
        let client = OllamaClient::new(reqwest::Client::new(), "http://localhost:11434", "m");
        let body = serde_json::to_value(client.request("p", false)).unwrap();
        assert!(body.get("format").is_none());
        assert_eq!(client.model(), "m");
    }

    #[test]
    fn test_response_defaults_to_empty() {
        let parsed: GenerateResponse = serde_json::from_str(r#"{"done": true}"#).unwrap();
        assert_eq!(parsed.response, "");
    }
}
