//! External collaborators: text extraction (OCR/VLM), the LLM and the
//! document renderer.
//!
//! Pipelines only see the traits below; the HTTP clients are wired in by
//! [`Services::from_config`] and tests substitute in-process fakes.

pub mod docx;
pub mod ocr;
pub mod ollama;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::errors::ServiceError;

pub use docx::{DocxClient, DocxPayload, Paragraph};
pub use ocr::OcrClient;
pub use ollama::OllamaClient;

/// How long to wait for a TCP connection before calling it a connect failure.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Longest error body kept in a [`ServiceError::Status`].
pub(crate) const ERROR_BODY_CHARS: usize = 500;

/// An uploaded document handed to the extractor.
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl SourceDocument {
    /// Build from an upload, guessing the content type from the file name
    /// when the client did not send one.
    pub fn new(filename: &str, content_type: Option<&str>, bytes: Vec<u8>) -> Self {
        let content_type = content_type
            .filter(|ct| !ct.trim().is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| {
                mime_guess::from_path(filename)
                    .first_or_octet_stream()
                    .essence_str()
                    .to_string()
            });
        Self {
            filename: filename.to_string(),
            content_type,
            bytes,
        }
    }

    /// Plain-text uploads skip extraction.
    pub fn is_plain_text(&self) -> bool {
        self.filename.to_lowercase().ends_with(".txt")
    }
}

/// Intermediate report from a running extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExtractionUpdate {
    Info(String),
    /// `val` is on the extractor's own 0-100 scale.
    Progress { val: u8, msg: String },
}

#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Extract the full text of `doc`, reporting intermediate chunks
    /// through `on_update`.
    async fn extract(
        &self,
        doc: &SourceDocument,
        timeout: Duration,
        on_update: &(dyn Fn(ExtractionUpdate) + Send + Sync),
    ) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one completion; `json_format` asks the model for a JSON object.
    async fn generate(
        &self,
        prompt: &str,
        json_format: bool,
        timeout: Duration,
    ) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Render one proposal document and return its bytes.
    async fn render(&self, payload: &DocxPayload, timeout: Duration)
    -> Result<Vec<u8>, ServiceError>;
}

/// The set of collaborators shared by every pipeline invocation.
#[derive(Clone)]
pub struct Services {
    pub extractor: Arc<dyn TextExtractor>,
    pub llm: Arc<dyn LlmClient>,
    pub renderer: Arc<dyn DocumentRenderer>,
}

impl Services {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()?;
        let services = &config.services;
        Ok(Self {
            extractor: Arc::new(OcrClient::new(http.clone(), &services.ocr_url)),
            llm: Arc::new(OllamaClient::new(
                http.clone(),
                &services.ollama_url,
                &services.ollama_model,
            )),
            renderer: Arc::new(DocxClient::new(http, &services.docx_url)),
        })
    }
}

/// Turn a non-2xx response into [`ServiceError::Status`], keeping the start
/// of the body for diagnostics.
pub(crate) async fn check_status(
    service: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ServiceError::Status {
        service: service.to_string(),
        status: status.as_u16(),
        body: crate::util::truncate_chars(&body, ERROR_BODY_CHARS).to_string(),
    })
}

pub(crate) fn trim_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_document_guesses_content_type() {
        let doc = SourceDocument::new("bases.pdf", None, vec![1, 2, 3]);
        assert_eq!(doc.content_type, "application/pdf");
        let doc = SourceDocument::new("bases.pdf", Some(""), Vec::new());
        assert_eq!(doc.content_type, "application/pdf");
        let doc = SourceDocument::new("blob", Some("image/png"), Vec::new());
        assert_eq!(doc.content_type, "image/png");
    }

    #[test]
    fn test_plain_text_detection() {
        assert!(SourceDocument::new("CIF.TXT", None, Vec::new()).is_plain_text());
        assert!(!SourceDocument::new("cif.pdf", None, Vec::new()).is_plain_text());
    }

    #[test]
    fn test_services_from_default_config() {
        assert!(Services::from_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_trim_base_url() {
        assert_eq!(trim_base_url("http://ocr:8082/"), "http://ocr:8082");
    }
}
