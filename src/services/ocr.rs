//! Client for the OCR/VLM extraction service.
//!
//! `POST {base}/ocr/process` with the document as multipart field `file`.
//! The service answers with NDJSON chunks:
//!
//! ```text
//! {"status": "info", "msg": "Loading model"}
//! {"status": "progress", "val": 40, "msg": "Page 2/5"}
//! {"status": "complete", "data": [{"page": 1, "text": "..."}, ...]}
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;

use super::{ExtractionUpdate, SourceDocument, TextExtractor, check_status, trim_base_url};
use crate::errors::ServiceError;

const SERVICE: &str = "ocr";

#[derive(Debug, Clone, Deserialize)]
struct PageText {
    #[serde(default)]
    page: u32,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct OcrChunk {
    status: String,
    #[serde(default)]
    val: Option<f64>,
    #[serde(default)]
    msg: Option<String>,
    #[serde(default)]
    data: Option<Vec<PageText>>,
}

/// What one chunk means for the extraction in progress.
#[derive(Debug, PartialEq)]
enum ChunkOutcome {
    Update(ExtractionUpdate),
    Done(String),
    Ignored,
}

fn parse_chunk(line: &str) -> Result<ChunkOutcome, ServiceError> {
    let chunk: OcrChunk = serde_json::from_str(line).map_err(|e| ServiceError::Decode {
        service: SERVICE.to_string(),
        message: format!("invalid chunk: {}", e),
    })?;
    let msg = chunk.msg.unwrap_or_default();
    match chunk.status.as_str() {
        "complete" => {
            let mut pages = chunk.data.unwrap_or_default();
            pages.sort_by_key(|p| p.page);
            let text = pages
                .into_iter()
                .map(|p| p.text)
                .collect::<Vec<_>>()
                .join("\n");
            Ok(ChunkOutcome::Done(text))
        }
        "progress" => {
            let val = chunk.val.unwrap_or(0.0).clamp(0.0, 100.0) as u8;
            Ok(ChunkOutcome::Update(ExtractionUpdate::Progress { val, msg }))
        }
        "info" => Ok(ChunkOutcome::Update(ExtractionUpdate::Info(msg))),
        "error" => Err(ServiceError::Protocol {
            service: SERVICE.to_string(),
            message: if msg.is_empty() {
                "extraction reported an error".to_string()
            } else {
                msg
            },
        }),
        _ => Ok(ChunkOutcome::Ignored),
    }
}

/// Splits a byte stream into complete lines.
///
/// Bytes are buffered until a newline arrives so multi-byte characters
/// split across network chunks decode correctly.
#[derive(Debug, Default)]
struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let text = String::from_utf8_lossy(&line).trim().to_string();
            if !text.is_empty() {
                lines.push(text);
            }
        }
        lines
    }

    /// Whatever is left once the stream ends.
    fn finish(&mut self) -> Option<String> {
        let rest = String::from_utf8_lossy(&std::mem::take(&mut self.pending))
            .trim()
            .to_string();
        (!rest.is_empty()).then_some(rest)
    }
}

pub struct OcrClient {
    http: reqwest::Client,
    base_url: String,
}

impl OcrClient {
    pub fn new(http: reqwest::Client, base_url: &str) -> Self {
        Self {
            http,
            base_url: trim_base_url(base_url),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/ocr/process", self.base_url)
    }
}

#[async_trait]
impl TextExtractor for OcrClient {
    async fn extract(
        &self,
        doc: &SourceDocument,
        timeout: Duration,
        on_update: &(dyn Fn(ExtractionUpdate) + Send + Sync),
    ) -> Result<String, ServiceError> {
        let secs = timeout.as_secs();
        let part = reqwest::multipart::Part::bytes(doc.bytes.clone())
            .file_name(doc.filename.clone())
            .mime_str(&doc.content_type)
            .map_err(|e| ServiceError::from_reqwest(SERVICE, secs, e))?;
        let form = reqwest::multipart::Form::new().part("file", part);

        tracing::debug!(filename = %doc.filename, url = %self.endpoint(), "sending document to extraction");
        let response = self
            .http
            .post(self.endpoint())
            .multipart(form)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| ServiceError::from_reqwest(SERVICE, secs, e))?;
        let response = check_status(SERVICE, response).await?;

        let mut stream = response.bytes_stream();
        let mut lines = LineBuffer::default();
        while let Some(chunk) = stream.next().await {
            let bytes = chunk.map_err(|e| ServiceError::from_reqwest(SERVICE, secs, e))?;
            for line in lines.push(&bytes) {
                match parse_chunk(&line)? {
                    ChunkOutcome::Update(update) => on_update(update),
                    ChunkOutcome::Done(text) => return Ok(text),
                    ChunkOutcome::Ignored => {}
                }
            }
        }
        if let Some(line) = lines.finish() {
            if let ChunkOutcome::Done(text) = parse_chunk(&line)? {
                return Ok(text);
            }
        }

        Err(ServiceError::Protocol {
            service: SERVICE.to_string(),
            message: "stream closed without a complete chunk".to_string(),
        })
    }
}
