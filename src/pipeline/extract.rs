//! Text extraction with retry, shared by the analysis and identity pipelines.

use std::time::Duration;

use super::{PipelineContext, ProgressSender, rescale};
use crate::errors::PipelineError;
use crate::services::{ExtractionUpdate, SourceDocument};

/// Where extraction progress lands on the invocation's 0-100 scale.
#[derive(Debug, Clone, Copy)]
pub struct ProgressWindow {
    pub agent: &'static str,
    pub start: u8,
    pub span: u8,
}

/// Run the extractor under the retry policy, forwarding intermediate
/// updates as progress within `window`. Informational chunks keep the
/// current progress value.
///
/// Before each retry a progress notice `(k/max)` is emitted at `window.start`.
pub async fn extract_text(
    ctx: &PipelineContext,
    tx: &ProgressSender,
    doc: &SourceDocument,
    timeout: Duration,
    window: ProgressWindow,
) -> Result<String, PipelineError> {
    let extractor = ctx.services.extractor.clone();
    let max = ctx.retry.max_attempts;

    let forward = |update: ExtractionUpdate| match update {
        ExtractionUpdate::Info(msg) => tx.progress(window.agent, tx.current(), msg),
        ExtractionUpdate::Progress { val, msg } => {
            tx.progress(window.agent, rescale(val, window.start, window.span), msg)
        }
    };

    ctx.retry
        .run(
            "extract-text",
            |_attempt| {
                let extractor = extractor.clone();
                let forward = &forward;
                async move { extractor.extract(doc, timeout, forward).await }
            },
            |attempt, _err| {
                tx.progress(
                    window.agent,
                    window.start,
                    format!(
                        "Servidor OCR ocupado, reintentando... ({}/{})",
                        attempt, max
                    ),
                );
            },
        )
        .await
}
