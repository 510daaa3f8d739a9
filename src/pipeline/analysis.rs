//! Tender analysis pipeline.

use std::time::Duration;

use anyhow::Context;

use super::extract::{ProgressWindow, extract_text};
use super::{COORDINATOR, PipelineContext, ProgressSender, profile};
use crate::errors::{PipelineError, ServiceError};
use crate::pipeline::{EventStatus, ProgressEvent};
use crate::services::SourceDocument;
use crate::store::models::SourceEntry;
use crate::store::{WorkspaceStatus, WorkspaceUpdate};
use crate::tender::prompts::build_analysis_prompt;
use crate::tender::{TenderAnalysis, classify_procedure, join_spaced_letters};
use crate::util::{decode_text, is_blank_text, parse_llm_object};

const PARSER: &str = "Parser";

const EXTRACTION_WINDOW: ProgressWindow = ProgressWindow {
    agent: PARSER,
    start: 20,
    span: 65,
};

pub(super) async fn run(
    ctx: &PipelineContext,
    tx: &ProgressSender,
    workspace_id: &str,
    doc: SourceDocument,
) -> Result<(), PipelineError> {
    // ── persist-source ───────────────────────────────────────────────
    let source = ctx
        .files
        .save_source(workspace_id, &doc.filename, &doc.bytes)
        .await
        .map_err(PipelineError::storage)?;
    tracing::info!(filename = %source.filename, size = source.size, "source saved");

    tx.progress(PARSER, 10, "Iniciando análisis documental...");

    // ── extract-text ─────────────────────────────────────────────────
    let text = if doc.is_plain_text() {
        decode_text(&doc.bytes)
    } else {
        tx.progress(PARSER, 20, "Detectando tipo de PDF y extrayendo texto...");
        let timeout = Duration::from_secs(ctx.config.timeouts.extraction_secs);
        let text = extract_text(ctx, tx, &doc, timeout, EXTRACTION_WINDOW).await?;
        if let Err(e) = ctx
            .files
            .write_extraction_cache(workspace_id, &doc.filename, &text)
            .await
        {
            tracing::warn!(error = %e, "could not cache extracted text");
        }
        text
    };
    if is_blank_text(&text) {
        return Err(ServiceError::Decode {
            service: "ocr".to_string(),
            message: format!("no readable text in {}", doc.filename),
        }
        .into());
    }

    // ── structure-analysis ───────────────────────────────────────────
    tx.progress(PARSER, 90, "Estructurando inteligencia según normativas...");
    let analysis = structure(ctx, &text).await?;
    tx.progress(PARSER, 100, "Análisis documental completado.");

    ctx.files
        .write_analysis(workspace_id, &analysis)
        .await
        .map_err(PipelineError::storage)?;
    store_analysis(ctx, workspace_id, &analysis, source).await?;

    // ── sync-external-index ──────────────────────────────────────────
    let bid = analysis.to_bid();
    if let Err(e) = ctx.db.call(move |db| db.upsert_bid(&bid)).await {
        tracing::warn!(error = %e, "could not index tender");
        tx.warning(COORDINATOR, format!("No se pudo indexar la licitación: {}", e));
    }

    // ── consolidate-profile ──────────────────────────────────────────
    let (_, profile) = profile::consolidate(ctx, workspace_id, &analysis).await?;

    let licit_id = analysis.tender_key();
    let analysis_json = serde_json::to_value(&analysis).context("Failed to serialize analysis")?;
    let profile_json = serde_json::to_value(&profile).context("Failed to serialize profile")?;
    tx.send(
        ProgressEvent::new(
            EventStatus::Complete,
            COORDINATOR,
            format!(
                "Análisis y perfilado completado para {}. Datos publicados en Dashboard.",
                licit_id
            ),
        )
        .with_extra("analysis", analysis_json)
        .with_extra("profile", profile_json),
    );
    Ok(())
}

/// Ask the LLM for the structured analysis and classify the procedure.
///
/// An answer that is not a JSON object yields the default schema; the
/// classification is always computed from the source text.
async fn structure(ctx: &PipelineContext, text: &str) -> Result<TenderAnalysis, PipelineError> {
    let cleaned = join_spaced_letters(text);
    let prompt = build_analysis_prompt(&cleaned);
    let timeout = Duration::from_secs(ctx.config.timeouts.structuring_secs);
    let raw = ctx.services.llm.generate(&prompt, true, timeout).await?;

    let fields = parse_llm_object(&raw).unwrap_or_else(|| {
        tracing::warn!(chars = raw.len(), "analysis answer was not a JSON object; using defaults");
        Default::default()
    });
    let mut analysis = TenderAnalysis::from_llm(fields);
    analysis.apply_classification(classify_procedure(&cleaned));
    Ok(analysis)
}

/// Record the analysis on the workspace row, replacing any earlier upload
/// of the same file in `sources`.
async fn store_analysis(
    ctx: &PipelineContext,
    workspace_id: &str,
    analysis: &TenderAnalysis,
    source: SourceEntry,
) -> Result<(), PipelineError> {
    let id = workspace_id.to_string();
    let existing = ctx
        .db
        .call(move |db| db.get_workspace(&id))
        .await
        .map_err(PipelineError::storage)?;
    let sources = merge_sources(
        existing.map(|w| w.sources).unwrap_or_default(),
        source,
    );

    let update = WorkspaceUpdate::new(workspace_id)
        .status(WorkspaceStatus::Analyzed)
        .analysis(analysis)
        .and_then(|u| u.sources(&sources))
        .map_err(PipelineError::storage)?;
    ctx.db
        .call(move |db| db.upsert_workspace(&update))
        .await
        .map_err(PipelineError::storage)?;
    Ok(())
}

fn merge_sources(mut sources: Vec<SourceEntry>, entry: SourceEntry) -> Vec<SourceEntry> {
    sources.retain(|s| s.filename != entry.filename);
    sources.push(entry);
    sources
}
