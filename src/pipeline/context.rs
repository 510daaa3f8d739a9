//! Identity-document ingestion: tax registration (CIF) and corporate charter.

use std::time::Duration;

use anyhow::Context;
use serde_json::Value;

use super::extract::{ProgressWindow, extract_text};
use super::{COORDINATOR, PipelineContext, ProgressSender, validate_identity};
use crate::errors::{PipelineError, ServiceError};
use crate::identity::LegalFields;
use crate::identity::prompts::{build_charter_prompt, build_cif_prompt, charter_context};
use crate::pipeline::{EventStatus, ProgressEvent};
use crate::services::SourceDocument;
use crate::store::{ActaData, CifData, IdentityKind, WorkspaceRecord, WorkspaceUpdate};
use crate::tender::join_spaced_letters;
use crate::util::{decode_text, is_blank_text, parse_llm_object};

const PROFILE_AGENT: &str = "ProfileAgent";

const EXTRACTION_WINDOW: ProgressWindow = ProgressWindow {
    agent: PROFILE_AGENT,
    start: 20,
    span: 65,
};

/// Structured identity data of either kind, ready for the store.
enum IdentityData {
    Cif(CifData),
    Acta(ActaData),
}

impl IdentityData {
    fn stored(kind: IdentityKind, record: Option<&WorkspaceRecord>) -> Option<Self> {
        let record = record?;
        match kind {
            IdentityKind::Cif => record.cif_data.clone().map(Self::Cif),
            IdentityKind::Acta => record.acta_data.clone().map(Self::Acta),
        }
    }

    fn to_json(&self) -> anyhow::Result<Value> {
        match self {
            Self::Cif(cif) => serde_json::to_value(cif),
            Self::Acta(acta) => serde_json::to_value(acta),
        }
        .context("Failed to serialize identity data")
    }

    fn update(&self, workspace_id: &str) -> anyhow::Result<WorkspaceUpdate> {
        let update = WorkspaceUpdate::new(workspace_id);
        match self {
            Self::Cif(cif) => update.cif(cif),
            Self::Acta(acta) => update.acta(acta),
        }
    }
}

fn done_message(kind: IdentityKind, reused: bool) -> &'static str {
    match (kind, reused) {
        (IdentityKind::Cif, false) => "CIF procesado y vinculado.",
        (IdentityKind::Cif, true) => "CIF reutilizado desde cache.",
        (IdentityKind::Acta, false) => "Acta Constitutiva procesada y vinculada.",
        (IdentityKind::Acta, true) => "Acta reutilizada desde cache.",
    }
}

fn unreadable_message(kind: IdentityKind) -> &'static str {
    match kind {
        IdentityKind::Cif => "No se pudo leer el CIF.",
        IdentityKind::Acta => "No se pudo leer el Acta Constitutiva.",
    }
}

fn kind_label(kind: IdentityKind) -> &'static str {
    match kind {
        IdentityKind::Cif => "CIF",
        IdentityKind::Acta => "Acta Constitutiva",
    }
}

pub(super) async fn run(
    ctx: &PipelineContext,
    tx: &ProgressSender,
    workspace_id: &str,
    kind: IdentityKind,
    doc: SourceDocument,
    force: bool,
) -> Result<(), PipelineError> {
    ctx.files
        .save_source(workspace_id, &doc.filename, &doc.bytes)
        .await
        .map_err(PipelineError::storage)?;
    tx.progress(PROFILE_AGENT, 10, format!("Procesando {}...", kind_label(kind)));

    if !force {
        let id = workspace_id.to_string();
        let record = ctx
            .db
            .call(move |db| db.get_workspace(&id))
            .await
            .map_err(PipelineError::storage)?;
        if let Some(data) = IdentityData::stored(kind, record.as_ref()) {
            tracing::info!(kind = kind.as_str(), "reusing stored identity data");
            return finish(ctx, tx, workspace_id, kind, &data, true).await;
        }
    }

    let text = document_text(ctx, tx, workspace_id, &doc, force).await?;
    if is_blank_text(&text) {
        return Err(PipelineError::Precondition(unreadable_message(kind).to_string()));
    }

    tx.progress(
        PROFILE_AGENT,
        90,
        format!("Estructurando datos del {}...", kind_label(kind)),
    );
    let data = match kind {
        IdentityKind::Cif => IdentityData::Cif(structure_cif(ctx, &text).await?),
        IdentityKind::Acta => IdentityData::Acta(structure_acta(ctx, &text).await?),
    };

    let update = data.update(workspace_id).map_err(PipelineError::storage)?;
    ctx.db
        .call(move |db| db.upsert_workspace(&update))
        .await
        .map_err(PipelineError::storage)?;

    finish(ctx, tx, workspace_id, kind, &data, false).await
}

/// Text of the upload: plain text as-is, else the extraction cache (unless
/// `force`), else a fresh extraction that refreshes the cache.
async fn document_text(
    ctx: &PipelineContext,
    tx: &ProgressSender,
    workspace_id: &str,
    doc: &SourceDocument,
    force: bool,
) -> Result<String, PipelineError> {
    if doc.is_plain_text() {
        return Ok(decode_text(&doc.bytes));
    }
    if !force {
        match ctx.files.read_extraction_cache(workspace_id, &doc.filename).await {
            Ok(Some(text)) => {
                tracing::debug!(filename = %doc.filename, "using cached extraction");
                return Ok(text);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "unreadable extraction cache"),
        }
    }

    let timeout = Duration::from_secs(ctx.config.timeouts.identity_extraction_secs);
    let text = extract_text(ctx, tx, doc, timeout, EXTRACTION_WINDOW).await?;
    if let Err(e) = ctx
        .files
        .write_extraction_cache(workspace_id, &doc.filename, &text)
        .await
    {
        tracing::warn!(error = %e, "could not cache extracted text");
    }
    Ok(text)
}

async fn ask_llm(ctx: &PipelineContext, prompt: &str) -> Result<String, ServiceError> {
    let timeout = Duration::from_secs(ctx.config.timeouts.identity_structuring_secs);
    ctx.services.llm.generate(prompt, true, timeout).await
}

async fn structure_cif(ctx: &PipelineContext, text: &str) -> Result<CifData, PipelineError> {
    let raw = ask_llm(ctx, &build_cif_prompt(text)).await?;
    let cif = parse_llm_object(&raw)
        .and_then(|fields| CifData::from_fields(fields).ok())
        .unwrap_or_else(|| {
            tracing::warn!("CIF answer was not a JSON object");
            CifData::format_error()
        });
    Ok(cif)
}

async fn structure_acta(ctx: &PipelineContext, text: &str) -> Result<ActaData, PipelineError> {
    let cleaned = join_spaced_letters(text);
    let prompt = build_charter_prompt(&charter_context(&cleaned));
    let raw = ask_llm(ctx, &prompt).await?;
    let mut acta = parse_llm_object(&raw)
        .and_then(|fields| ActaData::from_fields(fields).ok())
        .unwrap_or_else(|| {
            tracing::warn!("charter answer was not a JSON object");
            ActaData::format_error()
        });
    LegalFields::extract(&cleaned).fill_missing(&mut acta);
    tracing::info!(
        representante = acta.representative().unwrap_or("-"),
        cargo = acta.cargo.as_deref().unwrap_or("-"),
        "charter structured"
    );
    Ok(acta)
}

/// Validate the stored pair and send the terminal event.
async fn finish(
    ctx: &PipelineContext,
    tx: &ProgressSender,
    workspace_id: &str,
    kind: IdentityKind,
    data: &IdentityData,
    reused: bool,
) -> Result<(), PipelineError> {
    let validation = match validate_identity(ctx, workspace_id).await {
        Ok(report) => serde_json::to_value(&report).context("Failed to serialize report")?,
        Err(e) => {
            tracing::warn!(error = %e, "identity validation failed");
            Value::Null
        }
    };
    tx.send(
        ProgressEvent::new(EventStatus::Complete, COORDINATOR, done_message(kind, reused))
            .with_extra("kind", kind.as_str())
            .with_extra("data", data.to_json()?)
            .with_extra("validation", validation),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_done_messages_distinguish_reuse() {
        assert_eq!(done_message(IdentityKind::Cif, false), "CIF procesado y vinculado.");
        assert_eq!(done_message(IdentityKind::Acta, true), "Acta reutilizada desde cache.");
    }

    #[test]
    fn test_stored_data_by_kind() {
        let record = WorkspaceRecord {
            id: "ws".to_string(),
            name: "ws".to_string(),
            logo_path: None,
            cif_data: Some(CifData::empty()),
            acta_data: None,
            prices_data: None,
            sources: Vec::new(),
            analysis: None,
            status: None,
            inconsistencias: None,
            created_at: String::new(),
        };
        assert!(matches!(
            IdentityData::stored(IdentityKind::Cif, Some(&record)),
            Some(IdentityData::Cif(_))
        ));
        assert!(IdentityData::stored(IdentityKind::Acta, Some(&record)).is_none());
        assert!(IdentityData::stored(IdentityKind::Cif, None).is_none());
    }
}
