//! Proposal document generation pipeline.

use std::collections::HashSet;
use std::time::Duration;

use super::{COORDINATOR, PipelineContext, ProgressSender, item_progress, profile};
use crate::errors::PipelineError;
use crate::pipeline::{EventStatus, ProgressEvent};
use crate::services::DocxPayload;
use crate::store::{WorkspaceStatus, WorkspaceUpdate, generated_file_name};
use crate::tender::prompts::{DocumentRole, build_document_prompt};
use crate::tender::{CompanyData, TenderAnalysis};
use crate::util::{parse_llm_object, safe_str};

pub const MISSING_ANALYSIS: &str =
    "No se encontró un análisis previo. Por favor analice las bases primero.";

const TECHNICAL_RANGE: (u8, u8) = (10, 40);
const ECONOMIC_RANGE: (u8, u8) = (50, 40);

/// A rendered document waiting to be persisted.
struct RenderedDocument {
    title: String,
    bytes: Vec<u8>,
}

pub(super) async fn run(
    ctx: &PipelineContext,
    tx: &ProgressSender,
    workspace_id: &str,
) -> Result<(), PipelineError> {
    // ── load-analysis ────────────────────────────────────────────────
    let analysis = load_analysis(ctx, workspace_id).await?;

    // ── consolidate-profile ──────────────────────────────────────────
    let (raw_company, profile) = profile::consolidate(ctx, workspace_id, &analysis).await?;
    let company = profile.bidder_company(&raw_company);

    let id = workspace_id.to_string();
    let workspace_name = ctx
        .db
        .call(move |db| db.get_workspace(&id))
        .await
        .map_err(PipelineError::storage)?
        .map(|w| w.name)
        .filter(|n| !n.trim().is_empty())
        .unwrap_or_else(|| workspace_id.to_string());
    let (folder_name, _) = ctx
        .files
        .generated_dir(workspace_id, &workspace_name)
        .await
        .map_err(PipelineError::storage)?;

    // ── generate-category ────────────────────────────────────────────
    let (technical, economic) = analysis.requested_documents();
    tracing::info!(
        technical = technical.len(),
        economic = economic.len(),
        "generating proposal documents"
    );
    let tech_docs = generate_category(
        ctx,
        tx,
        DocumentRole::Technical,
        &technical,
        &analysis,
        &company,
        TECHNICAL_RANGE,
    )
    .await;
    let econ_docs = generate_category(
        ctx,
        tx,
        DocumentRole::Economic,
        &economic,
        &analysis,
        &company,
        ECONOMIC_RANGE,
    )
    .await;
    let (tech_count, econ_count) = (tech_docs.len(), econ_docs.len());

    // ── persist-each-document ────────────────────────────────────────
    let documents: Vec<RenderedDocument> = tech_docs.into_iter().chain(econ_docs).collect();
    let total = documents.len();
    let mut generated = Vec::with_capacity(total);
    let mut taken = HashSet::new();
    for (i, doc) in documents.into_iter().enumerate() {
        let title = distinct_title(&mut taken, &doc.title);
        let name = ctx
            .files
            .save_generated(workspace_id, &folder_name, &title, &doc.bytes)
            .await
            .map_err(PipelineError::storage)?;
        tx.send(
            ProgressEvent::new(
                EventStatus::DocReady,
                COORDINATOR,
                format!("Documento guardado: {}", name),
            )
            .with_val(doc_ready_progress(i, total))
            .with_extra("name", name.clone())
            .with_extra("folder_name", folder_name.clone()),
        );
        generated.push(name);
    }

    let update = WorkspaceUpdate::new(workspace_id).status(WorkspaceStatus::Generated);
    if let Err(e) = ctx.db.call(move |db| db.upsert_workspace(&update)).await {
        tracing::warn!(error = %e, "could not record generated status");
    }

    tx.send(
        ProgressEvent::new(
            EventStatus::Complete,
            COORDINATOR,
            format!(
                "{} documento(s) generados (Técnicos: {}, Económicos: {})",
                generated.len(),
                tech_count,
                econ_count
            ),
        )
        .with_extra("generated_docs", generated)
        .with_extra("folder_name", folder_name),
    );
    Ok(())
}

/// Current analysis of a workspace: `analysis.json` first, then the store.
pub async fn load_analysis(
    ctx: &PipelineContext,
    workspace_id: &str,
) -> Result<TenderAnalysis, PipelineError> {
    match ctx.files.read_analysis(workspace_id).await {
        Ok(Some(analysis)) => return Ok(analysis),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "unreadable analysis.json; trying the store"),
    }
    let id = workspace_id.to_string();
    ctx.db
        .call(move |db| db.get_workspace(&id))
        .await
        .map_err(PipelineError::storage)?
        .and_then(|w| w.analysis)
        .ok_or_else(|| PipelineError::Precondition(MISSING_ANALYSIS.to_string()))
}

/// Generate every document of one category, dropping the ones that fail.
async fn generate_category(
    ctx: &PipelineContext,
    tx: &ProgressSender,
    role: DocumentRole,
    titles: &[String],
    analysis: &TenderAnalysis,
    company: &CompanyData,
    (start, span): (u8, u8),
) -> Vec<RenderedDocument> {
    let mut rendered = Vec::new();
    for (i, title) in titles.iter().enumerate() {
        tx.progress(
            role.agent(),
            item_progress(i, titles.len(), start, span),
            format!("{}: Redactando {}...", role.label(), title),
        );
        match generate_document(ctx, role, title, analysis, company).await {
            Ok(bytes) => rendered.push(RenderedDocument {
                title: title.clone(),
                bytes,
            }),
            Err(err) => {
                let failure = PipelineError::PartialItemFailure {
                    item: title.clone(),
                    reason: err.to_string(),
                };
                tracing::warn!(agent = role.agent(), error = %failure, "document dropped");
            }
        }
    }
    rendered
}

/// Draft the paragraphs of one document and render it.
async fn generate_document(
    ctx: &PipelineContext,
    role: DocumentRole,
    title: &str,
    analysis: &TenderAnalysis,
    company: &CompanyData,
) -> Result<Vec<u8>, PipelineError> {
    let timeouts = &ctx.config.timeouts;
    let prompt = build_document_prompt(title, analysis, company, role);
    let raw = ctx
        .services
        .llm
        .generate(&prompt, true, Duration::from_secs(timeouts.document_llm_secs))
        .await?;
    let answer = parse_llm_object(&raw).ok_or_else(|| {
        PipelineError::Other(anyhow::anyhow!("document answer is not a JSON object"))
    })?;
    let paragraphs = paragraphs(answer.get("parrafos"));

    let payload = DocxPayload::build(title, analysis, company, paragraphs);
    let bytes = ctx
        .services
        .renderer
        .render(&payload, Duration::from_secs(timeouts.render_secs))
        .await?;
    Ok(bytes)
}

/// Paragraph texts from the `parrafos` value; non-string items are rendered
/// as text and a missing or non-list value yields nothing.
fn paragraphs(value: Option<&serde_json::Value>) -> Vec<String> {
    match value {
        Some(serde_json::Value::Array(items)) => {
            items.iter().map(|item| safe_str(Some(item), "")).collect()
        }
        _ => Vec::new(),
    }
}

/// `title`, suffixed with ` (2)`, ` (3)`... when its file name is already
/// taken in this run. Records the file name it settles on.
fn distinct_title(taken: &mut HashSet<String>, title: &str) -> String {
    let mut candidate = title.to_string();
    let mut n = 2;
    while !taken.insert(generated_file_name(&candidate)) {
        candidate = format!("{} ({})", title, n);
        n += 1;
    }
    candidate
}

/// `doc_ready` progress: the last tenth of the scale, by saved fraction.
fn doc_ready_progress(index: usize, count: usize) -> u8 {
    if count == 0 {
        return 100;
    }
    (90.0 + ((index + 1) as f64 / count as f64) * 10.0).min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_doc_ready_progress_fills_last_tenth() {
        assert_eq!(doc_ready_progress(0, 4), 92);
        assert_eq!(doc_ready_progress(1, 4), 95);
        assert_eq!(doc_ready_progress(3, 4), 100);
        assert_eq!(doc_ready_progress(0, 1), 100);
    }

    #[test]
    fn test_distinct_title_suffixes_colliding_names() {
        let mut taken = HashSet::new();
        assert_eq!(distinct_title(&mut taken, "Carta compromiso"), "Carta compromiso");
        assert_eq!(distinct_title(&mut taken, "Carta compromiso"), "Carta compromiso (2)");
        assert_eq!(distinct_title(&mut taken, "Carta compromiso"), "Carta compromiso (3)");
        // Different titles that map to the same file name collide too.
        assert_eq!(distinct_title(&mut taken, "AT-1/2"), "AT-1/2");
        assert_eq!(distinct_title(&mut taken, "AT-1_2"), "AT-1_2 (2)");
        assert_eq!(taken.len(), 5);
    }

    #[test]
    fn test_paragraphs_from_llm_answer() {
        let value = json!(["Primero.", 2, "Tercero."]);
        assert_eq!(paragraphs(Some(&value)), vec!["Primero.", "2", "Tercero."]);
        assert!(paragraphs(Some(&json!("solo texto"))).is_empty());
        assert!(paragraphs(None).is_empty());
    }
}
