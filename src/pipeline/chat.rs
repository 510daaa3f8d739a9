//! Workspace question answering.

use std::time::Duration;

use serde::Serialize;

use super::{PipelineContext, Pipelines, profile};
use crate::errors::PipelineError;
use crate::tender::answers::keyword_answer;
use crate::tender::prompts::build_chat_prompt;
use crate::tender::{Profile, TenderAnalysis};
use crate::util::truncate_chars;

/// Extraction files included in the LLM context.
const CONTEXT_FILES: usize = 2;
const CONTEXT_FILE_CHARS: usize = 4_000;

const NO_DOCUMENTS: &str = "No hay documentos analizados en este workspace.";
const NO_ANSWER: &str = "No pude generar una respuesta.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Keyword,
    Llm,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatAnswer {
    pub answer: String,
    pub source: AnswerSource,
}

impl Pipelines {
    /// Answer a question about a workspace, from stored data when the
    /// question matches a known topic and through the LLM otherwise.
    pub async fn answer_question(
        &self,
        workspace_id: &str,
        question: &str,
        sources: &[String],
    ) -> Result<ChatAnswer, PipelineError> {
        answer_question(self.context(), workspace_id, question, sources).await
    }
}

async fn answer_question(
    ctx: &PipelineContext,
    workspace_id: &str,
    question: &str,
    sources: &[String],
) -> Result<ChatAnswer, PipelineError> {
    let analysis = match ctx.files.read_analysis(workspace_id).await {
        Ok(analysis) => analysis,
        Err(e) => {
            tracing::warn!(workspace_id, error = %e, "unreadable analysis.json");
            None
        }
    };
    let (_, profile) = profile::consolidate(
        ctx,
        workspace_id,
        analysis.as_ref().unwrap_or(&TenderAnalysis::default()),
    )
    .await?;

    if let Some(answer) = keyword_answer(question, analysis.as_ref(), &profile) {
        tracing::debug!(workspace_id, "answered from stored data");
        return Ok(ChatAnswer {
            answer,
            source: AnswerSource::Keyword,
        });
    }

    let context = chat_context(ctx, workspace_id, analysis.as_ref()).await?;
    let answer = ask_llm(ctx, question, &profile, sources, &context).await?;
    Ok(ChatAnswer {
        answer,
        source: AnswerSource::Llm,
    })
}

async fn ask_llm(
    ctx: &PipelineContext,
    question: &str,
    profile: &Profile,
    sources: &[String],
    context: &str,
) -> Result<String, PipelineError> {
    let prompt = build_chat_prompt(question, profile, sources, context);
    let timeout = Duration::from_secs(ctx.config.timeouts.chat_secs);
    let answer = ctx.services.llm.generate(&prompt, false, timeout).await?;
    let answer = answer.trim();
    Ok(if answer.is_empty() { NO_ANSWER } else { answer }.to_string())
}

/// The analysis summary followed by the start of the cached extractions.
async fn chat_context(
    ctx: &PipelineContext,
    workspace_id: &str,
    analysis: Option<&TenderAnalysis>,
) -> Result<String, PipelineError> {
    let texts = ctx
        .files
        .extraction_texts(workspace_id, CONTEXT_FILES)
        .await
        .map_err(PipelineError::storage)?;
    if analysis.is_none() && texts.is_empty() {
        return Ok(NO_DOCUMENTS.to_string());
    }

    let mut parts = Vec::new();
    if let Some(analysis) = analysis {
        parts.push("RESUMEN DE LA LICITACIÓN:".to_string());
        parts.push(serde_json::to_string_pretty(analysis).map_err(anyhow::Error::from)?);
    }
    if !texts.is_empty() {
        parts.push("\nFRAGMENTOS DE LAS BASES:".to_string());
        parts.extend(
            texts
                .iter()
                .map(|t| truncate_chars(t, CONTEXT_FILE_CHARS).to_string()),
        );
    }
    Ok(parts.join("\n"))
}
