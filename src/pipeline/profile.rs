//! Bidder resolution and profile consolidation.

use super::PipelineContext;
use crate::errors::PipelineError;
use crate::tender::{CompanyData, Profile, TenderAnalysis};

/// Resolve the bidder for `workspace_id`.
///
/// The workspace's own identity documents win; when they carry no real
/// data, the first other workspace with a usable identity is borrowed.
pub async fn resolve_company(
    ctx: &PipelineContext,
    workspace_id: &str,
) -> Result<CompanyData, PipelineError> {
    let id = workspace_id.to_string();
    let (own, others) = ctx
        .db
        .call(move |db| {
            let all = db.list_workspaces()?;
            let (own, others): (Vec<_>, Vec<_>) = all.into_iter().partition(|w| w.id == id);
            Ok((own.into_iter().next(), others))
        })
        .await
        .map_err(PipelineError::storage)?;

    let mut company = CompanyData::from_workspace(own.as_ref());
    if !company.has_real_data() {
        if let Some(source) = company.fill_from_global(others.iter()) {
            tracing::info!(workspace_id, source = %source, "bidder data borrowed from another workspace");
        }
    }
    Ok(company)
}

/// Resolve the bidder and combine it with `analysis`.
pub async fn consolidate(
    ctx: &PipelineContext,
    workspace_id: &str,
    analysis: &TenderAnalysis,
) -> Result<(CompanyData, Profile), PipelineError> {
    let company = resolve_company(ctx, workspace_id).await?;
    let profile = Profile::consolidate(analysis, &company);
    Ok((company, profile))
}
