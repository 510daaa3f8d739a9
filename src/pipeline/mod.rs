//! Pipeline orchestration.
//!
//! Each invocation runs on its own tokio task, holding the workspace lock,
//! and reports through a fresh progress channel whose reader is returned as
//! a [`ProgressStream`]. Stage functions return `Result<(), PipelineError>`;
//! an `Err` becomes the invocation's single terminal `error` event.

pub mod analysis;
pub mod chat;
pub mod context;
pub mod events;
pub mod extract;
pub mod generation;
pub mod locks;
pub mod profile;
pub mod retry;
pub mod stream;

use std::future::Future;
use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::PipelineError;
use crate::identity::{self, IdentityReport};
use crate::services::{Services, SourceDocument};
use crate::store::{DbHandle, IdentityKind, WorkspaceFiles, WorkspaceUpdate};

pub use events::{EventStatus, ProgressEvent, ProgressSender, progress_channel};
pub use locks::WorkspaceLocks;
pub use retry::RetryPolicy;
pub use stream::{NDJSON_CONTENT_TYPE, ProgressStream};

/// Agent name on terminal events and pipeline-level notices.
pub const COORDINATOR: &str = "Coordinator";

/// Everything a running stage may touch.
pub struct PipelineContext {
    pub config: Arc<Config>,
    pub services: Services,
    pub db: DbHandle,
    pub files: WorkspaceFiles,
    pub locks: WorkspaceLocks,
    pub retry: RetryPolicy,
}

/// Entry point for starting pipeline invocations.
#[derive(Clone)]
pub struct Pipelines {
    ctx: Arc<PipelineContext>,
}

impl Pipelines {
    pub fn new(config: Arc<Config>, services: Services, db: DbHandle) -> Self {
        let files = WorkspaceFiles::new(config.storage.workspaces_dir());
        let retry = RetryPolicy::from(&config.retry);
        Self {
            ctx: Arc::new(PipelineContext {
                config,
                services,
                db,
                files,
                locks: WorkspaceLocks::new(),
                retry,
            }),
        }
    }

    /// Replace the retry policy (tests use millisecond delays).
    pub fn with_retry(self, retry: RetryPolicy) -> Self {
        let ctx = Arc::try_unwrap(self.ctx).unwrap_or_else(|shared| PipelineContext {
            config: shared.config.clone(),
            services: shared.services.clone(),
            db: shared.db.clone(),
            files: shared.files.clone(),
            locks: shared.locks.clone(),
            retry: shared.retry.clone(),
        });
        Self {
            ctx: Arc::new(PipelineContext { retry, ..ctx }),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    pub fn config(&self) -> &Config {
        &self.ctx.config
    }

    pub fn db(&self) -> &DbHandle {
        &self.ctx.db
    }

    pub fn files(&self) -> &WorkspaceFiles {
        &self.ctx.files
    }

    /// persist-source → extract-text → structure-analysis → sync-external-index
    /// → consolidate-profile.
    pub fn spawn_analysis(&self, workspace_id: &str, doc: SourceDocument) -> ProgressStream {
        let id = workspace_id.to_string();
        self.spawn("analysis", workspace_id, move |ctx, tx| async move {
            analysis::run(&ctx, &tx, &id, doc).await
        })
    }

    /// load-analysis → consolidate-profile → technical → economic → persist.
    pub fn spawn_generation(&self, workspace_id: &str) -> ProgressStream {
        let id = workspace_id.to_string();
        self.spawn("generation", workspace_id, move |ctx, tx| async move {
            generation::run(&ctx, &tx, &id).await
        })
    }

    /// Identity-document ingestion with cache reuse.
    pub fn spawn_context(
        &self,
        workspace_id: &str,
        kind: IdentityKind,
        doc: SourceDocument,
        force: bool,
    ) -> ProgressStream {
        let id = workspace_id.to_string();
        self.spawn("context", workspace_id, move |ctx, tx| async move {
            context::run(&ctx, &tx, &id, kind, doc, force).await
        })
    }

    /// Cross-validate the stored identity documents of a workspace and
    /// persist the report. Persistence failures are logged, not returned.
    pub async fn validate_identity(&self, workspace_id: &str) -> Result<IdentityReport, PipelineError> {
        validate_identity(&self.ctx, workspace_id).await
    }

    /// Delete a workspace's record and folder once no invocation holds it.
    ///
    /// Returns `false`, touching nothing, when no such workspace is stored.
    pub async fn delete_workspace(&self, workspace_id: &str) -> Result<bool, PipelineError> {
        let _guard = self.ctx.locks.acquire(workspace_id).await;
        let id = workspace_id.to_string();
        let exists = self
            .ctx
            .db
            .call(move |db| db.get_workspace(&id))
            .await
            .map_err(PipelineError::storage)?
            .is_some();
        if !exists {
            return Ok(false);
        }

        self.ctx
            .files
            .remove_workspace(workspace_id)
            .await
            .map_err(PipelineError::storage)?;
        let id = workspace_id.to_string();
        self.ctx
            .db
            .call(move |db| db.delete_workspace(&id))
            .await
            .map_err(PipelineError::storage)?;
        tracing::info!(workspace_id, "workspace deleted");
        Ok(true)
    }

    fn spawn<F, Fut>(&self, pipeline: &'static str, workspace_id: &str, run: F) -> ProgressStream
    where
        F: FnOnce(Arc<PipelineContext>, ProgressSender) -> Fut,
        Fut: Future<Output = Result<(), PipelineError>> + Send + 'static,
    {
        let (tx, rx) = progress_channel();
        let ctx = self.ctx.clone();
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline", %run_id, pipeline, workspace_id = %workspace_id);
        let work = run(ctx.clone(), tx.clone());
        let locks = ctx.locks.clone();
        let id = workspace_id.to_string();

        let task = tokio::spawn(
            async move {
                let _guard = locks.acquire(&id).await;
                tracing::info!("pipeline started");
                match work.await {
                    Ok(()) => tracing::info!("pipeline finished"),
                    Err(err) => {
                        tracing::error!(error = %err, "pipeline failed");
                        tx.error(COORDINATOR, err.to_string());
                    }
                }
            }
            .instrument(span),
        );
        ProgressStream::new(COORDINATOR, rx, task, ctx.config.stream_poll_interval())
    }
}

pub(crate) async fn validate_identity(
    ctx: &PipelineContext,
    workspace_id: &str,
) -> Result<IdentityReport, PipelineError> {
    let id = workspace_id.to_string();
    let record = ctx
        .db
        .call(move |db| db.get_workspace(&id))
        .await
        .map_err(PipelineError::storage)?;
    let report = identity::validate(
        record.as_ref().and_then(|r| r.cif_data.as_ref()),
        record.as_ref().and_then(|r| r.acta_data.as_ref()),
    );

    if let Err(e) = ctx.files.write_inconsistencies(workspace_id, &report).await {
        tracing::warn!(workspace_id, error = %e, "could not write inconsistencias.json");
    }
    if record.is_some() {
        let stored = match WorkspaceUpdate::new(workspace_id).inconsistencias(&report) {
            Ok(update) => ctx.db.call(move |db| db.upsert_workspace(&update)).await.map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = stored {
            tracing::warn!(workspace_id, error = %e, "could not store identity report");
        }
    }
    tracing::info!(workspace_id, estado = report.estado.as_str(), "identity validated");
    Ok(report)
}

/// Scale `val` (0-100 on a collaborator's own scale) into `start..=start+span`.
pub(crate) fn rescale(val: u8, start: u8, span: u8) -> u8 {
    let scaled = start as f64 + (val.min(100) as f64 / 100.0) * span as f64;
    scaled.min(100.0) as u8
}

/// Progress of item `index` out of `count` within `start..start+span`.
pub(crate) fn item_progress(index: usize, count: usize, start: u8, span: u8) -> u8 {
    if count == 0 {
        return start;
    }
    let scaled = start as f64 + (index as f64 / count as f64) * span as f64;
    scaled.min(100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescale_into_extraction_range() {
        assert_eq!(rescale(0, 20, 65), 20);
        assert_eq!(rescale(50, 20, 65), 52);
        assert_eq!(rescale(100, 20, 65), 85);
        assert_eq!(rescale(250, 20, 65), 85);
    }

    #[test]
    fn test_item_progress_stays_in_category_range() {
        assert_eq!(item_progress(0, 4, 10, 40), 10);
        assert_eq!(item_progress(1, 4, 10, 40), 20);
        assert_eq!(item_progress(3, 4, 10, 40), 40);
        assert_eq!(item_progress(2, 3, 50, 40), 76);
        assert_eq!(item_progress(0, 0, 50, 40), 50);
    }

    #[test]
    fn test_chained_categories_are_monotonic() {
        let tech: Vec<u8> = (0..3).map(|i| item_progress(i, 3, 10, 40)).collect();
        let econ: Vec<u8> = (0..5).map(|i| item_progress(i, 5, 50, 40)).collect();
        let all: Vec<u8> = tech.into_iter().chain(econ).collect();
        assert!(all.windows(2).all(|w| w[0] <= w[1]), "{:?}", all);
    }
}
