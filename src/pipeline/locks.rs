//! Per-workspace advisory locks.
//!
//! Invocations for the same workspace run one after another; different
//! workspaces never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

#[derive(Clone, Default)]
pub struct WorkspaceLocks {
    inner: Arc<Mutex<HashMap<String, Arc<AsyncMutex<()>>>>>,
}

/// Held for the duration of one pipeline invocation.
pub struct WorkspaceGuard {
    _guard: OwnedMutexGuard<()>,
}

impl WorkspaceLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other invocation holds `workspace_id`.
    pub async fn acquire(&self, workspace_id: &str) -> WorkspaceGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Entries nobody else references are stale; prune them while we're here.
            map.retain(|id, lock| id == workspace_id || Arc::strong_count(lock) > 1);
            map.entry(workspace_id.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        WorkspaceGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of workspaces with a live lock entry.
    pub fn tracked(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }
}
