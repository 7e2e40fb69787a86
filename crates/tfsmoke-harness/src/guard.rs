use tfsmoke_driver::ModuleWorkspace;
use tokio::task::AbortHandle;
use tracing::warn;

/// Armed while real resources may exist. Owns the module workspace so the
/// state file outlives a cancelled run.
///
/// Destroy is async and cannot run from `Drop`. If the harness future is
/// dropped before [`disarm`](Self::disarm), the guard aborts the in-flight
/// body task, keeps the workspace on disk and logs where it is.
pub(crate) struct CleanupGuard {
    test_name: String,
    region: String,
    workspace: Option<ModuleWorkspace>,
    body: Option<AbortHandle>,
}

impl CleanupGuard {
    pub(crate) fn arm(test_name: &str, region: &str, workspace: ModuleWorkspace) -> Self {
        Self {
            test_name: test_name.to_string(),
            region: region.to_string(),
            workspace: Some(workspace),
            body: None,
        }
    }

    pub(crate) fn track_body(&mut self, handle: AbortHandle) {
        self.body = Some(handle);
    }

    /// Hand the workspace back; the caller decides whether to keep it.
    pub(crate) fn disarm(mut self) -> Option<ModuleWorkspace> {
        self.body = None;
        self.workspace.take()
    }
}

impl Drop for CleanupGuard {
    fn drop(&mut self) {
        let Some(workspace) = self.workspace.take() else {
            return;
        };
        if let Some(handle) = self.body.take() {
            handle.abort();
        }
        let kept = workspace.persist();
        warn!(
            test_name = %self.test_name,
            region = %self.region,
            workspace = %kept.display(),
            "smoke test dropped before destroy; resources may be leaked"
        );
    }
}
