use crate::runtime::http::HttpCaller;
use crate::runtime::tool::{GeneratedTool, ToolError};
use anyhow::{Context as AnyhowContext, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Provisioning,
    Running,
    Passed,
    Failed,
    TimedOut,
    CrashFailed,
    TornDown,
}

/// What happened inside the context, before any expectation is applied.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    Completed(Value),
    ToolFailed(ToolError),
    Crashed(String),
    TimedOut,
}

/// 隔离执行上下文 (一次测试一个)
///
/// Owns a private working directory holding the tool artifact and the task
/// running it. Dropping the context aborts the task and deletes the
/// directory, so every exit path tears it down.
pub struct IsolatedContext {
    id: Uuid,
    state: ContextState,
    workdir: Option<TempDir>,
    artifact_path: PathBuf,
    task: Option<JoinHandle<Result<Value, ToolError>>>,
    live: Arc<AtomicUsize>,
}

impl IsolatedContext {
    /// Writes the serialized tool into a fresh temporary directory.
    pub fn provision(artifact: &[u8], live: Arc<AtomicUsize>) -> Result<Self> {
        let workdir = tempfile::Builder::new()
            .prefix("toolforge-ctx-")
            .tempdir()
            .context("Failed to create context directory")?;
        let artifact_path = workdir.path().join("tool.json");
        fs::write(&artifact_path, artifact)
            .with_context(|| format!("Failed to write tool artifact to {}", artifact_path.display()))?;

        live.fetch_add(1, Ordering::SeqCst);
        let ctx = Self {
            id: Uuid::new_v4(),
            state: ContextState::Provisioning,
            workdir: Some(workdir),
            artifact_path,
            task: None,
            live,
        };
        debug!(context = %ctx.id, dir = %ctx.path().display(), "Context provisioned");
        Ok(ctx)
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> ContextState {
        self.state
    }

    pub fn path(&self) -> &Path {
        self.workdir.as_ref().map(TempDir::path).unwrap_or(Path::new(""))
    }

    fn transition(&mut self, next: ContextState) {
        debug!(context = %self.id, from = ?self.state, to = ?next, "Context state");
        self.state = next;
    }

    /// Loads the tool from the context's own copy and runs it with `input`,
    /// bounded by `timeout`.
    pub async fn run(&mut self, input: Value, caller: Arc<dyn HttpCaller>, timeout: Duration) -> RunOutcome {
        let tool: GeneratedTool = match fs::read(&self.artifact_path)
            .context("Failed to read tool artifact")
            .and_then(|bytes| serde_json::from_slice(&bytes).context("Failed to load tool artifact"))
        {
            Ok(tool) => tool,
            Err(e) => return RunOutcome::Crashed(format!("{:#}", e)),
        };

        self.transition(ContextState::Running);
        let handle = self.task.insert(tokio::spawn(async move {
            tool.invoke(&input, caller.as_ref()).await
        }));

        let waited = tokio::time::timeout(timeout, &mut *handle).await;
        let outcome = match waited {
            Ok(Ok(Ok(output))) => RunOutcome::Completed(output),
            Ok(Ok(Err(err))) => RunOutcome::ToolFailed(err),
            Ok(Err(join_err)) => RunOutcome::Crashed(describe_join_error(join_err)),
            Err(_) => {
                handle.abort();
                return RunOutcome::TimedOut;
            }
        };
        // the handle has resolved and must not be polled again
        self.task = None;
        outcome
    }

    /// Records the verdict reached for this run.
    pub fn finish(&mut self, verdict: ContextState) {
        self.transition(verdict);
    }

    /// Aborts the task, waits for it to unwind, then releases the directory.
    pub async fn teardown(mut self) {
        if let Some(handle) = self.task.take() {
            if !handle.is_finished() {
                handle.abort();
            }
            let _ = handle.await;
        }
        // Drop does the rest
    }
}

impl Drop for IsolatedContext {
    fn drop(&mut self) {
        if let Some(handle) = self.task.take() {
            handle.abort();
        }
        if let Some(dir) = self.workdir.take() {
            if let Err(e) = dir.close() {
                debug!(context = %self.id, error = %e, "Failed to remove context directory");
            }
        }
        self.live.fetch_sub(1, Ordering::SeqCst);
        self.transition(ContextState::TornDown);
    }
}

fn describe_join_error(err: tokio::task::JoinError) -> String {
    if err.is_panic() {
        let payload = err.into_panic();
        if let Some(msg) = payload.downcast_ref::<&str>() {
            format!("tool panicked: {}", msg)
        } else if let Some(msg) = payload.downcast_ref::<String>() {
            format!("tool panicked: {}", msg)
        } else {
            "tool panicked".to_string()
        }
    } else {
        "tool task was cancelled".to_string()
    }
}
