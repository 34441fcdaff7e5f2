// src/engine/handle.rs

use tokio::sync::watch;

use crate::processing::ProcessingId;
use crate::types::ProjectId;

/// Counts reported once every dispatched processor has stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExecutionSummary {
    pub dispatched: usize,
    pub failed: usize,
    /// Processors whose final record the catalog refused.
    pub unrecorded: usize,
}

/// Observes one `execute_project` invocation.
///
/// Completion is signalled once every dispatched processor has reached a
/// terminal state; the individual outcomes are read from the catalog.
#[derive(Debug, Clone)]
pub struct ExecutionHandle {
    project: ProjectId,
    processings: Vec<ProcessingId>,
    done: watch::Receiver<Option<ExecutionSummary>>,
}

impl ExecutionHandle {
    pub(crate) fn new(
        project: ProjectId,
        processings: Vec<ProcessingId>,
        done: watch::Receiver<Option<ExecutionSummary>>,
    ) -> Self {
        Self {
            project,
            processings,
            done,
        }
    }

    /// A handle for an invocation that dispatched nothing.
    pub(crate) fn finished(project: ProjectId, processings: Vec<ProcessingId>) -> Self {
        let (_, done) = watch::channel(Some(ExecutionSummary::default()));
        Self::new(project, processings, done)
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    /// Processings created or reused by this invocation, in dependency order.
    pub fn processings(&self) -> &[ProcessingId] {
        &self.processings
    }

    pub fn is_finished(&self) -> bool {
        self.done.borrow().is_some()
    }

    /// `None` while processors are still running.
    pub fn summary(&self) -> Option<ExecutionSummary> {
        *self.done.borrow()
    }

    /// Wait until every dispatched processor is terminal.
    pub async fn wait(&self) -> Option<ExecutionSummary> {
        let mut done = self.done.clone();
        // An error means the supervisor is gone, which only happens after it
        // has finished or the runtime is shutting down.
        match done.wait_for(Option::is_some).await {
            Ok(summary) => *summary,
            Err(_) => None,
        }
    }
}
