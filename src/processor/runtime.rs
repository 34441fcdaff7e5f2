// src/processor/runtime.rs

//! The per-processing worker.
//!
//! A [`ProcessorRuntime`] drives one [`Processing`] through
//! `NotStarted -> Running -> {Succeeded | Failed}`. Its state is broadcast on
//! a `tokio::sync::watch` channel; dependents hold a [`RuntimeHandle`] and
//! wait on it until the state is terminal before reading the exposure.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::errors::{KbflowError, Result};
use crate::processing::{ErrorRecord, Processing, ProcessingId, ProcessingStatus};
use crate::processor::{Exposure, ProcessorBody, ProcessorInput};
use crate::store::{ModelHash, ModelStore};
use crate::types::StepId;

/// State as observed by dependents.
#[derive(Debug, Clone)]
pub enum RuntimeState {
    NotStarted,
    Running,
    Succeeded(Arc<Exposure>),
    Failed(Arc<ErrorRecord>),
}

impl RuntimeState {
    pub fn status(&self) -> ProcessingStatus {
        match self {
            RuntimeState::NotStarted => ProcessingStatus::NotStarted,
            RuntimeState::Running => ProcessingStatus::Running,
            RuntimeState::Succeeded(_) => ProcessingStatus::Succeeded,
            RuntimeState::Failed(_) => ProcessingStatus::Failed,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status().is_terminal()
    }
}

/// Read side of a runtime, cheap to clone.
#[derive(Debug, Clone)]
pub struct RuntimeHandle {
    step: StepId,
    processing: ProcessingId,
    state: watch::Receiver<RuntimeState>,
}

impl RuntimeHandle {
    pub fn step(&self) -> &str {
        &self.step
    }

    pub fn processing_id(&self) -> ProcessingId {
        self.processing
    }

    pub fn status(&self) -> ProcessingStatus {
        self.state.borrow().status()
    }

    /// What the runtime exposes downstream; `None` until it has succeeded.
    pub fn exposure(&self) -> Option<Arc<Exposure>> {
        match &*self.state.borrow() {
            RuntimeState::Succeeded(exposure) => Some(Arc::clone(exposure)),
            _ => None,
        }
    }

    /// Block until the runtime is terminal.
    ///
    /// Returns `None` if the runtime was dropped without ever finishing.
    pub async fn wait_terminal(&self) -> Option<RuntimeState> {
        let mut rx = self.state.clone();
        match rx.wait_for(RuntimeState::is_terminal).await {
            Ok(state) => Some(state.clone()),
            Err(_) => None,
        }
    }
}

/// An input of a runtime: either another live runtime of the same
/// invocation, or the already-computed exposure of a historical processing.
#[derive(Debug, Clone)]
pub enum Upstream {
    Live(RuntimeHandle),
    Resolved {
        step: StepId,
        processing: ProcessingId,
        exposure: Arc<Exposure>,
    },
}

impl Upstream {
    pub fn step(&self) -> &str {
        match self {
            Upstream::Live(handle) => handle.step(),
            Upstream::Resolved { step, .. } => step,
        }
    }

    pub fn processing_id(&self) -> ProcessingId {
        match self {
            Upstream::Live(handle) => handle.processing_id(),
            Upstream::Resolved { processing, .. } => *processing,
        }
    }
}

/// How a [`ProcessorRuntime::run`] ended.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub processing: Processing,
    /// Whether the catalog holds the final record.
    pub recorded: bool,
}

pub struct ProcessorRuntime {
    processing: Processing,
    body: Arc<dyn ProcessorBody>,
    upstreams: Vec<Upstream>,
    state: watch::Sender<RuntimeState>,
    store: Arc<ModelStore>,
    catalog: Arc<dyn Catalog>,
    upstream_timeout: Option<Duration>,
}

impl fmt::Debug for ProcessorRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRuntime")
            .field("step", &self.processing.step)
            .field("processing", &self.processing.id)
            .field("status", &self.processing.status)
            .field("upstreams", &self.upstreams.len())
            .finish_non_exhaustive()
    }
}

impl ProcessorRuntime {
    pub fn new(
        processing: Processing,
        body: Arc<dyn ProcessorBody>,
        store: Arc<ModelStore>,
        catalog: Arc<dyn Catalog>,
    ) -> Self {
        let (state, _) = watch::channel(RuntimeState::NotStarted);
        Self {
            processing,
            body,
            upstreams: Vec::new(),
            state,
            store,
            catalog,
            upstream_timeout: None,
        }
    }

    /// Give up on an upstream that stays non-terminal for longer than `limit`.
    pub fn with_upstream_timeout(mut self, limit: Option<Duration>) -> Self {
        self.upstream_timeout = limit;
        self
    }

    pub fn add_upstream(&mut self, upstream: Upstream) {
        self.upstreams.push(upstream);
    }

    pub fn upstreams(&self) -> &[Upstream] {
        &self.upstreams
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle {
            step: self.processing.step.clone(),
            processing: self.processing.id,
            state: self.state.subscribe(),
        }
    }

    pub fn processing(&self) -> &Processing {
        &self.processing
    }

    pub fn status(&self) -> ProcessingStatus {
        self.processing.status
    }

    /// Legal from `NotStarted` only.
    pub async fn start(&mut self) -> Result<()> {
        self.processing.start()?;
        self.commit(RuntimeState::Running).await
    }

    /// On a failed write the record stays `Running`, so it can still fail.
    pub async fn succeed(&mut self, hash: ModelHash, exposure: Exposure) -> Result<()> {
        let running = self.processing.clone();
        self.processing.succeed(hash)?;
        if let Err(err) = self.commit(RuntimeState::Succeeded(Arc::new(exposure))).await {
            self.processing = running;
            return Err(err);
        }
        Ok(())
    }

    /// Legal from `NotStarted` (the runtime never ran) and from `Running`.
    pub async fn fail(&mut self, error: ErrorRecord) -> Result<()> {
        self.processing.fail(error.clone())?;
        self.commit(RuntimeState::Failed(Arc::new(error))).await
    }

    /// Persist the record, then wake waiters. A state the catalog refused is
    /// never broadcast.
    async fn commit(&self, state: RuntimeState) -> Result<()> {
        let catalog = Arc::clone(&self.catalog);
        let record = self.processing.clone();
        let written = tokio::task::spawn_blocking(move || catalog.save_processing(&record))
            .await
            .map_err(|join_err| KbflowError::IllegalState(format!("catalog write aborted: {join_err}")))
            .and_then(|saved| saved);
        if let Err(err) = written {
            error!(
                step = %self.processing.step,
                processing = %self.processing.id,
                status = %self.processing.status,
                error = %err,
                "failed to persist processing"
            );
            return Err(KbflowError::Persistence {
                step: self.processing.step.clone(),
                cause: ErrorRecord::from_error(&err),
            });
        }
        self.state.send_replace(state);
        Ok(())
    }

    /// Drive the processing to a terminal state.
    ///
    /// Errors never escape: they end up in the record. If even the failed
    /// record cannot be written the report says so, and dependents see the
    /// runtime stop without finishing.
    pub async fn run(mut self) -> RunReport {
        if !self.processing.status.can_become(ProcessingStatus::Running) {
            warn!(
                step = %self.processing.step,
                processing = %self.processing.id,
                status = %self.processing.status,
                "refusing to run processor"
            );
            return RunReport {
                processing: self.processing,
                recorded: true,
            };
        }

        let outcome = match self.start().await {
            Ok(()) => {
                info!(
                    step = %self.processing.step,
                    processing = %self.processing.id,
                    role = %self.processing.role,
                    "processor started"
                );
                self.complete().await
            }
            Err(err) => Err(err),
        };
        let Err(err) = outcome else {
            return RunReport {
                processing: self.processing,
                recorded: true,
            };
        };

        let record = ErrorRecord::from_error(&err);
        warn!(
            step = %self.processing.step,
            processing = %self.processing.id,
            error = %format!("{record:#}"),
            "processor failed"
        );
        let recorded = match self.fail(record).await {
            Ok(()) => true,
            Err(err) => {
                error!(step = %self.processing.step, error = %err, "cannot record failed processing");
                false
            }
        };
        RunReport {
            processing: self.processing,
            recorded,
        }
    }

    async fn complete(&mut self) -> Result<()> {
        let (hash, exposure) = self.execute().await?;
        self.succeed(hash.clone(), exposure).await?;
        info!(
            step = %self.processing.step,
            processing = %self.processing.id,
            hash = %hash,
            "processor succeeded"
        );
        Ok(())
    }

    async fn execute(&self) -> Result<(ModelHash, Exposure)> {
        let input = self.prepare().await?;

        let body = Arc::clone(&self.body);
        let store = Arc::clone(&self.store);
        let role = self.processing.role;
        let step = self.processing.step.clone();
        let joined = tokio::task::spawn_blocking(move || -> Result<(ModelHash, Exposure)> {
            let own = body.compute(&input).map_err(|err| KbflowError::Compute {
                step,
                cause: ErrorRecord::from_anyhow(&err),
            })?;
            let hash = store.save(&own)?;
            Ok((hash, Exposure::of(role, &input, &own)))
        })
        .await;

        match joined {
            Ok(result) => result,
            Err(join_err) => Err(KbflowError::Compute {
                step: self.processing.step.clone(),
                cause: ErrorRecord::new(format!("processor task aborted: {join_err}")),
            }),
        }
    }

    /// Wait for every upstream to be terminal, then freeze their exposures
    /// into one input.
    async fn prepare(&self) -> Result<ProcessorInput> {
        let mut exposures = Vec::with_capacity(self.upstreams.len());
        for upstream in &self.upstreams {
            exposures.push(self.resolve(upstream).await?);
        }
        Ok(ProcessorInput::freeze(
            self.processing.dataset.clone(),
            exposures.iter().map(Arc::as_ref),
        ))
    }

    async fn resolve(&self, upstream: &Upstream) -> Result<Arc<Exposure>> {
        let handle = match upstream {
            Upstream::Resolved { exposure, .. } => return Ok(Arc::clone(exposure)),
            Upstream::Live(handle) => handle,
        };

        debug!(
            step = %self.processing.step,
            upstream = %handle.step(),
            "waiting for upstream"
        );
        let waited = match self.upstream_timeout {
            Some(limit) => tokio::time::timeout(limit, handle.wait_terminal())
                .await
                .map_err(|_| KbflowError::UpstreamTimeout {
                    step: self.processing.step.clone(),
                    upstream: handle.step().to_string(),
                })?,
            None => handle.wait_terminal().await,
        };

        let upstream_failed = |cause: ErrorRecord| KbflowError::UpstreamFailed {
            step: self.processing.step.clone(),
            upstream: handle.step().to_string(),
            cause,
        };
        match waited {
            Some(RuntimeState::Succeeded(exposure)) => Ok(exposure),
            Some(RuntimeState::Failed(record)) => Err(upstream_failed((*record).clone())),
            _ => Err(upstream_failed(ErrorRecord::new(
                "upstream runtime stopped before finishing",
            ))),
        }
    }
}
