// src/engine/scheduler.rs

//! Turns a project's step graph into running processors.
//!
//! One [`Scheduler`] serves exactly one `execute_project` invocation and owns
//! the runtimes it creates; nothing is shared across invocations.

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::catalog::Catalog;
use crate::dag::StepGraph;
use crate::engine::{ExecutionHandle, ExecutionOptions, ExecutionSummary, ProjectLease};
use crate::errors::{KbflowError, Result};
use crate::processing::{ErrorRecord, Processing, ProcessingId, ProcessingStatus};
use crate::processor::{
    Exposure, ProcessorInput, ProcessorRegistry, ProcessorRuntime, RunReport, RuntimeHandle,
    Upstream,
};
use crate::store::ModelStore;
use crate::types::{ProjectId, StepId};

/// The processing chosen for every step of one invocation.
struct Batch {
    graph: StepGraph,
    /// Step ids, inputs before dependents.
    order: Vec<StepId>,
    by_step: HashMap<StepId, Processing>,
}

impl Batch {
    fn processing_ids(&self) -> Vec<ProcessingId> {
        self.order
            .iter()
            .filter_map(|s| self.by_step.get(s).map(|p| p.id))
            .collect()
    }
}

pub(crate) struct Scheduler<'a> {
    catalog: &'a Arc<dyn Catalog>,
    store: &'a Arc<ModelStore>,
    registry: &'a ProcessorRegistry,
    options: ExecutionOptions,
}

impl<'a> Scheduler<'a> {
    pub(crate) fn new(
        catalog: &'a Arc<dyn Catalog>,
        store: &'a Arc<ModelStore>,
        registry: &'a ProcessorRegistry,
        options: ExecutionOptions,
    ) -> Self {
        Self {
            catalog,
            store,
            registry,
            options,
        }
    }

    pub(crate) async fn execute(
        self,
        project: &str,
        resume_from: &[ProcessingId],
        lease: ProjectLease,
    ) -> Result<ExecutionHandle> {
        let mut batch = self.plan(project, resume_from)?;
        let ids = batch.processing_ids();

        let constructed = match self.resolve_pinned(&batch).await {
            Ok(resolved) => self.construct(&mut batch, &resolved),
            Err(err) => Err(err),
        };
        let runtimes = match constructed {
            Ok(runtimes) => runtimes,
            Err(err) => {
                error!(project = %project, error = %err, "pipeline construction failed");
                self.fail_batch(&mut batch, &err);
                return Ok(ExecutionHandle::finished(project.to_string(), ids));
            }
        };

        info!(
            project = %project,
            processings = ids.len(),
            dispatched = runtimes.len(),
            "dispatching processors"
        );
        let tasks: Vec<JoinHandle<RunReport>> = runtimes
            .into_iter()
            .map(|runtime| tokio::spawn(runtime.run()))
            .collect();

        let handle = ExecutionHandle::new(project.to_string(), ids, supervise(project.to_string(), tasks, lease));
        if self.options.wait {
            handle.wait().await;
        }
        Ok(handle)
    }

    /// Load the steps and pick a processing for each.
    ///
    /// Resume points pin themselves and, transitively, the processings they
    /// consumed; every other step gets a fresh `NotStarted` record. Errors here
    /// happen before any processing is written.
    fn plan(&self, project: &str, resume_from: &[ProcessingId]) -> Result<Batch> {
        let graph = StepGraph::new(self.catalog.steps_of_project(project)?);
        let order = graph.topological_order()?;

        let mut by_step: HashMap<StepId, Processing> = HashMap::new();
        let mut seen: HashSet<ProcessingId> = HashSet::new();
        let mut queue: VecDeque<ProcessingId> = resume_from.iter().copied().collect();
        while let Some(id) = queue.pop_front() {
            if !seen.insert(id) {
                continue;
            }
            let processing = self
                .catalog
                .processing(id)?
                .ok_or(KbflowError::ProcessingNotFound(id))?;
            if processing.project != project {
                return Err(KbflowError::Definition(format!(
                    "processing {id} belongs to project '{}', not '{project}'",
                    processing.project
                )));
            }
            if !graph.contains(&processing.step) {
                warn!(processing = %id, step = %processing.step, "resume point refers to an unknown step; ignoring");
                continue;
            }
            if let Some(existing) = by_step.get(&processing.step) {
                return Err(KbflowError::Definition(format!(
                    "conflicting resume points for step '{}': {} and {}",
                    processing.step, existing.id, id
                )));
            }
            queue.extend(processing.input_processings.iter().copied());
            debug!(step = %processing.step, processing = %id, status = %processing.status, "pinned processing");
            by_step.insert(processing.step.clone(), processing);
        }

        let mut created = Vec::new();
        for step_id in &order {
            if by_step.contains_key(step_id) {
                continue;
            }
            let Some(step) = graph.step(step_id) else {
                continue;
            };
            let inputs: BTreeSet<ProcessingId> = graph
                .inputs_of(step_id)
                .iter()
                .filter_map(|input| by_step.get(input).map(|p| p.id))
                .collect();
            let processing = Processing::new(step, inputs);
            created.push(processing.clone());
            by_step.insert(step_id.clone(), processing);
        }

        self.catalog.save_processings(&created)?;
        debug!(project = %project, created = created.len(), reused = by_step.len() - created.len(), "planned batch");

        Ok(Batch {
            graph,
            order,
            by_step,
        })
    }

    /// Instantiate a runtime for every `NotStarted` processing and wire it to
    /// its inputs. Processings that cannot run are failed on the spot.
    fn construct(
        &self,
        batch: &mut Batch,
        resolved: &HashMap<ProcessingId, Arc<Exposure>>,
    ) -> Result<Vec<ProcessorRuntime>> {
        let mut runtimes = Vec::new();
        let mut live: HashMap<StepId, RuntimeHandle> = HashMap::new();

        for step_id in batch.order.clone() {
            let Some(processing) = batch.by_step.get(&step_id).cloned() else {
                continue;
            };
            if processing.status != ProcessingStatus::NotStarted {
                continue;
            }

            let mut upstreams = Vec::new();
            let mut failed_upstream = None;
            for input in batch.graph.inputs_of(&step_id) {
                let upstream = batch.by_step.get(input).ok_or_else(|| {
                    KbflowError::IllegalState(format!("no processing for input step '{input}'"))
                })?;
                match upstream.status {
                    ProcessingStatus::Succeeded => {
                        let exposure = resolved.get(&upstream.id).ok_or_else(|| {
                            KbflowError::IllegalState(format!("input step '{input}' was not resolved"))
                        })?;
                        upstreams.push(Upstream::Resolved {
                            step: input.clone(),
                            processing: upstream.id,
                            exposure: Arc::clone(exposure),
                        });
                    }
                    ProcessingStatus::NotStarted => {
                        let handle = live.get(input).ok_or_else(|| {
                            KbflowError::IllegalState(format!("input step '{input}' has no runtime"))
                        })?;
                        upstreams.push(Upstream::Live(handle.clone()));
                    }
                    ProcessingStatus::Failed => {
                        let cause = upstream
                            .error
                            .clone()
                            .unwrap_or_else(|| ErrorRecord::new("failed without an error record"));
                        failed_upstream = Some(KbflowError::UpstreamFailed {
                            step: step_id.clone(),
                            upstream: input.clone(),
                            cause,
                        });
                        break;
                    }
                    ProcessingStatus::Running => {
                        return Err(KbflowError::IllegalState(format!(
                            "input step '{input}' of step '{step_id}' is already running in another execution"
                        )));
                    }
                }
            }
            if let Some(err) = failed_upstream {
                info!(step = %step_id, error = %err, "not starting processor");
                self.fail_unstarted(batch, processing, &err)?;
                continue;
            }

            let body = match self.registry.instantiate(
                &step_id,
                &processing.processor,
                processing.role,
                &processing.parameters,
            ) {
                Ok(body) => body,
                Err(err) => {
                    warn!(step = %step_id, error = %err, "cannot instantiate processor");
                    self.fail_unstarted(batch, processing, &err)?;
                    continue;
                }
            };

            let mut runtime = ProcessorRuntime::new(
                processing,
                body,
                Arc::clone(self.store),
                Arc::clone(self.catalog),
            )
            .with_upstream_timeout(self.options.upstream_timeout);
            for upstream in upstreams {
                runtime.add_upstream(upstream);
            }

            live.insert(step_id, runtime.handle());
            runtimes.push(runtime);
        }

        Ok(runtimes)
    }

    fn fail_unstarted(&self, batch: &mut Batch, mut processing: Processing, cause: &KbflowError) -> Result<()> {
        processing.fail(ErrorRecord::from_error(cause))?;
        self.catalog.save_processing(&processing)?;
        batch.by_step.insert(processing.step.clone(), processing);
        Ok(())
    }

    /// Load the exposures of the pinned, succeeded processings that a fresh
    /// processing of this batch consumes. Store reads run off the async
    /// workers.
    async fn resolve_pinned(&self, batch: &Batch) -> Result<HashMap<ProcessingId, Arc<Exposure>>> {
        let needed: Vec<Processing> = batch
            .order
            .iter()
            .filter(|s| batch.by_step.get(*s).is_some_and(|p| p.status == ProcessingStatus::NotStarted))
            .flat_map(|s| batch.graph.inputs_of(s))
            .filter_map(|input| batch.by_step.get(input))
            .filter(|p| p.status == ProcessingStatus::Succeeded)
            .cloned()
            .collect();
        if needed.is_empty() {
            return Ok(HashMap::new());
        }

        let catalog = Arc::clone(self.catalog);
        let store = Arc::clone(self.store);
        tokio::task::spawn_blocking(move || -> Result<HashMap<ProcessingId, Arc<Exposure>>> {
            let mut memo = HashMap::new();
            for processing in &needed {
                resolve_exposure(catalog.as_ref(), &store, processing, &mut memo)?;
            }
            Ok(memo)
        })
        .await
        .map_err(|join_err| KbflowError::IllegalState(format!("loading stored results aborted: {join_err}")))?
    }

    /// Fail every non-terminal processing of the batch with one shared error.
    fn fail_batch(&self, batch: &mut Batch, cause: &KbflowError) {
        let record = ErrorRecord::from_error(&KbflowError::Construction(ErrorRecord::from_error(cause)));
        for processing in batch.by_step.values_mut() {
            if processing.is_terminal() {
                continue;
            }
            if let Err(err) = processing.fail(record.clone()) {
                error!(processing = %processing.id, error = %err, "cannot fail processing");
                continue;
            }
            if let Err(err) = self.catalog.save_processing(processing) {
                error!(processing = %processing.id, error = %err, "failed to persist processing");
            }
        }
    }
}

/// Rebuild what a finished processing exposes, from its stored result and
/// (recursively) the processings it consumed.
fn resolve_exposure(
    catalog: &dyn Catalog,
    store: &ModelStore,
    processing: &Processing,
    memo: &mut HashMap<ProcessingId, Arc<Exposure>>,
) -> Result<Arc<Exposure>> {
    if let Some(exposure) = memo.get(&processing.id) {
        return Ok(Arc::clone(exposure));
    }
    let hash = match (processing.status, &processing.result_hash) {
        (ProcessingStatus::Succeeded, Some(hash)) => hash,
        _ => return Err(KbflowError::NotSucceeded(processing.id)),
    };
    let own = store.get(hash)?;

    let mut inputs = Vec::with_capacity(processing.input_processings.len());
    for id in &processing.input_processings {
        let input = catalog
            .processing(*id)?
            .ok_or(KbflowError::ProcessingNotFound(*id))?;
        inputs.push(resolve_exposure(catalog, store, &input, memo)?);
    }

    let frozen = ProcessorInput::freeze(processing.dataset.clone(), inputs.iter().map(Arc::as_ref));
    let exposure = Arc::new(Exposure::of(processing.role, &frozen, &own));
    debug!(step = %processing.step, processing = %processing.id, "resolved stored exposure");
    memo.insert(processing.id, Arc::clone(&exposure));
    Ok(exposure)
}

/// Wait for all processor tasks, then release the project and signal
/// completion.
fn supervise(
    project: ProjectId,
    tasks: Vec<JoinHandle<RunReport>>,
    lease: ProjectLease,
) -> watch::Receiver<Option<ExecutionSummary>> {
    let (done_tx, done_rx) = watch::channel(None);
    tokio::spawn(async move {
        let mut summary = ExecutionSummary {
            dispatched: tasks.len(),
            ..ExecutionSummary::default()
        };
        for task in tasks {
            match task.await {
                Ok(report) => {
                    if report.processing.status == ProcessingStatus::Failed {
                        summary.failed += 1;
                    }
                    if !report.recorded {
                        summary.unrecorded += 1;
                    }
                }
                Err(err) => {
                    summary.failed += 1;
                    summary.unrecorded += 1;
                    error!(project = %project, error = %err, "processor task panicked");
                }
            }
        }
        if summary.unrecorded > 0 {
            error!(project = %project, unrecorded = summary.unrecorded, "catalog is missing final processing records");
        }
        info!(project = %project, total = summary.dispatched, failed = summary.failed, "execution finished");
        // Release the project before anyone observes completion.
        drop(lease);
        done_tx.send_replace(Some(summary));
    });
    done_rx
}
