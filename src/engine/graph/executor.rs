// SPDX-License-Identifier: MIT

//! Run/resume executor

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};

use super::builder::Graph;
use super::types::{EngineEvent, RunResult, END};
use crate::engine::cancel::{CancellationRegistry, CancellationToken};
use crate::engine::checkpoint::{Checkpoint, CheckpointStore};
use crate::engine::error::{CheckpointError, EngineError, StepError};
use crate::engine::state::{WorkflowState, WorkflowStatus};
use crate::engine::step::StepContext;

/// Step executions allowed in one invocation before the run is failed
pub const DEFAULT_MAX_STEPS: usize = 100;

/// Message returned when a run is cancelled through `resume("cancel")`
pub const CANCELLED_BY_USER: &str = "Workflow cancelled by user";

/// Generate a fresh thread id
pub fn new_thread_id() -> String {
    format!("workflow_{}", uuid::Uuid::new_v4())
}

/// The literal cancellation command accepted by `resume`
pub fn is_cancel_command(input: &str) -> bool {
    input.trim().eq_ignore_ascii_case("cancel")
}

/// Drives a [`Graph`] one step at a time, checkpointing every transition.
///
/// Steps of one thread never run concurrently: every invocation holds a
/// per-thread lock. Distinct threads run in parallel.
pub struct Engine {
    graph: Arc<Graph>,
    store: Arc<dyn CheckpointStore>,
    cancellations: CancellationRegistry,
    locks: DashMap<String, Arc<Mutex<()>>>,
    max_steps: usize,
}

impl Engine {
    pub fn new(graph: Graph, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            graph: Arc::new(graph),
            store,
            cancellations: CancellationRegistry::new(),
            locks: DashMap::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn store(&self) -> &Arc<dyn CheckpointStore> {
        &self.store
    }

    /// Start a new run. An existing checkpoint under `thread_id` is replaced.
    pub async fn run(&self, input: &str, thread_id: Option<String>) -> RunResult {
        self.run_with_token(input, thread_id, CancellationToken::new())
            .await
    }

    pub async fn run_with_token(
        &self,
        input: &str,
        thread_id: Option<String>,
        token: CancellationToken,
    ) -> RunResult {
        self.start(input, thread_id, token, None).await
    }

    /// Like [`Engine::run`], reporting progress on `events`
    pub async fn run_stream(
        &self,
        input: &str,
        thread_id: Option<String>,
        events: mpsc::Sender<EngineEvent>,
    ) -> RunResult {
        self.start(input, thread_id, CancellationToken::new(), Some(&events))
            .await
    }

    /// Continue a suspended run with the human's raw answer.
    ///
    /// `"cancel"` (any case) ends the run without invoking a step. Fails
    /// with [`EngineError::NotFound`] for unknown or finished threads.
    pub async fn resume(&self, input: &str, thread_id: &str) -> Result<RunResult, EngineError> {
        self.resume_with_token(input, thread_id, CancellationToken::new())
            .await
    }

    pub async fn resume_with_token(
        &self,
        input: &str,
        thread_id: &str,
        token: CancellationToken,
    ) -> Result<RunResult, EngineError> {
        self.continue_run(input, thread_id, token, None).await
    }

    pub async fn resume_stream(
        &self,
        input: &str,
        thread_id: &str,
        events: mpsc::Sender<EngineEvent>,
    ) -> Result<RunResult, EngineError> {
        self.continue_run(input, thread_id, CancellationToken::new(), Some(&events))
            .await
    }

    /// Request cancellation of the invocation currently running `thread_id`.
    /// Returns false when no invocation is in flight.
    pub async fn cancel(&self, thread_id: &str) -> bool {
        let cancelled = self.cancellations.cancel(thread_id).await;
        if cancelled {
            log::info!("[{}] cancellation requested", thread_id);
        }
        cancelled
    }

    /// Current checkpoint of a thread
    pub async fn snapshot(&self, thread_id: &str) -> Result<Checkpoint, EngineError> {
        let mut checkpoint = self.store.load(thread_id).await?;
        if let Some(schema) = self.graph.schema() {
            checkpoint.state.attach_schema(schema.clone());
        }
        Ok(checkpoint)
    }

    /// Cancel anything in flight and delete the thread's checkpoint
    pub async fn discard(&self, thread_id: &str) -> Result<bool, EngineError> {
        self.cancellations.cancel(thread_id).await;
        let _lock = self.lock_thread(thread_id).await;
        let existed = self.store.delete(thread_id).await?;
        Ok(existed)
    }

    /// Hold the thread's lock until the returned guard is dropped
    async fn lock_thread(&self, thread_id: &str) -> ThreadLock<'_> {
        let lock = self
            .locks
            .entry(thread_id.to_string())
            .or_default()
            .value()
            .clone();
        ThreadLock {
            locks: &self.locks,
            thread_id: thread_id.to_string(),
            guard: Some(lock.lock_owned().await),
        }
    }

    async fn start(
        &self,
        input: &str,
        thread_id: Option<String>,
        token: CancellationToken,
        events: Option<&mpsc::Sender<EngineEvent>>,
    ) -> RunResult {
        let thread_id = thread_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(new_thread_id);
        let _lock = self.lock_thread(&thread_id).await;

        log::info!("[{}] starting run at '{}'", thread_id, self.graph.entry());
        let state = self.graph.initial_state(input);
        let entry = self.graph.entry().to_string();

        self.cancellations.register(&thread_id, token.clone()).await;
        let result = self.drive(&thread_id, state, entry, None, &token, events).await;
        self.cancellations.remove(&thread_id).await;
        result
    }

    async fn continue_run(
        &self,
        input: &str,
        thread_id: &str,
        token: CancellationToken,
        events: Option<&mpsc::Sender<EngineEvent>>,
    ) -> Result<RunResult, EngineError> {
        if is_cancel_command(input) {
            let result = self.cancel_thread(thread_id).await?;
            emit(events, EngineEvent::Finished { result: result.clone() }).await;
            return Ok(result);
        }

        let _lock = self.lock_thread(thread_id).await;

        let checkpoint = self.store.load(thread_id).await?;
        if checkpoint.state.is_terminal() {
            log::warn!(
                "[{}] resume rejected: run already {}",
                thread_id,
                checkpoint.state.status
            );
            return Err(EngineError::not_found(thread_id));
        }

        let mut state = checkpoint.state;
        if let Some(schema) = self.graph.schema() {
            state.attach_schema(schema.clone());
        }
        state.status = WorkflowStatus::Running;

        // Without a suspended step the process stopped between steps;
        // re-enter the step that was about to run.
        let (step, answer) = match checkpoint.suspended_step {
            Some(step) => (step, Some(input.to_string())),
            None => (state.current_step.clone(), None),
        };
        log::info!("[{}] resuming at '{}'", thread_id, step);

        self.cancellations.register(thread_id, token.clone()).await;
        let result = self.drive(thread_id, state, step, answer, &token, events).await;
        self.cancellations.remove(thread_id).await;
        Ok(result)
    }

    /// Handle the cancellation command: stop anything in flight, then mark
    /// a live checkpoint cancelled. Finished or unknown threads are left
    /// untouched but still answer `cancelled`.
    async fn cancel_thread(&self, thread_id: &str) -> Result<RunResult, EngineError> {
        self.cancellations.cancel(thread_id).await;

        let _lock = self.lock_thread(thread_id).await;

        let checkpoint = match self.store.load(thread_id).await {
            Ok(checkpoint) => checkpoint,
            Err(CheckpointError::NotFound(_)) => {
                log::info!("[{}] cancel requested for unknown thread", thread_id);
                return Ok(RunResult::cancelled(thread_id, None, CANCELLED_BY_USER));
            }
            Err(e) => return Err(e.into()),
        };

        if checkpoint.state.is_terminal() {
            return Ok(RunResult::cancelled(
                thread_id,
                Some(&checkpoint.state),
                CANCELLED_BY_USER,
            ));
        }

        let mut state = checkpoint.state;
        state.status = WorkflowStatus::Cancelled;
        state.version += 1;
        self.store
            .save(Checkpoint::new(thread_id, state.clone()))
            .await?;
        log::info!("[{}] cancelled by user at '{}'", thread_id, state.current_step);
        Ok(RunResult::cancelled(thread_id, Some(&state), CANCELLED_BY_USER))
    }

    /// The step loop shared by run and resume
    async fn drive(
        &self,
        thread_id: &str,
        mut state: WorkflowState,
        mut current: String,
        mut answer: Option<String>,
        token: &CancellationToken,
        events: Option<&mpsc::Sender<EngineEvent>>,
    ) -> RunResult {
        let mut executed = 0usize;

        loop {
            state.current_step = current.clone();

            if token.is_cancellation_requested() {
                log::info!("[{}] cancelled before '{}'", thread_id, current);
                state.status = WorkflowStatus::Cancelled;
                return self.finish(thread_id, state, events).await;
            }

            executed += 1;
            if executed > self.max_steps {
                log::error!(
                    "[{}] exceeded {} steps, stopping at '{}'",
                    thread_id,
                    self.max_steps,
                    current
                );
                state.fail(format!(
                    "workflow exceeded the maximum of {} steps",
                    self.max_steps
                ));
                return self.finish(thread_id, state, events).await;
            }

            let Some(step) = self.graph.step(&current).cloned() else {
                state.fail(format!("step '{}' is not defined", current));
                return self.finish(thread_id, state, events).await;
            };

            log::debug!("[{}] executing '{}'", thread_id, current);
            emit(
                events,
                EngineEvent::StepStarted {
                    thread_id: thread_id.to_string(),
                    step: current.clone(),
                },
            )
            .await;

            let mut ctx = StepContext::new(thread_id, current.clone(), token.clone());
            if let Some(raw) = answer.take() {
                ctx = ctx.with_resume_value(raw);
            }

            match step.run(state.clone(), ctx).await {
                Ok(mut next_state) => {
                    next_state.current_step = current.clone();

                    // a step may end the run itself, e.g. a merge marking it cancelled
                    if next_state.is_terminal() {
                        log::info!(
                            "[{}] '{}' ended the run as {}",
                            thread_id,
                            current,
                            next_state.status
                        );
                        return self.finish(thread_id, next_state, events).await;
                    }
                    next_state.status = WorkflowStatus::Running;

                    let next = match self.graph.next_step(&current, &next_state) {
                        Ok(next) => next,
                        Err(e) => {
                            log::error!("[{}] routing failed: {}", thread_id, e);
                            next_state.fail(e.to_string());
                            return self.finish(thread_id, next_state, events).await;
                        }
                    };

                    emit(
                        events,
                        EngineEvent::StepCompleted {
                            thread_id: thread_id.to_string(),
                            step: current.clone(),
                            next: next.clone(),
                        },
                    )
                    .await;

                    if next == END {
                        next_state.status = WorkflowStatus::Completed;
                        log::info!("[{}] completed after '{}'", thread_id, current);
                        return self.finish(thread_id, next_state, events).await;
                    }

                    next_state.current_step = next.clone();
                    next_state.version += 1;
                    if let Err(e) = self
                        .store
                        .save(Checkpoint::new(thread_id, next_state.clone()))
                        .await
                    {
                        log::error!("[{}] checkpoint save failed: {}", thread_id, e);
                        next_state.fail(format!("failed to save checkpoint: {}", e));
                        return self.report(thread_id, next_state, events).await;
                    }

                    state = next_state;
                    current = next;
                }
                Err(StepError::Suspended(interrupt)) => {
                    log::info!(
                        "[{}] '{}' awaiting input: {}",
                        thread_id,
                        current,
                        interrupt.message
                    );
                    state.status = WorkflowStatus::AwaitingInput;
                    state.version += 1;
                    let checkpoint = Checkpoint::new(thread_id, state.clone())
                        .suspended(current.clone(), (*interrupt).clone());
                    if let Err(e) = self.store.save(checkpoint).await {
                        log::error!("[{}] checkpoint save failed: {}", thread_id, e);
                        state.fail(format!("failed to save checkpoint: {}", e));
                        return self.report(thread_id, state, events).await;
                    }

                    emit(
                        events,
                        EngineEvent::Suspended {
                            thread_id: thread_id.to_string(),
                            step: current.clone(),
                            interrupt: (*interrupt).clone(),
                        },
                    )
                    .await;
                    let result = RunResult::awaiting(thread_id, &state, &interrupt);
                    emit(events, EngineEvent::Finished { result: result.clone() }).await;
                    return result;
                }
                Err(StepError::Cancelled) => {
                    log::info!("[{}] '{}' observed cancellation", thread_id, current);
                    state.status = WorkflowStatus::Cancelled;
                    return self.finish(thread_id, state, events).await;
                }
                Err(e) => {
                    log::error!("[{}] '{}' failed: {}", thread_id, current, e);
                    state.fail(e.to_string());
                    return self.finish(thread_id, state, events).await;
                }
            }
        }
    }

    /// Persist a terminal state and report it
    async fn finish(
        &self,
        thread_id: &str,
        mut state: WorkflowState,
        events: Option<&mpsc::Sender<EngineEvent>>,
    ) -> RunResult {
        state.version += 1;
        if let Err(e) = self
            .store
            .save(Checkpoint::new(thread_id, state.clone()))
            .await
        {
            log::error!("[{}] checkpoint save failed: {}", thread_id, e);
            if state.error.is_none() {
                state.fail(format!("failed to save checkpoint: {}", e));
            }
        }
        self.report(thread_id, state, events).await
    }

    async fn report(
        &self,
        thread_id: &str,
        state: WorkflowState,
        events: Option<&mpsc::Sender<EngineEvent>>,
    ) -> RunResult {
        let result = RunResult::from_state(thread_id, &state);
        emit(events, EngineEvent::Finished { result: result.clone() }).await;
        result
    }
}

/// Per-thread lock held for one invocation. On drop the map entry is
/// removed unless another caller still holds or waits on the same mutex.
struct ThreadLock<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    thread_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for ThreadLock<'_> {
    fn drop(&mut self) {
        self.guard.take();
        self.locks
            .remove_if(&self.thread_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

async fn emit(events: Option<&mpsc::Sender<EngineEvent>>, event: EngineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}
