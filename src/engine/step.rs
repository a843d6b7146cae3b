// SPDX-License-Identifier: MIT

//! Step trait and the per-invocation context handed to every step

use async_trait::async_trait;
use std::future::Future;
use std::sync::{Arc, Mutex};

use crate::engine::cancel::CancellationToken;
use crate::engine::error::StepError;
use crate::engine::interrupt::{Interrupt, InterruptData};
use crate::engine::state::WorkflowState;

/// A named unit of graph logic.
///
/// Steps receive the state by value and hand back the next state. They
/// carry no state of their own across invocations; anything a step needs
/// later must be written into the [`WorkflowState`].
#[async_trait]
pub trait Step: Send + Sync {
    async fn run(&self, state: WorkflowState, ctx: StepContext) -> Result<WorkflowState, StepError>;
}

/// Adapter turning an async closure into a [`Step`]
pub struct FnStep<F> {
    func: F,
}

/// Wrap an async closure as a step
///
/// ```ignore
/// builder.step("greet", step_fn(|mut state, _ctx| async move {
///     state.update("greeting", json!("hello"))?;
///     Ok(state)
/// }));
/// ```
pub fn step_fn<F, Fut>(func: F) -> FnStep<F>
where
    F: Fn(WorkflowState, StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<WorkflowState, StepError>> + Send + 'static,
{
    FnStep { func }
}

#[async_trait]
impl<F, Fut> Step for FnStep<F>
where
    F: Fn(WorkflowState, StepContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<WorkflowState, StepError>> + Send + 'static,
{
    async fn run(&self, state: WorkflowState, ctx: StepContext) -> Result<WorkflowState, StepError> {
        (self.func)(state, ctx).await
    }
}

/// What the engine shares with a running step: the thread id, the
/// cancellation token and, on resume, the human's raw answer.
#[derive(Debug, Clone)]
pub struct StepContext {
    thread_id: String,
    step: String,
    token: CancellationToken,
    resume_value: Arc<Mutex<Option<String>>>,
}

impl StepContext {
    pub fn new(
        thread_id: impl Into<String>,
        step: impl Into<String>,
        token: CancellationToken,
    ) -> Self {
        Self {
            thread_id: thread_id.into(),
            step: step.into(),
            token,
            resume_value: Arc::new(Mutex::new(None)),
        }
    }

    /// Context for re-entering a suspended step with the caller's answer
    pub fn with_resume_value(mut self, value: impl Into<String>) -> Self {
        self.resume_value = Arc::new(Mutex::new(Some(value.into())));
        self
    }

    pub fn thread_id(&self) -> &str {
        &self.thread_id
    }

    pub fn step_name(&self) -> &str {
        &self.step
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Guard call for safe points inside long-running steps
    pub fn check_cancelled(&self) -> Result<(), StepError> {
        self.token.check()
    }

    /// Ask the human for input.
    ///
    /// Returns the raw answer when this invocation was started by a resume
    /// and the answer has not been consumed yet. Otherwise returns
    /// `Err(StepError::Suspended)`, which the step propagates with `?`.
    pub fn suspend(
        &self,
        message: impl Into<String>,
        data: InterruptData,
    ) -> Result<String, StepError> {
        let answer = self
            .resume_value
            .lock()
            .ok()
            .and_then(|mut slot| slot.take());

        match answer {
            Some(raw) => Ok(raw),
            None => Err(StepError::suspended(Interrupt::new(message, data))),
        }
    }
}
