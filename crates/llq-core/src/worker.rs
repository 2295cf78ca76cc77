//! Cancellable thread-bound worker.
//!
//! A [`Worker`] owns one unit of repeated work (a [`WorkStep`]) and runs it on
//! a dedicated OS thread. The step type is a generic parameter, so the hot
//! loop is monomorphized per role and each iteration is a direct call.
//!
//! # Lifecycle
//!
//! ```text
//! Worker::new ──► Idle ──start()──► Running ──step() == Done────► Completed
//!                                     │
//!                                     └──request_stop()──► cancelled ──► Completed
//! ```
//!
//! Cancellation is cooperative: the [`CancelToken`] is checked between
//! iterations only, never inside a step. The step is moved onto the worker
//! thread and handed back on join, so a completed worker can be inspected and
//! started again. Dropping a worker cancels and joins its thread.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;

use tracing::{debug, error, warn};

use crate::cpu_affinity;
use crate::error::LlqError;

/// Shared cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    fn reset(&self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Result of one iteration of a [`WorkStep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Keep looping.
    Continue,
    /// The work reached its completion condition.
    Done,
}

/// Why a worker loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// The step returned [`Step::Done`].
    Completed,
    /// Cancellation was observed between iterations.
    Cancelled,
    /// The step returned an error or panicked.
    Failed,
}

/// Observable state of a [`Worker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Running,
    Completed,
}

/// One unit of repeated work, executed by [`Worker`] on its own thread.
pub trait WorkStep: Send + 'static {
    /// Run one iteration.
    fn step(&mut self) -> Result<Step, LlqError>;

    /// Called once on the worker thread after the loop ends, whatever the
    /// reason.
    fn finish(&mut self, _exit: ExitReason) {}
}

type Outcome<S> = (S, Result<ExitReason, LlqError>);

/// Runs a [`WorkStep`] on a dedicated thread with cooperative cancellation.
pub struct Worker<S: WorkStep> {
    name: String,
    token: CancelToken,
    core: Option<usize>,
    step: Option<S>,
    handle: Option<JoinHandle<Outcome<S>>>,
    last_exit: Option<ExitReason>,
}

impl<S: WorkStep> Worker<S> {
    /// Create an idle worker. No thread is spawned until [`start`](Self::start).
    pub fn new(name: impl Into<String>, step: S) -> Self {
        Self {
            name: name.into(),
            token: CancelToken::new(),
            core: None,
            step: Some(step),
            handle: None,
            last_exit: None,
        }
    }

    /// Pin the worker thread to `core` when it starts.
    pub fn with_core(mut self, core: Option<usize>) -> Self {
        self.core = core;
        self
    }

    /// Spawn the worker thread.
    ///
    /// Refused with [`LlqError::AlreadyRunning`] if a thread is already
    /// associated with this worker; nothing else changes in that case.
    pub fn start(&mut self) -> Result<(), LlqError> {
        if self.handle.is_some() {
            warn!("[{}] start refused: already running", self.name);
            return Err(LlqError::AlreadyRunning(self.name.clone()));
        }
        // The step is only missing if the previous thread died without
        // handing it back.
        let mut step = self.step.take().ok_or_else(|| LlqError::WorkerPanicked(self.name.clone()))?;

        self.token.reset();
        self.last_exit = None;

        let name = self.name.clone();
        let token = self.token.clone();
        let core = self.core;

        let handle = std::thread::Builder::new()
            .name(self.name.clone())
            .spawn(move || {
                cpu_affinity::pin_if_configured(&name, core);
                debug!("[{name}] worker started");

                let result = match panic::catch_unwind(AssertUnwindSafe(|| run_loop(&mut step, &token))) {
                    Ok(Ok(exit)) => Ok(exit),
                    Ok(Err(e)) => {
                        error!("[{name}] worker failed: {e}");
                        Err(LlqError::WorkerFailed { name: name.clone(), reason: e.to_string() })
                    }
                    Err(payload) => {
                        error!("[{name}] worker panicked: {}", panic_message(payload.as_ref()));
                        Err(LlqError::WorkerPanicked(name.clone()))
                    }
                };

                let exit = result.as_ref().copied().unwrap_or(ExitReason::Failed);
                step.finish(exit);
                debug!("[{name}] worker exited ({exit:?})");
                (step, result)
            })
            .map_err(|e| LlqError::WorkerFailed { name: self.name.clone(), reason: e.to_string() })?;

        self.handle = Some(handle);
        Ok(())
    }

    /// Raise the cancellation token and wait for the thread to exit.
    ///
    /// Returns `Ok(None)` if no thread was running.
    pub fn request_stop(&mut self) -> Result<Option<ExitReason>, LlqError> {
        if self.handle.is_none() {
            return Ok(None);
        }
        self.token.cancel();
        self.join()
    }

    /// Wait for the thread to exit on its own, without cancelling it.
    ///
    /// Returns `Ok(None)` if no thread was running. A step error or panic is
    /// surfaced here as [`LlqError::WorkerFailed`] / [`LlqError::WorkerPanicked`].
    pub fn join(&mut self) -> Result<Option<ExitReason>, LlqError> {
        let Some(handle) = self.handle.take() else {
            return Ok(None);
        };

        match handle.join() {
            Ok((step, result)) => {
                self.step = Some(step);
                let exit = result.as_ref().copied().unwrap_or(ExitReason::Failed);
                self.last_exit = Some(exit);
                result.map(Some)
            }
            Err(payload) => {
                // Only reachable if `finish` itself panicked.
                error!("[{}] worker panicked during finish: {}", self.name, panic_message(payload.as_ref()));
                self.last_exit = Some(ExitReason::Failed);
                Err(LlqError::WorkerPanicked(self.name.clone()))
            }
        }
    }

    pub fn state(&self) -> WorkerState {
        match (&self.handle, self.last_exit) {
            (Some(_), _) => WorkerState::Running,
            (None, Some(_)) => WorkerState::Completed,
            (None, None) => WorkerState::Idle,
        }
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// A handle to this worker's cancellation flag.
    pub fn cancel_token(&self) -> CancelToken {
        self.token.clone()
    }

    /// Why the last run ended, once it has been joined.
    pub fn last_exit(&self) -> Option<ExitReason> {
        self.last_exit
    }

    /// The work step, available while no thread is running.
    pub fn step(&self) -> Option<&S> {
        self.step.as_ref()
    }
}

impl<S: WorkStep> Drop for Worker<S> {
    fn drop(&mut self) {
        if self.handle.is_some() {
            self.token.cancel();
            if let Err(e) = self.join() {
                warn!("[{}] error while joining on drop: {e}", self.name);
            }
        }
    }
}

impl<S: WorkStep> std::fmt::Debug for Worker<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Worker")
            .field("name", &self.name)
            .field("state", &self.state())
            .field("core", &self.core)
            .finish()
    }
}

#[inline]
fn run_loop<S: WorkStep>(step: &mut S, token: &CancelToken) -> Result<ExitReason, LlqError> {
    loop {
        if token.is_cancelled() {
            return Ok(ExitReason::Cancelled);
        }
        if step.step()? == Step::Done {
            return Ok(ExitReason::Completed);
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "<non-string panic payload>"
    }
}
