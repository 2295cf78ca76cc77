//! Errors of the queue pipeline.
//!
//! Library code returns [`LlqError`]; the runner and the config loader wrap
//! it in `anyhow`. Channel full / empty are not errors: `publish` waits and
//! `try_poll` returns `None`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LlqError {
    /// Configuration parsing or validation error. Always raised before any
    /// worker thread is started.
    #[error("config error: {0}")]
    Config(String),

    /// `start()` called on a worker that already owns a thread.
    #[error("worker '{0}' is already running")]
    AlreadyRunning(String),

    /// The worker's step returned an error; surfaced when the worker is joined.
    #[error("worker '{name}' failed: {reason}")]
    WorkerFailed { name: String, reason: String },

    /// The worker thread panicked; surfaced when the worker is joined.
    #[error("worker '{0}' panicked")]
    WorkerPanicked(String),

    /// Publish attempted on a closed channel.
    #[error("channel closed")]
    ChannelClosed,
}
