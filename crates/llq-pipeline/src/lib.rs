//! # llq-pipeline
//!
//! Market-data pipeline roles and their orchestrator.
//!
//! ## Architecture
//!
//! ```text
//! Exchange (producer) ──┐
//! Exchange (producer) ──┼──► TradeChannel ──► Strategy (consumer)      group "S1"
//!                       │
//! Exchange (producer) ──┼──► TradeChannel ──► Strategy (consumer)      group "S2"
//! Exchange (producer) ──┘
//! ```
//!
//! Every role runs on its own [`llq_core::worker::Worker`] thread. Groups
//! share nothing; the [`pipeline::Pipeline`] orchestrator builds them from a
//! [`llq_core::config::PipelineConfig`], starts them, and joins them.
//!
//! - [`generator`]: random price / volume source for exchanges
//! - [`producer`]: the exchange role
//! - [`consumer`]: the strategy role
//! - [`report`]: one report per role, collected over a crossbeam channel
//! - [`pipeline`]: validation, wiring, start, wait, shutdown

pub mod consumer;
pub mod generator;
pub mod pipeline;
pub mod producer;
pub mod report;

use llq_core::LlqError;
use llq_core::worker::{CancelToken, ExitReason, WorkerState};

pub use consumer::Strategy;
pub use pipeline::{Pipeline, PipelineSummary, RunningPipeline, ShutdownHandle};
pub use producer::Exchange;

/// Lifecycle surface shared by exchanges and strategies.
///
/// The orchestrator drives roles through this trait; the per-record hot loop
/// stays inside each role's statically dispatched worker.
pub trait PipelineRole {
    /// Human-readable role name (instrument for exchanges).
    fn name(&self) -> &str;
    /// Spawn the role's thread. Refused if already running.
    fn start(&mut self) -> Result<(), LlqError>;
    /// Cancel and join the role's thread.
    fn request_stop(&mut self) -> Result<Option<ExitReason>, LlqError>;
    /// Join the role's thread without cancelling it.
    fn join(&mut self) -> Result<Option<ExitReason>, LlqError>;
    /// Current lifecycle state.
    fn state(&self) -> WorkerState;
    /// Handle to the role's cancellation flag.
    fn cancel_token(&self) -> CancelToken;
}
