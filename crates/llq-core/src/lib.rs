//! # llq-core
//!
//! Core crate for the low-latency queue pipeline, providing:
//!
//! - **Types** (`types`): the [`Trade`] record and its inline [`Symbol`]
//! - **Channel** (`channel`): bounded multi-producer event channel with backpressure
//! - **Wait strategies** (`wait`): busy-spin / yield / spin-then-park loops
//! - **Worker** (`worker`): cancellable thread-bound work loop with join-on-drop
//! - **Configuration** (`config`): JSON pipeline config deserialization + validation
//! - **Error types** (`error`): domain-specific `LlqError` via thiserror
//! - **CPU affinity** (`cpu_affinity`): thread-to-core pinning for low latency
//! - **Latency** (`latency`): histogram-based hand-off latency statistics
//! - **Sequence audit** (`sequence`): per-producer ordering / duplicate checks
//! - **Time utilities** (`time_util`): high-precision timestamps
//! - **Logging** (`logging`): tracing-based structured logging

pub mod channel;
pub mod config;
pub mod cpu_affinity;
pub mod error;
pub mod latency;
pub mod logging;
pub mod sequence;
pub mod time_util;
pub mod types;
pub mod wait;
pub mod worker;

// Re-export types at crate root for convenience.
pub use error::LlqError;
pub use types::*;
