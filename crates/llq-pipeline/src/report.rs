//! Per-role completion reports.
//!
//! Each role emits exactly one [`RoleReport`] when its worker loop ends: a
//! single log line (unless quiet) and a message on the pipeline's report
//! channel. Nothing is reported per event, so reporting never perturbs the
//! hot path.

use std::fmt;

use crossbeam_channel::{Receiver, Sender};
use llq_core::latency::LatencyStats;
use llq_core::sequence::AuditSummary;
use llq_core::worker::ExitReason;
use tracing::info;

/// Which side of the channel a report comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleKind {
    /// An exchange publishing trades.
    Producer,
    /// A strategy consuming trades.
    Consumer,
}

/// Why a role stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleExit {
    /// Reached its target count.
    Completed,
    /// Cancellation observed between iterations.
    Cancelled,
    /// The channel was closed while publishing (producers only).
    ChannelClosed,
    /// The worker loop failed.
    Failed,
}

impl From<ExitReason> for RoleExit {
    fn from(exit: ExitReason) -> Self {
        match exit {
            ExitReason::Completed => Self::Completed,
            ExitReason::Cancelled => Self::Cancelled,
            ExitReason::Failed => Self::Failed,
        }
    }
}

impl fmt::Display for RoleExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::ChannelClosed => write!(f, "channel closed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Final counters of one role.
#[derive(Debug, Clone, PartialEq)]
pub struct RoleReport {
    /// Group the role belongs to.
    pub group: String,
    pub kind: RoleKind,
    pub name: String,
    /// Trades published (producer) or processed (consumer).
    pub count: u64,
    pub target: u64,
    pub exit: RoleExit,
    /// Publish-to-poll latency (consumers with latency measurement on).
    pub latency: Option<LatencyStats>,
    /// Per-producer ordering audit (consumers only).
    pub audit: Option<AuditSummary>,
}

impl fmt::Display for RoleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            RoleKind::Producer => write!(
                f,
                "[{}] Exchange Thread: {}, Total Produced: {}/{} ({})",
                self.group, self.name, self.count, self.target, self.exit
            )?,
            RoleKind::Consumer => write!(
                f,
                "[{}] Strategy: {}, Total Processed: {}/{} ({})",
                self.group, self.name, self.count, self.target, self.exit
            )?,
        }
        if let Some(audit) = &self.audit {
            write!(
                f,
                ", producers={} out_of_order={} gaps={}",
                audit.producers, audit.out_of_order, audit.gaps
            )?;
        }
        if let Some(latency) = &self.latency {
            write!(f, ", hand-off {latency}")?;
        }
        Ok(())
    }
}

/// Where roles send their reports. Cheap to clone, one per role.
#[derive(Debug, Clone)]
pub struct ReportSink {
    tx: Option<Sender<RoleReport>>,
    quiet: bool,
}

impl ReportSink {
    /// A sink paired with the receiver the orchestrator drains. `quiet`
    /// suppresses the per-role log line (benchmark mode).
    pub fn channel(quiet: bool) -> (Self, Receiver<RoleReport>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { tx: Some(tx), quiet }, rx)
    }

    /// A sink that only logs. For roles used outside an orchestrator.
    pub fn log_only() -> Self {
        Self { tx: None, quiet: false }
    }

    /// Emit a role's final report. Best effort: a dropped receiver is ignored.
    pub fn emit(&self, report: RoleReport) {
        if !self.quiet {
            info!("{report}");
        }
        if let Some(tx) = &self.tx {
            let _ = tx.send(report);
        }
    }
}
