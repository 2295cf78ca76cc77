//! The strategy role: a consumer thread draining one channel.
//!
//! Each iteration makes one `try_poll`. A trade is processed (hand-off
//! latency recorded, per-producer sequence audited, then dropped) and
//! counted; an empty poll applies the configured idle [`WaitStrategy`],
//! busy-spinning by default.
//!
//! The strategy stops at its target count or on cancellation. Whichever way
//! it stops, it closes its channel: it is the channel's only consumer, and a
//! producer left waiting on a full channel nobody drains would never return.

use std::sync::Arc;

use llq_core::LlqError;
use llq_core::channel::TradeChannel;
use llq_core::config::ConsumerConfig;
use llq_core::latency::LatencyCollector;
use llq_core::sequence::SequenceAudit;
use llq_core::time_util;
use llq_core::types::Trade;
use llq_core::wait::{WaitStrategy, Waiter};
use llq_core::worker::{CancelToken, ExitReason, Step, WorkStep, Worker, WorkerState};
use tracing::debug;

use crate::PipelineRole;
use crate::report::{ReportSink, RoleExit, RoleKind, RoleReport};

/// Work step of a [`Strategy`]. Runs on the strategy's worker thread.
pub struct StrategyStep {
    group: String,
    name: String,
    channel: Arc<TradeChannel>,
    target: u64,
    processed: u64,
    idle: Waiter,
    latency: Option<LatencyCollector>,
    audit: SequenceAudit,
    sink: ReportSink,
}

impl StrategyStep {
    #[inline]
    fn process(&mut self, trade: Trade) {
        if let Some(latency) = &mut self.latency {
            latency.record(time_util::elapsed_ns(trade.created_ns()));
        }
        self.audit.observe(trade.producer_id(), trade.seq());
    }

    pub fn processed(&self) -> u64 {
        self.processed
    }

    pub fn audit(&self) -> &SequenceAudit {
        &self.audit
    }
}

impl WorkStep for StrategyStep {
    #[inline]
    fn step(&mut self) -> Result<Step, LlqError> {
        if self.processed >= self.target {
            return Ok(Step::Done);
        }

        match self.channel.try_poll() {
            Some(trade) => {
                self.process(trade);
                self.processed += 1;
                self.idle.reset();
                Ok(if self.processed == self.target { Step::Done } else { Step::Continue })
            }
            None => {
                self.idle.wait();
                Ok(Step::Continue)
            }
        }
    }

    fn finish(&mut self, exit: ExitReason) {
        if self.channel.close() {
            debug!("[{}] strategy {} closed its channel", self.group, self.name);
        }
        self.sink.emit(RoleReport {
            group: self.group.clone(),
            kind: RoleKind::Consumer,
            name: self.name.clone(),
            count: self.processed,
            target: self.target,
            exit: RoleExit::from(exit),
            latency: self.latency.as_ref().and_then(LatencyCollector::stats),
            audit: Some(self.audit.summary()),
        });
    }
}

/// The single consumer of one channel, running on its own thread once started.
pub struct Strategy {
    worker: Worker<StrategyStep>,
}

impl Strategy {
    /// Create an idle strategy that processes `target` trades.
    pub fn new(
        group: &str,
        name: &str,
        channel: Arc<TradeChannel>,
        target: u64,
        idle: WaitStrategy,
        measure_latency: bool,
        sink: ReportSink,
    ) -> Self {
        let step = StrategyStep {
            group: group.to_string(),
            name: name.to_string(),
            channel,
            target,
            processed: 0,
            idle: Waiter::new(idle),
            latency: measure_latency.then(LatencyCollector::new),
            audit: SequenceAudit::new(),
            sink,
        };
        Self { worker: Worker::new(format!("{group}-{name}"), step) }
    }

    pub fn from_config(group: &str, cfg: &ConsumerConfig, channel: Arc<TradeChannel>, sink: ReportSink) -> Self {
        Self::new(group, &cfg.name, channel, cfg.target, cfg.idle, cfg.measure_latency, sink).with_core(cfg.cpu_core)
    }

    /// Pin the strategy thread to a CPU core.
    pub fn with_core(mut self, core: Option<usize>) -> Self {
        self.worker = self.worker.with_core(core);
        self
    }

    /// Trades processed by the last run. `None` while running.
    pub fn processed(&self) -> Option<u64> {
        self.worker.step().map(StrategyStep::processed)
    }
}

impl PipelineRole for Strategy {
    fn name(&self) -> &str {
        self.worker.name()
    }

    fn start(&mut self) -> Result<(), LlqError> {
        self.worker.start()
    }

    fn request_stop(&mut self) -> Result<Option<ExitReason>, LlqError> {
        self.worker.request_stop()
    }

    fn join(&mut self) -> Result<Option<ExitReason>, LlqError> {
        self.worker.join()
    }

    fn state(&self) -> WorkerState {
        self.worker.state()
    }

    fn cancel_token(&self) -> CancelToken {
        self.worker.cancel_token()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn strategy(channel: &Arc<TradeChannel>, target: u64) -> (Strategy, crossbeam_channel::Receiver<RoleReport>) {
        let (sink, reports) = ReportSink::channel(true);
        let s = Strategy::new("G", "S", Arc::clone(channel), target, WaitStrategy::BusySpin, true, sink);
        (s, reports)
    }

    #[test]
    fn processes_exactly_target_and_closes() {
        let channel = Arc::new(TradeChannel::new(16).unwrap());
        for seq in 1..=12 {
            channel.publish(Trade::tagged("MSFTO.O", 490.0, 10_000, 1, seq)).unwrap();
        }
        let (mut s, reports) = strategy(&channel, 10);
        s.start().unwrap();
        assert_eq!(s.join().unwrap(), Some(ExitReason::Completed));
        assert_eq!(s.processed(), Some(10));

        // Trailing events stay in the channel, which is now closed.
        assert_eq!(channel.len(), 2);
        assert!(channel.is_closed());

        let report = reports.try_recv().unwrap();
        assert_eq!(report.kind, RoleKind::Consumer);
        assert_eq!((report.count, report.exit), (10, RoleExit::Completed));
        assert!(report.audit.unwrap().is_clean());
        assert_eq!(report.latency.unwrap().count, 10);
    }

    #[test]
    fn idle_strategy_stops_on_cancel() {
        let channel = Arc::new(TradeChannel::new(4).unwrap());
        let (mut s, reports) = strategy(&channel, 100);
        s.start().unwrap();
        std::thread::sleep(Duration::from_millis(10));

        assert_eq!(s.request_stop().unwrap(), Some(ExitReason::Cancelled));
        assert_eq!(s.processed(), Some(0));
        assert!(channel.is_closed());
        let report = reports.try_recv().unwrap();
        assert_eq!(report.exit, RoleExit::Cancelled);
        assert!(report.latency.is_none());
    }

    #[test]
    fn audit_flags_out_of_order_input() {
        let channel = Arc::new(TradeChannel::new(4).unwrap());
        channel.publish(Trade::tagged("X", 1.0, 1, 1, 2)).unwrap();
        channel.publish(Trade::tagged("X", 1.0, 1, 1, 1)).unwrap();
        let (mut s, _reports) = strategy(&channel, 2);
        s.start().unwrap();
        s.join().unwrap();

        let step = s.worker.step().unwrap();
        let audit = step.audit().summary();
        assert_eq!(audit.gaps, 1);
        assert_eq!(audit.out_of_order, 1);
    }

    #[test]
    fn latency_measurement_can_be_disabled() {
        let channel = Arc::new(TradeChannel::new(4).unwrap());
        channel.publish(Trade::tagged("X", 1.0, 1, 1, 1)).unwrap();
        let (sink, reports) = ReportSink::channel(true);
        let cfg = ConsumerConfig { measure_latency: false, ..ConsumerConfig::new("S", 1) };
        let mut s = Strategy::from_config("G", &cfg, Arc::clone(&channel), sink);
        s.start().unwrap();
        s.join().unwrap();
        assert!(reports.try_recv().unwrap().latency.is_none());
    }
}
