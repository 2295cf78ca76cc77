//! Pipeline orchestrator.
//!
//! Builds one [`TradeChannel`], its exchanges and its strategy per configured
//! group, runs them all concurrently, and joins them.
//!
//! # Lifecycle
//!
//! ```text
//! Pipeline::new(config)     validate, build channels + roles (nothing runs)
//!   └─ start()              strategies first, then exchanges
//!        └─ RunningPipeline
//!             ├─ shutdown_handle().trigger()   cancel every role, close every channel
//!             └─ wait()                        join all, collect PipelineSummary
//! ```
//!
//! Dropping a [`RunningPipeline`] triggers shutdown and joins every thread, so
//! no role outlives the pipeline that started it.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::Receiver;
use llq_core::LlqError;
use llq_core::channel::{ChannelStats, TradeChannel};
use llq_core::config::PipelineConfig;
use llq_core::worker::CancelToken;
use tracing::{debug, error, info, warn};

use crate::PipelineRole;
use crate::consumer::Strategy;
use crate::producer::Exchange;
use crate::report::{ReportSink, RoleExit, RoleKind, RoleReport};

// ---------------------------------------------------------------------------
// Groups
// ---------------------------------------------------------------------------

/// One channel with the roles wired to it.
struct Group {
    name: String,
    channel: Arc<TradeChannel>,
    exchanges: Vec<Exchange>,
    strategy: Strategy,
}

impl Group {
    /// Join exchanges, then the strategy. Returns the first error.
    fn join(&mut self) -> Result<(), LlqError> {
        let mut first = None;
        for exchange in &mut self.exchanges {
            if let Err(e) = exchange.join() {
                first.get_or_insert(e);
            }
        }
        if let Err(e) = self.strategy.join() {
            first.get_or_insert(e);
        }
        first.map_or(Ok(()), Err)
    }
}

/// Cancels every role and closes every channel of a running pipeline.
///
/// Closing releases exchanges waiting on a full channel, so joins that follow
/// a trigger finish in bounded time.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tokens: Vec<CancelToken>,
    channels: Vec<Arc<TradeChannel>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        for token in &self.tokens {
            token.cancel();
        }
        for channel in &self.channels {
            channel.close();
        }
    }
}

// ---------------------------------------------------------------------------
// Summary
// ---------------------------------------------------------------------------

/// Final state of one group.
#[derive(Debug, Clone)]
pub struct GroupSummary {
    pub name: String,
    pub capacity: usize,
    /// One report per exchange, in completion order.
    pub producers: Vec<RoleReport>,
    pub consumer: Option<RoleReport>,
    /// Records left in the channel after every role stopped.
    pub residual: usize,
    pub stats: ChannelStats,
}

impl GroupSummary {
    /// Total trades published by the group's exchanges.
    pub fn published(&self) -> u64 {
        self.producers.iter().map(|r| r.count).sum()
    }

    /// Trades processed by the group's strategy.
    pub fn processed(&self) -> u64 {
        self.consumer.as_ref().map_or(0, |r| r.count)
    }

    /// Every published trade was processed, the strategy hit its target, the
    /// channel ended empty and no producer saw records out of order.
    pub fn is_conserved(&self) -> bool {
        let Some(consumer) = &self.consumer else {
            return false;
        };
        consumer.exit == RoleExit::Completed
            && consumer.count == consumer.target
            && self.published() == consumer.count
            && self.residual == 0
            && self.stats.published == self.stats.polled
            && consumer.audit.is_none_or(|a| a.is_clean())
    }
}

/// Result of one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    pub groups: Vec<GroupSummary>,
    /// Wall time from start to the last join.
    pub elapsed: Duration,
}

impl PipelineSummary {
    pub fn is_conserved(&self) -> bool {
        self.groups.iter().all(GroupSummary::is_conserved)
    }

    pub fn group(&self, name: &str) -> Option<&GroupSummary> {
        self.groups.iter().find(|g| g.name == name)
    }

    /// Trades processed across all groups.
    pub fn total_processed(&self) -> u64 {
        self.groups.iter().map(GroupSummary::processed).sum()
    }
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// A validated, fully wired pipeline that has not started yet.
pub struct Pipeline {
    groups: Vec<Group>,
    reports: Receiver<RoleReport>,
    quiet: bool,
}

impl Pipeline {
    /// Validate `config` and build every channel and role. Nothing starts;
    /// on error nothing has been spawned.
    pub fn new(config: &PipelineConfig) -> Result<Self, LlqError> {
        Self::build(config, false)
    }

    /// Like [`new`](Self::new), without per-role log lines. For timed runs.
    pub fn quiet(config: &PipelineConfig) -> Result<Self, LlqError> {
        Self::build(config, true)
    }

    fn build(config: &PipelineConfig, quiet: bool) -> Result<Self, LlqError> {
        config.validate()?;
        let (sink, reports) = ReportSink::channel(quiet);

        let mut groups = Vec::with_capacity(config.groups.len());
        for g in &config.groups {
            let channel = Arc::new(TradeChannel::with_backpressure(g.capacity, g.backpressure)?);

            let exchanges = g
                .producers
                .iter()
                .zip(1u32..)
                .map(|(p, id)| Exchange::from_config(&g.name, id, p, Arc::clone(&channel), sink.clone()))
                .collect::<Result<Vec<_>, _>>()?;
            let strategy = Strategy::from_config(&g.name, &g.consumer, Arc::clone(&channel), sink.clone());

            debug!(
                "[{}] group built: capacity={}, exchanges={}, strategy target={}",
                g.name,
                g.capacity,
                exchanges.len(),
                g.consumer.target
            );
            groups.push(Group { name: g.name.clone(), channel, exchanges, strategy });
        }

        if !quiet {
            info!("pipeline built: {} group(s), {} thread(s)", groups.len(), config.thread_count());
        }
        Ok(Self { groups, reports, quiet })
    }

    /// Start every strategy, then every exchange.
    ///
    /// If a role fails to start, everything already started is shut down and
    /// joined before the error is returned.
    pub fn start(self) -> Result<RunningPipeline, LlqError> {
        let shutdown = ShutdownHandle {
            tokens: self
                .groups
                .iter()
                .flat_map(|g| g.exchanges.iter().map(|e| e.cancel_token()).chain([g.strategy.cancel_token()]))
                .collect(),
            channels: self.groups.iter().map(|g| Arc::clone(&g.channel)).collect(),
        };

        let mut running = RunningPipeline {
            groups: self.groups,
            reports: self.reports,
            shutdown,
            started: Instant::now(),
            quiet: self.quiet,
            joined: false,
        };

        for group in &mut running.groups {
            group.strategy.start()?;
        }
        for group in &mut running.groups {
            for exchange in &mut group.exchanges {
                exchange.start()?;
            }
        }
        Ok(running)
    }

    /// Build, start and wait for `config` in one call.
    pub fn run(config: &PipelineConfig) -> Result<PipelineSummary, LlqError> {
        Self::new(config)?.start()?.wait()
    }
}

/// A started pipeline. Join it with [`wait`](Self::wait) or stop it early
/// through its [`ShutdownHandle`].
pub struct RunningPipeline {
    groups: Vec<Group>,
    reports: Receiver<RoleReport>,
    shutdown: ShutdownHandle,
    started: Instant,
    quiet: bool,
    joined: bool,
}

impl RunningPipeline {
    /// A handle that can stop this pipeline from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Wait for every role to finish and collect the summary.
    ///
    /// If any role fails, the rest of the pipeline is shut down, everything
    /// is joined, and the first failure is returned.
    pub fn wait(mut self) -> Result<PipelineSummary, LlqError> {
        self.join_all()?;
        Ok(self.summary())
    }

    /// Trigger shutdown, then [`wait`](Self::wait).
    pub fn shutdown(self) -> Result<PipelineSummary, LlqError> {
        self.shutdown.trigger();
        self.wait()
    }

    fn join_all(&mut self) -> Result<(), LlqError> {
        let mut first = None;
        for group in &mut self.groups {
            if let Err(e) = group.join() {
                if first.is_none() {
                    error!("[{}] role failed, shutting the pipeline down: {e}", group.name);
                    self.shutdown.trigger();
                }
                first.get_or_insert(e);
            }
        }
        self.joined = true;
        first.map_or(Ok(()), Err)
    }

    fn summary(&self) -> PipelineSummary {
        let elapsed = self.started.elapsed();
        let mut groups: Vec<GroupSummary> = self
            .groups
            .iter()
            .map(|g| GroupSummary {
                name: g.name.clone(),
                capacity: g.channel.capacity(),
                producers: Vec::with_capacity(g.exchanges.len()),
                consumer: None,
                residual: g.channel.len(),
                stats: g.channel.stats(),
            })
            .collect();

        for report in self.reports.try_iter() {
            let Some(group) = groups.iter_mut().find(|g| g.name == report.group) else {
                continue;
            };
            match report.kind {
                RoleKind::Producer => group.producers.push(report),
                RoleKind::Consumer => group.consumer = Some(report),
            }
        }

        if !self.quiet {
            info!("pipeline finished in {elapsed:?}");
        }
        PipelineSummary { groups, elapsed }
    }
}

impl Drop for RunningPipeline {
    fn drop(&mut self) {
        if !self.joined {
            self.shutdown.trigger();
            if let Err(e) = self.join_all() {
                warn!("error while joining pipeline on drop: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use llq_core::config::{GroupConfig, ProducerConfig};

    use super::*;

    fn single_group(capacity: usize, targets: &[u64]) -> PipelineConfig {
        let producers = targets
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let mut p = ProducerConfig::new(&format!("P{i}"), 100.0, 1_000, t);
                p.seed = Some(i as u64);
                p
            })
            .collect();
        PipelineConfig { meta: None, groups: vec![GroupConfig::balanced("G", capacity, producers)] }
    }

    #[test]
    fn small_pipeline_is_conserved() {
        let summary = Pipeline::quiet(&single_group(10, &[25])).unwrap().start().unwrap().wait().unwrap();
        assert!(summary.is_conserved());

        let g = summary.group("G").unwrap();
        assert_eq!(g.published(), 25);
        assert_eq!(g.processed(), 25);
        assert_eq!(g.residual, 0);
        assert_eq!(g.stats, ChannelStats { published: 25, polled: 25 });
        assert_eq!(g.producers.len(), 1);
    }

    #[test]
    fn invalid_config_is_rejected_before_start() {
        let mut cfg = single_group(10, &[25]);
        cfg.groups[0].consumer.target = 24;
        assert!(matches!(Pipeline::new(&cfg), Err(LlqError::Config(_))));

        cfg.groups[0].consumer.target = 25;
        cfg.groups[0].capacity = 0;
        assert!(matches!(Pipeline::run(&cfg), Err(LlqError::Config(_))));
    }

    #[test]
    fn shutdown_stops_a_long_run() {
        let running = Pipeline::quiet(&single_group(4, &[u64::MAX / 4, u64::MAX / 4])).unwrap().start().unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let summary = running.shutdown().unwrap();
        assert!(!summary.is_conserved());

        let g = &summary.groups[0];
        let consumer = g.consumer.as_ref().unwrap();
        assert_eq!(consumer.exit, RoleExit::Cancelled);
        assert!(consumer.audit.unwrap().is_clean());
        // Whatever was accepted but not processed is still in the channel.
        assert_eq!(g.published(), g.processed() + g.residual as u64);
    }

    #[test]
    fn handle_triggers_from_another_thread() {
        let running = Pipeline::quiet(&single_group(2, &[u64::MAX / 2])).unwrap().start().unwrap();
        let handle = running.shutdown_handle();
        let trigger = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(10));
            handle.trigger();
        });
        let summary = running.wait().unwrap();
        trigger.join().unwrap();
        assert_eq!(summary.groups[0].consumer.as_ref().unwrap().exit, RoleExit::Cancelled);
    }

    #[test]
    fn dropping_a_running_pipeline_joins_it() {
        let cfg = single_group(1, &[u64::MAX / 2]);
        let pipeline = Pipeline::quiet(&cfg).unwrap();
        let channel = Arc::clone(&pipeline.groups[0].channel);

        drop(pipeline.start().unwrap());
        assert!(channel.is_closed());
        // Only the test still holds the channel: every role thread is gone.
        assert_eq!(Arc::strong_count(&channel), 1);
    }
}
