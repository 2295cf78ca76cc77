//! The exchange role: a producer thread publishing synthetic trades.
//!
//! Each iteration asks the [`TradeSource`] for a quote, tags a [`Trade`] with
//! the exchange's producer id and next sequence number, and publishes it.
//! `publish` may wait while the channel is full; that wait is not
//! interrupted by cancellation, only by the channel being closed.
//!
//! The exchange stops when it has published `target` trades, when
//! cancellation is observed between two publishes, or when the channel is
//! closed under it. It reports the number published, once.

use std::sync::Arc;

use llq_core::LlqError;
use llq_core::channel::TradeChannel;
use llq_core::config::ProducerConfig;
use llq_core::types::{Symbol, Trade};
use llq_core::worker::{CancelToken, ExitReason, Step, WorkStep, Worker, WorkerState};
use tracing::warn;

use crate::PipelineRole;
use crate::generator::{TradeSource, UniformTradeSource};
use crate::report::{ReportSink, RoleExit, RoleKind, RoleReport};

/// Work step of an [`Exchange`]. Runs on the exchange's worker thread.
pub struct ExchangeStep<G: TradeSource> {
    group: String,
    instrument: String,
    symbol: Symbol,
    producer_id: u32,
    source: G,
    channel: Arc<TradeChannel>,
    target: u64,
    published: u64,
    closed: bool,
    sink: ReportSink,
}

impl<G: TradeSource> ExchangeStep<G> {
    pub fn published(&self) -> u64 {
        self.published
    }

    pub fn target(&self) -> u64 {
        self.target
    }
}

impl<G: TradeSource> WorkStep for ExchangeStep<G> {
    #[inline]
    fn step(&mut self) -> Result<Step, LlqError> {
        if self.published >= self.target {
            return Ok(Step::Done);
        }

        let (price, volume) = self.source.next_quote();
        let trade = Trade::from_parts(self.symbol, price, volume, self.producer_id, self.published + 1);

        match self.channel.publish(trade) {
            Ok(()) => {
                self.published += 1;
                Ok(if self.published == self.target { Step::Done } else { Step::Continue })
            }
            Err(_) => {
                warn!(
                    "[{}] exchange {}: channel closed after {} of {} trades",
                    self.group, self.instrument, self.published, self.target
                );
                self.closed = true;
                Ok(Step::Done)
            }
        }
    }

    fn finish(&mut self, exit: ExitReason) {
        let exit = if self.closed { RoleExit::ChannelClosed } else { RoleExit::from(exit) };
        self.sink.emit(RoleReport {
            group: self.group.clone(),
            kind: RoleKind::Producer,
            name: self.instrument.clone(),
            count: self.published,
            target: self.target,
            exit,
            latency: None,
            audit: None,
        });
    }
}

/// A producer bound to one channel, running on its own thread once started.
pub struct Exchange<G: TradeSource = UniformTradeSource> {
    worker: Worker<ExchangeStep<G>>,
}

impl Exchange<UniformTradeSource> {
    /// Build an exchange from config, with a uniform random trade source.
    pub fn from_config(
        group: &str,
        producer_id: u32,
        cfg: &ProducerConfig,
        channel: Arc<TradeChannel>,
        sink: ReportSink,
    ) -> Result<Self, LlqError> {
        let source = UniformTradeSource::from_config(cfg)?;
        Ok(Self::new(group, &cfg.instrument, producer_id, source, channel, cfg.target, sink).with_core(cfg.cpu_core))
    }
}

impl<G: TradeSource> Exchange<G> {
    /// Create an idle exchange. `producer_id` must be unique within the
    /// channel's group so the consumer can audit per-producer ordering.
    pub fn new(
        group: &str,
        instrument: &str,
        producer_id: u32,
        source: G,
        channel: Arc<TradeChannel>,
        target: u64,
        sink: ReportSink,
    ) -> Self {
        let step = ExchangeStep {
            group: group.to_string(),
            instrument: instrument.to_string(),
            symbol: Symbol::new(instrument),
            producer_id,
            source,
            channel,
            target,
            published: 0,
            closed: false,
            sink,
        };
        Self { worker: Worker::new(format!("{group}-{instrument}"), step) }
    }

    /// Pin the exchange thread to a CPU core.
    pub fn with_core(mut self, core: Option<usize>) -> Self {
        self.worker = self.worker.with_core(core);
        self
    }

    /// Trades published by the last run. `None` while running.
    pub fn published(&self) -> Option<u64> {
        self.worker.step().map(ExchangeStep::published)
    }

    pub fn instrument(&self) -> Option<&str> {
        self.worker.step().map(|s| s.instrument.as_str())
    }
}

impl<G: TradeSource> PipelineRole for Exchange<G> {
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
