//! Pipeline configuration.
//!
//! A pipeline is a list of independent groups. Each group owns one bounded
//! channel, the producers ("exchanges") that publish into it and the single
//! consumer ("strategy") that drains it. Configs are read from JSON; the
//! [`Default`] config is the fixed two-group pipeline the runner executes when
//! no file is given.
//!
//! # Example config
//!
//! ```json
//! {
//!   "meta": { "module_name": "llq", "log_path": "/tmp/log" },
//!   "groups": [{
//!     "name": "S1",
//!     "capacity": 1000000,
//!     "backpressure": { "kind": "yield" },
//!     "producers": [
//!       { "instrument": "MSFTO.O", "price_low": 490.0, "volume_low": 10000, "target": 2000000 },
//!       { "instrument": "AAPL.OQ", "price_low": 230.0, "volume_low": 15000, "target": 1000000 }
//!     ],
//!     "consumer": { "name": "S1", "target": 3000000, "idle": { "kind": "busy_spin" } }
//!   }]
//! }
//! ```
//!
//! [`PipelineConfig::validate`] rejects anything that could make a run lose
//! events or spin forever, before a single thread is started.

use serde::{Deserialize, Serialize};

use crate::error::LlqError;
use crate::types::symbol::SYMBOL_LEN;
use crate::wait::WaitStrategy;

/// Default price / volume spread: 10%.
pub const DEFAULT_VOLATILITY: f64 = 0.10;

/// Default channel capacity of the fixed pipeline.
pub const DEFAULT_CAPACITY: usize = 1_000_000;

/// Top-level pipeline config, deserialized from a JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Module metadata (name, log path).
    #[serde(default)]
    pub meta: Option<ModuleMeta>,

    /// Independent (channel, producers, consumer) groups.
    pub groups: Vec<GroupConfig>,
}

/// Module metadata block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleMeta {
    pub module_name: Option<String>,
    pub log_path: Option<String>,
}

/// One channel with its producers and consumer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupConfig {
    /// Group label used in logs and reports.
    pub name: String,

    /// Number of channel slots. Must be positive.
    pub capacity: usize,

    /// How producers wait while the channel is full.
    #[serde(default = "default_backpressure")]
    pub backpressure: WaitStrategy,

    /// Producers publishing into this group's channel.
    pub producers: Vec<ProducerConfig>,

    /// The consumer draining this group's channel.
    pub consumer: ConsumerConfig,
}

/// A producer ("exchange") synthesizing trades for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProducerConfig {
    /// Instrument identifier, e.g. `"MSFTO.O"`. Also the producer's name.
    pub instrument: String,

    /// Lower bound of the uniform price range.
    pub price_low: f64,

    /// Lower bound of the uniform volume range.
    pub volume_low: i64,

    /// Relative width of the price and volume ranges (default: 0.10).
    #[serde(default = "default_volatility")]
    pub volatility: f64,

    /// Number of trades to publish.
    pub target: u64,

    /// CPU core to pin the producer thread to.
    #[serde(default)]
    pub cpu_core: Option<usize>,

    /// Fixed RNG seed; entropy-seeded when absent.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// A consumer ("strategy") draining one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    pub name: String,

    /// Number of trades to process. Must equal the sum of the group's
    /// producer targets.
    pub target: u64,

    /// What the consumer does after an empty poll (default: busy spin).
    #[serde(default)]
    pub idle: WaitStrategy,

    /// CPU core to pin the consumer thread to.
    #[serde(default)]
    pub cpu_core: Option<usize>,

    /// Record publish-to-poll latency for every trade (default: true).
    #[serde(default = "default_true")]
    pub measure_latency: bool,
}

fn default_backpressure() -> WaitStrategy {
    WaitStrategy::Yield
}

fn default_volatility() -> f64 {
    DEFAULT_VOLATILITY
}

fn default_true() -> bool {
    true
}

impl ProducerConfig {
    pub fn new(instrument: &str, price_low: f64, volume_low: i64, target: u64) -> Self {
        Self {
            instrument: instrument.to_string(),
            price_low,
            volume_low,
            volatility: DEFAULT_VOLATILITY,
            target,
            cpu_core: None,
            seed: None,
        }
    }
}

impl ConsumerConfig {
    pub fn new(name: &str, target: u64) -> Self {
        Self { name: name.to_string(), target, idle: WaitStrategy::BusySpin, cpu_core: None, measure_latency: true }
    }
}

impl GroupConfig {
    /// A group whose consumer target is the sum of the producer targets.
    pub fn balanced(name: &str, capacity: usize, producers: Vec<ProducerConfig>) -> Self {
        let target = producers.iter().map(|p| p.target).sum();
        Self {
            name: name.to_string(),
            capacity,
            backpressure: default_backpressure(),
            producers,
            consumer: ConsumerConfig::new(name, target),
        }
    }

    /// Sum of the producer targets.
    pub fn total_production(&self) -> u64 {
        self.producers.iter().map(|p| p.target).sum()
    }

    fn validate(&self) -> Result<(), LlqError> {
        let g = &self.name;
        if self.capacity == 0 {
            return Err(LlqError::Config(format!("group '{g}': capacity must be positive")));
        }
        if self.producers.is_empty() {
            return Err(LlqError::Config(format!("group '{g}': no producers")));
        }
        for p in &self.producers {
            if p.instrument.is_empty() || p.instrument.len() > SYMBOL_LEN {
                return Err(LlqError::Config(format!(
                    "group '{g}': instrument '{}' must be 1..={SYMBOL_LEN} bytes",
                    p.instrument
                )));
            }
            if !(p.price_low.is_finite() && p.price_low > 0.0) {
                return Err(LlqError::Config(format!(
                    "group '{g}': producer '{}' price_low must be positive",
                    p.instrument
                )));
            }
            if p.volume_low <= 0 {
                return Err(LlqError::Config(format!(
                    "group '{g}': producer '{}' volume_low must be positive",
                    p.instrument
                )));
            }
            if !(p.volatility.is_finite() && p.volatility >= 0.0) {
                return Err(LlqError::Config(format!(
                    "group '{g}': producer '{}' volatility must be non-negative",
                    p.instrument
                )));
            }
        }
        let produced = self.total_production();
        if self.consumer.target != produced {
            return Err(LlqError::Config(format!(
                "group '{g}': consumer '{}' target {} does not match total production {produced}",
                self.consumer.name, self.consumer.target
            )));
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Check every group. Called by the orchestrator before anything starts.
    pub fn validate(&self) -> Result<(), LlqError> {
        if self.groups.is_empty() {
            return Err(LlqError::Config("pipeline has no groups".into()));
        }
        let mut names = ahash::AHashSet::new();
        for group in &self.groups {
            if !names.insert(group.name.as_str()) {
                return Err(LlqError::Config(format!("duplicate group name '{}'", group.name)));
            }
            group.validate()?;
        }
        Ok(())
    }

    /// Divide every target and capacity by `divisor` (each at least 1),
    /// keeping consumer targets balanced. Used for quick benchmark runs.
    pub fn scaled_down(&self, divisor: u64) -> Self {
        let divisor = divisor.max(1);
        let mut scaled = self.clone();
        for group in &mut scaled.groups {
            group.capacity = (group.capacity / divisor as usize).max(1);
            for p in &mut group.producers {
                p.target = (p.target / divisor).max(1);
            }
            group.consumer.target = group.total_production();
        }
        scaled
    }

    /// Total number of worker threads the pipeline will run.
    pub fn thread_count(&self) -> usize {
        self.groups.iter().map(|g| g.producers.len() + 1).sum()
    }

    /// Returns the module name, defaulting to `"llq"`.
    pub fn module_name(&self) -> String {
        self.meta.as_ref().and_then(|m| m.module_name.clone()).unwrap_or_else(|| "llq".to_string())
    }

    /// Returns the log path.
    pub fn log_path(&self) -> Option<String> {
        self.meta.as_ref().and_then(|m| m.log_path.clone())
    }
}

impl Default for PipelineConfig {
    /// Two independent groups of two exchanges and one strategy each.
    fn default() -> Self {
        Self {
            meta: None,
            groups: vec![
                GroupConfig::balanced(
                    "S1",
                    DEFAULT_CAPACITY,
                    vec![
                        ProducerConfig::new("MSFTO.O", 490.0, 10_000, 2_000_000),
                        ProducerConfig::new("AAPL.OQ", 230.0, 15_000, 1_000_000),
                    ],
                ),
                GroupConfig::balanced(
                    "S2",
                    DEFAULT_CAPACITY,
                    vec![
                        ProducerConfig::new("NVDA.O", 174.8, 20_000, 1_000_000),
                        ProducerConfig::new("META.O", 724.5, 21_000, 1_000_000),
                    ],
                ),
            ],
        }
    }
}

/// Load, parse and validate a JSON config file.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<PipelineConfig> {
    let content = std::fs::read_to_string(path)?;
    let config: PipelineConfig = serde_json::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_the_fixed_pipeline() {
        let cfg = PipelineConfig::default();
        cfg.validate().unwrap();
        assert_eq!(cfg.groups.len(), 2);
        assert_eq!(cfg.groups[0].consumer.target, 3_000_000);
        assert_eq!(cfg.groups[1].consumer.target, 2_000_000);
        assert_eq!(cfg.groups[0].producers[0].instrument, "MSFTO.O");
        assert_eq!(cfg.thread_count(), 6);
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.groups[1].capacity = 0;
        assert!(matches!(cfg.validate(), Err(LlqError::Config(msg)) if msg.contains("capacity")));
    }

    #[test]
    fn target_mismatch_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.groups[0].consumer.target += 1;
        assert!(matches!(cfg.validate(), Err(LlqError::Config(msg)) if msg.contains("does not match")));

        cfg.groups[0].consumer.target -= 2;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn empty_pipeline_and_group_rejected() {
        let cfg = PipelineConfig { meta: None, groups: vec![] };
        assert!(cfg.validate().is_err());

        let cfg = PipelineConfig { meta: None, groups: vec![GroupConfig::balanced("G", 4, vec![])] };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn duplicate_group_names_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.groups[1].name = "S1".into();
        assert!(matches!(cfg.validate(), Err(LlqError::Config(msg)) if msg.contains("duplicate")));
    }

    #[test]
    fn bad_generator_parameters_rejected() {
        let mut cfg = PipelineConfig::default();
        cfg.groups[0].producers[0].price_low = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.groups[0].producers[1].volume_low = -5;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.groups[1].producers[0].volatility = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = PipelineConfig::default();
        cfg.groups[1].producers[0].instrument = "X".repeat(SYMBOL_LEN + 1);
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn scaled_down_stays_balanced() {
        let cfg = PipelineConfig::default().scaled_down(1_000);
        cfg.validate().unwrap();
        assert_eq!(cfg.groups[0].capacity, 1_000);
        assert_eq!(cfg.groups[0].consumer.target, 3_000);
        assert_eq!(cfg.groups[1].producers[1].target, 1_000);
    }

    #[test]
    fn parse_json_with_defaults() {
        let json = r#"{
            "groups": [{
                "name": "G1",
                "capacity": 10,
                "producers": [
                    { "instrument": "MSFTO.O", "price_low": 490.0, "volume_low": 10000, "target": 25, "seed": 7 }
                ],
                "consumer": { "name": "C1", "target": 25, "idle": { "kind": "yield" } }
            }]
        }"#;
        let cfg: PipelineConfig = serde_json::from_str(json).unwrap();
        cfg.validate().unwrap();

        let g = &cfg.groups[0];
        assert_eq!(g.backpressure, WaitStrategy::Yield);
        assert_eq!(g.producers[0].volatility, DEFAULT_VOLATILITY);
        assert_eq!(g.producers[0].seed, Some(7));
        assert_eq!(g.consumer.idle, WaitStrategy::Yield);
        assert!(g.consumer.measure_latency);
        assert_eq!(cfg.module_name(), "llq");
        assert_eq!(cfg.log_path(), None);
    }
}
