//! End-to-end pipeline runs over real threads and channels.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use llq_core::LlqError;
use llq_core::channel::TradeChannel;
use llq_core::config::{GroupConfig, PipelineConfig, ProducerConfig};
use llq_core::types::Trade;
use llq_core::wait::WaitStrategy;
use llq_pipeline::report::{ReportSink, RoleExit};
use llq_pipeline::{Exchange, Pipeline, PipelineRole, Strategy};

fn group(name: &str, capacity: usize, producers: &[(&str, u64)]) -> GroupConfig {
    let producers = producers
        .iter()
        .map(|&(instrument, target)| ProducerConfig::new(instrument, 100.0, 1_000, target))
        .collect();
    GroupConfig::balanced(name, capacity, producers)
}

#[test]
fn one_producer_through_a_small_channel() {
    let cfg = PipelineConfig { meta: None, groups: vec![group("S1", 10, &[("MSFTO.O", 25)])] };
    let summary = Pipeline::run(&cfg).unwrap();

    let g = summary.group("S1").unwrap();
    assert_eq!(g.published(), 25);
    assert_eq!(g.processed(), 25);
    assert_eq!(g.residual, 0);
    assert!(summary.is_conserved());
}

#[test]
fn two_producers_no_duplicates() {
    let cfg = PipelineConfig { meta: None, groups: vec![group("S1", 5, &[("NVDA.O", 1_000), ("META.O", 1_000)])] };
    let summary = Pipeline::quiet(&cfg).unwrap().start().unwrap().wait().unwrap();

    let g = &summary.groups[0];
    assert_eq!(g.processed(), 2_000);
    let audit = g.consumer.as_ref().unwrap().audit.unwrap();
    assert_eq!(audit.producers, 2);
    assert_eq!(audit.in_order, 2_000);
    assert!(audit.is_clean());
    assert!(summary.is_conserved());
}

#[test]
fn groups_run_independently() {
    let cfg = PipelineConfig {
        meta: None,
        groups: vec![
            group("S1", 16, &[("MSFTO.O", 2_000), ("AAPL.OQ", 1_000)]),
            group("S2", 1, &[("NVDA.O", 500), ("META.O", 500)]),
        ],
    };
    let summary = Pipeline::quiet(&cfg).unwrap().start().unwrap().wait().unwrap();

    assert!(summary.is_conserved());
    assert_eq!(summary.group("S1").unwrap().processed(), 3_000);
    assert_eq!(summary.group("S2").unwrap().processed(), 1_000);
    assert_eq!(summary.total_processed(), 4_000);
}

#[test]
fn default_pipeline_scaled_down() {
    let cfg = PipelineConfig::default().scaled_down(1_000);
    let summary = Pipeline::quiet(&cfg).unwrap().start().unwrap().wait().unwrap();
    assert!(summary.is_conserved());
    assert_eq!(summary.group("S1").unwrap().processed(), 3_000);
    assert_eq!(summary.group("S2").unwrap().processed(), 2_000);
}

#[test]
fn configuration_errors_rejected_before_start() {
    let mut cfg = PipelineConfig { meta: None, groups: vec![group("S1", 0, &[("X", 10)])] };
    assert!(matches!(Pipeline::new(&cfg), Err(LlqError::Config(_))));

    cfg.groups[0].capacity = 4;
    cfg.groups[0].consumer.target = 11;
    assert!(matches!(Pipeline::new(&cfg), Err(LlqError::Config(_))));
}

#[test]
fn config_from_json_runs() {
    let json = r#"{
        "meta": { "module_name": "llq-test" },
        "groups": [{
            "name": "J1",
            "capacity": 8,
            "backpressure": { "kind": "spin_then_park", "spin_iters": 64, "park_us": 10 },
            "producers": [
                { "instrument": "AAPL.OQ", "price_low": 230.0, "volume_low": 15000, "target": 300, "seed": 1 },
                { "instrument": "MSFTO.O", "price_low": 490.0, "volume_low": 10000, "target": 200, "seed": 2 }
            ],
            "consumer": { "name": "J1", "target": 500, "idle": { "kind": "yield" }, "measure_latency": false }
        }]
    }"#;
    let cfg: PipelineConfig = serde_json::from_str(json).unwrap();
    assert_eq!(cfg.module_name(), "llq-test");

    let summary = Pipeline::quiet(&cfg).unwrap().start().unwrap().wait().unwrap();
    assert!(summary.is_conserved());
    assert!(summary.groups[0].consumer.as_ref().unwrap().latency.is_none());
}

#[test]
fn blocked_producer_and_consumer_stop_together() {
    let channel = Arc::new(TradeChannel::new(1).unwrap());
    channel.publish(Trade::new("X", 1.0, 1)).unwrap();

    let (sink, reports) = ReportSink::channel(true);
    let quote = || (1.0, 1_i64);
    let mut exchange = Exchange::new("G", "X", 1, quote, Arc::clone(&channel), 100, sink.clone());
    exchange.start().unwrap();
    thread::sleep(Duration::from_millis(10));

    // The exchange is stuck on the full channel; stop both sides at once.
    let mut strategy = Strategy::new("G", "S", Arc::clone(&channel), 0, WaitStrategy::BusySpin, false, sink);
    let stopper = thread::spawn(move || {
        strategy.start().unwrap();
        strategy.request_stop().unwrap()
    });
    exchange.request_stop().unwrap();
    stopper.join().unwrap();

    let exits: Vec<RoleExit> = reports.try_iter().map(|r| r.exit).collect();
    assert_eq!(exits.len(), 2);
    assert!(exits.contains(&RoleExit::ChannelClosed));
}

#[test]
fn restarting_a_pipeline_role_after_completion() {
    let channel = Arc::new(TradeChannel::new(8).unwrap());
    let mut exchange = Exchange::new("G", "X", 1, || (1.0, 1_i64), Arc::clone(&channel), 3, ReportSink::log_only());

    exchange.start().unwrap();
    exchange.join().unwrap();
    assert_eq!(exchange.published(), Some(3));

    // A completed exchange has nothing left to publish.
    exchange.start().unwrap();
    exchange.join().unwrap();
    assert_eq!(channel.len(), 3);
}
