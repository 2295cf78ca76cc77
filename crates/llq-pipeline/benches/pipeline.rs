use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use llq_core::channel::TradeChannel;
use llq_core::config::PipelineConfig;
use llq_core::types::Trade;
use llq_pipeline::Pipeline;

const SCALE: u64 = 100;
const HANDOFF_MSGS: u64 = 100_000;

/// The fixed two-group pipeline, scaled down, start to last join.
fn bench_pipeline_run(c: &mut Criterion) {
    let cfg = PipelineConfig::default().scaled_down(SCALE);
    let total: u64 = cfg.groups.iter().map(|g| g.consumer.target).sum();

    let mut group = c.benchmark_group("pipeline_run");
    group.throughput(Throughput::Elements(total));
    group.sample_size(10);

    group.bench_function(format!("default_div_{SCALE}"), |b| {
        b.iter_custom(|iters| {
            let mut elapsed = Duration::ZERO;
            for _ in 0..iters {
                let pipeline = Pipeline::quiet(&cfg).expect("valid config");
                let start = Instant::now();
                let summary = pipeline.start().expect("start").wait().expect("wait");
                elapsed += start.elapsed();
                assert!(summary.is_conserved());
            }
            elapsed
        })
    });
    group.finish();
}

/// Raw channel hand-off: one producer thread, the bench thread polling.
fn bench_channel_handoff(c: &mut Criterion) {
    let mut group = c.benchmark_group("channel_handoff");
    group.throughput(Throughput::Elements(HANDOFF_MSGS));

    for capacity in [64usize, 4_096, 1_000_000] {
        group.bench_with_input(BenchmarkId::from_parameter(capacity), &capacity, |b, &capacity| {
            b.iter_custom(|iters| {
                let channel = Arc::new(TradeChannel::new(capacity).expect("capacity"));
                let total = HANDOFF_MSGS * iters;

                let producer = {
                    let channel = Arc::clone(&channel);
                    thread::spawn(move || {
                        for seq in 1..=total {
                            channel.publish(Trade::tagged("MSFTO.O", 490.0, 10_000, 1, seq)).expect("open channel");
                        }
                    })
                };

                let start = Instant::now();
                let mut received = 0;
                while received < total {
                    if let Some(trade) = channel.try_poll() {
                        black_box(trade);
                        received += 1;
                    } else {
                        std::hint::spin_loop();
                    }
                }
                let elapsed = start.elapsed();
                producer.join().expect("producer join");
                elapsed
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pipeline_run, bench_channel_handoff);
criterion_main!(benches);
