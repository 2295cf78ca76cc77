//! Publish-to-poll hand-off latency.
//!
//! A strategy records `now - trade.created_ns()` for every trade it polls.
//! Hand-off times range from tens of nanoseconds (empty channel, spinning
//! consumer) to milliseconds (deep backlog behind a full channel), so the
//! histogram is log-linear: every power-of-two range is split into 16 equal
//! buckets. Values below 16ns are exact; above that a bucket is at most 1/16
//! of its value wide, across the whole `u64` range.
//!
//! Count, min, max and average are exact. Percentiles report the upper edge
//! of the bucket they fall in, never more than the largest sample.

use std::fmt;

const SUB_BITS: u32 = 4;
const SUB_BUCKETS: usize = 1 << SUB_BITS;
/// Exact buckets for `0..16`, then 16 buckets per power of two up to 2^64.
const NUM_BUCKETS: usize = SUB_BUCKETS + (64 - SUB_BITS as usize) * SUB_BUCKETS;

#[inline]
fn bucket_of(ns: u64) -> usize {
    if ns < SUB_BUCKETS as u64 {
        return ns as usize;
    }
    let msb = 63 - ns.leading_zeros();
    let shift = msb - SUB_BITS;
    let sub = (ns >> shift) as usize - SUB_BUCKETS;
    SUB_BUCKETS + shift as usize * SUB_BUCKETS + sub
}

/// Largest value that falls into `bucket`.
fn bucket_upper(bucket: usize) -> u64 {
    if bucket < SUB_BUCKETS {
        return bucket as u64;
    }
    let k = bucket - SUB_BUCKETS;
    let shift = (k / SUB_BUCKETS) as u32;
    let lower = ((SUB_BUCKETS + k % SUB_BUCKETS) as u64) << shift;
    lower + ((1u64 << shift) - 1)
}

/// Summary of recorded hand-off latencies, in nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LatencyStats {
    pub count: u64,
    pub min_ns: u64,
    pub max_ns: u64,
    pub avg_ns: f64,
    pub p50_ns: u64,
    pub p90_ns: u64,
    pub p99_ns: u64,
}

impl fmt::Display for LatencyStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "n={} min={}ns avg={:.0}ns p50={}ns p90={}ns p99={}ns max={}ns",
            self.count, self.min_ns, self.avg_ns, self.p50_ns, self.p90_ns, self.p99_ns, self.max_ns,
        )
    }
}

/// Log-linear latency histogram. Owned by one strategy thread.
#[derive(Debug, Clone)]
pub struct LatencyCollector {
    buckets: Box<[u64]>,
    count: u64,
    sum: u128,
    min: u64,
    max: u64,
}

impl LatencyCollector {
    pub fn new() -> Self {
        Self { buckets: vec![0; NUM_BUCKETS].into_boxed_slice(), count: 0, sum: 0, min: u64::MAX, max: 0 }
    }

    #[inline]
    pub fn record(&mut self, ns: u64) {
        self.buckets[bucket_of(ns)] += 1;
        self.count += 1;
        self.sum += u128::from(ns);
        self.min = self.min.min(ns);
        self.max = self.max.max(ns);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// `None` until something has been recorded.
    pub fn stats(&self) -> Option<LatencyStats> {
        (self.count > 0).then(|| LatencyStats {
            count: self.count,
            min_ns: self.min,
            max_ns: self.max,
            avg_ns: self.sum as f64 / self.count as f64,
            p50_ns: self.quantile(0.50),
            p90_ns: self.quantile(0.90),
            p99_ns: self.quantile(0.99),
        })
    }

    pub fn reset(&mut self) {
        self.buckets.fill(0);
        self.count = 0;
        self.sum = 0;
        self.min = u64::MAX;
        self.max = 0;
    }

    fn quantile(&self, q: f64) -> u64 {
        let rank = ((self.count as f64 * q).ceil() as u64).max(1);
        let mut seen = 0;
        for (bucket, &n) in self.buckets.iter().enumerate() {
            seen += n;
            if seen >= rank {
                return bucket_upper(bucket).clamp(self.min, self.max);
            }
        }
        self.max
    }
}

impl Default for LatencyCollector {
    fn default() -> Self {
        Self::new()
    }
}
