//! Per-producer sequence audit.
//!
//! Every [`crate::Trade`] carries its producer id and a 1-based publish
//! sequence number. The channel guarantees per-producer FIFO without loss or
//! duplication, so for each producer the consumer must see `1, 2, 3, ...`
//! with nothing repeated. [`SequenceAudit`] checks exactly that, cheaply
//! enough to run on the consumer's hot path.

use ahash::AHashMap;

/// Outcome of a [`SequenceAudit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuditSummary {
    /// Distinct producer ids seen.
    pub producers: usize,
    /// Records whose sequence number was exactly the expected next one.
    pub in_order: u64,
    /// Records that arrived duplicated or out of order.
    pub out_of_order: u64,
    /// Records whose sequence skipped ahead (earlier records missing).
    pub gaps: u64,
}

impl AuditSummary {
    pub fn is_clean(&self) -> bool {
        self.out_of_order == 0 && self.gaps == 0
    }
}

/// Tracks the last sequence number seen per producer.
///
/// # Thread safety
///
/// Not thread-safe. Each consumer thread owns its own instance.
#[derive(Debug, Default)]
pub struct SequenceAudit {
    last_seq: AHashMap<u32, u64>,
    summary: AuditSummary,
}

impl SequenceAudit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `seq` from `producer_id`.
    ///
    /// Returns `true` if it is exactly the next expected sequence number
    /// (last + 1, starting from 1).
    #[inline]
    pub fn observe(&mut self, producer_id: u32, seq: u64) -> bool {
        let last = self.last_seq.entry(producer_id).or_insert(0);
        let expected = *last + 1;
        if seq == expected {
            *last = seq;
            self.summary.in_order += 1;
            true
        } else if seq > expected {
            *last = seq;
            self.summary.gaps += 1;
            false
        } else {
            self.summary.out_of_order += 1;
            false
        }
    }

    /// Last sequence number seen from a producer, or `None`.
    pub fn last_seq(&self, producer_id: u32) -> Option<u64> {
        self.last_seq.get(&producer_id).copied()
    }

    pub fn summary(&self) -> AuditSummary {
        AuditSummary { producers: self.last_seq.len(), ..self.summary }
    }

    /// Clear all state.
    pub fn clear(&mut self) {
        self.last_seq.clear();
        self.summary = AuditSummary::default();
    }
}
