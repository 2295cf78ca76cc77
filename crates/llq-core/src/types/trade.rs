//! The trade record, the unit of market data flowing through the pipeline.
//!
//! A [`Trade`] is immutable once created: fields are private and only
//! exposed through accessors. It is deliberately `Clone` but not `Copy`, so
//! handing a record to [`crate::channel::EventChannel::publish`] moves it and
//! the producer cannot touch it afterwards.
//!
//! # Tagging
//!
//! Besides instrument / price / volume, each record carries the id of the
//! producer that created it, that producer's 1-based publish sequence number
//! and a monotonic creation timestamp. The consumer uses these to audit
//! per-producer ordering and to measure hand-off latency.

use super::symbol::Symbol;
use crate::time_util;

/// A single trade execution.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    instrument: Symbol,
    price: f64,
    volume: i64,
    producer_id: u32,
    seq: u64,
    created_ns: u64,
}

impl Trade {
    /// Create an untagged trade stamped with the current monotonic time.
    pub fn new(instrument: &str, price: f64, volume: i64) -> Self {
        Self::tagged(instrument, price, volume, 0, 0)
    }

    /// Create a trade tagged with its producer id and publish sequence number.
    pub fn tagged(instrument: &str, price: f64, volume: i64, producer_id: u32, seq: u64) -> Self {
        Self::from_parts(Symbol::new(instrument), price, volume, producer_id, seq)
    }

    /// Like [`Trade::tagged`], with the instrument already encoded. Producers
    /// encode their symbol once and reuse it for every record.
    #[inline]
    pub fn from_parts(instrument: Symbol, price: f64, volume: i64, producer_id: u32, seq: u64) -> Self {
        Self {
            instrument,
            price,
            volume,
            producer_id,
            seq,
            created_ns: time_util::monotonic_ns(),
        }
    }

    #[inline]
    pub fn instrument(&self) -> &str {
        self.instrument.as_str()
    }

    #[inline]
    pub fn symbol(&self) -> Symbol {
        self.instrument
    }

    #[inline]
    pub fn price(&self) -> f64 {
        self.price
    }

    #[inline]
    pub fn volume(&self) -> i64 {
        self.volume
    }

    #[inline]
    pub fn producer_id(&self) -> u32 {
        self.producer_id
    }

    #[inline]
    pub fn seq(&self) -> u64 {
        self.seq
    }

    /// Monotonic creation time in nanoseconds (see [`time_util::monotonic_ns`]).
    #[inline]
    pub fn created_ns(&self) -> u64 {
        self.created_ns
    }
}

impl std::fmt::Display for Trade {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Trade({} {:.4}x{} producer={} seq={})",
            self.instrument(),
            self.price,
            self.volume,
            self.producer_id,
            self.seq
        )
    }
}
