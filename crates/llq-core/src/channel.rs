//! Bounded multi-producer event channel.
//!
//! [`EventChannel`] is a fixed-capacity ring of slots shared by any number of
//! producer threads and drained by a consumer thread. It is the only state
//! shared between the threads of a pipeline group.
//!
//! # Contract
//!
//! - [`publish`](EventChannel::publish) never drops: when every slot is
//!   occupied the caller waits (per the channel's [`WaitStrategy`]) until the
//!   consumer frees one. This is the pipeline's backpressure.
//! - [`try_poll`](EventChannel::try_poll) never waits for data: it returns
//!   `None` as soon as it sees an empty ring.
//! - [`close`](EventChannel::close) releases every producer waiting in
//!   `publish`; records already accepted can still be polled.
//!
//! # Slot protocol
//!
//! Head and tail are positions that pack a slot index (low bits) and a lap
//! counter (high bits), with `one_lap = (capacity + 1).next_power_of_two()`.
//! Every slot carries a stamp:
//!
//! ```text
//! stamp == tail          slot is free for the producer holding `tail`
//! stamp == head + 1      slot holds a record for the consumer holding `head`
//! stamp == head + lap    slot was drained and is free for the next lap
//! ```
//!
//! A producer claims a slot by CAS-ing `tail` forward, writes the record, then
//! publishes it by storing `tail + 1` into the stamp with `Release`. The
//! consumer reads the stamp with `Acquire`, so it observes either a fully
//! written record or an empty slot, never a partial one. Two producers can
//! never win the same `tail` value, so no slot is claimed twice.

use std::cell::UnsafeCell;
use std::fmt;
use std::mem::MaybeUninit;
use std::sync::atomic::{self, AtomicBool, AtomicU64, AtomicUsize, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

use crate::error::LlqError;
use crate::types::Trade;
use crate::wait::{WaitStrategy, Waiter};

/// The channel type used by the pipeline.
pub type TradeChannel = EventChannel<Trade>;

/// Reason a publish did not take the record. The record is handed back.
pub enum PublishError<T> {
    /// Every slot is occupied. Only returned by
    /// [`try_publish`](EventChannel::try_publish).
    Full(T),
    /// The channel was closed.
    Closed(T),
}

impl<T> PublishError<T> {
    /// Take back the record that was not published.
    pub fn into_inner(self) -> T {
        match self {
            Self::Full(v) | Self::Closed(v) => v,
        }
    }

    pub fn is_full(&self) -> bool {
        matches!(self, Self::Full(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed(_))
    }
}

impl<T> fmt::Debug for PublishError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("Full(..)"),
            Self::Closed(_) => f.write_str("Closed(..)"),
        }
    }
}

impl<T> fmt::Display for PublishError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full(_) => f.write_str("channel full"),
            Self::Closed(_) => f.write_str("channel closed"),
        }
    }
}

impl<T> std::error::Error for PublishError<T> {}

/// Lifetime publish / poll counters of a channel.
///
/// Exact once the channel is quiescent (no thread inside `publish` or
/// `try_poll`); a concurrent snapshot may be off by in-flight operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChannelStats {
    pub published: u64,
    pub polled: u64,
}

impl ChannelStats {
    /// Records accepted but not yet polled.
    pub fn in_flight(&self) -> u64 {
        self.published.saturating_sub(self.polled)
    }
}

struct Slot<T> {
    stamp: AtomicUsize,
    value: UnsafeCell<MaybeUninit<T>>,
}

/// Fixed-capacity concurrent FIFO with backpressure on full and
/// non-blocking poll on empty.
pub struct EventChannel<T> {
    head: CachePadded<AtomicUsize>,
    tail: CachePadded<AtomicUsize>,
    buffer: Box<[Slot<T>]>,
    cap: usize,
    one_lap: usize,
    closed: AtomicBool,
    published: CachePadded<AtomicU64>,
    polled: CachePadded<AtomicU64>,
    backpressure: WaitStrategy,
}

// SAFETY: slot values are only accessed by the thread that won the CAS on
// `tail` (write) or `head` (read), and the stamp's Release/Acquire pair orders
// the write before the read. Records are moved across threads, so `T: Send`.
unsafe impl<T: Send> Send for EventChannel<T> {}
unsafe impl<T: Send> Sync for EventChannel<T> {}

impl<T> EventChannel<T> {
    /// Create a channel with `capacity` slots that yields while full.
    ///
    /// A zero capacity is a configuration error.
    pub fn new(capacity: usize) -> Result<Self, LlqError> {
        Self::with_backpressure(capacity, WaitStrategy::Yield)
    }

    /// Create a channel whose `publish` waits with `backpressure` while full.
    pub fn with_backpressure(capacity: usize, backpressure: WaitStrategy) -> Result<Self, LlqError> {
        if capacity == 0 {
            return Err(LlqError::Config("channel capacity must be positive".into()));
        }
        let one_lap = (capacity + 1).next_power_of_two();
        let buffer = (0..capacity)
            .map(|i| Slot { stamp: AtomicUsize::new(i), value: UnsafeCell::new(MaybeUninit::uninit()) })
            .collect();

        Ok(Self {
            head: CachePadded::new(AtomicUsize::new(0)),
            tail: CachePadded::new(AtomicUsize::new(0)),
            buffer,
            cap: capacity,
            one_lap,
            closed: AtomicBool::new(false),
            published: CachePadded::new(AtomicU64::new(0)),
            polled: CachePadded::new(AtomicU64::new(0)),
            backpressure,
        })
    }

    /// Publish `value`, waiting while the channel is full.
    ///
    /// Fails only with [`PublishError::Closed`], either because the channel
    /// was already closed or because it was closed while waiting.
    pub fn publish(&self, value: T) -> Result<(), PublishError<T>> {
        let mut value = value;
        let mut waiter = Waiter::new(self.backpressure);
        loop {
            match self.try_publish(value) {
                Ok(()) => return Ok(()),
                Err(PublishError::Full(v)) => {
                    value = v;
                    waiter.wait();
                }
                Err(closed) => return Err(closed),
            }
        }
    }

    /// Single publish attempt. Returns [`PublishError::Full`] instead of
    /// waiting when no slot is free.
    pub fn try_publish(&self, value: T) -> Result<(), PublishError<T>> {
        if self.closed.load(Ordering::Acquire) {
            return Err(PublishError::Closed(value));
        }

        let backoff = Backoff::new();
        let mut tail = self.tail.load(Ordering::Relaxed);

        loop {
            let index = tail & (self.one_lap - 1);
            let lap = tail & !(self.one_lap - 1);
            let new_tail = if index + 1 < self.cap { tail + 1 } else { lap.wrapping_add(self.one_lap) };

            let slot = &self.buffer[index];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if tail == stamp {
                match self.tail.compare_exchange_weak(tail, new_tail, Ordering::SeqCst, Ordering::Relaxed) {
                    Ok(_) => {
                        // SAFETY: winning the CAS gives this thread exclusive
                        // ownership of the slot until the stamp is published.
                        unsafe { slot.value.get().write(MaybeUninit::new(value)) };
                        self.published.fetch_add(1, Ordering::Relaxed);
                        slot.stamp.store(tail + 1, Ordering::Release);
                        return Ok(());
                    }
                    Err(t) => {
                        tail = t;
                        backoff.spin();
                    }
                }
            } else if stamp.wrapping_add(self.one_lap) == tail + 1 {
                // The slot still holds last lap's record: full unless the
                // consumer has moved on since we loaded `tail`.
                atomic::fence(Ordering::SeqCst);
                let head = self.head.load(Ordering::Relaxed);
                if head.wrapping_add(self.one_lap) == tail {
                    return Err(PublishError::Full(value));
                }
                backoff.spin();
                tail = self.tail.load(Ordering::Relaxed);
            } else {
                // Another producer claimed this position and is mid-write.
                backoff.snooze();
                tail = self.tail.load(Ordering::Relaxed);
            }
        }
    }

    /// Single poll attempt. Returns `None` immediately when the channel is
    /// empty; never waits for a producer to publish.
    pub fn try_poll(&self) -> Option<T> {
        let backoff = Backoff::new();
        let mut head = self.head.load(Ordering::Relaxed);

        loop {
            let index = head & (self.one_lap - 1);
            let lap = head & !(self.one_lap - 1);

            let slot = &self.buffer[index];
            let stamp = slot.stamp.load(Ordering::Acquire);

            if head + 1 == stamp {
                let new_head = if index + 1 < self.cap { head + 1 } else { lap.wrapping_add(self.one_lap) };
                match self.head.compare_exchange_weak(head, new_head, Ordering::SeqCst, Ordering::Relaxed) {
                    Ok(_) => {
                        // SAFETY: the stamp says the slot holds an initialized
                        // record and winning the CAS makes us its only reader.
                        let value = unsafe { slot.value.get().read().assume_init() };
                        slot.stamp.store(head.wrapping_add(self.one_lap), Ordering::Release);
                        self.polled.fetch_add(1, Ordering::Relaxed);
                        return Some(value);
                    }
                    Err(h) => {
                        head = h;
                        backoff.spin();
                    }
                }
            } else if stamp == head {
                atomic::fence(Ordering::SeqCst);
                let tail = self.tail.load(Ordering::Relaxed);
                if tail == head {
                    return None;
                }
                // A producer claimed this slot and is still writing it.
                backoff.spin();
                head = self.head.load(Ordering::Relaxed);
            } else {
                backoff.snooze();
                head = self.head.load(Ordering::Relaxed);
            }
        }
    }

    /// Close the channel. Waiting and future publishes fail with
    /// [`PublishError::Closed`]; already accepted records stay pollable.
    ///
    /// Returns `true` if this call closed the channel.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        loop {
            let tail = self.tail.load(Ordering::SeqCst);
            let head = self.head.load(Ordering::SeqCst);

            // Retry until head and tail were read as a consistent pair.
            if self.tail.load(Ordering::SeqCst) == tail {
                let hix = head & (self.one_lap - 1);
                let tix = tail & (self.one_lap - 1);

                let len = if hix < tix {
                    tix - hix
                } else if hix > tix {
                    self.cap - hix + tix
                } else if tail == head {
                    0
                } else {
                    self.cap
                };
                debug_assert!(len <= self.cap, "occupancy {len} exceeds capacity {}", self.cap);
                return len;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        let head = self.head.load(Ordering::SeqCst);
        let tail = self.tail.load(Ordering::SeqCst);
        tail == head
    }

    pub fn is_full(&self) -> bool {
        let tail = self.tail.load(Ordering::SeqCst);
        let head = self.head.load(Ordering::SeqCst);
        head.wrapping_add(self.one_lap) == tail
    }

    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            published: self.published.load(Ordering::Acquire),
            polled: self.polled.load(Ordering::Acquire),
        }
    }
}

impl<T> Drop for EventChannel<T> {
    fn drop(&mut self) {
        // Records left behind (e.g. at shutdown) are dropped exactly once.
        while self.try_poll().is_some() {}
    }
}

impl<T> fmt::Debug for EventChannel<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventChannel")
            .field("capacity", &self.cap)
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}
