//! Monotonic nanosecond timestamps for hand-off latency.
//!
//! A trade is stamped when it is built; the strategy subtracts that stamp
//! from its own reading when it polls the trade. Both readings must come from
//! a clock that never steps, so on Linux this is `CLOCK_MONOTONIC_RAW` (not
//! slewed by NTP). Elsewhere it is an `Instant` measured from a process-wide
//! origin. Only differences between readings are meaningful.

const NANOS_PER_SEC: u64 = 1_000_000_000;

/// Current monotonic time in nanoseconds.
#[cfg(target_os = "linux")]
#[inline]
pub fn monotonic_ns() -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // SAFETY: `ts` is a valid, writable timespec for the duration of the call.
    let rc = unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC_RAW, &mut ts) };
    debug_assert_eq!(rc, 0, "CLOCK_MONOTONIC_RAW unavailable");
    ts.tv_sec as u64 * NANOS_PER_SEC + ts.tv_nsec as u64
}

/// Current monotonic time in nanoseconds.
#[cfg(not(target_os = "linux"))]
#[inline]
pub fn monotonic_ns() -> u64 {
    use std::sync::LazyLock;
    use std::time::Instant;

    static ORIGIN: LazyLock<Instant> = LazyLock::new(Instant::now);
    ORIGIN.elapsed().as_nanos() as u64
}

/// Nanoseconds since `since_ns`, an earlier [`monotonic_ns`] reading.
///
/// Zero if `since_ns` lies in the future.
#[inline]
pub fn elapsed_ns(since_ns: u64) -> u64 {
    monotonic_ns().saturating_sub(since_ns)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn readings_are_ordered_across_threads() {
        let before = monotonic_ns();
        let during = std::thread::spawn(monotonic_ns).join().unwrap();
        assert!(during >= before);
        assert!(monotonic_ns() >= during);
    }

    #[test]
    fn elapsed_covers_a_sleep() {
        let start = monotonic_ns();
        std::thread::sleep(Duration::from_millis(5));
        assert!(elapsed_ns(start) >= 5_000_000);
    }

    #[test]
    fn future_stamp_reads_as_zero() {
        assert_eq!(elapsed_ns(u64::MAX), 0);
    }
}
