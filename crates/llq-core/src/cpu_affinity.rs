//! Pinning role threads to CPU cores.
//!
//! Each exchange and strategy may name a core in its config. A worker pins
//! itself right after spawning, before its first step; a failed pin is
//! logged and the role runs unpinned.

use tracing::{debug, warn};

use crate::error::LlqError;

/// Number of cores this process may be pinned to (0 if unknown).
pub fn available_cores() -> usize {
    core_affinity::get_core_ids().map_or(0, |ids| ids.len())
}

/// Pin the calling thread to the `index`-th core reported by the OS.
pub fn pin_current_thread(index: usize) -> Result<(), LlqError> {
    let ids = core_affinity::get_core_ids().unwrap_or_default();
    let Some(&core) = ids.get(index) else {
        return Err(LlqError::Config(format!("cpu core {index} out of range, {} available", ids.len())));
    };
    if core_affinity::set_for_current(core) {
        Ok(())
    } else {
        Err(LlqError::Config(format!("os refused to pin thread to cpu core {index}")))
    }
}

/// Pin the calling thread if a core is configured. Returns whether the
/// thread ended up pinned.
pub fn pin_if_configured(thread: &str, core: Option<usize>) -> bool {
    let Some(index) = core else {
        return false;
    };
    match pin_current_thread(index) {
        Ok(()) => {
            debug!("[{thread}] pinned to cpu core {index}");
            true
        }
        Err(e) => {
            warn!("[{thread}] running unpinned: {e}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_core_is_an_error() {
        let err = pin_current_thread(usize::MAX).unwrap_err();
        assert!(matches!(err, LlqError::Config(msg) if msg.contains("out of range")));
    }

    #[test]
    fn unconfigured_core_leaves_thread_alone() {
        assert!(!pin_if_configured("test", None));
        assert!(!pin_if_configured("test", Some(usize::MAX)));
    }
}
