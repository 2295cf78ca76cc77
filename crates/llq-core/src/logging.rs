//! Process-wide `tracing` subscriber.
//!
//! Console output always goes to stderr with thread names, since every
//! exchange and strategy runs on its own named thread. With a log directory,
//! records are also written to a daily-rotating file through a non-blocking
//! appender, so a role thread never waits on disk. `RUST_LOG` overrides the
//! level passed in.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber.
///
/// Keep the returned guard alive until exit: dropping it flushes and stops
/// the file writer. Only the first call installs anything; later calls (e.g.
/// from tests sharing a process) leave the existing subscriber in place.
///
/// - `log_level`: default filter when `RUST_LOG` is not set, e.g. `"info"`
/// - `log_dir`: directory for rotating log files, console only when `None`
/// - `module_name`: log file prefix, e.g. `"llq"`
pub fn init_logging(log_level: &str, log_dir: Option<&str>, module_name: &str) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let console = fmt::layer().with_writer(std::io::stderr).with_thread_names(true).with_target(false);

    let (file, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, format!("{module_name}.log"));
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false).with_thread_names(true).with_thread_ids(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry().with(filter).with(console).with(file).try_init();
    guard
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_harmless() {
        assert!(init_logging("debug", None, "llq-test").is_none());
        assert!(init_logging("info", None, "llq-test").is_none());
        tracing::info!("still logging");
    }
}
