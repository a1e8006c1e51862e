//! Process memory statistics, polled on a background thread and reported
//! through `tracing`.
//!
//! Ambient, feature-gated (`mem-stats`) concern, not a core DI
//! responsibility: [`Host`](crate::host::Host) starts one of these when
//! `HostSettings::enable_memory_statistics` is set and stops it on shutdown.
//! Grounded in the periodic-reporter shape of `pkg/host/hosting/looper.go`
//! (an interval loop with a stop signal), reusing `sysinfo` for the actual
//! sampling rather than re-deriving platform-specific `/proc` parsing.

use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use sysinfo::{Pid, System};

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(30);

/// Background thread that samples this process's RSS/virtual memory on an
/// interval and logs it at `info` level.
pub struct MemoryMonitor {
    stop: Arc<(Mutex<bool>, Condvar)>,
    handle: Option<JoinHandle<()>>,
}

impl MemoryMonitor {
    /// Start sampling on the default interval.
    pub fn start() -> Self {
        Self::start_with_interval(DEFAULT_POLL_INTERVAL)
    }

    pub fn start_with_interval(interval: Duration) -> Self {
        let stop = Arc::new((Mutex::new(false), Condvar::new()));
        let stop_clone = Arc::clone(&stop);
        let pid = Pid::from_u32(std::process::id());

        let handle = std::thread::Builder::new()
            .name("hostkit-mem-stats".into())
            .spawn(move || {
                let mut system = System::new();
                loop {
                    system.refresh_process(pid);
                    if let Some(process) = system.process(pid) {
                        #[cfg(feature = "logging")]
                        tracing::info!(
                            rss_bytes = process.memory(),
                            virtual_bytes = process.virtual_memory(),
                            "memory statistics"
                        );
                        #[cfg(not(feature = "logging"))]
                        {
                            let _ = process;
                        }
                    }

                    let (lock, cvar) = &*stop_clone;
                    let guard = lock.lock().unwrap();
                    if *guard {
                        break;
                    }
                    let (guard, _) = cvar.wait_timeout(guard, interval).unwrap();
                    if *guard {
                        break;
                    }
                }
            })
            .expect("failed to spawn memory monitor thread");

        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the background thread to stop and join it.
    pub fn stop(mut self) {
        {
            let (lock, cvar) = &*self.stop;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MemoryMonitor {
    fn drop(&mut self) {
        if self.handle.is_some() {
            let (lock, cvar) = &*self.stop;
            *lock.lock().unwrap() = true;
            cvar.notify_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_and_stops_cleanly() {
        let monitor = MemoryMonitor::start_with_interval(Duration::from_millis(20));
        std::thread::sleep(Duration::from_millis(50));
        monitor.stop();
    }
}
