//! The `Service` trait: a long-running unit the host starts and stops.
//!
//! Grounded in `pkg/host/hosting/servicecontext.go` of the source host
//! package, which pairs a running goroutine with a `Stop(deadline)` signal.
//! Here a service owns its own thread; `stop` asks it to wind down by
//! `deadline` and the host collects the join result.

use crate::error::{DiError, Result};
use std::time::Instant;

/// A background unit of work the host starts at launch and stops at
/// shutdown.
///
/// `run` is called once, on a dedicated thread, and is expected to block
/// until either it completes on its own or `stop` asks it to exit. `stop` is
/// called from the host's shutdown path — on a *different* thread than
/// `run` — and must not block past `deadline`: implementations typically
/// flip an `AtomicBool`/`Condvar` that `run`'s loop polls.
pub trait Service: Send + Sync {
    /// A name used in diagnostics and in `DiError::ServiceStop`.
    fn name(&self) -> &str;

    /// Start the service. Blocks the calling (dedicated) thread until the
    /// service exits, whether cleanly or via `stop`.
    fn run(&self) -> Result<()>;

    /// Ask the service to stop, tolerating up to `deadline`. Returning late
    /// does not abort the service's thread — the host's own stop-polling
    /// loop is what ultimately times out waiting for it.
    fn stop(&self, deadline: Instant) -> Result<()>;
}

/// Wraps a plain closure pair as a [`Service`], for services simple enough
/// not to need their own type.
pub struct FnService<R, S> {
    name: String,
    run: R,
    stop: S,
}

impl<R, S> FnService<R, S>
where
    R: Fn() -> Result<()> + Send + Sync,
    S: Fn(Instant) -> Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, run: R, stop: S) -> Self {
        Self {
            name: name.into(),
            run,
            stop,
        }
    }
}

impl<R, S> Service for FnService<R, S>
where
    R: Fn() -> Result<()> + Send + Sync,
    S: Fn(Instant) -> Result<()> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> Result<()> {
        (self.run)()
    }

    fn stop(&self, deadline: Instant) -> Result<()> {
        (self.stop)(deadline)
    }
}

/// Runs `service.run()` and converts a panic into `DiError::ServiceStop`,
/// matching the source's recovery wrapper around each service goroutine.
pub fn run_guarded(service: &dyn Service) -> Result<()> {
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| service.run())) {
        Ok(result) => result,
        Err(payload) => Err(DiError::service_stop(service.name(), panic_message(payload))),
    }
}

pub(crate) fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panicked with a non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn panicking_service_surfaces_as_service_stop_error() {
        struct Boom;
        impl Service for Boom {
            fn name(&self) -> &str {
                "boom"
            }
            fn run(&self) -> Result<()> {
                panic!("exploded");
            }
            fn stop(&self, _deadline: Instant) -> Result<()> {
                Ok(())
            }
        }

        let err = run_guarded(&Boom).unwrap_err();
        assert!(matches!(err, DiError::ServiceStop { .. }));
    }

    #[test]
    fn fn_service_delegates_to_closures() {
        let ran = Arc::new(AtomicBool::new(false));
        let stopped = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        let stopped2 = Arc::clone(&stopped);

        let service = FnService::new(
            "probe",
            move || {
                ran2.store(true, Ordering::SeqCst);
                Ok(())
            },
            move |_deadline| {
                stopped2.store(true, Ordering::SeqCst);
                Ok(())
            },
        );

        service.run().unwrap();
        service.stop(Instant::now()).unwrap();
        assert!(ran.load(Ordering::SeqCst));
        assert!(stopped.load(Ordering::SeqCst));
    }
}
