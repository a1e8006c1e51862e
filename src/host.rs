//! Application hosting: a long-running process that owns a set of
//! [`Service`]s and [`Looper`]s, starts them together, and brings them down
//! in a fixed order on shutdown.
//!
//! Grounded in `pkg/host/hosting/host.go`, `hostbuilder.go`, `looper.go` and
//! `looprunner.go` of the source host package. The source's goroutine-per-
//! service model becomes a thread-per-service model here; `context.Context`
//! cancellation becomes a `std::time::Instant` deadline passed to
//! [`Service::stop`].

use crate::container::Container;
use crate::error::{DiError, Result};
use crate::properties::Properties;
use crate::scope_factory::Scope;
use crate::service::{run_guarded, Service};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

#[cfg(feature = "logging")]
use tracing::{debug, error, info, warn};

/// Distinguishes a development run (diagnostics on, verbose logging) from a
/// production one. Mirrors `RunningMode` from the source, minus the
/// Windows-service-specific variants that have no analogue here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunningMode {
    Debug,
    Release,
}

impl Default for RunningMode {
    fn default() -> Self {
        RunningMode::Release
    }
}

/// Static host configuration, carried alongside the container so lifecycle
/// hooks and services can read it without a separate lookup.
#[derive(Debug, Clone)]
pub struct HostSettings {
    pub host_name: String,
    pub running_mode: RunningMode,
    pub enable_memory_statistics: bool,
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            host_name: "Default".to_string(),
            running_mode: RunningMode::default(),
            enable_memory_statistics: false,
        }
    }
}

/// What triggered a stop request: an OS signal, or a direct call to
/// [`Host::request_stop`]. Mirrors the source's `StopEvent`, minus the
/// Windows service control codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopEventKind {
    Signal,
    Manual,
}

#[derive(Debug, Clone, Copy)]
pub struct StopEvent {
    pub kind: StopEventKind,
}

/// Everything a lifecycle hook needs to look at: the container and the
/// settings the host was built with.
pub struct HostContext {
    pub container: Container,
    pub settings: HostSettings,
}

type HookFn = dyn Fn(&HostContext) + Send + Sync;
type StopHookFn = dyn Fn(&HostContext, &StopEvent) -> bool + Send + Sync;

/// The five points in a host's life a caller can observe, fired in a fixed
/// order on startup and shutdown. Grounded in `DefaultGenericHost`'s calls to
/// `hostContext.Lifecycle.On*` in `host.go`.
///
/// Order on start: `on_host_ready` (once the container and services exist,
/// before any service runs) then `on_app_started` (once every service's
/// `run` thread has been spawned).
///
/// Order on shutdown: `on_stop_event` (fired per stop trigger; returning
/// `false` vetoes the shutdown), then — once a shutdown actually proceeds —
/// `on_app_stopping` *before* any service is asked to stop, then
/// `on_app_stopped` *after* every service's stop result is collected,
/// unconditionally (even if some services failed to stop in time).
#[derive(Default)]
pub struct LifecycleHandler {
    on_host_ready: Option<Box<HookFn>>,
    on_app_started: Option<Box<HookFn>>,
    on_stop_event: Option<Box<StopHookFn>>,
    on_app_stopping: Option<Box<HookFn>>,
    on_app_stopped: Option<Box<HookFn>>,
}

impl LifecycleHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_host_ready(mut self, f: impl Fn(&HostContext) + Send + Sync + 'static) -> Self {
        self.on_host_ready = Some(Box::new(f));
        self
    }

    pub fn on_app_started(mut self, f: impl Fn(&HostContext) + Send + Sync + 'static) -> Self {
        self.on_app_started = Some(Box::new(f));
        self
    }

    /// Register a veto hook: return `false` to suppress a stop request
    /// (e.g. to ignore a signal while a critical section is in flight).
    pub fn on_stop_event(mut self, f: impl Fn(&HostContext, &StopEvent) -> bool + Send + Sync + 'static) -> Self {
        self.on_stop_event = Some(Box::new(f));
        self
    }

    pub fn on_app_stopping(mut self, f: impl Fn(&HostContext) + Send + Sync + 'static) -> Self {
        self.on_app_stopping = Some(Box::new(f));
        self
    }

    pub fn on_app_stopped(mut self, f: impl Fn(&HostContext) + Send + Sync + 'static) -> Self {
        self.on_app_stopped = Some(Box::new(f));
        self
    }

    fn fire_host_ready(&self, ctx: &HostContext) {
        if let Some(f) = &self.on_host_ready {
            f(ctx);
        }
    }

    fn fire_app_started(&self, ctx: &HostContext) {
        if let Some(f) = &self.on_app_started {
            f(ctx);
        }
    }

    /// `true` unless a hook explicitly vetoes. No hook registered means
    /// every stop event is accepted.
    fn fire_stop_event(&self, ctx: &HostContext, event: &StopEvent) -> bool {
        match &self.on_stop_event {
            Some(f) => f(ctx, event),
            None => true,
        }
    }

    fn fire_app_stopping(&self, ctx: &HostContext) {
        if let Some(f) = &self.on_app_stopping {
            f(ctx);
        }
    }

    fn fire_app_stopped(&self, ctx: &HostContext) {
        if let Some(f) = &self.on_app_stopped {
            f(ctx);
        }
    }
}

// ---------------------------------------------------------------------
// Looper: a processor group re-run on a fixed interval.
// ---------------------------------------------------------------------

/// How far a processor's exit should propagate, mirroring the source's
/// `ScopeContext.Exit()`/`IsExit()` pair on `Current`/`TopLevel`/`Global`
/// scopes from `pkg/host/hosting/looper.go`'s group-run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitScope {
    /// Stop only the processor group that raised it; sibling groups in the
    /// same iteration still run.
    Current,
    /// Stop the entire iteration (every group in this pass of the loop).
    TopLevel,
    /// Stop the looper itself — no further iterations run.
    Global,
}

/// What a processor's `run` decided: keep going, or exit at some scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Exit(ExitScope),
}

impl Flow {
    fn stops_group(self) -> bool {
        matches!(self, Flow::Exit(_))
    }

    fn stops_iteration(self) -> bool {
        matches!(self, Flow::Exit(ExitScope::TopLevel | ExitScope::Global))
    }

    fn stops_looper(self) -> bool {
        matches!(self, Flow::Exit(ExitScope::Global))
    }
}

/// One unit of work a processor group runs each iteration. Grounded in
/// `LoopProcessor.Run(ctxt ScopeContext)`.
pub trait Processor: Send + Sync {
    fn name(&self) -> &str;
    fn run(&self, scope: &Scope<'_>) -> Flow;
}

/// Wraps a closure as a [`Processor`], the equivalent of the source's
/// `UseFuncProcessor`/`FunctionProcessor`.
pub struct FuncProcessor<F> {
    name: String,
    f: F,
}

impl<F> FuncProcessor<F>
where
    F: Fn(&Scope<'_>) -> Flow + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self { name: name.into(), f }
    }
}

impl<F> Processor for FuncProcessor<F>
where
    F: Fn(&Scope<'_>) -> Flow + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, scope: &Scope<'_>) -> Flow {
        (self.f)(scope)
    }
}

/// Guards whether a processor runs this iteration, evaluated against the
/// group's scope. Mirrors `ConditionMethod`.
pub type Condition = Arc<dyn Fn(&Scope<'_>) -> bool + Send + Sync>;

struct ProcessorRecord {
    processor: Box<dyn Processor>,
    condition: Option<Condition>,
}

/// An ordered list of processors run together against one scope per
/// iteration. A group may itself be nested as a processor inside another
/// group (the source's `UseProcessorGroup`), though this crate exposes that
/// through [`ProcessorGroupBuilder::add_group`] rather than the registry.
pub struct ProcessorGroup {
    name: String,
    processors: Vec<ProcessorRecord>,
    init_scope: Option<Box<dyn Fn(&Scope<'_>) + Send + Sync>>,
}

impl ProcessorGroup {
    fn run(&self, parent: &Scope<'_>) -> Flow {
        let scope = parent.create_scope();
        if let Some(init) = &self.init_scope {
            init(&scope);
        }

        #[cfg(feature = "logging")]
        debug!(group = %self.name, "running processor group");

        for record in &self.processors {
            if let Some(condition) = &record.condition
                && !condition(&scope)
            {
                continue;
            }

            let flow = record.processor.run(&scope);
            if flow.stops_group() {
                #[cfg(feature = "logging")]
                debug!(group = %self.name, processor = record.processor.name(), "processor ended the group's iteration");
                return flow;
            }
        }

        Flow::Continue
    }
}

/// Declares the processors a [`ProcessorGroup`] runs, and how its scope is
/// seeded before they run. Mirrors `ConfigureGroupContext`/`GroupContext`.
pub struct ProcessorGroupBuilder {
    name: String,
    processors: Vec<ProcessorRecord>,
    init_scope: Option<Box<dyn Fn(&Scope<'_>) + Send + Sync>>,
}

impl ProcessorGroupBuilder {
    fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processors: Vec::new(),
            init_scope: None,
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Seed the group's per-iteration scope before any processor runs —
    /// e.g. attach a request id as a contextual dependency.
    pub fn init_scope(mut self, f: impl Fn(&Scope<'_>) + Send + Sync + 'static) -> Self {
        self.init_scope = Some(Box::new(f));
        self
    }

    pub fn add_processor(mut self, processor: impl Processor + 'static) -> Self {
        self.processors.push(ProcessorRecord {
            processor: Box::new(processor),
            condition: None,
        });
        self
    }

    pub fn add_processor_if(mut self, processor: impl Processor + 'static, condition: Condition) -> Self {
        self.processors.push(ProcessorRecord {
            processor: Box::new(processor),
            condition: Some(condition),
        });
        self
    }

    pub fn add_func(self, name: impl Into<String>, f: impl Fn(&Scope<'_>) -> Flow + Send + Sync + 'static) -> Self {
        self.add_processor(FuncProcessor::new(name, f))
    }

    /// Nest another processor group as one processor of this one. The
    /// source's `UseProcessorGroup`.
    pub fn add_group(self, group: ProcessorGroup) -> Self {
        struct GroupAsProcessor(ProcessorGroup);
        impl Processor for GroupAsProcessor {
            fn name(&self) -> &str {
                &self.0.name
            }
            fn run(&self, scope: &Scope<'_>) -> Flow {
                // The nested group's own `Current` only ends its own
                // iteration; only `TopLevel`/`Global` bubble up to stop the
                // parent's remaining siblings.
                match self.0.run(scope) {
                    Flow::Exit(ExitScope::Current) => Flow::Continue,
                    flow => flow,
                }
            }
        }
        self.add_processor(GroupAsProcessor(group))
    }

    fn build(self) -> ProcessorGroup {
        ProcessorGroup {
            name: self.name,
            processors: self.processors,
            init_scope: self.init_scope,
        }
    }
}

/// The loop-driving engine underneath a [`Looper`]: enforces a floor on how
/// often iterations run and backs off exponentially while polling for a
/// requested stop to take effect.
///
/// Grounded in `pkg/host/hosting/looprunner.go`. The source's buffered
/// channel + `select` on a timer becomes a `Condvar` wait here, with the
/// same two constants.
struct LoopRunner {
    min_interval: Duration,
    max_stop_interval: Duration,
    stop: Arc<(Mutex<bool>, Condvar)>,
    stopped: Arc<AtomicBool>,
}

impl LoopRunner {
    fn new(min_interval: Duration, max_stop_interval: Duration) -> Self {
        Self {
            min_interval,
            max_stop_interval,
            stop: Arc::new((Mutex::new(false), Condvar::new())),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs `action` repeatedly until `request_stop` (or `stop`) is called.
    /// `action` is timed; the wait before the next iteration is
    /// `interval - elapsed`, floored at `min_interval` so a slow iteration
    /// never causes iterations to stack up back to back.
    fn run(&self, interval: Duration, mut action: impl FnMut()) {
        loop {
            let start = Instant::now();
            action();
            let elapsed = start.elapsed();
            let wait = interval.saturating_sub(elapsed).max(self.min_interval);

            let (lock, cvar) = &*self.stop;
            let guard = lock.lock().unwrap();
            if *guard {
                self.stopped.store(true, Ordering::Release);
                return;
            }
            let (guard, _timeout) = cvar.wait_timeout(guard, wait).unwrap();
            if *guard {
                self.stopped.store(true, Ordering::Release);
                return;
            }
        }
    }

    fn request_stop(&self) {
        let (lock, cvar) = &*self.stop;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    /// Ask the loop to stop and poll for it to actually have, backing off
    /// from 1ms and doubling up to `max_stop_interval` each attempt.
    fn stop(&self, deadline: Instant, name: &str) -> Result<()> {
        self.request_stop();

        let mut poll = Duration::from_millis(1);
        loop {
            if self.stopped.load(Ordering::Acquire) {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(DiError::service_stop(name, "looper did not stop before the deadline"));
            }
            std::thread::sleep(poll.min(deadline - now));
            poll = (poll * 2).min(self.max_stop_interval);
        }
    }
}

const MIN_LOOP_INTERVAL: Duration = Duration::from_millis(500);
const MAX_STOP_INTERVAL: Duration = Duration::from_millis(500);

/// Builds a [`Looper`]'s top-level processor group and its timing settings.
/// Mirrors `ConfigureLoopContext`.
pub struct LooperBuilder {
    interval: Duration,
    recover: bool,
    group: ProcessorGroupBuilder,
}

impl LooperBuilder {
    fn new(name: &str) -> Self {
        Self {
            interval: Duration::from_secs(60),
            recover: true,
            group: ProcessorGroupBuilder::new(name),
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Whether a panicking processor is caught and logged (continuing the
    /// loop) rather than unwinding out of the looper's thread. Defaults on.
    pub fn recover(mut self, enabled: bool) -> Self {
        self.recover = enabled;
        self
    }

    pub fn init_scope(mut self, f: impl Fn(&Scope<'_>) + Send + Sync + 'static) -> Self {
        self.group = self.group.init_scope(f);
        self
    }

    pub fn add_processor(mut self, processor: impl Processor + 'static) -> Self {
        self.group = self.group.add_processor(processor);
        self
    }

    pub fn add_processor_if(mut self, processor: impl Processor + 'static, condition: Condition) -> Self {
        self.group = self.group.add_processor_if(processor, condition);
        self
    }

    pub fn add_func(mut self, name: impl Into<String>, f: impl Fn(&Scope<'_>) -> Flow + Send + Sync + 'static) -> Self {
        self.group = self.group.add_func(name, f);
        self
    }

    pub fn add_group(mut self, group: ProcessorGroup) -> Self {
        self.group = self.group.add_group(group);
        self
    }
}

/// A named service that re-runs a processor group on a fixed interval until
/// asked to stop. Grounded in `DefaultLooper` in `pkg/host/hosting/looper.go`.
pub struct Looper {
    name: String,
    interval: Duration,
    group: ProcessorGroup,
    runner: LoopRunner,
    container: Container,
}

impl Looper {
    fn from_builder(name: impl Into<String>, container: Container, builder: LooperBuilder) -> Self {
        Self {
            name: name.into(),
            interval: builder.interval,
            group: builder.group.build(),
            runner: LoopRunner::new(MIN_LOOP_INTERVAL, MAX_STOP_INTERVAL),
            container,
        }
    }
}

impl Service for Looper {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self) -> Result<()> {
        #[cfg(feature = "logging")]
        info!(looper = %self.name, "looper started");

        let root = self.container.root_scope();
        self.runner.run(self.interval, || {
            let flow = self.group.run(&root);
            if flow.stops_looper() {
                self.runner.request_stop();
            }
        });

        #[cfg(feature = "logging")]
        info!(looper = %self.name, "looper stopped");
        Ok(())
    }

    fn stop(&self, deadline: Instant) -> Result<()> {
        self.runner.stop(deadline, &self.name)
    }
}

// ---------------------------------------------------------------------
// Host: owns the container, the services, and the lifecycle hooks.
// ---------------------------------------------------------------------

struct RunningService {
    name: String,
    handle: Mutex<Option<JoinHandle<Result<()>>>>,
    service: Arc<dyn Service>,
}

struct HostInner {
    context: HostContext,
    lifecycle: LifecycleHandler,
    services: Vec<RunningService>,
    stop: Arc<(Mutex<bool>, Condvar)>,
    shutdown_timeout: Duration,
    #[cfg(feature = "mem-stats")]
    memory_monitor: Mutex<Option<crate::memstats::MemoryMonitor>>,
}

/// A running application: the container plus every [`Service`] and
/// [`Looper`] it owns, started together and stopped in a fixed order.
/// Grounded in `DefaultGenericHost` in `pkg/host/hosting/host.go`.
///
/// Cheap to clone — internally an `Arc`, so a signal handler or a spawned
/// thread can hold its own handle back to the host.
#[derive(Clone)]
pub struct Host {
    inner: Arc<HostInner>,
}

impl Host {
    #[inline]
    pub fn container(&self) -> &Container {
        &self.inner.context.container
    }

    #[inline]
    pub fn settings(&self) -> &HostSettings {
        &self.inner.context.settings
    }

    /// Start every service on its own thread, then fire `on_app_started`
    /// once all of them have been spawned — not once they've *finished*,
    /// since services are expected to block until stopped.
    pub fn start(&self) -> Result<()> {
        self.inner.lifecycle.fire_host_ready(&self.inner.context);

        #[cfg(feature = "mem-stats")]
        if self.inner.context.settings.enable_memory_statistics {
            let mut slot = self.inner.memory_monitor.lock().unwrap();
            let monitor = crate::memstats::MemoryMonitor::start();
            *slot = Some(monitor);
        }

        for running in &self.inner.services {
            let service = Arc::clone(&running.service);
            let name = running.name.clone();
            let handle = std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_guarded(service.as_ref()))
                .map_err(|e| DiError::Internal(format!("failed to spawn service {name}: {e}")))?;
            *running.handle.lock().unwrap() = Some(handle);

            #[cfg(feature = "logging")]
            debug!(service = %running.name, "service started");
        }

        self.inner.lifecycle.fire_app_started(&self.inner.context);
        Ok(())
    }

    /// Fire `on_app_stopping`, then stop every service in parallel, each
    /// bounded by `self.shutdown_timeout`. `on_app_stopped` always fires
    /// once every service has been asked, regardless of outcome. The first
    /// error encountered (in service order) is returned to the caller.
    pub fn shutdown(&self) -> Result<()> {
        self.inner.lifecycle.fire_app_stopping(&self.inner.context);

        let deadline = Instant::now() + self.inner.shutdown_timeout;
        let results: Vec<(String, Result<()>)> = std::thread::scope(|scope| {
            let handles: Vec<_> = self
                .inner
                .services
                .iter()
                .map(|running| {
                    let name = running.name.clone();
                    scope.spawn(move || {
                        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            running.service.stop(deadline)
                        }))
                        .unwrap_or_else(|payload| {
                            Err(DiError::service_stop(&name, crate::service::panic_message(payload)))
                        });
                        (name, outcome)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().expect("stop thread never panics")).collect()
        });

        for running in &self.inner.services {
            if let Some(handle) = running.handle.lock().unwrap().take() {
                let _ = handle.join();
            }
        }

        #[cfg(feature = "mem-stats")]
        if let Some(monitor) = self.inner.memory_monitor.lock().unwrap().take() {
            monitor.stop();
        }

        self.inner.lifecycle.fire_app_stopped(&self.inner.context);

        let mut first_error = None;
        for (name, result) in results {
            if let Err(e) = result {
                #[cfg(feature = "logging")]
                error!(service = %name, error = %e, "service failed to stop cleanly");
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Deliver a stop trigger to the lifecycle's veto hook; if it isn't
    /// vetoed, wake up whatever is blocked in [`Host::run`].
    pub fn dispatch_stop_event(&self, event: StopEvent) -> bool {
        let accepted = self.inner.lifecycle.fire_stop_event(&self.inner.context, &event);
        if accepted {
            self.request_stop();
        }
        accepted
    }

    /// Unconditionally request a stop, bypassing the veto hook — for
    /// programmatic shutdown rather than a signal.
    pub fn request_stop(&self) {
        let (lock, cvar) = &*self.inner.stop;
        *lock.lock().unwrap() = true;
        cvar.notify_all();
    }

    fn wait_for_stop(&self) {
        let (lock, cvar) = &*self.inner.stop;
        let guard = lock.lock().unwrap();
        let _unused = cvar.wait_while(guard, |stopped| !*stopped).unwrap();
    }

    /// Start every service, install a `Ctrl-C`/`SIGTERM` handler that routes
    /// through the veto hook, block until a stop is accepted, then shut
    /// down. The blocking entry point most binaries call from `main`.
    pub fn run(&self) -> Result<()> {
        self.start()?;

        let signal_host = self.clone();
        let install_result = ctrlc::set_handler(move || {
            signal_host.dispatch_stop_event(StopEvent {
                kind: StopEventKind::Signal,
            });
        });
        if let Err(e) = install_result {
            #[cfg(feature = "logging")]
            warn!(error = %e, "failed to install signal handler, relying on request_stop only");
        }

        self.wait_for_stop();
        self.shutdown()
    }
}

// ---------------------------------------------------------------------
// HostBuilder
// ---------------------------------------------------------------------

type ServiceFactory = dyn FnOnce(&Container) -> Result<Arc<dyn Service>>;

struct LooperSpec {
    name: String,
    configure: Box<dyn FnOnce(&Container, LooperBuilder) -> LooperBuilder>,
}

/// Assembles a [`Host`]: components, services, loopers and lifecycle hooks,
/// built up with a fluent interface and resolved once, at [`HostBuilder::build`].
/// Grounded in `DefaultHostBuilder` in `pkg/host/hosting/hostbuilder.go`.
pub struct HostBuilder {
    settings: HostSettings,
    container: Container,
    services: Vec<(String, Box<ServiceFactory>)>,
    loopers: Vec<LooperSpec>,
    lifecycle: LifecycleHandler,
    shutdown_timeout: Duration,
}

impl HostBuilder {
    pub fn new() -> Self {
        Self {
            settings: HostSettings::default(),
            container: Container::new(),
            services: Vec::new(),
            loopers: Vec::new(),
            lifecycle: LifecycleHandler::new(),
            shutdown_timeout: Duration::from_secs(30),
        }
    }

    pub fn host_name(mut self, name: impl Into<String>) -> Self {
        self.settings.host_name = name.into();
        self
    }

    pub fn running_mode(mut self, mode: RunningMode) -> Self {
        self.settings.running_mode = mode;
        self
    }

    pub fn enable_memory_statistics(mut self, enabled: bool) -> Self {
        self.settings.enable_memory_statistics = enabled;
        self
    }

    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Register host-wide components against the builder's container before
    /// any service is resolved. Mirrors `ConfigureComponents`.
    pub fn configure_components(self, f: impl FnOnce(&Container)) -> Self {
        f(&self.container);
        self
    }

    /// Register a host-level configuration value, resolvable later through
    /// [`Container::get_configuration`]. Mirrors `ConfigureHostConfiguration`,
    /// simplified to a single typed value instead of a layered config-file
    /// builder, since that layering already lives in the `config-loader`
    /// feature rather than the builder itself.
    pub fn configure_host_configuration<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.container
            .register_configuration(value)
            .expect("host configuration already registered for this type");
        self
    }

    /// Register an application-level configuration value. Mirrors
    /// `ConfigureAppConfiguration`; kept distinct from
    /// [`Self::configure_host_configuration`] so a host and the application
    /// it's hosting can each register a value of a different type without
    /// colliding.
    pub fn configure_app_configuration<T: Send + Sync + 'static>(self, value: T) -> Self {
        self.container
            .register_configuration(value)
            .expect("app configuration already registered for this type");
        self
    }

    /// Configure the global `tracing` subscriber before any service starts.
    /// Mirrors `ConfigureLogging`; `f` receives the builder pre-seeded with
    /// this host's running mode (debug mode defaults to `DEBUG` level).
    #[cfg(feature = "logging")]
    pub fn configure_logging(self, f: impl FnOnce(crate::logging::LoggingBuilder) -> crate::logging::LoggingBuilder) -> Self {
        let builder = crate::logging::builder();
        let builder = if matches!(self.settings.running_mode, RunningMode::Debug) {
            builder.debug()
        } else {
            builder
        };
        f(builder).init();
        self
    }

    pub fn configure_lifecycle(mut self, f: impl FnOnce(LifecycleHandler) -> LifecycleHandler) -> Self {
        self.lifecycle = f(self.lifecycle);
        self
    }

    /// Apply a batch of builder calls in one closure. Mirrors
    /// `ConfigureServices`, which in the source hands the whole builder to a
    /// callback so a module can group several `UseService`/`UseLoop` calls
    /// under one registration function.
    pub fn configure_services(self, f: impl FnOnce(Self) -> Self) -> Self {
        f(self)
    }

    /// Register a named service, built from the host's container once
    /// [`HostBuilder::build`] runs. Mirrors `UseService`.
    pub fn use_service<S>(mut self, name: impl Into<String>, factory: impl FnOnce(&Container) -> Result<S> + 'static) -> Self
    where
        S: Service + 'static,
    {
        let name = name.into();
        self.services.push((
            name,
            Box::new(move |container: &Container| -> Result<Arc<dyn Service>> {
                let service = factory(container)?;
                Ok(Arc::new(service) as Arc<dyn Service>)
            }),
        ));
        self
    }

    /// Register a named looper. `configure` receives the container (for
    /// resolving processors) and a [`LooperBuilder`] to declare its
    /// interval, recovery policy and processor group. Mirrors `UseLoop`.
    pub fn use_loop(
        mut self,
        name: impl Into<String>,
        configure: impl FnOnce(&Container, LooperBuilder) -> LooperBuilder + 'static,
    ) -> Self {
        self.loopers.push(LooperSpec {
            name: name.into(),
            configure: Box::new(configure),
        });
        self
    }

    /// Resolve every registered service and looper against the container and
    /// assemble the final [`Host`].
    pub fn build(self) -> Result<Host> {
        let container = self.container;

        let mut running_services = Vec::with_capacity(self.services.len() + self.loopers.len());
        for (name, factory) in self.services {
            let service = factory(&container)?;
            running_services.push(RunningService {
                name,
                handle: Mutex::new(None),
                service,
            });
        }
        for spec in self.loopers {
            let builder = LooperBuilder::new(&spec.name);
            let builder = (spec.configure)(&container, builder);
            let looper = Looper::from_builder(spec.name.clone(), container.clone(), builder);
            running_services.push(RunningService {
                name: spec.name,
                handle: Mutex::new(None),
                service: Arc::new(looper),
            });
        }

        let context = HostContext {
            container,
            settings: self.settings,
        };

        Ok(Host {
            inner: Arc::new(HostInner {
                context,
                lifecycle: self.lifecycle,
                services: running_services,
                stop: Arc::new((Mutex::new(false), Condvar::new())),
                shutdown_timeout: self.shutdown_timeout,
                #[cfg(feature = "mem-stats")]
                memory_monitor: Mutex::new(None),
            }),
        })
    }
}

impl Default for HostBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct Probe {
        started: Arc<AtomicBool>,
        stop_requested: Arc<AtomicBool>,
    }

    impl Service for Probe {
        fn name(&self) -> &str {
            "probe"
        }
        fn run(&self) -> Result<()> {
            self.started.store(true, Ordering::SeqCst);
            while !self.stop_requested.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(2));
            }
            Ok(())
        }
        fn stop(&self, _deadline: Instant) -> Result<()> {
            self.stop_requested.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn host_starts_and_stops_a_service() {
        let started = Arc::new(AtomicBool::new(false));
        let stop_requested = Arc::new(AtomicBool::new(false));
        let s2 = Arc::clone(&started);
        let r2 = Arc::clone(&stop_requested);

        let host = HostBuilder::new()
            .host_name("test-host")
            .use_service("probe", move |_container| {
                Ok(Probe {
                    started: Arc::clone(&s2),
                    stop_requested: Arc::clone(&r2),
                })
            })
            .build()
            .unwrap();

        host.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(started.load(Ordering::SeqCst));

        host.shutdown().unwrap();
        assert!(stop_requested.load(Ordering::SeqCst));
    }

    #[test]
    fn lifecycle_hooks_fire_in_order() {
        let order = Arc::new(Mutex::new(Vec::<&'static str>::new()));
        let o1 = Arc::clone(&order);
        let o2 = Arc::clone(&order);
        let o3 = Arc::clone(&order);
        let o4 = Arc::clone(&order);

        let host = HostBuilder::new()
            .configure_lifecycle(move |lc| {
                lc.on_host_ready(move |_| o1.lock().unwrap().push("ready"))
                    .on_app_started(move |_| o2.lock().unwrap().push("started"))
                    .on_app_stopping(move |_| o3.lock().unwrap().push("stopping"))
                    .on_app_stopped(move |_| o4.lock().unwrap().push("stopped"))
            })
            .build()
            .unwrap();

        host.start().unwrap();
        host.shutdown().unwrap();

        assert_eq!(*order.lock().unwrap(), vec!["ready", "started", "stopping", "stopped"]);
    }

    #[test]
    fn stop_event_veto_blocks_request_stop() {
        let host = HostBuilder::new()
            .configure_lifecycle(|lc| lc.on_stop_event(|_, _| false))
            .build()
            .unwrap();

        host.start().unwrap();
        let accepted = host.dispatch_stop_event(StopEvent {
            kind: StopEventKind::Manual,
        });
        assert!(!accepted);
        host.shutdown().unwrap();
    }

    #[test]
    fn looper_runs_at_least_once_before_stop() {
        let count = Arc::new(AtomicU32::new(0));
        let c2 = Arc::clone(&count);

        let host = HostBuilder::new()
            .use_loop("ticker", move |_container, builder| {
                let c3 = Arc::clone(&c2);
                builder.interval(Duration::from_millis(1)).add_func("tick", move |_scope| {
                    c3.fetch_add(1, Ordering::SeqCst);
                    Flow::Continue
                })
            })
            .build()
            .unwrap();

        host.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));
        host.shutdown().unwrap();

        assert!(count.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn exit_scope_global_stops_looper_iteration_loop() {
        let iterations = Arc::new(AtomicU32::new(0));
        let i2 = Arc::clone(&iterations);

        let host = HostBuilder::new()
            .use_loop("once", move |_container, builder| {
                let i3 = Arc::clone(&i2);
                builder.interval(Duration::from_millis(1)).add_func("once", move |_scope| {
                    i3.fetch_add(1, Ordering::SeqCst);
                    Flow::Exit(ExitScope::Global)
                })
            })
            .build()
            .unwrap();

        host.start().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        host.shutdown().unwrap();

        assert_eq!(iterations.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_group_exit_current_does_not_stop_the_parent_groups_siblings() {
        let container = Container::new();
        let root = container.root_scope();

        let ran_after = Arc::new(AtomicBool::new(false));
        let ran_after2 = Arc::clone(&ran_after);

        let nested = ProcessorGroupBuilder::new("nested")
            .add_func("exit-current", |_scope| Flow::Exit(ExitScope::Current))
            .build();

        let parent = ProcessorGroupBuilder::new("parent")
            .add_group(nested)
            .add_func("after-nested-group", move |_scope| {
                ran_after2.store(true, Ordering::SeqCst);
                Flow::Continue
            })
            .build();

        let flow = parent.run(&root);
        assert_eq!(flow, Flow::Continue);
        assert!(ran_after.load(Ordering::SeqCst));
    }

    #[test]
    fn nested_group_exit_top_level_still_stops_the_parent() {
        let container = Container::new();
        let root = container.root_scope();

        let ran_after = Arc::new(AtomicBool::new(false));
        let ran_after2 = Arc::clone(&ran_after);

        let nested = ProcessorGroupBuilder::new("nested")
            .add_func("exit-top-level", |_scope| Flow::Exit(ExitScope::TopLevel))
            .build();

        let parent = ProcessorGroupBuilder::new("parent")
            .add_group(nested)
            .add_func("after-nested-group", move |_scope| {
                ran_after2.store(true, Ordering::SeqCst);
                Flow::Continue
            })
            .build();

        let flow = parent.run(&root);
        assert_eq!(flow, Flow::Exit(ExitScope::TopLevel));
        assert!(!ran_after.load(Ordering::SeqCst));
    }

    #[test]
    fn configure_host_and_app_configuration_are_both_resolvable() {
        struct HostSettingsConfig {
            region: &'static str,
        }
        struct AppConfig {
            feature_flag: bool,
        }

        let host = HostBuilder::new()
            .configure_host_configuration(HostSettingsConfig { region: "us-west" })
            .configure_app_configuration(AppConfig { feature_flag: true })
            .build()
            .unwrap();

        let container = host.container();
        assert_eq!(container.get_configuration::<HostSettingsConfig>().unwrap().region, "us-west");
        assert!(container.get_configuration::<AppConfig>().unwrap().feature_flag);
    }

    #[test]
    fn configure_services_applies_a_batch_of_builder_calls() {
        let started = Arc::new(AtomicBool::new(false));
        let s2 = Arc::clone(&started);

        fn register_probe(builder: HostBuilder, flag: Arc<AtomicBool>) -> HostBuilder {
            builder.use_service("probe", move |_container| {
                Ok(Probe {
                    started: flag,
                    stop_requested: Arc::new(AtomicBool::new(false)),
                })
            })
        }

        let host = HostBuilder::new()
            .configure_services(move |builder| register_probe(builder, s2))
            .build()
            .unwrap();

        host.start().unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(started.load(Ordering::SeqCst));
        host.shutdown().unwrap();
    }
}
