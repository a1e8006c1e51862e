//! A minimal host: one background service and one interval-driven looper,
//! wired together through a `HostBuilder`.

use hostkit::prelude::*;
use hostkit::{Flow, HostBuilder, RunningMode};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

struct Config {
    greeting: String,
}

struct Heartbeat {
    stop_requested: AtomicBool,
}

impl Service for Heartbeat {
    fn name(&self) -> &str {
        "heartbeat"
    }

    fn run(&self) -> hostkit::Result<()> {
        while !self.stop_requested.load(Ordering::SeqCst) {
            std::thread::sleep(Duration::from_millis(200));
        }
        Ok(())
    }

    fn stop(&self, _deadline: Instant) -> hostkit::Result<()> {
        self.stop_requested.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn main() -> hostkit::Result<()> {
    let host = HostBuilder::new()
        .host_name("demo-host")
        .running_mode(RunningMode::Debug)
        .configure_components(|container| {
            container
                .register_instance(Config {
                    greeting: "hello from hostkit".to_string(),
                })
                .unwrap();
        })
        .use_service("heartbeat", |_container| {
            Ok(Heartbeat {
                stop_requested: AtomicBool::new(false),
            })
        })
        .use_loop("status-printer", |container, builder| {
            let config = container.get::<Config>().unwrap();
            builder.interval(Duration::from_millis(500)).add_func("print-status", move |_scope| {
                println!("{}", config.greeting);
                Flow::Continue
            })
        })
        .build()?;

    host.start()?;
    std::thread::sleep(Duration::from_secs(2));
    host.shutdown()?;
    Ok(())
}
