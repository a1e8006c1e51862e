//! Structured logging setup: a custom builder, then registering and
//! resolving a component so the resolution events show up in the log.

use hostkit::prelude::*;
use hostkit::logging;

struct Greeter {
    name: String,
}

fn main() {
    logging::builder().debug().pretty().with_thread_names().init();

    let container = Container::new();
    container
        .register_singleton::<Greeter, ()>(|_| Greeter { name: "hostkit".to_string() })
        .unwrap();

    let greeter = container.get::<Greeter>().unwrap();
    tracing::info!(name = %greeter.name, "resolved greeter");
}
