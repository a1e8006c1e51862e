//! `#[derive(Inject)]`: resolving a struct's fields from a container instead
//! of writing the factory closure by hand.

use hostkit::{Container, Inject};
use std::sync::Arc;

struct Database {
    url: String,
}

struct Cache {
    capacity: usize,
}

#[derive(Inject)]
struct UserService {
    #[inject]
    db: Arc<Database>,
    #[inject(optional)]
    cache: Option<Arc<Cache>>,
    requests_served: u64,
}

fn main() -> hostkit::Result<()> {
    let container = Container::new();
    container.register_instance(Database {
        url: "postgres://localhost/app".to_string(),
    })?;

    let service = UserService::from_container(&container)?;
    assert!(service.cache.is_none());
    assert_eq!(service.requests_served, 0);
    println!("connected to {}", service.db.url);
    Ok(())
}
