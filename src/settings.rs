//! Layered host/app configuration loading: defaults, then environment
//! variables, then an optional file, each layer overriding the last.
//!
//! Feature-gated (`config-loader`). Produces a plain value, built before a
//! [`HostBuilder`](crate::host::HostBuilder) exists — hand the result to
//! `configure_host_configuration`/`configure_app_configuration` rather than
//! having the builder reach into the filesystem itself.

use crate::error::{DiError, Result};
use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Layer `defaults`, then `${env_prefix}__FIELD` environment variables, then
/// an optional file at `file_path` (skipped if absent), into a `T`.
pub fn load<T>(defaults: &T, env_prefix: &str, file_path: Option<&str>) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let defaults_source =
        Config::try_from(defaults).map_err(|e| DiError::configuration::<T>(format!("invalid defaults: {e}")))?;

    let mut builder = Config::builder().add_source(defaults_source);
    if let Some(path) = file_path {
        builder = builder.add_source(File::with_name(path).required(false));
    }
    builder = builder.add_source(Environment::with_prefix(env_prefix).separator("__"));

    builder
        .build()
        .and_then(Config::try_deserialize)
        .map_err(|e| DiError::configuration::<T>(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Mutex;

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct AppSettings {
        port: u16,
        debug: bool,
    }

    #[test]
    fn defaults_pass_through_untouched() {
        let _guard = ENV_LOCK.lock().unwrap();
        let defaults = AppSettings { port: 8080, debug: false };
        let loaded = load(&defaults, "HOSTKIT_TEST_DEFAULTS_ONLY", None).unwrap();
        assert_eq!(loaded, AppSettings { port: 8080, debug: false });
    }

    #[test]
    fn environment_variable_overrides_a_default() {
        let _guard = ENV_LOCK.lock().unwrap();
        std::env::set_var("HOSTKIT_TEST_ENV_OVERRIDE__PORT", "9090");

        let defaults = AppSettings { port: 8080, debug: false };
        let loaded = load(&defaults, "HOSTKIT_TEST_ENV_OVERRIDE", None).unwrap();

        std::env::remove_var("HOSTKIT_TEST_ENV_OVERRIDE__PORT");
        assert_eq!(loaded.port, 9090);
        assert!(!loaded.debug);
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let _guard = ENV_LOCK.lock().unwrap();
        let defaults = AppSettings { port: 1234, debug: true };
        let loaded = load(&defaults, "HOSTKIT_TEST_MISSING_FILE", Some("does-not-exist-anywhere")).unwrap();
        assert_eq!(loaded, AppSettings { port: 1234, debug: true });
    }
}
