//! Telemetry
//!
//! One `tracing-subscriber` registry per process. The `[core]` log level
//! applies to the engine and sdk crates, dependencies stay at `warn`, and a
//! set `RUST_LOG` replaces the whole filter. Debug builds log pretty text,
//! release builds log JSON with the current span.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::CoreConfig;

/// Crates whose level follows `core.log_level`
const OWN_TARGETS: [&str; 3] = ["beacon_engine", "beacon", "sdk"];

/// Filter directives for `level`, e.g. `warn,beacon_engine=debug,...`
pub fn filter_directives(level: &str) -> String {
    let mut directives = vec!["warn".to_string()];
    directives.extend(OWN_TARGETS.iter().map(|target| format!("{}={}", target, level)));
    directives.join(",")
}

/// Install the global subscriber
///
/// Only the first call in a process installs anything; later calls are
/// no-ops, which keeps tests free to call it repeatedly.
pub fn init_telemetry(core: &CoreConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(&core.log_level)));

    let registry = tracing_subscriber::registry().with(filter);

    #[cfg(debug_assertions)]
    let installed = registry
        .with(fmt::layer().pretty().with_target(false))
        .try_init();

    #[cfg(not(debug_assertions))]
    let installed = registry
        .with(fmt::layer().json().with_current_span(true))
        .try_init();

    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives() {
        assert_eq!(
            filter_directives("debug"),
            "warn,beacon_engine=debug,beacon=debug,sdk=debug"
        );
    }

    #[test]
    fn test_filter_directives_parse() {
        for level in ["error", "warn", "info", "debug", "trace"] {
            assert!(EnvFilter::try_new(filter_directives(level)).is_ok());
        }
    }

    #[test]
    fn test_init_twice_is_harmless() {
        let core = CoreConfig::default();
        init_telemetry(&core);
        init_telemetry(&core);
    }
}
