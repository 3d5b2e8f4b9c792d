//! Logging initialization.

use tracing_subscriber::{EnvFilter, Registry, fmt, prelude::*, reload};

use crate::error::{Error, Result};

/// Filter used when neither `RUST_LOG` nor a configured filter is present.
pub const DEFAULT_LOG_FILTER: &str = "info,forge=debug";

/// Handle for swapping the active filter once the engine config is loaded.
pub struct LogFilterHandle {
    handle: reload::Handle<EnvFilter, Registry>,
    from_env: bool,
}

impl LogFilterHandle {
    /// Replace the active filter with `filter`.
    ///
    /// No-op when the subscriber was configured from `RUST_LOG`.
    pub fn apply(&self, filter: Option<&str>) -> Result<()> {
        if self.from_env {
            return Ok(());
        }
        self.handle
            .reload(build_filter(None, filter))
            .map_err(|e| Error::Config(format!("log filter: {}", e)))
    }
}

/// `env` wins over `configured`, which wins over [`DEFAULT_LOG_FILTER`].
/// Directives that fail to parse fall through to the next source.
fn build_filter(env: Option<&str>, configured: Option<&str>) -> EnvFilter {
    env.and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| configured.and_then(|directives| EnvFilter::try_new(directives).ok()))
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins over `filter`, which wins over [`DEFAULT_LOG_FILTER`].
/// Returns `None` if a global subscriber was already installed.
///
/// # Example
/// ```
/// let logging = forge_core::init_logging(None);
/// tracing::info!("engine starting");
/// if let Some(logging) = logging {
///     logging.apply(Some("warn")).unwrap();
/// }
/// ```
pub fn init_logging(filter: Option<&str>) -> Option<LogFilterHandle> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let from_env = env
        .as_deref()
        .is_some_and(|directives| EnvFilter::try_new(directives).is_ok());
    let (filter, handle) = reload::Layer::new(build_filter(env.as_deref(), filter));

    // A second call (tests, embedding) keeps the first subscriber.
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .try_init()
        .ok()?;

    Some(LogFilterHandle { handle, from_env })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_filter_wins() {
        let filter = build_filter(Some("trace"), Some("warn"));
        assert_eq!(filter.to_string(), "trace");
    }

    #[test]
    fn test_configured_filter_used_without_env() {
        let filter = build_filter(None, Some("warn"));
        assert_eq!(filter.to_string(), "warn");
    }

    #[test]
    fn test_bad_configured_filter_falls_back_to_default() {
        let filter = build_filter(None, Some("forge=loudest"));
        assert!(filter.to_string().contains("forge=debug"));
    }

    #[test]
    fn test_bad_env_filter_uses_configured() {
        let filter = build_filter(Some("forge=loudest"), Some("error"));
        assert_eq!(filter.to_string(), "error");
    }
}
