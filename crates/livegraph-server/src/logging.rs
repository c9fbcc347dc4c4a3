//! Tracing initialization.

use std::sync::Once;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static INIT: Once = Once::new();

/// Environment variable holding the log filter, e.g.
/// `LIVEGRAPH_LOG=livegraph_server=debug,livegraph=trace`.
pub const LOG_ENV: &str = "LIVEGRAPH_LOG";

/// Matches both `livegraph` and `livegraph_server` targets.
pub const DEFAULT_FILTER: &str = "livegraph=info";

/// Install the global subscriber. Safe to call more than once; only the
/// first call has an effect.
///
/// `filter` is the resolved `[log] filter` setting. Without one the
/// environment is read, then [`DEFAULT_FILTER`] applies.
pub fn init_tracing(filter: Option<&str>) {
    INIT.call_once(|| {
        let filter = filter
            .and_then(|f| EnvFilter::try_new(f).ok())
            .or_else(|| EnvFilter::try_from_env(LOG_ENV).ok())
            .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER));

        tracing_subscriber::registry()
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .with(filter)
            .init();
    });
}
