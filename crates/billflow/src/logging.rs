//! Logging and tracing initialization for embedding applications.
//!
//! The database and worker layers emit through `log`, everything else
//! through `tracing`; the bridge routes both into one subscriber. Calling
//! `init` more than once is harmless.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `RUST_LOG` overrides the `info` default.
/// With `json_output` set, events are emitted as JSON lines for collectors.
pub fn init(json_output: bool) {
    // Already-installed logger or subscriber means another init won; keep it.
    let _ = tracing_log::LogTracer::init();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json_output {
        let subscriber = tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    } else {
        let subscriber = tracing_subscriber::fmt().with_env_filter(filter).finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}
