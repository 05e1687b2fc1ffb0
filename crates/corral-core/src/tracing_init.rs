//! Logging bootstrap for the corral binaries.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;

/// Output shape of the log stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines for interactive use.
    Text,
    /// One JSON object per line, for log aggregation.
    Json,
}

impl LogFormat {
    /// Map the binaries' `--log-json` switch onto a format.
    pub const fn from_json_flag(json: bool) -> Self {
        if json { Self::Json } else { Self::Text }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins when set; `default_filter` covers the common case of
/// running a binary with no environment prepared (e.g. `"corral_cloud=info"`).
pub fn init_tracing(default_filter: &str, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let builder = fmt().with_env_filter(filter);
    match format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Text => builder.init(),
    }
}
