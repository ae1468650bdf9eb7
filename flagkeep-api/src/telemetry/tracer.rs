//! Tracing subscriber initialization.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Lookup;
use crate::error::{ApiError, ApiResult};

/// Filter used when neither `RUST_LOG` nor `FLAGKEEP_LOG` is set.
pub const DEFAULT_FILTER: &str = "flagkeep_api=debug,flagkeep_storage=debug,tower_http=debug,info";

/// Log output settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
    /// Explicit filter directives; overrides `RUST_LOG`
    pub filter: Option<String>,
}

impl TelemetryConfig {
    /// Reads `FLAGKEEP_LOG_FORMAT` (`json` or anything else for pretty) and
    /// `FLAGKEEP_LOG`. Unrecognized formats fall back to pretty output.
    pub fn from_lookup(lookup: Lookup<'_>) -> Self {
        let json = lookup("FLAGKEEP_LOG_FORMAT")
            .map(|format| format.trim().eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let filter = lookup("FLAGKEEP_LOG").filter(|f| !f.trim().is_empty());
        Self { json, filter }
    }

    fn env_filter(&self) -> EnvFilter {
        match &self.filter {
            Some(directives) => EnvFilter::try_new(directives)
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
            None => EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Call once at startup, before anything logs. A second call fails because
/// the global default is already set.
pub fn init_tracing(config: &TelemetryConfig) -> ApiResult<()> {
    let registry = tracing_subscriber::registry().with(config.env_filter());

    let result = if config.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    result.map_err(|e| ApiError::internal_error(format!("Failed to init subscriber: {}", e)))?;

    tracing::info!(json = config.json, "Telemetry initialized");
    Ok(())
}
