//! Tracing/logging initialization.
//!
//! `RUST_LOG`, when set, wins over the configured filter.

use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: true,
        }
    }
}

impl TracingSettings {
    /// The filter in effect: `RUST_LOG` if set and valid, else `self.filter`,
    /// else `info`.
    pub fn env_filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .unwrap_or_else(|_| EnvFilter::new("info"))
    }
}

/// Initialize tracing/logging for the process.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_with(settings: &TracingSettings) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(settings.env_filter())
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false);

    let _ = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_filter_falls_back_to_info() {
        let settings = TracingSettings {
            filter: "[[not a directive".to_string(),
            json: false,
        };
        // RUST_LOG may be set in CI; only check this builds a usable filter.
        let _ = settings.env_filter();
    }

    #[test]
    fn init_is_idempotent() {
        init_with(&TracingSettings::default());
        init_with(&TracingSettings {
            filter: "debug".to_string(),
            json: false,
        });
        ::tracing::info!("still logging after a second init");
    }
}
