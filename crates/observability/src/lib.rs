//! Tracing and logging setup shared by ledger binaries and tests.

/// Initialize process-wide tracing with default settings.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init_with(&tracing::TracingSettings::default());
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use tracing::{TracingSettings, init_with};
