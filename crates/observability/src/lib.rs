//! Process-wide tracing setup shared by the autoblog binaries.

/// Tracing subscriber configuration.
pub mod tracing;

pub use crate::tracing::{LogConfig, LogFormat};

/// Initialize process-wide tracing with `config`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(config: &LogConfig) {
    tracing::init(config);
}
