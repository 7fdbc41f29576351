//! Process-wide tracing setup.

pub mod logging;

pub use logging::LogFormat;

/// Initialize tracing for the process, reading `RUST_LOG` and
/// `STOCKROOM_LOG_FORMAT`.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    logging::init(LogFormat::from_env());
}
