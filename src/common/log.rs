//! Logging helpers
//!
//! The proxy emits records through the `log` facade; this module wires the
//! `env_logger` sink used by the binary.

/// Initialize the logging system
///
/// `RUST_LOG` takes precedence over `level`.
///
/// # Parameters
///
/// * `level` - Default log level
pub fn init_logger(level: &str) {
    let env = env_logger::Env::default()
        .filter_or("RUST_LOG", level);

    // A second initialisation (tests, embedding) keeps the first logger
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_millis()
        .try_init();
}
