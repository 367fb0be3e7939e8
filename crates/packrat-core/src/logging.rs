//! Logger initialisation for packrat binaries.

use env_logger::Env;

/// Initialise the process-wide logger.
///
/// `PACKRAT_LOG` overrides the default filter; repeated calls are harmless so
/// tests can initialise freely.
pub fn init(default_level: &str) {
    let env = Env::default().filter_or("PACKRAT_LOG", default_level);
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp_secs()
        .try_init();
}
