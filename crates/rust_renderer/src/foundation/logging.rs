//! Logging setup

pub use log::{debug, error, info, trace, warn};

/// Initialize `env_logger`, using `default_level` unless `RUST_LOG` overrides it
///
/// Safe to call more than once; later calls are ignored.
pub fn init(default_level: log::LevelFilter) {
    let mut builder = env_logger::Builder::from_default_env();
    if std::env::var_os("RUST_LOG").is_none() {
        builder.filter_level(default_level);
    }
    let _ = builder.format_timestamp_millis().try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_is_harmless() {
        init(log::LevelFilter::Debug);
        init(log::LevelFilter::Info);
        info!("logging initialised twice");
    }
}
