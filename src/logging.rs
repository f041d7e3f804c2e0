//! Logger initialisation.

use std::io::Write;

use chrono::Local;
use env_logger::Builder;
use log::LevelFilter;

/// Installs `env_logger` at `level`. `RUST_LOG` overrides the default; the BLE stack is capped at `Info`.
///
/// Calling this when a logger is already installed reports on stderr and does nothing else.
pub fn init(level: LevelFilter) {
    let mut builder = Builder::new();
    builder
        .filter_level(level)
        .filter_module("bluest", LevelFilter::Info.min(level))
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {}: {}",
                Local::now().to_rfc3339(),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .parse_default_env();

    if let Err(e) = builder.try_init() {
        eprintln!("Failed to initialise logger: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice_is_harmless() {
        init(LevelFilter::Debug);
        init(LevelFilter::Info);
        log::debug!("still logging");
    }
}
