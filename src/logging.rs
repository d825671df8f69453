//! Logger façade (C2): one sink per process, chosen by `log.filename`.
//!
//! Built on `env_logger` over the `log` facade, the same layering the rest
//! of this codebase's binaries use. Log sites that fire before `init()` or
//! after the process has begun teardown are no-ops by construction: the
//! `log` macros check an internal "is a logger installed" flag themselves,
//! so there's nothing extra to guard here.

use std::fs::OpenOptions;
use std::io::Write;

use log::LevelFilter;

use crate::config::LogConfig;

/// Maps the config's integer severity (trace=0 .. critical=5) onto a
/// `log::LevelFilter`. `critical` has no dedicated level in the `log` crate;
/// call sites log it at `Error` with a `critical: ` prefix instead.
fn level_filter(level: i64) -> LevelFilter {
    match level {
        i64::MIN..=0 => LevelFilter::Trace,
        1 => LevelFilter::Debug,
        2 => LevelFilter::Info,
        3 => LevelFilter::Warn,
        4..=5 => LevelFilter::Error,
        _ => LevelFilter::Info,
    }
}

/// Initializes the process-wide logger from config. Idempotent calls beyond
/// the first are ignored by `env_logger`'s builder, matching "one sink per
/// process".
pub fn init(cfg: &LogConfig) {
    let filter = level_filter(cfg.level);
    let mut builder = env_logger::Builder::new();
    builder.filter_level(filter);

    if let Some(pattern) = &cfg.pattern {
        let pattern = pattern.clone();
        builder.format(move |buf, record| {
            let line = pattern
                .replace("%level%", &record.level().to_string())
                .replace("%target%", record.target())
                .replace("%message%", &record.args().to_string());
            writeln!(buf, "{line}")
        });
    }

    match cfg.filename.as_str() {
        "stdout" => {
            builder.target(env_logger::Target::Stdout);
        }
        "stderr" => {
            builder.target(env_logger::Target::Stderr);
        }
        path => match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => {
                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
            Err(e) => {
                eprintln!("critical: failed to open log file '{path}': {e}; falling back to stderr");
                builder.target(env_logger::Target::Stderr);
            }
        },
    }

    let _ = builder.try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_filter_boundaries() {
        assert_eq!(level_filter(0), LevelFilter::Trace);
        assert_eq!(level_filter(1), LevelFilter::Debug);
        assert_eq!(level_filter(2), LevelFilter::Info);
        assert_eq!(level_filter(3), LevelFilter::Warn);
        assert_eq!(level_filter(4), LevelFilter::Error);
        assert_eq!(level_filter(5), LevelFilter::Error);
    }
}
