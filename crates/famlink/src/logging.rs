//! Stderr diagnostics for the CLI.
//!
//! `--log-level` scopes the workspace crates only; everything else stays at
//! `warn`. A non-empty `FAMLINK_LOG` replaces the computed filter with its own
//! directives, e.g. `FAMLINK_LOG=famlink_peer=trace`.

use clap::ValueEnum;
use tracing_subscriber::EnvFilter;

/// Environment variable holding a full filter override.
pub const LOG_ENV: &str = "FAMLINK_LOG";

/// Targets that follow `--log-level`.
const FAMLINK_TARGETS: [&str; 5] = [
    "famlink",
    "famlink_transport",
    "famlink_frame",
    "famlink_schema",
    "famlink_peer",
];

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn as_directive(self) -> &'static str {
        match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }
}

/// Directives for `level`: the famlink crates at `level`, dependencies no
/// louder than `warn`.
pub fn default_directives(level: LogLevel) -> String {
    let base = match level {
        LogLevel::Error => "error",
        _ => "warn",
    };
    let mut directives = String::from(base);
    for target in FAMLINK_TARGETS {
        directives.push(',');
        directives.push_str(target);
        directives.push('=');
        directives.push_str(level.as_directive());
    }
    directives
}

/// An override that does not parse is reported and ignored.
pub fn build_filter(level: LogLevel, env_override: Option<&str>) -> EnvFilter {
    let fallback = || EnvFilter::new(default_directives(level));
    match env_override.map(str::trim).filter(|spec| !spec.is_empty()) {
        Some(spec) => EnvFilter::try_new(spec).unwrap_or_else(|err| {
            eprintln!("famlink: ignoring {LOG_ENV}={spec}: {err}");
            fallback()
        }),
        None => fallback(),
    }
}

/// Install the stderr subscriber. A second call is a no-op.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let env_override = std::env::var(LOG_ENV).ok();
    let filter = build_filter(level, env_override.as_deref());
    let verbose = matches!(level, LogLevel::Debug | LogLevel::Trace);

    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(verbose);

    let _ = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_scopes_workspace_crates() {
        let directives = default_directives(LogLevel::Debug);
        assert!(directives.starts_with("warn,"));
        for target in FAMLINK_TARGETS {
            assert!(directives.contains(&format!("{target}=debug")), "{directives}");
        }
    }

    #[test]
    fn error_level_quiets_dependencies_too() {
        assert!(default_directives(LogLevel::Error).starts_with("error,famlink=error"));
    }

    #[test]
    fn env_override_replaces_defaults() {
        let filter = build_filter(LogLevel::Info, Some("famlink_peer=trace")).to_string();
        assert!(filter.contains("famlink_peer=trace"), "{filter}");
        assert!(!filter.contains("famlink_frame"), "{filter}");
    }

    #[test]
    fn blank_or_invalid_override_falls_back() {
        for spec in [None, Some(""), Some("   "), Some("famlink=loudest")] {
            let filter = build_filter(LogLevel::Info, spec).to_string();
            assert!(filter.contains("famlink_frame=info"), "{spec:?}: {filter}");
        }
    }
}
