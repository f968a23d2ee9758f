//! Tracing subscriber setup.

use std::env;
use std::io::{self, IsTerminal};

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

/// Resolved logging options (CLI flags applied over the config file).
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter level for our own targets, e.g. "info" or "debug". `None` disables logging.
    pub level: Option<String>,
    pub format: LogFormat,
    pub color: ColorChoice,
    /// Include target, file and line in pretty output.
    pub diagnostics: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ColorChoice {
    #[default]
    Auto,
    Always,
    Never,
}

/// Verbosity flags from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct Verbosity {
    pub quiet: bool,
    /// Number of `-v` flags.
    pub verbose: u8,
    pub debug: bool,
    pub trace: bool,
}

impl Verbosity {
    /// Level the flags ask for, or `configured` when none is given. `None`
    /// means logging is disabled.
    pub fn level(&self, configured: &str) -> Option<String> {
        if self.quiet {
            return None;
        }
        let level = if self.trace {
            "trace"
        } else if self.debug {
            "debug"
        } else {
            match self.verbose {
                0 => configured,
                1 => "debug",
                _ => "trace",
            }
        };
        Some(level.to_string())
    }
}

/// Install the global subscriber. `RUST_LOG` takes precedence over `opts.level`.
///
/// Records emitted through the `log` facade are bridged by tracing-subscriber.
pub fn init(opts: &LogOptions) {
    let Some(level) = opts.level.as_deref() else {
        return;
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    match opts.format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(io::stderr),
                )
                .try_init()
                .ok();
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(io::stderr)
                        .with_ansi(use_color(opts.color))
                        .with_target(opts.diagnostics)
                        .with_file(opts.diagnostics)
                        .with_line_number(opts.diagnostics),
                )
                .try_init()
                .ok();
        }
    }
}

fn default_directives(level: &str) -> String {
    format!("termrelay={level},tower_http={level}")
}

fn use_color(choice: ColorChoice) -> bool {
    let force = choice == ColorChoice::Always || env::var_os("FORCE_COLOR").is_some();
    let disable = choice == ColorChoice::Never
        || env::var_os("NO_COLOR").is_some()
        || (!force && !io::stderr().is_terminal());
    !disable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives_cover_http_layer() {
        assert_eq!(
            default_directives("debug"),
            "termrelay=debug,tower_http=debug"
        );
    }

    #[test]
    fn test_verbosity_levels() {
        let flags = |verbose, debug, trace| Verbosity {
            quiet: false,
            verbose,
            debug,
            trace,
        };
        assert_eq!(flags(0, false, false).level("warn").as_deref(), Some("warn"));
        assert_eq!(flags(1, false, false).level("info").as_deref(), Some("debug"));
        assert_eq!(flags(2, false, false).level("info").as_deref(), Some("trace"));
        assert_eq!(flags(0, true, false).level("info").as_deref(), Some("debug"));
        assert_eq!(flags(1, true, true).level("info").as_deref(), Some("trace"));
    }

    #[test]
    fn test_quiet_disables_logging() {
        let quiet = Verbosity {
            quiet: true,
            trace: true,
            ..Verbosity::default()
        };
        assert_eq!(quiet.level("info"), None);
    }

    #[test]
    fn test_never_disables_color() {
        assert!(!use_color(ColorChoice::Never));
    }
}
