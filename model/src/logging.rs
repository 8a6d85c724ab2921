//! Console logging setup.

use clap::Args;
use strum::{Display, EnumString};
use tracing_subscriber::EnvFilter;

/// How much the tool reports on the console.
#[derive(Clone, Copy, Debug, Default, Display, EnumString, PartialEq, Eq, PartialOrd, Ord)]
#[strum(serialize_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[default]
    Warning,
    Error,
}

impl LogLevel {
    fn directive(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

/// Logging flags accepted by every command.
#[derive(Clone, Debug, Default, Args)]
pub struct LoggingOptions {
    /// Enable debug logging (log level: debug).
    #[clap(long, env = "GDVIZ_DEBUG")]
    pub debug: bool,

    /// Enable verbose logging (log level: info).
    #[clap(long, env = "GDVIZ_VERBOSE")]
    pub verbose: bool,

    /// Only log errors (log level: error).
    #[clap(long, env = "GDVIZ_QUIET")]
    pub quiet: bool,
}

impl LoggingOptions {
    /// The console log level selected by these flags.
    ///
    /// `--quiet` wins over `--verbose`, which wins over `--debug`.
    pub fn level(&self) -> LogLevel {
        if self.quiet {
            LogLevel::Error
        } else if self.verbose {
            LogLevel::Info
        } else if self.debug {
            LogLevel::Debug
        } else {
            LogLevel::Warning
        }
    }
}

/// Install a console subscriber logging at `level`.
///
/// If `RUST_LOG` is set it takes precedence over `level`. Calling this more than once is a no-op.
pub fn init_logging(level: LogLevel) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.directive()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_level_precedence() {
        let flags = |debug, verbose, quiet| LoggingOptions {
            debug,
            verbose,
            quiet,
        };
        assert_eq!(flags(false, false, false).level(), LogLevel::Warning);
        assert_eq!(flags(true, false, false).level(), LogLevel::Debug);
        assert_eq!(flags(true, true, false).level(), LogLevel::Info);
        assert_eq!(flags(true, true, true).level(), LogLevel::Error);
        assert_eq!(flags(false, false, true).level(), LogLevel::Error);
    }

    #[test]
    fn test_level_names() {
        assert_eq!(LogLevel::Warning.to_string(), "warning");
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
    }
}
