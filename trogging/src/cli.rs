//! Common CLI flags for logging
use crate::{config::*, Builder, Result};

/// CLI config for the logging related subset of options.
#[derive(Debug, clap::Parser, Clone)]
pub struct LoggingConfig {
    /// Logs: filter directive
    ///
    /// Configures log severity level filter, by target.
    ///
    /// Simplest options: error, warn, info, debug, trace
    ///
    /// Levels for different modules can be specified. For example
    /// `debug,bulk_query_gen::pool=info` specifies debug logging for all modules
    /// except for the `bulk_query_gen::pool` module which will only display info
    /// level logging.
    ///
    /// Overridden by `-v`.
    #[clap(long = "log-filter", env = "LOG_FILTER", action)]
    pub log_filter: Option<String>,

    /// Logs: filter short-hand
    ///
    /// Convenient way to set log severity level filter.
    /// Overrides `--log-filter`.
    ///
    /// -v   'info'
    ///
    /// -vv  'debug'
    ///
    /// -vvv 'trace'
    #[clap(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub log_verbose_count: u8,

    /// Logs: destination
    ///
    /// Can be one of: stdout, stderr
    #[clap(
        long = "log-destination",
        env = "LOG_DESTINATION",
        default_value = "stderr",
        action
    )]
    pub log_destination: LogDestination,

    /// Logs: message format
    ///
    /// Can be one of: full, pretty, json
    #[clap(
        long = "log-format",
        env = "LOG_FORMAT",
        default_value = "full",
        action
    )]
    pub log_format: LogFormat,
}

impl LoggingConfig {
    pub fn to_builder(&self) -> Builder {
        self.with_builder(Builder::new())
    }

    pub fn with_builder(&self, builder: Builder) -> Builder {
        builder
            .with_log_filter(&self.log_filter)
            // with_verbose_count goes after with_log_filter because our CLI flag state
            // that --v overrides --log-filter.
            .with_log_verbose_count(self.log_verbose_count)
            .with_log_destination(self.log_destination)
            .with_log_format(self.log_format)
    }

    pub fn install_global_subscriber(&self) -> Result<()> {
        self.to_builder().install_global()
    }
}
