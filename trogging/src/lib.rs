//! Log initialization and setup

#![warn(
    clippy::explicit_iter_loop,
    clippy::use_self,
)]

#[cfg(feature = "clap")]
pub mod cli;
pub mod config;

pub use config::*;

use std::cmp::min;
use std::io::{self, Write};
use thiserror::Error;
use tracing::Subscriber;
use tracing_subscriber::{
    fmt::{self, writer::BoxMakeWriter},
    layer::SubscriberExt,
    EnvFilter, Layer, Registry,
};

/// Maximum length of a log line.
/// Space for a final trailing newline if truncated.
///
/// Docker "chunks" log message in 16KB chunks, so lines are cut right below that and kept
/// newline terminated.
const MAX_LINE_LENGTH: usize = 16 * 1024 - 1;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid log filter directive: {0}")]
    InvalidFilter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Cannot set global tracing subscriber")]
    SetGlobalDefaultError(#[from] tracing::dispatcher::SetGlobalDefaultError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

/// Builder for logging.
#[derive(Debug)]
pub struct Builder {
    log_format: LogFormat,
    log_filter: Option<String>,
    // used when log_filter is none.
    default_log_filter: String,
    make_writer: BoxMakeWriter,
    with_target: bool,
    with_ansi: bool,
    with_time: bool,
}

impl Default for Builder {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Full,
            log_filter: None,
            default_log_filter: Self::DEFAULT_LOG_FILTER.to_string(),
            make_writer: make_writer(io::stdout),
            with_target: true,
            with_ansi: true,
            with_time: true,
        }
    }
}

impl Builder {
    pub const DEFAULT_LOG_FILTER: &'static str = "warn";

    pub fn new() -> Self {
        Self::default()
    }

    /// Set log_filter using a simple numeric "verbosity level".
    ///
    /// 0 means, keep existing `log_filter` value.
    pub fn with_log_verbose_count(self, log_verbose_count: u8) -> Self {
        let log_filter = match log_verbose_count {
            0 => self.log_filter,
            1 => Some("info".to_string()),
            2 => Some("debug".to_string()),
            _ => Some("trace".to_string()),
        };
        Self { log_filter, ..self }
    }

    pub fn with_log_filter(self, log_filter: &Option<String>) -> Self {
        Self {
            log_filter: log_filter.clone(),
            ..self
        }
    }

    pub fn with_default_log_filter(self, default_log_filter: impl Into<String>) -> Self {
        Self {
            default_log_filter: default_log_filter.into(),
            ..self
        }
    }

    pub fn with_log_format(self, log_format: LogFormat) -> Self {
        Self { log_format, ..self }
    }

    pub fn with_log_destination(self, log_destination: LogDestination) -> Self {
        let make_writer = match log_destination {
            LogDestination::Stdout => make_writer(io::stdout),
            LogDestination::Stderr => make_writer(io::stderr),
        };
        Self {
            make_writer,
            ..self
        }
    }

    pub fn with_writer<F, W>(self, writer: F) -> Self
    where
        F: Fn() -> W + Send + Sync + 'static,
        W: Write + 'static,
    {
        Self {
            make_writer: make_writer(writer),
            ..self
        }
    }

    /// Sets whether or not an event's target and location are displayed.
    ///
    /// Defaults to true.
    pub fn with_target(self, with_target: bool) -> Self {
        Self {
            with_target,
            ..self
        }
    }

    /// Enable/disable ANSI encoding for formatted events (i.e. colors).
    ///
    /// Defaults to true.
    pub fn with_ansi(self, with_ansi: bool) -> Self {
        Self { with_ansi, ..self }
    }

    /// Enable/disable timestamps on each event.
    ///
    /// Defaults to true.
    pub fn with_time(self, with_time: bool) -> Self {
        Self { with_time, ..self }
    }

    pub fn build(self) -> Result<impl Subscriber + Send + Sync + 'static> {
        let filter = EnvFilter::try_new(
            self.log_filter
                .as_deref()
                .unwrap_or(&self.default_log_filter),
        )?;

        let Self {
            log_format,
            make_writer,
            with_target,
            with_ansi,
            with_time,
            ..
        } = self;

        let layer: BoxedLayer = match log_format {
            LogFormat::Full => {
                let layer = fmt::layer()
                    .with_writer(make_writer)
                    .with_target(with_target)
                    .with_ansi(with_ansi);
                if with_time {
                    layer.boxed()
                } else {
                    layer.without_time().boxed()
                }
            }
            LogFormat::Pretty => {
                let layer = fmt::layer()
                    .pretty()
                    .with_writer(make_writer)
                    .with_target(with_target)
                    .with_ansi(with_ansi);
                if with_time {
                    layer.boxed()
                } else {
                    layer.without_time().boxed()
                }
            }
            LogFormat::Json => {
                let layer = fmt::layer()
                    .json()
                    .with_writer(make_writer)
                    .with_target(with_target)
                    .with_ansi(false);
                if with_time {
                    layer.boxed()
                } else {
                    layer.without_time().boxed()
                }
            }
        };

        Ok(Registry::default().with(layer.with_filter(filter)))
    }

    /// Build a subscriber and install it as a global default subscriber for all threads.
    pub fn install_global(self) -> Result<()> {
        let subscriber = self.build()?;
        tracing::subscriber::set_global_default(subscriber)?;
        Ok(())
    }
}

fn make_writer<F, W>(f: F) -> BoxMakeWriter
where
    F: Fn() -> W + Send + Sync + 'static,
    W: Write + 'static,
{
    BoxMakeWriter::new(move || {
        io::LineWriter::with_capacity(MAX_LINE_LENGTH, LimitedWriter(MAX_LINE_LENGTH, f()))
    })
}

struct LimitedWriter<W: Write>(usize, W);

impl<W: Write> Write for LimitedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let truncated = &buf[..min(self.0, buf.len())];
        let had_trailing_newline = buf[buf.len() - 1] == b'\n';
        if had_trailing_newline && (truncated[truncated.len() - 1] != b'\n') {
            // slow path; copy buffer and append a newline at the end so it still goes out
            // in a single write
            let mut tmp = truncated.to_vec();
            tmp.push(b'\n');
            self.1.write_all(&tmp).map(|_| buf.len())
        } else {
            self.1.write_all(truncated).map(|_| buf.len())
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.1.flush()
    }
}
