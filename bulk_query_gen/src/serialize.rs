//! Rendering filled queries for benchmark clients.

use crate::query::Query;
use snafu::{ResultExt, Snafu};
use std::io::{self, Write};

/// Errors that may happen while writing queries out
#[derive(Snafu, Debug)]
pub enum Error {
    /// Error that may happen when writing to the underlying writer
    #[snafu(display("Could not write query: {}", source))]
    Io {
        /// Underlying IO error
        source: io::Error,
    },

    /// Error that may happen when encoding a query as JSON
    #[snafu(display("Could not serialize query as JSON: {}", source))]
    Json {
        /// Underlying `serde_json` error
        source: serde_json::Error,
    },
}

/// Result type for query output
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// How queries are written out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// The query's human readable rendering, one per line
    Text,
}

/// Anything that accepts a stream of filled queries.
///
/// The query is only borrowed: once `write_query` returns, the generator recycles it.
pub trait QuerySink<Q: Query>: Send {
    /// Take one query
    fn write_query(&mut self, q: &Q) -> Result<()>;

    /// Called once after the last query
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writes queries line by line to any [`Write`].
#[derive(Debug)]
pub struct QueryWriter<W> {
    out: W,
    format: OutputFormat,
    written: u64,
}

impl<W: Write> QueryWriter<W> {
    /// Wrap `out`. Pass a buffered writer for anything but in memory targets.
    pub fn new(out: W, format: OutputFormat) -> Self {
        Self {
            out,
            format,
            written: 0,
        }
    }

    /// Number of queries written so far
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Give back the wrapped writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<Q, W> QuerySink<Q> for QueryWriter<W>
where
    Q: Query,
    W: Write + Send,
{
    fn write_query(&mut self, q: &Q) -> Result<()> {
        match self.format {
            OutputFormat::Json => serde_json::to_writer(&mut self.out, q).context(JsonSnafu)?,
            OutputFormat::Text => write!(self.out, "{q}").context(IoSnafu)?,
        }
        self.out.write_all(b"\n").context(IoSnafu)?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.out.flush().context(IoSnafu)
    }
}
