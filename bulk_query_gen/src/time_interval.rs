//! The benchmark time span, and uniformly random windows inside of it.

use chrono::{DateTime, SecondsFormat, TimeDelta, Utc};
use rand::Rng;
use snafu::{ensure, OptionExt, Snafu};
use std::{fmt, time::Duration};

/// Errors that may happen while building or sampling a [`TimeInterval`]
#[derive(Snafu, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The start of an interval was not strictly before its end
    #[snafu(display("bad time order: start {start} is not before end {end}"))]
    BadTimeOrder {
        /// Requested start
        start: DateTime<Utc>,
        /// Requested end
        end: DateTime<Utc>,
    },

    /// The interval is too wide to be addressed in nanoseconds
    #[snafu(display("interval from {start} to {end} does not fit in i64 nanoseconds"))]
    SpanTooLarge {
        /// Requested start
        start: DateTime<Utc>,
        /// Requested end
        end: DateTime<Utc>,
    },

    /// A random window was requested that is wider than the whole interval
    #[snafu(display(
        "window of {} exceeds the {} benchmark interval",
        humantime::format_duration(*window),
        humantime::format_duration(*span)
    ))]
    WindowExceedsInterval {
        /// Requested window width
        window: Duration,
        /// Width of the whole interval
        span: Duration,
    },
}

/// Result type for interval operations
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A half-open `[start, end)` span of time.
///
/// Intervals built with [`TimeInterval::new`] are never empty. Windows drawn by
/// [`TimeInterval::rand_window`] are exactly as wide as requested, zero included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeInterval {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl TimeInterval {
    /// Create an interval, failing unless `start` is strictly before `end`.
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        ensure!(start < end, BadTimeOrderSnafu { start, end });
        ensure!(
            (end - start).num_nanoseconds().is_some(),
            SpanTooLargeSnafu { start, end }
        );
        Ok(Self { start, end })
    }

    /// Inclusive start of the interval
    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    /// Exclusive end of the interval
    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    /// Width of the interval
    pub fn duration(&self) -> Duration {
        (self.end - self.start)
            .to_std()
            .expect("start is before end")
    }

    /// The start formatted as RFC3339 with whole seconds, e.g. `2016-01-01T00:00:00Z`.
    pub fn start_string(&self) -> impl fmt::Display {
        Rfc3339(self.start)
    }

    /// The end formatted as RFC3339 with whole seconds.
    pub fn end_string(&self) -> impl fmt::Display {
        Rfc3339(self.end)
    }

    /// True if `other` lies entirely within this interval.
    pub fn contains(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Pick a window of exactly `window` width whose start is uniformly distributed over
    /// `[start, end - window]`.
    ///
    /// Asking for a window wider than the interval is a configuration error and is never
    /// clamped.
    pub fn rand_window<R>(&self, window: Duration, rng: &mut R) -> Result<Self>
    where
        R: Rng + ?Sized,
    {
        let span = self.duration();
        ensure!(window <= span, WindowExceedsIntervalSnafu { window, span });

        // both fit in i64 nanoseconds because window <= span
        let span_ns = (self.end - self.start)
            .num_nanoseconds()
            .context(SpanTooLargeSnafu {
                start: self.start,
                end: self.end,
            })?;
        let window_ns = window.as_nanos() as i64;

        let offset = rng.gen_range(0..=span_ns - window_ns);
        let start = self.start + TimeDelta::nanoseconds(offset);

        Ok(Self {
            start,
            end: start + TimeDelta::nanoseconds(window_ns),
        })
    }
}

impl fmt::Display for TimeInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {})", Rfc3339(self.start), Rfc3339(self.end))
    }
}

struct Rfc3339(DateTime<Utc>);

impl fmt::Display for Rfc3339 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}
