//! The devops use case: CPU queries over a fleet of simulated hosts.
//!
//! Every dialect implements the same catalog of query shapes ([`DevopsQueryType`]), which
//! is what makes the generators interchangeable behind a
//! [`Dispatcher`](crate::dispatch::Dispatcher).

use crate::{
    host_sampler,
    query::{Dialect, Query},
    time_interval::{self, TimeInterval},
};
use rand::Rng;
use snafu::{ensure, Snafu};
use std::{fmt, str::FromStr, time::Duration};

pub mod cassandra;
pub mod influx;

pub use cassandra::CassandraDevops;
pub use influx::InfluxDevops;

pub(crate) const MINUTE: Duration = Duration::from_secs(60);
pub(crate) const HOUR: Duration = Duration::from_secs(60 * 60);
pub(crate) const DAY: Duration = Duration::from_secs(24 * 60 * 60);

/// Errors that may happen while filling devops queries
#[derive(Snafu, Debug, Clone, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    /// The catalog entry exists but has no query shape behind it yet
    #[snafu(display("{dialect} does not support the `{query_type}` query type yet"))]
    Unsupported {
        /// The requested catalog entry
        query_type: DevopsQueryType,
        /// The generator that was asked
        dialect: Dialect,
    },

    /// The generator was built with an unusable time range
    #[snafu(display("Could not create {dialect} generator: {source}"))]
    InvalidTimeRange {
        /// The generator being built
        dialect: Dialect,
        /// Underlying `time_interval` error
        source: time_interval::Error,
    },

    /// The query window could not be placed in the benchmark interval
    #[snafu(display("Could not pick a window for `{query_type}`: {source}"))]
    Window {
        /// The catalog entry being filled
        query_type: DevopsQueryType,
        /// Underlying `time_interval` error
        source: time_interval::Error,
    },

    /// The fleet is too small for the query
    #[snafu(display("Could not pick hosts for `{query_type}`: {source}"))]
    Hosts {
        /// The catalog entry being filled
        query_type: DevopsQueryType,
        /// Underlying `host_sampler` error
        source: host_sampler::Error,
    },

    /// A fleet needs at least one host
    #[snafu(display("scale var must be at least 1"))]
    ZeroScaleVar,

    /// A query type name that is not in the catalog
    #[snafu(display(
        "Unknown query type `{name}`, expected `all` or one of: {}",
        DevopsQueryType::names().join(", ")
    ))]
    UnknownQueryType {
        /// The name that was asked for
        name: String,
    },
}

impl Error {
    /// True for the non fatal "not yet supported" marker; drivers skip these and carry on.
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::Unsupported { .. })
    }
}

/// Result type for devops query generation
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The catalog of devops query shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DevopsQueryType {
    /// max cpu of 1 random host over a random hour, by minute
    MaxCpuUsageHourByMinuteOneHost,
    /// max cpu of 2 random hosts over a random hour, by minute
    MaxCpuUsageHourByMinuteTwoHosts,
    /// max cpu of 4 random hosts over a random hour, by minute
    MaxCpuUsageHourByMinuteFourHosts,
    /// max cpu of 8 random hosts over a random hour, by minute
    MaxCpuUsageHourByMinuteEightHosts,
    /// max cpu of 16 random hosts over a random hour, by minute
    MaxCpuUsageHourByMinuteSixteenHosts,
    /// max cpu of 32 random hosts over a random hour, by minute
    MaxCpuUsageHourByMinuteThirtyTwoHosts,
    /// max cpu of 1 random host over a random 12 hours, by minute
    MaxCpuUsage12HoursByMinuteOneHost,
    /// Placeholder without a defined shape; filling it always fails with
    /// [`Error::Unsupported`].
    MaxCpuUsageDayByHour,
    /// mean cpu of the whole fleet over a random day, by hour and host
    MeanCpuUsageDayByHourAllHostsGroupbyHost,
}

impl DevopsQueryType {
    /// Every catalog entry, in catalog order
    pub const ALL: [Self; 9] = [
        Self::MaxCpuUsageHourByMinuteOneHost,
        Self::MaxCpuUsageHourByMinuteTwoHosts,
        Self::MaxCpuUsageHourByMinuteFourHosts,
        Self::MaxCpuUsageHourByMinuteEightHosts,
        Self::MaxCpuUsageHourByMinuteSixteenHosts,
        Self::MaxCpuUsageHourByMinuteThirtyTwoHosts,
        Self::MaxCpuUsage12HoursByMinuteOneHost,
        Self::MaxCpuUsageDayByHour,
        Self::MeanCpuUsageDayByHourAllHostsGroupbyHost,
    ];

    /// The one hour, N host entries the `all` mix cycles through
    const HOUR_BY_MINUTE: [Self; 6] = [
        Self::MaxCpuUsageHourByMinuteOneHost,
        Self::MaxCpuUsageHourByMinuteTwoHosts,
        Self::MaxCpuUsageHourByMinuteFourHosts,
        Self::MaxCpuUsageHourByMinuteEightHosts,
        Self::MaxCpuUsageHourByMinuteSixteenHosts,
        Self::MaxCpuUsageHourByMinuteThirtyTwoHosts,
    ];

    /// The name used to select this entry on the command line
    pub fn name(&self) -> &'static str {
        match self {
            Self::MaxCpuUsageHourByMinuteOneHost => "1-host-1-hr",
            Self::MaxCpuUsageHourByMinuteTwoHosts => "2-host-1-hr",
            Self::MaxCpuUsageHourByMinuteFourHosts => "4-host-1-hr",
            Self::MaxCpuUsageHourByMinuteEightHosts => "8-host-1-hr",
            Self::MaxCpuUsageHourByMinuteSixteenHosts => "16-host-1-hr",
            Self::MaxCpuUsageHourByMinuteThirtyTwoHosts => "32-host-1-hr",
            Self::MaxCpuUsage12HoursByMinuteOneHost => "1-host-12-hr",
            Self::MaxCpuUsageDayByHour => "max-cpu-day-by-hour",
            Self::MeanCpuUsageDayByHourAllHostsGroupbyHost => "groupby",
        }
    }

    /// Names of every catalog entry
    pub fn names() -> Vec<&'static str> {
        Self::ALL.iter().map(Self::name).collect()
    }

    /// How many random hosts the query filters on; `None` for whole fleet queries and
    /// placeholders.
    pub fn host_count(&self) -> Option<usize> {
        match self {
            Self::MaxCpuUsageHourByMinuteOneHost | Self::MaxCpuUsage12HoursByMinuteOneHost => {
                Some(1)
            }
            Self::MaxCpuUsageHourByMinuteTwoHosts => Some(2),
            Self::MaxCpuUsageHourByMinuteFourHosts => Some(4),
            Self::MaxCpuUsageHourByMinuteEightHosts => Some(8),
            Self::MaxCpuUsageHourByMinuteSixteenHosts => Some(16),
            Self::MaxCpuUsageHourByMinuteThirtyTwoHosts => Some(32),
            Self::MaxCpuUsageDayByHour | Self::MeanCpuUsageDayByHourAllHostsGroupbyHost => None,
        }
    }

    /// The mix used when every devops query is requested: the one hour, N host entries
    /// that a fleet of `scale_var` hosts can serve.
    pub fn dispatch_all(scale_var: usize) -> Result<Vec<Self>> {
        ensure!(scale_var > 0, ZeroScaleVarSnafu);
        Ok(Self::HOUR_BY_MINUTE
            .into_iter()
            .filter(|t| t.host_count().is_some_and(|n| n <= scale_var))
            .collect())
    }

    /// Resolve a command line selection. `all` expands to [`Self::dispatch_all`].
    pub fn parse_selection(name: &str, scale_var: usize) -> Result<Vec<Self>> {
        if name == "all" {
            Self::dispatch_all(scale_var)
        } else {
            Ok(vec![name.parse()?])
        }
    }
}

impl fmt::Display for DevopsQueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DevopsQueryType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|t| t.name() == s)
            .ok_or_else(|| Error::UnknownQueryType { name: s.into() })
    }
}

/// A dialect's implementation of the devops catalog.
///
/// Generators hold only the target name and the benchmark interval; all randomness comes
/// from the `rng` each call is handed, so one generator can be shared by any number of
/// workers that each own their rng.
pub trait Devops: fmt::Debug + Send + Sync + 'static {
    /// The query type this dialect fills
    type Query: Query;

    /// The whole benchmark interval windows are drawn from
    fn interval(&self) -> &TimeInterval;

    /// `max(usage_user)` of `nhosts` random hosts over a random `window`, by minute.
    fn max_cpu_usage_hour_by_minute_n_hosts<R>(
        &self,
        q: &mut Self::Query,
        rng: &mut R,
        query_type: DevopsQueryType,
        scale_var: usize,
        nhosts: usize,
        window: Duration,
    ) -> Result<()>
    where
        R: Rng + ?Sized;

    /// `mean(usage_user)` of the whole fleet over a random day, by hour and host.
    fn mean_cpu_usage_day_by_hour_all_hosts_group_by_host<R>(
        &self,
        q: &mut Self::Query,
        rng: &mut R,
    ) -> Result<()>
    where
        R: Rng + ?Sized;

    /// Not implemented by any dialect.
    fn max_cpu_usage_day_by_hour<R>(
        &self,
        _q: &mut Self::Query,
        _rng: &mut R,
        _scale_var: usize,
    ) -> Result<()>
    where
        R: Rng + ?Sized,
    {
        UnsupportedSnafu {
            query_type: DevopsQueryType::MaxCpuUsageDayByHour,
            dialect: <Self::Query as Query>::DIALECT,
        }
        .fail()
    }

    /// Fill `q` with the shape named by `query_type`.
    fn fill<R>(
        &self,
        query_type: DevopsQueryType,
        q: &mut Self::Query,
        rng: &mut R,
        scale_var: usize,
    ) -> Result<()>
    where
        R: Rng + ?Sized,
    {
        use DevopsQueryType::*;

        ensure!(scale_var > 0, ZeroScaleVarSnafu);
        match query_type {
            MaxCpuUsageHourByMinuteOneHost
            | MaxCpuUsageHourByMinuteTwoHosts
            | MaxCpuUsageHourByMinuteFourHosts
            | MaxCpuUsageHourByMinuteEightHosts
            | MaxCpuUsageHourByMinuteSixteenHosts
            | MaxCpuUsageHourByMinuteThirtyTwoHosts => {
                let nhosts = query_type.host_count().unwrap_or(1);
                self.max_cpu_usage_hour_by_minute_n_hosts(
                    q, rng, query_type, scale_var, nhosts, HOUR,
                )
            }
            MaxCpuUsage12HoursByMinuteOneHost => self.max_cpu_usage_hour_by_minute_n_hosts(
                q,
                rng,
                query_type,
                scale_var,
                1,
                12 * HOUR,
            ),
            MaxCpuUsageDayByHour => self.max_cpu_usage_day_by_hour(q, rng, scale_var),
            MeanCpuUsageDayByHourAllHostsGroupbyHost => {
                self.mean_cpu_usage_day_by_hour_all_hosts_group_by_host(q, rng)
            }
        }
    }
}

/// Label for the N host max cpu shapes, e.g. `Influx max cpu, rand    4 hosts, rand 1h0m0s by 1m`.
pub(crate) fn max_cpu_label(dialect: Dialect, nhosts: usize, window: Duration) -> impl fmt::Display {
    MaxCpuLabel {
        dialect,
        nhosts,
        window,
    }
}

struct MaxCpuLabel {
    dialect: Dialect,
    nhosts: usize,
    window: Duration,
}

impl fmt::Display for MaxCpuLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} max cpu, rand {:>4} hosts, rand {} by 1m",
            self.dialect,
            self.nhosts,
            GoDuration(self.window)
        )
    }
}

/// Renders a duration the way Go's `time.Duration` prints, e.g. `1h0m0s` or `1.5s`. Labels are
/// the keys benchmark results are grouped under, so they must match the Go tools.
struct GoDuration(Duration);

impl fmt::Display for GoDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nanos = self.0.as_nanos();
        if nanos == 0 {
            return f.write_str("0s");
        }
        if nanos < 1_000_000_000 {
            let (unit, suffix) = match nanos {
                0..=999 => (1, "ns"),
                1_000..=999_999 => (1_000, "µs"),
                _ => (1_000_000, "ms"),
            };
            write_fraction(f, nanos, unit)?;
            return f.write_str(suffix);
        }

        let secs = self.0.as_secs();
        let (hours, minutes) = (secs / 3600, secs / 60 % 60);
        if hours > 0 {
            write!(f, "{hours}h")?;
        }
        if secs >= 60 {
            write!(f, "{minutes}m")?;
        }
        let rest = u128::from(secs % 60) * 1_000_000_000 + u128::from(self.0.subsec_nanos());
        write_fraction(f, rest, 1_000_000_000)?;
        f.write_str("s")
    }
}

/// `value / unit` with the remainder as decimals, trailing zeros trimmed
fn write_fraction(f: &mut fmt::Formatter<'_>, value: u128, unit: u128) -> fmt::Result {
    write!(f, "{}", value / unit)?;
    let mut frac = value % unit;
    if frac == 0 {
        return Ok(());
    }
    let mut width = unit.ilog10() as usize;
    while frac % 10 == 0 {
        frac /= 10;
        width -= 1;
    }
    write!(f, ".{frac:0width$}")
}

/// Label for the whole fleet mean cpu shape
pub(crate) fn mean_cpu_label(dialect: Dialect) -> impl fmt::Display {
    MeanCpuLabel(dialect)
}

struct MeanCpuLabel(Dialect);

impl fmt::Display for MeanCpuLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} mean cpu, all hosts, rand 1day by 1hour", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names_round_trip() {
        for t in DevopsQueryType::ALL {
            assert_eq!(t.name().parse::<DevopsQueryType>().unwrap(), t);
            assert_eq!(t.to_string(), t.name());
        }
    }

    #[test]
    fn unknown_name() {
        let err = "3-host-1-hr".parse::<DevopsQueryType>().unwrap_err();
        assert!(matches!(err, Error::UnknownQueryType { .. }));
        assert!(err.to_string().contains("1-host-12-hr"), "{err}");
    }

    #[test]
    fn dispatch_all_grows_with_the_fleet() {
        use DevopsQueryType::*;

        assert_eq!(
            DevopsQueryType::dispatch_all(1).unwrap(),
            vec![MaxCpuUsageHourByMinuteOneHost]
        );
        assert_eq!(
            DevopsQueryType::dispatch_all(7).unwrap(),
            vec![
                MaxCpuUsageHourByMinuteOneHost,
                MaxCpuUsageHourByMinuteTwoHosts,
                MaxCpuUsageHourByMinuteFourHosts,
            ]
        );
        assert_eq!(
            DevopsQueryType::dispatch_all(1000).unwrap(),
            DevopsQueryType::HOUR_BY_MINUTE.to_vec()
        );
        assert_eq!(
            DevopsQueryType::dispatch_all(0).unwrap_err(),
            Error::ZeroScaleVar
        );
    }

    #[test]
    fn parse_selection() {
        assert_eq!(
            DevopsQueryType::parse_selection("groupby", 1).unwrap(),
            vec![DevopsQueryType::MeanCpuUsageDayByHourAllHostsGroupbyHost]
        );
        assert_eq!(DevopsQueryType::parse_selection("all", 4).unwrap().len(), 3);
        assert!(DevopsQueryType::parse_selection("nope", 4).is_err());
    }

    #[test]
    fn labels() {
        assert_eq!(
            max_cpu_label(Dialect::Cassandra, 4, HOUR).to_string(),
            "Cassandra max cpu, rand    4 hosts, rand 1h0m0s by 1m"
        );
        assert_eq!(
            max_cpu_label(Dialect::Influx, 1, 12 * HOUR).to_string(),
            "Influx max cpu, rand    1 hosts, rand 12h0m0s by 1m"
        );
        assert_eq!(
            mean_cpu_label(Dialect::Cassandra).to_string(),
            "Cassandra mean cpu, all hosts, rand 1day by 1hour"
        );
    }

    #[test]
    fn durations_render_like_go() {
        let cases = [
            (Duration::ZERO, "0s"),
            (Duration::from_nanos(999), "999ns"),
            (Duration::from_nanos(1_500), "1.5µs"),
            (Duration::from_millis(250), "250ms"),
            (Duration::from_millis(1_500), "1.5s"),
            (MINUTE, "1m0s"),
            (90 * MINUTE + Duration::from_secs(5), "1h30m5s"),
            (HOUR, "1h0m0s"),
            (12 * HOUR, "12h0m0s"),
            (DAY, "24h0m0s"),
        ];
        for (d, want) in cases {
            assert_eq!(GoDuration(d).to_string(), want);
        }
    }

    #[test]
    fn only_the_placeholder_is_unsupported() {
        let err = Error::Unsupported {
            query_type: DevopsQueryType::MaxCpuUsageDayByHour,
            dialect: Dialect::Influx,
        };
        assert!(err.is_unsupported());
        assert_eq!(
            err.to_string(),
            "Influx does not support the `max-cpu-day-by-hour` query type yet"
        );
        assert!(!Error::ZeroScaleVar.is_unsupported());
    }
}
