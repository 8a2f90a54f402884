//! Devops queries as InfluxQL over the InfluxDB 1.x `/query` endpoint.

use super::{
    max_cpu_label, mean_cpu_label, Devops, DevopsQueryType, HostsSnafu, InvalidTimeRangeSnafu,
    Result, WindowSnafu, DAY,
};
use crate::{
    host_sampler::{host_name, sample_hosts},
    query::{overwrite, overwrite_fmt, Dialect, HttpQuery},
    time_interval::TimeInterval,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use snafu::ResultExt;
use std::{
    fmt::{self, Write},
    time::Duration,
};
use url::form_urlencoded;

/// Fills [`HttpQuery`]s against one database over one benchmark interval.
#[derive(Debug, Clone)]
pub struct InfluxDevops {
    db: String,
    all_interval: TimeInterval,
}

impl InfluxDevops {
    /// Fails unless `start` is strictly before `end`.
    pub fn new(db: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        let all_interval = TimeInterval::new(start, end).context(InvalidTimeRangeSnafu {
            dialect: Dialect::Influx,
        })?;
        Ok(Self {
            db: db.into(),
            all_interval,
        })
    }

    /// The database queries are sent to
    pub fn db(&self) -> &str {
        &self.db
    }

    /// Write `/query?db=<db>&q=<statement>` into `q.path`, form encoding both values in place.
    fn fill_request(&self, q: &mut HttpQuery, statement: fmt::Arguments<'_>) {
        overwrite(&mut q.method, "GET");
        q.body.clear();

        q.path.clear();
        q.path.push_str("/query?db=");
        q.path.extend(form_urlencoded::byte_serialize(self.db.as_bytes()));
        q.path.push_str("&q=");
        FormValue(&mut q.path)
            .write_fmt(statement)
            .expect("formatting into a String does not fail");
    }
}

impl Devops for InfluxDevops {
    type Query = HttpQuery;

    fn interval(&self) -> &TimeInterval {
        &self.all_interval
    }

    fn max_cpu_usage_hour_by_minute_n_hosts<R>(
        &self,
        q: &mut HttpQuery,
        rng: &mut R,
        query_type: DevopsQueryType,
        scale_var: usize,
        nhosts: usize,
        window: Duration,
    ) -> Result<()>
    where
        R: Rng + ?Sized,
    {
        let interval = self
            .all_interval
            .rand_window(window, rng)
            .context(WindowSnafu { query_type })?;
        let hosts = sample_hosts(rng, scale_var, nhosts).context(HostsSnafu { query_type })?;

        overwrite_fmt(
            &mut q.human_label,
            format_args!("{}", max_cpu_label(Dialect::Influx, nhosts, window)),
        );
        overwrite_fmt(
            &mut q.human_description,
            format_args!("{}: {}", q.human_label, interval.start_string()),
        );
        self.fill_request(
            q,
            format_args!(
                "SELECT max(usage_user) from cpu where {} and time >= '{}' and time < '{}' \
                 group by time(1m)",
                HostnameClause(&hosts),
                interval.start_string(),
                interval.end_string(),
            ),
        );

        Ok(())
    }

    fn mean_cpu_usage_day_by_hour_all_hosts_group_by_host<R>(
        &self,
        q: &mut HttpQuery,
        rng: &mut R,
    ) -> Result<()>
    where
        R: Rng + ?Sized,
    {
        let interval = self.all_interval.rand_window(DAY, rng).context(WindowSnafu {
            query_type: DevopsQueryType::MeanCpuUsageDayByHourAllHostsGroupbyHost,
        })?;

        overwrite_fmt(
            &mut q.human_label,
            format_args!("{}", mean_cpu_label(Dialect::Influx)),
        );
        overwrite_fmt(
            &mut q.human_description,
            format_args!("{}: {}", q.human_label, interval.start_string()),
        );
        self.fill_request(
            q,
            format_args!(
                "SELECT mean(usage_user) from cpu where time >= '{}' and time < '{}' \
                 group by time(1h),hostname",
                interval.start_string(),
                interval.end_string(),
            ),
        );

        Ok(())
    }
}

/// `(hostname = 'host_1' or hostname = 'host_5')`
struct HostnameClause<'a>(&'a [usize]);

impl fmt::Display for HostnameClause<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_char('(')?;
        for (i, &n) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(" or ")?;
            }
            write!(f, "hostname = '{}'", host_name(n))?;
        }
        f.write_char(')')
    }
}

/// Form encodes everything written through it onto the end of a `String`.
struct FormValue<'a>(&'a mut String);

impl Write for FormValue<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.extend(form_urlencoded::byte_serialize(s.as_bytes()));
        Ok(())
    }
}
