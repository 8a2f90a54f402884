//! Devops queries for the Cassandra benchmark client.

use super::{
    max_cpu_label, mean_cpu_label, Devops, DevopsQueryType, HostsSnafu, InvalidTimeRangeSnafu,
    Result, WindowSnafu, DAY, HOUR, MINUTE,
};
use crate::{
    host_sampler::{host_name, sample_hosts},
    query::{overwrite, overwrite_fmt, CassandraQuery, Dialect},
    time_interval::TimeInterval,
};
use chrono::{DateTime, Utc};
use rand::Rng;
use snafu::ResultExt;
use std::time::Duration;

/// Fills [`CassandraQuery`]s for one keyspace over one benchmark interval.
#[derive(Debug, Clone)]
pub struct CassandraDevops {
    keyspace: String,
    all_interval: TimeInterval,
}

impl CassandraDevops {
    /// Fails unless `start` is strictly before `end`.
    pub fn new(
        keyspace: impl Into<String>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Self> {
        let all_interval = TimeInterval::new(start, end).context(InvalidTimeRangeSnafu {
            dialect: Dialect::Cassandra,
        })?;
        Ok(Self {
            keyspace: keyspace.into(),
            all_interval,
        })
    }

    /// The keyspace queries are meant for
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    fn fill_common(
        q: &mut CassandraQuery,
        aggregation_type: &str,
        interval: &TimeInterval,
        group_by: Duration,
    ) {
        overwrite_fmt(
            &mut q.human_description,
            format_args!("{}: {}", q.human_label, interval.start_string()),
        );
        overwrite(&mut q.measurement_name, "cpu");
        overwrite(&mut q.field_name, "usage_user");
        overwrite(&mut q.aggregation_type, aggregation_type);
        q.time_start = interval.start();
        q.time_end = interval.end();
        q.group_by_duration = group_by;
    }
}

impl Devops for CassandraDevops {
    type Query = CassandraQuery;

    fn interval(&self) -> &TimeInterval {
        &self.all_interval
    }

    fn max_cpu_usage_hour_by_minute_n_hosts<R>(
        &self,
        q: &mut CassandraQuery,
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
            format_args!("{}", max_cpu_label(Dialect::Cassandra, nhosts, window)),
        );
        Self::fill_common(q, "max", &interval, MINUTE);

        q.tag_sets.clear();
        let tag_set = q.tag_sets.push_set();
        for n in hosts {
            tag_set.push_fmt(format_args!("hostname={}", host_name(n)));
        }

        Ok(())
    }

    fn mean_cpu_usage_day_by_hour_all_hosts_group_by_host<R>(
        &self,
        q: &mut CassandraQuery,
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
            format_args!("{}", mean_cpu_label(Dialect::Cassandra)),
        );
        Self::fill_common(q, "avg", &interval, HOUR);
        // whole fleet: a reused query must not keep its previous host filter
        q.tag_sets.clear();

        Ok(())
    }
}
