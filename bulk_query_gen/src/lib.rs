//! This crate generates randomized analytic queries for load testing time series databases.
//!
//! A benchmark run simulates a fleet of `scale_var` hosts reporting CPU metrics over a fixed
//! benchmark interval. Each generated query names an aggregation, a random subset of the
//! hosts and a random window of the interval, rendered for one backend [`Dialect`]:
//!
//! - [`CassandraDevops`] fills structured [`CassandraQuery`]s for the Cassandra benchmark
//!   client.
//! - [`InfluxDevops`] fills [`HttpQuery`]s carrying InfluxQL for the InfluxDB 1.x API.
//!
//! A [`Dispatcher`] picks the catalog entry for each generation index and recycles queries
//! through a [`QueryPool`], and [`generate`] drives many dispatchers in parallel.
//!
//! [`Dialect`]: query::Dialect
//! [`CassandraDevops`]: devops::CassandraDevops
//! [`InfluxDevops`]: devops::InfluxDevops
//! [`CassandraQuery`]: query::CassandraQuery
//! [`HttpQuery`]: query::HttpQuery
//! [`Dispatcher`]: dispatch::Dispatcher
//! [`QueryPool`]: pool::QueryPool

#![warn(missing_docs)]

use snafu::Snafu;
use std::time::{SystemTime, UNIX_EPOCH};

pub mod devops;
pub mod dispatch;
pub mod generate;
pub mod host_sampler;
pub mod pool;
pub mod query;
pub mod serialize;
pub mod time_interval;

pub use generate::{generate, GenerateConfig, GenerateStats, Interleave};

/// Errors that may happen while generating a stream of queries.
#[derive(Snafu, Debug)]
pub enum Error {
    /// Error that may happen when waiting on a generation worker
    #[snafu(display("Could not join generation worker: {}", source))]
    Join {
        /// Underlying tokio error that caused this problem
        source: tokio::task::JoinError,
    },

    /// Error that may happen when handing a query to the sink
    #[snafu(display("Could not write queries, caused by:\n{}", source))]
    Write {
        /// Underlying `serialize` module error that caused this problem
        source: serialize::Error,
    },

    /// Error that may happen when filling a query
    #[snafu(display("Could not generate query, caused by:\n{}", source))]
    Generate {
        /// Underlying `devops` module error that caused this problem
        source: devops::Error,
    },

    /// Interleaved generation needs a group id below the number of groups
    #[snafu(display(
        "interleaved generation group id {group_id} must be less than the number of groups \
         {num_groups}"
    ))]
    InvalidInterleave {
        /// Requested group id
        group_id: u64,
        /// Requested number of groups
        num_groups: u64,
    },
}

/// Result type for query stream generation
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Gets the current time in nanoseconds since the epoch
pub fn now_ns() -> u64 {
    let since_the_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("Time went backwards");
    u64::try_from(since_the_epoch.as_nanos()).expect("Time does not fit")
}
