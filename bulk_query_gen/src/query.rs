//! Backend specific query descriptions.
//!
//! Queries are reusable buffers: every fill overwrites the previous contents in place, so a
//! query that has been through the [`QueryPool`](crate::pool::QueryPool) a few times no
//! longer allocates.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};
use std::{
    fmt::{self, Write},
    time::Duration,
};

/// A target query backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, clap::ValueEnum)]
pub enum Dialect {
    /// Structured queries for the Cassandra benchmark client
    Cassandra,
    /// InfluxQL over the InfluxDB 1.x HTTP API
    Influx,
}

impl Dialect {
    /// Prefix used in human readable labels
    pub fn label(&self) -> &'static str {
        match self {
            Self::Cassandra => "Cassandra",
            Self::Influx => "Influx",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// The capabilities every dialect's query type shares.
pub trait Query: Default + fmt::Debug + fmt::Display + Serialize + Send + Sync + 'static {
    /// The backend this query is for
    const DIALECT: Dialect;

    /// Short description of the query shape, used to group results
    fn human_label(&self) -> &str;

    /// The label plus the start of the queried window
    fn human_description(&self) -> &str;

    /// Blank out every field while keeping the allocations around for the next fill.
    fn reset(&mut self);
}

/// Replace the contents of `buf` with `value` without giving up its allocation.
pub(crate) fn overwrite(buf: &mut String, value: &str) {
    buf.clear();
    buf.push_str(value);
}

/// Replace the contents of `buf` with formatted output without giving up its allocation.
pub(crate) fn overwrite_fmt(buf: &mut String, args: fmt::Arguments<'_>) {
    buf.clear();
    buf.write_fmt(args)
        .expect("formatting into a String does not fail");
}

/// A list of strings whose slots are reused across [`clear`](Self::clear) calls.
#[derive(Debug, Default, Clone)]
pub struct StringList {
    items: Vec<String>,
    len: usize,
}

impl StringList {
    /// Forget the contents; slot allocations are kept.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Append the formatted value, reusing a previously allocated slot if there is one.
    pub fn push_fmt(&mut self, args: fmt::Arguments<'_>) {
        if self.len == self.items.len() {
            self.items.push(String::new());
        }
        overwrite_fmt(&mut self.items[self.len], args);
        self.len += 1;
    }

    /// Append `value`
    pub fn push(&mut self, value: &str) {
        self.push_fmt(format_args!("{value}"));
    }

    /// The live contents
    pub fn as_slice(&self) -> &[String] {
        &self.items[..self.len]
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when there are no live entries
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl PartialEq for StringList {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for StringList {}

impl Serialize for StringList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.as_slice())
    }
}

/// Tag filters for a query.
///
/// Tags within one set are OR'd together; distinct sets are AND'd. Only the hostname
/// dimension is used by the devops queries, so there is at most one set.
#[derive(Debug, Default, Clone)]
pub struct TagSets {
    sets: Vec<StringList>,
    len: usize,
}

impl TagSets {
    /// Remove all sets, keeping their allocations.
    pub fn clear(&mut self) {
        self.len = 0;
    }

    /// Start a new, empty set and return it for filling.
    pub fn push_set(&mut self) -> &mut StringList {
        if self.len == self.sets.len() {
            self.sets.push(StringList::default());
        }
        let set = &mut self.sets[self.len];
        set.clear();
        self.len += 1;
        set
    }

    /// Iterate over the live sets
    pub fn iter(&self) -> impl Iterator<Item = &[String]> + '_ {
        self.sets[..self.len].iter().map(StringList::as_slice)
    }

    /// Number of live sets
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the query has no tag filter at all
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the live sets out, mostly useful for assertions.
    pub fn to_vec(&self) -> Vec<Vec<String>> {
        self.iter().map(<[String]>::to_vec).collect()
    }
}

impl PartialEq for TagSets {
    fn eq(&self, other: &Self) -> bool {
        self.iter().eq(other.iter())
    }
}

impl Eq for TagSets {}

impl Serialize for TagSets {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(&self.sets[..self.len])
    }
}

impl fmt::Display for TagSets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, set) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(" and ")?;
            }
            f.write_char('(')?;
            for (j, tag) in set.iter().enumerate() {
                if j > 0 {
                    f.write_str(" or ")?;
                }
                f.write_str(tag)?;
            }
            f.write_char(')')?;
        }
        Ok(())
    }
}

/// A structured query for the Cassandra benchmark client, which builds the CQL itself.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CassandraQuery {
    /// e.g. `Cassandra max cpu, rand    4 hosts, rand 1h0m0s by 1m`
    pub human_label: String,
    /// label plus the window start
    pub human_description: String,
    /// e.g. `cpu`
    pub measurement_name: String,
    /// e.g. `usage_user`
    pub field_name: String,
    /// e.g. `max` or `avg`, used literally in the query
    pub aggregation_type: String,
    /// inclusive window start
    pub time_start: DateTime<Utc>,
    /// exclusive window end
    pub time_end: DateTime<Utc>,
    /// width of the result buckets
    #[serde(with = "humantime_serde")]
    pub group_by_duration: Duration,
    /// host filters
    pub tag_sets: TagSets,
}

impl Query for CassandraQuery {
    const DIALECT: Dialect = Dialect::Cassandra;

    fn human_label(&self) -> &str {
        &self.human_label
    }

    fn human_description(&self) -> &str {
        &self.human_description
    }

    fn reset(&mut self) {
        self.human_label.clear();
        self.human_description.clear();
        self.measurement_name.clear();
        self.field_name.clear();
        self.aggregation_type.clear();
        self.time_start = DateTime::<Utc>::default();
        self.time_end = DateTime::<Utc>::default();
        self.group_by_duration = Duration::ZERO;
        self.tag_sets.clear();
    }
}

impl fmt::Display for CassandraQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}({}) from {} where time >= {} and time < {}",
            self.human_label,
            self.aggregation_type,
            self.field_name,
            self.measurement_name,
            self.time_start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.time_end.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;
        if !self.tag_sets.is_empty() {
            write!(f, " and {}", self.tag_sets)?;
        }
        write!(
            f,
            " group by {}",
            humantime::format_duration(self.group_by_duration)
        )
    }
}

/// A query sent as a plain HTTP request, as the InfluxDB 1.x API takes it.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct HttpQuery {
    /// e.g. `Influx max cpu, rand    4 hosts, rand 1h0m0s by 1m`
    pub human_label: String,
    /// label plus the window start
    pub human_description: String,
    /// HTTP method, e.g. `GET`
    pub method: String,
    /// request path including the url encoded query string
    pub path: String,
    /// request body, empty for `GET`
    pub body: String,
}

impl Query for HttpQuery {
    const DIALECT: Dialect = Dialect::Influx;

    fn human_label(&self) -> &str {
        &self.human_label
    }

    fn human_description(&self) -> &str {
        &self.human_description
    }

    fn reset(&mut self) {
        self.human_label.clear();
        self.human_description.clear();
        self.method.clear();
        self.path.clear();
        self.body.clear();
    }
}

impl fmt::Display for HttpQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)?;
        if !self.body.is_empty() {
            write!(f, " {}", self.body)?;
        }
        Ok(())
    }
}
