//! Choosing which catalog entry fires for each generation index.

use crate::{
    devops::{self, Devops, DevopsQueryType},
    pool::QueryPool,
};
use rand::Rng;
use snafu::{ensure, Snafu};
use std::sync::Arc;

/// Errors that may happen while building a [`Schedule`]
#[derive(Snafu, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// A schedule needs at least one entry
    #[snafu(display("a dispatch schedule needs at least one query type"))]
    EmptySchedule,

    /// Weighted schedules need a positive total weight
    #[snafu(display("dispatch weights must not all be zero"))]
    ZeroWeight,

    /// Weights are given per entry
    #[snafu(display("got {weights} weights for {entries} query types"))]
    WeightCountMismatch {
        /// Number of query types
        entries: usize,
        /// Number of weights
        weights: usize,
    },

    /// The weights would expand to an unreasonably long cycle
    #[snafu(display("dispatch weights sum to {total}, at most {} is supported", MAX_CYCLE))]
    WeightsTooLarge {
        /// Sum of all weights
        total: u64,
    },
}

/// Result type for schedule construction
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Upper bound on the expanded length of a weighted schedule
pub const MAX_CYCLE: u64 = 1 << 20;

/// The order catalog entries are dispatched in.
///
/// Both policies expand into a fixed cycle at construction, so picking the entry for an
/// index is a lookup and the same index always picks the same entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    cycle: Vec<DevopsQueryType>,
}

impl Schedule {
    /// Entry `i mod n` fires for index `i`.
    pub fn round_robin(entries: impl IntoIterator<Item = DevopsQueryType>) -> Result<Self> {
        let cycle: Vec<_> = entries.into_iter().collect();
        ensure!(!cycle.is_empty(), EmptyScheduleSnafu);
        Ok(Self { cycle })
    }

    /// Every entry fires `weight` times per cycle of `sum(weights)` indices, spread out as
    /// evenly as possible (smooth weighted round robin). Zero weight entries never fire.
    pub fn weighted(entries: impl IntoIterator<Item = (DevopsQueryType, u32)>) -> Result<Self> {
        let entries: Vec<_> = entries.into_iter().collect();
        ensure!(!entries.is_empty(), EmptyScheduleSnafu);

        let total: u64 = entries.iter().map(|&(_, w)| u64::from(w)).sum();
        ensure!(total > 0, ZeroWeightSnafu);
        ensure!(total <= MAX_CYCLE, WeightsTooLargeSnafu { total });

        let total = total as i64;
        let mut current = vec![0i64; entries.len()];
        let mut cycle = Vec::with_capacity(total as usize);
        for _ in 0..total {
            for (c, &(_, w)) in current.iter_mut().zip(&entries) {
                *c += i64::from(w);
            }
            // first of the largest wins ties, keeping the cycle deterministic
            let mut best = 0;
            for (i, &c) in current.iter().enumerate() {
                if c > current[best] {
                    best = i;
                }
            }
            current[best] -= total;
            cycle.push(entries[best].0);
        }

        Ok(Self { cycle })
    }

    /// Pair `entries` with `weights` positionally and build a weighted schedule.
    pub fn weighted_from_parts(entries: &[DevopsQueryType], weights: &[u32]) -> Result<Self> {
        ensure!(
            entries.len() == weights.len(),
            WeightCountMismatchSnafu {
                entries: entries.len(),
                weights: weights.len(),
            }
        );
        Self::weighted(entries.iter().copied().zip(weights.iter().copied()))
    }

    /// The entry that fires for index `i`
    pub fn select(&self, i: u64) -> DevopsQueryType {
        self.cycle[(i % self.cycle.len() as u64) as usize]
    }

    /// Length of one full cycle
    pub fn len(&self) -> usize {
        self.cycle.len()
    }

    /// Always false, schedules are never empty
    pub fn is_empty(&self) -> bool {
        self.cycle.is_empty()
    }

    /// Distinct entries in the order they first fire
    pub fn entries(&self) -> Vec<DevopsQueryType> {
        let mut seen = Vec::new();
        for t in &self.cycle {
            if !seen.contains(t) {
                seen.push(*t);
            }
        }
        seen
    }
}

/// Hands out filled queries: picks the catalog entry for an index, takes a blank query from
/// the pool and fills it with the dialect's generator.
#[derive(Debug)]
pub struct Dispatcher<G: Devops> {
    generator: Arc<G>,
    pool: Arc<QueryPool<G::Query>>,
    schedule: Schedule,
}

impl<G: Devops> Dispatcher<G> {
    /// A dispatcher with a fresh, unbounded pool
    pub fn new(generator: G, schedule: Schedule) -> Self {
        Self::with_pool(Arc::new(generator), Arc::new(QueryPool::new()), schedule)
    }

    /// A dispatcher sharing an existing generator and pool
    pub fn with_pool(
        generator: Arc<G>,
        pool: Arc<QueryPool<G::Query>>,
        schedule: Schedule,
    ) -> Self {
        Self {
            generator,
            pool,
            schedule,
        }
    }

    /// Produce the query for generation index `i`.
    ///
    /// The caller owns the returned query and should give it back with
    /// [`release`](Self::release) once it is done with it. On error the blank query has
    /// already gone back to the pool.
    pub fn dispatch<R>(
        &self,
        i: u64,
        scale_var: usize,
        rng: &mut R,
    ) -> Result<G::Query, devops::Error>
    where
        R: Rng + ?Sized,
    {
        let query_type = self.schedule.select(i);
        let mut q = self.pool.get();
        match self.generator.fill(query_type, &mut q, rng, scale_var) {
            Ok(()) => Ok(q),
            Err(e) => {
                self.pool.put(q);
                Err(e)
            }
        }
    }

    /// Return a query obtained from [`dispatch`](Self::dispatch) for reuse.
    pub fn release(&self, q: G::Query) {
        self.pool.put(q);
    }

    /// The dialect generator
    pub fn generator(&self) -> &G {
        &self.generator
    }

    /// The pool queries come from
    pub fn pool(&self) -> &QueryPool<G::Query> {
        &self.pool
    }

    /// The dispatch order
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{devops::CassandraDevops, query::Query};
    use chrono::{TimeDelta, TimeZone, Utc};
    use rand::{rngs::SmallRng, SeedableRng};
    use std::collections::BTreeMap;
    use DevopsQueryType::*;

    fn counts(schedule: &Schedule, n: u64) -> BTreeMap<DevopsQueryType, u64> {
        let mut counts = BTreeMap::new();
        for i in 0..n {
            *counts.entry(schedule.select(i)).or_default() += 1;
        }
        counts
    }

    #[test]
    fn round_robin_covers_every_entry_evenly() {
        let schedule = Schedule::round_robin(DevopsQueryType::ALL).unwrap();
        let m = 7;
        let counts = counts(&schedule, DevopsQueryType::ALL.len() as u64 * m);
        assert_eq!(counts.len(), DevopsQueryType::ALL.len());
        assert!(counts.values().all(|&c| c == m), "{counts:?}");

        assert_eq!(schedule.select(0), MaxCpuUsageHourByMinuteOneHost);
        assert_eq!(schedule.select(10), MaxCpuUsageHourByMinuteTwoHosts);
    }

    #[test]
    fn empty_schedules_are_rejected() {
        assert_eq!(
            Schedule::round_robin([]).unwrap_err(),
            Error::EmptySchedule
        );
        assert_eq!(Schedule::weighted([]).unwrap_err(), Error::EmptySchedule);
        assert_eq!(
            Schedule::weighted([(MaxCpuUsageHourByMinuteOneHost, 0)]).unwrap_err(),
            Error::ZeroWeight
        );
        assert_eq!(
            Schedule::weighted_from_parts(&[MaxCpuUsageHourByMinuteOneHost], &[1, 2])
                .unwrap_err(),
            Error::WeightCountMismatch {
                entries: 1,
                weights: 2
            }
        );
        assert!(matches!(
            Schedule::weighted([(MaxCpuUsageHourByMinuteOneHost, u32::MAX)]).unwrap_err(),
            Error::WeightsTooLarge { .. }
        ));
    }

    #[test]
    fn weighted_schedule_is_smooth() {
        let schedule = Schedule::weighted([
            (MaxCpuUsageHourByMinuteOneHost, 5),
            (MaxCpuUsageHourByMinuteTwoHosts, 1),
            (MaxCpuUsageHourByMinuteFourHosts, 1),
            (MaxCpuUsageDayByHour, 0),
        ])
        .unwrap();
        assert_eq!(schedule.len(), 7);

        let a = MaxCpuUsageHourByMinuteOneHost;
        let b = MaxCpuUsageHourByMinuteTwoHosts;
        let c = MaxCpuUsageHourByMinuteFourHosts;
        let cycle: Vec<_> = (0..7).map(|i| schedule.select(i)).collect();
        assert_eq!(cycle, vec![a, a, b, a, c, a, a]);

        let counts = counts(&schedule, 7 * 100);
        assert_eq!(counts[&a], 500);
        assert_eq!(counts[&b], 100);
        assert_eq!(counts[&c], 100);
        assert!(!counts.contains_key(&MaxCpuUsageDayByHour));
        assert_eq!(schedule.entries(), vec![a, b, c]);
    }

    #[test]
    fn dispatch_returns_failed_queries_to_the_pool() {
        let t0 = Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap();
        let generator =
            CassandraDevops::new("benchmark_db", t0, t0 + TimeDelta::hours(2)).unwrap();
        let schedule = Schedule::round_robin([
            MaxCpuUsageHourByMinuteOneHost,
            MaxCpuUsageDayByHour,
            MeanCpuUsageDayByHourAllHostsGroupbyHost,
        ])
        .unwrap();
        let dispatcher = Dispatcher::new(generator, schedule);
        let mut rng = SmallRng::seed_from_u64(0);

        let q = dispatcher.dispatch(0, 4, &mut rng).unwrap();
        assert_eq!(q.human_label(), "Cassandra max cpu, rand    1 hosts, rand 1h0m0s by 1m");
        dispatcher.release(q);

        let err = dispatcher.dispatch(1, 4, &mut rng).unwrap_err();
        assert!(err.is_unsupported());

        // a day window does not fit in two hours
        let err = dispatcher.dispatch(2, 4, &mut rng).unwrap_err();
        assert!(!err.is_unsupported());

        let stats = dispatcher.pool().stats();
        assert_eq!(stats.allocated, 1);
        assert_eq!(stats.reused, 2);
        assert_eq!(stats.idle, 1);
    }
}
