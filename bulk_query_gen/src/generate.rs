//! Running a [`Dispatcher`] over a whole benchmark's worth of generation indices.

use crate::{
    devops::{self, Devops, DevopsQueryType},
    dispatch::Dispatcher,
    query::Query,
    serialize::{self, QuerySink},
    GenerateSnafu, InvalidInterleaveSnafu, JoinSnafu, Result, WriteSnafu,
};
use rand::{rngs::SmallRng, SeedableRng};
use snafu::{OptionExt, ResultExt};
use std::{
    collections::BTreeMap,
    num::{NonZeroU64, NonZeroUsize},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Which share of the index space this process emits when several generator processes
/// split one benchmark between them.
///
/// Every process generates every index, so each one draws the same random values, but only
/// indices with `i % num_groups == group_id` are emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interleave {
    group_id: u64,
    num_groups: NonZeroU64,
}

impl Interleave {
    /// Fails unless `group_id < num_groups`.
    pub fn new(group_id: u64, num_groups: u64) -> Result<Self> {
        let valid = NonZeroU64::new(num_groups).filter(|n| group_id < n.get());
        let num_groups = valid.context(InvalidInterleaveSnafu {
            group_id,
            num_groups,
        })?;
        Ok(Self {
            group_id,
            num_groups,
        })
    }

    /// True if index `i` belongs to this group
    pub fn emits(&self, i: u64) -> bool {
        i % self.num_groups.get() == self.group_id
    }
}

impl Default for Interleave {
    fn default() -> Self {
        Self {
            group_id: 0,
            num_groups: NonZeroU64::MIN,
        }
    }
}

/// Settings for one [`generate`] run
#[derive(Debug, Clone, Copy)]
pub struct GenerateConfig {
    /// Simulated fleet size
    pub scale_var: usize,
    /// Number of generation indices, `0..queries`
    pub queries: u64,
    /// Number of parallel generation workers
    pub workers: NonZeroUsize,
    /// Worker `w` seeds its rng with `seed + w`
    pub seed: u64,
    /// The share of indices to emit
    pub interleave: Interleave,
    /// Number of filled queries that may wait for the sink
    pub channel_capacity: NonZeroUsize,
}

impl GenerateConfig {
    /// A single worker config emitting every index
    pub fn new(scale_var: usize, queries: u64, seed: u64) -> Self {
        Self {
            scale_var,
            queries,
            workers: NonZeroUsize::MIN,
            seed,
            interleave: Interleave::default(),
            channel_capacity: NonZeroUsize::new(1024).expect("non zero"),
        }
    }
}

/// Totals for a finished [`generate`] run
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct GenerateStats {
    /// Queries handed to the sink
    pub generated: u64,
    /// Indices whose catalog entry is not supported by the dialect
    pub skipped_unsupported: u64,
    /// Indices generated but left to other interleaved groups
    pub skipped_interleaved: u64,
    /// Queries handed to the sink, per human label
    pub by_label: BTreeMap<String, u64>,
}

#[derive(Debug, Default)]
struct WorkerStats {
    unsupported: BTreeMap<DevopsQueryType, u64>,
    skipped_interleaved: u64,
}

/// Generate `config.queries` queries with `dispatcher` and hand every emitted one to `sink`.
///
/// Indices are split across `config.workers` blocking tasks, each with its own seeded rng.
/// The sink runs on a blocking task of its own and gets queries in no particular order;
/// they are recycled after it has seen them. Catalog entries the dialect does not support
/// are skipped and counted; every other error stops the run.
///
/// The sink is handed back with the stats once every query has been written and flushed.
pub async fn generate<G, S>(
    config: GenerateConfig,
    dispatcher: Arc<Dispatcher<G>>,
    sink: S,
) -> Result<(GenerateStats, S)>
where
    G: Devops,
    S: QuerySink<G::Query> + 'static,
{
    let start = Instant::now();
    let dialect = <G::Query as Query>::DIALECT;
    info!(
        %dialect,
        scale_var = config.scale_var,
        queries = config.queries,
        workers = config.workers.get(),
        seed = config.seed,
        "generating queries"
    );

    let (tx, rx) = mpsc::channel(config.channel_capacity.get());
    let abort = Arc::new(AtomicBool::new(false));

    let writer = {
        let dispatcher = Arc::clone(&dispatcher);
        let abort = Arc::clone(&abort);
        tokio::task::spawn_blocking(move || write_queries(rx, sink, &dispatcher, &abort))
    };

    let mut handles = Vec::with_capacity(config.workers.get());
    for worker in 0..config.workers.get() {
        let dispatcher = Arc::clone(&dispatcher);
        let abort = Arc::clone(&abort);
        let tx = tx.clone();
        handles.push(tokio::task::spawn_blocking(move || {
            let res = run_worker(worker, config, &dispatcher, &tx, &abort);
            if res.is_err() {
                abort.store(true, Ordering::Relaxed);
            }
            res
        }));
    }
    drop(tx);

    let mut unsupported = BTreeMap::<DevopsQueryType, u64>::new();
    let mut skipped_interleaved = 0;
    let mut worker_error = None;
    for handle in handles {
        match handle.await.context(JoinSnafu)? {
            Ok(worker_stats) => {
                for (query_type, count) in worker_stats.unsupported {
                    *unsupported.entry(query_type).or_default() += count;
                }
                skipped_interleaved += worker_stats.skipped_interleaved;
            }
            Err(e) => {
                worker_error.get_or_insert(e);
            }
        }
    }

    let Written {
        sink,
        generated,
        by_label,
        result,
    } = writer.await.context(JoinSnafu)?;
    result.context(WriteSnafu)?;
    if let Some(e) = worker_error {
        return Err(e).context(GenerateSnafu);
    }

    let mut stats = GenerateStats {
        generated,
        skipped_interleaved,
        by_label,
        ..Default::default()
    };
    for (query_type, count) in unsupported {
        warn!(
            %query_type,
            %dialect,
            count,
            "skipped queries of a type the dialect does not support"
        );
        stats.skipped_unsupported += count;
    }

    info!(
        generated = stats.generated,
        skipped_unsupported = stats.skipped_unsupported,
        skipped_interleaved = stats.skipped_interleaved,
        pool = ?dispatcher.pool().stats(),
        elapsed = ?start.elapsed(),
        "finished generating queries"
    );

    Ok((stats, sink))
}

/// What the writer task hands back
#[derive(Debug)]
struct Written<S> {
    sink: S,
    generated: u64,
    by_label: BTreeMap<String, u64>,
    result: Result<(), serialize::Error>,
}

fn write_queries<G, S>(
    mut rx: mpsc::Receiver<G::Query>,
    mut sink: S,
    dispatcher: &Dispatcher<G>,
    abort: &AtomicBool,
) -> Written<S>
where
    G: Devops,
    S: QuerySink<G::Query>,
{
    let mut generated = 0;
    let mut by_label = BTreeMap::new();
    let mut result = Ok(());

    while let Some(q) = rx.blocking_recv() {
        result = sink.write_query(&q);
        if result.is_ok() {
            count_label(&mut by_label, q.human_label());
            generated += 1;
        }
        dispatcher.release(q);
        if result.is_err() {
            break;
        }
    }
    if result.is_ok() {
        result = sink.flush();
    }
    if result.is_err() {
        abort.store(true, Ordering::Relaxed);
        // unblock workers waiting on a full channel
        drop(rx);
    }

    Written {
        sink,
        generated,
        by_label,
        result,
    }
}

fn run_worker<G: Devops>(
    worker: usize,
    config: GenerateConfig,
    dispatcher: &Dispatcher<G>,
    tx: &mpsc::Sender<G::Query>,
    abort: &AtomicBool,
) -> Result<WorkerStats, devops::Error> {
    let mut rng = SmallRng::seed_from_u64(config.seed.wrapping_add(worker as u64));
    let mut stats = WorkerStats::default();

    let indices = (worker as u64..config.queries).step_by(config.workers.get());
    for i in indices {
        if abort.load(Ordering::Relaxed) {
            debug!(worker, i, "worker stopping early");
            break;
        }

        // every index is dispatched so all groups draw the same random values
        let dispatched = dispatcher.dispatch(i, config.scale_var, &mut rng);
        if !config.interleave.emits(i) {
            stats.skipped_interleaved += 1;
            match dispatched {
                Ok(q) => dispatcher.release(q),
                Err(e) if e.is_unsupported() => {}
                Err(e) => return Err(e),
            }
            continue;
        }

        let q = match dispatched {
            Ok(q) => q,
            Err(devops::Error::Unsupported { query_type, .. }) => {
                *stats.unsupported.entry(query_type).or_default() += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        if let Err(mpsc::error::SendError(q)) = tx.blocking_send(q) {
            // the sink is gone, it reports its own error
            dispatcher.release(q);
            break;
        }
    }

    debug!(worker, ?stats, "worker finished");
    Ok(stats)
}

fn count_label(by_label: &mut BTreeMap<String, u64>, label: &str) {
    match by_label.get_mut(label) {
        Some(count) => *count += 1,
        None => {
            by_label.insert(label.to_owned(), 1);
        }
    }
}
