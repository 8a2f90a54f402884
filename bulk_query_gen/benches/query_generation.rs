use bulk_query_gen::{
    devops::{CassandraDevops, Devops, DevopsQueryType, InfluxDevops},
    dispatch::{Dispatcher, Schedule},
    query::CassandraQuery,
};
use chrono::{TimeDelta, TimeZone, Utc};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use rand::{rngs::SmallRng, SeedableRng};

const SCALE_VAR: usize = 1000;

fn schedule() -> Schedule {
    Schedule::round_robin(DevopsQueryType::dispatch_all(SCALE_VAR).expect("fleet is not empty"))
        .expect("schedule is not empty")
}

pub fn dispatch(c: &mut Criterion) {
    let start = Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap();
    let end = start + TimeDelta::hours(30);

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(1));

    let cassandra = Dispatcher::new(
        CassandraDevops::new("benchmark_db", start, end).unwrap(),
        schedule(),
    );
    let mut rng = SmallRng::seed_from_u64(0);
    let mut i = 0;
    group.bench_function("cassandra pooled", |b| {
        b.iter(|| {
            let q = cassandra.dispatch(i, SCALE_VAR, &mut rng).unwrap();
            cassandra.release(q);
            i += 1;
        })
    });

    // same work, but every query is freshly allocated and dropped
    let generator = CassandraDevops::new("benchmark_db", start, end).unwrap();
    let cycle = schedule();
    let mut i = 0;
    group.bench_function("cassandra unpooled", |b| {
        b.iter_batched(
            CassandraQuery::default,
            |mut q| {
                generator
                    .fill(cycle.select(i), &mut q, &mut rng, SCALE_VAR)
                    .unwrap();
                i += 1;
                q
            },
            BatchSize::SmallInput,
        )
    });

    let influx = Dispatcher::new(
        InfluxDevops::new("benchmark_db", start, end).unwrap(),
        schedule(),
    );
    let mut i = 0;
    group.bench_function("influx pooled", |b| {
        b.iter(|| {
            let q = influx.dispatch(i, SCALE_VAR, &mut rng).unwrap();
            influx.release(q);
            i += 1;
        })
    });

    group.finish();
}

criterion_group!(benches, dispatch);
criterion_main!(benches);
