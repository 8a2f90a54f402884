use bulk_query_gen::{
    devops::{CassandraDevops, DevopsQueryType, InfluxDevops},
    dispatch::{Dispatcher, Schedule},
    generate,
    query::{HttpQuery, Query},
    serialize::{self, OutputFormat, QuerySink, QueryWriter},
    Error, GenerateConfig, Interleave,
};
use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use std::{collections::BTreeSet, io::BufRead, num::NonZeroUsize, sync::Arc};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap()
}

fn influx_dispatcher(
    query_types: impl IntoIterator<Item = DevopsQueryType>,
) -> Arc<Dispatcher<InfluxDevops>> {
    let generator =
        InfluxDevops::new("benchmark_db", t0(), t0() + TimeDelta::hours(30)).unwrap();
    Arc::new(Dispatcher::new(
        generator,
        Schedule::round_robin(query_types).unwrap(),
    ))
}

/// Keeps a copy of every query it sees
#[derive(Debug, Default)]
struct Collect(Vec<HttpQuery>);

impl QuerySink<HttpQuery> for Collect {
    fn write_query(&mut self, q: &HttpQuery) -> serialize::Result<()> {
        self.0.push(q.clone());
        Ok(())
    }
}

#[tokio::test]
async fn generates_every_index_across_workers() {
    let dispatcher = influx_dispatcher(DevopsQueryType::dispatch_all(8).unwrap());
    let config = GenerateConfig {
        workers: NonZeroUsize::new(4).unwrap(),
        ..GenerateConfig::new(8, 1000, 42)
    };

    let (stats, sink) = generate(config, Arc::clone(&dispatcher), Collect::default())
        .await
        .unwrap();

    assert_eq!(stats.generated, 1000);
    assert_eq!(stats.skipped_unsupported, 0);
    assert_eq!(sink.0.len(), 1000);
    // 1, 2, 4 and 8 hosts, evenly
    assert_eq!(stats.by_label.len(), 4);
    assert!(stats.by_label.values().all(|&c| c == 250), "{:?}", stats.by_label);

    // every query was recycled; at most the in flight ones were ever allocated
    let pool = dispatcher.pool().stats();
    assert_eq!(pool.allocated + pool.reused, 1000);
    assert_eq!(pool.idle as u64, pool.allocated);
}

#[tokio::test]
async fn same_seed_same_stream() {
    let run = |seed| async move {
        let (_, sink) = generate(
            GenerateConfig::new(16, 200, seed),
            influx_dispatcher(DevopsQueryType::dispatch_all(16).unwrap()),
            Collect::default(),
        )
        .await
        .unwrap();
        sink.0.into_iter().map(|q| q.path).collect::<Vec<_>>()
    };

    assert_eq!(run(7).await, run(7).await);
    assert_ne!(run(7).await, run(8).await);
}

#[tokio::test]
async fn unsupported_entries_are_skipped() {
    let dispatcher = influx_dispatcher([
        DevopsQueryType::MaxCpuUsageHourByMinuteOneHost,
        DevopsQueryType::MaxCpuUsageDayByHour,
    ]);

    let config = GenerateConfig::new(1, 100, 0);
    let (stats, sink) = generate(config, dispatcher, Collect::default())
        .await
        .unwrap();

    assert_eq!(stats.generated, 50);
    assert_eq!(stats.skipped_unsupported, 50);
    assert!(sink.0.iter().all(|q| q.path.contains("hostname")));
}

#[tokio::test]
async fn unsupported_entries_count_once_across_interleaved_groups() {
    let mut skipped = 0;
    let mut generated = 0;
    for group_id in 0..3 {
        let config = GenerateConfig {
            interleave: Interleave::new(group_id, 3).unwrap(),
            workers: NonZeroUsize::new(2).unwrap(),
            ..GenerateConfig::new(1, 120, 0)
        };
        let dispatcher = influx_dispatcher([
            DevopsQueryType::MaxCpuUsageHourByMinuteOneHost,
            DevopsQueryType::MaxCpuUsageDayByHour,
        ]);
        let (stats, _) = generate(config, dispatcher, Collect::default())
            .await
            .unwrap();
        assert_eq!(stats.skipped_interleaved, 80);
        skipped += stats.skipped_unsupported;
        generated += stats.generated;
    }

    assert_eq!(skipped, 60);
    assert_eq!(generated, 60);
}

/// Blocks on the runtime for every query, which panics on a runtime worker thread
#[derive(Debug, Default)]
struct BlockingSink(u64);

impl QuerySink<HttpQuery> for BlockingSink {
    fn write_query(&mut self, _q: &HttpQuery) -> serialize::Result<()> {
        tokio::runtime::Handle::current().block_on(tokio::task::yield_now());
        self.0 += 1;
        Ok(())
    }
}

#[tokio::test]
async fn sink_runs_off_the_runtime_threads() {
    let (stats, sink) = generate(
        GenerateConfig::new(4, 50, 1),
        influx_dispatcher(DevopsQueryType::dispatch_all(4).unwrap()),
        BlockingSink::default(),
    )
    .await
    .unwrap();

    assert_eq!(stats.generated, 50);
    assert_eq!(sink.0, 50);
}

#[tokio::test]
async fn fatal_errors_stop_the_run() {
    // a one day window does not fit in two hours
    let generator =
        CassandraDevops::new("benchmark_db", t0(), t0() + TimeDelta::hours(2)).unwrap();
    let dispatcher = Arc::new(Dispatcher::new(
        generator,
        Schedule::round_robin([DevopsQueryType::MeanCpuUsageDayByHourAllHostsGroupbyHost])
            .unwrap(),
    ));
    let config = GenerateConfig {
        workers: NonZeroUsize::new(2).unwrap(),
        ..GenerateConfig::new(8, 100, 0)
    };

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queries.json");
    let writer = QueryWriter::new(std::fs::File::create(&path).unwrap(), OutputFormat::Json);

    let err = generate(config, dispatcher, writer).await.unwrap_err();
    assert!(matches!(err, Error::Generate { .. }), "{err}");
    assert_eq!(std::fs::read(&path).unwrap().len(), 0);
}

#[tokio::test]
async fn interleaved_groups_split_the_stream() {
    let mut paths = Vec::new();
    for group_id in 0..3 {
        let config = GenerateConfig {
            interleave: Interleave::new(group_id, 3).unwrap(),
            ..GenerateConfig::new(4, 300, 5)
        };
        let (stats, sink) = generate(
            config,
            influx_dispatcher(DevopsQueryType::dispatch_all(4).unwrap()),
            Collect::default(),
        )
        .await
        .unwrap();
        assert_eq!(stats.generated, 100);
        assert_eq!(stats.skipped_interleaved, 200);
        paths.extend(sink.0.into_iter().map(|q| q.path));
    }

    // the groups share a seed, so together they produce exactly the ungrouped stream
    let (_, sink) = generate(
        GenerateConfig::new(4, 300, 5),
        influx_dispatcher(DevopsQueryType::dispatch_all(4).unwrap()),
        Collect::default(),
    )
    .await
    .unwrap();
    let all: BTreeSet<_> = sink.0.into_iter().map(|q| q.path).collect();
    let split: BTreeSet<_> = paths.into_iter().collect();
    assert_eq!(split, all);
}

#[tokio::test]
async fn writes_json_lines_to_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("queries.json");

    let file = std::io::BufWriter::new(std::fs::File::create(&path).unwrap());
    let writer = QueryWriter::new(file, OutputFormat::Json);
    let (stats, writer) = generate(
        GenerateConfig::new(2, 20, 3),
        influx_dispatcher([DevopsQueryType::MaxCpuUsageHourByMinuteTwoHosts]),
        writer,
    )
    .await
    .unwrap();
    assert_eq!(stats.generated, 20);
    assert_eq!(writer.written(), 20);
    drop(writer);

    let reader = std::io::BufReader::new(std::fs::File::open(&path).unwrap());
    let lines: Vec<_> = reader.lines().map(Result::unwrap).collect();
    assert_eq!(lines.len(), 20);
    for line in lines {
        let q: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(q["method"], "GET");
        assert_eq!(
            q["human_label"],
            <HttpQuery as Query>::DIALECT.to_string()
                + " max cpu, rand    2 hosts, rand 1h0m0s by 1m"
        );
    }
}
