//! Entry point for the bulk query generator CLI.

use anyhow::{ensure, Context};
use bulk_query_gen::{
    devops::{CassandraDevops, Devops, DevopsQueryType, InfluxDevops},
    dispatch::{Dispatcher, Schedule},
    generate, now_ns,
    query::Dialect,
    serialize::{OutputFormat, QueryWriter},
    GenerateConfig, GenerateStats, Interleave,
};
use chrono::{DateTime, Utc};
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    num::NonZeroUsize,
    path::PathBuf,
    sync::Arc,
};
use tracing::info;

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum UseCase {
    /// CPU queries over a fleet of hosts
    Devops,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "bulk_query_gen",
    about = "Randomized query generator for time series database benchmarks",
    long_about = r#"Randomized query generator for time series database benchmarks

Examples:
    # 1000 InfluxQL queries over 4 random hosts of a 100 host fleet
    bulk_query_gen --dialect influx --scale-var 100 --query-type 4-host-1-hr

    # The full devops mix for Cassandra, written to a file
    bulk_query_gen --dialect cassandra --scale-var 100 --query-type all -o queries.json

    # Weight single host queries 3:1 against 8 host queries
    bulk_query_gen --dialect influx --scale-var 8 \
        --query-type 1-host-1-hr --query-type 8-host-1-hr --weights 3,1

Query types:
    1-host-1-hr, 2-host-1-hr, 4-host-1-hr, 8-host-1-hr, 16-host-1-hr, 32-host-1-hr,
    1-host-12-hr, max-cpu-day-by-hour, groupby, or `all` for the mix of every N host
    query the fleet is large enough for.
"#,
    version
)]
struct Config {
    /// Backend to generate queries for
    #[clap(long, env = "BULK_QUERY_GEN_DIALECT", action)]
    dialect: Dialect,

    /// Family of queries to generate
    #[clap(long, env = "BULK_QUERY_GEN_USE_CASE", default_value = "devops", action)]
    use_case: UseCase,

    /// Query types to cycle through. Repeat the flag or separate names with commas.
    #[clap(
        long = "query-type",
        env = "BULK_QUERY_GEN_QUERY_TYPE",
        default_value = "all",
        value_delimiter = ',',
        action = clap::ArgAction::Append
    )]
    query_types: Vec<String>,

    /// Relative weight of each query type, in the order they were given. Without weights the
    /// query types are dispatched round robin.
    #[clap(long, env = "BULK_QUERY_GEN_WEIGHTS", value_delimiter = ',', action)]
    weights: Option<Vec<u32>>,

    /// Number of hosts in the simulated fleet
    #[clap(long, env = "BULK_QUERY_GEN_SCALE_VAR", default_value = "1", action)]
    scale_var: usize,

    /// Number of queries to generate
    #[clap(long, env = "BULK_QUERY_GEN_QUERIES", default_value = "1000", action)]
    queries: u64,

    /// Database (or keyspace) the queries target
    #[clap(long, env = "BULK_QUERY_GEN_DB", default_value = "benchmark_db", action)]
    db: String,

    /// Beginning of the benchmark interval, RFC3339
    #[clap(
        long,
        env = "BULK_QUERY_GEN_TIMESTAMP_START",
        default_value = "2016-01-01T00:00:00Z",
        value_parser = parse_timestamp
    )]
    timestamp_start: DateTime<Utc>,

    /// End of the benchmark interval, RFC3339
    #[clap(
        long,
        env = "BULK_QUERY_GEN_TIMESTAMP_END",
        default_value = "2016-01-02T06:00:00Z",
        value_parser = parse_timestamp
    )]
    timestamp_end: DateTime<Utc>,

    /// Random seed. Defaults to the current time; the seed in use is always printed.
    #[clap(long, env = "BULK_QUERY_GEN_SEED", action)]
    seed: Option<u64>,

    /// Number of parallel generation workers
    #[clap(long, env = "BULK_QUERY_GEN_WORKERS", default_value = "1", action)]
    workers: NonZeroUsize,

    /// This process's group when splitting generation across several processes
    #[clap(
        long,
        env = "BULK_QUERY_GEN_INTERLEAVED_GENERATION_GROUP_ID",
        default_value = "0",
        action
    )]
    interleaved_generation_group_id: u64,

    /// Number of processes generation is split across
    #[clap(
        long,
        env = "BULK_QUERY_GEN_INTERLEAVED_GENERATION_GROUPS",
        default_value = "1",
        action
    )]
    interleaved_generation_groups: u64,

    /// File to write queries to, stdout if not given
    #[clap(long, short, env = "BULK_QUERY_GEN_OUTPUT", action)]
    output: Option<PathBuf>,

    /// How each query is written
    #[clap(long, env = "BULK_QUERY_GEN_FORMAT", default_value = "json", action)]
    format: OutputFormat,

    #[clap(flatten)]
    logging_config: trogging::cli::LoggingConfig,
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, humantime::TimestampError> {
    humantime::parse_rfc3339_weak(s).map(DateTime::<Utc>::from)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config: Config = clap::Parser::parse();
    config
        .logging_config
        .install_global_subscriber()
        .context("initializing logging")?;

    let seed = config.seed.unwrap_or_else(now_ns);
    eprintln!("using random seed {seed}");

    ensure!(config.scale_var > 0, "--scale-var must be at least 1");
    let UseCase::Devops = config.use_case;

    let mut query_types = Vec::new();
    for name in &config.query_types {
        query_types.extend(
            DevopsQueryType::parse_selection(name, config.scale_var)
                .with_context(|| format!("resolving query type `{name}`"))?,
        );
    }
    let schedule = match &config.weights {
        Some(weights) => Schedule::weighted_from_parts(&query_types, weights),
        None => Schedule::round_robin(query_types.iter().copied()),
    }
    .context("building dispatch schedule")?;
    info!(entries = ?schedule.entries(), cycle = schedule.len(), "dispatch schedule");

    let interleave = Interleave::new(
        config.interleaved_generation_group_id,
        config.interleaved_generation_groups,
    )?;
    let generate_config = GenerateConfig {
        workers: config.workers,
        interleave,
        ..GenerateConfig::new(config.scale_var, config.queries, seed)
    };

    let out: Box<dyn Write + Send> = match &config.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout())),
    };

    let (start, end) = (config.timestamp_start, config.timestamp_end);
    let stats = match config.dialect {
        Dialect::Cassandra => {
            let generator = CassandraDevops::new(&config.db, start, end)?;
            run(generator, schedule, generate_config, out, config.format).await?
        }
        Dialect::Influx => {
            let generator = InfluxDevops::new(&config.db, start, end)?;
            run(generator, schedule, generate_config, out, config.format).await?
        }
    };

    for (label, count) in &stats.by_label {
        eprintln!("{label}: {count} queries");
    }
    if stats.skipped_unsupported > 0 {
        eprintln!(
            "skipped {} queries of unsupported types",
            stats.skipped_unsupported
        );
    }

    Ok(())
}

async fn run<G: Devops>(
    generator: G,
    schedule: Schedule,
    config: GenerateConfig,
    out: Box<dyn Write + Send>,
    format: OutputFormat,
) -> anyhow::Result<GenerateStats> {
    let dispatcher = Arc::new(Dispatcher::new(generator, schedule));
    let writer = QueryWriter::new(out, format);
    let (stats, _) = generate(config, dispatcher, writer).await?;
    Ok(stats)
}
