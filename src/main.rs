// Enable warnings for all clippy lints.
#![warn(
    clippy::correctness,
    clippy::style,
    clippy::complexity,
    clippy::perf,
    clippy::pedantic,
    clippy::cargo,
    clippy::restriction
)]
// Selectively disable warnings for some lints.
#![allow(
    clippy::indexing_slicing, // Allow `vec[i]` indexing.
    clippy::module_name_repetitions,  // Allow name repetitions in module and type names.
    clippy::use_debug, // Debug formatting is useful.
    clippy::float_arithmetic, // Needed.
    clippy::integer_arithmetic, // Needed.
    clippy::integer_division, // Needed.
    clippy::multiple_crate_versions, // Beyond our control.
    clippy::missing_docs_in_private_items, // Disabled.
    clippy::missing_inline_in_public_items, // Not considered for now.
    clippy::implicit_return, // Allow.
    clippy::too_many_arguments, // Allow.
    clippy::use_self, // Too pedantic.
    clippy::shadow_same,
    clippy::result_expect_used,
    clippy::unknown_clippy_lints,
    clippy::exit
)]
// Mark some lints as errors.
#![deny(clippy::print_stdout)]

use clap::{arg_enum, value_t, App, Arg, ArgMatches, SubCommand};
use log::{info, Level};
use shardwalk::error::SwError;
use shardwalk::master::{self, MasterConfig};
use shardwalk::stats;
use shardwalk::util::logger::init_logger_with_level;
use shardwalk::util::validation;
use shardwalk::worker::{self, WorkerConfig};
use std::time::Duration;

arg_enum! {
    #[derive(PartialEq, Debug)]
    pub enum LogLevel {
        Error,
        Warn,
        Info,
        Debug,
        Trace,
    }
}

fn main() -> Result<(), SwError> {
    // Parse command line arguments.
    let matches = App::new("shardwalk")
        .arg(
            Arg::from_usage("-l, --loglevel=[LEVEL] 'Set the log level'")
                .possible_values(&LogLevel::variants())
                .case_insensitive(true)
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("master")
                .about("Partitions a graph and coordinates a worker fleet")
                .arg(
                    Arg::from_usage("-g, --graph=<PATH> 'Edge-list file to sample'")
                        .validator(validation::existing_path),
                )
                .arg(
                    Arg::from_usage("-n, --workers=<N> 'Number of workers'")
                        .validator(validation::positive_integer),
                )
                .arg(
                    Arg::from_usage("-s, --scale=<FRACTION> 'Fraction of edges to sample'")
                        .validator(validation::fraction),
                )
                .args_from_usage(
                    "-o, --output=[PATH] 'Output file for the sampled graph'
                     -d, --work-dir=[DIR] 'Directory for shards and backups'
                     --no-spawn 'Do not spawn workers; wait for external registration'",
                )
                .arg(
                    Arg::from_usage("-w, --walkers=[N] 'Random walkers per worker'")
                        .validator(validation::positive_integer),
                )
                .arg(Arg::from_usage(
                    "-b, --backup-threshold=[N] 'Unflushed edges per backup flush (0 = only at end)'",
                ))
                .arg(
                    Arg::from_usage("-i, --iterations=[N] 'Walker passes per loop iteration'")
                        .validator(validation::positive_integer),
                )
                .arg(
                    Arg::from_usage("-t, --heartbeat-timeout=[SECS] 'Worker liveness timeout'")
                        .validator(validation::positive_integer),
                ),
        )
        .subcommand(
            SubCommand::with_name("worker")
                .about("Runs one sampling worker")
                .args_from_usage(
                    "--worker-id=<ID> 'Id of this worker'
                     --master-host=<HOST> 'Master hostname'
                     --master-port=<PORT> 'Master port'
                     --load-backup 'Replay a previous backup before walking'",
                )
                .arg(
                    Arg::from_usage("-w, --walkers=[N] 'Random walkers to start'")
                        .validator(validation::positive_integer),
                )
                .arg(Arg::from_usage(
                    "-b, --backup-threshold=[N] 'Unflushed edges per backup flush (0 = only at end)'",
                ))
                .arg(
                    Arg::from_usage("-i, --iterations=[N] 'Walker passes per loop iteration'")
                        .validator(validation::positive_integer),
                )
                .arg(Arg::from_usage("--seed=[N] 'Seed for the walk rng'")),
        )
        .subcommand(
            SubCommand::with_name("stats")
                .about("Prints descriptive statistics of an edge-list file")
                .arg(
                    Arg::from_usage("<graph> 'Edge-list file to summarize'")
                        .validator(validation::existing_path),
                ),
        )
        .get_matches();

    setup_logger(&matches)?;

    match matches.subcommand() {
        ("master", Some(sub_matches)) => master::run(master_config(sub_matches)),
        ("worker", Some(sub_matches)) => worker::run(worker_config(sub_matches)),
        ("stats", Some(sub_matches)) => {
            let path = sub_matches.value_of("graph").expect("required argument");
            let summary = stats::summarize(path)?;
            info!("{}: {}", path, summary);
            Ok(())
        }
        _ => Err(SwError::Generic(
            "Expected a subcommand: master, worker or stats (see --help)".to_owned(),
        )),
    }
}

fn master_config(matches: &ArgMatches) -> MasterConfig {
    MasterConfig {
        n_workers: value_t!(matches, "workers", usize).expect("validated argument"),
        graph_path: matches.value_of("graph").expect("required argument").to_owned(),
        output_path: matches.value_of("output").unwrap_or("sampled_graph.txt").to_owned(),
        work_dir: matches.value_of("work-dir").unwrap_or("shardwalk_work").to_owned(),
        scale: value_t!(matches, "scale", f64).expect("validated argument"),
        bind_host: "127.0.0.1".to_owned(),
        number_of_random_walkers: value_t!(matches, "walkers", usize).unwrap_or(8),
        backup_threshold: value_t!(matches, "backup-threshold", usize).unwrap_or(500),
        walking_iterations: value_t!(matches, "iterations", usize).unwrap_or(10),
        heartbeat_timeout: Duration::from_secs(
            value_t!(matches, "heartbeat-timeout", u64).unwrap_or(5),
        ),
        spawn_workers: !matches.is_present("no-spawn"),
    }
}

fn worker_config(matches: &ArgMatches) -> WorkerConfig {
    WorkerConfig {
        worker_id: value_t!(matches, "worker-id", u32).expect("required argument"),
        master_host: matches.value_of("master-host").expect("required argument").to_owned(),
        master_port: value_t!(matches, "master-port", u16).expect("required argument"),
        bind_host: "127.0.0.1".to_owned(),
        number_of_random_walkers: value_t!(matches, "walkers", usize).unwrap_or(8),
        backup_threshold: value_t!(matches, "backup-threshold", usize).unwrap_or(500),
        walking_iterations: value_t!(matches, "iterations", usize).unwrap_or(10),
        load_backup: matches.is_present("load-backup"),
        rng_seed: value_t!(matches, "seed", u64).ok(),
    }
}

fn setup_logger(matches: &ArgMatches) -> Result<(), SwError> {
    // Set log level.
    let log_level = match value_t!(matches, "loglevel", LogLevel).unwrap_or(LogLevel::Info) {
        LogLevel::Error => Level::Error,
        LogLevel::Warn => Level::Warn,
        LogLevel::Info => Level::Info,
        LogLevel::Debug => Level::Debug,
        LogLevel::Trace => Level::Trace,
    };
    init_logger_with_level(log_level)
}
