use clap::{Parser, Subcommand};
use foldmon_bench::{
    config::BenchmarkConfig, BenchmarkKey, LogSink, ProteinBenchmark, SharedBenchmarks, WorkUnit,
};
use std::{fs::File, path::PathBuf, process::exit, sync::Arc, time::Duration};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_unwrap::ResultExt;


#[derive(Parser, Debug)]
#[command(author, version, about = "Inspect and maintain client frame time benchmarks")]
struct Cli {
    /// YAML config file, defaults to $FOLDMON_CONFIG
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List all benchmarked project ids
    Projects,
    /// Show every client's benchmark for a project
    Project { project_id: i32 },
    /// Print the average frame time of a single benchmark
    Average {
        owner_name: String,
        owner_path: String,
        project_id: i32,
    },
    /// Rename a client in all of its benchmarks
    Rename { old_name: String, new_name: String },
    /// Change the install path of a client in all of its benchmarks
    Relocate { owner_name: String, new_path: String },
    /// Ingest frames from a YAML work unit file
    Ingest {
        unit: PathBuf,
        starting_frame: i32,
        ending_frame: i32,
    },
    /// Recompute minimum frame times from the kept history
    RefreshMinimum,
    /// Drop all benchmarks
    Reset,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match cli.config {
        Some(ref path) => BenchmarkConfig::load(path),
        None => BenchmarkConfig::discover(),
    }
    .unwrap_or_log();

    let benchmarks = SharedBenchmarks::open(&config.cache).with_sink(Arc::new(LogSink));

    match cli.command {
        Command::Projects => {
            for project_id in benchmarks.distinct_project_ids() {
                println!("{project_id}");
            }
        }
        Command::Project { project_id } => {
            let records = benchmarks.records_for_project(project_id);

            if records.is_empty() {
                info!("No benchmarks for project {project_id}");
            }
            records.iter().for_each(print_benchmark);
        }
        Command::Average {
            owner_name,
            owner_path,
            project_id,
        } => {
            let key = BenchmarkKey::new(owner_name, owner_path, project_id);

            println!("{}", format_duration(benchmarks.average_duration(&key)));
        }
        Command::Rename { old_name, new_name } => {
            if let Err(error) = benchmarks.rename_owner(&old_name, &new_name) {
                error!("Failed to rename {old_name}: {error}");
                exit(1);
            }
        }
        Command::Relocate {
            owner_name,
            new_path,
        } => {
            if let Err(error) = benchmarks.update_owner_path(&owner_name, &new_path) {
                error!("Failed to relocate {owner_name}: {error}");
                exit(1);
            }
        }
        Command::Ingest {
            unit,
            starting_frame,
            ending_frame,
        } => {
            let mut unit: WorkUnit =
                serde_yaml::from_reader(File::open(&unit).unwrap_or_log()).unwrap_or_log();
            unit.derive_frame_durations();

            match benchmarks.ingest(&unit, starting_frame, ending_frame) {
                Ok(outcome) => {
                    info!(
                        appended = outcome.appended,
                        skipped = outcome.skipped,
                        "Ingested frames"
                    );
                    benchmarks.save();
                }
                Err(error) => {
                    error!("Failed to ingest frames: {error}");
                    exit(1);
                }
            }
        }
        Command::RefreshMinimum => benchmarks.refresh_minimum_frame_times(),
        Command::Reset => benchmarks.reset(),
    }
}

fn print_benchmark(benchmark: &ProteinBenchmark) {
    println!(
        "{:<24} {:<32} avg {} min {} ({} frames)",
        benchmark.owner_name(),
        benchmark.owner_path(),
        format_duration(benchmark.average_frame_time()),
        format_duration(benchmark.minimum_frame_time()),
        benchmark.frame_times().len()
    );
}

fn format_duration(duration: Duration) -> String {
    let seconds = duration.as_secs();

    format!("{:02}:{:02}:{:02}", seconds / 3600, seconds / 60 % 60, seconds % 60)
}
