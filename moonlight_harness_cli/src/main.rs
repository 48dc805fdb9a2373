use moonlight_harness_core::benchmark::ArchiveExtractor;
use moonlight_harness_core::config::{DEFAULT_CONFIG_FILE, HarnessConfig};
use moonlight_harness_core::harness::{Harness, RunSummary};
use moonlight_harness_core::seed::copy_seeds;
use moonlight_harness_core::solver::{CommandSolver, CommandSolverConfig};

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Check MoonLight solutions against known-good results", long_about = None)]
struct Cli {
    #[clap(short, long, value_parser)]
    config_file: Option<PathBuf>,
    /// Path to the MoonLight executable
    #[clap(short, long, value_parser)]
    moonlight_path: Option<PathBuf>,
    /// Kill the solver if it runs longer than this
    #[clap(long)]
    timeout_ms: Option<u64>,
    #[clap(short, long)]
    verbose: bool,
    #[clap(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Run the JSON unit test fixtures
    Unit {
        #[clap(short, long, value_parser)]
        tests_dir: Option<PathBuf>,
    },
    /// Run the published benchmarks
    Bench {
        /// Only run particular benchmark(s)
        #[clap(short, long, num_args = 1..)]
        benchmarks: Vec<String>,
        #[clap(short, long, value_parser)]
        data_dir: Option<PathBuf>,
        #[clap(short, long, value_parser)]
        results_dir: Option<PathBuf>,
    },
    /// Copy the exemplars a solution selected into a seed directory
    Seed {
        /// Corpus directory the solution was computed from
        #[clap(value_parser)]
        src: PathBuf,
        /// Destination directory, created if missing
        #[clap(value_parser)]
        dst: PathBuf,
        /// The solver's `*_solution.json` file
        #[clap(value_parser)]
        solution: PathBuf,
    },
}

fn load_config(cli: &Cli) -> Result<HarnessConfig, anyhow::Error> {
    let mut config = match &cli.config_file {
        Some(config_path) => {
            log::info!("Loading configuration from specified path: {config_path:?}");
            HarnessConfig::load_from_file(config_path)?
        }
        None => {
            let default_config_path = PathBuf::from(DEFAULT_CONFIG_FILE);
            if default_config_path.exists() {
                log::info!("No config file specified, loading default: {default_config_path:?}");
                HarnessConfig::load_from_file(&default_config_path)?
            } else {
                log::debug!("No config file found, using built-in defaults");
                HarnessConfig::default()
            }
        }
    };

    if let Some(path) = &cli.moonlight_path {
        config.moonlight_path = Some(path.clone());
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        config.solver_timeout_ms = Some(timeout_ms);
    }
    match &cli.mode {
        Mode::Unit { tests_dir } => {
            if let Some(dir) = tests_dir {
                config.unit_tests_dir = dir.clone();
            }
        }
        Mode::Bench {
            data_dir,
            results_dir,
            ..
        } => {
            if let Some(dir) = data_dir {
                config.data_dir = dir.clone();
            }
            if let Some(dir) = results_dir {
                config.benchmark_results_dir = dir.clone();
            }
        }
        Mode::Seed { .. } => {}
    }
    Ok(config)
}

fn seed(src: &Path, dst: &Path, solution: &Path) -> Result<ExitCode, anyhow::Error> {
    let report = copy_seeds(solution, src, dst)
        .with_context(|| format!("Failed to copy seeds from {src:?} to {dst:?}"))?;
    println!("Copied {} seeds into {}", report.copied.len(), dst.display());
    Ok(ExitCode::SUCCESS)
}

fn run_tests(cli: &Cli) -> Result<ExitCode, anyhow::Error> {
    let config = load_config(cli)?;
    log::debug!("Effective configuration: {config:#?}");

    let solver = CommandSolver::new(CommandSolverConfig {
        command: config.solver_command()?,
        timeout: config.solver_timeout(),
        inherit_stdout: matches!(cli.mode, Mode::Bench { .. }),
    });
    let extractor = ArchiveExtractor::new(config.extract_command.clone());
    let mut harness = Harness::new(solver, config);

    let result = match &cli.mode {
        Mode::Bench { benchmarks, .. } => harness.run_benchmarks(benchmarks, &extractor),
        _ => harness.run_unit_tests(),
    };

    let summary: RunSummary = match result {
        Ok(summary) => summary,
        Err(e) => {
            log::error!("Aborting run: {e}");
            return Ok(ExitCode::FAILURE);
        }
    };

    log::info!(
        "{} passed, {} failed, {} skipped",
        summary.passed(),
        summary.failed(),
        summary.skipped.len()
    );

    Ok(if summary.success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn main() -> Result<ExitCode, anyhow::Error> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    match &cli.mode {
        Mode::Seed { src, dst, solution } => seed(src, dst, solution),
        Mode::Unit { .. } | Mode::Bench { .. } => run_tests(&cli),
    }
}
