//! wbiis: wavelet-based image indexing and search, entry point.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use wbiis::{BoundaryMode, CancelToken, QueryMode, Wavelet, WbiisConfig};
use wbiis_cli::config::load_config;
use wbiis_cli::session::SearchSession;
use wbiis_cli::types::{CliError, CliResult, FeatureSummary, LoadMode, QueryReport};

#[derive(Parser)]
#[command(
    name = "wbiis",
    about = "Wavelet-based image indexing and search",
    version
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct GlobalArgs {
    /// Path to a JSON config file.
    #[arg(long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Decomposition level.
    #[arg(long, global = true)]
    level: Option<usize>,

    /// Wavelet family (db8, haar).
    #[arg(long, global = true)]
    wavelet: Option<Wavelet>,

    /// Boundary extension mode (symmetric, periodic, zero).
    #[arg(long, global = true)]
    mode: Option<BoundaryMode>,

    /// Worker threads for batch feature extraction.
    #[arg(long, global = true)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Sample a database, index it, and query it with one image.
    Query {
        /// Directory of database images.
        #[arg(long)]
        db: PathBuf,

        /// Number of database images to sample.
        #[arg(long)]
        size: usize,

        /// Query image.
        #[arg(long)]
        image: PathBuf,

        /// Number of results.
        #[arg(short)]
        k: Option<usize>,

        /// Run the std-gated linear scan instead of the index.
        #[arg(long)]
        slow: bool,

        /// Std-dev tolerance in percent for the slow query.
        #[arg(long)]
        percent: Option<f64>,

        /// Stream images one at a time instead of loading in parallel.
        #[arg(long)]
        lazy: bool,

        /// Seed for database sampling.
        #[arg(long)]
        seed: Option<u64>,

        /// Abort the slow query after this many milliseconds.
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Directory with higher resolution copies of the database images.
        #[arg(long)]
        originals: Option<PathBuf>,

        /// Copy the matched images into this directory.
        #[arg(long)]
        save: Option<PathBuf>,

        /// Print the report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print a summary of one image's feature vector.
    Inspect {
        /// Image to decompose.
        image: PathBuf,

        /// Print the summary as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Launch interactive REPL mode.
    Repl,

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   wbiis completions bash > ~/.local/share/bash-completion/completions/wbiis
    ///   wbiis completions zsh > ~/.zfunc/_wbiis
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.global.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "wbiis", &mut std::io::stdout());
        return Ok(());
    }

    let config = match resolve_config(&cli.global) {
        Ok(config) => config,
        Err(e) => exit_with(e),
    };

    if let Commands::Repl = cli.command {
        return wbiis_cli::repl::run(config);
    }

    if let Err(e) = run(cli.command, config) {
        exit_with(e);
    }
    Ok(())
}

fn exit_with(err: CliError) -> ! {
    eprintln!("Error: {err}");
    std::process::exit(err.exit_code());
}

/// Config file values, overridden by command-line flags.
fn resolve_config(global: &GlobalArgs) -> CliResult<WbiisConfig> {
    let mut config = load_config(global.config.as_deref())?;
    if let Some(level) = global.level {
        config.features.level = level;
    }
    if let Some(wavelet) = global.wavelet {
        config.features.wavelet = wavelet;
    }
    if let Some(mode) = global.mode {
        config.features.mode = mode;
    }
    if global.workers.is_some() {
        config.workers = global.workers;
    }
    config.validate()?;
    Ok(config)
}

fn run(command: Commands, config: WbiisConfig) -> CliResult<()> {
    match command {
        Commands::Query {
            db,
            size,
            image,
            k,
            slow,
            percent,
            lazy,
            seed,
            timeout_ms,
            originals,
            save,
            json,
        } => {
            let mut session = SearchSession::new(config)?;
            session.set_originals_dir(originals)?;

            let load_mode = if lazy { LoadMode::Lazy } else { LoadMode::Eager };
            let summary = session.load_database(&db, size, load_mode, seed)?;
            tracing::info!(
                "Loaded {} images ({} coefficients) in {} ms",
                summary.images,
                summary.coefficients,
                summary.elapsed_ms
            );

            let mode = if slow { QueryMode::Slow } else { QueryMode::Fast };
            let mut options = session.default_options(mode);
            if let Some(k) = k {
                options.top_k = k;
            }
            if let Some(percent) = percent {
                options.std_tolerance = percent;
            }
            let cancel = match timeout_ms {
                Some(ms) => CancelToken::with_timeout(Duration::from_millis(ms)),
                None => CancelToken::new(),
            };

            let report = session.query(&image, &options, &cancel)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }

            if let Some(dest) = save {
                let copied = session.save_results(&dest)?;
                eprintln!("Saved {copied} images to {}", dest.display());
            }
        }

        Commands::Inspect { image, json } => {
            let session = SearchSession::new(config)?;
            let summary = session.features(&image)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                print_features(&summary);
            }
        }

        Commands::Repl | Commands::Completions { .. } => {}
    }

    Ok(())
}

fn print_report(report: &QueryReport) {
    println!("Query: {} ({} mode)", report.query, report.mode);
    if let Some(p) = report.std_tolerance {
        println!("Std tolerance: {p}%");
    }
    println!("Results: {} in {} ms", report.results.len(), report.elapsed_ms);
    for result in &report.results {
        println!(
            "  {:>3}. {:<40} {:>12.4}",
            result.rank, result.id, result.distance
        );
    }
}

fn print_features(summary: &FeatureSummary) {
    println!("Image: {}", summary.path);
    println!(
        "  Wavelet: {} ({} boundary), level {}",
        summary.wavelet, summary.mode, summary.level
    );
    println!(
        "  Subbands: {} x {}",
        summary.subband_shape.0, summary.subband_shape.1
    );
    println!(
        "  Std devs: {:.4} {:.4} {:.4}",
        summary.stds[0], summary.stds[1], summary.stds[2]
    );
    println!("  Coefficients: {}", summary.coefficients);
}
