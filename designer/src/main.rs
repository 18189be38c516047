//! Iterative primer design against NCBI Primer-BLAST.
//!
//! Each target walks a ladder of progressively relaxed parameter sets until
//! Primer-BLAST returns a specific primer pair or the ladder runs out.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{ArgAction, Parser, Subcommand};
use tracing::info;

use designer::controller::AbortFlag;
use designer::design::{RunOptions, describe_ladders, run_design};
use designer::exit_codes;
use designer::io::config::{DEFAULT_CONFIG_FILE, DesignerConfig, load_config, write_config};
use designer::io::primer_blast::PrimerBlastClient;
use designer::logging;

#[derive(Parser)]
#[command(
    name = "designer",
    version,
    about = "Iterative real-time PCR primer design against NCBI Primer-BLAST"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). `RUST_LOG` overrides.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default configuration file.
    Init {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Print both relaxation ladders and the parameters each tier changes.
    Ladder {
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
    },
    /// Design primers for every target in the input file.
    Run {
        /// CSV with `target_id,sequence_id` columns, or one sequence id per line.
        #[arg(short, long)]
        input: PathBuf,
        /// Directory for reports and result pages.
        #[arg(short, long)]
        output: PathBuf,
        #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
        config: PathBuf,
        /// Override `max_concurrency`.
        #[arg(short, long)]
        jobs: Option<usize>,
        /// Override the `ORGANISM` parameter.
        #[arg(long)]
        organism: Option<String>,
    },
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    match cli.command {
        Command::Init { config, force } => cmd_init(&config, force),
        Command::Ladder { config } => cmd_ladder(&config),
        Command::Run {
            input,
            output,
            config,
            jobs,
            organism,
        } => cmd_run(
            RunOptions {
                input,
                output_dir: output,
            },
            &config,
            jobs,
            organism.as_deref(),
        ),
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    write_config(path, &DesignerConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_ladder(path: &Path) -> Result<i32> {
    let cfg = load_config(path)?;
    print!("{}", describe_ladders(&cfg));
    Ok(exit_codes::OK)
}

fn cmd_run(
    options: RunOptions,
    config: &Path,
    jobs: Option<usize>,
    organism: Option<&str>,
) -> Result<i32> {
    let cfg = load_config(config)?
        .with_overrides(jobs, organism)
        .with_context(|| format!("apply overrides to {}", config.display()))?;
    let backend =
        PrimerBlastClient::new(&cfg.blast_url, cfg.http_timeout(), cfg.request_spacing())?;

    let outcome = run_design(&options, &cfg, &backend, AbortFlag::new(), |result| {
        info!(
            target_id = %result.target.target_id,
            status = result.status_label(),
            attempts = result.attempts.len(),
            "target finished"
        );
    })?;

    for (bucket, count) in &outcome.summary.by_bucket {
        println!("{bucket}\t{count}");
    }
    if outcome.missing > 0 {
        println!("missing\t{}", outcome.missing);
    }
    println!(
        "{} of {} targets succeeded; reports in {}",
        outcome.summary.succeeded,
        outcome.summary.total,
        options.output_dir.display()
    );

    Ok(if outcome.summary.all_succeeded() {
        exit_codes::OK
    } else {
        exit_codes::EXHAUSTED
    })
}
