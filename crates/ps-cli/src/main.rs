//! plotstack CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ps_viz::{PlotEvaluation, PlotRequest, StackedPlotArtifact, evaluate_plots};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "plotstack")]
#[command(about = "plotstack - stacked histograms with combined uncertainty bands")]
#[command(version)]
struct Cli {
    /// Log verbosity level (trace, debug, info, warn, error)
    #[arg(long, global = true, default_value = "warn")]
    log_level: tracing::Level,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate plot requests into stacked-plot artifacts
    Evaluate {
        /// Plot request(s) (JSON). Several inputs are evaluated in parallel.
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Output file for results (pretty JSON). Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Threads (0 = auto). Use 1 for deterministic parity.
        #[arg(long, default_value = "1")]
        threads: usize,
    },

    /// Print version information
    Version,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt().with_max_level(cli.log_level).with_target(false).init();

    match cli.command {
        Commands::Evaluate { input, output, threads } => {
            cmd_evaluate(&input, output.as_ref(), threads)
        }
        Commands::Version => {
            println!("plotstack {}", ps_core::VERSION);
            Ok(())
        }
    }
}

fn load_request(path: &Path) -> Result<(PlotEvaluation, Vec<ps_viz::Process>)> {
    tracing::info!(path = %path.display(), "loading plot request");
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let request = PlotRequest::from_json(&json)
        .with_context(|| format!("invalid plot request {}", path.display()))?;
    let processes = request.processes()?;
    tracing::info!(plot = %request.name, processes = processes.len(), "plot request loaded");
    let evaluation = PlotEvaluation::new(request.name, request.policy)?;
    Ok((evaluation, processes))
}

fn cmd_evaluate(inputs: &[PathBuf], output: Option<&PathBuf>, threads: usize) -> Result<()> {
    if threads > 0 {
        // Best-effort; if a global pool already exists, keep going.
        let _ = rayon::ThreadPoolBuilder::new().num_threads(threads).build_global();
    }

    let jobs = inputs.iter().map(|p| load_request(p)).collect::<Result<Vec<_>>>()?;
    let mut artifacts = Vec::with_capacity(jobs.len());
    for outcome in evaluate_plots(jobs) {
        let outcome = outcome?;
        tracing::info!(
            plot = %outcome.name,
            stacks = outcome.stacks.len(),
            ratio_points = outcome.ratio.len(),
            "plot evaluated"
        );
        let artifact = StackedPlotArtifact::from_outcome(&outcome, rayon::current_num_threads())?;
        artifacts.push(serde_json::to_value(&artifact)?);
    }

    let value = match <[serde_json::Value; 1]>::try_from(artifacts) {
        Ok([single]) => single,
        Err(many) => serde_json::Value::Array(many),
    };
    write_json(output, value)
}

fn write_json(output: Option<&PathBuf>, value: serde_json::Value) -> Result<()> {
    if let Some(path) = output {
        std::fs::write(path, serde_json::to_string_pretty(&value)?)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&value)?);
    }
    Ok(())
}
